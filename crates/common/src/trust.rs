use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::types::TrustScore;

/// Category name whose domains are never trusted and are excluded from consensus search.
pub const UNTRUSTED_CATEGORY: &str = "untrusted";

/// Static domain → trust mapping, loaded once from trust_catalog.toml.
///
/// Patterns are matched on label boundaries: `gov` matches `cdc.gov` but
/// not `govtrack.com`; a pattern containing a path (`thequint.com/news/webqoof`)
/// matches that path prefix on the host.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct TrustCatalog {
    /// Category name → domain patterns. Every category except `untrusted` is High trust.
    pub categories: BTreeMap<String, Vec<String>>,
    /// Domains that get Medium trust (e.g. wikipedia.org).
    #[serde(default)]
    pub medium_domains: Vec<String>,
    /// Extra domains excluded from consensus search on top of `untrusted`.
    #[serde(default)]
    pub extra_consensus_exclusions: Vec<String>,
}

impl TrustCatalog {
    /// Trust tier for a URL. Untrusted wins over every other category; unknown domains are Low.
    pub fn trust_level(&self, url: &str) -> TrustScore {
        let Some(target) = UrlTarget::parse(url) else {
            return TrustScore::Low;
        };

        if self.untrusted().iter().any(|p| target.matches(p)) {
            return TrustScore::Low;
        }

        let high = self
            .categories
            .iter()
            .filter(|(name, _)| name.as_str() != UNTRUSTED_CATEGORY)
            .flat_map(|(_, patterns)| patterns.iter())
            .any(|p| target.matches(p));
        if high {
            return TrustScore::High;
        }

        if self.medium_domains.iter().any(|p| target.matches(p)) {
            return TrustScore::Medium;
        }

        TrustScore::Low
    }

    /// Whether the URL's domain is one of the extractor-suggested domains.
    pub fn matches_suggested(&self, url: &str, suggested: &[String]) -> bool {
        let Some(target) = UrlTarget::parse(url) else {
            return false;
        };
        suggested.iter().any(|p| target.matches(p))
    }

    /// Domains whose results must never count as consensus votes.
    pub fn consensus_exclusions(&self) -> Vec<String> {
        self.untrusted()
            .iter()
            .chain(self.extra_consensus_exclusions.iter())
            .cloned()
            .collect()
    }

    /// Whether a URL belongs to the untrusted category.
    pub fn is_untrusted(&self, url: &str) -> bool {
        UrlTarget::parse(url)
            .map(|target| self.untrusted().iter().any(|p| target.matches(p)))
            .unwrap_or(false)
    }

    fn untrusted(&self) -> &[String] {
        self.categories
            .get(UNTRUSTED_CATEGORY)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }
}

/// Lowercased host (without `www.`) and path of a URL.
struct UrlTarget {
    host: String,
    path: String,
}

impl UrlTarget {
    fn parse(raw: &str) -> Option<Self> {
        let trimmed = raw.trim();
        let parsed = url::Url::parse(trimmed)
            .or_else(|_| url::Url::parse(&format!("https://{}", trimmed)))
            .ok()?;
        let host = parsed.host_str()?.to_lowercase();
        let host = host.strip_prefix("www.").unwrap_or(&host).to_string();
        Some(Self {
            host,
            path: parsed.path().to_lowercase(),
        })
    }

    fn matches(&self, pattern: &str) -> bool {
        let pattern = pattern.trim().to_lowercase();
        let pattern = pattern
            .split_once("://")
            .map_or(pattern.as_str(), |(_, rest)| rest);
        let pattern = pattern.strip_prefix("www.").unwrap_or(pattern);
        let pattern = pattern.trim_end_matches('/');
        if pattern.is_empty() {
            return false;
        }

        match pattern.split_once('/') {
            Some((domain, path)) => {
                self.host_matches(domain) && self.path.starts_with(&format!("/{}", path))
            }
            None => self.host_matches(pattern),
        }
    }

    fn host_matches(&self, domain: &str) -> bool {
        self.host == domain || self.host.ends_with(&format!(".{}", domain))
    }
}
