//! Fact-check registry collaborator (Tier 1 of the verifier).

use std::future::Future;
use std::pin::Pin;
use std::time::Duration;

use serde::Deserialize;

use courtroom_common::config::RegistryConfig;

/// A published fact-check that matches the queried text.
#[derive(Clone, Debug, PartialEq)]
pub struct RegistryMatch {
    pub publisher: String,
    pub rating: String,
    pub url: String,
    /// Claim text as recorded by the fact-checker.
    pub claim_text: String,
    pub similarity: f64,
}

impl RegistryMatch {
    /// Verification detail string recorded on Tier 1 evidence.
    pub fn details(&self) -> String {
        format!(
            "MATCH: {} rates this '{}' ({})",
            self.publisher, self.rating, self.url
        )
    }
}

#[derive(Debug, thiserror::Error)]
pub enum RegistryError {
    #[error("registry HTTP error: {0}")]
    Http(String),

    #[error("registry API returned {status}: {body}")]
    Api { status: u16, body: String },

    #[error("registry response parse error: {0}")]
    Parse(String),
}

impl From<RegistryError> for courtroom_common::CourtroomError {
    fn from(e: RegistryError) -> Self {
        courtroom_common::CourtroomError::Registry(e.to_string())
    }
}

/// `lookup(text) -> match | none`.
pub trait FactCheckRegistry: Send + Sync {
    fn lookup<'a>(
        &'a self,
        text: &'a str,
    ) -> Pin<Box<dyn Future<Output = Result<Option<RegistryMatch>, RegistryError>> + Send + 'a>>;
}

// ---------------------------------------------------------------------------
// Google Fact Check Tools
// ---------------------------------------------------------------------------

const CLAIMS_SEARCH_PATH: &str = "/v1alpha1/claims:search";
const MAX_ATTEMPTS: u32 = 2;
const RETRY_DELAY: Duration = Duration::from_secs(2);

#[derive(Deserialize)]
struct ClaimsSearchResponse {
    #[serde(default)]
    claims: Vec<FactCheckClaim>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct FactCheckClaim {
    #[serde(default)]
    text: String,
    #[serde(default)]
    claim_review: Vec<ClaimReview>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct ClaimReview {
    publisher: Publisher,
    #[serde(default)]
    url: String,
    #[serde(default)]
    textual_rating: String,
}

#[derive(Deserialize)]
struct Publisher {
    #[serde(default)]
    name: String,
    #[serde(default)]
    site: String,
}

/// Google Fact Check Tools `claims:search` client.
pub struct FactCheckToolsClient {
    http: reqwest::Client,
    config: RegistryConfig,
    api_key: String,
}

impl FactCheckToolsClient {
    /// Returns None if FACT_CHECK_API_KEY is not set.
    pub fn new(config: RegistryConfig) -> Option<Self> {
        let api_key = match std::env::var("FACT_CHECK_API_KEY") {
            Ok(key) if !key.is_empty() => key,
            _ => {
                tracing::warn!("FACT_CHECK_API_KEY not set, Tier 1 registry check disabled");
                return None;
            }
        };
        Some(Self {
            http: reqwest::Client::new(),
            config,
            api_key,
        })
    }

    async fn lookup_with_retry(&self, text: &str) -> Result<Option<RegistryMatch>, RegistryError> {
        let mut attempt = 0u32;
        loop {
            attempt += 1;
            match self.lookup_once(text).await {
                Ok(found) => return Ok(found),
                Err(e) if attempt >= MAX_ATTEMPTS => return Err(e),
                Err(e) => {
                    tracing::debug!(attempt, error = %e, "Registry lookup failed, retrying");
                    tokio::time::sleep(RETRY_DELAY).await;
                }
            }
        }
    }

    async fn lookup_once(&self, text: &str) -> Result<Option<RegistryMatch>, RegistryError> {
        let url = format!(
            "{}{}",
            self.config.base_url.trim_end_matches('/'),
            CLAIMS_SEARCH_PATH
        );

        let response = self
            .http
            .get(&url)
            .query(&[
                ("query", text),
                ("key", self.api_key.as_str()),
                ("languageCode", self.config.language_code.as_str()),
            ])
            .send()
            .await
            .map_err(|e| RegistryError::Http(e.to_string()))?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response.text().await.unwrap_or_default();
            return Err(RegistryError::Api { status, body });
        }

        let body: ClaimsSearchResponse = response
            .json()
            .await
            .map_err(|e| RegistryError::Parse(e.to_string()))?;

        Ok(best_match(text, body, self.config.min_similarity))
    }
}

/// Highest-similarity reviewed claim at or above `min_similarity`.
fn best_match(query: &str, body: ClaimsSearchResponse, min_similarity: f64) -> Option<RegistryMatch> {
    let query = query.to_lowercase();

    body.claims
        .into_iter()
        .filter_map(|claim| {
            let similarity = strsim::jaro_winkler(&query, &claim.text.to_lowercase());
            let review = claim.claim_review.into_iter().next()?;
            Some((similarity, claim.text, review))
        })
        .filter(|(similarity, _, _)| *similarity >= min_similarity)
        .max_by(|a, b| a.0.total_cmp(&b.0))
        .map(|(similarity, claim_text, review)| RegistryMatch {
            publisher: if review.publisher.name.is_empty() {
                review.publisher.site
            } else {
                review.publisher.name
            },
            rating: review.textual_rating,
            url: review.url,
            claim_text,
            similarity,
        })
}

impl FactCheckRegistry for FactCheckToolsClient {
    fn lookup<'a>(
        &'a self,
        text: &'a str,
    ) -> Pin<Box<dyn Future<Output = Result<Option<RegistryMatch>, RegistryError>> + Send + 'a>>
    {
        Box::pin(self.lookup_with_retry(text))
    }
}
