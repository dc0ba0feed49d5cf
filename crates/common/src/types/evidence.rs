use std::fmt;

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::output::ModelOutput;

/// Phrasings that mark a fact as unverifiable hearsay unless it also carries
/// a concrete token (digit, proper noun, acronym).
pub const VAGUE_PHRASES: &[&str] = &[
    "experts say",
    "experts believe",
    "experts disagree",
    "studies show",
    "studies suggest",
    "research suggests",
    "research shows",
    "according to sources",
    "according to some",
    "it is believed",
    "it is said",
    "some say",
    "some people say",
    "many people",
    "many believe",
    "reports indicate",
    "reports suggest",
    "scientists agree",
    "it has been claimed",
];

/// Which side of a sub-claim a fact argues: `prosecutor` contradicts, `defender` supports.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "lowercase")]
pub enum Side {
    #[serde(alias = "Prosecutor")]
    Prosecutor,
    #[serde(alias = "Defender")]
    Defender,
}

impl Side {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Prosecutor => "prosecutor",
            Self::Defender => "defender",
        }
    }
}

impl fmt::Display for Side {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A discrete, checkable fact pulled from a search result.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct ExtractedFact {
    pub source_url: String,
    #[schemars(
        description = "Specific fact with numbers/dates/names/citations. NO vague statements"
    )]
    pub key_fact: String,
    #[schemars(description = "Which side this fact supports, judged by its content")]
    pub side: Side,
    #[serde(default, alias = "suggested_trusted_domains")]
    #[schemars(description = "3-5 domain-specific trusted sources for verification")]
    pub suggested_trust_domains: Vec<String>,
}

/// Evidence gathered for one sub-claim.
///
/// Keyed by `claim_id`; the extractor skips any id it has already recorded.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct ClaimEvidence {
    pub claim_id: u32,
    #[serde(default)]
    #[schemars(description = "Top 2 facts contradicting the claim")]
    pub prosecutor_facts: Vec<ExtractedFact>,
    #[serde(default)]
    #[schemars(description = "Top 2 facts supporting the claim")]
    pub defender_facts: Vec<ExtractedFact>,
    #[serde(default)]
    #[schemars(
        description = "Tangential facts that help verify the overall implication, not this specific claim"
    )]
    pub extra_evidence: Vec<ExtractedFact>,
}

impl ModelOutput for ClaimEvidence {}

impl ClaimEvidence {
    pub fn empty(claim_id: u32) -> Self {
        Self {
            claim_id,
            ..Default::default()
        }
    }

    pub fn is_empty(&self) -> bool {
        self.prosecutor_facts.is_empty()
            && self.defender_facts.is_empty()
            && self.extra_evidence.is_empty()
    }

    /// Enforce the extraction contract on model output.
    ///
    /// Pins `claim_id`, drops vague or empty facts, moves each fact to the list
    /// matching its `side`, caps every list at `max_facts` and every
    /// `suggested_trust_domains` at `max_domains`.
    pub fn sanitize(&mut self, claim_id: u32, max_facts: usize, max_domains: usize) {
        self.claim_id = claim_id;

        let pooled: Vec<ExtractedFact> = self
            .prosecutor_facts
            .drain(..)
            .chain(self.defender_facts.drain(..))
            .filter(is_usable)
            .collect();

        for mut fact in pooled {
            fact.suggested_trust_domains.truncate(max_domains);
            match fact.side {
                Side::Prosecutor => self.prosecutor_facts.push(fact),
                Side::Defender => self.defender_facts.push(fact),
            }
        }
        self.prosecutor_facts.truncate(max_facts);
        self.defender_facts.truncate(max_facts);

        self.extra_evidence.retain(is_usable);
        self.extra_evidence.truncate(max_facts);
        for fact in &mut self.extra_evidence {
            fact.suggested_trust_domains.truncate(max_domains);
        }
    }
}

fn is_usable(fact: &ExtractedFact) -> bool {
    !fact.key_fact.trim().is_empty() && !is_vague_fact(&fact.key_fact)
}

/// Whether a fact is hearsay: a deny-listed phrase with nothing concrete to check.
pub fn is_vague_fact(text: &str) -> bool {
    let lower = text.to_lowercase();
    VAGUE_PHRASES.iter().any(|p| lower.contains(p)) && !has_concrete_token(text)
}

/// Capitalized words that never name anything.
const FUNCTION_WORDS: &[&str] = &[
    "I", "It", "Its", "The", "This", "That", "These", "Those", "They", "He", "She", "We", "You",
    "A", "An", "And", "But", "Or", "If", "So", "Some", "Many", "There",
];

/// Digits, acronyms, or capitalized words past the start of a sentence.
/// Single letters and function words never count as proper nouns.
fn has_concrete_token(text: &str) -> bool {
    if text.chars().any(|c| c.is_ascii_digit()) {
        return true;
    }

    let mut sentence_start = true;
    for raw in text.split_whitespace() {
        let word = raw.trim_matches(|c: char| !c.is_alphanumeric());
        let letters = word.chars().filter(|c| c.is_alphabetic()).count();

        if letters >= 2 && word.chars().all(|c| !c.is_alphabetic() || c.is_uppercase()) {
            return true;
        }
        if !sentence_start
            && letters >= 2
            && !FUNCTION_WORDS.contains(&word)
            && word.chars().next().is_some_and(|c| c.is_uppercase())
        {
            return true;
        }
        sentence_start = raw.ends_with(['.', '!', '?', ':']);
    }
    false
}

/// Confidence tier. Ordered `Low < Medium < High`.
#[derive(
    Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, JsonSchema,
)]
pub enum TrustScore {
    Low,
    Medium,
    High,
}

impl TrustScore {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Low => "Low",
            Self::Medium => "Medium",
            Self::High => "High",
        }
    }
}

impl fmt::Display for TrustScore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Which verifier tier resolved a fact.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
pub enum VerificationMethod {
    #[serde(rename = "Tier1-FactCheck")]
    Tier1,
    #[serde(rename = "Tier2-Domain")]
    Tier2,
    #[serde(rename = "Tier3-Consensus-Batch", alias = "Tier3-Consensus")]
    Tier3,
    /// The consensus search itself failed.
    Unverified,
}

impl VerificationMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Tier1 => "Tier1-FactCheck",
            Self::Tier2 => "Tier2-Domain",
            Self::Tier3 => "Tier3-Consensus-Batch",
            Self::Unverified => "Unverified",
        }
    }
}

impl fmt::Display for VerificationMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An extracted fact after the three-tier check.
///
/// `trust_score` plus `verification_method` and `verification_details` form the
/// provenance an auditor can replay.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct VerifiedEvidence {
    pub source_url: String,
    pub key_fact: String,
    pub side: Side,
    pub trust_score: TrustScore,
    pub verification_method: VerificationMethod,
    pub verification_details: String,
    /// Consensus URLs that agreed with this fact (Tier 3 only).
    #[serde(default)]
    pub supporting_urls: Vec<String>,
}

impl VerifiedEvidence {
    pub fn from_fact(
        fact: &ExtractedFact,
        trust_score: TrustScore,
        verification_method: VerificationMethod,
        verification_details: impl Into<String>,
    ) -> Self {
        Self {
            source_url: fact.source_url.clone(),
            key_fact: fact.key_fact.clone(),
            side: fact.side,
            trust_score,
            verification_method,
            verification_details: verification_details.into(),
            supporting_urls: Vec::new(),
        }
    }
}

/// Verified evidence for one sub-claim, split by side.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct VerifiedClaim {
    pub claim_id: u32,
    #[serde(default)]
    pub prosecutor_evidence: Vec<VerifiedEvidence>,
    #[serde(default)]
    pub defender_evidence: Vec<VerifiedEvidence>,
}

impl VerifiedClaim {
    pub fn new(claim_id: u32) -> Self {
        Self {
            claim_id,
            ..Default::default()
        }
    }

    pub fn push(&mut self, evidence: VerifiedEvidence) {
        match evidence.side {
            Side::Prosecutor => self.prosecutor_evidence.push(evidence),
            Side::Defender => self.defender_evidence.push(evidence),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fact(text: &str, side: Side) -> ExtractedFact {
        ExtractedFact {
            source_url: "https://example.com/a".into(),
            key_fact: text.into(),
            side,
            suggested_trust_domains: vec![
                "a.org".into(),
                "b.org".into(),
                "c.org".into(),
                "d.org".into(),
                "e.org".into(),
                "f.org".into(),
            ],
        }
    }

    #[test]
    fn test_vague_fact_detection() {
        assert!(is_vague_fact("Experts say the vaccine is unsafe."));
        assert!(is_vague_fact("studies show it works better than expected"));
        assert!(!is_vague_fact("Experts say the vaccine failed in 2021 trials"));
        assert!(!is_vague_fact("Studies show the WHO approved it"));
        assert!(!is_vague_fact("Experts say that Pfizer withheld trial data"));
        assert!(!is_vague_fact("The bridge opened on 4 July 1995"));
        assert!(is_vague_fact("Experts say I should worry about it"));
        assert!(is_vague_fact("Many people say It is dangerous"));
        assert!(is_vague_fact("Some people say This is proven"));
    }

    #[test]
    fn test_side_rejects_unknown_label() {
        let ok: Side = serde_json::from_str("\"Prosecutor\"").unwrap();
        assert_eq!(ok, Side::Prosecutor);
        assert!(serde_json::from_str::<Side>("\"neutral\"").is_err());
        assert_eq!(serde_json::to_string(&Side::Defender).unwrap(), "\"defender\"");
    }

    #[test]
    fn test_sanitize_moves_drops_and_caps() {
        let mut ev = ClaimEvidence {
            claim_id: 99,
            prosecutor_facts: vec![
                fact("Census 2011 counted 1.2 billion residents", Side::Defender),
                fact("Experts say it is false", Side::Prosecutor),
                fact("The ministry denied it on 3 March 2020", Side::Prosecutor),
            ],
            defender_facts: vec![
                fact("Reuters confirmed the figure in 2012", Side::Defender),
                fact("Official gazette notice 41 lists it", Side::Defender),
            ],
            extra_evidence: vec![fact("", Side::Defender)],
        };

        ev.sanitize(2, 2, 5);

        assert_eq!(ev.claim_id, 2);
        assert_eq!(ev.prosecutor_facts.len(), 1);
        assert_eq!(ev.defender_facts.len(), 2);
        assert!(ev.defender_facts[0].key_fact.starts_with("Census"));
        assert!(ev.extra_evidence.is_empty());
        assert!(ev
            .prosecutor_facts
            .iter()
            .chain(&ev.defender_facts)
            .all(|f| f.suggested_trust_domains.len() == 5));
    }

    #[test]
    fn test_trust_score_order_and_method_names() {
        assert!(TrustScore::High > TrustScore::Medium);
        assert!(TrustScore::Medium > TrustScore::Low);
        assert_eq!(
            serde_json::to_string(&VerificationMethod::Tier3).unwrap(),
            "\"Tier3-Consensus-Batch\""
        );
        let m: VerificationMethod = serde_json::from_str("\"Tier2-Domain\"").unwrap();
        assert_eq!(m, VerificationMethod::Tier2);
    }

    #[test]
    fn test_verified_claim_push_routes_by_side() {
        let mut vc = VerifiedClaim::new(1);
        let f = fact("Gazette 41", Side::Prosecutor);
        vc.push(VerifiedEvidence::from_fact(
            &f,
            TrustScore::High,
            VerificationMethod::Tier2,
            "Domain Trust: High, Matches Suggested: false",
        ));
        assert_eq!(vc.prosecutor_evidence.len(), 1);
        assert!(vc.defender_evidence.is_empty());
    }
}
