use std::fmt;

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use super::evidence::VerifiedEvidence;
use crate::output::ModelOutput;

/// Per-sub-claim outcome.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
pub enum ClaimStatus {
    /// Supporting evidence is stronger and higher-trust.
    Verified,
    /// Contradicting evidence dominates on trust.
    Debunked,
    Unclear,
}

impl fmt::Display for ClaimStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Verified => "Verified",
            Self::Debunked => "Debunked",
            Self::Unclear => "Unclear",
        };
        f.write_str(s)
    }
}

/// Verdict on the core implication.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
pub enum OverallVerdict {
    True,
    False,
    #[serde(rename = "Partially True")]
    PartiallyTrue,
    Unverified,
}

impl fmt::Display for OverallVerdict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::True => "True",
            Self::False => "False",
            Self::PartiallyTrue => "Partially True",
            Self::Unverified => "Unverified",
        };
        f.write_str(s)
    }
}

/// Judge output for one sub-claim.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct ClaimAnalysis {
    pub claim_id: u32,
    #[serde(default)]
    pub claim_text: String,
    pub status: ClaimStatus,
    #[schemars(
        description = "Crystal clear explanation (150-250 words) weighing both sides, citing facts, trust tiers and methods"
    )]
    pub detailed_paragraph: String,
    #[serde(default)]
    #[schemars(description = "Up to 2 verified facts contradicting the claim")]
    pub prosecutor_evidence: Vec<VerifiedEvidence>,
    #[serde(default)]
    #[schemars(description = "Up to 2 verified facts supporting the claim")]
    pub defender_evidence: Vec<VerifiedEvidence>,
}

/// Terminal artifact of a run.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct FinalVerdict {
    pub overall_verdict: OverallVerdict,
    #[schemars(
        description = "Long detailed paragraph (200-300 words) connecting the implication to the claims, addressing selective use of true facts"
    )]
    pub implication_connection: String,
    pub claim_analyses: Vec<ClaimAnalysis>,
}

impl FinalVerdict {
    pub fn analysis(&self, claim_id: u32) -> Option<&ClaimAnalysis> {
        self.claim_analyses.iter().find(|a| a.claim_id == claim_id)
    }
}

impl ModelOutput for FinalVerdict {
    fn check(&self) -> Result<(), String> {
        if self.implication_connection.trim().is_empty() {
            return Err("implication_connection is empty".into());
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_verdict_labels() {
        let v: OverallVerdict = serde_json::from_str("\"Partially True\"").unwrap();
        assert_eq!(v, OverallVerdict::PartiallyTrue);
        assert_eq!(v.to_string(), "Partially True");
        assert!(serde_json::from_str::<OverallVerdict>("\"Mostly True\"").is_err());
        assert!(serde_json::from_str::<ClaimStatus>("\"Debunked\"").is_ok());
    }

    #[test]
    fn test_evidence_defaults_when_missing() {
        let raw = r#"{
            "overall_verdict": "False",
            "implication_connection": "The narrative does not hold.",
            "claim_analyses": [{
                "claim_id": 1,
                "claim_text": "A",
                "status": "Debunked",
                "detailed_paragraph": "Because."
            }]
        }"#;
        let v: FinalVerdict = serde_json::from_str(raw).unwrap();
        assert!(v.check().is_ok());
        assert!(v.analysis(1).unwrap().prosecutor_evidence.is_empty());
        assert!(v.analysis(2).is_none());
    }
}
