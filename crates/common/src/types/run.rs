use serde::{Deserialize, Serialize};

use super::claim::DecomposedClaims;
use super::evidence::{ClaimEvidence, VerifiedClaim};
use super::verdict::FinalVerdict;
use crate::ids::CaseId;

/// Pipeline progress as published to pollers.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    Pending,
    Decomposing,
    Extracting,
    Promoting,
    Verifying,
    Judging,
    Archiving,
    /// Set only once the judge has returned a verdict.
    Completed,
    /// The caller dropped or aborted the run.
    Abandoned,
}

impl RunStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Abandoned)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Decomposing => "decomposing",
            Self::Extracting => "extracting",
            Self::Promoting => "promoting",
            Self::Verifying => "verifying",
            Self::Judging => "judging",
            Self::Archiving => "archiving",
            Self::Completed => "completed",
            Self::Abandoned => "abandoned",
        }
    }
}

/// Mutable accumulator threaded through one run. Never shared across runs.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct RunState {
    pub transcript: String,
    #[serde(default)]
    pub decomposed: Option<DecomposedClaims>,
    #[serde(default)]
    pub claim_evidence: Vec<ClaimEvidence>,
    #[serde(default)]
    pub verified: Vec<VerifiedClaim>,
    #[serde(default)]
    pub final_verdict: Option<FinalVerdict>,
    #[serde(default)]
    pub case_id: Option<CaseId>,
}

impl RunState {
    pub fn new(transcript: impl Into<String>, case_id: Option<CaseId>) -> Self {
        Self {
            transcript: transcript.into(),
            case_id,
            ..Default::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_terminal_states() {
        assert!(RunStatus::Completed.is_terminal());
        assert!(RunStatus::Abandoned.is_terminal());
        assert!(!RunStatus::Judging.is_terminal());
        assert_eq!(RunStatus::Verifying.as_str(), "verifying");
    }

}
