use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::output::ModelOutput;

/// Topic categories a sub-claim may be tagged with.
pub const TOPIC_CATEGORIES: &[&str] = &[
    "Science/Technology",
    "Law/Policy",
    "Politics/Geopolitics",
    "Mythology/Religion",
    "History/Culture",
    "Health/Medicine",
    "Environment/Climate",
    "Economy/Business",
    "Education/Academia",
    "Social Issues",
    "Ethics/Philosophy",
    "Media/Entertainment",
    "News/Viral",
    "General",
];

/// One atomic, testable proposition decomposed from the transcript.
///
/// Immutable once created. Ids are small positive integers unique within a run.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct SubClaim {
    pub id: u32,
    /// The proposition, with names, dates and numbers kept verbatim.
    #[serde(alias = "claim_text")]
    pub text: String,
    #[schemars(description = "Topic category for this claim")]
    pub topic_category: String,
    #[schemars(
        description = "Search query to find evidence DISPROVING this claim, ending with the 'supporting evidence' phrase"
    )]
    pub prosecutor_query: String,
    #[schemars(
        description = "Search query to find evidence SUPPORTING this claim, ending with the 'supporting evidence' phrase"
    )]
    pub defender_query: String,
}

/// Decomposer output: the core implication and its sub-claims.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct DecomposedClaims {
    #[schemars(description = "The core narrative or hidden conclusion of the text")]
    pub implication: String,
    #[schemars(description = "List of atomic, de-duplicated claims (max 5)")]
    pub claims: Vec<SubClaim>,
}

impl DecomposedClaims {
    /// Highest claim id in use, or 0 when there are no claims.
    pub fn max_id(&self) -> u32 {
        self.claims.iter().map(|c| c.id).max().unwrap_or(0)
    }

    pub fn claim(&self, id: u32) -> Option<&SubClaim> {
        self.claims.iter().find(|c| c.id == id)
    }

    /// Truncate to `max` claims and re-number 1..n when ids are duplicated or zero.
    pub fn normalize(&mut self, max: usize) {
        self.claims.truncate(max);

        let mut seen = std::collections::HashSet::new();
        let ids_ok = self.claims.iter().all(|c| c.id > 0 && seen.insert(c.id));
        if !ids_ok {
            for (i, claim) in self.claims.iter_mut().enumerate() {
                claim.id = i as u32 + 1;
            }
        }
    }
}

impl ModelOutput for DecomposedClaims {
    fn check(&self) -> Result<(), String> {
        if self.implication.trim().is_empty() {
            return Err("implication is empty".into());
        }
        if self.claims.is_empty() {
            return Err("no claims".into());
        }
        if let Some(c) = self.claims.iter().find(|c| c.text.trim().is_empty()) {
            return Err(format!("claim {} has empty text", c.id));
        }
        Ok(())
    }
}

/// Lead promoter output: tangential facts turned into new sub-claims.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct PromotedClaims {
    #[schemars(description = "New claims built from the selected extra facts")]
    pub selected_claims: Vec<SubClaim>,
}

impl ModelOutput for PromotedClaims {}
