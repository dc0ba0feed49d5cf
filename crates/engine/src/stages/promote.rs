use std::collections::HashSet;
use std::fmt::Write;

use courtroom_common::types::{ClaimEvidence, DecomposedClaims, ExtractedFact, PromotedClaims};

use super::{truncate_chars, StageContext};

const SYSTEM: &str = "You are a lead investigator. You turn promising side leads into \
new, testable claims.";

/// Top the claim list up to `min_claims` by promoting tangential extra
/// facts into new sub-claims. Returns how many claims were added; on any
/// failure the claim list is left unchanged.
pub async fn promote(
    ctx: &StageContext,
    decomposed: &mut DecomposedClaims,
    evidence: &[ClaimEvidence],
) -> usize {
    let wanted = ctx
        .pipeline
        .min_claims
        .saturating_sub(decomposed.claims.len());
    if wanted == 0 {
        tracing::debug!(claims = decomposed.claims.len(), "Enough claims, nothing to promote");
        return 0;
    }

    let extras = unique_extras(evidence, ctx.pipeline.dedup_key_chars);
    if extras.is_empty() {
        tracing::info!("No extra evidence to promote");
        return 0;
    }

    let next_id = decomposed.max_id() + 1;
    let prompt = build_prompt(&decomposed.implication, &extras, wanted, next_id);

    let promoted = match ctx.decomposer.invoke::<PromotedClaims>(SYSTEM, &prompt).await {
        Some(p) if !p.selected_claims.is_empty() => p.selected_claims,
        _ => {
            tracing::warn!("Lead promotion failed, continuing with original claims");
            return 0;
        }
    };

    let mut added = 0;
    for (offset, mut claim) in promoted
        .into_iter()
        .filter(|c| !c.text.trim().is_empty())
        .take(wanted)
        .enumerate()
    {
        claim.id = next_id + offset as u32;
        tracing::info!(claim_id = claim.id, claim = %claim.text, "Extra evidence promoted to claim");
        decomposed.claims.push(claim);
        added += 1;
    }

    tracing::info!(
        candidates = extras.len(),
        wanted,
        added,
        "Lead promotion complete"
    );
    added
}

/// Extras across all claims, deduplicated on a lowercased prefix of the fact.
fn unique_extras(evidence: &[ClaimEvidence], key_chars: usize) -> Vec<&ExtractedFact> {
    let mut seen = HashSet::new();
    evidence
        .iter()
        .flat_map(|e| e.extra_evidence.iter())
        .filter(|fact| seen.insert(truncate_chars(&fact.key_fact.to_lowercase(), key_chars).to_string()))
        .collect()
}

fn build_prompt(implication: &str, extras: &[&ExtractedFact], wanted: usize, next_id: u32) -> String {
    let mut listing = String::new();
    for (i, fact) in extras.iter().enumerate() {
        let _ = writeln!(
            listing,
            "{}. [{}...] {}",
            i + 1,
            truncate_chars(&fact.source_url, 50),
            fact.key_fact
        );
    }

    format!(
        r#"You have {count} extra evidence items found tangentially during fact-checking.
Select the {wanted} most important ones and turn each into a new claim for investigation.

IMPLICATION BEING VERIFIED: "{implication}"

EXTRA EVIDENCE ITEMS:
{listing}
For each selected item write a clear, testable claim with a topic category and two queries:
  prosecutor_query: "<keywords> AND (debunked) AND (supporting evidence)"
  defender_query: "<keywords> AND (verified) AND (supporting evidence)"
Number the new claims sequentially starting from {next_id}.
Create exactly {wanted} new claims."#,
        count = extras.len(),
    )
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use courtroom_common::types::{Side, SubClaim};

    use super::*;
    use crate::invoke::testing::MockService;
    use crate::stages::testing::{context, MockSearch};

    fn claim(id: u32) -> SubClaim {
        SubClaim {
            id,
            text: format!("claim {id}"),
            topic_category: "General".into(),
            prosecutor_query: "p".into(),
            defender_query: "d".into(),
        }
    }

    fn extra(fact: &str) -> ExtractedFact {
        ExtractedFact {
            source_url: "https://example.org/a-very-long-path-that-goes-on-and-on-and-on-forever".into(),
            key_fact: fact.into(),
            side: Side::Defender,
            suggested_trust_domains: vec![],
        }
    }

    fn evidence() -> Vec<ClaimEvidence> {
        vec![
            ClaimEvidence {
                claim_id: 1,
                extra_evidence: vec![extra("Delhi banned firecrackers in 2018"), extra("Sivakasi makes 90% of fireworks")],
                ..Default::default()
            },
            ClaimEvidence {
                claim_id: 2,
                extra_evidence: vec![extra("DELHI banned firecrackers in 2018"), extra("China invented gunpowder in 850 CE")],
                ..Default::default()
            },
        ]
    }

    fn promoted(ids: &[u32]) -> String {
        let claims: Vec<String> = ids
            .iter()
            .map(|id| {
                format!(
                    r#"{{"id": {id}, "claim_text": "promoted {id}", "topic_category": "Law/Policy",
                        "prosecutor_query": "q", "defender_query": "q"}}"#
                )
            })
            .collect();
        format!(r#"{{"selected_claims": [{}]}}"#, claims.join(","))
    }

    #[tokio::test(start_paused = true)]
    async fn test_promotes_exactly_the_shortfall() {
        let llm = Arc::new(MockService::new("m", vec![Ok(promoted(&[1, 1, 7, 8]))]));
        let ctx = context(llm.clone(), Arc::new(MockSearch::default()), None);
        let mut decomposed = DecomposedClaims {
            implication: "Fireworks are ancient".into(),
            claims: vec![claim(1), claim(2), claim(3)],
        };

        let added = promote(&ctx, &mut decomposed, &evidence()).await;

        assert_eq!(added, 2);
        let ids: Vec<u32> = decomposed.claims.iter().map(|c| c.id).collect();
        assert_eq!(ids, vec![1, 2, 3, 4, 5]);

        let prompt = llm.prompts.lock().unwrap()[0].clone();
        assert!(prompt.contains("You have 3 extra evidence items"));
        assert!(prompt.contains("starting from 4"));
        assert!(prompt.contains("[https://example.org/a-very-long-path-that-goes-on-...]"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_failure_leaves_claims_unchanged() {
        let llm = Arc::new(MockService::new("m", vec![Ok("{}".into()), Ok("[]".into())]));
        let ctx = context(llm, Arc::new(MockSearch::default()), None);
        let mut decomposed = DecomposedClaims {
            implication: "x".into(),
            claims: vec![claim(1)],
        };

        assert_eq!(promote(&ctx, &mut decomposed, &evidence()).await, 0);
        assert_eq!(decomposed.claims.len(), 1);
    }

    #[tokio::test]
    async fn test_no_extras_no_call() {
        let llm = Arc::new(MockService::new("m", vec![]));
        let ctx = context(llm.clone(), Arc::new(MockSearch::default()), None);
        let mut decomposed = DecomposedClaims {
            implication: "x".into(),
            claims: vec![claim(1)],
        };

        assert_eq!(promote(&ctx, &mut decomposed, &[ClaimEvidence::empty(1)]).await, 0);
        assert_eq!(llm.calls(), 0);
    }
}
