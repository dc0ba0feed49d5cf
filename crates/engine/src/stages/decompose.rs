use courtroom_common::types::{DecomposedClaims, SubClaim, TOPIC_CATEGORIES};

use super::{truncate_chars, StageContext};

const SYSTEM: &str = "You are a fact-checking analyst. You break spoken or written claims \
into atomic, independently testable statements and write balanced search queries for them.";

/// Turn a transcript into a core implication plus at most `max_claims`
/// sub-claims. Never fails: an unusable model answer yields a single
/// generic claim built from the transcript itself.
pub async fn decompose(ctx: &StageContext, transcript: &str) -> DecomposedClaims {
    let prompt = build_prompt(transcript, ctx.pipeline.max_claims);

    let mut decomposed = match ctx.decomposer.invoke::<DecomposedClaims>(SYSTEM, &prompt).await {
        Some(d) => d,
        None => {
            tracing::warn!("Decomposition failed, using fallback claim");
            return fallback(transcript);
        }
    };

    decomposed.normalize(ctx.pipeline.max_claims);

    for claim in &decomposed.claims {
        tracing::debug!(
            claim_id = claim.id,
            category = %claim.topic_category,
            claim = %claim.text,
            "Sub-claim extracted"
        );
    }
    tracing::info!(
        claims = decomposed.claims.len(),
        implication = %decomposed.implication,
        "Transcript decomposed"
    );

    decomposed
}

/// Single catch-all claim used when the decomposer gives nothing usable.
pub fn fallback(transcript: &str) -> DecomposedClaims {
    let keywords = truncate_chars(transcript, 50);
    DecomposedClaims {
        implication: "General Verification".into(),
        claims: vec![SubClaim {
            id: 1,
            text: truncate_chars(transcript, 100).to_string(),
            topic_category: "General".into(),
            prosecutor_query: format!(
                "{keywords} AND (false OR debunked) AND (supporting documents OR supporting texts)"
            ),
            defender_query: format!(
                "{keywords} AND (proven OR confirmed) AND (supporting documents OR supporting texts)"
            ),
        }],
    }
}

fn build_prompt(transcript: &str, max_claims: usize) -> String {
    format!(
        r#"Analyze the following transcript and extract verifiable claims with search queries.

TRANSCRIPT: "{transcript}"

1. IMPLICATION
   State the core implication: the one-sentence narrative or conclusion the speaker wants the audience to accept.

2. CLAIMS (at most {max_claims})
   - Each claim is ONE testable fact, at most 30 words.
   - SPLIT a claim when two independent facts are joined by AND.
     "The Supreme Court called the ritual celebratory AND it is ancient" becomes
     "The ritual is mentioned in ancient scriptures" and
     "The Supreme Court classified the ritual as a celebratory activity".
   - KEEP TOGETHER a claim whose second half only gives context (why, how, where) for the first.
   - COMBINE closely related facts that a single search would cover.
   - Preserve names, dates, numbers and non-English terms exactly as spoken.
   - Number the claims 1, 2, 3 and so on.

3. PER CLAIM
   a) topic_category, one of: {categories}
   b) prosecutor_query, looking for CONTRADICTING evidence:
      "<claim keywords> AND (debunked) AND (supporting evidence)"
   c) defender_query, looking for SUPPORTING evidence:
      "<claim keywords> AND (verified) AND (supporting evidence)"
   Keep both queries under 15 words and always include "(supporting evidence)".

Example claim:
  id 1, "Andrew Wakefield's 1998 study proved a vaccine-autism connection", Health/Medicine,
  prosecutor: "Wakefield 1998 vaccine autism study AND (debunked) AND (supporting evidence)",
  defender: "Wakefield 1998 vaccine autism study AND (verified) AND (supporting evidence)""#,
        categories = TOPIC_CATEGORIES.join(", "),
    )
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::invoke::testing::MockService;
    use crate::stages::testing::{context, MockSearch};

    fn claim_json(id: u32, text: &str) -> String {
        format!(
            r#"{{"id": {id}, "claim_text": "{text}", "topic_category": "History/Culture",
                "prosecutor_query": "{text} AND (debunked) AND (supporting evidence)",
                "defender_query": "{text} AND (verified) AND (supporting evidence)"}}"#
        )
    }

    #[tokio::test(start_paused = true)]
    async fn test_decompose_parses_and_caps_claims() {
        let claims: Vec<String> = (1..=7).map(|i| claim_json(i, &format!("claim {i}"))).collect();
        let body = format!(
            r#"```json
{{"implication": "Fireworks are an ancient tradition", "claims": [{}]}}
```"#,
            claims.join(",")
        );
        let llm = Arc::new(MockService::new("m", vec![Ok(body)]));
        let ctx = context(llm.clone(), Arc::new(MockSearch::default()), None);

        let d = decompose(&ctx, "Fireworks were used in 1200 BC.").await;
        assert_eq!(d.implication, "Fireworks are an ancient tradition");
        assert_eq!(d.claims.len(), 5);
        assert_eq!(d.max_id(), 5);

        let prompt = llm.prompts.lock().unwrap()[0].clone();
        assert!(prompt.contains("Fireworks were used in 1200 BC."));
        assert!(prompt.contains("Mythology/Religion"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_decompose_falls_back_on_failure() {
        let llm = Arc::new(MockService::new(
            "m",
            vec![Ok("garbage".into()), Ok("more garbage".into())],
        ));
        let ctx = context(llm, Arc::new(MockSearch::default()), None);
        let transcript = "a".repeat(300);

        let d = decompose(&ctx, &transcript).await;
        assert_eq!(d.implication, "General Verification");
        assert_eq!(d.claims.len(), 1);
        let claim = &d.claims[0];
        assert_eq!(claim.id, 1);
        assert_eq!(claim.text.len(), 100);
        assert_eq!(claim.topic_category, "General");
        assert!(claim
            .prosecutor_query
            .starts_with(&format!("{} AND (false OR debunked)", "a".repeat(50))));
        assert!(claim.defender_query.contains("(proven OR confirmed)"));
    }
}
