//! Three-tier verification: fact-check registry, then domain trust, then a
//! batched web-consensus vote. Each fact stops at the first tier that
//! resolves it.

use std::collections::HashMap;
use std::fmt::Write;

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use courtroom_common::types::{
    ClaimEvidence, DecomposedClaims, ExtractedFact, Side, TrustScore, VerificationMethod,
    VerifiedClaim, VerifiedEvidence,
};
use courtroom_common::ModelOutput;

use super::{truncate_chars, StageContext};
use crate::search::SearchResult;

const SYSTEM: &str = "You are a consensus analyst. You count how many independent sources \
support or contradict a claim, strictly and without guessing.";

const CONSENSUS_SNIPPET_CHARS: usize = 400;

/// Model verdict on one fact's consensus search results.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct ConsensusAnalysis {
    #[schemars(description = "The ID given for the evidence item")]
    pub evidence_id: String,
    #[serde(default)]
    #[schemars(description = "Sources that SUPPORT the original claim")]
    pub supports: u32,
    #[serde(default)]
    #[schemars(description = "Sources that CONTRADICT the original claim")]
    pub contradicts: u32,
    #[serde(default)]
    #[schemars(description = "Sources that are unclear or irrelevant")]
    pub neutral: u32,
    #[schemars(description = "High if 70%+ of sources agree, Medium if 50-69%, Low otherwise")]
    pub confidence: TrustScore,
    #[serde(default)]
    #[schemars(description = "Two or three sentences explaining the count")]
    pub reasoning: String,
    #[serde(default)]
    #[schemars(description = "URLs of the sources that voted with the majority")]
    pub majority_urls: Vec<String>,
}

impl ModelOutput for ConsensusAnalysis {
    fn check(&self) -> Result<(), String> {
        if self.evidence_id.trim().is_empty() {
            return Err("evidence_id is empty".into());
        }
        Ok(())
    }
}

impl ConsensusAnalysis {
    fn failed() -> Self {
        Self {
            evidence_id: String::new(),
            supports: 0,
            contradicts: 0,
            neutral: 0,
            confidence: TrustScore::Low,
            reasoning: "Batch analysis failed".into(),
            majority_urls: Vec::new(),
        }
    }
}

/// A fact waiting for its Tier 3 batch.
struct PendingConsensus<'a> {
    evidence_id: String,
    claim_id: u32,
    claim_text: &'a str,
    fact: &'a ExtractedFact,
    results: Vec<SearchResult>,
}

/// Verify every prosecutor and defender fact. Extras are not verified.
///
/// Evidence for a claim id missing from `decomposed` is an invariant
/// violation: it panics in debug builds and is skipped in release.
pub async fn verify(
    ctx: &StageContext,
    decomposed: &DecomposedClaims,
    evidence: &[ClaimEvidence],
) -> Vec<VerifiedClaim> {
    let mut verified: Vec<VerifiedClaim> = Vec::new();
    let mut queue: Vec<PendingConsensus<'_>> = Vec::new();
    let mut counter = 0usize;

    for claim_evidence in evidence {
        let claim = decomposed.claim(claim_evidence.claim_id);
        debug_assert!(
            claim.is_some(),
            "evidence references unknown claim {}",
            claim_evidence.claim_id
        );
        let Some(claim) = claim else {
            tracing::error!(claim_id = claim_evidence.claim_id, "Evidence for unknown claim, skipping");
            continue;
        };

        let mut out = VerifiedClaim::new(claim.id);
        let facts = claim_evidence
            .prosecutor_facts
            .iter()
            .chain(claim_evidence.defender_facts.iter());

        for fact in facts {
            if let Some(resolved) = resolve_cheap(ctx, fact).await {
                out.push(resolved);
                continue;
            }

            counter += 1;
            let evidence_id = format!("ev_{}_{}_{}", claim.id, fact.side, counter);
            match consensus_search(ctx, &fact.key_fact).await {
                Some(results) => {
                    tracing::debug!(claim_id = claim.id, evidence_id = %evidence_id, "Queued for Tier 3");
                    queue.push(PendingConsensus {
                        evidence_id,
                        claim_id: claim.id,
                        claim_text: &claim.text,
                        fact,
                        results,
                    });
                }
                None => {
                    metrics::counter!("verifier.tier_hits", "tier" => "unverified").increment(1);
                    out.push(VerifiedEvidence::from_fact(
                        fact,
                        TrustScore::Low,
                        VerificationMethod::Unverified,
                        "Consensus search failed",
                    ));
                }
            }
        }
        verified.push(out);
    }

    if !queue.is_empty() {
        let analyses = run_batches(ctx, &queue).await;
        for item in &queue {
            let analysis = analyses
                .get(&item.evidence_id)
                .cloned()
                .unwrap_or_else(ConsensusAnalysis::failed);
            let (trust, details) = consensus_trust(item.fact.side, &analysis);
            metrics::counter!("verifier.tier_hits", "tier" => "tier3").increment(1);

            let mut resolved = VerifiedEvidence::from_fact(
                item.fact,
                trust,
                VerificationMethod::Tier3,
                details,
            );
            resolved.supporting_urls = analysis.majority_urls;

            if let Some(target) = verified.iter_mut().find(|v| v.claim_id == item.claim_id) {
                target.push(resolved);
            }
        }
    }

    tracing::info!(
        claims = verified.len(),
        tier3 = queue.len(),
        "Verification complete"
    );
    verified
}

/// Tiers 1 and 2. `None` means the fact needs a consensus vote.
async fn resolve_cheap(ctx: &StageContext, fact: &ExtractedFact) -> Option<VerifiedEvidence> {
    if let Some(found) = ctx.registry_lookup(&fact.key_fact).await {
        metrics::counter!("verifier.tier_hits", "tier" => "tier1").increment(1);
        tracing::debug!(publisher = %found.publisher, rating = %found.rating, "Tier 1 match");
        return Some(VerifiedEvidence::from_fact(
            fact,
            TrustScore::High,
            VerificationMethod::Tier1,
            found.details(),
        ));
    }

    let domain_trust = ctx.catalog.trust_level(&fact.source_url);
    let suggested = ctx
        .catalog
        .matches_suggested(&fact.source_url, &fact.suggested_trust_domains);
    if domain_trust == TrustScore::High || suggested {
        metrics::counter!("verifier.tier_hits", "tier" => "tier2").increment(1);
        return Some(VerifiedEvidence::from_fact(
            fact,
            domain_trust,
            VerificationMethod::Tier2,
            format!("Domain Trust: {domain_trust}, Matches Suggested: {suggested}"),
        ));
    }

    None
}

/// Consensus search with every excluded domain removed. `None` when the
/// search failed or came back empty.
async fn consensus_search(ctx: &StageContext, fact: &str) -> Option<Vec<SearchResult>> {
    let query = consensus_query(
        truncate_chars(fact, ctx.pipeline.consensus_query_chars),
        &ctx.catalog.consensus_exclusions(),
    );

    let results = ctx
        .try_search(&query, ctx.pipeline.consensus_results)
        .await
        .ok()
        .filter(|r| !r.is_empty())?;

    let retrieved = results.len();
    let kept: Vec<SearchResult> = results
        .into_iter()
        .filter(|r| !ctx.catalog.is_untrusted(&r.url))
        .collect();
    tracing::debug!(retrieved, kept = kept.len(), "Consensus search");
    Some(kept)
}

fn consensus_query(fact: &str, exclusions: &[String]) -> String {
    let mut query = format!("is it true that \"{fact}\"");
    for domain in exclusions {
        let _ = write!(query, " -site:{domain}");
    }
    query
}

async fn run_batches(
    ctx: &StageContext,
    queue: &[PendingConsensus<'_>],
) -> HashMap<String, ConsensusAnalysis> {
    let size = ctx.pipeline.consensus_batch_size.max(1);
    let batches = queue.len().div_ceil(size);
    let mut analyses = HashMap::new();

    for (index, batch) in queue.chunks(size).enumerate() {
        let prompt = build_batch_prompt(batch);
        let answered = ctx.analyzer.invoke_array::<ConsensusAnalysis>(SYSTEM, &prompt).await;
        tracing::info!(
            batch = index + 1,
            batches,
            items = batch.len(),
            answered = answered.len(),
            "Consensus batch analysed"
        );
        for analysis in answered {
            if batch.iter().any(|item| item.evidence_id == analysis.evidence_id) {
                analyses.insert(analysis.evidence_id.clone(), analysis);
            }
        }
    }
    analyses
}

/// Trust for a Tier 3 fact. Counts are relative to the original sub-claim,
/// so a prosecutor fact gains trust when the majority contradicts the claim
/// and a defender fact when the majority supports it. Ties are Low.
pub fn consensus_trust(side: Side, analysis: &ConsensusAnalysis) -> (TrustScore, String) {
    let (s, c, reasoning) = (analysis.supports, analysis.contradicts, &analysis.reasoning);
    match side {
        Side::Prosecutor if c > s => (
            analysis.confidence,
            format!("Consensus: {c} contradict claim. {reasoning}"),
        ),
        Side::Prosecutor if s > c => (
            TrustScore::Low,
            format!("Consensus AGAINST prosecutor: {s} support claim. {reasoning}"),
        ),
        Side::Defender if s > c => (
            analysis.confidence,
            format!("Consensus: {s} support claim. {reasoning}"),
        ),
        Side::Defender if c > s => (
            TrustScore::Low,
            format!("Consensus AGAINST defender: {c} contradict claim. {reasoning}"),
        ),
        _ => (TrustScore::Low, format!("No clear consensus. {reasoning}")),
    }
}

fn build_batch_prompt(batch: &[PendingConsensus<'_>]) -> String {
    let rule = "=".repeat(70);
    let mut items = String::new();

    for (i, item) in batch.iter().enumerate() {
        let _ = write!(
            items,
            "\n{rule}\nEVIDENCE #{} (ID: {}, Side: {})\n{rule}\nORIGINAL CLAIM: {}\nFACT TO VERIFY: {}\n\n",
            i + 1,
            item.evidence_id,
            item.fact.side,
            item.claim_text,
            item.fact.key_fact,
        );
        if item.results.is_empty() {
            items.push_str("SEARCH RESULTS: None available\n");
            continue;
        }
        let _ = writeln!(items, "SEARCH RESULTS ({} sources):", item.results.len());
        for (j, result) in item.results.iter().enumerate() {
            let _ = write!(
                items,
                "\n--- SOURCE {} ---\nTitle: {}\nURL: {}\nContent: {}\n",
                j + 1,
                result.title,
                result.url,
                truncate_chars(&result.snippet, CONSENSUS_SNIPPET_CHARS),
            );
        }
    }

    format!(
        r#"Analyze web consensus for {count} evidence items in one batch.
{items}
For EACH evidence item, read its search results and report:
- supports: sources that SUPPORT the ORIGINAL CLAIM
- contradicts: sources that CONTRADICT the ORIGINAL CLAIM
- neutral: sources that are unclear, ambiguous or irrelevant
- confidence: "High" if 70% or more of the sources agree, "Medium" for 50-69%, "Low" below 50% or when results conflict
- reasoning: two or three sentences
- majority_urls: only the URLs that voted with the majority

Prosecutor evidence argues AGAINST the original claim; defender evidence argues FOR it.
Always count relative to the original claim, never relative to the evidence side.

Return a JSON array with exactly {count} objects, one per evidence item, each carrying its evidence_id.
The three counts must add up to the number of search results for that item. Count only clear support or contradiction."#,
        count = batch.len(),
    )
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;
    use std::sync::Arc;

    use courtroom_common::types::SubClaim;

    use super::*;
    use crate::invoke::testing::MockService;
    use crate::registry::RegistryMatch;
    use crate::stages::testing::{context, hit, MockRegistry, MockSearch};

    fn fact(url: &str, text: &str, side: Side) -> ExtractedFact {
        ExtractedFact {
            source_url: url.into(),
            key_fact: text.into(),
            side,
            suggested_trust_domains: vec![],
        }
    }

    fn analysis(supports: u32, contradicts: u32, confidence: TrustScore) -> ConsensusAnalysis {
        ConsensusAnalysis {
            evidence_id: "ev_1_prosecutor_1".into(),
            supports,
            contradicts,
            neutral: 0,
            confidence,
            reasoning: "r".into(),
            majority_urls: vec![],
        }
    }

    fn decomposed() -> DecomposedClaims {
        DecomposedClaims {
            implication: "i".into(),
            claims: vec![SubClaim {
                id: 1,
                text: "Vaccines cause autism".into(),
                topic_category: "Health/Medicine".into(),
                prosecutor_query: "p".into(),
                defender_query: "d".into(),
            }],
        }
    }

    #[test]
    fn test_polarity() {
        let a = analysis(2, 7, TrustScore::High);
        let (pros, details) = consensus_trust(Side::Prosecutor, &a);
        assert!(pros >= a.confidence);
        assert_eq!(details, "Consensus: 7 contradict claim. r");
        assert_eq!(consensus_trust(Side::Defender, &a).0, TrustScore::Low);

        let a = analysis(6, 1, TrustScore::Medium);
        assert_eq!(consensus_trust(Side::Defender, &a).0, TrustScore::Medium);
        let (pros, details) = consensus_trust(Side::Prosecutor, &a);
        assert_eq!(pros, TrustScore::Low);
        assert!(details.starts_with("Consensus AGAINST prosecutor: 6 support claim."));
    }

    #[test]
    fn test_tie_is_low() {
        let a = analysis(3, 3, TrustScore::High);
        for side in [Side::Prosecutor, Side::Defender] {
            let (trust, details) = consensus_trust(side, &a);
            assert_eq!(trust, TrustScore::Low);
            assert!(details.starts_with("No clear consensus."));
        }
    }

    #[test]
    fn test_consensus_query_excludes_domains() {
        let q = consensus_query("MMR is safe", &["reddit.com".into(), "quora.com".into()]);
        assert_eq!(q, r#"is it true that "MMR is safe" -site:reddit.com -site:quora.com"#);
    }

    #[tokio::test(start_paused = true)]
    async fn test_tier1_wins_over_trusted_domain() {
        let registry = MockRegistry {
            matches: vec![(
                "Wakefield".into(),
                RegistryMatch {
                    publisher: "Snopes".into(),
                    rating: "False".into(),
                    url: "https://snopes.com/w".into(),
                    claim_text: "Wakefield".into(),
                    similarity: 0.9,
                },
            )],
        };
        let search = Arc::new(MockSearch::default());
        let ctx = context(
            Arc::new(MockService::new("m", vec![])),
            search.clone(),
            Some(Arc::new(registry)),
        );
        let evidence = vec![ClaimEvidence {
            claim_id: 1,
            prosecutor_facts: vec![fact("https://www.who.int/x", "Wakefield's 1998 paper was retracted", Side::Prosecutor)],
            defender_facts: vec![fact("https://www.who.int/y", "The WHO lists 12 vaccine studies", Side::Defender)],
            ..Default::default()
        }];

        let verified = verify(&ctx, &decomposed(), &evidence).await;

        let pros = &verified[0].prosecutor_evidence[0];
        assert_eq!(pros.verification_method, VerificationMethod::Tier1);
        assert_eq!(pros.verification_details, "MATCH: Snopes rates this 'False' (https://snopes.com/w)");
        let def = &verified[0].defender_evidence[0];
        assert_eq!(def.verification_method, VerificationMethod::Tier2);
        assert_eq!(def.trust_score, TrustScore::High);
        assert_eq!(def.verification_details, "Domain Trust: High, Matches Suggested: false");
        assert!(search.queries.lock().unwrap().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_tier3_batches_and_applies_polarity() {
        let exclusions = context(
            Arc::new(MockService::new("m", vec![])),
            Arc::new(MockSearch::default()),
            None,
        )
        .catalog
        .consensus_exclusions();
        let pros_text = "Wakefield's 1998 paper was retracted in 2010";
        let def_text = "A 1998 Lancet paper by Wakefield reported 12 children";

        let mut results = HashMap::new();
        results.insert(
            consensus_query(pros_text, &exclusions),
            vec![hit("https://news.example.com/a", "retracted"), hit("https://www.reddit.com/r/x", "lol")],
        );
        results.insert(
            consensus_query(def_text, &exclusions),
            vec![hit("https://news.example.com/b", "12 children")],
        );
        let search = Arc::new(MockSearch {
            results,
            ..Default::default()
        });

        let answer = r#"[
            {"evidence_id": "ev_1_prosecutor_1", "supports": 1, "contradicts": 8, "neutral": 1,
             "confidence": "High", "reasoning": "Retraction is well documented.",
             "majority_urls": ["https://news.example.com/a"]},
            {"evidence_id": "ev_1_defender_2", "supports": 1, "contradicts": 8, "neutral": 1,
             "confidence": "High", "reasoning": "Same sources."},
            {"evidence_id": "bogus", "supports": 9, "contradicts": 0, "neutral": 0, "confidence": "High"}
        ]"#;
        let llm = Arc::new(MockService::new("m", vec![Ok(answer.into())]));
        let ctx = context(llm.clone(), search, None);
        let evidence = vec![ClaimEvidence {
            claim_id: 1,
            prosecutor_facts: vec![fact("https://blog.example.net/1", pros_text, Side::Prosecutor)],
            defender_facts: vec![fact("https://blog.example.net/2", def_text, Side::Defender)],
            ..Default::default()
        }];

        let verified = verify(&ctx, &decomposed(), &evidence).await;

        assert_eq!(llm.calls(), 1);
        let prompt = llm.prompts.lock().unwrap()[0].clone();
        assert!(prompt.contains("ORIGINAL CLAIM: Vaccines cause autism"));
        assert!(!prompt.contains("reddit.com/r/x"));

        let pros = &verified[0].prosecutor_evidence[0];
        assert_eq!(pros.verification_method, VerificationMethod::Tier3);
        assert_eq!(pros.trust_score, TrustScore::High);
        assert_eq!(pros.supporting_urls, vec!["https://news.example.com/a".to_string()]);
        let def = &verified[0].defender_evidence[0];
        assert_eq!(def.trust_score, TrustScore::Low);
        assert!(def.verification_details.starts_with("Consensus AGAINST defender"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_failed_search_and_missing_batch_item() {
        let ctx = context(
            Arc::new(MockService::new("m", vec![])),
            Arc::new(MockSearch::default()),
            None,
        );
        let evidence = vec![ClaimEvidence {
            claim_id: 1,
            prosecutor_facts: vec![fact("https://blog.example.net/1", "Retracted in 2010", Side::Prosecutor)],
            ..Default::default()
        }];

        let verified = verify(&ctx, &decomposed(), &evidence).await;
        let ev = &verified[0].prosecutor_evidence[0];
        assert_eq!(ev.verification_method, VerificationMethod::Unverified);
        assert_eq!(ev.trust_score, TrustScore::Low);
        assert_eq!(ev.verification_details, "Consensus search failed");

        let failed = consensus_trust(Side::Defender, &ConsensusAnalysis::failed());
        assert_eq!(failed, (TrustScore::Low, "No clear consensus. Batch analysis failed".to_string()));
    }
}
