use std::fmt::Write;

use courtroom_common::types::{ClaimEvidence, DecomposedClaims, SubClaim};

use super::{truncate_chars, StageContext};
use crate::search::SearchResult;

const SYSTEM: &str = "You are an evidence clerk. You read search results and pull out \
specific, checkable facts. You never invent or stretch evidence.";

const MAX_FACTS_PER_SIDE: usize = 2;
const MAX_SUGGESTED_DOMAINS: usize = 5;

/// Whether the extractor also collects tangential facts for the lead promoter.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ExtractMode {
    Standard,
    WithExtras,
}

impl ExtractMode {
    fn as_str(&self) -> &'static str {
        match self {
            Self::Standard => "standard",
            Self::WithExtras => "with_extras",
        }
    }
}

/// Gather adversarial evidence for every claim not already present in
/// `evidence`. Claims that were processed before are skipped, so re-running
/// never duplicates a claim's evidence.
pub async fn extract(
    ctx: &StageContext,
    decomposed: &DecomposedClaims,
    evidence: &mut Vec<ClaimEvidence>,
    mode: ExtractMode,
) {
    let mut calls = 0u32;

    for claim in &decomposed.claims {
        if evidence.iter().any(|e| e.claim_id == claim.id) {
            tracing::debug!(claim_id = claim.id, "Claim already processed, skipping");
            continue;
        }

        let gathered = extract_claim(ctx, &decomposed.implication, claim, mode, &mut calls).await;
        tracing::info!(
            claim_id = claim.id,
            prosecutor = gathered.prosecutor_facts.len(),
            defender = gathered.defender_facts.len(),
            extras = gathered.extra_evidence.len(),
            "Evidence extracted"
        );
        evidence.push(gathered);
    }

    tracing::info!(mode = mode.as_str(), calls, "Evidence extraction complete");
}

async fn extract_claim(
    ctx: &StageContext,
    implication: &str,
    claim: &SubClaim,
    mode: ExtractMode,
    calls: &mut u32,
) -> ClaimEvidence {
    let per_side = ctx.pipeline.results_per_side;
    let (prosecutor, defender) = tokio::join!(
        ctx.search_or_empty(&claim.prosecutor_query, per_side),
        ctx.search_or_empty(&claim.defender_query, per_side),
    );

    // The side of the query is not trusted: both result sets go in one unlabeled pool.
    let pool: Vec<SearchResult> = prosecutor.into_iter().chain(defender).collect();
    if pool.is_empty() {
        tracing::info!(claim_id = claim.id, "No search results, recording empty evidence");
        return ClaimEvidence::empty(claim.id);
    }

    let prompt = build_prompt(
        claim,
        implication,
        &render_pool(&pool, ctx.pipeline.snippet_chars),
        mode,
        ctx.pipeline.extras_per_claim,
    );

    *calls += 1;
    let Some(mut gathered) = ctx.decomposer.invoke::<ClaimEvidence>(SYSTEM, &prompt).await else {
        tracing::warn!(claim_id = claim.id, "Evidence extraction failed");
        return ClaimEvidence::empty(claim.id);
    };

    if gathered.claim_id != claim.id {
        tracing::debug!(
            claim_id = claim.id,
            returned = gathered.claim_id,
            "Model returned a different claim id, pinning"
        );
    }
    gathered.sanitize(claim.id, MAX_FACTS_PER_SIDE, MAX_SUGGESTED_DOMAINS);
    match mode {
        ExtractMode::Standard => gathered.extra_evidence.clear(),
        ExtractMode::WithExtras => gathered.extra_evidence.truncate(ctx.pipeline.extras_per_claim),
    }
    gathered
}

fn render_pool(pool: &[SearchResult], snippet_chars: usize) -> String {
    let mut out = String::from(
        "[SEARCH RESULTS - decide for each source whether it CONTRADICTS or SUPPORTS the claim]\n",
    );
    for (i, result) in pool.iter().enumerate() {
        let title = if result.title.is_empty() {
            "Untitled"
        } else {
            &result.title
        };
        let _ = write!(
            out,
            "\nSource {}:\nURL: {}\nTitle: {}\nContent: {}\n{}\n",
            i + 1,
            result.url,
            title,
            truncate_chars(&result.snippet, snippet_chars),
            "-".repeat(60)
        );
    }
    out
}

fn build_prompt(
    claim: &SubClaim,
    implication: &str,
    pool: &str,
    mode: ExtractMode,
    extras: usize,
) -> String {
    let mut prompt = format!(
        r#"Extract evidence from search results for fact-checking.

CLAIM TO ANALYZE: "{text}"
CLAIM ID: {id}
CLAIM CATEGORY: {category}

{pool}

RULES
1. Extract UP TO {max} prosecutor facts: facts that CONTRADICT or cast doubt on the claim.
2. Extract UP TO {max} defender facts: facts that SUPPORT the claim.
3. Decide the side from what a source SAYS, not from which search found it. One source may hold facts for both sides.
4. Empty lists are a correct answer. Never fabricate, stretch or force-fit a fact to fill a side.
5. Every fact must be specific and checkable: numbers, dates, named people or organizations, studies, court cases, laws, scriptures or direct quotes.
   Good: "Wakefield's 1998 paper was retracted by The Lancet in 2010 for data fraud"
   Rejected: "Experts disagree", "Studies show", "According to sources", "It is believed"
6. Facts must not overlap.
7. For every fact suggest 3 to 5 trusted domains where it could be verified, chosen by the claim category
   (for example who.int, cdc.gov and nih.gov for Health/Medicine; reuters.com, apnews.com and snopes.com for News/Viral)."#,
        text = claim.text,
        id = claim.id,
        category = claim.topic_category,
        max = MAX_FACTS_PER_SIDE,
    );

    if mode == ExtractMode::WithExtras {
        let _ = write!(
            prompt,
            r#"
8. ALSO extract EXACTLY {extras} extra_evidence items: tangential facts that help verify the OVERALL IMPLICATION rather than this claim.
   IMPLICATION: "{implication}"
   Look for names, dates, laws, studies and organizations mentioned in passing. They must differ from the prosecutor and defender facts.
   Set "side" to "prosecutor" if the fact challenges the implication and "defender" if it supports it."#
        );
    } else {
        prompt.push_str("\nLeave extra_evidence empty.");
    }
    prompt
}
