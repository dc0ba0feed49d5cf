use std::fmt::Write;

use courtroom_common::types::{
    ClaimAnalysis, ClaimStatus, DecomposedClaims, FinalVerdict, OverallVerdict, VerifiedClaim,
    VerifiedEvidence,
};

use super::StageContext;

const SYSTEM: &str = "You are the Chief Justice delivering the final verdict of a fact-checking \
court. You weigh evidence by its trust tier and verification method, and you are alert to true \
facts used selectively to support a false conclusion.";

const MAX_EVIDENCE_PER_SIDE: usize = 2;

/// Write the final verdict. Always returns a well-formed verdict with
/// exactly one analysis per sub-claim, in claim order.
pub async fn judge(
    ctx: &StageContext,
    decomposed: &DecomposedClaims,
    verified: &[VerifiedClaim],
) -> FinalVerdict {
    let has_evidence = verified
        .iter()
        .any(|v| !v.prosecutor_evidence.is_empty() || !v.defender_evidence.is_empty());
    if !has_evidence {
        tracing::info!("No verified evidence for any claim, returning unverified verdict");
        return no_evidence(decomposed);
    }

    let prompt = build_prompt(decomposed, verified);
    match ctx.judge.invoke::<FinalVerdict>(SYSTEM, &prompt).await {
        Some(verdict) => {
            let verdict = reconcile(verdict, decomposed, verified);
            tracing::info!(
                verdict = %verdict.overall_verdict,
                claims = verdict.claim_analyses.len(),
                "Final verdict reached"
            );
            verdict
        }
        None => {
            tracing::warn!("Judge failed, returning fallback verdict");
            fallback(decomposed, verified)
        }
    }
}

/// Deterministic verdict used when the judge cannot be reached.
pub fn fallback(decomposed: &DecomposedClaims, verified: &[VerifiedClaim]) -> FinalVerdict {
    FinalVerdict {
        overall_verdict: OverallVerdict::Unverified,
        implication_connection: format!(
            "Unable to reach a final verdict on the implication '{}' due to analysis errors.",
            decomposed.implication
        ),
        claim_analyses: decomposed
            .claims
            .iter()
            .map(|claim| {
                unclear(
                    claim.id,
                    &claim.text,
                    "Unable to complete analysis due to system error.",
                    verified,
                )
            })
            .collect(),
    }
}

fn no_evidence(decomposed: &DecomposedClaims) -> FinalVerdict {
    FinalVerdict {
        overall_verdict: OverallVerdict::Unverified,
        implication_connection: format!(
            "No verifiable evidence was found for any claim, so the implication '{}' cannot be confirmed or refuted.",
            decomposed.implication
        ),
        claim_analyses: decomposed
            .claims
            .iter()
            .map(|claim| {
                unclear(
                    claim.id,
                    &claim.text,
                    "No evidence supporting or contradicting this claim could be found.",
                    &[],
                )
            })
            .collect(),
    }
}

fn unclear(id: u32, text: &str, paragraph: &str, verified: &[VerifiedClaim]) -> ClaimAnalysis {
    let (prosecutor_evidence, defender_evidence) = evidence_for(id, verified);
    ClaimAnalysis {
        claim_id: id,
        claim_text: text.to_string(),
        status: ClaimStatus::Unclear,
        detailed_paragraph: paragraph.to_string(),
        prosecutor_evidence,
        defender_evidence,
    }
}

fn evidence_for(id: u32, verified: &[VerifiedClaim]) -> (Vec<VerifiedEvidence>, Vec<VerifiedEvidence>) {
    verified
        .iter()
        .find(|v| v.claim_id == id)
        .map(|v| {
            (
                v.prosecutor_evidence.iter().take(MAX_EVIDENCE_PER_SIDE).cloned().collect(),
                v.defender_evidence.iter().take(MAX_EVIDENCE_PER_SIDE).cloned().collect(),
            )
        })
        .unwrap_or_default()
}

/// Align the model's verdict with the run: one analysis per sub-claim in
/// claim order, claim text from the decomposer and evidence from the
/// verifier. Unknown and duplicate analyses are dropped.
fn reconcile(
    mut verdict: FinalVerdict,
    decomposed: &DecomposedClaims,
    verified: &[VerifiedClaim],
) -> FinalVerdict {
    let mut analyses = Vec::with_capacity(decomposed.claims.len());

    for claim in &decomposed.claims {
        let position = verdict
            .claim_analyses
            .iter()
            .position(|a| a.claim_id == claim.id);

        let mut analysis = match position {
            Some(index) => verdict.claim_analyses.swap_remove(index),
            None => {
                tracing::warn!(claim_id = claim.id, "Judge omitted claim, marking unclear");
                analyses.push(unclear(
                    claim.id,
                    &claim.text,
                    "The judge returned no analysis for this claim.",
                    verified,
                ));
                continue;
            }
        };

        analysis.claim_text = claim.text.clone();
        let (prosecutor, defender) = evidence_for(claim.id, verified);
        if prosecutor.is_empty() && defender.is_empty() && analysis.status != ClaimStatus::Unclear {
            tracing::warn!(
                claim_id = claim.id,
                status = %analysis.status,
                "Judge ruled on a claim without evidence, marking unclear"
            );
            analysis.status = ClaimStatus::Unclear;
        }
        analysis.prosecutor_evidence = prosecutor;
        analysis.defender_evidence = defender;
        analyses.push(analysis);
    }

    for stray in &verdict.claim_analyses {
        tracing::warn!(claim_id = stray.claim_id, "Dropping unknown or duplicate claim analysis");
    }

    verdict.claim_analyses = analyses;
    verdict
}

fn render_evidence(out: &mut String, evidence: &[VerifiedEvidence], empty: &str) {
    if evidence.is_empty() {
        let _ = writeln!(out, "  {empty}");
        return;
    }
    for (i, ev) in evidence.iter().enumerate() {
        let _ = write!(
            out,
            "\n  [{}] FACT: {}\n      SOURCE: {}\n      TRUST: {}\n      VERIFICATION: {}\n      DETAILS: {}\n",
            i + 1,
            ev.key_fact,
            ev.source_url,
            ev.trust_score,
            ev.verification_method,
            ev.verification_details,
        );
    }
}

fn build_prompt(decomposed: &DecomposedClaims, verified: &[VerifiedClaim]) -> String {
    let rule = "=".repeat(70);
    let mut summary = String::new();

    for claim in &decomposed.claims {
        let (prosecutor, defender) = evidence_for(claim.id, verified);
        let _ = writeln!(
            summary,
            "\n{rule}\nCLAIM #{}: {}\nCATEGORY: {}\n{rule}",
            claim.id, claim.text, claim.topic_category
        );
        summary.push_str("\nEVIDENCE AGAINST THE CLAIM:\n");
        render_evidence(&mut summary, &prosecutor, "No contradicting evidence found.");
        summary.push_str("\nEVIDENCE FOR THE CLAIM:\n");
        render_evidence(&mut summary, &defender, "No supporting evidence found.");
    }

    format!(
        r#"CORE IMPLICATION UNDER REVIEW:
"{implication}"

ALL CLAIMS WITH VERIFIED EVIDENCE:
{summary}

FOR EACH CLAIM
1. status:
   - "Verified" if the supporting evidence is stronger and comes from higher-trust sources
   - "Debunked" if the contradicting evidence dominates on trust
   - "Unclear" if the evidence is balanced, low-trust or insufficient
2. detailed_paragraph of 150-250 words that states the verdict in its first sentence,
   cites specific facts, numbers, dates and sources from both sides, and explains how the
   trust tiers and verification methods (fact-check registry, trusted domain, web consensus)
   shaped the outcome. Describe evidence as "supporting" or "contradicting", never as
   prosecutor or defender.

FOR THE IMPLICATION
1. overall_verdict: "True", "False", "Partially True" or "Unverified"
   - "True" if the verified claims support the implication
   - "False" if debunked claims contradict it
   - "Partially True" if some claims are verified and others debunked
   - "Unverified" if most claims are unclear
2. implication_connection of 200-300 words that opens with the overall verdict, explains how
   each claim (by number) bears on the implication, and addresses SELECTIVE USE OF TRUE FACTS:
   a claim can be individually verified and still not support the broader conclusion.
   Discuss correlation versus causation where relevant.

Include every claim in claim_analyses. Leave prosecutor_evidence and defender_evidence empty;
the verified evidence is attached afterwards."#,
        implication = decomposed.implication,
    )
}
