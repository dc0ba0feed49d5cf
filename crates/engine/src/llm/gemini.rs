use serde::{Deserialize, Serialize};

use super::types::{LlmResponse, StopReason, TokenUsage};
use super::{retry_hint_seconds, LlmError};

const GEMINI_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta/models";

// ---------------------------------------------------------------------------
// Request wire types
// ---------------------------------------------------------------------------

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerateRequest<'a> {
    system_instruction: GeminiContent<'a>,
    contents: [GeminiContent<'a>; 1],
    generation_config: GenerationConfig,
}

#[derive(Serialize)]
struct GeminiContent<'a> {
    #[serde(skip_serializing_if = "Option::is_none")]
    role: Option<&'static str>,
    parts: [GeminiPart<'a>; 1],
}

#[derive(Serialize)]
struct GeminiPart<'a> {
    text: &'a str,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerationConfig {
    max_output_tokens: u32,
    response_mime_type: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f64>,
}

// ---------------------------------------------------------------------------
// Response wire types
// ---------------------------------------------------------------------------

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct GenerateResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
    #[serde(default)]
    usage_metadata: Option<UsageMetadata>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct Candidate {
    #[serde(default)]
    content: Option<CandidateContent>,
    #[serde(default)]
    finish_reason: Option<String>,
}

#[derive(Deserialize)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<CandidatePart>,
}

#[derive(Deserialize)]
struct CandidatePart {
    #[serde(default)]
    text: Option<String>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct UsageMetadata {
    #[serde(default)]
    prompt_token_count: u64,
    #[serde(default)]
    candidates_token_count: u64,
}

#[derive(Deserialize)]
struct GeminiError {
    error: GeminiErrorDetail,
}

#[derive(Deserialize)]
struct GeminiErrorDetail {
    #[serde(default)]
    message: String,
    #[serde(default)]
    status: String,
}

fn from_wire_response(resp: GenerateResponse) -> Result<LlmResponse, LlmError> {
    let candidate = resp
        .candidates
        .into_iter()
        .next()
        .ok_or_else(|| LlmError::Parse("No candidates in Gemini response".into()))?;

    let text = candidate
        .content
        .map(|c| {
            c.parts
                .into_iter()
                .filter_map(|p| p.text)
                .collect::<Vec<_>>()
                .join("")
        })
        .unwrap_or_default();

    let stop_reason = match candidate.finish_reason.as_deref() {
        Some("MAX_TOKENS") => StopReason::MaxTokens,
        Some("SAFETY") | Some("RECITATION") | Some("BLOCKLIST") => StopReason::Blocked,
        _ => StopReason::EndTurn,
    };

    let usage = resp
        .usage_metadata
        .map(|u| TokenUsage {
            input_tokens: u.prompt_token_count,
            output_tokens: u.candidates_token_count,
        })
        .unwrap_or_default();

    Ok(LlmResponse {
        text,
        stop_reason,
        usage,
    })
}

/// Map a non-success body. Quota exhaustion arrives as `RESOURCE_EXHAUSTED`
/// with a `retryDelay` detail or a "retry in Ns" hint in the message.
fn classify_error(status: reqwest::StatusCode, body: &str) -> LlmError {
    let parsed = serde_json::from_str::<GeminiError>(body).ok();
    let (message, error_status) = parsed
        .map(|e| (e.error.message, e.error.status))
        .unwrap_or_else(|| (body.to_string(), String::new()));

    if status == reqwest::StatusCode::TOO_MANY_REQUESTS || error_status == "RESOURCE_EXHAUSTED" {
        return LlmError::RateLimited {
            retry_after: retry_hint_seconds(body),
        };
    }
    if error_status == "UNAUTHENTICATED" || error_status == "PERMISSION_DENIED" {
        return LlmError::Auth(format!("{}: {}", status, message));
    }
    if message.contains("exceeds the maximum number of tokens") {
        return LlmError::ContextWindowExceeded(message);
    }
    LlmError::Api(format!("{}: {}", status, message))
}

// ---------------------------------------------------------------------------
// Public API
// ---------------------------------------------------------------------------

/// Send one generateContent request in JSON mode to the Gemini API.
pub async fn generate_content(
    http: &reqwest::Client,
    api_key: &str,
    model: &str,
    max_tokens: u32,
    temperature: Option<f64>,
    system: &str,
    prompt: &str,
) -> Result<LlmResponse, LlmError> {
    let start = std::time::Instant::now();

    let request = GenerateRequest {
        system_instruction: GeminiContent {
            role: None,
            parts: [GeminiPart { text: system }],
        },
        contents: [GeminiContent {
            role: Some("user"),
            parts: [GeminiPart { text: prompt }],
        }],
        generation_config: GenerationConfig {
            max_output_tokens: max_tokens,
            response_mime_type: "application/json",
            temperature,
        },
    };

    let response = http
        .post(format!("{}/{}:generateContent", GEMINI_BASE_URL, model))
        .header("x-goog-api-key", api_key)
        .json(&request)
        .send()
        .await
        .map_err(|e| LlmError::Http(e.to_string()))?;

    let status = response.status();
    metrics::histogram!("llm.api.latency", "provider" => "gemini", "model" => model.to_string())
        .record(start.elapsed().as_secs_f64());

    if status == reqwest::StatusCode::UNAUTHORIZED {
        let body = response.text().await.unwrap_or_default();
        return Err(LlmError::Auth(format!("{}: {}", status, body)));
    }

    if !status.is_success() {
        let body = response.text().await.unwrap_or_default();
        return Err(classify_error(status, &body));
    }

    let body: GenerateResponse = response
        .json()
        .await
        .map_err(|e| LlmError::Parse(format!("Failed to parse Gemini response: {}", e)))?;

    let llm_response = from_wire_response(body)?;
    llm_response.usage.record("gemini");

    Ok(llm_response)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_gemini_response() {
        let json = r#"{
            "candidates": [{
                "content": {"role": "model", "parts": [{"text": "{\"a\": 1}"}]},
                "finishReason": "STOP"
            }],
            "usageMetadata": {"promptTokenCount": 12, "candidatesTokenCount": 4}
        }"#;
        let resp: GenerateResponse = serde_json::from_str(json).unwrap();
        let parsed = from_wire_response(resp).unwrap();
        assert_eq!(parsed.text, r#"{"a": 1}"#);
        assert_eq!(parsed.usage.input_tokens, 12);
        assert_eq!(parsed.stop_reason, StopReason::EndTurn);
    }

    #[test]
    fn test_request_is_camel_case() {
        let request = GenerateRequest {
            system_instruction: GeminiContent {
                role: None,
                parts: [GeminiPart { text: "sys" }],
            },
            contents: [GeminiContent {
                role: Some("user"),
                parts: [GeminiPart { text: "hi" }],
            }],
            generation_config: GenerationConfig {
                max_output_tokens: 256,
                response_mime_type: "application/json",
                temperature: Some(0.0),
            },
        };
        let v = serde_json::to_value(&request).unwrap();
        assert_eq!(v["generationConfig"]["maxOutputTokens"], 256);
        assert_eq!(v["generationConfig"]["responseMimeType"], "application/json");
        assert!(v["systemInstruction"].get("role").is_none());
        assert_eq!(v["contents"][0]["parts"][0]["text"], "hi");
    }

    #[test]
    fn test_resource_exhausted_carries_retry_delay() {
        let body = r#"{"error": {"code": 429, "status": "RESOURCE_EXHAUSTED",
            "message": "You exceeded your current quota. Please retry in 17.4s.",
            "details": [{"@type": "type.googleapis.com/google.rpc.RetryInfo", "retryDelay": "17s"}]}}"#;
        match classify_error(reqwest::StatusCode::TOO_MANY_REQUESTS, body) {
            LlmError::RateLimited { retry_after } => assert_eq!(retry_after, Some(18)),
            other => panic!("expected RateLimited, got {other:?}"),
        }
    }

    #[test]
    fn test_permission_denied_is_auth() {
        let body = r#"{"error": {"code": 403, "status": "PERMISSION_DENIED", "message": "API key invalid"}}"#;
        assert!(matches!(
            classify_error(reqwest::StatusCode::FORBIDDEN, body),
            LlmError::Auth(_)
        ));
    }
}
