use serde::{Deserialize, Serialize};

use super::types::{LlmResponse, StopReason, TokenUsage};
use super::{retry_hint_seconds, LlmError};

const ANTHROPIC_MESSAGES_URL: &str = "https://api.anthropic.com/v1/messages";
const ANTHROPIC_VERSION: &str = "2023-06-01";

// ---------------------------------------------------------------------------
// Request wire types
// ---------------------------------------------------------------------------

#[derive(Serialize)]
struct AnthropicRequest<'a> {
    model: &'a str,
    max_tokens: u32,
    system: &'a str,
    messages: [AnthropicMessage<'a>; 1],
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f64>,
}

#[derive(Serialize)]
struct AnthropicMessage<'a> {
    role: &'static str,
    content: &'a str,
}

// ---------------------------------------------------------------------------
// Response wire types
// ---------------------------------------------------------------------------

#[derive(Deserialize)]
struct AnthropicResponse {
    content: Vec<AnthropicResponseBlock>,
    stop_reason: Option<String>,
    usage: AnthropicUsage,
}

#[derive(Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum AnthropicResponseBlock {
    Text {
        text: String,
    },
    #[serde(other)]
    Other,
}

#[derive(Deserialize)]
struct AnthropicUsage {
    input_tokens: u64,
    output_tokens: u64,
}

#[derive(Deserialize)]
struct AnthropicError {
    error: AnthropicErrorDetail,
}

#[derive(Deserialize)]
struct AnthropicErrorDetail {
    message: String,
    #[serde(default)]
    r#type: String,
}

fn from_wire_response(resp: AnthropicResponse) -> LlmResponse {
    let text = resp
        .content
        .into_iter()
        .filter_map(|block| match block {
            AnthropicResponseBlock::Text { text } => Some(text),
            AnthropicResponseBlock::Other => None,
        })
        .collect::<Vec<_>>()
        .join("");

    let stop_reason = match resp.stop_reason.as_deref() {
        Some("max_tokens") => StopReason::MaxTokens,
        Some("stop_sequence") => StopReason::StopSequence,
        Some("refusal") => StopReason::Blocked,
        _ => StopReason::EndTurn,
    };

    LlmResponse {
        text,
        stop_reason,
        usage: TokenUsage {
            input_tokens: resp.usage.input_tokens,
            output_tokens: resp.usage.output_tokens,
        },
    }
}

fn classify_error(status: reqwest::StatusCode, body: &str) -> LlmError {
    match serde_json::from_str::<AnthropicError>(body) {
        Ok(e) => {
            if e.error.r#type == "rate_limit_error" || e.error.r#type == "overloaded_error" {
                return LlmError::RateLimited {
                    retry_after: retry_hint_seconds(&e.error.message),
                };
            }
            if e.error.r#type == "invalid_request_error"
                && e.error.message.contains("context window")
            {
                return LlmError::ContextWindowExceeded(e.error.message);
            }
            LlmError::Api(format!("{}: {}", status, e.error.message))
        }
        Err(_) => LlmError::Api(format!("{}: {}", status, body)),
    }
}

// ---------------------------------------------------------------------------
// Public API
// ---------------------------------------------------------------------------

/// Send one messages request to the Anthropic API.
pub async fn send_messages(
    http: &reqwest::Client,
    api_key: &str,
    model: &str,
    max_tokens: u32,
    temperature: Option<f64>,
    system: &str,
    prompt: &str,
) -> Result<LlmResponse, LlmError> {
    let start = std::time::Instant::now();

    let request = AnthropicRequest {
        model,
        max_tokens,
        system,
        messages: [AnthropicMessage {
            role: "user",
            content: prompt,
        }],
        temperature,
    };

    let response = http
        .post(ANTHROPIC_MESSAGES_URL)
        .header("x-api-key", api_key)
        .header("anthropic-version", ANTHROPIC_VERSION)
        .header("content-type", "application/json")
        .json(&request)
        .send()
        .await
        .map_err(|e| LlmError::Http(e.to_string()))?;

    let status = response.status();
    metrics::histogram!("llm.api.latency", "provider" => "anthropic", "model" => model.to_string())
        .record(start.elapsed().as_secs_f64());

    if status == reqwest::StatusCode::UNAUTHORIZED || status == reqwest::StatusCode::FORBIDDEN {
        let body = response.text().await.unwrap_or_default();
        return Err(LlmError::Auth(format!("{}: {}", status, body)));
    }

    if status == reqwest::StatusCode::TOO_MANY_REQUESTS {
        let header_hint = response
            .headers()
            .get("retry-after")
            .and_then(|v| v.to_str().ok())
            .and_then(|s| s.parse::<u64>().ok());
        let body = response.text().await.unwrap_or_default();
        return Err(LlmError::RateLimited {
            retry_after: header_hint.or_else(|| retry_hint_seconds(&body)),
        });
    }

    if !status.is_success() {
        let body = response.text().await.unwrap_or_default();
        return Err(classify_error(status, &body));
    }

    let body: AnthropicResponse = response
        .json()
        .await
        .map_err(|e| LlmError::Parse(format!("Failed to parse Anthropic response: {}", e)))?;

    let llm_response = from_wire_response(body);
    llm_response.usage.record("anthropic");

    Ok(llm_response)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_anthropic_text_response() {
        let json = r#"{
            "content": [
                {"type": "thinking", "thinking": "..."},
                {"type": "text", "text": "{\"implication\": "},
                {"type": "text", "text": "\"x\"}"}
            ],
            "stop_reason": "end_turn",
            "usage": {"input_tokens": 10, "output_tokens": 5}
        }"#;

        let resp: AnthropicResponse = serde_json::from_str(json).unwrap();
        let parsed = from_wire_response(resp);

        assert_eq!(parsed.stop_reason, StopReason::EndTurn);
        assert_eq!(parsed.usage.input_tokens, 10);
        assert_eq!(parsed.text, r#"{"implication": "x"}"#);
    }

    #[test]
    fn test_request_wire_format() {
        let request = AnthropicRequest {
            model: "claude-sonnet-4-20250514",
            max_tokens: 1024,
            system: "sys",
            messages: [AnthropicMessage {
                role: "user",
                content: "hello",
            }],
            temperature: None,
        };
        let v = serde_json::to_value(&request).unwrap();
        assert_eq!(v["messages"][0]["role"], "user");
        assert_eq!(v["messages"][0]["content"], "hello");
        assert!(v.get("temperature").is_none());
    }

    #[test]
    fn test_classify_errors() {
        let overloaded = r#"{"type":"error","error":{"type":"overloaded_error","message":"Overloaded"}}"#;
        assert!(matches!(
            classify_error(reqwest::StatusCode::from_u16(529).unwrap(), overloaded),
            LlmError::RateLimited { .. }
        ));

        let ctx = r#"{"type":"error","error":{"type":"invalid_request_error","message":"prompt is too long for the context window"}}"#;
        assert!(matches!(
            classify_error(reqwest::StatusCode::BAD_REQUEST, ctx),
            LlmError::ContextWindowExceeded(_)
        ));

        assert!(matches!(
            classify_error(reqwest::StatusCode::BAD_GATEWAY, "<html>"),
            LlmError::Api(_)
        ));
    }
}
