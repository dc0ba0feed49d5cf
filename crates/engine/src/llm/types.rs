/// Parsed response from a single reasoning-service call.
#[derive(Clone, Debug)]
pub struct LlmResponse {
    /// Concatenated text parts of the reply.
    pub text: String,
    pub stop_reason: StopReason,
    pub usage: TokenUsage,
}

/// Why the model stopped generating.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum StopReason {
    EndTurn,
    MaxTokens,
    StopSequence,
    /// Provider blocked the output (safety, recitation).
    Blocked,
}

/// Token usage from a single API call.
#[derive(Clone, Debug, Default)]
pub struct TokenUsage {
    pub input_tokens: u64,
    pub output_tokens: u64,
}

impl TokenUsage {
    pub(crate) fn record(&self, provider: &'static str) {
        metrics::counter!("llm.api.input_tokens", "provider" => provider)
            .increment(self.input_tokens);
        metrics::counter!("llm.api.output_tokens", "provider" => provider)
            .increment(self.output_tokens);
    }
}
