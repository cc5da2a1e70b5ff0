//! Token and cost accounting for hosted model calls.

use crate::llm::TokenUsage;
use crate::models::result::UsageMetadata;

/// Per-million-token prices.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Pricing {
    pub input_per_million: f64,
    pub output_per_million: f64,
}

impl Pricing {
    /// Cost of the given token counts.
    pub fn cost(&self, input_tokens: u64, output_tokens: u64) -> f64 {
        (input_tokens as f64 / 1_000_000.0) * self.input_per_million
            + (output_tokens as f64 / 1_000_000.0) * self.output_per_million
    }
}

/// Accumulates token counts over the requests of one operation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct UsageMeter {
    input_tokens: u64,
    output_tokens: u64,
    requests: u32,
}

impl UsageMeter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&mut self, usage: TokenUsage) {
        self.input_tokens += usage.input_tokens;
        self.output_tokens += usage.output_tokens;
        self.requests += 1;
    }

    pub fn requests(&self) -> u32 {
        self.requests
    }

    /// Usage metadata attributed to `model_name`, priced with `pricing`.
    pub fn finish(&self, model_name: impl Into<String>, pricing: &Pricing) -> UsageMetadata {
        UsageMetadata {
            input_tokens: self.input_tokens,
            output_tokens: self.output_tokens,
            total_tokens: self.input_tokens + self.output_tokens,
            model_name: model_name.into(),
            estimated_cost: pricing.cost(self.input_tokens, self.output_tokens),
        }
    }
}
