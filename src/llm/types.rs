//! Wire types for the LLM collaborator (spec §2: "treated as an opaque
//! text-in/text-out capability; the specification never depends on any
//! particular model").
//!
//! Deliberately narrow compared to a general-purpose multi-provider client:
//! analyzers never select a model tier, never see token costs, and never
//! read raw provider response shapes. They hand over a prompt and a
//! deadline/cancel token and get text back, or a fatal error.

use serde::{Deserialize, Serialize};

/// A single request to the opaque LLM capability (spec §2, §4.4 "optionally
/// calls LLM").
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmRequest {
    pub system: Option<String>,
    pub prompt: String,
    pub max_tokens: u32,
    pub temperature: Option<f64>,
}

impl LlmRequest {
    pub fn new(prompt: impl Into<String>) -> Self {
        Self {
            system: None,
            prompt: prompt.into(),
            max_tokens: 1024,
            temperature: None,
        }
    }

    pub fn with_system(mut self, system: impl Into<String>) -> Self {
        self.system = Some(system.into());
        self
    }

    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = max_tokens;
        self
    }
}

/// Response text plus the token counts an analyzer might log, but never
/// acts on (spec §2: no cost/quota governance in scope).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmResponse {
    pub text: String,
    pub input_tokens: u64,
    pub output_tokens: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn request_builder_sets_fields() {
        let req = LlmRequest::new("classify this transaction")
            .with_system("you are a fraud analyst")
            .with_max_tokens(256);
        assert_eq!(req.prompt, "classify this transaction");
        assert_eq!(req.system.as_deref(), Some("you are a fraud analyst"));
        assert_eq!(req.max_tokens, 256);
    }
}
