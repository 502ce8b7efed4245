//! LLM collaborator (spec §2): an opaque text-in/text-out capability some
//! analyzers optionally call. Narrowed from the teacher's multi-provider,
//! cost-tracked, smart-routed client down to a single trait and a single
//! real provider, since the spec explicitly keeps cost/quota governance
//! and model selection out of scope.

mod client;
mod types;

pub use client::{AnthropicClient, ClientConfig, LlmClient, MockLlmClient};
pub use types::{LlmRequest, LlmResponse};
