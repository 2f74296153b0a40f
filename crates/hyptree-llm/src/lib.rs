//! hyptree-llm - the LLM Gateway (LG): provider abstraction, retry/backoff
//! policy, and JSON extraction. Every other component that needs a model
//! completion goes through `LlmGateway::complete_json` — nothing else retries.

pub mod anthropic;
pub mod gateway;
pub mod provider;
pub mod types;

pub use anthropic::AnthropicProvider;
pub use gateway::{LlmGateway, RetryPolicy};
pub use provider::{LlmError, LlmProvider, LlmResult};
pub use types::{LlmMessage, LlmRequest, LlmResponse, Role, Usage};
