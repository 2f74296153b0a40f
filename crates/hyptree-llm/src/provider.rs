//! LLM provider trait — the boundary the gateway retries and backs off around.

use crate::types::{LlmRequest, LlmResponse};

pub type LlmResult<T> = Result<T, LlmError>;

#[derive(Debug, thiserror::Error)]
pub enum LlmError {
    #[error("request failed: {0}")]
    RequestFailed(String),

    #[error("authentication failed: {0}")]
    AuthFailed(String),

    #[error("rate limited: retry after {retry_after_ms}ms")]
    RateLimited { retry_after_ms: u64 },

    #[error("quota exceeded: {0}")]
    QuotaExceeded(String),

    #[error("invalid response: {0}")]
    InvalidResponse(String),

    #[error("cancelled")]
    Cancelled,

    #[error("network error: {0}")]
    NetworkError(#[from] reqwest::Error),
}

impl LlmError {
    /// Whether the LLM Gateway (§4.3) should retry this error at all.
    /// `QuotaExceeded` is the one kind that propagates immediately per spec §7.
    pub fn is_retryable(&self) -> bool {
        !matches!(self, LlmError::QuotaExceeded(_))
    }
}

/// Narrow provider capability: send a complete prompt, get a complete text
/// response back. No streaming — the gateway only ever wants a full JSON
/// payload to parse, never token-level deltas.
#[async_trait::async_trait]
pub trait LlmProvider: Send + Sync {
    fn name(&self) -> &str;

    async fn complete(&self, request: LlmRequest) -> LlmResult<LlmResponse>;
}
