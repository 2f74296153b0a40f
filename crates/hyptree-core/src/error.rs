//! Error taxonomy for the hypothesis tree engine (spec §7)

use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("config error: {0}")]
    ConfigError(String),

    #[error("unknown framework: {0}")]
    FrameworkUnknown(String),

    #[error("llm unavailable: {0}")]
    LlmUnavailable(String),

    #[error("llm quota exceeded: {0}")]
    QuotaExceeded(String),

    #[error("schema validation failed: {0}")]
    SchemaValidation(String),

    #[error("cancelled")]
    Cancelled,

    #[error("not found: {0}")]
    NotFound(String),

    #[error("version conflict for {0} after {1} retries")]
    VersionConflict(String, u32),

    #[error("pipeline error: {0}")]
    Pipeline(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    pub fn config(msg: impl Into<String>) -> Self {
        Self::ConfigError(msg.into())
    }

    pub fn pipeline(msg: impl Into<String>) -> Self {
        Self::Pipeline(msg.into())
    }
}
