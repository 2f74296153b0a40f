//! Pipeline configuration — one place for every tunable the orchestrator
//! and its stages read (spec §5, §9 "no global mutable state": everything
//! here is injected at pipeline construction, never read from a singleton).

use serde::{Deserialize, Serialize};
use std::path::Path;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    pub llm: LlmConfig,
    pub research: ResearchConfig,
    pub refinement: RefinementConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LlmConfig {
    /// Model identifier passed to the provider. Tier name or full model ID.
    pub model: String,
    /// Retry attempts for a single `complete_json` call (spec §4.3: default 3).
    pub max_retries: u32,
    /// Per-call timeout in seconds (spec §5: default 30s).
    pub call_timeout_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ResearchConfig {
    /// Research Stage overall timeout in seconds (spec §4.5: default 60s).
    pub stage_timeout_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RefinementConfig {
    /// Iteration cap, clamped to 1-5 by `RefinementLoop` (spec §4.8).
    pub max_iterations: u32,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            llm: LlmConfig::default(),
            research: ResearchConfig::default(),
            refinement: RefinementConfig::default(),
        }
    }
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            model: "claude-3-5-sonnet-20241022".to_string(),
            max_retries: 4,
            call_timeout_secs: 30,
        }
    }
}

impl Default for ResearchConfig {
    fn default() -> Self {
        Self { stage_timeout_secs: 60 }
    }
}

impl Default for RefinementConfig {
    fn default() -> Self {
        Self { max_iterations: 3 }
    }
}

impl PipelineConfig {
    /// Load from a TOML file, falling back to defaults if the file is
    /// absent or fails to parse (mirrors the teacher's config loader:
    /// never fatal, always logs the reason it fell back).
    pub fn load(path: &Path) -> Self {
        match std::fs::read_to_string(path) {
            Ok(content) => match toml::from_str(&content) {
                Ok(config) => {
                    tracing::info!("loaded pipeline config from {}", path.display());
                    config
                }
                Err(e) => {
                    tracing::warn!("failed to parse {}: {e} — using defaults", path.display());
                    Self::default()
                }
            },
            Err(_) => {
                tracing::info!("no config at {} — using defaults", path.display());
                Self::default()
            }
        }
    }
}
