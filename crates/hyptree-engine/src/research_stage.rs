//! Research Stage (RS) — two concurrent research queries (spec §4.5).
//! Bounded to exactly two simultaneous LG calls per request; implemented as
//! a two-way `tokio::join!`, the bounded-parallel primitive spec §9 calls
//! for in place of unrestricted task spawning.

use crate::prompts::{render, PromptLibrary};
use hyptree_core::error::Result;
use hyptree_llm::LlmGateway;
use hyptree_search::SearchGateway;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

const DEFAULT_STAGE_TIMEOUT_SECS: u64 = 60;

#[derive(Clone, Debug, Default)]
pub struct ResearchContext {
    pub market_research: String,
    pub competitor_research: String,
    /// Whether the Search Gateway actually returned non-empty snippets for
    /// at least one of the two subtasks. Distinguishes a genuine
    /// `llm+research` tree from one where the LLM merely guessed at market
    /// context with nothing from Search Gateway behind it (spec scenario
    /// S7: brief LG-only text should NOT stamp `generation_mode` as
    /// research-backed).
    pub search_contributed: bool,
}

impl ResearchContext {
    pub fn is_empty(&self) -> bool {
        self.market_research.is_empty() && self.competitor_research.is_empty()
    }
}

pub struct ResearchStage {
    gateway: Arc<LlmGateway>,
    search: Arc<dyn SearchGateway>,
    prompts: PromptLibrary,
    stage_timeout: Duration,
}

impl ResearchStage {
    pub fn new(gateway: Arc<LlmGateway>, search: Arc<dyn SearchGateway>) -> Result<Self> {
        Ok(Self {
            gateway,
            search,
            prompts: PromptLibrary::bundled()?,
            stage_timeout: Duration::from_secs(DEFAULT_STAGE_TIMEOUT_SECS),
        })
    }

    pub fn with_stage_timeout(mut self, timeout: Duration) -> Self {
        self.stage_timeout = timeout;
        self
    }

    /// Runs the market and competitor subtasks in parallel, returns once both
    /// settle regardless of individual success (failed subtasks contribute
    /// empty strings per spec §4.5). Bounded by `stage_timeout` overall.
    pub async fn gather(&self, problem: &str, cancel: &CancellationToken) -> ResearchContext {
        let market_fut = self.market_subtask(problem, cancel);
        let competitor_fut = self.competitor_subtask(problem, cancel);

        let joined = tokio::time::timeout(self.stage_timeout, async {
            tokio::join!(market_fut, competitor_fut)
        });

        match joined.await {
            Ok(((market_research, market_used), (competitor_research, competitor_used))) => ResearchContext {
                market_research,
                competitor_research,
                search_contributed: market_used || competitor_used,
            },
            Err(_) => {
                warn!("research stage exceeded {:?} timeout, returning empty context", self.stage_timeout);
                ResearchContext::default()
            }
        }
    }

    async fn market_subtask(&self, problem: &str, cancel: &CancellationToken) -> (String, bool) {
        let search_text = self.search.search(&format!("market analysis {problem}")).await;
        let search_used = !search_text.trim().is_empty();
        let mut vars = HashMap::new();
        vars.insert("problem", format!("{problem}\n\nWeb search snippets:\n{search_text}"));
        let prompt = render(&self.prompts.market_research_prompt, &vars);

        (self.complete_or_empty(&prompt, cancel).await, search_used)
    }

    async fn competitor_subtask(&self, problem: &str, cancel: &CancellationToken) -> (String, bool) {
        let search_text = self.search.search(&format!("competitors {problem}")).await;
        let search_used = !search_text.trim().is_empty();
        let mut vars = HashMap::new();
        vars.insert("problem", format!("{problem}\n\nWeb search snippets:\n{search_text}"));
        let prompt = render(&self.prompts.competitor_research_prompt, &vars);

        (self.complete_or_empty(&prompt, cancel).await, search_used)
    }

    async fn complete_or_empty(&self, prompt: &str, cancel: &CancellationToken) -> String {
        #[derive(serde::Deserialize)]
        struct Summary {
            summary: String,
        }

        // The research summary is free text, not structured JSON like the
        // rest of the pipeline's LG calls — wrap it so complete_json still
        // gives us bounded retries and backoff.
        let wrapped = format!("{prompt}\n\nReturn ONLY a JSON object: {{\"summary\": \"<your summary text>\"}}");
        match self.gateway.complete_json::<Summary>(None, &wrapped, cancel).await {
            Ok(result) => result.summary,
            Err(e) => {
                info!("research subtask degraded to empty string: {e}");
                String::new()
            }
        }
    }
}
