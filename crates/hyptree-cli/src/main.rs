//! hyptree-cli — process entrypoint for the hypothesis tree engine.
//!
//! Usage:
//!   hyptree --problem "Should we scale deployment of fall detection in senior living?"
//!   hyptree --problem "Why did Q4 revenue decline?" --framework hypothesis_issue_tree

use clap::Parser;
use hyptree_framework::Catalog;
use hyptree_llm::{AnthropicProvider, LlmGateway, RetryPolicy};
use hyptree_orchestrator::{Orchestrator, PipelineConfig, RunRequest};
use hyptree_search::{HttpSearchGateway, NullSearchGateway, SearchGateway};
use hyptree_store::ProjectStore;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(name = "hyptree", about = "Hypothesis Tree Engine — strategic decision assistant")]
struct Cli {
    /// Natural-language business question to analyze
    #[arg(long)]
    problem: String,

    /// Framework name to force, bypassing trigger-phrase selection
    #[arg(long)]
    framework: Option<String>,

    /// Project id to save under. A fresh UUID is generated if omitted.
    #[arg(long)]
    project_id: Option<String>,

    /// Root directory for persisted projects
    #[arg(long, default_value = "./hyptree-projects")]
    store_root: String,

    /// Path to a pipeline config TOML file
    #[arg(long)]
    config: Option<String>,

    /// HTTP search endpoint for the Research Stage. Omit to run without
    /// web search (LLM-only research context).
    #[arg(long)]
    search_endpoint: Option<String>,

    /// API key for the search endpoint, if required
    #[arg(long)]
    search_api_key: Option<String>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "hyptree=info".into()))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let cli = Cli::parse();

    let config_path = cli.config.map(PathBuf::from).unwrap_or_else(|| PathBuf::from("hyptree.toml"));
    let config = PipelineConfig::load(&config_path);

    let api_key = std::env::var("ANTHROPIC_API_KEY")
        .map_err(|_| anyhow::anyhow!("ANTHROPIC_API_KEY not set"))?;

    let provider = AnthropicProvider::new(api_key);
    let gateway = Arc::new(
        LlmGateway::new(Arc::new(provider))
            .with_retry_policy(RetryPolicy {
                max_attempts: config.llm.max_retries,
                ..RetryPolicy::default()
            })
            .with_call_timeout(Duration::from_secs(config.llm.call_timeout_secs)),
    );

    let search: Arc<dyn SearchGateway> = match cli.search_endpoint {
        Some(endpoint) => {
            let mut sg = HttpSearchGateway::new(endpoint);
            if let Some(key) = cli.search_api_key {
                sg = sg.with_api_key(key);
            }
            Arc::new(sg)
        }
        None => Arc::new(NullSearchGateway),
    };

    let catalog = Catalog::load()?;
    let store = ProjectStore::new(cli.store_root);
    let orchestrator = Orchestrator::new(catalog, gateway, search, store, config);

    let mut request = RunRequest::new(cli.problem);
    if let Some(framework) = cli.framework {
        request = request.with_framework_hint(framework);
    }
    if let Some(project_id) = cli.project_id {
        request = request.with_project_id(project_id);
    }

    let result = orchestrator.run(request, &CancellationToken::new(), None).await?;

    println!("{}", serde_json::to_string_pretty(&RunResultView::from(&result))?);

    Ok(())
}

/// JSON shape printed to stdout — the same fields as `RunResult`, just
/// re-grouped for presentation (e.g. `outcome` and `persisted` flattened
/// next to the tree/report/matrix rather than nested in an internal type).
#[derive(serde::Serialize)]
struct RunResultView<'a> {
    project_id: &'a str,
    tree: &'a hyptree_core::types::HypothesisTree,
    report: &'a hyptree_core::types::ValidationReport,
    matrix: &'a hyptree_core::types::Matrix,
    outcome: String,
    persisted: bool,
}

impl<'a> From<&'a hyptree_orchestrator::RunResult> for RunResultView<'a> {
    fn from(r: &'a hyptree_orchestrator::RunResult) -> Self {
        Self {
            project_id: &r.project_id,
            tree: &r.tree,
            report: &r.report,
            matrix: &r.matrix,
            outcome: format!("{:?}", r.outcome),
            persisted: r.persisted,
        }
    }
}
