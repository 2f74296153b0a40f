//! hyptree-orchestrator - the Orchestrator (OR): wires Framework Selector,
//! Research Stage, Refinement Loop, and Matrix Generator into one request
//! pipeline, then persists the result (spec §4.11).

pub mod config;

pub use config::PipelineConfig;

use hyptree_core::error::{Error, Result};
use hyptree_core::progress::{ProgressEvent, Stage, StageStatus};
use hyptree_core::types::{HypothesisTree, Matrix, ValidationReport};
use hyptree_engine::{CustomL1, MatrixGenerator, MeceValidator, RefinementLoop, ResearchStage, RlOutcome, TreeBuilder};
use hyptree_framework::{Catalog, FrameworkSelector};
use hyptree_llm::LlmGateway;
use hyptree_search::SearchGateway;
use hyptree_store::ProjectStore;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

/// Everything the orchestrator needs for one `run` call. Grouped into a
/// struct rather than positional parameters since several fields are
/// optional and order would otherwise be easy to get wrong at call sites.
#[derive(Clone, Debug, Default)]
pub struct RunRequest {
    pub problem: String,
    pub framework_hint: Option<String>,
    /// Required, and only consulted, when the selected framework is `custom`.
    pub custom_l1: Option<Vec<CustomL1>>,
    /// Caller-supplied project id; a fresh UUID is generated if absent.
    pub project_id: Option<String>,
    pub description: Option<String>,
}

impl RunRequest {
    pub fn new(problem: impl Into<String>) -> Self {
        Self { problem: problem.into(), ..Default::default() }
    }

    pub fn with_framework_hint(mut self, hint: impl Into<String>) -> Self {
        self.framework_hint = Some(hint.into());
        self
    }

    pub fn with_project_id(mut self, project_id: impl Into<String>) -> Self {
        self.project_id = Some(project_id.into());
        self
    }
}

/// Result of a full pipeline run (spec §4.11 step 6).
#[derive(Clone, Debug)]
pub struct RunResult {
    pub project_id: String,
    pub tree: HypothesisTree,
    pub report: ValidationReport,
    pub matrix: Matrix,
    pub outcome: RlOutcome,
    /// False when the tree/matrix could not be written to the store —
    /// the in-memory result is still returned (spec §7 "User-visible
    /// behavior": persistence failures never discard a produced tree).
    pub persisted: bool,
}

pub struct Orchestrator {
    catalog: Catalog,
    gateway: Arc<LlmGateway>,
    search: Arc<dyn SearchGateway>,
    store: ProjectStore,
    config: PipelineConfig,
}

impl Orchestrator {
    pub fn new(
        catalog: Catalog,
        gateway: Arc<LlmGateway>,
        search: Arc<dyn SearchGateway>,
        store: ProjectStore,
        config: PipelineConfig,
    ) -> Self {
        Self { catalog, gateway, search, store, config }
    }

    /// Runs one request end to end. `progress` is a pull-style sink: if the
    /// receiver has been dropped or the channel is full, events are simply
    /// dropped rather than blocking the pipeline (spec §4.11: "the pipeline
    /// completes even if no consumer attaches").
    pub async fn run(
        &self,
        request: RunRequest,
        cancel: &CancellationToken,
        progress: Option<mpsc::Sender<ProgressEvent>>,
    ) -> Result<RunResult> {
        let progress = progress.as_ref();

        let selector = FrameworkSelector::new(&self.catalog);
        let framework = selector.select(&request.problem, request.framework_hint.as_deref())?;
        info!("selected framework '{}' for request", framework.name);

        emit(progress, ProgressEvent::new(Stage::Research, StageStatus::Started));
        let research_stage = ResearchStage::new(self.gateway.clone(), self.search.clone())?
            .with_stage_timeout(Duration::from_secs(self.config.research.stage_timeout_secs));
        let research = research_stage.gather(&request.problem, cancel).await;
        emit(
            progress,
            ProgressEvent::new(Stage::Research, StageStatus::Completed).with_message(format!(
                "research_backed={}",
                research.search_contributed
            )),
        );

        emit(progress, ProgressEvent::new(Stage::Analysis, StageStatus::Started));
        let builder = TreeBuilder::new(self.gateway.clone())?;
        let validator = MeceValidator::new()?;
        let refinement_loop =
            RefinementLoop::new(builder, validator).with_max_iterations(self.config.refinement.max_iterations);

        let progress_for_iterations = progress.cloned();
        let (tree, report, outcome) = refinement_loop
            .build_validated(
                &request.problem,
                &framework,
                &research.market_research,
                &research.competitor_research,
                research.search_contributed,
                request.custom_l1.as_deref(),
                cancel,
                |iteration, report| {
                    emit(
                        progress_for_iterations.as_ref(),
                        ProgressEvent::new(Stage::Analysis, StageStatus::Progress)
                            .with_iteration(iteration)
                            .with_message(if report.is_mece { "mece" } else { "re-prompting" }),
                    );
                },
            )
            .await?;
        emit(
            progress,
            ProgressEvent::new(Stage::Analysis, StageStatus::Completed)
                .with_message(format!("outcome={outcome:?}, iterations={}", tree.metadata.iterations)),
        );

        emit(progress, ProgressEvent::new(Stage::Prioritization, StageStatus::Started));
        let matrix_generator = MatrixGenerator::new(self.gateway.clone())?;
        let matrix = matrix_generator.hypothesis_prioritization(&tree);
        emit(progress, ProgressEvent::new(Stage::Prioritization, StageStatus::Completed));

        let project_id = request
            .project_id
            .unwrap_or_else(|| uuid::Uuid::new_v4().to_string());

        emit(progress, ProgressEvent::new(Stage::Persist, StageStatus::Started));
        let persisted = self.persist(&project_id, &tree, &matrix, request.description.as_deref());
        emit(
            progress,
            ProgressEvent::new(
                Stage::Persist,
                if persisted { StageStatus::Completed } else { StageStatus::Failed },
            ),
        );

        Ok(RunResult { project_id, tree, report, matrix, outcome, persisted })
    }

    /// Best-effort persistence: a write failure never discards the
    /// in-memory tree/matrix (spec §7 policy), it only flips `persisted`.
    fn persist(&self, project_id: &str, tree: &HypothesisTree, matrix: &Matrix, description: Option<&str>) -> bool {
        if let Err(e) = self.store.save_tree(project_id, tree, description) {
            warn!("failed to persist tree for project '{project_id}': {e}");
            return false;
        }
        if let Err(e) = self.store.save_matrix(project_id, matrix.matrix_type, matrix) {
            warn!("failed to persist matrix for project '{project_id}': {e}");
            return false;
        }
        true
    }
}

fn emit(sink: Option<&mpsc::Sender<ProgressEvent>>, event: ProgressEvent) {
    if let Some(tx) = sink {
        // try_send, not send().await: a full or closed channel must never
        // block the pipeline (spec §4.11).
        let _ = tx.try_send(event);
    }
}
