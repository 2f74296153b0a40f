//! Refinement Loop (RL) — bounded iteration that feeds validator feedback
//! back into the tree builder until MECE-acceptable or the iteration cap is
//! reached (spec §4.8). State machine: BUILDING -> VALIDATING -> DONE_OK |
//! BUILDING (next round) | DONE_CAPPED.

use crate::mece_validator::MeceValidator;
use crate::tree_builder::{CustomL1, TreeBuilder};
use hyptree_core::error::Result;
use hyptree_core::types::{Framework, HypothesisTree, ValidationReport};
use tokio_util::sync::CancellationToken;
use tracing::info;

const DEFAULT_MAX_ITERATIONS: u32 = 3;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RlOutcome {
    DoneOk,
    DoneCapped,
}

pub struct RefinementLoop {
    builder: TreeBuilder,
    validator: MeceValidator,
    max_iterations: u32,
}

impl RefinementLoop {
    pub fn new(builder: TreeBuilder, validator: MeceValidator) -> Self {
        Self { builder, validator, max_iterations: DEFAULT_MAX_ITERATIONS }
    }

    /// Iteration cap is configurable 1-5 (spec §4.8); values outside that
    /// range are clamped rather than rejected.
    pub fn with_max_iterations(mut self, max_iterations: u32) -> Self {
        self.max_iterations = max_iterations.clamp(1, 5);
        self
    }

    /// Runs the BUILDING/VALIDATING cycle to a terminal state. `on_iteration`
    /// is invoked once per completed iteration so the caller (the
    /// orchestrator) can emit a progress event; it never gates control flow.
    #[allow(clippy::too_many_arguments)]
    pub async fn build_validated(
        &self,
        problem: &str,
        framework: &Framework,
        market_context: &str,
        competitor_context: &str,
        research_backed: bool,
        custom_l1: Option<&[CustomL1]>,
        cancel: &CancellationToken,
        mut on_iteration: impl FnMut(u32, &ValidationReport),
    ) -> Result<(HypothesisTree, ValidationReport, RlOutcome)> {
        let mut prior_report: Option<ValidationReport> = None;
        let mut iteration: u32 = 0;

        loop {
            iteration += 1;

            let mut tree = self
                .builder
                .build(
                    problem,
                    framework,
                    market_context,
                    competitor_context,
                    research_backed,
                    prior_report.as_ref(),
                    custom_l1,
                    cancel,
                )
                .await?;
            tree.metadata.iterations = iteration;

            let report = self.validator.validate(&tree);
            on_iteration(iteration, &report);

            if report.is_mece {
                info!("RL reached DONE_OK after {iteration} iteration(s)");
                return Ok((tree, report, RlOutcome::DoneOk));
            }

            // Cancellation is checked at the iteration boundary only — the
            // in-flight iteration always completes (spec §5: "a cancellation
            // observed ... during RL completes the current iteration and
            // returns DONE_CAPPED").
            if iteration >= self.max_iterations || cancel.is_cancelled() {
                info!(
                    "RL reached DONE_CAPPED after {iteration} iteration(s) (cancelled={})",
                    cancel.is_cancelled()
                );
                return Ok((tree, report, RlOutcome::DoneCapped));
            }

            prior_report = Some(report);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hyptree_framework::Catalog;
    use hyptree_llm::provider::{LlmProvider, LlmResult};
    use hyptree_llm::types::{LlmRequest, LlmResponse, Usage};
    use hyptree_llm::LlmGateway;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    /// Always returns overlapping L1... wait, L2/L3 content — here we craft
    /// L2/L3 batches that are well-formed but whose labels are duplicated
    /// across the two branches within an L1, which keeps every iteration
    /// bouncing off the overlap check so the loop is guaranteed to cap.
    struct RepeatingOverlapProvider;

    #[async_trait::async_trait]
    impl LlmProvider for RepeatingOverlapProvider {
        fn name(&self) -> &str {
            "repeating-overlap"
        }
        async fn complete(&self, request: LlmRequest) -> LlmResult<LlmResponse> {
            let prompt = &request.messages[0].content;
            let text = if prompt.contains("Return a JSON array of 2 to 5 objects") {
                r#"[{"key":"a","label":"Cost Savings","question":"Will this save cost?"},{"key":"b","label":"Financial Impact","question":"What is the financial impact?"}]"#
            } else {
                r#"[{"label":"Budget Overrun","question":"Will the budget overrun?","metric_type":"quantitative","target":"<5% overrun","data_source":"finance ledger","assessment_criteria":"quarterly review"},{"label":"Timeline Slip","question":"Will the timeline slip?","metric_type":"quantitative","target":"<2 weeks slip","data_source":"project tracker","assessment_criteria":"monthly review"},{"label":"Scope Creep","question":"Will scope expand unexpectedly?","metric_type":"qualitative","target":"no more than one change","data_source":"change log","assessment_criteria":"steering committee review"}]"#
            };
            Ok(LlmResponse { text: text.to_string(), usage: Usage::default(), stop_reason: None })
        }
    }

    fn gateway(provider: impl LlmProvider + 'static) -> Arc<LlmGateway> {
        Arc::new(
            LlmGateway::new(Arc::new(provider))
                .with_retry_policy(hyptree_llm::RetryPolicy { max_attempts: 1, delays_ms: vec![1] }),
        )
    }

    #[tokio::test]
    async fn caps_at_max_iterations_when_never_mece() {
        let catalog = Catalog::load().unwrap();
        let framework = catalog.get("scale_decision").unwrap();

        let builder = TreeBuilder::new(gateway(RepeatingOverlapProvider)).unwrap();
        let rl = RefinementLoop::new(builder, MeceValidator::new().unwrap()).with_max_iterations(2);

        let seen_iterations = Arc::new(std::sync::Mutex::new(Vec::new()));
        let seen_iterations_clone = seen_iterations.clone();

        let (tree, report, outcome) = rl
            .build_validated(
                "Should we cut spending?",
                framework,
                "",
                "",
                false,
                None,
                &CancellationToken::new(),
                |iter, rep| seen_iterations_clone.lock().unwrap().push((iter, rep.is_mece)),
            )
            .await
            .unwrap();

        assert_eq!(outcome, RlOutcome::DoneCapped);
        assert!(!report.is_mece);
        assert_eq!(tree.metadata.iterations, 2);
        assert_eq!(seen_iterations.lock().unwrap().len(), 2);
    }

    struct CleanProvider;

    #[async_trait::async_trait]
    impl LlmProvider for CleanProvider {
        fn name(&self) -> &str {
            "clean"
        }
        async fn complete(&self, request: LlmRequest) -> LlmResult<LlmResponse> {
            let prompt = &request.messages[0].content;
            let text = if prompt.contains("Return a JSON array of 2 to 5 objects") {
                r#"[{"key":"a","label":"Demand Validation","question":"Is demand real?"},{"key":"b","label":"Supply Readiness","question":"Can we deliver?"}]"#
            } else {
                r#"[{"label":"Waitlist Growth","question":"Is the waitlist growing?","metric_type":"quantitative","target":"20% MoM","data_source":"CRM exports","assessment_criteria":"monthly review"},{"label":"Referral Volume","question":"Are referrals increasing?","metric_type":"quantitative","target":"15% of signups","data_source":"product analytics","assessment_criteria":"weekly review"},{"label":"Repeat Usage","question":"Do users return?","metric_type":"quantitative","target":"40% retention","data_source":"product analytics","assessment_criteria":"cohort review"}]"#
            };
            Ok(LlmResponse { text: text.to_string(), usage: Usage::default(), stop_reason: None })
        }
    }

    #[tokio::test]
    async fn s2_reaches_done_ok_within_three_iterations() {
        let catalog = Catalog::load().unwrap();
        let framework = catalog.get("hypothesis_issue_tree").unwrap();
        assert_eq!(framework.l1_categories.len(), 3);

        let builder = TreeBuilder::new(gateway(CleanProvider)).unwrap();
        let rl = RefinementLoop::new(builder, MeceValidator::new().unwrap());

        let iterations = Arc::new(AtomicUsize::new(0));
        let iterations_clone = iterations.clone();

        let (_, report, outcome) = rl
            .build_validated(
                "Why did Q4 revenue decline 15% year-over-year?",
                framework,
                "",
                "",
                false,
                None,
                &CancellationToken::new(),
                move |_, _| {
                    iterations_clone.fetch_add(1, Ordering::SeqCst);
                },
            )
            .await
            .unwrap();

        assert_eq!(outcome, RlOutcome::DoneOk);
        assert!(report.is_mece);
        assert!(iterations.load(Ordering::SeqCst) <= 3);
    }

    #[test]
    fn max_iterations_clamped_to_spec_range() {
        let catalog = Catalog::load().unwrap();
        let _ = catalog; // keep import used across module without dead-code warnings in doctest-like cfg
        let builder = TreeBuilder::new(gateway(CleanProvider)).unwrap();
        let rl = RefinementLoop::new(builder, MeceValidator::new().unwrap()).with_max_iterations(99);
        assert_eq!(rl.max_iterations, 5);
        let builder2 = TreeBuilder::new(gateway(CleanProvider)).unwrap();
        let rl2 = RefinementLoop::new(builder2, MeceValidator::new().unwrap()).with_max_iterations(0);
        assert_eq!(rl2.max_iterations, 1);
    }
}
