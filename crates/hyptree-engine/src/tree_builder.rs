//! Tree Builder (TB) — synthesizes a `HypothesisTree` from a framework,
//! problem statement, and research context (spec §4.6). Fixed L1 from the
//! framework template; L2 and L3 populated via the LLM Gateway, one call per
//! slot, falling back to the framework's seed content on an unrecoverable
//! LG error or a content-rule violation.

use crate::prompts::{render, PromptLibrary};
use hyptree_core::error::{Error, Result};
use hyptree_core::types::{
    DecisionThresholds, Framework, GenerationMode, HypothesisTree, L1Node, L1Template, L2Node,
    L2Seed, L3Leaf, MetricType, ScoringRubric, TreeMetadata, ValidationReport,
};
use hyptree_llm::LlmGateway;
use serde::Deserialize;
use std::collections::HashMap;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::warn;

/// Caller-supplied L1 for the `custom` framework, whose `l1_categories` is
/// empty (spec §3: "`custom` framework may have empty `l1_categories`").
#[derive(Clone, Debug)]
pub struct CustomL1 {
    pub key: String,
    pub label: String,
    pub question: String,
}

pub struct TreeBuilder {
    gateway: Arc<LlmGateway>,
    prompts: PromptLibrary,
}

#[derive(Deserialize)]
struct RawL2Item {
    key: String,
    label: String,
    question: String,
}

#[derive(Deserialize)]
struct RawL3Item {
    label: String,
    question: String,
    metric_type: MetricType,
    target: String,
    data_source: String,
    assessment_criteria: String,
}

impl TreeBuilder {
    pub fn new(gateway: Arc<LlmGateway>) -> Result<Self> {
        Ok(Self { gateway, prompts: PromptLibrary::bundled()? })
    }

    /// Builds a complete tree. `custom_l1` is only consulted when
    /// `framework.is_custom()`; it is ignored otherwise.
    #[allow(clippy::too_many_arguments)]
    pub async fn build(
        &self,
        problem: &str,
        framework: &Framework,
        market_context: &str,
        competitor_context: &str,
        research_backed: bool,
        prior_report: Option<&ValidationReport>,
        custom_l1: Option<&[CustomL1]>,
        cancel: &CancellationToken,
    ) -> Result<HypothesisTree> {
        let l1_templates = self.resolve_l1_templates(framework, custom_l1)?;
        let feedback = render_feedback(prior_report);
        let mut fallbacks = Vec::new();
        let mut l1_nodes = Vec::with_capacity(l1_templates.len());

        for l1_template in &l1_templates {
            let l2_nodes = self
                .build_l2(
                    problem,
                    l1_template,
                    market_context,
                    competitor_context,
                    &feedback,
                    &mut fallbacks,
                    cancel,
                )
                .await?;

            l1_nodes.push(L1Node {
                key: l1_template.key.clone(),
                label: l1_template.label.clone(),
                question: l1_template.question.clone(),
                l2: l2_nodes,
            });
        }

        if l1_nodes.iter().all(|n| n.l2.is_empty()) && !l1_nodes.is_empty() {
            return Err(Error::pipeline(
                "tree builder produced no L2 content even from fallbacks",
            ));
        }

        // Every L1's L2 content collapsed to framework seed fallback — the
        // tree is effectively template-derived rather than LLM-derived,
        // regardless of whether research context was supplied.
        let fully_collapsed_to_template = !l1_templates.is_empty()
            && l1_templates.iter().all(|l1| {
                fallbacks.iter().any(|f| f.starts_with(&format!("l1.{}: l2", l1.key)))
            });

        let generation_mode = if fully_collapsed_to_template {
            GenerationMode::Template
        } else if research_backed {
            GenerationMode::LlmResearch
        } else {
            GenerationMode::Llm
        };

        Ok(HypothesisTree {
            problem: problem.to_string(),
            framework_used: framework.name.clone(),
            generation_mode,
            l1: l1_nodes,
            scoring_rubric: framework.scoring_rubric.clone(),
            decision_thresholds: framework.decision_thresholds.clone(),
            metadata: TreeMetadata { fallbacks, iterations: 0 },
        })
    }

    fn resolve_l1_templates(
        &self,
        framework: &Framework,
        custom_l1: Option<&[CustomL1]>,
    ) -> Result<Vec<L1Template>> {
        if framework.is_custom() {
            let custom_l1 = custom_l1.ok_or_else(|| {
                Error::pipeline("custom framework requires caller-supplied L1 categories")
            })?;
            return Ok(custom_l1
                .iter()
                .map(|c| L1Template {
                    key: c.key.clone(),
                    label: c.label.clone(),
                    question: c.question.clone(),
                    description: String::new(),
                    l2_seeds: Vec::new(),
                })
                .collect());
        }
        Ok(framework.l1_categories.clone())
    }

    async fn build_l2(
        &self,
        problem: &str,
        l1: &L1Template,
        market_context: &str,
        competitor_context: &str,
        feedback: &str,
        fallbacks: &mut Vec<String>,
        cancel: &CancellationToken,
    ) -> Result<Vec<L2Node>> {
        let seed_labels = l1
            .l2_seeds
            .iter()
            .map(|s| s.label.as_str())
            .collect::<Vec<_>>()
            .join(", ");

        let mut vars = HashMap::new();
        vars.insert("problem", problem.to_string());
        vars.insert("l1_label", l1.label.clone());
        vars.insert("l1_question", l1.question.clone());
        vars.insert("market_context", empty_as_none(market_context));
        vars.insert("competitor_context", empty_as_none(competitor_context));
        vars.insert("feedback", empty_as_none(feedback));
        vars.insert("seed_labels", empty_as_none(&seed_labels));
        let prompt = render(&self.prompts.l2_prompt, &vars);

        let raw: Result<Vec<RawL2Item>> = self.gateway.complete_json(None, &prompt, cancel).await;

        let items = match raw {
            Ok(items) if valid_l2_batch(&items, competitor_context) => items,
            Ok(_) => {
                warn!("L2 batch for '{}' failed content rules, falling back to seeds", l1.key);
                fallbacks.push(format!("l1.{}: l2 content rules violated, used seed content", l1.key));
                return self.l2_from_seeds(l1, fallbacks, problem, market_context, competitor_context, feedback, cancel).await;
            }
            Err(e) => {
                warn!("L2 call for '{}' failed ({e}), falling back to seeds", l1.key);
                fallbacks.push(format!("l1.{}: l2 generation failed ({e}), used seed content", l1.key));
                return self.l2_from_seeds(l1, fallbacks, problem, market_context, competitor_context, feedback, cancel).await;
            }
        };

        let mut nodes = Vec::with_capacity(items.len());
        for item in items {
            let seed = l1.l2_seeds.iter().find(|s| s.key == item.key);
            let l3 = self
                .build_l3(
                    problem,
                    &l1.label,
                    &item.label,
                    &item.question,
                    market_context,
                    competitor_context,
                    feedback,
                    seed,
                    &item.key,
                    fallbacks,
                    cancel,
                )
                .await?;
            nodes.push(L2Node { key: item.key, label: item.label, question: item.question, l3 });
        }
        Ok(nodes)
    }

    /// Whole-L1 fallback: synthesize L2Node entries directly from the
    /// framework's seed content, one per `L2Seed`.
    #[allow(clippy::too_many_arguments)]
    async fn l2_from_seeds(
        &self,
        l1: &L1Template,
        fallbacks: &mut Vec<String>,
        problem: &str,
        market_context: &str,
        competitor_context: &str,
        feedback: &str,
        cancel: &CancellationToken,
    ) -> Result<Vec<L2Node>> {
        let mut nodes = Vec::with_capacity(l1.l2_seeds.len());
        for seed in &l1.l2_seeds {
            let l3 = self
                .build_l3(
                    problem,
                    &l1.label,
                    &seed.label,
                    &seed.question,
                    market_context,
                    competitor_context,
                    feedback,
                    Some(seed),
                    &seed.key,
                    fallbacks,
                    cancel,
                )
                .await?;
            nodes.push(L2Node {
                key: seed.key.clone(),
                label: seed.label.clone(),
                question: seed.question.clone(),
                l3,
            });
        }
        Ok(nodes)
    }

    #[allow(clippy::too_many_arguments)]
    async fn build_l3(
        &self,
        problem: &str,
        l1_label: &str,
        l2_label: &str,
        l2_question: &str,
        market_context: &str,
        competitor_context: &str,
        feedback: &str,
        seed: Option<&L2Seed>,
        l2_key: &str,
        fallbacks: &mut Vec<String>,
        cancel: &CancellationToken,
    ) -> Result<Vec<L3Leaf>> {
        let mut vars = HashMap::new();
        vars.insert("problem", problem.to_string());
        vars.insert("l1_label", l1_label.to_string());
        vars.insert("l2_label", l2_label.to_string());
        vars.insert("l2_question", l2_question.to_string());
        vars.insert("market_context", empty_as_none(market_context));
        vars.insert("competitor_context", empty_as_none(competitor_context));
        vars.insert("feedback", empty_as_none(feedback));
        let prompt = render(&self.prompts.l3_prompt, &vars);

        let raw: Result<Vec<RawL3Item>> = self.gateway.complete_json(None, &prompt, cancel).await;

        match raw {
            Ok(items) if valid_l3_batch(&items, competitor_context) => Ok(items
                .into_iter()
                .map(|i| L3Leaf {
                    label: i.label,
                    question: i.question,
                    metric_type: i.metric_type,
                    target: i.target,
                    data_source: i.data_source,
                    assessment_criteria: i.assessment_criteria,
                })
                .collect()),
            Ok(_) => {
                warn!("L3 batch for '{l2_key}' failed content rules, falling back to seed labels");
                fallbacks.push(format!("l2.{l2_key}: l3 content rules violated, used seed labels"));
                Ok(l3_from_seed(seed))
            }
            Err(e) => {
                warn!("L3 call for '{l2_key}' failed ({e}), falling back to seed labels");
                fallbacks.push(format!("l2.{l2_key}: l3 generation failed ({e}), used seed labels"));
                Ok(l3_from_seed(seed))
            }
        }
    }
}

/// Synthesizes complete `L3Leaf`s from a seed's `suggested_l3_labels`,
/// padding to the 3-leaf minimum with generic follow-up items and
/// truncating to the 7-leaf maximum (spec §3: `3 <= |l3| <= 7`).
fn l3_from_seed(seed: Option<&L2Seed>) -> Vec<L3Leaf> {
    let mut labels: Vec<String> = seed.map(|s| s.suggested_l3_labels.clone()).unwrap_or_default();
    let mut pad_idx = 1;
    while labels.len() < 3 {
        labels.push(format!("Additional Review {pad_idx}"));
        pad_idx += 1;
    }
    labels.truncate(7);

    labels
        .into_iter()
        .map(|label| L3Leaf {
            label,
            question: "Does the evidence support this hypothesis?".to_string(),
            metric_type: MetricType::Qualitative,
            target: "to be defined during analysis".to_string(),
            data_source: "internal review".to_string(),
            assessment_criteria: "qualitative assessment by the project team".to_string(),
        })
        .collect()
}

fn valid_l2_batch(items: &[RawL2Item], competitor_context: &str) -> bool {
    let vendors = vendor_tokens(competitor_context);
    (2..=5).contains(&items.len())
        && items
            .iter()
            .all(|i| is_valid_label(&i.label, &vendors) && is_valid_question(&i.question))
}

fn valid_l3_batch(items: &[RawL3Item], competitor_context: &str) -> bool {
    let vendors = vendor_tokens(competitor_context);
    (3..=7).contains(&items.len())
        && items.iter().all(|i| {
            is_valid_label(&i.label, &vendors)
                && is_valid_question(&i.question)
                && !i.target.trim().is_empty()
                && !i.data_source.trim().is_empty()
                && !i.assessment_criteria.trim().is_empty()
        })
}

/// Capitalized tokens in the competitor research text, taken as candidate
/// vendor names for the label post-check (spec §4.6: "vendor token list is
/// derived from the competitor research text... not hardcoded"). A small
/// stoplist filters out generic capitalized words (sentence starts, common
/// nouns) that would otherwise false-positive on every label.
fn vendor_tokens(competitor_context: &str) -> std::collections::HashSet<String> {
    const GENERIC_CAPITALIZED: &[&str] = &[
        "the", "a", "an", "this", "that", "these", "those", "our", "their", "its", "we", "they",
        "it", "in", "on", "at", "for", "with", "and", "or", "but", "market", "markets",
        "research", "competitor", "competitors", "industry", "company", "companies",
    ];
    competitor_context
        .split(|c: char| !c.is_alphanumeric())
        .filter(|w| w.len() >= 2)
        .filter(|w| w.chars().next().is_some_and(|c| c.is_uppercase()))
        .map(|w| w.to_lowercase())
        .filter(|w| !GENERIC_CAPITALIZED.contains(&w.as_str()))
        .collect()
}

/// Content rule: 2-4 words, no digit, no vendor token (spec §4.6).
fn is_valid_label(label: &str, vendors: &std::collections::HashSet<String>) -> bool {
    let words = label.split_whitespace().count();
    (2..=4).contains(&words)
        && !label.chars().any(|c| c.is_ascii_digit())
        && !label
            .split_whitespace()
            .any(|w| vendors.contains(&w.trim_matches(|c: char| !c.is_alphanumeric()).to_lowercase()))
}

/// Content rule: question is at most 20 words (spec §4.6 applies this bound
/// to L3; reused for L2 since both schemas require "one sentence").
fn is_valid_question(question: &str) -> bool {
    let words = question.split_whitespace().count();
    words >= 1 && words <= 20
}

fn empty_as_none(text: &str) -> String {
    if text.trim().is_empty() {
        "(none)".to_string()
    } else {
        text.to_string()
    }
}

fn render_feedback(report: Option<&ValidationReport>) -> String {
    let Some(report) = report else { return String::new() };
    if report.is_mece {
        return String::new();
    }
    let mut lines = Vec::new();
    for issue in &report.issues.overlaps {
        lines.push(format!("overlap: {}", issue.description));
    }
    for issue in &report.issues.level_inconsistencies {
        lines.push(format!("structural: {}", issue.description));
    }
    for suggestion in &report.suggestions {
        lines.push(format!("suggestion: {suggestion}"));
    }
    lines.join("\n")
}
