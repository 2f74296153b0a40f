//! Matrix Generator (MG) — derives one of four 2x2 matrices from a
//! validated tree or a caller-supplied item set (spec §4.9).

use crate::prompts::{render, PromptLibrary};
use hyptree_core::error::Result;
use hyptree_core::types::{HypothesisTree, L3Leaf, Matrix, MatrixType, Quadrant, QuadrantDef};
use hyptree_llm::LlmGateway;
use serde::Deserialize;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// Score range is 1-5 (spec §4.9); midpoint fixes the quadrant boundary.
const MIDPOINT: u8 = 3;
/// Cap on how much of the tree gets folded into an LLM prompt — enough
/// context for enumeration without an unbounded token budget.
const MAX_SUMMARY_LEAVES: usize = 40;

pub struct MatrixGenerator {
    gateway: Arc<LlmGateway>,
    prompts: PromptLibrary,
}

#[derive(Clone, Debug)]
struct ScoredItem {
    label: String,
    x: u8,
    y: u8,
    rationale: String,
}

#[derive(Deserialize)]
struct RawScoredItem {
    label: String,
    x_score: u8,
    y_score: u8,
    rationale: String,
}

impl MatrixGenerator {
    pub fn new(gateway: Arc<LlmGateway>) -> Result<Self> {
        Ok(Self { gateway, prompts: PromptLibrary::bundled()? })
    }

    /// `hypothesis_prioritization` is derived entirely from the tree with no
    /// LG call (spec §7: "MG kind-1 never fails at the LG layer"). Impact
    /// and Effort are computed structurally from each leaf's `metric_type`
    /// and the length of its `assessment_criteria`/`target` text — an Open
    /// Question resolution recorded in DESIGN.md, since the distilled spec
    /// does not say where kind-1 scores come from.
    pub fn hypothesis_prioritization(&self, tree: &HypothesisTree) -> Matrix {
        let items: Vec<ScoredItem> = tree
            .l1
            .iter()
            .flat_map(|l1| l1.l2.iter())
            .flat_map(|l2| l2.l3.iter())
            .map(|leaf| ScoredItem {
                label: leaf.label.clone(),
                x: effort_score(leaf),
                y: impact_score(leaf),
                rationale: format!("derived from metric_type={:?} and assessment scope", leaf.metric_type),
            })
            .collect();

        build_matrix(MatrixType::HypothesisPrioritization, "Effort", "Impact", items)
    }

    /// Kinds 2-4: enumerate items via an LG call. Failure here is
    /// recoverable — the caller surfaces "not generated" and the tree
    /// remains usable (spec §4.11, §7).
    pub async fn generate(
        &self,
        matrix_type: MatrixType,
        tree: &HypothesisTree,
        cancel: &CancellationToken,
    ) -> Result<Matrix> {
        let (prompt_template, x_label, y_label) = match matrix_type {
            MatrixType::HypothesisPrioritization => {
                return Ok(self.hypothesis_prioritization(tree));
            }
            MatrixType::RiskRegister => (&self.prompts.risk_register_prompt, "Impact", "Likelihood"),
            MatrixType::TaskPrioritization => {
                (&self.prompts.task_prioritization_prompt, "Importance", "Urgency")
            }
            MatrixType::MeasurementPriorities => {
                (&self.prompts.measurement_priorities_prompt, "Feasibility", "Strategic Value")
            }
        };

        let mut vars = HashMap::new();
        vars.insert("problem", tree.problem.clone());
        vars.insert("tree_summary", summarize_tree(tree));
        let prompt = render(prompt_template, &vars);

        let raw: Vec<RawScoredItem> = self.gateway.complete_json(None, &prompt, cancel).await?;
        let items = raw
            .into_iter()
            .map(|r| ScoredItem { label: r.label, x: r.x_score.clamp(1, 5), y: r.y_score.clamp(1, 5), rationale: r.rationale })
            .collect();

        Ok(build_matrix(matrix_type, x_label, y_label, items))
    }

    /// Optional enhancement (spec §9 Open Questions): regenerate a single
    /// item via a fresh LG call, reusing the kind-specific prompt shape.
    pub async fn regenerate_item(
        &self,
        matrix: &Matrix,
        item_label: &str,
        tree: &HypothesisTree,
        cancel: &CancellationToken,
    ) -> Result<Matrix> {
        let mut vars = HashMap::new();
        vars.insert("problem", tree.problem.clone());
        vars.insert("tree_summary", summarize_tree(tree));
        vars.insert("item_label", item_label.to_string());
        let prompt = render(&self.prompts.regenerate_item_prompt, &vars);

        let raw: RawScoredItem = self.gateway.complete_json(None, &prompt, cancel).await?;
        let replacement = ScoredItem {
            label: raw.label,
            x: raw.x_score.clamp(1, 5),
            y: raw.y_score.clamp(1, 5),
            rationale: raw.rationale,
        };

        let without_old = delete_item(matrix, item_label);
        Ok(place_item(&without_old, &replacement))
    }

    pub fn add_item(&self, matrix: &Matrix, label: &str, x_score: u8, y_score: u8, rationale: &str) -> Matrix {
        let item = ScoredItem {
            label: label.to_string(),
            x: x_score.clamp(1, 5),
            y: y_score.clamp(1, 5),
            rationale: rationale.to_string(),
        };
        place_item(matrix, &item)
    }

    pub fn delete_item(&self, matrix: &Matrix, label: &str) -> Matrix {
        delete_item(matrix, label)
    }

    /// Re-scores an existing item in place (same label), recomputing its
    /// quadrant from the new scores.
    pub fn edit_item(&self, matrix: &Matrix, label: &str, x_score: u8, y_score: u8) -> Matrix {
        let without_old = delete_item(matrix, label);
        let item = ScoredItem { label: label.to_string(), x: x_score.clamp(1, 5), y: y_score.clamp(1, 5), rationale: String::new() };
        place_item(&without_old, &item)
    }

    /// Moves an item from one quadrant to another without re-scoring —
    /// the boundary's manual override of an automatic placement.
    pub fn move_item(&self, matrix: &Matrix, label: &str, from: Quadrant, to: Quadrant) -> Matrix {
        let mut out = matrix.clone();
        if let Some(list) = out.placements.get_mut(&from) {
            if let Some(pos) = list.iter().position(|l| l == label) {
                list.remove(pos);
                out.placements.entry(to).or_default().push(label.to_string());
            }
        }
        out.recommendations = build_recommendations(&out.placements);
        out
    }
}

fn delete_item(matrix: &Matrix, label: &str) -> Matrix {
    let mut out = matrix.clone();
    for list in out.placements.values_mut() {
        list.retain(|l| l != label);
    }
    out.recommendations = build_recommendations(&out.placements);
    out
}

fn place_item(matrix: &Matrix, item: &ScoredItem) -> Matrix {
    let mut out = matrix.clone();
    let quadrant = Quadrant::from_scores(item.x, item.y, MIDPOINT);
    out.placements.entry(quadrant).or_default().push(item.label.clone());
    out.recommendations = build_recommendations(&out.placements);
    out
}

fn build_matrix(matrix_type: MatrixType, x_label: &str, y_label: &str, items: Vec<ScoredItem>) -> Matrix {
    let mut placements: BTreeMap<Quadrant, Vec<String>> = BTreeMap::new();
    for item in &items {
        let quadrant = Quadrant::from_scores(item.x, item.y, MIDPOINT);
        placements.entry(quadrant).or_default().push(item.label.clone());
    }
    for q in Quadrant::ALL {
        placements.entry(q).or_default();
    }

    let quadrants = quadrant_defs(matrix_type);
    let recommendations = build_recommendations(&placements);

    Matrix { matrix_type, x_axis_label: x_label.to_string(), y_axis_label: y_label.to_string(), quadrants, placements, recommendations }
}

fn quadrant_defs(matrix_type: MatrixType) -> BTreeMap<Quadrant, QuadrantDef> {
    let specs: [(Quadrant, &str, &str, &str, &str); 4] = match matrix_type {
        MatrixType::HypothesisPrioritization => [
            (Quadrant::Q1, "Quick Wins", "High impact, low effort", "Validate first", "#2e7d32"),
            (Quadrant::Q2, "Strategic Bets", "High impact, high effort", "Plan and resource deliberately", "#1565c0"),
            (Quadrant::Q3, "Fill Later", "Low impact, low effort", "Revisit if capacity allows", "#9e9e9e"),
            (Quadrant::Q4, "Hard Slogs", "Low impact, high effort", "Deprioritize", "#c62828"),
        ],
        MatrixType::RiskRegister => [
            (Quadrant::Q1, "Monitor", "High likelihood, low impact", "Track but do not act yet", "#f9a825"),
            (Quadrant::Q2, "Critical Risks", "High likelihood, high impact", "Mitigate immediately", "#c62828"),
            (Quadrant::Q3, "Accept", "Low likelihood, low impact", "Accept and re-check periodically", "#9e9e9e"),
            (Quadrant::Q4, "Contingency Plan", "Low likelihood, high impact", "Prepare a response plan", "#1565c0"),
        ],
        MatrixType::TaskPrioritization => [
            (Quadrant::Q1, "Delegate", "High urgency, low importance", "Hand off to the team", "#f9a825"),
            (Quadrant::Q2, "Do First", "High urgency, high importance", "Start immediately", "#c62828"),
            (Quadrant::Q3, "Eliminate", "Low urgency, low importance", "Drop unless it recurs", "#9e9e9e"),
            (Quadrant::Q4, "Schedule", "Low urgency, high importance", "Plan for later this cycle", "#1565c0"),
        ],
        MatrixType::MeasurementPriorities => [
            (Quadrant::Q1, "Aspirational Metrics", "High value, low feasibility", "Invest in instrumentation", "#1565c0"),
            (Quadrant::Q2, "Core KPIs", "High value, high feasibility", "Track from day one", "#2e7d32"),
            (Quadrant::Q3, "Deprioritize", "Low value, low feasibility", "Skip for now", "#9e9e9e"),
            (Quadrant::Q4, "Easy But Low Value", "Low value, high feasibility", "Track cheaply as a secondary signal", "#f9a825"),
        ],
    };

    specs
        .into_iter()
        .enumerate()
        .map(|(idx, (position, name, description, action, color))| {
            (
                position,
                QuadrantDef {
                    name: name.to_string(),
                    position,
                    description: description.to_string(),
                    action: action.to_string(),
                    color: Some(color.to_string()),
                    priority: Some((idx + 1) as u8),
                },
            )
        })
        .collect()
}

/// Rule-based recommendations (spec §4.9 step 5): counts per quadrant plus
/// the fixed sequencing hint Q1 -> Q2 -> Q3, with Q4 called out as skipped.
fn build_recommendations(placements: &BTreeMap<Quadrant, Vec<String>>) -> Vec<String> {
    let count = |q: Quadrant| placements.get(&q).map(|v| v.len()).unwrap_or(0);
    vec![
        format!("Q1: {} item(s), Q2: {} item(s), Q3: {} item(s), Q4: {} item(s)", count(Quadrant::Q1), count(Quadrant::Q2), count(Quadrant::Q3), count(Quadrant::Q4)),
        "Suggested sequencing: address Q1 first, then Q2, then Q3 as capacity allows.".to_string(),
        "Q4 items are recommended to be skipped or deprioritized.".to_string(),
    ]
}

fn impact_score(leaf: &L3Leaf) -> u8 {
    match leaf.metric_type {
        hyptree_core::types::MetricType::Quantitative => 4,
        hyptree_core::types::MetricType::Qualitative => 3,
        hyptree_core::types::MetricType::Binary => 2,
    }
}

fn effort_score(leaf: &L3Leaf) -> u8 {
    let words = leaf.assessment_criteria.split_whitespace().count() + leaf.target.split_whitespace().count();
    match words {
        0..=4 => 1,
        5..=8 => 2,
        9..=12 => 3,
        13..=16 => 4,
        _ => 5,
    }
}

fn summarize_tree(tree: &HypothesisTree) -> String {
    let mut lines = Vec::new();
    'outer: for l1 in &tree.l1 {
        lines.push(format!("- {}", l1.label));
        for l2 in &l1.l2 {
            lines.push(format!("  - {}", l2.label));
            for leaf in &l2.l3 {
                lines.push(format!("    - {}", leaf.label));
                if lines.len() >= MAX_SUMMARY_LEAVES {
                    break 'outer;
                }
            }
        }
    }
    lines.join("\n")
}
