//! Domain model for the hypothesis tree engine (spec §3)

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// A named strategic decomposition template, loaded once and read-only for
/// the lifetime of the process (spec §3, §9 "Global mutable catalog").
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Framework {
    pub name: String,
    pub display_name: String,
    pub description: String,
    pub trigger_phrases: Vec<String>,
    pub l1_categories: Vec<L1Template>,
    pub scoring_rubric: ScoringRubric,
    pub decision_thresholds: DecisionThresholds,
}

impl Framework {
    pub fn l1_keys(&self) -> Vec<String> {
        self.l1_categories.iter().map(|t| t.key.clone()).collect()
    }

    pub fn is_custom(&self) -> bool {
        self.name == "custom"
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct L1Template {
    pub key: String,
    pub label: String,
    pub question: String,
    pub description: String,
    pub l2_seeds: Vec<L2Seed>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct L2Seed {
    pub key: String,
    pub label: String,
    pub question: String,
    pub suggested_l3_labels: Vec<String>,
}

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct ScoringRubric {
    #[serde(default)]
    pub criteria: Vec<String>,
    #[serde(default)]
    pub weights: BTreeMap<String, f64>,
}

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct DecisionThresholds {
    #[serde(default)]
    pub go: Option<f64>,
    #[serde(default)]
    pub no_go: Option<f64>,
    #[serde(default)]
    pub notes: Option<String>,
}

/// How the lower levels of a tree were populated.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GenerationMode {
    Template,
    Llm,
    #[serde(rename = "llm+research")]
    LlmResearch,
}

impl std::fmt::Display for GenerationMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Template => write!(f, "template"),
            Self::Llm => write!(f, "llm"),
            Self::LlmResearch => write!(f, "llm+research"),
        }
    }
}

/// The full three-level MECE hypothesis tree.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct HypothesisTree {
    pub problem: String,
    pub framework_used: String,
    pub generation_mode: GenerationMode,
    /// Ordered by insertion — preserves framework L1 order.
    pub l1: Vec<L1Node>,
    pub scoring_rubric: ScoringRubric,
    pub decision_thresholds: DecisionThresholds,
    pub metadata: TreeMetadata,
}

impl HypothesisTree {
    /// All L3 leaf labels, in depth-first order — used by the
    /// `hypothesis_prioritization` matrix and by S1/S7 property checks.
    pub fn l3_labels_dfs(&self) -> Vec<String> {
        self.l1
            .iter()
            .flat_map(|n| n.l2.iter())
            .flat_map(|n| n.l3.iter())
            .map(|leaf| leaf.label.clone())
            .collect()
    }

    pub fn l1_keys(&self) -> Vec<String> {
        self.l1.iter().map(|n| n.key.clone()).collect()
    }
}

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct TreeMetadata {
    #[serde(default)]
    pub fallbacks: Vec<String>,
    #[serde(default)]
    pub iterations: u32,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct L1Node {
    pub key: String,
    pub label: String,
    pub question: String,
    pub l2: Vec<L2Node>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct L2Node {
    pub key: String,
    pub label: String,
    pub question: String,
    pub l3: Vec<L3Leaf>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MetricType {
    Quantitative,
    Qualitative,
    Binary,
}

/// A leaf hypothesis. Has no identity beyond its position in the tree.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct L3Leaf {
    pub label: String,
    pub question: String,
    pub metric_type: MetricType,
    pub target: String,
    pub data_source: String,
    pub assessment_criteria: String,
}

impl L3Leaf {
    /// Invariant 3: all six fields non-empty.
    pub fn is_complete(&self) -> bool {
        !self.label.trim().is_empty()
            && !self.question.trim().is_empty()
            && !self.target.trim().is_empty()
            && !self.data_source.trim().is_empty()
            && !self.assessment_criteria.trim().is_empty()
    }

    pub fn label_word_count(&self) -> usize {
        self.label.split_whitespace().count()
    }
}

// ---------------------------------------------------------------------------
// Validation report (MV output)
// ---------------------------------------------------------------------------

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct ValidationReport {
    pub is_mece: bool,
    pub issues: ValidationIssues,
    pub suggestions: Vec<String>,
}

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct ValidationIssues {
    pub overlaps: Vec<Issue>,
    pub gaps: Vec<Issue>,
    pub level_inconsistencies: Vec<Issue>,
}

impl ValidationIssues {
    pub fn has_hard_failures(&self) -> bool {
        !self.overlaps.is_empty() || !self.level_inconsistencies.is_empty()
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Issue {
    /// Dotted path to the offending node(s), e.g. "l1.cost,l1.financial".
    pub path: String,
    pub description: String,
    #[serde(default)]
    pub severity: IssueSeverity,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IssueSeverity {
    Hard,
    Soft,
}

impl Default for IssueSeverity {
    fn default() -> Self {
        Self::Soft
    }
}

// ---------------------------------------------------------------------------
// Matrix (MG output)
// ---------------------------------------------------------------------------

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MatrixType {
    HypothesisPrioritization,
    RiskRegister,
    TaskPrioritization,
    MeasurementPriorities,
}

impl MatrixType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::HypothesisPrioritization => "hypothesis_prioritization",
            Self::RiskRegister => "risk_register",
            Self::TaskPrioritization => "task_prioritization",
            Self::MeasurementPriorities => "measurement_priorities",
        }
    }
}

impl std::fmt::Display for MatrixType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize, Hash, PartialOrd, Ord)]
#[serde(rename_all = "UPPERCASE")]
pub enum Quadrant {
    Q1,
    Q2,
    Q3,
    Q4,
}

impl Quadrant {
    pub const ALL: [Quadrant; 4] = [Quadrant::Q1, Quadrant::Q2, Quadrant::Q3, Quadrant::Q4];

    /// Canonical quadrant mapping: y=high selects {Q1,Q2}, x=high selects {Q2,Q4}.
    pub fn from_scores(x: u8, y: u8, midpoint: u8) -> Self {
        let x_high = x >= midpoint;
        let y_high = y >= midpoint;
        match (x_high, y_high) {
            (false, true) => Quadrant::Q1,
            (true, true) => Quadrant::Q2,
            (false, false) => Quadrant::Q3,
            (true, false) => Quadrant::Q4,
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct QuadrantDef {
    pub name: String,
    pub position: Quadrant,
    pub description: String,
    pub action: String,
    #[serde(default)]
    pub color: Option<String>,
    #[serde(default)]
    pub priority: Option<u8>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Matrix {
    pub matrix_type: MatrixType,
    pub x_axis_label: String,
    pub y_axis_label: String,
    pub quadrants: BTreeMap<Quadrant, QuadrantDef>,
    pub placements: BTreeMap<Quadrant, Vec<String>>,
    pub recommendations: Vec<String>,
}

impl Matrix {
    /// Invariant 4: placements partition the source item set.
    pub fn all_items(&self) -> Vec<String> {
        Quadrant::ALL
            .iter()
            .flat_map(|q| self.placements.get(q).cloned().unwrap_or_default())
            .collect()
    }
}

// ---------------------------------------------------------------------------
// Persisted records (PS)
// ---------------------------------------------------------------------------

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RecordMetadata {
    pub project_id: String,
    pub version: u64,
    pub timestamp: chrono::DateTime<chrono::Utc>,
    #[serde(default)]
    pub description: Option<String>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct TreeRecord {
    pub metadata: RecordMetadata,
    pub content: HypothesisTree,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct MatrixRecord {
    pub metadata: RecordMetadata,
    pub content: Matrix,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct VersionMeta {
    pub version: u64,
    pub timestamp: chrono::DateTime<chrono::Utc>,
    #[serde(default)]
    pub description: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn quadrant_mapping_matches_s5() {
        // Items A(5,1) B(1,5) C(5,5) D(1,1), axes (y=Impact, x=Effort), midpoint=3
        assert_eq!(Quadrant::from_scores(1, 5, 3), Quadrant::Q1); // A: x=1(low) y=5(high)
        assert_eq!(Quadrant::from_scores(5, 1, 3), Quadrant::Q4); // B: x=5(high) y=1(low)
        assert_eq!(Quadrant::from_scores(5, 5, 3), Quadrant::Q2); // C: high/high
        assert_eq!(Quadrant::from_scores(1, 1, 3), Quadrant::Q3); // D: low/low
    }

    #[test]
    fn leaf_completeness() {
        let leaf = L3Leaf {
            label: "Cost Overrun".into(),
            question: "Will costs exceed budget?".into(),
            metric_type: MetricType::Quantitative,
            target: "< 10% overrun".into(),
            data_source: "internal finance reports".into(),
            assessment_criteria: "monthly budget review".into(),
        };
        assert!(leaf.is_complete());
        assert_eq!(leaf.label_word_count(), 2);

        let incomplete = L3Leaf { target: String::new(), ..leaf };
        assert!(!incomplete.is_complete());
    }

    #[test]
    fn generation_mode_display() {
        assert_eq!(GenerationMode::Template.to_string(), "template");
        assert_eq!(GenerationMode::LlmResearch.to_string(), "llm+research");
    }

    #[test]
    fn matrix_all_items_preserves_quadrant_order() {
        let mut placements = BTreeMap::new();
        placements.insert(Quadrant::Q1, vec!["a".to_string()]);
        placements.insert(Quadrant::Q4, vec!["b".to_string()]);
        let m = Matrix {
            matrix_type: MatrixType::HypothesisPrioritization,
            x_axis_label: "Effort".into(),
            y_axis_label: "Impact".into(),
            quadrants: BTreeMap::new(),
            placements,
            recommendations: vec![],
        };
        assert_eq!(m.all_items(), vec!["a".to_string(), "b".to_string()]);
    }
}
