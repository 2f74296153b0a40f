//! MECE Validator (MV) — a pure structural and semantic check over a tree
//! (spec §4.7). Sibling overlap detection follows the same tokenize +
//! Jaccard-similarity shape used elsewhere in the corpus for near-duplicate
//! text detection, generalized here from flat text comparison to sibling
//! label comparison at every tree level.

use hyptree_core::error::{Error, Result};
use hyptree_core::types::{HypothesisTree, Issue, IssueSeverity, ValidationIssues, ValidationReport};
use serde::Deserialize;
use std::collections::HashSet;

const MECE_CONFIG_JSON: &str = include_str!("mece_config.json");

/// Semantic-overlap keyword pairs, the gap registry, and the stopword list
/// are all curated data (spec §9 Open Questions: "should be made configurable
/// rather than hardcoded") — bundled the same way the framework catalog is.
#[derive(Deserialize)]
struct MeceConfig {
    stopwords: HashSet<String>,
    semantic_pairs: Vec<(String, String)>,
    gap_registry: std::collections::BTreeMap<String, String>,
    tactical_terms: Vec<String>,
}

impl MeceConfig {
    fn bundled() -> Result<Self> {
        serde_json::from_str(MECE_CONFIG_JSON)
            .map_err(|e| Error::config(format!("malformed bundled mece_config.json: {e}")))
    }
}

pub struct MeceValidator {
    config: MeceConfig,
}

impl MeceValidator {
    /// Loads the bundled MECE config. A malformed bundled asset is a
    /// build-time defect, surfaced as a typed `ConfigError` rather than a
    /// panic — `validate` itself still never fails (spec invariant 6).
    pub fn new() -> Result<Self> {
        Ok(Self { config: MeceConfig::bundled()? })
    }

    /// Pure, deterministic, side-effect-free (spec invariant 6).
    pub fn validate(&self, tree: &HypothesisTree) -> ValidationReport {
        let mut issues = ValidationIssues::default();

        self.check_l1_overlaps(tree, &mut issues);
        for l1 in &tree.l1 {
            self.check_l2_overlaps(l1, &mut issues);
            for l2 in &l1.l2 {
                self.check_l3_overlaps(l1, l2, &mut issues);
            }
        }
        self.check_level_inconsistencies(tree, &mut issues);
        self.check_leaf_completeness(tree, &mut issues);
        self.check_gaps(tree, &mut issues);

        let is_mece = !issues.has_hard_failures();
        let suggestions = build_suggestions(&issues);

        ValidationReport { is_mece, issues, suggestions }
    }

    fn check_l1_overlaps(&self, tree: &HypothesisTree, issues: &mut ValidationIssues) {
        let siblings: Vec<(&str, &str)> = tree.l1.iter().map(|n| (n.key.as_str(), n.label.as_str())).collect();
        self.record_overlaps("l1", &siblings, &mut issues.overlaps);
    }

    fn check_l2_overlaps(&self, l1: &hyptree_core::types::L1Node, issues: &mut ValidationIssues) {
        let siblings: Vec<(&str, &str)> = l1.l2.iter().map(|n| (n.key.as_str(), n.label.as_str())).collect();
        self.record_overlaps(&format!("l1.{}", l1.key), &siblings, &mut issues.overlaps);
    }

    fn check_l3_overlaps(
        &self,
        l1: &hyptree_core::types::L1Node,
        l2: &hyptree_core::types::L2Node,
        issues: &mut ValidationIssues,
    ) {
        let keys: Vec<String> = (0..l2.l3.len()).map(|i| format!("l3[{i}]")).collect();
        let siblings: Vec<(&str, &str)> = keys.iter().zip(l2.l3.iter()).map(|(k, leaf)| (k.as_str(), leaf.label.as_str())).collect();
        self.record_overlaps(&format!("l1.{}.l2.{}", l1.key, l2.key), &siblings, &mut issues.overlaps);
    }

    fn record_overlaps(&self, parent_path: &str, siblings: &[(&str, &str)], overlaps: &mut Vec<Issue>) {
        for i in 0..siblings.len() {
            for j in (i + 1)..siblings.len() {
                let (key_a, label_a) = siblings[i];
                let (key_b, label_b) = siblings[j];
                let tokens_a = self.tokenize(label_a);
                let tokens_b = self.tokenize(label_b);

                let jaccard = jaccard_similarity(&tokens_a, &tokens_b);
                let semantic_hit = self.semantic_pair_matches(&tokens_a, &tokens_b);

                if jaccard >= 0.5 || semantic_hit {
                    overlaps.push(Issue {
                        path: format!("{parent_path}.{key_a},{parent_path}.{key_b}"),
                        description: format!(
                            "Siblings '{label_a}' and '{label_b}' under {parent_path} overlap (jaccard={jaccard:.2}, semantic_pair={semantic_hit})"
                        ),
                        severity: IssueSeverity::Hard,
                    });
                }
            }
        }
    }

    fn check_level_inconsistencies(&self, tree: &HypothesisTree, issues: &mut ValidationIssues) {
        for l1 in &tree.l1 {
            let text = format!("{} {}", l1.label, l1.question).to_lowercase();
            for term in &self.config.tactical_terms {
                if text.contains(term.as_str()) {
                    issues.level_inconsistencies.push(Issue {
                        path: format!("l1.{}", l1.key),
                        description: format!(
                            "L1 category '{}' uses tactical language ('{term}') at a strategic position",
                            l1.label
                        ),
                        severity: IssueSeverity::Hard,
                    });
                }
            }
        }
    }

    /// Leaf completeness (invariant 3) is structural, not about duplication —
    /// routed into `level_inconsistencies` since the data model groups all
    /// hard structural failures there alongside tactical-language violations.
    fn check_leaf_completeness(&self, tree: &HypothesisTree, issues: &mut ValidationIssues) {
        for l1 in &tree.l1 {
            for l2 in &l1.l2 {
                if l2.l3.len() < 3 || l2.l3.len() > 7 {
                    issues.level_inconsistencies.push(Issue {
                        path: format!("l1.{}.l2.{}", l1.key, l2.key),
                        description: format!(
                            "L2 branch '{}' has {} leaves; expected between 3 and 7",
                            l2.label,
                            l2.l3.len()
                        ),
                        severity: IssueSeverity::Hard,
                    });
                }
                for (idx, leaf) in l2.l3.iter().enumerate() {
                    let word_count = leaf.label_word_count();
                    if !leaf.is_complete() {
                        issues.level_inconsistencies.push(Issue {
                            path: format!("l1.{}.l2.{}.l3[{idx}]", l1.key, l2.key),
                            description: format!("Leaf '{}' is missing one or more required fields", leaf.label),
                            severity: IssueSeverity::Hard,
                        });
                    } else if !(2..=4).contains(&word_count) {
                        issues.level_inconsistencies.push(Issue {
                            path: format!("l1.{}.l2.{}.l3[{idx}]", l1.key, l2.key),
                            description: format!(
                                "Leaf label '{}' has {word_count} words; expected 2-4",
                                leaf.label
                            ),
                            severity: IssueSeverity::Hard,
                        });
                    }
                }
            }
        }
    }

    fn check_gaps(&self, tree: &HypothesisTree, issues: &mut ValidationIssues) {
        let problem = tree.problem.to_lowercase();
        let l1_keys: HashSet<String> = tree.l1_keys().into_iter().collect();

        for (keyword, expected_key) in &self.config.gap_registry {
            if problem.contains(keyword.as_str()) && !l1_keys.contains(expected_key) {
                issues.gaps.push(Issue {
                    path: "l1".to_string(),
                    description: format!(
                        "Problem mentions '{keyword}' but no L1 category covers '{expected_key}'"
                    ),
                    severity: IssueSeverity::Soft,
                });
            }
        }
    }

    fn tokenize(&self, text: &str) -> HashSet<String> {
        text.to_lowercase()
            .split_whitespace()
            .map(|w| w.trim_matches(|c: char| !c.is_alphanumeric()).to_string())
            .filter(|w| !w.is_empty() && !self.config.stopwords.contains(w))
            .map(|w| lemmatize(&w))
            .collect()
    }

    fn semantic_pair_matches(&self, a: &HashSet<String>, b: &HashSet<String>) -> bool {
        self.config.semantic_pairs.iter().any(|(x, y)| {
            (a.contains(x) && b.contains(y)) || (a.contains(y) && b.contains(x))
        })
    }
}

/// Minimal suffix-stripping lemmatizer (spec §9 Open Questions: exact
/// stemming algorithm left to the implementer). Strips a single trailing
/// "ing", "ed", or "s" — enough to fold "scaling"/"scale" and
/// "risks"/"risk" together without a full stemming library dependency.
fn lemmatize(word: &str) -> String {
    if let Some(stem) = word.strip_suffix("ing") {
        if stem.len() >= 3 {
            return stem.to_string();
        }
    }
    if let Some(stem) = word.strip_suffix("ed") {
        if stem.len() >= 3 {
            return stem.to_string();
        }
    }
    if let Some(stem) = word.strip_suffix('s') {
        if stem.len() >= 3 && !word.ends_with("ss") {
            return stem.to_string();
        }
    }
    word.to_string()
}

fn jaccard_similarity(a: &HashSet<String>, b: &HashSet<String>) -> f64 {
    if a.is_empty() && b.is_empty() {
        return 1.0;
    }
    let intersection = a.intersection(b).count() as f64;
    let union = a.union(b).count() as f64;
    intersection / union
}

fn build_suggestions(issues: &ValidationIssues) -> Vec<String> {
    let mut suggestions = Vec::new();
    for overlap in &issues.overlaps {
        suggestions.push(format!("Consider merging or re-splitting: {}", overlap.description));
    }
    for gap in &issues.gaps {
        suggestions.push(format!("Consider adding a category for: {}", gap.description));
    }
    for inconsistency in &issues.level_inconsistencies {
        suggestions.push(format!("Fix structural issue: {}", inconsistency.description));
    }
    suggestions
}

#[cfg(test)]
mod tests {
    use super::*;
    use hyptree_core::types::*;

    fn leaf(label: &str) -> L3Leaf {
        L3Leaf {
            label: label.to_string(),
            question: "Does this hold?".to_string(),
            metric_type: MetricType::Qualitative,
            target: "target benchmark".to_string(),
            data_source: "internal reports".to_string(),
            assessment_criteria: "quarterly review".to_string(),
        }
    }

    fn minimal_l2(key: &str, label: &str) -> L2Node {
        L2Node {
            key: key.to_string(),
            label: label.to_string(),
            question: "q".to_string(),
            l3: vec![leaf("Cost Overrun"), leaf("Schedule Slip"), leaf("Scope Creep")],
        }
    }

    fn base_tree(problem: &str, l1_pairs: Vec<(&str, &str)>) -> HypothesisTree {
        HypothesisTree {
            problem: problem.to_string(),
            framework_used: "scale_decision".to_string(),
            generation_mode: GenerationMode::Llm,
            l1: l1_pairs
                .into_iter()
                .map(|(key, label)| L1Node {
                    key: key.to_string(),
                    label: label.to_string(),
                    question: "q".to_string(),
                    l2: vec![minimal_l2("b1", "Branch One")],
                })
                .collect(),
            scoring_rubric: ScoringRubric::default(),
            decision_thresholds: DecisionThresholds::default(),
            metadata: TreeMetadata::default(),
        }
    }

    #[test]
    fn s4_detects_overlap_between_cost_savings_and_financial_impact() {
        let tree = base_tree("Should we cut spending?", vec![("cost", "Cost Savings"), ("fin", "Financial Impact")]);
        let validator = MeceValidator::new().unwrap();
        let report = validator.validate(&tree);
        assert!(!report.is_mece);
        assert!(!report.issues.overlaps.is_empty());
        assert!(!report.suggestions.is_empty());
    }

    #[test]
    fn clean_tree_is_mece() {
        let tree = base_tree(
            "Should we launch this product?",
            vec![("market_fit", "Market Fit"), ("go_to_market", "Go To Market")],
        );
        let validator = MeceValidator::new().unwrap();
        let report = validator.validate(&tree);
        assert!(report.is_mece);
        assert!(report.issues.overlaps.is_empty());
    }

    #[test]
    fn detects_tactical_language_at_l1() {
        let tree = base_tree("Should we proceed?", vec![("deploy_plan", "Deploy the Solution"), ("other", "Budget Review")]);
        let validator = MeceValidator::new().unwrap();
        let report = validator.validate(&tree);
        assert!(!report.is_mece);
        assert!(!report.issues.level_inconsistencies.is_empty());
    }

    #[test]
    fn detects_leaf_cardinality_violation() {
        let mut tree = base_tree("Should we expand?", vec![("a", "Market Position"), ("b", "Operational Readiness")]);
        tree.l1[0].l2[0].l3 = vec![leaf("Only One Leaf")];
        let validator = MeceValidator::new().unwrap();
        let report = validator.validate(&tree);
        assert!(!report.is_mece);
    }

    #[test]
    fn detects_gap_for_healthcare_problem() {
        let tree = base_tree("Should we scale our healthcare rollout?", vec![("ops", "Operational Capacity"), ("fin", "Budget Planning")]);
        let validator = MeceValidator::new().unwrap();
        let report = validator.validate(&tree);
        assert!(!report.issues.gaps.is_empty());
        // gaps never flip is_mece
        assert!(report.is_mece);
    }

    #[test]
    fn validate_is_deterministic() {
        let tree = base_tree("Should we cut spending?", vec![("cost", "Cost Savings"), ("fin", "Financial Impact")]);
        let validator = MeceValidator::new().unwrap();
        let r1 = validator.validate(&tree);
        let r2 = validator.validate(&tree);
        assert_eq!(r1.is_mece, r2.is_mece);
        assert_eq!(r1.issues.overlaps.len(), r2.issues.overlaps.len());
    }

    #[test]
    fn lemmatize_folds_common_suffixes() {
        assert_eq!(lemmatize("scaling"), "scal");
        assert_eq!(lemmatize("risks"), "risk");
        assert_eq!(lemmatize("launched"), "launch");
    }
}
