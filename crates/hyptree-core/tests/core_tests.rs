//! Integration tests for hyptree-core's public surface: serde shapes for
//! the wire/storage representations, and cross-type invariants that only
//! show up once a full tree or matrix is assembled.

use hyptree_core::*;
use std::collections::BTreeMap;

fn sample_leaf(label: &str) -> L3Leaf {
    L3Leaf {
        label: label.to_string(),
        question: "Does this hold?".to_string(),
        metric_type: MetricType::Quantitative,
        target: "20% growth".to_string(),
        data_source: "CRM exports".to_string(),
        assessment_criteria: "monthly review".to_string(),
    }
}

fn sample_tree() -> HypothesisTree {
    HypothesisTree {
        problem: "Should we scale deployment?".to_string(),
        framework_used: "scale_decision".to_string(),
        generation_mode: GenerationMode::LlmResearch,
        l1: vec![L1Node {
            key: "demand".to_string(),
            label: "Demand Validation".to_string(),
            question: "Is demand real?".to_string(),
            l2: vec![L2Node {
                key: "signal".to_string(),
                label: "Demand Signal".to_string(),
                question: "What signals exist?".to_string(),
                l3: vec![sample_leaf("Waitlist Growth"), sample_leaf("Referral Volume"), sample_leaf("Repeat Usage")],
            }],
        }],
        scoring_rubric: ScoringRubric::default(),
        decision_thresholds: DecisionThresholds::default(),
        metadata: TreeMetadata::default(),
    }
}

#[test]
fn generation_mode_serializes_with_research_variant_renamed() {
    let json = serde_json::to_string(&GenerationMode::LlmResearch).unwrap();
    assert_eq!(json, "\"llm+research\"");
    let back: GenerationMode = serde_json::from_str(&json).unwrap();
    assert_eq!(back, GenerationMode::LlmResearch);

    assert_eq!(serde_json::to_string(&GenerationMode::Template).unwrap(), "\"template\"");
    assert_eq!(serde_json::to_string(&GenerationMode::Llm).unwrap(), "\"llm\"");
}

#[test]
fn hypothesis_tree_round_trips_through_json() {
    let tree = sample_tree();
    let json = serde_json::to_string(&tree).unwrap();
    let back: HypothesisTree = serde_json::from_str(&json).unwrap();
    assert_eq!(back.problem, tree.problem);
    assert_eq!(back.l3_labels_dfs(), tree.l3_labels_dfs());
    assert_eq!(back.generation_mode, GenerationMode::LlmResearch);
}

#[test]
fn l3_labels_dfs_is_depth_first_across_multiple_l1_and_l2() {
    let mut tree = sample_tree();
    tree.l1.push(L1Node {
        key: "supply".to_string(),
        label: "Supply Readiness".to_string(),
        question: "Can we deliver?".to_string(),
        l2: vec![L2Node {
            key: "capacity".to_string(),
            label: "Operational Capacity".to_string(),
            question: "Do we have headroom?".to_string(),
            l3: vec![sample_leaf("Staffing Gap"), sample_leaf("Equipment Lead Time"), sample_leaf("Vendor Backlog")],
        }],
    });

    let labels = tree.l3_labels_dfs();
    assert_eq!(labels.len(), 6);
    assert_eq!(labels[0], "Waitlist Growth");
    assert_eq!(labels[3], "Staffing Gap");
}

#[test]
fn issue_severity_defaults_to_soft_when_omitted_from_json() {
    let json = r#"{"path":"l1.a","description":"missing severity field"}"#;
    let issue: Issue = serde_json::from_str(json).unwrap();
    assert_eq!(issue.severity, IssueSeverity::Soft);
}

#[test]
fn validation_issues_hard_failures_ignore_gaps() {
    let mut issues = ValidationIssues::default();
    issues.gaps.push(Issue { path: "l1".into(), description: "missing category".into(), severity: IssueSeverity::Soft });
    assert!(!issues.has_hard_failures());

    issues.overlaps.push(Issue { path: "l1.a,l1.b".into(), description: "overlap".into(), severity: IssueSeverity::Hard });
    assert!(issues.has_hard_failures());
}

#[test]
fn matrix_type_as_str_matches_display() {
    for (variant, expected) in [
        (MatrixType::HypothesisPrioritization, "hypothesis_prioritization"),
        (MatrixType::RiskRegister, "risk_register"),
        (MatrixType::TaskPrioritization, "task_prioritization"),
        (MatrixType::MeasurementPriorities, "measurement_priorities"),
    ] {
        assert_eq!(variant.as_str(), expected);
        assert_eq!(variant.to_string(), expected);
    }
}

#[test]
fn quadrant_serializes_uppercase_for_storage() {
    assert_eq!(serde_json::to_string(&Quadrant::Q2).unwrap(), "\"Q2\"");
}

#[test]
fn tree_record_wraps_content_with_version_metadata() {
    let record = TreeRecord {
        metadata: RecordMetadata {
            project_id: "proj-1".to_string(),
            version: 3,
            timestamp: chrono::Utc::now(),
            description: Some("third pass".to_string()),
        },
        content: sample_tree(),
    };
    let json = serde_json::to_string(&record).unwrap();
    let back: TreeRecord = serde_json::from_str(&json).unwrap();
    assert_eq!(back.metadata.version, 3);
    assert_eq!(back.content.problem, record.content.problem);
}

#[test]
fn progress_event_builder_sets_optional_fields() {
    let event = ProgressEvent::new(Stage::Analysis, StageStatus::Progress)
        .with_iteration(2)
        .with_message("re-prompting");
    assert_eq!(event.stage, Stage::Analysis);
    assert_eq!(event.status, StageStatus::Progress);
    assert_eq!(event.iteration, Some(2));
    assert_eq!(event.message.as_deref(), Some("re-prompting"));
}

#[test]
fn error_display_messages_are_human_readable() {
    let err = Error::FrameworkUnknown("bogus_framework".to_string());
    assert!(err.to_string().contains("bogus_framework"));

    let err = Error::VersionConflict("p1".to_string(), 16);
    assert!(err.to_string().contains("p1"));
}

#[test]
fn matrix_all_items_is_empty_when_placements_is_empty() {
    let matrix = Matrix {
        matrix_type: MatrixType::HypothesisPrioritization,
        x_axis_label: "Effort".to_string(),
        y_axis_label: "Impact".to_string(),
        quadrants: BTreeMap::new(),
        placements: BTreeMap::new(),
        recommendations: vec![],
    };
    assert!(matrix.all_items().is_empty());
}
