//! Framework Selector — maps a problem statement to a framework (spec §4.2).

use crate::catalog::Catalog;
use hyptree_core::error::{Error, Result};
use hyptree_core::types::Framework;
use tracing::info;

const DEFAULT_FRAMEWORK: &str = "scale_decision";

pub struct FrameworkSelector<'a> {
    catalog: &'a Catalog,
}

impl<'a> FrameworkSelector<'a> {
    pub fn new(catalog: &'a Catalog) -> Self {
        Self { catalog }
    }

    /// If `hint` names a known framework, use it. Otherwise scan trigger
    /// phrases over `problem`; fall back to `scale_decision` if nothing
    /// matches. A `hint` naming an unknown framework is the only failure mode.
    pub fn select(&self, problem: &str, hint: Option<&str>) -> Result<Framework> {
        if let Some(hint) = hint {
            return self
                .catalog
                .get(hint)
                .cloned()
                .ok_or_else(|| Error::FrameworkUnknown(hint.to_string()));
        }

        if let Some(fw) = self.catalog.find_by_trigger(problem) {
            info!("selected framework '{}' by trigger match", fw.name);
            return Ok(fw.clone());
        }

        info!("no trigger match, defaulting to '{DEFAULT_FRAMEWORK}'");
        self.catalog
            .get(DEFAULT_FRAMEWORK)
            .cloned()
            .ok_or_else(|| Error::config("catalog is missing the default framework"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn s1_selects_scale_decision_by_trigger() {
        let catalog = Catalog::load().unwrap();
        let selector = FrameworkSelector::new(&catalog);
        let fw = selector
            .select("Should we scale deployment of fall detection in senior living?", None)
            .unwrap();
        assert_eq!(fw.name, "scale_decision");
        assert_eq!(fw.l1_keys().len(), 3);
    }

    #[test]
    fn s2_explicit_hint_overrides_trigger_scan() {
        let catalog = Catalog::load().unwrap();
        let selector = FrameworkSelector::new(&catalog);
        let fw = selector
            .select("Why did Q4 revenue decline 15% year-over-year?", Some("hypothesis_issue_tree"))
            .unwrap();
        assert_eq!(fw.name, "hypothesis_issue_tree");
        assert_eq!(fw.l1_keys().len(), 3);
    }

    #[test]
    fn s3_unknown_hint_fails() {
        let catalog = Catalog::load().unwrap();
        let selector = FrameworkSelector::new(&catalog);
        let err = selector.select("Should we expand?", Some("nonexistent_framework")).unwrap_err();
        assert!(matches!(err, Error::FrameworkUnknown(_)));
    }

    #[test]
    fn falls_back_to_default_when_no_trigger_matches() {
        let catalog = Catalog::load().unwrap();
        let selector = FrameworkSelector::new(&catalog);
        let fw = selector.select("completely unrelated text with no triggers at all", None).unwrap();
        assert_eq!(fw.name, DEFAULT_FRAMEWORK);
    }
}
