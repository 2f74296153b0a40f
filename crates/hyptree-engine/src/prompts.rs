//! Prompt templates as data (spec §9: "keep prompt templates as data, not
//! inlined strings"), rendered with explicit named-placeholder substitution —
//! the same `{placeholder}` shape used for template rendering elsewhere in
//! the corpus, generalized from agent-taxonomy prompts to tree-builder and
//! matrix-generator prompts.

use hyptree_core::error::{Error, Result};
use serde::Deserialize;
use std::collections::HashMap;

const PROMPTS_JSON: &str = include_str!("prompts.json");

#[derive(Deserialize)]
pub struct PromptLibrary {
    pub l2_prompt: String,
    pub l3_prompt: String,
    pub market_research_prompt: String,
    pub competitor_research_prompt: String,
    pub risk_register_prompt: String,
    pub task_prioritization_prompt: String,
    pub measurement_priorities_prompt: String,
    pub regenerate_item_prompt: String,
}

impl PromptLibrary {
    /// Parse the bundled `prompts.json`. Malformed bundled data is a
    /// build-time defect, but callers still get a typed `ConfigError`
    /// rather than a panic, matching `Catalog::load`.
    pub fn bundled() -> Result<Self> {
        serde_json::from_str(PROMPTS_JSON)
            .map_err(|e| Error::config(format!("malformed bundled prompts.json: {e}")))
    }
}

/// Substitute `{key}` placeholders. Unused keys are left untouched.
pub fn render(template: &str, vars: &HashMap<&str, String>) -> String {
    let mut out = template.to_string();
    for (key, value) in vars {
        out = out.replace(&format!("{{{key}}}"), value);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bundled_prompts_parse() {
        let lib = PromptLibrary::bundled().expect("bundled prompts.json must parse");
        assert!(lib.l2_prompt.contains("{problem}"));
        assert!(lib.l3_prompt.contains("{l2_label}"));
    }

    #[test]
    fn render_substitutes_placeholders() {
        let mut vars = HashMap::new();
        vars.insert("problem", "Should we scale?".to_string());
        let rendered = render("Problem: {problem}", &vars);
        assert_eq!(rendered, "Problem: Should we scale?");
    }

    #[test]
    fn render_leaves_unknown_placeholders_untouched() {
        let vars = HashMap::new();
        let rendered = render("Problem: {problem}", &vars);
        assert_eq!(rendered, "Problem: {problem}");
    }
}
