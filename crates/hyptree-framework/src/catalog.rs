//! Framework Catalog — loads the bundled framework registry once and serves
//! read-only lookups for the lifetime of the process.

use hyptree_core::error::{Error, Result};
use hyptree_core::types::{DecisionThresholds, Framework, L1Template, L2Seed, ScoringRubric};
use serde::de::{self, MapAccess, Visitor};
use serde::{Deserialize, Deserializer};
use std::collections::BTreeMap;
use std::fmt;
use tracing::debug;

const FRAMEWORKS_JSON: &str = include_str!("frameworks.json");

struct CatalogDoc {
    /// Insertion-ordered, with duplicates preserved, so `Catalog::parse` can
    /// actually see and reject repeated framework names — a derived
    /// `BTreeMap<String, _>` would silently collapse them during parsing.
    frameworks: Vec<(String, RawFramework)>,
}

impl<'de> Deserialize<'de> for CatalogDoc {
    fn deserialize<D>(deserializer: D) -> std::result::Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        struct DocVisitor;

        impl<'de> Visitor<'de> for DocVisitor {
            type Value = CatalogDoc;

            fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
                write!(f, "a catalog document with a `frameworks` object")
            }

            fn visit_map<A>(self, mut map: A) -> std::result::Result<Self::Value, A::Error>
            where
                A: MapAccess<'de>,
            {
                let mut frameworks = None;
                while let Some(key) = map.next_key::<String>()? {
                    if key == "frameworks" {
                        frameworks = Some(map.next_value::<RawFrameworkEntries>()?.0);
                    } else {
                        let _ = map.next_value::<de::IgnoredAny>()?;
                    }
                }
                let frameworks = frameworks.ok_or_else(|| de::Error::missing_field("frameworks"))?;
                Ok(CatalogDoc { frameworks })
            }
        }

        deserializer.deserialize_map(DocVisitor)
    }
}

/// Deserializes a JSON object into an ordered `Vec` of its entries instead of
/// a map, so duplicate keys reach the caller rather than being overwritten.
struct RawFrameworkEntries(Vec<(String, RawFramework)>);

impl<'de> Deserialize<'de> for RawFrameworkEntries {
    fn deserialize<D>(deserializer: D) -> std::result::Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        struct EntriesVisitor;

        impl<'de> Visitor<'de> for EntriesVisitor {
            type Value = RawFrameworkEntries;

            fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
                write!(f, "a map of framework name to framework definition")
            }

            fn visit_map<A>(self, mut map: A) -> std::result::Result<Self::Value, A::Error>
            where
                A: MapAccess<'de>,
            {
                let mut entries = Vec::with_capacity(map.size_hint().unwrap_or(0));
                while let Some(entry) = map.next_entry::<String, RawFramework>()? {
                    entries.push(entry);
                }
                Ok(RawFrameworkEntries(entries))
            }
        }

        deserializer.deserialize_map(EntriesVisitor)
    }
}

#[derive(Deserialize)]
struct RawFramework {
    display_name: String,
    description: String,
    #[serde(default)]
    trigger_phrases: Vec<String>,
    #[serde(default)]
    l1_categories: Vec<RawL1>,
    #[serde(default)]
    scoring_rubric: ScoringRubric,
    #[serde(default)]
    decision_thresholds: DecisionThresholds,
}

#[derive(Deserialize)]
struct RawL1 {
    key: String,
    label: String,
    question: String,
    description: String,
    #[serde(default)]
    l2_branches: Vec<RawL2>,
}

#[derive(Deserialize)]
struct RawL2 {
    key: String,
    label: String,
    question: String,
    #[serde(default)]
    suggested_l3: Vec<String>,
}

/// Load-once, read-only registry of strategic frameworks (spec §4.1, §9
/// "Global mutable catalog" — injected into pipeline construction, never a
/// process-wide singleton).
pub struct Catalog {
    /// Preserves catalog insertion order for `find_by_trigger` scan order.
    frameworks: Vec<Framework>,
    index: BTreeMap<String, usize>,
}

impl Catalog {
    /// Parse the bundled `frameworks.json`. The only way this fails is a
    /// malformed bundled document, which is a build-time defect, not a
    /// runtime condition — callers still get a typed `ConfigError`.
    pub fn load() -> Result<Self> {
        Self::parse(FRAMEWORKS_JSON)
    }

    fn parse(raw: &str) -> Result<Self> {
        let doc: CatalogDoc = serde_json::from_str(raw)
            .map_err(|e| Error::config(format!("malformed framework catalog: {e}")))?;

        let mut frameworks = Vec::with_capacity(doc.frameworks.len());
        let mut index = BTreeMap::new();

        for (name, raw_fw) in doc.frameworks {
            if index.contains_key(&name) {
                return Err(Error::config(format!("duplicate framework name: {name}")));
            }
            if name != "custom" && raw_fw.l1_categories.is_empty() {
                return Err(Error::config(format!(
                    "framework '{name}' has no l1_categories (only 'custom' may be empty)"
                )));
            }

            let l1_categories = raw_fw
                .l1_categories
                .into_iter()
                .map(|l1| L1Template {
                    key: l1.key,
                    label: l1.label,
                    question: l1.question,
                    description: l1.description,
                    l2_seeds: l1
                        .l2_branches
                        .into_iter()
                        .map(|l2| L2Seed {
                            key: l2.key,
                            label: l2.label,
                            question: l2.question,
                            suggested_l3_labels: l2.suggested_l3,
                        })
                        .collect(),
                })
                .collect();

            index.insert(name.clone(), frameworks.len());
            frameworks.push(Framework {
                name,
                display_name: raw_fw.display_name,
                description: raw_fw.description,
                trigger_phrases: raw_fw.trigger_phrases,
                l1_categories,
                scoring_rubric: raw_fw.scoring_rubric,
                decision_thresholds: raw_fw.decision_thresholds,
            });
        }

        debug!("loaded {} frameworks from bundled catalog", frameworks.len());
        Ok(Self { frameworks, index })
    }

    pub fn list_frameworks(&self) -> Vec<String> {
        self.frameworks.iter().map(|f| f.name.clone()).collect()
    }

    pub fn get(&self, name: &str) -> Option<&Framework> {
        self.index.get(name).map(|&i| &self.frameworks[i])
    }

    /// Case-insensitive substring scan over every framework's trigger
    /// phrases, in catalog insertion order; returns the first match.
    pub fn find_by_trigger(&self, phrase: &str) -> Option<&Framework> {
        let haystack = phrase.to_lowercase();
        self.frameworks.iter().find(|fw| {
            fw.trigger_phrases
                .iter()
                .any(|trigger| haystack.contains(&trigger.to_lowercase()))
        })
    }

    pub fn describe_all(&self) -> BTreeMap<String, String> {
        self.frameworks
            .iter()
            .map(|f| (f.name.clone(), f.description.clone()))
            .collect()
    }
}
