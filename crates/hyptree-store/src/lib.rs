//! hyptree-store - Project Store (PS): durable, versioned persistence of
//! hypothesis trees and matrices (spec §4.10, §6). Writes are atomic
//! create-if-not-exists on the target version file; a losing concurrent
//! writer observes `AlreadyExists` and retries at the next version.

use chrono::Utc;
use hyptree_core::error::{Error, Result};
use hyptree_core::types::{
    HypothesisTree, Matrix, MatrixRecord, MatrixType, RecordMetadata, TreeRecord, VersionMeta,
};
use std::collections::BTreeMap;
use std::fs::{self, OpenOptions};
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

const MAX_VERSION_CONFLICT_RETRIES: u32 = 16;
const TREE_KIND: &str = "hypothesis_tree";

pub struct ProjectStore {
    root: PathBuf,
}

impl ProjectStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn save_tree(
        &self,
        project_id: &str,
        tree: &HypothesisTree,
        description: Option<&str>,
    ) -> Result<VersionMeta> {
        let project_id = sanitize_project_id(project_id);
        let dir = self.project_dir(&project_id);
        fs::create_dir_all(&dir)?;

        write_versioned(&dir, TREE_KIND, &project_id, description, |meta| TreeRecord {
            metadata: meta,
            content: tree.clone(),
        })
    }

    pub fn load_tree(&self, project_id: &str, version: Option<u64>) -> Result<TreeRecord> {
        let project_id = sanitize_project_id(project_id);
        let dir = self.project_dir(&project_id);
        let version = match version {
            Some(v) => v,
            None => self
                .latest_version(&dir, TREE_KIND)
                .ok_or_else(|| Error::NotFound(format!("{project_id}: no hypothesis tree saved")))?,
        };
        read_record(&dir, TREE_KIND, version)
    }

    pub fn list_tree_versions(&self, project_id: &str) -> Result<Vec<VersionMeta>> {
        let project_id = sanitize_project_id(project_id);
        let dir = self.project_dir(&project_id);
        self.list_versions(&dir, TREE_KIND)
    }

    pub fn save_matrix(
        &self,
        project_id: &str,
        matrix_type: MatrixType,
        matrix: &Matrix,
    ) -> Result<VersionMeta> {
        let project_id = sanitize_project_id(project_id);
        let dir = self.project_dir(&project_id);
        fs::create_dir_all(&dir)?;

        let kind = matrix_kind(matrix_type);
        write_versioned(&dir, &kind, &project_id, None, |meta| MatrixRecord {
            metadata: meta,
            content: matrix.clone(),
        })
    }

    pub fn load_matrix(
        &self,
        project_id: &str,
        matrix_type: MatrixType,
        version: Option<u64>,
    ) -> Result<MatrixRecord> {
        let project_id = sanitize_project_id(project_id);
        let dir = self.project_dir(&project_id);
        let kind = matrix_kind(matrix_type);
        let version = match version {
            Some(v) => v,
            None => self.latest_version(&dir, &kind).ok_or_else(|| {
                Error::NotFound(format!("{project_id}: no {kind} matrix saved"))
            })?,
        };
        read_record(&dir, &kind, version)
    }

    pub fn list_project_matrices(&self, project_id: &str) -> Result<BTreeMap<String, Vec<VersionMeta>>> {
        let project_id = sanitize_project_id(project_id);
        let dir = self.project_dir(&project_id);
        let mut out = BTreeMap::new();
        for matrix_type in [
            MatrixType::HypothesisPrioritization,
            MatrixType::RiskRegister,
            MatrixType::TaskPrioritization,
            MatrixType::MeasurementPriorities,
        ] {
            let kind = matrix_kind(matrix_type);
            let versions = self.list_versions(&dir, &kind)?;
            if !versions.is_empty() {
                out.insert(matrix_type.as_str().to_string(), versions);
            }
        }
        Ok(out)
    }

    pub fn get_all(&self, project_id: &str) -> Result<ProjectSnapshot> {
        let tree = match self.load_tree(project_id, None) {
            Ok(record) => Some(record),
            Err(Error::NotFound(_)) => None,
            Err(e) => return Err(e),
        };

        let mut matrices = BTreeMap::new();
        for matrix_type in [
            MatrixType::HypothesisPrioritization,
            MatrixType::RiskRegister,
            MatrixType::TaskPrioritization,
            MatrixType::MeasurementPriorities,
        ] {
            match self.load_matrix(project_id, matrix_type, None) {
                Ok(record) => {
                    matrices.insert(matrix_type, Some(record));
                }
                Err(Error::NotFound(_)) => {
                    matrices.insert(matrix_type, None);
                }
                Err(e) => return Err(e),
            }
        }

        Ok(ProjectSnapshot { tree, matrices })
    }

    fn project_dir(&self, project_id: &str) -> PathBuf {
        self.root.join(project_id)
    }

    fn latest_version(&self, dir: &Path, kind: &str) -> Option<u64> {
        list_version_files(dir, kind).into_iter().map(|(v, _)| v).max()
    }

    fn list_versions(&self, dir: &Path, kind: &str) -> Result<Vec<VersionMeta>> {
        let mut files = list_version_files(dir, kind);
        files.sort_by_key(|(v, _)| *v);

        let mut metas = Vec::with_capacity(files.len());
        for (version, path) in files {
            let raw = fs::read_to_string(&path)?;
            let meta: RecordMetaOnly = serde_json::from_str(&raw)?;
            debug_assert_eq!(meta.metadata.version, version);
            metas.push(meta.metadata);
        }
        Ok(metas)
    }
}

pub struct ProjectSnapshot {
    pub tree: Option<TreeRecord>,
    pub matrices: BTreeMap<MatrixType, Option<MatrixRecord>>,
}

#[derive(serde::Deserialize)]
struct RecordMetaOnly {
    metadata: RecordMetadata,
}

fn matrix_kind(matrix_type: MatrixType) -> String {
    format!("matrix_{}", matrix_type.as_str())
}

fn version_file_name(kind: &str, version: u64) -> String {
    format!("{kind}_v{version}.json")
}

fn list_version_files(dir: &Path, kind: &str) -> Vec<(u64, PathBuf)> {
    let Ok(entries) = fs::read_dir(dir) else { return Vec::new() };
    let prefix = format!("{kind}_v");
    entries
        .filter_map(|e| e.ok())
        .filter_map(|e| {
            let path = e.path();
            let name = path.file_name()?.to_str()?.to_string();
            let version_part = name.strip_prefix(&prefix)?.strip_suffix(".json")?;
            let version: u64 = version_part.parse().ok()?;
            Some((version, path))
        })
        .collect()
}

fn write_versioned<T: serde::Serialize>(
    dir: &Path,
    kind: &str,
    project_id: &str,
    description: Option<&str>,
    wrap: impl Fn(RecordMetadata) -> T,
) -> Result<VersionMeta> {
    let mut candidate_version = list_version_files(dir, kind).into_iter().map(|(v, _)| v).max().unwrap_or(0) + 1;

    for attempt in 0..MAX_VERSION_CONFLICT_RETRIES {
        let path = dir.join(version_file_name(kind, candidate_version));
        let timestamp = Utc::now();
        let metadata = RecordMetadata {
            project_id: project_id.to_string(),
            version: candidate_version,
            timestamp,
            description: description.map(str::to_string),
        };
        let record = wrap(metadata.clone());
        let serialized = serde_json::to_vec_pretty(&record)?;

        match OpenOptions::new().write(true).create_new(true).open(&path) {
            Ok(mut file) => {
                file.write_all(&serialized)?;
                debug!("wrote {} version {candidate_version} for {project_id}", kind);
                return Ok(VersionMeta { version: candidate_version, timestamp, description: metadata.description });
            }
            Err(e) if e.kind() == ErrorKind::AlreadyExists => {
                warn!("version {candidate_version} for {project_id}/{kind} lost the race on attempt {attempt}, retrying");
                candidate_version += 1;
                continue;
            }
            Err(e) => return Err(Error::Io(e)),
        }
    }

    Err(Error::VersionConflict(format!("{project_id}/{kind}"), MAX_VERSION_CONFLICT_RETRIES))
}

fn read_record<T: serde::de::DeserializeOwned>(dir: &Path, kind: &str, version: u64) -> Result<T> {
    let path = dir.join(version_file_name(kind, version));
    let raw = fs::read(&path).map_err(|e| match e.kind() {
        ErrorKind::NotFound => Error::NotFound(format!("{}: version {version} not found", dir.display())),
        _ => Error::Io(e),
    })?;
    Ok(serde_json::from_slice(&raw)?)
}

/// Replaces any character outside `[A-Za-z0-9_-]` with `_`, then trims and
/// collapses repeated underscores (spec §6).
pub fn sanitize_project_id(raw: &str) -> String {
    let replaced: String = raw
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '_' || c == '-' { c } else { '_' })
        .collect();

    let mut collapsed = String::with_capacity(replaced.len());
    let mut last_was_underscore = false;
    for c in replaced.chars() {
        if c == '_' {
            if last_was_underscore {
                continue;
            }
            last_was_underscore = true;
        } else {
            last_was_underscore = false;
        }
        collapsed.push(c);
    }
    collapsed.trim_matches('_').to_string()
}
