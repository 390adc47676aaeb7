use std::collections::{BTreeMap, HashMap};
use std::fs;
use std::io::Write;

use camino::{Utf8Path, Utf8PathBuf};
use directories::BaseDirs;

use crate::domain::ReferenceId;
use crate::error::RvarError;
use crate::fs_util::write_atomic;

/// Reference id -> keywords, persisted as one JSON object between runs.
#[derive(Debug, Clone)]
pub struct KeywordStore {
    path: Utf8PathBuf,
}

impl KeywordStore {
    pub fn new(path: impl Into<Utf8PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// `~/.cache/rvar-data/keywords.json`
    pub fn default_path() -> Result<Utf8PathBuf, RvarError> {
        BaseDirs::new()
            .and_then(|dirs| {
                Utf8PathBuf::from_path_buf(
                    dirs.home_dir()
                        .join(".cache")
                        .join("rvar-data")
                        .join("keywords.json"),
                )
                .ok()
            })
            .ok_or_else(|| RvarError::Filesystem("unable to resolve cache directory".to_string()))
    }

    pub fn path(&self) -> &Utf8Path {
        &self.path
    }

    /// Empty when the file does not exist yet.
    pub fn load(&self) -> Result<HashMap<ReferenceId, Vec<String>>, RvarError> {
        if !self.path.as_std_path().exists() {
            return Ok(HashMap::new());
        }
        let content = fs::read_to_string(self.path.as_std_path())
            .map_err(|err| RvarError::Filesystem(format!("read {}: {err}", self.path)))?;
        let entries: BTreeMap<ReferenceId, Vec<String>> = serde_json::from_str(&content)
            .map_err(|err| RvarError::Filesystem(format!("parse {}: {err}", self.path)))?;
        Ok(entries.into_iter().collect())
    }

    pub fn save(&self, entries: &HashMap<ReferenceId, Vec<String>>) -> Result<(), RvarError> {
        let sorted: BTreeMap<&ReferenceId, &Vec<String>> = entries.iter().collect();
        let content = serde_json::to_vec_pretty(&sorted)
            .map_err(|err| RvarError::Filesystem(err.to_string()))?;
        write_atomic(&self.path, |out| {
            out.write_all(&content)
                .map_err(|err| RvarError::Filesystem(format!("write {}: {err}", self.path)))
        })
    }
}
