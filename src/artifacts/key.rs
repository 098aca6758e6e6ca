//! Cache key derivation.
//!
//! A key is the artifact path relative to the model-root anchor, joined with
//! `/`, with the kind's file suffix removed. Every server walking the same
//! tree derives the same keys.

use std::path::{Component, Path, PathBuf};
use std::sync::OnceLock;

use regex::Regex;
use thiserror::Error;

use super::{Artifact, ArtifactKind};
use crate::catalog::ServingModule;

#[derive(Error, Debug, PartialEq, Eq)]
pub enum KeyError {
    #[error("Path is outside the model root {anchor}: {path}")]
    OutsideAnchor { anchor: PathBuf, path: PathBuf },

    #[error("Path yields an empty key: {0}")]
    Empty(PathBuf),
}

/// Name of the directory every deployment keeps artifacts under.
const ANCHOR_SEGMENT: &str = "model";

fn strip_system_id(key: &str) -> String {
    static PREFIX: OnceLock<Option<Regex>> = OnceLock::new();
    match PREFIX.get_or_init(|| Regex::new(r"^\d+/").ok()) {
        Some(re) => re.replace(key, "").into_owned(),
        None => key.to_string(),
    }
}

/// Derives cache keys relative to a fixed anchor directory.
#[derive(Debug, Clone)]
pub struct KeyScheme {
    anchor: PathBuf,
}

impl KeyScheme {
    pub fn new(anchor: impl Into<PathBuf>) -> Self {
        Self {
            anchor: anchor.into(),
        }
    }

    pub fn anchor(&self) -> &Path {
        &self.anchor
    }

    /// Key for `path` with `suffix` stripped from the last segment.
    pub fn key_for(&self, path: &Path, suffix: Option<&str>) -> Result<String, KeyError> {
        let segments = self.relative_segments(path)?;
        let mut key = segments.join("/");
        if let Some(suffix) = suffix {
            if let Some(stripped) = key.strip_suffix(suffix) {
                key.truncate(stripped.len());
            }
        }
        if key.is_empty() {
            return Err(KeyError::Empty(path.to_path_buf()));
        }
        Ok(key)
    }

    /// Key for a service-module file: the leading system-id segment is dropped.
    pub fn service_key(&self, path: &Path, suffix: Option<&str>) -> Result<String, KeyError> {
        let key = self.key_for(path, suffix)?;
        let trimmed = strip_system_id(&key);
        if trimmed.is_empty() {
            return Err(KeyError::Empty(path.to_path_buf()));
        }
        Ok(trimmed)
    }

    /// Primary key of a classified artifact.
    pub fn artifact_key(&self, artifact: &Artifact) -> Result<String, KeyError> {
        let suffix = artifact.kind.key_suffix();
        let service_scoped = artifact.owning_module == Some(ServingModule::ServiceAnomaly)
            && artifact.kind == ArtifactKind::ConfigDocument;
        if service_scoped {
            self.service_key(&artifact.path, suffix)
        } else {
            self.key_for(&artifact.path, suffix)
        }
    }

    fn relative_segments(&self, path: &Path) -> Result<Vec<String>, KeyError> {
        if let Ok(rel) = path.strip_prefix(&self.anchor) {
            return Ok(normal_segments(rel));
        }

        // Fall back to whatever follows the last `model` directory.
        let segments = normal_segments(path);
        let last_dir = segments.len().saturating_sub(1);
        match segments[..last_dir]
            .iter()
            .rposition(|s| s == ANCHOR_SEGMENT)
        {
            Some(idx) => Ok(segments[idx + 1..].to_vec()),
            None => Err(KeyError::OutsideAnchor {
                anchor: self.anchor.clone(),
                path: path.to_path_buf(),
            }),
        }
    }
}

fn normal_segments(path: &Path) -> Vec<String> {
    path.components()
        .filter_map(|c| match c {
            Component::Normal(s) => Some(s.to_string_lossy().into_owned()),
            _ => None,
        })
        .collect()
}
