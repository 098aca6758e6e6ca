//! Model artifacts found under the model root.
//!
//! Handles classification into handling strategies, cache-key derivation,
//! and the per-kind codecs that turn a file into cache writes.

pub mod classifier;
pub mod codec;
pub mod key;
pub mod pickle;
pub mod vector;

pub use classifier::{classify, explain, Rule, RULES};
pub use codec::{
    codec_for, decompose_result, ArtifactCodec, Blob, CacheWrite, CodecError, EncodedArtifact,
    MappedArtifact,
};
pub use key::{KeyError, KeyScheme};

use std::fmt;
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

use crate::catalog::ServingModule;

/// Handling strategy assigned to a file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ArtifactKind {
    /// ONNX graph stored through the tensor-model primitive.
    TensorModel,
    /// JSON model configuration, published as raw bytes.
    ConfigDocument,
    /// Plain pickle, published as raw bytes.
    GenericBlob,
    /// Joblib-compressed pickle, published as raw bytes.
    CompressedBlob,
    /// Three back-to-back pickles decomposed into per-feature/per-day entries.
    CompositeStatisticalModel,
    /// Document-vector model bundled with its array sidecars.
    TextVectorModel,
    Ignored,
}

impl ArtifactKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ArtifactKind::TensorModel => "tensor-model",
            ArtifactKind::ConfigDocument => "config-document",
            ArtifactKind::GenericBlob => "generic-blob",
            ArtifactKind::CompressedBlob => "compressed-blob",
            ArtifactKind::CompositeStatisticalModel => "composite-statistical-model",
            ArtifactKind::TextVectorModel => "text-vector-model",
            ArtifactKind::Ignored => "ignored",
        }
    }

    /// File suffix stripped when deriving the cache key.
    pub fn key_suffix(&self) -> Option<&'static str> {
        match self {
            ArtifactKind::TensorModel => Some(".onnx"),
            ArtifactKind::ConfigDocument => Some(".json"),
            ArtifactKind::GenericBlob
            | ArtifactKind::CompressedBlob
            | ArtifactKind::CompositeStatisticalModel => Some(".pkl"),
            ArtifactKind::TextVectorModel => Some(".model"),
            ArtifactKind::Ignored => None,
        }
    }
}

impl fmt::Display for ArtifactKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A classified file, owned by the loader for the duration of one pass.
#[derive(Debug, Clone)]
pub struct Artifact {
    pub path: PathBuf,
    pub kind: ArtifactKind,
    pub owning_module: Option<ServingModule>,
    pub owning_target_id: Option<String>,
    /// Modification time in seconds since the epoch.
    pub mtime: f64,
}

impl Artifact {
    /// Classify `path` and read its modification time.
    pub fn inspect(path: &Path) -> std::io::Result<Self> {
        let modified = std::fs::metadata(path)?.modified()?;
        let (owning_module, owning_target_id) = owner_of(path);
        Ok(Self {
            path: path.to_path_buf(),
            kind: classify(&path.to_string_lossy()),
            owning_module,
            owning_target_id,
            mtime: epoch_seconds(modified),
        })
    }

    /// Freshness tag recorded with a published tensor model.
    pub fn freshness_tag(&self) -> String {
        format_tag(self.mtime)
    }
}

/// Seconds since the epoch with sub-second precision.
pub fn epoch_seconds(time: SystemTime) -> f64 {
    time.duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs_f64())
        .unwrap_or(0.0)
}

pub fn format_tag(mtime: f64) -> String {
    format!("{mtime}")
}

/// Module directory and target id (`<module>/<inst_type>/<target_id>/...`).
pub fn owner_of(path: &Path) -> (Option<ServingModule>, Option<String>) {
    let segments: Vec<String> = path
        .components()
        .map(|c| c.as_os_str().to_string_lossy().into_owned())
        .collect();
    for (idx, segment) in segments.iter().enumerate() {
        if let Some(module) = ServingModule::parse(segment) {
            // target id sits two levels below the module, above the file itself
            let target = segments
                .get(idx + 2)
                .filter(|_| idx + 2 < segments.len() - 1)
                .cloned();
            return (Some(module), target);
        }
    }
    (None, None)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_owner_of_target_path() {
        let path = Path::new("/home/model/102/exem_aiops_anls_inst/was/1201/seqattn/model.onnx");
        let (module, target) = owner_of(path);
        assert_eq!(module, Some(ServingModule::InstanceAnomaly));
        assert_eq!(target.as_deref(), Some("1201"));
    }

    #[test]
    fn test_owner_of_file_directly_under_type() {
        let path = Path::new("/home/model/102/exem_aiops_load_fcst/was/config.json");
        let (module, target) = owner_of(path);
        assert_eq!(module, Some(ServingModule::LoadForecast));
        assert_eq!(target, None);
    }

    #[test]
    fn test_key_suffix_per_kind() {
        assert_eq!(ArtifactKind::TensorModel.key_suffix(), Some(".onnx"));
        assert_eq!(ArtifactKind::CompositeStatisticalModel.key_suffix(), Some(".pkl"));
        assert_eq!(ArtifactKind::Ignored.key_suffix(), None);
    }

    #[test]
    fn test_format_tag_is_stable() {
        assert_eq!(format_tag(1700000000.25), "1700000000.25");
        assert_eq!(format_tag(1700000000.25), format_tag(1700000000.25));
    }
}
