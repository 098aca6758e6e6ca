//! Per-kind artifact codecs.
//!
//! A codec turns one classified file into the list of cache writes that
//! publish it. Codecs do blocking file I/O and are run off the async
//! executor by the loader. Failures are per file; the caller logs and skips.

use std::fs::File;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use memmap2::Mmap;
use serde_json::Value as Json;
use thiserror::Error;

use super::key::KeyError;
use super::{pickle, vector, Artifact, ArtifactKind};
use crate::cache::{CacheError, CacheStore, ModelBackend, ModelDevice, ModelMeta};

#[derive(Error, Debug)]
pub enum CodecError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Pickle framing error: {0}")]
    Framing(String),

    #[error("Pickle decode error: {0}")]
    Decode(#[from] serde_pickle::Error),

    #[error("Unexpected artifact layout: {0}")]
    LayoutMismatch(String),

    #[error("Bundle error: {0}")]
    Bundle(String),

    #[error("Key error: {0}")]
    Key(#[from] KeyError),

    #[error("Empty artifact: {0}")]
    Empty(PathBuf),
}

/// Memory-mapped artifact file for zero-copy publishing.
pub struct MappedArtifact {
    mmap: Mmap,
}

impl MappedArtifact {
    pub fn open(path: &Path) -> Result<Self, CodecError> {
        let file = File::open(path)?;
        // SAFETY: mapped read-only; artifacts are not rewritten while a pass reads them.
        let mmap = unsafe { Mmap::map(&file)? };
        Ok(Self { mmap })
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.mmap
    }

    pub fn len(&self) -> usize {
        self.mmap.len()
    }

    pub fn is_empty(&self) -> bool {
        self.mmap.is_empty()
    }
}

impl std::fmt::Debug for MappedArtifact {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MappedArtifact")
            .field("len", &self.mmap.len())
            .finish()
    }
}

/// Payload bytes shared by every replica write.
#[derive(Debug, Clone)]
pub enum Blob {
    Owned(Arc<[u8]>),
    Mapped(Arc<MappedArtifact>),
}

impl Blob {
    pub fn as_bytes(&self) -> &[u8] {
        match self {
            Blob::Owned(bytes) => &bytes[..],
            Blob::Mapped(mapped) => mapped.as_bytes(),
        }
    }

    pub fn len(&self) -> usize {
        self.as_bytes().len()
    }

    pub fn is_empty(&self) -> bool {
        self.as_bytes().is_empty()
    }
}

impl From<Vec<u8>> for Blob {
    fn from(bytes: Vec<u8>) -> Self {
        Blob::Owned(bytes.into())
    }
}

/// One write against a cache store.
#[derive(Debug, Clone)]
pub enum CacheWrite {
    Model { key: String, meta: ModelMeta, blob: Blob },
    Bytes { key: String, value: Blob },
    Document { key: String, doc: Json },
}

impl CacheWrite {
    pub fn key(&self) -> &str {
        match self {
            CacheWrite::Model { key, .. }
            | CacheWrite::Bytes { key, .. }
            | CacheWrite::Document { key, .. } => key,
        }
    }

    pub async fn apply(&self, store: &dyn CacheStore) -> Result<(), CacheError> {
        match self {
            CacheWrite::Model { key, meta, blob } => {
                store.model_store(key, meta, blob.as_bytes()).await
            }
            CacheWrite::Bytes { key, value } => store.set(key, value.as_bytes()).await,
            CacheWrite::Document { key, doc } => store.json_set(key, doc).await,
        }
    }
}

/// Everything needed to publish one artifact.
#[derive(Debug, Clone)]
pub struct EncodedArtifact {
    pub primary_key: String,
    pub kind: ArtifactKind,
    pub writes: Vec<CacheWrite>,
    /// Freshness tag for tensor models; other kinds are always republished.
    pub freshness: Option<String>,
}

impl EncodedArtifact {
    pub fn keys(&self) -> Vec<String> {
        self.writes.iter().map(|w| w.key().to_string()).collect()
    }
}

/// Serializes one kind of artifact.
pub trait ArtifactCodec: Send + Sync {
    fn kind(&self) -> ArtifactKind;

    fn encode(&self, artifact: &Artifact, key: &str) -> Result<EncodedArtifact, CodecError>;
}

/// Codec for a kind, `None` for ignored files.
pub fn codec_for(kind: ArtifactKind) -> Option<&'static dyn ArtifactCodec> {
    static TENSOR: TensorCodec = TensorCodec;
    static CONFIG: RawCodec = RawCodec(ArtifactKind::ConfigDocument);
    static GENERIC: RawCodec = RawCodec(ArtifactKind::GenericBlob);
    static COMPRESSED: RawCodec = RawCodec(ArtifactKind::CompressedBlob);
    static COMPOSITE: CompositeCodec = CompositeCodec;
    static VECTOR: VectorCodec = VectorCodec;

    match kind {
        ArtifactKind::TensorModel => Some(&TENSOR),
        ArtifactKind::ConfigDocument => Some(&CONFIG),
        ArtifactKind::GenericBlob => Some(&GENERIC),
        ArtifactKind::CompressedBlob => Some(&COMPRESSED),
        ArtifactKind::CompositeStatisticalModel => Some(&COMPOSITE),
        ArtifactKind::TextVectorModel => Some(&VECTOR),
        ArtifactKind::Ignored => None,
    }
}

/// ONNX graph, stored through the model primitive with its freshness tag.
pub struct TensorCodec;

impl ArtifactCodec for TensorCodec {
    fn kind(&self) -> ArtifactKind {
        ArtifactKind::TensorModel
    }

    fn encode(&self, artifact: &Artifact, key: &str) -> Result<EncodedArtifact, CodecError> {
        if std::fs::metadata(&artifact.path)?.len() == 0 {
            return Err(CodecError::Empty(artifact.path.clone()));
        }
        let mapped = MappedArtifact::open(&artifact.path)?;
        let tag = artifact.freshness_tag();
        Ok(EncodedArtifact {
            primary_key: key.to_string(),
            kind: self.kind(),
            writes: vec![CacheWrite::Model {
                key: key.to_string(),
                meta: ModelMeta {
                    backend: ModelBackend::Onnx,
                    device: ModelDevice::Cpu,
                    tag: tag.clone(),
                },
                blob: Blob::Mapped(Arc::new(mapped)),
            }],
            freshness: Some(tag),
        })
    }
}

/// Opaque bytes under the derived key.
pub struct RawCodec(ArtifactKind);

impl ArtifactCodec for RawCodec {
    fn kind(&self) -> ArtifactKind {
        self.0
    }

    fn encode(&self, artifact: &Artifact, key: &str) -> Result<EncodedArtifact, CodecError> {
        let bytes = std::fs::read(&artifact.path)?;
        Ok(EncodedArtifact {
            primary_key: key.to_string(),
            kind: self.kind(),
            writes: vec![CacheWrite::Bytes {
                key: key.to_string(),
                value: bytes.into(),
            }],
            freshness: None,
        })
    }
}

pub fn training_mode_key(key: &str) -> String {
    format!("{key}_training_mode")
}

pub fn biz_status_key(key: &str) -> String {
    format!("{key}_biz_status")
}

pub fn day_key(key: &str, feature: &str, day: &str) -> String {
    format!("{key}_{feature}_day{day}")
}

fn day_documents(key: &str, model: &serde_pickle::Value) -> Result<Vec<CacheWrite>, CodecError> {
    Ok(pickle::day_tables(model)?
        .into_iter()
        .map(|table| CacheWrite::Document {
            key: day_key(key, &table.feature, &table.day),
            doc: table.minutes,
        })
        .collect())
}

/// Three pickles: training mode, business-day status, statistical model.
/// Publishes the two auxiliary keys plus one document per (feature, day).
pub struct CompositeCodec;

impl ArtifactCodec for CompositeCodec {
    fn kind(&self) -> ArtifactKind {
        ArtifactKind::CompositeStatisticalModel
    }

    fn encode(&self, artifact: &Artifact, key: &str) -> Result<EncodedArtifact, CodecError> {
        let bytes = std::fs::read(&artifact.path)?;
        let parts = pickle::split_stream(&bytes)?;
        let [mode, biz_status, model] = parts.as_slice() else {
            return Err(CodecError::LayoutMismatch(format!(
                "expected 3 pickled objects, found {}",
                parts.len()
            )));
        };

        let mode = pickle::scalar_text(&pickle::decode(mode)?)?;
        // decoded only to reject corrupt input; the original bytes are published
        pickle::decode(biz_status)?;
        let model = pickle::decode(model)?;

        let mut writes = vec![
            CacheWrite::Bytes {
                key: training_mode_key(key),
                value: mode.into_bytes().into(),
            },
            CacheWrite::Bytes {
                key: biz_status_key(key),
                value: biz_status.to_vec().into(),
            },
        ];
        writes.extend(day_documents(key, &model)?);

        Ok(EncodedArtifact {
            primary_key: key.to_string(),
            kind: self.kind(),
            writes,
            freshness: None,
        })
    }
}

/// Document-vector model and its array sidecars, packed into one blob.
pub struct VectorCodec;

impl ArtifactCodec for VectorCodec {
    fn kind(&self) -> ArtifactKind {
        ArtifactKind::TextVectorModel
    }

    fn encode(&self, artifact: &Artifact, key: &str) -> Result<EncodedArtifact, CodecError> {
        let parts = vector::collect(&artifact.path)?;
        let bundle = vector::encode_bundle(&parts)?;
        Ok(EncodedArtifact {
            primary_key: key.to_string(),
            kind: self.kind(),
            writes: vec![CacheWrite::Bytes {
                key: key.to_string(),
                value: bundle.into(),
            }],
            freshness: None,
        })
    }
}

/// Service-module result file: one pickled `feature -> day -> minute -> stats`
/// mapping decomposed into per-day documents.
pub fn decompose_result(path: &Path, key: &str) -> Result<Vec<CacheWrite>, CodecError> {
    let bytes = std::fs::read(path)?;
    let parts = pickle::split_stream(&bytes)?;
    let [model] = parts.as_slice() else {
        return Err(CodecError::LayoutMismatch(format!(
            "expected 1 pickled object, found {}",
            parts.len()
        )));
    };
    day_documents(key, &pickle::decode(model)?)
}
