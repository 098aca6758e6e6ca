//! Bulk loader.
//!
//! One pass walks the artifact root and publishes every classified file.
//! A second pass decomposes the service module's result files across a
//! bounded set of tasks sized from the CPU count, and joins them all before
//! returning. Only a master-role process loads anything.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use thiserror::Error;
use tokio::task::JoinSet;
use tracing::{debug, error, info, warn, Instrument};

use super::publisher::Publisher;
use crate::artifacts::{
    codec, codec_for, Artifact, ArtifactKind, CacheWrite, CodecError, EncodedArtifact, KeyScheme,
};
use crate::cache::ReplicaRole;
use crate::catalog::ServingModule;
use crate::telemetry::{
    record_artifact_published, record_artifact_skipped, LoadSpan, SkipReason, SpanExt,
};

#[derive(Error, Debug)]
pub enum LoadError {
    #[error("Artifact root does not exist or is not a directory: {0}")]
    InvalidRoot(PathBuf),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Counts from one load call.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LoadSummary {
    /// True when the process role made this call a no-op.
    pub skipped_by_role: bool,
    pub scanned: usize,
    pub published: usize,
    pub unchanged: usize,
    pub ignored: usize,
    pub failed: usize,
    pub replica_failures: usize,
    pub results_published: usize,
    pub results_existing: usize,
}

impl LoadSummary {
    fn merge_results(&mut self, tally: ResultTally) {
        self.results_published += tally.published;
        self.results_existing += tally.existing;
        self.failed += tally.failed;
        self.replica_failures += tally.replica_failures;
    }
}

#[derive(Debug, Default)]
struct ResultTally {
    published: usize,
    existing: usize,
    failed: usize,
    replica_failures: usize,
}

/// Result files of the service module start with this prefix.
const RESULT_PREFIX: &str = "dbsln";

/// Orchestrates classify, encode and publish across a directory tree.
#[derive(Debug, Clone)]
pub struct BulkLoader {
    publisher: Arc<Publisher>,
    keys: KeyScheme,
    role: ReplicaRole,
    worker_ratio: f64,
}

impl BulkLoader {
    pub fn new(publisher: Arc<Publisher>, keys: KeyScheme, role: ReplicaRole) -> Self {
        Self {
            publisher,
            keys,
            role,
            worker_ratio: 0.9,
        }
    }

    pub fn with_worker_ratio(mut self, ratio: f64) -> Self {
        self.worker_ratio = ratio;
        self
    }

    pub fn publisher(&self) -> &Arc<Publisher> {
        &self.publisher
    }

    /// Number of result-pass tasks for `cpus` processors.
    pub fn worker_count(cpus: usize, ratio: f64) -> usize {
        let n = (cpus as f64 * ratio).round();
        if n.is_finite() && n >= 1.0 {
            n as usize
        } else {
            1
        }
    }

    /// Load every artifact under `root`.
    pub async fn load(&self, root: &Path, reload: bool) -> Result<LoadSummary, LoadError> {
        if self.role == ReplicaRole::Slave {
            info!(root = %root.display(), "slave role, skipping artifact load");
            return Ok(LoadSummary {
                skipped_by_role: true,
                ..LoadSummary::default()
            });
        }

        let (span, _run_id) = LoadSpan::new(&root.display().to_string(), reload);
        let result = self.run(root, reload).instrument(span.clone()).await;
        if let Ok(summary) = &result {
            span.record("published", summary.published + summary.results_published);
            span.record("skipped", summary.unchanged + summary.ignored + summary.failed);
        }
        span.record_result(&result);
        result
    }

    async fn run(&self, root: &Path, reload: bool) -> Result<LoadSummary, LoadError> {
        if !root.is_dir() {
            error!(root = %root.display(), "artifact root is missing");
            return Err(LoadError::InvalidRoot(root.to_path_buf()));
        }
        info!(root = %root.display(), reload, "artifact load started");

        let files = collect_files(root)?;
        let mut summary = LoadSummary {
            scanned: files.len(),
            ..LoadSummary::default()
        };

        for path in &files {
            self.load_file(path, reload, &mut summary).await;
        }

        let results: Vec<PathBuf> = files.into_iter().filter(|p| is_result_file(p)).collect();
        if !results.is_empty() {
            self.load_results(results, reload, &mut summary).await;
        }

        info!(
            published = summary.published,
            unchanged = summary.unchanged,
            ignored = summary.ignored,
            failed = summary.failed,
            results = summary.results_published,
            "artifact load finished"
        );
        Ok(summary)
    }

    async fn load_file(&self, path: &Path, reload: bool, summary: &mut LoadSummary) {
        let owned = path.to_path_buf();
        let keys = self.keys.clone();
        let encoded = tokio::task::spawn_blocking(move || -> Result<Option<EncodedArtifact>, CodecError> {
            let artifact = Artifact::inspect(&owned)?;
            let Some(codec) = codec_for(artifact.kind) else {
                return Ok(None);
            };
            let key = keys.artifact_key(&artifact)?;
            codec.encode(&artifact, &key).map(Some)
        })
        .await;

        let encoded = match encoded {
            Ok(Ok(Some(encoded))) => encoded,
            Ok(Ok(None)) => {
                debug!(path = %path.display(), "ignored");
                record_artifact_skipped(SkipReason::Ignored);
                summary.ignored += 1;
                return;
            }
            Ok(Err(e)) => {
                warn!(path = %path.display(), error = %e, "artifact skipped");
                record_artifact_skipped(match &e {
                    CodecError::Key(_) => SkipReason::KeyFailure,
                    _ => SkipReason::CodecFailure,
                });
                summary.failed += 1;
                return;
            }
            Err(e) => {
                warn!(path = %path.display(), error = %e, "encode task failed");
                summary.failed += 1;
                return;
            }
        };

        match self.publisher.publish_artifact(&encoded, reload).await {
            Ok(report) if report.unchanged => {
                record_artifact_skipped(SkipReason::Unchanged);
                summary.unchanged += 1;
            }
            Ok(report) => {
                summary.replica_failures += report.failures.len();
                if report.written.is_empty() {
                    summary.failed += 1;
                } else {
                    summary.published += 1;
                }
            }
            Err(e) => {
                warn!(key = %encoded.primary_key, error = %e, "publish failed");
                summary.failed += 1;
            }
        }
    }

    async fn load_results(&self, files: Vec<PathBuf>, reload: bool, summary: &mut LoadSummary) {
        let workers = Self::worker_count(num_cpus::get(), self.worker_ratio);
        let chunk_size = files.len() / workers + 1;
        info!(files = files.len(), workers, chunk_size, "result pass started");

        let mut tasks = JoinSet::new();
        for chunk in files.chunks(chunk_size) {
            let chunk = chunk.to_vec();
            let publisher = Arc::clone(&self.publisher);
            let keys = self.keys.clone();
            tasks.spawn(
                async move { load_result_chunk(publisher, keys, chunk, reload).await }
                    .in_current_span(),
            );
        }

        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok(tally) => summary.merge_results(tally),
                Err(e) => warn!(error = %e, "result task failed"),
            }
        }
    }
}

async fn load_result_chunk(
    publisher: Arc<Publisher>,
    keys: KeyScheme,
    files: Vec<PathBuf>,
    reload: bool,
) -> ResultTally {
    let mut tally = ResultTally::default();
    for path in files {
        let keys = keys.clone();
        let owned = path.clone();
        let writes = tokio::task::spawn_blocking(move || -> Result<Vec<CacheWrite>, CodecError> {
            let key = keys.service_key(&owned, ArtifactKind::GenericBlob.key_suffix())?;
            codec::decompose_result(&owned, &key)
        })
        .await;

        let writes = match writes {
            Ok(Ok(writes)) => writes,
            Ok(Err(e)) => {
                warn!(path = %path.display(), error = %e, "result file skipped");
                record_artifact_skipped(SkipReason::CodecFailure);
                tally.failed += 1;
                continue;
            }
            Err(e) => {
                warn!(path = %path.display(), error = %e, "result decode task failed");
                tally.failed += 1;
                continue;
            }
        };
        let Some(first) = writes.first() else {
            debug!(path = %path.display(), "result file has no features");
            continue;
        };

        if !reload {
            match publisher.document_exists(first.key()).await {
                Ok(true) => {
                    debug!(key = %first.key(), "[exist]");
                    record_artifact_skipped(SkipReason::Exists);
                    tally.existing += 1;
                    continue;
                }
                Ok(false) => {}
                Err(e) => debug!(key = %first.key(), error = %e, "existence check failed"),
            }
        }

        match publisher.publish(&writes).await {
            Ok(report) => {
                tally.replica_failures += report.failures.len();
                if report.written.is_empty() {
                    tally.failed += 1;
                } else {
                    record_artifact_published(ArtifactKind::GenericBlob);
                    info!(path = %path.display(), entries = writes.len(), "[DONE]");
                    tally.published += 1;
                }
            }
            Err(e) => {
                warn!(path = %path.display(), error = %e, "result publish failed");
                tally.failed += 1;
            }
        }
    }
    tally
}

/// Service-module result file (`dbsln*.pkl`).
pub fn is_result_file(path: &Path) -> bool {
    let in_service = path
        .components()
        .any(|c| c.as_os_str() == ServingModule::ServiceAnomaly.as_str());
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy())
        .unwrap_or_default();
    in_service && name.starts_with(RESULT_PREFIX) && name.ends_with(".pkl")
}

/// Every regular file under `root`, sorted.
pub fn collect_files(root: &Path) -> std::io::Result<Vec<PathBuf>> {
    let mut files = Vec::new();
    let mut pending = vec![root.to_path_buf()];
    while let Some(dir) = pending.pop() {
        for entry in std::fs::read_dir(&dir)? {
            let entry = entry?;
            let file_type = entry.file_type()?;
            if file_type.is_dir() {
                pending.push(entry.path());
            } else if file_type.is_file() {
                files.push(entry.path());
            }
        }
    }
    files.sort();
    Ok(files)
}
