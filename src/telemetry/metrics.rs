//! Counters for the sync pipeline, recorded through the `metrics` facade.

use metrics::counter;

use crate::artifacts::ArtifactKind;
use crate::cache::ReplicaRole;

/// Why an artifact was not published.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    Ignored,
    Unchanged,
    CodecFailure,
    KeyFailure,
    Exists,
}

impl SkipReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            SkipReason::Ignored => "ignored",
            SkipReason::Unchanged => "unchanged",
            SkipReason::CodecFailure => "codec_failure",
            SkipReason::KeyFailure => "key_failure",
            SkipReason::Exists => "exists",
        }
    }
}

pub fn record_artifact_published(kind: ArtifactKind) {
    counter!("mlc_artifact_published_total", "kind" => kind.as_str()).increment(1);
}

pub fn record_replica_write_failure(role: ReplicaRole) {
    counter!("mlc_replica_write_failures_total", "replica" => role.as_str()).increment(1);
}

pub fn record_artifact_skipped(reason: SkipReason) {
    counter!("mlc_artifact_skipped_total", "reason" => reason.as_str()).increment(1);
}
