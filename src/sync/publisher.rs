//! Cache publisher.
//!
//! Fans every write of an encoded artifact out to each replica concurrently
//! and joins the results. A failing replica is logged and counted; the other
//! replicas keep their writes and nothing is retried or rolled back.

use futures::future::join_all;
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::artifacts::{CacheWrite, EncodedArtifact};
use crate::cache::{CacheError, ReplicaHandle, ReplicaRole, ReplicaSet};
use crate::telemetry::{record_artifact_published, record_replica_write_failure};

#[derive(Error, Debug)]
pub enum PublishError {
    #[error("No replicas configured")]
    NoReplicas,

    #[error("Cache error: {0}")]
    Cache(#[from] CacheError),
}

/// A replica that failed part of a publish.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReplicaFailure {
    pub role: ReplicaRole,
    pub addr: String,
    pub key: String,
    pub error: String,
}

/// Result of publishing one artifact.
#[derive(Debug, Clone, Default)]
pub struct PublishReport {
    pub key: String,
    /// Skipped because the stored copy is current.
    pub unchanged: bool,
    /// Replicas that accepted every write.
    pub written: Vec<ReplicaRole>,
    pub failures: Vec<ReplicaFailure>,
}

impl PublishReport {
    pub fn is_complete(&self) -> bool {
        self.failures.is_empty()
    }
}

/// Writes artifacts to every replica of a [`ReplicaSet`].
#[derive(Debug, Clone)]
pub struct Publisher {
    replicas: ReplicaSet,
}

impl Publisher {
    pub fn new(replicas: ReplicaSet) -> Self {
        Self { replicas }
    }

    pub fn replicas(&self) -> &ReplicaSet {
        &self.replicas
    }

    fn primary(&self) -> Result<&ReplicaHandle, PublishError> {
        self.replicas.primary().ok_or(PublishError::NoReplicas)
    }

    /// Whether a tensor model must be (re)published.
    ///
    /// True on forced reload, when any replica lacks the key or cannot be
    /// asked, or when the primary's tag differs from `tag`.
    pub async fn needs_update(&self, key: &str, tag: &str, reload: bool) -> bool {
        if reload {
            return true;
        }
        let checks = join_all(self.replicas.iter().map(|r| r.store.exists(key))).await;
        if checks.iter().any(|c| !matches!(c, Ok(true))) {
            return true;
        }
        match self.replicas.primary() {
            Some(primary) => match primary.store.model_tag(key).await {
                Ok(Some(stored)) => stored != tag,
                Ok(None) => true,
                Err(e) => {
                    debug!(key = %key, error = %e, "tag lookup failed, republishing");
                    true
                }
            },
            None => true,
        }
    }

    /// Whether `key` exists on the primary replica.
    pub async fn document_exists(&self, key: &str) -> Result<bool, PublishError> {
        Ok(self.primary()?.store.exists(key).await?)
    }

    /// Apply `writes` to every replica concurrently.
    ///
    /// Each replica receives the writes in order and stops at its first
    /// failure.
    pub async fn publish(&self, writes: &[CacheWrite]) -> Result<PublishReport, PublishError> {
        if self.replicas.is_empty() {
            return Err(PublishError::NoReplicas);
        }
        let outcomes = join_all(
            self.replicas
                .iter()
                .map(|replica| Self::write_replica(replica, writes)),
        )
        .await;

        let mut report = PublishReport {
            key: writes.first().map(|w| w.key().to_string()).unwrap_or_default(),
            ..PublishReport::default()
        };
        for (replica, outcome) in self.replicas.iter().zip(outcomes) {
            match outcome {
                Ok(()) => report.written.push(replica.role),
                Err(failure) => {
                    warn!(
                        replica = %failure.role,
                        addr = %failure.addr,
                        key = %failure.key,
                        error = %failure.error,
                        "replica write failed"
                    );
                    record_replica_write_failure(failure.role);
                    report.failures.push(failure);
                }
            }
        }
        Ok(report)
    }

    /// Publish an encoded artifact, skipping tensor models whose stored tag
    /// matches unless `reload` is set.
    pub async fn publish_artifact(
        &self,
        encoded: &EncodedArtifact,
        reload: bool,
    ) -> Result<PublishReport, PublishError> {
        if let Some(tag) = &encoded.freshness {
            if !self.needs_update(&encoded.primary_key, tag, reload).await {
                debug!(key = %encoded.primary_key, "[unchanged]");
                return Ok(PublishReport {
                    key: encoded.primary_key.clone(),
                    unchanged: true,
                    ..PublishReport::default()
                });
            }
        }

        let mut report = self.publish(&encoded.writes).await?;
        report.key = encoded.primary_key.clone();
        if !report.written.is_empty() {
            record_artifact_published(encoded.kind);
            info!(
                key = %encoded.primary_key,
                kind = %encoded.kind,
                entries = encoded.writes.len(),
                replicas = report.written.len(),
                "[DONE]"
            );
        }
        Ok(report)
    }

    async fn write_replica(
        replica: &ReplicaHandle,
        writes: &[CacheWrite],
    ) -> Result<(), ReplicaFailure> {
        for write in writes {
            write
                .apply(replica.store.as_ref())
                .await
                .map_err(|e| ReplicaFailure {
                    role: replica.role,
                    addr: replica.addr.clone(),
                    key: write.key().to_string(),
                    error: e.to_string(),
                })?;
        }
        Ok(())
    }
}
