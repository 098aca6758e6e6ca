//! Replica health checks.
//!
//! Startup probes the master with bounded retries before loading artifacts;
//! the CLI `health` command reports every configured replica.

use std::time::{Duration, Instant};

use futures::future::join_all;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::cache::{CacheStore, ReplicaHandle, ReplicaRole, ReplicaSet};

/// Overall health status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum HealthState {
    Healthy,
    Degraded,
    Unhealthy,
}

/// Probe result for one replica.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReplicaHealth {
    pub role: ReplicaRole,
    pub addr: String,
    pub reachable: bool,
    pub latency_ms: u64,
    pub error: Option<String>,
}

/// Detailed health report.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthReport {
    pub state: HealthState,
    pub replicas: Vec<ReplicaHealth>,
}

/// Probe retry configuration.
#[derive(Debug, Clone)]
pub struct HealthConfig {
    pub retries: u32,
    pub interval: Duration,
}

impl Default for HealthConfig {
    fn default() -> Self {
        Self {
            retries: 5,
            interval: Duration::from_millis(1000),
        }
    }
}

/// PING `store` until it answers, at most `retries` times.
pub async fn wait_for_replica(store: &dyn CacheStore, retries: u32, interval: Duration) -> bool {
    for attempt in 1..=retries.max(1) {
        match store.ping().await {
            Ok(()) => {
                info!(attempt, "replica is healthy");
                return true;
            }
            Err(e) => {
                debug!(attempt, error = %e, "replica probe failed");
                if attempt < retries {
                    tokio::time::sleep(interval).await;
                }
            }
        }
    }
    warn!(retries, "replica did not answer");
    false
}

/// Aggregates probe results across a replica set.
pub struct HealthChecker {
    config: HealthConfig,
}

impl HealthChecker {
    pub fn new(config: HealthConfig) -> Self {
        Self { config }
    }

    /// Startup gate: probe the primary replica with retries.
    pub async fn primary_ready(&self, replicas: &ReplicaSet) -> bool {
        match replicas.primary() {
            Some(primary) => {
                wait_for_replica(primary.store.as_ref(), self.config.retries, self.config.interval).await
            }
            None => false,
        }
    }

    /// One probe per replica, concurrently.
    pub async fn report(&self, replicas: &ReplicaSet) -> HealthReport {
        let probes = join_all(replicas.iter().map(probe)).await;
        HealthReport {
            state: Self::compute_state(&probes),
            replicas: probes,
        }
    }

    fn compute_state(probes: &[ReplicaHealth]) -> HealthState {
        let up = probes.iter().filter(|p| p.reachable).count();
        if up == probes.len() && up > 0 {
            HealthState::Healthy
        } else if up > 0 {
            HealthState::Degraded
        } else {
            HealthState::Unhealthy
        }
    }
}

impl Default for HealthChecker {
    fn default() -> Self {
        Self::new(HealthConfig::default())
    }
}

async fn probe(replica: &ReplicaHandle) -> ReplicaHealth {
    let start = Instant::now();
    let result = replica.store.ping().await;
    ReplicaHealth {
        role: replica.role,
        addr: replica.addr.clone(),
        reachable: result.is_ok(),
        latency_ms: start.elapsed().as_millis() as u64,
        error: result.err().map(|e| e.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::MemoryStore;
    use std::sync::Arc;

    #[tokio::test]
    async fn test_wait_for_healthy_replica() {
        let store = MemoryStore::new("m");
        assert!(wait_for_replica(&store, 3, Duration::from_millis(1)).await);
    }

    #[tokio::test]
    async fn test_wait_gives_up() {
        let store = MemoryStore::new("m");
        store.set_offline(true);
        assert!(!wait_for_replica(&store, 2, Duration::from_millis(1)).await);
    }

    #[tokio::test]
    async fn test_report_degraded_when_one_down() {
        let master = Arc::new(MemoryStore::new("m"));
        let slave = Arc::new(MemoryStore::new("s"));
        slave.set_offline(true);
        let set = ReplicaSet::new(vec![
            ReplicaHandle::new(ReplicaRole::Master, "m:6379", master),
            ReplicaHandle::new(ReplicaRole::Slave, "s:6380", slave),
        ]);
        let report = HealthChecker::default().report(&set).await;
        assert_eq!(report.state, HealthState::Degraded);
        assert!(report.replicas[1].error.is_some());
    }

    #[tokio::test]
    async fn test_empty_set_unhealthy() {
        let checker = HealthChecker::default();
        let set = ReplicaSet::new(Vec::new());
        assert_eq!(checker.report(&set).await.state, HealthState::Unhealthy);
        assert!(!checker.primary_ready(&set).await);
    }
}
