//! Replica handles and replica-set planning.
//!
//! A [`ReplicaSet`] is built once at process start and passed by reference to
//! the publisher; there is no global client table.

use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use super::{CacheStore, RespStore};
use crate::config::EnvConfig;

/// Role of a cache server (and of the process running next to it).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReplicaRole {
    Master,
    Slave,
}

impl ReplicaRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            ReplicaRole::Master => "master",
            ReplicaRole::Slave => "slave",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "master" => Some(ReplicaRole::Master),
            "slave" => Some(ReplicaRole::Slave),
            _ => None,
        }
    }
}

impl fmt::Display for ReplicaRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One configured cache server.
#[derive(Clone)]
pub struct ReplicaHandle {
    pub role: ReplicaRole,
    pub addr: String,
    pub store: Arc<dyn CacheStore>,
}

impl ReplicaHandle {
    pub fn new(role: ReplicaRole, addr: impl Into<String>, store: Arc<dyn CacheStore>) -> Self {
        Self {
            role,
            addr: addr.into(),
            store,
        }
    }
}

impl fmt::Debug for ReplicaHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ReplicaHandle")
            .field("role", &self.role)
            .field("addr", &self.addr)
            .finish()
    }
}

/// Ordered set of replicas a process publishes to. The first entry serves reads.
#[derive(Debug, Clone)]
pub struct ReplicaSet {
    replicas: Vec<ReplicaHandle>,
}

impl ReplicaSet {
    /// Which replicas a process writes to.
    ///
    /// In dual-server mode the master process writes to both servers while a
    /// slave process only writes to its own; single-server mode uses the master.
    pub fn plan(process_role: ReplicaRole, use_slave_server: bool) -> Vec<ReplicaRole> {
        match (use_slave_server, process_role) {
            (true, ReplicaRole::Master) => vec![ReplicaRole::Master, ReplicaRole::Slave],
            (true, ReplicaRole::Slave) => vec![ReplicaRole::Slave],
            (false, _) => vec![ReplicaRole::Master],
        }
    }

    pub fn new(replicas: Vec<ReplicaHandle>) -> Self {
        Self { replicas }
    }

    /// One RESP client per planned role.
    pub fn from_config(config: &EnvConfig) -> Self {
        let replicas = Self::plan(config.role, config.use_slave_server)
            .into_iter()
            .map(|role| {
                let addr = config.addr_for(role).to_string();
                let store: Arc<dyn CacheStore> = Arc::new(RespStore::new(addr.clone()));
                ReplicaHandle::new(role, addr, store)
            })
            .collect();
        Self { replicas }
    }

    /// Replica serving existence checks and tag reads.
    pub fn primary(&self) -> Option<&ReplicaHandle> {
        self.replicas.first()
    }

    pub fn iter(&self) -> impl Iterator<Item = &ReplicaHandle> {
        self.replicas.iter()
    }

    pub fn roles(&self) -> Vec<ReplicaRole> {
        self.replicas.iter().map(|r| r.role).collect()
    }

    pub fn len(&self) -> usize {
        self.replicas.len()
    }

    pub fn is_empty(&self) -> bool {
        self.replicas.is_empty()
    }
}
