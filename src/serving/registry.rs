//! Serving target registry.
//!
//! The canonical registry is one hash on the backend store; group-served
//! modules also keep a derived membership document per group. The two are
//! separate keys written one after the other with no transaction between
//! them, and no local locking: single-key atomicity comes from the store.

use std::collections::BTreeMap;
use std::sync::Arc;

use thiserror::Error;
use tracing::{debug, info, warn};

use super::target::{
    group_document_key, group_document_pattern, load_document_inst_type, GroupMembers,
    RegistryEntry, ServingGroup, ServingTarget, GROUP_KEY_PREFIX, REGISTRY_KEY,
};
use crate::cache::{CacheError, CacheStore};
use crate::catalog::ServingModule;

#[derive(Error, Debug)]
pub enum RegistryError {
    #[error("Cache error: {0}")]
    Store(#[from] CacheError),

    #[error("Malformed registry entry {key}: {reason}")]
    MalformedEntry { key: String, reason: String },

    #[error("Module is not served by group: {0}")]
    NotGroupServed(ServingModule),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RegisterOutcome {
    Registered,
    AlreadyServing,
}

/// What `remove_target_everywhere` touched.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RemovalReport {
    pub entries: Vec<String>,
    pub documents: Vec<String>,
}

/// Canonical registry plus derived group documents on one backend store.
#[derive(Clone)]
pub struct ServingRegistry {
    store: Arc<dyn CacheStore>,
}

impl ServingRegistry {
    pub fn new(store: Arc<dyn CacheStore>) -> Self {
        Self { store }
    }

    /// Add `target` unless its key is already present.
    pub async fn register(&self, target: &ServingTarget) -> Result<RegisterOutcome, RegistryError> {
        let key = target.key();
        let current = self.store.hgetall(REGISTRY_KEY).await?;
        if current.contains_key(&key) {
            debug!(key = %key, "already serving");
            return Ok(RegisterOutcome::AlreadyServing);
        }
        let value = serde_json::to_string(&target.entry()).map_err(CacheError::from)?;
        self.store.hset(REGISTRY_KEY, &key, &value).await?;
        info!(key = %key, "registered");
        Ok(RegisterOutcome::Registered)
    }

    /// Remove an entry. Absent keys are not an error; returns whether it existed.
    pub async fn unregister(&self, key: &str) -> Result<bool, RegistryError> {
        let removed = self.store.hdel(REGISTRY_KEY, key).await?;
        if removed {
            info!(key = %key, "unregistered");
        } else {
            debug!(key = %key, "unregister of absent key");
        }
        Ok(removed)
    }

    /// The whole canonical registry.
    pub async fn list_all(&self) -> Result<BTreeMap<String, RegistryEntry>, RegistryError> {
        let raw = self.store.hgetall(REGISTRY_KEY).await?;
        raw.into_iter()
            .map(|(key, value)| -> Result<(String, RegistryEntry), RegistryError> {
                let entry = serde_json::from_str(&value).map_err(|e| {
                    RegistryError::MalformedEntry {
                        key: key.clone(),
                        reason: e.to_string(),
                    }
                })?;
                Ok((key, entry))
            })
            .collect()
    }

    /// Register the group's own key and rewrite its membership document.
    pub async fn register_group(&self, group: &ServingGroup) -> Result<RegisterOutcome, RegistryError> {
        if !group.module.is_group_served() {
            return Err(RegistryError::NotGroupServed(group.module));
        }
        let outcome = self.register(&group.target()).await?;
        self.write_group_document(group).await?;
        Ok(outcome)
    }

    /// Remove the group's key and its membership document.
    pub async fn unregister_group(
        &self,
        module: ServingModule,
        inst_type: &str,
        group_id: &str,
    ) -> Result<bool, RegistryError> {
        let target = ServingTarget::new(module, inst_type, group_id);
        let removed = self.unregister(&target.key()).await?;
        self.delete_group_document(module, inst_type, group_id).await?;
        Ok(removed)
    }

    pub async fn write_group_document(&self, group: &ServingGroup) -> Result<(), RegistryError> {
        let key = group
            .document_key()
            .ok_or(RegistryError::NotGroupServed(group.module))?;
        let body = serde_json::to_vec(&group.members).map_err(CacheError::from)?;
        self.store.set(&key, &body).await?;
        debug!(key = %key, members = group.members.len(), "group document written");
        Ok(())
    }

    pub async fn read_group_document(
        &self,
        module: ServingModule,
        inst_type: &str,
        group_id: &str,
    ) -> Result<Option<GroupMembers>, RegistryError> {
        let key = group_document_key(module, inst_type, group_id)
            .ok_or(RegistryError::NotGroupServed(module))?;
        match self.store.get(&key).await? {
            None => Ok(None),
            Some(raw) => serde_json::from_slice(&raw).map(Some).map_err(|e| {
                RegistryError::MalformedEntry {
                    key,
                    reason: e.to_string(),
                }
            }),
        }
    }

    pub async fn delete_group_document(
        &self,
        module: ServingModule,
        inst_type: &str,
        group_id: &str,
    ) -> Result<bool, RegistryError> {
        let key = group_document_key(module, inst_type, group_id)
            .ok_or(RegistryError::NotGroupServed(module))?;
        Ok(self.store.del(&[key]).await? > 0)
    }

    /// Drop a deleted upstream target from the registry and from every
    /// group document that lists it.
    ///
    /// Registry fields match on the `_<inst_type>_<target_id>` suffix. Group
    /// documents that fail to parse are logged and left alone.
    pub async fn remove_target_everywhere(
        &self,
        inst_type: &str,
        target_id: &str,
    ) -> Result<RemovalReport, RegistryError> {
        let mut report = RemovalReport::default();

        let suffix = format!("_{inst_type}_{target_id}");
        let fields = self.store.hgetall(REGISTRY_KEY).await?;
        for field in fields.keys().filter(|f| f.ends_with(&suffix)) {
            if self.store.hdel(REGISTRY_KEY, field).await? {
                report.entries.push(field.clone());
            }
        }

        for module in [ServingModule::LoadForecast, ServingModule::EventForecast] {
            let Some(pattern) = group_document_pattern(module) else {
                continue;
            };
            for key in self.store.keys(&pattern).await? {
                if module == ServingModule::LoadForecast
                    && load_document_inst_type(&key) != Some(inst_type)
                {
                    continue;
                }
                if self.remove_member(&key, inst_type, target_id).await? {
                    report.documents.push(key);
                }
            }
        }

        info!(
            inst_type = %inst_type,
            target_id = %target_id,
            entries = report.entries.len(),
            documents = report.documents.len(),
            "target removed"
        );
        Ok(report)
    }

    async fn remove_member(&self, key: &str, inst_type: &str, target_id: &str) -> Result<bool, RegistryError> {
        let Some(raw) = self.store.get(key).await? else {
            return Ok(false);
        };
        let mut members: GroupMembers = match serde_json::from_slice(&raw) {
            Ok(members) => members,
            Err(e) => {
                warn!(key = %key, error = %e, "unreadable group document");
                return Ok(false);
            }
        };
        if !members.remove(inst_type, target_id) {
            return Ok(false);
        }
        let body = serde_json::to_vec(&members).map_err(CacheError::from)?;
        self.store.set(key, &body).await?;
        Ok(true)
    }

    /// Target ids currently served by the log anomaly module.
    pub async fn log_serving_targets(&self) -> Result<Vec<String>, RegistryError> {
        let module = ServingModule::LogAnomaly.as_str();
        Ok(self
            .list_all()
            .await?
            .into_iter()
            .filter(|(key, _)| key.contains(module))
            .map(|(_, entry)| entry.target_id)
            .collect())
    }

    /// Delete the canonical registry and every group document.
    pub async fn reset(&self) -> Result<usize, RegistryError> {
        let mut keys = self.store.keys(&format!("{GROUP_KEY_PREFIX}*")).await?;
        keys.push(REGISTRY_KEY.to_string());
        let removed = self.store.del(&keys).await?;
        info!(removed, "serving registry reset");
        Ok(removed)
    }
}
