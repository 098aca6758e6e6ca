//! Configuration store boundary.
//!
//! The relational store describing serving targets, groups and log
//! parameters lives outside this crate. [`ConfigStore`] is the slice of it
//! the controller needs; [`MemoryConfigStore`] backs tests and dry runs.

use std::collections::{BTreeMap, BTreeSet};

use async_trait::async_trait;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::warn;

use super::target::{GroupMembers, ServingGroup, ServingTarget};
use crate::catalog::ServingModule;

#[derive(Error, Debug)]
pub enum ConfigStoreError {
    #[error("Configuration store unavailable: {0}")]
    Unavailable(String),

    #[error("Unknown log target: {0}")]
    UnknownTarget(String),
}

/// Requested log-serving parameters for one target.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LogServingUpdate {
    pub target_id: String,
    pub service_on_boot: bool,
    pub set_name: Option<String>,
    pub is_log_service_on: bool,
    pub is_param_auto: bool,
    pub anomaly_threshold: f64,
    pub auto_anomaly_threshold: f64,
    pub alert_threshold: f64,
    pub rare_rate: f64,
    pub is_sparse_service_on: bool,
    pub exclude_keywords: Option<Vec<String>>,
    #[serde(rename = "userKeywords")]
    pub include_keywords: Option<Vec<String>>,
}

/// Read and write queries the control surface issues.
#[async_trait]
pub trait ConfigStore: Send + Sync {
    /// Target ids belonging to a configured group.
    async fn group_members(
        &self,
        module: ServingModule,
        inst_type: &str,
        product_type: Option<&str>,
        group_id: &str,
    ) -> Result<Vec<String>, ConfigStoreError>;

    /// Target ids of every log source of `log_type`.
    async fn log_targets(&self, log_type: &str) -> Result<Vec<String>, ConfigStoreError>;

    /// Configured membership of one group-served target.
    async fn serving_group(
        &self,
        module: ServingModule,
        inst_type: &str,
        target_id: &str,
    ) -> Result<Option<ServingGroup>, ConfigStoreError>;

    /// Targets flagged to be served at boot.
    async fn onboot_targets(&self) -> Result<Vec<ServingTarget>, ConfigStoreError>;

    /// Groups of `module` flagged to be served at boot.
    async fn onboot_groups(&self, module: ServingModule) -> Result<Vec<ServingGroup>, ConfigStoreError>;

    /// Apply every update or none. Returns `false` when anything failed.
    async fn update_log_serving(&self, updates: &[LogServingUpdate]) -> bool;
}

/// Keyword set after a requested change.
///
/// `None` or an empty request clears. When the request shares a keyword with
/// what is stored, only the new keywords are added; a disjoint request
/// replaces the stored set.
pub fn merge_keywords(existing: &[String], requested: Option<&[String]>) -> Vec<String> {
    let requested: Vec<String> = match requested {
        None => return Vec::new(),
        Some(list) => list.iter().map(|k| k.trim().to_string()).collect(),
    };
    if requested.is_empty() {
        return Vec::new();
    }
    if existing.is_empty() {
        return requested;
    }
    let overlaps = requested.iter().any(|k| existing.contains(k));
    if overlaps {
        let mut merged = existing.to_vec();
        merged.extend(requested.into_iter().filter(|k| !existing.contains(k)));
        merged
    } else {
        requested
    }
}

/// One configured serving row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServingRow {
    pub target: ServingTarget,
    pub on_boot: bool,
    pub group_id: Option<String>,
    pub product_type: Option<String>,
    /// Membership, for group-served rows.
    pub members: Option<GroupMembers>,
}

/// Log-serving parameters of one log target.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct LogTargetConfig {
    pub log_type: String,
    pub on_boot: bool,
    pub preset: Option<String>,
    pub service_on: bool,
    pub params_auto: bool,
    pub anomaly_threshold: f64,
    pub recommended_threshold: f64,
    pub alert_threshold: f64,
    pub rare_rate: f64,
    pub sparse_on: bool,
    pub exclude_keywords: Vec<String>,
    pub include_keywords: Vec<String>,
}

#[derive(Debug, Clone, Default)]
struct State {
    rows: Vec<ServingRow>,
    logs: BTreeMap<String, LogTargetConfig>,
    presets: BTreeSet<String>,
}

/// In-memory [`ConfigStore`].
#[derive(Default)]
pub struct MemoryConfigStore {
    state: RwLock<State>,
}

impl MemoryConfigStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_row(&self, row: ServingRow) {
        self.state.write().rows.push(row);
    }

    pub fn add_log_target(&self, target_id: impl Into<String>, config: LogTargetConfig) {
        self.state.write().logs.insert(target_id.into(), config);
    }

    pub fn add_preset(&self, name: impl Into<String>) {
        self.state.write().presets.insert(name.into());
    }

    pub fn log_target(&self, target_id: &str) -> Option<LogTargetConfig> {
        self.state.read().logs.get(target_id).cloned()
    }

    pub fn row(&self, key: &str) -> Option<ServingRow> {
        self.state
            .read()
            .rows
            .iter()
            .find(|r| r.target.key() == key)
            .cloned()
    }

    fn apply(state: &mut State, update: &LogServingUpdate) -> Result<(), ConfigStoreError> {
        let has_preset = update
            .set_name
            .as_ref()
            .is_some_and(|name| state.presets.contains(name));

        for row in state
            .rows
            .iter_mut()
            .filter(|r| r.target.target_id == update.target_id)
        {
            row.on_boot = update.service_on_boot;
        }

        let log = state
            .logs
            .get_mut(&update.target_id)
            .ok_or_else(|| ConfigStoreError::UnknownTarget(update.target_id.clone()))?;
        log.on_boot = update.service_on_boot;
        if has_preset {
            log.preset = update.set_name.clone();
        }
        log.service_on = update.is_log_service_on;
        log.params_auto = update.is_param_auto;
        log.anomaly_threshold = update.anomaly_threshold;
        log.recommended_threshold = update.auto_anomaly_threshold;
        log.alert_threshold = update.alert_threshold;
        log.rare_rate = update.rare_rate;
        log.sparse_on = update.is_sparse_service_on;
        log.exclude_keywords =
            merge_keywords(&log.exclude_keywords, update.exclude_keywords.as_deref());
        log.include_keywords =
            merge_keywords(&log.include_keywords, update.include_keywords.as_deref());
        Ok(())
    }
}

#[async_trait]
impl ConfigStore for MemoryConfigStore {
    async fn group_members(
        &self,
        module: ServingModule,
        inst_type: &str,
        product_type: Option<&str>,
        group_id: &str,
    ) -> Result<Vec<String>, ConfigStoreError> {
        let state = self.state.read();
        Ok(state
            .rows
            .iter()
            .filter(|r| r.target.module == module && r.target.inst_type == inst_type)
            .filter(|r| r.group_id.as_deref() == Some(group_id))
            .filter(|r| product_type.is_none() || r.product_type.as_deref() == product_type)
            .map(|r| r.target.target_id.clone())
            .collect())
    }

    async fn log_targets(&self, log_type: &str) -> Result<Vec<String>, ConfigStoreError> {
        let state = self.state.read();
        Ok(state
            .logs
            .iter()
            .filter(|(_, c)| c.log_type == log_type)
            .map(|(id, _)| id.clone())
            .collect())
    }

    async fn serving_group(
        &self,
        module: ServingModule,
        inst_type: &str,
        target_id: &str,
    ) -> Result<Option<ServingGroup>, ConfigStoreError> {
        let state = self.state.read();
        Ok(state
            .rows
            .iter()
            .find(|r| {
                r.target.module == module
                    && r.target.inst_type == inst_type
                    && r.target.target_id == target_id
            })
            .and_then(|r| {
                r.members.clone().map(|members| ServingGroup {
                    module,
                    inst_type: inst_type.to_string(),
                    group_id: target_id.to_string(),
                    members,
                })
            }))
    }

    async fn onboot_targets(&self) -> Result<Vec<ServingTarget>, ConfigStoreError> {
        let state = self.state.read();
        Ok(state
            .rows
            .iter()
            .filter(|r| r.on_boot)
            .map(|r| r.target.clone())
            .collect())
    }

    async fn onboot_groups(&self, module: ServingModule) -> Result<Vec<ServingGroup>, ConfigStoreError> {
        let state = self.state.read();
        Ok(state
            .rows
            .iter()
            .filter(|r| r.on_boot && r.target.module == module)
            .filter_map(|r| {
                r.members.clone().map(|members| ServingGroup {
                    module,
                    inst_type: r.target.inst_type.clone(),
                    group_id: r.target.target_id.clone(),
                    members,
                })
            })
            .collect())
    }

    async fn update_log_serving(&self, updates: &[LogServingUpdate]) -> bool {
        let mut guard = self.state.write();
        let mut staged = guard.clone();
        for update in updates {
            if let Err(e) = Self::apply(&mut staged, update) {
                warn!(target_id = %update.target_id, error = %e, "log serving update rolled back");
                return false;
            }
        }
        *guard = staged;
        true
    }
}
