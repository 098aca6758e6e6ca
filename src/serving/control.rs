//! Control-surface translation.
//!
//! [`ServingController`] turns on/off, reload and delete requests into
//! registry and configuration-store calls. Internal errors are logged in full
//! and reach callers only through [`ControlError::public_message`].

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;

use serde::Deserialize;
use thiserror::Error;
use tracing::{error, info, warn};

use super::config_store::{ConfigStore, ConfigStoreError, LogServingUpdate};
use super::registry::{RegisterOutcome, RegistryError, RemovalReport, ServingRegistry};
use super::target::{group_document_key, RegistryEntry, ServingTarget};
use crate::catalog::{artifact_dir_for, normalize_instance_type, ServingModule, GROUP_INSTANCE_TYPES};
use crate::sync::{BulkLoader, LoadError, LoadSummary};

/// Load-forecast target standing for every instance of a type.
const ALL_TARGETS: &str = "all";

#[derive(Error, Debug)]
pub enum ControlError {
    #[error("Registry error: {0}")]
    Registry(#[from] RegistryError),

    #[error("Configuration store error: {0}")]
    ConfigStore(#[from] ConfigStoreError),

    #[error("Load error: {0}")]
    Load(#[from] LoadError),

    #[error("Unknown module: {0}")]
    UnknownModule(String),

    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Log serving update rejected")]
    UpdateRejected,
}

impl ControlError {
    /// Message safe to return to an end user.
    pub fn public_message(&self) -> &'static str {
        match self {
            ControlError::UnknownModule(_) | ControlError::InvalidRequest(_) => "invalid request",
            ControlError::UpdateRejected => "failed to update log serving settings",
            _ => "serving request failed",
        }
    }
}

/// Group on/off request.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GroupToggle {
    pub module: ServingModule,
    #[serde(rename = "type")]
    pub inst_type: String,
    pub group_id: String,
    pub serving: bool,
}

/// Single-target on/off request.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TargetToggle {
    pub module: ServingModule,
    #[serde(rename = "type")]
    pub inst_type: String,
    pub target_id: String,
    pub serving: bool,
}

/// Counts from [`ServingController::bootstrap`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BootstrapReport {
    pub cleared: usize,
    pub targets: usize,
    pub groups: usize,
}

/// Entry point for every serving request.
pub struct ServingController {
    registry: ServingRegistry,
    config: Arc<dyn ConfigStore>,
    loader: BulkLoader,
    model_root: PathBuf,
    sys_id: String,
}

impl ServingController {
    pub fn new(
        registry: ServingRegistry,
        config: Arc<dyn ConfigStore>,
        loader: BulkLoader,
        model_root: impl Into<PathBuf>,
        sys_id: impl Into<String>,
    ) -> Self {
        Self {
            registry,
            config,
            loader,
            model_root: model_root.into(),
            sys_id: sys_id.into(),
        }
    }

    pub fn registry(&self) -> &ServingRegistry {
        &self.registry
    }

    /// Artifact directory of one target.
    pub fn target_dir(&self, module: ServingModule, inst_type: &str, target_id: &str) -> PathBuf {
        self.model_root
            .join(&self.sys_id)
            .join(module.as_str())
            .join(artifact_dir_for(inst_type))
            .join(target_id)
    }

    /// Force-reload one target's artifacts, then put it (or its group) in service.
    pub async fn reload_target(
        &self,
        module: &str,
        inst_type: &str,
        target_id: &str,
    ) -> Result<LoadSummary, ControlError> {
        let module = ServingModule::parse(module)
            .ok_or_else(|| ControlError::UnknownModule(module.to_string()))?;
        if target_id.is_empty() {
            return Err(ControlError::InvalidRequest("empty target id".into()));
        }
        let inst_type = artifact_dir_for(inst_type);
        let dir = self.target_dir(module, inst_type, target_id);
        let summary = self.loader.load(&dir, true).await?;

        match module {
            ServingModule::InstanceAnomaly
            | ServingModule::LogAnomaly
            | ServingModule::ForecastMixer => {
                self.registry
                    .register(&ServingTarget::new(module, inst_type, target_id))
                    .await?;
            }
            ServingModule::LoadForecast | ServingModule::EventForecast => {
                self.enable_target(&ServingTarget::new(module, inst_type, target_id))
                    .await?;
            }
            ServingModule::ServiceAnomaly | ServingModule::Forecast => {}
        }
        info!(module = %module, inst_type, target_id, "target reloaded");
        Ok(summary)
    }

    /// Apply group on/off requests.
    pub async fn set_group_serving(&self, toggles: &[GroupToggle]) -> Result<(), ControlError> {
        for toggle in toggles {
            let (inst_type, product_type) = normalize_instance_type(&toggle.inst_type);
            let targets = match toggle.module {
                ServingModule::EventForecast => vec![toggle.group_id.clone()],
                ServingModule::LoadForecast => match (&product_type, inst_type.as_str()) {
                    (Some(product), "db") => vec![product.clone()],
                    _ => vec![ALL_TARGETS.to_string()],
                },
                ServingModule::LogAnomaly => self.config.log_targets(&toggle.inst_type).await?,
                module => {
                    self.config
                        .group_members(module, &inst_type, product_type.as_deref(), &toggle.group_id)
                        .await?
                }
            };

            info!(
                module = %toggle.module,
                inst_type = %inst_type,
                group_id = %toggle.group_id,
                serving = toggle.serving,
                targets = targets.len(),
                "group serving toggled"
            );
            for target_id in targets {
                let target = ServingTarget::new(toggle.module, inst_type.clone(), target_id);
                self.toggle(&target, toggle.serving).await?;
            }
        }
        Ok(())
    }

    /// Apply single-target on/off requests.
    pub async fn set_target_serving(&self, toggles: &[TargetToggle]) -> Result<(), ControlError> {
        for toggle in toggles {
            let (inst_type, _) = normalize_instance_type(&toggle.inst_type);
            let target = ServingTarget::new(toggle.module, inst_type, toggle.target_id.clone());
            self.toggle(&target, toggle.serving).await?;
        }
        Ok(())
    }

    async fn toggle(&self, target: &ServingTarget, serving: bool) -> Result<(), ControlError> {
        if serving {
            self.enable_target(target).await?;
        } else {
            self.disable_target(target).await?;
        }
        Ok(())
    }

    /// Put a target in service. Group modules also rewrite their membership
    /// document from the configuration store.
    pub async fn enable_target(&self, target: &ServingTarget) -> Result<RegisterOutcome, ControlError> {
        if !target.module.is_group_served() {
            return Ok(self.registry.register(target).await?);
        }
        match self
            .config
            .serving_group(target.module, &target.inst_type, &target.target_id)
            .await?
        {
            Some(group) => Ok(self.registry.register_group(&group).await?),
            None => {
                warn!(key = %target.key(), "no group configuration, registering without members");
                Ok(self.registry.register(target).await?)
            }
        }
    }

    /// Take a target out of service. Absent targets are not an error.
    pub async fn disable_target(&self, target: &ServingTarget) -> Result<bool, ControlError> {
        let removed = if target.module.is_group_served() {
            self.registry
                .unregister_group(target.module, &target.inst_type, &target.target_id)
                .await?
        } else {
            self.registry.unregister(&target.key()).await?
        };
        Ok(removed)
    }

    /// Remove a target deleted upstream from everything that serves it.
    pub async fn delete_target(&self, type_: &str, target_id: &str) -> Result<RemovalReport, ControlError> {
        if GROUP_INSTANCE_TYPES.contains(&type_) {
            let mut report = RemovalReport::default();
            let deleted = self
                .registry
                .delete_group_document(ServingModule::EventForecast, type_, target_id)
                .await?;
            if deleted {
                report
                    .documents
                    .extend(group_document_key(ServingModule::EventForecast, type_, target_id));
            }
            return Ok(report);
        }
        // Entries are matched by `_<type>_<id>` suffix, so DB products must be folded to `db`.
        let (inst_type, _) = normalize_instance_type(type_);
        Ok(self.registry.remove_target_everywhere(&inst_type, target_id).await?)
    }

    pub async fn log_serving_targets(&self) -> Result<Vec<String>, ControlError> {
        Ok(self.registry.log_serving_targets().await?)
    }

    /// Current canonical registry.
    pub async fn serving_status(&self) -> Result<BTreeMap<String, RegistryEntry>, ControlError> {
        Ok(self.registry.list_all().await?)
    }

    /// Rebuild the registry from the configuration store's on-boot flags.
    pub async fn bootstrap(&self) -> Result<BootstrapReport, ControlError> {
        let mut report = BootstrapReport {
            cleared: self.registry.reset().await?,
            ..BootstrapReport::default()
        };

        for target in self.config.onboot_targets().await? {
            if target.module.is_group_served() {
                continue;
            }
            self.registry.register(&target).await?;
            report.targets += 1;
        }
        for module in [ServingModule::LoadForecast, ServingModule::EventForecast] {
            for group in self.config.onboot_groups(module).await? {
                self.registry.register_group(&group).await?;
                report.groups += 1;
            }
        }

        info!(
            cleared = report.cleared,
            targets = report.targets,
            groups = report.groups,
            "serving registry bootstrapped"
        );
        Ok(report)
    }

    /// Apply a log-serving parameter batch, all or nothing.
    pub async fn update_log_serving(&self, updates: &[LogServingUpdate]) -> Result<(), ControlError> {
        if self.config.update_log_serving(updates).await {
            Ok(())
        } else {
            error!(count = updates.len(), "log serving update failed");
            Err(ControlError::UpdateRejected)
        }
    }
}
