//! Serving module and instance-type names shared by the artifact tree,
//! the cache key scheme and the serving registry.

use std::fmt;

use serde::{Deserialize, Serialize};

/// AI service modules that own artifacts under the model root.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum ServingModule {
    /// Per-instance anomaly detection.
    #[serde(rename = "exem_aiops_anls_inst")]
    InstanceAnomaly,
    /// Service-level anomaly detection (composite result files).
    #[serde(rename = "exem_aiops_anls_service")]
    ServiceAnomaly,
    /// Log anomaly detection.
    #[serde(rename = "exem_aiops_anls_log")]
    LogAnomaly,
    /// Load forecasting, served per group with a flat member list.
    #[serde(rename = "exem_aiops_load_fcst")]
    LoadForecast,
    /// Event forecasting, served per group with a type-keyed member map.
    #[serde(rename = "exem_aiops_event_fcst")]
    EventForecast,
    /// Forecast mixer.
    #[serde(rename = "exem_aiops_fcst_tsmixer")]
    ForecastMixer,
    /// Generic forecasting.
    #[serde(rename = "exem_aiops_fcst")]
    Forecast,
}

impl ServingModule {
    pub const ALL: [ServingModule; 7] = [
        ServingModule::InstanceAnomaly,
        ServingModule::ServiceAnomaly,
        ServingModule::LogAnomaly,
        ServingModule::LoadForecast,
        ServingModule::EventForecast,
        ServingModule::ForecastMixer,
        ServingModule::Forecast,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ServingModule::InstanceAnomaly => "exem_aiops_anls_inst",
            ServingModule::ServiceAnomaly => "exem_aiops_anls_service",
            ServingModule::LogAnomaly => "exem_aiops_anls_log",
            ServingModule::LoadForecast => "exem_aiops_load_fcst",
            ServingModule::EventForecast => "exem_aiops_event_fcst",
            ServingModule::ForecastMixer => "exem_aiops_fcst_tsmixer",
            ServingModule::Forecast => "exem_aiops_fcst",
        }
    }

    pub fn parse(name: &str) -> Option<Self> {
        Self::ALL.iter().copied().find(|m| m.as_str() == name)
    }

    /// Modules whose serving unit is a group with a derived membership document.
    pub fn is_group_served(&self) -> bool {
        matches!(self, ServingModule::LoadForecast | ServingModule::EventForecast)
    }
}

impl fmt::Display for ServingModule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// DB product types that the control surface reports in place of `db`.
pub const DB_PRODUCT_TYPES: &[&str] = &["ORACLE", "TIBERO", "POSTGRES"];

/// Instance types that name groups rather than individual targets.
pub const GROUP_INSTANCE_TYPES: &[&str] = &["instanceGroup", "hostGroup", "codeGroup"];

/// Split a control-surface type into `(inst_type, product_type)`.
///
/// DB product names collapse to the `db` instance type and are kept as the
/// product type; everything else passes through unchanged.
pub fn normalize_instance_type(type_: &str) -> (String, Option<String>) {
    if DB_PRODUCT_TYPES.contains(&type_) {
        ("db".to_string(), Some(type_.to_string()))
    } else {
        (type_.to_string(), None)
    }
}

/// Artifact directory name for an instance type (log sources share `log`).
pub fn artifact_dir_for(inst_type: &str) -> &str {
    match inst_type {
        "syslog" | "filelog" => "log",
        other => other,
    }
}
