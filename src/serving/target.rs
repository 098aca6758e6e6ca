//! Serving targets, registry entries and group membership documents.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::catalog::ServingModule;

/// Hash holding one field per actively served target.
pub const REGISTRY_KEY: &str = "RedisServingTargets::mlc";

/// Prefix shared by every derived group document.
pub const GROUP_KEY_PREFIX: &str = "Collect::";

const LOAD_FCST_PREFIX: &str = "Collect::LoadFcstTargetList:";
const EVENT_FCST_PREFIX: &str = "Collect::TargetGroups::";

/// Smallest unit that can be turned on or off.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ServingTarget {
    pub module: ServingModule,
    pub inst_type: String,
    pub target_id: String,
}

impl ServingTarget {
    pub fn new(module: ServingModule, inst_type: impl Into<String>, target_id: impl Into<String>) -> Self {
        Self {
            module,
            inst_type: inst_type.into(),
            target_id: target_id.into(),
        }
    }

    /// Registry field name: `module_insttype_targetid`.
    pub fn key(&self) -> String {
        format!("{}_{}_{}", self.module, self.inst_type, self.target_id)
    }

    pub fn entry(&self) -> RegistryEntry {
        RegistryEntry {
            service_name: self.key(),
            module: self.module.as_str().to_string(),
            target_id: self.target_id.clone(),
            inst_type: self.inst_type.clone(),
        }
    }
}

/// Value stored under a registry field.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegistryEntry {
    pub service_name: String,
    pub module: String,
    pub target_id: String,
    #[serde(rename = "type")]
    pub inst_type: String,
}

/// Members of a serving group.
///
/// Load forecasting keeps a flat id list; event forecasting keys the ids by
/// instance type.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum GroupMembers {
    Flat(Vec<String>),
    ByType(BTreeMap<String, Vec<String>>),
}

impl GroupMembers {
    /// Remove `target_id` as a member of `inst_type`, returning whether it was present.
    ///
    /// A flat list carries no types and is searched as is.
    pub fn remove(&mut self, inst_type: &str, target_id: &str) -> bool {
        let list = match self {
            GroupMembers::Flat(list) => list,
            GroupMembers::ByType(map) => match map.get_mut(inst_type) {
                Some(list) => list,
                None => return false,
            },
        };
        let before = list.len();
        list.retain(|id| id != target_id);
        list.len() != before
    }

    pub fn contains(&self, inst_type: &str, target_id: &str) -> bool {
        match self {
            GroupMembers::Flat(list) => list.iter().any(|id| id == target_id),
            GroupMembers::ByType(map) => map
                .get(inst_type)
                .is_some_and(|list| list.iter().any(|id| id == target_id)),
        }
    }

    pub fn len(&self) -> usize {
        match self {
            GroupMembers::Flat(list) => list.len(),
            GroupMembers::ByType(map) => map.values().map(Vec::len).sum(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// A group served as one target with a derived membership document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServingGroup {
    pub module: ServingModule,
    pub inst_type: String,
    pub group_id: String,
    pub members: GroupMembers,
}

impl ServingGroup {
    pub fn target(&self) -> ServingTarget {
        ServingTarget::new(self.module, self.inst_type.clone(), self.group_id.clone())
    }

    pub fn document_key(&self) -> Option<String> {
        group_document_key(self.module, &self.inst_type, &self.group_id)
    }
}

/// Key of the derived membership document, for group-served modules only.
pub fn group_document_key(module: ServingModule, inst_type: &str, group_id: &str) -> Option<String> {
    match module {
        ServingModule::LoadForecast => Some(format!("{LOAD_FCST_PREFIX}{inst_type}:{group_id}")),
        ServingModule::EventForecast => Some(format!(
            "{EVENT_FCST_PREFIX}{inst_type}:{group_id}:{module}"
        )),
        _ => None,
    }
}

/// Glob matching every document of a group-served module.
pub fn group_document_pattern(module: ServingModule) -> Option<String> {
    match module {
        ServingModule::LoadForecast => Some(format!("{LOAD_FCST_PREFIX}*")),
        ServingModule::EventForecast => Some(format!("{EVENT_FCST_PREFIX}*")),
        _ => None,
    }
}

/// Instance type segment of a load-forecast document key.
pub fn load_document_inst_type(key: &str) -> Option<&str> {
    key.strip_prefix(LOAD_FCST_PREFIX)?.split(':').next()
}
