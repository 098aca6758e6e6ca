//! Serving target registry and the control surface over it.

mod config_store;
mod control;
mod registry;
mod target;

pub use config_store::{
    merge_keywords, ConfigStore, ConfigStoreError, LogServingUpdate, LogTargetConfig,
    MemoryConfigStore, ServingRow,
};
pub use control::{
    BootstrapReport, ControlError, GroupToggle, ServingController, TargetToggle,
};
pub use registry::{RegisterOutcome, RegistryError, RemovalReport, ServingRegistry};
pub use target::{
    group_document_key, GroupMembers, RegistryEntry, ServingGroup, ServingTarget,
    GROUP_KEY_PREFIX, REGISTRY_KEY,
};
