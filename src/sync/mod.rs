//! Artifact synchronization: publishing to replicas and bulk loading.

mod loader;
mod publisher;

pub use loader::{collect_files, is_result_file, BulkLoader, LoadError, LoadSummary};
pub use publisher::{PublishError, PublishReport, Publisher, ReplicaFailure};
