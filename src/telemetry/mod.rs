//! Telemetry for the sync pipeline.
//!
//! Structured logging, load-pass spans and metrics counters. Output goes to
//! stderr or a log file; counters go through the `metrics` facade.

mod logging;
mod metrics;
mod spans;

pub use logging::{init_logging, LogConfig, LogError, LogFormat};
pub use metrics::{
    record_artifact_published, record_artifact_skipped, record_replica_write_failure,
    SkipReason,
};
pub use spans::{LoadSpan, SpanExt};
