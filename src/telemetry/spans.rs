//! Span utilities for load passes.

use tracing::{info_span, Span};
use uuid::Uuid;

/// Extension trait for adding context to spans.
pub trait SpanExt {
    /// Record the result of an operation into the span.
    fn record_result<T, E>(&self, result: &Result<T, E>)
    where
        E: std::fmt::Display;
}

impl SpanExt for Span {
    fn record_result<T, E>(&self, result: &Result<T, E>)
    where
        E: std::fmt::Display,
    {
        match result {
            Ok(_) => {
                self.record("status", "ok");
            }
            Err(e) => {
                self.record("status", "error");
                self.record("error.message", e.to_string().as_str());
            }
        }
    }
}

/// Factory for load-pass spans.
pub struct LoadSpan;

impl LoadSpan {
    /// Span for one bulk load with a fresh run id.
    ///
    /// `status`, `error.message`, `published` and `skipped` are filled in
    /// when the pass finishes.
    pub fn new(root: &str, reload: bool) -> (Span, Uuid) {
        let run_id = Uuid::new_v4();
        let span = info_span!(
            "artifact_load",
            run_id = %run_id,
            root = %root,
            reload = reload,
            status = tracing::field::Empty,
            error.message = tracing::field::Empty,
            published = tracing::field::Empty,
            skipped = tracing::field::Empty,
        );
        (span, run_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_run_ids_differ() {
        let (_, a) = LoadSpan::new("/m", false);
        let (_, b) = LoadSpan::new("/m", false);
        assert_ne!(a, b);
    }

    #[test]
    fn test_record_result_without_subscriber() {
        let (span, _) = LoadSpan::new("/m", true);
        let result: Result<(), String> = Err("boom".into());
        span.record_result(&result);
    }
}
