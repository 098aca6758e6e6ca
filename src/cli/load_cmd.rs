// Copyright 2024-2026 GG-CORE Contributors
// SPDX-License-Identifier: Apache-2.0

//! Load and classify subcommands.

use std::path::Path;

use crate::artifacts::explain;
use crate::SyncRuntime;

/// Load `path` (the model root when `None`). Exit 3 when the cache server
/// never answers, 1 when the load fails.
pub async fn run_load(runtime: &SyncRuntime, reload: bool, path: Option<&Path>) -> i32 {
    if !runtime.health.primary_ready(runtime.replicas()).await {
        eprintln!("Cache server is not reachable.");
        return 3;
    }
    let root = path.unwrap_or(runtime.config.model_root.as_path());
    match runtime.loader.load(root, reload).await {
        Ok(summary) if summary.skipped_by_role => {
            println!("Slave role: load skipped.");
            0
        }
        Ok(summary) => {
            println!("scanned={}", summary.scanned);
            println!("published={}", summary.published);
            println!("unchanged={}", summary.unchanged);
            println!("ignored={}", summary.ignored);
            println!("failed={}", summary.failed);
            println!("replica_failures={}", summary.replica_failures);
            println!("results_published={}", summary.results_published);
            println!("results_existing={}", summary.results_existing);
            0
        }
        Err(e) => {
            eprintln!("Load failed: {}", e);
            1
        }
    }
}

/// Print the kind and matching rule for each path.
pub fn run_classify(paths: &[String]) -> i32 {
    if paths.is_empty() {
        eprintln!("classify requires at least one PATH");
        return 2;
    }
    for path in paths {
        println!("{}", classify_line(path));
    }
    0
}

fn classify_line(path: &str) -> String {
    let (kind, rule) = explain(path);
    format!("{}\t{}\t{}", kind, rule, path)
}
