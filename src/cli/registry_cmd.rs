// Copyright 2024-2026 GG-CORE Contributors
// SPDX-License-Identifier: Apache-2.0

//! Status and health subcommands.

use crate::health::{HealthChecker, HealthState};
use crate::serving::ServingRegistry;
use crate::cache::ReplicaSet;

/// Dump the canonical serving registry.
pub async fn run_status(registry: &ServingRegistry, json: bool) -> i32 {
    let entries = match registry.list_all().await {
        Ok(entries) => entries,
        Err(e) => {
            eprintln!("Failed to read serving registry: {}", e);
            return 3;
        }
    };
    if json {
        match serde_json::to_string_pretty(&entries) {
            Ok(text) => println!("{}", text),
            Err(e) => {
                eprintln!("Failed to encode registry: {}", e);
                return 1;
            }
        }
    } else {
        println!("{} serving target(s)", entries.len());
        for (key, entry) in &entries {
            println!("  {}  type={} target={}", key, entry.inst_type, entry.target_id);
        }
    }
    0
}

/// Probe every replica; exit 0 only when all answer.
pub async fn run_health(checker: &HealthChecker, replicas: &ReplicaSet) -> i32 {
    let report = checker.report(replicas).await;
    for replica in &report.replicas {
        match &replica.error {
            None => println!("{} {} ok ({} ms)", replica.role, replica.addr, replica.latency_ms),
            Some(e) => println!("{} {} unreachable: {}", replica.role, replica.addr, e),
        }
    }
    println!("state={:?}", report.state);
    match report.state {
        HealthState::Healthy => 0,
        _ => 1,
    }
}
