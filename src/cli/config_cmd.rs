// Copyright 2024-2026 GG-CORE Contributors
// SPDX-License-Identifier: Apache-2.0

//! Config CLI subcommands: show, defaults, validate.
//!
//! These commands read configuration directly from the environment and the
//! optional TOML file without contacting any cache server.

use crate::config::{self, EffectiveConfig, EnvConfig};

/// Print effective config as key-value pairs to stdout.
pub fn run_show() -> i32 {
    match config::load() {
        Ok(cfg) => {
            print_config(&cfg.effective_config());
            0
        }
        Err(e) => {
            eprintln!("ERROR: {}", e);
            2
        }
    }
}

/// Print default config values (no env overrides) to stdout.
pub fn run_defaults() {
    println!("MLC_MODEL_ROOT=$AIMODULE_HOME/model (./model when unset)");
    println!("MLC_SYS_ID={}", config::DEFAULT_SYS_ID);
    println!("MLC_SERVER_ROLE=master");
    println!("MLC_USE_SLAVE_SERVER=false");
    println!("MLC_MASTER_ADDR={}", config::DEFAULT_MASTER_ADDR);
    println!("MLC_SLAVE_ADDR={}", config::DEFAULT_SLAVE_ADDR);
    println!("MLC_BACKEND_ADDR={}", config::DEFAULT_BACKEND_ADDR);
    println!("MLC_LOAD_WORKER_RATIO={}", config::DEFAULT_WORKER_RATIO);
    println!("MLC_HEALTH_RETRIES={}", config::DEFAULT_HEALTH_RETRIES);
    println!("MLC_HEALTH_INTERVAL_MS={}", config::DEFAULT_HEALTH_INTERVAL_MS);
}

/// Validate configuration for obvious misconfigurations.
///
/// Returns 0 if valid, 1 if any warnings are found, 2 if the config file
/// cannot be read.
pub fn run_validate() -> i32 {
    let cfg = match config::load() {
        Ok(cfg) => cfg,
        Err(e) => {
            eprintln!("ERROR: {}", e);
            return 2;
        }
    };
    let warnings = validate(&cfg);
    for warning in &warnings {
        eprintln!("WARNING: {}", warning);
    }
    if warnings.is_empty() {
        println!("Configuration is valid.");
        0
    } else {
        1
    }
}

/// Human-readable problems with `cfg`.
pub fn validate(cfg: &EnvConfig) -> Vec<String> {
    let mut warnings = Vec::new();
    if !cfg.model_root.is_dir() {
        warnings.push(format!(
            "MLC_MODEL_ROOT ({}) is not a directory",
            cfg.model_root.display()
        ));
    }
    if cfg.use_slave_server && cfg.master_addr == cfg.slave_addr {
        warnings.push(format!(
            "dual-server mode with identical master and slave address ({})",
            cfg.master_addr
        ));
    }
    if cfg.sys_id.is_empty() {
        warnings.push("MLC_SYS_ID is empty".to_string());
    }
    warnings
}

fn print_config(cfg: &EffectiveConfig) {
    println!("MLC_MODEL_ROOT={}", cfg.model_root);
    println!("MLC_SYS_ID={}", cfg.sys_id);
    println!("MLC_SERVER_ROLE={}", cfg.server_role);
    println!("MLC_USE_SLAVE_SERVER={}", cfg.use_slave_server);
    println!("MLC_MASTER_ADDR={}", cfg.master_addr);
    println!("MLC_SLAVE_ADDR={}", cfg.slave_addr);
    println!("MLC_BACKEND_ADDR={}", cfg.backend_addr);
    println!("MLC_LOAD_WORKER_RATIO={}", cfg.load_worker_ratio);
    println!("MLC_HEALTH_RETRIES={}", cfg.health_retries);
    println!("MLC_HEALTH_INTERVAL_MS={}", cfg.health_interval_ms);
    if let Some(file) = &cfg.config_file {
        println!("MLC_CONFIG_FILE={}", file);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::tests::{clear_env_vars, ENV_LOCK};

    #[test]
    fn test_validate_flags_missing_root() {
        let _lock = ENV_LOCK.lock().unwrap();
        clear_env_vars();
        let mut cfg = config::load_env();
        cfg.model_root = "/nonexistent/mlc/model".into();
        let warnings = validate(&cfg);
        assert_eq!(warnings.len(), 1);
        assert!(warnings[0].contains("not a directory"));
    }

    #[test]
    fn test_validate_flags_same_dual_addresses() {
        let _lock = ENV_LOCK.lock().unwrap();
        clear_env_vars();
        let dir = tempfile::tempdir().unwrap();
        let mut cfg = config::load_env();
        cfg.model_root = dir.path().to_path_buf();
        cfg.use_slave_server = true;
        cfg.slave_addr = cfg.master_addr.clone();
        assert_eq!(validate(&cfg).len(), 1);
        cfg.slave_addr = "10.0.0.9:6380".into();
        assert!(validate(&cfg).is_empty());
    }

    #[test]
    fn test_validate_bad_file_exit_code() {
        let _lock = ENV_LOCK.lock().unwrap();
        clear_env_vars();
        let dir = tempfile::tempdir().unwrap();
        std::env::set_var("MLC_CONFIG_FILE", dir.path().join("missing.toml"));
        assert_eq!(run_validate(), 2);
        clear_env_vars();
    }
}
