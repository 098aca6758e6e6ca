//! Runtime configuration loading from environment variables.
//!
//! All values come from `MLC_*` environment variables with defaults. Invalid
//! values fall back to defaults without crashing. When `MLC_CONFIG_FILE`
//! names a TOML file, its entries override the environment.
//!
//! # Environment Variables
//!
//! | Variable | Default | Description |
//! |---|---|---|
//! | `MLC_MODEL_ROOT` | `$AIMODULE_HOME/model` or `./model` | Artifact root |
//! | `MLC_SYS_ID` | 102 | System id under the root |
//! | `MLC_SERVER_ROLE` | master | Process role |
//! | `MLC_USE_SLAVE_SERVER` | false | Dual-server mode |
//! | `MLC_MASTER_ADDR` | 127.0.0.1:6379 | Master replica |
//! | `MLC_SLAVE_ADDR` | 127.0.0.1:6380 | Slave replica |
//! | `MLC_BACKEND_ADDR` | 127.0.0.1:6379 | Registry store |
//! | `MLC_LOAD_WORKER_RATIO` | 0.9 | CPU fraction for the result pass |
//! | `MLC_HEALTH_RETRIES` | 5 | Startup probe attempts |
//! | `MLC_HEALTH_INTERVAL_MS` | 1000 | Delay between probes |
//! | `MLC_CONFIG_FILE` | unset | TOML override file |

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::cache::ReplicaRole;
use crate::health::HealthConfig;

pub const DEFAULT_SYS_ID: &str = "102";
pub const DEFAULT_MASTER_ADDR: &str = "127.0.0.1:6379";
pub const DEFAULT_SLAVE_ADDR: &str = "127.0.0.1:6380";
pub const DEFAULT_BACKEND_ADDR: &str = "127.0.0.1:6379";
pub const DEFAULT_WORKER_RATIO: f64 = 0.9;
pub const DEFAULT_HEALTH_RETRIES: u32 = 5;
pub const DEFAULT_HEALTH_INTERVAL_MS: u64 = 1000;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Failed to parse config file {path}: {source}")]
    Parse {
        path: PathBuf,
        source: toml::de::Error,
    },
}

/// Effective runtime configuration summary (serializable).
#[derive(Debug, Clone, Serialize)]
pub struct EffectiveConfig {
    pub model_root: String,
    pub sys_id: String,
    pub server_role: String,
    pub use_slave_server: bool,
    pub master_addr: String,
    pub slave_addr: String,
    pub backend_addr: String,
    pub load_worker_ratio: f64,
    pub health_retries: u32,
    pub health_interval_ms: u64,
    pub config_file: Option<String>,
}

/// All runtime configuration.
#[derive(Debug, Clone)]
pub struct EnvConfig {
    pub model_root: PathBuf,
    pub sys_id: String,
    pub role: ReplicaRole,
    pub use_slave_server: bool,
    pub master_addr: String,
    pub slave_addr: String,
    pub backend_addr: String,
    pub load_worker_ratio: f64,
    pub health: HealthConfig,
    pub config_file: Option<PathBuf>,
}

/// `host`/`port` pair in the TOML file.
#[derive(Debug, Clone, Deserialize)]
pub struct ServerSection {
    pub host: String,
    pub port: u16,
}

impl ServerSection {
    fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ServersSection {
    pub master: Option<ServerSection>,
    pub slave: Option<ServerSection>,
}

/// Layout of the optional TOML override file.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct FileConfig {
    pub model_root: Option<PathBuf>,
    pub sys_id: Option<String>,
    pub role: Option<String>,
    pub use_slave_server: Option<bool>,
    #[serde(default)]
    pub servers: ServersSection,
    pub backend: Option<ServerSection>,
}

impl FileConfig {
    pub fn read(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        toml::from_str(&text).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }
}

fn parse_u32(key: &str, default: u32) -> u32 {
    match std::env::var(key) {
        Ok(val) => val.parse::<u32>().unwrap_or(default),
        Err(_) => default,
    }
}

fn parse_u64(key: &str, default: u64) -> u64 {
    match std::env::var(key) {
        Ok(val) => val.parse::<u64>().unwrap_or(default),
        Err(_) => default,
    }
}

/// Ratios outside `(0, 1]` fall back to the default.
fn parse_ratio(key: &str, default: f64) -> f64 {
    match std::env::var(key).ok().and_then(|v| v.parse::<f64>().ok()) {
        Some(r) if r > 0.0 && r <= 1.0 => r,
        _ => default,
    }
}

fn parse_bool(key: &str, default: bool) -> bool {
    match std::env::var(key) {
        Ok(val) => match val.trim().to_ascii_lowercase().as_str() {
            "1" | "true" | "yes" | "on" => true,
            "0" | "false" | "no" | "off" => false,
            _ => default,
        },
        Err(_) => default,
    }
}

fn parse_string(key: &str, default: &str) -> String {
    match std::env::var(key) {
        Ok(val) if !val.trim().is_empty() => val.trim().to_string(),
        _ => default.to_string(),
    }
}

fn parse_role(value: Option<String>) -> ReplicaRole {
    value
        .as_deref()
        .and_then(ReplicaRole::parse)
        .unwrap_or(ReplicaRole::Master)
}

fn default_model_root() -> PathBuf {
    match std::env::var("AIMODULE_HOME") {
        Ok(home) if !home.is_empty() => PathBuf::from(home).join("model"),
        _ => PathBuf::from("./model"),
    }
}

/// Configuration from the environment alone.
pub fn load_env() -> EnvConfig {
    let model_root = std::env::var("MLC_MODEL_ROOT")
        .ok()
        .filter(|v| !v.is_empty())
        .map(PathBuf::from)
        .unwrap_or_else(default_model_root);
    let retries = parse_u32("MLC_HEALTH_RETRIES", DEFAULT_HEALTH_RETRIES).max(1);
    let interval_ms = parse_u64("MLC_HEALTH_INTERVAL_MS", DEFAULT_HEALTH_INTERVAL_MS);

    EnvConfig {
        model_root,
        sys_id: parse_string("MLC_SYS_ID", DEFAULT_SYS_ID),
        role: parse_role(std::env::var("MLC_SERVER_ROLE").ok()),
        use_slave_server: parse_bool("MLC_USE_SLAVE_SERVER", false),
        master_addr: parse_string("MLC_MASTER_ADDR", DEFAULT_MASTER_ADDR),
        slave_addr: parse_string("MLC_SLAVE_ADDR", DEFAULT_SLAVE_ADDR),
        backend_addr: parse_string("MLC_BACKEND_ADDR", DEFAULT_BACKEND_ADDR),
        load_worker_ratio: parse_ratio("MLC_LOAD_WORKER_RATIO", DEFAULT_WORKER_RATIO),
        health: HealthConfig {
            retries,
            interval: Duration::from_millis(interval_ms),
        },
        config_file: std::env::var("MLC_CONFIG_FILE")
            .ok()
            .filter(|v| !v.is_empty())
            .map(PathBuf::from),
    }
}

/// Load all configuration: environment, then the TOML file if one is named.
pub fn load() -> Result<EnvConfig, ConfigError> {
    let mut cfg = load_env();
    if let Some(path) = cfg.config_file.clone() {
        cfg.apply_file(FileConfig::read(&path)?);
    }
    Ok(cfg)
}

impl EnvConfig {
    /// Overlay entries present in `file`.
    pub fn apply_file(&mut self, file: FileConfig) {
        if let Some(root) = file.model_root {
            self.model_root = root;
        }
        if let Some(sys_id) = file.sys_id {
            self.sys_id = sys_id;
        }
        if file.role.is_some() {
            self.role = parse_role(file.role);
        }
        if let Some(dual) = file.use_slave_server {
            self.use_slave_server = dual;
        }
        if let Some(master) = &file.servers.master {
            self.master_addr = master.addr();
        }
        if let Some(slave) = &file.servers.slave {
            self.slave_addr = slave.addr();
        }
        if let Some(backend) = &file.backend {
            self.backend_addr = backend.addr();
        }
    }

    /// Address of a replica role.
    pub fn addr_for(&self, role: ReplicaRole) -> &str {
        match role {
            ReplicaRole::Master => &self.master_addr,
            ReplicaRole::Slave => &self.slave_addr,
        }
    }

    /// Return a serializable summary of all effective values.
    pub fn effective_config(&self) -> EffectiveConfig {
        EffectiveConfig {
            model_root: self.model_root.display().to_string(),
            sys_id: self.sys_id.clone(),
            server_role: self.role.to_string(),
            use_slave_server: self.use_slave_server,
            master_addr: self.master_addr.clone(),
            slave_addr: self.slave_addr.clone(),
            backend_addr: self.backend_addr.clone(),
            load_worker_ratio: self.load_worker_ratio,
            health_retries: self.health.retries,
            health_interval_ms: self.health.interval.as_millis() as u64,
            config_file: self.config_file.as_ref().map(|p| p.display().to_string()),
        }
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use std::sync::Mutex;

    // Serialize env-mutating tests to avoid cross-test pollution.
    pub(crate) static ENV_LOCK: Mutex<()> = Mutex::new(());

    pub(crate) const ENV_KEYS: &[&str] = &[
        "MLC_MODEL_ROOT",
        "MLC_SYS_ID",
        "MLC_SERVER_ROLE",
        "MLC_USE_SLAVE_SERVER",
        "MLC_MASTER_ADDR",
        "MLC_SLAVE_ADDR",
        "MLC_BACKEND_ADDR",
        "MLC_LOAD_WORKER_RATIO",
        "MLC_HEALTH_RETRIES",
        "MLC_HEALTH_INTERVAL_MS",
        "MLC_CONFIG_FILE",
        "AIMODULE_HOME",
    ];

    pub(crate) fn clear_env_vars() {
        for k in ENV_KEYS {
            std::env::remove_var(k);
        }
    }

    #[test]
    fn test_defaults_are_sensible() {
        let _lock = ENV_LOCK.lock().unwrap();
        clear_env_vars();
        let cfg = load().unwrap();
        assert_eq!(cfg.model_root, PathBuf::from("./model"));
        assert_eq!(cfg.sys_id, "102");
        assert_eq!(cfg.role, ReplicaRole::Master);
        assert!(!cfg.use_slave_server);
        assert_eq!(cfg.master_addr, DEFAULT_MASTER_ADDR);
        assert_eq!(cfg.slave_addr, DEFAULT_SLAVE_ADDR);
        assert_eq!(cfg.load_worker_ratio, 0.9);
        assert_eq!(cfg.health.retries, 5);
        assert_eq!(cfg.health.interval, Duration::from_millis(1000));
    }

    #[test]
    fn test_model_root_from_aimodule_home() {
        let _lock = ENV_LOCK.lock().unwrap();
        clear_env_vars();
        std::env::set_var("AIMODULE_HOME", "/opt/aimodule");
        assert_eq!(load_env().model_root, PathBuf::from("/opt/aimodule/model"));
        clear_env_vars();
    }

    #[test]
    fn test_env_vars_override_defaults() {
        let _lock = ENV_LOCK.lock().unwrap();
        clear_env_vars();
        std::env::set_var("MLC_SERVER_ROLE", "slave");
        std::env::set_var("MLC_USE_SLAVE_SERVER", "true");
        std::env::set_var("MLC_MASTER_ADDR", "10.0.0.1:6379");
        std::env::set_var("MLC_LOAD_WORKER_RATIO", "0.5");
        let cfg = load_env();
        assert_eq!(cfg.role, ReplicaRole::Slave);
        assert!(cfg.use_slave_server);
        assert_eq!(cfg.addr_for(ReplicaRole::Master), "10.0.0.1:6379");
        assert_eq!(cfg.load_worker_ratio, 0.5);
        clear_env_vars();
    }

    #[test]
    fn test_invalid_env_falls_back_to_default() {
        let _lock = ENV_LOCK.lock().unwrap();
        clear_env_vars();
        std::env::set_var("MLC_SERVER_ROLE", "primary");
        std::env::set_var("MLC_USE_SLAVE_SERVER", "maybe");
        std::env::set_var("MLC_LOAD_WORKER_RATIO", "3.5");
        std::env::set_var("MLC_HEALTH_RETRIES", "0");
        let cfg = load_env();
        assert_eq!(cfg.role, ReplicaRole::Master);
        assert!(!cfg.use_slave_server);
        assert_eq!(cfg.load_worker_ratio, 0.9);
        assert_eq!(cfg.health.retries, 1);
        clear_env_vars();
    }

    #[test]
    fn test_file_overrides_env() {
        let _lock = ENV_LOCK.lock().unwrap();
        clear_env_vars();
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("mlc.toml");
        std::fs::write(
            &path,
            r#"
role = "slave"
use_slave_server = true
sys_id = "7"

[servers.master]
host = "redis-a"
port = 7000

[backend]
host = "redis-b"
port = 7001
"#,
        )
        .unwrap();
        std::env::set_var("MLC_CONFIG_FILE", &path);
        let cfg = load().unwrap();
        assert_eq!(cfg.role, ReplicaRole::Slave);
        assert_eq!(cfg.sys_id, "7");
        assert_eq!(cfg.master_addr, "redis-a:7000");
        assert_eq!(cfg.slave_addr, DEFAULT_SLAVE_ADDR);
        assert_eq!(cfg.backend_addr, "redis-b:7001");
        clear_env_vars();
    }

    #[test]
    fn test_bad_file_is_error() {
        let _lock = ENV_LOCK.lock().unwrap();
        clear_env_vars();
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bad.toml");
        std::fs::write(&path, "role = [").unwrap();
        std::env::set_var("MLC_CONFIG_FILE", &path);
        assert!(matches!(load(), Err(ConfigError::Parse { .. })));
        std::env::set_var("MLC_CONFIG_FILE", dir.path().join("missing.toml"));
        assert!(matches!(load(), Err(ConfigError::Read { .. })));
        clear_env_vars();
    }

    #[test]
    fn test_effective_config_reports_role() {
        let _lock = ENV_LOCK.lock().unwrap();
        clear_env_vars();
        let eff = load_env().effective_config();
        assert_eq!(eff.server_role, "master");
        assert!(eff.config_file.is_none());
    }
}
