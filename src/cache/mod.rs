//! Cache store boundary.
//!
//! Every replica (and the backend store that holds the serving registry) is
//! reached through the [`CacheStore`] trait. Keys are flat strings; the only
//! structure is the path-derived key scheme in `artifacts::key`.

mod client;
mod memory;
mod replica;

pub use client::RespStore;
pub use memory::MemoryStore;
pub use replica::{ReplicaHandle, ReplicaRole, ReplicaSet};

use std::collections::BTreeMap;

use async_trait::async_trait;
use serde_json::Value;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum CacheError {
    #[error("Connection to {addr} failed: {reason}")]
    Connection { addr: String, reason: String },

    #[error("Server replied with error: {0}")]
    Server(String),

    #[error("Cache command failed: {0}")]
    Redis(#[from] redis::RedisError),

    #[error("Document error: {0}")]
    Document(#[from] serde_json::Error),
}

/// Execution backend of a stored tensor model.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModelBackend {
    Onnx,
}

impl ModelBackend {
    pub fn as_str(&self) -> &'static str {
        match self {
            ModelBackend::Onnx => "ONNX",
        }
    }
}

/// Device a stored tensor model is bound to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModelDevice {
    Cpu,
}

impl ModelDevice {
    pub fn as_str(&self) -> &'static str {
        match self {
            ModelDevice::Cpu => "CPU",
        }
    }
}

/// Metadata sent alongside a tensor model blob.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModelMeta {
    pub backend: ModelBackend,
    pub device: ModelDevice,
    /// Freshness tag compared on the next load pass.
    pub tag: String,
}

/// Key-value, hash, tensor-model and document primitives of one cache server.
///
/// Implementations must be cheap to share across tasks; all methods take `&self`.
#[async_trait]
pub trait CacheStore: Send + Sync {
    /// Liveness probe.
    async fn ping(&self) -> Result<(), CacheError>;

    async fn set(&self, key: &str, value: &[u8]) -> Result<(), CacheError>;

    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, CacheError>;

    /// Delete keys, returning how many existed.
    async fn del(&self, keys: &[String]) -> Result<usize, CacheError>;

    async fn exists(&self, key: &str) -> Result<bool, CacheError>;

    /// Keys matching a glob pattern (`*` and `?` wildcards).
    async fn keys(&self, pattern: &str) -> Result<Vec<String>, CacheError>;

    async fn hset(&self, key: &str, field: &str, value: &str) -> Result<(), CacheError>;

    /// Delete a hash field, returning whether it existed.
    async fn hdel(&self, key: &str, field: &str) -> Result<bool, CacheError>;

    async fn hgetall(&self, key: &str) -> Result<BTreeMap<String, String>, CacheError>;

    /// Store a tensor model through the server's native model primitive.
    async fn model_store(&self, key: &str, meta: &ModelMeta, blob: &[u8])
        -> Result<(), CacheError>;

    /// Freshness tag of a stored tensor model, `None` when the key is absent.
    async fn model_tag(&self, key: &str) -> Result<Option<String>, CacheError>;

    /// Store a JSON document at the root path of `key`.
    async fn json_set(&self, key: &str, doc: &Value) -> Result<(), CacheError>;

    /// Read a nested path (`.minute.weekday`) of a stored JSON document.
    async fn json_get(&self, key: &str, path: &str) -> Result<Option<Value>, CacheError>;
}

/// Glob match used by `keys` implementations that filter locally.
pub fn glob_match(pattern: &str, candidate: &str) -> bool {
    let p: Vec<char> = pattern.chars().collect();
    let c: Vec<char> = candidate.chars().collect();
    let (mut pi, mut ci) = (0usize, 0usize);
    let mut star: Option<(usize, usize)> = None;

    while ci < c.len() {
        if pi < p.len() && (p[pi] == '?' || p[pi] == c[ci]) {
            pi += 1;
            ci += 1;
        } else if pi < p.len() && p[pi] == '*' {
            star = Some((pi, ci));
            pi += 1;
        } else if let Some((sp, sc)) = star {
            pi = sp + 1;
            ci = sc + 1;
            star = Some((sp, sc + 1));
        } else {
            return false;
        }
    }
    while pi < p.len() && p[pi] == '*' {
        pi += 1;
    }
    pi == p.len()
}

/// Walk a dotted document path (`.a.b`, `$.a.b` or `.` for the root).
pub fn resolve_path<'a>(doc: &'a Value, path: &str) -> Option<&'a Value> {
    let trimmed = path.trim_start_matches('$');
    let mut current = doc;
    for segment in trimmed.split('.').filter(|s| !s.is_empty()) {
        current = match current {
            Value::Object(map) => map.get(segment)?,
            Value::Array(items) => items.get(segment.parse::<usize>().ok()?)?,
            _ => return None,
        };
    }
    Some(current)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_glob_prefix_star() {
        assert!(glob_match("Collect::*", "Collect::TargetGroups::instanceGroup:179:m"));
        assert!(!glob_match("Collect::*", "RedisServingTargets::mlc"));
        assert!(glob_match("*", ""));
    }

    #[test]
    fn test_glob_question_and_inner_star() {
        assert!(glob_match("was_?20*", "was_1201"));
        assert!(!glob_match("was_?20*", "db_1201"));
        assert!(glob_match("a*b*c", "axxbyyc"));
        assert!(!glob_match("a*b*c", "axxbyy"));
    }

    #[test]
    fn test_resolve_nested_path() {
        let doc = json!({"15": {"3": {"mean": 1.5}}});
        assert_eq!(resolve_path(&doc, ".15.3.mean"), Some(&json!(1.5)));
        assert_eq!(resolve_path(&doc, "$.15.3"), Some(&json!({"mean": 1.5})));
        assert_eq!(resolve_path(&doc, "."), Some(&doc));
        assert_eq!(resolve_path(&doc, ".16"), None);
    }
}
