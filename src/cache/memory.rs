//! In-process cache store.
//!
//! Uses DashMap for lock-free concurrent access. Used as the store for tests
//! and dry runs; counts writes per key so idempotency can be observed.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use async_trait::async_trait;
use dashmap::DashMap;
use serde_json::Value;

use super::{glob_match, resolve_path, CacheError, CacheStore, ModelMeta};

#[derive(Debug, Clone)]
enum Entry {
    Bytes(Vec<u8>),
    Hash(BTreeMap<String, String>),
    Model { meta: ModelMeta, blob: Vec<u8> },
    Document(Value),
}

/// Concurrent in-memory implementation of [`CacheStore`].
pub struct MemoryStore {
    name: String,
    entries: DashMap<String, Entry>,
    writes: DashMap<String, u64>,
    total_writes: AtomicU64,
    offline: AtomicBool,
}

impl MemoryStore {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            entries: DashMap::new(),
            writes: DashMap::new(),
            total_writes: AtomicU64::new(0),
            offline: AtomicBool::new(false),
        }
    }

    /// Simulate a lost connection: every call fails until set back to online.
    pub fn set_offline(&self, offline: bool) {
        self.offline.store(offline, Ordering::SeqCst);
    }

    /// Number of writes that targeted `key` (set, model store, document, hash).
    pub fn write_count(&self, key: &str) -> u64 {
        self.writes.get(key).map(|c| *c).unwrap_or(0)
    }

    pub fn total_writes(&self) -> u64 {
        self.total_writes.load(Ordering::SeqCst)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Stored tensor model blob, for assertions.
    pub fn model_blob(&self, key: &str) -> Option<Vec<u8>> {
        match self.entries.get(key).map(|e| e.value().clone()) {
            Some(Entry::Model { blob, .. }) => Some(blob),
            _ => None,
        }
    }

    fn check_online(&self) -> Result<(), CacheError> {
        if self.offline.load(Ordering::SeqCst) {
            return Err(CacheError::Connection {
                addr: self.name.clone(),
                reason: "store offline".into(),
            });
        }
        Ok(())
    }

    fn record_write(&self, key: &str) {
        *self.writes.entry(key.to_string()).or_insert(0) += 1;
        self.total_writes.fetch_add(1, Ordering::SeqCst);
    }

    fn wrong_type(&self, key: &str) -> CacheError {
        CacheError::Server(format!(
            "WRONGTYPE Operation against a key holding the wrong kind of value: {key}"
        ))
    }
}

#[async_trait]
impl CacheStore for MemoryStore {
    async fn ping(&self) -> Result<(), CacheError> {
        self.check_online()
    }

    async fn set(&self, key: &str, value: &[u8]) -> Result<(), CacheError> {
        self.check_online()?;
        self.entries.insert(key.to_string(), Entry::Bytes(value.to_vec()));
        self.record_write(key);
        Ok(())
    }

    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, CacheError> {
        self.check_online()?;
        match self.entries.get(key).map(|e| e.value().clone()) {
            None => Ok(None),
            Some(Entry::Bytes(bytes)) => Ok(Some(bytes)),
            Some(_) => Err(self.wrong_type(key)),
        }
    }

    async fn del(&self, keys: &[String]) -> Result<usize, CacheError> {
        self.check_online()?;
        Ok(keys
            .iter()
            .filter(|k| self.entries.remove(k.as_str()).is_some())
            .count())
    }

    async fn exists(&self, key: &str) -> Result<bool, CacheError> {
        self.check_online()?;
        Ok(self.entries.contains_key(key))
    }

    async fn keys(&self, pattern: &str) -> Result<Vec<String>, CacheError> {
        self.check_online()?;
        let mut keys: Vec<String> = self
            .entries
            .iter()
            .filter(|e| glob_match(pattern, e.key()))
            .map(|e| e.key().clone())
            .collect();
        keys.sort();
        Ok(keys)
    }

    async fn hset(&self, key: &str, field: &str, value: &str) -> Result<(), CacheError> {
        self.check_online()?;
        let mut entry = self
            .entries
            .entry(key.to_string())
            .or_insert_with(|| Entry::Hash(BTreeMap::new()));
        match entry.value_mut() {
            Entry::Hash(map) => {
                map.insert(field.to_string(), value.to_string());
            }
            _ => return Err(self.wrong_type(key)),
        }
        drop(entry);
        self.record_write(key);
        Ok(())
    }

    async fn hdel(&self, key: &str, field: &str) -> Result<bool, CacheError> {
        self.check_online()?;
        let removed = match self.entries.get_mut(key) {
            None => false,
            Some(mut entry) => match entry.value_mut() {
                Entry::Hash(map) => map.remove(field).is_some(),
                _ => return Err(self.wrong_type(key)),
            },
        };
        // An emptied hash disappears, as on the server.
        self.entries
            .remove_if(key, |_, e| matches!(e, Entry::Hash(map) if map.is_empty()));
        Ok(removed)
    }

    async fn hgetall(&self, key: &str) -> Result<BTreeMap<String, String>, CacheError> {
        self.check_online()?;
        match self.entries.get(key).map(|e| e.value().clone()) {
            None => Ok(BTreeMap::new()),
            Some(Entry::Hash(map)) => Ok(map),
            Some(_) => Err(self.wrong_type(key)),
        }
    }

    async fn model_store(
        &self,
        key: &str,
        meta: &ModelMeta,
        blob: &[u8],
    ) -> Result<(), CacheError> {
        self.check_online()?;
        self.entries.insert(
            key.to_string(),
            Entry::Model {
                meta: meta.clone(),
                blob: blob.to_vec(),
            },
        );
        self.record_write(key);
        Ok(())
    }

    async fn model_tag(&self, key: &str) -> Result<Option<String>, CacheError> {
        self.check_online()?;
        match self.entries.get(key).map(|e| e.value().clone()) {
            None => Ok(None),
            Some(Entry::Model { meta, .. }) => Ok(Some(meta.tag)),
            Some(_) => Err(self.wrong_type(key)),
        }
    }

    async fn json_set(&self, key: &str, doc: &Value) -> Result<(), CacheError> {
        self.check_online()?;
        self.entries
            .insert(key.to_string(), Entry::Document(doc.clone()));
        self.record_write(key);
        Ok(())
    }

    async fn json_get(&self, key: &str, path: &str) -> Result<Option<Value>, CacheError> {
        self.check_online()?;
        match self.entries.get(key).map(|e| e.value().clone()) {
            None => Ok(None),
            Some(Entry::Document(doc)) => Ok(resolve_path(&doc, path).cloned()),
            Some(_) => Err(self.wrong_type(key)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::{ModelBackend, ModelDevice};
    use serde_json::json;

    fn meta(tag: &str) -> ModelMeta {
        ModelMeta {
            backend: ModelBackend::Onnx,
            device: ModelDevice::Cpu,
            tag: tag.to_string(),
        }
    }

    #[tokio::test]
    async fn test_set_get_counts_writes() {
        let store = MemoryStore::new("master");
        store.set("a", b"1").await.unwrap();
        store.set("a", b"2").await.unwrap();
        assert_eq!(store.get("a").await.unwrap(), Some(b"2".to_vec()));
        assert_eq!(store.write_count("a"), 2);
        assert_eq!(store.total_writes(), 2);
    }

    #[tokio::test]
    async fn test_model_tag_round_trip() {
        let store = MemoryStore::new("master");
        store.model_store("m", &meta("12.5"), b"onnx").await.unwrap();
        assert_eq!(store.model_tag("m").await.unwrap(), Some("12.5".into()));
        assert_eq!(store.model_tag("missing").await.unwrap(), None);
        assert_eq!(store.model_blob("m"), Some(b"onnx".to_vec()));
    }

    #[tokio::test]
    async fn test_hash_field_removal_drops_empty_hash() {
        let store = MemoryStore::new("backend");
        store.hset("h", "f", "v").await.unwrap();
        assert!(store.hdel("h", "f").await.unwrap());
        assert!(!store.exists("h").await.unwrap());
        assert!(!store.hdel("h", "f").await.unwrap());
    }

    #[tokio::test]
    async fn test_wrong_type_is_server_error() {
        let store = MemoryStore::new("backend");
        store.set("s", b"x").await.unwrap();
        let err = store.hset("s", "f", "v").await.unwrap_err();
        assert!(matches!(err, CacheError::Server(_)));
    }

    #[tokio::test]
    async fn test_offline_store_fails_every_call() {
        let store = MemoryStore::new("slave");
        store.set_offline(true);
        assert!(matches!(
            store.set("k", b"v").await,
            Err(CacheError::Connection { .. })
        ));
        assert_eq!(store.total_writes(), 0);
    }

    #[tokio::test]
    async fn test_document_nested_read() {
        let store = MemoryStore::new("master");
        store
            .json_set("doc", &json!({"10": {"2": 4.0}}))
            .await
            .unwrap();
        assert_eq!(
            store.json_get("doc", ".10.2").await.unwrap(),
            Some(json!(4.0))
        );
    }
}
