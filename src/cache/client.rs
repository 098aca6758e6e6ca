//! Remote cache server client.
//!
//! A thin [`CacheStore`] adapter over a `redis` connection manager. The
//! manager is opened on first use and reconnects on its own after a broken
//! connection. Module commands (`AI.*`, `JSON.*`) go through `redis::cmd`.

use std::collections::BTreeMap;

use async_trait::async_trait;
use redis::aio::ConnectionManager;
use redis::{FromRedisValue, Value as RedisValue};
use serde_json::Value;
use tokio::sync::OnceCell;
use tracing::debug;

use super::{resolve_path, CacheError, CacheStore, ModelMeta};

/// [`CacheStore`] backed by a remote server.
pub struct RespStore {
    addr: String,
    conn: OnceCell<ConnectionManager>,
}

impl RespStore {
    pub fn new(addr: impl Into<String>) -> Self {
        Self {
            addr: addr.into(),
            conn: OnceCell::new(),
        }
    }

    pub fn addr(&self) -> &str {
        &self.addr
    }

    fn url(&self) -> String {
        format!("redis://{}/", self.addr)
    }

    async fn connection(&self) -> Result<ConnectionManager, CacheError> {
        let manager = self
            .conn
            .get_or_try_init(|| async {
                let client = redis::Client::open(self.url()).map_err(|e| self.connect_error(e))?;
                let manager = ConnectionManager::new(client)
                    .await
                    .map_err(|e| self.connect_error(e))?;
                debug!(addr = %self.addr, "cache connection opened");
                Ok::<_, CacheError>(manager)
            })
            .await?;
        Ok(manager.clone())
    }

    fn connect_error(&self, err: redis::RedisError) -> CacheError {
        CacheError::Connection {
            addr: self.addr.clone(),
            reason: err.to_string(),
        }
    }
}

/// Pull the `tag` value out of an `AI.MODELGET ... META` field/value list.
fn tag_from_meta(items: &[RedisValue]) -> Option<String> {
    items.chunks_exact(2).find_map(|pair| {
        let field = String::from_redis_value(&pair[0]).ok()?;
        if field == "tag" {
            String::from_redis_value(&pair[1]).ok()
        } else {
            None
        }
    })
}

#[async_trait]
impl CacheStore for RespStore {
    async fn ping(&self) -> Result<(), CacheError> {
        let mut conn = self.connection().await?;
        let _: String = redis::cmd("PING").query_async(&mut conn).await?;
        Ok(())
    }

    async fn set(&self, key: &str, value: &[u8]) -> Result<(), CacheError> {
        let mut conn = self.connection().await?;
        let _: () = redis::cmd("SET").arg(key).arg(value).query_async(&mut conn).await?;
        Ok(())
    }

    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, CacheError> {
        let mut conn = self.connection().await?;
        Ok(redis::cmd("GET").arg(key).query_async(&mut conn).await?)
    }

    async fn del(&self, keys: &[String]) -> Result<usize, CacheError> {
        if keys.is_empty() {
            return Ok(0);
        }
        let mut conn = self.connection().await?;
        let n: i64 = redis::cmd("DEL").arg(keys).query_async(&mut conn).await?;
        Ok(n.max(0) as usize)
    }

    async fn exists(&self, key: &str) -> Result<bool, CacheError> {
        let mut conn = self.connection().await?;
        Ok(redis::cmd("EXISTS").arg(key).query_async(&mut conn).await?)
    }

    async fn keys(&self, pattern: &str) -> Result<Vec<String>, CacheError> {
        let mut conn = self.connection().await?;
        Ok(redis::cmd("KEYS").arg(pattern).query_async(&mut conn).await?)
    }

    async fn hset(&self, key: &str, field: &str, value: &str) -> Result<(), CacheError> {
        let mut conn = self.connection().await?;
        let _: i64 = redis::cmd("HSET")
            .arg(key)
            .arg(field)
            .arg(value)
            .query_async(&mut conn)
            .await?;
        Ok(())
    }

    async fn hdel(&self, key: &str, field: &str) -> Result<bool, CacheError> {
        let mut conn = self.connection().await?;
        let n: i64 = redis::cmd("HDEL").arg(key).arg(field).query_async(&mut conn).await?;
        Ok(n > 0)
    }

    async fn hgetall(&self, key: &str) -> Result<BTreeMap<String, String>, CacheError> {
        let mut conn = self.connection().await?;
        Ok(redis::cmd("HGETALL").arg(key).query_async(&mut conn).await?)
    }

    async fn model_store(
        &self,
        key: &str,
        meta: &ModelMeta,
        blob: &[u8],
    ) -> Result<(), CacheError> {
        let mut conn = self.connection().await?;
        let _: () = redis::cmd("AI.MODELSTORE")
            .arg(key)
            .arg(meta.backend.as_str())
            .arg(meta.device.as_str())
            .arg("TAG")
            .arg(&meta.tag)
            .arg("BLOB")
            .arg(blob)
            .query_async(&mut conn)
            .await?;
        Ok(())
    }

    async fn model_tag(&self, key: &str) -> Result<Option<String>, CacheError> {
        if !self.exists(key).await? {
            return Ok(None);
        }
        let mut conn = self.connection().await?;
        let items: Vec<RedisValue> = redis::cmd("AI.MODELGET")
            .arg(key)
            .arg("META")
            .query_async(&mut conn)
            .await?;
        Ok(tag_from_meta(&items))
    }

    async fn json_set(&self, key: &str, doc: &Value) -> Result<(), CacheError> {
        let body = serde_json::to_string(doc)?;
        let mut conn = self.connection().await?;
        let _: () = redis::cmd("JSON.SET")
            .arg(key)
            .arg(".")
            .arg(body)
            .query_async(&mut conn)
            .await?;
        Ok(())
    }

    async fn json_get(&self, key: &str, path: &str) -> Result<Option<Value>, CacheError> {
        // Fetch the whole document and walk the path locally so numeric
        // segments resolve the same way as in the in-memory store.
        let mut conn = self.connection().await?;
        let raw: Option<String> = redis::cmd("JSON.GET").arg(key).query_async(&mut conn).await?;
        match raw {
            Some(raw) => {
                let doc: Value = serde_json::from_str(&raw)?;
                Ok(resolve_path(&doc, path).cloned())
            }
            None => Ok(None),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::net::TcpListener;

    fn bulk(s: &str) -> RedisValue {
        RedisValue::Data(s.as_bytes().to_vec())
    }

    #[test]
    fn test_tag_from_meta_pairs() {
        let items = vec![bulk("backend"), bulk("ONNX"), bulk("tag"), bulk("12.5")];
        assert_eq!(tag_from_meta(&items), Some("12.5".to_string()));
    }

    #[test]
    fn test_tag_from_meta_missing() {
        let items = vec![bulk("backend"), bulk("ONNX"), bulk("device")];
        assert_eq!(tag_from_meta(&items), None);
    }

    #[test]
    fn test_url_from_addr() {
        assert_eq!(RespStore::new("10.0.0.5:6379").url(), "redis://10.0.0.5:6379/");
    }

    #[tokio::test]
    async fn test_connect_failure() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap().to_string();
        drop(listener);
        let store = RespStore::new(addr);
        assert!(matches!(
            store.ping().await,
            Err(CacheError::Connection { .. })
        ));
    }
}
