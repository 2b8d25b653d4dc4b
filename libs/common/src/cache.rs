//! Key-value store module for the timer services
//!
//! This module provides the store timers live in. Production deployments
//! use Redis; the in-memory backend serves local development and tests.
//! Both backends support get/set with TTL, prefix listing and an atomic
//! compare-and-set used for read-modify-write updates.

use std::collections::HashMap;
use std::sync::{Arc, OnceLock};
use std::time::Duration;

use redis::{AsyncCommands, Client, Script};
use tokio::sync::Mutex;
use tokio::time::Instant;
use tracing::{debug, info};

use crate::error::{StoreError, StoreResult};

/// Swap the value only if it still equals the expected one.
/// ARGV: expected, new value, ttl seconds (0 = no expiry).
const COMPARE_AND_SET_SCRIPT: &str = r#"
local current = redis.call('GET', KEYS[1])
if current ~= ARGV[1] then
    return 0
end
if tonumber(ARGV[3]) > 0 then
    redis.call('SET', KEYS[1], ARGV[2], 'EX', ARGV[3])
else
    redis.call('SET', KEYS[1], ARGV[2])
end
return 1
"#;

/// Keys fetched per SCAN round trip
const SCAN_COUNT: usize = 100;

/// Configuration for Redis connection
#[derive(Debug, Clone)]
pub struct RedisConfig {
    /// Redis connection URL (e.g., "redis://localhost:6379")
    pub url: String,
    /// Maximum number of connections in the pool
    pub max_connections: u32,
}

impl RedisConfig {
    /// Configuration for `url` with the default connection limit
    pub fn new(url: impl Into<String>) -> Self {
        RedisConfig {
            url: url.into(),
            max_connections: 10,
        }
    }

    /// Create a new RedisConfig from environment variables
    ///
    /// # Environment Variables
    /// - `REDIS_URL`: Redis connection URL (default: "redis://localhost:6379")
    /// - `REDIS_MAX_CONNECTIONS`: Maximum number of connections (default: 10)
    pub fn from_env() -> StoreResult<Self> {
        let url =
            std::env::var("REDIS_URL").unwrap_or_else(|_| "redis://localhost:6379".to_string());
        let max_connections = std::env::var("REDIS_MAX_CONNECTIONS")
            .unwrap_or_else(|_| "10".to_string())
            .parse()
            .unwrap_or(10);

        if url.is_empty() {
            return Err(StoreError::Configuration("REDIS_URL is empty".to_string()));
        }

        Ok(RedisConfig {
            url,
            max_connections,
        })
    }
}

/// Redis connection pool
#[derive(Clone)]
pub struct RedisPool {
    client: Client,
}

impl RedisPool {
    /// Initialize a new Redis connection pool
    pub async fn new(config: &RedisConfig) -> StoreResult<Self> {
        let client = Client::open(config.url.clone())?;
        info!("Redis client initialized with URL: {}", config.url);
        Ok(RedisPool { client })
    }

    /// Get a connection from the pool
    async fn get_connection(&self) -> StoreResult<redis::aio::MultiplexedConnection> {
        let conn = self.client.get_multiplexed_async_connection().await?;
        Ok(conn)
    }

    /// Set a key-value pair in Redis with optional TTL
    pub async fn set(&self, key: &str, value: &str, ttl_seconds: Option<u64>) -> StoreResult<()> {
        let mut conn = self.get_connection().await?;

        if let Some(ttl) = ttl_seconds {
            let _: () = conn.set_ex(key, value, ttl).await?;
        } else {
            let _: () = conn.set(key, value).await?;
        }

        Ok(())
    }

    /// Get a value from Redis by key
    pub async fn get(&self, key: &str) -> StoreResult<Option<String>> {
        let mut conn = self.get_connection().await?;
        let value: Option<String> = conn.get(key).await?;
        Ok(value)
    }

    /// Delete a key from Redis
    pub async fn delete(&self, key: &str) -> StoreResult<()> {
        let mut conn = self.get_connection().await?;
        let _: u64 = conn.del(key).await?;
        Ok(())
    }

    /// List every key starting with `prefix` using incremental SCAN
    pub async fn keys(&self, prefix: &str) -> StoreResult<Vec<String>> {
        let mut conn = self.get_connection().await?;
        let pattern = format!("{}*", escape_glob(prefix));

        let mut keys = Vec::new();
        let mut cursor: u64 = 0;
        loop {
            let (next, batch): (u64, Vec<String>) = redis::cmd("SCAN")
                .cursor_arg(cursor)
                .arg("MATCH")
                .arg(&pattern)
                .arg("COUNT")
                .arg(SCAN_COUNT)
                .query_async(&mut conn)
                .await?;

            keys.extend(batch);
            if next == 0 {
                break;
            }
            cursor = next;
        }

        keys.sort();
        keys.dedup();
        Ok(keys)
    }

    /// Atomically replace `expected` with `value`
    pub async fn compare_and_set(
        &self,
        key: &str,
        expected: &str,
        value: &str,
        ttl_seconds: Option<u64>,
    ) -> StoreResult<bool> {
        static SCRIPT: OnceLock<Script> = OnceLock::new();
        let script = SCRIPT.get_or_init(|| Script::new(COMPARE_AND_SET_SCRIPT));

        let mut conn = self.get_connection().await?;
        let swapped: i64 = script
            .key(key)
            .arg(expected)
            .arg(value)
            .arg(ttl_seconds.unwrap_or(0))
            .invoke_async(&mut conn)
            .await?;

        Ok(swapped == 1)
    }

    /// Check if Redis is reachable
    pub async fn health_check(&self) -> StoreResult<bool> {
        let mut conn = self.get_connection().await?;
        let pong: String = redis::cmd("PING").query_async(&mut conn).await?;
        Ok(pong == "PONG")
    }
}

/// Escape Redis glob metacharacters so a prefix matches literally
fn escape_glob(prefix: &str) -> String {
    let mut escaped = String::with_capacity(prefix.len());
    for c in prefix.chars() {
        if matches!(c, '*' | '?' | '[' | ']' | '\\') {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped
}

#[derive(Debug, Clone)]
struct MemoryEntry {
    value: String,
    expires_at: Option<Instant>,
}

impl MemoryEntry {
    fn new(value: &str, ttl_seconds: Option<u64>) -> Self {
        Self {
            value: value.to_string(),
            expires_at: ttl_seconds.map(|ttl| Instant::now() + Duration::from_secs(ttl)),
        }
    }

    fn is_expired(&self, now: Instant) -> bool {
        self.expires_at.is_some_and(|at| now >= at)
    }
}

/// Process-local store with per-key expiry
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    entries: Arc<Mutex<HashMap<String, MemoryEntry>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn set(&self, key: &str, value: &str, ttl_seconds: Option<u64>) -> StoreResult<()> {
        let mut entries = self.entries.lock().await;
        entries.insert(key.to_string(), MemoryEntry::new(value, ttl_seconds));
        Ok(())
    }

    pub async fn get(&self, key: &str) -> StoreResult<Option<String>> {
        let mut entries = self.entries.lock().await;
        let now = Instant::now();

        if entries.get(key).is_some_and(|entry| entry.is_expired(now)) {
            entries.remove(key);
            return Ok(None);
        }

        Ok(entries.get(key).map(|entry| entry.value.clone()))
    }

    pub async fn delete(&self, key: &str) -> StoreResult<()> {
        let mut entries = self.entries.lock().await;
        entries.remove(key);
        Ok(())
    }

    pub async fn keys(&self, prefix: &str) -> StoreResult<Vec<String>> {
        let entries = self.entries.lock().await;
        let now = Instant::now();

        let mut keys: Vec<String> = entries
            .iter()
            .filter(|(key, entry)| key.starts_with(prefix) && !entry.is_expired(now))
            .map(|(key, _)| key.clone())
            .collect();
        keys.sort();
        Ok(keys)
    }

    pub async fn compare_and_set(
        &self,
        key: &str,
        expected: &str,
        value: &str,
        ttl_seconds: Option<u64>,
    ) -> StoreResult<bool> {
        let mut entries = self.entries.lock().await;
        let now = Instant::now();

        let matches = entries
            .get(key)
            .is_some_and(|entry| !entry.is_expired(now) && entry.value == expected);
        if !matches {
            return Ok(false);
        }

        entries.insert(key.to_string(), MemoryEntry::new(value, ttl_seconds));
        Ok(true)
    }

    /// Drop expired entries, returning how many were removed
    pub async fn purge_expired(&self) -> usize {
        let mut entries = self.entries.lock().await;
        let now = Instant::now();
        let before = entries.len();
        entries.retain(|_, entry| !entry.is_expired(now));
        before - entries.len()
    }

    pub async fn len(&self) -> usize {
        self.entries.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}

/// Key-value store backing the timer services
#[derive(Clone)]
pub enum KvStore {
    Redis(RedisPool),
    Memory(MemoryStore),
}

impl KvStore {
    /// Connect to Redis
    pub async fn redis(config: &RedisConfig) -> StoreResult<Self> {
        Ok(KvStore::Redis(RedisPool::new(config).await?))
    }

    /// Create an empty in-memory store
    pub fn memory() -> Self {
        KvStore::Memory(MemoryStore::new())
    }

    pub fn backend_name(&self) -> &'static str {
        match self {
            KvStore::Redis(_) => "redis",
            KvStore::Memory(_) => "memory",
        }
    }

    pub async fn set(&self, key: &str, value: &str, ttl_seconds: Option<u64>) -> StoreResult<()> {
        match self {
            KvStore::Redis(pool) => pool.set(key, value, ttl_seconds).await,
            KvStore::Memory(store) => store.set(key, value, ttl_seconds).await,
        }
    }

    pub async fn get(&self, key: &str) -> StoreResult<Option<String>> {
        match self {
            KvStore::Redis(pool) => pool.get(key).await,
            KvStore::Memory(store) => store.get(key).await,
        }
    }

    /// Delete a key; deleting a missing key is not an error
    pub async fn delete(&self, key: &str) -> StoreResult<()> {
        match self {
            KvStore::Redis(pool) => pool.delete(key).await,
            KvStore::Memory(store) => store.delete(key).await,
        }
    }

    /// Keys starting with `prefix`, sorted
    pub async fn keys(&self, prefix: &str) -> StoreResult<Vec<String>> {
        match self {
            KvStore::Redis(pool) => pool.keys(prefix).await,
            KvStore::Memory(store) => store.keys(prefix).await,
        }
    }

    /// Replace the value of `key` only if it currently equals `expected`.
    /// Returns false when the key is missing or holds another value.
    pub async fn compare_and_set(
        &self,
        key: &str,
        expected: &str,
        value: &str,
        ttl_seconds: Option<u64>,
    ) -> StoreResult<bool> {
        match self {
            KvStore::Redis(pool) => {
                pool.compare_and_set(key, expected, value, ttl_seconds)
                    .await
            }
            KvStore::Memory(store) => {
                store
                    .compare_and_set(key, expected, value, ttl_seconds)
                    .await
            }
        }
    }

    pub async fn health_check(&self) -> StoreResult<bool> {
        match self {
            KvStore::Redis(pool) => pool.health_check().await,
            KvStore::Memory(_) => Ok(true),
        }
    }

    /// Remove expired entries. Redis expires keys itself, so this only
    /// does work for the in-memory backend.
    pub async fn purge_expired(&self) -> usize {
        match self {
            KvStore::Redis(_) => 0,
            KvStore::Memory(store) => {
                let purged = store.purge_expired().await;
                debug!("Purged {} expired entries from memory store", purged);
                purged
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    #[tokio::test]
    async fn test_memory_set_get_delete() -> StoreResult<()> {
        let store = KvStore::memory();

        store.set("test_key", "test_value", Some(5)).await?;
        assert_eq!(store.get("test_key").await?, Some("test_value".to_string()));

        store.delete("test_key").await?;
        assert_eq!(store.get("test_key").await?, None);

        // Deleting again is fine
        store.delete("test_key").await?;
        Ok(())
    }

    #[tokio::test(start_paused = true)]
    async fn test_memory_entries_expire() -> StoreResult<()> {
        let store = MemoryStore::new();
        store.set("short", "1", Some(5)).await?;
        store.set("forever", "2", None).await?;

        tokio::time::advance(Duration::from_secs(6)).await;

        assert_eq!(store.get("short").await?, None);
        assert_eq!(store.get("forever").await?, Some("2".to_string()));
        Ok(())
    }

    #[tokio::test(start_paused = true)]
    async fn test_memory_purge_expired() -> StoreResult<()> {
        let store = KvStore::memory();
        store.set("a", "1", Some(1)).await?;
        store.set("b", "2", Some(100)).await?;

        tokio::time::advance(Duration::from_secs(2)).await;

        assert_eq!(store.purge_expired().await, 1);
        assert_eq!(store.keys("").await?, vec!["b".to_string()]);
        Ok(())
    }

    #[tokio::test]
    async fn test_memory_keys_by_prefix() -> StoreResult<()> {
        let store = KvStore::memory();
        store.set("timer:u1:b", "1", None).await?;
        store.set("timer:u1:a", "1", None).await?;
        store.set("timer:u10:a", "1", None).await?;
        store.set("timer:u2:a", "1", None).await?;

        let keys = store.keys("timer:u1:").await?;
        assert_eq!(keys, vec!["timer:u1:a".to_string(), "timer:u1:b".to_string()]);
        Ok(())
    }

    #[tokio::test]
    async fn test_memory_compare_and_set() -> StoreResult<()> {
        let store = KvStore::memory();
        store.set("k", "v1", None).await?;

        assert!(!store.compare_and_set("k", "stale", "v2", None).await?);
        assert_eq!(store.get("k").await?, Some("v1".to_string()));

        assert!(store.compare_and_set("k", "v1", "v2", None).await?);
        assert_eq!(store.get("k").await?, Some("v2".to_string()));

        assert!(!store.compare_and_set("missing", "v1", "v2", None).await?);
        assert_eq!(store.get("missing").await?, None);
        Ok(())
    }

    #[test]
    fn test_escape_glob() {
        assert_eq!(escape_glob("timer:u1:"), "timer:u1:");
        assert_eq!(escape_glob("timer:a*b?:"), "timer:a\\*b\\?:");
        assert_eq!(escape_glob("[x]"), "\\[x\\]");
    }

    #[test]
    #[serial]
    fn test_redis_config_from_env() {
        // SAFETY: serialized with other env-mutating tests
        unsafe {
            std::env::set_var("REDIS_URL", "redis://cache:6380");
            std::env::remove_var("REDIS_MAX_CONNECTIONS");
        }
        let config = RedisConfig::from_env().expect("Failed to create redis config");
        assert_eq!(config.url, "redis://cache:6380");
        assert_eq!(config.max_connections, 10);

        unsafe {
            std::env::remove_var("REDIS_URL");
        }
    }

    #[tokio::test]
    #[ignore = "requires a running Redis server"]
    async fn test_redis_set_get_delete() -> StoreResult<()> {
        let config = RedisConfig::new("redis://localhost:6379");
        let store = KvStore::redis(&config).await?;
        assert!(store.health_check().await?);

        let key = "test_key";
        let value = "test_value";
        store.set(key, value, Some(5)).await?;
        assert_eq!(store.get(key).await?, Some(value.to_string()));

        assert!(store.compare_and_set(key, value, "next", Some(5)).await?);
        assert!(!store.compare_and_set(key, value, "again", Some(5)).await?);

        store.delete(key).await?;
        assert_eq!(store.get(key).await?, None);
        Ok(())
    }
}
