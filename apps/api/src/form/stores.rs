//! `SnapshotStore` backends: in-memory, one-file-per-key on disk, and Redis.

use std::collections::HashMap;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use redis::aio::MultiplexedConnection;
use tracing::info;

use crate::form::persistence::{SnapshotStore, StorageError};

// ────────────────────────────────────────────────────────────────────────────
// MemoryStore
// ────────────────────────────────────────────────────────────────────────────

/// Process-local store. Durable only for the lifetime of the process.
#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: Mutex<HashMap<String, String>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl SnapshotStore for MemoryStore {
    async fn put(&self, key: &str, payload: String) -> Result<(), StorageError> {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(key.to_string(), payload);
        Ok(())
    }

    async fn get(&self, key: &str) -> Result<Option<String>, StorageError> {
        Ok(self
            .entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(key)
            .cloned())
    }

    async fn remove(&self, key: &str) -> Result<(), StorageError> {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(key);
        Ok(())
    }

    fn backend(&self) -> &'static str {
        "memory"
    }
}

// ────────────────────────────────────────────────────────────────────────────
// FileStore
// ────────────────────────────────────────────────────────────────────────────

/// One JSON file per key under `dir`.
///
/// Writes go to a temp file in the same directory, are fsynced, then renamed over
/// the target, so a crash mid-write leaves the previous snapshot intact.
#[derive(Debug, Clone)]
pub struct FileStore {
    dir: PathBuf,
}

impl FileStore {
    pub fn new(dir: impl Into<PathBuf>) -> Result<Self, StorageError> {
        let dir = dir.into();
        std::fs::create_dir_all(&dir)?;
        info!("File snapshot store at {}", dir.display());
        Ok(Self { dir })
    }

    fn path_for(&self, key: &str) -> PathBuf {
        self.dir.join(format!("{}.json", file_stem(key)))
    }
}

/// Maps an arbitrary key to a safe file name. Keys that differ only in
/// disallowed characters collide; callers choose keys, so that is on them.
fn file_stem(key: &str) -> String {
    let stem: String = key
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '-' || c == '_' {
                c
            } else {
                '_'
            }
        })
        .collect();
    if stem.is_empty() {
        "_".to_string()
    } else {
        stem
    }
}

fn write_atomic(dir: &Path, target: &Path, payload: &[u8]) -> Result<(), StorageError> {
    let mut tmp = tempfile::NamedTempFile::new_in(dir)?;
    tmp.write_all(payload)?;
    tmp.as_file().sync_all()?;
    tmp.persist(target).map_err(|e| StorageError::Io(e.error))?;
    Ok(())
}

async fn blocking<F, R>(f: F) -> Result<R, StorageError>
where
    F: FnOnce() -> Result<R, StorageError> + Send + 'static,
    R: Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|e| StorageError::Unavailable(format!("storage task failed: {e}")))?
}

#[async_trait]
impl SnapshotStore for FileStore {
    async fn put(&self, key: &str, payload: String) -> Result<(), StorageError> {
        let dir = self.dir.clone();
        let target = self.path_for(key);
        blocking(move || write_atomic(&dir, &target, payload.as_bytes())).await
    }

    async fn get(&self, key: &str) -> Result<Option<String>, StorageError> {
        let target = self.path_for(key);
        blocking(move || match std::fs::read_to_string(&target) {
            Ok(content) => Ok(Some(content)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(StorageError::Io(e)),
        })
        .await
    }

    async fn remove(&self, key: &str) -> Result<(), StorageError> {
        let target = self.path_for(key);
        blocking(move || match std::fs::remove_file(&target) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(StorageError::Io(e)),
        })
        .await
    }

    fn backend(&self) -> &'static str {
        "file"
    }
}

// ────────────────────────────────────────────────────────────────────────────
// RedisStore
// ────────────────────────────────────────────────────────────────────────────

const REDIS_KEY_PREFIX: &str = "paygap:form:";

/// Redis-backed store. `SET ... EX` replaces atomically and lets Redis expire
/// entries at the staleness ceiling on its own.
#[derive(Clone)]
pub struct RedisStore {
    conn: MultiplexedConnection,
    ttl: Duration,
}

impl RedisStore {
    pub async fn connect(client: &redis::Client, ttl: Duration) -> Result<Self, StorageError> {
        let conn = client.get_multiplexed_async_connection().await?;
        info!("Redis snapshot store connected (ttl {}s)", ttl.as_secs());
        Ok(Self { conn, ttl })
    }
}

fn redis_key(key: &str) -> String {
    format!("{REDIS_KEY_PREFIX}{key}")
}

#[async_trait]
impl SnapshotStore for RedisStore {
    async fn put(&self, key: &str, payload: String) -> Result<(), StorageError> {
        let mut conn = self.conn.clone();
        redis::cmd("SET")
            .arg(redis_key(key))
            .arg(payload)
            .arg("EX")
            .arg(self.ttl.as_secs().max(1))
            .query_async::<_, ()>(&mut conn)
            .await?;
        Ok(())
    }

    async fn get(&self, key: &str) -> Result<Option<String>, StorageError> {
        let mut conn = self.conn.clone();
        let value: Option<String> = redis::cmd("GET")
            .arg(redis_key(key))
            .query_async(&mut conn)
            .await?;
        Ok(value)
    }

    async fn remove(&self, key: &str) -> Result<(), StorageError> {
        let mut conn = self.conn.clone();
        redis::cmd("DEL")
            .arg(redis_key(key))
            .query_async::<_, ()>(&mut conn)
            .await?;
        Ok(())
    }

    fn backend(&self) -> &'static str {
        "redis"
    }
}
