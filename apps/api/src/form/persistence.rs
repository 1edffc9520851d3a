//! Persistence adapter for in-progress form state.
//!
//! Wraps a string-keyed [`SnapshotStore`] with three guarantees:
//! - `save` never fails from the caller's point of view; storage trouble becomes a
//!   [`StorageWarning`] and the form carries on without durability
//! - `load` never returns a snapshot older than the staleness ceiling
//! - `clear` wins over every write ticket issued before it, so a pending autosave
//!   cannot bring a cleared entry back

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError, Weak};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info, warn};

pub const DEFAULT_MAX_AGE: Duration = Duration::from_secs(24 * 60 * 60);

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("storage unavailable: {0}")]
    Unavailable(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Redis error: {0}")]
    Redis(#[from] redis::RedisError),
}

/// Soft failure reported by the adapter. Logged and surfaced, never propagated.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StorageWarning {
    pub key: String,
    pub message: String,
}

impl std::fmt::Display for StorageWarning {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "form state for '{}' is not being saved: {}", self.key, self.message)
    }
}

/// Durable copy of form values. `timestamp` is epoch milliseconds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PersistedSnapshot<T> {
    pub values: T,
    pub timestamp: i64,
}

impl<T> PersistedSnapshot<T> {
    pub fn now(values: T) -> Self {
        Self::at(values, Utc::now())
    }

    pub fn at(values: T, when: DateTime<Utc>) -> Self {
        Self {
            values,
            timestamp: when.timestamp_millis(),
        }
    }

    pub fn saved_at(&self) -> Option<DateTime<Utc>> {
        Utc.timestamp_millis_opt(self.timestamp).single()
    }
}

/// Raw string-keyed store. Implementations must replace values atomically:
/// a failed `put` leaves the previous value intact.
#[async_trait]
pub trait SnapshotStore: Send + Sync {
    async fn put(&self, key: &str, payload: String) -> Result<(), StorageError>;
    async fn get(&self, key: &str) -> Result<Option<String>, StorageError>;
    async fn remove(&self, key: &str) -> Result<(), StorageError>;
    fn backend(&self) -> &'static str;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SaveOutcome {
    Saved,
    /// A `clear` for the key happened after the ticket was issued.
    Skipped,
    Unavailable(StorageWarning),
}

/// Permission to write one key, valid until the next `clear` of that key.
///
/// Every ticket issued for a key between two clears shares one validity flag;
/// `clear` flips it.
#[derive(Debug, Clone)]
pub struct WriteTicket {
    key: String,
    valid: Arc<AtomicBool>,
}

impl WriteTicket {
    pub fn key(&self) -> &str {
        &self.key
    }

    fn is_valid(&self) -> bool {
        self.valid.load(Ordering::SeqCst)
    }
}

#[derive(Clone)]
pub struct SnapshotAdapter {
    store: Arc<dyn SnapshotStore>,
    max_age: Duration,
    // Only keys with a ticket still alive somewhere keep an entry.
    issued: Arc<Mutex<HashMap<String, Weak<AtomicBool>>>>,
    // Serializes writes and clears so a validity check and the write it guards are atomic.
    write_gate: Arc<tokio::sync::Mutex<()>>,
}

impl SnapshotAdapter {
    pub fn new(store: Arc<dyn SnapshotStore>, max_age: Duration) -> Self {
        Self {
            store,
            max_age,
            issued: Arc::new(Mutex::new(HashMap::new())),
            write_gate: Arc::new(tokio::sync::Mutex::new(())),
        }
    }

    pub fn backend(&self) -> &'static str {
        self.store.backend()
    }

    pub fn max_age(&self) -> Duration {
        self.max_age
    }

    pub fn ticket(&self, key: &str) -> WriteTicket {
        let mut issued = self.issued.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(valid) = issued.get(key).and_then(Weak::upgrade) {
            return WriteTicket {
                key: key.to_string(),
                valid,
            };
        }

        issued.retain(|_, flag| flag.strong_count() > 0);
        let valid = Arc::new(AtomicBool::new(true));
        issued.insert(key.to_string(), Arc::downgrade(&valid));
        WriteTicket {
            key: key.to_string(),
            valid,
        }
    }

    pub async fn save<T: Serialize>(&self, key: &str, snapshot: &PersistedSnapshot<T>) -> SaveOutcome {
        let ticket = self.ticket(key);
        self.save_with_ticket(&ticket, snapshot).await
    }

    pub async fn save_with_ticket<T: Serialize>(
        &self,
        ticket: &WriteTicket,
        snapshot: &PersistedSnapshot<T>,
    ) -> SaveOutcome {
        let payload = match serde_json::to_string(snapshot) {
            Ok(p) => p,
            Err(e) => return self.warn(&ticket.key, format!("could not encode snapshot: {e}")),
        };

        let _gate = self.write_gate.lock().await;
        if !ticket.is_valid() {
            debug!("Dropping superseded write for form '{}'", ticket.key);
            return SaveOutcome::Skipped;
        }
        match self.store.put(&ticket.key, payload).await {
            Ok(()) => {
                debug!("Saved snapshot for form '{}' ({})", ticket.key, self.backend());
                SaveOutcome::Saved
            }
            Err(e) => self.warn(&ticket.key, e.to_string()),
        }
    }

    /// Returns the stored snapshot unless it is missing, stale, or unreadable.
    /// Stale and unreadable entries are removed.
    pub async fn load<T: DeserializeOwned>(&self, key: &str) -> Option<PersistedSnapshot<T>> {
        let payload = match self.store.get(key).await {
            Ok(Some(p)) => p,
            Ok(None) => return None,
            Err(e) => {
                self.warn(key, e.to_string());
                return None;
            }
        };

        let snapshot: PersistedSnapshot<T> = match serde_json::from_str(&payload) {
            Ok(s) => s,
            Err(e) => {
                warn!("Discarding unreadable snapshot for form '{key}': {e}");
                self.remove_quietly(key).await;
                return None;
            }
        };

        if self.is_stale(&snapshot, Utc::now()) {
            info!("Discarding stale snapshot for form '{key}'");
            self.remove_quietly(key).await;
            return None;
        }
        Some(snapshot)
    }

    /// Removes the entry and invalidates every ticket issued so far for `key`.
    pub async fn clear(&self, key: &str) -> Result<(), StorageWarning> {
        let _gate = self.write_gate.lock().await;
        self.revoke(key);
        match self.store.remove(key).await {
            Ok(()) => {
                info!("Cleared snapshot for form '{key}'");
                Ok(())
            }
            Err(e) => {
                let warning = StorageWarning {
                    key: key.to_string(),
                    message: e.to_string(),
                };
                warn!("{warning}");
                Err(warning)
            }
        }
    }

    pub fn is_stale<T>(&self, snapshot: &PersistedSnapshot<T>, now: DateTime<Utc>) -> bool {
        let age_ms = now.timestamp_millis().saturating_sub(snapshot.timestamp);
        age_ms > self.max_age.as_millis() as i64
    }

    fn revoke(&self, key: &str) {
        let mut issued = self.issued.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(valid) = issued.remove(key).and_then(|flag| flag.upgrade()) {
            valid.store(false, Ordering::SeqCst);
        }
        issued.retain(|_, flag| flag.strong_count() > 0);
    }

    #[cfg(test)]
    fn tracked_keys(&self) -> usize {
        let issued = self.issued.lock().unwrap_or_else(PoisonError::into_inner);
        issued.len()
    }

    async fn remove_quietly(&self, key: &str) {
        let _gate = self.write_gate.lock().await;
        if let Err(e) = self.store.remove(key).await {
            warn!("Could not remove snapshot for form '{key}': {e}");
        }
    }

    fn warn(&self, key: &str, message: String) -> SaveOutcome {
        let warning = StorageWarning {
            key: key.to_string(),
            message,
        };
        warn!("{warning}");
        SaveOutcome::Unavailable(warning)
    }
}
