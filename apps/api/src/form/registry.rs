//! Keyed set of live form sessions, one per form key.
//!
//! The set is bounded: activating a new session first retires sessions idle
//! past the timeout, then the least recently used ones while the registry is
//! full. Sessions with a submission in flight are never retired. A retired
//! session that is still dirty is flushed first, so its input comes back on the
//! next access.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use serde::{de::DeserializeOwned, Serialize};
use tokio::sync::Mutex;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::form::persistence::{SaveOutcome, SnapshotAdapter};
use crate::form::session::{FormPolicy, FormSession};
use crate::form::validation::RuleSet;

pub const DEFAULT_IDLE_TIMEOUT: Duration = Duration::from_secs(30 * 60);
pub const DEFAULT_MAX_SESSIONS: usize = 1000;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RegistryLimits {
    pub idle_timeout: Duration,
    pub max_sessions: usize,
}

impl Default for RegistryLimits {
    fn default() -> Self {
        Self {
            idle_timeout: DEFAULT_IDLE_TIMEOUT,
            max_sessions: DEFAULT_MAX_SESSIONS,
        }
    }
}

struct Entry<T> {
    session: Arc<FormSession<T>>,
    last_access: Instant,
}

pub struct FormRegistry<T> {
    adapter: SnapshotAdapter,
    policy: FormPolicy,
    limits: RegistryLimits,
    defaults: T,
    rules: fn() -> RuleSet<T>,
    sessions: Mutex<HashMap<String, Entry<T>>>,
}

impl<T> FormRegistry<T>
where
    T: Clone + Serialize + DeserializeOwned + Send + Sync + 'static,
{
    pub fn new(
        adapter: SnapshotAdapter,
        policy: FormPolicy,
        limits: RegistryLimits,
        defaults: T,
        rules: fn() -> RuleSet<T>,
    ) -> Self {
        Self {
            adapter,
            policy,
            limits,
            defaults,
            rules,
            sessions: Mutex::new(HashMap::new()),
        }
    }

    pub fn policy(&self) -> FormPolicy {
        self.policy
    }

    /// Returns the live session for `key`, activating one (and restoring any
    /// fresh snapshot) if there is none.
    pub async fn session(&self, key: &str) -> Arc<FormSession<T>> {
        let mut sessions = self.sessions.lock().await;
        let now = Instant::now();
        if let Some(entry) = sessions.get_mut(key) {
            if entry.session.is_alive() {
                entry.last_access = now;
                return entry.session.clone();
            }
        }

        // Retired under the lock so a flush lands before the key can be reactivated.
        for (old_key, old) in self.take_evictable(&mut sessions, now) {
            retire(&old_key, &old).await;
        }

        let session = Arc::new(
            FormSession::activate(
                key,
                self.defaults.clone(),
                (self.rules)(),
                self.adapter.clone(),
                self.policy,
            )
            .await,
        );
        sessions.insert(
            key.to_string(),
            Entry {
                session: session.clone(),
                last_access: now,
            },
        );
        session
    }

    /// Disposes and forgets the session for `key`, if any.
    pub async fn close(&self, key: &str) -> bool {
        let removed = self.sessions.lock().await.remove(key);
        match removed {
            Some(entry) => {
                entry.session.dispose().await;
                debug!("Closed form session '{key}'");
                true
            }
            None => false,
        }
    }

    pub async fn len(&self) -> usize {
        self.sessions.lock().await.len()
    }

    /// Removes dead and idle sessions, then the least recently used ones until
    /// there is room for one more.
    fn take_evictable(
        &self,
        sessions: &mut HashMap<String, Entry<T>>,
        now: Instant,
    ) -> Vec<(String, Arc<FormSession<T>>)> {
        let idle: Vec<String> = sessions
            .iter()
            .filter(|(_, entry)| {
                !entry.session.is_alive()
                    || (now.duration_since(entry.last_access) >= self.limits.idle_timeout
                        && !entry.session.phase().is_in_flight())
            })
            .map(|(key, _)| key.clone())
            .collect();

        let mut evicted: Vec<(String, Arc<FormSession<T>>)> = idle
            .into_iter()
            .filter_map(|key| sessions.remove_entry(&key))
            .map(|(key, entry)| (key, entry.session))
            .collect();

        while sessions.len() >= self.limits.max_sessions {
            let oldest = sessions
                .iter()
                .filter(|(_, entry)| !entry.session.phase().is_in_flight())
                .min_by_key(|(_, entry)| entry.last_access)
                .map(|(key, _)| key.clone());
            match oldest.and_then(|key| sessions.remove_entry(&key)) {
                Some((key, entry)) => evicted.push((key, entry.session)),
                None => {
                    warn!(
                        "Form registry over its limit of {}: every session has a submission in flight",
                        self.limits.max_sessions
                    );
                    break;
                }
            }
        }

        if !evicted.is_empty() {
            info!("Retiring {} form session(s)", evicted.len());
        }
        evicted
    }
}

async fn retire<T>(key: &str, session: &FormSession<T>)
where
    T: Clone + Serialize + DeserializeOwned + Send + Sync + 'static,
{
    if session.is_alive() && session.is_dirty().await {
        if let Ok(SaveOutcome::Unavailable(warning)) = session.flush().await {
            warn!("Retiring form '{key}' without a durable copy: {warning}");
        }
    }
    session.dispose().await;
    debug!("Retired form session '{key}'");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::form::persistence::DEFAULT_MAX_AGE;
    use crate::form::stores::MemoryStore;

    fn rules() -> RuleSet<String> {
        RuleSet::new().rule("value", |v: &String| {
            v.is_empty().then(|| "Required".to_string())
        })
    }

    fn registry_with(limits: RegistryLimits) -> FormRegistry<String> {
        let adapter = SnapshotAdapter::new(Arc::new(MemoryStore::new()), DEFAULT_MAX_AGE);
        FormRegistry::new(adapter, FormPolicy::default(), limits, String::new(), rules)
    }

    fn registry() -> FormRegistry<String> {
        registry_with(RegistryLimits::default())
    }

    #[tokio::test]
    async fn test_same_key_returns_same_session() {
        let registry = registry();
        let a = registry.session("k").await;
        let b = registry.session("k").await;
        assert!(Arc::ptr_eq(&a, &b));
        assert_eq!(registry.len().await, 1);
    }

    #[tokio::test]
    async fn test_close_disposes_and_next_lookup_activates_fresh() {
        let registry = registry();
        let first = registry.session("k").await;
        assert!(registry.close("k").await);
        assert!(!first.is_alive());
        assert!(!registry.close("k").await);

        let second = registry.session("k").await;
        assert!(second.is_alive());
        assert!(!Arc::ptr_eq(&first, &second));
    }

    #[tokio::test(start_paused = true)]
    async fn test_idle_sessions_are_retired() {
        let registry = registry();
        let stale = registry.session("stale").await;
        let kept = registry.session("kept").await;

        tokio::time::sleep(Duration::from_secs(20 * 60)).await;
        registry.session("kept").await;
        tokio::time::sleep(Duration::from_secs(15 * 60)).await;

        registry.session("new").await;
        assert!(!stale.is_alive());
        assert!(kept.is_alive());
        assert_eq!(registry.len().await, 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_full_registry_retires_least_recently_used() {
        let registry = registry_with(RegistryLimits {
            idle_timeout: DEFAULT_IDLE_TIMEOUT,
            max_sessions: 3,
        });

        let mut sessions = Vec::new();
        for i in 0..5 {
            sessions.push(registry.session(&format!("k{i}")).await);
            tokio::time::sleep(Duration::from_secs(1)).await;
        }

        assert_eq!(registry.len().await, 3);
        assert!(!sessions[0].is_alive());
        assert!(!sessions[1].is_alive());
        assert!(sessions[2..].iter().all(|s| s.is_alive()));
    }

    #[tokio::test(start_paused = true)]
    async fn test_retired_dirty_session_is_restored_on_next_access() {
        let registry = registry_with(RegistryLimits {
            idle_timeout: DEFAULT_IDLE_TIMEOUT,
            max_sessions: 1,
        });

        let draft = registry.session("draft").await;
        draft.edit("value", |v| *v = "half-written".into()).await.unwrap();

        // Pushes "draft" out before its autosave could fire.
        registry.session("other").await;
        assert!(!draft.is_alive());

        let restored = registry.session("draft").await;
        assert_eq!(restored.values().await, "half-written");
        assert!(restored.is_dirty().await);
    }
}
