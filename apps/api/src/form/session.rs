//! Form State Manager.
//!
//! A `FormSession<T>` owns the in-memory state of one active form: values,
//! touched fields, field errors, dirty flag, and the debounced autosave timer
//! that writes through the [`SnapshotAdapter`]. It composes the validation rules
//! and the [`SubmissionCoordinator`] and exposes both to the presentation layer.
//!
//! All state sits behind one async mutex, so edits, autosave writes and the
//! submission outcome are applied one at a time. Autosave tasks hold only a weak
//! reference to the session and re-check generation and liveness under the lock
//! before writing; `clear`, `reset` and `dispose` therefore always win.

use std::collections::BTreeSet;
use std::sync::{Arc, Weak};
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{de::DeserializeOwned, Serialize};
use thiserror::Error;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tracing::{debug, info};

use crate::form::coordinator::{
    PersistTarget, RetryPolicy, SubmissionCoordinator, SubmissionError, SubmissionPhase,
    SubmissionReport, SubmitAction,
};
use crate::form::liveness::Liveness;
use crate::form::persistence::{
    PersistedSnapshot, SaveOutcome, SnapshotAdapter, StorageWarning, WriteTicket,
};
use crate::form::validation::{FieldErrors, RuleSet};

pub const DEFAULT_AUTOSAVE_DEBOUNCE: Duration = Duration::from_millis(800);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FormPolicy {
    pub autosave_debounce: Duration,
    pub retry: RetryPolicy,
}

impl Default for FormPolicy {
    fn default() -> Self {
        Self {
            autosave_debounce: DEFAULT_AUTOSAVE_DEBOUNCE,
            retry: RetryPolicy::default(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FormError {
    #[error("This form has been closed")]
    Closed,

    #[error("Unknown field '{0}'")]
    UnknownField(String),

    #[error("Invalid value for '{field}': {message}")]
    InvalidValue { field: String, message: String },
}

/// Read-only view of a session for the presentation layer.
#[derive(Debug, Clone, Serialize)]
pub struct FormView<T> {
    pub key: String,
    pub values: T,
    pub touched: Vec<String>,
    pub errors: FieldErrors,
    pub is_dirty: bool,
    pub last_persisted_at: Option<DateTime<Utc>>,
    pub storage_warning: Option<String>,
    pub phase: SubmissionPhase,
}

struct FormState<T> {
    values: T,
    touched: BTreeSet<String>,
    errors: FieldErrors,
    is_dirty: bool,
    last_persisted_at: Option<DateTime<Utc>>,
    storage_warning: Option<StorageWarning>,
    // Bumped by every edit; lets a finished submission tell whether it saw the latest values.
    revision: u64,
    // Bumped whenever an autosave is scheduled or cancelled; stale timers compare and bail.
    autosave_generation: u64,
    autosave_task: Option<JoinHandle<()>>,
}

impl<T> FormState<T> {
    fn cancel_autosave(&mut self) {
        self.autosave_generation += 1;
        if let Some(task) = self.autosave_task.take() {
            task.abort();
        }
    }

    fn record_save(&mut self, outcome: SaveOutcome, saved_at: Option<DateTime<Utc>>) {
        match outcome {
            SaveOutcome::Saved => {
                self.last_persisted_at = saved_at;
                self.storage_warning = None;
            }
            SaveOutcome::Skipped => {}
            SaveOutcome::Unavailable(warning) => self.storage_warning = Some(warning),
        }
    }
}

struct Shared<T> {
    key: String,
    defaults: T,
    rules: RuleSet<T>,
    adapter: SnapshotAdapter,
    policy: FormPolicy,
    coordinator: SubmissionCoordinator,
    liveness: Liveness,
    state: Mutex<FormState<T>>,
}

impl<T> Drop for Shared<T> {
    fn drop(&mut self) {
        self.liveness.kill();
        self.state.get_mut().cancel_autosave();
    }
}

impl<T> Shared<T>
where
    T: Clone + Serialize + Send + Sync + 'static,
{
    async fn autosave(&self, generation: u64, ticket: WriteTicket) {
        let mut state = self.state.lock().await;
        if !self.liveness.is_alive() || state.autosave_generation != generation {
            return;
        }
        state.autosave_task = None;
        let snapshot = PersistedSnapshot::now(state.values.clone());
        let outcome = self.adapter.save_with_ticket(&ticket, &snapshot).await;
        debug!("Autosave for form '{}': {outcome:?}", self.key);
        state.record_save(outcome, snapshot.saved_at());
    }
}

pub struct FormSession<T> {
    shared: Arc<Shared<T>>,
}

impl<T> FormSession<T>
where
    T: Clone + Serialize + DeserializeOwned + Send + Sync + 'static,
{
    /// Starts a session under `key`, restoring a fresh snapshot if one exists.
    pub async fn activate(
        key: impl Into<String>,
        defaults: T,
        rules: RuleSet<T>,
        adapter: SnapshotAdapter,
        policy: FormPolicy,
    ) -> Self {
        let key = key.into();
        let restored = adapter.load::<T>(&key).await;

        let (values, is_dirty, last_persisted_at) = match restored {
            Some(snapshot) => {
                info!("Restored form '{key}' from {} snapshot", adapter.backend());
                let saved_at = snapshot.saved_at();
                (snapshot.values, true, saved_at)
            }
            None => {
                info!("Starting form '{key}' from defaults");
                (defaults.clone(), false, None)
            }
        };

        let state = FormState {
            values,
            touched: BTreeSet::new(),
            errors: FieldErrors::new(),
            is_dirty,
            last_persisted_at,
            storage_warning: None,
            revision: 0,
            autosave_generation: 0,
            autosave_task: None,
        };

        Self {
            shared: Arc::new(Shared {
                coordinator: SubmissionCoordinator::new(policy.retry),
                key,
                defaults,
                rules,
                adapter,
                policy,
                liveness: Liveness::new(),
                state: Mutex::new(state),
            }),
        }
    }

    pub fn key(&self) -> &str {
        &self.shared.key
    }

    pub fn is_alive(&self) -> bool {
        self.shared.liveness.is_alive()
    }

    pub fn phase(&self) -> SubmissionPhase {
        self.shared.coordinator.phase()
    }

    pub async fn values(&self) -> T {
        self.shared.state.lock().await.values.clone()
    }

    pub async fn is_dirty(&self) -> bool {
        self.shared.state.lock().await.is_dirty
    }

    pub async fn view(&self) -> FormView<T> {
        let state = self.shared.state.lock().await;
        FormView {
            key: self.shared.key.clone(),
            values: state.values.clone(),
            touched: state.touched.iter().cloned().collect(),
            errors: state.errors.clone(),
            is_dirty: state.is_dirty,
            last_persisted_at: state.last_persisted_at,
            storage_warning: state.storage_warning.as_ref().map(|w| w.to_string()),
            phase: self.shared.coordinator.phase(),
        }
    }

    /// Mutates the values, marking `field` touched and the form dirty.
    pub async fn edit<F>(&self, field: &str, apply: F) -> Result<(), FormError>
    where
        F: FnOnce(&mut T),
    {
        let mut state = self.live_state().await?;
        apply(&mut state.values);
        self.after_edit(&mut state, field);
        Ok(())
    }

    /// Sets one field from a JSON value. `T` must serialize as a JSON object
    /// containing `field`.
    pub async fn set_field(&self, field: &str, value: serde_json::Value) -> Result<(), FormError> {
        let mut state = self.live_state().await?;

        let invalid = |message: String| FormError::InvalidValue {
            field: field.to_string(),
            message,
        };
        let mut object = serde_json::to_value(&state.values).map_err(|e| invalid(e.to_string()))?;
        let map = object
            .as_object_mut()
            .ok_or_else(|| FormError::UnknownField(field.to_string()))?;
        if !map.contains_key(field) {
            return Err(FormError::UnknownField(field.to_string()));
        }
        map.insert(field.to_string(), value);
        let updated: T = serde_json::from_value(object).map_err(|e| invalid(e.to_string()))?;

        state.values = updated;
        self.after_edit(&mut state, field);
        Ok(())
    }

    /// Marks a field as visited without changing it, surfacing its errors.
    pub async fn touch(&self, field: &str) -> Result<(), FormError> {
        let mut state = self.live_state().await?;
        state.touched.insert(field.to_string());
        self.refresh_touched_errors(&mut state);
        Ok(())
    }

    /// Validates every field, storing and returning the errors.
    pub async fn validate(&self) -> FieldErrors {
        let mut state = self.shared.state.lock().await;
        let errors = self.shared.rules.validate(&state.values);
        state.errors = errors.clone();
        errors
    }

    /// Writes the current values now, bypassing the debounce.
    pub async fn flush(&self) -> Result<SaveOutcome, FormError> {
        let mut state = self.live_state().await?;
        Ok(self.save_now(&mut state).await)
    }

    /// Runs the submission pipeline with `action`.
    ///
    /// On success the persisted snapshot is gone and the form is clean, unless
    /// edits landed while the submission was running; those are kept dirty and
    /// autosaved again. If the snapshot could not be removed the form stays
    /// dirty and carries the storage warning. On a terminal failure the values
    /// are written out immediately so they survive for a later attempt.
    pub async fn submit<A>(&self, action: &A) -> Result<SubmissionReport<A::Output>, SubmissionError>
    where
        A: SubmitAction<T> + ?Sized,
    {
        let (values, revision) = {
            let state = self
                .live_state()
                .await
                .map_err(|_| SubmissionError::Abandoned)?;
            (state.values.clone(), state.revision)
        };

        let result = self
            .shared
            .coordinator
            .submit(
                &values,
                &self.shared.rules,
                action,
                PersistTarget {
                    adapter: &self.shared.adapter,
                    key: &self.shared.key,
                },
                &self.shared.liveness,
            )
            .await;

        let mut state = self.shared.state.lock().await;
        if !self.shared.liveness.is_alive() {
            return result;
        }
        match &result {
            Ok(report) => {
                state.last_persisted_at = None;
                let unchanged = state.revision == revision;
                if let Some(warning) = &report.storage_warning {
                    state.storage_warning = Some(warning.clone());
                } else if unchanged {
                    state.storage_warning = None;
                }

                if unchanged && report.storage_warning.is_some() {
                    // An older snapshot may have outlived the clear.
                    state.cancel_autosave();
                    state.is_dirty = true;
                } else if unchanged {
                    state.cancel_autosave();
                    state.is_dirty = false;
                    state.touched.clear();
                    state.errors.clear();
                } else if state.is_dirty {
                    debug!(
                        "Form '{}' changed during submission; keeping newer edits",
                        self.shared.key
                    );
                    self.schedule_autosave(&mut state);
                }
            }
            Err(SubmissionError::Validation(errors)) => {
                state.touched.extend(errors.keys().cloned());
                state.errors = errors.clone();
            }
            Err(SubmissionError::RetriesExhausted { .. }) | Err(SubmissionError::FatalRemote(_)) => {
                if state.is_dirty {
                    state.cancel_autosave();
                    self.save_now(&mut state).await;
                }
            }
            Err(SubmissionError::InFlight)
            | Err(SubmissionError::Abandoned)
            | Err(SubmissionError::Cancelled) => {}
        }
        result
    }

    /// Discards all input: cancels a running submission and the autosave timer,
    /// clears durable state, restores defaults. The session stays open.
    pub async fn reset(&self) -> Result<(), FormError> {
        let mut state = self.live_state().await?;
        if self.shared.coordinator.cancel() {
            info!("Cancelled running submission for form '{}'", self.shared.key);
        }
        state.cancel_autosave();
        state.storage_warning = self.shared.adapter.clear(&self.shared.key).await.err();
        state.values = self.shared.defaults.clone();
        state.touched.clear();
        state.errors.clear();
        // A snapshot the clear could not remove still holds the discarded input.
        state.is_dirty = state.storage_warning.is_some();
        state.last_persisted_at = None;
        state.revision += 1;
        info!("Form '{}' reset to defaults", self.shared.key);
        Ok(())
    }

    /// Abandons the session. Pending timers are cancelled and any background
    /// work finishing later leaves shared state alone.
    pub async fn dispose(&self) {
        self.shared.liveness.kill();
        let mut state = self.shared.state.lock().await;
        state.cancel_autosave();
        debug!("Form '{}' disposed", self.shared.key);
    }

    async fn live_state(&self) -> Result<tokio::sync::MutexGuard<'_, FormState<T>>, FormError> {
        let state = self.shared.state.lock().await;
        if !self.shared.liveness.is_alive() {
            return Err(FormError::Closed);
        }
        Ok(state)
    }

    fn after_edit(&self, state: &mut FormState<T>, field: &str) {
        state.touched.insert(field.to_string());
        state.is_dirty = true;
        state.revision += 1;
        self.refresh_touched_errors(state);
        self.schedule_autosave(state);
    }

    fn refresh_touched_errors(&self, state: &mut FormState<T>) {
        state.errors = self
            .shared
            .rules
            .validate_fields(&state.values, state.touched.iter());
    }

    fn schedule_autosave(&self, state: &mut FormState<T>) {
        state.cancel_autosave();
        let generation = state.autosave_generation;
        let ticket = self.shared.adapter.ticket(&self.shared.key);
        let delay = self.shared.policy.autosave_debounce;
        let weak: Weak<Shared<T>> = Arc::downgrade(&self.shared);

        state.autosave_task = Some(tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            if let Some(shared) = weak.upgrade() {
                shared.autosave(generation, ticket).await;
            }
        }));
    }

    async fn save_now(&self, state: &mut FormState<T>) -> SaveOutcome {
        let snapshot = PersistedSnapshot::now(state.values.clone());
        let outcome = self.shared.adapter.save(&self.shared.key, &snapshot).await;
        state.record_save(outcome.clone(), snapshot.saved_at());
        outcome
    }
}
