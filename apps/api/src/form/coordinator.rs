//! Submission Coordinator: validate, submit, retry on transient failure, and
//! clear persisted state on success.
//!
//! State machine:
//!
//! ```text
//! Idle → Validating → Submitting → Succeeded
//!            │             ├─────→ RetryPending → Submitting
//!            │             └─────→ Failed
//!            └─ errors ──→ Idle
//! ```
//!
//! At most one submission is in flight per coordinator; a request arriving in
//! `Validating`, `Submitting` or `RetryPending` is rejected without touching the action.
//! This is the only place in the service that retries.
//!
//! A run stops early for two reasons: the owning session dies (`Abandoned`), or
//! the session cancels just this run through [`SubmissionCoordinator::cancel`]
//! (`Cancelled`), which leaves the session usable.

use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use thiserror::Error;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::form::liveness::Liveness;
use crate::form::persistence::{SnapshotAdapter, StorageWarning};
use crate::form::validation::{FieldErrors, RuleSet};

pub const DEFAULT_MAX_RETRIES: u32 = 3;
pub const DEFAULT_BACKOFF_BASE: Duration = Duration::from_secs(1);

// ────────────────────────────────────────────────────────────────────────────
// Errors
// ────────────────────────────────────────────────────────────────────────────

/// Typed failure returned by a submit action. The action classifies; the
/// coordinator only pattern-matches.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SubmitError {
    /// Network, timeout, rate limit: expected to clear up on retry.
    #[error("{0}")]
    Transient(String),

    /// Explicit rejection or a caller-side problem: retrying will not help.
    #[error("{0}")]
    Fatal(String),
}

impl SubmitError {
    pub fn is_retryable(&self) -> bool {
        matches!(self, SubmitError::Transient(_))
    }
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum SubmissionError {
    #[error("A submission is already in progress")]
    InFlight,

    #[error("Please correct the highlighted fields")]
    Validation(FieldErrors),

    #[error("The service is temporarily unavailable after {attempts} attempts: {last_error}")]
    RetriesExhausted { attempts: u32, last_error: String },

    #[error("Submission was rejected: {0}")]
    FatalRemote(String),

    #[error("The form was closed before submission finished")]
    Abandoned,

    #[error("The submission was cancelled because the form was reset")]
    Cancelled,
}

// ────────────────────────────────────────────────────────────────────────────
// State + bookkeeping
// ────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SubmissionPhase {
    Idle,
    Validating,
    Submitting,
    RetryPending,
    Succeeded,
    Failed,
}

impl SubmissionPhase {
    pub fn is_in_flight(&self) -> bool {
        matches!(
            self,
            SubmissionPhase::Validating | SubmissionPhase::Submitting | SubmissionPhase::RetryPending
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AttemptOutcome {
    Pending,
    Success,
    RetryableFailure,
    FatalFailure,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SubmissionAttempt {
    pub attempt_number: u32,
    pub started_at: DateTime<Utc>,
    pub outcome: AttemptOutcome,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct RetryPolicy {
    pub max_retries: u32,
    #[serde(with = "millis")]
    pub backoff_base: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: DEFAULT_MAX_RETRIES,
            backoff_base: DEFAULT_BACKOFF_BASE,
        }
    }
}

impl RetryPolicy {
    /// `base × 2^attempt_number`, saturating instead of overflowing.
    pub fn delay_for(&self, attempt_number: u32) -> Duration {
        let factor = 1u32.checked_shl(attempt_number).unwrap_or(u32::MAX);
        self.backoff_base.saturating_mul(factor)
    }
}

mod millis {
    use serde::Serializer;
    use std::time::Duration;

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_u64(d.as_millis() as u64)
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct SubmissionReport<O> {
    pub submission_id: Uuid,
    pub output: O,
    pub attempts: Vec<SubmissionAttempt>,
    /// Set when the persisted snapshot could not be removed after success.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub storage_warning: Option<StorageWarning>,
}

/// Caller-supplied submit action.
#[async_trait]
pub trait SubmitAction<T>: Send + Sync
where
    T: Send + Sync,
{
    type Output: Send;

    async fn submit(&self, values: &T) -> Result<Self::Output, SubmitError>;
}

/// Where the coordinator clears persisted state after a successful submission.
pub struct PersistTarget<'a> {
    pub adapter: &'a SnapshotAdapter,
    pub key: &'a str,
}

// ────────────────────────────────────────────────────────────────────────────
// Coordinator
// ────────────────────────────────────────────────────────────────────────────

#[derive(Debug)]
pub struct SubmissionCoordinator {
    policy: RetryPolicy,
    phase: Mutex<SubmissionPhase>,
    // Cancel signal of the run in flight, if any.
    current: Mutex<Option<Arc<Liveness>>>,
}

impl SubmissionCoordinator {
    pub fn new(policy: RetryPolicy) -> Self {
        Self {
            policy,
            phase: Mutex::new(SubmissionPhase::Idle),
            current: Mutex::new(None),
        }
    }

    pub fn policy(&self) -> RetryPolicy {
        self.policy
    }

    pub fn phase(&self) -> SubmissionPhase {
        *self.phase.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn set_phase(&self, next: SubmissionPhase) {
        *self.phase.lock().unwrap_or_else(PoisonError::into_inner) = next;
    }

    /// Atomically claims the coordinator for a new submission and returns the
    /// run's own cancel signal.
    fn begin(&self) -> Result<Arc<Liveness>, SubmissionError> {
        let mut phase = self.phase.lock().unwrap_or_else(PoisonError::into_inner);
        if phase.is_in_flight() {
            return Err(SubmissionError::InFlight);
        }
        *phase = SubmissionPhase::Validating;

        let run = Arc::new(Liveness::new());
        *self.current.lock().unwrap_or_else(PoisonError::into_inner) = Some(run.clone());
        Ok(run)
    }

    /// Stops the run in flight, including a pending backoff timer. Returns
    /// whether there was one.
    pub fn cancel(&self) -> bool {
        let run = self.current.lock().unwrap_or_else(PoisonError::into_inner).take();
        match run {
            Some(run) => {
                run.kill();
                true
            }
            None => false,
        }
    }

    /// Runs one submission to a terminal state.
    ///
    /// `liveness` and the run's cancel signal are checked before every attempt
    /// and before clearing, and raced against the attempt and the backoff sleep.
    /// A dead session ends the run as `Abandoned`, a cancel as `Cancelled`;
    /// neither touches storage.
    pub async fn submit<T, A>(
        &self,
        values: &T,
        rules: &RuleSet<T>,
        action: &A,
        target: PersistTarget<'_>,
        liveness: &Liveness,
    ) -> Result<SubmissionReport<A::Output>, SubmissionError>
    where
        T: Send + Sync,
        A: SubmitAction<T> + ?Sized,
    {
        let run = self.begin()?;
        let _guard = PhaseGuard {
            coordinator: self,
            run: run.clone(),
        };

        let errors = rules.validate(values);
        if !errors.is_empty() {
            self.set_phase(SubmissionPhase::Idle);
            info!(
                "Submission for form '{}' blocked by {} validation error(s)",
                target.key,
                errors.len()
            );
            return Err(SubmissionError::Validation(errors));
        }

        let submission_id = Uuid::new_v4();
        let mut attempts: Vec<SubmissionAttempt> = Vec::new();
        let mut attempt_number = 0u32;

        loop {
            if let Some(stopped) = self.stopped(liveness, &run, submission_id) {
                return Err(stopped);
            }

            self.set_phase(SubmissionPhase::Submitting);
            attempts.push(SubmissionAttempt {
                attempt_number,
                started_at: Utc::now(),
                outcome: AttemptOutcome::Pending,
            });

            let result = tokio::select! {
                r = action.submit(values) => r,
                _ = liveness.killed() => return Err(self.abandon(submission_id)),
                _ = run.killed() => return Err(self.cancelled(submission_id)),
            };

            match result {
                Ok(output) => {
                    mark_last(&mut attempts, AttemptOutcome::Success);
                    if let Some(stopped) = self.stopped(liveness, &run, submission_id) {
                        return Err(stopped);
                    }
                    // The submission itself succeeded; a failed clear is reported, not raised.
                    let storage_warning = target.adapter.clear(target.key).await.err();
                    self.set_phase(SubmissionPhase::Succeeded);
                    info!(
                        "Submission {submission_id} for form '{}' succeeded after {} attempt(s)",
                        target.key,
                        attempts.len()
                    );
                    return Ok(SubmissionReport {
                        submission_id,
                        output,
                        attempts,
                        storage_warning,
                    });
                }
                Err(SubmitError::Transient(message)) if attempt_number < self.policy.max_retries => {
                    mark_last(&mut attempts, AttemptOutcome::RetryableFailure);
                    self.set_phase(SubmissionPhase::RetryPending);
                    let delay = self.policy.delay_for(attempt_number);
                    warn!(
                        "Submission {submission_id} attempt {} failed ({message}), retrying after {}ms",
                        attempt_number + 1,
                        delay.as_millis()
                    );
                    tokio::select! {
                        _ = tokio::time::sleep(delay) => {}
                        _ = liveness.killed() => return Err(self.abandon(submission_id)),
                        _ = run.killed() => return Err(self.cancelled(submission_id)),
                    }
                    attempt_number += 1;
                }
                Err(SubmitError::Transient(message)) => {
                    mark_last(&mut attempts, AttemptOutcome::RetryableFailure);
                    self.set_phase(SubmissionPhase::Failed);
                    error!(
                        "Submission {submission_id} for form '{}' gave up after {} attempts: {message}",
                        target.key,
                        attempts.len()
                    );
                    return Err(SubmissionError::RetriesExhausted {
                        attempts: attempts.len() as u32,
                        last_error: message,
                    });
                }
                Err(SubmitError::Fatal(message)) => {
                    mark_last(&mut attempts, AttemptOutcome::FatalFailure);
                    self.set_phase(SubmissionPhase::Failed);
                    error!(
                        "Submission {submission_id} for form '{}' rejected: {message}",
                        target.key
                    );
                    return Err(SubmissionError::FatalRemote(message));
                }
            }
        }
    }

    fn stopped(&self, liveness: &Liveness, run: &Liveness, submission_id: Uuid) -> Option<SubmissionError> {
        if !liveness.is_alive() {
            Some(self.abandon(submission_id))
        } else if !run.is_alive() {
            Some(self.cancelled(submission_id))
        } else {
            None
        }
    }

    fn abandon(&self, submission_id: Uuid) -> SubmissionError {
        self.set_phase(SubmissionPhase::Failed);
        info!("Submission {submission_id} abandoned with its form");
        SubmissionError::Abandoned
    }

    fn cancelled(&self, submission_id: Uuid) -> SubmissionError {
        self.set_phase(SubmissionPhase::Idle);
        info!("Submission {submission_id} cancelled");
        SubmissionError::Cancelled
    }
}

/// Marks the run failed if its future is dropped before reaching a terminal phase,
/// and retires the run's cancel signal.
struct PhaseGuard<'a> {
    coordinator: &'a SubmissionCoordinator,
    run: Arc<Liveness>,
}

impl Drop for PhaseGuard<'_> {
    fn drop(&mut self) {
        {
            let mut current = self.coordinator.current.lock().unwrap_or_else(PoisonError::into_inner);
            if current.as_ref().is_some_and(|c| Arc::ptr_eq(c, &self.run)) {
                *current = None;
            }
        }
        let mut phase = self.coordinator.phase.lock().unwrap_or_else(PoisonError::into_inner);
        if phase.is_in_flight() {
            *phase = SubmissionPhase::Failed;
        }
    }
}

fn mark_last(attempts: &mut [SubmissionAttempt], outcome: AttemptOutcome) {
    if let Some(last) = attempts.last_mut() {
        last.outcome = outcome;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::form::persistence::test_support::UnavailableStore;
    use crate::form::persistence::{PersistedSnapshot, DEFAULT_MAX_AGE};
    use crate::form::stores::MemoryStore;
    use std::collections::VecDeque;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;

    #[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
    struct Payload {
        amount: f64,
    }

    /// Replays a scripted sequence of results, then succeeds forever.
    struct Scripted {
        script: Mutex<VecDeque<Result<(), SubmitError>>>,
        calls: AtomicU32,
    }

    impl Scripted {
        fn new(script: Vec<Result<(), SubmitError>>) -> Self {
            Self {
                script: Mutex::new(script.into()),
                calls: AtomicU32::new(0),
            }
        }

        fn calls(&self) -> u32 {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl SubmitAction<Payload> for Scripted {
        type Output = u32;

        async fn submit(&self, _values: &Payload) -> Result<u32, SubmitError> {
            let n = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
            let next = self.script.lock().unwrap().pop_front().unwrap_or(Ok(()));
            next.map(|_| n)
        }
    }

    struct AlwaysTransient(AtomicU32);

    #[async_trait]
    impl SubmitAction<Payload> for AlwaysTransient {
        type Output = ();

        async fn submit(&self, _values: &Payload) -> Result<(), SubmitError> {
            self.0.fetch_add(1, Ordering::SeqCst);
            Err(SubmitError::Transient("timeout".to_string()))
        }
    }

    fn rules() -> RuleSet<Payload> {
        RuleSet::new().rule("amount", |p: &Payload| {
            (p.amount <= 0.0).then(|| "Amount must be positive".to_string())
        })
    }

    fn adapter() -> SnapshotAdapter {
        SnapshotAdapter::new(Arc::new(MemoryStore::new()), DEFAULT_MAX_AGE)
    }

    fn transient() -> Result<(), SubmitError> {
        Err(SubmitError::Transient("503 Service Unavailable".to_string()))
    }

    async fn seed(adapter: &SnapshotAdapter) {
        adapter
            .save("form", &PersistedSnapshot::now(Payload { amount: 1.0 }))
            .await;
    }

    #[test]
    fn test_backoff_doubles_from_base() {
        let policy = RetryPolicy {
            max_retries: 3,
            backoff_base: Duration::from_millis(100),
        };
        assert_eq!(policy.delay_for(0), Duration::from_millis(100));
        assert_eq!(policy.delay_for(1), Duration::from_millis(200));
        assert_eq!(policy.delay_for(2), Duration::from_millis(400));
        // no overflow panic on absurd attempt numbers
        let _ = policy.delay_for(200);
    }

    #[tokio::test(start_paused = true)]
    async fn test_two_transient_failures_then_success() {
        let coordinator = SubmissionCoordinator::new(RetryPolicy::default());
        let adapter = adapter();
        seed(&adapter).await;
        let action = Scripted::new(vec![transient(), transient()]);
        let liveness = Liveness::new();

        let report = coordinator
            .submit(
                &Payload { amount: 1.0 },
                &rules(),
                &action,
                PersistTarget {
                    adapter: &adapter,
                    key: "form",
                },
                &liveness,
            )
            .await
            .unwrap();

        assert_eq!(action.calls(), 3);
        assert_eq!(report.output, 3);
        assert_eq!(report.attempts.len(), 3);
        assert_eq!(report.attempts[0].outcome, AttemptOutcome::RetryableFailure);
        assert_eq!(report.attempts[2].outcome, AttemptOutcome::Success);
        assert_eq!(report.attempts[2].attempt_number, 2);
        assert_eq!(coordinator.phase(), SubmissionPhase::Succeeded);
        assert!(adapter.load::<Payload>("form").await.is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_always_transient_stops_at_bound() {
        let coordinator = SubmissionCoordinator::new(RetryPolicy::default());
        let adapter = adapter();
        seed(&adapter).await;
        let action = AlwaysTransient(AtomicU32::new(0));
        let liveness = Liveness::new();

        let started = tokio::time::Instant::now();
        let err = coordinator
            .submit(
                &Payload { amount: 1.0 },
                &rules(),
                &action,
                PersistTarget {
                    adapter: &adapter,
                    key: "form",
                },
                &liveness,
            )
            .await
            .unwrap_err();

        assert_eq!(action.0.load(Ordering::SeqCst), DEFAULT_MAX_RETRIES + 1);
        assert!(matches!(
            err,
            SubmissionError::RetriesExhausted { attempts: 4, .. }
        ));
        assert_eq!(coordinator.phase(), SubmissionPhase::Failed);
        // 1s + 2s + 4s of backoff
        assert!(started.elapsed() >= Duration::from_secs(7));
        // data survives for a later retry
        assert!(adapter.load::<Payload>("form").await.is_some());
    }

    #[tokio::test]
    async fn test_fatal_error_is_not_retried() {
        let coordinator = SubmissionCoordinator::new(RetryPolicy::default());
        let adapter = adapter();
        seed(&adapter).await;
        let action = Scripted::new(vec![Err(SubmitError::Fatal("401 Unauthorized".into()))]);

        let err = coordinator
            .submit(
                &Payload { amount: 1.0 },
                &rules(),
                &action,
                PersistTarget {
                    adapter: &adapter,
                    key: "form",
                },
                &Liveness::new(),
            )
            .await
            .unwrap_err();

        assert_eq!(action.calls(), 1);
        assert_eq!(err, SubmissionError::FatalRemote("401 Unauthorized".into()));
        assert!(adapter.load::<Payload>("form").await.is_some());
    }

    #[tokio::test]
    async fn test_validation_errors_never_reach_action() {
        let coordinator = SubmissionCoordinator::new(RetryPolicy::default());
        let adapter = adapter();
        let action = Scripted::new(vec![]);

        let err = coordinator
            .submit(
                &Payload { amount: -5.0 },
                &rules(),
                &action,
                PersistTarget {
                    adapter: &adapter,
                    key: "form",
                },
                &Liveness::new(),
            )
            .await
            .unwrap_err();

        assert_eq!(action.calls(), 0);
        match err {
            SubmissionError::Validation(errors) => assert!(errors.contains_key("amount")),
            other => panic!("expected validation error, got {other:?}"),
        }
        assert_eq!(coordinator.phase(), SubmissionPhase::Idle);
    }

    #[tokio::test(start_paused = true)]
    async fn test_second_submit_while_in_flight_is_rejected() {
        let coordinator = Arc::new(SubmissionCoordinator::new(RetryPolicy::default()));
        let adapter = adapter();
        let action = Arc::new(Scripted::new(vec![transient()]));
        let liveness = Arc::new(Liveness::new());

        let first = {
            let (coordinator, adapter, action, liveness) = (
                coordinator.clone(),
                adapter.clone(),
                action.clone(),
                liveness.clone(),
            );
            tokio::spawn(async move {
                coordinator
                    .submit(
                        &Payload { amount: 1.0 },
                        &rules(),
                        action.as_ref(),
                        PersistTarget {
                            adapter: &adapter,
                            key: "form",
                        },
                        &liveness,
                    )
                    .await
            })
        };

        // Let the first submission fail once and park in its backoff.
        while coordinator.phase() != SubmissionPhase::RetryPending {
            tokio::task::yield_now().await;
        }

        let second = coordinator
            .submit(
                &Payload { amount: 1.0 },
                &rules(),
                action.as_ref(),
                PersistTarget {
                    adapter: &adapter,
                    key: "form",
                },
                &liveness,
            )
            .await;
        assert_eq!(second.unwrap_err(), SubmissionError::InFlight);

        let report = first.await.unwrap().unwrap();
        assert_eq!(report.attempts.len(), 2);
        assert_eq!(action.calls(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_abandon_during_backoff_stops_without_clearing() {
        let coordinator = Arc::new(SubmissionCoordinator::new(RetryPolicy::default()));
        let adapter = adapter();
        seed(&adapter).await;
        let action = Arc::new(Scripted::new(vec![transient()]));
        let liveness = Arc::new(Liveness::new());

        let run = {
            let (coordinator, adapter, action, liveness) = (
                coordinator.clone(),
                adapter.clone(),
                action.clone(),
                liveness.clone(),
            );
            tokio::spawn(async move {
                coordinator
                    .submit(
                        &Payload { amount: 1.0 },
                        &rules(),
                        action.as_ref(),
                        PersistTarget {
                            adapter: &adapter,
                            key: "form",
                        },
                        &liveness,
                    )
                    .await
            })
        };

        while coordinator.phase() != SubmissionPhase::RetryPending {
            tokio::task::yield_now().await;
        }
        liveness.kill();

        assert_eq!(run.await.unwrap().unwrap_err(), SubmissionError::Abandoned);
        assert_eq!(action.calls(), 1);
        assert!(adapter.load::<Payload>("form").await.is_some());
    }

    #[tokio::test(start_paused = true)]
    async fn test_dropped_submission_releases_the_coordinator() {
        let coordinator = SubmissionCoordinator::new(RetryPolicy::default());
        let adapter = adapter();
        let action = AlwaysTransient(AtomicU32::new(0));
        let liveness = Liveness::new();
        let rules = rules();

        let run = coordinator.submit(
            &Payload { amount: 1.0 },
            &rules,
            &action,
            PersistTarget {
                adapter: &adapter,
                key: "form",
            },
            &liveness,
        );
        // Cancel mid-backoff.
        let timed_out = tokio::time::timeout(Duration::from_millis(500), run).await;
        assert!(timed_out.is_err());
        assert_eq!(coordinator.phase(), SubmissionPhase::Failed);

        let next = Scripted::new(vec![]);
        let report = coordinator
            .submit(
                &Payload { amount: 1.0 },
                &rules,
                &next,
                PersistTarget {
                    adapter: &adapter,
                    key: "form",
                },
                &liveness,
            )
            .await
            .unwrap();
        assert_eq!(report.attempts.len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_during_backoff_stops_the_retry() {
        let coordinator = Arc::new(SubmissionCoordinator::new(RetryPolicy::default()));
        let adapter = adapter();
        seed(&adapter).await;
        let action = Arc::new(Scripted::new(vec![transient()]));
        let liveness = Arc::new(Liveness::new());

        let run = {
            let (coordinator, adapter, action, liveness) = (
                coordinator.clone(),
                adapter.clone(),
                action.clone(),
                liveness.clone(),
            );
            tokio::spawn(async move {
                coordinator
                    .submit(
                        &Payload { amount: 1.0 },
                        &rules(),
                        action.as_ref(),
                        PersistTarget {
                            adapter: &adapter,
                            key: "form",
                        },
                        &liveness,
                    )
                    .await
            })
        };

        while coordinator.phase() != SubmissionPhase::RetryPending {
            tokio::task::yield_now().await;
        }
        assert!(coordinator.cancel());

        assert_eq!(run.await.unwrap().unwrap_err(), SubmissionError::Cancelled);
        tokio::time::sleep(Duration::from_secs(10)).await;
        assert_eq!(action.calls(), 1);
        assert_eq!(coordinator.phase(), SubmissionPhase::Idle);
        assert!(liveness.is_alive());
        assert!(adapter.load::<Payload>("form").await.is_some());

        // Nothing left to cancel, and the next run is unaffected.
        assert!(!coordinator.cancel());
        let report = coordinator
            .submit(
                &Payload { amount: 1.0 },
                &rules(),
                action.as_ref(),
                PersistTarget {
                    adapter: &adapter,
                    key: "form",
                },
                &liveness,
            )
            .await
            .unwrap();
        assert_eq!(report.attempts.len(), 1);
    }

    #[tokio::test]
    async fn test_failed_clear_is_reported_on_success() {
        let coordinator = SubmissionCoordinator::new(RetryPolicy::default());
        let adapter = SnapshotAdapter::new(Arc::new(UnavailableStore), DEFAULT_MAX_AGE);
        let action = Scripted::new(vec![]);

        let report = coordinator
            .submit(
                &Payload { amount: 1.0 },
                &rules(),
                &action,
                PersistTarget {
                    adapter: &adapter,
                    key: "form",
                },
                &Liveness::new(),
            )
            .await
            .unwrap();

        assert_eq!(coordinator.phase(), SubmissionPhase::Succeeded);
        let warning = report.storage_warning.unwrap();
        assert_eq!(warning.key, "form");
    }

    #[tokio::test]
    async fn test_coordinator_is_reusable_after_failure() {
        let coordinator = SubmissionCoordinator::new(RetryPolicy {
            max_retries: 0,
            backoff_base: Duration::from_millis(1),
        });
        let adapter = adapter();
        let action = Scripted::new(vec![transient()]);
        let target = || PersistTarget {
            adapter: &adapter,
            key: "form",
        };
        let liveness = Liveness::new();

        let first = coordinator
            .submit(&Payload { amount: 1.0 }, &rules(), &action, target(), &liveness)
            .await;
        assert!(matches!(
            first,
            Err(SubmissionError::RetriesExhausted { attempts: 1, .. })
        ));

        let second = coordinator
            .submit(&Payload { amount: 1.0 }, &rules(), &action, target(), &liveness)
            .await;
        assert!(second.is_ok());
        assert_eq!(action.calls(), 2);
    }
}
