//! # Worker task interface.
//!
//! This module defines the [`WorkerTask`] trait (async, one cycle per
//! call) and a convenient function-backed implementation [`TaskFn`]. The
//! common handle type is [`TaskRef`], an `Arc<dyn WorkerTask>` suitable
//! for sharing with a worker runtime.
//!
//! A task is invoked once per cycle with the worker's shared state. It is
//! solely responsible for updating its own status text (and raising the
//! alert level on errors); the supervisor core never interprets what the
//! task does. The returned [`CycleReport`] tells the runtime whether the
//! cycle did useful work — if it did, the runtime cycles again immediately
//! instead of sleeping — and may suggest an extra backoff added to the
//! next sleep (e.g. after an upstream rate-limit response).
//!
//! An unhandled panic inside a task is deliberately not caught: it kills
//! the runtime, the heartbeat freezes, and the watchdog picks the corpse
//! up on the next status query.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

use crate::worker::descriptor::WorkerState;

/// Shared handle to a worker task.
pub type TaskRef = Arc<dyn WorkerTask>;

/// Outcome of one worker cycle.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct CycleReport {
    /// Whether the cycle did useful work. `true` means "more may be
    /// waiting, go again"; `false` means "sleep until the next interval".
    pub did_work: bool,
    /// Extra delay the task wants added to the next sleep.
    pub backoff: Duration,
}

impl CycleReport {
    /// A cycle that did useful work.
    pub fn worked() -> Self {
        Self {
            did_work: true,
            backoff: Duration::ZERO,
        }
    }

    /// A cycle that found nothing to do.
    pub fn idle() -> Self {
        Self {
            did_work: false,
            backoff: Duration::ZERO,
        }
    }

    /// Adds a suggested backoff to the next sleep.
    pub fn with_backoff(mut self, backoff: Duration) -> Self {
        self.backoff = backoff;
        self
    }
}

/// # One repeatable unit of worker business logic.
///
/// The supervisor calls [`cycle`](WorkerTask::cycle) repeatedly from the
/// worker's runtime; everything between calls (heartbeats, counting,
/// sleeping, stop handling) belongs to the runtime.
///
/// # Example
/// ```
/// use std::sync::Arc;
/// use async_trait::async_trait;
/// use warden::{CycleReport, WorkerState, WorkerTask};
///
/// struct Probe;
///
/// #[async_trait]
/// impl WorkerTask for Probe {
///     async fn cycle(&self, worker: Arc<WorkerState>) -> CycleReport {
///         worker.set_status("probed");
///         CycleReport::idle()
///     }
/// }
/// ```
#[async_trait]
pub trait WorkerTask: Send + Sync + 'static {
    /// Executes one cycle of work.
    async fn cycle(&self, worker: Arc<WorkerState>) -> CycleReport;
}

/// Function-backed task implementation.
///
/// Wraps a closure that creates a fresh future per cycle; shared state
/// belongs in an explicit `Arc` inside the closure.
pub struct TaskFn<F> {
    f: F,
}

impl<F> TaskFn<F> {
    /// Creates a new function-backed task.
    ///
    /// Prefer [`TaskFn::arc`] when you immediately need a [`TaskRef`].
    pub fn new(f: F) -> Self {
        Self { f }
    }

    /// Creates the task and returns it as a shared handle.
    pub fn arc(f: F) -> Arc<Self> {
        Arc::new(Self::new(f))
    }
}

#[async_trait]
impl<F, Fut> WorkerTask for TaskFn<F>
where
    F: Fn(Arc<WorkerState>) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = CycleReport> + Send,
{
    async fn cycle(&self, worker: Arc<WorkerState>) -> CycleReport {
        (self.f)(worker).await
    }
}
