//! # Worker descriptors.
//!
//! A worker splits along the concurrency boundary into two pieces:
//!
//! - [`WorkerState`] — the shared record both sides touch. The runtime
//!   writes heartbeat, cycle count, status text, and alert level while the
//!   control task reads them concurrently, so those fields are atomics or
//!   sit behind a short-lock mutex. Interval and max-cycles go the other
//!   way: the control task writes, the runtime reads at its next sleep.
//! - [`Worker`] — the control-side descriptor. Only the single control
//!   task ever touches it, so it needs no synchronization: it owns the
//!   shared state, the task, the auto-restart flag, and the runtime handle
//!   while one is running.
//!
//! ## Rules
//! - `active()` is defined as "a runtime handle is present"; handing the
//!   handle back on a successful join is what marks the worker inactive.
//! - A worker may only **raise** its alert level; nothing on the runtime
//!   side ever lowers it.
//! - The heartbeat is monotonically non-decreasing while active and frozen
//!   once the runtime exits.

use std::sync::atomic::{AtomicI64, AtomicU8, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use tokio::time::Instant;

use crate::error::ControlError;
use crate::worker::runtime::{JoinOutcome, RuntimeHandle};
use crate::worker::task::TaskRef;

/// Shared per-worker state, visible to both the control task and the
/// worker's own runtime.
pub struct WorkerState {
    name: String,
    resource: String,
    alert: AtomicU8,
    status: Mutex<String>,
    cycle_count: AtomicU64,
    interval_secs: AtomicU64,
    max_cycles: AtomicI64,
    /// Fixed reference point; the heartbeat is stored as elapsed
    /// milliseconds against it.
    epoch: Instant,
    heartbeat_ms: AtomicU64,
}

impl WorkerState {
    pub(crate) fn new(name: String, resource: String, interval_secs: u64, max_cycles: i64) -> Self {
        Self {
            name,
            resource,
            alert: AtomicU8::new(0),
            status: Mutex::new("Starting".to_string()),
            cycle_count: AtomicU64::new(0),
            interval_secs: AtomicU64::new(interval_secs),
            max_cycles: AtomicI64::new(max_cycles),
            epoch: Instant::now(),
            heartbeat_ms: AtomicU64::new(0),
        }
    }

    /// Stable worker name, used in protocol commands and status lines.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Opaque domain label describing what the worker watches; never
    /// interpreted by the core.
    pub fn resource(&self) -> &str {
        &self.resource
    }

    /// Current alert level.
    pub fn alert(&self) -> u8 {
        self.alert.load(Ordering::Relaxed)
    }

    /// Raises the alert level to at least `level`. Lower values are
    /// ignored: workers escalate, they never quietly de-escalate.
    pub fn raise_alert(&self, level: u8) {
        self.alert.fetch_max(level, Ordering::Relaxed);
    }

    /// Current status text.
    pub fn status(&self) -> String {
        self.status
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Replaces the status text; last write wins.
    pub fn set_status(&self, status: impl Into<String>) {
        *self
            .status
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = status.into();
    }

    /// Completed cycles since the last (re)start.
    pub fn cycle_count(&self) -> u64 {
        self.cycle_count.load(Ordering::Relaxed)
    }

    pub(crate) fn bump_cycles(&self) {
        self.cycle_count.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn reset_cycles(&self) {
        self.cycle_count.store(0, Ordering::Relaxed);
    }

    /// Sleep duration between cycles. The runtime reads this at each
    /// sleep, so updates take effect on the next cycle, not mid-cycle.
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs.load(Ordering::Relaxed))
    }

    pub(crate) fn set_interval_secs(&self, secs: u64) {
        self.interval_secs.store(secs, Ordering::Relaxed);
    }

    /// Stop condition; any negative value means unbounded.
    pub fn max_cycles(&self) -> i64 {
        self.max_cycles.load(Ordering::Relaxed)
    }

    pub(crate) fn set_max_cycles(&self, count: i64) {
        self.max_cycles.store(count, Ordering::Relaxed);
    }

    /// Records the heartbeat — the sole liveness signal, written at the
    /// start of every cycle.
    pub fn beat(&self) {
        let elapsed = self.epoch.elapsed().as_millis().min(u128::from(u64::MAX)) as u64;
        self.heartbeat_ms.fetch_max(elapsed, Ordering::Relaxed);
    }

    /// Time since the most recent heartbeat.
    pub fn heartbeat_age(&self) -> Duration {
        let last = Duration::from_millis(self.heartbeat_ms.load(Ordering::Relaxed));
        self.epoch.elapsed().saturating_sub(last)
    }
}

/// Control-side worker descriptor.
///
/// Built once at supervisor start with [`Worker::new`] plus the `with_*`
/// builders, then owned and mutated exclusively by the control task.
pub struct Worker {
    state: Arc<WorkerState>,
    task: TaskRef,
    auto_restart: bool,
    runtime: Option<RuntimeHandle>,
}

impl Worker {
    /// Creates an inactive worker with the stock defaults: a 90 second
    /// interval, unbounded cycles, auto-restart enabled.
    pub fn new(name: impl Into<String>, resource: impl Into<String>, task: TaskRef) -> Self {
        Self {
            state: Arc::new(WorkerState::new(name.into(), resource.into(), 90, -1)),
            task,
            auto_restart: true,
            runtime: None,
        }
    }

    /// Sets the cycle interval (floored to one second).
    pub fn with_interval(self, interval: Duration) -> Self {
        self.state.set_interval_secs(interval.as_secs().max(1));
        self
    }

    /// Sets the cycle bound; negative means unbounded.
    pub fn with_max_cycles(self, count: i64) -> Self {
        self.state.set_max_cycles(count);
        self
    }

    /// Enables or disables watchdog auto-restart for this worker.
    pub fn with_auto_restart(mut self, auto: bool) -> Self {
        self.auto_restart = auto;
        self
    }

    /// Convenience: the worker name.
    pub fn name(&self) -> &str {
        self.state.name()
    }

    /// The shared state record.
    pub fn state(&self) -> &Arc<WorkerState> {
        &self.state
    }

    /// Whether a runtime is currently executing for this descriptor.
    pub fn active(&self) -> bool {
        self.runtime.is_some()
    }

    /// Whether the watchdog may restart this worker when found dead.
    pub fn auto_restart(&self) -> bool {
        self.auto_restart
    }

    /// Spawns a fresh runtime for this worker.
    ///
    /// Fails with [`ControlError::AlreadyActive`] if one is running;
    /// exactly one runtime may be associated with a descriptor at a time.
    /// Resets the cycle count and liveness state so a restarted worker
    /// starts from a clean slate.
    pub(crate) fn spawn(&mut self) -> Result<(), ControlError> {
        if self.runtime.is_some() {
            return Err(ControlError::AlreadyActive {
                name: self.state.name().to_string(),
            });
        }
        self.state.reset_cycles();
        self.state.beat();
        self.runtime = Some(RuntimeHandle::spawn(
            Arc::clone(&self.state),
            Arc::clone(&self.task),
        ));
        Ok(())
    }

    /// Asks the runtime to stop, if one is running.
    pub(crate) fn request_stop(&self) {
        if let Some(handle) = &self.runtime {
            handle.request_stop();
        }
    }

    /// Stops the runtime, waiting up to `grace` for it to finish.
    ///
    /// On success the handle is released and the worker becomes inactive —
    /// joining and marking inactive are one step from the controller's
    /// point of view. On timeout the worker stays active, auto-restart is
    /// disabled (a hung worker must not be silently retried forever), and
    /// [`ControlError::JoinTimeout`] is reported. Stopping an inactive
    /// worker is a no-op.
    pub(crate) async fn stop(&mut self, grace: Duration) -> Result<(), ControlError> {
        let Some(handle) = self.runtime.as_mut() else {
            return Ok(());
        };
        handle.request_stop();
        match handle.join(grace).await {
            JoinOutcome::Joined => {
                self.runtime = None;
                Ok(())
            }
            JoinOutcome::TimedOut => {
                self.auto_restart = false;
                Err(ControlError::JoinTimeout {
                    name: self.state.name().to_string(),
                })
            }
        }
    }
}
