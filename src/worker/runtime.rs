//! # Worker runtime: the per-worker execution loop and its handle.
//!
//! One runtime is spawned per active worker. It repeatedly invokes the
//! worker's task and owns the timing discipline around it:
//!
//! ```text
//! loop {
//!   ├─► stop requested? ─► exit
//!   ├─► record heartbeat
//!   ├─► task.cycle() ──► CycleReport { did_work, backoff }
//!   ├─► increment cycle count
//!   ├─► did_work? ─► go again immediately (drain pending work)
//!   ├─► sleep(interval + backoff)   (interruptible, never a blind delay)
//!   └─► max_cycles reached? ─► exit
//! }
//! on exit: status = "Stopped <last status>"
//! ```
//!
//! ## Rules
//! - Cancellation is checked at safe points only: before each cycle and
//!   during the sleep. A task that blocks forever defeats both, which is
//!   why the control side joins with a bounded timeout.
//! - The runtime never clears the descriptor's `active` flag itself; the
//!   control task does that after a successful join, so "joined" and
//!   "marked inactive" are atomic from the controller's point of view.
//! - A panic inside the task is not caught here. The tokio task dies with
//!   it, the heartbeat freezes, and the watchdog finds the body later.

use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::worker::descriptor::WorkerState;
use crate::worker::task::TaskRef;

/// Cap on the per-cycle backoff a task may add to its sleep, bounding
/// worst-case unresponsiveness to a stop request.
pub(crate) const MAX_TASK_BACKOFF: Duration = Duration::from_secs(300);

/// Result of a bounded join on a worker runtime.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum JoinOutcome {
    /// The runtime finished and was reaped.
    Joined,
    /// The runtime is still executing; the worker is presumed hung.
    TimedOut,
}

/// Owning handle to a spawned worker runtime.
///
/// Couples the tokio [`JoinHandle`] with the cooperative stop token, so
/// the control side has exactly two levers: [`request_stop`] and a
/// bounded [`join`].
///
/// [`request_stop`]: RuntimeHandle::request_stop
/// [`join`]: RuntimeHandle::join
pub struct RuntimeHandle {
    name: String,
    join: JoinHandle<()>,
    stop: CancellationToken,
}

impl RuntimeHandle {
    /// Spawns a fresh runtime for `state` and returns its handle.
    pub(crate) fn spawn(state: Arc<WorkerState>, task: TaskRef) -> Self {
        let stop = CancellationToken::new();
        let name = state.name().to_string();
        let join = tokio::spawn(run_worker(state, task, stop.clone()));
        Self { name, join, stop }
    }

    /// Flips the cooperative stop flag. The runtime observes it before its
    /// next cycle and during its sleep.
    pub fn request_stop(&self) {
        self.stop.cancel();
    }

    /// Waits up to `timeout` for the runtime to finish.
    ///
    /// A runtime that died of a panic still joins cleanly — the corpse is
    /// reaped and the panic is logged.
    pub async fn join(&mut self, timeout: Duration) -> JoinOutcome {
        match time::timeout(timeout, &mut self.join).await {
            Ok(res) => {
                if let Err(err) = res
                    && err.is_panic()
                {
                    warn!(worker = %self.name, "worker runtime panicked");
                }
                JoinOutcome::Joined
            }
            Err(_) => JoinOutcome::TimedOut,
        }
    }
}

/// The worker loop. See the module docs for the shape.
async fn run_worker(state: Arc<WorkerState>, task: TaskRef, stop: CancellationToken) {
    'outer: loop {
        let mut backoff = Duration::ZERO;

        // Drain available work before sleeping. Every cycle re-arms the
        // heartbeat, so a long drain never looks dead.
        loop {
            if stop.is_cancelled() {
                break 'outer;
            }
            state.beat();
            let report = task.cycle(Arc::clone(&state)).await;
            state.bump_cycles();
            backoff = report.backoff.min(MAX_TASK_BACKOFF);
            if !report.did_work {
                break;
            }
        }

        let sleep = time::sleep(state.interval() + backoff);
        tokio::pin!(sleep);
        tokio::select! {
            _ = &mut sleep => {}
            _ = stop.cancelled() => break 'outer,
        }

        let max = state.max_cycles();
        if max >= 0 && state.cycle_count() > max as u64 {
            break;
        }
    }

    state.set_status(format!("Stopped {}", state.status()));
    debug!(worker = %state.name(), "worker loop terminating");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::worker::task::{CycleReport, TaskFn};
    use std::sync::atomic::{AtomicU64, Ordering};
    use std::sync::Mutex;
    use tokio::time::Instant;

    fn idle_state(interval_secs: u64, max_cycles: i64) -> Arc<WorkerState> {
        Arc::new(WorkerState::new(
            "auth".into(),
            "authentication".into(),
            interval_secs,
            max_cycles,
        ))
    }

    fn idle_task() -> TaskRef {
        TaskFn::arc(|_w: Arc<WorkerState>| async { CycleReport::idle() })
    }

    async fn wait_for_first_cycle(state: &WorkerState) {
        for _ in 0..200 {
            if state.cycle_count() >= 1 {
                return;
            }
            tokio::task::yield_now().await;
        }
        panic!("worker never completed its first cycle");
    }

    #[tokio::test(start_paused = true)]
    async fn stop_interrupts_the_sleep() {
        let state = idle_state(1000, -1);
        let mut handle = RuntimeHandle::spawn(Arc::clone(&state), idle_task());

        wait_for_first_cycle(&state).await;
        assert_eq!(state.cycle_count(), 1);

        // The runtime is parked in a 1000s sleep; the stop flag must wake
        // it without waiting the interval out.
        handle.request_stop();
        assert_eq!(
            handle.join(Duration::from_secs(1)).await,
            JoinOutcome::Joined
        );
        assert!(state.status().starts_with("Stopped"));
    }

    #[tokio::test(start_paused = true)]
    async fn max_cycles_bounds_the_loop() {
        let state = idle_state(1, 0);
        let mut handle = RuntimeHandle::spawn(Arc::clone(&state), idle_task());

        // max_cycles = 0: one cycle, one sleep, then the bound trips.
        assert_eq!(
            handle.join(Duration::from_secs(60)).await,
            JoinOutcome::Joined
        );
        assert_eq!(state.cycle_count(), 1);
        assert!(state.status().starts_with("Stopped"));
    }

    #[tokio::test(start_paused = true)]
    async fn negative_max_cycles_means_unbounded() {
        let state = idle_state(1, -5);
        let mut handle = RuntimeHandle::spawn(Arc::clone(&state), idle_task());

        tokio::time::sleep(Duration::from_secs(10)).await;
        assert!(state.cycle_count() >= 2, "loop should still be running");

        handle.request_stop();
        assert_eq!(
            handle.join(Duration::from_secs(1)).await,
            JoinOutcome::Joined
        );
    }

    #[tokio::test(start_paused = true)]
    async fn idle_cycles_sleep_between_runs() {
        let stamps: Arc<Mutex<Vec<Instant>>> = Arc::new(Mutex::new(Vec::new()));
        let seen = Arc::clone(&stamps);
        let task = TaskFn::arc(move |_w: Arc<WorkerState>| {
            let seen = Arc::clone(&seen);
            async move {
                seen.lock().unwrap().push(Instant::now());
                CycleReport::idle()
            }
        });

        let state = idle_state(10, 1);
        let mut handle = RuntimeHandle::spawn(Arc::clone(&state), task);
        assert_eq!(
            handle.join(Duration::from_secs(120)).await,
            JoinOutcome::Joined
        );

        let stamps = stamps.lock().unwrap();
        assert_eq!(stamps.len(), 2);
        assert!(stamps[1] - stamps[0] >= Duration::from_secs(10));
    }

    #[tokio::test(start_paused = true)]
    async fn pending_work_skips_the_sleep() {
        let stamps: Arc<Mutex<Vec<Instant>>> = Arc::new(Mutex::new(Vec::new()));
        let calls = Arc::new(AtomicU64::new(0));
        let (seen, counter) = (Arc::clone(&stamps), Arc::clone(&calls));
        let task = TaskFn::arc(move |_w: Arc<WorkerState>| {
            let seen = Arc::clone(&seen);
            let counter = Arc::clone(&counter);
            async move {
                seen.lock().unwrap().push(Instant::now());
                if counter.fetch_add(1, Ordering::Relaxed) < 3 {
                    CycleReport::worked()
                } else {
                    CycleReport::idle()
                }
            }
        });

        let state = idle_state(100, 2);
        let mut handle = RuntimeHandle::spawn(Arc::clone(&state), task);
        assert_eq!(
            handle.join(Duration::from_secs(300)).await,
            JoinOutcome::Joined
        );

        // Four cycles ran back to back before the first sleep.
        let stamps = stamps.lock().unwrap();
        assert_eq!(stamps.len(), 4);
        assert!(stamps[3] - stamps[0] < Duration::from_secs(100));
    }

    #[tokio::test(start_paused = true)]
    async fn task_backoff_extends_the_sleep() {
        let stamps: Arc<Mutex<Vec<Instant>>> = Arc::new(Mutex::new(Vec::new()));
        let seen = Arc::clone(&stamps);
        let task = TaskFn::arc(move |_w: Arc<WorkerState>| {
            let seen = Arc::clone(&seen);
            async move {
                seen.lock().unwrap().push(Instant::now());
                CycleReport::idle().with_backoff(Duration::from_secs(50))
            }
        });

        let state = idle_state(10, 1);
        let mut handle = RuntimeHandle::spawn(Arc::clone(&state), task);
        assert_eq!(
            handle.join(Duration::from_secs(300)).await,
            JoinOutcome::Joined
        );

        let stamps = stamps.lock().unwrap();
        assert_eq!(stamps.len(), 2);
        assert!(stamps[1] - stamps[0] >= Duration::from_secs(60));
    }

    #[tokio::test(start_paused = true)]
    async fn task_backoff_is_capped() {
        let stamps: Arc<Mutex<Vec<Instant>>> = Arc::new(Mutex::new(Vec::new()));
        let seen = Arc::clone(&stamps);
        let task = TaskFn::arc(move |_w: Arc<WorkerState>| {
            let seen = Arc::clone(&seen);
            async move {
                seen.lock().unwrap().push(Instant::now());
                CycleReport::idle().with_backoff(Duration::from_secs(100_000))
            }
        });

        let state = idle_state(10, 1);
        let mut handle = RuntimeHandle::spawn(Arc::clone(&state), task);
        assert_eq!(
            handle.join(Duration::from_secs(3600)).await,
            JoinOutcome::Joined
        );

        let stamps = stamps.lock().unwrap();
        let gap = stamps[1] - stamps[0];
        assert!(gap >= Duration::from_secs(310));
        assert!(gap <= MAX_TASK_BACKOFF + Duration::from_secs(30));
    }

    #[tokio::test(start_paused = true)]
    async fn hung_task_times_out_on_join() {
        let task = TaskFn::arc(|w: Arc<WorkerState>| async move {
            w.set_status("hung");
            std::future::pending::<CycleReport>().await
        });
        let state = idle_state(1, -1);
        let mut handle = RuntimeHandle::spawn(Arc::clone(&state), task);

        // Wait until the task is actually inside its cycle, then try to
        // stop a worker that will never observe the flag.
        for _ in 0..200 {
            if state.status() == "hung" {
                break;
            }
            tokio::task::yield_now().await;
        }
        assert_eq!(state.status(), "hung");

        handle.request_stop();
        assert_eq!(
            handle.join(Duration::from_secs(5)).await,
            JoinOutcome::TimedOut
        );
    }

    #[tokio::test(start_paused = true)]
    async fn panicked_runtime_still_joins() {
        let task = TaskFn::arc(|_w: Arc<WorkerState>| async { panic!("task blew up") });
        let state = idle_state(1, -1);
        let mut handle = RuntimeHandle::spawn(Arc::clone(&state), task);

        assert_eq!(
            handle.join(Duration::from_secs(5)).await,
            JoinOutcome::Joined
        );
        // The heartbeat froze at the first (and only) cycle.
        let frozen = state.heartbeat_age();
        tokio::time::advance(Duration::from_secs(30)).await;
        assert!(state.heartbeat_age() >= frozen + Duration::from_secs(30));
    }
}
