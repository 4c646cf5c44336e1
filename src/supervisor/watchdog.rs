//! # Watchdog: lazy liveness classification.
//!
//! "Dead" is not a stored state. It is computed here, only when a status
//! query arrives, from a single signal: how long ago the worker's last
//! heartbeat was relative to its own interval. A worker that has not
//! started a cycle for more than [`STALE_INTERVALS`] × its interval is
//! classified dead — whether it hung, panicked, or is merely glacial.
//!
//! The evaluation also picks the auto-restart candidate. At most one per
//! query: once the aggregate alert reaches the restart level, later
//! workers are not even examined for staleness, which bounds the blocking
//! cost of a single status request.

use crate::worker::Worker;

/// A worker whose heartbeat is older than this many of its own intervals
/// is considered dead.
pub(crate) const STALE_INTERVALS: u32 = 4;

/// Aggregate alert for a dead worker nobody will restart.
pub(crate) const ALERT_DEAD: u8 = 5;
/// Aggregate alert for a dead worker about to be auto-restarted.
pub(crate) const ALERT_RESTARTING: u8 = 6;

/// Snapshot produced by a status query.
#[derive(Clone, Debug)]
pub struct StatusReport {
    /// Aggregate alert: the max over the supervisor's own alert, every
    /// active worker's alert, and any watchdog-derived alert.
    pub alert: u8,
    /// The supervisor status line, replaced by a `Dead thread: <name>`
    /// marker when the watchdog found a corpse.
    pub status: String,
    /// One line per worker, in registration order: `<name>: Idle` for
    /// inactive workers, `<name>: <status>` otherwise.
    pub lines: Vec<String>,
    /// Index of the worker selected for auto-restart, if any.
    pub(crate) restart: Option<usize>,
}

/// Evaluates the aggregate status over the worker collection.
pub(crate) fn evaluate(own_alert: u8, own_status: &str, workers: &[Worker]) -> StatusReport {
    let mut alert = own_alert;
    let mut status = own_status.to_string();
    let mut lines = Vec::with_capacity(workers.len());
    let mut restart = None;

    for (idx, worker) in workers.iter().enumerate() {
        let state = worker.state();
        if !worker.active() {
            lines.push(format!("{}: Idle", state.name()));
            continue;
        }
        lines.push(format!("{}: {}", state.name(), state.status()));

        alert = alert.max(state.alert());
        if alert < ALERT_RESTARTING && state.heartbeat_age() > STALE_INTERVALS * state.interval() {
            status = format!("Dead thread: {}", state.name());
            if worker.auto_restart() {
                alert = ALERT_RESTARTING;
                restart = Some(idx);
            } else {
                alert = ALERT_DEAD;
            }
        }
    }

    StatusReport {
        alert,
        status,
        lines,
        restart,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::worker::{TaskFn, WorkerState};
    use std::sync::Arc;
    use std::time::Duration;

    /// A task that enters its first cycle and never comes back, so the
    /// heartbeat stays frozen wherever the test left it.
    fn worker(name: &str, auto: bool) -> Worker {
        let task = TaskFn::arc(|w: Arc<WorkerState>| async move {
            w.set_status("hung");
            std::future::pending().await
        });
        Worker::new(name, "test", task)
            .with_interval(Duration::from_secs(90))
            .with_auto_restart(auto)
    }

    /// Spawns the runtime and waits for it to enter (and stall in) its
    /// first cycle, pinning the heartbeat at the current virtual time.
    async fn activate(w: &mut Worker) {
        w.spawn().unwrap();
        for _ in 0..200 {
            if w.state().status() == "hung" {
                return;
            }
            tokio::task::yield_now().await;
        }
        panic!("worker never entered its cycle");
    }

    #[test]
    fn inactive_workers_report_idle() {
        let workers = vec![worker("auth", true), worker("admin", false)];
        let report = evaluate(0, "Ready", &workers);
        assert_eq!(report.alert, 0);
        assert_eq!(report.status, "Ready");
        assert_eq!(report.lines, vec!["auth: Idle", "admin: Idle"]);
        assert!(report.restart.is_none());
    }

    #[test]
    fn own_alert_feeds_the_aggregate() {
        let workers = vec![worker("auth", true)];
        let report = evaluate(3, "degraded", &workers);
        assert_eq!(report.alert, 3);
        assert_eq!(report.status, "degraded");
    }

    #[tokio::test(start_paused = true)]
    async fn stale_heartbeat_raises_dead_alert() {
        let mut w = worker("auth", false);
        activate(&mut w).await;
        tokio::time::advance(Duration::from_secs(400)).await;

        let workers = vec![w];
        let report = evaluate(0, "Ready", &workers);
        assert_eq!(report.alert, ALERT_DEAD);
        assert_eq!(report.status, "Dead thread: auth");
        assert!(report.restart.is_none());
        assert_eq!(report.lines, vec!["auth: hung"]);
    }

    #[tokio::test(start_paused = true)]
    async fn stale_auto_worker_becomes_the_restart_candidate() {
        let mut first = worker("auth", true);
        let mut second = worker("admin", true);
        activate(&mut first).await;
        activate(&mut second).await;
        tokio::time::advance(Duration::from_secs(400)).await;

        let workers = vec![first, second];
        let report = evaluate(0, "Ready", &workers);
        assert_eq!(report.alert, ALERT_RESTARTING);
        // Both are dead, but only the first is selected.
        assert_eq!(report.restart, Some(0));
        assert_eq!(report.status, "Dead thread: auth");
    }

    #[tokio::test(start_paused = true)]
    async fn fresh_heartbeat_is_not_stale() {
        let mut w = worker("auth", true);
        activate(&mut w).await;
        tokio::time::advance(Duration::from_secs(300)).await;
        w.state().beat();

        let workers = vec![w];
        let report = evaluate(0, "Ready", &workers);
        assert_eq!(report.alert, 0);
        assert!(report.restart.is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn worker_alert_feeds_the_aggregate() {
        let mut w = worker("auth", true);
        activate(&mut w).await;
        w.state().raise_alert(4);

        let workers = vec![w];
        let report = evaluate(0, "Ready", &workers);
        assert_eq!(report.alert, 4);
        assert!(report.restart.is_none());
    }
}
