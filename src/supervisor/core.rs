//! # Supervisor: the single control task that owns everything.
//!
//! The [`Supervisor`] owns the control socket, the worker collection, and
//! the process-level alert/status pair. Commands are processed strictly in
//! arrival order by one task, which serializes every mutation of the
//! collection — no locks, no lost updates. The only fields touched from
//! outside the control task are the ones inside [`WorkerState`], which are
//! built for it.
//!
//! ## High-level architecture
//! ```text
//! UDP datagram ──► codec::parse_request ──► dispatch
//!                     │
//!                     ├─ status/ack/clear ──► watchdog::evaluate ──► status frame
//!                     │                            └─► at most one auto-restart,
//!                     │                                after the response is sent
//!                     ├─ newlog/rotate ─────► reopen log file        (local only)
//!                     ├─ thread <name> ... ─► start/stop/interval/maxcount
//!                     │                                              (local only)
//!                     └─ anything else ─────► handed to the embedding application
//!
//! SIGINT/SIGTERM ──► shutdown token ──► next_command() returns None
//!                                        └─► shutdown(): stop all, bounded joins
//! ```
//!
//! Blocking is bounded everywhere: the control task blocks only on the
//! socket (interruptible by the shutdown token) and, transiently, on a
//! join capped by the configured grace period.

use std::net::SocketAddr;

use tokio::net::UdpSocket;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::config::Config;
use crate::error::{ControlError, RuntimeError};
use crate::lifecycle::signals;
use crate::supervisor::watchdog::{self, StatusReport};
use crate::worker::Worker;

/// Coordinates workers, the command socket, and graceful shutdown.
pub struct Supervisor {
    pub(crate) cfg: Config,
    pub(crate) sock: UdpSocket,
    pub(crate) shutdown: CancellationToken,
    workers: Vec<Worker>,
    alert: u8,
    status: String,
}

impl Supervisor {
    /// Binds the control socket and installs the termination-signal
    /// listener.
    ///
    /// A bind failure is fatal: a supervisor nobody can reach has nothing
    /// to do.
    pub async fn bind(cfg: Config, workers: Vec<Worker>) -> Result<Self, RuntimeError> {
        let addr = cfg.socket_addr()?;
        let sock = UdpSocket::bind(addr)
            .await
            .map_err(|source| RuntimeError::Bind { addr, source })?;
        let shutdown = signals::install();

        info!(port = cfg.port, "ready to accept requests");
        Ok(Self {
            cfg,
            sock,
            shutdown,
            workers,
            alert: 0,
            status: "Ready".to_string(),
        })
    }

    /// The address the control socket actually bound (useful with port 0).
    pub fn local_addr(&self) -> std::io::Result<SocketAddr> {
        self.sock.local_addr()
    }

    /// A clone of the shutdown token, for embeddings that want to trigger
    /// or observe termination themselves.
    pub fn shutdown_token(&self) -> CancellationToken {
        self.shutdown.clone()
    }

    /// The worker collection, in registration order.
    pub fn workers(&self) -> &[Worker] {
        &self.workers
    }

    /// Looks up a worker by name.
    pub fn worker(&self, name: &str) -> Option<&Worker> {
        self.workers.iter().find(|w| w.name() == name)
    }

    /// Raises the supervisor's own alert and replaces its status line.
    /// Lower alert levels never overwrite higher ones.
    pub fn raise_alert(&mut self, level: u8, status: impl Into<String>) {
        if level >= self.alert {
            self.alert = level;
            self.status = status.into();
        }
    }

    /// Clears the supervisor's own alert (the `ack`/`clear` command).
    pub fn clear_alert(&mut self) {
        self.alert = 0;
        self.status = "Ready".to_string();
    }

    /// Computes the aggregate status snapshot. Pure: restarts, if any are
    /// due, happen on the protocol path after the response is sent.
    pub fn status_report(&self) -> StatusReport {
        watchdog::evaluate(self.alert, &self.status, &self.workers)
    }

    /// Starts the named worker.
    ///
    /// Fails with [`ControlError::AlreadyActive`] if a runtime is already
    /// executing; the existing runtime is left untouched.
    pub fn start_worker(&mut self, name: &str) -> Result<(), ControlError> {
        self.find_worker(name)?.spawn()?;
        info!(worker = name, "worker started");
        Ok(())
    }

    /// Stops the named worker, waiting up to the configured grace period.
    ///
    /// On [`ControlError::JoinTimeout`] the worker stays active with
    /// auto-restart disabled; there is no forced termination of a hung
    /// task short of process-level intervention.
    pub async fn stop_worker(&mut self, name: &str) -> Result<(), ControlError> {
        let grace = self.cfg.grace();
        self.find_worker(name)?.stop(grace).await?;
        info!(worker = name, "worker stopped");
        Ok(())
    }

    /// Updates the named worker's cycle interval. The running runtime
    /// observes it on its next sleep.
    pub fn set_interval(&mut self, name: &str, secs: i64) -> Result<(), ControlError> {
        let worker = self.find_worker(name)?;
        if secs <= 0 {
            return Err(ControlError::InvalidArgument {
                name: name.to_string(),
                option: "interval",
                value: secs.to_string(),
            });
        }
        worker.state().set_interval_secs(secs as u64);
        Ok(())
    }

    /// Updates the named worker's cycle bound. Stored verbatim; any
    /// negative value behaves as unbounded.
    pub fn set_max_cycles(&mut self, name: &str, count: i64) -> Result<(), ControlError> {
        self.find_worker(name)?.state().set_max_cycles(count);
        Ok(())
    }

    /// Starts every worker flagged for auto-restart that is not already
    /// running. Called once at boot by embeddings that want their
    /// steady-state workers up before the first command arrives.
    pub fn start_auto(&mut self) {
        for worker in &mut self.workers {
            if worker.auto_restart() && !worker.active() {
                let name = worker.name().to_string();
                match worker.spawn() {
                    Ok(()) => info!(worker = %name, "worker started"),
                    Err(err) => warn!(worker = %name, error = %err, "worker failed to start"),
                }
            }
        }
    }

    /// The auto-restart sequence for a worker the watchdog classified as
    /// dead. Invoked at most once per status query, after the response
    /// has been sent.
    pub(crate) async fn restart_worker(&mut self, idx: usize) {
        let grace = self.cfg.grace();
        let worker = &mut self.workers[idx];
        let name = worker.name().to_string();

        // A corpse usually joins instantly; a hung runtime eats the whole
        // grace period once, then loses its restart privileges.
        if worker.stop(grace).await.is_err() {
            warn!(worker = %name, "unable to terminate worker; auto-restart disabled");
            return;
        }
        match worker.spawn() {
            Ok(()) => info!(worker = %name, "restarted worker"),
            Err(err) => warn!(worker = %name, error = %err, "unable to restart worker"),
        }
    }

    /// Orderly shutdown: flip every stop flag first so workers wind down
    /// in parallel, then join each with the grace bound.
    pub async fn shutdown(&mut self) {
        let grace = self.cfg.grace();
        for worker in &self.workers {
            worker.request_stop();
        }
        for worker in &mut self.workers {
            if !worker.active() {
                continue;
            }
            let name = worker.name().to_string();
            match worker.stop(grace).await {
                Ok(()) => info!(worker = %name, "worker stopped"),
                Err(err) => warn!(worker = %name, error = %err, "worker left running"),
            }
        }
        info!("supervisor shut down");
    }

    fn find_worker(&mut self, name: &str) -> Result<&mut Worker, ControlError> {
        self.workers
            .iter_mut()
            .find(|w| w.name() == name)
            .ok_or_else(|| ControlError::NoSuchWorker {
                name: name.to_string(),
            })
    }
}
