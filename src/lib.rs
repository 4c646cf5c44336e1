//! # warden
//!
//! **Warden** is a single-process supervisor daemon library: it runs a set
//! of named worker tasks on individual timers, answers a line-oriented
//! command protocol over UDP, and auto-restarts workers that stop
//! reporting liveness.
//!
//! ## Architecture
//! ```text
//!     ┌──────────────┐   ┌──────────────┐   ┌──────────────┐
//!     │    Worker    │   │    Worker    │   │    Worker    │
//!     │ (descriptor) │   │ (descriptor) │   │ (descriptor) │
//!     └──────┬───────┘   └──────┬───────┘   └──────┬───────┘
//!            ▼                  ▼                  ▼
//! ┌───────────────────────────────────────────────────────────────────┐
//! │  Supervisor (single control task)                                 │
//! │  - receive-and-dispatch loop over the UDP control socket          │
//! │  - watchdog: lazy staleness check on each status query            │
//! │  - start/stop/interval/maxcount command dispatch                  │
//! │  - shutdown token fed by SIGINT/SIGTERM                           │
//! └──────┬──────────────────┬──────────────────┬──────────────────────┘
//!        ▼                  ▼                  ▼
//!   worker runtime     worker runtime     worker runtime
//!   (tokio task:       heartbeat → cycle → count → interruptible sleep)
//! ```
//!
//! Each worker runtime repeatedly invokes its [`WorkerTask`], recording a
//! heartbeat per cycle. The watchdog never polls: deadness is computed
//! from heartbeat staleness only when a status query arrives, and at most
//! one dead worker is auto-restarted per query. A worker that hangs
//! forever loses a bounded join, is reported, and drops out of
//! auto-restart — cancellation is cooperative all the way down.
//!
//! ## Wire protocol
//! Datagrams carry an echoed digits-and-spaces sequence prefix and a
//! command body. `status`, `ack`, and `clear` are answered for any
//! sender; log rotation and `thread <name> ...` control require a
//! loopback sender; anything else is handed back to the embedding
//! application (see [`Supervisor::next_command`]).
//!
//! ## Example
//! ```no_run
//! use std::sync::Arc;
//! use std::time::Duration;
//! use warden::{Config, CycleReport, Supervisor, TaskFn, Worker, WorkerState};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     warden::init_logging(None);
//!
//!     let poll = TaskFn::arc(|w: Arc<WorkerState>| async move {
//!         w.set_status("polled");
//!         CycleReport::idle()
//!     });
//!     let workers = vec![
//!         Worker::new("poller", "demo source", poll).with_interval(Duration::from_secs(30)),
//!     ];
//!
//!     let mut sup = Supervisor::bind(Config::default(), workers).await?;
//!     sup.start_auto();
//!
//!     while let Some(cmd) = sup.next_command().await? {
//!         sup.respond(&cmd, 5, "Unrecognized command").await?;
//!     }
//!     sup.shutdown().await;
//!     Ok(())
//! }
//! ```

mod config;
mod error;
mod lifecycle;
mod logging;
mod proto;
mod supervisor;
mod worker;

// ---- Public re-exports ----

pub use config::Config;
pub use error::{ControlError, RuntimeError};
pub use lifecycle::{PidFile, daemonize, enter_rundir, reopen_log};
pub use logging::init_logging;
pub use proto::{Request, Response, encode_reply, encode_status, parse_request, parse_response};
pub use supervisor::{OpaqueCommand, StatusReport, Supervisor};
pub use worker::{
    CycleReport, JoinOutcome, RuntimeHandle, TaskFn, TaskRef, Worker, WorkerState, WorkerTask,
};
