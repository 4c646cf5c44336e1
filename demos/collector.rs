//! # Spool collector demo
//!
//! A small embedding of the warden supervisor: three workers watch spool
//! directories and report how many entries they hold, while the daemon
//! answers status and control queries on UDP port 2680.
//!
//! ## Run
//! ```bash
//! cargo run --example collector -- --config collector.json
//! cargo run --example collector -- -d          # detach as a daemon
//! ```
//!
//! Then poke it:
//! ```bash
//! printf '1status' | nc -u -w1 127.0.0.1 2680
//! printf '2thread auth start' | nc -u -w1 127.0.0.1 2680
//! printf '3help' | nc -u -w1 127.0.0.1 2680
//! ```

use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use clap::Parser;
use tracing::info;

use warden::{Config, CycleReport, Supervisor, Worker, WorkerState, WorkerTask};

#[derive(Parser, Debug)]
#[command(about = "Collect spool statistics under a warden supervisor")]
struct Args {
    /// Become a daemon.
    #[arg(short = 'd', long)]
    daemon: bool,

    /// Path to the JSON config file.
    #[arg(long, default_value = "collector.json")]
    config: PathBuf,
}

/// Counts entries in a spool directory once per cycle.
///
/// Reports "did work" whenever the count changed, so a burst of new files
/// is drained across immediate cycles before the worker settles back into
/// its interval. Errors raise the worker's alert and back the poll off.
struct SpoolWatcher {
    dir: PathBuf,
    last_seen: Mutex<Option<usize>>,
}

impl SpoolWatcher {
    fn new(dir: impl Into<PathBuf>) -> Arc<Self> {
        Arc::new(Self {
            dir: dir.into(),
            last_seen: Mutex::new(None),
        })
    }

    fn count_entries(&self) -> std::io::Result<usize> {
        Ok(std::fs::read_dir(&self.dir)?.count())
    }
}

#[async_trait]
impl WorkerTask for SpoolWatcher {
    async fn cycle(&self, worker: Arc<WorkerState>) -> CycleReport {
        match self.count_entries() {
            Ok(count) => {
                let changed = {
                    let mut last = self.last_seen.lock().unwrap();
                    last.replace(count) != Some(count)
                };
                worker.set_status(format!(
                    "At {count} entries count: {} interval: {}",
                    worker.cycle_count() + 1,
                    worker.interval().as_secs()
                ));
                if changed {
                    CycleReport::worked()
                } else {
                    CycleReport::idle()
                }
            }
            Err(err) => {
                worker.raise_alert(3);
                worker.set_status(format!("Unable to scan {}: {err}", self.dir.display()));
                CycleReport::idle().with_backoff(Duration::from_secs(30))
            }
        }
    }
}

fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    let cfg = if args.config.exists() {
        Config::load(&args.config)?
    } else {
        Config::default()
    };

    // Detaching must happen before the runtime exists; the pid file guard
    // lives until main returns.
    let _pidfile = if args.daemon {
        Some(warden::daemonize(&cfg)?)
    } else {
        warden::enter_rundir(&cfg)?;
        None
    };

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()?;
    runtime.block_on(run(cfg))
}

async fn run(cfg: Config) -> anyhow::Result<()> {
    warden::init_logging(None);

    let workers = vec![
        Worker::new("auth", "authentication spool", SpoolWatcher::new("auth"))
            .with_auto_restart(true),
        Worker::new("admin", "administrator spool", SpoolWatcher::new("admin"))
            .with_auto_restart(false),
        Worker::new("phone", "telephony spool", SpoolWatcher::new("phone"))
            .with_interval(Duration::from_secs(300))
            .with_auto_restart(false),
    ];

    let mut sup = Supervisor::bind(cfg, workers).await?;
    sup.start_auto();

    while let Some(cmd) = sup.next_command().await? {
        match cmd.body.as_str() {
            "help" => {
                let text = help_text(&sup);
                sup.respond(&cmd, 3, &text).await?;
            }
            _ => sup.respond(&cmd, 5, "Unrecognized command").await?,
        }
    }

    info!("exiting main loop");
    sup.shutdown().await;
    Ok(())
}

fn help_text(sup: &Supervisor) -> String {
    let mut text = String::from(
        "Help yourself\n\n\
         Commands are:\n  \
         clear: Clear status\n  \
         status: Report status\n  \
         rotate: Logfile rotation\n  \
         thread {name} start\n  \
         thread {name} stop\n  \
         thread {name} interval {seconds}\n  \
         thread {name} maxcount {count}\n\
         Threads are:\n",
    );
    for worker in sup.workers() {
        text.push_str(&format!(
            "  {}: {} watcher\n",
            worker.name(),
            worker.state().resource()
        ));
    }
    text
}
