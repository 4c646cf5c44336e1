//! # Becoming (and behaving like) a proper daemon.
//!
//! [`daemonize`] performs the classic double fork: the first fork and
//! `setsid` shed the controlling terminal, the second fork guarantees the
//! session leader can never reacquire one. The surviving grandchild
//! changes into the run directory, points stdin at the null device and
//! stdout/stderr at the log file, and records its pid.
//!
//! Everything here is plain blocking code: forking a process that already
//! started a multi-threaded runtime does not survive contact with
//! reality, so `daemonize` must run before the tokio runtime is built.
//!
//! [`reopen_log`] re-points stdout/stderr at a freshly opened log file;
//! it backs the `newlog`/`rotate` protocol command so an external rotation
//! can move the old file aside and ask the daemon to let go of it.

use std::fs::{self, File, OpenOptions};
use std::os::fd::AsRawFd;
use std::path::Path;

use nix::unistd::{ForkResult, dup2, fork, setsid};

use crate::config::Config;
use crate::error::RuntimeError;

/// Drop guard for the pid file: best-effort removal on normal exit.
///
/// Keep it alive for the life of the process (typically a binding in
/// `main`); dropping it deletes the file.
#[derive(Debug)]
pub struct PidFile {
    path: std::path::PathBuf,
}

impl Drop for PidFile {
    fn drop(&mut self) {
        let _ = fs::remove_file(&self.path);
    }
}

/// Detaches from the invoking session and becomes a daemon.
///
/// Idempotent in effect: running it in an already-detached process just
/// re-runs the redirections. Returns the pid-file guard; the caller holds
/// it until exit.
pub fn daemonize(cfg: &Config) -> Result<PidFile, RuntimeError> {
    detach()?;
    enter_rundir(cfg)?;
    redirect_stdio(&cfg.logfile)?;
    write_pid_file(&cfg.pidfile)
}

/// Changes into the configured run directory.
pub fn enter_rundir(cfg: &Config) -> Result<(), RuntimeError> {
    std::env::set_current_dir(&cfg.rundir).map_err(|source| RuntimeError::Rundir {
        path: cfg.rundir.clone(),
        source,
    })
}

/// Reopens the log file and points stdout/stderr at it.
pub fn reopen_log(cfg: &Config) -> Result<(), RuntimeError> {
    let log = open_log(&cfg.logfile)?;
    redirect_fd(&log, 1)?;
    redirect_fd(&log, 2)?;
    Ok(())
}

fn detach() -> Result<(), RuntimeError> {
    // SAFETY: called before any runtime threads exist; the child only
    // continues straight-line startup code.
    match unsafe { fork() }.map_err(|source| RuntimeError::Daemonize {
        op: "fork",
        source,
    })? {
        ForkResult::Parent { .. } => std::process::exit(0),
        ForkResult::Child => {}
    }

    setsid().map_err(|source| RuntimeError::Daemonize {
        op: "setsid",
        source,
    })?;

    // SAFETY: as above; still single-threaded.
    match unsafe { fork() }.map_err(|source| RuntimeError::Daemonize {
        op: "fork",
        source,
    })? {
        ForkResult::Parent { .. } => std::process::exit(0),
        ForkResult::Child => {}
    }
    Ok(())
}

fn redirect_stdio(logfile: &Path) -> Result<(), RuntimeError> {
    let devnull = File::open("/dev/null").map_err(|source| RuntimeError::LogFile {
        path: "/dev/null".into(),
        source,
    })?;
    redirect_fd(&devnull, 0)?;

    let log = open_log(logfile)?;
    redirect_fd(&log, 1)?;
    redirect_fd(&log, 2)?;
    Ok(())
}

fn open_log(path: &Path) -> Result<File, RuntimeError> {
    OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .map_err(|source| RuntimeError::LogFile {
            path: path.to_path_buf(),
            source,
        })
}

fn redirect_fd(file: &File, target: i32) -> Result<(), RuntimeError> {
    dup2(file.as_raw_fd(), target).map_err(|source| RuntimeError::Daemonize {
        op: "dup2",
        source,
    })?;
    Ok(())
}

fn write_pid_file(path: &Path) -> Result<PidFile, RuntimeError> {
    // Temp-then-rename so a half-written pid can never be observed.
    let tmp = path.with_extension("pid.tmp");
    let write = fs::write(&tmp, format!("{}\n", std::process::id()))
        .and_then(|()| fs::rename(&tmp, path));
    write.map_err(|source| RuntimeError::PidFile {
        path: path.to_path_buf(),
        source,
    })?;
    Ok(PidFile {
        path: path.to_path_buf(),
    })
}
