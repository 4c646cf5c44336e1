//! Error types used by the warden runtime and the command dispatcher.
//!
//! This module defines two main error enums:
//!
//! - [`RuntimeError`] — failures of the process environment itself (socket
//!   setup, config loading, daemonization). These are fatal or propagated.
//! - [`ControlError`] — failures of individual control commands. These are
//!   never fatal: the dispatcher renders them into a protocol reply and the
//!   receive loop continues.
//!
//! Both types provide `as_label` helpers for logs.

use std::net::SocketAddr;
use std::path::PathBuf;

use thiserror::Error;

/// # Errors raised by the process runtime.
///
/// Everything here indicates a broken environment rather than a bad command:
/// an unbindable socket, an unreadable config file, a failed fork. Per the
/// propagation policy, only these may terminate the process.
#[non_exhaustive]
#[derive(Error, Debug)]
pub enum RuntimeError {
    /// The control socket could not be bound at startup.
    #[error("unable to bind UDP socket {addr}: {source}")]
    Bind {
        /// Address the bind was attempted on.
        addr: SocketAddr,
        /// The underlying socket error.
        source: std::io::Error,
    },

    /// The configured listen address is not a valid IP address.
    #[error("invalid listen address {addr:?}")]
    BadAddr {
        /// The offending address string from the config.
        addr: String,
    },

    /// Receiving from the control socket failed.
    #[error("receive failed: {source}")]
    Recv {
        /// The underlying socket error.
        source: std::io::Error,
    },

    /// Sending a response failed. An unreachable socket indicates a more
    /// serious environment failure, so this propagates out of the loop.
    #[error("send failed: {source}")]
    Send {
        /// The underlying socket error.
        source: std::io::Error,
    },

    /// The config file could not be read.
    #[error("unable to read config {path}: {source}")]
    ConfigRead {
        /// Path of the config file.
        path: PathBuf,
        /// The underlying I/O error.
        source: std::io::Error,
    },

    /// The config file is not valid JSON.
    #[error("unable to parse config {path}: {source}")]
    ConfigParse {
        /// Path of the config file.
        path: PathBuf,
        /// The underlying parse error.
        source: serde_json::Error,
    },

    /// Changing into the configured run directory failed.
    #[error("unable to enter run directory {path}: {source}")]
    Rundir {
        /// The configured run directory.
        path: PathBuf,
        /// The underlying I/O error.
        source: std::io::Error,
    },

    /// A fork/setsid/dup2 step of daemonization failed.
    #[error("daemonize: {op} failed: {source}")]
    Daemonize {
        /// Which syscall failed.
        op: &'static str,
        /// The underlying OS error.
        source: nix::Error,
    },

    /// A file needed for output redirection could not be opened.
    #[error("unable to open {path}: {source}")]
    LogFile {
        /// Path of the file (the log file or the null device).
        path: PathBuf,
        /// The underlying I/O error.
        source: std::io::Error,
    },

    /// The pid file could not be written.
    #[error("unable to write pid file {path}: {source}")]
    PidFile {
        /// Configured pid file path.
        path: PathBuf,
        /// The underlying I/O error.
        source: std::io::Error,
    },
}

impl RuntimeError {
    /// Returns a short stable label (snake_case) for use in logs.
    pub fn as_label(&self) -> &'static str {
        match self {
            RuntimeError::Bind { .. } => "runtime_bind",
            RuntimeError::BadAddr { .. } => "runtime_bad_addr",
            RuntimeError::Recv { .. } => "runtime_recv",
            RuntimeError::Send { .. } => "runtime_send",
            RuntimeError::ConfigRead { .. } => "runtime_config_read",
            RuntimeError::ConfigParse { .. } => "runtime_config_parse",
            RuntimeError::Rundir { .. } => "runtime_rundir",
            RuntimeError::Daemonize { .. } => "runtime_daemonize",
            RuntimeError::LogFile { .. } => "runtime_log_file",
            RuntimeError::PidFile { .. } => "runtime_pid_file",
        }
    }
}

/// # Errors raised by worker control commands.
///
/// These are reported back over the wire (alert level 5) and never
/// terminate anything. The `Display` strings are the wire reply texts, so
/// they keep the protocol's `Thread ...` vocabulary.
///
/// [`ControlError::JoinTimeout`] additionally disables auto-restart for the
/// worker as a safety measure against restart storms on a hung task.
#[non_exhaustive]
#[derive(Error, Debug)]
pub enum ControlError {
    /// The named worker does not exist.
    #[error("No such thread")]
    NoSuchWorker {
        /// The name that failed to resolve.
        name: String,
    },

    /// Start requested while a runtime is already executing.
    #[error("Thread {name} is already active.")]
    AlreadyActive {
        /// Worker name.
        name: String,
    },

    /// The runtime did not finish within the join grace period.
    #[error("Thread {name} could not be joined")]
    JoinTimeout {
        /// Worker name.
        name: String,
    },

    /// Spawning a fresh runtime failed.
    #[error("Thread {name} failed: {cause}")]
    SpawnFailed {
        /// Worker name.
        name: String,
        /// Human-readable cause.
        cause: String,
    },

    /// A command parameter was malformed or out of range.
    #[error("Thread {name} invalid {option} {value}")]
    InvalidArgument {
        /// Worker name.
        name: String,
        /// Which option the value was for.
        option: &'static str,
        /// The rejected value, verbatim.
        value: String,
    },

    /// The command verb is not one the dispatcher knows.
    #[error("Thread {name} invalid option")]
    InvalidOption {
        /// Worker name.
        name: String,
        /// The unrecognized verb.
        option: String,
    },
}

impl ControlError {
    /// Returns a short stable label (snake_case) for use in logs.
    pub fn as_label(&self) -> &'static str {
        match self {
            ControlError::NoSuchWorker { .. } => "no_such_worker",
            ControlError::AlreadyActive { .. } => "already_active",
            ControlError::JoinTimeout { .. } => "join_timeout",
            ControlError::SpawnFailed { .. } => "spawn_failed",
            ControlError::InvalidArgument { .. } => "invalid_argument",
            ControlError::InvalidOption { .. } => "invalid_option",
        }
    }
}
