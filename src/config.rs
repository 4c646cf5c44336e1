//! # Process configuration.
//!
//! [`Config`] is read once at startup from a JSON file and covers the
//! process-level knobs: listen address/port, run directory, log file, pid
//! file, and the join grace period used when stopping workers.
//!
//! Every field has a default, so a partial (or missing) file is fine:
//!
//! ```json
//! {
//!     "addr":    "",
//!     "port":    2680,
//!     "rundir":  "/var/tmp",
//!     "logfile": "warden.log",
//!     "pidfile": "/var/run/warden.pid"
//! }
//! ```

use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;

use crate::error::RuntimeError;

/// Process-level configuration, consumed once at startup.
///
/// ## Field semantics
/// - `addr`: listen address; empty string means all interfaces
/// - `port`: UDP control port (default 2680)
/// - `rundir`: directory the process changes into
/// - `logfile`: file stdout/stderr are redirected to when daemonized,
///   reopened by the `newlog`/`rotate` command
/// - `pidfile`: written on daemonization, removed on clean exit
/// - `grace_secs`: bound on every runtime join (stop, restart, shutdown)
#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Listen address; empty means unspecified (all interfaces).
    pub addr: String,
    /// UDP control port.
    pub port: u16,
    /// Directory to change into at startup.
    pub rundir: PathBuf,
    /// Log file for redirected output.
    pub logfile: PathBuf,
    /// Pid file path, used only when daemonizing.
    pub pidfile: PathBuf,
    /// Join grace period in seconds.
    pub grace_secs: u64,
}

impl Default for Config {
    /// Defaults match the reference deployment: any interface, port 2680,
    /// `/var/tmp` as the run directory, and a 10 second join grace.
    fn default() -> Self {
        Self {
            addr: String::new(),
            port: 2680,
            rundir: PathBuf::from("/var/tmp"),
            logfile: PathBuf::from("warden.log"),
            pidfile: PathBuf::from("/var/run/warden.pid"),
            grace_secs: 10,
        }
    }
}

impl Config {
    /// Loads configuration from a JSON file.
    ///
    /// Missing fields fall back to their defaults; unknown fields are
    /// ignored.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, RuntimeError> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path).map_err(|source| RuntimeError::ConfigRead {
            path: path.to_path_buf(),
            source,
        })?;
        serde_json::from_str(&raw).map_err(|source| RuntimeError::ConfigParse {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Returns the join grace period as a [`Duration`].
    #[inline]
    pub fn grace(&self) -> Duration {
        Duration::from_secs(self.grace_secs)
    }

    /// Resolves the configured address/port into a bindable socket address.
    ///
    /// An empty `addr` binds all interfaces.
    pub fn socket_addr(&self) -> Result<SocketAddr, RuntimeError> {
        let ip = if self.addr.is_empty() {
            IpAddr::V4(Ipv4Addr::UNSPECIFIED)
        } else {
            self.addr.parse().map_err(|_| RuntimeError::BadAddr {
                addr: self.addr.clone(),
            })?
        };
        Ok(SocketAddr::new(ip, self.port))
    }
}
