//! # The receive-and-dispatch loop.
//!
//! [`Supervisor::next_command`] is where the control task spends its life:
//! blocked on the socket, interruptible by the shutdown token. Recognized
//! commands are handled in place; anything else is handed back to the
//! embedding application, which answers through [`Supervisor::respond`] —
//! the contract of a daemon that knows how to supervise but not what
//! domain it lives in.
//!
//! ## Trust boundary
//! `status`, `ack`, and `clear` are answered for any sender. Everything
//! else must come from a loopback address; non-local control attempts are
//! dropped without a response.
//!
//! ## Ordering
//! Datagrams are handled strictly in arrival order, one at a time. When a
//! status query selects an auto-restart candidate, the response goes out
//! first and the restart runs after — the querier sees the `6` that
//! explains the restart it just triggered.

use std::net::SocketAddr;

use tracing::{info, warn};

use crate::error::{ControlError, RuntimeError};
use crate::lifecycle;
use crate::proto::codec;
use crate::supervisor::core::Supervisor;

/// A command the supervisor did not recognize, handed to the embedding
/// application for domain-specific handling.
#[derive(Clone, Debug)]
pub struct OpaqueCommand {
    /// Sequence prefix to echo in the reply.
    pub seq: String,
    /// The command text, verbatim.
    pub body: String,
    /// Where it came from (always loopback).
    pub peer: SocketAddr,
}

/// What the dispatcher decided to do with one datagram.
enum Action {
    /// No response at all (empty body, non-local control, parse fault).
    Ignore,
    /// Send a single-line reply.
    Reply(String),
    /// Send a status frame, then maybe restart one dead worker.
    Status {
        frame: String,
        restart: Option<usize>,
    },
    /// Hand the command to the embedding application.
    Forward(OpaqueCommand),
}

impl Supervisor {
    /// Receives and dispatches datagrams until one needs the embedding
    /// application, or shutdown is requested.
    ///
    /// Returns `Ok(Some(_))` for an unrecognized command and `Ok(None)`
    /// once the shutdown token fires; the caller should then run
    /// [`Supervisor::shutdown`]. Malformed datagrams are dropped and the
    /// loop continues; send failures propagate.
    pub async fn next_command(&mut self) -> Result<Option<OpaqueCommand>, RuntimeError> {
        let mut buf = [0u8; 1024];
        loop {
            let (len, peer) = tokio::select! {
                _ = self.shutdown.cancelled() => {
                    info!("shutting down on signal");
                    return Ok(None);
                }
                res = self.sock.recv_from(&mut buf) => {
                    res.map_err(|source| RuntimeError::Recv { source })?
                }
            };

            match self.handle_datagram(&buf[..len], peer).await {
                Action::Ignore => {}
                Action::Reply(frame) => self.send(&frame, peer).await?,
                Action::Status { frame, restart } => {
                    self.send(&frame, peer).await?;
                    if let Some(idx) = restart {
                        self.restart_worker(idx).await;
                    }
                }
                Action::Forward(cmd) => return Ok(Some(cmd)),
            }
        }
    }

    /// Replies to an opaque command on behalf of the embedding
    /// application.
    pub async fn respond(
        &self,
        cmd: &OpaqueCommand,
        alert: u8,
        message: &str,
    ) -> Result<(), RuntimeError> {
        info!(command = %cmd.body, alert, "response sent");
        let frame = codec::encode_reply(&cmd.seq, alert, message);
        self.send(&frame, cmd.peer).await
    }

    /// Routes one parsed datagram. Everything that mutates workers runs
    /// here, on the control task, in arrival order.
    async fn handle_datagram(&mut self, buf: &[u8], peer: SocketAddr) -> Action {
        let Some(req) = codec::parse_request(buf) else {
            return Action::Ignore;
        };
        // An empty body is a receipt, not an error.
        if req.body.is_empty() {
            return Action::Ignore;
        }

        let mut body = req.body.clone();
        if body == "ack" || body == "clear" {
            self.clear_alert();
            body = "status".to_string();
        }

        // Status queries are answered for anyone.
        if body == "status" {
            let report = self.status_report();
            let frame = codec::encode_status(&req.seq, report.alert, &report.status, &report.lines);
            return Action::Status {
                frame,
                restart: report.restart,
            };
        }

        // Everything else crosses the trust boundary.
        if !peer.ip().is_loopback() {
            warn!(%peer, command = %body, "non-local control command ignored");
            return Action::Ignore;
        }

        if body == "newlog" || body == "rotate" {
            return Action::Reply(self.rotate_log(&req.seq));
        }

        info!(command = %body, "incoming command");
        match self.worker_command(&req.seq, &body).await {
            Some(action) => action,
            None => Action::Forward(OpaqueCommand {
                seq: req.seq,
                body,
                peer,
            }),
        }
    }

    fn rotate_log(&self, seq: &str) -> String {
        match lifecycle::reopen_log(&self.cfg) {
            Ok(()) => {
                info!(port = self.cfg.port, "continuing to accept requests");
                codec::encode_reply(seq, 0, "Okay")
            }
            Err(err) => {
                warn!(error = %err, "log rotation failed");
                codec::encode_reply(seq, 5, "Log rotation failed")
            }
        }
    }

    /// Parses and executes a `thread <name> <verb> [arg]` command.
    ///
    /// Returns `None` when the text is not a worker command at all (wrong
    /// keyword, or too few tokens) — those fall through to the embedding
    /// application as opaque commands.
    async fn worker_command(&mut self, seq: &str, body: &str) -> Option<Action> {
        let mut parts = body.split_whitespace();
        if parts.next() != Some("thread") {
            return None;
        }
        let name = parts.next()?.to_string();
        let verb = parts.next()?.to_string();
        let arg = parts.next().map(str::to_string);

        let frame = match self.dispatch_worker(&name, &verb, arg.as_deref()).await {
            Ok(message) => codec::encode_reply(seq, 2, &message),
            Err(err) => {
                warn!(worker = %name, error = %err.as_label(), "command failed");
                codec::encode_reply(seq, 5, &err.to_string())
            }
        };
        Some(Action::Reply(frame))
    }

    async fn dispatch_worker(
        &mut self,
        name: &str,
        verb: &str,
        arg: Option<&str>,
    ) -> Result<String, ControlError> {
        if self.worker(name).is_none() {
            return Err(ControlError::NoSuchWorker {
                name: name.to_string(),
            });
        }

        match verb {
            "start" => {
                self.start_worker(name)?;
                Ok(format!("Thread {name} started"))
            }
            "stop" | "terminate" => {
                self.stop_worker(name).await?;
                Ok(format!("Thread {name} stopped"))
            }
            "interval" => {
                let secs = parse_arg(name, "interval", arg)?;
                self.set_interval(name, secs)?;
                Ok(format!("Thread {name} interval set to {secs}"))
            }
            "maxcount" => {
                let count = parse_arg(name, "maxcount", arg)?;
                self.set_max_cycles(name, count)?;
                Ok(format!("Thread {name} maxcount set to {count}"))
            }
            _ => Err(ControlError::InvalidOption {
                name: name.to_string(),
                option: verb.to_string(),
            }),
        }
    }

    async fn send(&self, frame: &str, peer: SocketAddr) -> Result<(), RuntimeError> {
        self.sock
            .send_to(frame.as_bytes(), peer)
            .await
            .map_err(|source| RuntimeError::Send { source })?;
        Ok(())
    }
}

fn parse_arg(name: &str, option: &'static str, arg: Option<&str>) -> Result<i64, ControlError> {
    let value = arg.unwrap_or_default();
    value
        .parse()
        .map_err(|_| ControlError::InvalidArgument {
            name: name.to_string(),
            option,
            value: value.to_string(),
        })
}
