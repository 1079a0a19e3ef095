//! External process execution
//!
//! Provides:
//! - A narrow [`ProcessRunner`] trait the lifecycle controller talks through
//! - Cancellable, deadline-bounded run contexts
//! - A system runner that kills the whole process group on cancellation

use crate::error::{Error, Result};
use nix::sys::signal::{Signal, killpg};
use nix::unistd::Pid;
use std::io::Read;
use std::os::unix::process::{CommandExt, ExitStatusExt};
use std::process::{Child, Command, Stdio};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

/// Captured output of a successful command
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Output {
    pub stdout: String,
    pub stderr: String,
}

/// Shared flag used to cancel in-flight commands from another thread
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Cancellation and deadline for a single operation
#[derive(Debug, Clone, Default)]
pub struct RunContext {
    cancel: CancelToken,
    deadline: Option<Instant>,
    timeout: Option<Duration>,
}

impl RunContext {
    /// Context with no deadline that is never cancelled unless its token is
    pub fn background() -> Self {
        Self::default()
    }

    /// Context that expires `timeout` from now
    pub fn with_timeout(timeout: Duration) -> Self {
        Self {
            cancel: CancelToken::new(),
            deadline: Some(Instant::now() + timeout),
            timeout: Some(timeout),
        }
    }

    /// Share an existing cancellation token
    pub fn with_cancel(mut self, token: CancelToken) -> Self {
        self.cancel = token;
        self
    }

    pub fn cancel_token(&self) -> CancelToken {
        self.cancel.clone()
    }

    /// Reason the operation must stop, if any
    pub fn done(&self) -> Option<String> {
        if self.cancel.is_cancelled() {
            return Some("cancelled".to_string());
        }
        match (self.deadline, self.timeout) {
            (Some(deadline), Some(timeout)) if Instant::now() >= deadline => Some(format!(
                "deadline exceeded after {}ms",
                timeout.as_millis()
            )),
            _ => None,
        }
    }
}

/// Runs external programs to completion
pub trait ProcessRunner: Send + Sync {
    /// Run `command` with `args`, blocking until it exits
    ///
    /// Non-zero exit, signal death and missing binaries are errors; so is
    /// cancellation of `ctx`, which must not leave the child running.
    fn run(&self, command: &str, args: &[String], ctx: &RunContext) -> Result<Output>;
}

/// Runner backed by `std::process::Command`
#[derive(Debug, Clone)]
pub struct SystemRunner {
    poll: Duration,
}

impl Default for SystemRunner {
    fn default() -> Self {
        Self {
            poll: Duration::from_millis(50),
        }
    }
}

impl SystemRunner {
    pub fn new() -> Self {
        Self::default()
    }
}

impl ProcessRunner for SystemRunner {
    fn run(&self, command: &str, args: &[String], ctx: &RunContext) -> Result<Output> {
        if let Some(reason) = ctx.done() {
            return Err(cancelled(command, reason));
        }

        tracing::debug!(command, ?args, "spawning");

        // Own process group so cancellation reaches grandchildren too
        let mut child = Command::new(command)
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .process_group(0)
            .spawn()
            .map_err(|e| match e.kind() {
                std::io::ErrorKind::NotFound => Error::CommandNotFound {
                    command: command.to_string(),
                },
                _ => Error::CommandFailed {
                    command: command.to_string(),
                    message: e.to_string(),
                },
            })?;

        let stdout = child.stdout.take().map(drain);
        let stderr = child.stderr.take().map(drain);

        let status = loop {
            match child.try_wait() {
                Ok(Some(status)) => break status,
                Ok(None) => {
                    if let Some(reason) = ctx.done() {
                        kill_group(&mut child, command);
                        let _ = child.wait();
                        return Err(cancelled(command, reason));
                    }
                    thread::sleep(self.poll);
                }
                Err(e) => {
                    return Err(Error::CommandFailed {
                        command: command.to_string(),
                        message: format!("Failed to wait on process: {}", e),
                    });
                }
            }
        };

        // Background grandchildren can hold the pipes open after the child exits
        while !finished(&stdout) || !finished(&stderr) {
            if let Some(reason) = ctx.done() {
                kill_group(&mut child, command);
                return Err(cancelled(command, reason));
            }
            thread::sleep(self.poll);
        }

        let output = Output {
            stdout: collect(stdout),
            stderr: collect(stderr),
        };

        if status.success() {
            return Ok(output);
        }

        let stderr = output.stderr.trim().to_string();
        match (status.code(), status.signal()) {
            (Some(code), _) => Err(Error::CommandExited {
                command: command.to_string(),
                code,
                stderr,
            }),
            (None, Some(signal)) => Err(Error::CommandSignaled {
                command: command.to_string(),
                signal,
                stderr,
            }),
            (None, None) => Err(Error::CommandFailed {
                command: command.to_string(),
                message: format!("unknown exit status: {}", status),
            }),
        }
    }
}

/// SIGKILL the child's process group, falling back to the child alone
fn kill_group(child: &mut Child, command: &str) {
    let pgid = Pid::from_raw(child.id() as i32);
    if let Err(e) = killpg(pgid, Signal::SIGKILL) {
        tracing::warn!(command, error = %e, "killpg failed, killing child only");
        let _ = child.kill();
    }
}

fn cancelled(command: &str, reason: String) -> Error {
    tracing::debug!(command, %reason, "command cancelled");
    Error::Cancelled {
        command: command.to_string(),
        reason,
    }
}

/// Read a pipe to the end on a helper thread so the child never blocks on it
fn drain<R: Read + Send + 'static>(mut pipe: R) -> JoinHandle<Vec<u8>> {
    thread::spawn(move || {
        let mut buf = Vec::new();
        let _ = pipe.read_to_end(&mut buf);
        buf
    })
}

fn finished(handle: &Option<JoinHandle<Vec<u8>>>) -> bool {
    handle.as_ref().is_none_or(JoinHandle::is_finished)
}

fn collect(handle: Option<JoinHandle<Vec<u8>>>) -> String {
    handle
        .map(|h| h.join().unwrap_or_default())
        .map(|buf| String::from_utf8_lossy(&buf).into_owned())
        .unwrap_or_default()
}


#[cfg(test)]
mod tests {
    use super::*;

    fn sh(script: &str) -> Vec<String> {
        vec!["-c".to_string(), script.to_string()]
    }

    #[test]
    fn test_captures_stdout() {
        let out = SystemRunner::new()
            .run("/bin/sh", &sh("echo 42; echo oops >&2"), &RunContext::background())
            .unwrap();
        assert_eq!(out.stdout, "42\n");
        assert_eq!(out.stderr, "oops\n");
    }

    #[test]
    fn test_missing_binary() {
        let err = SystemRunner::new()
            .run("/nonexistent/jail", &[], &RunContext::background())
            .unwrap_err();
        assert!(matches!(err, Error::CommandNotFound { .. }));
    }

    #[test]
    fn test_nonzero_exit() {
        let err = SystemRunner::new()
            .run("/bin/sh", &sh("echo bad >&2; exit 3"), &RunContext::background())
            .unwrap_err();
        match err {
            Error::CommandExited { code, stderr, .. } => {
                assert_eq!(code, 3);
                assert_eq!(stderr, "bad");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_signal_death() {
        let err = SystemRunner::new()
            .run("/bin/sh", &sh("kill -9 $$"), &RunContext::background())
            .unwrap_err();
        assert!(matches!(err, Error::CommandSignaled { signal: 9, .. }));
    }

    #[test]
    fn test_timeout_kills_process_group() {
        let start = Instant::now();
        let ctx = RunContext::with_timeout(Duration::from_millis(200));
        // The backgrounded sleep keeps stdout open unless the group dies
        let err = SystemRunner::new()
            .run("/bin/sh", &sh("sleep 10 & wait"), &ctx)
            .unwrap_err();

        assert!(matches!(err, Error::Cancelled { .. }));
        assert!(start.elapsed() < Duration::from_secs(5));
    }

    #[test]
    fn test_timeout_with_background_grandchild() {
        let start = Instant::now();
        let ctx = RunContext::with_timeout(Duration::from_millis(200));
        // The shell exits at once; its sleep keeps the pipes open
        let err = SystemRunner::new()
            .run("/bin/sh", &sh("sleep 4 & echo 7"), &ctx)
            .unwrap_err();

        assert!(matches!(err, Error::Cancelled { ref reason, .. } if reason.starts_with("deadline")));
        assert!(start.elapsed() < Duration::from_secs(2));
    }

    #[test]
    fn test_background_grandchild_that_closes_pipes() {
        let ctx = RunContext::with_timeout(Duration::from_secs(5));
        let out = SystemRunner::new()
            .run("/bin/sh", &sh("sleep 4 >/dev/null 2>&1 & echo 7"), &ctx)
            .unwrap();
        assert_eq!(out.stdout, "7\n");
    }

    #[test]
    fn test_cancel_before_spawn() {
        let ctx = RunContext::background();
        ctx.cancel_token().cancel();
        let err = SystemRunner::new()
            .run("/nonexistent/jail", &[], &ctx)
            .unwrap_err();
        assert!(matches!(err, Error::Cancelled { ref reason, .. } if reason == "cancelled"));
    }

    #[test]
    fn test_cancel_from_other_thread() {
        let token = CancelToken::new();
        let ctx = RunContext::background().with_cancel(token.clone());
        let canceller = thread::spawn(move || {
            thread::sleep(Duration::from_millis(100));
            token.cancel();
        });

        let err = SystemRunner::new()
            .run("/bin/sh", &sh("sleep 10"), &ctx)
            .unwrap_err();
        canceller.join().unwrap();
        assert!(matches!(err, Error::Cancelled { .. }));
    }
}
