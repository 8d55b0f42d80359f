//! Uniform subprocess invocation.
//!
//! Every external tool goes through [`CommandRunner`]: short commands
//! (input synthesis, window queries, capture probes) are run to completion
//! under a hard timeout, long-lived servers and applications are spawned
//! detached and handed back as [`ProcessHandle`]s for later termination.
//!
//! Arguments are always list-form: each argv element reaches the child
//! exactly as given, nothing is ever routed through a shell. User text is
//! user text, never command syntax.

use std::io::Read;
use std::process::{Child, Command, ExitStatus, Stdio};
use std::time::{Duration, Instant};

use tracing::debug;

use crate::error::SessionError;

/// Hard ceiling for short tool invocations.
pub const SHORT_TOOL_TIMEOUT: Duration = Duration::from_secs(5);
const EXIT_POLL_INTERVAL: Duration = Duration::from_millis(10);
const TERMINATE_GRACE: Duration = Duration::from_millis(500);
const TERMINATE_POLL_INTERVAL: Duration = Duration::from_millis(25);

/// Captured output of a completed short command.
#[derive(Debug, Clone)]
pub struct ToolOutput {
    pub stdout: String,
}

/// Environment overlay selecting a session's display.
pub fn display_env(display: u32) -> Vec<(String, String)> {
    vec![("DISPLAY".to_string(), format!(":{}", display))]
}

/// A long-lived child owned by a session.
pub trait ProcessHandle: Send {
    fn pid(&self) -> u32;

    /// `None` while the process is still running.
    fn try_status(&mut self) -> Option<ExitStatus>;

    /// Best-effort termination: SIGTERM, a short grace period, then SIGKILL.
    /// Already-dead processes are tolerated silently.
    fn terminate(&mut self);

    fn is_running(&mut self) -> bool {
        self.try_status().is_none()
    }
}

impl ProcessHandle for Child {
    fn pid(&self) -> u32 {
        self.id()
    }

    fn try_status(&mut self) -> Option<ExitStatus> {
        use std::os::unix::process::ExitStatusExt;
        match self.try_wait() {
            Ok(status) => status,
            // A wait error means the child was already reaped elsewhere;
            // treat it as exited with an unknown status.
            Err(_) => Some(ExitStatus::from_raw(0)),
        }
    }

    fn terminate(&mut self) {
        if self.try_status().is_some() {
            return;
        }
        let pid = self.id() as i32;
        debug!(pid, "Terminating child process");
        unsafe {
            libc::kill(pid, libc::SIGTERM);
        }
        let deadline = Instant::now() + TERMINATE_GRACE;
        while Instant::now() < deadline {
            if self.try_status().is_some() {
                return;
            }
            std::thread::sleep(TERMINATE_POLL_INTERVAL);
        }
        let _ = self.kill();
        let _ = self.wait();
    }
}

/// The seam between the core and the operating system.
///
/// Production uses [`SystemRunner`]; tests substitute a recording double
/// (see `test_support`) to assert argv/env contracts without an X server.
pub trait CommandRunner: Send + Sync {
    /// Run a short command to completion, capturing stdout.
    ///
    /// Nonzero exit maps to `ToolFailed` with trimmed stderr; exceeding
    /// [`SHORT_TOOL_TIMEOUT`] kills the child and maps to `Timeout`.
    fn run(
        &self,
        program: &str,
        args: &[String],
        env: &[(String, String)],
    ) -> Result<ToolOutput, SessionError>;

    /// Spawn a long-lived process detached, with stdio discarded.
    fn spawn_detached(
        &self,
        program: &str,
        args: &[String],
        env: &[(String, String)],
    ) -> std::io::Result<Box<dyn ProcessHandle>>;

    /// Whether `program` resolves on PATH. Lets the readiness wait pick
    /// its degraded path when the display-info probe is not installed.
    fn tool_available(&self, program: &str) -> bool;
}

#[derive(Debug, Default)]
pub struct SystemRunner;

impl SystemRunner {
    pub fn new() -> Self {
        Self
    }
}

impl CommandRunner for SystemRunner {
    fn run(
        &self,
        program: &str,
        args: &[String],
        env: &[(String, String)],
    ) -> Result<ToolOutput, SessionError> {
        let mut cmd = Command::new(program);
        cmd.args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());
        for (key, value) in env {
            cmd.env(key, value);
        }

        let mut child = cmd.spawn().map_err(|e| SessionError::ToolFailed {
            tool: program.to_string(),
            stderr: e.to_string(),
        })?;

        let deadline = Instant::now() + SHORT_TOOL_TIMEOUT;
        let status = loop {
            match child.try_wait() {
                Ok(Some(status)) => break status,
                Ok(None) => {
                    if Instant::now() >= deadline {
                        let _ = child.kill();
                        let _ = child.wait();
                        return Err(SessionError::Timeout {
                            tool: program.to_string(),
                            timeout_ms: SHORT_TOOL_TIMEOUT.as_millis() as u64,
                        });
                    }
                    std::thread::sleep(EXIT_POLL_INTERVAL);
                }
                Err(e) => {
                    return Err(SessionError::ToolFailed {
                        tool: program.to_string(),
                        stderr: e.to_string(),
                    });
                }
            }
        };

        let mut stdout = String::new();
        if let Some(mut pipe) = child.stdout.take() {
            let _ = pipe.read_to_string(&mut stdout);
        }

        if status.success() {
            Ok(ToolOutput { stdout })
        } else {
            let mut stderr = String::new();
            if let Some(mut pipe) = child.stderr.take() {
                let _ = pipe.read_to_string(&mut stderr);
            }
            Err(SessionError::ToolFailed {
                tool: program.to_string(),
                stderr: stderr.trim().to_string(),
            })
        }
    }

    fn spawn_detached(
        &self,
        program: &str,
        args: &[String],
        env: &[(String, String)],
    ) -> std::io::Result<Box<dyn ProcessHandle>> {
        let mut cmd = Command::new(program);
        cmd.args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null());
        for (key, value) in env {
            cmd.env(key, value);
        }
        let child = cmd.spawn()?;
        debug!(program, pid = child.id(), "Spawned detached process");
        Ok(Box::new(child))
    }

    fn tool_available(&self, program: &str) -> bool {
        std::env::var_os("PATH")
            .map(|paths| {
                std::env::split_paths(&paths).any(|dir| dir.join(program).is_file())
            })
            .unwrap_or(false)
    }
}
