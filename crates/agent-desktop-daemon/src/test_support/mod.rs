//! Test doubles for exercising the core without an X server.
//!
//! `RecordingRunner` implements [`CommandRunner`] by recording every
//! invocation and returning scripted results, and hands out fake process
//! handles whose terminations are observable in order.

use std::collections::HashMap;
use std::collections::VecDeque;
use std::process::ExitStatus;
use std::sync::Arc;
use std::sync::Mutex;
use std::sync::atomic::{AtomicU32, Ordering};

use crate::error::SessionError;
use crate::runner::{CommandRunner, ProcessHandle, ToolOutput};

#[derive(Debug, Clone)]
pub struct RecordedCall {
    pub program: String,
    pub args: Vec<String>,
    pub env: Vec<(String, String)>,
    /// Set for spawn_detached calls.
    pub pid: Option<u32>,
}

struct ScriptedRun {
    program: String,
    /// Matches the first argv element when set (xdotool subcommands).
    arg0: Option<String>,
    result: Result<ToolOutput, SessionError>,
}

type RunHook = Box<dyn Fn(&str, &[String]) + Send + Sync>;

#[derive(Default)]
pub struct RecordingRunner {
    runs: Mutex<Vec<RecordedCall>>,
    spawns: Mutex<Vec<RecordedCall>>,
    scripted_runs: Mutex<VecDeque<ScriptedRun>>,
    failing_runs: Mutex<Vec<String>>,
    failing_spawns: Mutex<Vec<String>>,
    immediate_exits: Mutex<HashMap<String, i32>>,
    unavailable_tools: Mutex<Vec<String>>,
    run_hook: Mutex<Option<RunHook>>,
    terminations: Arc<Mutex<Vec<u32>>>,
    next_pid: AtomicU32,
}

impl RecordingRunner {
    pub fn new() -> Self {
        Self {
            next_pid: AtomicU32::new(1000),
            ..Self::default()
        }
    }

    /// Queue a result for the next run of `program` (optionally matching
    /// its first argument, e.g. an xdotool subcommand).
    pub fn script_run(
        &self,
        program: &str,
        arg0: Option<&str>,
        result: Result<&str, SessionError>,
    ) {
        self.scripted_runs.lock().unwrap().push_back(ScriptedRun {
            program: program.to_string(),
            arg0: arg0.map(String::from),
            result: result.map(|stdout| ToolOutput {
                stdout: stdout.to_string(),
            }),
        });
    }

    /// Every run of `program` fails (readiness-probe never succeeds).
    pub fn fail_runs_forever(&self, program: &str) {
        self.failing_runs.lock().unwrap().push(program.to_string());
    }

    /// spawn_detached of `program` fails with ENOENT.
    pub fn fail_spawn(&self, program: &str) {
        self.failing_spawns
            .lock()
            .unwrap()
            .push(program.to_string());
    }

    /// spawn_detached of `program` succeeds but the process exits at once
    /// with the given code.
    pub fn exit_spawn_immediately(&self, program: &str, code: i32) {
        self.immediate_exits
            .lock()
            .unwrap()
            .insert(program.to_string(), code);
    }

    pub fn set_tool_available(&self, program: &str, available: bool) {
        let mut unavailable = self.unavailable_tools.lock().unwrap();
        if available {
            unavailable.retain(|p| p != program);
        } else if !unavailable.iter().any(|p| p == program) {
            unavailable.push(program.to_string());
        }
    }

    /// Invoked for every run before the scripted result resolves; lets a
    /// test emulate side effects such as ffmpeg writing its output file.
    pub fn set_run_hook(&self, hook: impl Fn(&str, &[String]) + Send + Sync + 'static) {
        *self.run_hook.lock().unwrap() = Some(Box::new(hook));
    }

    pub fn run_calls(&self, program: &str) -> Vec<RecordedCall> {
        self.runs
            .lock()
            .unwrap()
            .iter()
            .filter(|c| c.program == program)
            .cloned()
            .collect()
    }

    pub fn spawned_programs(&self) -> Vec<String> {
        self.spawns
            .lock()
            .unwrap()
            .iter()
            .map(|c| c.program.clone())
            .collect()
    }

    pub fn find_spawn(&self, program: &str) -> Option<RecordedCall> {
        self.spawns
            .lock()
            .unwrap()
            .iter()
            .find(|c| c.program == program)
            .cloned()
    }

    /// Pids in the order their handles were terminated.
    pub fn terminated_pids(&self) -> Vec<u32> {
        self.terminations.lock().unwrap().clone()
    }
}

impl CommandRunner for RecordingRunner {
    fn run(
        &self,
        program: &str,
        args: &[String],
        env: &[(String, String)],
    ) -> Result<ToolOutput, SessionError> {
        self.runs.lock().unwrap().push(RecordedCall {
            program: program.to_string(),
            args: args.to_vec(),
            env: env.to_vec(),
            pid: None,
        });

        if let Some(hook) = self.run_hook.lock().unwrap().as_ref() {
            hook(program, args);
        }

        if self.failing_runs.lock().unwrap().iter().any(|p| p == program) {
            return Err(SessionError::ToolFailed {
                tool: program.to_string(),
                stderr: "scripted failure".to_string(),
            });
        }

        let mut scripted = self.scripted_runs.lock().unwrap();
        let position = scripted.iter().position(|s| {
            s.program == program
                && s.arg0
                    .as_deref()
                    .map(|a| args.first().map(String::as_str) == Some(a))
                    .unwrap_or(true)
        });
        if let Some(index) = position {
            let entry = scripted.remove(index).expect("position valid");
            return entry.result;
        }

        Ok(ToolOutput {
            stdout: String::new(),
        })
    }

    fn spawn_detached(
        &self,
        program: &str,
        args: &[String],
        env: &[(String, String)],
    ) -> std::io::Result<Box<dyn ProcessHandle>> {
        if self
            .failing_spawns
            .lock()
            .unwrap()
            .iter()
            .any(|p| p == program)
        {
            return Err(std::io::Error::from_raw_os_error(libc::ENOENT));
        }

        let pid = self.next_pid.fetch_add(1, Ordering::SeqCst);
        self.spawns.lock().unwrap().push(RecordedCall {
            program: program.to_string(),
            args: args.to_vec(),
            env: env.to_vec(),
            pid: Some(pid),
        });

        let status = self
            .immediate_exits
            .lock()
            .unwrap()
            .get(program)
            .map(|code| exit_status(*code));

        Ok(Box::new(FakeProcess {
            pid,
            status,
            terminations: Arc::clone(&self.terminations),
        }))
    }

    fn tool_available(&self, program: &str) -> bool {
        !self
            .unavailable_tools
            .lock()
            .unwrap()
            .iter()
            .any(|p| p == program)
    }
}

fn exit_status(code: i32) -> ExitStatus {
    use std::os::unix::process::ExitStatusExt;
    ExitStatus::from_raw(code << 8)
}

struct FakeProcess {
    pid: u32,
    status: Option<ExitStatus>,
    terminations: Arc<Mutex<Vec<u32>>>,
}

impl ProcessHandle for FakeProcess {
    fn pid(&self) -> u32 {
        self.pid
    }

    fn try_status(&mut self) -> Option<ExitStatus> {
        self.status
    }

    fn terminate(&mut self) {
        if self.status.is_none() {
            self.status = Some(exit_status(0));
        }
        self.terminations.lock().unwrap().push(self.pid);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scripted_run_matches_subcommand() {
        let runner = RecordingRunner::new();
        runner.script_run("xdotool", Some("getwindowname"), Ok("hello"));
        runner.script_run("xdotool", Some("search"), Ok("0x1"));

        let out = runner
            .run("xdotool", &["search".to_string()], &[])
            .unwrap();
        assert_eq!(out.stdout, "0x1");

        let out = runner
            .run("xdotool", &["getwindowname".to_string()], &[])
            .unwrap();
        assert_eq!(out.stdout, "hello");
    }

    #[test]
    fn test_unscripted_run_returns_empty_stdout() {
        let runner = RecordingRunner::new();
        let out = runner.run("xdpyinfo", &[], &[]).unwrap();
        assert_eq!(out.stdout, "");
    }

    #[test]
    fn test_immediate_exit_status_has_code() {
        let status = exit_status(127);
        assert_eq!(status.code(), Some(127));
        assert!(!status.success());
    }
}
