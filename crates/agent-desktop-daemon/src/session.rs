//! Session registry and lifecycle.
//!
//! A session is one isolated offscreen display: an Xvfb framebuffer bound
//! to a unique display number, an optional openbox window manager, and the
//! applications launched inside it. The manager owns every session and
//! guarantees that destroying one releases all of its operating-system
//! resources, in child-first order.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::Mutex;
use std::sync::RwLock;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use chrono::DateTime;
use chrono::Utc;
use tracing::{debug, info, warn};

use crate::config::DaemonConfig;
use crate::display::{DisplayAllocator, lock_path};
use crate::error::SessionError;
use crate::runner::{CommandRunner, ProcessHandle, display_env};
use crate::sleeper::Sleeper;

const READY_POLL_INTERVAL: Duration = Duration::from_millis(100);
const LOCK_FILE_SETTLE: Duration = Duration::from_millis(300);
const WINDOW_MANAGER_SETTLE: Duration = Duration::from_millis(200);

/// Unique identifier for a session. Minted as `s1`, `s2`, … for the
/// lifetime of the daemon process.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SessionId(String);

impl SessionId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for SessionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for SessionId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// An application started inside a session via exec.
///
/// Entries stay in the session's map after the process exits so that
/// `list` can report terminal status; they are only dropped when the
/// session is destroyed.
pub struct LaunchedProcess {
    pub pid: u32,
    pub command: String,
    handle: Box<dyn ProcessHandle>,
}

impl LaunchedProcess {
    /// Liveness is derived from the handle, never stored.
    pub fn alive(&mut self) -> bool {
        self.handle.is_running()
    }
}

pub struct Session {
    pub id: SessionId,
    pub display: u32,
    pub width: u32,
    pub height: u32,
    pub depth: u32,
    pub created_at: DateTime<Utc>,
    framebuffer: Box<dyn ProcessHandle>,
    window_manager: Option<Box<dyn ProcessHandle>>,
    processes: HashMap<u32, LaunchedProcess>,
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("id", &self.id)
            .field("display", &self.display)
            .field("width", &self.width)
            .field("height", &self.height)
            .field("depth", &self.depth)
            .field("created_at", &self.created_at)
            .field("processes", &self.processes.keys().collect::<Vec<_>>())
            .finish()
    }
}

impl Session {
    pub fn insert_process(&mut self, process: LaunchedProcess) {
        self.processes.insert(process.pid, process);
    }

    pub fn process_summaries(&mut self) -> Vec<ProcessSummary> {
        let mut summaries: Vec<ProcessSummary> = self
            .processes
            .values_mut()
            .map(|p| ProcessSummary {
                pid: p.pid,
                command: p.command.clone(),
                alive: p.alive(),
            })
            .collect();
        summaries.sort_by_key(|p| p.pid);
        summaries
    }

    /// Terminate everything this session owns: launched applications
    /// first, then the window manager, then the framebuffer. Reversing
    /// this order would have children racing a dead display.
    fn terminate_all(&mut self) {
        for process in self.processes.values_mut() {
            process.handle.terminate();
        }
        if let Some(wm) = self.window_manager.as_mut() {
            wm.terminate();
        }
        self.framebuffer.terminate();
    }
}

/// Parameters accepted by create.
#[derive(Debug, Clone)]
pub struct CreateOptions {
    pub width: u32,
    pub height: u32,
    pub depth: u32,
    pub window_manager: bool,
}

impl Default for CreateOptions {
    fn default() -> Self {
        Self {
            width: 1920,
            height: 1080,
            depth: 24,
            window_manager: true,
        }
    }
}

#[derive(Debug, Clone)]
pub struct ProcessSummary {
    pub pid: u32,
    pub command: String,
    pub alive: bool,
}

#[derive(Debug, Clone)]
pub struct SessionSummary {
    pub id: SessionId,
    pub display: u32,
    pub width: u32,
    pub height: u32,
    pub created_at: String,
    pub processes: Vec<ProcessSummary>,
}

pub struct SessionManager {
    sessions: RwLock<HashMap<SessionId, Arc<Mutex<Session>>>>,
    allocator: DisplayAllocator,
    next_session: AtomicU64,
    runner: Arc<dyn CommandRunner>,
    sleeper: Arc<dyn Sleeper>,
    config: DaemonConfig,
}

impl SessionManager {
    pub fn new(
        config: DaemonConfig,
        runner: Arc<dyn CommandRunner>,
        sleeper: Arc<dyn Sleeper>,
    ) -> Self {
        let allocator = DisplayAllocator::new(config.lock_dir.clone());
        Self {
            sessions: RwLock::new(HashMap::new()),
            allocator,
            next_session: AtomicU64::new(1),
            runner,
            sleeper,
            config,
        }
    }

    pub fn runner(&self) -> &Arc<dyn CommandRunner> {
        &self.runner
    }

    pub fn sleeper(&self) -> &Arc<dyn Sleeper> {
        &self.sleeper
    }

    fn mint_session_id(&self) -> SessionId {
        let n = self.next_session.fetch_add(1, Ordering::SeqCst);
        SessionId::new(format!("s{}", n))
    }

    /// Provision a new isolated display session.
    ///
    /// The session only becomes visible in the registry once the
    /// framebuffer has been observed ready; on any failure every process
    /// started here is terminated before the error is returned.
    pub fn create(&self, options: CreateOptions) -> Result<SessionSummary, SessionError> {
        {
            let sessions = self.sessions.read().unwrap_or_else(|e| e.into_inner());
            if sessions.len() >= self.config.max_sessions {
                return Err(SessionError::LimitReached(self.config.max_sessions));
            }
        }

        let display = self.allocator.allocate();
        let id = self.mint_session_id();
        let screen_spec = format!("{}x{}x{}", options.width, options.height, options.depth);

        let xvfb_args: Vec<String> = vec![
            format!(":{}", display),
            "-screen".into(),
            "0".into(),
            screen_spec,
            "-ac".into(),
            "+extension".into(),
            "GLX".into(),
            "+render".into(),
            "-noreset".into(),
        ];

        let mut framebuffer = self
            .runner
            .spawn_detached("Xvfb", &xvfb_args, &[])
            .map_err(|e| SessionError::InitFailed {
                display,
                reason: format!("failed to start Xvfb: {}", e),
            })?;

        let display_num = display;
        info!(session = %id, display = display_num, pid = framebuffer.pid(), "Framebuffer started");

        if let Err(e) = self.await_display_ready(display) {
            framebuffer.terminate();
            return Err(e);
        }

        let window_manager = if options.window_manager {
            match self
                .runner
                .spawn_detached("openbox", &[], &display_env(display))
            {
                Ok(wm) => {
                    self.sleeper.sleep(WINDOW_MANAGER_SETTLE);
                    debug!(session = %id, pid = wm.pid(), "Window manager started");
                    Some(wm)
                }
                Err(e) => {
                    // A missing or broken window manager is not fatal;
                    // the session works without one.
                    warn!(session = %id, error = %e, "Window manager failed to start");
                    None
                }
            }
        } else {
            None
        };

        let session = Session {
            id: id.clone(),
            display,
            width: options.width,
            height: options.height,
            depth: options.depth,
            created_at: Utc::now(),
            framebuffer,
            window_manager,
            processes: HashMap::new(),
        };

        let summary = SessionSummary {
            id: id.clone(),
            display,
            width: options.width,
            height: options.height,
            created_at: session.created_at.to_rfc3339(),
            processes: Vec::new(),
        };

        let mut sessions = self.sessions.write().unwrap_or_else(|e| e.into_inner());
        sessions.insert(id.clone(), Arc::new(Mutex::new(session)));
        let display_num = display;
        info!(session = %id, display = display_num, "Session ready");

        Ok(summary)
    }

    /// Poll the display until it answers, up to the configured ceiling.
    ///
    /// When the display-info probe is not installed, the appearance of the
    /// host lock file plus a short settle delay stands in for it.
    fn await_display_ready(&self, display: u32) -> Result<(), SessionError> {
        let deadline = Instant::now() + self.config.ready_timeout;
        let display_arg = format!(":{}", display);
        let probe_args: Vec<String> = vec!["-display".into(), display_arg];

        if !self.runner.tool_available("xdpyinfo") {
            loop {
                if lock_path(self.allocator.lock_dir(), display).exists() {
                    self.sleeper.sleep(LOCK_FILE_SETTLE);
                    return Ok(());
                }
                if Instant::now() >= deadline {
                    return Err(SessionError::InitFailed {
                        display,
                        reason: "no readiness probe and no lock file appeared".into(),
                    });
                }
                self.sleeper.sleep(READY_POLL_INTERVAL);
            }
        }

        loop {
            if self.runner.run("xdpyinfo", &probe_args, &[]).is_ok() {
                return Ok(());
            }
            if Instant::now() >= deadline {
                return Err(SessionError::InitFailed {
                    display,
                    reason: format!(
                        "display did not become ready within {}ms",
                        self.config.ready_timeout.as_millis()
                    ),
                });
            }
            self.sleeper.sleep(READY_POLL_INTERVAL);
        }
    }

    pub fn get(&self, session_id: &str) -> Result<Arc<Mutex<Session>>, SessionError> {
        let sessions = self.sessions.read().unwrap_or_else(|e| e.into_inner());
        sessions
            .get(&SessionId::from(session_id))
            .cloned()
            .ok_or_else(|| SessionError::NotFound(session_id.to_string()))
    }

    /// Resolve an optional identifier: an explicit id wins; otherwise the
    /// sole live session is implied. Zero or multiple sessions without an
    /// explicit id are caller errors.
    pub fn resolve(&self, session_id: Option<&str>) -> Result<Arc<Mutex<Session>>, SessionError> {
        match session_id {
            Some(id) => self.get(id),
            None => {
                let sessions = self.sessions.read().unwrap_or_else(|e| e.into_inner());
                match sessions.len() {
                    0 => Err(SessionError::NoSession),
                    1 => Ok(sessions.values().next().cloned().expect("len checked")),
                    _ => {
                        let mut ids: Vec<String> =
                            sessions.keys().map(|id| id.as_str().to_string()).collect();
                        ids.sort();
                        Err(SessionError::Ambiguous { ids })
                    }
                }
            }
        }
    }

    pub fn list(&self) -> Vec<SessionSummary> {
        let session_refs: Vec<Arc<Mutex<Session>>> = {
            let sessions = self.sessions.read().unwrap_or_else(|e| e.into_inner());
            sessions.values().cloned().collect()
        };

        let mut summaries: Vec<SessionSummary> = session_refs
            .into_iter()
            .map(|session| {
                let mut guard = session.lock().unwrap_or_else(|e| e.into_inner());
                SessionSummary {
                    id: guard.id.clone(),
                    display: guard.display,
                    width: guard.width,
                    height: guard.height,
                    created_at: guard.created_at.to_rfc3339(),
                    processes: guard.process_summaries(),
                }
            })
            .collect();
        summaries.sort_by(|a, b| a.id.as_str().cmp(b.id.as_str()));
        summaries
    }

    /// Launch an application inside a session.
    ///
    /// The child inherits the daemon's environment overlaid with the
    /// session's display selector, the Qt platform hint, and finally the
    /// caller's entries. A short probe window catches immediate failures
    /// (missing binary, dynamic-linker error, cannot-connect exits).
    pub fn exec(
        &self,
        session_id: Option<&str>,
        command: &str,
        args: &[String],
        extra_env: &[(String, String)],
    ) -> Result<(SessionId, u32), SessionError> {
        let session = self.resolve(session_id)?;
        let mut guard = session.lock().unwrap_or_else(|e| e.into_inner());

        let command_line = if args.is_empty() {
            command.to_string()
        } else {
            format!("{} {}", command, args.join(" "))
        };

        let mut env = display_env(guard.display);
        env.push(("QT_QPA_PLATFORM".to_string(), "xcb".to_string()));
        env.extend(extra_env.iter().cloned());

        let mut handle = self
            .runner
            .spawn_detached(command, args, &env)
            .map_err(|e| SessionError::LaunchFailed {
                command: command_line.clone(),
                reason: e.to_string(),
            })?;

        self.sleeper.sleep(self.config.spawn_probe);
        if let Some(status) = handle.try_status() {
            if !status.success() {
                return Err(SessionError::LaunchFailed {
                    command: command_line,
                    reason: format!("exited immediately with {}", status),
                });
            }
        }

        let pid = handle.pid();
        info!(session = %guard.id, pid, command = %command_line, "Process launched");
        guard.insert_process(LaunchedProcess {
            pid,
            command: command_line,
            handle,
        });

        Ok((guard.id.clone(), pid))
    }

    /// Tear down a session: applications, then window manager, then
    /// framebuffer. The registry entry goes away only after every
    /// termination has been attempted.
    pub fn destroy(&self, session_id: &str) -> Result<(), SessionError> {
        let session = self.get(session_id)?;
        {
            let mut guard = session.lock().unwrap_or_else(|e| e.into_inner());
            guard.terminate_all();
        }

        let mut sessions = self.sessions.write().unwrap_or_else(|e| e.into_inner());
        sessions.remove(&SessionId::from(session_id));
        info!(session = session_id, "Session destroyed");
        Ok(())
    }

    /// Destroy every live session, tolerating per-session failures.
    /// Safe to call repeatedly; wired to both signals and server close.
    pub fn destroy_all(&self) {
        let ids: Vec<String> = {
            let sessions = self.sessions.read().unwrap_or_else(|e| e.into_inner());
            sessions.keys().map(|id| id.as_str().to_string()).collect()
        };
        for id in ids {
            if let Err(e) = self.destroy(&id) {
                warn!(session = %id, error = %e, "Failed to destroy session during teardown");
            }
        }
    }

    pub fn session_count(&self) -> usize {
        self.sessions
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .len()
    }
}
