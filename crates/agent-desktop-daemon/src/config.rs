use std::env;
use std::path::PathBuf;
use std::time::Duration;

pub const DEFAULT_MAX_SESSIONS: usize = 16;
const DEFAULT_SPAWN_PROBE_MS: u64 = 100;
const DEFAULT_READY_TIMEOUT_MS: u64 = 5_000;
const DEFAULT_LOCK_DIR: &str = "/tmp";

#[derive(Debug, Clone)]
pub struct DaemonConfig {
    pub max_sessions: usize,
    /// How long exec waits for an immediate spawn failure before declaring
    /// the process launched. 100ms catches missing binaries and linker
    /// errors on common setups; tune upward on slow hosts.
    pub spawn_probe: Duration,
    /// Ceiling on the framebuffer readiness wait during create.
    pub ready_timeout: Duration,
    /// Directory holding X display lock files (`.X<N>-lock`).
    pub lock_dir: PathBuf,
}

impl Default for DaemonConfig {
    fn default() -> Self {
        Self::from_env()
    }
}

impl DaemonConfig {
    pub fn from_env() -> Self {
        Self {
            max_sessions: env::var("AGENT_DESKTOP_MAX_SESSIONS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(DEFAULT_MAX_SESSIONS),
            spawn_probe: Duration::from_millis(
                env::var("AGENT_DESKTOP_SPAWN_PROBE_MS")
                    .ok()
                    .and_then(|v| v.parse().ok())
                    .unwrap_or(DEFAULT_SPAWN_PROBE_MS),
            ),
            ready_timeout: Duration::from_millis(
                env::var("AGENT_DESKTOP_READY_TIMEOUT_MS")
                    .ok()
                    .and_then(|v| v.parse().ok())
                    .unwrap_or(DEFAULT_READY_TIMEOUT_MS),
            ),
            lock_dir: PathBuf::from(DEFAULT_LOCK_DIR),
        }
    }

    pub fn with_max_sessions(mut self, max: usize) -> Self {
        self.max_sessions = max;
        self
    }

    pub fn with_spawn_probe(mut self, probe: Duration) -> Self {
        self.spawn_probe = probe;
        self
    }

    pub fn with_ready_timeout(mut self, timeout: Duration) -> Self {
        self.ready_timeout = timeout;
        self
    }

    pub fn with_lock_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.lock_dir = dir.into();
        self
    }
}
