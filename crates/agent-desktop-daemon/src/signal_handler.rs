//! Signal-driven session teardown.
//!
//! A session leaks an Xvfb, an openbox and every launched application if
//! the daemon dies without cleaning up, so SIGINT and SIGTERM are handled
//! in two stages: the first signal raises the shutdown flag and lets the
//! server loop finish in-flight requests before destroying sessions; a
//! second signal stops waiting, destroys every session from the signal
//! thread and exits.

use signal_hook::consts::{SIGINT, SIGTERM};
use signal_hook::iterator::Signals;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::{self, JoinHandle};
use tracing::{info, warn};

use crate::server::DaemonError;
use crate::session::SessionManager;

pub struct SignalHandler {
    #[allow(dead_code)]
    handle: JoinHandle<()>,
}

impl SignalHandler {
    pub fn setup(
        shutdown: Arc<AtomicBool>,
        manager: Arc<SessionManager>,
    ) -> Result<Self, DaemonError> {
        let mut signals =
            Signals::new([SIGINT, SIGTERM]).map_err(|e| DaemonError::SignalSetup(e.to_string()))?;

        let handle = thread::Builder::new()
            .name("signal-teardown".to_string())
            .spawn(move || {
                for sig in signals.forever() {
                    if !shutdown.swap(true, Ordering::SeqCst) {
                        info!(
                            signal = sig,
                            sessions = manager.session_count(),
                            "Received signal, draining requests before destroying sessions"
                        );
                        continue;
                    }
                    // Repeated signal while the drain is still running:
                    // the operator wants out now.
                    warn!(
                        signal = sig,
                        sessions = manager.session_count(),
                        "Second signal, destroying sessions immediately"
                    );
                    manager.destroy_all();
                    std::process::exit(130);
                }
            })
            .map_err(|e| {
                DaemonError::SignalSetup(format!("failed to spawn signal-teardown thread: {}", e))
            })?;

        Ok(Self { handle })
    }
}
