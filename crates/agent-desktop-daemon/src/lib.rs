#![deny(clippy::all)]

//! Control plane for isolated offscreen X11 desktop sessions.
//!
//! Each session is an Xvfb framebuffer on its own display number, an
//! optional openbox window manager and the applications launched inside
//! it. Clients drive sessions over line-delimited JSON-RPC on stdio:
//! keyboard and mouse synthesis through xdotool, screenshots through
//! ffmpeg, window queries, and guaranteed teardown on destroy, disconnect
//! or signal.

pub mod capture;
mod config;
mod display;
mod error;
pub mod handlers;
mod metrics;
pub mod input;
mod runner;
mod server;
mod session;
mod signal_handler;
mod sleeper;
pub mod windows;

#[cfg(test)]
mod test_support;

pub use config::DEFAULT_MAX_SESSIONS;
pub use config::DaemonConfig;
pub use display::DisplayAllocator;
pub use error::SessionError;
pub use error::session_error_response;
pub use metrics::DaemonMetrics;
pub use runner::CommandRunner;
pub use runner::ProcessHandle;
pub use runner::SHORT_TOOL_TIMEOUT;
pub use runner::SystemRunner;
pub use runner::ToolOutput;
pub use server::DaemonError;
pub use server::DaemonServer;
pub use server::serve;
pub use server::start_daemon;
pub use session::CreateOptions;
pub use session::LaunchedProcess;
pub use session::ProcessSummary;
pub use session::Session;
pub use session::SessionId;
pub use session::SessionManager;
pub use session::SessionSummary;
pub use signal_handler::SignalHandler;
pub use sleeper::MockSleeper;
pub use sleeper::RealSleeper;
pub use sleeper::Sleeper;
pub use windows::WindowInfo;

pub type Result<T> = std::result::Result<T, SessionError>;
