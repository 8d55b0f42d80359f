//! Binary entry point: argument parsing, logging, then the stdio server.

use std::process::ExitCode;

use clap::Parser;
use tracing_subscriber::EnvFilter;

use agent_desktop_daemon::{DaemonConfig, start_daemon};

/// Offscreen X11 desktop sessions for AI-agent UI testing.
///
/// Speaks line-delimited JSON-RPC on stdin/stdout; logs go to stderr.
#[derive(Parser, Debug)]
#[command(name = "agent-desktop", version)]
struct Args {
    /// Log filter, e.g. "info" or "agent_desktop_daemon=debug"
    /// (overrides AGENT_DESKTOP_LOG).
    #[arg(long)]
    log: Option<String>,

    /// Maximum number of concurrent sessions
    /// (overrides AGENT_DESKTOP_MAX_SESSIONS).
    #[arg(long)]
    max_sessions: Option<usize>,
}

fn main() -> ExitCode {
    let args = Args::parse();

    let filter = args
        .log
        .or_else(|| std::env::var("AGENT_DESKTOP_LOG").ok())
        .unwrap_or_else(|| "info".to_string());
    // stdout carries the RPC stream; all diagnostics go to stderr.
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(filter))
        .with_writer(std::io::stderr)
        .init();

    let mut config = DaemonConfig::from_env();
    if let Some(max) = args.max_sessions {
        config.max_sessions = max;
    }

    match start_daemon(config) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("agent-desktop: {}", e);
            ExitCode::FAILURE
        }
    }
}
