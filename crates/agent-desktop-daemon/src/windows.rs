//! Window enumeration and wait-for-window polling.
//!
//! Queries are snapshots: a window listed by the search may be gone by
//! the time its geometry is fetched, so per-window failures drop that
//! window rather than failing the query.

use std::time::{Duration, Instant};

use tracing::debug;

use crate::runner::{CommandRunner, display_env};
use crate::sleeper::Sleeper;

const XDOTOOL: &str = "xdotool";
const WINDOW_POLL_INTERVAL: Duration = Duration::from_millis(250);

pub const DEFAULT_WAIT_TIMEOUT_MS: u64 = 10_000;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WindowInfo {
    pub window_id: String,
    pub name: String,
    pub x: i64,
    pub y: i64,
    pub width: i64,
    pub height: i64,
}

/// Search argv for an optional title pattern. Without a pattern the
/// search is restricted to visible windows so window-manager internals
/// stay out of the results; the empty name matches everything else.
pub fn search_args(pattern: Option<&str>) -> Vec<String> {
    match pattern {
        Some(p) => vec!["search".into(), "--name".into(), p.to_string()],
        None => vec![
            "search".into(),
            "--onlyvisible".into(),
            "--name".into(),
            String::new(),
        ],
    }
}

/// Snapshot the windows on a display, in search order.
///
/// Never raises: a failed search yields the empty list, and windows whose
/// geometry or name cannot be fetched are skipped.
pub fn find_windows(
    runner: &dyn CommandRunner,
    display: u32,
    pattern: Option<&str>,
) -> Vec<WindowInfo> {
    let env = display_env(display);
    let output = match runner.run(XDOTOOL, &search_args(pattern), &env) {
        Ok(output) => output,
        Err(e) => {
            let display_num = display;
            debug!(display = display_num, error = %e, "Window search failed");
            return Vec::new();
        }
    };

    let mut windows = Vec::new();
    for id in output.stdout.lines().map(str::trim).filter(|l| !l.is_empty()) {
        let geometry_args: Vec<String> = vec![
            "getwindowgeometry".into(),
            "--shell".into(),
            id.to_string(),
        ];
        let geometry = match runner.run(XDOTOOL, &geometry_args, &env) {
            Ok(output) => output.stdout,
            Err(_) => continue,
        };
        let Some((x, y, width, height)) = parse_shell_geometry(&geometry) else {
            continue;
        };

        let name_args: Vec<String> = vec!["getwindowname".into(), id.to_string()];
        let name = match runner.run(XDOTOOL, &name_args, &env) {
            Ok(output) => output.stdout.trim_end_matches('\n').to_string(),
            Err(_) => continue,
        };

        windows.push(WindowInfo {
            window_id: id.to_string(),
            name,
            x,
            y,
            width,
            height,
        });
    }
    windows
}

/// Parse `getwindowgeometry --shell` output (`X=`, `Y=`, `WIDTH=`,
/// `HEIGHT=` lines). All four fields must be present.
fn parse_shell_geometry(stdout: &str) -> Option<(i64, i64, i64, i64)> {
    let mut x = None;
    let mut y = None;
    let mut width = None;
    let mut height = None;
    for line in stdout.lines() {
        if let Some((key, value)) = line.trim().split_once('=') {
            let parsed = value.parse::<i64>().ok();
            match key {
                "X" => x = parsed,
                "Y" => y = parsed,
                "WIDTH" => width = parsed,
                "HEIGHT" => height = parsed,
                _ => {}
            }
        }
    }
    Some((x?, y?, width?, height?))
}

/// Poll for a window whose title matches `pattern`, returning the first
/// match or `None` at the deadline. A zero timeout still polls once.
pub fn wait_for_window(
    runner: &dyn CommandRunner,
    sleeper: &dyn Sleeper,
    display: u32,
    pattern: &str,
    timeout_ms: u64,
) -> Option<WindowInfo> {
    let deadline = Instant::now() + Duration::from_millis(timeout_ms);
    loop {
        let mut windows = find_windows(runner, display, Some(pattern));
        if !windows.is_empty() {
            return Some(windows.remove(0));
        }
        if Instant::now() >= deadline {
            return None;
        }
        sleeper.sleep(WINDOW_POLL_INTERVAL);
    }
}
