//! Keyboard and mouse synthesis against a session's display.
//!
//! Every operation is one xdotool invocation carrying the session's
//! display selector. Coordinates arriving here are display-space integers
//! already scaled and clamped by the handler layer. Typed text is passed
//! as a single argv element behind the `--` sentinel; it is never
//! interpreted as options or shell syntax.

use std::str::FromStr;

use crate::error::SessionError;
use crate::runner::{CommandRunner, display_env};

const XDOTOOL: &str = "xdotool";
const TYPE_DELAY_MS: u32 = 12;
const DOUBLE_CLICK_DELAY_MS: u32 = 50;
const SCROLL_DELAY_MS: u32 = 10;
/// One scroll "notch" per this many units of requested amount.
const SCROLL_UNITS_PER_CLICK: f64 = 30.0;

pub const DEFAULT_SCROLL_AMOUNT: f64 = 300.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScrollDirection {
    Up,
    Down,
    Left,
    Right,
}

impl ScrollDirection {
    /// X11 button number for one scroll click in this direction.
    pub fn button(&self) -> u32 {
        match self {
            ScrollDirection::Up => 4,
            ScrollDirection::Down => 5,
            ScrollDirection::Left => 6,
            ScrollDirection::Right => 7,
        }
    }
}

impl FromStr for ScrollDirection {
    type Err = SessionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "up" => Ok(ScrollDirection::Up),
            "down" => Ok(ScrollDirection::Down),
            "left" => Ok(ScrollDirection::Left),
            "right" => Ok(ScrollDirection::Right),
            other => Err(SessionError::InvalidArgument(format!(
                "unknown scroll direction '{}'",
                other
            ))),
        }
    }
}

fn run(
    runner: &dyn CommandRunner,
    display: u32,
    args: Vec<String>,
) -> Result<(), SessionError> {
    runner.run(XDOTOOL, &args, &display_env(display))?;
    Ok(())
}

/// Press a single key or a `+`-joined combo, clearing held modifiers first.
pub fn send_key(runner: &dyn CommandRunner, display: u32, key: &str) -> Result<(), SessionError> {
    run(
        runner,
        display,
        vec!["key".into(), "--clearmodifiers".into(), key.to_string()],
    )
}

/// Type literal text at a fixed per-character delay.
pub fn send_type(runner: &dyn CommandRunner, display: u32, text: &str) -> Result<(), SessionError> {
    run(
        runner,
        display,
        vec![
            "type".into(),
            "--clearmodifiers".into(),
            "--delay".into(),
            TYPE_DELAY_MS.to_string(),
            "--".into(),
            text.to_string(),
        ],
    )
}

/// Move the pointer and wait for the server to acknowledge.
pub fn mouse_move(
    runner: &dyn CommandRunner,
    display: u32,
    x: i64,
    y: i64,
) -> Result<(), SessionError> {
    run(
        runner,
        display,
        vec![
            "mousemove".into(),
            "--sync".into(),
            x.to_string(),
            y.to_string(),
        ],
    )
}

/// Click button 1-3 (left/middle/right), optionally moving first.
pub fn mouse_click(
    runner: &dyn CommandRunner,
    display: u32,
    button: u32,
    position: Option<(i64, i64)>,
) -> Result<(), SessionError> {
    if !(1..=3).contains(&button) {
        return Err(SessionError::InvalidArgument(format!(
            "mouse button must be 1, 2 or 3, got {}",
            button
        )));
    }
    if let Some((x, y)) = position {
        mouse_move(runner, display, x, y)?;
    }
    run(runner, display, vec!["click".into(), button.to_string()])
}

/// Two left-button presses 50ms apart, optionally moving first.
pub fn mouse_double_click(
    runner: &dyn CommandRunner,
    display: u32,
    position: Option<(i64, i64)>,
) -> Result<(), SessionError> {
    if let Some((x, y)) = position {
        mouse_move(runner, display, x, y)?;
    }
    run(
        runner,
        display,
        vec![
            "click".into(),
            "--repeat".into(),
            "2".into(),
            "--delay".into(),
            DOUBLE_CLICK_DELAY_MS.to_string(),
            "1".into(),
        ],
    )
}

/// Drag from the current pointer position: press, synced move, release,
/// chained in a single xdotool invocation.
pub fn mouse_drag(
    runner: &dyn CommandRunner,
    display: u32,
    x: i64,
    y: i64,
) -> Result<(), SessionError> {
    run(
        runner,
        display,
        vec![
            "mousedown".into(),
            "1".into(),
            "mousemove".into(),
            "--sync".into(),
            x.to_string(),
            y.to_string(),
            "mouseup".into(),
            "1".into(),
        ],
    )
}

/// Scroll by emitting repeated wheel-button clicks.
pub fn mouse_scroll(
    runner: &dyn CommandRunner,
    display: u32,
    direction: ScrollDirection,
    amount: f64,
    position: Option<(i64, i64)>,
) -> Result<(), SessionError> {
    if let Some((x, y)) = position {
        mouse_move(runner, display, x, y)?;
    }
    let clicks = ((amount / SCROLL_UNITS_PER_CLICK).round() as i64).max(1);
    run(
        runner,
        display,
        vec![
            "click".into(),
            "--repeat".into(),
            clicks.to_string(),
            "--delay".into(),
            SCROLL_DELAY_MS.to_string(),
            direction.button().to_string(),
        ],
    )
}

/// Current pointer position in display space.
pub fn cursor_position(
    runner: &dyn CommandRunner,
    display: u32,
) -> Result<(i64, i64), SessionError> {
    let output = runner.run(
        XDOTOOL,
        &["getmouselocation".to_string()],
        &display_env(display),
    )?;
    Ok(parse_mouse_location(&output.stdout))
}

/// Parse `x:N y:M screen:S window:W`; fields that are absent or malformed
/// default to 0.
fn parse_mouse_location(stdout: &str) -> (i64, i64) {
    let mut x = 0;
    let mut y = 0;
    for token in stdout.split_whitespace() {
        if let Some((key, value)) = token.split_once(':') {
            match key {
                "x" => x = value.parse().unwrap_or(0),
                "y" => y = value.parse().unwrap_or(0),
                _ => {}
            }
        }
    }
    (x, y)
}
