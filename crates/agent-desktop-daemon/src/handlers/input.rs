//! Input synthesis handlers.
//!
//! Client coordinates are API-image-space values; this layer multiplies
//! them up to display space and clamps before the input layer ever sees
//! them. The reverse mapping applies to cursor positions on the way out.

use agent_desktop_ipc::{RpcRequest, RpcResponse};
use serde_json::json;

use super::common::{parse_coordinate, require_coordinate, resolve_geometry};
use crate::capture::from_display;
use crate::error::{SessionError, session_error_response};
use crate::input;
use crate::input::ScrollDirection;
use crate::session::SessionManager;

fn action_response(id: u64, result: Result<(), SessionError>) -> RpcResponse {
    match result {
        Ok(()) => RpcResponse::action_success(id),
        Err(e) => session_error_response(id, &e),
    }
}

fn send_key_op(manager: &SessionManager, request: &RpcRequest) -> Result<(), SessionError> {
    let key = request
        .param_str("key")
        .ok_or_else(|| SessionError::InvalidArgument("missing required 'key'".into()))?;
    let geometry = resolve_geometry(manager, request)?;
    input::send_key(manager.runner().as_ref(), geometry.display, key)
}

pub fn handle_send_key(manager: &SessionManager, request: RpcRequest) -> RpcResponse {
    let _span = super::common::handler_span(&request, "sendKey").entered();
    action_response(request.id, send_key_op(manager, &request))
}

fn send_type_op(manager: &SessionManager, request: &RpcRequest) -> Result<(), SessionError> {
    let text = request
        .param_str("text")
        .ok_or_else(|| SessionError::InvalidArgument("missing required 'text'".into()))?;
    let geometry = resolve_geometry(manager, request)?;
    input::send_type(manager.runner().as_ref(), geometry.display, text)
}

pub fn handle_send_type(manager: &SessionManager, request: RpcRequest) -> RpcResponse {
    let _span = super::common::handler_span(&request, "sendType").entered();
    action_response(request.id, send_type_op(manager, &request))
}

fn mouse_move_op(manager: &SessionManager, request: &RpcRequest) -> Result<(), SessionError> {
    let geometry = resolve_geometry(manager, request)?;
    let (x, y) = require_coordinate(request, &geometry)?;
    input::mouse_move(manager.runner().as_ref(), geometry.display, x, y)
}

pub fn handle_mouse_move(manager: &SessionManager, request: RpcRequest) -> RpcResponse {
    let _span = super::common::handler_span(&request, "mouseMove").entered();
    action_response(request.id, mouse_move_op(manager, &request))
}

fn mouse_click_op(manager: &SessionManager, request: &RpcRequest) -> Result<(), SessionError> {
    let geometry = resolve_geometry(manager, request)?;
    let position = parse_coordinate(request, &geometry)?;
    let button = request.param_u32("button", 1);
    input::mouse_click(manager.runner().as_ref(), geometry.display, button, position)
}

pub fn handle_mouse_click(manager: &SessionManager, request: RpcRequest) -> RpcResponse {
    let _span = super::common::handler_span(&request, "mouseClick").entered();
    action_response(request.id, mouse_click_op(manager, &request))
}

fn mouse_double_click_op(
    manager: &SessionManager,
    request: &RpcRequest,
) -> Result<(), SessionError> {
    let geometry = resolve_geometry(manager, request)?;
    let position = parse_coordinate(request, &geometry)?;
    input::mouse_double_click(manager.runner().as_ref(), geometry.display, position)
}

pub fn handle_mouse_double_click(manager: &SessionManager, request: RpcRequest) -> RpcResponse {
    let _span = super::common::handler_span(&request, "mouseDoubleClick").entered();
    action_response(request.id, mouse_double_click_op(manager, &request))
}

fn mouse_drag_op(manager: &SessionManager, request: &RpcRequest) -> Result<(), SessionError> {
    let geometry = resolve_geometry(manager, request)?;
    let (x, y) = require_coordinate(request, &geometry)?;
    input::mouse_drag(manager.runner().as_ref(), geometry.display, x, y)
}

pub fn handle_mouse_drag(manager: &SessionManager, request: RpcRequest) -> RpcResponse {
    let _span = super::common::handler_span(&request, "mouseDrag").entered();
    action_response(request.id, mouse_drag_op(manager, &request))
}

fn mouse_scroll_op(manager: &SessionManager, request: &RpcRequest) -> Result<(), SessionError> {
    let direction: ScrollDirection = request
        .param_str("direction")
        .ok_or_else(|| SessionError::InvalidArgument("missing required 'direction'".into()))?
        .parse()?;
    let amount = request
        .param_f64("amount")
        .unwrap_or(input::DEFAULT_SCROLL_AMOUNT);
    let geometry = resolve_geometry(manager, request)?;
    let position = parse_coordinate(request, &geometry)?;
    input::mouse_scroll(
        manager.runner().as_ref(),
        geometry.display,
        direction,
        amount,
        position,
    )
}

pub fn handle_mouse_scroll(manager: &SessionManager, request: RpcRequest) -> RpcResponse {
    let _span = super::common::handler_span(&request, "mouseScroll").entered();
    action_response(request.id, mouse_scroll_op(manager, &request))
}

fn cursor_position_op(
    manager: &SessionManager,
    request: &RpcRequest,
) -> Result<(i64, i64), SessionError> {
    let geometry = resolve_geometry(manager, request)?;
    let (x, y) = input::cursor_position(manager.runner().as_ref(), geometry.display)?;
    Ok(from_display(x, y, geometry.width, geometry.height))
}

pub fn handle_cursor_position(manager: &SessionManager, request: RpcRequest) -> RpcResponse {
    let _span = super::common::handler_span(&request, "getCursorPosition").entered();
    match cursor_position_op(manager, &request) {
        Ok((x, y)) => RpcResponse::success(request.id, json!({ "x": x, "y": y })),
        Err(e) => session_error_response(request.id, &e),
    }
}
