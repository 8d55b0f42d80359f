//! Window query and wait handlers.

use agent_desktop_ipc::{RpcRequest, RpcResponse};
use serde_json::{Value, json};

use super::common::{handler_span, resolve_geometry};
use crate::error::{SessionError, session_error_response};
use crate::session::SessionManager;
use crate::windows::{self, DEFAULT_WAIT_TIMEOUT_MS, WindowInfo};

fn window_to_json(window: &WindowInfo) -> Value {
    json!({
        "windowId": window.window_id,
        "name": window.name,
        "x": window.x,
        "y": window.y,
        "width": window.width,
        "height": window.height,
    })
}

pub fn handle_find_windows(manager: &SessionManager, request: RpcRequest) -> RpcResponse {
    let _span = handler_span(&request, "findWindows").entered();
    let geometry = match resolve_geometry(manager, &request) {
        Ok(g) => g,
        Err(e) => return session_error_response(request.id, &e),
    };

    let found = windows::find_windows(
        manager.runner().as_ref(),
        geometry.display,
        request.param_str("title"),
    );
    RpcResponse::success(
        request.id,
        Value::Array(found.iter().map(window_to_json).collect()),
    )
}

pub fn handle_wait_for_window(manager: &SessionManager, request: RpcRequest) -> RpcResponse {
    let _span = handler_span(&request, "waitForWindow").entered();

    let title = match request.param_str("title") {
        Some(t) => t.to_string(),
        None => {
            return session_error_response(
                request.id,
                &SessionError::InvalidArgument("missing required 'title'".into()),
            );
        }
    };
    let timeout_ms = request.param_u64("timeout_ms", DEFAULT_WAIT_TIMEOUT_MS);

    let geometry = match resolve_geometry(manager, &request) {
        Ok(g) => g,
        Err(e) => return session_error_response(request.id, &e),
    };

    match windows::wait_for_window(
        manager.runner().as_ref(),
        manager.sleeper().as_ref(),
        geometry.display,
        &title,
        timeout_ms,
    ) {
        Some(window) => {
            let mut result = window_to_json(&window);
            result["found"] = json!(true);
            RpcResponse::success(request.id, result)
        }
        None => RpcResponse::success(
            request.id,
            json!({ "found": false, "title": title, "timeout_ms": timeout_ms }),
        ),
    }
}
