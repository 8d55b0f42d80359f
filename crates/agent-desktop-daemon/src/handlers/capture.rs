//! Screenshot handler.

use agent_desktop_ipc::{RpcRequest, RpcResponse};
use serde_json::json;

use super::common::{handler_span, resolve_geometry};
use crate::capture;
use crate::error::{SessionError, session_error_response};
use crate::session::SessionManager;

fn screenshot_op(
    manager: &SessionManager,
    request: &RpcRequest,
) -> Result<capture::CapturedImage, SessionError> {
    let geometry = resolve_geometry(manager, request)?;
    capture::screenshot(
        manager.runner().as_ref(),
        geometry.display,
        geometry.width,
        geometry.height,
    )
}

pub fn handle_screenshot(manager: &SessionManager, request: RpcRequest) -> RpcResponse {
    let _span = handler_span(&request, "screenshot").entered();
    match screenshot_op(manager, &request) {
        Ok(image) => RpcResponse::success(
            request.id,
            json!({
                "display_width_px": image.width,
                "display_height_px": image.height,
                "image": {
                    "mime_type": "image/png",
                    "data": image.data,
                },
            }),
        ),
        Err(e) => session_error_response(request.id, &e),
    }
}
