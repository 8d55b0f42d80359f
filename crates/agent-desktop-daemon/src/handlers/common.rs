//! Shared helpers for request handlers.

use agent_desktop_ipc::RpcRequest;
use tracing::Span;

use crate::capture::to_display;
use crate::error::SessionError;
use crate::session::SessionManager;

pub fn handler_span(request: &RpcRequest, method: &'static str) -> Span {
    tracing::info_span!("request", method, id = request.id)
}

/// Display number and native size of the resolved session.
pub struct SessionGeometry {
    pub display: u32,
    pub width: u32,
    pub height: u32,
}

/// Resolve the optional `session` parameter and copy out the fields the
/// input and capture paths need, releasing the session lock before any
/// external tool runs.
pub fn resolve_geometry(
    manager: &SessionManager,
    request: &RpcRequest,
) -> Result<SessionGeometry, SessionError> {
    let session = manager.resolve(request.param_str("session"))?;
    let guard = session.lock().unwrap_or_else(|e| e.into_inner());
    Ok(SessionGeometry {
        display: guard.display,
        width: guard.width,
        height: guard.height,
    })
}

/// Read a client coordinate and convert it to clamped display space.
///
/// Accepts either `"coordinate": [x, y]` or separate `"x"`/`"y"` numbers;
/// both are interpreted in API image space. Returns `None` when no
/// coordinate was supplied at all.
pub fn parse_coordinate(
    request: &RpcRequest,
    geometry: &SessionGeometry,
) -> Result<Option<(i64, i64)>, SessionError> {
    if let Some(pair) = request.param_array("coordinate") {
        if pair.len() != 2 {
            return Err(SessionError::InvalidArgument(
                "'coordinate' must be a [x, y] pair".into(),
            ));
        }
        let (Some(x), Some(y)) = (pair[0].as_f64(), pair[1].as_f64()) else {
            return Err(SessionError::InvalidArgument(
                "'coordinate' entries must be numbers".into(),
            ));
        };
        return Ok(Some(to_display(x, y, geometry.width, geometry.height)));
    }

    match (request.param_f64("x"), request.param_f64("y")) {
        (Some(x), Some(y)) => Ok(Some(to_display(x, y, geometry.width, geometry.height))),
        (None, None) => Ok(None),
        _ => Err(SessionError::InvalidArgument(
            "both 'x' and 'y' are required".into(),
        )),
    }
}

/// Like [`parse_coordinate`] but the coordinate is mandatory.
pub fn require_coordinate(
    request: &RpcRequest,
    geometry: &SessionGeometry,
) -> Result<(i64, i64), SessionError> {
    parse_coordinate(request, geometry)?.ok_or_else(|| {
        SessionError::InvalidArgument("missing required 'coordinate'".into())
    })
}
