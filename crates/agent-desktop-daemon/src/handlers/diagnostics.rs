//! Daemon health and metrics handlers.

use std::time::Instant;

use agent_desktop_ipc::{RpcRequest, RpcResponse};
use serde_json::json;

use super::common::handler_span;
use crate::metrics::DaemonMetrics;
use crate::session::SessionManager;

pub fn handle_health(
    manager: &SessionManager,
    start_time: Instant,
    request: RpcRequest,
) -> RpcResponse {
    let _span = handler_span(&request, "health").entered();
    RpcResponse::success(
        request.id,
        json!({
            "status": "ok",
            "version": env!("CARGO_PKG_VERSION"),
            "uptime_ms": start_time.elapsed().as_millis() as u64,
            "sessions": manager.session_count(),
        }),
    )
}

pub fn handle_metrics(
    manager: &SessionManager,
    metrics: &DaemonMetrics,
    request: RpcRequest,
) -> RpcResponse {
    let _span = handler_span(&request, "metrics").entered();
    RpcResponse::success(
        request.id,
        json!({
            "requests": metrics.requests(),
            "errors": metrics.errors(),
            "sessions_created": metrics.sessions_created(),
            "sessions_destroyed": metrics.sessions_destroyed(),
            "sessions_live": manager.session_count(),
        }),
    )
}
