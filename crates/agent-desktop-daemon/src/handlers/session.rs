//! Session lifecycle handlers.

use agent_desktop_ipc::{RpcRequest, RpcResponse};
use serde_json::{Value, json};

use super::common::handler_span;
use crate::error::{SessionError, session_error_response};
use crate::session::{CreateOptions, SessionManager, SessionSummary};

pub fn handle_create(manager: &SessionManager, request: RpcRequest) -> RpcResponse {
    let _span = handler_span(&request, "create").entered();

    let depth = request.param_u32("depth", 24);
    if depth == 0 {
        return session_error_response(
            request.id,
            &SessionError::InvalidArgument("'depth' must be a positive integer".into()),
        );
    }

    let options = CreateOptions {
        width: request.param_u32("width", 1920),
        height: request.param_u32("height", 1080),
        depth,
        window_manager: request.param_bool("window_manager").unwrap_or(true),
    };

    match manager.create(options) {
        Ok(summary) => RpcResponse::success(
            request.id,
            json!({
                "session_id": summary.id.as_str(),
                "display": summary.display,
                "width": summary.width,
                "height": summary.height,
            }),
        ),
        Err(e) => session_error_response(request.id, &e),
    }
}

pub fn handle_destroy(manager: &SessionManager, request: RpcRequest) -> RpcResponse {
    let _span = handler_span(&request, "destroy").entered();

    let resolved = match manager.resolve(request.param_str("session")) {
        Ok(session) => {
            let guard = session.lock().unwrap_or_else(|e| e.into_inner());
            guard.id.clone()
        }
        Err(e) => return session_error_response(request.id, &e),
    };

    match manager.destroy(resolved.as_str()) {
        Ok(()) => RpcResponse::success(
            request.id,
            json!({ "ok": true, "destroyed": resolved.as_str() }),
        ),
        Err(e) => session_error_response(request.id, &e),
    }
}

fn summary_to_json(summary: &SessionSummary) -> Value {
    json!({
        "id": summary.id.as_str(),
        "display": summary.display,
        "width": summary.width,
        "height": summary.height,
        "created_at": summary.created_at,
        "processes": summary.processes.iter().map(|p| json!({
            "pid": p.pid,
            "command": p.command,
            "alive": p.alive,
        })).collect::<Vec<_>>(),
    })
}

pub fn handle_list(manager: &SessionManager, request: RpcRequest) -> RpcResponse {
    let _span = handler_span(&request, "list").entered();
    let sessions: Vec<Value> = manager.list().iter().map(summary_to_json).collect();
    RpcResponse::success(request.id, Value::Array(sessions))
}

pub fn handle_exec(manager: &SessionManager, request: RpcRequest) -> RpcResponse {
    let _span = handler_span(&request, "exec").entered();

    let command = match request.require_str("command") {
        Ok(c) => c.to_string(),
        Err(resp) => return resp,
    };

    let args: Vec<String> = request
        .param_array("args")
        .map(|values| {
            values
                .iter()
                .map(|v| match v.as_str() {
                    Some(s) => s.to_string(),
                    None => v.to_string(),
                })
                .collect()
        })
        .unwrap_or_default();

    let env: Vec<(String, String)> = request
        .param_object("env")
        .map(|map| {
            map.iter()
                .filter_map(|(k, v)| v.as_str().map(|s| (k.clone(), s.to_string())))
                .collect()
        })
        .unwrap_or_default();

    match manager.exec(request.param_str("session"), &command, &args, &env) {
        Ok((session_id, pid)) => RpcResponse::success(
            request.id,
            json!({ "pid": pid, "session_id": session_id.as_str() }),
        ),
        Err(e) => session_error_response(request.id, &e),
    }
}

pub fn handle_destroy_all(manager: &SessionManager, request: RpcRequest) -> RpcResponse {
    let _span = handler_span(&request, "destroyAll").entered();
    let count = manager.session_count();
    manager.destroy_all();
    RpcResponse::success(request.id, json!({ "ok": true, "destroyed": count }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::CommandRunner;
    use crate::config::DaemonConfig;
    use crate::sleeper::MockSleeper;
    use crate::test_support::RecordingRunner;
    use std::sync::Arc;

    fn fixture() -> (SessionManager, Arc<RecordingRunner>, tempfile::TempDir) {
        let runner = Arc::new(RecordingRunner::new());
        let dir = tempfile::tempdir().unwrap();
        let config = DaemonConfig::default().with_lock_dir(dir.path());
        let manager =
            SessionManager::new(config, Arc::clone(&runner) as Arc<dyn CommandRunner>, Arc::new(MockSleeper::new()));
        (manager, runner, dir)
    }

    fn request(method: &str, params: serde_json::Value) -> RpcRequest {
        serde_json::from_value(json!({
            "jsonrpc": "2.0",
            "id": 1,
            "method": method,
            "params": params,
        }))
        .unwrap()
    }

    fn result_of(resp: RpcResponse) -> Value {
        let raw = serde_json::to_value(&resp).unwrap();
        assert!(
            raw.get("error").is_none(),
            "expected success, got {}",
            raw["error"]
        );
        raw["result"].clone()
    }

    fn error_of(resp: RpcResponse) -> Value {
        let raw = serde_json::to_value(&resp).unwrap();
        raw["error"].clone()
    }

    #[test]
    fn test_create_returns_session_fields() {
        let (manager, _runner, _dir) = fixture();
        let resp = handle_create(
            &manager,
            request("create", json!({"width": 1280, "height": 720})),
        );
        let result = result_of(resp);
        assert_eq!(result["session_id"], "s1");
        assert_eq!(result["display"], 99);
        assert_eq!(result["width"], 1280);
        assert_eq!(result["height"], 720);
    }

    #[test]
    fn test_create_rejects_zero_depth() {
        let (manager, _runner, _dir) = fixture();
        let resp = handle_create(&manager, request("create", json!({"depth": 0})));
        let error = error_of(resp);
        assert_eq!(error["data"]["category"], "invalid_input");
    }

    #[test]
    fn test_create_accepts_unusual_positive_depth() {
        // The shell layer restricts depth to {16, 24, 32}; the core takes
        // any positive integer.
        let (manager, runner, _dir) = fixture();
        let resp = handle_create(&manager, request("create", json!({"depth": 8})));
        result_of(resp);
        let call = runner.find_spawn("Xvfb").unwrap();
        assert!(call.args.contains(&"1920x1080x8".to_string()));
    }

    #[test]
    fn test_list_reports_sessions_and_processes() {
        let (manager, _runner, _dir) = fixture();
        handle_create(&manager, request("create", json!({})));
        handle_exec(
            &manager,
            request("exec", json!({"command": "xterm", "args": ["-fg", "white"]})),
        );

        let result = result_of(handle_list(&manager, request("list", json!({}))));
        let sessions = result.as_array().unwrap();
        assert_eq!(sessions.len(), 1);
        assert_eq!(sessions[0]["id"], "s1");
        assert_eq!(sessions[0]["display"], 99);
        let processes = sessions[0]["processes"].as_array().unwrap();
        assert_eq!(processes.len(), 1);
        assert_eq!(processes[0]["command"], "xterm -fg white");
        assert_eq!(processes[0]["alive"], true);
    }

    #[test]
    fn test_list_empty_after_destroy() {
        let (manager, _runner, _dir) = fixture();
        handle_create(&manager, request("create", json!({})));
        let resp = handle_destroy(&manager, request("destroy", json!({"session": "s1"})));
        let result = result_of(resp);
        assert_eq!(result["ok"], true);
        assert_eq!(result["destroyed"], "s1");

        let listed = result_of(handle_list(&manager, request("list", json!({}))));
        assert_eq!(listed, json!([]));
    }

    #[test]
    fn test_destroy_after_destroy_is_not_found() {
        let (manager, _runner, _dir) = fixture();
        handle_create(&manager, request("create", json!({})));
        handle_destroy(&manager, request("destroy", json!({"session": "s1"})));

        let error = error_of(handle_destroy(
            &manager,
            request("destroy", json!({"session": "s1"})),
        ));
        assert_eq!(error["data"]["category"], "not_found");
    }

    #[test]
    fn test_exec_launch_failure_reports_command_and_cause() {
        let (manager, runner, _dir) = fixture();
        runner.fail_spawn("/bin/does-not-exist");
        handle_create(&manager, request("create", json!({})));

        let error = error_of(handle_exec(
            &manager,
            request("exec", json!({"command": "/bin/does-not-exist"})),
        ));
        assert_eq!(error["data"]["context"]["command"], "/bin/does-not-exist");
        assert!(error["message"].as_str().unwrap().contains("Failed to launch"));
    }

    #[test]
    fn test_exec_requires_command() {
        let (manager, _runner, _dir) = fixture();
        let raw = serde_json::to_value(handle_exec(&manager, request("exec", json!({}))))
            .unwrap();
        assert_eq!(raw["error"]["code"], -32602);
    }

    #[test]
    fn test_destroy_all_reports_count() {
        let (manager, _runner, _dir) = fixture();
        handle_create(&manager, request("create", json!({})));
        handle_create(&manager, request("create", json!({})));

        let result = result_of(handle_destroy_all(
            &manager,
            request("destroyAll", json!({})),
        ));
        assert_eq!(result["destroyed"], 2);
        assert_eq!(manager.session_count(), 0);
    }
}
