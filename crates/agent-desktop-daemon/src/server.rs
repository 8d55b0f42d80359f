//! The stdio JSON-RPC server loop.
//!
//! One request per line on stdin, one response per line on stdout. A
//! reader thread feeds lines into a channel drained by a worker pool, so
//! slow operations (readiness waits, window polling, capture) never block
//! other in-flight requests. Responses share a locked writer.

use std::io::{BufRead, BufReader, Read, Write};
use std::sync::Arc;
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use std::time::{Duration, Instant};

use agent_desktop_ipc::{RpcRequest, RpcResponse};
use crossbeam_channel as channel;
use serde_json::json;
use thiserror::Error;
use tracing::{error, info, warn};

use crate::config::DaemonConfig;
use crate::handlers;
use crate::metrics::DaemonMetrics;
use crate::runner::SystemRunner;
use crate::session::SessionManager;
use crate::signal_handler::SignalHandler;
use crate::sleeper::RealSleeper;

const WORKER_THREADS: usize = 8;
const CHANNEL_CAPACITY: usize = 128;
const IDLE_POLL: Duration = Duration::from_millis(100);

#[derive(Error, Debug)]
pub enum DaemonError {
    #[error("Failed to set up signal handling: {0}")]
    SignalSetup(String),
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

type SharedWriter = Arc<Mutex<Box<dyn Write + Send>>>;

pub struct DaemonServer {
    manager: Arc<SessionManager>,
    metrics: Arc<DaemonMetrics>,
    start_time: Instant,
}

impl DaemonServer {
    pub fn new(config: DaemonConfig) -> Self {
        let manager = Arc::new(SessionManager::new(
            config,
            Arc::new(SystemRunner::new()),
            Arc::new(RealSleeper),
        ));
        Self::with_manager(manager)
    }

    pub fn with_manager(manager: Arc<SessionManager>) -> Self {
        Self {
            manager,
            metrics: Arc::new(DaemonMetrics::new()),
            start_time: Instant::now(),
        }
    }

    pub fn manager(&self) -> &Arc<SessionManager> {
        &self.manager
    }

    /// The single teardown entry point: wired to signals, client
    /// disconnect and server close alike.
    pub fn shutdown_all_sessions(&self) {
        self.manager.destroy_all();
    }

    pub fn handle_request(&self, request: RpcRequest) -> RpcResponse {
        self.metrics.record_request();
        let method = request.method.clone();

        let response = match request.method.as_str() {
            "ping" => RpcResponse::success(request.id, json!({ "pong": true })),
            "health" => {
                handlers::diagnostics::handle_health(&self.manager, self.start_time, request)
            }
            "metrics" => {
                handlers::diagnostics::handle_metrics(&self.manager, &self.metrics, request)
            }

            "create" => handlers::session::handle_create(&self.manager, request),
            "destroy" => handlers::session::handle_destroy(&self.manager, request),
            "list" => handlers::session::handle_list(&self.manager, request),
            "exec" => handlers::session::handle_exec(&self.manager, request),
            "destroyAll" => handlers::session::handle_destroy_all(&self.manager, request),

            "sendKey" => handlers::input::handle_send_key(&self.manager, request),
            "sendType" => handlers::input::handle_send_type(&self.manager, request),
            "mouseMove" => handlers::input::handle_mouse_move(&self.manager, request),
            "mouseClick" => handlers::input::handle_mouse_click(&self.manager, request),
            "mouseDoubleClick" => {
                handlers::input::handle_mouse_double_click(&self.manager, request)
            }
            "mouseDrag" => handlers::input::handle_mouse_drag(&self.manager, request),
            "mouseScroll" => handlers::input::handle_mouse_scroll(&self.manager, request),
            "getCursorPosition" => {
                handlers::input::handle_cursor_position(&self.manager, request)
            }

            "screenshot" => handlers::capture::handle_screenshot(&self.manager, request),

            "findWindows" => handlers::windows::handle_find_windows(&self.manager, request),
            "waitForWindow" => handlers::windows::handle_wait_for_window(&self.manager, request),

            _ => RpcResponse::error(
                request.id,
                -32601,
                &format!("Method not found: {}", request.method),
            ),
        };

        if response.is_error() {
            self.metrics.record_error();
        } else {
            match method.as_str() {
                "create" => self.metrics.record_session_created(),
                "destroy" => self.metrics.record_session_destroyed(),
                _ => {}
            }
        }
        response
    }

    fn handle_line(&self, line: &str, writer: &SharedWriter) {
        let response = match serde_json::from_str::<RpcRequest>(line) {
            Ok(request) => self.handle_request(request),
            Err(e) => {
                self.metrics.record_error();
                RpcResponse::error(0, -32700, &format!("Parse error: {}", e))
            }
        };
        write_response(writer, &response);
    }
}

fn write_response(writer: &SharedWriter, response: &RpcResponse) {
    let serialized = match serde_json::to_string(response) {
        Ok(s) => s,
        Err(e) => {
            error!(error = %e, "Failed to serialize response");
            return;
        }
    };
    let mut guard = writer.lock().unwrap_or_else(|e| e.into_inner());
    if writeln!(guard, "{}", serialized).and_then(|_| guard.flush()).is_err() {
        warn!("Client writer closed");
    }
}

struct ThreadPool {
    workers: Vec<thread::JoinHandle<()>>,
}

impl ThreadPool {
    fn new(
        size: usize,
        server: Arc<DaemonServer>,
        shutdown: Arc<AtomicBool>,
        jobs: channel::Receiver<String>,
        writer: SharedWriter,
    ) -> Self {
        let mut workers = Vec::with_capacity(size);
        for id in 0..size {
            let server = Arc::clone(&server);
            let shutdown = Arc::clone(&shutdown);
            let jobs = jobs.clone();
            let writer = Arc::clone(&writer);

            let spawned = thread::Builder::new()
                .name(format!("worker-{}", id))
                .spawn(move || {
                    loop {
                        if shutdown.load(Ordering::Relaxed) {
                            break;
                        }
                        match jobs.recv_timeout(IDLE_POLL) {
                            Ok(line) => server.handle_line(&line, &writer),
                            Err(channel::RecvTimeoutError::Timeout) => continue,
                            Err(channel::RecvTimeoutError::Disconnected) => break,
                        }
                    }
                });
            match spawned {
                Ok(handle) => workers.push(handle),
                Err(e) => warn!(worker = id, error = %e, "Failed to spawn worker thread"),
            }
        }
        ThreadPool { workers }
    }

    fn join(self) {
        for worker in self.workers {
            let _ = worker.join();
        }
    }
}

/// Run the request loop until the client disconnects (stdin EOF) or the
/// shutdown flag is raised, then destroy every live session.
pub fn serve(
    server: Arc<DaemonServer>,
    shutdown: Arc<AtomicBool>,
    input: impl Read + Send + 'static,
    output: Box<dyn Write + Send>,
) -> Result<(), DaemonError> {
    let writer: SharedWriter = Arc::new(Mutex::new(output));
    let (line_tx, line_rx) = channel::bounded::<String>(CHANNEL_CAPACITY);

    // The reader owns stdin; dropping the sender on EOF lets the pool
    // drain what is queued and stop.
    let reader_handle = thread::Builder::new()
        .name("stdin-reader".to_string())
        .spawn(move || {
            let reader = BufReader::new(input);
            for line in reader.lines() {
                let line = match line {
                    Ok(line) => line,
                    Err(_) => break,
                };
                if line.trim().is_empty() {
                    continue;
                }
                if line_tx.send(line).is_err() {
                    break;
                }
            }
        })?;

    let pool = ThreadPool::new(
        WORKER_THREADS,
        Arc::clone(&server),
        Arc::clone(&shutdown),
        line_rx,
        writer,
    );

    // The pool exits on its own for EOF; for signals we only need to wait
    // on the flag, which the workers also watch.
    pool.join();
    if shutdown.load(Ordering::Relaxed) {
        info!("Shutdown requested, cleaning up sessions");
    } else {
        info!("Client disconnected, cleaning up sessions");
    }
    server.shutdown_all_sessions();
    drop(reader_handle);
    Ok(())
}

/// Entry point used by the binary: stdio transport plus signal handling.
pub fn start_daemon(config: DaemonConfig) -> Result<(), DaemonError> {
    let server = Arc::new(DaemonServer::new(config));
    let shutdown = Arc::new(AtomicBool::new(false));
    let _signals = SignalHandler::setup(Arc::clone(&shutdown), Arc::clone(server.manager()))?;

    info!(pid = std::process::id(), "agent-desktop daemon started");
    serve(
        server,
        shutdown,
        std::io::stdin(),
        Box::new(std::io::stdout()),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::CommandRunner;
    use crate::sleeper::MockSleeper;
    use crate::test_support::RecordingRunner;
    use serde_json::Value;

    #[derive(Clone, Default)]
    struct SharedBuffer(Arc<Mutex<Vec<u8>>>);

    impl Write for SharedBuffer {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    fn test_server() -> (Arc<DaemonServer>, Arc<RecordingRunner>, tempfile::TempDir) {
        let runner = Arc::new(RecordingRunner::new());
        let dir = tempfile::tempdir().unwrap();
        let config = DaemonConfig::default().with_lock_dir(dir.path());
        let manager = Arc::new(SessionManager::new(
            config,
            Arc::clone(&runner) as Arc<dyn CommandRunner>,
            Arc::new(MockSleeper::new()),
        ));
        (Arc::new(DaemonServer::with_manager(manager)), runner, dir)
    }

    fn parse_lines(buffer: &SharedBuffer) -> Vec<Value> {
        let bytes = buffer.0.lock().unwrap().clone();
        String::from_utf8(bytes)
            .unwrap()
            .lines()
            .map(|l| serde_json::from_str(l).unwrap())
            .collect()
    }

    fn req(id: u64, method: &str, params: Value) -> RpcRequest {
        serde_json::from_value(json!({
            "jsonrpc": "2.0",
            "id": id,
            "method": method,
            "params": params,
        }))
        .unwrap()
    }

    #[test]
    fn test_ping_pongs() {
        let (server, _runner, _dir) = test_server();
        let resp = server.handle_request(req(1, "ping", json!({})));
        let raw = serde_json::to_value(&resp).unwrap();
        assert_eq!(raw["result"]["pong"], true);
    }

    #[test]
    fn test_unknown_method_is_not_found() {
        let (server, _runner, _dir) = test_server();
        let resp = server.handle_request(req(1, "teleport", json!({})));
        let raw = serde_json::to_value(&resp).unwrap();
        assert_eq!(raw["error"]["code"], -32601);
    }

    #[test]
    fn test_create_then_input_then_destroy_flow() {
        let (server, runner, _dir) = test_server();

        let created = server.handle_request(req(1, "create", json!({"width": 1280, "height": 720})));
        let raw = serde_json::to_value(&created).unwrap();
        assert_eq!(raw["result"]["session_id"], "s1");

        let clicked = server.handle_request(req(
            2,
            "mouseClick",
            json!({"session": "s1", "coordinate": [10, 10]}),
        ));
        assert!(!clicked.is_error());
        assert!(!runner.run_calls("xdotool").is_empty());

        let destroyed = server.handle_request(req(3, "destroy", json!({"session": "s1"})));
        assert!(!destroyed.is_error());

        let listed = server.handle_request(req(4, "list", json!({})));
        let raw = serde_json::to_value(&listed).unwrap();
        assert_eq!(raw["result"], json!([]));
    }

    #[test]
    fn test_serve_handles_lines_and_tears_down_on_eof() {
        let (server, runner, _dir) = test_server();
        let buffer = SharedBuffer::default();
        let shutdown = Arc::new(AtomicBool::new(false));

        let input = std::io::Cursor::new(
            [
                r#"{"jsonrpc":"2.0","id":1,"method":"create","params":{"width":800,"height":600}}"#,
                r#"{"jsonrpc":"2.0","id":2,"method":"list"}"#,
                "not json",
            ]
            .join("\n"),
        );

        serve(
            Arc::clone(&server),
            shutdown,
            input,
            Box::new(buffer.clone()),
        )
        .unwrap();

        let mut responses = parse_lines(&buffer);
        // Worker interleaving may reorder responses; sort by id.
        responses.sort_by_key(|r| r["id"].as_u64().unwrap_or(0));

        assert_eq!(responses.len(), 3);
        assert_eq!(responses[0]["id"], 0); // parse error
        assert_eq!(responses[0]["error"]["code"], -32700);
        assert_eq!(responses[1]["result"]["session_id"], "s1");

        // EOF implies teardown: the session was destroyed.
        assert_eq!(server.manager().session_count(), 0);
        let fb_pid = runner.find_spawn("Xvfb").unwrap().pid.unwrap();
        assert!(runner.terminated_pids().contains(&fb_pid));
    }

    #[test]
    fn test_handle_request_counts_errors() {
        let (server, _runner, _dir) = test_server();
        server.handle_request(req(1, "destroy", json!({"session": "nope"})));
        let metrics = server.handle_request(req(2, "metrics", json!({})));
        let raw = serde_json::to_value(&metrics).unwrap();
        assert_eq!(raw["result"]["errors"], 1);
        assert_eq!(raw["result"]["requests"], 2);
    }
}
