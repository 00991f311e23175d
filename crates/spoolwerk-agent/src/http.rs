// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// HTTP/1.1 JSON API for the spooler.
//
// Operates directly on raw TCP: a full web framework is unnecessary overhead
// for an agent with six routes, so we parse just enough HTTP framing to
// extract the method, path, and body, and respond with a minimal HTTP/1.1
// message wrapping a JSON document.
//
// # Routes
//
//   - GET  /health         liveness plus pending-job count
//   - GET  /status         health plus the database path
//   - GET  /queue?limit=N  most recent jobs, newest first
//   - POST /print          admit a job (201 with its id)
//   - POST /reprint/<id>   clone an existing job (201 with the new id)
//   - POST /stop           graceful shutdown, loopback peers only
//
// When a static token is configured, POST /print and POST /reprint require
// it via the Authorization header, a `?token=` query parameter, or a
// `token` field in the JSON body.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;

use serde_json::{Value, json};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;
use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use spoolwerk_core::error::{Result, SpoolError};
use spoolwerk_core::types::{JobId, PrintRequest};
use spoolwerk_spool::SpoolService;

/// Maximum bytes to read from a connection before rejecting it.
const MAX_REQUEST_BYTES: usize = 8 * 1024 * 1024; // 8 MiB

/// Default number of jobs returned by GET /queue.
const DEFAULT_QUEUE_LIMIT: u32 = 50;

// ---------------------------------------------------------------------------
// Parsed HTTP request
// ---------------------------------------------------------------------------

/// The parts of an HTTP request this API cares about.
#[derive(Debug)]
struct HttpRequest {
    method: String,
    path: String,
    /// Decoded `key=value` pairs from the query string.
    query: HashMap<String, String>,
    /// Header map with lower-cased names.
    headers: HashMap<String, String>,
    body: Vec<u8>,
}

impl HttpRequest {
    fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).map(String::as_str)
    }
}

/// Parse the head of an HTTP/1.1 request: request line plus headers.
///
/// `data` must contain at least the full head (terminated by `\r\n\r\n`).
/// Returns the request with an empty body and the offset where the body
/// begins, or `None` if the framing is not recognisable.
fn parse_head(data: &[u8]) -> Option<(HttpRequest, usize)> {
    let header_end = find_subsequence(data, b"\r\n\r\n")?;
    let body_offset = header_end + 4;

    let head = std::str::from_utf8(&data[..header_end]).ok()?;
    let mut lines = head.split("\r\n");

    // Request line: METHOD SP target SP version
    let mut request_line = lines.next()?.split(' ');
    let method = request_line.next()?.to_string();
    let target = request_line.next()?;
    request_line.next()?; // version -- accepted as-is

    let (path, query_string) = match target.split_once('?') {
        Some((path, query)) => (path, query),
        None => (target, ""),
    };

    let mut query = HashMap::new();
    for pair in query_string.split('&').filter(|p| !p.is_empty()) {
        let (key, value) = pair.split_once('=').unwrap_or((pair, ""));
        query.insert(key.to_string(), value.to_string());
    }

    let mut headers = HashMap::new();
    for line in lines {
        if let Some((name, value)) = line.split_once(':') {
            headers.insert(name.trim().to_ascii_lowercase(), value.trim().to_string());
        }
    }

    Some((
        HttpRequest {
            method,
            path: path.to_string(),
            query,
            headers,
            body: Vec::new(),
        },
        body_offset,
    ))
}

/// Find the first occurrence of `needle` in `haystack`.
fn find_subsequence(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    haystack
        .windows(needle.len())
        .position(|window| window == needle)
}

/// Read one full request from the stream: head, then `Content-Length`
/// bytes of body.
async fn read_request(stream: &mut tokio::net::TcpStream) -> Result<Option<HttpRequest>> {
    let mut buf = Vec::with_capacity(4096);
    let mut chunk = [0u8; 4096];

    // Read until the head is complete.
    let (mut request, body_offset) = loop {
        let n = stream
            .read(&mut chunk)
            .await
            .map_err(|e| SpoolError::Http(format!("read: {e}")))?;
        if n == 0 {
            return Ok(None); // peer closed before sending a full head
        }
        buf.extend_from_slice(&chunk[..n]);
        if buf.len() > MAX_REQUEST_BYTES {
            return Err(SpoolError::Http("request too large".into()));
        }
        if let Some(parsed) = parse_head(&buf) {
            break parsed;
        }
    };

    let content_length = request
        .header("content-length")
        .and_then(|v| v.parse::<usize>().ok())
        .unwrap_or(0);
    if content_length > MAX_REQUEST_BYTES {
        return Err(SpoolError::Http("request body too large".into()));
    }

    let mut body = buf[body_offset..].to_vec();
    while body.len() < content_length {
        let n = stream
            .read(&mut chunk)
            .await
            .map_err(|e| SpoolError::Http(format!("read body: {e}")))?;
        if n == 0 {
            return Err(SpoolError::Http("connection closed mid-body".into()));
        }
        body.extend_from_slice(&chunk[..n]);
    }
    body.truncate(content_length);
    request.body = body;

    Ok(Some(request))
}

// ---------------------------------------------------------------------------
// Response building
// ---------------------------------------------------------------------------

fn reason_phrase(status: u16) -> &'static str {
    match status {
        200 => "OK",
        201 => "Created",
        400 => "Bad Request",
        401 => "Unauthorized",
        403 => "Forbidden",
        404 => "Not Found",
        500 => "Internal Server Error",
        _ => "OK",
    }
}

/// Serialize a JSON body into a complete HTTP/1.1 response.
fn http_response(status: u16, body: &Value) -> Vec<u8> {
    let body_bytes = body.to_string().into_bytes();
    let mut response = format!(
        "HTTP/1.1 {status} {}\r\n\
         Content-Type: application/json\r\n\
         Content-Length: {}\r\n\
         Connection: close\r\n\r\n",
        reason_phrase(status),
        body_bytes.len(),
    )
    .into_bytes();
    response.extend_from_slice(&body_bytes);
    response
}

// ---------------------------------------------------------------------------
// Shared state and routing
// ---------------------------------------------------------------------------

/// State shared across all connection-handling tasks.
struct SharedState {
    service: Arc<SpoolService>,
    /// Notified by POST /stop so the main loop can shut the agent down.
    stop_requested: Arc<Notify>,
}

/// Check the static token on a mutating request, if one is configured.
fn authorized(request: &HttpRequest, body_json: Option<&Value>, state: &SharedState) -> bool {
    let Some(expected) = state.service.config().auth_token.as_deref() else {
        return true;
    };

    let supplied = request
        .header("authorization")
        .or_else(|| request.query.get("token").map(String::as_str))
        .or_else(|| {
            body_json
                .and_then(|v| v.get("token"))
                .and_then(Value::as_str)
        });

    supplied == Some(expected)
}

/// Route one parsed request to its handler; returns status plus JSON body.
fn route(request: &HttpRequest, peer_addr: SocketAddr, state: &SharedState) -> (u16, Value) {
    match (request.method.as_str(), request.path.as_str()) {
        ("GET", "/health") => match state.service.stats() {
            Ok(stats) => (200, json!({ "ok": true, "pending": stats.pending_count })),
            Err(e) => (500, json!({ "error": e.to_string() })),
        },

        ("GET", "/status") => match state.service.stats() {
            Ok(stats) => (
                200,
                json!({
                    "ok": true,
                    "pending": stats.pending_count,
                    "db_path": state.service.config().db_path.display().to_string(),
                }),
            ),
            Err(e) => (500, json!({ "error": e.to_string() })),
        },

        ("GET", "/queue") => {
            let limit = request
                .query
                .get("limit")
                .and_then(|v| v.parse().ok())
                .unwrap_or(DEFAULT_QUEUE_LIMIT);
            match state.service.list(limit) {
                Ok(jobs) => (200, json!({ "jobs": jobs })),
                Err(e) => (500, json!({ "error": e.to_string() })),
            }
        }

        ("POST", "/print") => handle_print(request, state),

        ("POST", path) if path.starts_with("/reprint/") => {
            if !authorized(request, None, state) {
                return (401, json!({ "error": "unauthorized" }));
            }
            let id = match path["/reprint/".len()..].parse::<i64>() {
                Ok(id) => JobId(id),
                Err(_) => return (404, json!({ "error": "not found" })),
            };
            match state.service.reprint(id) {
                Ok(new_id) => (201, json!({ "ok": true, "new_job_id": new_id })),
                Err(SpoolError::NotFound(_)) => (404, json!({ "error": "not found" })),
                Err(e) => (500, json!({ "error": e.to_string() })),
            }
        }

        ("POST", "/stop") => {
            // Only local callers may stop the agent.
            if !peer_addr.ip().is_loopback() {
                return (403, json!({ "error": "forbidden" }));
            }
            state.stop_requested.notify_one();
            (200, json!({ "ok": true }))
        }

        _ => (404, json!({ "error": "not found" })),
    }
}

/// POST /print: validate the JSON body and admit the job.
fn handle_print(request: &HttpRequest, state: &SharedState) -> (u16, Value) {
    let body_json: Value = match serde_json::from_slice(&request.body) {
        Ok(value) => value,
        Err(_) => return (400, json!({ "error": "expected JSON payload" })),
    };

    if !authorized(request, Some(&body_json), state) {
        return (401, json!({ "error": "unauthorized" }));
    }

    let print_request: PrintRequest = match serde_json::from_value(body_json) {
        Ok(parsed) => parsed,
        Err(_) => return (400, json!({ "error": "expected JSON payload" })),
    };

    match state.service.admit(print_request) {
        Ok(id) => (201, json!({ "ok": true, "job_id": id })),
        Err(SpoolError::InvalidPayload(detail)) => (400, json!({ "error": detail })),
        Err(e) => (500, json!({ "error": e.to_string() })),
    }
}

// ---------------------------------------------------------------------------
// HttpServer
// ---------------------------------------------------------------------------

/// The agent's HTTP front end.
///
/// Binds a TCP listener and accepts connections; each connection is handled
/// in its own spawned task and closed after one request/response exchange.
pub struct HttpServer {
    bind_addr: String,
    port: u16,
    /// Notification handle used to signal a graceful shutdown.
    shutdown_signal: Arc<Notify>,
    /// Handle to the Tokio task running the accept loop.
    task_handle: Option<JoinHandle<()>>,
}

impl HttpServer {
    /// Create a new server for the given bind address and port.
    ///
    /// Port 0 asks the OS for an ephemeral port; [`port`](Self::port)
    /// reports the bound port after [`start`](Self::start).
    pub fn new(bind_addr: impl Into<String>, port: u16) -> Self {
        Self {
            bind_addr: bind_addr.into(),
            port,
            shutdown_signal: Arc::new(Notify::new()),
            task_handle: None,
        }
    }

    /// The port this server is (or will be) bound to.
    pub fn port(&self) -> u16 {
        self.port
    }

    /// Bind the listener and spawn the accept loop.
    ///
    /// `stop_requested` is notified when a loopback client POSTs /stop,
    /// so the caller can drive the agent's shutdown.
    ///
    /// # Errors
    ///
    /// Returns an error if the address cannot be bound.
    pub async fn start(
        &mut self,
        service: Arc<SpoolService>,
        stop_requested: Arc<Notify>,
    ) -> Result<()> {
        if self.task_handle.is_some() {
            debug!(port = self.port, "HTTP server already running");
            return Ok(());
        }

        let listener = TcpListener::bind((self.bind_addr.as_str(), self.port))
            .await
            .map_err(|e| {
                SpoolError::Http(format!("bind {}:{}: {e}", self.bind_addr, self.port))
            })?;
        self.port = listener
            .local_addr()
            .map_err(|e| SpoolError::Http(format!("local addr: {e}")))?
            .port();

        info!(addr = %self.bind_addr, port = self.port, "HTTP API listening");

        let shutdown = Arc::clone(&self.shutdown_signal);
        let state = Arc::new(SharedState {
            service,
            stop_requested,
        });

        self.task_handle = Some(tokio::spawn(async move {
            Self::accept_loop(listener, shutdown, state).await;
        }));
        Ok(())
    }

    /// Gracefully stop the server.
    ///
    /// Connections already being handled are allowed to finish.
    pub async fn stop(&mut self) -> Result<()> {
        let Some(handle) = self.task_handle.take() else {
            return Ok(());
        };

        info!(port = self.port, "stopping HTTP API");
        self.shutdown_signal.notify_one();
        handle
            .await
            .map_err(|e| SpoolError::Http(format!("task join: {e}")))?;
        Ok(())
    }

    /// The main accept loop; runs until the shutdown signal is received.
    async fn accept_loop(listener: TcpListener, shutdown: Arc<Notify>, state: Arc<SharedState>) {
        loop {
            tokio::select! {
                _ = shutdown.notified() => {
                    debug!("accept loop received shutdown signal");
                    break;
                }

                accept_result = listener.accept() => {
                    match accept_result {
                        Ok((stream, peer_addr)) => {
                            let state = Arc::clone(&state);
                            tokio::spawn(async move {
                                if let Err(e) =
                                    Self::handle_connection(stream, peer_addr, state).await
                                {
                                    warn!(peer = %peer_addr, error = %e, "connection handler error");
                                }
                            });
                        }
                        Err(e) => {
                            error!(error = %e, "failed to accept connection");
                        }
                    }
                }
            }
        }
    }

    /// Handle one request/response exchange, then close the connection.
    async fn handle_connection(
        mut stream: tokio::net::TcpStream,
        peer_addr: SocketAddr,
        state: Arc<SharedState>,
    ) -> Result<()> {
        let Some(request) = read_request(&mut stream).await? else {
            debug!(peer = %peer_addr, "empty request -- closing connection");
            return Ok(());
        };

        debug!(
            peer = %peer_addr,
            method = %request.method,
            path = %request.path,
            body_bytes = request.body.len(),
            "request received"
        );

        let (status, body) = route(&request, peer_addr, &state);
        let response = http_response(status, &body);

        stream
            .write_all(&response)
            .await
            .map_err(|e| SpoolError::Http(format!("write to {peer_addr}: {e}")))?;
        stream
            .shutdown()
            .await
            .map_err(|e| SpoolError::Http(format!("shutdown to {peer_addr}: {e}")))?;

        info!(
            peer = %peer_addr,
            method = %request.method,
            path = %request.path,
            status,
            "response sent"
        );
        Ok(())
    }
}
