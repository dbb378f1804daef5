//! HTTP surface: `GET /analysis` and `GET /health` over `tiny_http`.
//!
//! One accept thread polls the listener. Every request is answered on its
//! own thread, because an analysis holds its connection open for the whole
//! requested window.

use serde::Serialize;
use sp_common::{Error, Result, StructuredError};
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};
use tracing::{debug, error, info, warn};

use crate::analysis::{analyze, AnalysisRequest};
use crate::logging::event_names;
use crate::session::EventStream;
use crate::source::SourceSnapshot;

/// How often the accept loop checks for shutdown.
const POLL_INTERVAL: Duration = Duration::from_millis(250);

const NOT_FOUND_BODY: &str = "404 page not found\n";

/// Status and JSON body of one response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reply {
    pub status: u16,
    pub body: String,
    pub json: bool,
}

impl Reply {
    fn json(status: u16, body: String) -> Self {
        Reply {
            status,
            body,
            json: true,
        }
    }

    fn not_found() -> Self {
        Reply {
            status: 404,
            body: NOT_FOUND_BODY.to_string(),
            json: false,
        }
    }

    fn error(status: u16, err: &Error) -> Self {
        Reply::json(status, format!("{}\n", StructuredError::from(err).to_json_pretty()))
    }
}

/// Body of `GET /health`.
#[derive(Debug, Clone, Serialize)]
pub struct HealthReport {
    /// RFC 3339 time the report was built.
    pub generated_at: String,
    /// Whether the event feed has ended.
    pub done: bool,
    /// Read error that ended the feed.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub counters: SourceSnapshot,
}

impl HealthReport {
    pub fn of(stream: &EventStream) -> Self {
        HealthReport {
            generated_at: chrono::Utc::now().to_rfc3339(),
            done: stream.is_done(),
            error: stream.error().map(|e| e.to_string()),
            counters: stream.counters(),
        }
    }
}

/// Route one request. Blocks for the analysis window on `/analysis`.
pub fn handle(stream: &EventStream, method: &str, url: &str) -> Reply {
    if method != "GET" {
        return Reply::not_found();
    }
    let (path, query) = url.split_once('?').unwrap_or((url, ""));

    match path {
        "/analysis" => match AnalysisRequest::from_query(query) {
            Ok(request) => {
                let report = analyze(stream, &request);
                match report.to_json_pretty() {
                    Ok(body) => Reply::json(200, body + "\n"),
                    Err(e) => {
                        error!(error = %e, "failed to encode analysis report");
                        Reply::error(500, &e)
                    }
                }
            }
            Err(e) => Reply::error(400, &e),
        },
        "/health" => match serde_json::to_string_pretty(&HealthReport::of(stream)) {
            Ok(body) => Reply::json(200, body + "\n"),
            Err(e) => Reply::error(500, &Error::from(e)),
        },
        _ => Reply::not_found(),
    }
}

/// Handle to the running HTTP server.
pub struct AnalysisServer {
    shutdown: Arc<AtomicBool>,
    thread: Option<thread::JoinHandle<()>>,
    addr: SocketAddr,
}

impl AnalysisServer {
    /// Bind `addr` and serve `stream` on a background thread.
    pub fn start(addr: &str, stream: Arc<EventStream>) -> Result<Self> {
        let server = tiny_http::Server::http(addr)
            .map_err(|e| Error::Server(format!("failed to listen on {}: {}", addr, e)))?;
        let bound = server
            .server_addr()
            .to_ip()
            .ok_or_else(|| Error::Server(format!("{} is not an IP address", addr)))?;

        let shutdown = Arc::new(AtomicBool::new(false));
        let loop_shutdown = Arc::clone(&shutdown);
        let thread = thread::Builder::new()
            .name("sp-http".to_string())
            .spawn(move || serve_loop(server, stream, &loop_shutdown))?;

        info!(event = event_names::SERVER_STARTED, addr = %bound, "listening");
        Ok(AnalysisServer {
            shutdown,
            thread: Some(thread),
            addr: bound,
        })
    }

    /// Bound address.
    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    /// Block until the accept loop exits.
    pub fn wait(mut self) {
        if let Some(thread) = self.thread.take() {
            if thread.join().is_err() {
                error!("accept loop panicked");
            }
        }
    }

    /// Stop accepting requests and wait for the accept loop to exit.
    /// In-flight analyses finish on their own threads.
    pub fn shutdown(mut self) {
        self.stop();
        info!(event = event_names::SERVER_STOPPED, "server stopped");
    }

    fn stop(&mut self) {
        self.shutdown.store(true, Ordering::SeqCst);
        if let Some(thread) = self.thread.take() {
            let _ = thread.join();
        }
    }
}

impl Drop for AnalysisServer {
    fn drop(&mut self) {
        self.stop();
    }
}

fn serve_loop(server: tiny_http::Server, stream: Arc<EventStream>, shutdown: &AtomicBool) {
    while !shutdown.load(Ordering::SeqCst) {
        let request = match server.recv_timeout(POLL_INTERVAL) {
            Ok(Some(request)) => request,
            Ok(None) => continue,
            Err(e) => {
                if !shutdown.load(Ordering::SeqCst) {
                    error!(error = %e, "accept error");
                }
                break;
            }
        };

        let stream = Arc::clone(&stream);
        let spawned = thread::Builder::new()
            .name("sp-request".to_string())
            .spawn(move || respond(&stream, request));
        if let Err(e) = spawned {
            warn!(error = %e, "failed to spawn request thread, request dropped");
        }
    }
    debug!("accept loop exited");
}

fn respond(stream: &EventStream, request: tiny_http::Request) {
    let started = Instant::now();
    let method = request.method().as_str().to_string();
    let url = request.url().to_string();

    let reply = handle(stream, &method, &url);
    if reply.status == 400 {
        debug!(
            event = event_names::SERVER_REJECTED,
            url = %url,
            "invalid analysis request"
        );
    }
    info!(
        event = event_names::SERVER_REQUEST,
        method = %method,
        url = %url,
        status = reply.status,
        elapsed_ms = started.elapsed().as_millis() as u64,
        "request served"
    );

    let mut response = tiny_http::Response::from_string(reply.body).with_status_code(reply.status);
    let content_type: &[u8] = if reply.json {
        b"application/json"
    } else {
        b"text/plain; charset=utf-8"
    };
    if let Ok(header) = tiny_http::Header::from_bytes(&b"Content-Type"[..], content_type) {
        response.add_header(header);
    }
    if let Err(e) = request.respond(response) {
        warn!(error = %e, "failed to send response");
    }
}
