use std::collections::{BTreeMap, HashMap};
use std::io::{self, Read, Write};
use std::net::{TcpListener, TcpStream};
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::thread;
use std::time::Instant;

use glue_rt::{config as rt_config, error as rt_error, json as rt_json, log};
use thiserror::Error;

use crate::ast::{ApiDecl, Program};
use crate::codec;
use crate::interp::fetch::find_header_end;
use crate::interp::{Evaluator, Output};
use crate::observability::{self, RequestLog};
use crate::task_pool::TaskPool;

pub const DEFAULT_HOST: &str = "0.0.0.0";
pub const DEFAULT_WORKERS: usize = 4;
const MAX_HEADER_BYTES: usize = 1024 * 1024;

#[derive(Debug, Error)]
pub enum ServeError {
    #[error("failed to bind {addr}: {source}")]
    Bind { addr: String, source: io::Error },
    #[error("invalid server configuration: {0}")]
    Config(String),
    #[error("no api declared")]
    NoRoutes,
}

/// Port → (request target → api). Built once before serving and never mutated.
#[derive(Debug, Default)]
pub struct RouteTable {
    ports: BTreeMap<u16, HashMap<String, Arc<ApiDecl>>>,
}

impl RouteTable {
    pub fn from_program(program: Program, port_override: Option<u16>) -> Self {
        let mut table = RouteTable::default();
        for mut api in program.apis {
            if let Some(port) = port_override {
                api.port = port;
            }
            let routes = table.ports.entry(api.port).or_default();
            let path = api.path.value.clone();
            if routes.contains_key(&path) {
                log::warn(&format!(
                    "api {path} on port {} declared twice; the later declaration wins",
                    api.port
                ));
            }
            routes.insert(path, Arc::new(api));
        }
        table
    }

    pub fn is_empty(&self) -> bool {
        self.ports.is_empty()
    }

    pub fn ports(&self) -> Vec<u16> {
        self.ports.keys().copied().collect()
    }

    pub fn lookup(&self, port: u16, target: &str) -> Option<Arc<ApiDecl>> {
        self.ports.get(&port)?.get(target).cloned()
    }

    /// `(port, path)` pairs, sorted by port then path.
    pub fn routes(&self) -> Vec<(u16, String)> {
        let mut out = Vec::new();
        for (port, routes) in &self.ports {
            let mut paths: Vec<_> = routes.keys().cloned().collect();
            paths.sort();
            out.extend(paths.into_iter().map(|path| (*port, path)));
        }
        out
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ServeConfig {
    pub host: String,
    pub workers: usize,
    /// Connections accepted per listener before it stops; `0` means unlimited.
    pub max_requests: usize,
}

impl Default for ServeConfig {
    fn default() -> Self {
        Self {
            host: DEFAULT_HOST.to_string(),
            workers: DEFAULT_WORKERS,
            max_requests: 0,
        }
    }
}

impl ServeConfig {
    pub fn from_env() -> Result<Self, ServeError> {
        let defaults = Self::default();
        let host = rt_config::env_value("glue", "host").unwrap_or(defaults.host);
        let workers = rt_config::env_parse::<usize>("glue", "workers")
            .map_err(ServeError::Config)?
            .unwrap_or(defaults.workers);
        if workers == 0 {
            return Err(ServeError::Config(format!(
                "{} must be at least 1",
                rt_config::env_key("glue", "workers")
            )));
        }
        let max_requests = rt_config::env_parse::<usize>("glue", "max_requests")
            .map_err(ServeError::Config)?
            .unwrap_or(defaults.max_requests);
        Ok(Self {
            host,
            workers,
            max_requests,
        })
    }
}

pub struct Server {
    routes: Arc<RouteTable>,
    config: ServeConfig,
    listeners: Vec<(u16, TcpListener)>,
}

impl Server {
    pub fn bind(routes: RouteTable, config: ServeConfig) -> Result<Self, ServeError> {
        if routes.is_empty() {
            return Err(ServeError::NoRoutes);
        }
        let mut listeners = Vec::new();
        for port in routes.ports() {
            let addr = format!("{}:{port}", config.host);
            let listener =
                TcpListener::bind(&addr).map_err(|source| ServeError::Bind { addr, source })?;
            listeners.push((port, listener));
        }
        Ok(Self {
            routes: Arc::new(routes),
            config,
            listeners,
        })
    }

    pub fn ports(&self) -> Vec<u16> {
        self.listeners.iter().map(|(port, _)| *port).collect()
    }

    /// Runs one accept loop per listener and hands connections to the worker pool.
    /// Returns once every listener stopped and queued requests finished.
    pub fn serve(self) -> Result<(), ServeError> {
        let pool = TaskPool::new(self.config.workers, "glue-worker");
        log::info(&format!(
            "serving {} port(s) with {} workers",
            self.listeners.len(),
            pool.size()
        ));
        let max_requests = self.config.max_requests;
        thread::scope(|scope| {
            for (port, listener) in &self.listeners {
                let port = *port;
                let pool = &pool;
                let routes = &self.routes;
                let spawned = thread::Builder::new()
                    .name(format!("glue-accept-{port}"))
                    .spawn_scoped(scope, move || {
                        accept_loop(listener, port, routes, pool, max_requests)
                    });
                if let Err(err) = spawned {
                    log::error(&format!("failed to start listener on port {port}: {err}"));
                }
            }
        });
        Ok(())
    }
}

fn accept_loop(
    listener: &TcpListener,
    port: u16,
    routes: &Arc<RouteTable>,
    pool: &TaskPool,
    max_requests: usize,
) {
    let mut handled = 0usize;
    for stream in listener.incoming() {
        match stream {
            Ok(stream) => {
                let routes = Arc::clone(routes);
                pool.submit(move || handle_connection(stream, port, &routes));
            }
            Err(err) => {
                log::warn(&format!("failed to accept connection on port {port}: {err}"));
                continue;
            }
        }
        handled += 1;
        if max_requests > 0 && handled >= max_requests {
            break;
        }
    }
}

#[derive(Debug)]
struct HttpRequest {
    method: String,
    target: String,
    headers: HashMap<String, String>,
}

struct HttpResponse {
    status: u16,
    content_type: &'static str,
    body: String,
}

impl HttpResponse {
    fn json(status: u16, value: &rt_json::JsonValue) -> Self {
        Self {
            status,
            content_type: "application/json",
            body: rt_json::encode(value),
        }
    }

    fn text(status: u16, body: String) -> Self {
        Self {
            status,
            content_type: "text/plain; charset=utf-8",
            body,
        }
    }

    fn to_wire(&self, request_id: &str) -> String {
        let reason = match self.status {
            200 => "OK",
            400 => "Bad Request",
            404 => "Not Found",
            500 => "Internal Server Error",
            _ => "OK",
        };
        format!(
            "HTTP/1.1 {} {reason}\r\nContent-Type: {}\r\nContent-Length: {}\r\n{}: {request_id}\r\nConnection: close\r\n\r\n{}",
            self.status,
            self.content_type,
            self.body.len(),
            observability::RESPONSE_REQUEST_ID_HEADER,
            self.body
        )
    }
}

fn handle_connection(mut stream: TcpStream, port: u16, routes: &RouteTable) {
    let started = Instant::now();
    let (request, response) = match read_http_request(&mut stream) {
        Ok(request) => {
            let response = dispatch(&request, port, routes);
            (Some(request), response)
        }
        Err(message) => {
            log::debug(&format!("bad request on port {port}: {message}"));
            (None, HttpResponse::text(400, format!("Bad Request: {message}")))
        }
    };
    let request_id = match &request {
        Some(request) => observability::resolve_request_id(&request.headers),
        None => observability::resolve_request_id(&HashMap::new()),
    };
    let wire = response.to_wire(&request_id);
    if let Err(err) = stream.write_all(wire.as_bytes()) {
        log::debug(&format!("failed to write response on port {port}: {err}"));
    }
    let _ = stream.flush();
    observability::emit_request_log(&RequestLog {
        port,
        request_id: &request_id,
        method: request.as_ref().map_or("-", |r| r.method.as_str()),
        path: request.as_ref().map_or("-", |r| r.target.as_str()),
        status: response.status,
        duration: started.elapsed(),
        response_bytes: response.body.len(),
    });
}

fn dispatch(request: &HttpRequest, port: u16, routes: &RouteTable) -> HttpResponse {
    let Some(api) = routes.lookup(port, &request.target) else {
        return HttpResponse::text(404, format!("Not Found (on port {port})"));
    };
    let run = panic::catch_unwind(AssertUnwindSafe(|| {
        Evaluator::new(Output::Tee).run_api(&api)
    }));
    match run {
        Ok(Ok(outcome)) => {
            HttpResponse::json(200, &codec::value_to_json(&outcome.response_value()))
        }
        Ok(Err(err)) => {
            log::warn(&format!("api {} on port {port} failed: {err}", request.target));
            HttpResponse::json(
                500,
                &rt_error::error_json("execution_error", &err.to_string()),
            )
        }
        Err(payload) => {
            let details = observability::classify_panic_payload(payload.as_ref());
            log::error(&format!(
                "api {} on port {port} panicked: {}",
                request.target,
                observability::format_panic_message(&details)
            ));
            HttpResponse::json(
                500,
                &rt_error::error_json("internal_error", "internal server error"),
            )
        }
    }
}

fn read_http_request(stream: &mut TcpStream) -> Result<HttpRequest, String> {
    let mut buffer = Vec::new();
    let mut temp = [0u8; 1024];
    let mut header_end = None;
    loop {
        let read = stream
            .read(&mut temp)
            .map_err(|err| format!("failed to read request: {err}"))?;
        if read == 0 {
            break;
        }
        buffer.extend_from_slice(&temp[..read]);
        if let Some(pos) = find_header_end(&buffer) {
            header_end = Some(pos);
            break;
        }
        if buffer.len() > MAX_HEADER_BYTES {
            return Err("request header too large".to_string());
        }
    }
    let header_end = header_end.ok_or_else(|| "missing headers".to_string())?;
    let header_text = String::from_utf8_lossy(&buffer[..header_end]);
    let mut lines = header_text.split("\r\n");
    let request_line = lines.next().unwrap_or_default();
    let mut parts = request_line.split_whitespace();
    let (Some(method), Some(target), Some(version)) = (parts.next(), parts.next(), parts.next())
    else {
        return Err(format!("invalid request line: {request_line}"));
    };
    if !version.starts_with("HTTP/") {
        return Err(format!("invalid request line: {request_line}"));
    }
    let mut headers = HashMap::new();
    for line in lines {
        if let Some((key, value)) = line.split_once(':') {
            headers.insert(key.trim().to_ascii_lowercase(), value.trim().to_string());
        }
    }
    let content_length = headers
        .get("content-length")
        .and_then(|v| v.parse::<usize>().ok())
        .unwrap_or(0);
    // bodies are drained but unused
    let mut body_len = buffer.len() - (header_end + 4);
    while body_len < content_length {
        let read = stream
            .read(&mut temp)
            .map_err(|err| format!("failed to read body: {err}"))?;
        if read == 0 {
            break;
        }
        body_len += read;
    }
    Ok(HttpRequest {
        method: method.to_string(),
        target: target.to_string(),
        headers,
    })
}
