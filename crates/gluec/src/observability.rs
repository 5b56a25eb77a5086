use std::any::Any;
use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use glue_rt::{config as rt_config, json as rt_json, log};

pub const REQUEST_ID_HEADER: &str = "x-request-id";
pub const REQUEST_ID_FALLBACK_HEADER: &str = "x-correlation-id";
pub const RESPONSE_REQUEST_ID_HEADER: &str = "X-Request-Id";

static NEXT_REQUEST_ID: AtomicU64 = AtomicU64::new(1);

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct PanicDetails {
    pub kind: &'static str,
    pub message: String,
}

pub fn classify_panic_payload(payload: &(dyn Any + Send)) -> PanicDetails {
    if let Some(message) = payload.downcast_ref::<&str>() {
        return PanicDetails {
            kind: "panic_static_str",
            message: (*message).to_string(),
        };
    }
    if let Some(message) = payload.downcast_ref::<String>() {
        return PanicDetails {
            kind: "panic_string",
            message: message.clone(),
        };
    }
    PanicDetails {
        kind: "panic_non_string",
        message: "panic".to_string(),
    }
}

pub fn format_panic_message(details: &PanicDetails) -> String {
    if details.message.is_empty() {
        format!("panic_kind={}", details.kind)
    } else {
        format!("panic_kind={} {}", details.kind, details.message)
    }
}

pub fn resolve_request_id(headers: &HashMap<String, String>) -> String {
    request_id_from_header(headers, REQUEST_ID_HEADER)
        .or_else(|| request_id_from_header(headers, REQUEST_ID_FALLBACK_HEADER))
        .unwrap_or_else(next_request_id)
}

pub struct RequestLog<'a> {
    pub port: u16,
    pub request_id: &'a str,
    pub method: &'a str,
    pub path: &'a str,
    pub status: u16,
    pub duration: Duration,
    pub response_bytes: usize,
}

/// One line per handled request: a JSON object when `GLUE_REQUEST_LOG=structured`,
/// otherwise a plain info log line.
pub fn emit_request_log(entry: &RequestLog<'_>) {
    let duration_ms = entry.duration.as_secs_f64() * 1000.0;
    if structured_request_logging_enabled() {
        eprintln!("{}", rt_json::encode(&request_log_json(entry, duration_ms)));
        return;
    }
    log::info(&format!(
        "{} {} :{} -> {} ({} bytes, {duration_ms:.1}ms) [{}]",
        entry.method,
        entry.path,
        entry.port,
        entry.status,
        entry.response_bytes,
        entry.request_id
    ));
}

fn request_log_json(entry: &RequestLog<'_>, duration_ms: f64) -> rt_json::JsonValue {
    let mut obj = BTreeMap::new();
    obj.insert(
        "duration_ms".to_string(),
        rt_json::JsonValue::Float(duration_ms),
    );
    obj.insert(
        "event".to_string(),
        rt_json::JsonValue::String("http.request".to_string()),
    );
    obj.insert(
        "method".to_string(),
        rt_json::JsonValue::String(entry.method.to_string()),
    );
    obj.insert(
        "path".to_string(),
        rt_json::JsonValue::String(entry.path.to_string()),
    );
    obj.insert(
        "port".to_string(),
        rt_json::JsonValue::Int(i64::from(entry.port)),
    );
    obj.insert(
        "request_id".to_string(),
        rt_json::JsonValue::String(entry.request_id.to_string()),
    );
    obj.insert(
        "response_bytes".to_string(),
        rt_json::JsonValue::Int(entry.response_bytes as i64),
    );
    obj.insert(
        "status".to_string(),
        rt_json::JsonValue::Int(i64::from(entry.status)),
    );
    rt_json::JsonValue::Object(obj)
}

fn request_id_from_header(headers: &HashMap<String, String>, key: &str) -> Option<String> {
    headers.get(key).and_then(|raw| sanitize_request_id(raw))
}

fn sanitize_request_id(raw: &str) -> Option<String> {
    let value = raw.trim();
    if value.is_empty() || value.len() > 128 {
        return None;
    }
    if value
        .chars()
        .all(|ch| ch.is_ascii_alphanumeric() || matches!(ch, '-' | '_' | '.' | ':' | '/' | '@'))
    {
        Some(value.to_string())
    } else {
        None
    }
}

fn next_request_id() -> String {
    let next = NEXT_REQUEST_ID.fetch_add(1, Ordering::Relaxed);
    format!("req-{next:016x}")
}

fn structured_request_logging_enabled() -> bool {
    rt_config::env_value("glue", "request_log").is_some_and(|raw| {
        matches!(
            raw.to_ascii_lowercase().as_str(),
            "1" | "true" | "structured" | "json"
        )
    })
}
