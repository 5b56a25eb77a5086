use std::collections::HashMap;
use std::io::{self, Read, Write};
use std::net::TcpStream;
use std::sync::{Arc, OnceLock};

use rustls::pki_types::ServerName;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum FetchError {
    #[error("invalid url: {0}")]
    InvalidUrl(String),
    #[error("unsupported url scheme: {0}")]
    UnsupportedScheme(String),
    #[error("connection failed: {0}")]
    Io(#[from] io::Error),
    #[error("tls error: {0}")]
    Tls(String),
    #[error("invalid http response: {0}")]
    InvalidResponse(String),
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Scheme {
    Http,
    Https,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Url {
    pub scheme: Scheme,
    pub host: String,
    pub port: u16,
    /// Request target: path plus query, always starting with `/`.
    pub target: String,
}

pub fn parse_url(raw: &str) -> Result<Url, FetchError> {
    let trimmed = raw.trim();
    let (scheme, rest) = if let Some(rest) = trimmed.strip_prefix("http://") {
        (Scheme::Http, rest)
    } else if let Some(rest) = trimmed.strip_prefix("https://") {
        (Scheme::Https, rest)
    } else {
        let scheme = trimmed.split_once("://").map(|(s, _)| s).unwrap_or(trimmed);
        return Err(FetchError::UnsupportedScheme(scheme.to_string()));
    };
    let split_at = rest.find(['/', '?']).unwrap_or(rest.len());
    let (authority, tail) = rest.split_at(split_at);
    let target = if tail.is_empty() {
        "/".to_string()
    } else if tail.starts_with('?') {
        format!("/{tail}")
    } else {
        tail.to_string()
    };
    let default_port = match scheme {
        Scheme::Http => 80,
        Scheme::Https => 443,
    };
    let invalid = || FetchError::InvalidUrl(raw.to_string());
    if authority.contains('@') {
        return Err(invalid());
    }
    let (host, port) = if let Some(bracketed) = authority.strip_prefix('[') {
        let (host, rest) = bracketed.split_once(']').ok_or_else(invalid)?;
        let port = match rest {
            "" => default_port,
            _ => parse_port(rest.strip_prefix(':').ok_or_else(invalid)?).ok_or_else(invalid)?,
        };
        (host, port)
    } else {
        match authority.rsplit_once(':') {
            Some((host, port)) => (host, parse_port(port).ok_or_else(invalid)?),
            None => (authority, default_port),
        }
    };
    if host.is_empty() || (host.contains([':', '[', ']']) && !authority.starts_with('[')) {
        return Err(invalid());
    }
    let host = host.to_string();
    Ok(Url {
        scheme,
        host,
        port,
        target,
    })
}

/// Synchronous GET. Returns the response body whatever the status code.
pub fn http_get(raw_url: &str) -> Result<String, FetchError> {
    let url = parse_url(raw_url)?;
    let request = format!(
        "GET {} HTTP/1.1\r\nHost: {}\r\nUser-Agent: glue/{}\r\nAccept: application/json\r\nConnection: close\r\n\r\n",
        url.target,
        host_header(&url),
        env!("CARGO_PKG_VERSION")
    );
    let stream = TcpStream::connect((url.host.as_str(), url.port))?;
    let raw = match url.scheme {
        Scheme::Http => exchange(stream, request.as_bytes())?,
        Scheme::Https => {
            let conn = rustls::ClientConnection::new(tls_config()?, server_name(&url.host)?)
                .map_err(|err| FetchError::Tls(err.to_string()))?;
            exchange(rustls::StreamOwned::new(conn, stream), request.as_bytes())?
        }
    };
    let response = parse_response(&raw)?;
    if !(200..300).contains(&response.status) {
        glue_rt::log::debug(&format!("GET {raw_url} answered {}", response.status));
    }
    Ok(String::from_utf8_lossy(&response.body).into_owned())
}

fn parse_port(raw: &str) -> Option<u16> {
    raw.parse::<u16>().ok()
}

fn host_header(url: &Url) -> String {
    let default_port = match url.scheme {
        Scheme::Http => 80,
        Scheme::Https => 443,
    };
    let host = if url.host.contains(':') {
        format!("[{}]", url.host)
    } else {
        url.host.clone()
    };
    if url.port == default_port {
        host
    } else {
        format!("{host}:{}", url.port)
    }
}

fn exchange<S: Read + Write>(mut stream: S, request: &[u8]) -> Result<Vec<u8>, FetchError> {
    stream.write_all(request)?;
    stream.flush()?;
    let mut buffer = Vec::new();
    match stream.read_to_end(&mut buffer) {
        Ok(_) => {}
        // peers that close without a TLS close_notify still delivered a full response
        Err(err) if err.kind() == io::ErrorKind::UnexpectedEof && !buffer.is_empty() => {}
        Err(err) => return Err(err.into()),
    }
    Ok(buffer)
}

fn server_name(host: &str) -> Result<ServerName<'static>, FetchError> {
    ServerName::try_from(host.to_string()).map_err(|err| FetchError::Tls(err.to_string()))
}

fn tls_config() -> Result<Arc<rustls::ClientConfig>, FetchError> {
    static CONFIG: OnceLock<Result<Arc<rustls::ClientConfig>, String>> = OnceLock::new();
    CONFIG
        .get_or_init(build_tls_config)
        .clone()
        .map_err(FetchError::Tls)
}

fn build_tls_config() -> Result<Arc<rustls::ClientConfig>, String> {
    let mut roots = rustls::RootCertStore::empty();
    let native = rustls_native_certs::load_native_certs();
    for err in &native.errors {
        glue_rt::log::warn(&format!("failed to load platform certificate: {err}"));
    }
    let (added, ignored) = roots.add_parsable_certificates(native.certs);
    glue_rt::log::debug(&format!(
        "loaded {added} root certificates ({ignored} ignored)"
    ));
    let provider = Arc::new(rustls::crypto::ring::default_provider());
    let config = rustls::ClientConfig::builder_with_provider(provider)
        .with_safe_default_protocol_versions()
        .map_err(|err| err.to_string())?
        .with_root_certificates(roots)
        .with_no_client_auth();
    Ok(Arc::new(config))
}

#[derive(Debug)]
pub struct HttpResponse {
    pub status: u16,
    pub headers: HashMap<String, String>,
    pub body: Vec<u8>,
}

pub fn parse_response(raw: &[u8]) -> Result<HttpResponse, FetchError> {
    let header_end = find_header_end(raw)
        .ok_or_else(|| FetchError::InvalidResponse("missing headers".to_string()))?;
    let header_text = String::from_utf8_lossy(&raw[..header_end]);
    let mut lines = header_text.split("\r\n");
    let status_line = lines.next().unwrap_or_default();
    let mut parts = status_line.split_whitespace();
    let version = parts.next().unwrap_or_default();
    if !version.starts_with("HTTP/") {
        return Err(FetchError::InvalidResponse(format!(
            "bad status line: {status_line}"
        )));
    }
    let status = parts
        .next()
        .and_then(|code| code.parse::<u16>().ok())
        .ok_or_else(|| FetchError::InvalidResponse(format!("bad status line: {status_line}")))?;
    let mut headers = HashMap::new();
    for line in lines {
        if let Some((key, value)) = line.split_once(':') {
            headers.insert(key.trim().to_ascii_lowercase(), value.trim().to_string());
        }
    }
    let mut body = raw[header_end + 4..].to_vec();
    let chunked = headers
        .get("transfer-encoding")
        .is_some_and(|value| value.to_ascii_lowercase().contains("chunked"));
    if chunked {
        body = decode_chunked(&body)?;
    } else if let Some(length) = headers
        .get("content-length")
        .and_then(|value| value.parse::<usize>().ok())
    {
        body.truncate(length);
    }
    Ok(HttpResponse {
        status,
        headers,
        body,
    })
}

fn decode_chunked(mut data: &[u8]) -> Result<Vec<u8>, FetchError> {
    let mut out = Vec::new();
    loop {
        let line_end = data
            .windows(2)
            .position(|window| window == b"\r\n")
            .ok_or_else(|| FetchError::InvalidResponse("truncated chunk header".to_string()))?;
        let size_line = String::from_utf8_lossy(&data[..line_end]);
        let size_text = size_line.split(';').next().unwrap_or_default().trim();
        let size = usize::from_str_radix(size_text, 16)
            .map_err(|_| FetchError::InvalidResponse(format!("bad chunk size: {size_text}")))?;
        data = &data[line_end + 2..];
        if size == 0 {
            return Ok(out);
        }
        if data.len() < size {
            return Err(FetchError::InvalidResponse("truncated chunk".to_string()));
        }
        out.extend_from_slice(&data[..size]);
        data = data.get(size + 2..).unwrap_or_default();
    }
}

pub(crate) fn find_header_end(buffer: &[u8]) -> Option<usize> {
    buffer.windows(4).position(|window| window == b"\r\n\r\n")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_urls() {
        let url = parse_url("http://example.com").unwrap();
        assert_eq!(url.port, 80);
        assert_eq!(url.target, "/");
        let url = parse_url("https://api.test:8443/v1/items?x=1").unwrap();
        assert_eq!(url.scheme, Scheme::Https);
        assert_eq!(url.host, "api.test");
        assert_eq!(url.port, 8443);
        assert_eq!(url.target, "/v1/items?x=1");
        let url = parse_url("http://h?q").unwrap();
        assert_eq!(url.target, "/?q");
        assert_eq!(url.host, "h");
    }

    #[test]
    fn parses_bracketed_ipv6_hosts() {
        let url = parse_url("http://[::1]:8080/items").unwrap();
        assert_eq!(url.host, "::1");
        assert_eq!(url.port, 8080);
        assert_eq!(url.target, "/items");
        assert_eq!(host_header(&url), "[::1]:8080");
        let url = parse_url("https://[fe80::2]").unwrap();
        assert_eq!(url.host, "fe80::2");
        assert_eq!(url.port, 443);
        assert_eq!(host_header(&url), "[fe80::2]");
        assert!(matches!(parse_url("http://[::1/"), Err(FetchError::InvalidUrl(_))));
        assert!(matches!(parse_url("http://[::1]x/"), Err(FetchError::InvalidUrl(_))));
    }

    #[test]
    fn rejects_userinfo() {
        assert!(matches!(
            parse_url("http://user@host/"),
            Err(FetchError::InvalidUrl(_))
        ));
        assert!(matches!(
            parse_url("http://user:pw@host:81/"),
            Err(FetchError::InvalidUrl(_))
        ));
    }

    #[test]
    fn rejects_bad_urls() {
        assert!(matches!(
            parse_url("ftp://x/y"),
            Err(FetchError::UnsupportedScheme(s)) if s == "ftp"
        ));
        assert!(matches!(parse_url("http://:80/"), Err(FetchError::InvalidUrl(_))));
        assert!(matches!(parse_url("http://h:99999/"), Err(FetchError::InvalidUrl(_))));
    }

    #[test]
    fn parses_content_length_responses() {
        let raw = b"HTTP/1.1 200 OK\r\nContent-Length: 5\r\nX-A: b\r\n\r\n[1,2]trailing";
        let response = parse_response(raw).unwrap();
        assert_eq!(response.status, 200);
        assert_eq!(response.body, b"[1,2]");
        assert_eq!(response.headers["x-a"], "b");
    }

    #[test]
    fn decodes_chunked_bodies() {
        let raw = b"HTTP/1.1 404 Not Found\r\nTransfer-Encoding: chunked\r\n\r\n4\r\n{\"a\"\r\n3;ext=1\r\n:1}\r\n0\r\n\r\n";
        let response = parse_response(raw).unwrap();
        assert_eq!(response.status, 404);
        assert_eq!(response.body, b"{\"a\":1}");
    }

    #[test]
    fn rejects_garbage_responses() {
        assert!(parse_response(b"hello").is_err());
        assert!(parse_response(b"SMTP 200\r\n\r\n").is_err());
    }
}
