#![allow(dead_code)]

use std::io::{Read, Write};
use std::net::{TcpListener, TcpStream};
use std::sync::OnceLock;
use std::time::{Duration, Instant};

pub fn can_bind_loopback() -> bool {
    static CAN_BIND: OnceLock<bool> = OnceLock::new();
    *CAN_BIND.get_or_init(|| match TcpListener::bind("127.0.0.1:0") {
        Ok(listener) => {
            drop(listener);
            true
        }
        Err(err) if err.kind() == std::io::ErrorKind::PermissionDenied => false,
        Err(err) => panic!("failed to probe loopback bind capability: {err}"),
    })
}

pub fn skip_if_loopback_unavailable(test_name: &str) -> bool {
    if can_bind_loopback() {
        return false;
    }
    eprintln!("skipping {test_name}: loopback bind is not permitted in this environment");
    true
}

pub fn find_free_port() -> u16 {
    let listener = TcpListener::bind("127.0.0.1:0").expect("failed to bind free port");
    listener.local_addr().expect("missing local addr").port()
}

pub fn get_request(port: u16, path: &str) -> String {
    format!("GET {path} HTTP/1.1\r\nHost: 127.0.0.1:{port}\r\nConnection: close\r\n\r\n")
}

/// Sends a raw request, retrying the connect for two seconds while the server starts.
/// Returns the status code and the trimmed body.
pub fn send_http_request_with_retry(port: u16, request: &str) -> (u16, String) {
    let (status, _, body) = send_http_request_full(port, request);
    (status, body)
}

pub fn send_http_request_full(port: u16, request: &str) -> (u16, String, String) {
    let start = Instant::now();
    loop {
        match TcpStream::connect(format!("127.0.0.1:{port}")) {
            Ok(mut stream) => {
                stream
                    .write_all(request.as_bytes())
                    .expect("failed to write request");
                stream.shutdown(std::net::Shutdown::Write).ok();
                let mut buffer = String::new();
                stream
                    .read_to_string(&mut buffer)
                    .expect("failed to read response");
                let (head, body) = buffer.split_once("\r\n\r\n").unwrap_or((&buffer, ""));
                let status = head
                    .split("\r\n")
                    .next()
                    .unwrap_or("")
                    .split_whitespace()
                    .nth(1)
                    .unwrap_or("500")
                    .parse::<u16>()
                    .unwrap_or(500);
                return (status, head.to_string(), body.trim().to_string());
            }
            Err(_) => {
                if start.elapsed() > Duration::from_secs(2) {
                    panic!("server did not start on port {port}");
                }
                std::thread::sleep(Duration::from_millis(25));
            }
        }
    }
}

/// Serves `responses.len()` connections on a fresh loopback port, answering each with
/// the next raw response. Returns the port.
pub fn spawn_raw_http_server(responses: Vec<String>) -> u16 {
    let listener = TcpListener::bind("127.0.0.1:0").expect("failed to bind test server");
    let port = listener.local_addr().expect("missing local addr").port();
    std::thread::spawn(move || {
        for response in responses {
            let Ok((mut stream, _)) = listener.accept() else {
                return;
            };
            let mut buffer = Vec::new();
            let mut chunk = [0u8; 512];
            while !buffer.windows(4).any(|w| w == b"\r\n\r\n") {
                match stream.read(&mut chunk) {
                    Ok(0) | Err(_) => break,
                    Ok(n) => buffer.extend_from_slice(&chunk[..n]),
                }
            }
            let _ = stream.write_all(response.as_bytes());
        }
    });
    port
}

pub fn json_response(body: &str) -> String {
    format!(
        "HTTP/1.1 200 OK\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{body}",
        body.len()
    )
}
