use std::fs;
use std::io::{Read, Write};
use std::net::{TcpListener, TcpStream};
use std::path::PathBuf;
use std::process::{Command, Stdio};
use std::thread;
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

fn temp_project_dir() -> PathBuf {
    let mut dir = std::env::temp_dir();
    let nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_nanos();
    dir.push(format!("glue_project_cli_test_{nanos}"));
    dir
}

fn write_project(dir: &PathBuf, manifest: &str, program: &str) {
    fs::create_dir_all(dir).expect("create temp dir");
    fs::write(dir.join("glue.toml"), manifest).expect("write glue.toml");
    fs::write(dir.join("main.glue"), program).expect("write main.glue");
}

fn find_free_port() -> Option<u16> {
    let listener = TcpListener::bind("127.0.0.1:0").ok()?;
    Some(listener.local_addr().ok()?.port())
}

fn get_with_retry(port: u16, path: &str) -> (u16, String) {
    let start = Instant::now();
    loop {
        match TcpStream::connect(format!("127.0.0.1:{port}")) {
            Ok(mut stream) => {
                let request =
                    format!("GET {path} HTTP/1.1\r\nHost: 127.0.0.1:{port}\r\n\r\n");
                stream
                    .write_all(request.as_bytes())
                    .expect("failed to write request");
                stream.shutdown(std::net::Shutdown::Write).ok();
                let mut buffer = String::new();
                stream
                    .read_to_string(&mut buffer)
                    .expect("failed to read response");
                let status = buffer
                    .split_whitespace()
                    .nth(1)
                    .and_then(|code| code.parse().ok())
                    .unwrap_or(500);
                let body = buffer
                    .split("\r\n\r\n")
                    .nth(1)
                    .unwrap_or("")
                    .trim()
                    .to_string();
                return (status, body);
            }
            Err(_) => {
                if start.elapsed() > Duration::from_secs(2) {
                    panic!("server did not start on 127.0.0.1:{port}");
                }
                thread::sleep(Duration::from_millis(25));
            }
        }
    }
}

#[test]
fn run_serves_on_manifest_port() {
    let Some(port) = find_free_port() else {
        eprintln!("skipping run_serves_on_manifest_port: loopback bind is not permitted");
        return;
    };
    let dir = temp_project_dir();
    let manifest = format!(
        r#"
[package]
entry = "main.glue"

[serve]
host = "127.0.0.1"
port = {port}
workers = 2
max_requests = 1
"#
    );
    write_project(
        &dir,
        &manifest,
        "listen 8080;\napi \"/sum\" { a = 1; b = 2; print a + b; }\n",
    );

    let exe = env!("CARGO_BIN_EXE_glue");
    let mut child = Command::new(exe)
        .arg("run")
        .arg("--manifest")
        .arg(&dir)
        .env_remove("GLUE_HOST")
        .env_remove("GLUE_MAX_REQUESTS")
        .env_remove("GLUE_WORKERS")
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .spawn()
        .expect("start glue run");
    let (status, body) = get_with_retry(port, "/sum");
    let exit = child.wait().expect("wait for glue run");

    assert_eq!(status, 200);
    assert_eq!(body, "3");
    assert!(exit.success());

    let _ = fs::remove_dir_all(&dir);
}

#[test]
fn check_reports_parse_error_location() {
    let dir = temp_project_dir();
    write_project(
        &dir,
        "[package]\nentry = \"main.glue\"\n",
        "listen 8080;\napi \"/x\" { a = ; }\n",
    );

    let exe = env!("CARGO_BIN_EXE_glue");
    let output = Command::new(exe)
        .arg("check")
        .arg("--manifest")
        .arg(&dir)
        .output()
        .expect("run glue check");

    assert_eq!(output.status.code(), Some(1));
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("main.glue"), "stderr: {stderr}");
    assert!(
        stderr.contains("parse error at line 2, column 16"),
        "stderr: {stderr}"
    );
    assert!(stderr.contains("[check] failed"), "stderr: {stderr}");

    let _ = fs::remove_dir_all(&dir);
}

#[test]
fn check_lists_routes_and_lexer_warnings() {
    let dir = temp_project_dir();
    write_project(
        &dir,
        "[package]\nentry = \"main.glue\"\n",
        "listen 8080;\napi \"/sum\" { x = 99999999999999999999; }\nlisten 9090;\napi \"/b\" {}\n",
    );

    let exe = env!("CARGO_BIN_EXE_glue");
    let output = Command::new(exe)
        .arg("check")
        .current_dir(&dir)
        .output()
        .expect("run glue check");

    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert_eq!(stdout, "api :8080 /sum\napi :9090 /b\n");
    assert!(stderr.contains("main.glue:2:"), "stderr: {stderr}");
    assert!(stderr.contains("warning"), "stderr: {stderr}");
    assert!(stderr.contains("[check] ok"), "stderr: {stderr}");

    let _ = fs::remove_dir_all(&dir);
}

#[test]
fn finds_manifest_in_parent_directory() {
    let dir = temp_project_dir();
    write_project(
        &dir,
        "[package]\nentry = \"main.glue\"\n",
        "api \"/a\" { print \"from parent\"; }\n",
    );
    let nested = dir.join("src").join("deeper");
    fs::create_dir_all(&nested).expect("create nested dir");

    let exe = env!("CARGO_BIN_EXE_glue");
    let output = Command::new(exe)
        .arg("run")
        .arg("--")
        .arg("--eval")
        .current_dir(&nested)
        .output()
        .expect("run glue");

    if !output.status.success() {
        panic!("stderr: {}", String::from_utf8_lossy(&output.stderr));
    }
    assert_eq!(String::from_utf8_lossy(&output.stdout), "from parent\n");

    let _ = fs::remove_dir_all(&dir);
}

#[test]
fn missing_entry_is_reported() {
    let dir = temp_project_dir();
    fs::create_dir_all(&dir).expect("create temp dir");
    fs::write(dir.join("glue.toml"), "[serve]\nworkers = 2\n").expect("write glue.toml");

    let exe = env!("CARGO_BIN_EXE_glue");
    let output = Command::new(exe)
        .arg("run")
        .arg("--manifest")
        .arg(&dir)
        .output()
        .expect("run glue");

    assert_eq!(output.status.code(), Some(1));
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("missing entry"), "stderr: {stderr}");

    let _ = fs::remove_dir_all(&dir);
}

#[test]
fn invalid_manifest_is_reported() {
    let dir = temp_project_dir();
    fs::create_dir_all(&dir).expect("create temp dir");
    fs::write(dir.join("glue.toml"), "[serve]\nport = \"eighty\"\n").expect("write glue.toml");

    let exe = env!("CARGO_BIN_EXE_glue");
    let output = Command::new(exe)
        .arg("check")
        .arg("--manifest")
        .arg(dir.join("glue.toml"))
        .output()
        .expect("run glue");

    assert_eq!(output.status.code(), Some(1));
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("invalid manifest"), "stderr: {stderr}");

    let _ = fs::remove_dir_all(&dir);
}

#[test]
fn unknown_command_prints_usage() {
    let output = Command::new(env!("CARGO_BIN_EXE_glue"))
        .arg("deploy")
        .output()
        .expect("run glue");
    assert_eq!(output.status.code(), Some(1));
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("unknown command: deploy"), "stderr: {stderr}");
    assert!(stderr.contains("usage: glue"), "stderr: {stderr}");
}
