use gluec::eval_source;

mod support;
use support::net::{
    find_free_port, json_response, skip_if_loopback_unavailable, spawn_raw_http_server,
};

fn fetch_program(port: u16, body: &str) -> String {
    format!("api \"/t\" {{\n    data <- \"http://127.0.0.1:{port}/data\";\n{body}\n}}")
}

#[test]
fn fetch_binds_decoded_json() {
    if skip_if_loopback_unavailable("fetch_binds_decoded_json") {
        return;
    }
    let port = spawn_raw_http_server(vec![json_response(
        r#"[{"name": "ann", "age": 30}, {"name": "bob", "age": 41.5, "ok": true}]"#,
    )]);
    let out = eval_source(&fetch_program(
        port,
        "print data.0.name, \" \", data.1.age, \" \", data.1.ok, \" \", data[0].missing;",
    ));
    assert_eq!(out, "ann 41.500000 true 0\n");
}

#[test]
fn fetch_result_is_the_expression_value() {
    if skip_if_loopback_unavailable("fetch_result_is_the_expression_value") {
        return;
    }
    let port = spawn_raw_http_server(vec![json_response("41")]);
    let out = eval_source(&format!(
        "api \"/t\" {{ print 1 + n <- \"http://127.0.0.1:{port}/n\"; print n; }}"
    ));
    assert_eq!(out, "42\n41\n");
}

#[test]
fn fetch_decodes_chunked_bodies() {
    if skip_if_loopback_unavailable("fetch_decodes_chunked_bodies") {
        return;
    }
    let response = "HTTP/1.1 200 OK\r\nTransfer-Encoding: chunked\r\nConnection: close\r\n\r\n\
                    7\r\n{\"a\": [\r\n6\r\n1, 2]}\r\n0\r\n\r\n"
        .to_string();
    let port = spawn_raw_http_server(vec![response]);
    let out = eval_source(&fetch_program(port, "print data.a.1;"));
    assert_eq!(out, "2\n");
}

#[test]
fn malformed_json_binds_zero() {
    if skip_if_loopback_unavailable("malformed_json_binds_zero") {
        return;
    }
    let port = spawn_raw_http_server(vec![json_response("{not json")]);
    let out = eval_source(&fetch_program(port, "print data;"));
    assert_eq!(out, "0\n");
}

#[test]
fn deeply_nested_json_binds_zero_on_a_worker_sized_stack() {
    if skip_if_loopback_unavailable("deeply_nested_json_binds_zero_on_a_worker_sized_stack") {
        return;
    }
    let body = format!("{}{}", "[".repeat(200_000), "]".repeat(200_000));
    let port = spawn_raw_http_server(vec![json_response(&body)]);
    let handle = std::thread::Builder::new()
        .stack_size(2 * 1024 * 1024)
        .spawn(move || eval_source(&fetch_program(port, "print data;")))
        .unwrap();
    assert_eq!(handle.join().unwrap(), "0\n");
}

#[test]
fn unreachable_host_binds_zero() {
    if skip_if_loopback_unavailable("unreachable_host_binds_zero") {
        return;
    }
    let port = find_free_port();
    let out = eval_source(&fetch_program(port, "print data + 1;"));
    assert_eq!(out, "1\n");
}

#[test]
fn each_pairs_over_fetched_array() {
    if skip_if_loopback_unavailable("each_pairs_over_fetched_array") {
        return;
    }
    let port = spawn_raw_http_server(vec![json_response(
        r#"[{"id": 1, "team": "red"}, {"id": 2, "team": "blue"}, {"id": 3, "team": "red"}]"#,
    )]);
    let out = eval_source(&fetch_program(
        port,
        "each a, b in data meet a.team == b.team { print a.id, \"-\", b.id; }",
    ));
    assert_eq!(out, "1-3\n");
}
