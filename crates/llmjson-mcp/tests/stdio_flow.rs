use std::io::{BufRead, BufReader, Write};
use std::process::{Command, Stdio};

use serde_json::{json, Value};

fn spawn_daemon() -> std::process::Child {
    Command::new(env!("CARGO_BIN_EXE_llmjson-mcpd"))
        .env("LLMJSON_MCPD_TRANSPORT", "stdio")
        .env("RUST_LOG", "off")
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::null())
        .spawn()
        .expect("spawn llmjson-mcpd")
}

#[test]
fn json_recover_line_delimited_flow_works() {
    let mut child = spawn_daemon();

    let mut child_stdin = child.stdin.take().expect("stdin");
    let child_stdout = child.stdout.take().expect("stdout");
    let mut reader = BufReader::new(child_stdout);

    let req = json!({
        "jsonrpc": "2.0",
        "id": 1,
        "method": "tools/call",
        "params": {
            "name": "json_recover",
            "arguments": {
                "content": "Here is the result:\n{\"name\":{\"type\":\"string\",\"value\":\"John\"},\"age\":30}\nHope this helps!",
                "target": "object"
            }
        }
    });

    writeln!(child_stdin, "{}", req).expect("write request");
    drop(child_stdin);

    let mut line = String::new();
    reader.read_line(&mut line).expect("read response line");

    let response: Value = serde_json::from_str(&line).expect("parse response json");
    assert_eq!(response["id"], json!(1));
    assert_eq!(
        response["result"]["structuredContent"]["value"],
        json!({"name": {"type": "string", "value": "John"}, "age": 30})
    );
    assert_eq!(
        response["result"]["structuredContent"]["strategy"],
        json!("repaired")
    );

    let status = child.wait().expect("wait child");
    assert!(status.success());
}

fn write_framed(stdin: &mut std::process::ChildStdin, payload: &Value) {
    let body = serde_json::to_vec(payload).expect("serialize payload");
    let frame = format!("Content-Length: {}\r\n\r\n", body.len());
    stdin
        .write_all(frame.as_bytes())
        .expect("write frame header");
    stdin.write_all(&body).expect("write frame body");
    stdin.flush().expect("flush frame");
}

fn read_framed(reader: &mut BufReader<std::process::ChildStdout>) -> Value {
    let mut content_length: Option<usize> = None;
    loop {
        let mut line = String::new();
        reader.read_line(&mut line).expect("read frame header");
        let trimmed = line.trim_end_matches(['\r', '\n']);
        if trimmed.is_empty() {
            break;
        }
        if let Some((name, value)) = trimmed.split_once(':') {
            if name.trim().eq_ignore_ascii_case("content-length") {
                content_length = value.trim().parse::<usize>().ok();
            }
        }
    }

    let len = content_length.expect("content-length header");
    let mut body = vec![0_u8; len];
    std::io::Read::read_exact(reader, &mut body).expect("read frame body");
    serde_json::from_slice(&body).expect("parse framed response")
}

#[test]
fn stdio_content_length_initialize_and_tools_list_work() {
    let mut child = spawn_daemon();

    let mut child_stdin = child.stdin.take().expect("stdin");
    let child_stdout = child.stdout.take().expect("stdout");
    let mut reader = BufReader::new(child_stdout);

    write_framed(
        &mut child_stdin,
        &json!({
            "jsonrpc":"2.0",
            "id":1,
            "method":"initialize",
            "params":{
                "protocolVersion":"2024-11-05",
                "capabilities":{},
                "clientInfo":{"name":"stdio-test","version":"1.0.0"}
            }
        }),
    );
    let init = read_framed(&mut reader);
    assert_eq!(
        init["result"]["protocolVersion"].as_str(),
        Some("2024-11-05")
    );
    assert_eq!(
        init["result"]["capabilities"]["tools"]["listChanged"].as_bool(),
        Some(false)
    );

    write_framed(
        &mut child_stdin,
        &json!({"jsonrpc":"2.0","method":"notifications/initialized"}),
    );

    write_framed(
        &mut child_stdin,
        &json!({
            "jsonrpc":"2.0",
            "id":2,
            "method":"tools/list",
            "params":{}
        }),
    );
    let tools = read_framed(&mut reader);
    assert_eq!(tools["id"], json!(2));
    let names = tools["result"]["tools"]
        .as_array()
        .expect("tools array")
        .iter()
        .filter_map(|tool| tool.get("name").and_then(Value::as_str))
        .collect::<Vec<_>>();
    assert_eq!(
        names,
        vec!["json_recover", "json_candidates", "json_unwrap", "json_repair"]
    );

    drop(child_stdin);
    let status = child.wait().expect("wait child");
    assert!(status.success());
}
