use std::io::{self, BufRead, Read, Write};
use std::time::Instant;

use llmjson::{
    extract_candidates, unwrap_envelopes, DecodeError, Decoded, Decoder, RepairError,
};
use serde::Deserialize;
use serde_json::{json, Map, Value};
use tracing::{debug, warn};

use crate::protocol::{
    JsonRpcRequest, JsonRpcResponse, INVALID_PARAMS, INVALID_REQUEST, METHOD_NOT_FOUND,
    PARSE_ERROR,
};

const DEFAULT_MCP_PROTOCOL_VERSION: &str = "2024-11-05";
/// Largest `Content-Length` body accepted on stdio.
pub const MAX_FRAME_BYTES: usize = 16 * 1024 * 1024;

pub struct McpServer {
    decoder: Decoder,
}

impl McpServer {
    /// Builds a server whose decoder is configured from `LLMJSON_*` variables.
    pub fn new() -> Result<Self, RepairError> {
        Ok(Self::with_decoder(Decoder::from_env()?))
    }

    pub fn with_decoder(decoder: Decoder) -> Self {
        Self { decoder }
    }

    pub fn handle_request(&self, request: JsonRpcRequest) -> Option<JsonRpcResponse> {
        if request.jsonrpc != "2.0" {
            return Some(JsonRpcResponse::error(
                request.id.unwrap_or(Value::Null),
                INVALID_REQUEST,
                "invalid jsonrpc version",
            ));
        }

        if request.is_notification() {
            debug!(method = %request.method, "notification");
            return None;
        }
        let id = request.id.clone().unwrap_or(Value::Null);

        let response = match request.method.as_str() {
            "initialize" => {
                let protocol_version = request
                    .params
                    .get("protocolVersion")
                    .and_then(Value::as_str)
                    .unwrap_or(DEFAULT_MCP_PROTOCOL_VERSION);
                JsonRpcResponse::success(
                    id,
                    json!({
                        "protocolVersion": protocol_version,
                        "serverInfo": {"name": "llmjson-mcp", "version": env!("CARGO_PKG_VERSION")},
                        "capabilities": {
                            "tools": {
                                "listChanged": false
                            }
                        }
                    }),
                )
            }
            "ping" => JsonRpcResponse::success(id, json!({})),
            "tools/list" => JsonRpcResponse::success(id, tools_list_result()),
            "tools/call" => self.handle_tools_call(id, request.params),
            _ => JsonRpcResponse::error(id, METHOD_NOT_FOUND, "method not found"),
        };

        Some(response)
    }

    fn handle_tools_call(&self, id: Value, params: Value) -> JsonRpcResponse {
        let parsed: ToolsCallParams = match serde_json::from_value(params) {
            Ok(v) => v,
            Err(err) => {
                return JsonRpcResponse::error(id, INVALID_PARAMS, format!("invalid params: {err}"));
            }
        };

        let start = Instant::now();
        let response = match parsed.name.as_str() {
            "json_recover" => self.exec_json_recover(id, parsed.arguments),
            "json_candidates" => exec_json_candidates(id, parsed.arguments),
            "json_unwrap" => exec_json_unwrap(id, parsed.arguments),
            "json_repair" => self.exec_json_repair(id, parsed.arguments),
            _ => JsonRpcResponse::error(id, METHOD_NOT_FOUND, "unknown tool"),
        };
        debug!(
            tool = parsed.name.as_str(),
            latency_ms = start.elapsed().as_secs_f64() * 1000.0,
            is_error = response.error.is_some() || is_tool_error(&response),
            "tool call finished"
        );
        response
    }

    fn exec_json_recover(&self, id: Value, arguments: Option<Value>) -> JsonRpcResponse {
        let args: JsonRecoverInput = match parse_args(arguments) {
            Ok(v) => v,
            Err(resp) => return with_id(resp, id),
        };

        match self.recover(&args.content, args.target) {
            Ok(decoded) => {
                let text = serde_json::to_string(&decoded.value).unwrap_or_default();
                JsonRpcResponse::success(
                    id,
                    json!({
                        "content": [{"type": "text", "text": text}],
                        "structuredContent": {
                            "value": decoded.value,
                            "strategy": decoded.strategy.as_str(),
                            "candidate": decoded.candidate
                        }
                    }),
                )
            }
            Err(err) => tool_error(id, decode_error_details(&err), err.to_string()),
        }
    }

    fn recover(&self, content: &str, target: RecoverTarget) -> Result<Decoded<Value>, DecodeError> {
        let decoder = &self.decoder;
        match target {
            RecoverTarget::Any => decoder.decode_detailed::<Value>(content),
            RecoverTarget::Object => decoder
                .decode_detailed::<Map<String, Value>>(content)
                .map(|d| d.map(Value::Object)),
            RecoverTarget::Array => decoder
                .decode_detailed::<Vec<Value>>(content)
                .map(|d| d.map(Value::Array)),
            RecoverTarget::String => decoder
                .decode_detailed::<String>(content)
                .map(|d| d.map(Value::String)),
            RecoverTarget::Boolean => decoder
                .decode_detailed::<bool>(content)
                .map(|d| d.map(Value::Bool)),
            RecoverTarget::Integer => decoder
                .decode_detailed::<i64>(content)
                .map(|d| d.map(Value::from)),
            RecoverTarget::Unsigned => decoder
                .decode_detailed::<u64>(content)
                .map(|d| d.map(Value::from)),
            RecoverTarget::Number => decoder
                .decode_detailed::<f64>(content)
                .map(|d| d.map(Value::from)),
        }
    }

    fn exec_json_repair(&self, id: Value, arguments: Option<Value>) -> JsonRpcResponse {
        let args: JsonRepairInput = match parse_args(arguments) {
            Ok(v) => v,
            Err(resp) => return with_id(resp, id),
        };

        let repairer = self.decoder.repairer();
        match repairer.repair(&args.content) {
            Ok(repaired) => JsonRpcResponse::success(
                id,
                json!({
                    "content": [{"type": "text", "text": repaired}],
                    "structuredContent": {
                        "repaired": repaired,
                        "repairer": repairer.name()
                    }
                }),
            ),
            Err(err) => tool_error(
                id,
                json!({"error": "repair_failed", "repairer": repairer.name()}),
                err.to_string(),
            ),
        }
    }

    pub fn serve_stdio(&self) -> io::Result<()> {
        let stdin = io::stdin();
        let stdout = io::stdout();
        self.serve(stdin.lock(), stdout.lock())
    }

    /// Serves requests from `reader` until end of input. Each reply uses the
    /// framing of its request: a single line, or `Content-Length` headers.
    pub fn serve<R: BufRead, W: Write>(&self, mut reader: R, mut writer: W) -> io::Result<()> {
        let mut line = String::new();

        loop {
            line.clear();
            if reader.read_line(&mut line)? == 0 {
                break;
            }

            let trimmed = line.trim_end_matches(['\r', '\n']).trim_start();
            if trimmed.is_empty() {
                continue;
            }

            let (payload, frame) = if is_stdio_header_line(trimmed) {
                let content_length = match read_stdio_content_length(&mut reader, trimmed) {
                    Ok(v) => v,
                    Err(err) => {
                        warn!(error = %err, "invalid stdio frame");
                        let response = JsonRpcResponse::error(
                            Value::Null,
                            PARSE_ERROR,
                            format!("invalid stdio frame: {err}"),
                        );
                        write_stdio_response(&mut writer, &response, StdioFrame::LineDelimited)?;
                        continue;
                    }
                };

                if content_length > MAX_FRAME_BYTES {
                    warn!(content_length, "stdio frame too large");
                    // skip the body so the next header lines up
                    io::copy(&mut reader.by_ref().take(u64::try_from(content_length).unwrap_or(u64::MAX)), &mut io::sink())?;
                    let response = JsonRpcResponse::error(
                        Value::Null,
                        PARSE_ERROR,
                        format!("stdio frame of {content_length} bytes exceeds {MAX_FRAME_BYTES}"),
                    );
                    write_stdio_response(&mut writer, &response, StdioFrame::ContentLength)?;
                    continue;
                }

                let mut body = vec![0_u8; content_length];
                if let Err(err) = reader.read_exact(&mut body) {
                    let response = JsonRpcResponse::error(
                        Value::Null,
                        PARSE_ERROR,
                        format!("invalid stdio frame body: {err}"),
                    );
                    write_stdio_response(&mut writer, &response, StdioFrame::ContentLength)?;
                    continue;
                }
                (body, StdioFrame::ContentLength)
            } else {
                (trimmed.as_bytes().to_vec(), StdioFrame::LineDelimited)
            };

            let request: JsonRpcRequest = match serde_json::from_slice(&payload) {
                Ok(v) => v,
                Err(err) => {
                    let response =
                        JsonRpcResponse::error(Value::Null, PARSE_ERROR, format!("parse error: {err}"));
                    write_stdio_response(&mut writer, &response, frame)?;
                    continue;
                }
            };

            if let Some(response) = self.handle_request(request) {
                write_stdio_response(&mut writer, &response, frame)?;
            }
        }

        Ok(())
    }
}

fn tools_list_result() -> Value {
    json!({
        "tools": [
            {
                "name": "json_recover",
                "description": "Recover a JSON value from raw model output: extracts embedded documents, repairs syntax, unwraps {type, value} envelopes and reconciles array/object shape.",
                "inputSchema": {
                    "type": "object",
                    "required": ["content"],
                    "properties": {
                        "content": {"type": "string"},
                        "target": {
                            "type": "string",
                            "enum": ["any", "object", "array", "string", "boolean", "integer", "unsigned", "number"]
                        }
                    }
                }
            },
            {
                "name": "json_candidates",
                "description": "List the balanced {...} and [...] spans found in free text, in source order.",
                "inputSchema": {
                    "type": "object",
                    "required": ["content"],
                    "properties": {
                        "content": {"type": "string"}
                    }
                }
            },
            {
                "name": "json_unwrap",
                "description": "Collapse every {type, value} envelope in a JSON value.",
                "inputSchema": {
                    "type": "object",
                    "required": ["value"],
                    "properties": {
                        "value": {}
                    }
                }
            },
            {
                "name": "json_repair",
                "description": "Repair near-JSON text into valid JSON without decoding it.",
                "inputSchema": {
                    "type": "object",
                    "required": ["content"],
                    "properties": {
                        "content": {"type": "string"}
                    }
                }
            }
        ]
    })
}

fn exec_json_candidates(id: Value, arguments: Option<Value>) -> JsonRpcResponse {
    let args: JsonCandidatesInput = match parse_args(arguments) {
        Ok(v) => v,
        Err(resp) => return with_id(resp, id),
    };

    let candidates = extract_candidates(&args.content)
        .into_iter()
        .map(|c| {
            json!({
                "start": c.start,
                "end": c.end,
                "opener": c.opener.to_string(),
                "text": c.text
            })
        })
        .collect::<Vec<_>>();

    JsonRpcResponse::success(
        id,
        json!({
            "content": [{"type": "text", "text": format!("{} candidate(s)", candidates.len())}],
            "structuredContent": {
                "count": candidates.len(),
                "candidates": candidates
            }
        }),
    )
}

fn exec_json_unwrap(id: Value, arguments: Option<Value>) -> JsonRpcResponse {
    let args: JsonUnwrapInput = match parse_args(arguments) {
        Ok(v) => v,
        Err(resp) => return with_id(resp, id),
    };

    let unwrapped = unwrap_envelopes(args.value.clone());
    let changed = unwrapped != args.value;
    let text = serde_json::to_string(&unwrapped).unwrap_or_default();
    JsonRpcResponse::success(
        id,
        json!({
            "content": [{"type": "text", "text": text}],
            "structuredContent": {
                "value": unwrapped,
                "changed": changed
            }
        }),
    )
}

fn decode_error_details(err: &DecodeError) -> Value {
    match err {
        DecodeError::Primitive(e) => json!({
            "error": err.kind(),
            "kind": e.kind.as_str(),
            "cause": e.cause
        }),
        DecodeError::Failed(e) => json!({
            "error": err.kind(),
            "candidates_tried": e.candidates_tried,
            "last_decode_error": e.last_decode_error.as_ref().map(ToString::to_string),
            "last_repair_error": e.last_repair_error.as_ref().map(ToString::to_string)
        }),
        DecodeError::Cancelled => json!({"error": err.kind()}),
    }
}

/// A tool-level failure: a successful JSON-RPC reply flagged `isError`.
fn tool_error(id: Value, details: Value, message: String) -> JsonRpcResponse {
    JsonRpcResponse::success(
        id,
        json!({
            "isError": true,
            "content": [{"type": "text", "text": message}],
            "structuredContent": details
        }),
    )
}

fn is_tool_error(response: &JsonRpcResponse) -> bool {
    response
        .result
        .as_ref()
        .and_then(|r| r.get("isError"))
        .and_then(Value::as_bool)
        .unwrap_or(false)
}

fn with_id(mut response: JsonRpcResponse, id: Value) -> JsonRpcResponse {
    response.id = id;
    response
}

#[derive(Clone, Copy)]
enum StdioFrame {
    LineDelimited,
    ContentLength,
}

fn write_stdio_response<W: Write>(
    writer: &mut W,
    response: &JsonRpcResponse,
    frame: StdioFrame,
) -> io::Result<()> {
    match frame {
        StdioFrame::LineDelimited => {
            let serialized = serde_json::to_string(response)?;
            writeln!(writer, "{serialized}")?;
        }
        StdioFrame::ContentLength => {
            let serialized = serde_json::to_vec(response)?;
            write!(writer, "Content-Length: {}\r\n\r\n", serialized.len())?;
            writer.write_all(&serialized)?;
        }
    }
    writer.flush()
}

fn is_stdio_header_line(line: &str) -> bool {
    let lower = line.to_ascii_lowercase();
    lower.starts_with("content-length:") || lower.starts_with("content-type:")
}

fn read_stdio_content_length<R: BufRead>(reader: &mut R, first_line: &str) -> io::Result<usize> {
    let mut content_length = parse_content_length(first_line);
    let mut header_line = String::new();
    loop {
        header_line.clear();
        if reader.read_line(&mut header_line)? == 0 {
            return Err(io::Error::new(
                io::ErrorKind::UnexpectedEof,
                "unexpected eof while reading frame headers",
            ));
        }
        let trimmed = header_line.trim_end_matches(['\r', '\n']);
        if trimmed.is_empty() {
            break;
        }
        if let Some(v) = parse_content_length(trimmed) {
            content_length = Some(v);
        }
    }
    content_length
        .ok_or_else(|| io::Error::new(io::ErrorKind::InvalidData, "missing content-length header"))
}

fn parse_content_length(line: &str) -> Option<usize> {
    let (name, value) = line.split_once(':')?;
    if !name.trim().eq_ignore_ascii_case("content-length") {
        return None;
    }
    value.trim().parse::<usize>().ok()
}

fn parse_args<T: for<'de> Deserialize<'de>>(
    arguments: Option<Value>,
) -> Result<T, JsonRpcResponse> {
    let Some(args) = arguments else {
        return Err(JsonRpcResponse::error(
            Value::Null,
            INVALID_PARAMS,
            "missing tool arguments",
        ));
    };

    serde_json::from_value(args).map_err(|err| {
        JsonRpcResponse::error(
            Value::Null,
            INVALID_PARAMS,
            format!("invalid tool arguments: {err}"),
        )
    })
}

#[derive(Debug, Deserialize)]
struct ToolsCallParams {
    name: String,
    arguments: Option<Value>,
}

#[derive(Debug, Clone, Copy, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
enum RecoverTarget {
    #[default]
    Any,
    Object,
    Array,
    String,
    Boolean,
    Integer,
    Unsigned,
    Number,
}

#[derive(Debug, Deserialize)]
struct JsonRecoverInput {
    content: String,
    #[serde(default)]
    target: RecoverTarget,
}

#[derive(Debug, Deserialize)]
struct JsonCandidatesInput {
    content: String,
}

#[derive(Debug, Deserialize)]
struct JsonUnwrapInput {
    value: Value,
}

#[derive(Debug, Deserialize)]
struct JsonRepairInput {
    content: String,
}
