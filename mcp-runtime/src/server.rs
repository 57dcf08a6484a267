use serde_json::{Map, Value, json};
use tokio::io::{self, AsyncBufRead, AsyncBufReadExt, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use crate::harness::{SharedGateway, ToolResult};
use crate::tools::{call_tool, tool_definitions, to_pretty_json};

const MCP_PROTOCOL_VERSION: &str = "2024-11-05";
const MCP_SERVER_NAME: &str = "secops-mcp";
/// Largest Content-Length payload accepted from a client.
const MAX_FRAME_BYTES: usize = 8 * 1024 * 1024;

#[derive(Debug)]
pub(crate) struct RpcError {
    code: i64,
    message: String,
}

impl RpcError {
    fn parse_error(message: impl Into<String>) -> Self {
        Self {
            code: -32700,
            message: message.into(),
        }
    }

    fn invalid_request(message: impl Into<String>) -> Self {
        Self {
            code: -32600,
            message: message.into(),
        }
    }

    fn method_not_found(method: &str) -> Self {
        Self {
            code: -32601,
            message: format!("Method not found: {method}"),
        }
    }

    fn invalid_params(message: impl Into<String>) -> Self {
        Self {
            code: -32602,
            message: message.into(),
        }
    }
}

/// Wire framing of a stdio message. Replies use the framing of the request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Framing {
    ContentLength,
    Newline,
}

#[derive(Debug)]
pub enum Incoming {
    Message(Value),
    /// A frame whose payload was not valid JSON.
    Unparseable(String),
}

/// MCP server over a byte stream. `gateway` is `None` until Kibana is
/// configured; every tool call then fails with `not_ready`.
pub struct McpServer {
    gateway: Option<SharedGateway>,
}

impl McpServer {
    pub fn new(gateway: Option<SharedGateway>) -> Self {
        Self { gateway }
    }

    pub async fn serve_stdio(&self) -> Result<(), String> {
        let reader = io::BufReader::new(io::stdin());
        self.serve(reader, io::stdout()).await
    }

    pub async fn serve<R, W>(&self, mut reader: R, mut writer: W) -> Result<(), String>
    where
        R: AsyncBufRead + Unpin,
        W: AsyncWrite + Unpin,
    {
        tracing::info!(
            server = MCP_SERVER_NAME,
            version = env!("CARGO_PKG_VERSION"),
            gateway_ready = self.gateway.is_some(),
            "mcp server started"
        );
        loop {
            let frame = read_framed_json(&mut reader)
                .await
                .map_err(|e| format!("Failed to read MCP message: {e}"))?;
            let Some((incoming, framing)) = frame else {
                break;
            };

            let responses = match incoming {
                Incoming::Message(message) => self.handle_incoming_message(message).await,
                Incoming::Unparseable(reason) => vec![error_response(
                    Value::Null,
                    RpcError::parse_error(format!("Invalid JSON payload: {reason}")),
                )],
            };
            for response in responses {
                write_framed_json(&mut writer, &response, framing)
                    .await
                    .map_err(|e| format!("Failed to write MCP response: {e}"))?;
            }
        }
        tracing::info!("stdin closed, mcp server stopping");
        Ok(())
    }

    pub async fn handle_incoming_message(&self, incoming: Value) -> Vec<Value> {
        let mut responses = Vec::new();

        if let Some(batch) = incoming.as_array() {
            if batch.is_empty() {
                responses.push(error_response(
                    Value::Null,
                    RpcError::invalid_request("Batch request must not be empty"),
                ));
                return responses;
            }
            for item in batch {
                if let Some(response) = self.handle_single_message(item.clone()).await {
                    responses.push(response);
                }
            }
            return responses;
        }

        if let Some(response) = self.handle_single_message(incoming).await {
            responses.push(response);
        }
        responses
    }

    async fn handle_single_message(&self, incoming: Value) -> Option<Value> {
        let Some(obj) = incoming.as_object() else {
            return Some(error_response(
                Value::Null,
                RpcError::invalid_request("Request must be a JSON object"),
            ));
        };

        if obj.get("jsonrpc").and_then(Value::as_str) != Some("2.0") {
            let id = obj.get("id").cloned().unwrap_or(Value::Null);
            return Some(error_response(
                id,
                RpcError::invalid_request("jsonrpc must be '2.0'"),
            ));
        }

        let Some(method) = obj.get("method").and_then(Value::as_str) else {
            // A client response; this server never sends requests.
            return None;
        };

        let params = obj.get("params").cloned().unwrap_or(Value::Null);
        match obj.get("id").cloned() {
            Some(id) => Some(match self.handle_request(method, params).await {
                Ok(payload) => success_response(id, payload),
                Err(err) => error_response(id, err),
            }),
            None => {
                tracing::debug!(method, "ignoring notification");
                None
            }
        }
    }

    async fn handle_request(&self, method: &str, params: Value) -> Result<Value, RpcError> {
        match method {
            "initialize" => Ok(self.initialize_payload()),
            "ping" => Ok(json!({})),
            "tools/list" => Ok(tools_list_payload()),
            "tools/call" => self.handle_tools_call(params).await,
            "resources/list" => Ok(json!({ "resources": [] })),
            "prompts/list" => Ok(json!({ "prompts": [] })),
            _ => Err(RpcError::method_not_found(method)),
        }
    }

    fn initialize_payload(&self) -> Value {
        let mut instructions = String::from(
            "Kibana Security tools. Use find_rules to look up rule_id values before calling rule or exception tools. associate_shared_exception_list is safe to repeat.",
        );
        if self.gateway.is_none() {
            instructions.push_str(" Kibana is not configured: every tool call will fail with not_ready.");
        }
        json!({
            "protocolVersion": MCP_PROTOCOL_VERSION,
            "capabilities": {
                "tools": { "listChanged": false },
                "resources": { "listChanged": false },
                "prompts": { "listChanged": false }
            },
            "serverInfo": {
                "name": MCP_SERVER_NAME,
                "version": env!("CARGO_PKG_VERSION")
            },
            "instructions": instructions
        })
    }

    async fn handle_tools_call(&self, params: Value) -> Result<Value, RpcError> {
        let params = params
            .as_object()
            .ok_or_else(|| RpcError::invalid_params("tools/call params must be an object"))?;

        let name = params
            .get("name")
            .and_then(Value::as_str)
            .ok_or_else(|| RpcError::invalid_params("tools/call requires string field 'name'"))?;

        let args = match params.get("arguments") {
            Some(Value::Object(map)) => map.clone(),
            Some(Value::Null) | None => Map::new(),
            Some(_) => {
                return Err(RpcError::invalid_params(
                    "tools/call 'arguments' must be an object",
                ));
            }
        };

        let result = call_tool(name, self.gateway.as_ref(), args).await;
        Ok(build_tool_call_response(name, &result))
    }
}

fn tools_list_payload() -> Value {
    let tools: Vec<Value> = tool_definitions()
        .into_iter()
        .map(|tool| {
            json!({
                "name": tool.name,
                "description": tool.description,
                "inputSchema": tool.input_schema,
            })
        })
        .collect();
    json!({ "tools": tools })
}

fn build_tool_call_response(tool_name: &str, result: &ToolResult) -> Value {
    let envelope = result.to_envelope(tool_name);
    let text = match result {
        ToolResult::Ok(text) => text.clone(),
        ToolResult::Err { kind, message, .. } => {
            format!("Error ({}) in tool '{tool_name}': {message}", kind.as_str())
        }
    };

    if result.is_ok() {
        json!({
            "content": [{ "type": "text", "text": text }],
            "structuredContent": envelope
        })
    } else {
        json!({
            "isError": true,
            "content": [{ "type": "text", "text": text }],
            "structuredContent": envelope
        })
    }
}

fn success_response(id: Value, result: Value) -> Value {
    json!({
        "jsonrpc": "2.0",
        "id": id,
        "result": result
    })
}

fn error_response(id: Value, error: RpcError) -> Value {
    json!({
        "jsonrpc": "2.0",
        "id": id,
        "error": {
            "code": error.code,
            "message": error.message
        }
    })
}

/// Reads one message. A first line starting with `Content-Length:` selects
/// header framing; any other non-blank line is taken as a whole JSON message.
pub async fn read_framed_json<R>(
    reader: &mut R,
) -> Result<Option<(Incoming, Framing)>, std::io::Error>
where
    R: AsyncBufRead + Unpin,
{
    let mut first = String::new();
    loop {
        first.clear();
        if reader.read_line(&mut first).await? == 0 {
            return Ok(None);
        }
        if !first.trim().is_empty() {
            break;
        }
    }

    let first = first.trim_end_matches(['\r', '\n']);
    let Some(mut content_length) = parse_content_length(first)? else {
        let incoming = match serde_json::from_str::<Value>(first) {
            Ok(value) => Incoming::Message(value),
            Err(e) => Incoming::Unparseable(e.to_string()),
        };
        return Ok(Some((incoming, Framing::Newline)));
    };

    loop {
        let mut line = String::new();
        if reader.read_line(&mut line).await? == 0 {
            return Err(std::io::Error::new(
                std::io::ErrorKind::UnexpectedEof,
                "Unexpected EOF while reading MCP headers",
            ));
        }
        let line = line.trim_end_matches(['\r', '\n']);
        if line.is_empty() {
            break;
        }
        if let Some(parsed) = parse_content_length(line)? {
            content_length = parsed;
        }
    }

    if content_length > MAX_FRAME_BYTES {
        return Err(std::io::Error::new(
            std::io::ErrorKind::InvalidData,
            format!("Content-Length {content_length} exceeds the {MAX_FRAME_BYTES} byte limit"),
        ));
    }
    let mut payload = vec![0_u8; content_length];
    reader.read_exact(&mut payload).await?;
    let incoming = match serde_json::from_slice::<Value>(&payload) {
        Ok(value) => Incoming::Message(value),
        Err(e) => Incoming::Unparseable(e.to_string()),
    };
    Ok(Some((incoming, Framing::ContentLength)))
}

fn parse_content_length(line: &str) -> Result<Option<usize>, std::io::Error> {
    if !line.to_ascii_lowercase().starts_with("content-length:") {
        return Ok(None);
    }
    let raw_len = line
        .split_once(':')
        .map(|(_, right)| right.trim())
        .unwrap_or_default();
    raw_len.parse::<usize>().map(Some).map_err(|_| {
        std::io::Error::new(
            std::io::ErrorKind::InvalidData,
            "Invalid Content-Length header",
        )
    })
}

pub async fn write_framed_json<W>(
    writer: &mut W,
    value: &Value,
    framing: Framing,
) -> Result<(), std::io::Error>
where
    W: AsyncWrite + Unpin,
{
    let body = serde_json::to_vec(value).map_err(|e| {
        std::io::Error::new(
            std::io::ErrorKind::InvalidData,
            format!("Failed to serialize JSON: {e}"),
        )
    })?;
    match framing {
        Framing::ContentLength => {
            let header = format!(
                "Content-Length: {}\r\nContent-Type: application/json\r\n\r\n",
                body.len()
            );
            writer.write_all(header.as_bytes()).await?;
            writer.write_all(&body).await?;
        }
        Framing::Newline => {
            writer.write_all(&body).await?;
            writer.write_all(b"\n").await?;
        }
    }
    writer.flush().await?;
    Ok(())
}

/// JSON error printed to stderr when the server cannot start or stops early.
pub(crate) fn error_payload(code: &str, message: &str) -> String {
    to_pretty_json(&json!({ "error": code, "message": message }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::FakeGateway;
    use std::sync::Arc;

    fn request(id: u64, method: &str, params: Value) -> Value {
        json!({ "jsonrpc": "2.0", "id": id, "method": method, "params": params })
    }

    #[tokio::test]
    async fn initialize_advertises_tools_capability() {
        let server = McpServer::new(None);
        let responses = server
            .handle_incoming_message(request(1, "initialize", json!({})))
            .await;
        let result = &responses[0]["result"];
        assert_eq!(result["protocolVersion"], MCP_PROTOCOL_VERSION);
        assert_eq!(result["serverInfo"]["name"], MCP_SERVER_NAME);
        assert!(result["capabilities"]["tools"].is_object());
    }

    #[tokio::test]
    async fn tools_list_exposes_every_tool_with_schema() {
        let server = McpServer::new(None);
        let responses = server
            .handle_incoming_message(request(2, "tools/list", Value::Null))
            .await;
        let tools = responses[0]["result"]["tools"].as_array().unwrap();
        assert_eq!(tools.len(), tool_definitions().len());
        assert!(
            tools
                .iter()
                .any(|tool| tool["name"] == "associate_shared_exception_list")
        );
        assert!(tools.iter().all(|tool| tool["inputSchema"]["type"] == "object"));
    }

    #[tokio::test]
    async fn tool_call_without_gateway_is_error_result_not_rpc_error() {
        let server = McpServer::new(None);
        let responses = server
            .handle_incoming_message(request(
                3,
                "tools/call",
                json!({ "name": "get_rule", "arguments": { "rule_id": "r-1" } }),
            ))
            .await;
        let result = &responses[0]["result"];
        assert_eq!(result["isError"], true);
        assert_eq!(result["structuredContent"]["kind"], "not_ready");
        assert!(responses[0].get("error").is_none());
    }

    #[tokio::test]
    async fn successful_tool_call_carries_text_and_envelope() {
        let gateway: SharedGateway = Arc::new(
            FakeGateway::new().respond(200, json!({ "id": "U1", "rule_id": "r-1", "name": "Rule" })),
        );
        let server = McpServer::new(Some(gateway));
        let responses = server
            .handle_incoming_message(request(
                4,
                "tools/call",
                json!({ "name": "get_rule", "arguments": { "rule_id": "r-1" } }),
            ))
            .await;
        let result = &responses[0]["result"];
        assert!(result.get("isError").is_none());
        assert_eq!(result["structuredContent"]["status"], "success");
        assert!(
            result["content"][0]["text"]
                .as_str()
                .unwrap()
                .contains("\"rule_id\": \"r-1\"")
        );
    }

    #[tokio::test]
    async fn rpc_level_errors_use_standard_codes() {
        let server = McpServer::new(None);
        let unknown = server
            .handle_incoming_message(request(5, "resources/read", json!({})))
            .await;
        assert_eq!(unknown[0]["error"]["code"], -32601);

        let bad_params = server
            .handle_incoming_message(request(6, "tools/call", json!({ "arguments": {} })))
            .await;
        assert_eq!(bad_params[0]["error"]["code"], -32602);

        let bad_version = server
            .handle_incoming_message(json!({ "jsonrpc": "1.0", "id": 7, "method": "ping" }))
            .await;
        assert_eq!(bad_version[0]["error"]["code"], -32600);
    }

    #[tokio::test]
    async fn notifications_and_batches() {
        let server = McpServer::new(None);
        let responses = server
            .handle_incoming_message(json!([
                { "jsonrpc": "2.0", "method": "notifications/initialized" },
                { "jsonrpc": "2.0", "id": 8, "method": "ping" }
            ]))
            .await;
        assert_eq!(responses.len(), 1);
        assert_eq!(responses[0]["id"], 8);

        let empty = server.handle_incoming_message(json!([])).await;
        assert_eq!(empty[0]["error"]["code"], -32600);
    }

    #[tokio::test]
    async fn reads_both_framings() {
        let body = r#"{"jsonrpc":"2.0","id":1,"method":"ping"}"#;
        let raw = format!(
            "Content-Length: {}\r\nContent-Type: application/json\r\n\r\n{body}\n{body}\n",
            body.len()
        );
        let mut reader = io::BufReader::new(raw.as_bytes());

        let (first, framing) = read_framed_json(&mut reader).await.unwrap().unwrap();
        assert_eq!(framing, Framing::ContentLength);
        assert!(matches!(first, Incoming::Message(ref v) if v["method"] == "ping"));

        let (second, framing) = read_framed_json(&mut reader).await.unwrap().unwrap();
        assert_eq!(framing, Framing::Newline);
        assert!(matches!(second, Incoming::Message(_)));

        assert!(read_framed_json(&mut reader).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn oversized_content_length_is_rejected_before_allocating() {
        let raw = format!("Content-Length: {}\r\n\r\n{{}}", MAX_FRAME_BYTES + 1);
        let mut reader = io::BufReader::new(raw.as_bytes());
        let err = read_framed_json(&mut reader).await.unwrap_err();
        assert_eq!(err.kind(), std::io::ErrorKind::InvalidData);
    }

    #[tokio::test]
    async fn serve_replies_in_the_clients_framing() {
        let input = concat!(
            r#"{"jsonrpc":"2.0","id":1,"method":"ping"}"#,
            "\n",
            "not json\n"
        );
        let mut output = Vec::new();
        McpServer::new(None)
            .serve(io::BufReader::new(input.as_bytes()), &mut output)
            .await
            .unwrap();

        let text = String::from_utf8(output).unwrap();
        let lines: Vec<Value> = text
            .lines()
            .map(|line| serde_json::from_str(line).unwrap())
            .collect();
        assert_eq!(lines[0]["result"], json!({}));
        assert_eq!(lines[1]["error"]["code"], -32700);
    }
}
