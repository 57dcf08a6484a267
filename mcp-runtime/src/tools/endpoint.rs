//! Elastic Defend response actions: host isolation, remote commands,
//! process termination, malware scans, and the action history.

use reqwest::Method;
use secops_core::endpoint::{ActionRequest, ResponseAction};
use serde_json::{Map, Value, json};

use super::args::{
    arg_optional_object, arg_optional_string, arg_optional_string_array, arg_string, arg_u64,
    required_object, required_string, required_string_array,
};
use super::{ToolDefinition, expect_success, to_pretty_json};
use crate::error::{Step, ToolError};
use crate::gateway::ApiRequest;
use crate::harness::SharedGateway;

const ACTIONS_PATH: &str = "/api/endpoint/action";
const ACTION_STATUS_PATH: &str = "/api/endpoint/action/status";
/// Characters of the base64 file content echoed back in a download result.
const DOWNLOAD_PREVIEW_CHARS: usize = 100;

fn action_request(
    args: &Map<String, Value>,
    action: ResponseAction,
    data: Map<String, Value>,
) -> Result<ActionRequest, ToolError> {
    ActionRequest::new(
        action,
        required_string_array(args, "endpoint_ids")?,
        arg_string(args, "agent_type", "endpoint")?,
        arg_optional_string(args, "comment")?,
        data,
    )
    .map_err(|e| ToolError::invalid(e.field(), e.to_string()))
}

async fn start_action(gateway: SharedGateway, request: ActionRequest) -> Result<String, ToolError> {
    tracing::info!(
        action = request.action.as_str(),
        endpoints = request.endpoint_ids.len(),
        "starting response action"
    );
    let response = gateway
        .post(ACTIONS_PATH, request.to_body())
        .await
        .map_err(|e| ToolError::transport(Step::Request, e))?;
    let body = expect_success(response)?;
    // Newer Kibana versions wrap the created action in `data`.
    let created = body.get("data").filter(|data| data.is_object()).unwrap_or(&body);

    let count = request.endpoint_ids.len();
    let mut summary = json!({
        "action_id": created.get("id"),
        "started_at": created.get("startedAt").or_else(|| created.get("started_at")),
        "agents": agent_summaries(created.get("agents")),
        "status": request.action.initiated(),
        "message": format!("{} for {count} endpoint(s)", request.action.initiated())
    });
    if let Some(target) = request.target() {
        let key = match request.action {
            ResponseAction::Execute => "command",
            ResponseAction::KillProcess => "process",
            _ => "path",
        };
        summary[key] = Value::String(target);
    }
    Ok(to_pretty_json(&summary))
}

fn agent_summaries(agents: Option<&Value>) -> Vec<Value> {
    agents
        .and_then(Value::as_array)
        .map(|agents| {
            agents
                .iter()
                .map(|agent| match agent {
                    Value::String(id) => json!({ "id": id }),
                    other => json!({
                        "id": other.get("id"),
                        "type": other.get("type"),
                        "status": other.get("status")
                    }),
                })
                .collect()
        })
        .unwrap_or_default()
}

pub(crate) async fn isolate_endpoint(
    gateway: SharedGateway,
    args: Map<String, Value>,
) -> Result<String, ToolError> {
    let request = action_request(&args, ResponseAction::Isolate, Map::new())?;
    start_action(gateway, request).await
}

pub(crate) async fn unisolate_endpoint(
    gateway: SharedGateway,
    args: Map<String, Value>,
) -> Result<String, ToolError> {
    let request = action_request(&args, ResponseAction::Unisolate, Map::new())?;
    start_action(gateway, request).await
}

pub(crate) async fn run_command_on_endpoint(
    gateway: SharedGateway,
    args: Map<String, Value>,
) -> Result<String, ToolError> {
    let command = required_string(&args, "command")?;
    let mut data = Map::new();
    data.insert("command".to_string(), Value::String(command));
    if let Some(extra) = arg_optional_object(&args, "parameters")? {
        data.extend(extra);
    }
    let request = action_request(&args, ResponseAction::Execute, data)?;
    start_action(gateway, request).await
}

pub(crate) async fn kill_process(
    gateway: SharedGateway,
    args: Map<String, Value>,
) -> Result<String, ToolError> {
    let parameters = required_object(&args, "parameters")?;
    let request = action_request(&args, ResponseAction::KillProcess, parameters)?;
    start_action(gateway, request).await
}

pub(crate) async fn scan_endpoint(
    gateway: SharedGateway,
    args: Map<String, Value>,
) -> Result<String, ToolError> {
    let parameters = required_object(&args, "parameters")?;
    let request = action_request(&args, ResponseAction::ScanFile, parameters)?;
    start_action(gateway, request).await
}

fn response_actions_query(args: &Map<String, Value>) -> Result<Vec<(String, String)>, ToolError> {
    let page = arg_u64(args, "page", 1)?;
    if page < 1 {
        return Err(ToolError::invalid("page", "'page' must be at least 1"));
    }
    let mut query = vec![
        ("page".to_string(), page.to_string()),
        ("pageSize".to_string(), arg_u64(args, "page_size", 10)?.to_string()),
    ];
    for (key, param) in [
        ("agent_ids", "agentIds"),
        ("commands", "commands"),
        ("types", "types"),
        ("user_ids", "userIds"),
        ("with_outputs", "withOutputs"),
    ] {
        if let Some(values) = arg_optional_string_array(args, key)? {
            if !values.is_empty() {
                query.push((param.to_string(), values.join(",")));
            }
        }
    }
    for (key, param) in [
        ("agent_types", "agentType"),
        ("start_date", "startDate"),
        ("end_date", "endDate"),
    ] {
        if let Some(value) = arg_optional_string(args, key)? {
            query.push((param.to_string(), value));
        }
    }
    Ok(query)
}

pub(crate) async fn get_response_actions(
    gateway: SharedGateway,
    args: Map<String, Value>,
) -> Result<String, ToolError> {
    let query = response_actions_query(&args)?;
    let page = arg_u64(&args, "page", 1)?;
    let page_size = arg_u64(&args, "page_size", 10)?;
    let response = gateway
        .get(ACTIONS_PATH, query)
        .await
        .map_err(|e| ToolError::transport(Step::Request, e))?;
    let body = expect_success(response)?;

    let actions: Vec<Value> = body
        .get("data")
        .or_else(|| body.get("items"))
        .and_then(Value::as_array)
        .map(|actions| actions.iter().map(action_summary).collect())
        .unwrap_or_default();
    Ok(to_pretty_json(&json!({
        "total": body.get("total").and_then(Value::as_u64).unwrap_or(0),
        "page": body.get("page").and_then(Value::as_u64).unwrap_or(page),
        "page_size": body.get("pageSize").and_then(Value::as_u64).unwrap_or(page_size),
        "actions": actions
    })))
}

fn action_summary(action: &Value) -> Value {
    json!({
        "id": action.get("id"),
        "command": action.get("command").or_else(|| action.get("name")),
        "type": action.get("type"),
        "status": action.get("status"),
        "is_completed": action.get("isCompleted"),
        "started_at": action.get("startedAt"),
        "completed_at": action.get("completedAt"),
        "agents": agent_summaries(action.get("agents"))
    })
}

pub(crate) async fn get_response_action_details(
    gateway: SharedGateway,
    args: Map<String, Value>,
) -> Result<String, ToolError> {
    let action_id = required_string(&args, "action_id")?;
    let response = gateway
        .get(&format!("{ACTIONS_PATH}/{action_id}"), Vec::new())
        .await
        .map_err(|e| ToolError::transport(Step::Request, e))?;
    let body = expect_success(response)?;
    let action = body.get("data").filter(|data| data.is_object()).unwrap_or(&body);

    let mut details = action_summary(action);
    details["comment"] = action.get("comment").cloned().unwrap_or(Value::Null);
    details["user"] = action
        .get("createdBy")
        .or_else(|| action.get("userId"))
        .cloned()
        .unwrap_or(Value::Null);
    details["outputs"] = action.get("outputs").cloned().unwrap_or_else(|| json!({}));
    if let Some(parameters) = action.get("parameters").or_else(|| action.get("data")) {
        details["parameters"] = parameters.clone();
    }
    Ok(to_pretty_json(&details))
}

pub(crate) async fn get_response_action_status(
    gateway: SharedGateway,
    args: Map<String, Value>,
) -> Result<String, ToolError> {
    let query = required_object(&args, "query")?;
    let response = gateway
        .post(ACTION_STATUS_PATH, Value::Object(query))
        .await
        .map_err(|e| ToolError::transport(Step::Request, e))?;
    let body = expect_success(response)?;
    Ok(to_pretty_json(&body))
}

fn file_path(args: &Map<String, Value>) -> Result<(String, String, String), ToolError> {
    let action_id = required_string(args, "action_id")?;
    let file_id = required_string(args, "file_id")?;
    let path = format!("{ACTIONS_PATH}/{action_id}/file/{file_id}");
    Ok((action_id, file_id, path))
}

fn file_summary(info: &Value, action_id: &str, file_id: &str) -> Value {
    let info = info.get("data").filter(|data| data.is_object()).unwrap_or(info);
    json!({
        "file_id": info.get("id").and_then(Value::as_str).unwrap_or(file_id),
        "name": info.get("name").and_then(Value::as_str).unwrap_or("unknown"),
        "size": info.get("size"),
        "status": info.get("status"),
        "created_at": info.get("created").or_else(|| info.get("createdAt")),
        "mime_type": info.get("mimeType"),
        "action_id": action_id,
        "agent_id": info.get("agentId"),
        "sha256": info.get("sha256")
    })
}

pub(crate) async fn get_file_info(
    gateway: SharedGateway,
    args: Map<String, Value>,
) -> Result<String, ToolError> {
    let (action_id, file_id, path) = file_path(&args)?;
    let response = gateway
        .get(&path, Vec::new())
        .await
        .map_err(|e| ToolError::transport(Step::Request, e))?;
    let info = expect_success(response)?;
    Ok(to_pretty_json(&file_summary(&info, &action_id, &file_id)))
}

pub(crate) async fn download_file(
    gateway: SharedGateway,
    args: Map<String, Value>,
) -> Result<String, ToolError> {
    use base64::Engine;

    let (action_id, file_id, path) = file_path(&args)?;
    let info_response = gateway
        .get(&path, Vec::new())
        .await
        .map_err(|e| ToolError::transport(Step::Request, e))?;
    let info = expect_success(info_response)?;

    let download = gateway
        .send(ApiRequest::new(Method::GET, format!("{path}/download")))
        .await
        .map_err(|e| ToolError::transport(Step::Request, e))?;
    if !download.is_success() {
        return Err(ToolError::backend(Step::Request, &download));
    }

    let encoded = base64::engine::general_purpose::STANDARD.encode(&download.raw);
    let preview = if encoded.len() > DOWNLOAD_PREVIEW_CHARS {
        format!("{}...", &encoded[..DOWNLOAD_PREVIEW_CHARS])
    } else {
        encoded
    };
    let mut summary = file_summary(&info, &action_id, &file_id);
    summary["download_successful"] = Value::Bool(true);
    summary["content_size"] = json!(download.raw.len());
    summary["content_base64"] = Value::String(preview);
    summary["message"] = Value::String(format!(
        "File downloaded successfully. File size: {} bytes",
        download.raw.len()
    ));
    Ok(to_pretty_json(&summary))
}


fn action_schema(extra: Value, required: &[&str]) -> Value {
    let mut properties = json!({
        "endpoint_ids": {
            "type": "array",
            "items": { "type": "string" },
            "minItems": 1,
            "description": "Agent ids of the target endpoints."
        },
        "agent_type": { "type": "string", "default": "endpoint" },
        "comment": { "type": "string", "description": "Note recorded with the action." }
    });
    if let (Some(target), Value::Object(extra)) = (properties.as_object_mut(), extra) {
        target.extend(extra);
    }
    let mut required_keys = vec!["endpoint_ids"];
    required_keys.extend_from_slice(required);
    json!({
        "type": "object",
        "properties": properties,
        "required": required_keys,
        "additionalProperties": false
    })
}

fn file_schema() -> Value {
    json!({
        "type": "object",
        "properties": {
            "action_id": { "type": "string" },
            "file_id": { "type": "string" }
        },
        "required": ["action_id", "file_id"],
        "additionalProperties": false
    })
}

pub(super) fn definitions() -> Vec<ToolDefinition> {
    let string_list = json!({ "type": "array", "items": { "type": "string" } });
    vec![
        ToolDefinition {
            name: "isolate_endpoint",
            description: "Isolate endpoints from the network, keeping only the connection to Elastic.",
            input_schema: action_schema(json!({}), &[]),
        },
        ToolDefinition {
            name: "unisolate_endpoint",
            description: "Release endpoints from network isolation.",
            input_schema: action_schema(json!({}), &[]),
        },
        ToolDefinition {
            name: "run_command_on_endpoint",
            description: "Run a shell command on endpoints.",
            input_schema: action_schema(
                json!({
                    "command": { "type": "string" },
                    "parameters": { "type": "object", "description": "Extra action data such as timeout." }
                }),
                &["command"],
            ),
        },
        ToolDefinition {
            name: "kill_process",
            description: "Terminate a process on endpoints by pid, entity_id or name.",
            input_schema: action_schema(
                json!({ "parameters": { "type": "object", "minProperties": 1 } }),
                &["parameters"],
            ),
        },
        ToolDefinition {
            name: "scan_endpoint",
            description: "Scan a file or directory on endpoints for malware.",
            input_schema: action_schema(
                json!({
                    "parameters": {
                        "type": "object",
                        "description": "Must carry 'path' or 'paths'."
                    }
                }),
                &["parameters"],
            ),
        },
        ToolDefinition {
            name: "get_response_actions",
            description: "List response actions with optional filters, newest first.",
            input_schema: json!({
                "type": "object",
                "properties": {
                    "page": { "type": "integer", "minimum": 1, "default": 1 },
                    "page_size": { "type": "integer", "minimum": 1, "default": 10 },
                    "agent_ids": string_list,
                    "agent_types": { "type": "string" },
                    "commands": string_list,
                    "types": string_list,
                    "user_ids": string_list,
                    "with_outputs": string_list,
                    "start_date": { "type": "string" },
                    "end_date": { "type": "string" }
                },
                "additionalProperties": false
            }),
        },
        ToolDefinition {
            name: "get_response_action_details",
            description: "Fetch one response action with its outputs.",
            input_schema: json!({
                "type": "object",
                "properties": { "action_id": { "type": "string" } },
                "required": ["action_id"],
                "additionalProperties": false
            }),
        },
        ToolDefinition {
            name: "get_response_action_status",
            description: "Pending action counts for the given agents.",
            input_schema: json!({
                "type": "object",
                "properties": {
                    "query": { "type": "object", "description": "Status query, e.g. { \"agent_ids\": [\"...\"] }." }
                },
                "required": ["query"],
                "additionalProperties": false
            }),
        },
        ToolDefinition {
            name: "get_file_info",
            description: "Describe a file an action retrieved from an endpoint.",
            input_schema: file_schema(),
        },
        ToolDefinition {
            name: "download_file",
            description: "Download a file an action retrieved from an endpoint.",
            input_schema: file_schema(),
        },
    ]
}
