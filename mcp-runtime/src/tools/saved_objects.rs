//! Generic saved object management: search, CRUD, bulk reads, and
//! ndjson export/import.

use reqwest::Method;
use secops_core::saved_objects::{DEFAULT_FIND_PER_PAGE, parse_object_refs, summarize_find_page};
use serde_json::{Map, Value, json};

use super::args::{
    arg_optional_array, arg_optional_bool, arg_optional_object, arg_optional_string,
    arg_optional_string_array, arg_u64, required_object, required_object_array, required_string,
    required_string_array,
};
use super::{ToolDefinition, expect_success, to_pretty_json};
use crate::error::{ResourceKind, Step, ToolError};
use crate::gateway::{ApiRequest, ApiResponse, FileUpload};
use crate::harness::SharedGateway;

const SAVED_OBJECTS_PATH: &str = "/api/saved_objects";

fn object_path(args: &Map<String, Value>) -> Result<(String, String, String), ToolError> {
    let object_type = required_string(args, "type")?;
    let id = required_string(args, "id")?;
    let path = format!("{SAVED_OBJECTS_PATH}/{object_type}/{id}");
    Ok((object_type, id, path))
}

/// Maps a 404 on a single-object call to a not-found error for that object.
fn expect_object(response: ApiResponse, object_type: &str, id: &str) -> Result<Value, ToolError> {
    if response.is_not_found() {
        return Err(ToolError::NotFound {
            resource: ResourceKind::SavedObject,
            identifier: format!("{object_type} '{id}'"),
        });
    }
    expect_success(response)
}

fn push_bool(
    query: &mut Vec<(String, String)>,
    args: &Map<String, Value>,
    key: &str,
    param: &str,
) -> Result<(), ToolError> {
    if let Some(flag) = arg_optional_bool(args, key)? {
        query.push((param.to_string(), flag.to_string()));
    }
    Ok(())
}

fn push_joined(
    query: &mut Vec<(String, String)>,
    args: &Map<String, Value>,
    key: &str,
) -> Result<(), ToolError> {
    if let Some(values) = arg_optional_string_array(args, key)? {
        if !values.is_empty() {
            query.push((key.to_string(), values.join(",")));
        }
    }
    Ok(())
}

fn find_query(args: &Map<String, Value>) -> Result<Vec<(String, String)>, ToolError> {
    let types = required_string_array(args, "type")?;
    let page = arg_u64(args, "page", 1)?;
    if page < 1 {
        return Err(ToolError::invalid("page", "'page' must be at least 1"));
    }
    let mut query = vec![
        ("type".to_string(), types.join(",")),
        ("page".to_string(), page.to_string()),
        (
            "per_page".to_string(),
            arg_u64(args, "per_page", DEFAULT_FIND_PER_PAGE)?.to_string(),
        ),
    ];
    push_joined(&mut query, args, "search_fields")?;
    push_joined(&mut query, args, "fields")?;
    for key in [
        "search",
        "default_search_operator",
        "sort_field",
        "sort_order",
        "filter",
    ] {
        if let Some(value) = arg_optional_string(args, key)? {
            query.push((key.to_string(), value));
        }
    }
    if let Some(references) = arg_optional_object(args, "has_reference")? {
        for (key, value) in references {
            let value = match value {
                Value::String(text) => text,
                other => other.to_string(),
            };
            query.push((format!("has_reference[{key}]"), value));
        }
    }
    Ok(query)
}

pub(crate) async fn find_objects(
    gateway: SharedGateway,
    args: Map<String, Value>,
) -> Result<String, ToolError> {
    let query = find_query(&args)?;
    let response = gateway
        .get(&format!("{SAVED_OBJECTS_PATH}/_find"), query)
        .await
        .map_err(|e| ToolError::transport(Step::Request, e))?;
    let page = expect_success(response)?;
    Ok(to_pretty_json(&summarize_find_page(&page)))
}

pub(crate) async fn get_object(
    gateway: SharedGateway,
    args: Map<String, Value>,
) -> Result<String, ToolError> {
    let (object_type, id, path) = object_path(&args)?;
    let mut query = Vec::new();
    push_bool(&mut query, &args, "include_references", "include_references")?;
    push_joined(&mut query, &args, "fields")?;
    let response = gateway
        .get(&path, query)
        .await
        .map_err(|e| ToolError::transport(Step::Request, e))?;
    Ok(to_pretty_json(&expect_object(response, &object_type, &id)?))
}

pub(crate) async fn bulk_get_objects(
    gateway: SharedGateway,
    args: Map<String, Value>,
) -> Result<String, ToolError> {
    let objects = required_object_array(&args, "objects")?;
    let refs = parse_object_refs(&objects).map_err(|e| ToolError::invalid(e.field(), e.to_string()))?;
    let mut query = Vec::new();
    push_bool(&mut query, &args, "include_references", "include_references")?;
    push_joined(&mut query, &args, "fields")?;
    let response = gateway
        .send(
            ApiRequest::new(Method::POST, format!("{SAVED_OBJECTS_PATH}/_bulk_get"))
                .with_query(query)
                .with_json(json!({ "objects": refs })),
        )
        .await
        .map_err(|e| ToolError::transport(Step::Request, e))?;
    Ok(to_pretty_json(&expect_success(response)?))
}

fn object_body(args: &Map<String, Value>) -> Result<Value, ToolError> {
    let mut body = json!({ "attributes": required_object(args, "attributes")? });
    if let Some(references) = arg_optional_array(args, "references")? {
        body["references"] = Value::Array(references);
    }
    Ok(body)
}

pub(crate) async fn create_object(
    gateway: SharedGateway,
    args: Map<String, Value>,
) -> Result<String, ToolError> {
    let object_type = required_string(&args, "type")?;
    let body = object_body(&args)?;
    let path = match arg_optional_string(&args, "id")? {
        Some(id) => format!("{SAVED_OBJECTS_PATH}/{object_type}/{id}"),
        None => format!("{SAVED_OBJECTS_PATH}/{object_type}"),
    };
    let mut query = Vec::new();
    push_bool(&mut query, &args, "overwrite", "overwrite")?;

    tracing::info!(object_type = %object_type, "creating saved object");
    let response = gateway
        .send(
            ApiRequest::new(Method::POST, path)
                .with_query(query)
                .with_json(body),
        )
        .await
        .map_err(|e| ToolError::transport(Step::Request, e))?;
    Ok(to_pretty_json(&expect_success(response)?))
}

pub(crate) async fn update_object(
    gateway: SharedGateway,
    args: Map<String, Value>,
) -> Result<String, ToolError> {
    let (object_type, id, path) = object_path(&args)?;
    let body = object_body(&args)?;
    let mut query = Vec::new();
    if let Some(version) = arg_optional_string(&args, "version")? {
        query.push(("version".to_string(), version));
    }
    let response = gateway
        .send(
            ApiRequest::new(Method::PUT, path)
                .with_query(query)
                .with_json(body),
        )
        .await
        .map_err(|e| ToolError::transport(Step::Request, e))?;
    Ok(to_pretty_json(&expect_object(response, &object_type, &id)?))
}

pub(crate) async fn delete_object(
    gateway: SharedGateway,
    args: Map<String, Value>,
) -> Result<String, ToolError> {
    let (object_type, id, path) = object_path(&args)?;
    let mut query = Vec::new();
    push_bool(&mut query, &args, "force", "force")?;
    let response = gateway
        .delete(&path, query)
        .await
        .map_err(|e| ToolError::transport(Step::Request, e))?;
    let body = expect_object(response, &object_type, &id)?;
    let mut result = json!({
        "success": true,
        "message": format!("Successfully deleted saved object of type '{object_type}' with ID '{id}'")
    });
    if !body.is_null() && body != json!({}) {
        result["response"] = body;
    }
    Ok(to_pretty_json(&result))
}

/// Splits an ndjson export into one value per non-empty line.
fn ndjson_lines(raw: &[u8]) -> Vec<Value> {
    String::from_utf8_lossy(raw)
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(|line| {
            serde_json::from_str(line).unwrap_or_else(|_| Value::String(line.to_string()))
        })
        .collect()
}

pub(crate) async fn export_objects(
    gateway: SharedGateway,
    args: Map<String, Value>,
) -> Result<String, ToolError> {
    let objects = required_object_array(&args, "objects")?;
    let refs = parse_object_refs(&objects).map_err(|e| ToolError::invalid(e.field(), e.to_string()))?;
    let mut query = Vec::new();
    for key in ["exclude_export_details", "include_references", "include_namespace"] {
        push_bool(&mut query, &args, key, key)?;
    }
    let response = gateway
        .send(
            ApiRequest::new(Method::POST, format!("{SAVED_OBJECTS_PATH}/_export"))
                .with_query(query)
                .with_json(json!({ "objects": refs })),
        )
        .await
        .map_err(|e| ToolError::transport(Step::Request, e))?;
    if !response.is_success() {
        return Err(ToolError::backend(Step::Request, &response));
    }

    if response.is_ndjson() {
        let exported = ndjson_lines(&response.raw);
        tracing::debug!(objects = exported.len(), "exported saved objects");
        return Ok(to_pretty_json(&Value::Array(exported)));
    }
    match response.body {
        Value::String(raw) => Ok(to_pretty_json(&json!({ "success": true, "raw_response": raw }))),
        body => Ok(to_pretty_json(&body)),
    }
}

pub(crate) async fn import_objects(
    gateway: SharedGateway,
    args: Map<String, Value>,
) -> Result<String, ToolError> {
    let content = required_string(&args, "objects_ndjson")?;
    let mut query = Vec::new();
    push_bool(&mut query, &args, "create_new_copies", "createNewCopies")?;
    push_bool(&mut query, &args, "overwrite", "overwrite")?;
    let upload = FileUpload {
        field: "file".to_string(),
        file_name: "import.ndjson".to_string(),
        mime_type: "application/ndjson".to_string(),
        content,
    };
    let response = gateway
        .send(
            ApiRequest::new(Method::POST, format!("{SAVED_OBJECTS_PATH}/_import"))
                .with_query(query)
                .with_upload(upload),
        )
        .await
        .map_err(|e| ToolError::transport(Step::Request, e))?;
    Ok(to_pretty_json(&expect_success(response)?))
}


fn object_refs_schema() -> Value {
    json!({
        "type": "array",
        "minItems": 1,
        "items": {
            "type": "object",
            "properties": { "type": { "type": "string" }, "id": { "type": "string" } },
            "required": ["type", "id"]
        }
    })
}

pub(super) fn definitions() -> Vec<ToolDefinition> {
    let string_list = json!({ "type": "array", "items": { "type": "string" } });
    vec![
        ToolDefinition {
            name: "find_objects",
            description: "Search saved objects such as dashboards, index patterns and visualizations.",
            input_schema: json!({
                "type": "object",
                "properties": {
                    "type": { "type": "array", "items": { "type": "string" }, "minItems": 1 },
                    "search": { "type": "string" },
                    "search_fields": string_list,
                    "default_search_operator": { "type": "string", "enum": ["OR", "AND"] },
                    "page": { "type": "integer", "minimum": 1, "default": 1 },
                    "per_page": { "type": "integer", "minimum": 1, "default": DEFAULT_FIND_PER_PAGE },
                    "sort_field": { "type": "string" },
                    "sort_order": { "type": "string", "enum": ["asc", "desc"] },
                    "fields": string_list,
                    "filter": { "type": "string" },
                    "has_reference": { "type": "object", "description": "Reference the objects must carry, e.g. { \"type\": \"index-pattern\", \"id\": \"...\" }." }
                },
                "required": ["type"],
                "additionalProperties": false
            }),
        },
        ToolDefinition {
            name: "get_object",
            description: "Fetch one saved object by type and id.",
            input_schema: json!({
                "type": "object",
                "properties": {
                    "type": { "type": "string" },
                    "id": { "type": "string" },
                    "include_references": { "type": "boolean" },
                    "fields": string_list
                },
                "required": ["type", "id"],
                "additionalProperties": false
            }),
        },
        ToolDefinition {
            name: "bulk_get_objects",
            description: "Fetch several saved objects in one request.",
            input_schema: json!({
                "type": "object",
                "properties": {
                    "objects": object_refs_schema(),
                    "include_references": { "type": "boolean" },
                    "fields": string_list
                },
                "required": ["objects"],
                "additionalProperties": false
            }),
        },
        ToolDefinition {
            name: "create_object",
            description: "Create a saved object.",
            input_schema: json!({
                "type": "object",
                "properties": {
                    "type": { "type": "string" },
                    "id": { "type": "string" },
                    "attributes": { "type": "object" },
                    "references": { "type": "array", "items": { "type": "object" } },
                    "overwrite": { "type": "boolean" }
                },
                "required": ["type", "attributes"],
                "additionalProperties": false
            }),
        },
        ToolDefinition {
            name: "update_object",
            description: "Replace the attributes of a saved object.",
            input_schema: json!({
                "type": "object",
                "properties": {
                    "type": { "type": "string" },
                    "id": { "type": "string" },
                    "attributes": { "type": "object" },
                    "version": { "type": "string" },
                    "references": { "type": "array", "items": { "type": "object" } }
                },
                "required": ["type", "id", "attributes"],
                "additionalProperties": false
            }),
        },
        ToolDefinition {
            name: "delete_object",
            description: "Delete a saved object.",
            input_schema: json!({
                "type": "object",
                "properties": {
                    "type": { "type": "string" },
                    "id": { "type": "string" },
                    "force": { "type": "boolean", "description": "Delete even when the object is shared across spaces." }
                },
                "required": ["type", "id"],
                "additionalProperties": false
            }),
        },
        ToolDefinition {
            name: "export_objects",
            description: "Export saved objects as ndjson records.",
            input_schema: json!({
                "type": "object",
                "properties": {
                    "objects": object_refs_schema(),
                    "exclude_export_details": { "type": "boolean" },
                    "include_references": { "type": "boolean" },
                    "include_namespace": { "type": "boolean" }
                },
                "required": ["objects"],
                "additionalProperties": false
            }),
        },
        ToolDefinition {
            name: "import_objects",
            description: "Import saved objects from ndjson text.",
            input_schema: json!({
                "type": "object",
                "properties": {
                    "objects_ndjson": { "type": "string" },
                    "create_new_copies": { "type": "boolean" },
                    "overwrite": { "type": "boolean" }
                },
                "required": ["objects_ndjson"],
                "additionalProperties": false
            }),
        },
    ]
}
