use secops_core::cases::{CaseComment, CaseSeverity, CaseStatus, DEFAULT_CASE_OWNER, SearchOperator};
use secops_core::rules::SortOrder;
use serde_json::{Map, Value, json};

use super::args::{
    arg_optional_array, arg_optional_object, arg_optional_string, arg_optional_string_array,
    arg_string, arg_u64, parse_enum, required_string, required_string_array,
};
use super::{ToolDefinition, expect_success, to_pretty_json};
use crate::error::{Step, ToolError};
use crate::harness::SharedGateway;

const CASES_PATH: &str = "/api/cases";
const DEFAULT_CASES_PER_PAGE: u64 = 20;

async fn get_json(
    gateway: &SharedGateway,
    path: &str,
    query: Vec<(String, String)>,
) -> Result<String, ToolError> {
    let response = gateway
        .get(path, query)
        .await
        .map_err(|e| ToolError::transport(Step::Request, e))?;
    Ok(to_pretty_json(&expect_success(response)?))
}

/// List arguments are sent as one query pair per value.
fn push_repeated(
    query: &mut Vec<(String, String)>,
    args: &Map<String, Value>,
    key: &str,
    param: &str,
) -> Result<(), ToolError> {
    for value in arg_optional_string_array(args, key)?.unwrap_or_default() {
        query.push((param.to_string(), value));
    }
    Ok(())
}

fn paging(args: &Map<String, Value>) -> Result<Vec<(String, String)>, ToolError> {
    let page = arg_u64(args, "page", 1)?;
    if page < 1 {
        return Err(ToolError::invalid("page", "'page' must be at least 1"));
    }
    let sort_order: SortOrder = parse_enum(&arg_string(args, "sort_order", "desc")?, "sort_order")?;
    Ok(vec![
        ("page".to_string(), page.to_string()),
        (
            "perPage".to_string(),
            arg_u64(args, "per_page", DEFAULT_CASES_PER_PAGE)?.to_string(),
        ),
        ("sortOrder".to_string(), sort_order.as_str().to_string()),
    ])
}

fn find_cases_query(args: &Map<String, Value>) -> Result<Vec<(String, String)>, ToolError> {
    let mut query = paging(args)?;
    query.push((
        "sortField".to_string(),
        arg_string(args, "sort_field", "created_at")?,
    ));
    let operator: SearchOperator = parse_enum(
        &arg_string(args, "default_search_operator", "OR")?,
        "default_search_operator",
    )?;
    query.push((
        "defaultSearchOperator".to_string(),
        operator.as_str().to_string(),
    ));

    for (key, param) in [
        ("assignees", "assignees"),
        ("owner", "owner"),
        ("reporters", "reporters"),
        ("search_fields", "searchFields"),
        ("tags", "tags"),
    ] {
        push_repeated(&mut query, args, key, param)?;
    }
    for (key, param) in [
        ("category", "category"),
        ("from_date", "from"),
        ("to_date", "to"),
        ("search", "search"),
    ] {
        if let Some(value) = arg_optional_string(args, key)? {
            query.push((param.to_string(), value));
        }
    }
    if let Some(raw) = arg_optional_string(args, "severity")? {
        let severity: CaseSeverity = parse_enum(&raw, "severity")?;
        query.push(("severity".to_string(), severity.as_str().to_string()));
    }
    if let Some(raw) = arg_optional_string(args, "status")? {
        let status: CaseStatus = parse_enum(&raw, "status")?;
        query.push(("status".to_string(), status.as_str().to_string()));
    }
    Ok(query)
}

pub(crate) async fn find_cases(
    gateway: SharedGateway,
    args: Map<String, Value>,
) -> Result<String, ToolError> {
    let query = find_cases_query(&args)?;
    get_json(&gateway, &format!("{CASES_PATH}/_find"), query).await
}

pub(crate) async fn get_case(
    gateway: SharedGateway,
    args: Map<String, Value>,
) -> Result<String, ToolError> {
    let case_id = required_string(&args, "case_id")?;
    get_json(&gateway, &format!("{CASES_PATH}/{case_id}"), Vec::new()).await
}

pub(crate) async fn get_case_alerts(
    gateway: SharedGateway,
    args: Map<String, Value>,
) -> Result<String, ToolError> {
    let case_id = required_string(&args, "case_id")?;
    get_json(&gateway, &format!("{CASES_PATH}/{case_id}/alerts"), Vec::new()).await
}

pub(crate) async fn get_case_comments(
    gateway: SharedGateway,
    args: Map<String, Value>,
) -> Result<String, ToolError> {
    let case_id = required_string(&args, "case_id")?;
    let query = paging(&args)?;
    get_json(
        &gateway,
        &format!("{CASES_PATH}/{case_id}/comments/_find"),
        query,
    )
    .await
}

/// Connector fields shared by create and update. `None` when no connector
/// argument was given.
fn connector(args: &Map<String, Value>) -> Result<Option<Value>, ToolError> {
    let id = arg_optional_string(args, "connector_id")?;
    let name = arg_optional_string(args, "connector_name")?;
    let kind = arg_optional_string(args, "connector_type")?;
    let fields = arg_optional_object(args, "connector_fields")?;
    if id.is_none() && name.is_none() && kind.is_none() && fields.is_none() {
        return Ok(None);
    }
    Ok(Some(json!({
        "id": id.unwrap_or_else(|| "none".to_string()),
        "name": name.unwrap_or_else(|| "none".to_string()),
        "type": kind.unwrap_or_else(|| ".none".to_string()),
        "fields": fields.map(Value::Object).unwrap_or(Value::Null)
    })))
}

/// Optional case attributes accepted by both create and update.
fn case_attributes(args: &Map<String, Value>, target: &mut Value) -> Result<(), ToolError> {
    if let Some(assignees) = arg_optional_array(args, "assignees")? {
        target["assignees"] = Value::Array(assignees);
    }
    if let Some(category) = arg_optional_string(args, "category")? {
        target["category"] = Value::String(category);
    }
    if let Some(custom_fields) = arg_optional_array(args, "custom_fields")? {
        target["customFields"] = Value::Array(custom_fields);
    }
    if let Some(settings) = arg_optional_object(args, "settings")? {
        target["settings"] = Value::Object(settings);
    }
    Ok(())
}

pub(crate) async fn create_case(
    gateway: SharedGateway,
    args: Map<String, Value>,
) -> Result<String, ToolError> {
    let title = required_string(&args, "title")?;
    tracing::info!(title = %title, "creating case");
    let description = required_string(&args, "description")?;
    let severity: CaseSeverity = parse_enum(&arg_string(&args, "severity", "low")?, "severity")?;
    let connector = connector(&args)?.unwrap_or_else(|| {
        json!({ "id": "none", "name": "none", "type": ".none", "fields": null })
    });

    let mut payload = json!({
        "title": title,
        "description": description,
        "tags": arg_optional_string_array(&args, "tags")?.unwrap_or_default(),
        "connector": connector,
        "owner": arg_string(&args, "owner", DEFAULT_CASE_OWNER)?,
        "severity": severity.as_str()
    });
    case_attributes(&args, &mut payload)?;

    let response = gateway
        .post(CASES_PATH, payload)
        .await
        .map_err(|e| ToolError::transport(Step::Request, e))?;
    Ok(to_pretty_json(&expect_success(response)?))
}

pub(crate) async fn update_case(
    gateway: SharedGateway,
    args: Map<String, Value>,
) -> Result<String, ToolError> {
    let case_id = required_string(&args, "case_id")?;
    let version = required_string(&args, "version")?;

    let mut update = json!({ "id": case_id, "version": version });
    for key in ["title", "description"] {
        if let Some(value) = arg_optional_string(&args, key)? {
            update[key] = Value::String(value);
        }
    }
    if let Some(tags) = arg_optional_string_array(&args, "tags")? {
        update["tags"] = json!(tags);
    }
    if let Some(raw) = arg_optional_string(&args, "severity")? {
        let severity: CaseSeverity = parse_enum(&raw, "severity")?;
        update["severity"] = Value::String(severity.as_str().to_string());
    }
    if let Some(raw) = arg_optional_string(&args, "status")? {
        let status: CaseStatus = parse_enum(&raw, "status")?;
        update["status"] = Value::String(status.as_str().to_string());
    }
    if let Some(connector) = connector(&args)? {
        update["connector"] = connector;
    }
    case_attributes(&args, &mut update)?;

    let response = gateway
        .patch(CASES_PATH, json!({ "cases": [update] }))
        .await
        .map_err(|e| ToolError::transport(Step::Request, e))?;
    Ok(to_pretty_json(&expect_success(response)?))
}

pub(crate) async fn delete_cases(
    gateway: SharedGateway,
    args: Map<String, Value>,
) -> Result<String, ToolError> {
    let case_ids = required_string_array(&args, "case_ids")?;
    let query = case_ids
        .iter()
        .map(|id| ("ids".to_string(), id.clone()))
        .collect();
    let response = gateway
        .delete(CASES_PATH, query)
        .await
        .map_err(|e| ToolError::transport(Step::Request, e))?;
    expect_success(response)?;
    Ok(format!(
        "Deleted {} case(s): {}",
        case_ids.len(),
        case_ids.join(", ")
    ))
}

fn case_comment(args: &Map<String, Value>) -> Result<CaseComment, ToolError> {
    match arg_string(args, "comment_type", "user")?.as_str() {
        "user" => Ok(CaseComment::User {
            comment: required_string(args, "comment")?,
        }),
        "alert" => {
            let rule = match arg_optional_string(args, "rule_id")? {
                Some(rule_id) => Some((rule_id, arg_optional_string(args, "rule_name")?)),
                None => None,
            };
            Ok(CaseComment::Alert {
                alert_ids: required_string_array(args, "alert_ids")?,
                index: required_string(args, "alert_index")?,
                rule,
            })
        }
        other => Err(ToolError::invalid(
            "comment_type",
            format!("invalid comment type '{other}'; expected 'user' or 'alert'"),
        )),
    }
}

pub(crate) async fn add_case_comment(
    gateway: SharedGateway,
    args: Map<String, Value>,
) -> Result<String, ToolError> {
    let case_id = required_string(&args, "case_id")?;
    let comment = case_comment(&args)?;
    let owner = arg_string(&args, "owner", DEFAULT_CASE_OWNER)?;
    tracing::info!(case_id = %case_id, kind = comment.kind(), "adding case comment");
    let response = gateway
        .post(
            &format!("{CASES_PATH}/{case_id}/comments"),
            comment.to_body(&owner),
        )
        .await
        .map_err(|e| ToolError::transport(Step::Request, e))?;
    Ok(to_pretty_json(&expect_success(response)?))
}

fn owner_query(args: &Map<String, Value>) -> Result<Vec<(String, String)>, ToolError> {
    let mut query = Vec::new();
    push_repeated(&mut query, args, "owner", "owner")?;
    Ok(query)
}

pub(crate) async fn get_cases_by_alert(
    gateway: SharedGateway,
    args: Map<String, Value>,
) -> Result<String, ToolError> {
    let alert_id = required_string(&args, "alert_id")?;
    let query = owner_query(&args)?;
    get_json(&gateway, &format!("{CASES_PATH}/alerts/{alert_id}"), query).await
}

pub(crate) async fn get_case_configuration(
    gateway: SharedGateway,
    args: Map<String, Value>,
) -> Result<String, ToolError> {
    let query = owner_query(&args)?;
    get_json(&gateway, &format!("{CASES_PATH}/configure"), query).await
}

pub(crate) async fn get_case_tags(
    gateway: SharedGateway,
    args: Map<String, Value>,
) -> Result<String, ToolError> {
    let query = owner_query(&args)?;
    get_json(&gateway, &format!("{CASES_PATH}/tags"), query).await
}


fn case_id_schema() -> Value {
    json!({
        "type": "object",
        "properties": { "case_id": { "type": "string" } },
        "required": ["case_id"],
        "additionalProperties": false
    })
}

fn owner_schema(extra: Value, required: &[&str]) -> Value {
    let mut properties = json!({
        "owner": { "type": "array", "items": { "type": "string" } }
    });
    if let (Some(target), Value::Object(extra)) = (properties.as_object_mut(), extra) {
        target.extend(extra);
    }
    json!({
        "type": "object",
        "properties": properties,
        "required": required,
        "additionalProperties": false
    })
}

/// Properties shared by create_case and update_case.
fn case_properties() -> Map<String, Value> {
    let properties = json!({
        "title": { "type": "string" },
        "description": { "type": "string" },
        "tags": { "type": "array", "items": { "type": "string" } },
        "assignees": { "type": "array", "items": { "type": "object" } },
        "category": { "type": "string" },
        "connector_id": { "type": "string" },
        "connector_name": { "type": "string" },
        "connector_type": { "type": "string" },
        "connector_fields": { "type": "object" },
        "custom_fields": { "type": "array", "items": { "type": "object" } },
        "settings": { "type": "object" },
        "severity": { "type": "string", "enum": ["low", "medium", "high", "critical"] }
    });
    match properties {
        Value::Object(map) => map,
        _ => Map::new(),
    }
}

pub(super) fn definitions() -> Vec<ToolDefinition> {
    let string_list = json!({ "type": "array", "items": { "type": "string" } });
    let status = json!({ "type": "string", "enum": ["open", "in-progress", "closed"] });
    let sort_order = json!({ "type": "string", "enum": ["asc", "desc"], "default": "desc" });

    let mut create = case_properties();
    create.insert("owner".to_string(), json!({ "type": "string", "default": DEFAULT_CASE_OWNER }));
    let mut update = case_properties();
    update.insert("case_id".to_string(), json!({ "type": "string" }));
    update.insert(
        "version".to_string(),
        json!({ "type": "string", "description": "Current version of the case, from get_case." }),
    );
    update.insert("status".to_string(), status.clone());

    vec![
        ToolDefinition {
            name: "find_cases",
            description: "Search cases with filters, sorting and paging.",
            input_schema: json!({
                "type": "object",
                "properties": {
                    "assignees": string_list,
                    "category": { "type": "string" },
                    "default_search_operator": { "type": "string", "enum": ["OR", "AND"], "default": "OR" },
                    "from_date": { "type": "string" },
                    "to_date": { "type": "string" },
                    "owner": string_list,
                    "page": { "type": "integer", "minimum": 1, "default": 1 },
                    "per_page": { "type": "integer", "minimum": 1, "default": DEFAULT_CASES_PER_PAGE },
                    "reporters": string_list,
                    "search": { "type": "string" },
                    "search_fields": string_list,
                    "severity": { "type": "string", "enum": ["low", "medium", "high", "critical"] },
                    "sort_field": { "type": "string", "default": "created_at" },
                    "sort_order": sort_order,
                    "status": status,
                    "tags": string_list
                },
                "additionalProperties": false
            }),
        },
        ToolDefinition {
            name: "get_case",
            description: "Fetch one case.",
            input_schema: case_id_schema(),
        },
        ToolDefinition {
            name: "get_case_alerts",
            description: "List the alerts attached to a case.",
            input_schema: case_id_schema(),
        },
        ToolDefinition {
            name: "get_case_comments",
            description: "List the comments of a case.",
            input_schema: json!({
                "type": "object",
                "properties": {
                    "case_id": { "type": "string" },
                    "page": { "type": "integer", "minimum": 1, "default": 1 },
                    "per_page": { "type": "integer", "minimum": 1, "default": DEFAULT_CASES_PER_PAGE },
                    "sort_order": sort_order
                },
                "required": ["case_id"],
                "additionalProperties": false
            }),
        },
        ToolDefinition {
            name: "create_case",
            description: "Open a new case.",
            input_schema: json!({
                "type": "object",
                "properties": create,
                "required": ["title", "description"],
                "additionalProperties": false
            }),
        },
        ToolDefinition {
            name: "update_case",
            description: "Update fields of a case. Only the given fields change.",
            input_schema: json!({
                "type": "object",
                "properties": update,
                "required": ["case_id", "version"],
                "additionalProperties": false
            }),
        },
        ToolDefinition {
            name: "delete_cases",
            description: "Delete cases by id.",
            input_schema: json!({
                "type": "object",
                "properties": {
                    "case_ids": { "type": "array", "items": { "type": "string" }, "minItems": 1 }
                },
                "required": ["case_ids"],
                "additionalProperties": false
            }),
        },
        ToolDefinition {
            name: "add_case_comment",
            description: "Add a user comment, or attach alerts, to a case.",
            input_schema: json!({
                "type": "object",
                "properties": {
                    "case_id": { "type": "string" },
                    "comment_type": { "type": "string", "enum": ["user", "alert"], "default": "user" },
                    "comment": { "type": "string", "description": "Required for user comments." },
                    "alert_ids": { "type": "array", "items": { "type": "string" }, "description": "Required for alert comments." },
                    "alert_index": { "type": "string", "description": "Required for alert comments." },
                    "rule_id": { "type": "string" },
                    "rule_name": { "type": "string" },
                    "owner": { "type": "string", "default": DEFAULT_CASE_OWNER }
                },
                "required": ["case_id"],
                "additionalProperties": false
            }),
        },
        ToolDefinition {
            name: "get_cases_by_alert",
            description: "List the cases an alert is attached to.",
            input_schema: owner_schema(json!({ "alert_id": { "type": "string" } }), &["alert_id"]),
        },
        ToolDefinition {
            name: "get_case_configuration",
            description: "Fetch case settings such as connectors and closure options.",
            input_schema: owner_schema(json!({}), &[]),
        },
        ToolDefinition {
            name: "get_case_tags",
            description: "List every tag used on cases.",
            input_schema: owner_schema(json!({}), &[]),
        },
    ]
}
