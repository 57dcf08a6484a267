use secops_core::alerts::{ALERT_SEARCH_FIELDS, AlertStatus};
use serde_json::{Map, Value, json};

use super::args::{arg_optional_u64, arg_string, parse_enum, required_string, required_string_array};
use super::{expect_success, to_pretty_json};
use crate::error::{Step, ToolError};
use crate::harness::SharedGateway;

const SIGNALS_SEARCH_PATH: &str = "/api/detection_engine/signals/search";
const SIGNALS_STATUS_PATH: &str = "/api/detection_engine/signals/status";
const SIGNALS_TAGS_PATH: &str = "/api/detection_engine/signals/tags";
const DEFAULT_ALERT_LIMIT: u64 = 20;
const MAX_ALERT_LIMIT: u64 = 10_000;

pub(crate) async fn get_alerts(
    gateway: SharedGateway,
    args: Map<String, Value>,
) -> Result<String, ToolError> {
    let limit = arg_optional_u64(&args, "limit")?.unwrap_or(DEFAULT_ALERT_LIMIT);
    if !(1..=MAX_ALERT_LIMIT).contains(&limit) {
        return Err(ToolError::invalid(
            "limit",
            format!("'limit' must be between 1 and {MAX_ALERT_LIMIT}"),
        ));
    }
    let search_text = arg_string(&args, "search_text", "*")?;

    let response = gateway
        .post(SIGNALS_SEARCH_PATH, alert_search_query(limit, &search_text))
        .await
        .map_err(|e| ToolError::transport(Step::Request, e))?;
    let body = expect_success(response)?;
    Ok(to_pretty_json(&body))
}

fn alert_search_query(limit: u64, search_text: &str) -> Value {
    let search_text = search_text.trim();
    let filter = if search_text.is_empty() || search_text == "*" {
        Vec::new()
    } else {
        vec![json!({
            "multi_match": {
                "query": search_text,
                "fields": ALERT_SEARCH_FIELDS
            }
        })]
    };
    json!({
        "query": {
            "bool": {
                "must": [],
                "filter": filter,
                "should": [],
                "must_not": []
            }
        },
        "size": limit,
        "sort": [{ "@timestamp": { "order": "desc" } }]
    })
}

pub(crate) async fn tag_alert(
    gateway: SharedGateway,
    args: Map<String, Value>,
) -> Result<String, ToolError> {
    let alert_id = required_string(&args, "alert_id")?;
    let tags = required_string_array(&args, "tags")?;

    let response = gateway
        .post(
            SIGNALS_TAGS_PATH,
            json!({
                "ids": [alert_id],
                "tags": {
                    "tags_to_add": tags,
                    "tags_to_remove": []
                }
            }),
        )
        .await
        .map_err(|e| ToolError::transport(Step::Request, e))?;
    let body = expect_success(response)?;
    let updated = body.get("updated").and_then(Value::as_u64).unwrap_or(0);
    Ok(format!(
        "Added tags {} to alert {alert_id}. Updated: {updated}",
        tags.join(", ")
    ))
}

pub(crate) async fn adjust_alert_status(
    gateway: SharedGateway,
    args: Map<String, Value>,
) -> Result<String, ToolError> {
    let alert_id = required_string(&args, "alert_id")?;
    let status: AlertStatus = parse_enum(&required_string(&args, "new_status")?, "new_status")?;

    let response = gateway
        .post(
            SIGNALS_STATUS_PATH,
            json!({
                "signal_ids": [alert_id],
                "status": status.as_str()
            }),
        )
        .await
        .map_err(|e| ToolError::transport(Step::Request, e))?;
    let body = expect_success(response)?;
    let updated = body.get("updated").and_then(Value::as_u64).unwrap_or(0);
    if updated > 0 {
        Ok(format!(
            "Set status of alert {alert_id} to {}. Updated {updated} signal(s).",
            status.as_str()
        ))
    } else {
        Ok(format!(
            "Status update to {} accepted, but no signals were updated (check the alert id or its current status).",
            status.as_str()
        ))
    }
}
