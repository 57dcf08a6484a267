use secops_core::rules::{RuleSelector, SortField, SortOrder};
use serde_json::{Map, Value, json};

use super::args::{arg_bool, arg_optional_string, arg_optional_u64, parse_enum};
use super::{expect_success, to_pretty_json};
use crate::engine::AssociationEngine;
use crate::error::{ResourceKind, Step, ToolError};
use crate::harness::SharedGateway;
use crate::resolver::RULES_PATH;

const FIND_RULES_PATH: &str = "/api/detection_engine/rules/_find";
const PREPACKAGED_PATH: &str = "/api/detection_engine/rules/prepackaged";

fn rule_selector(args: &Map<String, Value>) -> Result<RuleSelector, ToolError> {
    let rule_id = arg_optional_string(args, "rule_id")?;
    let id = arg_optional_string(args, "id")?;
    RuleSelector::from_pair(rule_id, id).ok_or_else(|| ToolError::InvalidArguments {
        field: None,
        message: "provide exactly one of 'rule_id' or 'id'".to_string(),
    })
}

fn find_rules_query(args: &Map<String, Value>) -> Result<Vec<(String, String)>, ToolError> {
    let mut query = Vec::new();
    if let Some(filter) = arg_optional_string(args, "filter")? {
        query.push(("filter".to_string(), filter));
    }
    if let Some(raw) = arg_optional_string(args, "sort_field")? {
        let field: SortField = parse_enum(&raw, "sort_field")?;
        query.push(("sort_field".to_string(), field.as_str().to_string()));
    }
    if let Some(raw) = arg_optional_string(args, "sort_order")? {
        let order: SortOrder = parse_enum(&raw, "sort_order")?;
        query.push(("sort_order".to_string(), order.as_str().to_string()));
    }
    if let Some(page) = arg_optional_u64(args, "page")? {
        if page < 1 {
            return Err(ToolError::invalid("page", "'page' must be at least 1"));
        }
        query.push(("page".to_string(), page.to_string()));
    }
    if let Some(per_page) = arg_optional_u64(args, "per_page")? {
        query.push(("per_page".to_string(), per_page.to_string()));
    }
    Ok(query)
}

pub(crate) async fn find_rules(
    gateway: SharedGateway,
    args: Map<String, Value>,
) -> Result<String, ToolError> {
    let query = find_rules_query(&args)?;
    let response = gateway
        .get(FIND_RULES_PATH, query)
        .await
        .map_err(|e| ToolError::transport(Step::Request, e))?;
    Ok(to_pretty_json(&expect_success(response)?))
}

pub(crate) async fn get_rule(
    gateway: SharedGateway,
    args: Map<String, Value>,
) -> Result<String, ToolError> {
    let selector = rule_selector(&args)?;
    let rule = AssociationEngine::new(&*gateway)
        .resolve_rule(&selector)
        .await?;
    Ok(to_pretty_json(&rule.snapshot))
}

pub(crate) async fn update_rule_status(
    gateway: SharedGateway,
    args: Map<String, Value>,
) -> Result<String, ToolError> {
    let selector = rule_selector(&args)?;
    let enabled = arg_bool(&args, "enabled", true)?;
    let rule = AssociationEngine::new(&*gateway)
        .resolve_rule(&selector)
        .await?;

    let response = gateway
        .patch(
            RULES_PATH,
            json!({ "id": rule.reference.internal_id, "enabled": enabled }),
        )
        .await
        .map_err(|e| ToolError::transport(Step::WriteBack, e))?;
    if !response.is_success() {
        return Err(ToolError::backend(Step::WriteBack, &response));
    }

    let state = response
        .body
        .get("enabled")
        .and_then(Value::as_bool)
        .unwrap_or(enabled);
    Ok(format!(
        "Rule {} is now {}.",
        selector,
        if state { "enabled" } else { "disabled" }
    ))
}

pub(crate) async fn delete_rule(
    gateway: SharedGateway,
    args: Map<String, Value>,
) -> Result<String, ToolError> {
    let selector = rule_selector(&args)?;
    let response = gateway
        .delete(RULES_PATH, selector.query())
        .await
        .map_err(|e| ToolError::transport(Step::Request, e))?;
    if response.is_not_found() {
        return Err(ToolError::NotFound {
            resource: ResourceKind::Rule,
            identifier: format!("'{}'", selector.value()),
        });
    }
    let body = expect_success(response)?;
    let name = body
        .get("name")
        .and_then(Value::as_str)
        .unwrap_or_default();
    if name.is_empty() {
        Ok(format!("Deleted rule {selector}."))
    } else {
        Ok(format!("Deleted rule {selector} ({name})."))
    }
}

fn count(body: &Value, key: &str) -> u64 {
    body.get(key).and_then(Value::as_u64).unwrap_or(0)
}

pub(crate) async fn get_prepackaged_rules_status(
    gateway: SharedGateway,
    _args: Map<String, Value>,
) -> Result<String, ToolError> {
    let response = gateway
        .get(&format!("{PREPACKAGED_PATH}/_status"), Vec::new())
        .await
        .map_err(|e| ToolError::transport(Step::Request, e))?;
    let status = expect_success(response)?;

    let mut text = format!(
        "Prepackaged Detection Rules Status:\n\
         - Custom rules installed: {}\n\
         - Prepackaged rules installed: {}\n\
         - Prepackaged rules available but not installed: {}\n\
         - Prepackaged rules installed but outdated: {}\n\n\
         Prepackaged Timelines Status:\n\
         - Prepackaged timelines installed: {}\n\
         - Prepackaged timelines available but not installed: {}\n\
         - Prepackaged timelines installed but outdated: {}\n",
        count(&status, "rules_custom_installed"),
        count(&status, "rules_installed"),
        count(&status, "rules_not_installed"),
        count(&status, "rules_not_updated"),
        count(&status, "timelines_installed"),
        count(&status, "timelines_not_installed"),
        count(&status, "timelines_not_updated"),
    );
    if let Some(missing) = status
        .get("rules_custom_installed_missing_exceptions_list")
        .and_then(Value::as_array)
    {
        text.push_str(&format!(
            "\nCustom rules missing exceptions: {}\n",
            missing.len()
        ));
    }
    Ok(text)
}

pub(crate) async fn install_prepackaged_rules(
    gateway: SharedGateway,
    _args: Map<String, Value>,
) -> Result<String, ToolError> {
    tracing::info!("installing prepackaged rules and timelines");
    let response = gateway
        .put(PREPACKAGED_PATH, None)
        .await
        .map_err(|e| ToolError::transport(Step::WriteBack, e))?;
    if !response.is_success() {
        return Err(ToolError::backend(Step::WriteBack, &response));
    }
    let result = &response.body;
    Ok(format!(
        "Prepackaged content installation completed successfully.\n\n\
         Detection Rules:\n\
         - {} new rules installed\n\
         - {} existing rules updated\n\n\
         Timelines:\n\
         - {} new timelines installed\n\
         - {} existing timelines updated",
        count(result, "rules_installed"),
        count(result, "rules_updated"),
        count(result, "timelines_installed"),
        count(result, "timelines_updated"),
    ))
}
