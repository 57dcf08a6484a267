//! Tool registry and dispatch. Every tool is invoked through
//! [`crate::harness::invoke`], so tool bodies only deal with arguments and
//! backend calls.

mod alerts;
mod args;
mod cases;
mod endpoint;
mod exceptions;
mod rules;
mod saved_objects;

use std::sync::LazyLock;

use serde_json::{Map, Value, json};

use crate::error::{Step, ToolError};
use crate::gateway::ApiResponse;
use crate::harness::{self, FailureKind, SharedGateway, ToolResult};

#[derive(Debug)]
pub struct ToolDefinition {
    pub name: &'static str,
    pub description: &'static str,
    pub input_schema: Value,
}

static REGISTRY: LazyLock<Vec<ToolDefinition>> = LazyLock::new(build_definitions);

pub async fn call_tool(
    name: &str,
    gateway: Option<&SharedGateway>,
    args: Map<String, Value>,
) -> ToolResult {
    let Some(definition) = REGISTRY.iter().find(|tool| tool.name == name) else {
        return unknown_tool(name);
    };
    if let Err(err) = reject_unknown_arguments(definition, &args) {
        tracing::warn!(tool = name, error = %err, "rejected tool arguments");
        return ToolResult::failure(FailureKind::InvalidArguments, &err);
    }

    match name {
        "get_alerts" => harness::invoke(name, alerts::get_alerts, gateway, args).await,
        "tag_alert" => harness::invoke(name, alerts::tag_alert, gateway, args).await,
        "adjust_alert_status" => {
            harness::invoke(name, alerts::adjust_alert_status, gateway, args).await
        }
        "find_rules" => harness::invoke(name, rules::find_rules, gateway, args).await,
        "get_rule" => harness::invoke(name, rules::get_rule, gateway, args).await,
        "update_rule_status" => {
            harness::invoke(name, rules::update_rule_status, gateway, args).await
        }
        "delete_rule" => harness::invoke(name, rules::delete_rule, gateway, args).await,
        "get_prepackaged_rules_status" => {
            harness::invoke(name, rules::get_prepackaged_rules_status, gateway, args).await
        }
        "install_prepackaged_rules" => {
            harness::invoke(name, rules::install_prepackaged_rules, gateway, args).await
        }
        "create_exception_list" => {
            harness::invoke(name, exceptions::create_exception_list, gateway, args).await
        }
        "get_rule_exceptions" => {
            harness::invoke(name, exceptions::get_rule_exceptions, gateway, args).await
        }
        "associate_shared_exception_list" => {
            harness::invoke(
                name,
                exceptions::associate_shared_exception_list,
                gateway,
                args,
            )
            .await
        }
        "add_rule_exception_items" => {
            harness::invoke(name, exceptions::add_rule_exception_items, gateway, args).await
        }
        "isolate_endpoint" => {
            harness::invoke(name, endpoint::isolate_endpoint, gateway, args).await
        }
        "unisolate_endpoint" => {
            harness::invoke(name, endpoint::unisolate_endpoint, gateway, args).await
        }
        "run_command_on_endpoint" => {
            harness::invoke(name, endpoint::run_command_on_endpoint, gateway, args).await
        }
        "kill_process" => harness::invoke(name, endpoint::kill_process, gateway, args).await,
        "scan_endpoint" => harness::invoke(name, endpoint::scan_endpoint, gateway, args).await,
        "get_response_actions" => {
            harness::invoke(name, endpoint::get_response_actions, gateway, args).await
        }
        "get_response_action_details" => {
            harness::invoke(name, endpoint::get_response_action_details, gateway, args).await
        }
        "get_response_action_status" => {
            harness::invoke(name, endpoint::get_response_action_status, gateway, args).await
        }
        "get_file_info" => harness::invoke(name, endpoint::get_file_info, gateway, args).await,
        "download_file" => harness::invoke(name, endpoint::download_file, gateway, args).await,
        "find_cases" => harness::invoke(name, cases::find_cases, gateway, args).await,
        "get_case" => harness::invoke(name, cases::get_case, gateway, args).await,
        "get_case_alerts" => harness::invoke(name, cases::get_case_alerts, gateway, args).await,
        "get_case_comments" => {
            harness::invoke(name, cases::get_case_comments, gateway, args).await
        }
        "create_case" => harness::invoke(name, cases::create_case, gateway, args).await,
        "update_case" => harness::invoke(name, cases::update_case, gateway, args).await,
        "delete_cases" => harness::invoke(name, cases::delete_cases, gateway, args).await,
        "add_case_comment" => {
            harness::invoke(name, cases::add_case_comment, gateway, args).await
        }
        "get_cases_by_alert" => {
            harness::invoke(name, cases::get_cases_by_alert, gateway, args).await
        }
        "get_case_configuration" => {
            harness::invoke(name, cases::get_case_configuration, gateway, args).await
        }
        "get_case_tags" => harness::invoke(name, cases::get_case_tags, gateway, args).await,
        "find_objects" => {
            harness::invoke(name, saved_objects::find_objects, gateway, args).await
        }
        "get_object" => harness::invoke(name, saved_objects::get_object, gateway, args).await,
        "bulk_get_objects" => {
            harness::invoke(name, saved_objects::bulk_get_objects, gateway, args).await
        }
        "create_object" => {
            harness::invoke(name, saved_objects::create_object, gateway, args).await
        }
        "update_object" => {
            harness::invoke(name, saved_objects::update_object, gateway, args).await
        }
        "delete_object" => {
            harness::invoke(name, saved_objects::delete_object, gateway, args).await
        }
        "export_objects" => {
            harness::invoke(name, saved_objects::export_objects, gateway, args).await
        }
        "import_objects" => {
            harness::invoke(name, saved_objects::import_objects, gateway, args).await
        }
        _ => unknown_tool(name),
    }
}

fn unknown_tool(name: &str) -> ToolResult {
    ToolResult::failure(
        FailureKind::InvalidArguments,
        &ToolError::invalid("name", format!("unknown tool '{name}'")),
    )
}

/// Every argument key must be a declared property of the tool's input schema.
fn reject_unknown_arguments(
    definition: &ToolDefinition,
    args: &Map<String, Value>,
) -> Result<(), ToolError> {
    let properties = definition.input_schema.get("properties").and_then(Value::as_object);
    match args
        .keys()
        .find(|key| !properties.is_some_and(|declared| declared.contains_key(*key)))
    {
        Some(key) => Err(ToolError::invalid(key.as_str(), "unknown argument")),
        None => Ok(()),
    }
}

/// Accepts any 2xx response and hands back its body.
pub(crate) fn expect_success(response: ApiResponse) -> Result<Value, ToolError> {
    if response.is_success() {
        Ok(response.body)
    } else {
        Err(ToolError::backend(Step::Request, &response))
    }
}

pub(crate) fn to_pretty_json(value: &Value) -> String {
    serde_json::to_string_pretty(value).unwrap_or_else(|_| "{}".to_string())
}

fn rule_selector_schema(extra: Value) -> Value {
    let mut properties = json!({
        "rule_id": {
            "type": "string",
            "description": "Human-facing rule_id of the rule."
        },
        "id": {
            "type": "string",
            "description": "Internal id of the rule."
        }
    });
    if let (Some(target), Value::Object(extra)) = (properties.as_object_mut(), extra) {
        target.extend(extra);
    }
    json!({
        "type": "object",
        "description": "Identify the rule with exactly one of rule_id or id.",
        "properties": properties,
        "additionalProperties": false
    })
}

pub fn tool_definitions() -> &'static [ToolDefinition] {
    &REGISTRY
}

fn build_definitions() -> Vec<ToolDefinition> {
    let mut definitions = vec![
        ToolDefinition {
            name: "get_alerts",
            description: "Search recent detection alerts, newest first.",
            input_schema: json!({
                "type": "object",
                "properties": {
                    "limit": { "type": "integer", "minimum": 1, "maximum": 10000, "default": 20 },
                    "search_text": {
                        "type": "string",
                        "default": "*",
                        "description": "Free text matched against rule name, reason, host, user and alert id. '*' returns everything."
                    }
                },
                "additionalProperties": false
            }),
        },
        ToolDefinition {
            name: "tag_alert",
            description: "Add tags to a detection alert.",
            input_schema: json!({
                "type": "object",
                "properties": {
                    "alert_id": { "type": "string" },
                    "tags": { "type": "array", "items": { "type": "string" }, "minItems": 1 }
                },
                "required": ["alert_id", "tags"],
                "additionalProperties": false
            }),
        },
        ToolDefinition {
            name: "adjust_alert_status",
            description: "Set the workflow status of a detection alert.",
            input_schema: json!({
                "type": "object",
                "properties": {
                    "alert_id": { "type": "string" },
                    "new_status": { "type": "string", "enum": ["open", "acknowledged", "closed"] }
                },
                "required": ["alert_id", "new_status"],
                "additionalProperties": false
            }),
        },
        ToolDefinition {
            name: "find_rules",
            description: "Find detection rules with an optional KQL filter, sorting and paging.",
            input_schema: json!({
                "type": "object",
                "properties": {
                    "filter": { "type": "string", "description": "KQL filter such as alert.attributes.name:\"My Rule\"" },
                    "sort_field": { "type": "string", "description": "Field to sort by, e.g. name, severity, updated_at." },
                    "sort_order": { "type": "string", "enum": ["asc", "desc"] },
                    "page": { "type": "integer", "minimum": 1 },
                    "per_page": { "type": "integer", "minimum": 0 }
                },
                "additionalProperties": false
            }),
        },
        ToolDefinition {
            name: "get_rule",
            description: "Fetch one detection rule by rule_id or internal id.",
            input_schema: rule_selector_schema(json!({})),
        },
        ToolDefinition {
            name: "update_rule_status",
            description: "Enable or disable a detection rule.",
            input_schema: rule_selector_schema(json!({
                "enabled": { "type": "boolean", "default": true }
            })),
        },
        ToolDefinition {
            name: "delete_rule",
            description: "Delete a detection rule by rule_id or internal id.",
            input_schema: rule_selector_schema(json!({})),
        },
        ToolDefinition {
            name: "create_exception_list",
            description: "Create an exception list container.",
            input_schema: json!({
                "type": "object",
                "properties": {
                    "list_id": { "type": "string" },
                    "name": { "type": "string" },
                    "description": { "type": "string" },
                    "type": {
                        "type": "string",
                        "enum": [
                            "detection",
                            "rule_default",
                            "endpoint",
                            "endpoint_trusted_apps",
                            "endpoint_events",
                            "endpoint_host_isolation_exceptions",
                            "endpoint_blocklists"
                        ]
                    },
                    "namespace_type": { "type": "string", "enum": ["single", "agnostic"], "default": "single" },
                    "tags": { "type": "array", "items": { "type": "string" } },
                    "os_types": { "type": "array", "items": { "type": "string", "enum": ["linux", "macos", "windows"] } }
                },
                "required": ["list_id", "name", "description", "type"],
                "additionalProperties": false
            }),
        },
        ToolDefinition {
            name: "get_rule_exceptions",
            description: "List the exception items attached to a rule.",
            input_schema: json!({
                "type": "object",
                "properties": {
                    "rule_id": { "type": "string" }
                },
                "required": ["rule_id"],
                "additionalProperties": false
            }),
        },
        ToolDefinition {
            name: "associate_shared_exception_list",
            description: "Attach a shared exception list to a detection rule. Safe to call repeatedly: an existing association is left untouched.",
            input_schema: json!({
                "type": "object",
                "properties": {
                    "rule_id": { "type": "string", "description": "Human-facing rule_id of the rule." },
                    "exception_list_id": { "type": "string", "description": "Human-facing list_id of the exception list." },
                    "exception_list_type": { "type": "string", "default": "detection" },
                    "exception_list_namespace": { "type": "string", "enum": ["single", "agnostic"], "default": "single" }
                },
                "required": ["rule_id", "exception_list_id"],
                "additionalProperties": false
            }),
        },
        ToolDefinition {
            name: "add_rule_exception_items",
            description: "Add exception items to a rule's default exception list.",
            input_schema: json!({
                "type": "object",
                "properties": {
                    "rule_id": { "type": "string", "description": "UUID-shaped rule_id of the rule." },
                    "items": {
                        "type": "array",
                        "minItems": 1,
                        "items": {
                            "type": "object",
                            "properties": {
                                "name": { "type": "string" },
                                "description": { "type": "string" },
                                "type": { "type": "string", "enum": ["simple"] },
                                "entries": { "type": "array", "minItems": 1, "items": { "type": "object" } },
                                "tags": { "type": "array", "items": { "type": "string" } },
                                "item_id": { "type": "string" },
                                "os_types": { "type": "array", "items": { "type": "string" } },
                                "namespace_type": { "type": "string", "enum": ["single", "agnostic"] }
                            },
                            "required": ["name", "description", "entries"]
                        }
                    }
                },
                "required": ["rule_id", "items"],
                "additionalProperties": false
            }),
        },
        ToolDefinition {
            name: "get_prepackaged_rules_status",
            description: "Report how many Elastic prebuilt detection rules and timelines are installed, missing or outdated.",
            input_schema: json!({ "type": "object", "properties": {}, "additionalProperties": false }),
        },
        ToolDefinition {
            name: "install_prepackaged_rules",
            description: "Install missing and update outdated Elastic prebuilt detection rules and timelines.",
            input_schema: json!({ "type": "object", "properties": {}, "additionalProperties": false }),
        },
    ];
    definitions.extend(endpoint::definitions());
    definitions.extend(cases::definitions());
    definitions.extend(saved_objects::definitions());
    definitions
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::FakeGateway;
    use reqwest::Method;
    use std::collections::HashSet;
    use std::sync::Arc;

    #[test]
    fn every_registered_tool_is_dispatchable_and_unique() {
        let names: Vec<_> = tool_definitions().iter().map(|tool| tool.name).collect();
        let unique: HashSet<_> = names.iter().collect();
        assert_eq!(names.len(), 42);
        assert_eq!(unique.len(), names.len());
    }

    #[tokio::test]
    async fn every_tool_reports_not_ready_without_gateway() {
        for tool in tool_definitions() {
            let result = call_tool(tool.name, None, Map::new()).await;
            let ToolResult::Err { kind, .. } = result else {
                panic!("{} should fail without a gateway", tool.name);
            };
            assert_eq!(kind, FailureKind::NotReady, "{}", tool.name);
        }
    }

    #[tokio::test]
    async fn unknown_tool_is_invalid_arguments() {
        let gateway: SharedGateway = Arc::new(FakeGateway::new());
        let result = call_tool("drop_all_rules", Some(&gateway), Map::new()).await;
        let ToolResult::Err { kind, message, .. } = result else {
            panic!("expected error");
        };
        assert_eq!(kind, FailureKind::InvalidArguments);
        assert!(message.contains("unknown tool"));
    }

    #[test]
    fn selector_schema_merges_extra_properties() {
        let schema = rule_selector_schema(json!({ "enabled": { "type": "boolean" } }));
        let properties = schema["properties"].as_object().unwrap();
        assert!(properties.contains_key("rule_id"));
        assert!(properties.contains_key("enabled"));
    }

    #[tokio::test]
    async fn misspelled_argument_is_rejected_before_any_request() {
        let fake = Arc::new(FakeGateway::new());
        let gateway: SharedGateway = fake.clone();
        let mut args = Map::new();
        args.insert("rule_id".to_string(), json!("r-1"));
        args.insert("enable".to_string(), json!(false));

        let result = call_tool("update_rule_status", Some(&gateway), args).await;

        let ToolResult::Err { kind, message, details } = result else {
            panic!("expected error");
        };
        assert_eq!(kind, FailureKind::InvalidArguments);
        assert!(message.contains("unknown argument"));
        assert_eq!(details["field"], "enable");
        assert!(fake.calls().is_empty());
        assert_eq!(fake.calls_with_method(Method::PATCH), 0);
    }

    #[test]
    fn declared_arguments_pass_the_key_check() {
        let definition = REGISTRY
            .iter()
            .find(|tool| tool.name == "update_rule_status")
            .unwrap();
        let mut args = Map::new();
        args.insert("rule_id".to_string(), json!("r-1"));
        args.insert("enabled".to_string(), json!(false));
        assert!(reject_unknown_arguments(definition, &args).is_ok());

        let no_args = REGISTRY
            .iter()
            .find(|tool| tool.name == "install_prepackaged_rules")
            .unwrap();
        args.clear();
        args.insert("force".to_string(), json!(true));
        assert!(reject_unknown_arguments(no_args, &args).is_err());
    }
}
