use reqwest::Method;
use secops_core::exceptions::{
    AddRuleExceptionItemsRequest, ListType, NamespaceType, OsType,
};
use secops_core::rules::RuleSelector;
use serde_json::{Map, Value, json};

use super::args::{
    arg_optional_string_array, arg_string, parse_enum, required_object_array, required_string,
};
use super::{expect_success, to_pretty_json};
use crate::engine::{AssociationEngine, AssociationOutcome, AssociationRequest};
use crate::error::{ResourceKind, Step, ToolError};
use crate::gateway::ApiRequest;
use crate::harness::SharedGateway;
use crate::resolver::{EXCEPTION_LISTS_PATH, RULES_PATH};

pub(crate) async fn create_exception_list(
    gateway: SharedGateway,
    args: Map<String, Value>,
) -> Result<String, ToolError> {
    let list_id = required_string(&args, "list_id")?;
    let name = required_string(&args, "name")?;
    let description = required_string(&args, "description")?;
    let list_type: ListType = parse_enum(&required_string(&args, "type")?, "type")?;
    let namespace_type: NamespaceType =
        parse_enum(&arg_string(&args, "namespace_type", "single")?, "namespace_type")?;

    let mut body = json!({
        "list_id": list_id,
        "name": name,
        "description": description,
        "type": list_type,
        "namespace_type": namespace_type
    });
    if let Some(tags) = arg_optional_string_array(&args, "tags")? {
        body["tags"] = json!(tags);
    }
    if let Some(raw) = arg_optional_string_array(&args, "os_types")? {
        let os_types = raw
            .iter()
            .map(|os| parse_enum::<OsType>(os, "os_types"))
            .collect::<Result<Vec<_>, _>>()?;
        body["os_types"] = json!(os_types);
    }

    let response = gateway
        .send(
            ApiRequest::new(Method::POST, EXCEPTION_LISTS_PATH)
                .with_json(body)
                .with_api_version(),
        )
        .await
        .map_err(|e| ToolError::transport(Step::Request, e))?;
    Ok(to_pretty_json(&expect_success(response)?))
}

pub(crate) async fn get_rule_exceptions(
    gateway: SharedGateway,
    args: Map<String, Value>,
) -> Result<String, ToolError> {
    let rule_id = required_string(&args, "rule_id")?;
    let rule = AssociationEngine::new(&*gateway)
        .resolve_rule(&RuleSelector::RuleId(rule_id.clone()))
        .await?;

    let path = format!("{RULES_PATH}/{}/exceptions", rule.reference.internal_id);
    let response = gateway
        .get(&path, Vec::new())
        .await
        .map_err(|e| ToolError::transport(Step::Request, e))?;
    if response.is_not_found() {
        return Err(ToolError::NotFound {
            resource: ResourceKind::Rule,
            identifier: format!("'{rule_id}'"),
        });
    }
    Ok(to_pretty_json(&expect_success(response)?))
}

pub(crate) async fn associate_shared_exception_list(
    gateway: SharedGateway,
    args: Map<String, Value>,
) -> Result<String, ToolError> {
    let request = AssociationRequest {
        rule_id: required_string(&args, "rule_id")?,
        list_id: required_string(&args, "exception_list_id")?,
        list_type: parse_enum(
            &arg_string(&args, "exception_list_type", "detection")?,
            "exception_list_type",
        )?,
        namespace_type: parse_enum(
            &arg_string(&args, "exception_list_namespace", "single")?,
            "exception_list_namespace",
        )?,
    };

    match AssociationEngine::new(&*gateway)
        .associate(&request)
        .await?
    {
        AssociationOutcome::Associated {
            rule,
            list,
            updated_rule,
        } => Ok(format!(
            "Associated exception list '{}' (id {}) with rule '{}' (id {}).\n{}",
            list.human_id,
            list.internal_id,
            rule.human_id,
            rule.internal_id,
            to_pretty_json(&updated_rule)
        )),
        AssociationOutcome::AlreadyAssociated { rule, list } => Ok(format!(
            "Exception list '{}' is already associated with rule '{}' (no update needed).",
            list.human_id, rule.human_id
        )),
    }
}

pub(crate) async fn add_rule_exception_items(
    gateway: SharedGateway,
    args: Map<String, Value>,
) -> Result<String, ToolError> {
    let rule_id = required_string(&args, "rule_id")?;
    let items = required_object_array(&args, "items")?;
    let request = AddRuleExceptionItemsRequest::parse(&rule_id, items)
        .map_err(|e| ToolError::invalid(e.field(), e.to_string()))?;
    let count = request.items.len();

    let added = AssociationEngine::new(&*gateway)
        .add_exception_items(request)
        .await?;
    Ok(format!(
        "Added {count} exception item(s) to rule '{}' (id {}).\n{}",
        added.rule.human_id,
        added.rule.internal_id,
        to_pretty_json(&added.created)
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gateway::API_VERSION_HEADER;
    use crate::testing::FakeGateway;
    use std::sync::Arc;

    const RULE_UUID: &str = "0f3a6b7e-2c1d-4e5f-8a9b-0c1d2e3f4a5b";

    fn args(value: Value) -> Map<String, Value> {
        match value {
            Value::Object(map) => map,
            _ => Map::new(),
        }
    }

    #[tokio::test]
    async fn create_list_sends_api_version_and_validated_enums() {
        let gateway = Arc::new(FakeGateway::new().respond(200, json!({ "id": "L1" })));
        create_exception_list(
            gateway.clone(),
            args(json!({
                "list_id": "trusted-ips",
                "name": "Trusted IPs",
                "description": "scanners",
                "type": "detection",
                "os_types": ["Linux"]
            })),
        )
        .await
        .unwrap();

        let calls = gateway.calls();
        let call = &calls[0];
        assert!(call.headers.iter().any(|(name, _)| name == API_VERSION_HEADER));
        let body = call.body.as_ref().unwrap();
        assert_eq!(body["namespace_type"], "single");
        assert_eq!(body["os_types"], json!(["linux"]));
        assert!(body.get("tags").is_none());
    }

    #[tokio::test]
    async fn create_list_conflict_is_backend_error_with_hint() {
        let gateway = Arc::new(FakeGateway::new().respond(
            409,
            json!({ "message": "exception list id: \"trusted-ips\" already exists" }),
        ));
        let err = create_exception_list(
            gateway,
            args(json!({
                "list_id": "trusted-ips",
                "name": "Trusted IPs",
                "description": "scanners",
                "type": "detection"
            })),
        )
        .await
        .unwrap_err();
        let payload = err.to_value();
        assert_eq!(payload["details"]["status"], 409);
        assert!(payload["docs_hint"].as_str().is_some());
    }

    #[tokio::test]
    async fn create_list_rejects_unknown_type() {
        let gateway = Arc::new(FakeGateway::new());
        let err = create_exception_list(
            gateway.clone(),
            args(json!({
                "list_id": "x",
                "name": "x",
                "description": "x",
                "type": "firewall"
            })),
        )
        .await
        .unwrap_err();
        assert!(matches!(err, ToolError::InvalidArguments { .. }));
        assert!(gateway.calls().is_empty());
    }

    #[tokio::test]
    async fn rule_exceptions_are_fetched_by_internal_id() {
        let gateway = Arc::new(
            FakeGateway::new()
                .respond(200, json!({ "id": "U1", "rule_id": "r-1" }))
                .respond(200, json!({ "data": [] })),
        );
        get_rule_exceptions(gateway.clone(), args(json!({ "rule_id": "r-1" })))
            .await
            .unwrap();
        assert_eq!(
            gateway.calls()[1].path,
            "/api/detection_engine/rules/U1/exceptions"
        );
    }

    #[tokio::test]
    async fn associate_reports_no_op_distinctly() {
        let gateway = Arc::new(
            FakeGateway::new()
                .respond(200, json!({ "id": "L1", "list_id": "trusted-ips" }))
                .respond(
                    200,
                    json!({
                        "id": "U1",
                        "rule_id": "r-1",
                        "exceptions_list": [
                            { "id": "L1", "list_id": "trusted-ips", "type": "detection", "namespace_type": "single" }
                        ]
                    }),
                ),
        );
        let text = associate_shared_exception_list(
            gateway.clone(),
            args(json!({ "rule_id": "r-1", "exception_list_id": "trusted-ips" })),
        )
        .await
        .unwrap();
        assert!(text.contains("already associated"));
        assert_eq!(gateway.calls().len(), 2);
    }

    #[tokio::test]
    async fn associate_rejects_bad_namespace_before_any_lookup() {
        let gateway = Arc::new(FakeGateway::new());
        let err = associate_shared_exception_list(
            gateway.clone(),
            args(json!({
                "rule_id": "r-1",
                "exception_list_id": "trusted-ips",
                "exception_list_namespace": "global"
            })),
        )
        .await
        .unwrap_err();
        assert_eq!(err.to_value()["field"], "exception_list_namespace");
        assert!(gateway.calls().is_empty());
    }

    #[tokio::test]
    async fn items_with_blank_match_value_are_rejected_locally() {
        let gateway = Arc::new(FakeGateway::new());
        let err = add_rule_exception_items(
            gateway.clone(),
            args(json!({
                "rule_id": RULE_UUID,
                "items": [{
                    "name": "Allow scanner",
                    "description": "scanner",
                    "entries": [{ "type": "match", "field": "source.ip", "value": "" }]
                }]
            })),
        )
        .await
        .unwrap_err();
        assert_eq!(err.to_value()["field"], "items[0].entries[0].value");
        assert!(gateway.calls().is_empty());
    }

    #[tokio::test]
    async fn non_uuid_rule_id_is_rejected() {
        let gateway = Arc::new(FakeGateway::new());
        let err = add_rule_exception_items(
            gateway,
            args(json!({ "rule_id": "r-1", "items": [] })),
        )
        .await
        .unwrap_err();
        assert_eq!(err.to_value()["field"], "rule_id");
    }
}
