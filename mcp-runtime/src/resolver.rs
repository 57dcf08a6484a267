use secops_core::exceptions::{ExceptionListAssociation, NamespaceType};
use secops_core::rules::RuleSelector;
use serde_json::{Map, Value};
use thiserror::Error;

use crate::error::{ResourceKind, ToolError};
use crate::gateway::{ApiResponse, BackendGateway, GatewayError};

pub const RULES_PATH: &str = "/api/detection_engine/rules";
pub const EXCEPTION_LISTS_PATH: &str = "/api/exception_lists";

/// A human-facing identifier paired with the backend's internal id.
/// `internal_id` is never empty.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResourceRef {
    pub human_id: String,
    pub internal_id: String,
}

/// A resolved rule together with the parts of the lookup response later
/// steps need, so they do not have to fetch the rule again.
#[derive(Debug, Clone)]
pub struct ResolvedRule {
    pub reference: ResourceRef,
    pub exceptions_list: Vec<ExceptionListAssociation>,
    pub snapshot: Value,
}

#[derive(Debug, Error)]
pub enum ResolutionError {
    #[error("no match")]
    NotFound,
    #[error("{0}")]
    MalformedResponse(String),
    #[error("HTTP {status}: {body}")]
    Backend { status: u16, body: String },
    #[error(transparent)]
    Gateway(#[from] GatewayError),
}

impl ResolutionError {
    pub fn into_tool_error(self, resource: ResourceKind, identifier: &str) -> ToolError {
        let step = resource.resolution_step();
        match self {
            ResolutionError::NotFound => ToolError::NotFound {
                resource,
                identifier: format!("'{identifier}'"),
            },
            ResolutionError::MalformedResponse(message) => ToolError::MalformedResponse {
                step,
                message: format!("{resource} '{identifier}': {message}"),
            },
            ResolutionError::Backend { status, body } => ToolError::Backend { step, status, body },
            ResolutionError::Gateway(source) => ToolError::transport(step, source),
        }
    }
}

/// Translates human-facing identifiers into internal ids. Every call performs
/// exactly one lookup; nothing is cached between calls.
pub struct Resolver<'a> {
    gateway: &'a dyn BackendGateway,
}

impl<'a> Resolver<'a> {
    pub fn new(gateway: &'a dyn BackendGateway) -> Self {
        Self { gateway }
    }

    pub async fn resolve_rule(
        &self,
        selector: &RuleSelector,
    ) -> Result<ResolvedRule, ResolutionError> {
        let response = self.gateway.get(RULES_PATH, selector.query()).await?;
        let body = lookup_object(response)?;
        let internal_id = internal_id(&body)?;

        let human_id = match selector {
            RuleSelector::RuleId(rule_id) => rule_id.clone(),
            RuleSelector::Id(_) => body
                .get("rule_id")
                .and_then(Value::as_str)
                .unwrap_or(selector.value())
                .to_string(),
        };
        let exceptions_list = match body.get("exceptions_list") {
            None | Some(Value::Null) => Vec::new(),
            Some(raw) => serde_json::from_value(raw.clone()).map_err(|e| {
                ResolutionError::MalformedResponse(format!(
                    "rule has an unreadable 'exceptions_list': {e}"
                ))
            })?,
        };

        Ok(ResolvedRule {
            reference: ResourceRef {
                human_id,
                internal_id,
            },
            exceptions_list,
            snapshot: Value::Object(body),
        })
    }

    pub async fn resolve_exception_list(
        &self,
        list_id: &str,
        namespace_type: NamespaceType,
    ) -> Result<ResourceRef, ResolutionError> {
        let query = vec![
            ("list_id".to_string(), list_id.to_string()),
            (
                "namespace_type".to_string(),
                namespace_type.as_str().to_string(),
            ),
        ];
        let response = self.gateway.get(EXCEPTION_LISTS_PATH, query).await?;
        let body = lookup_object(response)?;
        Ok(ResourceRef {
            human_id: list_id.to_string(),
            internal_id: internal_id(&body)?,
        })
    }
}

fn lookup_object(response: ApiResponse) -> Result<Map<String, Value>, ResolutionError> {
    if response.is_not_found() {
        return Err(ResolutionError::NotFound);
    }
    if !response.is_success() {
        return Err(ResolutionError::Backend {
            status: response.status,
            body: response.body_text(),
        });
    }
    match response.body {
        Value::Null => Err(ResolutionError::NotFound),
        Value::Object(map) if map.is_empty() => Err(ResolutionError::NotFound),
        Value::Object(map) => Ok(map),
        other => Err(ResolutionError::MalformedResponse(format!(
            "expected a JSON object, got {other}"
        ))),
    }
}

fn internal_id(body: &Map<String, Value>) -> Result<String, ResolutionError> {
    match body.get("id").and_then(Value::as_str).map(str::trim) {
        Some(id) if !id.is_empty() => Ok(id.to_string()),
        _ => Err(ResolutionError::MalformedResponse(
            "response is missing the internal 'id'".to_string(),
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::FakeGateway;
    use reqwest::Method;
    use serde_json::json;

    #[tokio::test]
    async fn rule_lookup_extracts_internal_id_and_associations() {
        let gateway = FakeGateway::new().respond(
            200,
            json!({
                "id": "8f1c",
                "rule_id": "r-1",
                "exceptions_list": [
                    { "id": "L1", "list_id": "trusted", "type": "detection", "namespace_type": "single" }
                ]
            }),
        );

        let resolved = Resolver::new(&gateway)
            .resolve_rule(&RuleSelector::RuleId("r-1".to_string()))
            .await
            .unwrap();

        assert_eq!(resolved.reference.internal_id, "8f1c");
        assert_eq!(resolved.exceptions_list.len(), 1);
        let calls = gateway.calls();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].method, Method::GET);
        assert_eq!(calls[0].path, RULES_PATH);
        assert_eq!(
            calls[0].query,
            vec![("rule_id".to_string(), "r-1".to_string())]
        );
    }

    #[tokio::test]
    async fn rule_lookup_by_internal_id_reports_human_rule_id() {
        let gateway = FakeGateway::new().respond(200, json!({ "id": "8f1c", "rule_id": "r-1" }));
        let resolved = Resolver::new(&gateway)
            .resolve_rule(&RuleSelector::Id("8f1c".to_string()))
            .await
            .unwrap();
        assert_eq!(resolved.reference.human_id, "r-1");
        assert!(resolved.exceptions_list.is_empty());
    }

    #[tokio::test]
    async fn http_404_is_not_found() {
        let gateway = FakeGateway::new().respond(404, json!({ "message": "rule not found" }));
        let err = Resolver::new(&gateway)
            .resolve_exception_list("missing", NamespaceType::Single)
            .await
            .unwrap_err();
        assert!(matches!(err, ResolutionError::NotFound));
    }

    #[tokio::test]
    async fn empty_body_is_not_found() {
        let gateway = FakeGateway::new().respond(200, Value::Null);
        let err = Resolver::new(&gateway)
            .resolve_exception_list("missing", NamespaceType::Agnostic)
            .await
            .unwrap_err();
        assert!(matches!(err, ResolutionError::NotFound));
        assert_eq!(
            gateway.calls()[0].query[1],
            ("namespace_type".to_string(), "agnostic".to_string())
        );
    }

    #[tokio::test]
    async fn missing_id_is_malformed() {
        let gateway = FakeGateway::new().respond(200, json!({ "rule_id": "r-1", "name": "x" }));
        let err = Resolver::new(&gateway)
            .resolve_rule(&RuleSelector::RuleId("r-1".to_string()))
            .await
            .unwrap_err();
        assert!(matches!(err, ResolutionError::MalformedResponse(_)));
    }

    #[tokio::test]
    async fn blank_id_is_malformed() {
        let gateway = FakeGateway::new().respond(200, json!({ "id": "  " }));
        let err = Resolver::new(&gateway)
            .resolve_exception_list("trusted", NamespaceType::Single)
            .await
            .unwrap_err();
        assert!(matches!(err, ResolutionError::MalformedResponse(_)));
    }

    #[tokio::test]
    async fn unreadable_exceptions_list_is_malformed() {
        let gateway = FakeGateway::new().respond(
            200,
            json!({ "id": "8f1c", "exceptions_list": [{ "id": "L1" }] }),
        );
        let err = Resolver::new(&gateway)
            .resolve_rule(&RuleSelector::RuleId("r-1".to_string()))
            .await
            .unwrap_err();
        assert!(matches!(err, ResolutionError::MalformedResponse(_)));
    }

    #[tokio::test]
    async fn other_statuses_are_backend_errors() {
        let gateway = FakeGateway::new().respond(403, json!({ "message": "forbidden" }));
        let err = Resolver::new(&gateway)
            .resolve_rule(&RuleSelector::RuleId("r-1".to_string()))
            .await
            .unwrap_err();
        let ResolutionError::Backend { status, body } = err else {
            panic!("expected backend error");
        };
        assert_eq!(status, 403);
        assert!(body.contains("forbidden"));
    }

    #[tokio::test]
    async fn transport_failure_maps_to_rule_resolution_step() {
        let gateway = FakeGateway::new().fail_transport();
        let err = Resolver::new(&gateway)
            .resolve_rule(&RuleSelector::RuleId("r-1".to_string()))
            .await
            .unwrap_err()
            .into_tool_error(ResourceKind::Rule, "r-1");
        assert!(matches!(
            err,
            ToolError::Transport {
                step: crate::error::Step::RuleResolution,
                ..
            }
        ));
    }
}
