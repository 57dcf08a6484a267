//! Resolve-then-write orchestration for rule associations.
//!
//! `associate` runs, in this fixed order:
//! 1. resolve the exception list,
//! 2. resolve the rule (the lookup response carries its `exceptions_list`),
//! 3. merge the list into the rule's collection,
//! 4. PATCH the whole collection back, unless the list was already present.
//!
//! A failed step stops the sequence. Nothing is retried or rolled back.
//! Two concurrent calls against the same rule can both read the same
//! snapshot and both write; the later PATCH wins and may drop the other
//! association, because the rules API offers no compare-and-swap here.

use secops_core::association::{MergeResult, merge};
use secops_core::exceptions::{
    AddRuleExceptionItemsRequest, ExceptionListAssociation, ListType, NamespaceType,
};
use secops_core::rules::RuleSelector;
use serde_json::{Value, json};

use crate::error::{ResourceKind, Step, ToolError};
use crate::gateway::{ApiRequest, BackendGateway};
use crate::resolver::{RULES_PATH, ResolvedRule, Resolver, ResourceRef};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AssociationRequest {
    pub rule_id: String,
    pub list_id: String,
    pub list_type: ListType,
    pub namespace_type: NamespaceType,
}

#[derive(Debug, Clone, PartialEq)]
pub enum AssociationOutcome {
    Associated {
        rule: ResourceRef,
        list: ResourceRef,
        updated_rule: Value,
    },
    /// Successful no-op: the rule already referenced the list.
    AlreadyAssociated { rule: ResourceRef, list: ResourceRef },
}

#[derive(Debug, Clone, PartialEq)]
pub struct ItemsAdded {
    pub rule: ResourceRef,
    pub created: Value,
}

pub struct AssociationEngine<'a> {
    gateway: &'a dyn BackendGateway,
}

impl<'a> AssociationEngine<'a> {
    pub fn new(gateway: &'a dyn BackendGateway) -> Self {
        Self { gateway }
    }

    pub async fn resolve_rule(&self, selector: &RuleSelector) -> Result<ResolvedRule, ToolError> {
        Resolver::new(self.gateway)
            .resolve_rule(selector)
            .await
            .map_err(|e| e.into_tool_error(ResourceKind::Rule, selector.value()))
    }

    pub async fn associate(
        &self,
        request: &AssociationRequest,
    ) -> Result<AssociationOutcome, ToolError> {
        let list = Resolver::new(self.gateway)
            .resolve_exception_list(&request.list_id, request.namespace_type)
            .await
            .map_err(|e| e.into_tool_error(ResourceKind::ExceptionList, &request.list_id))?;
        tracing::debug!(list_id = %list.human_id, internal_id = %list.internal_id, "resolved exception list");

        let rule = self
            .resolve_rule(&RuleSelector::RuleId(request.rule_id.clone()))
            .await?;
        tracing::debug!(rule_id = %rule.reference.human_id, internal_id = %rule.reference.internal_id, "resolved rule");

        let candidate = ExceptionListAssociation::new(
            list.internal_id.clone(),
            list.human_id.clone(),
            request.list_type.clone(),
            request.namespace_type,
        );
        let collection = match merge(&rule.exceptions_list, &candidate) {
            MergeResult::AlreadyPresent => {
                return Ok(AssociationOutcome::AlreadyAssociated {
                    rule: rule.reference,
                    list,
                });
            }
            MergeResult::ToApply(collection) => collection,
        };

        let response = self
            .gateway
            .patch(
                RULES_PATH,
                json!({
                    "id": rule.reference.internal_id,
                    "exceptions_list": collection
                }),
            )
            .await
            .map_err(|e| ToolError::transport(Step::WriteBack, e))?;
        if !response.is_success() {
            return Err(ToolError::backend(Step::WriteBack, &response));
        }

        Ok(AssociationOutcome::Associated {
            rule: rule.reference,
            list,
            updated_rule: response.body,
        })
    }

    /// Appends exception items to the rule's default list. Item ids are
    /// assigned by the backend, so there is no merge step.
    pub async fn add_exception_items(
        &self,
        request: AddRuleExceptionItemsRequest,
    ) -> Result<ItemsAdded, ToolError> {
        let rule = self
            .resolve_rule(&RuleSelector::RuleId(request.rule_id.clone()))
            .await?;

        let items: Vec<_> = request
            .items
            .into_iter()
            .map(|item| item.without_list_id())
            .collect();
        let path = format!("{RULES_PATH}/{}/exceptions", rule.reference.internal_id);
        let response = self
            .gateway
            .send(
                ApiRequest::new(reqwest::Method::POST, path)
                    .with_json(json!({ "items": items }))
                    .with_api_version(),
            )
            .await
            .map_err(|e| ToolError::transport(Step::WriteBack, e))?;
        if !response.is_success() {
            return Err(ToolError::backend(Step::WriteBack, &response));
        }

        Ok(ItemsAdded {
            rule: rule.reference,
            created: response.body,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gateway::API_VERSION_HEADER;
    use crate::testing::FakeGateway;
    use reqwest::Method;

    fn request() -> AssociationRequest {
        AssociationRequest {
            rule_id: "r-1".to_string(),
            list_id: "trusted-ips".to_string(),
            list_type: ListType::Detection,
            namespace_type: NamespaceType::Single,
        }
    }

    fn list_found() -> Value {
        json!({ "id": "L1", "list_id": "trusted-ips", "type": "detection" })
    }

    fn rule_with(exceptions: Value) -> Value {
        json!({ "id": "U1", "rule_id": "r-1", "name": "Rule", "exceptions_list": exceptions })
    }

    #[tokio::test]
    async fn associates_when_list_missing_and_writes_full_collection() {
        let existing = json!([{ "id": "L0", "list_id": "old", "type": "endpoint", "namespace_type": "agnostic" }]);
        let gateway = FakeGateway::new()
            .respond(200, list_found())
            .respond(200, rule_with(existing))
            .respond(200, json!({ "id": "U1", "updated": true }));

        let outcome = AssociationEngine::new(&gateway)
            .associate(&request())
            .await
            .unwrap();

        assert!(matches!(outcome, AssociationOutcome::Associated { .. }));
        let calls = gateway.calls();
        assert_eq!(calls.len(), 3);
        assert_eq!(calls[0].path, "/api/exception_lists");
        assert_eq!(calls[1].path, RULES_PATH);
        assert_eq!(calls[2].method, Method::PATCH);
        assert_eq!(
            calls[2].body,
            Some(json!({
                "id": "U1",
                "exceptions_list": [
                    { "id": "L0", "list_id": "old", "type": "endpoint", "namespace_type": "agnostic" },
                    { "id": "L1", "list_id": "trusted-ips", "type": "detection", "namespace_type": "single" }
                ]
            }))
        );
    }

    #[tokio::test]
    async fn existing_entries_of_unknown_type_are_written_back_unchanged() {
        let existing = json!({
            "id": "L0",
            "list_id": "devices",
            "type": "endpoint_trusted_devices",
            "namespace_type": "agnostic",
            "created_by": "elastic"
        });
        let gateway = FakeGateway::new()
            .respond(200, list_found())
            .respond(200, rule_with(json!([existing.clone()])))
            .respond(200, json!({ "id": "U1" }));

        AssociationEngine::new(&gateway)
            .associate(&request())
            .await
            .unwrap();

        let calls = gateway.calls();
        let written = &calls[2].body.as_ref().unwrap()["exceptions_list"];
        assert_eq!(written[0], existing);
        assert_eq!(written[1]["id"], "L1");
    }

    #[tokio::test]
    async fn already_associated_issues_no_write() {
        let gateway = FakeGateway::new().respond(200, list_found()).respond(
            200,
            rule_with(json!([{ "id": "L1", "list_id": "renamed", "type": "detection", "namespace_type": "single" }])),
        );

        let outcome = AssociationEngine::new(&gateway)
            .associate(&request())
            .await
            .unwrap();

        let AssociationOutcome::AlreadyAssociated { rule, list } = outcome else {
            panic!("expected AlreadyAssociated");
        };
        assert_eq!(rule.internal_id, "U1");
        assert_eq!(list.internal_id, "L1");
        assert_eq!(gateway.calls_with_method(Method::PATCH), 0);
    }

    #[tokio::test]
    async fn list_resolution_failure_stops_before_rule_lookup() {
        let gateway = FakeGateway::new().respond(404, json!({ "message": "not found" }));

        let err = AssociationEngine::new(&gateway)
            .associate(&request())
            .await
            .unwrap_err();

        assert!(matches!(
            err,
            ToolError::NotFound {
                resource: ResourceKind::ExceptionList,
                ..
            }
        ));
        assert_eq!(gateway.calls().len(), 1);
    }

    #[tokio::test]
    async fn rule_404_is_not_found_referencing_rule() {
        let gateway = FakeGateway::new()
            .respond(200, list_found())
            .respond(404, json!({ "message": "rule_id: \"r-1\" not found" }));

        let err = AssociationEngine::new(&gateway)
            .associate(&request())
            .await
            .unwrap_err();

        assert!(matches!(
            err,
            ToolError::NotFound {
                resource: ResourceKind::Rule,
                ..
            }
        ));
        assert!(err.to_string().contains("'r-1'"));
        assert_eq!(gateway.calls_with_method(Method::PATCH), 0);
    }

    #[tokio::test]
    async fn rule_without_id_is_malformed_and_not_written() {
        let gateway = FakeGateway::new()
            .respond(200, list_found())
            .respond(200, json!({ "rule_id": "r-1", "exceptions_list": [] }));

        let err = AssociationEngine::new(&gateway)
            .associate(&request())
            .await
            .unwrap_err();

        assert!(matches!(
            err,
            ToolError::MalformedResponse {
                step: Step::RuleResolution,
                ..
            }
        ));
        assert_eq!(gateway.calls_with_method(Method::PATCH), 0);
    }

    #[tokio::test]
    async fn write_back_failure_reports_status_and_body_then_retry_converges() {
        let gateway = FakeGateway::new()
            .respond(200, list_found())
            .respond(200, rule_with(json!([])))
            .respond(500, Value::String("internal error".to_string()))
            .respond(200, list_found())
            .respond(200, rule_with(json!([])))
            .respond(200, json!({ "id": "U1" }));
        let engine = AssociationEngine::new(&gateway);

        let err = engine.associate(&request()).await.unwrap_err();
        let ToolError::Backend { step, status, body } = err else {
            panic!("expected backend error");
        };
        assert_eq!(step, Step::WriteBack);
        assert_eq!(status, 500);
        assert_eq!(body, "internal error");

        let outcome = engine.associate(&request()).await.unwrap();
        assert!(matches!(outcome, AssociationOutcome::Associated { .. }));
        assert_eq!(gateway.calls_with_method(Method::PATCH), 2);
    }

    #[tokio::test]
    async fn exception_items_are_posted_by_internal_id() {
        let gateway = FakeGateway::new()
            .respond(200, rule_with(json!([])))
            .respond(200, json!([{ "id": "item-1" }]));
        let request = AddRuleExceptionItemsRequest::parse(
            "0f3a6b7e-2c1d-4e5f-8a9b-0c1d2e3f4a5b",
            vec![json!({
                "name": "Allow scanner",
                "description": "scanner",
                "list_id": "ignored",
                "entries": [{ "type": "match", "field": "source.ip", "value": "10.0.0.5" }]
            })],
        )
        .unwrap();

        let added = AssociationEngine::new(&gateway)
            .add_exception_items(request)
            .await
            .unwrap();

        assert_eq!(added.rule.internal_id, "U1");
        let calls = gateway.calls();
        assert_eq!(calls[1].path, "/api/detection_engine/rules/U1/exceptions");
        assert!(
            calls[1]
                .headers
                .iter()
                .any(|(name, _)| name == API_VERSION_HEADER)
        );
        let body = calls[1].body.as_ref().unwrap();
        assert!(body["items"][0].get("list_id").is_none());
    }
}
