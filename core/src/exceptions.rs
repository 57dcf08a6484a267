use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;
use uuid::Uuid;

use crate::error::ParseEnumError;

/// Kind of exception list container, as the backend names it.
///
/// Types this crate does not know are kept as `Other` when read from the
/// backend; they are never accepted as tool input.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ListType {
    Detection,
    RuleDefault,
    Endpoint,
    EndpointTrustedApps,
    EndpointEvents,
    EndpointHostIsolationExceptions,
    EndpointBlocklists,
    #[serde(untagged)]
    Other(String),
}

impl ListType {
    const ALL: &'static [&'static str] = &[
        "detection",
        "rule_default",
        "endpoint",
        "endpoint_trusted_apps",
        "endpoint_events",
        "endpoint_host_isolation_exceptions",
        "endpoint_blocklists",
    ];

    pub fn as_str(&self) -> &str {
        match self {
            ListType::Detection => "detection",
            ListType::RuleDefault => "rule_default",
            ListType::Endpoint => "endpoint",
            ListType::EndpointTrustedApps => "endpoint_trusted_apps",
            ListType::EndpointEvents => "endpoint_events",
            ListType::EndpointHostIsolationExceptions => "endpoint_host_isolation_exceptions",
            ListType::EndpointBlocklists => "endpoint_blocklists",
            ListType::Other(raw) => raw,
        }
    }
}

impl FromStr for ListType {
    type Err = ParseEnumError;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        match raw.trim().to_lowercase().as_str() {
            "detection" => Ok(ListType::Detection),
            "rule_default" => Ok(ListType::RuleDefault),
            "endpoint" => Ok(ListType::Endpoint),
            "endpoint_trusted_apps" => Ok(ListType::EndpointTrustedApps),
            "endpoint_events" => Ok(ListType::EndpointEvents),
            "endpoint_host_isolation_exceptions" => Ok(ListType::EndpointHostIsolationExceptions),
            "endpoint_blocklists" => Ok(ListType::EndpointBlocklists),
            _ => Err(ParseEnumError::new("list type", raw, Self::ALL)),
        }
    }
}

impl fmt::Display for ListType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Visibility scope of an exception list: the current space only, or all spaces.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NamespaceType {
    #[default]
    Single,
    Agnostic,
}

impl NamespaceType {
    pub fn as_str(self) -> &'static str {
        match self {
            NamespaceType::Single => "single",
            NamespaceType::Agnostic => "agnostic",
        }
    }
}

impl FromStr for NamespaceType {
    type Err = ParseEnumError;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        match raw.trim().to_lowercase().as_str() {
            "single" => Ok(NamespaceType::Single),
            "agnostic" => Ok(NamespaceType::Agnostic),
            _ => Err(ParseEnumError::new(
                "namespace type",
                raw,
                &["single", "agnostic"],
            )),
        }
    }
}

impl fmt::Display for NamespaceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One element of a rule's `exceptions_list` field.
///
/// Two associations refer to the same list when their `internal_id` matches;
/// the remaining fields are display metadata and may legitimately differ.
/// Fields the backend adds beyond these are carried in `extra` and written
/// back unchanged.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExceptionListAssociation {
    #[serde(rename = "id")]
    pub internal_id: String,
    #[serde(rename = "list_id")]
    pub human_id: String,
    #[serde(rename = "type")]
    pub list_type: ListType,
    pub namespace_type: NamespaceType,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl ExceptionListAssociation {
    pub fn new(
        internal_id: impl Into<String>,
        human_id: impl Into<String>,
        list_type: ListType,
        namespace_type: NamespaceType,
    ) -> Self {
        Self {
            internal_id: internal_id.into(),
            human_id: human_id.into(),
            list_type,
            namespace_type,
            extra: Map::new(),
        }
    }

    pub fn refers_to_same_list(&self, other: &ExceptionListAssociation) -> bool {
        self.internal_id == other.internal_id
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntryOperator {
    #[default]
    Included,
    Excluded,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OsType {
    Windows,
    Linux,
    Macos,
}

impl FromStr for OsType {
    type Err = ParseEnumError;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        match raw.trim().to_lowercase().as_str() {
            "windows" => Ok(OsType::Windows),
            "linux" => Ok(OsType::Linux),
            "macos" => Ok(OsType::Macos),
            _ => Err(ParseEnumError::new(
                "os type",
                raw,
                &["windows", "linux", "macos"],
            )),
        }
    }
}

/// A single condition of an exception item, tagged by `type`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum EntryVariant {
    Exists {
        field: String,
        #[serde(default)]
        operator: EntryOperator,
    },
    Match {
        field: String,
        #[serde(default)]
        operator: EntryOperator,
        value: String,
    },
    MatchAny {
        field: String,
        #[serde(default)]
        operator: EntryOperator,
        value: Vec<String>,
    },
}

impl EntryVariant {
    pub fn field(&self) -> &str {
        match self {
            EntryVariant::Exists { field, .. }
            | EntryVariant::Match { field, .. }
            | EntryVariant::MatchAny { field, .. } => field,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ItemType {
    #[default]
    Simple,
}

/// An exception item as accepted by the rule exceptions endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExceptionItem {
    pub name: String,
    #[serde(rename = "type", default)]
    pub item_type: ItemType,
    pub entries: Vec<EntryVariant>,
    pub description: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tags: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub item_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub list_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub os_types: Option<Vec<OsType>>,
    #[serde(
        default = "default_item_namespace",
        skip_serializing_if = "Option::is_none"
    )]
    pub namespace_type: Option<NamespaceType>,
}

fn default_item_namespace() -> Option<NamespaceType> {
    Some(NamespaceType::Single)
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ItemValidationError {
    #[error("items[{index}] has an invalid shape: {message}")]
    Shape { index: usize, message: String },
    #[error("items[{index}].{field} must not be empty")]
    Empty { index: usize, field: String },
    #[error("at least one exception item is required")]
    NoItems,
    #[error("rule_id '{0}' is not a valid UUID")]
    InvalidRuleId(String),
}

impl ItemValidationError {
    /// Argument path the error points at, for structured error payloads.
    pub fn field(&self) -> String {
        match self {
            ItemValidationError::Shape { index, .. } => format!("items[{index}]"),
            ItemValidationError::Empty { index, field } => format!("items[{index}].{field}"),
            ItemValidationError::NoItems => "items".to_string(),
            ItemValidationError::InvalidRuleId(_) => "rule_id".to_string(),
        }
    }
}

impl ExceptionItem {
    pub fn from_value(index: usize, value: Value) -> Result<Self, ItemValidationError> {
        let item: ExceptionItem =
            serde_json::from_value(value).map_err(|e| ItemValidationError::Shape {
                index,
                message: e.to_string(),
            })?;
        item.validate(index)?;
        Ok(item)
    }

    pub fn validate(&self, index: usize) -> Result<(), ItemValidationError> {
        let empty = |field: String| ItemValidationError::Empty { index, field };
        if self.name.trim().is_empty() {
            return Err(empty("name".to_string()));
        }
        if self.entries.is_empty() {
            return Err(empty("entries".to_string()));
        }
        for (entry_index, entry) in self.entries.iter().enumerate() {
            if entry.field().trim().is_empty() {
                return Err(empty(format!("entries[{entry_index}].field")));
            }
            match entry {
                EntryVariant::Match { value, .. } if value.trim().is_empty() => {
                    return Err(empty(format!("entries[{entry_index}].value")));
                }
                EntryVariant::MatchAny { value, .. }
                    if value.iter().all(|v| v.trim().is_empty()) =>
                {
                    return Err(empty(format!("entries[{entry_index}].value")));
                }
                _ => {}
            }
        }
        Ok(())
    }

    /// The rule exceptions endpoint infers the list from the rule; sending a
    /// `list_id` makes it reject the item.
    pub fn without_list_id(mut self) -> Self {
        self.list_id = None;
        self
    }
}

/// Validated input for appending exception items to a rule.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AddRuleExceptionItemsRequest {
    pub rule_id: String,
    pub items: Vec<ExceptionItem>,
}

impl AddRuleExceptionItemsRequest {
    pub fn parse(rule_id: &str, items: Vec<Value>) -> Result<Self, ItemValidationError> {
        let rule_id = rule_id.trim();
        if Uuid::parse_str(rule_id).is_err() {
            return Err(ItemValidationError::InvalidRuleId(rule_id.to_string()));
        }
        if items.is_empty() {
            return Err(ItemValidationError::NoItems);
        }
        let items = items
            .into_iter()
            .enumerate()
            .map(|(index, value)| ExceptionItem::from_value(index, value))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self {
            rule_id: rule_id.to_string(),
            items,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    const RULE_UUID: &str = "0f3a6b7e-2c1d-4e5f-8a9b-0c1d2e3f4a5b";

    #[test]
    fn association_serializes_with_backend_field_names() {
        let association = ExceptionListAssociation::new(
            "abc",
            "trusted-ips",
            ListType::Detection,
            NamespaceType::Agnostic,
        );
        assert_eq!(
            serde_json::to_value(&association).unwrap(),
            json!({
                "id": "abc",
                "list_id": "trusted-ips",
                "type": "detection",
                "namespace_type": "agnostic"
            })
        );
    }

    #[test]
    fn same_list_is_decided_by_internal_id_only() {
        let a = ExceptionListAssociation::new("L1", "one", ListType::Detection, NamespaceType::Single);
        let b = ExceptionListAssociation {
            human_id: "renamed".to_string(),
            list_type: ListType::Endpoint,
            namespace_type: NamespaceType::Agnostic,
            ..a.clone()
        };
        assert!(a.refers_to_same_list(&b));
        assert_ne!(a, b);
    }

    #[test]
    fn unknown_list_types_and_extra_fields_survive_a_round_trip() {
        let raw = json!({
            "id": "L9",
            "list_id": "trusted-devices",
            "type": "endpoint_trusted_devices",
            "namespace_type": "agnostic",
            "created_by": "elastic"
        });
        let association: ExceptionListAssociation = serde_json::from_value(raw.clone()).unwrap();
        assert_eq!(
            association.list_type,
            ListType::Other("endpoint_trusted_devices".to_string())
        );
        assert_eq!(association.extra["created_by"], "elastic");
        assert_eq!(serde_json::to_value(&association).unwrap(), raw);
    }

    #[test]
    fn list_type_parse_rejects_unknown_values() {
        assert_eq!("Endpoint".parse::<ListType>().unwrap(), ListType::Endpoint);
        let err = "shared".parse::<ListType>().unwrap_err();
        assert!(err.to_string().contains("detection"));
    }

    #[test]
    fn entry_variants_decode_by_type_tag() {
        let item = ExceptionItem::from_value(
            0,
            json!({
                "name": "Allow scanner",
                "description": "Internal vulnerability scanner",
                "entries": [
                    { "type": "match", "field": "source.ip", "value": "10.0.0.5" },
                    { "type": "match_any", "field": "host.name", "operator": "excluded", "value": ["a", "b"] },
                    { "type": "exists", "field": "process.parent.name" }
                ]
            }),
        )
        .unwrap();

        assert_eq!(item.item_type, ItemType::Simple);
        assert_eq!(item.namespace_type, Some(NamespaceType::Single));
        assert!(matches!(
            &item.entries[1],
            EntryVariant::MatchAny { operator: EntryOperator::Excluded, value, .. } if value.len() == 2
        ));
        assert!(matches!(
            &item.entries[2],
            EntryVariant::Exists { operator: EntryOperator::Included, .. }
        ));
    }

    #[test]
    fn item_with_wrong_value_type_is_a_shape_error() {
        let err = ExceptionItem::from_value(
            3,
            json!({
                "name": "x",
                "description": "y",
                "entries": [{ "type": "match", "field": "f", "value": ["not", "a", "string"] }]
            }),
        )
        .unwrap_err();
        assert!(matches!(err, ItemValidationError::Shape { index: 3, .. }));
        assert_eq!(err.field(), "items[3]");
    }

    #[test]
    fn item_without_entries_is_rejected() {
        let err = ExceptionItem::from_value(
            0,
            json!({ "name": "x", "description": "y", "entries": [] }),
        )
        .unwrap_err();
        assert_eq!(
            err,
            ItemValidationError::Empty {
                index: 0,
                field: "entries".to_string()
            }
        );
    }

    #[test]
    fn whitespace_only_match_value_is_empty() {
        for entry in [
            json!({ "type": "match", "field": "source.ip", "value": "   " }),
            json!({ "type": "match_any", "field": "host.name", "value": [" ", ""] }),
        ] {
            let err = ExceptionItem::from_value(
                0,
                json!({ "name": "x", "description": "y", "entries": [entry] }),
            )
            .unwrap_err();
            assert_eq!(err.field(), "items[0].entries[0].value");
        }
    }

    #[test]
    fn request_requires_uuid_rule_id() {
        let err = AddRuleExceptionItemsRequest::parse("not-a-uuid", vec![json!({})]).unwrap_err();
        assert_eq!(err, ItemValidationError::InvalidRuleId("not-a-uuid".to_string()));
    }

    #[test]
    fn request_requires_at_least_one_item() {
        let err = AddRuleExceptionItemsRequest::parse(RULE_UUID, Vec::new()).unwrap_err();
        assert_eq!(err, ItemValidationError::NoItems);
    }

    #[test]
    fn list_id_is_stripped_before_sending() {
        let request = AddRuleExceptionItemsRequest::parse(
            RULE_UUID,
            vec![json!({
                "name": "x",
                "description": "y",
                "list_id": "should-go",
                "entries": [{ "type": "exists", "field": "user.name" }]
            })],
        )
        .unwrap();
        let item = request.items[0].clone().without_list_id();
        let body = serde_json::to_value(&item).unwrap();
        assert!(body.get("list_id").is_none());
        assert_eq!(body["type"], "simple");
    }
}
