use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use thiserror::Error;

/// Objects returned per find page when the caller does not say.
pub const DEFAULT_FIND_PER_PAGE: u64 = 10;
/// Most objects a find result carries back to the client.
pub const MAX_FIND_RESULTS: usize = 100;

/// `{type, id}` pair addressing one saved object.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SavedObjectRef {
    #[serde(rename = "type")]
    pub object_type: String,
    pub id: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ObjectRefError {
    #[error("at least one object is required")]
    Empty,
    #[error("objects[{0}] must be an object with non-empty 'type' and 'id' strings")]
    Invalid(usize),
}

impl ObjectRefError {
    pub fn field(&self) -> String {
        match self {
            ObjectRefError::Empty => "objects".to_string(),
            ObjectRefError::Invalid(index) => format!("objects[{index}]"),
        }
    }
}

/// Validates a list of object references. Extra keys such as `fields` on
/// an entry are dropped.
pub fn parse_object_refs(values: &[Value]) -> Result<Vec<SavedObjectRef>, ObjectRefError> {
    if values.is_empty() {
        return Err(ObjectRefError::Empty);
    }
    values
        .iter()
        .enumerate()
        .map(|(index, value)| {
            serde_json::from_value::<SavedObjectRef>(value.clone())
                .ok()
                .filter(|reference| {
                    !reference.object_type.trim().is_empty() && !reference.id.trim().is_empty()
                })
                .ok_or(ObjectRefError::Invalid(index))
        })
        .collect()
}

/// Condenses one `_find` response page: caps the objects carried back and
/// explains truncation and remaining pages.
pub fn summarize_find_page(response: &Value) -> Value {
    let total = response.get("total").and_then(Value::as_u64).unwrap_or(0);
    let page = response.get("page").and_then(Value::as_u64).unwrap_or(0);
    let per_page = response.get("per_page").and_then(Value::as_u64).unwrap_or(0);
    let objects = response
        .get("saved_objects")
        .and_then(Value::as_array)
        .cloned()
        .unwrap_or_default();

    let mut warnings = Vec::new();
    if objects.len() > MAX_FIND_RESULTS {
        warnings.push(format!(
            "Results truncated: showing {MAX_FIND_RESULTS} of {} objects.",
            objects.len()
        ));
    }
    if per_page > 0 && total > page * per_page {
        let pages = total.div_ceil(per_page);
        warnings.push(format!(
            "Found {total} total objects across {pages} pages. Currently showing page {page} with {per_page} objects per page. Use the 'page' argument to view other pages."
        ));
    }

    let mut summary = json!({
        "total": total,
        "per_page": per_page,
        "page": page,
        "saved_objects": objects.into_iter().take(MAX_FIND_RESULTS).collect::<Vec<_>>()
    });
    if !warnings.is_empty() {
        summary["warnings"] = json!(warnings);
    }
    summary
}
