use serde_json::{Map, Value, json};
use thiserror::Error;

/// Response action an endpoint agent can be asked to perform.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResponseAction {
    Isolate,
    Unisolate,
    Execute,
    KillProcess,
    ScanFile,
}

impl ResponseAction {
    /// Action name as the endpoint action API expects it.
    pub fn as_str(self) -> &'static str {
        match self {
            ResponseAction::Isolate => "isolate",
            ResponseAction::Unisolate => "unisolate",
            ResponseAction::Execute => "execute",
            ResponseAction::KillProcess => "kill-process",
            ResponseAction::ScanFile => "scan-file",
        }
    }

    /// Status line reported once the backend accepted the action.
    pub fn initiated(self) -> &'static str {
        match self {
            ResponseAction::Isolate => "Isolation action initiated",
            ResponseAction::Unisolate => "Release from isolation action initiated",
            ResponseAction::Execute => "Command execution initiated",
            ResponseAction::KillProcess => "Process termination initiated",
            ResponseAction::ScanFile => "Scan initiated",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ActionValidationError {
    #[error("at least one endpoint id is required")]
    NoEndpoints,
    #[error("process identification parameters are required")]
    MissingProcess,
    #[error("a 'path' or 'paths' parameter is required for a scan")]
    MissingScanPath,
}

impl ActionValidationError {
    pub fn field(&self) -> &'static str {
        match self {
            ActionValidationError::NoEndpoints => "endpoint_ids",
            ActionValidationError::MissingProcess | ActionValidationError::MissingScanPath => {
                "parameters"
            }
        }
    }
}

/// A validated response action request for one or more endpoints.
#[derive(Debug, Clone, PartialEq)]
pub struct ActionRequest {
    pub action: ResponseAction,
    pub endpoint_ids: Vec<String>,
    pub agent_type: String,
    pub comment: Option<String>,
    pub data: Map<String, Value>,
}

impl ActionRequest {
    pub fn new(
        action: ResponseAction,
        endpoint_ids: Vec<String>,
        agent_type: String,
        comment: Option<String>,
        data: Map<String, Value>,
    ) -> Result<Self, ActionValidationError> {
        if endpoint_ids.is_empty() {
            return Err(ActionValidationError::NoEndpoints);
        }
        match action {
            ResponseAction::KillProcess if data.is_empty() => {
                return Err(ActionValidationError::MissingProcess);
            }
            ResponseAction::ScanFile if scan_path(&data).is_none() => {
                return Err(ActionValidationError::MissingScanPath);
            }
            _ => {}
        }
        Ok(Self {
            action,
            endpoint_ids,
            agent_type,
            comment,
            data,
        })
    }

    pub fn to_body(&self) -> Value {
        let agents: Vec<Value> = self
            .endpoint_ids
            .iter()
            .map(|id| json!({ "agent_type": self.agent_type, "id": id }))
            .collect();
        let mut body = json!({
            "name": self.action.as_str(),
            "type": "INPUT_ACTION",
            "agents": agents,
            "data": self.data
        });
        if let Some(comment) = &self.comment {
            body["comment"] = Value::String(comment.clone());
        }
        body
    }

    /// Human-facing target of the action, when it has one.
    pub fn target(&self) -> Option<String> {
        match self.action {
            ResponseAction::Execute => self.data.get("command").map(display_value),
            ResponseAction::KillProcess => ["process_id", "processId", "pid", "process_name", "processName"]
                .iter()
                .find_map(|key| self.data.get(*key))
                .map(display_value),
            ResponseAction::ScanFile => scan_path(&self.data),
            ResponseAction::Isolate | ResponseAction::Unisolate => None,
        }
    }
}

fn scan_path(data: &Map<String, Value>) -> Option<String> {
    if let Some(path) = data.get("path").and_then(Value::as_str) {
        if !path.trim().is_empty() {
            return Some(path.to_string());
        }
    }
    data.get("paths")
        .and_then(Value::as_array)
        .and_then(|paths| paths.iter().filter_map(Value::as_str).next())
        .map(str::to_string)
}

fn display_value(value: &Value) -> String {
    match value {
        Value::String(text) => text.clone(),
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn data(value: Value) -> Map<String, Value> {
        match value {
            Value::Object(map) => map,
            _ => Map::new(),
        }
    }

    #[test]
    fn isolate_body_lists_every_agent() {
        let request = ActionRequest::new(
            ResponseAction::Isolate,
            vec!["a1".to_string(), "a2".to_string()],
            "endpoint".to_string(),
            Some("contain host".to_string()),
            Map::new(),
        )
        .unwrap();
        assert_eq!(
            request.to_body(),
            json!({
                "name": "isolate",
                "type": "INPUT_ACTION",
                "agents": [
                    { "agent_type": "endpoint", "id": "a1" },
                    { "agent_type": "endpoint", "id": "a2" }
                ],
                "data": {},
                "comment": "contain host"
            })
        );
    }

    #[test]
    fn kill_process_needs_parameters() {
        let err = ActionRequest::new(
            ResponseAction::KillProcess,
            vec!["a1".to_string()],
            "endpoint".to_string(),
            None,
            Map::new(),
        )
        .unwrap_err();
        assert_eq!(err, ActionValidationError::MissingProcess);
        assert_eq!(err.field(), "parameters");
    }

    #[test]
    fn scan_accepts_path_or_paths() {
        for parameters in [json!({ "path": "/tmp/x" }), json!({ "paths": ["/tmp/x", "/tmp/y"] })] {
            let request = ActionRequest::new(
                ResponseAction::ScanFile,
                vec!["a1".to_string()],
                "endpoint".to_string(),
                None,
                data(parameters),
            )
            .unwrap();
            assert_eq!(request.target().as_deref(), Some("/tmp/x"));
        }
        let err = ActionRequest::new(
            ResponseAction::ScanFile,
            vec!["a1".to_string()],
            "endpoint".to_string(),
            None,
            data(json!({ "path": " " })),
        )
        .unwrap_err();
        assert_eq!(err, ActionValidationError::MissingScanPath);
    }

    #[test]
    fn kill_process_target_prefers_pid() {
        let request = ActionRequest::new(
            ResponseAction::KillProcess,
            vec!["a1".to_string()],
            "endpoint".to_string(),
            None,
            data(json!({ "pid": 4242, "process_name": "evil.exe" })),
        )
        .unwrap();
        assert_eq!(request.target().as_deref(), Some("4242"));
    }

    #[test]
    fn empty_endpoint_list_is_rejected() {
        let err = ActionRequest::new(
            ResponseAction::Unisolate,
            Vec::new(),
            "endpoint".to_string(),
            None,
            Map::new(),
        )
        .unwrap_err();
        assert_eq!(err.field(), "endpoint_ids");
    }
}
