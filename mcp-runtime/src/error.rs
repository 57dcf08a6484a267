use std::fmt;

use secops_core::error::codes;
use serde_json::{Value, json};
use thiserror::Error;

use crate::gateway::{ApiResponse, GatewayError};

/// Network step a tool failure happened in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Step {
    ListResolution,
    RuleResolution,
    WriteBack,
    Request,
}

impl Step {
    pub fn as_str(self) -> &'static str {
        match self {
            Step::ListResolution => "exception list resolution",
            Step::RuleResolution => "rule resolution",
            Step::WriteBack => "write-back",
            Step::Request => "request",
        }
    }
}

impl fmt::Display for Step {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResourceKind {
    Rule,
    ExceptionList,
    SavedObject,
}

impl ResourceKind {
    pub fn as_str(self) -> &'static str {
        match self {
            ResourceKind::Rule => "rule",
            ResourceKind::ExceptionList => "exception list",
            ResourceKind::SavedObject => "saved object",
        }
    }

    pub fn resolution_step(self) -> Step {
        match self {
            ResourceKind::Rule => Step::RuleResolution,
            ResourceKind::ExceptionList => Step::ListResolution,
            ResourceKind::SavedObject => Step::Request,
        }
    }
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Every failure a tool implementation can report.
#[derive(Debug, Error)]
pub enum ToolError {
    #[error("gateway not initialized")]
    NotReady,
    #[error("invalid arguments: {message}")]
    InvalidArguments {
        field: Option<String>,
        message: String,
    },
    #[error("{resource} {identifier} not found during {}; check the identifier", .resource.resolution_step())]
    NotFound {
        resource: ResourceKind,
        identifier: String,
    },
    #[error("transport error during {step}: {source}; the call is safe to retry")]
    Transport {
        step: Step,
        #[source]
        source: GatewayError,
    },
    #[error("Kibana returned HTTP {status} during {step}: {body}")]
    Backend { step: Step, status: u16, body: String },
    #[error("malformed response during {step}: {message}")]
    MalformedResponse { step: Step, message: String },
    #[error("{0}")]
    Unexpected(String),
}

impl ToolError {
    pub fn invalid(field: impl Into<String>, message: impl Into<String>) -> Self {
        ToolError::InvalidArguments {
            field: Some(field.into()),
            message: message.into(),
        }
    }

    pub fn transport(step: Step, source: GatewayError) -> Self {
        ToolError::Transport { step, source }
    }

    /// Non-2xx response that the step has no more specific meaning for.
    pub fn backend(step: Step, response: &ApiResponse) -> Self {
        ToolError::Backend {
            step,
            status: response.status,
            body: response.body_text(),
        }
    }

    pub fn step(&self) -> Option<Step> {
        match self {
            ToolError::NotFound { resource, .. } => Some(resource.resolution_step()),
            ToolError::Transport { step, .. }
            | ToolError::Backend { step, .. }
            | ToolError::MalformedResponse { step, .. } => Some(*step),
            _ => None,
        }
    }

    pub fn code(&self) -> &'static str {
        match self {
            ToolError::NotReady => codes::NOT_READY,
            ToolError::InvalidArguments { .. } => codes::VALIDATION_FAILED,
            ToolError::NotFound { .. } => codes::NOT_FOUND,
            ToolError::Transport { .. } => codes::CONNECTION_ERROR,
            ToolError::Backend { .. } => codes::BACKEND_ERROR,
            ToolError::MalformedResponse { .. } => codes::MALFORMED_RESPONSE,
            ToolError::Unexpected(_) => codes::EXECUTION_FAILED,
        }
    }

    fn docs_hint(&self) -> Option<&'static str> {
        match self {
            ToolError::NotReady => {
                Some("Set KIBANA_URL and KIBANA_API_KEY (or KIBANA_USERNAME/KIBANA_PASSWORD).")
            }
            ToolError::NotFound {
                resource: ResourceKind::Rule,
                ..
            } => Some("Use find_rules to look up the rule_id of the rule."),
            ToolError::NotFound {
                resource: ResourceKind::ExceptionList,
                ..
            } => Some("Check the list_id and namespace type of the exception list."),
            ToolError::NotFound {
                resource: ResourceKind::SavedObject,
                ..
            } => Some("Use find_objects to look up the type and id of the saved object."),
            ToolError::Transport { .. } => {
                Some("Ensure Kibana is reachable and KIBANA_URL points to it, then retry.")
            }
            ToolError::Backend { status: 409, .. } => {
                Some("A resource with the same identifier already exists.")
            }
            _ => None,
        }
    }

    pub fn to_value(&self) -> Value {
        let mut payload = json!({
            "error": self.code(),
            "message": self.to_string()
        });
        if let ToolError::InvalidArguments {
            field: Some(field), ..
        } = self
        {
            payload["field"] = Value::String(field.clone());
        }
        if let Some(step) = self.step() {
            payload["step"] = Value::String(step.as_str().to_string());
        }
        if let Some(docs_hint) = self.docs_hint() {
            payload["docs_hint"] = Value::String(docs_hint.to_string());
        }
        if let ToolError::Backend { status, body, .. } = self {
            payload["details"] = json!({ "status": status, "body": body });
        }
        payload
    }
}
