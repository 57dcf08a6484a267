use std::any::Any;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use futures::FutureExt;
use serde_json::{Map, Value, json};

use crate::error::ToolError;
use crate::gateway::BackendGateway;

pub type SharedGateway = Arc<dyn BackendGateway>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    NotReady,
    InvalidArguments,
    ExecutionFailed,
}

impl FailureKind {
    pub fn as_str(self) -> &'static str {
        match self {
            FailureKind::NotReady => "not_ready",
            FailureKind::InvalidArguments => "invalid_arguments",
            FailureKind::ExecutionFailed => "execution_failed",
        }
    }
}

/// Uniform outcome of one tool call.
#[derive(Debug, Clone, PartialEq)]
pub enum ToolResult {
    Ok(String),
    Err {
        kind: FailureKind,
        message: String,
        /// Structured form of the underlying error.
        details: Value,
    },
}

impl ToolResult {
    pub fn failure(kind: FailureKind, error: &ToolError) -> Self {
        ToolResult::Err {
            kind,
            message: error.to_string(),
            details: error.to_value(),
        }
    }

    pub fn is_ok(&self) -> bool {
        matches!(self, ToolResult::Ok(_))
    }

    pub fn text(&self) -> &str {
        match self {
            ToolResult::Ok(text) => text,
            ToolResult::Err { message, .. } => message,
        }
    }

    pub fn to_envelope(&self, tool: &str) -> Value {
        match self {
            ToolResult::Ok(text) => json!({
                "status": "success",
                "tool": tool,
                "text": text
            }),
            ToolResult::Err {
                kind,
                message,
                details,
            } => json!({
                "status": "error",
                "tool": tool,
                "kind": kind.as_str(),
                "message": message,
                "error": details
            }),
        }
    }
}

/// Runs one tool implementation with the shared preconditions, logging, and
/// error classification every tool gets.
///
/// Without a gateway the implementation is never called. Argument errors
/// stay `InvalidArguments`; every other failure, a panic included, becomes
/// `ExecutionFailed` with the original error kept in `details`.
pub async fn invoke<F, Fut>(
    name: &str,
    tool: F,
    gateway: Option<&SharedGateway>,
    args: Map<String, Value>,
) -> ToolResult
where
    F: FnOnce(SharedGateway, Map<String, Value>) -> Fut,
    Fut: Future<Output = Result<String, ToolError>>,
{
    let Some(gateway) = gateway else {
        tracing::error!(tool = name, "HTTP client not initialized");
        return ToolResult::failure(FailureKind::NotReady, &ToolError::NotReady);
    };

    let rendered_args = Value::Object(args.clone());
    tracing::info!(tool = name, args = %rendered_args, "executing tool");
    let outcome = AssertUnwindSafe(tool(Arc::clone(gateway), args))
        .catch_unwind()
        .await
        .unwrap_or_else(|panic| Err(ToolError::Unexpected(panic_message(panic.as_ref()))));
    match outcome {
        Ok(text) => {
            tracing::info!(tool = name, "tool executed successfully");
            ToolResult::Ok(text)
        }
        Err(err) => {
            let kind = match err {
                ToolError::InvalidArguments { .. } => FailureKind::InvalidArguments,
                ToolError::NotReady => FailureKind::NotReady,
                _ => FailureKind::ExecutionFailed,
            };
            tracing::warn!(tool = name, kind = kind.as_str(), error = %err, "tool failed");
            ToolResult::failure(kind, &err)
        }
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    let detail = payload
        .downcast_ref::<&str>()
        .map(|text| text.to_string())
        .or_else(|| payload.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "unknown panic".to_string());
    format!("tool panicked: {detail}")
}
