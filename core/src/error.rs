use thiserror::Error;

/// Error codes surfaced to MCP clients in structured tool errors.
pub mod codes {
    pub const NOT_READY: &str = "not_ready";
    pub const VALIDATION_FAILED: &str = "validation_failed";
    pub const NOT_FOUND: &str = "not_found";
    pub const CONNECTION_ERROR: &str = "connection_error";
    pub const BACKEND_ERROR: &str = "backend_error";
    pub const MALFORMED_RESPONSE: &str = "malformed_response";
    pub const EXECUTION_FAILED: &str = "execution_failed";
}

/// A string did not name one of the values an enum accepts.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("'{received}' is not a valid {kind}; expected one of: {}", .expected.join(", "))]
pub struct ParseEnumError {
    pub kind: &'static str,
    pub received: String,
    pub expected: &'static [&'static str],
}

impl ParseEnumError {
    pub fn new(kind: &'static str, received: &str, expected: &'static [&'static str]) -> Self {
        Self {
            kind,
            received: received.to_string(),
            expected,
        }
    }
}
