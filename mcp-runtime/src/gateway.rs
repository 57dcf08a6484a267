use async_trait::async_trait;
use reqwest::Method;
use reqwest::header::{AUTHORIZATION, CONTENT_TYPE, HeaderMap, HeaderValue};
use serde_json::Value;
use thiserror::Error;

use crate::config::{Auth, ConfigError, GatewayConfig};

/// Header some Kibana endpoints require to pin the public API version.
pub const API_VERSION_HEADER: &str = "Elastic-Api-Version";
pub const API_VERSION: &str = "2023-10-31";

#[derive(Debug, Clone, PartialEq)]
pub struct ApiRequest {
    pub method: Method,
    pub path: String,
    pub query: Vec<(String, String)>,
    pub body: Option<Value>,
    pub headers: Vec<(String, String)>,
    /// Sent as a multipart form instead of a JSON body.
    pub upload: Option<FileUpload>,
}

/// A single file part of a multipart request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileUpload {
    pub field: String,
    pub file_name: String,
    pub mime_type: String,
    pub content: String,
}

impl ApiRequest {
    pub fn new(method: Method, path: impl Into<String>) -> Self {
        Self {
            method,
            path: path.into(),
            query: Vec::new(),
            body: None,
            headers: Vec::new(),
            upload: None,
        }
    }

    pub fn with_query(mut self, query: Vec<(String, String)>) -> Self {
        self.query = query;
        self
    }

    pub fn with_json(mut self, body: Value) -> Self {
        self.body = Some(body);
        self
    }

    pub fn with_upload(mut self, upload: FileUpload) -> Self {
        self.upload = Some(upload);
        self
    }

    pub fn with_header(mut self, name: &str, value: &str) -> Self {
        self.headers.push((name.to_string(), value.to_string()));
        self
    }

    pub fn with_api_version(self) -> Self {
        self.with_header(API_VERSION_HEADER, API_VERSION)
    }
}

/// An HTTP response of any status. Non-2xx statuses are data, not errors;
/// callers decide what a given status means for their step.
#[derive(Debug, Clone, PartialEq)]
pub struct ApiResponse {
    pub status: u16,
    /// Parsed JSON body; a raw string when the body is not JSON, `null` when empty.
    pub body: Value,
    /// Body bytes exactly as received.
    pub raw: Vec<u8>,
    pub content_type: Option<String>,
}

impl ApiResponse {
    pub fn from_bytes(status: u16, content_type: Option<String>, raw: Vec<u8>) -> Self {
        Self {
            status,
            body: parse_response_body(&raw),
            raw,
            content_type,
        }
    }

    /// Response whose raw bytes are the compact rendering of `body`.
    pub fn json(status: u16, body: Value) -> Self {
        let raw = match &body {
            Value::Null => Vec::new(),
            Value::String(text) => text.clone().into_bytes(),
            other => other.to_string().into_bytes(),
        };
        Self {
            status,
            body,
            raw,
            content_type: Some("application/json".to_string()),
        }
    }

    pub fn is_success(&self) -> bool {
        (200..=299).contains(&self.status)
    }

    pub fn is_not_found(&self) -> bool {
        self.status == 404
    }

    /// Body as the backend sent it, for diagnostics.
    pub fn body_text(&self) -> String {
        String::from_utf8_lossy(&self.raw).into_owned()
    }

    pub fn is_ndjson(&self) -> bool {
        self.content_type
            .as_deref()
            .is_some_and(|value| value.contains("ndjson"))
    }
}

/// Failures that produced no HTTP response at all.
#[derive(Debug, Error)]
pub enum GatewayError {
    #[error("request to {path} timed out after {timeout_secs}s")]
    Timeout { path: String, timeout_secs: u64 },
    #[error("failed to reach Kibana for {path}: {message}")]
    Transport { path: String, message: String },
    #[error("invalid request path '{path}': {message}")]
    InvalidRequest { path: String, message: String },
}

/// Handle to the backend REST API, shared by all in-flight tool calls.
#[async_trait]
pub trait BackendGateway: Send + Sync {
    async fn send(&self, request: ApiRequest) -> Result<ApiResponse, GatewayError>;

    async fn get(
        &self,
        path: &str,
        query: Vec<(String, String)>,
    ) -> Result<ApiResponse, GatewayError> {
        self.send(ApiRequest::new(Method::GET, path).with_query(query))
            .await
    }

    async fn post(&self, path: &str, body: Value) -> Result<ApiResponse, GatewayError> {
        self.send(ApiRequest::new(Method::POST, path).with_json(body))
            .await
    }

    async fn patch(&self, path: &str, body: Value) -> Result<ApiResponse, GatewayError> {
        self.send(ApiRequest::new(Method::PATCH, path).with_json(body))
            .await
    }

    async fn put(&self, path: &str, body: Option<Value>) -> Result<ApiResponse, GatewayError> {
        let mut request = ApiRequest::new(Method::PUT, path);
        request.body = body;
        self.send(request).await
    }

    async fn delete(
        &self,
        path: &str,
        query: Vec<(String, String)>,
    ) -> Result<ApiResponse, GatewayError> {
        self.send(ApiRequest::new(Method::DELETE, path).with_query(query))
            .await
    }
}

/// reqwest-backed gateway. The client, base URL, and credentials are fixed
/// at construction.
pub struct HttpGateway {
    config: GatewayConfig,
    http: reqwest::Client,
}

impl HttpGateway {
    pub fn new(config: GatewayConfig) -> Result<Self, ConfigError> {
        let mut headers = HeaderMap::new();
        headers.insert("kbn-xsrf", HeaderValue::from_static("true"));
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        if let Auth::ApiKey(key) = &config.auth {
            let mut value = HeaderValue::from_str(key).map_err(|_| ConfigError::InvalidApiKey)?;
            value.set_sensitive(true);
            headers.insert(AUTHORIZATION, value);
        }

        let http = reqwest::Client::builder()
            .default_headers(headers)
            .timeout(config.timeout)
            .danger_accept_invalid_certs(config.insecure)
            .build()
            .map_err(|e| ConfigError::HttpClient(e.to_string()))?;

        tracing::info!(
            base_url = %config.base_url,
            auth = config.auth.scheme(),
            timeout_secs = config.timeout.as_secs(),
            "configured Kibana HTTP client"
        );
        Ok(Self { config, http })
    }

    fn url(&self, path: &str, query: &[(String, String)]) -> Result<reqwest::Url, GatewayError> {
        let path = normalize_api_path(path)?;
        let mut url = reqwest::Url::parse(&format!("{}{}", self.config.base_url, path)).map_err(
            |e| GatewayError::InvalidRequest {
                path: path.clone(),
                message: e.to_string(),
            },
        )?;
        if !query.is_empty() {
            let mut pairs = url.query_pairs_mut();
            for (key, value) in query {
                pairs.append_pair(key, value);
            }
        }
        Ok(url)
    }
}

#[async_trait]
impl BackendGateway for HttpGateway {
    async fn send(&self, request: ApiRequest) -> Result<ApiResponse, GatewayError> {
        let url = self.url(&request.path, &request.query)?;
        let mut builder = self.http.request(request.method.clone(), url);
        if let Auth::Basic { username, password } = &self.config.auth {
            builder = builder.basic_auth(username, Some(password));
        }
        for (name, value) in &request.headers {
            builder = builder.header(name.as_str(), value.as_str());
        }
        if let Some(upload) = &request.upload {
            let part = reqwest::multipart::Part::text(upload.content.clone())
                .file_name(upload.file_name.clone())
                .mime_str(&upload.mime_type)
                .map_err(|e| GatewayError::InvalidRequest {
                    path: request.path.clone(),
                    message: e.to_string(),
                })?;
            builder = builder.multipart(reqwest::multipart::Form::new().part(upload.field.clone(), part));
        } else if let Some(body) = &request.body {
            builder = builder.json(body);
        }

        let response = builder.send().await.map_err(|e| {
            if e.is_timeout() {
                GatewayError::Timeout {
                    path: request.path.clone(),
                    timeout_secs: self.config.timeout.as_secs(),
                }
            } else {
                GatewayError::Transport {
                    path: request.path.clone(),
                    message: e.to_string(),
                }
            }
        })?;

        let status = response.status().as_u16();
        let content_type = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|value| value.to_str().ok())
            .map(str::to_string);
        let bytes = response.bytes().await.map_err(|e| GatewayError::Transport {
            path: request.path.clone(),
            message: format!("failed to read response body: {e}"),
        })?;
        tracing::debug!(method = %request.method, path = %request.path, status, "kibana request");

        Ok(ApiResponse::from_bytes(status, content_type, bytes.to_vec()))
    }
}

fn normalize_api_path(raw: &str) -> Result<String, GatewayError> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Err(GatewayError::InvalidRequest {
            path: raw.to_string(),
            message: "API path must not be empty".to_string(),
        });
    }
    if trimmed.starts_with("http://") || trimmed.starts_with("https://") {
        return Err(GatewayError::InvalidRequest {
            path: raw.to_string(),
            message: "pass an API path such as /api/detection_engine/rules, not a full URL"
                .to_string(),
        });
    }
    if trimmed.starts_with('/') {
        Ok(trimmed.to_string())
    } else {
        Ok(format!("/{trimmed}"))
    }
}

fn parse_response_body(bytes: &[u8]) -> Value {
    if bytes.is_empty() {
        return Value::Null;
    }
    serde_json::from_slice(bytes)
        .unwrap_or_else(|_| Value::String(String::from_utf8_lossy(bytes).to_string()))
}
