use std::fmt;
use std::time::Duration;

use clap::Args;
use thiserror::Error;

const DEFAULT_TIMEOUT_SECS: u64 = 30;
const MAX_TIMEOUT_SECS: u64 = 300;

/// Connection settings as supplied on the command line or environment.
#[derive(Args, Clone, Debug, Default)]
pub struct ConnectionSettings {
    /// Kibana base URL
    #[arg(long = "kibana-url", env = "KIBANA_URL")]
    pub url: Option<String>,
    /// API key (raw or already prefixed with "ApiKey "); takes precedence over basic auth
    #[arg(long, env = "KIBANA_API_KEY", hide_env_values = true)]
    pub api_key: Option<String>,
    /// Username for basic auth
    #[arg(long, env = "KIBANA_USERNAME")]
    pub username: Option<String>,
    /// Password for basic auth
    #[arg(long, env = "KIBANA_PASSWORD", hide_env_values = true)]
    pub password: Option<String>,
    /// Kibana space; requests are routed through /s/{space}
    #[arg(long, env = "KIBANA_SPACE")]
    pub space: Option<String>,
    /// Per-request timeout in seconds
    #[arg(long, env = "KIBANA_TIMEOUT_SECS")]
    pub timeout_secs: Option<u64>,
    /// Skip TLS certificate verification (self-signed lab clusters)
    #[arg(long, env = "KIBANA_INSECURE")]
    pub insecure: bool,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("KIBANA_URL is not set")]
    MissingUrl,
    #[error("KIBANA_URL '{url}' is not a valid URL: {message}")]
    InvalidUrl { url: String, message: String },
    #[error(
        "Kibana authentication not configured. Set KIBANA_API_KEY or both KIBANA_USERNAME and KIBANA_PASSWORD."
    )]
    MissingCredentials,
    #[error("timeout must be between 1 and 300 seconds, got {0}")]
    InvalidTimeout(u64),
    #[error("API key contains characters that are not valid in an HTTP header")]
    InvalidApiKey,
    #[error("failed to build HTTP client: {0}")]
    HttpClient(String),
}

#[derive(Clone, PartialEq, Eq)]
pub enum Auth {
    /// Full `Authorization` header value, `ApiKey <key>`.
    ApiKey(String),
    Basic { username: String, password: String },
}

impl Auth {
    pub fn scheme(&self) -> &'static str {
        match self {
            Auth::ApiKey(_) => "api_key",
            Auth::Basic { .. } => "basic",
        }
    }
}

impl fmt::Debug for Auth {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Auth::ApiKey(_) => f.write_str("ApiKey(<redacted>)"),
            Auth::Basic { username, .. } => f
                .debug_struct("Basic")
                .field("username", username)
                .field("password", &"<redacted>")
                .finish(),
        }
    }
}

/// Validated gateway configuration. Built once at startup and never mutated.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct GatewayConfig {
    pub base_url: String,
    pub auth: Auth,
    pub timeout: Duration,
    pub insecure: bool,
}

impl GatewayConfig {
    pub fn new(base_url: impl Into<String>, auth: Auth) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            auth,
            timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
            insecure: false,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn from_settings(settings: &ConnectionSettings) -> Result<Self, ConfigError> {
        let url = non_blank(settings.url.as_deref()).ok_or(ConfigError::MissingUrl)?;
        reqwest::Url::parse(url).map_err(|e| ConfigError::InvalidUrl {
            url: url.to_string(),
            message: e.to_string(),
        })?;

        let mut base_url = url.trim_end_matches('/').to_string();
        if let Some(space) = non_blank(settings.space.as_deref()) {
            base_url = format!("{base_url}/s/{space}");
            tracing::info!(space, "using Kibana space");
        }

        let auth = if let Some(key) = non_blank(settings.api_key.as_deref()) {
            if key.starts_with("ApiKey ") {
                Auth::ApiKey(key.to_string())
            } else {
                Auth::ApiKey(format!("ApiKey {key}"))
            }
        } else {
            match (
                non_blank(settings.username.as_deref()),
                settings.password.as_deref().filter(|p| !p.is_empty()),
            ) {
                (Some(username), Some(password)) => Auth::Basic {
                    username: username.to_string(),
                    password: password.to_string(),
                },
                _ => return Err(ConfigError::MissingCredentials),
            }
        };

        let timeout_secs = settings.timeout_secs.unwrap_or(DEFAULT_TIMEOUT_SECS);
        if !(1..=MAX_TIMEOUT_SECS).contains(&timeout_secs) {
            return Err(ConfigError::InvalidTimeout(timeout_secs));
        }

        Ok(Self {
            base_url,
            auth,
            timeout: Duration::from_secs(timeout_secs),
            insecure: settings.insecure,
        })
    }
}

fn non_blank(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|v| !v.is_empty())
}
