//! Configuration for reaching the studio's hosted AI functions.

use std::collections::HashMap;
use std::time::Duration;

use crate::client::ClientError;

/// Environment variable holding the functions base URL.
pub const BASE_URL_ENV: &str = "STUDIO_FUNCTIONS_URL";

/// Environment variable holding the publishable API key.
pub const API_KEY_ENV: &str = "STUDIO_FUNCTIONS_KEY";

pub const DEFAULT_CHAT_PATH: &str = "/functions/v1/ai-chat";
pub const DEFAULT_SUGGEST_PATH: &str = "/functions/v1/ai-suggest";
pub const DEFAULT_IMAGE_PATH: &str = "/functions/v1/ai-generate-image";

/// A secret string type for sensitive data like API keys.
/// Prevents accidental logging or display of secrets.
#[derive(Clone)]
pub struct SecretString(String);

impl SecretString {
    pub fn new(s: String) -> Self {
        Self(s)
    }

    pub fn expose_secret(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Debug for SecretString {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("SecretString([REDACTED])")
    }
}

impl From<String> for SecretString {
    fn from(s: String) -> Self {
        Self::new(s)
    }
}

impl From<&str> for SecretString {
    fn from(s: &str) -> Self {
        Self::new(s.to_string())
    }
}

/// Where the AI functions live and how to authenticate against them.
///
/// # Example
/// ```rust
/// use inkstream::options::FunctionsConfig;
///
/// let config = FunctionsConfig::new("https://studio.example.com/", "publishable-key");
/// assert_eq!(
///     config.endpoint(&config.chat_path),
///     "https://studio.example.com/functions/v1/ai-chat"
/// );
/// ```
#[derive(Debug, Clone)]
pub struct FunctionsConfig {
    /// Project URL without a trailing slash.
    pub base_url: String,

    /// Sent as `Authorization: Bearer <key>`.
    pub api_key: SecretString,

    pub chat_path: String,
    pub suggest_path: String,
    pub image_path: String,
}

impl FunctionsConfig {
    pub fn new(base_url: impl Into<String>, api_key: impl Into<SecretString>) -> Self {
        let base_url: String = base_url.into();
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key: api_key.into(),
            chat_path: DEFAULT_CHAT_PATH.to_string(),
            suggest_path: DEFAULT_SUGGEST_PATH.to_string(),
            image_path: DEFAULT_IMAGE_PATH.to_string(),
        }
    }

    /// Read [`BASE_URL_ENV`] and [`API_KEY_ENV`].
    pub fn from_env() -> Result<Self, ClientError> {
        let base_url = read_env(BASE_URL_ENV)?;
        let api_key = read_env(API_KEY_ENV)?;
        Ok(Self::new(base_url, api_key))
    }

    pub fn with_chat_path(mut self, path: impl Into<String>) -> Self {
        self.chat_path = path.into();
        self
    }

    pub fn with_suggest_path(mut self, path: impl Into<String>) -> Self {
        self.suggest_path = path.into();
        self
    }

    pub fn with_image_path(mut self, path: impl Into<String>) -> Self {
        self.image_path = path.into();
        self
    }

    /// Full URL for one of the configured paths.
    pub fn endpoint(&self, path: &str) -> String {
        if path.starts_with('/') {
            format!("{}{}", self.base_url, path)
        } else {
            format!("{}/{}", self.base_url, path)
        }
    }
}

fn read_env(name: &str) -> Result<String, ClientError> {
    match std::env::var(name) {
        Ok(value) if !value.trim().is_empty() => Ok(value),
        _ => Err(ClientError::Config(format!("{name} must be set"))),
    }
}

/// HTTP transport settings applied when building the `reqwest` client.
///
/// `timeout` bounds the whole request including the streamed body, so leave
/// it unset for long chat answers and cancel through the session instead.
#[derive(Debug, Clone, Default)]
pub struct TransportOptions {
    pub timeout: Option<Duration>,

    pub connect_timeout: Option<Duration>,

    /// HTTP proxy URL
    pub proxy: Option<String>,

    /// Additional HTTP headers to include in requests
    pub extra_headers: Option<HashMap<String, String>>,
}

impl TransportOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = Some(timeout);
        self
    }

    pub fn with_proxy(mut self, proxy: String) -> Self {
        self.proxy = Some(proxy);
        self
    }

    /// Add a single extra header.
    pub fn with_header(mut self, key: String, value: String) -> Self {
        self.extra_headers
            .get_or_insert_with(HashMap::new)
            .insert(key, value);
        self
    }
}
