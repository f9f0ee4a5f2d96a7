//! REST API client
//!
//! Provides a thin authenticated HTTP client for the backend's table API
//! (PostgREST conventions: `/rest/v1/<table>`, `apikey` header, bearer
//! token, `<column>=eq.<value>` filters).
//!
//! ## Usage
//!
//! ```rust,no_run
//! use fitsync_remote::client::RestClient;
//! use reqwest::Method;
//!
//! # async fn example() -> anyhow::Result<()> {
//! let client = RestClient::new("https://api.example.com")
//!     .with_api_key("anon-key")
//!     .with_access_token("user-jwt");
//! let response = client.request(Method::GET, "clients").send().await?;
//! # Ok(())
//! # }
//! ```

use reqwest::{Client, Method, RequestBuilder, Response};
use tracing::debug;

use fitsync_core::config::RemoteConfig;

use crate::RemoteError;

/// Path prefix of the table API
const REST_PREFIX: &str = "/rest/v1";

/// HTTP client for the backend table API
///
/// Wraps `reqwest::Client` with the base URL and authentication headers.
#[derive(Debug, Clone)]
pub struct RestClient {
    /// The underlying HTTP client
    client: Client,
    /// Base URL, without trailing slash
    base_url: String,
    /// Public API key sent as `apikey`
    api_key: Option<String>,
    /// Bearer token of the signed-in user
    access_token: Option<String>,
}

impl RestClient {
    /// Creates a client for the given base URL without credentials
    pub fn new(base_url: impl Into<String>) -> Self {
        let base_url: String = base_url.into();
        Self {
            client: Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key: None,
            access_token: None,
        }
    }

    /// Creates a client from the `remote` configuration section
    pub fn from_config(config: &RemoteConfig) -> Self {
        let mut client = Self::new(&config.base_url);
        client.api_key = config.api_key.clone();
        client.access_token = config.access_token.clone();
        client
    }

    /// Sets the API key
    pub fn with_api_key(mut self, key: impl Into<String>) -> Self {
        self.api_key = Some(key.into());
        self
    }

    /// Sets the bearer token
    pub fn with_access_token(mut self, token: impl Into<String>) -> Self {
        self.access_token = Some(token.into());
        self
    }

    /// Updates the bearer token (e.g., after a token refresh)
    pub fn set_access_token(&mut self, token: impl Into<String>) {
        self.access_token = Some(token.into());
        debug!("Updated RestClient access token");
    }

    /// Returns the configured base URL
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// URL of a table endpoint
    pub fn table_url(&self, table: &str) -> String {
        format!("{}{}/{}", self.base_url, REST_PREFIX, table)
    }

    /// Creates an authenticated request builder for a table
    pub fn request(&self, method: Method, table: &str) -> RequestBuilder {
        let mut builder = self.client.request(method, self.table_url(table));
        if let Some(key) = &self.api_key {
            builder = builder.header("apikey", key);
        }
        if let Some(token) = self.access_token.as_ref().or(self.api_key.as_ref()) {
            builder = builder.bearer_auth(token);
        }
        builder
    }

    /// Turns a non-success response into a classified [`RemoteError`]
    pub async fn check(response: Response) -> Result<Response, RemoteError> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let body = response.text().await.unwrap_or_default();
        Err(RemoteError::from_status(status, body))
    }
}
