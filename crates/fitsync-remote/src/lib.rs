//! fitsync Remote - HTTP adapters
//!
//! Provides async adapters for:
//! - The hosted backend's REST table API (select/insert/update/delete)
//! - Active reachability checks against an always-available resource
//!
//! ## Modules
//!
//! - [`client`] - Authenticated HTTP client for the REST API
//! - [`store`] - `IRemoteStore` implementation over the REST API
//! - [`probe`] - `IReachabilityProbe` implementation over plain HTTP

pub mod client;
pub mod probe;
pub mod store;

pub use client::RestClient;
pub use probe::HttpReachabilityProbe;
pub use store::RestRemoteStore;

use reqwest::StatusCode;
use thiserror::Error;

/// Errors that can occur when talking to the remote backend
#[derive(Debug, Error)]
pub enum RemoteError {
    /// Credentials are missing, invalid or expired
    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    /// Row-level policy rejected the request
    #[error("Forbidden: {0}")]
    Forbidden(String),

    /// The table or row does not exist
    #[error("Not found: {0}")]
    NotFound(String),

    /// Constraint violation (duplicate key, foreign key, ...)
    #[error("Conflict: {0}")]
    Conflict(String),

    /// The request was rejected as invalid
    #[error("Bad request: {0}")]
    BadRequest(String),

    /// A server-side error occurred (5xx)
    #[error("Server error: {0}")]
    ServerError(String),

    /// A network-level error occurred
    #[error("Network error: {0}")]
    NetworkError(#[from] reqwest::Error),

    /// The response could not be parsed or was malformed
    #[error("Invalid response: {0}")]
    InvalidResponse(String),
}

impl RemoteError {
    /// Classifies a non-success HTTP status
    pub fn from_status(status: StatusCode, body: String) -> Self {
        let detail = if body.is_empty() {
            status.to_string()
        } else {
            format!("{status}: {body}")
        };
        match status {
            StatusCode::UNAUTHORIZED => RemoteError::Unauthorized(detail),
            StatusCode::FORBIDDEN => RemoteError::Forbidden(detail),
            StatusCode::NOT_FOUND => RemoteError::NotFound(detail),
            StatusCode::CONFLICT => RemoteError::Conflict(detail),
            s if s.is_server_error() => RemoteError::ServerError(detail),
            _ => RemoteError::BadRequest(detail),
        }
    }
}
