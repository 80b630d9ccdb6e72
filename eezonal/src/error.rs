//! Error types for zonal statistics requests.

use thiserror::Error;

/// Errors produced while building, sending or decoding a zonal statistics request.
#[derive(Error, Debug)]
pub enum ZonalError {
    #[error("asset not found: {asset_id}")]
    AssetNotFound { asset_id: String },

    #[error("unsupported asset kind {kind} for {asset_id} (expected IMAGE or IMAGE_COLLECTION)")]
    UnsupportedAssetKind { asset_id: String, kind: String },

    #[error("malformed geometry: {0}")]
    MalformedGeometry(String),

    #[error("invalid date range: {0}")]
    InvalidDateRange(String),

    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("configuration error: {0}")]
    Config(String),

    /// Any failure of the remote call: transport, timeout, HTTP status or reply shape.
    #[error("backend error{}: {message}", fmt_status(.status))]
    Backend {
        status: Option<u16>,
        message: String,
    },
}

fn fmt_status(status: &Option<u16>) -> String {
    status.map(|s| format!(" (HTTP {s})")).unwrap_or_default()
}

impl ZonalError {
    /// Backend failure without an HTTP status (transport or decoding problem).
    pub fn backend(message: impl Into<String>) -> Self {
        ZonalError::Backend {
            status: None,
            message: message.into(),
        }
    }

    /// HTTP status attached to a backend failure, if any.
    pub fn status(&self) -> Option<u16> {
        match self {
            ZonalError::Backend { status, .. } => *status,
            _ => None,
        }
    }
}

impl From<reqwest::Error> for ZonalError {
    fn from(err: reqwest::Error) -> Self {
        let status = err.status().map(|s| s.as_u16());
        let message = if err.is_timeout() {
            format!("request timed out: {err}")
        } else {
            err.to_string()
        };
        ZonalError::Backend { status, message }
    }
}

impl From<serde_json::Error> for ZonalError {
    fn from(err: serde_json::Error) -> Self {
        ZonalError::backend(format!("unexpected response: {err}"))
    }
}

/// Result alias for zonal statistics operations.
pub type Result<T> = std::result::Result<T, ZonalError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_backend_display_with_status() {
        let err = ZonalError::Backend {
            status: Some(503),
            message: "unavailable".to_string(),
        };
        assert_eq!(err.to_string(), "backend error (HTTP 503): unavailable");
        assert_eq!(err.status(), Some(503));
    }

    #[test]
    fn test_backend_display_without_status() {
        let err = ZonalError::backend("connection reset");
        assert_eq!(err.to_string(), "backend error: connection reset");
        assert_eq!(err.status(), None);
    }
}
