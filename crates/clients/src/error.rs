//! Client error type.

use thiserror::Error;

use ringi_core::workflow::WorkflowError;

/// Errors raised while talking to an upstream service.
#[derive(Debug, Error)]
pub enum ClientError {
    /// Base URL could not be parsed or extended.
    #[error("Invalid upstream URL: {0}")]
    InvalidUrl(String),

    /// Connection, timeout or body read failure.
    #[error("Request failed: {0}")]
    Transport(#[from] reqwest::Error),

    /// Upstream answered with a non-success status.
    #[error("Upstream returned {status}: {body}")]
    Status {
        /// HTTP status code.
        status: u16,
        /// Response body, possibly empty.
        body: String,
    },
}

impl From<ClientError> for WorkflowError {
    fn from(err: ClientError) -> Self {
        Self::UpstreamUnavailable(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_maps_to_upstream_unavailable() {
        let err: WorkflowError = ClientError::Status {
            status: 502,
            body: "bad gateway".into(),
        }
        .into();
        assert!(matches!(err, WorkflowError::UpstreamUnavailable(ref m) if m == "Upstream returned 502: bad gateway"));
        assert_eq!(err.status_code(), 503);
    }
}
