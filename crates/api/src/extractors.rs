//! Request extractors.

use axum::{extract::FromRequestParts, http::request::Parts};

use ringi_shared::AppError;

use crate::error::ApiError;

/// Header carrying the acting user's id.
pub const USER_HEADER: &str = "x-user-id";

/// The user on whose behalf the request acts.
///
/// Identity is asserted by the caller; authentication happens upstream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActingUser(pub String);

impl ActingUser {
    /// Returns the user id.
    #[must_use]
    pub fn id(&self) -> &str {
        &self.0
    }
}

impl<S> FromRequestParts<S> for ActingUser
where
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .headers
            .get(USER_HEADER)
            .and_then(|v| v.to_str().ok())
            .map(str::trim)
            .filter(|v| !v.is_empty())
            .map(|v| Self(v.to_string()))
            .ok_or_else(|| {
                AppError::Unauthorized(format!("{USER_HEADER} header is required")).into()
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::Request;

    async fn extract(header: Option<&str>) -> Result<ActingUser, ApiError> {
        let mut builder = Request::builder().uri("/");
        if let Some(value) = header {
            builder = builder.header(USER_HEADER, value);
        }
        let (mut parts, ()) = builder.body(()).unwrap().into_parts();
        ActingUser::from_request_parts(&mut parts, &()).await
    }

    #[tokio::test]
    async fn test_reads_trimmed_header() {
        assert_eq!(extract(Some(" alice ")).await.unwrap().id(), "alice");
    }

    #[tokio::test]
    async fn test_blank_or_missing_header_is_rejected() {
        assert!(extract(Some("  ")).await.is_err());
        assert!(extract(None).await.is_err());
    }
}
