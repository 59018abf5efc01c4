//! User directory client.

use async_trait::async_trait;
use serde::Deserialize;
use tracing::{debug, instrument};

use ringi_core::workflow::{UserDirectory, WorkflowError};

use crate::error::ClientError;
use crate::upstream::Upstream;

#[derive(Debug, Deserialize)]
struct RoleUsersResponse {
    #[serde(default)]
    users: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct UserResponse {
    #[serde(default)]
    group_id: Option<String>,
}

/// Looks up users and role holders in the manage service.
#[derive(Debug, Clone)]
pub struct HttpUserDirectory {
    upstream: Upstream,
}

impl HttpUserDirectory {
    /// Creates a client for the service at `base_url`.
    ///
    /// # Errors
    ///
    /// Returns an error if the URL is invalid or the client cannot be built.
    pub fn new(base_url: &str, timeout_secs: u64) -> Result<Self, ClientError> {
        Ok(Self {
            upstream: Upstream::new(base_url, timeout_secs)?,
        })
    }
}

#[async_trait]
impl UserDirectory for HttpUserDirectory {
    #[instrument(skip(self))]
    async fn users_with_role(
        &self,
        tenant: &str,
        domain: &str,
        group_id: &str,
        role_id: &str,
    ) -> Result<Vec<String>, WorkflowError> {
        let url = self.upstream.url(&[
            "api", "v1", "tenants", tenant, "groups", group_id, "roles", role_id, "users",
        ])?;
        let found: Option<RoleUsersResponse> =
            self.upstream.get_json(url, &[("domain", domain)]).await?;
        let users = found.map(|r| r.users).unwrap_or_default();
        debug!(count = users.len(), "Role holders fetched");
        Ok(users)
    }

    #[instrument(skip(self))]
    async fn user_group(
        &self,
        tenant: &str,
        domain: &str,
        user_id: &str,
    ) -> Result<Option<String>, WorkflowError> {
        let url = self
            .upstream
            .url(&["api", "v1", "tenants", tenant, "users", user_id])?;
        let user: Option<UserResponse> =
            self.upstream.get_json(url, &[("domain", domain)]).await?;
        Ok(user.and_then(|u| u.group_id))
    }
}
