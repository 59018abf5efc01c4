//! Group hierarchy client.

use async_trait::async_trait;
use serde::Deserialize;
use tracing::{debug, instrument};

use ringi_core::workflow::{GroupHierarchy, WorkflowError};

use crate::error::ClientError;
use crate::upstream::Upstream;

/// `GET /api/v1/tenants/{tenant}/groups/{group_id}` response.
#[derive(Debug, Deserialize)]
struct GroupResponse {
    #[serde(default)]
    parent_group_id: Option<String>,
}

/// Reads group parents from the manage service.
#[derive(Debug, Clone)]
pub struct HttpGroupHierarchy {
    upstream: Upstream,
}

impl HttpGroupHierarchy {
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
impl GroupHierarchy for HttpGroupHierarchy {
    #[instrument(skip(self))]
    async fn parent_group(
        &self,
        tenant: &str,
        group_id: &str,
    ) -> Result<Option<String>, WorkflowError> {
        let url = self
            .upstream
            .url(&["api", "v1", "tenants", tenant, "groups", group_id])?;
        let group: Option<GroupResponse> = self.upstream.get_json(url, &[]).await?;

        // An unknown group is treated as top-level.
        let parent = group.and_then(|g| g.parent_group_id);
        debug!(parent = ?parent, "Group parent fetched");
        Ok(parent)
    }
}
