//! Business-data client.
//!
//! The business-data service holds the staged change an instance gates.
//! It is told to commit the change on final approval and to discard it on
//! rejection.

use async_trait::async_trait;
use tracing::{info, instrument};

use ringi_core::workflow::{BusinessChange, BusinessData, WorkflowError};

use crate::error::ClientError;
use crate::upstream::Upstream;

/// Posts commit and discard notices to the business-data service.
#[derive(Debug, Clone)]
pub struct HttpBusinessData {
    upstream: Upstream,
}

impl HttpBusinessData {
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

    async fn send(
        &self,
        tenant: &str,
        verb: &str,
        change: &BusinessChange,
    ) -> Result<(), WorkflowError> {
        let url = self
            .upstream
            .url(&["api", "v1", "tenants", tenant, "changes", verb])?;
        self.upstream.post_json(url, change).await?;
        info!(tenant, ex_id = %change.ex_id, verb, "Business change notified");
        Ok(())
    }
}

#[async_trait]
impl BusinessData for HttpBusinessData {
    #[instrument(skip(self, change), fields(ex_id = %change.ex_id))]
    async fn commit(&self, tenant: &str, change: &BusinessChange) -> Result<(), WorkflowError> {
        self.send(tenant, "commit", change).await
    }

    #[instrument(skip(self, change), fields(ex_id = %change.ex_id))]
    async fn discard(&self, tenant: &str, change: &BusinessChange) -> Result<(), WorkflowError> {
        self.send(tenant, "discard", change).await
    }
}
