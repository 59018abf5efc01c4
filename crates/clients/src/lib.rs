//! HTTP clients for the services the approval engine depends on.
//!
//! Each client implements one collaborator trait from `ringi-core`:
//! - [`HttpGroupHierarchy`] for `GroupHierarchy`
//! - [`HttpUserDirectory`] for `UserDirectory`
//! - [`HttpBusinessData`] for `BusinessData`
//!
//! Transport and status failures surface as
//! `WorkflowError::UpstreamUnavailable`.

mod business;
mod error;
mod groups;
mod upstream;
mod users;

pub use business::HttpBusinessData;
pub use error::ClientError;
pub use groups::HttpGroupHierarchy;
pub use users::HttpUserDirectory;

use ringi_shared::UpstreamConfig;

/// The three upstream clients built from one config section.
#[derive(Debug, Clone)]
pub struct UpstreamClients {
    /// Group hierarchy client.
    pub groups: HttpGroupHierarchy,
    /// User directory client.
    pub users: HttpUserDirectory,
    /// Business-data client.
    pub business: HttpBusinessData,
}

impl UpstreamClients {
    /// Builds every client from `config`.
    ///
    /// # Errors
    ///
    /// Returns an error if a base URL is invalid or the HTTP client cannot
    /// be built.
    pub fn from_config(config: &UpstreamConfig) -> Result<Self, ClientError> {
        Ok(Self {
            groups: HttpGroupHierarchy::new(&config.group_url, config.timeout_secs)?,
            users: HttpUserDirectory::new(&config.user_url, config.timeout_secs)?,
            business: HttpBusinessData::new(&config.business_url, config.timeout_secs)?,
        })
    }
}
