//! Workflow error types for approval processing.
//!
//! This module defines all error types that can occur while defining
//! workflows, resolving them and driving instances through approval.

use ringi_shared::AppError;
use thiserror::Error;

use crate::workflow::types::{InstanceStatus, StepStatus};

/// Errors that can occur during workflow operations.
#[derive(Debug, Error)]
pub enum WorkflowError {
    /// Workflow template not found.
    #[error("Workflow {0} not found")]
    WorkflowNotFound(String),

    /// Node not found within a workflow.
    #[error("Node {node_id} not found in workflow {wf_id}")]
    NodeNotFound {
        /// Owning workflow.
        wf_id: String,
        /// Missing node.
        node_id: String,
    },

    /// Instance not found.
    #[error("Example instance {0} not found")]
    ExampleNotFound(String),

    /// Process step not found.
    #[error("Process step {0} not found")]
    ProcessNotFound(String),

    /// The caller holds no pending step on the instance.
    #[error("User {user_id} has no pending step on instance {ex_id}")]
    NotAuthorized {
        /// The acting user.
        user_id: String,
        /// The instance.
        ex_id: String,
    },

    /// Attempted an invalid step status transition.
    #[error("Invalid step transition from {from} to {to}")]
    InvalidTransition {
        /// The current status.
        from: StepStatus,
        /// The attempted target status.
        to: StepStatus,
    },

    /// The instance already reached a terminal status.
    #[error("Instance {ex_id} is already {status}")]
    InstanceClosed {
        /// The instance.
        ex_id: String,
        /// Its terminal status.
        status: InstanceStatus,
    },

    /// The instance changed between reading it and applying a decision.
    #[error("Instance {0} changed concurrently, reload and retry")]
    StaleInstance(String),

    /// A collaborator (hierarchy, directory or business-data service) failed.
    #[error("Upstream service unavailable: {0}")]
    UpstreamUnavailable(String),

    /// The node graph or group hierarchy is malformed.
    #[error("Invalid graph: {0}")]
    InvalidGraph(String),

    /// Input validation failed.
    #[error("Validation error: {0}")]
    Validation(String),

    /// Database error.
    #[error("Database error: {0}")]
    Database(String),
}

impl WorkflowError {
    /// Returns the HTTP status code for this error.
    #[must_use]
    pub fn status_code(&self) -> u16 {
        match self {
            Self::Validation(_) | Self::InvalidGraph(_) => 400,

            Self::NotAuthorized { .. } => 403,

            Self::WorkflowNotFound(_)
            | Self::NodeNotFound { .. }
            | Self::ExampleNotFound(_)
            | Self::ProcessNotFound(_) => 404,

            Self::InvalidTransition { .. }
            | Self::InstanceClosed { .. }
            | Self::StaleInstance(_) => 409,

            Self::UpstreamUnavailable(_) => 503,

            Self::Database(_) => 500,
        }
    }

    /// Returns the error code for API responses.
    #[must_use]
    pub fn error_code(&self) -> &'static str {
        match self {
            Self::WorkflowNotFound(_) => "WORKFLOW_NOT_FOUND",
            Self::NodeNotFound { .. } => "NODE_NOT_FOUND",
            Self::ExampleNotFound(_) => "EXAMPLE_NOT_FOUND",
            Self::ProcessNotFound(_) => "PROCESS_NOT_FOUND",
            Self::NotAuthorized { .. } => "NOT_AUTHORIZED",
            Self::InvalidTransition { .. } => "INVALID_TRANSITION",
            Self::InstanceClosed { .. } => "INSTANCE_CLOSED",
            Self::StaleInstance(_) => "STALE_INSTANCE",
            Self::UpstreamUnavailable(_) => "UPSTREAM_UNAVAILABLE",
            Self::InvalidGraph(_) => "INVALID_GRAPH",
            Self::Validation(_) => "VALIDATION_ERROR",
            Self::Database(_) => "DATABASE_ERROR",
        }
    }
}

impl From<WorkflowError> for AppError {
    fn from(err: WorkflowError) -> Self {
        let msg = err.to_string();
        match err {
            WorkflowError::WorkflowNotFound(_)
            | WorkflowError::NodeNotFound { .. }
            | WorkflowError::ExampleNotFound(_)
            | WorkflowError::ProcessNotFound(_) => Self::NotFound(msg),
            WorkflowError::NotAuthorized { .. } => Self::Forbidden(msg),
            WorkflowError::InvalidTransition { .. }
            | WorkflowError::InstanceClosed { .. }
            | WorkflowError::StaleInstance(_) => Self::Conflict(msg),
            WorkflowError::UpstreamUnavailable(_) => Self::ExternalService(msg),
            WorkflowError::InvalidGraph(_) | WorkflowError::Validation(_) => Self::Validation(msg),
            WorkflowError::Database(_) => Self::Database(msg),
        }
    }
}
