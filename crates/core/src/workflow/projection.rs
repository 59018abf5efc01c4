//! Read-only status view of an instance.

use serde::Serialize;

use crate::workflow::types::{
    AUTO_APPROVED_COMMENT, ExampleInstance, InstanceStatus, ProcessStep, StepStatus,
};

/// What a requester may see about one instance.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StatusView {
    /// Instance status.
    pub approve_status: InstanceStatus,
    /// Applicant user id.
    pub applicant: String,
    /// Node the instance is at (pending) or ended on.
    pub current_node: Option<String>,
    /// Approver who decided the outcome.
    pub approver: Option<String>,
    /// Whether the requester may see the staged data.
    pub can_show: bool,
}

/// Projects an instance and its steps (newest first) for `user_id`.
#[must_use]
pub fn project(example: &ExampleInstance, steps: &[ProcessStep], user_id: &str) -> StatusView {
    let can_show = example.user_id == user_id || steps.iter().any(|s| s.user_id == user_id);

    let decisive = match example.status {
        InstanceStatus::Pending => steps.iter().find(|s| s.status == StepStatus::Pending),
        InstanceStatus::Approved => steps.iter().find(|s| s.comment != AUTO_APPROVED_COMMENT),
        InstanceStatus::Rejected => steps
            .iter()
            .find(|s| s.status == StepStatus::Rejected && !s.is_auto_resolved())
            .or_else(|| steps.iter().find(|s| s.status == StepStatus::Rejected)),
    };

    StatusView {
        approve_status: example.status,
        applicant: example.user_id.clone(),
        current_node: decisive.map(|s| s.current_node.clone()),
        approver: match example.status {
            InstanceStatus::Pending => None,
            _ => decisive.map(|s| s.user_id.clone()),
        },
        can_show,
    }
}
