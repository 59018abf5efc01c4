//! Workflow domain types for approval processing.
//!
//! This module defines the records the engine persists (templates, nodes,
//! bindings, instances and steps) and the status types that drive them.

use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use crate::workflow::error::WorkflowError;

/// Approver id used when the engine acts on its own behalf.
pub const SYSTEM_USER: &str = "system";

/// Comment written on sibling steps resolved by another approver's Admit.
pub const AUTO_APPROVED_COMMENT: &str = "Approved by other approvers";

/// Comment written on sibling steps resolved by another approver's Dismiss.
pub const AUTO_REJECTED_COMMENT: &str = "Rejected by other approvers";

/// Comment used when a node has no approvers and the policy admits.
pub const SYSTEM_ADMIT_COMMENT: &str =
    "No approver is assigned in this organization; the system approved the request.";

/// Comment used when a node has no approvers and the policy dismisses.
pub const SYSTEM_DISMISS_COMMENT: &str =
    "No approver is assigned in this organization; the system rejected the request.";

/// Parameter key holding the business action a workflow gates.
pub const PARAM_ACTION: &str = "action";

/// Parameter key holding the comma-separated fields under change control.
pub const PARAM_FIELDS: &str = "fields";

/// Parameter key holding the target object (datastore) id.
pub const PARAM_DATASTORE: &str = "datastore";

/// Status of an approval instance.
///
/// - Pending → Approved (last node admitted)
/// - Pending → Rejected (any dismiss)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InstanceStatus {
    /// Waiting for approvers.
    Pending,
    /// Every node admitted; the staged change is committed.
    Approved,
    /// Dismissed; the staged change is discarded.
    Rejected,
}

impl InstanceStatus {
    /// Returns the stored integer code.
    #[must_use]
    pub const fn code(self) -> i16 {
        match self {
            Self::Pending => 1,
            Self::Approved => 2,
            Self::Rejected => 3,
        }
    }

    /// Parses a stored integer code. `0` is read as pending for legacy rows.
    #[must_use]
    pub const fn from_code(code: i16) -> Option<Self> {
        match code {
            0 | 1 => Some(Self::Pending),
            2 => Some(Self::Approved),
            3 => Some(Self::Rejected),
            _ => None,
        }
    }

    /// Returns the string representation of the status.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Approved => "approved",
            Self::Rejected => "rejected",
        }
    }

    /// Returns true once no further approval can happen.
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Approved | Self::Rejected)
    }

    /// Returns true if moving to `next` is allowed.
    #[must_use]
    pub const fn can_transition_to(self, next: Self) -> bool {
        matches!(
            (self, next),
            (Self::Pending, Self::Pending | Self::Approved | Self::Rejected)
        )
    }
}

impl fmt::Display for InstanceStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Status of one approver's step.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StepStatus {
    /// Waiting for this approver.
    Pending,
    /// Admitted (by the approver or resolved by a sibling).
    Approved,
    /// Dismissed (by the approver or resolved by a sibling).
    Rejected,
}

impl StepStatus {
    /// Returns the stored integer code.
    #[must_use]
    pub const fn code(self) -> i16 {
        match self {
            Self::Pending => 0,
            Self::Approved => 1,
            Self::Rejected => 2,
        }
    }

    /// Parses a stored integer code.
    #[must_use]
    pub const fn from_code(code: i16) -> Option<Self> {
        match code {
            0 => Some(Self::Pending),
            1 => Some(Self::Approved),
            2 => Some(Self::Rejected),
            _ => None,
        }
    }

    /// Returns the string representation of the status.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Approved => "approved",
            Self::Rejected => "rejected",
        }
    }

    /// Steps only ever leave `Pending`; they never return to it.
    #[must_use]
    pub const fn can_transition_to(self, next: Self) -> bool {
        matches!(
            (self, next),
            (Self::Pending, Self::Approved | Self::Rejected)
        )
    }
}

impl fmt::Display for StepStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Business action a workflow template gates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum WorkflowType {
    /// A new item is registered.
    NewItem,
    /// Item information changes.
    InfoChange,
    /// Debt figures change.
    DebtChange,
    /// A contract is cancelled midway.
    MidwayCancel,
    /// A contract expires.
    ContractExpire,
}

impl WorkflowType {
    /// Returns the string representation of the type.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::NewItem => "new-item",
            Self::InfoChange => "info-change",
            Self::DebtChange => "debt-change",
            Self::MidwayCancel => "midway-cancel",
            Self::ContractExpire => "contract-expire",
        }
    }

    /// Parses a type from a string.
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "new-item" => Some(Self::NewItem),
            "info-change" => Some(Self::InfoChange),
            "debt-change" => Some(Self::DebtChange),
            "midway-cancel" => Some(Self::MidwayCancel),
            "contract-expire" => Some(Self::ContractExpire),
            _ => None,
        }
    }
}

impl fmt::Display for WorkflowType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// How a node with several assignees completes.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ActType {
    /// First responder: one admit completes the node.
    #[default]
    Or,
    /// Unanimous: every assignee must admit.
    And,
}

impl ActType {
    /// Returns the string representation.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Or => "or",
            Self::And => "and",
        }
    }

    /// Parses an act type. Anything other than `or` is unanimous.
    #[must_use]
    pub fn parse(s: &str) -> Self {
        if s.eq_ignore_ascii_case("or") {
            Self::Or
        } else {
            Self::And
        }
    }
}

/// Position of a node in its graph.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum NodeKind {
    /// The single node without a predecessor.
    Start,
    /// A node with both a predecessor and a successor.
    Approval,
    /// A node without a successor.
    End,
}

/// An approval template for one business action.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkflowDefinition {
    /// Generated identifier.
    pub wf_id: String,
    /// Display name key.
    pub wf_name: String,
    /// Menu name key.
    pub menu_name: String,
    /// Only valid templates take part in resolution.
    pub is_valid: bool,
    /// Owning group.
    pub group_id: String,
    /// Owning application.
    pub app_id: String,
    /// Business action type.
    pub workflow_type: WorkflowType,
    /// Whether a node without approvers is admitted (true) or dismissed (false).
    pub accept_or_dismiss: bool,
    /// Free-form parameters (`action`, `fields`, `datastore`, ...).
    pub params: BTreeMap<String, String>,
    /// Creation time.
    pub created_at: DateTime<Utc>,
    /// Creator.
    pub created_by: String,
    /// Last update time.
    pub updated_at: DateTime<Utc>,
    /// Last updater.
    pub updated_by: String,
}

impl WorkflowDefinition {
    /// Builds the display name key for a new workflow.
    #[must_use]
    pub fn display_name(app_id: &str, wf_id: &str) -> String {
        format!("apps.{app_id}.workflows.{wf_id}")
    }

    /// Builds the menu name key for a new workflow.
    #[must_use]
    pub fn menu_key(app_id: &str, wf_id: &str) -> String {
        format!("apps.{app_id}.workflows.menu_{wf_id}")
    }

    /// The gated action, if configured.
    #[must_use]
    pub fn action(&self) -> Option<&str> {
        self.params.get(PARAM_ACTION).map(String::as_str)
    }

    /// The target object id, if configured.
    #[must_use]
    pub fn datastore(&self) -> Option<&str> {
        self.params.get(PARAM_DATASTORE).map(String::as_str)
    }

    /// Fields under change control, split from the `fields` parameter.
    #[must_use]
    pub fn change_fields(&self) -> Vec<&str> {
        self.params
            .get(PARAM_FIELDS)
            .map(|f| {
                f.split(',')
                    .map(str::trim)
                    .filter(|s| !s.is_empty())
                    .collect()
            })
            .unwrap_or_default()
    }
}

/// One step of a workflow's approval graph.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Node {
    /// Author-supplied id, unique within the workflow.
    pub node_id: String,
    /// Display name.
    pub node_name: String,
    /// Owning workflow.
    pub wf_id: String,
    /// Predecessor; `None` for the start node.
    pub prev_node: Option<String>,
    /// Successor; `None` for a terminal node.
    pub next_node: Option<String>,
    /// Assignee specs (`u_<user>` or `r_<role>`).
    pub assignees: Vec<String>,
    /// Completion rule for several assignees.
    pub act_type: ActType,
    /// Group whose role holders approve; `None` searches from the applicant's group.
    pub node_group_id: Option<String>,
    /// Creation time.
    pub created_at: DateTime<Utc>,
    /// Creator.
    pub created_by: String,
    /// Last update time.
    pub updated_at: DateTime<Utc>,
    /// Last updater.
    pub updated_by: String,
}

/// Normalizes a stored link: empty and the legacy `"0"` mean no link.
#[must_use]
pub fn normalize_link(link: Option<String>) -> Option<String> {
    link.filter(|l| !l.is_empty() && l != "0")
}

/// Lookup key mapping a business context to a workflow.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RelationBinding {
    /// Application id.
    pub app_id: String,
    /// Target object (datastore) id.
    pub object_id: String,
    /// Group id.
    pub group_id: String,
    /// Bound workflow.
    pub workflow_id: String,
    /// Business action.
    pub action: String,
}

/// One running approval for one business change.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExampleInstance {
    /// Generated identifier.
    pub ex_id: String,
    /// Workflow being executed.
    pub wf_id: String,
    /// Human-readable name.
    pub ex_name: String,
    /// Applicant.
    pub user_id: String,
    /// Current status.
    pub status: InstanceStatus,
    /// Creation time.
    pub created_at: DateTime<Utc>,
    /// Creator.
    pub created_by: String,
    /// Last update time.
    pub updated_at: DateTime<Utc>,
    /// Last updater.
    pub updated_by: String,
}

/// One approver's task within an instance.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProcessStep {
    /// Generated identifier.
    pub pro_id: String,
    /// Owning instance.
    pub ex_id: String,
    /// Node this step belongs to.
    pub current_node: String,
    /// Assigned approver.
    pub user_id: String,
    /// Advisory deadline; not enforced by the engine.
    pub expire_date: NaiveDate,
    /// Approver's comment or a marker comment.
    pub comment: String,
    /// Current status.
    pub status: StepStatus,
    /// Creation time.
    pub created_at: DateTime<Utc>,
    /// Creator.
    pub created_by: String,
    /// Last update time.
    pub updated_at: DateTime<Utc>,
    /// Last updater.
    pub updated_by: String,
}

impl ProcessStep {
    /// Returns true if the step was resolved by another approver's action.
    #[must_use]
    pub fn is_auto_resolved(&self) -> bool {
        self.comment == AUTO_APPROVED_COMMENT || self.comment == AUTO_REJECTED_COMMENT
    }
}

/// Input for creating a workflow template.
#[derive(Debug, Clone)]
pub struct CreateWorkflowInput {
    /// Owning group.
    pub group_id: String,
    /// Owning application.
    pub app_id: String,
    /// Business action type.
    pub workflow_type: WorkflowType,
    /// Validity flag.
    pub is_valid: bool,
    /// No-approver policy.
    pub accept_or_dismiss: bool,
    /// Parameters.
    pub params: BTreeMap<String, String>,
    /// Acting user.
    pub writer: String,
}

/// Input for updating a workflow template. Only set fields change.
#[derive(Debug, Clone, Default)]
pub struct UpdateWorkflowInput {
    /// New validity flag.
    pub is_valid: Option<bool>,
    /// New no-approver policy.
    pub accept_or_dismiss: Option<bool>,
    /// New `fields` parameter.
    pub fields: Option<String>,
    /// Acting user.
    pub writer: String,
}

/// Filter for listing workflow templates.
#[derive(Debug, Clone, Default)]
pub struct WorkflowFilter {
    /// Application id (required by callers, empty matches none).
    pub app_id: String,
    /// Validity flag.
    pub is_valid: Option<bool>,
    /// Owning group.
    pub group_id: Option<String>,
    /// `params.datastore` value.
    pub object_id: Option<String>,
    /// `params.action` value.
    pub action: Option<String>,
}

impl WorkflowFilter {
    /// Returns true if `wf` passes the filter.
    #[must_use]
    pub fn matches(&self, wf: &WorkflowDefinition) -> bool {
        wf.app_id == self.app_id
            && self.is_valid.is_none_or(|v| wf.is_valid == v)
            && self.group_id.as_deref().is_none_or(|g| wf.group_id == g)
            && self
                .object_id
                .as_deref()
                .is_none_or(|o| wf.datastore() == Some(o))
            && self
                .action
                .as_deref()
                .is_none_or(|a| wf.action() == Some(a))
    }
}

/// Filter for relation bindings. Unset fields match anything.
#[derive(Debug, Clone, Default)]
pub struct RelationFilter {
    /// Application id (always matched).
    pub app_id: String,
    /// Target object id.
    pub object_id: Option<String>,
    /// Group id.
    pub group_id: Option<String>,
    /// Workflow id.
    pub workflow_id: Option<String>,
    /// Action.
    pub action: Option<String>,
}

impl RelationFilter {
    /// Returns true if `rel` passes the filter.
    #[must_use]
    pub fn matches(&self, rel: &RelationBinding) -> bool {
        rel.app_id == self.app_id
            && self.object_id.as_deref().is_none_or(|o| rel.object_id == o)
            && self.group_id.as_deref().is_none_or(|g| rel.group_id == g)
            && self
                .workflow_id
                .as_deref()
                .is_none_or(|w| rel.workflow_id == w)
            && self.action.as_deref().is_none_or(|a| rel.action == a)
    }
}

/// One level of workflow resolution.
#[derive(Debug, Clone, Copy)]
pub struct LevelQuery<'a> {
    /// Application id.
    pub app_id: &'a str,
    /// Target object id.
    pub object_id: &'a str,
    /// Group at this level.
    pub group_id: &'a str,
    /// Action; empty matches any.
    pub action: &'a str,
}

impl LevelQuery<'_> {
    /// Returns true if a valid template directly matches this level.
    #[must_use]
    pub fn matches_workflow(&self, wf: &WorkflowDefinition) -> bool {
        wf.is_valid
            && wf.app_id == self.app_id
            && wf.group_id == self.group_id
            && wf.datastore() == Some(self.object_id)
            && (self.action.is_empty() || wf.action() == Some(self.action))
    }

    /// Returns true if a binding applies at this level.
    #[must_use]
    pub fn matches_binding(&self, rel: &RelationBinding) -> bool {
        rel.app_id == self.app_id
            && rel.object_id == self.object_id
            && rel.group_id == self.group_id
            && (self.action.is_empty() || rel.action == self.action)
    }
}

/// Status change for one existing step.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StepUpdate {
    /// Step to change.
    pub pro_id: String,
    /// New status.
    pub status: StepStatus,
    /// New comment.
    pub comment: String,
    /// Acting user.
    pub writer: String,
}

/// Every write produced by one Admit, Dismiss or start, applied atomically.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Transition {
    /// Instance being advanced.
    pub ex_id: String,
    /// Changes to existing steps, in order.
    pub step_updates: Vec<StepUpdate>,
    /// Steps to insert, in order.
    pub new_steps: Vec<ProcessStep>,
    /// New instance status, if it changes.
    pub instance_status: Option<InstanceStatus>,
    /// Acting user recorded on the instance.
    pub writer: String,
    /// Instance status the transition was planned from.
    pub read_status: InstanceStatus,
    /// Every stored step `(pro_id, status)` the transition was planned from.
    pub read_steps: Vec<(String, StepStatus)>,
}

impl Transition {
    /// Returns true if nothing would be written.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.step_updates.is_empty() && self.new_steps.is_empty() && self.instance_status.is_none()
    }

    /// Checks that the stored instance still matches what was planned from.
    ///
    /// # Errors
    ///
    /// - `InstanceClosed` if the instance became terminal
    /// - `StaleInstance` if its status or any of its steps changed
    pub fn check_current(
        &self,
        status: InstanceStatus,
        steps: &[ProcessStep],
    ) -> Result<(), WorkflowError> {
        if status != self.read_status {
            if status.is_terminal() {
                return Err(WorkflowError::InstanceClosed {
                    ex_id: self.ex_id.clone(),
                    status,
                });
            }
            return Err(WorkflowError::StaleInstance(self.ex_id.clone()));
        }

        let mut stored: Vec<(&str, i16)> = steps
            .iter()
            .map(|s| (s.pro_id.as_str(), s.status.code()))
            .collect();
        let mut read: Vec<(&str, i16)> = self
            .read_steps
            .iter()
            .map(|(id, st)| (id.as_str(), st.code()))
            .collect();
        stored.sort_unstable();
        read.sort_unstable();
        if stored != read {
            return Err(WorkflowError::StaleInstance(self.ex_id.clone()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case(InstanceStatus::Pending, 1)]
    #[case(InstanceStatus::Approved, 2)]
    #[case(InstanceStatus::Rejected, 3)]
    fn test_instance_status_codes(#[case] status: InstanceStatus, #[case] code: i16) {
        assert_eq!(status.code(), code);
        assert_eq!(InstanceStatus::from_code(code), Some(status));
    }

    #[test]
    fn test_instance_status_legacy_zero_is_pending() {
        assert_eq!(InstanceStatus::from_code(0), Some(InstanceStatus::Pending));
        assert_eq!(InstanceStatus::from_code(9), None);
    }

    #[rstest]
    #[case(StepStatus::Pending, 0)]
    #[case(StepStatus::Approved, 1)]
    #[case(StepStatus::Rejected, 2)]
    fn test_step_status_codes(#[case] status: StepStatus, #[case] code: i16) {
        assert_eq!(status.code(), code);
        assert_eq!(StepStatus::from_code(code), Some(status));
    }

    #[test]
    fn test_step_status_never_returns_to_pending() {
        assert!(StepStatus::Pending.can_transition_to(StepStatus::Approved));
        assert!(StepStatus::Pending.can_transition_to(StepStatus::Rejected));
        assert!(!StepStatus::Approved.can_transition_to(StepStatus::Pending));
        assert!(!StepStatus::Rejected.can_transition_to(StepStatus::Pending));
        assert!(!StepStatus::Approved.can_transition_to(StepStatus::Rejected));
        assert!(!StepStatus::Pending.can_transition_to(StepStatus::Pending));
    }

    #[test]
    fn test_instance_terminal_states_are_final() {
        assert!(!InstanceStatus::Approved.can_transition_to(InstanceStatus::Pending));
        assert!(!InstanceStatus::Rejected.can_transition_to(InstanceStatus::Approved));
        assert!(InstanceStatus::Pending.can_transition_to(InstanceStatus::Rejected));
    }

    #[test]
    fn test_workflow_type_parse() {
        assert_eq!(WorkflowType::parse("new-item"), Some(WorkflowType::NewItem));
        assert_eq!(
            WorkflowType::parse("CONTRACT-EXPIRE"),
            Some(WorkflowType::ContractExpire)
        );
        assert_eq!(WorkflowType::parse("unknown"), None);
        assert_eq!(WorkflowType::DebtChange.to_string(), "debt-change");
    }

    #[test]
    fn test_act_type_parse() {
        assert_eq!(ActType::parse("or"), ActType::Or);
        assert_eq!(ActType::parse(""), ActType::And);
        assert_eq!(ActType::parse("and"), ActType::And);
        assert_eq!(ActType::parse("all"), ActType::And);
    }

    #[test]
    fn test_normalize_link() {
        assert_eq!(normalize_link(Some("0".into())), None);
        assert_eq!(normalize_link(Some(String::new())), None);
        assert_eq!(normalize_link(None), None);
        assert_eq!(normalize_link(Some("n2".into())), Some("n2".into()));
    }

    #[test]
    fn test_change_fields_split() {
        let now = Utc::now();
        let mut params = BTreeMap::new();
        params.insert(PARAM_FIELDS.to_string(), "amount, rate,,term ".to_string());
        let wf = WorkflowDefinition {
            wf_id: "w".into(),
            wf_name: WorkflowDefinition::display_name("app", "w"),
            menu_name: WorkflowDefinition::menu_key("app", "w"),
            is_valid: true,
            group_id: "g".into(),
            app_id: "app".into(),
            workflow_type: WorkflowType::InfoChange,
            accept_or_dismiss: true,
            params,
            created_at: now,
            created_by: "admin".into(),
            updated_at: now,
            updated_by: "admin".into(),
        };
        assert_eq!(wf.change_fields(), vec!["amount", "rate", "term"]);
        assert_eq!(wf.wf_name, "apps.app.workflows.w");
        assert_eq!(wf.menu_name, "apps.app.workflows.menu_w");
        assert_eq!(wf.action(), None);
    }
}
