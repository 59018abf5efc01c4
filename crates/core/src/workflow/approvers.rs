//! Turning a node's assignee specs into concrete approver ids.

use std::collections::HashSet;

use async_trait::async_trait;
use tracing::debug;

use crate::workflow::error::WorkflowError;
use crate::workflow::resolver::{GroupHierarchy, ROOT_GROUP};
use crate::workflow::types::{Node, WorkflowDefinition};

/// One entry of a node's assignee list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AssigneeSpec {
    /// `u_<userId>`: a named approver.
    User(String),
    /// `r_<roleId>`: holders of a role in a group.
    Role(String),
}

impl AssigneeSpec {
    /// Parses `u_<id>` or `r_<id>`.
    ///
    /// # Errors
    ///
    /// Returns `Validation` for any other shape.
    pub fn parse(raw: &str) -> Result<Self, WorkflowError> {
        match raw.split_once('_') {
            Some(("u", id)) if !id.is_empty() => Ok(Self::User(id.to_string())),
            Some(("r", id)) if !id.is_empty() => Ok(Self::Role(id.to_string())),
            _ => Err(WorkflowError::Validation(format!(
                "assignee {raw} must look like u_<user> or r_<role>"
            ))),
        }
    }
}

/// User lookups needed for role-based assignment.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait UserDirectory: Send + Sync {
    /// Users holding `role_id` in `group_id`.
    async fn users_with_role(
        &self,
        tenant: &str,
        domain: &str,
        group_id: &str,
        role_id: &str,
    ) -> Result<Vec<String>, WorkflowError>;

    /// The group a user belongs to, if any.
    async fn user_group(
        &self,
        tenant: &str,
        domain: &str,
        user_id: &str,
    ) -> Result<Option<String>, WorkflowError>;
}

/// Resolves approvers for a node.
pub struct ApproverResolver<'a> {
    users: &'a dyn UserDirectory,
    groups: &'a dyn GroupHierarchy,
    max_depth: usize,
}

impl<'a> ApproverResolver<'a> {
    /// Creates a resolver.
    #[must_use]
    pub fn new(
        users: &'a dyn UserDirectory,
        groups: &'a dyn GroupHierarchy,
        max_depth: usize,
    ) -> Self {
        Self {
            users,
            groups,
            max_depth,
        }
    }

    /// Approvers for `node`, de-duplicated in first-seen order, without
    /// the applicant.
    ///
    /// # Errors
    ///
    /// `Validation` for a malformed assignee, `UpstreamUnavailable` if a
    /// collaborator fails.
    pub async fn resolve(
        &self,
        tenant: &str,
        domain: &str,
        workflow: &WorkflowDefinition,
        node: &Node,
        applicant: &str,
    ) -> Result<Vec<String>, WorkflowError> {
        let mut approvers = Vec::new();
        let mut applicant_group: Option<Option<String>> = None;

        for raw in &node.assignees {
            match AssigneeSpec::parse(raw)? {
                AssigneeSpec::User(id) => approvers.push(id),
                AssigneeSpec::Role(role) => {
                    if let Some(group) = node.node_group_id.as_deref() {
                        approvers.extend(
                            self.users
                                .users_with_role(tenant, domain, group, &role)
                                .await?,
                        );
                        continue;
                    }

                    if applicant_group.is_none() {
                        applicant_group =
                            Some(self.users.user_group(tenant, domain, applicant).await?);
                    }
                    let start = applicant_group
                        .clone()
                        .flatten()
                        .unwrap_or_else(|| workflow.group_id.clone());
                    approvers.extend(
                        self.climb_for_role(tenant, domain, &start, &workflow.group_id, &role)
                            .await?,
                    );
                }
            }
        }

        let mut seen = HashSet::new();
        approvers.retain(|id| id != applicant && seen.insert(id.clone()));
        debug!(
            tenant,
            node_id = %node.node_id,
            count = approvers.len(),
            "Approvers resolved"
        );
        Ok(approvers)
    }

    /// Searches from `start` upward for the first group with holders of
    /// `role`, stopping at `ceiling` (inclusive) or the root.
    async fn climb_for_role(
        &self,
        tenant: &str,
        domain: &str,
        start: &str,
        ceiling: &str,
        role: &str,
    ) -> Result<Vec<String>, WorkflowError> {
        let mut group = start.to_string();
        for _ in 0..self.max_depth {
            let users = self
                .users
                .users_with_role(tenant, domain, &group, role)
                .await?;
            if !users.is_empty() || group == ceiling {
                return Ok(users);
            }
            match self.groups.parent_group(tenant, &group).await? {
                Some(parent) if parent != ROOT_GROUP && !parent.is_empty() => group = parent,
                _ => return Ok(Vec::new()),
            }
        }
        Err(WorkflowError::InvalidGraph(format!(
            "group hierarchy above {start} exceeds {} levels",
            self.max_depth
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::workflow::resolver::MockGroupHierarchy;
    use crate::workflow::types::{ActType, WorkflowType};
    use chrono::Utc;
    use mockall::predicate::eq;
    use std::collections::BTreeMap;

    fn workflow(group: &str) -> WorkflowDefinition {
        let now = Utc::now();
        WorkflowDefinition {
            wf_id: "wf".into(),
            wf_name: "apps.app.workflows.wf".into(),
            menu_name: "apps.app.workflows.menu_wf".into(),
            is_valid: true,
            group_id: group.into(),
            app_id: "app".into(),
            workflow_type: WorkflowType::NewItem,
            accept_or_dismiss: true,
            params: BTreeMap::new(),
            created_at: now,
            created_by: "admin".into(),
            updated_at: now,
            updated_by: "admin".into(),
        }
    }

    fn node(assignees: &[&str], group: Option<&str>) -> Node {
        let now = Utc::now();
        Node {
            node_id: "n1".into(),
            node_name: "N1".into(),
            wf_id: "wf".into(),
            prev_node: None,
            next_node: None,
            assignees: assignees.iter().map(|s| (*s).to_string()).collect(),
            act_type: ActType::Or,
            node_group_id: group.map(str::to_string),
            created_at: now,
            created_by: "admin".into(),
            updated_at: now,
            updated_by: "admin".into(),
        }
    }

    #[test]
    fn test_parse_assignee_spec() {
        assert_eq!(
            AssigneeSpec::parse("u_alice").unwrap(),
            AssigneeSpec::User("alice".into())
        );
        assert_eq!(
            AssigneeSpec::parse("r_manager_lvl2").unwrap(),
            AssigneeSpec::Role("manager_lvl2".into())
        );
        assert!(AssigneeSpec::parse("alice").is_err());
        assert!(AssigneeSpec::parse("x_alice").is_err());
        assert!(AssigneeSpec::parse("u_").is_err());
    }

    #[tokio::test]
    async fn test_explicit_users_deduplicated_and_applicant_removed() {
        let users = MockUserDirectory::new();
        let groups = MockGroupHierarchy::new();
        let resolver = ApproverResolver::new(&users, &groups, 8);

        let out = resolver
            .resolve(
                "t",
                "d",
                &workflow("g1"),
                &node(&["u_bob", "u_applicant", "u_carol", "u_bob"], None),
                "applicant",
            )
            .await
            .unwrap();
        assert_eq!(out, vec!["bob".to_string(), "carol".to_string()]);
    }

    #[tokio::test]
    async fn test_role_in_node_group() {
        let mut users = MockUserDirectory::new();
        users
            .expect_users_with_role()
            .with(eq("t"), eq("d"), eq("finance"), eq("manager"))
            .times(1)
            .returning(|_, _, _, _| Ok(vec!["m1".into(), "m2".into()]));
        let groups = MockGroupHierarchy::new();
        let resolver = ApproverResolver::new(&users, &groups, 8);

        let out = resolver
            .resolve(
                "t",
                "d",
                &workflow("g1"),
                &node(&["r_manager"], Some("finance")),
                "applicant",
            )
            .await
            .unwrap();
        assert_eq!(out, vec!["m1".to_string(), "m2".to_string()]);
    }

    #[tokio::test]
    async fn test_role_climbs_from_applicant_group_to_first_holder() {
        let mut users = MockUserDirectory::new();
        users
            .expect_user_group()
            .returning(|_, _, _| Ok(Some("team".into())));
        users
            .expect_users_with_role()
            .returning(|_, _, group, _| {
                Ok(if group == "dept" {
                    vec!["boss".into()]
                } else {
                    vec![]
                })
            });
        let mut groups = MockGroupHierarchy::new();
        groups
            .expect_parent_group()
            .with(eq("t"), eq("team"))
            .returning(|_, _| Ok(Some("dept".into())));

        let resolver = ApproverResolver::new(&users, &groups, 8);
        let out = resolver
            .resolve(
                "t",
                "d",
                &workflow("company"),
                &node(&["r_manager"], None),
                "applicant",
            )
            .await
            .unwrap();
        assert_eq!(out, vec!["boss".to_string()]);
    }

    #[tokio::test]
    async fn test_role_search_stops_at_workflow_group() {
        let mut users = MockUserDirectory::new();
        users
            .expect_user_group()
            .returning(|_, _, _| Ok(Some("dept".into())));
        users
            .expect_users_with_role()
            .times(1)
            .returning(|_, _, _, _| Ok(vec![]));
        // Never asked for the parent of the workflow's own group.
        let groups = MockGroupHierarchy::new();

        let resolver = ApproverResolver::new(&users, &groups, 8);
        let out = resolver
            .resolve(
                "t",
                "d",
                &workflow("dept"),
                &node(&["r_manager"], None),
                "applicant",
            )
            .await
            .unwrap();
        assert!(out.is_empty());
    }

    #[tokio::test]
    async fn test_directory_failure_propagates() {
        let mut users = MockUserDirectory::new();
        users
            .expect_users_with_role()
            .returning(|_, _, _, _| Err(WorkflowError::UpstreamUnavailable("down".into())));
        let groups = MockGroupHierarchy::new();
        let resolver = ApproverResolver::new(&users, &groups, 8);

        let err = resolver
            .resolve(
                "t",
                "d",
                &workflow("g1"),
                &node(&["r_manager"], Some("g1")),
                "applicant",
            )
            .await
            .unwrap_err();
        assert!(matches!(err, WorkflowError::UpstreamUnavailable(_)));
    }
}
