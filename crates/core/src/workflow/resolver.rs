//! Nearest-ancestor workflow resolution.
//!
//! Starting at the requesting group, each level is checked for valid
//! templates (matched directly or through a relation binding). The first
//! level with a match wins; otherwise the resolver climbs to the parent
//! group until the root sentinel is reached.
//!
//! The group hierarchy is expected to be a tree. The walk is bounded by
//! `max_depth` so a cycle surfaces as `InvalidGraph` instead of looping.

use std::collections::HashSet;

use async_trait::async_trait;
use ringi_shared::ResolutionPolicy;
use tracing::{debug, warn};

use crate::workflow::error::WorkflowError;
use crate::workflow::store::WorkflowStore;
use crate::workflow::types::{LevelQuery, RelationFilter, WorkflowDefinition, WorkflowFilter};

/// Parent id that terminates the walk.
pub const ROOT_GROUP: &str = "root";

/// Group tree lookups.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait GroupHierarchy: Send + Sync {
    /// Returns the parent of `group_id`; `None` or [`ROOT_GROUP`] at the top.
    async fn parent_group(
        &self,
        tenant: &str,
        group_id: &str,
    ) -> Result<Option<String>, WorkflowError>;
}

/// Business context a caller wants to resolve.
#[derive(Debug, Clone)]
pub struct ResolveQuery {
    /// Tenant discriminator.
    pub tenant: String,
    /// Requesting group.
    pub group_id: String,
    /// Application id.
    pub app_id: String,
    /// Target object id.
    pub object_id: String,
    /// Action; empty matches any.
    pub action: String,
}

/// Outcome of a successful lookup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Resolution {
    /// Templates found at the nearest level, newest first.
    Matched(Vec<WorkflowDefinition>),
    /// No level up to the root has a template; no approval is required.
    NotConfigured,
}

impl Resolution {
    /// Consumes the resolution into the matched templates.
    #[must_use]
    pub fn into_workflows(self) -> Vec<WorkflowDefinition> {
        match self {
            Self::Matched(wfs) => wfs,
            Self::NotConfigured => Vec::new(),
        }
    }
}

/// Walks the group hierarchy to find applicable templates.
pub struct WorkflowResolver<'a> {
    store: &'a dyn WorkflowStore,
    groups: &'a dyn GroupHierarchy,
    max_depth: usize,
}

impl<'a> WorkflowResolver<'a> {
    /// Creates a resolver.
    #[must_use]
    pub fn new(
        store: &'a dyn WorkflowStore,
        groups: &'a dyn GroupHierarchy,
        max_depth: usize,
    ) -> Self {
        Self {
            store,
            groups,
            max_depth,
        }
    }

    /// Resolves the nearest applicable templates.
    ///
    /// At most `max_depth` levels are checked.
    ///
    /// # Errors
    ///
    /// - `UpstreamUnavailable` if the group hierarchy fails
    /// - `Database` if the store fails
    /// - `InvalidGraph` if the hierarchy is deeper than `max_depth`
    pub async fn resolve(&self, query: &ResolveQuery) -> Result<Resolution, WorkflowError> {
        let mut group_id = query.group_id.clone();

        for depth in 0..self.max_depth {
            let level = LevelQuery {
                app_id: &query.app_id,
                object_id: &query.object_id,
                group_id: &group_id,
                action: &query.action,
            };
            let found = self.find_at_level(&query.tenant, &level).await?;
            if !found.is_empty() {
                debug!(
                    tenant = %query.tenant,
                    group_id = %group_id,
                    depth,
                    count = found.len(),
                    "Workflow resolved"
                );
                return Ok(Resolution::Matched(found));
            }

            match self.groups.parent_group(&query.tenant, &group_id).await? {
                Some(parent) if parent != ROOT_GROUP && !parent.is_empty() => group_id = parent,
                _ => return Ok(Resolution::NotConfigured),
            }
        }

        Err(WorkflowError::InvalidGraph(format!(
            "group hierarchy above {} exceeds {} levels",
            query.group_id, self.max_depth
        )))
    }

    /// Resolves and applies a failure policy.
    ///
    /// With `FailOpen` a lookup error is logged and reported as no templates.
    ///
    /// # Errors
    ///
    /// With `FailClosed`, any error from [`Self::resolve`].
    pub async fn resolve_with_policy(
        &self,
        query: &ResolveQuery,
        policy: ResolutionPolicy,
    ) -> Result<Vec<WorkflowDefinition>, WorkflowError> {
        match self.resolve(query).await {
            Ok(resolution) => Ok(resolution.into_workflows()),
            Err(e) if policy == ResolutionPolicy::FailOpen => {
                warn!(
                    tenant = %query.tenant,
                    group_id = %query.group_id,
                    app_id = %query.app_id,
                    error = %e,
                    "Workflow lookup failed, treating as not configured"
                );
                Ok(Vec::new())
            }
            Err(e) => Err(e),
        }
    }

    async fn find_at_level(
        &self,
        tenant: &str,
        level: &LevelQuery<'_>,
    ) -> Result<Vec<WorkflowDefinition>, WorkflowError> {
        let filter = WorkflowFilter {
            app_id: level.app_id.to_string(),
            is_valid: Some(true),
            group_id: Some(level.group_id.to_string()),
            object_id: Some(level.object_id.to_string()),
            action: (!level.action.is_empty()).then(|| level.action.to_string()),
        };
        let mut found: Vec<WorkflowDefinition> = self
            .store
            .find_workflows(tenant, &filter)
            .await?
            .into_iter()
            .filter(|wf| level.matches_workflow(wf))
            .collect();

        let bindings = self
            .store
            .find_relations(
                tenant,
                &RelationFilter {
                    app_id: level.app_id.to_string(),
                    object_id: Some(level.object_id.to_string()),
                    group_id: Some(level.group_id.to_string()),
                    workflow_id: None,
                    action: (!level.action.is_empty()).then(|| level.action.to_string()),
                },
            )
            .await?;

        let mut seen: HashSet<String> = found.iter().map(|wf| wf.wf_id.clone()).collect();
        for binding in bindings.iter().filter(|b| level.matches_binding(b)) {
            if !seen.insert(binding.workflow_id.clone()) {
                continue;
            }
            if let Some(wf) = self.store.find_workflow(tenant, &binding.workflow_id).await?
                && wf.is_valid
                && wf.app_id == level.app_id
            {
                found.push(wf);
            }
        }

        found.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(found)
    }
}
