//! Approval state machine with injected collaborators.
//!
//! Each operation loads persisted state, plans the change with
//! [`ApprovalPlan`] and applies the whole change as one [`Transition`].
//! A terminal outcome is reported to the business-data service from inside
//! that apply, so a failed notification leaves nothing persisted.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use ringi_shared::EngineConfig;
use serde::Serialize;
use tracing::{info, warn};
use uuid::Uuid;

use crate::workflow::approvers::{ApproverResolver, UserDirectory};
use crate::workflow::error::WorkflowError;
use crate::workflow::graph::NodeGraph;
use crate::workflow::projection::{StatusView, project};
use crate::workflow::resolver::{GroupHierarchy, Resolution, ResolveQuery, WorkflowResolver};
use crate::workflow::service::{ApprovalPlan, Outcome};
use crate::workflow::store::{TransitionHook, WorkflowStore};
use crate::workflow::types::{
    ExampleInstance, InstanceStatus, SYSTEM_ADMIT_COMMENT, SYSTEM_DISMISS_COMMENT, SYSTEM_USER,
    WorkflowDefinition,
};

/// The business change an instance gates.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BusinessChange {
    /// Workflow that gated the change.
    pub wf_id: String,
    /// Instance id, the reference the business side stored with its staged data.
    pub ex_id: String,
    /// Application id.
    pub app_id: String,
    /// Target object id.
    pub object_id: Option<String>,
    /// Business action.
    pub action: Option<String>,
    /// Applicant.
    pub applicant: String,
    /// User whose action ended the instance.
    pub actor: String,
}

/// The service holding staged business changes.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait BusinessData: Send + Sync {
    /// Applies the staged change after final approval.
    async fn commit(&self, tenant: &str, change: &BusinessChange) -> Result<(), WorkflowError>;

    /// Discards the staged change after rejection.
    async fn discard(&self, tenant: &str, change: &BusinessChange) -> Result<(), WorkflowError>;
}

/// Starting an instance.
#[derive(Debug, Clone)]
pub struct StartRequest {
    /// Workflow to run.
    pub wf_id: String,
    /// Applicant.
    pub applicant: String,
    /// Instance created by `add_example`.
    pub ex_id: String,
    /// Domain passed to the user directory.
    pub domain: String,
}

/// An approver's Admit or Dismiss.
#[derive(Debug, Clone)]
pub struct ApprovalAction {
    /// Instance.
    pub ex_id: String,
    /// Acting approver.
    pub user_id: String,
    /// Approver's comment.
    pub comment: String,
    /// Domain passed to the user directory when the next node opens.
    pub domain: String,
}

/// Drives instances through their workflow graph.
#[derive(Clone)]
pub struct ApprovalStateMachine {
    store: Arc<dyn WorkflowStore>,
    groups: Arc<dyn GroupHierarchy>,
    users: Arc<dyn UserDirectory>,
    business: Arc<dyn BusinessData>,
    engine: EngineConfig,
}

impl ApprovalStateMachine {
    /// Creates a state machine.
    #[must_use]
    pub fn new(
        store: Arc<dyn WorkflowStore>,
        groups: Arc<dyn GroupHierarchy>,
        users: Arc<dyn UserDirectory>,
        business: Arc<dyn BusinessData>,
        engine: EngineConfig,
    ) -> Self {
        Self {
            store,
            groups,
            users,
            business,
            engine,
        }
    }

    /// The store behind this machine.
    #[must_use]
    pub fn store(&self) -> Arc<dyn WorkflowStore> {
        Arc::clone(&self.store)
    }

    /// Engine settings in use.
    #[must_use]
    pub fn engine(&self) -> &EngineConfig {
        &self.engine
    }

    /// Resolves the nearest templates for a business context.
    pub async fn resolve(&self, query: &ResolveQuery) -> Result<Resolution, WorkflowError> {
        WorkflowResolver::new(
            self.store.as_ref(),
            self.groups.as_ref(),
            self.engine.max_group_depth,
        )
        .resolve(query)
        .await
    }

    /// Resolves templates applying the configured failure policy.
    pub async fn get_user_workflows(
        &self,
        query: &ResolveQuery,
    ) -> Result<Vec<WorkflowDefinition>, WorkflowError> {
        WorkflowResolver::new(
            self.store.as_ref(),
            self.groups.as_ref(),
            self.engine.max_group_depth,
        )
        .resolve_with_policy(query, self.engine.resolution_policy)
        .await
    }

    async fn load_workflow(
        &self,
        tenant: &str,
        wf_id: &str,
    ) -> Result<WorkflowDefinition, WorkflowError> {
        self.store
            .find_workflow(tenant, wf_id)
            .await?
            .ok_or_else(|| WorkflowError::WorkflowNotFound(wf_id.to_string()))
    }

    async fn load_example(
        &self,
        tenant: &str,
        ex_id: &str,
    ) -> Result<ExampleInstance, WorkflowError> {
        self.store
            .find_example(tenant, ex_id)
            .await?
            .ok_or_else(|| WorkflowError::ExampleNotFound(ex_id.to_string()))
    }

    /// Creates a pending instance of `wf_id` for `applicant`.
    pub async fn add_example(
        &self,
        tenant: &str,
        wf_id: &str,
        applicant: &str,
    ) -> Result<ExampleInstance, WorkflowError> {
        let workflow = self.load_workflow(tenant, wf_id).await?;
        let now = Utc::now();
        let example = ExampleInstance {
            ex_id: Uuid::new_v4().to_string(),
            wf_id: workflow.wf_id,
            ex_name: format!("{}_{applicant}", workflow.wf_name),
            user_id: applicant.to_string(),
            status: InstanceStatus::Pending,
            created_at: now,
            created_by: applicant.to_string(),
            updated_at: now,
            updated_by: applicant.to_string(),
        };
        self.store.insert_example(tenant, &example).await?;
        info!(tenant, wf_id, ex_id = %example.ex_id, "Example instance created");
        Ok(example)
    }

    /// Opens the start node of a fresh instance.
    pub async fn start_example_instance(
        &self,
        tenant: &str,
        request: &StartRequest,
    ) -> Result<InstanceStatus, WorkflowError> {
        let example = self.load_example(tenant, &request.ex_id).await?;
        if example.wf_id != request.wf_id {
            return Err(WorkflowError::Validation(format!(
                "instance {} belongs to workflow {}",
                example.ex_id, example.wf_id
            )));
        }
        let steps = self.store.find_processes(tenant, &example.ex_id).await?;
        if !steps.is_empty() {
            return Err(WorkflowError::Validation(format!(
                "instance {} is already started",
                example.ex_id
            )));
        }

        let workflow = self.load_workflow(tenant, &request.wf_id).await?;
        let graph = NodeGraph::new(self.store.find_nodes(tenant, &workflow.wf_id).await?)?;
        let mut plan = ApprovalPlan::new(
            example,
            steps,
            &request.applicant,
            Utc::now(),
            self.engine.step_expiry_days,
        )?;

        let outcome = Outcome::Advance(graph.start().node_id.clone());
        self.drive(
            tenant,
            &request.domain,
            &workflow,
            &graph,
            &mut plan,
            outcome,
        )
        .await?;
        self.settle(tenant, &workflow, plan, &request.applicant).await
    }

    /// Admits the caller's pending step.
    pub async fn admit(
        &self,
        tenant: &str,
        action: &ApprovalAction,
    ) -> Result<InstanceStatus, WorkflowError> {
        let (workflow, graph, mut plan) = self.prepare(tenant, action).await?;
        let outcome = plan.admit(&action.user_id, &action.comment, &graph)?;
        self.drive(tenant, &action.domain, &workflow, &graph, &mut plan, outcome)
            .await?;
        self.settle(tenant, &workflow, plan, &action.user_id).await
    }

    /// Dismisses the caller's pending step, rejecting the whole instance.
    pub async fn dismiss(
        &self,
        tenant: &str,
        action: &ApprovalAction,
    ) -> Result<InstanceStatus, WorkflowError> {
        let (workflow, _, mut plan) = self.prepare(tenant, action).await?;
        plan.dismiss(&action.user_id, &action.comment)?;
        self.settle(tenant, &workflow, plan, &action.user_id).await
    }

    /// Status view of an instance for `user_id`.
    pub async fn get_status(
        &self,
        tenant: &str,
        ex_id: &str,
        user_id: &str,
    ) -> Result<StatusView, WorkflowError> {
        let example = self.load_example(tenant, ex_id).await?;
        let steps = self.store.find_processes(tenant, ex_id).await?;
        Ok(project(&example, &steps, user_id))
    }

    async fn prepare(
        &self,
        tenant: &str,
        action: &ApprovalAction,
    ) -> Result<(WorkflowDefinition, NodeGraph, ApprovalPlan), WorkflowError> {
        let example = self.load_example(tenant, &action.ex_id).await?;
        let workflow = self.load_workflow(tenant, &example.wf_id).await?;
        let graph = NodeGraph::new(self.store.find_nodes(tenant, &workflow.wf_id).await?)?;
        let steps = self.store.find_processes(tenant, &example.ex_id).await?;
        let plan = ApprovalPlan::new(
            example,
            steps,
            &action.user_id,
            Utc::now(),
            self.engine.step_expiry_days,
        )?;
        Ok((workflow, graph, plan))
    }

    /// Opens nodes until one waits on a human approver or the instance ends.
    /// A node without approvers gets a `system` step that is admitted or
    /// dismissed according to `accept_or_dismiss`.
    async fn drive(
        &self,
        tenant: &str,
        domain: &str,
        workflow: &WorkflowDefinition,
        graph: &NodeGraph,
        plan: &mut ApprovalPlan,
        mut outcome: Outcome,
    ) -> Result<(), WorkflowError> {
        let approvers = ApproverResolver::new(
            self.users.as_ref(),
            self.groups.as_ref(),
            self.engine.max_group_depth,
        );
        while let Outcome::Advance(node_id) = outcome {
            let node = graph
                .get(&node_id)
                .ok_or_else(|| WorkflowError::NodeNotFound {
                    wf_id: workflow.wf_id.clone(),
                    node_id: node_id.clone(),
                })?;
            let users = approvers
                .resolve(tenant, domain, workflow, node, plan.applicant())
                .await?;

            if !users.is_empty() {
                plan.open_node(&node_id, &users);
                break;
            }

            warn!(
                tenant,
                wf_id = %workflow.wf_id,
                node_id = %node_id,
                accept = workflow.accept_or_dismiss,
                "No approver for node, system decides"
            );
            plan.open_node(&node_id, &[SYSTEM_USER.to_string()]);
            outcome = if workflow.accept_or_dismiss {
                plan.admit(SYSTEM_USER, SYSTEM_ADMIT_COMMENT, graph)?
            } else {
                plan.dismiss(SYSTEM_USER, SYSTEM_DISMISS_COMMENT)?
            };
        }
        Ok(())
    }

    /// Persists the plan, notifying the business side of a terminal outcome
    /// while the instance is still locked.
    async fn settle(
        &self,
        tenant: &str,
        workflow: &WorkflowDefinition,
        plan: ApprovalPlan,
        actor: &str,
    ) -> Result<InstanceStatus, WorkflowError> {
        let status = plan.status();
        let applicant = plan.applicant().to_string();
        let transition = plan.into_transition();

        let notify = transition.instance_status.map(|final_status| Notify {
            business: self.business.as_ref(),
            tenant,
            status: final_status,
            change: BusinessChange {
                wf_id: workflow.wf_id.clone(),
                ex_id: transition.ex_id.clone(),
                app_id: workflow.app_id.clone(),
                object_id: workflow.datastore().map(str::to_string),
                action: workflow.action().map(str::to_string),
                applicant,
                actor: actor.to_string(),
            },
        });

        if !transition.is_empty() {
            let hook = notify.as_ref().map(|n| n as &dyn TransitionHook);
            self.store.apply(tenant, &transition, hook).await?;
        }
        info!(
            tenant,
            ex_id = %transition.ex_id,
            status = %status,
            updated = transition.step_updates.len(),
            created = transition.new_steps.len(),
            "Transition applied"
        );
        Ok(status)
    }
}

/// Reports a terminal outcome to the business side.
struct Notify<'a> {
    business: &'a dyn BusinessData,
    tenant: &'a str,
    status: InstanceStatus,
    change: BusinessChange,
}

#[async_trait]
impl TransitionHook for Notify<'_> {
    async fn before_commit(&self) -> Result<(), WorkflowError> {
        let notified = match self.status {
            InstanceStatus::Approved => self.business.commit(self.tenant, &self.change).await,
            InstanceStatus::Rejected => self.business.discard(self.tenant, &self.change).await,
            InstanceStatus::Pending => Ok(()),
        };
        notified.map_err(|e| {
            warn!(
                tenant = self.tenant,
                ex_id = %self.change.ex_id,
                error = %e,
                "Business notification failed"
            );
            match e {
                WorkflowError::UpstreamUnavailable(_) => e,
                other => WorkflowError::UpstreamUnavailable(other.to_string()),
            }
        })
    }
}
