//! Administrative CRUD over templates, graphs, bindings, instances and steps.
//!
//! Record construction (ids, display names, audit fields) and write-time
//! validation live here; persistence is delegated to [`WorkflowStore`].

use std::sync::Arc;

use chrono::{NaiveDate, Utc};
use tracing::info;
use uuid::Uuid;

use crate::workflow::approvers::AssigneeSpec;
use crate::workflow::error::WorkflowError;
use crate::workflow::graph::NodeGraph;
use crate::workflow::store::WorkflowStore;
use crate::workflow::types::{
    ActType, CreateWorkflowInput, ExampleInstance, InstanceStatus, Node, PARAM_FIELDS,
    ProcessStep, RelationBinding, RelationFilter, StepStatus, StepUpdate, UpdateWorkflowInput,
    WorkflowDefinition, WorkflowFilter, normalize_link,
};

/// Author-supplied node fields.
#[derive(Debug, Clone)]
pub struct NodeInput {
    /// Id unique within the workflow.
    pub node_id: String,
    /// Display name.
    pub node_name: String,
    /// Predecessor id; empty for the start node.
    pub prev_node: Option<String>,
    /// Successor id; empty or `"0"` for a terminal node.
    pub next_node: Option<String>,
    /// Assignee specs.
    pub assignees: Vec<String>,
    /// Completion rule.
    pub act_type: ActType,
    /// Group whose role holders approve.
    pub node_group_id: Option<String>,
}

/// Fields for a manually created step.
#[derive(Debug, Clone)]
pub struct ProcessInput {
    /// Owning instance.
    pub ex_id: String,
    /// Node id.
    pub current_node: String,
    /// Approver.
    pub user_id: String,
    /// Advisory deadline.
    pub expire_date: NaiveDate,
    /// Comment.
    pub comment: String,
}

/// CRUD facade over a [`WorkflowStore`].
#[derive(Clone)]
pub struct WorkflowCatalog {
    store: Arc<dyn WorkflowStore>,
}

impl WorkflowCatalog {
    /// Creates a catalog.
    #[must_use]
    pub fn new(store: Arc<dyn WorkflowStore>) -> Self {
        Self { store }
    }

    // ========================================================================
    // Workflows
    // ========================================================================

    /// Lists templates, newest first.
    pub async fn find_workflows(
        &self,
        tenant: &str,
        filter: &WorkflowFilter,
    ) -> Result<Vec<WorkflowDefinition>, WorkflowError> {
        self.store.find_workflows(tenant, filter).await
    }

    /// Finds one template.
    pub async fn find_workflow(
        &self,
        tenant: &str,
        wf_id: &str,
    ) -> Result<WorkflowDefinition, WorkflowError> {
        self.store
            .find_workflow(tenant, wf_id)
            .await?
            .ok_or_else(|| WorkflowError::WorkflowNotFound(wf_id.to_string()))
    }

    /// Creates a template and returns it.
    pub async fn add_workflow(
        &self,
        tenant: &str,
        input: CreateWorkflowInput,
    ) -> Result<WorkflowDefinition, WorkflowError> {
        if input.app_id.is_empty() || input.group_id.is_empty() {
            return Err(WorkflowError::Validation(
                "app_id and group_id are required".to_string(),
            ));
        }
        let wf_id = Uuid::new_v4().to_string();
        let now = Utc::now();
        let workflow = WorkflowDefinition {
            wf_name: WorkflowDefinition::display_name(&input.app_id, &wf_id),
            menu_name: WorkflowDefinition::menu_key(&input.app_id, &wf_id),
            wf_id,
            is_valid: input.is_valid,
            group_id: input.group_id,
            app_id: input.app_id,
            workflow_type: input.workflow_type,
            accept_or_dismiss: input.accept_or_dismiss,
            params: input.params,
            created_at: now,
            created_by: input.writer.clone(),
            updated_at: now,
            updated_by: input.writer,
        };
        self.store.insert_workflow(tenant, &workflow).await?;
        info!(tenant, wf_id = %workflow.wf_id, "Workflow created");
        Ok(workflow)
    }

    /// Changes validity, policy flag or the `fields` parameter.
    pub async fn modify_workflow(
        &self,
        tenant: &str,
        wf_id: &str,
        input: UpdateWorkflowInput,
    ) -> Result<WorkflowDefinition, WorkflowError> {
        let mut workflow = self.find_workflow(tenant, wf_id).await?;
        if let Some(v) = input.is_valid {
            workflow.is_valid = v;
        }
        if let Some(v) = input.accept_or_dismiss {
            workflow.accept_or_dismiss = v;
        }
        if let Some(fields) = input.fields {
            workflow.params.insert(PARAM_FIELDS.to_string(), fields);
        }
        workflow.updated_at = Utc::now();
        workflow.updated_by = input.writer;
        self.store.update_workflow(tenant, &workflow).await?;
        Ok(workflow)
    }

    /// Deletes templates and everything that depends on them, atomically.
    pub async fn delete_workflows(
        &self,
        tenant: &str,
        wf_ids: &[String],
    ) -> Result<(), WorkflowError> {
        if wf_ids.is_empty() {
            return Err(WorkflowError::Validation(
                "at least one workflow id is required".to_string(),
            ));
        }
        self.store.delete_workflows(tenant, wf_ids).await?;
        info!(tenant, count = wf_ids.len(), "Workflows deleted");
        Ok(())
    }

    // ========================================================================
    // Nodes
    // ========================================================================

    /// Lists a workflow's nodes in authoring order.
    pub async fn find_nodes(&self, tenant: &str, wf_id: &str) -> Result<Vec<Node>, WorkflowError> {
        self.store.find_nodes(tenant, wf_id).await
    }

    /// Finds one node.
    pub async fn find_node(
        &self,
        tenant: &str,
        wf_id: &str,
        node_id: &str,
    ) -> Result<Node, WorkflowError> {
        self.store
            .find_node(tenant, wf_id, node_id)
            .await?
            .ok_or_else(|| WorkflowError::NodeNotFound {
                wf_id: wf_id.to_string(),
                node_id: node_id.to_string(),
            })
    }

    fn build_node(wf_id: &str, input: NodeInput, writer: &str) -> Result<Node, WorkflowError> {
        if input.node_id.is_empty() || input.node_id == "0" {
            return Err(WorkflowError::Validation(format!(
                "invalid node id {:?}",
                input.node_id
            )));
        }
        for raw in &input.assignees {
            AssigneeSpec::parse(raw)?;
        }
        let now = Utc::now();
        Ok(Node {
            node_id: input.node_id,
            node_name: input.node_name,
            wf_id: wf_id.to_string(),
            prev_node: normalize_link(input.prev_node),
            next_node: normalize_link(input.next_node),
            assignees: input.assignees,
            act_type: input.act_type,
            node_group_id: input.node_group_id.filter(|g| !g.is_empty()),
            created_at: now,
            created_by: writer.to_string(),
            updated_at: now,
            updated_by: writer.to_string(),
        })
    }

    /// Adds one node. Only id uniqueness is checked; the full graph is
    /// validated when an instance runs.
    pub async fn add_node(
        &self,
        tenant: &str,
        wf_id: &str,
        input: NodeInput,
        writer: &str,
    ) -> Result<Node, WorkflowError> {
        self.find_workflow(tenant, wf_id).await?;
        let node = Self::build_node(wf_id, input, writer)?;
        if self
            .store
            .find_node(tenant, wf_id, &node.node_id)
            .await?
            .is_some()
        {
            return Err(WorkflowError::Validation(format!(
                "node {} already exists in workflow {wf_id}",
                node.node_id
            )));
        }
        self.store
            .insert_nodes(tenant, std::slice::from_ref(&node))
            .await?;
        Ok(node)
    }

    /// Adds a batch of nodes. Existing and new nodes together must form a
    /// valid graph.
    pub async fn add_nodes(
        &self,
        tenant: &str,
        wf_id: &str,
        inputs: Vec<NodeInput>,
        writer: &str,
    ) -> Result<Vec<Node>, WorkflowError> {
        self.find_workflow(tenant, wf_id).await?;
        let nodes = inputs
            .into_iter()
            .map(|input| Self::build_node(wf_id, input, writer))
            .collect::<Result<Vec<_>, _>>()?;

        let mut combined = self.store.find_nodes(tenant, wf_id).await?;
        combined.extend(nodes.iter().cloned());
        NodeGraph::new(combined)?;

        self.store.insert_nodes(tenant, &nodes).await?;
        info!(tenant, wf_id, count = nodes.len(), "Nodes added");
        Ok(nodes)
    }

    /// Deletes every node of a workflow.
    pub async fn delete_nodes(&self, tenant: &str, wf_id: &str) -> Result<u64, WorkflowError> {
        self.store.delete_nodes(tenant, wf_id).await
    }

    // ========================================================================
    // Relations
    // ========================================================================

    /// Lists bindings.
    pub async fn find_relations(
        &self,
        tenant: &str,
        filter: &RelationFilter,
    ) -> Result<Vec<RelationBinding>, WorkflowError> {
        self.store.find_relations(tenant, filter).await
    }

    /// Adds a binding to an existing template.
    pub async fn add_relation(
        &self,
        tenant: &str,
        relation: RelationBinding,
    ) -> Result<RelationBinding, WorkflowError> {
        if relation.app_id.is_empty() || relation.object_id.is_empty() {
            return Err(WorkflowError::Validation(
                "app_id and object_id are required".to_string(),
            ));
        }
        self.find_workflow(tenant, &relation.workflow_id).await?;
        self.store.insert_relation(tenant, &relation).await?;
        Ok(relation)
    }

    /// Deletes bindings matching the filter.
    pub async fn delete_relations(
        &self,
        tenant: &str,
        filter: &RelationFilter,
    ) -> Result<u64, WorkflowError> {
        if filter.app_id.is_empty() {
            return Err(WorkflowError::Validation("app_id is required".to_string()));
        }
        self.store.delete_relations(tenant, filter).await
    }

    // ========================================================================
    // Examples
    // ========================================================================

    /// Lists a workflow's instances, newest first.
    pub async fn find_examples(
        &self,
        tenant: &str,
        wf_id: &str,
    ) -> Result<Vec<ExampleInstance>, WorkflowError> {
        self.store.find_examples(tenant, wf_id).await
    }

    /// Finds one instance.
    pub async fn find_example(
        &self,
        tenant: &str,
        ex_id: &str,
    ) -> Result<ExampleInstance, WorkflowError> {
        self.store
            .find_example(tenant, ex_id)
            .await?
            .ok_or_else(|| WorkflowError::ExampleNotFound(ex_id.to_string()))
    }

    /// Sets an instance's status. Terminal instances cannot change.
    pub async fn modify_example(
        &self,
        tenant: &str,
        ex_id: &str,
        status: InstanceStatus,
        writer: &str,
    ) -> Result<(), WorkflowError> {
        let example = self.find_example(tenant, ex_id).await?;
        if !example.status.can_transition_to(status) {
            return Err(WorkflowError::InstanceClosed {
                ex_id: ex_id.to_string(),
                status: example.status,
            });
        }
        self.store
            .update_example_status(tenant, ex_id, status, writer)
            .await
    }

    /// Deletes an instance and its steps.
    pub async fn delete_example(&self, tenant: &str, ex_id: &str) -> Result<(), WorkflowError> {
        self.store.delete_example(tenant, ex_id).await
    }

    // ========================================================================
    // Processes
    // ========================================================================

    /// Lists an instance's steps, newest first.
    pub async fn find_processes(
        &self,
        tenant: &str,
        ex_id: &str,
    ) -> Result<Vec<ProcessStep>, WorkflowError> {
        self.store.find_processes(tenant, ex_id).await
    }

    /// Lists a user's pending steps across instances.
    pub async fn find_user_processes(
        &self,
        tenant: &str,
        user_id: &str,
    ) -> Result<Vec<ProcessStep>, WorkflowError> {
        self.store.find_user_processes(tenant, user_id).await
    }

    /// Adds a pending step to an open instance.
    pub async fn add_process(
        &self,
        tenant: &str,
        input: ProcessInput,
        writer: &str,
    ) -> Result<ProcessStep, WorkflowError> {
        let example = self.find_example(tenant, &input.ex_id).await?;
        if example.status.is_terminal() {
            return Err(WorkflowError::InstanceClosed {
                ex_id: example.ex_id,
                status: example.status,
            });
        }
        let now = Utc::now();
        let step = ProcessStep {
            pro_id: Uuid::new_v4().to_string(),
            ex_id: input.ex_id,
            current_node: input.current_node,
            user_id: input.user_id,
            expire_date: input.expire_date,
            comment: input.comment,
            status: StepStatus::Pending,
            created_at: now,
            created_by: writer.to_string(),
            updated_at: now,
            updated_by: writer.to_string(),
        };
        self.store.insert_process(tenant, &step).await?;
        Ok(step)
    }

    /// Changes one step's status and comment. Steps never return to pending.
    pub async fn modify_process(
        &self,
        tenant: &str,
        update: StepUpdate,
    ) -> Result<(), WorkflowError> {
        let step = self
            .store
            .find_process(tenant, &update.pro_id)
            .await?
            .ok_or_else(|| WorkflowError::ProcessNotFound(update.pro_id.clone()))?;
        if !step.status.can_transition_to(update.status) {
            return Err(WorkflowError::InvalidTransition {
                from: step.status,
                to: update.status,
            });
        }
        self.store.update_process(tenant, &update).await
    }

    /// Deletes every step of an instance.
    pub async fn delete_processes(&self, tenant: &str, ex_id: &str) -> Result<u64, WorkflowError> {
        self.store.delete_processes(tenant, ex_id).await
    }
}
