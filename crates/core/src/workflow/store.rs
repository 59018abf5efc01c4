//! Persistence seam for the five workflow collections.
//!
//! Every operation is scoped by `tenant`. Implementations must make
//! `delete_workflows`, `insert_nodes` and `apply` all-or-nothing.

use async_trait::async_trait;

use crate::workflow::error::WorkflowError;
use crate::workflow::types::{
    ExampleInstance, InstanceStatus, Node, ProcessStep, RelationBinding, RelationFilter,
    StepUpdate, Transition, WorkflowDefinition, WorkflowFilter,
};

/// Side effect that must succeed for a transition to be committed.
///
/// It runs while the store holds the instance lock, after the transition
/// has been checked against the stored state. It must not call back into
/// the store.
#[async_trait]
pub trait TransitionHook: Send + Sync {
    /// Runs the effect. An error aborts the transition.
    async fn before_commit(&self) -> Result<(), WorkflowError>;
}

/// Storage for workflow templates, graphs, bindings, instances and steps.
#[async_trait]
pub trait WorkflowStore: Send + Sync {
    // ========================================================================
    // Workflow definitions
    // ========================================================================

    /// Lists templates matching the filter, newest first.
    async fn find_workflows(
        &self,
        tenant: &str,
        filter: &WorkflowFilter,
    ) -> Result<Vec<WorkflowDefinition>, WorkflowError>;

    /// Finds one template.
    async fn find_workflow(
        &self,
        tenant: &str,
        wf_id: &str,
    ) -> Result<Option<WorkflowDefinition>, WorkflowError>;

    /// Inserts a template.
    async fn insert_workflow(
        &self,
        tenant: &str,
        workflow: &WorkflowDefinition,
    ) -> Result<(), WorkflowError>;

    /// Replaces a stored template. Fails with `WorkflowNotFound` if absent.
    async fn update_workflow(
        &self,
        tenant: &str,
        workflow: &WorkflowDefinition,
    ) -> Result<(), WorkflowError>;

    /// Deletes templates with their bindings, nodes, instances and steps.
    ///
    /// If any id is missing nothing is deleted and `WorkflowNotFound` is
    /// returned.
    async fn delete_workflows(&self, tenant: &str, wf_ids: &[String])
    -> Result<(), WorkflowError>;

    // ========================================================================
    // Nodes
    // ========================================================================

    /// Lists a workflow's nodes in authoring order.
    async fn find_nodes(&self, tenant: &str, wf_id: &str) -> Result<Vec<Node>, WorkflowError>;

    /// Finds one node.
    async fn find_node(
        &self,
        tenant: &str,
        wf_id: &str,
        node_id: &str,
    ) -> Result<Option<Node>, WorkflowError>;

    /// Inserts nodes as one batch. Fails with `Validation` on an id clash.
    async fn insert_nodes(&self, tenant: &str, nodes: &[Node]) -> Result<(), WorkflowError>;

    /// Deletes every node of a workflow, returning how many were removed.
    async fn delete_nodes(&self, tenant: &str, wf_id: &str) -> Result<u64, WorkflowError>;

    // ========================================================================
    // Relation bindings
    // ========================================================================

    /// Lists bindings matching the filter.
    async fn find_relations(
        &self,
        tenant: &str,
        filter: &RelationFilter,
    ) -> Result<Vec<RelationBinding>, WorkflowError>;

    /// Inserts a binding.
    async fn insert_relation(
        &self,
        tenant: &str,
        relation: &RelationBinding,
    ) -> Result<(), WorkflowError>;

    /// Deletes bindings matching the filter, returning how many were removed.
    async fn delete_relations(
        &self,
        tenant: &str,
        filter: &RelationFilter,
    ) -> Result<u64, WorkflowError>;

    // ========================================================================
    // Example instances
    // ========================================================================

    /// Lists a workflow's instances, newest first.
    async fn find_examples(
        &self,
        tenant: &str,
        wf_id: &str,
    ) -> Result<Vec<ExampleInstance>, WorkflowError>;

    /// Finds one instance.
    async fn find_example(
        &self,
        tenant: &str,
        ex_id: &str,
    ) -> Result<Option<ExampleInstance>, WorkflowError>;

    /// Inserts an instance.
    async fn insert_example(
        &self,
        tenant: &str,
        example: &ExampleInstance,
    ) -> Result<(), WorkflowError>;

    /// Sets an instance's status. Fails with `ExampleNotFound` if absent.
    async fn update_example_status(
        &self,
        tenant: &str,
        ex_id: &str,
        status: InstanceStatus,
        writer: &str,
    ) -> Result<(), WorkflowError>;

    /// Deletes an instance and its steps.
    async fn delete_example(&self, tenant: &str, ex_id: &str) -> Result<(), WorkflowError>;

    // ========================================================================
    // Process steps
    // ========================================================================

    /// Lists an instance's steps, newest first.
    async fn find_processes(
        &self,
        tenant: &str,
        ex_id: &str,
    ) -> Result<Vec<ProcessStep>, WorkflowError>;

    /// Finds one step.
    async fn find_process(
        &self,
        tenant: &str,
        pro_id: &str,
    ) -> Result<Option<ProcessStep>, WorkflowError>;

    /// Lists a user's pending steps across instances, newest first.
    async fn find_user_processes(
        &self,
        tenant: &str,
        user_id: &str,
    ) -> Result<Vec<ProcessStep>, WorkflowError>;

    /// Inserts a step.
    async fn insert_process(&self, tenant: &str, step: &ProcessStep) -> Result<(), WorkflowError>;

    /// Changes one step. Fails with `ProcessNotFound` if absent.
    async fn update_process(&self, tenant: &str, update: &StepUpdate)
    -> Result<(), WorkflowError>;

    /// Deletes every step of an instance, returning how many were removed.
    async fn delete_processes(&self, tenant: &str, ex_id: &str) -> Result<u64, WorkflowError>;

    // ========================================================================
    // Transitions
    // ========================================================================

    /// Applies every write of one Admit, Dismiss or start in a single
    /// transaction.
    ///
    /// Fails with `StaleInstance` or `InstanceClosed`, writing nothing, if
    /// the instance or its steps no longer match what the transition was
    /// planned from. `hook` runs last, before the commit.
    async fn apply(
        &self,
        tenant: &str,
        transition: &Transition,
        hook: Option<&dyn TransitionHook>,
    ) -> Result<(), WorkflowError>;
}
