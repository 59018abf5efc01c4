//! PostgreSQL-backed [`WorkflowStore`].

use async_trait::async_trait;
use chrono::Utc;
use sea_orm::{DatabaseConnection, DbErr, TransactionTrait};
use tracing::debug;

use ringi_core::workflow::{
    ExampleInstance, InstanceStatus, Node, ProcessStep, RelationBinding, RelationFilter,
    StepUpdate, Transition, TransitionHook, WorkflowDefinition, WorkflowError, WorkflowFilter,
    WorkflowStore,
};

use super::error::RepositoryError;
use super::example::ExampleRepository;
use super::node::NodeRepository;
use super::process::ProcessRepository;
use super::relation::RelationRepository;
use super::workflow::WorkflowRepository;

/// Workflow store over a `SeaORM` connection pool.
#[derive(Debug)]
pub struct PgWorkflowStore {
    db: DatabaseConnection,
}

impl PgWorkflowStore {
    /// Creates a store over `db`.
    #[must_use]
    pub const fn new(db: DatabaseConnection) -> Self {
        Self { db }
    }
}

fn db_err(err: DbErr) -> WorkflowError {
    RepositoryError::from(err).into()
}

/// Maps a duplicate key to `Validation`, anything else to `Database`.
fn duplicate_as_validation(err: RepositoryError, what: impl FnOnce() -> String) -> WorkflowError {
    if err.is_unique_violation() {
        WorkflowError::Validation(what())
    } else {
        err.into()
    }
}

#[async_trait]
impl WorkflowStore for PgWorkflowStore {
    // ========================================================================
    // Workflow definitions
    // ========================================================================

    async fn find_workflows(
        &self,
        tenant: &str,
        filter: &WorkflowFilter,
    ) -> Result<Vec<WorkflowDefinition>, WorkflowError> {
        Ok(WorkflowRepository::new(&self.db)
            .find_all(tenant, filter)
            .await?)
    }

    async fn find_workflow(
        &self,
        tenant: &str,
        wf_id: &str,
    ) -> Result<Option<WorkflowDefinition>, WorkflowError> {
        Ok(WorkflowRepository::new(&self.db).find(tenant, wf_id).await?)
    }

    async fn insert_workflow(
        &self,
        tenant: &str,
        workflow: &WorkflowDefinition,
    ) -> Result<(), WorkflowError> {
        WorkflowRepository::new(&self.db)
            .insert(tenant, workflow)
            .await
            .map_err(|e| {
                duplicate_as_validation(e, || format!("workflow {} already exists", workflow.wf_id))
            })
    }

    async fn update_workflow(
        &self,
        tenant: &str,
        workflow: &WorkflowDefinition,
    ) -> Result<(), WorkflowError> {
        let affected = WorkflowRepository::new(&self.db)
            .update(tenant, workflow)
            .await?;
        if affected == 0 {
            return Err(WorkflowError::WorkflowNotFound(workflow.wf_id.clone()));
        }
        Ok(())
    }

    async fn delete_workflows(
        &self,
        tenant: &str,
        wf_ids: &[String],
    ) -> Result<(), WorkflowError> {
        let txn = self.db.begin().await.map_err(db_err)?;

        let existing = WorkflowRepository::new(&txn)
            .existing_ids(tenant, wf_ids)
            .await?;
        if let Some(missing) = wf_ids.iter().find(|id| !existing.contains(*id)) {
            return Err(WorkflowError::WorkflowNotFound(missing.clone()));
        }

        let ex_ids = ExampleRepository::new(&txn)
            .ids_by_workflows(tenant, wf_ids)
            .await?;
        let steps = ProcessRepository::new(&txn)
            .delete_by_examples(tenant, &ex_ids)
            .await?;
        let examples = ExampleRepository::new(&txn)
            .delete_many(tenant, &ex_ids)
            .await?;
        let nodes = NodeRepository::new(&txn)
            .delete_by_workflows(tenant, wf_ids)
            .await?;
        let relations = RelationRepository::new(&txn)
            .delete_by_workflows(tenant, wf_ids)
            .await?;
        WorkflowRepository::new(&txn)
            .delete_many(tenant, wf_ids)
            .await?;

        txn.commit().await.map_err(db_err)?;

        debug!(
            tenant,
            workflows = wf_ids.len(),
            nodes,
            relations,
            examples,
            steps,
            "Cascade delete committed"
        );
        Ok(())
    }

    // ========================================================================
    // Nodes
    // ========================================================================

    async fn find_nodes(&self, tenant: &str, wf_id: &str) -> Result<Vec<Node>, WorkflowError> {
        Ok(NodeRepository::new(&self.db)
            .find_by_workflow(tenant, wf_id)
            .await?)
    }

    async fn find_node(
        &self,
        tenant: &str,
        wf_id: &str,
        node_id: &str,
    ) -> Result<Option<Node>, WorkflowError> {
        Ok(NodeRepository::new(&self.db)
            .find(tenant, wf_id, node_id)
            .await?)
    }

    async fn insert_nodes(&self, tenant: &str, nodes: &[Node]) -> Result<(), WorkflowError> {
        let txn = self.db.begin().await.map_err(db_err)?;
        NodeRepository::new(&txn)
            .insert_many(tenant, nodes)
            .await
            .map_err(|e| duplicate_as_validation(e, || "node id already exists".to_string()))?;
        txn.commit().await.map_err(db_err)?;
        Ok(())
    }

    async fn delete_nodes(&self, tenant: &str, wf_id: &str) -> Result<u64, WorkflowError> {
        Ok(NodeRepository::new(&self.db)
            .delete_by_workflows(tenant, &[wf_id.to_string()])
            .await?)
    }

    // ========================================================================
    // Relation bindings
    // ========================================================================

    async fn find_relations(
        &self,
        tenant: &str,
        filter: &RelationFilter,
    ) -> Result<Vec<RelationBinding>, WorkflowError> {
        Ok(RelationRepository::new(&self.db)
            .find_all(tenant, filter)
            .await?)
    }

    async fn insert_relation(
        &self,
        tenant: &str,
        relation: &RelationBinding,
    ) -> Result<(), WorkflowError> {
        Ok(RelationRepository::new(&self.db)
            .insert(tenant, relation)
            .await?)
    }

    async fn delete_relations(
        &self,
        tenant: &str,
        filter: &RelationFilter,
    ) -> Result<u64, WorkflowError> {
        Ok(RelationRepository::new(&self.db)
            .delete_matching(tenant, filter)
            .await?)
    }

    // ========================================================================
    // Example instances
    // ========================================================================

    async fn find_examples(
        &self,
        tenant: &str,
        wf_id: &str,
    ) -> Result<Vec<ExampleInstance>, WorkflowError> {
        Ok(ExampleRepository::new(&self.db)
            .find_by_workflow(tenant, wf_id)
            .await?)
    }

    async fn find_example(
        &self,
        tenant: &str,
        ex_id: &str,
    ) -> Result<Option<ExampleInstance>, WorkflowError> {
        Ok(ExampleRepository::new(&self.db).find(tenant, ex_id).await?)
    }

    async fn insert_example(
        &self,
        tenant: &str,
        example: &ExampleInstance,
    ) -> Result<(), WorkflowError> {
        ExampleRepository::new(&self.db)
            .insert(tenant, example)
            .await
            .map_err(|e| {
                duplicate_as_validation(e, || format!("instance {} already exists", example.ex_id))
            })
    }

    async fn update_example_status(
        &self,
        tenant: &str,
        ex_id: &str,
        status: InstanceStatus,
        writer: &str,
    ) -> Result<(), WorkflowError> {
        let affected = ExampleRepository::new(&self.db)
            .update_status(tenant, ex_id, status, writer, Utc::now())
            .await?;
        if affected == 0 {
            return Err(WorkflowError::ExampleNotFound(ex_id.to_string()));
        }
        Ok(())
    }

    async fn delete_example(&self, tenant: &str, ex_id: &str) -> Result<(), WorkflowError> {
        let ids = [ex_id.to_string()];
        let txn = self.db.begin().await.map_err(db_err)?;
        ProcessRepository::new(&txn)
            .delete_by_examples(tenant, &ids)
            .await?;
        let removed = ExampleRepository::new(&txn).delete_many(tenant, &ids).await?;
        if removed == 0 {
            return Err(WorkflowError::ExampleNotFound(ex_id.to_string()));
        }
        txn.commit().await.map_err(db_err)?;
        Ok(())
    }

    // ========================================================================
    // Process steps
    // ========================================================================

    async fn find_processes(
        &self,
        tenant: &str,
        ex_id: &str,
    ) -> Result<Vec<ProcessStep>, WorkflowError> {
        Ok(ProcessRepository::new(&self.db)
            .find_by_example(tenant, ex_id)
            .await?)
    }

    async fn find_process(
        &self,
        tenant: &str,
        pro_id: &str,
    ) -> Result<Option<ProcessStep>, WorkflowError> {
        Ok(ProcessRepository::new(&self.db).find(tenant, pro_id).await?)
    }

    async fn find_user_processes(
        &self,
        tenant: &str,
        user_id: &str,
    ) -> Result<Vec<ProcessStep>, WorkflowError> {
        Ok(ProcessRepository::new(&self.db)
            .find_pending_for_user(tenant, user_id)
            .await?)
    }

    async fn insert_process(&self, tenant: &str, step: &ProcessStep) -> Result<(), WorkflowError> {
        ProcessRepository::new(&self.db)
            .insert(tenant, step)
            .await
            .map_err(|e| {
                duplicate_as_validation(e, || format!("process {} already exists", step.pro_id))
            })
    }

    async fn update_process(
        &self,
        tenant: &str,
        update: &StepUpdate,
    ) -> Result<(), WorkflowError> {
        let affected = ProcessRepository::new(&self.db)
            .update(tenant, update, Utc::now())
            .await?;
        if affected == 0 {
            return Err(WorkflowError::ProcessNotFound(update.pro_id.clone()));
        }
        Ok(())
    }

    async fn delete_processes(&self, tenant: &str, ex_id: &str) -> Result<u64, WorkflowError> {
        Ok(ProcessRepository::new(&self.db)
            .delete_by_examples(tenant, &[ex_id.to_string()])
            .await?)
    }

    // ========================================================================
    // Transitions
    // ========================================================================

    async fn apply(
        &self,
        tenant: &str,
        transition: &Transition,
        hook: Option<&dyn TransitionHook>,
    ) -> Result<(), WorkflowError> {
        let txn = self.db.begin().await.map_err(db_err)?;
        let examples = ExampleRepository::new(&txn);
        let processes = ProcessRepository::new(&txn);

        // The row lock serializes concurrent Admit/Dismiss on one instance.
        let example = examples
            .find_for_update(tenant, &transition.ex_id)
            .await?
            .ok_or_else(|| WorkflowError::ExampleNotFound(transition.ex_id.clone()))?;
        let steps = processes.find_by_example(tenant, &transition.ex_id).await?;
        transition.check_current(example.status, &steps)?;
        if let Some(status) = transition.instance_status
            && !example.status.can_transition_to(status)
        {
            return Err(WorkflowError::InstanceClosed {
                ex_id: example.ex_id,
                status: example.status,
            });
        }

        for update in &transition.step_updates {
            let step = processes
                .find(tenant, &update.pro_id)
                .await?
                .ok_or_else(|| WorkflowError::ProcessNotFound(update.pro_id.clone()))?;
            if !step.status.can_transition_to(update.status) {
                return Err(WorkflowError::InvalidTransition {
                    from: step.status,
                    to: update.status,
                });
            }
        }

        let now = Utc::now();
        for update in &transition.step_updates {
            processes.update(tenant, update, now).await?;
        }
        for step in &transition.new_steps {
            processes.insert(tenant, step).await.map_err(|e| {
                duplicate_as_validation(e, || format!("process {} already exists", step.pro_id))
            })?;
        }
        if let Some(status) = transition.instance_status {
            examples
                .update_status(tenant, &transition.ex_id, status, &transition.writer, now)
                .await?;
        }

        // Dropping the transaction on a hook error rolls the writes back.
        if let Some(hook) = hook {
            hook.before_commit().await?;
        }
        txn.commit().await.map_err(db_err)?;

        debug!(
            tenant,
            ex_id = %transition.ex_id,
            updated = transition.step_updates.len(),
            created = transition.new_steps.len(),
            status = ?transition.instance_status,
            "Transition committed"
        );
        Ok(())
    }
}
