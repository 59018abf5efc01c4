//! Process-local implementations of the store and collaborator traits.
//!
//! [`InMemoryStore`] backs the server's `memory` storage backend and the
//! test suites. The static collaborators stand in for the manage and
//! business-data services.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::{Mutex, RwLock};

use crate::workflow::approvers::UserDirectory;
use crate::workflow::error::WorkflowError;
use crate::workflow::machine::{BusinessChange, BusinessData};
use crate::workflow::resolver::GroupHierarchy;
use crate::workflow::store::{TransitionHook, WorkflowStore};
use crate::workflow::types::{
    ExampleInstance, InstanceStatus, Node, ProcessStep, RelationBinding, RelationFilter,
    StepStatus, StepUpdate, Transition, WorkflowDefinition, WorkflowFilter,
};

#[derive(Debug, Clone)]
struct Entry<T> {
    seq: u64,
    value: T,
}

#[derive(Debug, Default)]
struct TenantData {
    next_seq: u64,
    workflows: HashMap<String, Entry<WorkflowDefinition>>,
    nodes: Vec<Node>,
    relations: Vec<RelationBinding>,
    examples: HashMap<String, Entry<ExampleInstance>>,
    processes: HashMap<String, Entry<ProcessStep>>,
}

impl TenantData {
    fn seq(&mut self) -> u64 {
        self.next_seq += 1;
        self.next_seq
    }

    fn steps_newest_first<'a>(
        &'a self,
        pred: impl Fn(&ProcessStep) -> bool,
    ) -> Vec<ProcessStep> {
        let mut out: Vec<&'a Entry<ProcessStep>> =
            self.processes.values().filter(|e| pred(&e.value)).collect();
        out.sort_by(|a, b| b.seq.cmp(&a.seq));
        out.into_iter().map(|e| e.value.clone()).collect()
    }

    fn check_transition(&self, t: &Transition) -> Result<(), WorkflowError> {
        let example = self
            .examples
            .get(&t.ex_id)
            .ok_or_else(|| WorkflowError::ExampleNotFound(t.ex_id.clone()))?;
        let steps = self.steps_newest_first(|s| s.ex_id == t.ex_id);
        t.check_current(example.value.status, &steps)?;
        if let Some(status) = t.instance_status
            && !example.value.status.can_transition_to(status)
        {
            return Err(WorkflowError::InstanceClosed {
                ex_id: t.ex_id.clone(),
                status: example.value.status,
            });
        }
        for update in &t.step_updates {
            let step = self
                .processes
                .get(&update.pro_id)
                .ok_or_else(|| WorkflowError::ProcessNotFound(update.pro_id.clone()))?;
            if !step.value.status.can_transition_to(update.status) {
                return Err(WorkflowError::InvalidTransition {
                    from: step.value.status,
                    to: update.status,
                });
            }
        }
        for step in &t.new_steps {
            if self.processes.contains_key(&step.pro_id) {
                return Err(WorkflowError::Validation(format!(
                    "process {} already exists",
                    step.pro_id
                )));
            }
        }
        Ok(())
    }
}

/// Tenant-partitioned store kept behind one `RwLock`.
///
/// Multi-record operations validate first and mutate under the same write
/// guard, so they are all-or-nothing.
#[derive(Debug, Default)]
pub struct InMemoryStore {
    tenants: RwLock<HashMap<String, TenantData>>,
}

impl InMemoryStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl WorkflowStore for InMemoryStore {
    async fn find_workflows(
        &self,
        tenant: &str,
        filter: &WorkflowFilter,
    ) -> Result<Vec<WorkflowDefinition>, WorkflowError> {
        let tenants = self.tenants.read().await;
        let Some(data) = tenants.get(tenant) else {
            return Ok(Vec::new());
        };
        let mut found: Vec<&Entry<WorkflowDefinition>> = data
            .workflows
            .values()
            .filter(|e| filter.matches(&e.value))
            .collect();
        found.sort_by(|a, b| {
            b.value
                .created_at
                .cmp(&a.value.created_at)
                .then(b.seq.cmp(&a.seq))
        });
        Ok(found.into_iter().map(|e| e.value.clone()).collect())
    }

    async fn find_workflow(
        &self,
        tenant: &str,
        wf_id: &str,
    ) -> Result<Option<WorkflowDefinition>, WorkflowError> {
        let tenants = self.tenants.read().await;
        Ok(tenants
            .get(tenant)
            .and_then(|d| d.workflows.get(wf_id))
            .map(|e| e.value.clone()))
    }

    async fn insert_workflow(
        &self,
        tenant: &str,
        workflow: &WorkflowDefinition,
    ) -> Result<(), WorkflowError> {
        let mut tenants = self.tenants.write().await;
        let data = tenants.entry(tenant.to_string()).or_default();
        if data.workflows.contains_key(&workflow.wf_id) {
            return Err(WorkflowError::Validation(format!(
                "workflow {} already exists",
                workflow.wf_id
            )));
        }
        let seq = data.seq();
        data.workflows.insert(
            workflow.wf_id.clone(),
            Entry {
                seq,
                value: workflow.clone(),
            },
        );
        Ok(())
    }

    async fn update_workflow(
        &self,
        tenant: &str,
        workflow: &WorkflowDefinition,
    ) -> Result<(), WorkflowError> {
        let mut tenants = self.tenants.write().await;
        let entry = tenants
            .get_mut(tenant)
            .and_then(|d| d.workflows.get_mut(&workflow.wf_id))
            .ok_or_else(|| WorkflowError::WorkflowNotFound(workflow.wf_id.clone()))?;
        entry.value = workflow.clone();
        Ok(())
    }

    async fn delete_workflows(
        &self,
        tenant: &str,
        wf_ids: &[String],
    ) -> Result<(), WorkflowError> {
        let mut tenants = self.tenants.write().await;
        let data = tenants
            .get_mut(tenant)
            .ok_or_else(|| WorkflowError::WorkflowNotFound(wf_ids.join(",")))?;

        if let Some(missing) = wf_ids.iter().find(|id| !data.workflows.contains_key(*id)) {
            return Err(WorkflowError::WorkflowNotFound(missing.clone()));
        }

        let ids: HashSet<&str> = wf_ids.iter().map(String::as_str).collect();
        let ex_ids: HashSet<String> = data
            .examples
            .values()
            .filter(|e| ids.contains(e.value.wf_id.as_str()))
            .map(|e| e.value.ex_id.clone())
            .collect();

        data.workflows.retain(|id, _| !ids.contains(id.as_str()));
        data.relations
            .retain(|r| !ids.contains(r.workflow_id.as_str()));
        data.nodes.retain(|n| !ids.contains(n.wf_id.as_str()));
        data.examples.retain(|id, _| !ex_ids.contains(id));
        data.processes
            .retain(|_, e| !ex_ids.contains(&e.value.ex_id));
        Ok(())
    }

    async fn find_nodes(&self, tenant: &str, wf_id: &str) -> Result<Vec<Node>, WorkflowError> {
        let tenants = self.tenants.read().await;
        Ok(tenants
            .get(tenant)
            .map(|d| {
                d.nodes
                    .iter()
                    .filter(|n| n.wf_id == wf_id)
                    .cloned()
                    .collect()
            })
            .unwrap_or_default())
    }

    async fn find_node(
        &self,
        tenant: &str,
        wf_id: &str,
        node_id: &str,
    ) -> Result<Option<Node>, WorkflowError> {
        let tenants = self.tenants.read().await;
        Ok(tenants.get(tenant).and_then(|d| {
            d.nodes
                .iter()
                .find(|n| n.wf_id == wf_id && n.node_id == node_id)
                .cloned()
        }))
    }

    async fn insert_nodes(&self, tenant: &str, nodes: &[Node]) -> Result<(), WorkflowError> {
        let mut tenants = self.tenants.write().await;
        let data = tenants.entry(tenant.to_string()).or_default();
        let mut keys: HashSet<(&str, &str)> = data
            .nodes
            .iter()
            .map(|n| (n.wf_id.as_str(), n.node_id.as_str()))
            .collect();
        for node in nodes {
            if !keys.insert((node.wf_id.as_str(), node.node_id.as_str())) {
                return Err(WorkflowError::Validation(format!(
                    "node {} already exists in workflow {}",
                    node.node_id, node.wf_id
                )));
            }
        }
        data.nodes.extend(nodes.iter().cloned());
        Ok(())
    }

    async fn delete_nodes(&self, tenant: &str, wf_id: &str) -> Result<u64, WorkflowError> {
        let mut tenants = self.tenants.write().await;
        let Some(data) = tenants.get_mut(tenant) else {
            return Ok(0);
        };
        let before = data.nodes.len();
        data.nodes.retain(|n| n.wf_id != wf_id);
        Ok((before - data.nodes.len()) as u64)
    }

    async fn find_relations(
        &self,
        tenant: &str,
        filter: &RelationFilter,
    ) -> Result<Vec<RelationBinding>, WorkflowError> {
        let tenants = self.tenants.read().await;
        Ok(tenants
            .get(tenant)
            .map(|d| {
                d.relations
                    .iter()
                    .filter(|r| filter.matches(r))
                    .cloned()
                    .collect()
            })
            .unwrap_or_default())
    }

    async fn insert_relation(
        &self,
        tenant: &str,
        relation: &RelationBinding,
    ) -> Result<(), WorkflowError> {
        let mut tenants = self.tenants.write().await;
        tenants
            .entry(tenant.to_string())
            .or_default()
            .relations
            .push(relation.clone());
        Ok(())
    }

    async fn delete_relations(
        &self,
        tenant: &str,
        filter: &RelationFilter,
    ) -> Result<u64, WorkflowError> {
        let mut tenants = self.tenants.write().await;
        let Some(data) = tenants.get_mut(tenant) else {
            return Ok(0);
        };
        let before = data.relations.len();
        data.relations.retain(|r| !filter.matches(r));
        Ok((before - data.relations.len()) as u64)
    }

    async fn find_examples(
        &self,
        tenant: &str,
        wf_id: &str,
    ) -> Result<Vec<ExampleInstance>, WorkflowError> {
        let tenants = self.tenants.read().await;
        let Some(data) = tenants.get(tenant) else {
            return Ok(Vec::new());
        };
        let mut found: Vec<&Entry<ExampleInstance>> = data
            .examples
            .values()
            .filter(|e| e.value.wf_id == wf_id)
            .collect();
        found.sort_by(|a, b| b.seq.cmp(&a.seq));
        Ok(found.into_iter().map(|e| e.value.clone()).collect())
    }

    async fn find_example(
        &self,
        tenant: &str,
        ex_id: &str,
    ) -> Result<Option<ExampleInstance>, WorkflowError> {
        let tenants = self.tenants.read().await;
        Ok(tenants
            .get(tenant)
            .and_then(|d| d.examples.get(ex_id))
            .map(|e| e.value.clone()))
    }

    async fn insert_example(
        &self,
        tenant: &str,
        example: &ExampleInstance,
    ) -> Result<(), WorkflowError> {
        let mut tenants = self.tenants.write().await;
        let data = tenants.entry(tenant.to_string()).or_default();
        let seq = data.seq();
        data.examples.insert(
            example.ex_id.clone(),
            Entry {
                seq,
                value: example.clone(),
            },
        );
        Ok(())
    }

    async fn update_example_status(
        &self,
        tenant: &str,
        ex_id: &str,
        status: InstanceStatus,
        writer: &str,
    ) -> Result<(), WorkflowError> {
        let mut tenants = self.tenants.write().await;
        let entry = tenants
            .get_mut(tenant)
            .and_then(|d| d.examples.get_mut(ex_id))
            .ok_or_else(|| WorkflowError::ExampleNotFound(ex_id.to_string()))?;
        entry.value.status = status;
        entry.value.updated_at = Utc::now();
        entry.value.updated_by = writer.to_string();
        Ok(())
    }

    async fn delete_example(&self, tenant: &str, ex_id: &str) -> Result<(), WorkflowError> {
        let mut tenants = self.tenants.write().await;
        let data = tenants
            .get_mut(tenant)
            .ok_or_else(|| WorkflowError::ExampleNotFound(ex_id.to_string()))?;
        if data.examples.remove(ex_id).is_none() {
            return Err(WorkflowError::ExampleNotFound(ex_id.to_string()));
        }
        data.processes.retain(|_, e| e.value.ex_id != ex_id);
        Ok(())
    }

    async fn find_processes(
        &self,
        tenant: &str,
        ex_id: &str,
    ) -> Result<Vec<ProcessStep>, WorkflowError> {
        let tenants = self.tenants.read().await;
        Ok(tenants
            .get(tenant)
            .map(|d| d.steps_newest_first(|s| s.ex_id == ex_id))
            .unwrap_or_default())
    }

    async fn find_process(
        &self,
        tenant: &str,
        pro_id: &str,
    ) -> Result<Option<ProcessStep>, WorkflowError> {
        let tenants = self.tenants.read().await;
        Ok(tenants
            .get(tenant)
            .and_then(|d| d.processes.get(pro_id))
            .map(|e| e.value.clone()))
    }

    async fn find_user_processes(
        &self,
        tenant: &str,
        user_id: &str,
    ) -> Result<Vec<ProcessStep>, WorkflowError> {
        let tenants = self.tenants.read().await;
        Ok(tenants
            .get(tenant)
            .map(|d| {
                d.steps_newest_first(|s| s.user_id == user_id && s.status == StepStatus::Pending)
            })
            .unwrap_or_default())
    }

    async fn insert_process(&self, tenant: &str, step: &ProcessStep) -> Result<(), WorkflowError> {
        let mut tenants = self.tenants.write().await;
        let data = tenants.entry(tenant.to_string()).or_default();
        let seq = data.seq();
        data.processes.insert(
            step.pro_id.clone(),
            Entry {
                seq,
                value: step.clone(),
            },
        );
        Ok(())
    }

    async fn update_process(
        &self,
        tenant: &str,
        update: &StepUpdate,
    ) -> Result<(), WorkflowError> {
        let mut tenants = self.tenants.write().await;
        let entry = tenants
            .get_mut(tenant)
            .and_then(|d| d.processes.get_mut(&update.pro_id))
            .ok_or_else(|| WorkflowError::ProcessNotFound(update.pro_id.clone()))?;
        entry.value.status = update.status;
        entry.value.comment.clone_from(&update.comment);
        entry.value.updated_at = Utc::now();
        entry.value.updated_by.clone_from(&update.writer);
        Ok(())
    }

    async fn delete_processes(&self, tenant: &str, ex_id: &str) -> Result<u64, WorkflowError> {
        let mut tenants = self.tenants.write().await;
        let Some(data) = tenants.get_mut(tenant) else {
            return Ok(0);
        };
        let before = data.processes.len();
        data.processes.retain(|_, e| e.value.ex_id != ex_id);
        Ok((before - data.processes.len()) as u64)
    }

    async fn apply(
        &self,
        tenant: &str,
        transition: &Transition,
        hook: Option<&dyn TransitionHook>,
    ) -> Result<(), WorkflowError> {
        let mut tenants = self.tenants.write().await;
        let data = tenants
            .get_mut(tenant)
            .ok_or_else(|| WorkflowError::ExampleNotFound(transition.ex_id.clone()))?;
        data.check_transition(transition)?;
        // The write guard is held across the hook.
        if let Some(hook) = hook {
            hook.before_commit().await?;
        }

        let now = Utc::now();
        for update in &transition.step_updates {
            if let Some(entry) = data.processes.get_mut(&update.pro_id) {
                entry.value.status = update.status;
                entry.value.comment.clone_from(&update.comment);
                entry.value.updated_at = now;
                entry.value.updated_by.clone_from(&update.writer);
            }
        }
        for step in &transition.new_steps {
            let seq = data.seq();
            data.processes.insert(
                step.pro_id.clone(),
                Entry {
                    seq,
                    value: step.clone(),
                },
            );
        }
        if let Some(status) = transition.instance_status
            && let Some(entry) = data.examples.get_mut(&transition.ex_id)
        {
            entry.value.status = status;
            entry.value.updated_at = now;
            entry.value.updated_by.clone_from(&transition.writer);
        }
        Ok(())
    }
}

/// Group tree held in memory: child id to parent id.
#[derive(Debug, Clone, Default)]
pub struct StaticGroupHierarchy {
    parents: HashMap<String, String>,
}

impl StaticGroupHierarchy {
    /// Creates an empty hierarchy; every group is top-level.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Declares `parent` as the parent of `group`.
    #[must_use]
    pub fn with_parent(mut self, group: &str, parent: &str) -> Self {
        self.parents.insert(group.to_string(), parent.to_string());
        self
    }
}

#[async_trait]
impl GroupHierarchy for StaticGroupHierarchy {
    async fn parent_group(
        &self,
        _tenant: &str,
        group_id: &str,
    ) -> Result<Option<String>, WorkflowError> {
        Ok(self.parents.get(group_id).cloned())
    }
}

/// User directory held in memory.
#[derive(Debug, Clone, Default)]
pub struct StaticDirectory {
    roles: HashMap<(String, String), Vec<String>>,
    groups: HashMap<String, String>,
}

impl StaticDirectory {
    /// Creates an empty directory.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds `user` to `group` holding `role`.
    #[must_use]
    pub fn with_member(mut self, user: &str, group: &str, role: &str) -> Self {
        self.roles
            .entry((group.to_string(), role.to_string()))
            .or_default()
            .push(user.to_string());
        self.groups.insert(user.to_string(), group.to_string());
        self
    }
}

#[async_trait]
impl UserDirectory for StaticDirectory {
    async fn users_with_role(
        &self,
        _tenant: &str,
        _domain: &str,
        group_id: &str,
        role_id: &str,
    ) -> Result<Vec<String>, WorkflowError> {
        Ok(self
            .roles
            .get(&(group_id.to_string(), role_id.to_string()))
            .cloned()
            .unwrap_or_default())
    }

    async fn user_group(
        &self,
        _tenant: &str,
        _domain: &str,
        user_id: &str,
    ) -> Result<Option<String>, WorkflowError> {
        Ok(self.groups.get(user_id).cloned())
    }
}

/// Business-data fake that records notifications and can be told to fail.
#[derive(Debug, Default)]
pub struct RecordingBusinessData {
    commits: Mutex<Vec<BusinessChange>>,
    discards: Mutex<Vec<BusinessChange>>,
    failing: AtomicBool,
}

impl RecordingBusinessData {
    /// Creates a recorder that accepts every notification.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes subsequent notifications fail (or succeed again).
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    /// Committed changes, oldest first.
    pub async fn commits(&self) -> Vec<BusinessChange> {
        self.commits.lock().await.clone()
    }

    /// Discarded changes, oldest first.
    pub async fn discards(&self) -> Vec<BusinessChange> {
        self.discards.lock().await.clone()
    }

    fn check(&self) -> Result<(), WorkflowError> {
        if self.failing.load(Ordering::SeqCst) {
            Err(WorkflowError::UpstreamUnavailable(
                "business-data service unavailable".to_string(),
            ))
        } else {
            Ok(())
        }
    }
}

#[async_trait]
impl BusinessData for RecordingBusinessData {
    async fn commit(&self, _tenant: &str, change: &BusinessChange) -> Result<(), WorkflowError> {
        self.check()?;
        self.commits.lock().await.push(change.clone());
        Ok(())
    }

    async fn discard(&self, _tenant: &str, change: &BusinessChange) -> Result<(), WorkflowError> {
        self.check()?;
        self.discards.lock().await.push(change.clone());
        Ok(())
    }
}
