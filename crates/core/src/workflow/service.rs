//! Pure Admit/Dismiss transition logic.
//!
//! An [`ApprovalPlan`] is a working copy of one instance and its steps.
//! Approver actions are applied to the copy, and the accumulated changes
//! are turned into a single [`Transition`] for the store to apply
//! atomically. Nothing here performs I/O.

use std::collections::HashMap;

use chrono::{DateTime, Duration, Utc};
use uuid::Uuid;

use crate::workflow::error::WorkflowError;
use crate::workflow::graph::NodeGraph;
use crate::workflow::types::{
    AUTO_APPROVED_COMMENT, AUTO_REJECTED_COMMENT, ActType, ExampleInstance, InstanceStatus,
    ProcessStep, StepStatus, StepUpdate, Transition,
};

/// What happens after an approver action is applied.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    /// The node still waits for other assignees.
    Waiting,
    /// The node is complete and the given node must be opened next.
    Advance(String),
    /// The instance reached a terminal status.
    Finished(InstanceStatus),
}

/// Working copy of one instance while an action is being planned.
#[derive(Debug, Clone)]
pub struct ApprovalPlan {
    example: ExampleInstance,
    steps: Vec<ProcessStep>,
    original: HashMap<String, (StepStatus, String)>,
    status: InstanceStatus,
    writer: String,
    now: DateTime<Utc>,
    expiry_days: i64,
}

impl ApprovalPlan {
    /// Starts a plan from the stored instance and its steps.
    ///
    /// # Errors
    ///
    /// Returns `InstanceClosed` if the instance is already terminal.
    pub fn new(
        example: ExampleInstance,
        steps: Vec<ProcessStep>,
        writer: &str,
        now: DateTime<Utc>,
        expiry_days: i64,
    ) -> Result<Self, WorkflowError> {
        if example.status.is_terminal() {
            return Err(WorkflowError::InstanceClosed {
                ex_id: example.ex_id,
                status: example.status,
            });
        }
        let original = steps
            .iter()
            .map(|s| (s.pro_id.clone(), (s.status, s.comment.clone())))
            .collect();
        Ok(Self {
            status: example.status,
            example,
            steps,
            original,
            writer: writer.to_string(),
            now,
            expiry_days,
        })
    }

    /// Current instance status in the plan.
    #[must_use]
    pub fn status(&self) -> InstanceStatus {
        self.status
    }

    /// Applicant of the instance.
    #[must_use]
    pub fn applicant(&self) -> &str {
        &self.example.user_id
    }

    /// Steps in the plan, stored steps first and new steps after.
    #[must_use]
    pub fn steps(&self) -> &[ProcessStep] {
        &self.steps
    }

    fn pending_step_for(&self, user_id: &str) -> Result<usize, WorkflowError> {
        self.steps
            .iter()
            .position(|s| s.user_id == user_id && s.status == StepStatus::Pending)
            .ok_or_else(|| WorkflowError::NotAuthorized {
                user_id: user_id.to_string(),
                ex_id: self.example.ex_id.clone(),
            })
    }

    fn set_step(
        &mut self,
        idx: usize,
        to: StepStatus,
        comment: &str,
        writer: &str,
    ) -> Result<(), WorkflowError> {
        let step = &mut self.steps[idx];
        if !step.status.can_transition_to(to) {
            return Err(WorkflowError::InvalidTransition {
                from: step.status,
                to,
            });
        }
        step.status = to;
        step.comment = comment.to_string();
        step.updated_at = self.now;
        step.updated_by = writer.to_string();
        Ok(())
    }

    /// Marks every other pending step on `node_id` with `to` and a marker
    /// comment.
    fn resolve_siblings(&mut self, node_id: &str, to: StepStatus) -> Result<(), WorkflowError> {
        let marker = match to {
            StepStatus::Rejected => AUTO_REJECTED_COMMENT,
            _ => AUTO_APPROVED_COMMENT,
        };
        let writer = self.writer.clone();
        let idxs: Vec<usize> = self
            .steps
            .iter()
            .enumerate()
            .filter(|(_, s)| s.current_node == node_id && s.status == StepStatus::Pending)
            .map(|(i, _)| i)
            .collect();
        for idx in idxs {
            self.set_step(idx, to, marker, &writer)?;
        }
        Ok(())
    }

    fn node_complete(&self, node_id: &str, act_type: ActType) -> bool {
        let mut on_node = self.steps.iter().filter(|s| s.current_node == node_id);
        match act_type {
            ActType::Or => on_node.any(|s| s.status == StepStatus::Approved),
            ActType::And => on_node.all(|s| s.status == StepStatus::Approved),
        }
    }

    fn finish(&mut self, status: InstanceStatus) -> Result<(), WorkflowError> {
        if !self.status.can_transition_to(status) {
            return Err(WorkflowError::InstanceClosed {
                ex_id: self.example.ex_id.clone(),
                status: self.status,
            });
        }
        self.status = status;
        Ok(())
    }

    /// Applies an Admit by `user_id`.
    ///
    /// # Errors
    ///
    /// - `NotAuthorized` if the user holds no pending step
    /// - `NodeNotFound` if the step's node is not in the graph
    pub fn admit(
        &mut self,
        user_id: &str,
        comment: &str,
        graph: &NodeGraph,
    ) -> Result<Outcome, WorkflowError> {
        let idx = self.pending_step_for(user_id)?;
        self.set_step(idx, StepStatus::Approved, comment, user_id)?;

        let node_id = self.steps[idx].current_node.clone();
        let node = graph
            .get(&node_id)
            .ok_or_else(|| WorkflowError::NodeNotFound {
                wf_id: self.example.wf_id.clone(),
                node_id: node_id.clone(),
            })?;

        if !self.node_complete(&node_id, node.act_type) {
            return Ok(Outcome::Waiting);
        }
        self.resolve_siblings(&node_id, StepStatus::Approved)?;

        match graph.next(&node_id)? {
            Some(next) => Ok(Outcome::Advance(next.node_id.clone())),
            None => {
                self.finish(InstanceStatus::Approved)?;
                Ok(Outcome::Finished(InstanceStatus::Approved))
            }
        }
    }

    /// Applies a Dismiss by `user_id`. A single dismissal ends the instance.
    ///
    /// # Errors
    ///
    /// Returns `NotAuthorized` if the user holds no pending step.
    pub fn dismiss(&mut self, user_id: &str, comment: &str) -> Result<Outcome, WorkflowError> {
        let idx = self.pending_step_for(user_id)?;
        self.set_step(idx, StepStatus::Rejected, comment, user_id)?;

        let node_id = self.steps[idx].current_node.clone();
        self.resolve_siblings(&node_id, StepStatus::Rejected)?;
        self.finish(InstanceStatus::Rejected)?;
        Ok(Outcome::Finished(InstanceStatus::Rejected))
    }

    /// Creates one pending step per approver on `node_id`.
    pub fn open_node(&mut self, node_id: &str, approvers: &[String]) {
        let expire_date = (self.now + Duration::days(self.expiry_days)).date_naive();
        for user_id in approvers {
            self.steps.push(ProcessStep {
                pro_id: Uuid::new_v4().to_string(),
                ex_id: self.example.ex_id.clone(),
                current_node: node_id.to_string(),
                user_id: user_id.clone(),
                expire_date,
                comment: String::new(),
                status: StepStatus::Pending,
                created_at: self.now,
                created_by: self.writer.clone(),
                updated_at: self.now,
                updated_by: self.writer.clone(),
            });
        }
    }

    /// Turns the accumulated changes into one transition.
    #[must_use]
    pub fn into_transition(self) -> Transition {
        let read_steps = self
            .original
            .iter()
            .map(|(id, (status, _))| (id.clone(), *status))
            .collect();
        let mut step_updates = Vec::new();
        let mut new_steps = Vec::new();
        for step in self.steps {
            match self.original.get(&step.pro_id) {
                None => new_steps.push(step),
                Some((status, comment)) if *status != step.status || *comment != step.comment => {
                    step_updates.push(StepUpdate {
                        pro_id: step.pro_id,
                        status: step.status,
                        comment: step.comment,
                        writer: step.updated_by,
                    });
                }
                Some(_) => {}
            }
        }
        Transition {
            ex_id: self.example.ex_id,
            step_updates,
            new_steps,
            instance_status: (self.status != self.example.status).then_some(self.status),
            writer: self.writer,
            read_status: self.example.status,
            read_steps,
        }
    }
}
