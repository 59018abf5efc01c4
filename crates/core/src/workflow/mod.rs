//! Approval workflow engine for Ringi.
//!
//! This module resolves which workflow template gates a business change,
//! drives instances through the template's approver graph, and projects
//! instance status for the caller.
//!
//! # Modules
//!
//! - `types` - Records and status types (WorkflowDefinition, Node, ProcessStep)
//! - `error` - Workflow-specific error types
//! - `graph` - Validated node graph
//! - `resolver` - Nearest-ancestor workflow resolution
//! - `approvers` - Assignee spec resolution against the user directory
//! - `service` - Pure Admit/Dismiss planning
//! - `projection` - Instance status view
//! - `store` - Persistence trait
//! - `catalog` - Administrative CRUD
//! - `machine` - Approval state machine
//! - `memory` - In-memory store and collaborators

pub mod approvers;
pub mod catalog;
pub mod error;
pub mod graph;
pub mod machine;
pub mod memory;
pub mod projection;
pub mod resolver;
pub mod service;
pub mod store;
pub mod types;

#[cfg(test)]
mod machine_props;
#[cfg(test)]
mod resolver_props;
#[cfg(test)]
mod service_props;

pub use approvers::{ApproverResolver, AssigneeSpec, UserDirectory};
pub use catalog::{NodeInput, ProcessInput, WorkflowCatalog};
pub use error::WorkflowError;
pub use graph::NodeGraph;
pub use machine::{
    ApprovalAction, ApprovalStateMachine, BusinessChange, BusinessData, StartRequest,
};
pub use memory::{InMemoryStore, RecordingBusinessData, StaticDirectory, StaticGroupHierarchy};
pub use projection::{StatusView, project};
pub use resolver::{GroupHierarchy, ROOT_GROUP, Resolution, ResolveQuery, WorkflowResolver};
pub use service::{ApprovalPlan, Outcome};
pub use store::{TransitionHook, WorkflowStore};
pub use types::{
    ActType, CreateWorkflowInput, ExampleInstance, InstanceStatus, Node, NodeKind, ProcessStep,
    RelationBinding, RelationFilter, StepStatus, StepUpdate, Transition, UpdateWorkflowInput,
    WorkflowDefinition, WorkflowFilter, WorkflowType,
};
