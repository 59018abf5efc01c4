//! `SeaORM` entities for the workflow collections.

pub mod wf_examples;
pub mod wf_nodes;
pub mod wf_processes;
pub mod wf_relations;
pub mod wf_workflows;
