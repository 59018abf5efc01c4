//! Core approval-workflow engine for Ringi.
//!
//! This crate contains the engine logic with ZERO web or database dependencies.
//! Storage and the external collaborators are reached through traits so the
//! same logic runs over PostgreSQL in production and in-memory in tests.
//!
//! # Modules
//!
//! - `workflow` - Templates, node graphs, resolution and the approval state machine

pub mod workflow;
