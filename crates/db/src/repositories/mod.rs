//! Repository abstractions for data access.
//!
//! Each repository borrows a connection or an open transaction, so the
//! store can compose them inside one `begin()`/`commit()` block.

pub mod error;
pub mod example;
pub mod node;
pub mod process;
pub mod relation;
pub mod store;
pub mod workflow;

pub use error::RepositoryError;
pub use example::ExampleRepository;
pub use node::NodeRepository;
pub use process::ProcessRepository;
pub use relation::RelationRepository;
pub use store::PgWorkflowStore;
pub use workflow::WorkflowRepository;
