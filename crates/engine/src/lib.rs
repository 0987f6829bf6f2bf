//! `engine` crate: core domain models, graph ordering, and the run
//! orchestrator.

pub mod credentials;
pub mod dag;
pub mod error;
pub mod executor;
pub mod graph;
pub mod import;
pub mod models;
pub mod registry;
pub mod worker;

pub use credentials::DbCredentialStore;
pub use dag::topological_sort;
pub use error::{EngineError, GraphError};
pub use executor::{ExecutorConfig, RunOutcome, WorkflowExecutor};
pub use import::{check_definition, import_workflow};
pub use models::{Connection, Node, NodeType, Workflow, WorkflowDefinition};
pub use registry::ExecutorRegistry;
pub use worker::TriggerWorker;
