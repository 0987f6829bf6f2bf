//! `nodes` crate: the `NodeExecutor` contract and built-in node executors.
//!
//! Every node type, built-in or test double, implements [`NodeExecutor`].
//! The engine dispatches through this trait object, threading a [`Context`]
//! from node to node and handing each executor a [`StepRunner`] and a
//! [`StatusPublisher`].

pub mod chat;
pub mod context;
pub mod credentials;
pub mod error;
pub mod http_request;
pub mod llm;
pub mod mock;
pub mod status;
pub mod step;
pub mod template;
pub mod traits;
pub mod trigger;

#[cfg(test)]
mod test_support;

pub use chat::{ChatExecutor, ChatPlatform};
pub use context::Context;
pub use credentials::{Credential, CredentialKind, CredentialLookupError, CredentialStore};
pub use error::NodeError;
pub use http_request::{HttpMethod, HttpRequestExecutor};
pub use llm::{LlmExecutor, LlmProvider, ProviderSettings};
pub use status::{
    BroadcastStatusPublisher, NodeStatus, StatusBoard, StatusChannel, StatusEvent, StatusPublisher,
};
pub use step::{RetryPolicy, StepRunner};
pub use template::TemplateRenderer;
pub use traits::{ExecutorDeps, NodeExecutor, NodeInput};
pub use trigger::PassthroughExecutor;
