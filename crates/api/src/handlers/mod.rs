pub mod executions;
pub mod status;
pub mod webhooks;

pub use crate::AppState;
