//! Queue error type.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum QueueError {
    /// The consuming worker has shut down.
    #[error("trigger queue is closed")]
    Closed,
}
