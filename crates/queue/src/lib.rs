//! `queue` crate: in-process trigger ingestion.
//!
//! Webhooks and manual triggers push a [`TriggerEvent`] through a
//! [`TriggerSender`]; the engine's worker drains the matching
//! [`TriggerReceiver`] and starts one run per event.

pub mod error;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tokio::sync::mpsc;
use tracing::debug;
use uuid::Uuid;

pub use error::QueueError;

/// A request to run a workflow.
///
/// `id` is the idempotency key: the engine records at most one execution per
/// `(id, workflow_id)` pair.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TriggerEvent {
    pub id: String,
    pub workflow_id: Uuid,
    #[serde(default)]
    pub initial_data: Map<String, Value>,
}

impl TriggerEvent {
    /// Event with a freshly generated id (manual triggers).
    pub fn new(workflow_id: Uuid, initial_data: Map<String, Value>) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            workflow_id,
            initial_data,
        }
    }

    /// Event whose id is derived from an upstream identifier, so a redelivered
    /// webhook maps onto the same execution.
    pub fn with_id(
        id: impl Into<String>,
        workflow_id: Uuid,
        initial_data: Map<String, Value>,
    ) -> Self {
        Self {
            id: id.into(),
            workflow_id,
            initial_data,
        }
    }
}

/// Producer half of the trigger queue. Cheap to clone.
#[derive(Debug, Clone)]
pub struct TriggerSender {
    tx: mpsc::Sender<TriggerEvent>,
}

/// Consumer half of the trigger queue.
#[derive(Debug)]
pub struct TriggerReceiver {
    rx: mpsc::Receiver<TriggerEvent>,
}

/// Create a bounded trigger queue.
pub fn channel(capacity: usize) -> (TriggerSender, TriggerReceiver) {
    let (tx, rx) = mpsc::channel(capacity);
    (TriggerSender { tx }, TriggerReceiver { rx })
}

impl TriggerSender {
    /// Enqueue an event, waiting for capacity if the queue is full.
    pub async fn send(&self, event: TriggerEvent) -> Result<(), QueueError> {
        debug!(event_id = %event.id, workflow_id = %event.workflow_id, "enqueueing trigger event");
        self.tx.send(event).await.map_err(|_| QueueError::Closed)
    }
}

impl TriggerReceiver {
    /// Wait for the next event. Returns `None` once every sender is dropped.
    pub async fn recv(&mut self) -> Option<TriggerEvent> {
        self.rx.recv().await
    }

    /// Stop accepting new events; already-queued events can still be drained.
    pub fn close(&mut self) {
        self.rx.close();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn events_are_delivered_in_order() {
        let (tx, mut rx) = channel(4);
        let wf = Uuid::new_v4();

        tx.send(TriggerEvent::with_id("a", wf, Map::new())).await.unwrap();
        tx.send(TriggerEvent::with_id("b", wf, Map::new())).await.unwrap();

        assert_eq!(rx.recv().await.unwrap().id, "a");
        assert_eq!(rx.recv().await.unwrap().id, "b");
    }

    #[tokio::test]
    async fn send_after_receiver_dropped_fails() {
        let (tx, rx) = channel(1);
        drop(rx);
        let err = tx
            .send(TriggerEvent::new(Uuid::new_v4(), Map::new()))
            .await
            .unwrap_err();
        assert!(matches!(err, QueueError::Closed));
    }

    #[test]
    fn manual_events_get_unique_ids() {
        let wf = Uuid::new_v4();
        let a = TriggerEvent::new(wf, Map::new());
        let b = TriggerEvent::new(wf, Map::new());
        assert_ne!(a.id, b.id);
    }

    #[test]
    fn event_deserializes_from_camel_case() {
        let wf = Uuid::new_v4();
        let event: TriggerEvent = serde_json::from_value(json!({
            "id": "evt_1",
            "workflowId": wf,
        }))
        .unwrap();
        assert_eq!(event.workflow_id, wf);
        assert!(event.initial_data.is_empty());
    }
}
