//! Per-node status protocol.
//!
//! Each node type family publishes on its own named channel under the single
//! topic [`STATUS_TOPIC`]. A node moves `initial → loading → success | error`
//! within a run. Publishing is fire-and-forget: failures are logged and never
//! abort the run.

use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::broadcast;
use tracing::warn;

pub const STATUS_TOPIC: &str = "status";

/// Lifecycle state of one node within a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NodeStatus {
    Initial,
    Loading,
    Success,
    Error,
}

/// One status channel per node type family.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum StatusChannel {
    #[serde(rename = "initial-execution")]
    Initial,
    #[serde(rename = "manual-trigger-execution")]
    ManualTrigger,
    #[serde(rename = "google-form-trigger-execution")]
    GoogleFormTrigger,
    #[serde(rename = "stripe-trigger-execution")]
    StripeTrigger,
    #[serde(rename = "http-request-execution")]
    HttpRequest,
    #[serde(rename = "openai-execution")]
    OpenAi,
    #[serde(rename = "anthropic-execution")]
    Anthropic,
    #[serde(rename = "gemini-execution")]
    Gemini,
    #[serde(rename = "discord-execution")]
    Discord,
    #[serde(rename = "slack-execution")]
    Slack,
}

impl StatusChannel {
    pub fn name(self) -> &'static str {
        match self {
            Self::Initial           => "initial-execution",
            Self::ManualTrigger     => "manual-trigger-execution",
            Self::GoogleFormTrigger => "google-form-trigger-execution",
            Self::StripeTrigger     => "stripe-trigger-execution",
            Self::HttpRequest       => "http-request-execution",
            Self::OpenAi            => "openai-execution",
            Self::Anthropic         => "anthropic-execution",
            Self::Gemini            => "gemini-execution",
            Self::Discord           => "discord-execution",
            Self::Slack             => "slack-execution",
        }
    }
}

impl fmt::Display for StatusChannel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// A published status message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusEvent {
    pub channel: StatusChannel,
    pub topic: String,
    pub node_id: String,
    pub status: NodeStatus,
    /// Publisher-assigned, strictly increasing across all channels.
    pub sequence: u64,
    pub emitted_at: DateTime<Utc>,
}

#[derive(Debug, Error)]
#[error("status publish failed: {0}")]
pub struct PublishError(pub String);

/// Sink for node status events.
#[async_trait]
pub trait StatusPublisher: Send + Sync {
    async fn publish(
        &self,
        channel: StatusChannel,
        node_id: &str,
        status: NodeStatus,
    ) -> Result<(), PublishError>;
}

/// Publish and swallow failures; status is advisory.
pub async fn publish_status(
    publisher: &dyn StatusPublisher,
    channel: StatusChannel,
    node_id: &str,
    status: NodeStatus,
) {
    if let Err(e) = publisher.publish(channel, node_id, status).await {
        warn!(%channel, node_id, ?status, error = %e, "dropping status event");
    }
}

// ---------------------------------------------------------------------------
// In-process broadcast publisher
// ---------------------------------------------------------------------------

/// Fans status events out to any number of in-process subscribers.
///
/// Publishing with no subscribers succeeds and the event is dropped.
pub struct BroadcastStatusPublisher {
    sender: broadcast::Sender<StatusEvent>,
    sequence: AtomicU64,
}

impl BroadcastStatusPublisher {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self {
            sender,
            sequence: AtomicU64::new(0),
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<StatusEvent> {
        self.sender.subscribe()
    }
}

impl fmt::Debug for BroadcastStatusPublisher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BroadcastStatusPublisher")
            .field("receiver_count", &self.sender.receiver_count())
            .field("sequence", &self.sequence.load(Ordering::Relaxed))
            .finish()
    }
}

#[async_trait]
impl StatusPublisher for BroadcastStatusPublisher {
    async fn publish(
        &self,
        channel: StatusChannel,
        node_id: &str,
        status: NodeStatus,
    ) -> Result<(), PublishError> {
        let event = StatusEvent {
            channel,
            topic: STATUS_TOPIC.to_owned(),
            node_id: node_id.to_owned(),
            status,
            sequence: self.sequence.fetch_add(1, Ordering::SeqCst) + 1,
            emitted_at: Utc::now(),
        };
        // Err only means nobody is listening.
        let _ = self.sender.send(event);
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Aggregation
// ---------------------------------------------------------------------------

/// Latest known status per `(channel, node_id)`.
///
/// "Latest" is the event with the highest `sequence`, so redelivered or
/// out-of-order events never regress a node's displayed status.
#[derive(Debug, Default)]
pub struct StatusBoard {
    latest: HashMap<(StatusChannel, String), StatusEvent>,
}

impl StatusBoard {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn apply(&mut self, event: StatusEvent) {
        let key = (event.channel, event.node_id.clone());
        match self.latest.get(&key) {
            Some(current) if current.sequence >= event.sequence => {}
            _ => {
                self.latest.insert(key, event);
            }
        }
    }

    /// Current status of a node; `Initial` when nothing was seen yet.
    pub fn status(&self, channel: StatusChannel, node_id: &str) -> NodeStatus {
        self.latest
            .get(&(channel, node_id.to_owned()))
            .map_or(NodeStatus::Initial, |e| e.status)
    }

    /// All tracked nodes ordered by the sequence of their latest event.
    pub fn snapshot(&self) -> Vec<&StatusEvent> {
        let mut events: Vec<_> = self.latest.values().collect();
        events.sort_by_key(|e| e.sequence);
        events
    }
}
