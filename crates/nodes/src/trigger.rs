//! INITIAL and trigger nodes.
//!
//! These perform no side effect: the trigger payload is already part of the
//! seed context, so the node records a step and passes the context through.

use async_trait::async_trait;

use crate::{
    Context, NodeError,
    status::StatusChannel,
    traits::{report, NodeExecutor, NodeInput},
};

/// Executor for nodes that only mark their place in the run.
#[derive(Debug, Clone, Copy)]
pub struct PassthroughExecutor {
    channel: StatusChannel,
    step_name: &'static str,
}

impl PassthroughExecutor {
    pub fn initial() -> Self {
        Self { channel: StatusChannel::Initial, step_name: "initial" }
    }

    pub fn manual_trigger() -> Self {
        Self { channel: StatusChannel::ManualTrigger, step_name: "manual-trigger" }
    }

    pub fn google_form_trigger() -> Self {
        Self { channel: StatusChannel::GoogleFormTrigger, step_name: "google-form-trigger" }
    }

    pub fn stripe_trigger() -> Self {
        Self { channel: StatusChannel::StripeTrigger, step_name: "stripe-trigger" }
    }
}

#[async_trait]
impl NodeExecutor for PassthroughExecutor {
    fn channel(&self) -> StatusChannel {
        self.channel
    }

    async fn execute(&self, input: NodeInput<'_>) -> Result<Context, NodeError> {
        let NodeInput { node_id, context, step, status, .. } = input;
        report(status, self.channel, node_id, async move {
            let context = &context;
            step.run(node_id, self.step_name, move || async move { Ok(context.clone()) })
                .await
        })
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::status::{BroadcastStatusPublisher, NodeStatus};
    use crate::StepRunner;
    use serde_json::{json, Value};

    #[tokio::test]
    async fn trigger_passes_context_through_and_reports_status() {
        let publisher = BroadcastStatusPublisher::new(8);
        let mut rx = publisher.subscribe();
        let step = StepRunner::default();
        let ctx = Context::new().contribute("stripe", json!({ "eventType": "charge.succeeded" }));

        let out = PassthroughExecutor::stripe_trigger()
            .execute(NodeInput {
                user_id: "u1",
                node_id: "t1",
                data: &Value::Null,
                context: ctx.clone(),
                step: &step,
                status: &publisher,
            })
            .await
            .unwrap();

        assert_eq!(out, ctx);
        let loading = rx.recv().await.unwrap();
        let success = rx.recv().await.unwrap();
        assert_eq!(loading.channel, StatusChannel::StripeTrigger);
        assert_eq!((loading.status, success.status), (NodeStatus::Loading, NodeStatus::Success));
        assert_eq!(step.completed_steps(), 1);
    }
}
