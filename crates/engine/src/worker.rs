//! Trigger worker: drains the trigger queue and starts one run per event.
//!
//! Runs for different events proceed concurrently and share nothing but the
//! database pool. Within a run, nodes execute sequentially.

use std::sync::Arc;

use queue::{TriggerEvent, TriggerReceiver};
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, instrument, warn};

use crate::{RunOutcome, WorkflowExecutor};

pub struct TriggerWorker {
    executor: Arc<WorkflowExecutor>,
    receiver: TriggerReceiver,
}

impl TriggerWorker {
    pub fn new(executor: Arc<WorkflowExecutor>, receiver: TriggerReceiver) -> Self {
        Self { executor, receiver }
    }

    /// Process events until `shutdown` fires or every sender is dropped,
    /// then wait for in-flight runs to finish.
    pub async fn run(mut self, shutdown: CancellationToken) {
        info!("trigger worker started");
        let mut in_flight = JoinSet::new();

        loop {
            tokio::select! {
                _ = shutdown.cancelled() => break,
                event = self.receiver.recv() => match event {
                    Some(event) => {
                        let executor = Arc::clone(&self.executor);
                        in_flight.spawn(dispatch(executor, event));
                    }
                    None => break,
                },
                Some(joined) = in_flight.join_next(), if !in_flight.is_empty() => {
                    if let Err(e) = joined {
                        error!(error = %e, "run task panicked");
                    }
                }
            }
        }

        self.receiver.close();
        info!(in_flight = in_flight.len(), "trigger worker stopping");
        while let Some(joined) = in_flight.join_next().await {
            if let Err(e) = joined {
                error!(error = %e, "run task panicked");
            }
        }
    }
}

#[instrument(skip_all, fields(event_id = %event.id, workflow_id = %event.workflow_id))]
async fn dispatch(executor: Arc<WorkflowExecutor>, event: TriggerEvent) {
    match executor
        .run(event.workflow_id, &event.id, event.initial_data, None)
        .await
    {
        Ok(RunOutcome::Succeeded { execution_id, .. }) => {
            info!(%execution_id, "run succeeded");
        }
        Ok(RunOutcome::Failed { execution_id, error }) => {
            warn!(%execution_id, %error, "run failed");
        }
        Ok(RunOutcome::AlreadyProcessed { execution_id }) => {
            info!(%execution_id, "duplicate trigger event ignored");
        }
        Err(e) => error!(error = %e, "run could not start"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{ExecutorConfig, ExecutorRegistry, NodeType};
    use db::{models::ExecutionStatus, pool::create_memory_pool, repository};
    use nodes::{mock::MockNode, BroadcastStatusPublisher};
    use serde_json::{json, Map};

    #[tokio::test]
    async fn each_event_gets_one_execution() {
        let pool = create_memory_pool().await.unwrap();
        let wf = repository::workflows::create_workflow(&pool, "w", "u").await.unwrap();

        let mut registry = ExecutorRegistry::new();
        registry.register(NodeType::Initial, MockNode::returning("initial", json!({})));
        let executor = Arc::new(WorkflowExecutor::new(
            pool.clone(),
            Arc::new(registry),
            Arc::new(BroadcastStatusPublisher::new(16)),
            ExecutorConfig::default(),
        ));

        let (tx, rx) = queue::channel(8);
        let worker = tokio::spawn(TriggerWorker::new(executor, rx).run(CancellationToken::new()));

        tx.send(TriggerEvent::with_id("evt-1", wf.id, Map::new())).await.unwrap();
        tx.send(TriggerEvent::with_id("evt-1", wf.id, Map::new())).await.unwrap();
        tx.send(TriggerEvent::with_id("evt-2", wf.id, Map::new())).await.unwrap();
        drop(tx);
        worker.await.unwrap();

        let runs = repository::executions::list_executions(&pool, wf.id, 10).await.unwrap();
        assert_eq!(runs.len(), 2);
        assert!(runs.iter().all(|r| r.status == ExecutionStatus::Success));
    }

    #[tokio::test]
    async fn shutdown_stops_intake() {
        let pool = create_memory_pool().await.unwrap();
        let executor = Arc::new(WorkflowExecutor::new(
            pool,
            Arc::new(ExecutorRegistry::new()),
            Arc::new(BroadcastStatusPublisher::new(4)),
            ExecutorConfig::default(),
        ));

        let (tx, rx) = queue::channel(1);
        let shutdown = CancellationToken::new();
        let worker = tokio::spawn(TriggerWorker::new(executor, rx).run(shutdown.clone()));

        shutdown.cancel();
        worker.await.unwrap();
        assert!(tx.send(TriggerEvent::new(uuid::Uuid::new_v4(), Map::new())).await.is_err());
    }
}
