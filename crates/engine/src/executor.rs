//! Workflow execution engine.
//!
//! `WorkflowExecutor` is the central orchestrator for one run:
//! 1. Records the execution, keyed by `(trigger_event_id, workflow_id)`;
//!    a repeated trigger event is reported as already processed.
//! 2. Loads the graph and produces a topological ordering.
//! 3. Dispatches each node through the `ExecutorRegistry`, threading the
//!    context from node to node, strictly one node at a time.
//! 4. Stops at the first failing node.
//! 5. Writes the terminal status exactly once.

use std::sync::Arc;
use std::time::Duration;

use serde_json::{Map, Value};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument, Span};
use uuid::Uuid;

use db::{
    repository::{executions, workflows},
    DbError, DbPool,
};
use nodes::{Context, NodeExecutor, NodeInput, RetryPolicy, StatusPublisher, StepRunner};

use crate::{dag::topological_sort, models::Node, EngineError, ExecutorRegistry, Workflow};

// ---------------------------------------------------------------------------
// Configuration
// ---------------------------------------------------------------------------

/// Tuning knobs for the executor.
#[derive(Debug, Clone)]
pub struct ExecutorConfig {
    /// Maximum number of times a retryable step failure will be retried.
    pub max_retries: u32,
    /// Base delay for exponential back-off between retries.
    pub retry_base_delay: Duration,
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            retry_base_delay: Duration::from_millis(100),
        }
    }
}

impl ExecutorConfig {
    fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_retries: self.max_retries,
            base_delay: self.retry_base_delay,
        }
    }
}

// ---------------------------------------------------------------------------
// Output of a run
// ---------------------------------------------------------------------------

/// How a trigger event was handled.
#[derive(Debug, Clone, PartialEq)]
pub enum RunOutcome {
    /// Every node succeeded; `output` is the final context.
    Succeeded { execution_id: Uuid, output: Value },
    /// The run stopped at a failing node, a bad graph, or cancellation.
    Failed { execution_id: Uuid, error: String },
    /// This trigger event already has an execution for the workflow.
    AlreadyProcessed { execution_id: Uuid },
}

impl RunOutcome {
    pub fn execution_id(&self) -> Uuid {
        match self {
            Self::Succeeded { execution_id, .. }
            | Self::Failed { execution_id, .. }
            | Self::AlreadyProcessed { execution_id } => *execution_id,
        }
    }
}

// ---------------------------------------------------------------------------
// WorkflowExecutor
// ---------------------------------------------------------------------------

/// Orchestrator shared by every run in the process.
pub struct WorkflowExecutor {
    pool: DbPool,
    registry: Arc<ExecutorRegistry>,
    status: Arc<dyn StatusPublisher>,
    config: ExecutorConfig,
}

impl WorkflowExecutor {
    pub fn new(
        pool: DbPool,
        registry: Arc<ExecutorRegistry>,
        status: Arc<dyn StatusPublisher>,
        config: ExecutorConfig,
    ) -> Self {
        Self { pool, registry, status, config }
    }

    /// Run `workflow_id` once for `trigger_event_id`.
    ///
    /// Node failures are not errors here: they end the run as
    /// [`RunOutcome::Failed`] and are recorded on the execution row.
    ///
    /// # Errors
    /// [`EngineError::WorkflowNotFound`] when the workflow does not exist, or
    /// [`EngineError::Database`] when the execution row cannot be written.
    #[instrument(
        skip_all,
        fields(
            workflow_id = %workflow_id,
            trigger_event_id = %trigger_event_id,
            execution_id = tracing::field::Empty,
        )
    )]
    pub async fn run(
        &self,
        workflow_id: Uuid,
        trigger_event_id: &str,
        initial_data: Map<String, Value>,
        cancel: Option<&CancellationToken>,
    ) -> Result<RunOutcome, EngineError> {
        // ------------------------------------------------------------------
        // Record the execution; the trigger event id is the idempotency key.
        // ------------------------------------------------------------------
        let execution_id =
            match executions::create_execution(&self.pool, workflow_id, trigger_event_id).await {
                Ok(row) => row.id,
                Err(DbError::Duplicate) => {
                    let existing =
                        executions::find_by_trigger(&self.pool, workflow_id, trigger_event_id)
                            .await?;
                    info!(execution_id = %existing.id, "trigger event already processed");
                    return Ok(RunOutcome::AlreadyProcessed {
                        execution_id: existing.id,
                    });
                }
                Err(DbError::NotFound) => return Err(EngineError::WorkflowNotFound(workflow_id)),
                Err(e) => return Err(e.into()),
            };
        Span::current().record("execution_id", tracing::field::display(execution_id));

        // ------------------------------------------------------------------
        // Drive the run, then write the terminal status once.
        // ------------------------------------------------------------------
        match self.drive(workflow_id, initial_data, cancel).await {
            Ok(context) => {
                let output = context.into_value();
                executions::mark_succeeded(&self.pool, execution_id, &output).await?;
                info!("execution succeeded");
                Ok(RunOutcome::Succeeded { execution_id, output })
            }
            Err(err) => {
                let message = err.to_string();
                error!(error = %message, "execution failed");
                executions::mark_failed(&self.pool, execution_id, &message, Some(&err.stack()))
                    .await?;
                Ok(RunOutcome::Failed { execution_id, error: message })
            }
        }
    }

    async fn drive(
        &self,
        workflow_id: Uuid,
        initial_data: Map<String, Value>,
        cancel: Option<&CancellationToken>,
    ) -> Result<Context, EngineError> {
        let graph = workflows::get_workflow_graph(&self.pool, workflow_id).await?;
        let workflow = Workflow::try_from(graph)?;

        let order = topological_sort(&workflow.nodes, &workflow.connections)?;
        info!(
            nodes = order.len(),
            order = ?order.iter().map(|n| n.id.as_str()).collect::<Vec<_>>(),
            "graph sorted"
        );

        // Resolve every executor before the first side effect.
        let plan = order
            .into_iter()
            .map(|node| {
                self.registry
                    .get(node.node_type)
                    .map(|executor| (node, executor))
                    .ok_or(EngineError::NoExecutor(node.node_type))
            })
            .collect::<Result<Vec<(&Node, Arc<dyn NodeExecutor>)>, _>>()?;

        let user_id = workflow.user_id.as_str();
        let step = StepRunner::new(self.config.retry_policy());
        let mut context = Context::from(initial_data);

        for (node, executor) in plan {
            if cancel.is_some_and(CancellationToken::is_cancelled) {
                info!(node_id = %node.id, "cancelled before dispatch");
                return Err(EngineError::Cancelled);
            }

            debug!(node_id = %node.id, node_type = %node.node_type, "dispatching node");
            context = executor
                .execute(NodeInput {
                    user_id,
                    node_id: &node.id,
                    data: &node.data,
                    context,
                    step: &step,
                    status: self.status.as_ref(),
                })
                .await
                .map_err(|source| EngineError::NodeFailed {
                    node_id: node.id.clone(),
                    node_type: node.node_type,
                    source,
                })?;
            debug!(node_id = %node.id, "node succeeded");
        }

        Ok(context)
    }
}
