//! `nodeflow` CLI entry-point.
//!
//! Available sub-commands:
//! - `serve`    start the API server and the trigger worker.
//! - `migrate`  run pending database migrations.
//! - `validate` check a workflow definition file and print its order.
//! - `import`   store a workflow definition file for a user.
//! - `run`      run a stored workflow once, in-process.

mod config;

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{bail, Context as _};
use clap::{Parser, Subcommand};
use serde_json::{Map, Value};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;
use uuid::Uuid;

use config::{DatabaseArgs, EngineArgs, WebhookArgs};
use engine::{check_definition, RunOutcome, TriggerWorker, WorkflowDefinition};
use nodes::{BroadcastStatusPublisher, StatusBoard};

/// Per-subscriber buffer of the status broadcast.
const STATUS_CAPACITY: usize = 1024;

#[derive(Parser)]
#[command(name = "nodeflow", about = "Workflow automation engine", version)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Start the REST API server and the trigger worker.
    Serve {
        #[arg(long, env = "NODEFLOW_BIND", default_value = "0.0.0.0:8080")]
        bind: String,

        /// Capacity of the in-process trigger queue.
        #[arg(
            long,
            env = "NODEFLOW_QUEUE_CAPACITY",
            default_value_t = 1024,
            value_parser = clap::builder::RangedU64ValueParser::<usize>::new().range(1..)
        )]
        queue_capacity: usize,

        #[command(flatten)]
        database: DatabaseArgs,
        #[command(flatten)]
        engine: EngineArgs,
        #[command(flatten)]
        webhooks: WebhookArgs,
    },
    /// Run pending database migrations.
    Migrate {
        #[command(flatten)]
        database: DatabaseArgs,
    },
    /// Validate a workflow definition JSON file.
    Validate {
        /// Path to the workflow JSON file.
        path: PathBuf,
    },
    /// Store a workflow definition JSON file and print its id.
    Import {
        path: PathBuf,
        /// Owner of the workflow; scopes its credential lookups.
        #[arg(long)]
        user_id: String,
        #[command(flatten)]
        database: DatabaseArgs,
    },
    /// Run a stored workflow once and print the outcome.
    Run {
        workflow_id: Uuid,
        /// Initial data as a JSON object.
        #[arg(long)]
        data: Option<String>,
        #[command(flatten)]
        database: DatabaseArgs,
        #[command(flatten)]
        engine: EngineArgs,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let cli = Cli::parse();

    match cli.command {
        Command::Serve { bind, queue_capacity, database, engine, webhooks } => {
            serve(&bind, queue_capacity, database, engine, webhooks).await
        }
        Command::Migrate { database } => {
            database.connect().await?;
            info!("migrations applied successfully");
            Ok(())
        }
        Command::Validate { path } => validate(&path),
        Command::Import { path, user_id, database } => {
            let definition = read_definition(&path)?;
            let pool = database.connect().await?;
            let id = engine::import_workflow(&pool, &definition, &user_id).await?;
            println!("{id}");
            Ok(())
        }
        Command::Run { workflow_id, data, database, engine } => {
            run(workflow_id, data, database, engine).await
        }
    }
}

async fn serve(
    bind: &str,
    queue_capacity: usize,
    database: DatabaseArgs,
    engine: EngineArgs,
    webhooks: WebhookArgs,
) -> anyhow::Result<()> {
    let pool = database.connect().await?;
    let status = Arc::new(BroadcastStatusPublisher::new(STATUS_CAPACITY));
    let executor = engine.build_executor(pool.clone(), status.clone())?;

    let (triggers, receiver) = queue::channel(queue_capacity);
    let shutdown = CancellationToken::new();

    let worker = tokio::spawn(
        TriggerWorker::new(Arc::new(executor), receiver).run(shutdown.clone()),
    );

    let signal = shutdown.clone();
    tokio::spawn(async move {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!(error = %e, "could not listen for ctrl-c");
            return;
        }
        info!("shutdown requested");
        signal.cancel();
    });

    let state = api::AppState {
        pool,
        triggers,
        status,
        secrets: webhooks.secrets(),
    };
    api::serve(bind, state, shutdown.clone()).await?;

    // The server can also stop on its own; the worker must follow either way.
    shutdown.cancel();
    worker.await.context("trigger worker panicked")?;
    Ok(())
}

fn validate(path: &Path) -> anyhow::Result<()> {
    let definition = read_definition(path)?;
    let order = check_definition(&definition)?;

    let ids: Vec<&str> = order.iter().map(|n| n.id.as_str()).collect();
    println!("workflow '{}' is valid; execution order: {}", definition.name, ids.join(" -> "));
    Ok(())
}

async fn run(
    workflow_id: Uuid,
    data: Option<String>,
    database: DatabaseArgs,
    engine: EngineArgs,
) -> anyhow::Result<()> {
    let initial_data = match data {
        None => Map::new(),
        Some(raw) => match serde_json::from_str::<Value>(&raw).context("--data is not valid JSON")? {
            Value::Object(map) => map,
            _ => bail!("--data must be a JSON object"),
        },
    };

    let pool = database.connect().await?;
    let status = Arc::new(BroadcastStatusPublisher::new(STATUS_CAPACITY));
    let mut events = status.subscribe();
    let executor = engine.build_executor(pool, status)?;

    let cancel = CancellationToken::new();
    let on_signal = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("cancelling after the current node");
            on_signal.cancel();
        }
    });

    let event_id = Uuid::new_v4().to_string();
    let outcome = executor
        .run(workflow_id, &event_id, initial_data, Some(&cancel))
        .await?;

    let mut board = StatusBoard::new();
    while let Ok(event) = events.try_recv() {
        board.apply(event);
    }
    for event in board.snapshot() {
        println!("{:<32} {:<24} {:?}", event.channel.name(), event.node_id, event.status);
    }

    match outcome {
        RunOutcome::Succeeded { execution_id, output } => {
            println!("execution {execution_id} succeeded");
            println!("{}", serde_json::to_string_pretty(&output)?);
            Ok(())
        }
        RunOutcome::Failed { execution_id, error } => {
            bail!("execution {execution_id} failed: {error}")
        }
        RunOutcome::AlreadyProcessed { execution_id } => {
            println!("execution {execution_id} already processed");
            Ok(())
        }
    }
}

fn read_definition(path: &Path) -> anyhow::Result<WorkflowDefinition> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("cannot read file {}", path.display()))?;
    serde_json::from_str(&content).context("invalid workflow definition JSON")
}
