//! Command-line and environment configuration.
//!
//! Every setting is a flag with an environment-variable fallback, so the
//! same binary runs from a shell or from a container environment.

use std::sync::Arc;
use std::time::Duration;

use anyhow::Context as _;
use clap::Args;

use api::WebhookSecrets;
use db::{pool, CredentialCipher, DbPool};
use engine::{DbCredentialStore, ExecutorConfig, ExecutorRegistry, WorkflowExecutor};
use nodes::{ExecutorDeps, ProviderSettings, StatusPublisher};

const MAX_RETRIES_LIMIT: i64 = 10;

#[derive(Debug, Args)]
pub struct DatabaseArgs {
    /// SQLite database URL; the file is created when missing.
    #[arg(long, env = "DATABASE_URL", default_value = "sqlite://nodeflow.db")]
    pub database_url: String,

    #[arg(long, env = "NODEFLOW_DB_MAX_CONNECTIONS", default_value_t = 10)]
    pub max_connections: u32,
}

impl DatabaseArgs {
    /// Connect and bring the schema up to date.
    pub async fn connect(&self) -> anyhow::Result<DbPool> {
        let pool = pool::create_pool(&self.database_url, self.max_connections)
            .await
            .context("failed to connect to database")?;
        pool::run_migrations(&pool).await.context("migration failed")?;
        Ok(pool)
    }
}

#[derive(Args)]
pub struct EngineArgs {
    /// Secret the credential encryption key is derived from.
    #[arg(long, env = "ENCRYPTION_KEY", hide_env_values = true)]
    pub encryption_key: String,

    /// Re-attempts per step; each waits twice as long as the last.
    #[arg(
        long,
        env = "NODEFLOW_MAX_RETRIES",
        default_value_t = 3,
        value_parser = clap::value_parser!(u32).range(0..=MAX_RETRIES_LIMIT)
    )]
    pub max_retries: u32,

    #[arg(long, env = "NODEFLOW_RETRY_BASE_DELAY_MS", default_value_t = 100)]
    pub retry_base_delay_ms: u64,

    /// Timeout applied to every outbound HTTP call made by a node.
    #[arg(long, env = "NODEFLOW_HTTP_TIMEOUT_SECS", default_value_t = 30)]
    pub http_timeout_secs: u64,

    #[arg(long, env = "OPENAI_API_KEY", hide_env_values = true)]
    pub openai_api_key: Option<String>,

    #[arg(long, env = "ANTHROPIC_API_KEY", hide_env_values = true)]
    pub anthropic_api_key: Option<String>,

    #[arg(long, env = "GOOGLE_GENERATIVE_AI_API_KEY", hide_env_values = true)]
    pub gemini_api_key: Option<String>,

    #[arg(long, env = "OPENAI_BASE_URL")]
    pub openai_base_url: Option<String>,

    #[arg(long, env = "ANTHROPIC_BASE_URL")]
    pub anthropic_base_url: Option<String>,

    #[arg(long, env = "GEMINI_BASE_URL")]
    pub gemini_base_url: Option<String>,
}

impl EngineArgs {
    pub fn executor_config(&self) -> ExecutorConfig {
        ExecutorConfig {
            max_retries: self.max_retries,
            retry_base_delay: Duration::from_millis(self.retry_base_delay_ms),
        }
    }

    pub fn provider_settings(&self) -> ProviderSettings {
        let defaults = ProviderSettings::default();
        ProviderSettings {
            openai_base_url: self.openai_base_url.clone().unwrap_or(defaults.openai_base_url),
            anthropic_base_url: self
                .anthropic_base_url
                .clone()
                .unwrap_or(defaults.anthropic_base_url),
            gemini_base_url: self.gemini_base_url.clone().unwrap_or(defaults.gemini_base_url),
            openai_api_key: self.openai_api_key.clone(),
            anthropic_api_key: self.anthropic_api_key.clone(),
            gemini_api_key: self.gemini_api_key.clone(),
        }
    }

    /// Wire the registry of built-in executors and the orchestrator.
    pub fn build_executor(
        &self,
        pool: DbPool,
        status: Arc<dyn StatusPublisher>,
    ) -> anyhow::Result<WorkflowExecutor> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(self.http_timeout_secs))
            .build()
            .context("failed to build HTTP client")?;
        let credentials = DbCredentialStore::new(
            pool.clone(),
            CredentialCipher::from_secret(&self.encryption_key),
        );
        let deps = ExecutorDeps::new(http, self.provider_settings(), Arc::new(credentials));
        let registry = ExecutorRegistry::builtin(deps);

        Ok(WorkflowExecutor::new(
            pool,
            Arc::new(registry),
            status,
            self.executor_config(),
        ))
    }
}

#[derive(Args)]
pub struct WebhookArgs {
    #[arg(long, env = "GOOGLE_WEBHOOK_SECRET", hide_env_values = true)]
    pub google_webhook_secret: Option<String>,

    #[arg(long, env = "STRIPE_WEBHOOK_SECRET", hide_env_values = true)]
    pub stripe_webhook_secret: Option<String>,
}

impl WebhookArgs {
    pub fn secrets(&self) -> WebhookSecrets {
        WebhookSecrets {
            google_form: self.google_webhook_secret.clone(),
            stripe: self.stripe_webhook_secret.clone(),
        }
    }
}
