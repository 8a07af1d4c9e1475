//! Command-line interface.

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::adapters::http::{ApiServer, ApiState};
use crate::adapters::sqlite::{
    create_pool, Migrator, SqliteEventLog, SqliteFileEventStore, SqliteRepoStore, SqliteRunStore,
    SqliteTaskStore,
};
use crate::domain::models::{Config, Repository, Task};
use crate::domain::ports::{RepoStore, SystemClock, TaskStore};
use crate::infrastructure::config::ConfigLoader;
use crate::infrastructure::llm::{HttpGenerativeClient, RetryPolicy};
use crate::infrastructure::logging;
use crate::services::{
    AgentRuntime, AgentRuntimeConfig, EventBus, EventBusConfig, LeaseSweeper, LeaseSweeperConfig,
    RealityVerifier, Scheduler, SchedulerConfig, TaskEngine, ToolRegistryBuilder, VerifierTimeouts,
};

#[derive(Parser)]
#[command(name = "foreman", about = "Autonomous multi-agent task orchestrator")]
pub struct Cli {
    /// Path to a config file (defaults to .foreman/config.yaml)
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand)]
pub enum Command {
    /// Run migrations, then start the scheduler, sweeper, and API.
    Serve,
    /// Apply pending schema migrations and exit.
    Migrate,
    /// Register a repository.
    RepoAdd {
        name: String,
        /// Absolute path to the repository root
        path: String,
    },
    /// List registered repositories.
    RepoList,
    /// Submit a task against a repository.
    TaskSubmit {
        repo_id: Uuid,
        /// The engineering request
        request: String,
    },
    /// Show a task.
    TaskShow { id: Uuid },
}

pub async fn run(cli: Cli) -> Result<()> {
    let config = match &cli.config {
        Some(path) => ConfigLoader::load_from_file(path)?,
        None => ConfigLoader::load()?,
    };

    match cli.command {
        Command::Serve => serve(config).await,
        Command::Migrate => {
            let pool = open_pool(&config).await?;
            let applied = Migrator::new(pool).run().await?;
            println!("applied {applied} migration(s)");
            Ok(())
        }
        Command::RepoAdd { name, path } => {
            if !std::path::Path::new(&path).is_dir() {
                bail!("path is not a directory: {path}");
            }
            let pool = migrated_pool(&config).await?;
            let repo = Repository::new(name, path);
            SqliteRepoStore::new(pool).create(&repo).await?;
            println!("{}", repo.id);
            Ok(())
        }
        Command::RepoList => {
            let pool = migrated_pool(&config).await?;
            for repo in SqliteRepoStore::new(pool).list().await? {
                println!("{}  {}  {}", repo.id, repo.name, repo.path);
            }
            Ok(())
        }
        Command::TaskSubmit { repo_id, request } => {
            let pool = migrated_pool(&config).await?;
            let repos = SqliteRepoStore::new(pool.clone());
            if repos.get(repo_id).await?.is_none() {
                bail!("repository {repo_id} not found");
            }
            let task = Task::new(repo_id, request);
            SqliteTaskStore::new(pool).create(&task).await?;
            println!("{}", task.id);
            Ok(())
        }
        Command::TaskShow { id } => {
            let pool = migrated_pool(&config).await?;
            let task = SqliteTaskStore::new(pool)
                .get(id)
                .await?
                .context("task not found")?;
            println!("{}", serde_json::to_string_pretty(&task)?);
            Ok(())
        }
    }
}

async fn open_pool(config: &Config) -> Result<sqlx::SqlitePool> {
    let url = if config.database.path.starts_with("sqlite:") {
        config.database.path.clone()
    } else {
        format!("sqlite://{}", config.database.path)
    };
    Ok(create_pool(&url, config.database.max_connections).await?)
}

async fn migrated_pool(config: &Config) -> Result<sqlx::SqlitePool> {
    let pool = open_pool(config).await?;
    let migrator = Migrator::new(pool.clone());
    migrator.run().await?;
    migrator.ensure_current().await?;
    Ok(pool)
}

/// Wire everything and serve until ctrl-c.
async fn serve(config: Config) -> Result<()> {
    logging::init(&config.logging);

    let pool = migrated_pool(&config).await?;

    let tasks: Arc<dyn TaskStore> = Arc::new(SqliteTaskStore::new(pool.clone()));
    let runs = Arc::new(SqliteRunStore::new(pool.clone()));
    let repos: Arc<dyn RepoStore> = Arc::new(SqliteRepoStore::new(pool.clone()));
    let file_events = Arc::new(SqliteFileEventStore::new(pool.clone()));
    let event_log = Arc::new(SqliteEventLog::new(pool.clone()));

    let bus = Arc::new(EventBus::new(EventBusConfig::default(), event_log));
    let clock = Arc::new(SystemClock);

    let registry = Arc::new(ToolRegistryBuilder::new().with_builtin_tools().build());
    let verifier = Arc::new(RealityVerifier::new(
        registry.clone(),
        file_events,
        VerifierTimeouts {
            file_op: std::time::Duration::from_secs(config.engine.file_tool_timeout_secs),
            command: std::time::Duration::from_secs(config.engine.command_tool_timeout_secs),
        },
    ));

    let retry = RetryPolicy::new(
        config.retry.max_retries,
        config.retry.initial_backoff_ms,
        config.retry.max_backoff_ms,
    );
    let client = Arc::new(HttpGenerativeClient::new(config.llm.clone(), retry)?);

    let runtime = Arc::new(AgentRuntime::new(
        client,
        verifier,
        registry,
        AgentRuntimeConfig {
            max_iterations: config.engine.max_agent_iterations,
            max_coder_reprompts: config.engine.max_coder_reprompts,
            iteration_timeout: config.engine.agent_timeout(),
            review_confidence: config.engine.review_confidence,
            temperature: config.llm.temperature,
        },
    ));

    let engine = Arc::new(TaskEngine::new(
        tasks.clone(),
        runs.clone(),
        repos.clone(),
        bus.clone(),
        runtime,
        clock.clone(),
        config.engine.clone(),
    ));

    let shutdown = CancellationToken::new();

    let scheduler = Arc::new(Scheduler::new(
        tasks.clone(),
        engine,
        bus.clone(),
        SchedulerConfig {
            max_workers: config.max_workers,
            poll_period: std::time::Duration::from_secs(config.engine.poll_period_secs),
        },
        shutdown.clone(),
    ));

    let sweeper = Arc::new(LeaseSweeper::new(
        tasks.clone(),
        bus.clone(),
        clock,
        LeaseSweeperConfig {
            period: std::time::Duration::from_secs(config.engine.sweeper_period_secs),
            lease: config.engine.lease(),
        },
    ));

    let scheduler_handle = tokio::spawn(scheduler.clone().run());
    let sweeper_handle = tokio::spawn(sweeper.run(shutdown.clone()));

    let api = ApiServer::new(Arc::new(ApiState {
        tasks,
        runs,
        repos,
        bus,
        scheduler,
        config: config.api.clone(),
    }));

    let api_shutdown = shutdown.clone();
    let api_handle = tokio::spawn(async move {
        api.serve_with_shutdown(async move { api_shutdown.cancelled().await })
            .await
    });

    tokio::signal::ctrl_c().await?;
    tracing::info!("shutdown signal received");
    shutdown.cancel();

    let _ = scheduler_handle.await;
    let _ = sweeper_handle.await;
    if let Ok(Err(e)) = api_handle.await {
        tracing::warn!(error = %e, "api server exited with error");
    }

    Ok(())
}
