//! `scout-workflows` CLI entry-point.
//!
//! Every sub-command maps onto one `WorkflowEngine` operation and prints its
//! result as JSON on stdout.  Process logs go to stderr.
//!
//! Without `DATABASE_URL` the in-memory store is used, so state only lives
//! for the duration of one invocation.

mod config;
mod fetcher;

use std::sync::Arc;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use db::{MemoryStore, PgStore, WorkflowStore};
use engine::{
    ListWorkflowsQuery, LogLevel, LogQuery, RunOutcome, TaskRunner, WorkflowEngine,
    WorkflowStatus, WorkflowType,
};
use serde::Serialize;
use serde_json::{json, Value};
use tasks::{DiscoveryTask, WorkflowResult};
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};
use uuid::Uuid;

use crate::{config::Config, fetcher::HttpFetcher};

#[derive(Parser)]
#[command(
    name = "scout-workflows",
    about = "Track long-running discovery, job-monitoring and change-analysis workflows",
    version
)]
struct Cli {
    /// Emit process logs as JSON.
    #[arg(long, global = true)]
    json: bool,

    /// Overrides `DATABASE_URL`.
    #[arg(long, global = true)]
    database_url: Option<String>,

    #[command(subcommand)]
    command: Command,
}

fn parse_json(raw: &str) -> Result<Value, String> {
    serde_json::from_str(raw).map_err(|e| format!("invalid JSON: {e}"))
}

#[derive(Subcommand)]
enum Command {
    /// Run pending database migrations.
    Migrate,
    /// Create a pending workflow instance.
    Create {
        #[arg(long = "type")]
        workflow_type: WorkflowType,
        #[arg(long)]
        site_id: Option<String>,
        #[arg(long)]
        job_id: Option<String>,
        /// Type-specific parameters, as JSON.
        #[arg(long, default_value = "{}", value_parser = parse_json)]
        config: Value,
    },
    /// Show one workflow instance.
    Get { id: Uuid },
    /// List workflow instances, newest first.
    List {
        #[arg(long)]
        page: Option<u32>,
        #[arg(long)]
        limit: Option<u32>,
        #[arg(long = "type")]
        workflow_type: Option<WorkflowType>,
        #[arg(long)]
        status: Option<WorkflowStatus>,
    },
    /// Move a pending instance to running.
    Start { id: Uuid },
    /// Mark an instance completed.
    Complete {
        id: Uuid,
        /// A full `WorkflowResult` as JSON.
        #[arg(long, default_value = r#"{"success":true}"#, value_parser = parse_json)]
        result: Value,
    },
    /// Mark an instance failed.
    Fail {
        id: Uuid,
        #[arg(long)]
        error: String,
    },
    /// Open a running step (and its execution) under an instance.
    StepStart {
        id: Uuid,
        name: String,
        #[arg(long, value_parser = parse_json)]
        config: Option<Value>,
    },
    /// Close a step; a non-empty `--error` marks it failed.
    StepComplete {
        step_id: Uuid,
        #[arg(long, value_parser = parse_json)]
        result: Option<Value>,
        #[arg(long)]
        error: Option<String>,
    },
    /// Show the steps and executions recorded for an instance.
    Steps { id: Uuid },
    /// Append an entry to an instance's log stream.
    Log {
        id: Uuid,
        #[arg(long, default_value = "info")]
        level: LogLevel,
        #[arg(long)]
        message: String,
        #[arg(long, value_parser = parse_json)]
        data: Option<Value>,
        #[arg(long)]
        step_id: Option<Uuid>,
    },
    /// Query an instance's log stream, newest first.
    Logs {
        id: Uuid,
        #[arg(long)]
        step_id: Option<Uuid>,
        #[arg(long)]
        level: Option<LogLevel>,
        #[arg(long)]
        limit: Option<u32>,
        #[arg(long)]
        offset: Option<u32>,
    },
    /// Aggregate stats over the last N days.
    Stats {
        #[arg(long)]
        period_days: Option<u32>,
    },
    /// Delete finished instances and logs older than N days.
    Cleanup {
        #[arg(long)]
        older_than_days: Option<u32>,
    },
    /// Drive a pending instance through its task body.
    Run { id: Uuid },
}

fn init_tracing(json: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let registry = tracing_subscriber::registry().with(filter);

    if json {
        registry
            .with(tracing_subscriber::fmt::layer().json().with_writer(std::io::stderr))
            .init();
    } else {
        registry
            .with(
                tracing_subscriber::fmt::layer()
                    .with_target(true)
                    .with_writer(std::io::stderr),
            )
            .init();
    }
}

fn emit<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn found<T>(value: Option<T>, what: &str, id: Uuid) -> Result<T> {
    value.with_context(|| format!("{what} {id} not found"))
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.json);

    let mut config = Config::from_env()?;
    if cli.database_url.is_some() {
        config.database_url = cli.database_url;
    }

    let pool = match &config.database_url {
        Some(url) => Some(
            db::pool::create_pool(url, config.db_max_connections)
                .await
                .context("failed to connect to database")?,
        ),
        None => None,
    };
    let store: Arc<dyn WorkflowStore> = match &pool {
        Some(pool) => Arc::new(PgStore::new(pool.clone())),
        None => {
            warn!("DATABASE_URL is not set; using the in-memory store");
            Arc::new(MemoryStore::new())
        }
    };
    let engine = WorkflowEngine::new(store, config.engine_config());

    match cli.command {
        Command::Migrate => {
            let Some(pool) = pool else {
                bail!("migrate needs DATABASE_URL or --database-url");
            };
            db::pool::run_migrations(&pool).await.context("migration failed")?;
            info!("Migrations applied successfully");
            Ok(())
        }
        Command::Create {
            workflow_type,
            site_id,
            job_id,
            config,
        } => emit(&engine.create_workflow(workflow_type, site_id, job_id, config).await?),
        Command::Get { id } => emit(&found(engine.get_workflow(id).await?, "workflow", id)?),
        Command::List {
            page,
            limit,
            workflow_type,
            status,
        } => emit(
            &engine
                .list_workflows(ListWorkflowsQuery {
                    page,
                    limit,
                    workflow_type,
                    status,
                })
                .await?,
        ),
        Command::Start { id } => match engine.start_workflow(id).await? {
            Some(started) => emit(&started),
            None => {
                let current = found(engine.get_workflow(id).await?, "workflow", id)?;
                bail!("workflow {id} is {}, not pending", current.status)
            }
        },
        Command::Complete { id, result } => {
            let result: WorkflowResult =
                serde_json::from_value(result).context("--result is not a WorkflowResult")?;
            emit(&found(engine.complete_workflow(id, result).await?, "workflow", id)?)
        }
        Command::Fail { id, error } => {
            emit(&found(engine.fail_workflow(id, error).await?, "workflow", id)?)
        }
        Command::StepStart { id, name, config } => {
            emit(&found(engine.execute_step(id, &name, config).await?, "workflow", id)?)
        }
        Command::StepComplete {
            step_id,
            result,
            error,
        } => {
            if !engine.complete_step(step_id, result, error).await? {
                bail!("step {step_id} not found");
            }
            emit(&engine.get_step(step_id).await?)
        }
        Command::Steps { id } => emit(&json!({
            "steps": engine.get_steps(id).await?,
            "executions": engine.get_executions(id).await?,
        })),
        Command::Log {
            id,
            level,
            message,
            data,
            step_id,
        } => emit(&engine.add_log(id, level, message, data, step_id).await?),
        Command::Logs {
            id,
            step_id,
            level,
            limit,
            offset,
        } => emit(
            &engine
                .get_logs(LogQuery {
                    workflow_instance_id: id,
                    step_id,
                    level,
                    limit,
                    offset,
                })
                .await?,
        ),
        Command::Stats { period_days } => emit(&engine.get_stats(period_days).await?),
        Command::Cleanup { older_than_days } => {
            emit(&engine.cleanup_old_data(older_than_days).await?)
        }
        Command::Run { id } => {
            let fetcher = Arc::new(HttpFetcher::new()?);
            let runner = TaskRunner::new(engine)
                .register(WorkflowType::Discovery, Arc::new(DiscoveryTask::new(fetcher)));
            match runner.run(id).await? {
                RunOutcome::Completed(instance) | RunOutcome::Failed(instance) => emit(&instance),
                RunOutcome::NotFound => bail!("workflow {id} not found"),
                RunOutcome::NotPending(status) => bail!("workflow {id} is {status}, not pending"),
                RunOutcome::NoTaskBody(workflow_type) => {
                    bail!("running {workflow_type} workflows is not supported by this binary")
                }
            }
        }
    }
}
