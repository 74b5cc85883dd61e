//! `crm-automation` CLI entry-point.
//!
//! Available sub-commands:
//! - `serve`: start the HTTP API over Postgres or a definitions directory.
//! - `migrate`: run pending database migrations.
//! - `validate`: validate a workflow JSON file.
//! - `run`: execute one workflow file in-process against the dry-run backend.
//! - `import`: upsert workflow files into Postgres.

mod config;

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{bail, Context};
use clap::{Parser, Subcommand};
use tracing::info;

use engine::{BranchTargetPolicy, InMemoryStore, PgStore, RunStatus};

use crate::config::LogFormat;

#[derive(Parser)]
#[command(
    name = "crm-automation",
    about = "Workflow execution engine for tourism CRM automations",
    version
)]
struct Cli {
    #[arg(long, global = true, value_enum, env = "LOG_FORMAT", default_value = "text")]
    log_format: LogFormat,

    /// Longest a single `wait` step may suspend a run, in seconds.
    #[arg(long, global = true, env = "WORKFLOW_MAX_WAIT_SECS", default_value_t = 86_400)]
    max_wait_secs: u64,

    /// `fail` or `continue` when a condition names a missing or earlier step.
    #[arg(long, global = true, env = "WORKFLOW_BRANCH_TARGET_POLICY", default_value = "fail")]
    branch_target_policy: BranchTargetPolicy,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Start the REST API server.
    Serve {
        #[arg(long, default_value = "0.0.0.0:8080")]
        bind: SocketAddr,
        /// Use Postgres for definitions and execution records.
        #[arg(long, env = "DATABASE_URL")]
        database_url: Option<String>,
        /// Serve the definitions in this directory from memory when no
        /// database URL is given.
        #[arg(long)]
        definitions: Option<PathBuf>,
        #[arg(long, default_value_t = 10)]
        max_connections: u32,
    },
    /// Run pending database migrations.
    Migrate {
        #[arg(long, env = "DATABASE_URL")]
        database_url: String,
    },
    /// Validate a workflow definition JSON file.
    Validate {
        /// Path to the workflow JSON file.
        path: PathBuf,
    },
    /// Fire a trigger at one workflow file and print the resulting records.
    Run {
        path: PathBuf,
        /// Defaults to the workflow's own trigger type.
        #[arg(long)]
        trigger_type: Option<String>,
        /// Trigger payload as JSON.
        #[arg(long, default_value = "{}")]
        payload: String,
        /// Defaults to the workflow's own workspace.
        #[arg(long)]
        workspace: Option<String>,
        #[arg(long, default_value = "cli")]
        user: String,
    },
    /// Insert or update workflow files (a file or a directory) in Postgres.
    Import {
        path: PathBuf,
        #[arg(long, env = "DATABASE_URL")]
        database_url: String,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    config::init_logging(cli.log_format);
    let executor_config = config::executor_config(cli.max_wait_secs, cli.branch_target_policy);

    match cli.command {
        Command::Serve { bind, database_url, definitions, max_connections } => {
            let dispatcher = match (database_url, definitions) {
                (Some(url), _) => {
                    let pool = db::pool::create_pool(&url, max_connections)
                        .await
                        .context("failed to connect to database")?;
                    config::build_dispatcher(Arc::new(PgStore::new(pool)), executor_config)
                }
                (None, Some(dir)) => {
                    let store = InMemoryStore::with_definitions(config::load_definitions(&dir)?);
                    config::build_dispatcher(Arc::new(store), executor_config)
                }
                (None, None) => bail!("serve needs --database-url or --definitions"),
            };

            info!(%bind, "starting API server");
            api::serve(bind, api::AppState::new(dispatcher)).await?;
        }
        Command::Migrate { database_url } => {
            let pool = db::pool::create_pool(&database_url, 2)
                .await
                .context("failed to connect to database")?;
            db::pool::run_migrations(&pool).await.context("migration failed")?;
            info!("migrations applied");
        }
        Command::Validate { path } => {
            let definition = config::load_definition(&path)?;
            println!(
                "Workflow '{}' is valid: {} steps, trigger '{}'",
                definition.name,
                definition.steps.len(),
                definition.trigger.trigger_type
            );
        }
        Command::Run { path, trigger_type, payload, workspace, user } => {
            let definition = config::load_definition(&path)?;
            let payload: serde_json::Value =
                serde_json::from_str(&payload).context("--payload is not valid JSON")?;
            let trigger_type = trigger_type.unwrap_or_else(|| definition.trigger.trigger_type.clone());
            let workspace = workspace.unwrap_or_else(|| definition.workspace_id.clone());

            let store = Arc::new(InMemoryStore::with_definitions(vec![definition]));
            let dispatcher = config::build_dispatcher(store, executor_config);
            let records = dispatcher.dispatch(&trigger_type, payload, &workspace, &user).await?;

            if records.is_empty() {
                println!("No run started: trigger, workspace or conditions did not match");
                return Ok(());
            }
            println!("{}", serde_json::to_string_pretty(&records)?);
            if records.iter().any(|r| r.status == RunStatus::Failed) {
                bail!("workflow run failed");
            }
        }
        Command::Import { path, database_url } => {
            let definitions = config::load_definitions(&path)?;
            let pool = db::pool::create_pool(&database_url, 2)
                .await
                .context("failed to connect to database")?;
            let store = PgStore::new(pool);
            for definition in &definitions {
                store
                    .save_definition(definition)
                    .await
                    .with_context(|| format!("failed to import '{}'", definition.name))?;
                info!(workflow_id = %definition.id, name = %definition.name, "workflow imported");
            }
            println!("Imported {} workflow(s)", definitions.len());
        }
    }

    Ok(())
}
