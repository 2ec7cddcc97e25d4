use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use inzozi_db::db::init_db;
use inzozi_db::{LedgerStore, MemoryLedgerStore, PgLedgerStore};
use inzozi_panel::config::PanelConfig;
use inzozi_panel::{AppState, cli, handlers};
use tracing::{info, warn};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use uuid::Uuid;

#[derive(Parser)]
#[command(name = "inzozi-panel", version, about = "Savings group ledger panel")]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the HTTP API and the overdue sweep
    Serve {
        /// Keep the ledger in process memory instead of PostgreSQL
        #[arg(long)]
        in_memory: bool,
        /// Grant the admin role to this member before serving (repeatable)
        #[arg(long = "admin")]
        admins: Vec<Uuid>,
    },
    /// Run one overdue sweep and exit
    Sweep,
    /// Give a member the admin role
    GrantAdmin { user_id: Uuid },
    /// Sign a session token for a member
    IssueToken {
        user_id: Uuid,
        #[arg(long)]
        name: Option<String>,
        #[arg(long, default_value_t = 24)]
        hours: i64,
    },
}

fn init_tracing(config: &PanelConfig) -> Option<WorkerGuard> {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "inzozi_panel=info,tower_http=info".into());

    match &config.log.directory {
        Some(dir) => {
            let file_appender = tracing_appender::rolling::daily(dir, "inzozi-panel.log");
            let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);
            tracing_subscriber::registry()
                .with(filter)
                .with(tracing_subscriber::fmt::layer())
                .with(
                    tracing_subscriber::fmt::layer()
                        .with_writer(non_blocking)
                        .with_ansi(false),
                )
                .init();
            Some(guard)
        }
        None => {
            tracing_subscriber::registry()
                .with(filter)
                .with(tracing_subscriber::fmt::layer())
                .init();
            None
        }
    }
}

async fn open_store(config: &PanelConfig) -> Result<Arc<dyn LedgerStore>> {
    let database_url = config
        .database_url
        .as_deref()
        .context("DATABASE_URL must be set (or use `serve --in-memory`)")?;
    let pool = init_db(database_url, config.db_max_connections).await?;
    Ok(Arc::new(PgLedgerStore::new(pool)))
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let (config, source) = PanelConfig::load()?;
    let _guard = init_tracing(&config);
    info!("Configuration loaded from {}", source);

    let command = cli.command.unwrap_or(Commands::Serve {
        in_memory: false,
        admins: Vec::new(),
    });

    match command {
        Commands::Serve { in_memory, admins } => {
            let (store, storage): (Arc<dyn LedgerStore>, &'static str) = if in_memory {
                warn!("Running with an in-memory ledger, nothing will be persisted");
                (Arc::new(MemoryLedgerStore::new()), "memory")
            } else {
                (open_store(&config).await?, "postgres")
            };
            run_server(config, store, storage, &admins).await?;
        }
        Commands::Sweep => {
            let state = AppState::new(config.clone(), open_store(&config).await?, "postgres");
            cli::run_sweep(&state.workflow).await?;
        }
        Commands::GrantAdmin { user_id } => {
            let state = AppState::new(config.clone(), open_store(&config).await?, "postgres");
            cli::grant_admin(&state.workflow, user_id).await?;
        }
        Commands::IssueToken {
            user_id,
            name,
            hours,
        } => {
            cli::issue_token(&config.session_secret, user_id, name.as_deref(), hours)?;
        }
    }

    Ok(())
}

async fn run_server(
    config: PanelConfig,
    store: Arc<dyn LedgerStore>,
    storage: &'static str,
    admins: &[Uuid],
) -> Result<()> {
    let port = config.listen_port;
    let sweep_interval = Duration::from_secs(config.sweep.interval_secs);
    let state = AppState::new(config, store, storage);

    for admin in admins {
        cli::grant_admin(&state.workflow, *admin).await?;
    }

    let monitor = state.workflow.overdue_monitor(sweep_interval);
    tokio::spawn(async move {
        monitor.start().await;
    });

    let app = handlers::router(state);

    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    info!("Panel listening on {}", addr);
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("Panel stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
    info!("Shutdown signal received");
}
