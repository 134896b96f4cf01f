use anyhow::{Context, Result};
use clap::Parser;
use helpdesk_service::{app, AppState, Args, ServiceConfig};
use helpdesk_store_sqlite::TicketStore;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

fn init_tracing(config: &ServiceConfig) {
    let env_filter = match EnvFilter::try_from_default_env() {
        Ok(filter) => filter,
        Err(_) => match config.log_filter.parse::<EnvFilter>() {
            Ok(filter) => filter,
            Err(err) => {
                eprintln!(
                    "WARN: HELPDESK_LOG='{}' is not a valid tracing filter ({err}); falling back to 'info'",
                    config.log_filter
                );
                EnvFilter::new("info")
            }
        },
    };

    let subscriber = tracing_subscriber::fmt().with_env_filter(env_filter).with_target(true);
    if config.log_json {
        subscriber.json().init();
    } else {
        subscriber.init();
    }
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        warn!(error = %err, "failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    info!("shutdown signal received");
}

#[tokio::main]
async fn main() -> Result<()> {
    let config = ServiceConfig::from_args(Args::parse()).context("invalid configuration")?;
    init_tracing(&config);
    info!(version = env!("CARGO_PKG_VERSION"), "helpdesk-service starting");

    let store = TicketStore::open(&config.store).context("failed to open ticket store")?;
    let migrate_store = store.clone();
    tokio::task::spawn_blocking(move || migrate_store.migrate())
        .await
        .context("schema migration task failed")?
        .context("failed to migrate ticket store")?;
    info!(db = %config.store.database_path.display(), "ticket store ready");

    let listener = tokio::net::TcpListener::bind(config.bind)
        .await
        .with_context(|| format!("failed to bind {}", config.bind))?;
    if config.allowed_origins.is_empty() {
        warn!("ALLOWED_ORIGINS is empty; browsers will not receive Access-Control-Allow-Origin");
    }
    info!(
        bind = %config.bind,
        max_body_bytes = config.max_body_bytes,
        allowed_origins = ?config.allowed_origins,
        require_agent_role = config.require_agent_role,
        "listening"
    );

    axum::serve(listener, app(AppState::new(store, config)))
        .with_graceful_shutdown(shutdown_signal())
        .await?;
    Ok(())
}
