//! Ringi API Server
//!
//! Main entry point for the approval workflow service.

use std::sync::Arc;

use anyhow::Context;
use tokio::net::TcpListener;
use tracing::info;
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

use ringi_api::{AppState, create_router};
use ringi_clients::UpstreamClients;
use ringi_core::workflow::{ApprovalStateMachine, InMemoryStore, WorkflowStore};
use ringi_db::{PgWorkflowStore, connect_with};
use ringi_shared::{AppConfig, LogFormat, StorageBackend};

fn init_tracing(format: LogFormat) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "ringi=debug,tower_http=debug".into());
    let registry = tracing_subscriber::registry().with(filter);
    match format {
        LogFormat::Json => registry.with(tracing_subscriber::fmt::layer().json()).init(),
        LogFormat::Pretty => registry.with(tracing_subscriber::fmt::layer()).init(),
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables from .env file
    dotenvy::dotenv().ok();

    let config = AppConfig::load().context("Failed to load configuration")?;
    init_tracing(config.logging.format);

    let store: Arc<dyn WorkflowStore> = match config.storage.backend {
        StorageBackend::Postgres => {
            let db = connect_with(&config.database).await?;
            info!("Connected to database");
            Arc::new(PgWorkflowStore::new(db))
        }
        StorageBackend::Memory => {
            info!("Using in-memory storage");
            Arc::new(InMemoryStore::new())
        }
    };

    let clients = UpstreamClients::from_config(&config.upstream)?;
    info!(
        group_url = %config.upstream.group_url,
        user_url = %config.upstream.user_url,
        business_url = %config.upstream.business_url,
        "Upstream services configured"
    );

    let machine = ApprovalStateMachine::new(
        store,
        Arc::new(clients.groups),
        Arc::new(clients.users),
        Arc::new(clients.business),
        config.engine.clone(),
    );
    let app = create_router(AppState::new(machine));

    let addr = format!("{}:{}", config.server.host, config.server.port);
    let listener = TcpListener::bind(&addr).await?;
    info!("Server listening on {}", addr);

    axum::serve(listener, app).await?;

    Ok(())
}
