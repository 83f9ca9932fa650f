//! Tally API Server

use std::sync::Arc;
use tally_api::{auth::PgCredentialStore, create_router, state::AppState};
use tally_core::config::{AppConfig, LoggingConfig};
use tally_core::{CredentialStore, InMemoryCredentialStore};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load configuration: optional TOML file, environment on top
    let config = match std::env::var("TALLY_CONFIG") {
        Ok(path) => AppConfig::from_file(path)?.with_env_override()?,
        Err(_) => AppConfig::from_env()?,
    };

    init_tracing(&config.logging);
    config.validate()?;

    if config.security.uses_development_secret() {
        tracing::warn!("JWT_SECRET is not set; using the development signing key");
    }

    let (store, backend): (Arc<dyn CredentialStore>, &'static str) = match &config.database.url {
        Some(url) => {
            let store = PgCredentialStore::connect(url, config.database.pool_size).await?;
            tracing::info!("Connected to PostgreSQL credential store");
            (Arc::new(store), "postgres")
        }
        None => {
            tracing::warn!("DATABASE_URL is not set; identities are kept in memory only");
            (Arc::new(InMemoryCredentialStore::new()), "memory")
        }
    };

    let addr = format!("{}:{}", config.server.host, config.server.port);

    let state = Arc::new(AppState::new(config, store, backend));
    state.auth.prepare().await?;
    let app = create_router(state);

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!("Tally API Server starting on http://{}", addr);
    tracing::info!("OpenAPI document at http://{}/api-docs/openapi.json", addr);

    axum::serve(listener, app).await?;

    Ok(())
}

fn init_tracing(logging: &LoggingConfig) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new(format!(
            "tally_api={level},tally_core={level},audit=info,tower_http=info",
            level = logging.level
        ))
    });

    let builder = tracing_subscriber::fmt().with_env_filter(filter);
    if logging.json_format {
        builder.json().init();
    } else {
        builder.init();
    }
}
