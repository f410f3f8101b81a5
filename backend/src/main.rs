use std::path::Path;
use std::sync::Arc;

use tokio::net::TcpListener;

use accounts_backend::settings_file::load_oidc_settings;
use accounts_backend::{app, logging, AppState, Config, SessionStore, SqliteStore};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Load configuration
    let config = Config::load()?;

    logging::init(&config.logging.level);

    tracing::info!("Starting accounts service");

    let store = Arc::new(SqliteStore::new(&config.database.url)?);

    let oidc_settings = load_oidc_settings(Path::new(&config.oidc.env_file))?;
    if oidc_settings.is_configured() {
        tracing::info!(
            client_id = %oidc_settings.client_id,
            sign_algo = %oidc_settings.sign_algo,
            "Loaded OIDC settings from {}",
            config.oidc.env_file
        );
    } else {
        tracing::warn!(
            "OIDC provider is not configured; sign in at /admin/login/ and fill in /oidc-config/"
        );
    }

    let expired = store.clear_expired(chrono::Utc::now())?;
    if expired > 0 {
        tracing::info!("Removed {} expired sessions", expired);
    }

    let addr = format!("{}:{}", config.server.host, config.server.port);
    let state = Arc::new(AppState::new(config, store, oidc_settings)?);

    tracing::info!("Listening on {}", addr);
    let listener = TcpListener::bind(&addr).await?;
    axum::serve(listener, app(state)).await?;

    Ok(())
}
