pub mod auth;
pub mod config;
pub mod csrf;
pub mod error;
pub mod logging;
pub mod passwords;
pub mod routes;
pub mod session;
pub mod settings_file;
pub mod store;
pub mod templates;
pub mod test_util;

pub use auth::{OidcAuthBackend, OidcClient};
pub use config::Config;
pub use error::AppError;
pub use session::SessionManager;
pub use store::{SessionStore, SqliteStore, UserRepository};
pub use templates::Templates;

use std::sync::Arc;

use axum::{middleware, Router};
use tower_http::trace::TraceLayer;

use accounts_common::OidcSettings;

use crate::templates::TemplateError;

/// Shared application state.
pub struct AppState {
    pub config: Config,
    /// User lookups and writes.
    pub users: Arc<dyn UserRepository>,
    pub sessions: SessionManager,
    /// Claim reconciliation for OIDC logins.
    pub auth_backend: OidcAuthBackend,
    /// Provider client; owns the settings loaded at startup.
    pub oidc_client: OidcClient,
    pub templates: Templates,
}

impl AppState {
    /// Wire the components around one store. `S` backs both users and sessions.
    pub fn new<S>(
        config: Config,
        store: Arc<S>,
        oidc_settings: OidcSettings,
    ) -> Result<Self, TemplateError>
    where
        S: UserRepository + SessionStore + 'static,
    {
        let users: Arc<dyn UserRepository> = store.clone();
        let sessions = SessionManager::new(store, &config.secret_key, config.session.clone());
        let auth_backend = OidcAuthBackend::new(users.clone(), config.oidc.create_user);
        let oidc_client = OidcClient::new(oidc_settings, config.redirect_uri());

        Ok(Self {
            config,
            users,
            sessions,
            auth_backend,
            oidc_client,
            templates: Templates::new()?,
        })
    }
}

/// Build the full router.
pub fn app(state: Arc<AppState>) -> Router {
    Router::new()
        .merge(routes::health::router())
        .merge(routes::home::router(state.clone()))
        .merge(routes::oidc::router(state.clone()))
        .merge(routes::oidc_config::router(state.clone()))
        .merge(routes::admin::router(state))
        .layer(middleware::from_fn(logging::request_logger))
        .layer(TraceLayer::new_for_http())
}
