//! Builders shared by unit and integration tests.

use std::path::Path;
use std::sync::Arc;

use axum_extra::extract::cookie::Cookie;
use chrono::{Duration, Utc};
use jsonwebtoken::{encode, Algorithm, EncodingKey, Header};
use tempfile::TempDir;

use accounts_common::{NewUser, OidcSettings, SigningAlgorithm, User};

use crate::auth::login_user;
use crate::config::{
    Config, DatabaseConfig, LoggingConfig, OidcConfig, ServerConfig, SessionConfig,
};
use crate::passwords::hash_password;
use crate::store::{SqliteStore, UserRepository};
use crate::AppState;

pub const TEST_SECRET_KEY: &str = "test-secret-key";
pub const TEST_PASSWORD: &str = "correct horse battery staple";
pub const TEST_CLIENT_ID: &str = "test-client";
pub const TEST_CLIENT_SECRET: &str = "test-client-secret";

pub fn test_config(env_file: &Path) -> Config {
    Config {
        server: ServerConfig {
            host: "127.0.0.1".to_string(),
            port: 8000,
            public_url: "http://testserver".to_string(),
        },
        database: DatabaseConfig {
            url: ":memory:".to_string(),
        },
        logging: LoggingConfig {
            level: "debug".to_string(),
        },
        session: SessionConfig::default(),
        oidc: OidcConfig {
            env_file: env_file.display().to_string(),
            ..OidcConfig::default()
        },
        secret_key: TEST_SECRET_KEY.to_string(),
    }
}

/// HS256 settings whose endpoints all live under `provider_url`.
pub fn test_oidc_settings(provider_url: &str) -> OidcSettings {
    let base = provider_url.trim_end_matches('/');
    OidcSettings {
        client_id: TEST_CLIENT_ID.to_string(),
        client_secret: TEST_CLIENT_SECRET.to_string(),
        authorization_endpoint: format!("{}/authorize", base),
        token_endpoint: format!("{}/token", base),
        user_endpoint: format!("{}/userinfo", base),
        jwks_endpoint: format!("{}/jwks", base),
        sign_algo: SigningAlgorithm::HS256,
        scopes: "openid email profile".to_string(),
    }
}

/// App state over an in-memory store, with the env file in a temp dir.
pub struct TestContext {
    pub state: Arc<AppState>,
    pub store: Arc<SqliteStore>,
    pub dir: TempDir,
}

impl TestContext {
    pub fn env_file(&self) -> std::path::PathBuf {
        self.dir.path().join(".env")
    }
}

pub fn create_test_context(oidc_settings: OidcSettings) -> TestContext {
    create_test_context_with(oidc_settings, |_| {})
}

/// Like [`create_test_context`], letting the caller adjust the config.
pub fn create_test_context_with<F>(oidc_settings: OidcSettings, adjust: F) -> TestContext
where
    F: FnOnce(&mut Config),
{
    let dir = TempDir::new().expect("Failed to create temp dir");
    let mut config = test_config(&dir.path().join(".env"));
    adjust(&mut config);

    let store = Arc::new(SqliteStore::new(&config.database.url).expect("Failed to open store"));
    let state = AppState::new(config, store.clone(), oidc_settings).expect("Failed to build state");

    TestContext {
        state: Arc::new(state),
        store,
        dir,
    }
}

/// Insert a user with [`TEST_PASSWORD`]. Superusers are staff too.
pub fn create_user(store: &SqliteStore, email: &str, superuser: bool) -> User {
    let password = hash_password(TEST_PASSWORD).expect("Failed to hash password");
    let local_part = email.split('@').next().unwrap_or(email);
    let new_user = if superuser {
        NewUser::superuser(email, local_part, password)
    } else {
        NewUser::new(email, local_part, password)
    }
    .expect("Invalid test user");
    store.create(&new_user).expect("Failed to create user")
}

/// Log `user` in and return the session key.
pub fn login_session(state: &AppState, user: &User) -> String {
    let mut user = user.clone();
    login_user(state, None, &mut user, "test").expect("Failed to log in")
}

/// `Cookie` header value for the given name/value pairs.
pub fn cookie_header(cookies: &[(&str, &str)]) -> String {
    cookies
        .iter()
        .map(|(name, value)| Cookie::new(*name, *value).to_string())
        .collect::<Vec<_>>()
        .join("; ")
}

/// HS256 ID token signed with the test client secret.
pub fn generate_id_token(sub: &str, email: Option<&str>, nonce: &str) -> String {
    let now = Utc::now();
    let mut claims = serde_json::json!({
        "iss": "http://provider.test",
        "sub": sub,
        "aud": TEST_CLIENT_ID,
        "nonce": nonce,
        "exp": (now + Duration::hours(1)).timestamp(),
        "iat": now.timestamp(),
    });
    if let Some(email) = email {
        claims["email"] = serde_json::Value::String(email.to_string());
    }

    encode(
        &Header::new(Algorithm::HS256),
        &claims,
        &EncodingKey::from_secret(TEST_CLIENT_SECRET.as_bytes()),
    )
    .expect("Failed to encode JWT")
}
