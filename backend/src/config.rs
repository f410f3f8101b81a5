//! Service configuration.

use config::{Config as ConfigLoader, ConfigError, Environment, File};
use serde::Deserialize;

/// Application configuration, loaded once at startup.
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub database: DatabaseConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
    #[serde(default)]
    pub session: SessionConfig,
    #[serde(default)]
    pub oidc: OidcConfig,
    /// Signs session payloads and keys the session auth hash.
    pub secret_key: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    /// Externally visible base URL, used to build the OIDC redirect URI.
    #[serde(default = "default_public_url")]
    pub public_url: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            public_url: default_public_url(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    /// SQLite path, optionally prefixed with `sqlite:`; `:memory:` for tests.
    #[serde(default = "default_database_url")]
    pub url: String,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: default_database_url(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct SessionConfig {
    #[serde(default = "default_cookie_name")]
    pub cookie_name: String,
    /// Session lifetime in seconds (default: two weeks).
    #[serde(default = "default_cookie_age")]
    pub cookie_age_secs: i64,
    #[serde(default)]
    pub secure_cookie: bool,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            cookie_name: default_cookie_name(),
            cookie_age_secs: default_cookie_age(),
            secure_cookie: false,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct OidcConfig {
    /// `KEY=VALUE` file holding the provider settings.
    #[serde(default = "default_env_file")]
    pub env_file: String,
    /// Create local users for unknown emails on first login.
    #[serde(default = "default_true")]
    pub create_user: bool,
    #[serde(default = "default_redirect")]
    pub login_redirect_url: String,
    #[serde(default = "default_redirect")]
    pub login_redirect_url_failure: String,
    #[serde(default = "default_redirect")]
    pub logout_redirect_url: String,
}

impl Default for OidcConfig {
    fn default() -> Self {
        Self {
            env_file: default_env_file(),
            create_user: true,
            login_redirect_url: default_redirect(),
            login_redirect_url_failure: default_redirect(),
            logout_redirect_url: default_redirect(),
        }
    }
}

impl OidcConfig {
    pub fn callback_path() -> &'static str {
        "/oidc/callback/"
    }
}

impl Config {
    /// Load configuration from file and environment variables.
    ///
    /// Configuration sources (in order of precedence):
    /// 1. Environment variables (ACCOUNTS__SECTION__KEY format, ACCOUNTS__SECRET_KEY)
    /// 2. config.toml file (if present)
    /// 3. Built-in defaults
    pub fn load() -> Result<Self, ConfigError> {
        let config = ConfigLoader::builder()
            .add_source(File::with_name("config").required(false))
            .add_source(
                Environment::with_prefix("ACCOUNTS")
                    .prefix_separator("__")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        let config: Config = config.try_deserialize()?;
        if config.secret_key.trim().is_empty() {
            return Err(ConfigError::Message("secret_key must not be empty".to_string()));
        }
        Ok(config)
    }

    /// Absolute redirect URI registered with the provider.
    pub fn redirect_uri(&self) -> String {
        format!(
            "{}{}",
            self.server.public_url.trim_end_matches('/'),
            OidcConfig::callback_path()
        )
    }
}

// Default values
fn default_host() -> String {
    "0.0.0.0".to_string()
}
fn default_port() -> u16 {
    8000
}
fn default_public_url() -> String {
    "http://localhost:8000".to_string()
}
fn default_database_url() -> String {
    "sqlite:./data/accounts.db".to_string()
}
fn default_log_level() -> String {
    "info".to_string()
}
fn default_cookie_name() -> String {
    "sessionid".to_string()
}
fn default_cookie_age() -> i64 {
    60 * 60 * 24 * 14
}
fn default_env_file() -> String {
    ".env".to_string()
}
fn default_redirect() -> String {
    "/".to_string()
}
fn default_true() -> bool {
    true
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_server_config() {
        let server = ServerConfig::default();
        assert_eq!(server.host, "0.0.0.0");
        assert_eq!(server.port, 8000);
    }

    #[test]
    fn test_default_session_config() {
        let session = SessionConfig::default();
        assert_eq!(session.cookie_name, "sessionid");
        assert_eq!(session.cookie_age_secs, 1_209_600);
        assert!(!session.secure_cookie);
    }

    #[test]
    fn test_default_oidc_config() {
        let oidc = OidcConfig::default();
        assert_eq!(oidc.env_file, ".env");
        assert!(oidc.create_user);
        assert_eq!(oidc.login_redirect_url_failure, "/");
    }

    #[test]
    fn test_deserialize_minimal_config() {
        let config: Config = serde_json::from_str(r#"{"secret_key":"k"}"#).unwrap();
        assert_eq!(config.secret_key, "k");
        assert_eq!(config.database.url, "sqlite:./data/accounts.db");
        assert_eq!(config.session.cookie_name, "sessionid");
    }

    #[test]
    fn test_redirect_uri_strips_trailing_slash() {
        let mut config: Config = serde_json::from_str(r#"{"secret_key":"k"}"#).unwrap();
        config.server.public_url = "https://accounts.example.com/".to_string();
        assert_eq!(config.redirect_uri(), "https://accounts.example.com/oidc/callback/");
    }
}
