//! OIDC relying-party settings and their env-file keys.

use serde::{Deserialize, Serialize};
use url::Url;

use crate::env_file::{is_single_line, EnvFile, EnvFileError};

pub const OIDC_RP_CLIENT_ID: &str = "OIDC_RP_CLIENT_ID";
pub const OIDC_RP_CLIENT_SECRET: &str = "OIDC_RP_CLIENT_SECRET";
pub const OIDC_OP_AUTHORIZATION_ENDPOINT: &str = "OIDC_OP_AUTHORIZATION_ENDPOINT";
pub const OIDC_OP_TOKEN_ENDPOINT: &str = "OIDC_OP_TOKEN_ENDPOINT";
pub const OIDC_OP_USER_ENDPOINT: &str = "OIDC_OP_USER_ENDPOINT";
pub const OIDC_OP_JWKS_ENDPOINT: &str = "OIDC_OP_JWKS_ENDPOINT";
pub const OIDC_RP_SIGN_ALGO: &str = "OIDC_RP_SIGN_ALGO";
pub const OIDC_RP_SCOPES: &str = "OIDC_RP_SCOPES";

/// Every key owned by the settings form, in file order.
pub const OIDC_KEYS: [&str; 8] = [
    OIDC_RP_CLIENT_ID,
    OIDC_RP_CLIENT_SECRET,
    OIDC_OP_AUTHORIZATION_ENDPOINT,
    OIDC_OP_TOKEN_ENDPOINT,
    OIDC_OP_USER_ENDPOINT,
    OIDC_OP_JWKS_ENDPOINT,
    OIDC_RP_SIGN_ALGO,
    OIDC_RP_SCOPES,
];

pub const DEFAULT_SCOPES: &str = "openid email profile";

/// ID token signing algorithms accepted by the settings form.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SigningAlgorithm {
    #[default]
    RS256,
    HS256,
    ES256,
}

impl SigningAlgorithm {
    pub const ALL: [SigningAlgorithm; 3] = [
        SigningAlgorithm::RS256,
        SigningAlgorithm::HS256,
        SigningAlgorithm::ES256,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            SigningAlgorithm::RS256 => "RS256",
            SigningAlgorithm::HS256 => "HS256",
            SigningAlgorithm::ES256 => "ES256",
        }
    }
}

impl std::fmt::Display for SigningAlgorithm {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for SigningAlgorithm {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "RS256" => Ok(SigningAlgorithm::RS256),
            "HS256" => Ok(SigningAlgorithm::HS256),
            "ES256" => Ok(SigningAlgorithm::ES256),
            other => Err(format!("Unsupported signing algorithm: {}", other)),
        }
    }
}

/// Effective OIDC provider settings.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct OidcSettings {
    pub client_id: String,
    #[serde(skip_serializing)]
    pub client_secret: String,
    pub authorization_endpoint: String,
    pub token_endpoint: String,
    pub user_endpoint: String,
    pub jwks_endpoint: String,
    pub sign_algo: SigningAlgorithm,
    pub scopes: String,
}

impl OidcSettings {
    /// Build settings from a key lookup. Missing values fall back to defaults;
    /// an unrecognized algorithm falls back to RS256.
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).unwrap_or_default();
        let scopes = lookup(OIDC_RP_SCOPES)
            .filter(|s| !s.trim().is_empty())
            .unwrap_or_else(|| DEFAULT_SCOPES.to_string());
        Self {
            client_id: get(OIDC_RP_CLIENT_ID),
            client_secret: get(OIDC_RP_CLIENT_SECRET),
            authorization_endpoint: get(OIDC_OP_AUTHORIZATION_ENDPOINT),
            token_endpoint: get(OIDC_OP_TOKEN_ENDPOINT),
            user_endpoint: get(OIDC_OP_USER_ENDPOINT),
            jwks_endpoint: get(OIDC_OP_JWKS_ENDPOINT),
            sign_algo: lookup(OIDC_RP_SIGN_ALGO)
                .and_then(|v| v.parse().ok())
                .unwrap_or_default(),
            scopes,
        }
    }

    pub fn from_env_file(env: &EnvFile) -> Self {
        Self::from_lookup(|key| env.get(key).map(String::from))
    }

    /// Key/value pairs in [`OIDC_KEYS`] order.
    pub fn entries(&self) -> [(&'static str, String); 8] {
        [
            (OIDC_RP_CLIENT_ID, self.client_id.clone()),
            (OIDC_RP_CLIENT_SECRET, self.client_secret.clone()),
            (OIDC_OP_AUTHORIZATION_ENDPOINT, self.authorization_endpoint.clone()),
            (OIDC_OP_TOKEN_ENDPOINT, self.token_endpoint.clone()),
            (OIDC_OP_USER_ENDPOINT, self.user_endpoint.clone()),
            (OIDC_OP_JWKS_ENDPOINT, self.jwks_endpoint.clone()),
            (OIDC_RP_SIGN_ALGO, self.sign_algo.to_string()),
            (OIDC_RP_SCOPES, self.scopes.clone()),
        ]
    }

    /// Merge the eight OIDC keys into `env`, leaving every other line alone.
    /// Nothing is written unless every value fits on one line.
    pub fn apply_to(&self, env: &mut EnvFile) -> Result<(), EnvFileError> {
        let entries = self.entries();
        if let Some((key, _)) = entries.iter().find(|(_, v)| !is_single_line(v)) {
            return Err(EnvFileError::LineBreak(key.to_string()));
        }
        for (key, value) in entries {
            env.set(key, &value)?;
        }
        Ok(())
    }

    /// True when the client id and all four endpoints are set.
    pub fn is_configured(&self) -> bool {
        [
            &self.client_id,
            &self.authorization_endpoint,
            &self.token_endpoint,
            &self.user_endpoint,
            &self.jwks_endpoint,
        ]
        .iter()
        .all(|v| !v.trim().is_empty())
    }

    pub fn scope_list(&self) -> Vec<&str> {
        self.scopes.split_whitespace().collect()
    }
}

/// Provider layouts used to prefill endpoint URLs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProviderType {
    Keycloak,
    Google,
    Auth0,
    Custom,
}

/// Authorization, token, userinfo and JWKS URLs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProviderEndpoints {
    pub authorization: String,
    pub token: String,
    pub user: String,
    pub jwks: String,
}

impl ProviderType {
    pub const ALL: [ProviderType; 4] = [
        ProviderType::Keycloak,
        ProviderType::Google,
        ProviderType::Auth0,
        ProviderType::Custom,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ProviderType::Keycloak => "keycloak",
            ProviderType::Google => "google",
            ProviderType::Auth0 => "auth0",
            ProviderType::Custom => "custom",
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            ProviderType::Keycloak => "Keycloak",
            ProviderType::Google => "Google",
            ProviderType::Auth0 => "Auth0",
            ProviderType::Custom => "Custom",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|p| p.as_str() == value.trim())
    }

    /// Endpoint URLs for this provider. Keycloak expects the realm URL
    /// (`https://host/realms/<realm>`), Auth0 the tenant URL. Returns `None`
    /// for custom providers or when a required base URL is missing/invalid.
    pub fn endpoints(&self, base_url: Option<&str>) -> Option<ProviderEndpoints> {
        match self {
            ProviderType::Google => Some(ProviderEndpoints {
                authorization: "https://accounts.google.com/o/oauth2/v2/auth".to_string(),
                token: "https://oauth2.googleapis.com/token".to_string(),
                user: "https://openidconnect.googleapis.com/v1/userinfo".to_string(),
                jwks: "https://www.googleapis.com/oauth2/v3/certs".to_string(),
            }),
            ProviderType::Keycloak => {
                let base = checked_base(base_url?)?;
                Some(ProviderEndpoints {
                    authorization: format!("{}/protocol/openid-connect/auth", base),
                    token: format!("{}/protocol/openid-connect/token", base),
                    user: format!("{}/protocol/openid-connect/userinfo", base),
                    jwks: format!("{}/protocol/openid-connect/certs", base),
                })
            }
            ProviderType::Auth0 => {
                let base = checked_base(base_url?)?;
                Some(ProviderEndpoints {
                    authorization: format!("{}/authorize", base),
                    token: format!("{}/oauth/token", base),
                    user: format!("{}/userinfo", base),
                    jwks: format!("{}/.well-known/jwks.json", base),
                })
            }
            ProviderType::Custom => None,
        }
    }
}

fn checked_base(base_url: &str) -> Option<&str> {
    let base = base_url.trim().trim_end_matches('/');
    Url::parse(base).ok()?;
    Some(base)
}
