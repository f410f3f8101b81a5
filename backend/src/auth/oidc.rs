//! Authorization-code flow against the configured OIDC provider.

use rand::distributions::Alphanumeric;
use rand::Rng;
use reqwest::Client;
use serde::Deserialize;
use url::Url;

use accounts_common::{OidcClaims, OidcSettings};

use super::jwks::JwksClient;

#[derive(Debug, thiserror::Error)]
pub enum OidcError {
    #[error("OIDC provider is not configured")]
    NotConfigured,
    #[error("Provider returned an error: {0}")]
    Provider(String),
    #[error("HTTP error talking to provider: {0}")]
    Http(String),
    #[error("JWKS fetch error: {0}")]
    JwksFetch(String),
    #[error("Key not found for kid: {0}")]
    KeyNotFound(String),
    #[error("Invalid token: {0}")]
    InvalidToken(String),
    #[error("Nonce mismatch")]
    NonceMismatch,
    #[error("Unknown or expired state")]
    StateMismatch,
    #[error("Invalid URL: {0}")]
    InvalidUrl(String),
}

/// Token endpoint response.
#[derive(Debug, Deserialize)]
pub struct TokenResponse {
    pub access_token: String,
    pub id_token: String,
    #[serde(default)]
    pub token_type: Option<String>,
    #[serde(default)]
    pub expires_in: Option<u64>,
}

/// Relying-party client built from the settings loaded at startup.
pub struct OidcClient {
    http_client: Client,
    settings: OidcSettings,
    redirect_uri: String,
    jwks: JwksClient,
}

impl OidcClient {
    pub fn new(settings: OidcSettings, redirect_uri: String) -> Self {
        let http_client = Client::new();
        let jwks = JwksClient::new(http_client.clone(), &settings);
        Self {
            http_client,
            settings,
            redirect_uri,
            jwks,
        }
    }

    pub fn settings(&self) -> &OidcSettings {
        &self.settings
    }

    pub fn redirect_uri(&self) -> &str {
        &self.redirect_uri
    }

    fn ensure_configured(&self) -> Result<(), OidcError> {
        if self.settings.is_configured() {
            Ok(())
        } else {
            Err(OidcError::NotConfigured)
        }
    }

    /// Provider URL the browser is sent to.
    pub fn authorization_url(&self, state: &str, nonce: &str) -> Result<String, OidcError> {
        self.ensure_configured()?;
        let url = Url::parse_with_params(
            &self.settings.authorization_endpoint,
            &[
                ("response_type", "code"),
                ("scope", self.settings.scopes.as_str()),
                ("client_id", self.settings.client_id.as_str()),
                ("redirect_uri", self.redirect_uri.as_str()),
                ("state", state),
                ("nonce", nonce),
            ],
        )
        .map_err(|e| OidcError::InvalidUrl(e.to_string()))?;
        Ok(url.into())
    }

    /// Trade an authorization code for tokens.
    pub async fn exchange_code(&self, code: &str) -> Result<TokenResponse, OidcError> {
        self.ensure_configured()?;
        let params = [
            ("client_id", self.settings.client_id.as_str()),
            ("client_secret", self.settings.client_secret.as_str()),
            ("grant_type", "authorization_code"),
            ("code", code),
            ("redirect_uri", self.redirect_uri.as_str()),
        ];

        let response = self
            .http_client
            .post(&self.settings.token_endpoint)
            .form(&params)
            .send()
            .await
            .map_err(|e| OidcError::Http(e.to_string()))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(OidcError::Provider(format!("token endpoint returned {}: {}", status, body)));
        }

        response
            .json()
            .await
            .map_err(|e| OidcError::Http(e.to_string()))
    }

    /// Claims from the userinfo endpoint.
    pub async fn userinfo(&self, access_token: &str) -> Result<OidcClaims, OidcError> {
        self.http_client
            .get(&self.settings.user_endpoint)
            .bearer_auth(access_token)
            .send()
            .await
            .and_then(|r| r.error_for_status())
            .map_err(|e| OidcError::Http(e.to_string()))?
            .json()
            .await
            .map_err(|e| OidcError::Http(e.to_string()))
    }

    /// Exchange the code, verify the ID token against `nonce`, and return
    /// the userinfo claims for reconciliation.
    pub async fn complete_login(&self, code: &str, nonce: &str) -> Result<OidcClaims, OidcError> {
        let tokens = self.exchange_code(code).await?;
        let id_claims = self.jwks.verify_id_token(&tokens.id_token, Some(nonce)).await?;
        let claims = self.userinfo(&tokens.access_token).await?;

        if let Some(sub) = claims.get_str("sub") {
            if sub != id_claims.sub {
                return Err(OidcError::InvalidToken(
                    "userinfo subject does not match ID token".to_string(),
                ));
            }
        }
        Ok(claims)
    }
}

/// Random value for `state` and `nonce` parameters.
pub fn random_token() -> String {
    rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(32)
        .map(char::from)
        .collect()
}
