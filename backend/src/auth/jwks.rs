use std::collections::HashMap;
use std::sync::Arc;

use jsonwebtoken::{decode, decode_header, Algorithm, DecodingKey, Validation};
use reqwest::Client;
use serde::Deserialize;
use tokio::sync::RwLock;

use accounts_common::{OidcSettings, SigningAlgorithm};

use super::OidcError;

/// JWKS key set response.
#[derive(Debug, Deserialize)]
struct JwksResponse {
    keys: Vec<Jwk>,
}

#[derive(Debug, Clone, Deserialize)]
struct Jwk {
    #[serde(default)]
    kid: Option<String>,
    kty: String,
    #[serde(rename = "use", default)]
    key_use: Option<String>,
    n: Option<String>,
    e: Option<String>,
    x: Option<String>,
    y: Option<String>,
}

/// Verified ID token claims we care about.
#[derive(Debug, Clone, Deserialize)]
pub struct IdTokenClaims {
    pub sub: String,
    #[serde(default)]
    pub nonce: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
    pub exp: u64,
}

/// Verifies ID tokens against the provider's keys.
///
/// RS256 and ES256 tokens are checked with keys fetched from the JWKS
/// endpoint (cached, refreshed on a key miss); HS256 tokens with the client
/// secret.
pub struct JwksClient {
    http_client: Client,
    jwks_uri: String,
    algorithm: SigningAlgorithm,
    client_id: String,
    client_secret: String,
    keys: Arc<RwLock<HashMap<String, DecodingKey>>>,
}

impl JwksClient {
    pub fn new(http_client: Client, settings: &OidcSettings) -> Self {
        Self {
            http_client,
            jwks_uri: settings.jwks_endpoint.clone(),
            algorithm: settings.sign_algo,
            client_id: settings.client_id.clone(),
            client_secret: settings.client_secret.clone(),
            keys: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    fn jwt_algorithm(&self) -> Algorithm {
        match self.algorithm {
            SigningAlgorithm::RS256 => Algorithm::RS256,
            SigningAlgorithm::HS256 => Algorithm::HS256,
            SigningAlgorithm::ES256 => Algorithm::ES256,
        }
    }

    async fn refresh_keys(&self) -> Result<(), OidcError> {
        tracing::info!("Fetching JWKS from {}", self.jwks_uri);

        let response: JwksResponse = self
            .http_client
            .get(&self.jwks_uri)
            .send()
            .await
            .and_then(|r| r.error_for_status())
            .map_err(|e| OidcError::JwksFetch(e.to_string()))?
            .json()
            .await
            .map_err(|e| OidcError::JwksFetch(e.to_string()))?;

        let mut keys = self.keys.write().await;
        keys.clear();

        for jwk in response.keys {
            if jwk.key_use.as_deref().is_some_and(|u| u != "sig") {
                continue;
            }
            let kid = jwk.kid.clone().unwrap_or_default();
            let parsed = match (self.algorithm, jwk.kty.as_str()) {
                (SigningAlgorithm::RS256, "RSA") => match (&jwk.n, &jwk.e) {
                    (Some(n), Some(e)) => Some(DecodingKey::from_rsa_components(n, e)),
                    _ => None,
                },
                (SigningAlgorithm::ES256, "EC") => match (&jwk.x, &jwk.y) {
                    (Some(x), Some(y)) => Some(DecodingKey::from_ec_components(x, y)),
                    _ => None,
                },
                _ => None,
            };
            match parsed {
                Some(Ok(key)) => {
                    keys.insert(kid, key);
                }
                Some(Err(e)) => {
                    tracing::warn!("Failed to parse {} key {}: {}", jwk.kty, kid, e);
                }
                None => {}
            }
        }

        tracing::info!("Loaded {} JWKS keys", keys.len());
        Ok(())
    }

    /// Cached key for `kid`; a token without `kid` matches a lone key.
    async fn cached_key(&self, kid: Option<&str>) -> Option<DecodingKey> {
        let keys = self.keys.read().await;
        match kid {
            Some(kid) => keys.get(kid).cloned(),
            None if keys.len() == 1 => keys.values().next().cloned(),
            None => None,
        }
    }

    async fn decoding_key(&self, kid: Option<&str>) -> Result<DecodingKey, OidcError> {
        if self.algorithm == SigningAlgorithm::HS256 {
            return Ok(DecodingKey::from_secret(self.client_secret.as_bytes()));
        }
        if let Some(key) = self.cached_key(kid).await {
            return Ok(key);
        }
        self.refresh_keys().await?;
        self.cached_key(kid)
            .await
            .ok_or_else(|| OidcError::KeyNotFound(kid.unwrap_or("<none>").to_string()))
    }

    /// Verify signature, audience, expiry and nonce of an ID token.
    pub async fn verify_id_token(
        &self,
        token: &str,
        expected_nonce: Option<&str>,
    ) -> Result<IdTokenClaims, OidcError> {
        let header = decode_header(token).map_err(|e| OidcError::InvalidToken(e.to_string()))?;

        let algorithm = self.jwt_algorithm();
        if header.alg != algorithm {
            return Err(OidcError::InvalidToken(format!(
                "Expected {:?} token, got {:?}",
                algorithm, header.alg
            )));
        }

        let key = self.decoding_key(header.kid.as_deref()).await?;

        let mut validation = Validation::new(algorithm);
        validation.set_audience(&[&self.client_id]);

        let token_data = decode::<IdTokenClaims>(token, &key, &validation)
            .map_err(|e| OidcError::InvalidToken(e.to_string()))?;

        if let Some(expected) = expected_nonce {
            if token_data.claims.nonce.as_deref() != Some(expected) {
                return Err(OidcError::NonceMismatch);
            }
        }

        Ok(token_data.claims)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, Utc};
    use jsonwebtoken::{encode, EncodingKey, Header};
    use serde_json::json;

    fn hs256_settings() -> OidcSettings {
        OidcSettings {
            client_id: "test-client".to_string(),
            client_secret: "test-secret".to_string(),
            jwks_endpoint: "http://127.0.0.1:9/jwks".to_string(),
            sign_algo: SigningAlgorithm::HS256,
            ..OidcSettings::default()
        }
    }

    fn hs256_token(secret: &str, aud: &str, nonce: &str, exp_offset: Duration) -> String {
        let claims = json!({
            "sub": "user-1",
            "aud": aud,
            "nonce": nonce,
            "email": "user@example.com",
            "exp": (Utc::now() + exp_offset).timestamp(),
            "iat": Utc::now().timestamp(),
        });
        encode(
            &Header::new(Algorithm::HS256),
            &claims,
            &EncodingKey::from_secret(secret.as_bytes()),
        )
        .unwrap()
    }

    #[tokio::test]
    async fn test_verify_hs256_token() {
        let client = JwksClient::new(Client::new(), &hs256_settings());
        let token = hs256_token("test-secret", "test-client", "n-1", Duration::minutes(5));
        let claims = client.verify_id_token(&token, Some("n-1")).await.unwrap();
        assert_eq!(claims.sub, "user-1");
        assert_eq!(claims.email.as_deref(), Some("user@example.com"));
    }

    #[tokio::test]
    async fn test_reject_nonce_mismatch() {
        let client = JwksClient::new(Client::new(), &hs256_settings());
        let token = hs256_token("test-secret", "test-client", "n-1", Duration::minutes(5));
        let err = client.verify_id_token(&token, Some("n-2")).await.unwrap_err();
        assert!(matches!(err, OidcError::NonceMismatch));
    }

    #[tokio::test]
    async fn test_reject_wrong_audience() {
        let client = JwksClient::new(Client::new(), &hs256_settings());
        let token = hs256_token("test-secret", "someone-else", "n", Duration::minutes(5));
        let err = client.verify_id_token(&token, None).await.unwrap_err();
        assert!(matches!(err, OidcError::InvalidToken(_)));
    }

    #[tokio::test]
    async fn test_reject_expired_token() {
        let client = JwksClient::new(Client::new(), &hs256_settings());
        let token = hs256_token("test-secret", "test-client", "n", Duration::hours(-1));
        assert!(client.verify_id_token(&token, None).await.is_err());
    }

    #[tokio::test]
    async fn test_reject_bad_signature() {
        let client = JwksClient::new(Client::new(), &hs256_settings());
        let token = hs256_token("other-secret", "test-client", "n", Duration::minutes(5));
        assert!(matches!(
            client.verify_id_token(&token, None).await,
            Err(OidcError::InvalidToken(_))
        ));
    }

    #[tokio::test]
    async fn test_reject_algorithm_mismatch() {
        let mut settings = hs256_settings();
        settings.sign_algo = SigningAlgorithm::RS256;
        let client = JwksClient::new(Client::new(), &settings);
        let token = hs256_token("test-secret", "test-client", "n", Duration::minutes(5));
        assert!(matches!(
            client.verify_id_token(&token, None).await,
            Err(OidcError::InvalidToken(_))
        ));
    }
}
