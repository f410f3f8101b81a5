//! Server-side sessions.
//!
//! Payloads are JSON objects signed as HS256 JWTs with the service secret
//! key, stored in the [`SessionStore`] and addressed by a random key carried
//! in the session cookie.

use std::collections::HashSet;
use std::sync::Arc;

use axum::http::HeaderMap;
use axum_extra::extract::cookie::{Cookie, CookieJar, SameSite};
use chrono::{DateTime, Duration, Utc};
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use rand::Rng;
use serde_json::{Map, Value};

use crate::config::SessionConfig;
use crate::store::{SessionRecord, SessionStore, StoreError};

/// Decoded session attributes.
pub type SessionData = Map<String, Value>;

pub const AUTH_USER_ID_KEY: &str = "_auth_user_id";
pub const AUTH_USER_BACKEND_KEY: &str = "_auth_user_backend";
pub const AUTH_USER_HASH_KEY: &str = "_auth_user_hash";

const SESSION_KEY_CHARS: &[u8] = b"abcdefghijklmnopqrstuvwxyz0123456789";
const SESSION_KEY_LEN: usize = 32;

#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    #[error("Failed to encode session: {0}")]
    Encode(String),
    #[error("Invalid session payload: {0}")]
    Decode(String),
    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Signs and verifies session payloads.
pub struct SessionCodec {
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    validation: Validation,
}

impl SessionCodec {
    pub fn new(secret_key: &str) -> Self {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.required_spec_claims = HashSet::new();
        validation.validate_exp = false;
        validation.validate_aud = false;

        Self {
            encoding_key: EncodingKey::from_secret(secret_key.as_bytes()),
            decoding_key: DecodingKey::from_secret(secret_key.as_bytes()),
            validation,
        }
    }

    pub fn encode(&self, data: &SessionData) -> Result<String, SessionError> {
        encode(&Header::new(Algorithm::HS256), data, &self.encoding_key)
            .map_err(|e| SessionError::Encode(e.to_string()))
    }

    pub fn decode(&self, encoded: &str) -> Result<SessionData, SessionError> {
        decode::<SessionData>(encoded, &self.decoding_key, &self.validation)
            .map(|data| data.claims)
            .map_err(|e| SessionError::Decode(e.to_string()))
    }
}

/// A live session resolved from a request cookie.
#[derive(Debug, Clone, PartialEq)]
pub struct LoadedSession {
    pub key: String,
    pub data: SessionData,
    pub expire_date: DateTime<Utc>,
}

/// Loads, saves and rotates sessions, and builds the session cookie.
pub struct SessionManager {
    store: Arc<dyn SessionStore>,
    codec: SessionCodec,
    config: SessionConfig,
}

impl SessionManager {
    pub fn new(store: Arc<dyn SessionStore>, secret_key: &str, config: SessionConfig) -> Self {
        Self {
            store,
            codec: SessionCodec::new(secret_key),
            config,
        }
    }

    pub fn codec(&self) -> &SessionCodec {
        &self.codec
    }

    pub fn store(&self) -> &dyn SessionStore {
        self.store.as_ref()
    }

    /// Session key from the request cookie, if any.
    pub fn key_from_headers(&self, headers: &HeaderMap) -> Option<String> {
        CookieJar::from_headers(headers)
            .get(&self.config.cookie_name)
            .map(|cookie| cookie.value().to_string())
            .filter(|key| !key.is_empty())
    }

    /// Live session for `key`. Unknown, expired, and tampered sessions all
    /// come back as `None`.
    pub fn load(&self, key: &str) -> Result<Option<LoadedSession>, SessionError> {
        let Some(record) = self.store.load(key)? else {
            return Ok(None);
        };
        if record.is_expired(Utc::now()) {
            return Ok(None);
        }
        match self.codec.decode(&record.session_data) {
            Ok(data) => Ok(Some(LoadedSession {
                key: record.session_key,
                data,
                expire_date: record.expire_date,
            })),
            Err(e) => {
                tracing::warn!("Discarding session {}: {}", key, e);
                Ok(None)
            }
        }
    }

    pub fn load_from_headers(&self, headers: &HeaderMap) -> Result<Option<LoadedSession>, SessionError> {
        match self.key_from_headers(headers) {
            Some(key) => self.load(&key),
            None => Ok(None),
        }
    }

    /// Write `data` under `key`, pushing the expiry forward.
    pub fn save(&self, key: &str, data: &SessionData) -> Result<(), SessionError> {
        let record = SessionRecord {
            session_key: key.to_string(),
            session_data: self.codec.encode(data)?,
            expire_date: Utc::now() + Duration::seconds(self.config.cookie_age_secs),
        };
        self.store.save(&record)?;
        Ok(())
    }

    /// Store `data` under a fresh key and return it.
    pub fn create(&self, data: &SessionData) -> Result<String, SessionError> {
        let key = new_session_key();
        self.save(&key, data)?;
        Ok(key)
    }

    /// Move `data` to a fresh key, dropping the old row.
    pub fn cycle_key(&self, old_key: Option<&str>, data: &SessionData) -> Result<String, SessionError> {
        if let Some(old) = old_key {
            self.store.delete(old)?;
        }
        self.create(data)
    }

    pub fn flush(&self, key: &str) -> Result<(), SessionError> {
        self.store.delete(key)?;
        Ok(())
    }

    /// Session cookie carrying `key`.
    pub fn cookie(&self, key: &str) -> Cookie<'static> {
        Cookie::build((self.config.cookie_name.clone(), key.to_string()))
            .path("/")
            .http_only(true)
            .same_site(SameSite::Lax)
            .secure(self.config.secure_cookie)
            .max_age(cookie::time::Duration::seconds(self.config.cookie_age_secs))
            .build()
    }

    /// Cookie that removes the session cookie from the browser.
    pub fn removal_cookie(&self) -> Cookie<'static> {
        let mut cookie = Cookie::build((self.config.cookie_name.clone(), ""))
            .path("/")
            .http_only(true)
            .same_site(SameSite::Lax)
            .build();
        cookie.make_removal();
        cookie
    }
}

/// Random session key of lower-case letters and digits.
pub fn new_session_key() -> String {
    let mut rng = rand::thread_rng();
    (0..SESSION_KEY_LEN)
        .map(|_| SESSION_KEY_CHARS[rng.gen_range(0..SESSION_KEY_CHARS.len())] as char)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::SqliteStore;
    use axum::http::header;
    use serde_json::json;

    fn manager() -> SessionManager {
        let store = Arc::new(SqliteStore::new(":memory:").unwrap());
        SessionManager::new(store, "test-secret", SessionConfig::default())
    }

    fn data(pairs: Value) -> SessionData {
        pairs.as_object().cloned().unwrap()
    }

    #[test]
    fn test_codec_roundtrip_preserves_payload() {
        let codec = SessionCodec::new("secret");
        let payload = data(json!({"_auth_user_id": "7", "theme": {"dark": true}}));
        let encoded = codec.encode(&payload).unwrap();
        assert_eq!(codec.decode(&encoded).unwrap(), payload);
    }

    #[test]
    fn test_codec_rejects_other_secret() {
        let encoded = SessionCodec::new("one").encode(&data(json!({"a": 1}))).unwrap();
        assert!(matches!(
            SessionCodec::new("two").decode(&encoded),
            Err(SessionError::Decode(_))
        ));
    }

    #[test]
    fn test_codec_rejects_garbage() {
        assert!(SessionCodec::new("s").decode("not-a-token").is_err());
    }

    #[test]
    fn test_new_session_key_shape() {
        let key = new_session_key();
        assert_eq!(key.len(), 32);
        assert!(key.bytes().all(|b| SESSION_KEY_CHARS.contains(&b)));
        assert_ne!(key, new_session_key());
    }

    #[test]
    fn test_key_from_headers() {
        let sessions = manager();
        let mut headers = HeaderMap::new();
        headers.insert(header::COOKIE, "csrftoken=abc; sessionid=xyz".parse().unwrap());
        assert_eq!(sessions.key_from_headers(&headers).as_deref(), Some("xyz"));

        let mut headers = HeaderMap::new();
        headers.append(header::COOKIE, "a=1".parse().unwrap());
        headers.append(header::COOKIE, "sessionid=k2".parse().unwrap());
        assert_eq!(sessions.key_from_headers(&headers).as_deref(), Some("k2"));

        let mut headers = HeaderMap::new();
        headers.insert(header::COOKIE, "sessionid=".parse().unwrap());
        assert_eq!(sessions.key_from_headers(&headers), None);
        assert_eq!(sessions.key_from_headers(&HeaderMap::new()), None);
    }

    #[test]
    fn test_create_then_load() {
        let sessions = manager();
        let payload = data(json!({"x": "y"}));
        let key = sessions.create(&payload).unwrap();
        let loaded = sessions.load(&key).unwrap().unwrap();
        assert_eq!(loaded.key, key);
        assert_eq!(loaded.data, payload);
    }

    #[test]
    fn test_load_unknown_key() {
        assert!(manager().load("nope").unwrap().is_none());
    }

    #[test]
    fn test_expired_session_is_not_loaded() {
        let sessions = manager();
        sessions
            .store()
            .save(&SessionRecord {
                session_key: "old".to_string(),
                session_data: sessions.codec().encode(&SessionData::new()).unwrap(),
                expire_date: Utc::now() - Duration::minutes(1),
            })
            .unwrap();
        assert!(sessions.load("old").unwrap().is_none());
    }

    #[test]
    fn test_tampered_session_is_not_loaded() {
        let sessions = manager();
        sessions
            .store()
            .save(&SessionRecord {
                session_key: "bad".to_string(),
                session_data: "garbage".to_string(),
                expire_date: Utc::now() + Duration::minutes(5),
            })
            .unwrap();
        assert!(sessions.load("bad").unwrap().is_none());
    }

    #[test]
    fn test_cycle_key_moves_data() {
        let sessions = manager();
        let payload = data(json!({"n": 1}));
        let old = sessions.create(&payload).unwrap();
        let new = sessions.cycle_key(Some(&old), &payload).unwrap();
        assert_ne!(old, new);
        assert!(sessions.load(&old).unwrap().is_none());
        assert_eq!(sessions.load(&new).unwrap().unwrap().data, payload);
    }

    #[test]
    fn test_cookie_attributes() {
        let sessions = manager();
        let issued = sessions.cookie("abc");
        assert_eq!(issued.name(), "sessionid");
        assert_eq!(issued.value(), "abc");
        assert_eq!(issued.path(), Some("/"));
        assert_eq!(issued.http_only(), Some(true));
        assert_eq!(issued.same_site(), Some(SameSite::Lax));
        assert_ne!(issued.secure(), Some(true));
        assert_eq!(
            issued.max_age(),
            Some(cookie::time::Duration::seconds(1_209_600))
        );
        assert!(issued.to_string().starts_with("sessionid=abc"));
    }

    #[test]
    fn test_secure_cookie() {
        let store = Arc::new(SqliteStore::new(":memory:").unwrap());
        let config = SessionConfig {
            secure_cookie: true,
            ..SessionConfig::default()
        };
        let sessions = SessionManager::new(store, "test-secret", config);
        assert_eq!(sessions.cookie("abc").secure(), Some(true));
    }

    #[test]
    fn test_removal_cookie() {
        let issued = manager().removal_cookie();
        assert_eq!(issued.name(), "sessionid");
        assert_eq!(issued.value(), "");
        assert_eq!(issued.path(), Some("/"));
        assert_eq!(issued.max_age(), Some(cookie::time::Duration::ZERO));
    }
}
