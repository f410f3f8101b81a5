//! Authorization-code login and logout.
//!
//! `state` and `nonce` live in the session between the redirect to the
//! provider and the callback; each state is accepted once.

use std::sync::Arc;

use axum::{
    extract::{Query, State},
    http::HeaderMap,
    response::Response,
    routing::{get, post},
    Form, Router,
};
use chrono::Utc;
use serde::Deserialize;
use serde_json::{json, Value};

use crate::auth::{
    login_user, random_token, safe_redirect, OidcError, ReconcileError, OIDC_BACKEND,
};
use crate::csrf;
use crate::error::{AppError, Result};
use crate::session::{SessionData, SessionError};
use crate::AppState;

use super::redirect;

pub const OIDC_STATES_KEY: &str = "oidc_states";
pub const OIDC_NEXT_KEY: &str = "oidc_login_next";

/// Pending logins kept per session; the oldest is dropped beyond this.
const MAX_PENDING_STATES: usize = 50;

#[derive(Debug, thiserror::Error)]
enum CallbackError {
    #[error(transparent)]
    Oidc(#[from] OidcError),
    #[error(transparent)]
    Reconcile(#[from] ReconcileError),
    #[error(transparent)]
    Session(#[from] SessionError),
    #[error(transparent)]
    App(#[from] AppError),
    #[error("No active user matches the provider claims")]
    NoUser,
}

/// Record a pending login under `state`.
fn remember_state(data: &mut SessionData, state: &str, nonce: &str) {
    let entry = data
        .entry(OIDC_STATES_KEY)
        .or_insert_with(|| Value::Object(Default::default()));
    if !entry.is_object() {
        *entry = Value::Object(Default::default());
    }
    let Value::Object(states) = entry else {
        return;
    };

    states.insert(
        state.to_string(),
        json!({"nonce": nonce, "added_on": Utc::now().timestamp()}),
    );

    while states.len() > MAX_PENDING_STATES {
        let oldest = states
            .iter()
            .min_by_key(|(_, v)| v.get("added_on").and_then(Value::as_i64).unwrap_or(0))
            .map(|(k, _)| k.clone());
        match oldest {
            Some(key) => {
                states.remove(&key);
            }
            None => break,
        }
    }
}

/// Remove `state` from the pending logins and return its nonce.
fn take_state(data: &mut SessionData, state: &str) -> Option<String> {
    let states = data.get_mut(OIDC_STATES_KEY)?.as_object_mut()?;
    let entry = states.remove(state)?;
    entry.get("nonce").and_then(Value::as_str).map(String::from)
}

#[derive(Debug, Deserialize)]
struct AuthenticateQuery {
    next: Option<String>,
}

/// GET /oidc/authenticate/ - Redirect to the provider
async fn authenticate(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Query(query): Query<AuthenticateQuery>,
) -> Result<Response> {
    let oidc_state = random_token();
    let nonce = random_token();

    let url = match state.oidc_client.authorization_url(&oidc_state, &nonce) {
        Ok(url) => url,
        Err(e) => {
            tracing::error!("Cannot start OIDC login: {}", e);
            return Ok(redirect(&state.config.oidc.login_redirect_url_failure, vec![]));
        }
    };

    let (key, mut data) = match state.sessions.load_from_headers(&headers)? {
        Some(session) => (Some(session.key), session.data),
        None => (None, SessionData::new()),
    };

    remember_state(&mut data, &oidc_state, &nonce);
    data.insert(
        OIDC_NEXT_KEY.to_string(),
        Value::String(safe_redirect(
            query.next.as_deref(),
            &state.config.oidc.login_redirect_url,
        )),
    );

    let key = match key {
        Some(key) => {
            state.sessions.save(&key, &data)?;
            key
        }
        None => state.sessions.create(&data)?,
    };

    Ok(redirect(&url, vec![state.sessions.cookie(&key)]))
}

#[derive(Debug, Deserialize)]
struct CallbackQuery {
    code: Option<String>,
    state: Option<String>,
    error: Option<String>,
    error_description: Option<String>,
}

/// Validate the callback, reconcile the user, and log them in. Returns the
/// new session key and where to send the browser.
async fn finish_login(
    state: &AppState,
    headers: &HeaderMap,
    query: CallbackQuery,
) -> std::result::Result<(String, String), CallbackError> {
    if let Some(error) = query.error {
        return Err(OidcError::Provider(format!(
            "{}: {}",
            error,
            query.error_description.unwrap_or_default()
        ))
        .into());
    }

    let mut session = state
        .sessions
        .load_from_headers(headers)?
        .ok_or(OidcError::StateMismatch)?;
    let returned_state = query.state.ok_or(OidcError::StateMismatch)?;
    let nonce = take_state(&mut session.data, &returned_state).ok_or(OidcError::StateMismatch)?;
    let next = session
        .data
        .remove(OIDC_NEXT_KEY)
        .and_then(|v| v.as_str().map(String::from))
        .unwrap_or_else(|| state.config.oidc.login_redirect_url.clone());
    state.sessions.save(&session.key, &session.data)?;

    let code = query
        .code
        .filter(|c| !c.is_empty())
        .ok_or_else(|| OidcError::Provider("missing authorization code".to_string()))?;

    let claims = state.oidc_client.complete_login(&code, &nonce).await?;
    let mut user = state
        .auth_backend
        .authenticate(&claims)?
        .ok_or(CallbackError::NoUser)?;

    let key = login_user(state, Some(&session), &mut user, OIDC_BACKEND)?;
    Ok((key, next))
}

/// GET /oidc/callback/ - Finish the authorization-code flow
async fn callback(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Query(query): Query<CallbackQuery>,
) -> Response {
    match finish_login(&state, &headers, query).await {
        Ok((key, next)) => redirect(&next, vec![state.sessions.cookie(&key)]),
        Err(e) => {
            tracing::warn!("OIDC login failed: {}", e);
            redirect(&state.config.oidc.login_redirect_url_failure, vec![])
        }
    }
}

#[derive(Debug, Deserialize)]
struct LogoutForm {
    csrfmiddlewaretoken: Option<String>,
}

/// POST /oidc/logout/ - End the local session
async fn logout(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Form(form): Form<LogoutForm>,
) -> Result<Response> {
    csrf::verify(&headers, form.csrfmiddlewaretoken.as_deref())?;

    if let Some(key) = state.sessions.key_from_headers(&headers) {
        state.sessions.flush(&key)?;
        tracing::info!("Session flushed on logout");
    }

    Ok(redirect(
        &state.config.oidc.logout_redirect_url,
        vec![state.sessions.removal_cookie()],
    ))
}

pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/oidc/authenticate/", get(authenticate))
        .route("/oidc/callback/", get(callback))
        .route("/oidc/logout/", post(logout))
        .with_state(state)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_state_is_single_use() {
        let mut data = SessionData::new();
        remember_state(&mut data, "s1", "n1");
        remember_state(&mut data, "s2", "n2");

        assert_eq!(take_state(&mut data, "s1").as_deref(), Some("n1"));
        assert_eq!(take_state(&mut data, "s1"), None);
        assert_eq!(take_state(&mut data, "s2").as_deref(), Some("n2"));
    }

    #[test]
    fn test_unknown_state() {
        let mut data = SessionData::new();
        assert_eq!(take_state(&mut data, "nope"), None);
        remember_state(&mut data, "s1", "n1");
        assert_eq!(take_state(&mut data, "nope"), None);
    }

    #[test]
    fn test_pending_states_are_capped() {
        let mut data = SessionData::new();
        for i in 0..(MAX_PENDING_STATES + 5) {
            remember_state(&mut data, &format!("s{}", i), "n");
        }
        let states = data.get(OIDC_STATES_KEY).and_then(Value::as_object).unwrap();
        assert_eq!(states.len(), MAX_PENDING_STATES);
    }

    #[test]
    fn test_corrupt_states_entry_is_replaced() {
        let mut data = SessionData::new();
        data.insert(OIDC_STATES_KEY.to_string(), Value::String("junk".to_string()));
        remember_state(&mut data, "s1", "n1");
        assert_eq!(take_state(&mut data, "s1").as_deref(), Some("n1"));
    }
}
