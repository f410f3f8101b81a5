//! Request guards and the login/logout primitives they rely on.

use std::sync::Arc;

use axum::{
    extract::{Request, State},
    middleware::Next,
    response::Response,
};
use chrono::Utc;
use serde_json::Value;
use url::form_urlencoded;

use accounts_common::User;

use crate::error::{AppError, Result};
use crate::passwords::session_auth_hash;
use crate::session::{
    LoadedSession, SessionData, AUTH_USER_BACKEND_KEY, AUTH_USER_HASH_KEY, AUTH_USER_ID_KEY,
};
use crate::store::StoreError;
use crate::AppState;

pub const OIDC_LOGIN_PATH: &str = "/oidc/authenticate/";
pub const ADMIN_LOGIN_PATH: &str = "/admin/login/";

/// The authenticated user and the session they were resolved from,
/// attached to the request by the guards.
#[derive(Debug, Clone)]
pub struct CurrentUser {
    pub user: User,
    pub session: LoadedSession,
}

/// `login_path?next=<next>` with `next` form-encoded.
pub fn login_redirect(login_path: &str, next: &str) -> String {
    let next: String = form_urlencoded::byte_serialize(next.as_bytes()).collect();
    format!("{}?next={}", login_path, next)
}

/// `next` if it is a local path, otherwise `default`.
pub fn safe_redirect(next: Option<&str>, default: &str) -> String {
    match next {
        Some(path) if path.starts_with('/') && !path.starts_with("//") && !path.contains('\\') => {
            path.to_string()
        }
        _ => default.to_string(),
    }
}

/// User logged into `session`, if the auth keys are present and still
/// valid. A changed password or deactivated account logs the user out.
pub fn session_user(
    state: &AppState,
    session: &LoadedSession,
) -> std::result::Result<Option<User>, StoreError> {
    let Some(user_id) = session
        .data
        .get(AUTH_USER_ID_KEY)
        .and_then(Value::as_str)
        .and_then(|id| id.parse::<i64>().ok())
    else {
        return Ok(None);
    };

    let Some(user) = state.users.find_by_id(user_id)? else {
        return Ok(None);
    };
    if !user.is_active {
        return Ok(None);
    }

    let expected = session_auth_hash(&state.config.secret_key, &user.password);
    match session.data.get(AUTH_USER_HASH_KEY).and_then(Value::as_str) {
        Some(hash) if hash == expected => Ok(Some(user)),
        _ => {
            tracing::debug!("Session auth hash mismatch for user {}", user.id);
            Ok(None)
        }
    }
}

/// Log `user` in: rotate the session key, record the auth keys, and stamp
/// `last_login`. Returns the new session key.
pub fn login_user(
    state: &AppState,
    current: Option<&LoadedSession>,
    user: &mut User,
    backend: &str,
) -> Result<String> {
    let mut data = current.map(|s| s.data.clone()).unwrap_or_default();

    // Another user's data must not leak into this login.
    let previous = data.get(AUTH_USER_ID_KEY).and_then(Value::as_str);
    if previous.is_some_and(|id| id != user.id.to_string()) {
        data = SessionData::new();
    }

    data.insert(AUTH_USER_ID_KEY.to_string(), Value::String(user.id.to_string()));
    data.insert(AUTH_USER_BACKEND_KEY.to_string(), Value::String(backend.to_string()));
    data.insert(
        AUTH_USER_HASH_KEY.to_string(),
        Value::String(session_auth_hash(&state.config.secret_key, &user.password)),
    );

    let key = state
        .sessions
        .cycle_key(current.map(|s| s.key.as_str()), &data)?;

    user.last_login = Some(Utc::now());
    state.users.update(user)?;

    tracing::info!(user_id = user.id, backend = backend, "User logged in");
    Ok(key)
}

/// Requires a live session with an authenticated user.
///
/// No session cookie, or a key the store does not know, is a 404; a known
/// session without a user is sent to the OIDC login.
pub async fn require_login(
    State(state): State<Arc<AppState>>,
    mut request: Request,
    next: Next,
) -> Result<Response> {
    let session = state
        .sessions
        .load_from_headers(request.headers())?
        .ok_or(AppError::SessionNotFound)?;

    let user = session_user(&state, &session)?.ok_or_else(|| AppError::LoginRequired {
        login_url: login_redirect(OIDC_LOGIN_PATH, request.uri().path()),
    })?;

    request.extensions_mut().insert(CurrentUser { user, session });
    Ok(next.run(request).await)
}

/// Requires an authenticated superuser. Anonymous requests go to the admin
/// login; other users are refused.
pub async fn require_superuser(
    State(state): State<Arc<AppState>>,
    mut request: Request,
    next: Next,
) -> Result<Response> {
    let login_required = || AppError::LoginRequired {
        login_url: login_redirect(ADMIN_LOGIN_PATH, request.uri().path()),
    };

    let session = state
        .sessions
        .load_from_headers(request.headers())?
        .ok_or_else(login_required)?;
    let user = session_user(&state, &session)?.ok_or_else(login_required)?;

    if !user.is_superuser {
        tracing::info!(user_id = user.id, "Refused non-superuser");
        return Err(AppError::Forbidden("Superuser access required."));
    }

    request.extensions_mut().insert(CurrentUser { user, session });
    Ok(next.run(request).await)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_login_redirect_encodes_next() {
        assert_eq!(login_redirect(OIDC_LOGIN_PATH, "/"), "/oidc/authenticate/?next=%2F");
        assert_eq!(
            login_redirect(ADMIN_LOGIN_PATH, "/oidc-config/"),
            "/admin/login/?next=%2Foidc-config%2F"
        );
    }

    #[test]
    fn test_safe_redirect_only_allows_local_paths() {
        assert_eq!(safe_redirect(Some("/admin/sessions/"), "/"), "/admin/sessions/");
        assert_eq!(safe_redirect(Some("https://evil.example"), "/"), "/");
        assert_eq!(safe_redirect(Some("//evil.example"), "/"), "/");
        assert_eq!(safe_redirect(Some("/\\evil.example"), "/"), "/");
        assert_eq!(safe_redirect(None, "/home"), "/home");
    }
}
