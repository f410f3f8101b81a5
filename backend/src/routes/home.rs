//! Landing page: echoes the decoded session of the signed-in user.

use std::sync::Arc;

use axum::{
    extract::State,
    http::{HeaderMap, StatusCode},
    middleware,
    response::Response,
    routing::get,
    Extension, Router,
};
use serde::Serialize;
use serde_json::Value;

use accounts_common::OidcSettings;

use crate::auth::{require_login, CurrentUser};
use crate::csrf;
use crate::error::Result;
use crate::templates;
use crate::AppState;

use super::page;

#[derive(Debug, Serialize)]
struct SessionEntry {
    key: String,
    value: String,
}

#[derive(Serialize)]
struct HomePage<'a> {
    email: &'a str,
    username: &'a str,
    full_name: String,
    is_superuser: bool,
    session: Vec<SessionEntry>,
    settings: &'a OidcSettings,
    csrf_input: String,
}

/// Strings as-is, everything else as pretty JSON.
fn display_value(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => serde_json::to_string_pretty(other).unwrap_or_else(|_| other.to_string()),
    }
}

/// GET / - Session echo for the current user
async fn home(
    State(state): State<Arc<AppState>>,
    Extension(current): Extension<CurrentUser>,
    headers: HeaderMap,
) -> Result<Response> {
    let token = csrf::current_or_mint(&headers);

    let session = current
        .session
        .data
        .iter()
        .map(|(key, value)| SessionEntry {
            key: key.clone(),
            value: display_value(value),
        })
        .collect();

    let body = state.templates.render(
        templates::HOME,
        &HomePage {
            email: &current.user.email,
            username: &current.user.username,
            full_name: current.user.full_name(),
            is_superuser: current.user.is_superuser,
            session,
            settings: state.oidc_client.settings(),
            csrf_input: csrf::hidden_input(&token),
        },
    )?;

    Ok(page(StatusCode::OK, body, vec![csrf::cookie(&token)]))
}

pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/", get(home))
        .route_layer(middleware::from_fn_with_state(state.clone(), require_login))
        .with_state(state)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_display_value() {
        assert_eq!(display_value(&json!("7")), "7");
        assert_eq!(display_value(&json!(3)), "3");
        assert_eq!(display_value(&json!({"a": 1})), "{\n  \"a\": 1\n}");
    }
}
