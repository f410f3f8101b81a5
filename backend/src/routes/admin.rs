//! Admin routes.
//!
//! Provides:
//! - Password login for staff accounts (`/admin/login/`)
//! - Read-only session listing, HTML (`/admin/sessions/`) and JSON (`/admin/api/sessions`)

use std::sync::Arc;

use axum::{
    extract::{Query, State},
    http::{HeaderMap, StatusCode},
    middleware,
    response::Response,
    routing::get,
    Form, Json, Router,
};
use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use url::form_urlencoded;

use accounts_common::User;

use crate::auth::guard::session_user;
use crate::auth::{login_user, require_superuser, safe_redirect};
use crate::csrf;
use crate::error::Result;
use crate::passwords::verify_password;
use crate::session::{SessionCodec, SessionData};
use crate::store::SessionRecord;
use crate::templates;
use crate::AppState;

use super::{page, redirect};

/// Identifier recorded in the session for password logins.
pub const PASSWORD_BACKEND: &str = "accounts.auth.PasswordBackend";

const DEFAULT_ADMIN_REDIRECT: &str = "/admin/sessions/";
const LOGIN_FAILED: &str =
    "Please enter the correct email and password for a staff account. Note that both fields may be case-sensitive.";

/// One stored session as shown in the listing.
#[derive(Debug, Clone, Serialize)]
pub struct SessionRow {
    pub session_key: String,
    pub expire_date: String,
    pub expired: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<SessionData>,
    /// Set instead of `data` when the payload cannot be decoded.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl SessionRow {
    pub fn from_record(record: SessionRecord, codec: &SessionCodec, now: DateTime<Utc>) -> Self {
        let expired = record.is_expired(now);
        let (data, error) = match codec.decode(&record.session_data) {
            Ok(data) => (Some(data), None),
            Err(e) => (None, Some(e.to_string())),
        };
        Self {
            session_key: record.session_key,
            expire_date: record.expire_date.to_rfc3339_opts(SecondsFormat::Secs, true),
            expired,
            data,
            error,
        }
    }
}

/// Response for /admin/api/sessions endpoint.
#[derive(Debug, Clone, Serialize)]
pub struct SessionsResponse {
    pub sessions: Vec<SessionRow>,
    pub total: usize,
}

fn list_sessions(state: &AppState) -> Result<SessionsResponse> {
    let now = Utc::now();
    let codec = state.sessions.codec();
    let sessions: Vec<SessionRow> = state
        .sessions
        .store()
        .all()?
        .into_iter()
        .map(|record| SessionRow::from_record(record, codec, now))
        .collect();
    Ok(SessionsResponse {
        total: sessions.len(),
        sessions,
    })
}

/// GET /admin/api/sessions - Stored sessions as JSON
async fn api_sessions(State(state): State<Arc<AppState>>) -> Result<Json<SessionsResponse>> {
    Ok(Json(list_sessions(&state)?))
}

#[derive(Serialize)]
struct SessionRowView<'a> {
    #[serde(flatten)]
    row: &'a SessionRow,
    data_pretty: String,
}

#[derive(Serialize)]
struct SessionsPage<'a> {
    sessions: Vec<SessionRowView<'a>>,
    total: usize,
}

/// GET /admin/sessions/ - Stored sessions as HTML
async fn sessions_page(State(state): State<Arc<AppState>>) -> Result<Response> {
    let listing = list_sessions(&state)?;
    let sessions = listing
        .sessions
        .iter()
        .map(|row| SessionRowView {
            row,
            data_pretty: row
                .data
                .as_ref()
                .and_then(|d| serde_json::to_string_pretty(d).ok())
                .unwrap_or_default(),
        })
        .collect();

    let body = state.templates.render(
        templates::SESSIONS,
        &SessionsPage {
            sessions,
            total: listing.total,
        },
    )?;
    Ok(page(StatusCode::OK, body, vec![]))
}

#[derive(Debug, Deserialize)]
struct LoginQuery {
    next: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct LoginForm {
    email: String,
    password: String,
    next: Option<String>,
    csrfmiddlewaretoken: Option<String>,
}

#[derive(Serialize)]
struct LoginPage<'a> {
    email: &'a str,
    next: &'a str,
    next_query: String,
    error: Option<&'static str>,
    csrf_input: String,
}

fn render_login(
    state: &AppState,
    headers: &HeaderMap,
    email: &str,
    next: &str,
    error: Option<&'static str>,
) -> Result<Response> {
    let token = csrf::current_or_mint(headers);
    let body = state.templates.render(
        templates::ADMIN_LOGIN,
        &LoginPage {
            email,
            next,
            next_query: form_urlencoded::byte_serialize(next.as_bytes()).collect(),
            error,
            csrf_input: csrf::hidden_input(&token),
        },
    )?;
    Ok(page(StatusCode::OK, body, vec![csrf::cookie(&token)]))
}

/// GET /admin/login/ - Staff login form
async fn login_form(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Query(query): Query<LoginQuery>,
) -> Result<Response> {
    let next = safe_redirect(query.next.as_deref(), DEFAULT_ADMIN_REDIRECT);

    if let Some(session) = state.sessions.load_from_headers(&headers)? {
        if session_user(&state, &session)?.is_some_and(|u| u.is_staff) {
            return Ok(redirect(&next, vec![]));
        }
    }

    render_login(&state, &headers, "", &next, None)
}

/// Staff account matching `email` and `password`, if any.
fn check_credentials(state: &AppState, email: &str, password: &str) -> Result<Option<User>> {
    let mut users = state.users.find_by_email(email)?;
    if users.len() != 1 {
        return Ok(None);
    }
    let user = users.remove(0);
    if user.is_active && user.is_staff && verify_password(password, &user.password) {
        Ok(Some(user))
    } else {
        Ok(None)
    }
}

/// POST /admin/login/ - Password login
async fn login_submit(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Form(form): Form<LoginForm>,
) -> Result<Response> {
    csrf::verify(&headers, form.csrfmiddlewaretoken.as_deref())?;
    let next = safe_redirect(form.next.as_deref(), DEFAULT_ADMIN_REDIRECT);

    let Some(mut user) = check_credentials(&state, form.email.trim(), &form.password)? else {
        tracing::info!("Failed admin login for {}", form.email.trim());
        return render_login(&state, &headers, form.email.trim(), &next, Some(LOGIN_FAILED));
    };

    let current = state.sessions.load_from_headers(&headers)?;
    let key = login_user(&state, current.as_ref(), &mut user, PASSWORD_BACKEND)?;
    Ok(redirect(&next, vec![state.sessions.cookie(&key)]))
}

pub fn router(state: Arc<AppState>) -> Router {
    let login_routes = Router::new()
        .route("/admin/login/", get(login_form).post(login_submit))
        .with_state(state.clone());

    let admin_routes = Router::new()
        .route("/admin/sessions/", get(sessions_page))
        .route("/admin/api/sessions", get(api_sessions))
        .route_layer(middleware::from_fn_with_state(state.clone(), require_superuser))
        .with_state(state);

    login_routes.merge(admin_routes)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use serde_json::json;

    #[test]
    fn test_row_decodes_payload() {
        let codec = SessionCodec::new("secret");
        let data = json!({"_auth_user_id": "1"}).as_object().cloned().unwrap();
        let now = Utc::now();
        let row = SessionRow::from_record(
            SessionRecord {
                session_key: "k".to_string(),
                session_data: codec.encode(&data).unwrap(),
                expire_date: now + Duration::hours(1),
            },
            &codec,
            now,
        );
        assert_eq!(row.data, Some(data));
        assert!(row.error.is_none());
        assert!(!row.expired);
    }

    #[test]
    fn test_row_reports_decode_error() {
        let codec = SessionCodec::new("secret");
        let now = Utc::now();
        let row = SessionRow::from_record(
            SessionRecord {
                session_key: "bad".to_string(),
                session_data: "garbage".to_string(),
                expire_date: now - Duration::hours(1),
            },
            &codec,
            now,
        );
        assert!(row.data.is_none());
        assert!(row.error.is_some());
        assert!(row.expired);

        let json = serde_json::to_value(&row).unwrap();
        assert!(json.get("data").is_none());
        assert_eq!(json["session_key"], "bad");
    }
}
