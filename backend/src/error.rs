//! Request-level error type.

use axum::http::{header, StatusCode};
use axum::response::{Html, IntoResponse, Response};

use crate::auth::OidcError;
use crate::session::SessionError;
use crate::settings_file::SettingsError;
use crate::store::StoreError;
use crate::templates::TemplateError;

/// Errors a handler can surface to the client.
#[derive(Debug, thiserror::Error)]
pub enum AppError {
    /// Missing cookie and unknown session share this variant so the two
    /// causes look identical to the client.
    #[error("Session not found")]
    SessionNotFound,

    #[error("Forbidden: {0}")]
    Forbidden(&'static str),

    #[error("Bad request: {0}")]
    BadRequest(String),

    /// Anonymous request to a guarded page.
    #[error("Login required")]
    LoginRequired { login_url: String },

    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    #[error("Session error: {0}")]
    Session(#[from] SessionError),

    #[error("OIDC error: {0}")]
    Oidc(#[from] OidcError),

    #[error("Settings error: {0}")]
    Settings(#[from] SettingsError),

    #[error("Template error: {0}")]
    Template(#[from] TemplateError),
}

const NOT_FOUND_PAGE: &str = "<!doctype html>\n<html><head><title>Not Found</title></head>\
<body><h1>Not Found</h1><p>Session not found.</p>\
<p><a href=\"/oidc/authenticate/?next=/\">Sign in</a></p></body></html>";

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        match self {
            AppError::SessionNotFound => (StatusCode::NOT_FOUND, Html(NOT_FOUND_PAGE)).into_response(),
            AppError::Forbidden(reason) => (
                StatusCode::FORBIDDEN,
                Html(format!("<h1>403 Forbidden</h1><p>{}</p>", reason)),
            )
                .into_response(),
            AppError::BadRequest(msg) => {
                tracing::debug!("Bad request: {}", msg);
                (StatusCode::BAD_REQUEST, Html("<h1>400 Bad Request</h1>")).into_response()
            }
            AppError::LoginRequired { login_url } => {
                (StatusCode::FOUND, [(header::LOCATION, login_url)]).into_response()
            }
            other => {
                tracing::error!("Request failed: {}", other);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    Html("<h1>500 Internal Server Error</h1>"),
                )
                    .into_response()
            }
        }
    }
}

pub type Result<T> = std::result::Result<T, AppError>;
