pub mod admin;
pub mod health;
pub mod home;
pub mod oidc;
pub mod oidc_config;

use axum::http::{header, StatusCode};
use axum::response::{Html, IntoResponse, Response};
use axum_extra::extract::cookie::{Cookie, CookieJar};

fn jar(cookies: Vec<Cookie<'static>>) -> CookieJar {
    cookies.into_iter().fold(CookieJar::new(), |jar, cookie| jar.add(cookie))
}

/// 302 to `location`, setting each cookie in `cookies`.
pub(crate) fn redirect(location: &str, cookies: Vec<Cookie<'static>>) -> Response {
    (
        StatusCode::FOUND,
        [(header::LOCATION, location.to_string())],
        jar(cookies),
    )
        .into_response()
}

/// HTML page with `status`, setting each cookie in `cookies`.
pub(crate) fn page(status: StatusCode, body: String, cookies: Vec<Cookie<'static>>) -> Response {
    (status, jar(cookies), Html(body)).into_response()
}
