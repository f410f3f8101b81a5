//! Anti-forgery tokens (double-submit cookie).

use axum::http::HeaderMap;
use axum_extra::extract::cookie::{Cookie, CookieJar, SameSite};
use rand::RngCore;

use crate::error::AppError;

pub const CSRF_COOKIE_NAME: &str = "csrftoken";
pub const CSRF_FORM_FIELD: &str = "csrfmiddlewaretoken";

/// One year, like the session-independent CSRF cookie it mirrors.
const CSRF_COOKIE_AGE_SECS: i64 = 60 * 60 * 24 * 365;

/// Fresh random token, hex encoded.
pub fn mint_token() -> String {
    let mut bytes = [0u8; 32];
    rand::thread_rng().fill_bytes(&mut bytes);
    hex::encode(bytes)
}

fn cookie_token(headers: &HeaderMap) -> Option<String> {
    CookieJar::from_headers(headers)
        .get(CSRF_COOKIE_NAME)
        .map(|cookie| cookie.value().to_string())
        .filter(|token| !token.is_empty())
}

/// The token already issued to this client, or a fresh one.
pub fn current_or_mint(headers: &HeaderMap) -> String {
    cookie_token(headers)
        .filter(|t| t.len() == 64 && t.bytes().all(|b| b.is_ascii_hexdigit()))
        .unwrap_or_else(mint_token)
}

/// Cookie carrying `token`. Readable by scripts, like the form field.
pub fn cookie(token: &str) -> Cookie<'static> {
    Cookie::build((CSRF_COOKIE_NAME, token.to_string()))
        .path("/")
        .same_site(SameSite::Lax)
        .max_age(cookie::time::Duration::seconds(CSRF_COOKIE_AGE_SECS))
        .build()
}

/// Hidden form field embedding `token`. Tokens are hex, so no escaping is needed.
pub fn hidden_input(token: &str) -> String {
    format!(
        "<input type=\"hidden\" name=\"{}\" value=\"{}\" />",
        CSRF_FORM_FIELD, token
    )
}

/// Accept a submitted form only if its token matches the cookie.
pub fn verify(headers: &HeaderMap, submitted: Option<&str>) -> Result<(), AppError> {
    let cookie = cookie_token(headers).ok_or(AppError::Forbidden("CSRF cookie not set."))?;
    let submitted = submitted
        .filter(|s| !s.is_empty())
        .ok_or(AppError::Forbidden("CSRF token missing."))?;

    if constant_time_eq(cookie.as_bytes(), submitted.as_bytes()) {
        Ok(())
    } else {
        Err(AppError::Forbidden("CSRF token incorrect."))
    }
}

fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    a.len() == b.len() && a.iter().zip(b).fold(0u8, |acc, (x, y)| acc | (x ^ y)) == 0
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::header;

    fn headers_with_cookie(token: &str) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(
            header::COOKIE,
            format!("{}={}", CSRF_COOKIE_NAME, token).parse().unwrap(),
        );
        headers
    }

    #[test]
    fn test_mint_token_is_64_hex_chars() {
        let token = mint_token();
        assert_eq!(token.len(), 64);
        assert!(token.chars().all(|c| c.is_ascii_hexdigit()));
        assert_ne!(token, mint_token());
    }

    #[test]
    fn test_current_or_mint_reuses_valid_cookie() {
        let token = mint_token();
        assert_eq!(current_or_mint(&headers_with_cookie(&token)), token);
        assert_ne!(current_or_mint(&headers_with_cookie("short")), "short");
        assert_eq!(current_or_mint(&HeaderMap::new()).len(), 64);
    }

    #[test]
    fn test_cookie_attributes() {
        let issued = cookie("abc");
        assert_eq!(issued.name(), CSRF_COOKIE_NAME);
        assert_eq!(issued.value(), "abc");
        assert_eq!(issued.path(), Some("/"));
        assert_eq!(issued.same_site(), Some(SameSite::Lax));
        assert_ne!(issued.http_only(), Some(true));
        assert_eq!(
            issued.max_age(),
            Some(cookie::time::Duration::seconds(CSRF_COOKIE_AGE_SECS))
        );
    }

    #[test]
    fn test_hidden_input() {
        assert_eq!(
            hidden_input("abc"),
            "<input type=\"hidden\" name=\"csrfmiddlewaretoken\" value=\"abc\" />"
        );
    }

    #[test]
    fn test_verify_matching_token() {
        assert!(verify(&headers_with_cookie("abc"), Some("abc")).is_ok());
    }

    #[test]
    fn test_verify_mismatch() {
        assert!(matches!(
            verify(&headers_with_cookie("abc"), Some("abd")),
            Err(AppError::Forbidden(_))
        ));
    }

    #[test]
    fn test_verify_missing_cookie_or_field() {
        assert!(verify(&HeaderMap::new(), Some("abc")).is_err());
        assert!(verify(&headers_with_cookie("abc"), None).is_err());
        assert!(verify(&headers_with_cookie("abc"), Some("")).is_err());
    }
}
