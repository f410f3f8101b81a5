//! Superuser form for the OIDC provider settings.
//!
//! Saved values go to the env file and only take effect after a restart; the
//! running process keeps the settings it loaded at startup.

use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;

use axum::{
    extract::State,
    http::{HeaderMap, StatusCode},
    middleware,
    response::Response,
    routing::get,
    Form, Router,
};
use serde::{Deserialize, Serialize};
use url::Url;

use accounts_common::env_file::is_single_line;
use accounts_common::{OidcSettings, ProviderType, SigningAlgorithm, DEFAULT_SCOPES};

use crate::auth::require_superuser;
use crate::csrf;
use crate::error::Result;
use crate::settings_file::save_oidc_settings;
use crate::templates;
use crate::AppState;

use super::page;

const MAX_TEXT_LEN: usize = 255;

const REQUIRED: &str = "This field is required.";
const INVALID_URL: &str = "Enter a valid URL.";
const INVALID_CHOICE: &str = "Select a valid choice.";
const LINE_BREAK: &str = "Line breaks are not allowed.";

/// Submitted form fields. Everything is optional at this layer so a partial
/// submission re-renders with field errors instead of a 422.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct OidcConfigForm {
    pub provider_type: String,
    pub provider_base_url: String,
    pub oidc_rp_client_id: String,
    #[serde(skip_serializing)]
    pub oidc_rp_client_secret: String,
    pub oidc_op_authorization_endpoint: String,
    pub oidc_op_token_endpoint: String,
    pub oidc_op_user_endpoint: String,
    pub oidc_op_jwks_endpoint: String,
    pub oidc_rp_sign_algo: String,
    pub oidc_rp_scopes: String,
    #[serde(skip_serializing)]
    pub csrfmiddlewaretoken: Option<String>,
}

impl OidcConfigForm {
    /// Initial values from the effective settings. The secret is never sent
    /// back to the browser.
    fn from_settings(settings: &OidcSettings) -> Self {
        Self {
            oidc_rp_client_id: settings.client_id.clone(),
            oidc_op_authorization_endpoint: settings.authorization_endpoint.clone(),
            oidc_op_token_endpoint: settings.token_endpoint.clone(),
            oidc_op_user_endpoint: settings.user_endpoint.clone(),
            oidc_op_jwks_endpoint: settings.jwks_endpoint.clone(),
            oidc_rp_sign_algo: settings.sign_algo.to_string(),
            oidc_rp_scopes: settings.scopes.clone(),
            ..Self::default()
        }
    }
}

pub type FieldErrors = BTreeMap<&'static str, String>;

fn check_text(errors: &mut FieldErrors, field: &'static str, value: &str, required: bool) {
    if required && value.is_empty() {
        errors.insert(field, REQUIRED.to_string());
    } else if value.chars().count() > MAX_TEXT_LEN {
        errors.insert(
            field,
            format!("Ensure this value has at most {} characters.", MAX_TEXT_LEN),
        );
    }
}

fn check_url(errors: &mut FieldErrors, field: &'static str, value: &str) {
    if value.is_empty() {
        errors.insert(field, REQUIRED.to_string());
        return;
    }
    match Url::parse(value) {
        Ok(url) if matches!(url.scheme(), "http" | "https") && url.host_str().is_some() => {}
        _ => {
            errors.insert(field, INVALID_URL.to_string());
        }
    }
}

/// Fill blank endpoint fields from the selected provider's URL layout.
fn prefill_endpoints(form: &mut OidcConfigForm, errors: &mut FieldErrors) {
    if form.provider_type.is_empty() {
        return;
    }
    let Some(provider) = ProviderType::parse(&form.provider_type) else {
        errors.insert("provider_type", INVALID_CHOICE.to_string());
        return;
    };

    let base_url = Some(form.provider_base_url.as_str()).filter(|b| !b.is_empty());
    let Some(endpoints) = provider.endpoints(base_url) else {
        if provider == ProviderType::Custom {
            return;
        }
        if base_url.is_some() {
            errors.insert("provider_base_url", INVALID_URL.to_string());
        } else if [
            &form.oidc_op_authorization_endpoint,
            &form.oidc_op_token_endpoint,
            &form.oidc_op_user_endpoint,
            &form.oidc_op_jwks_endpoint,
        ]
        .iter()
        .any(|v| v.is_empty())
        {
            errors.insert(
                "provider_base_url",
                format!("{} needs a base URL to fill in the endpoints.", provider.label()),
            );
        }
        return;
    };

    let fill = |field: &mut String, value: String| {
        if field.is_empty() {
            *field = value;
        }
    };
    fill(&mut form.oidc_op_authorization_endpoint, endpoints.authorization);
    fill(&mut form.oidc_op_token_endpoint, endpoints.token);
    fill(&mut form.oidc_op_user_endpoint, endpoints.user);
    fill(&mut form.oidc_op_jwks_endpoint, endpoints.jwks);
}

/// Normalize and validate a submission. On success the form holds the
/// cleaned values and the returned settings are ready to persist.
pub fn validate(form: &mut OidcConfigForm) -> std::result::Result<OidcSettings, FieldErrors> {
    for field in [
        &mut form.provider_type,
        &mut form.provider_base_url,
        &mut form.oidc_rp_client_id,
        &mut form.oidc_rp_client_secret,
        &mut form.oidc_op_authorization_endpoint,
        &mut form.oidc_op_token_endpoint,
        &mut form.oidc_op_user_endpoint,
        &mut form.oidc_op_jwks_endpoint,
        &mut form.oidc_rp_sign_algo,
        &mut form.oidc_rp_scopes,
    ] {
        *field = field.trim().to_string();
    }

    let mut errors = FieldErrors::new();
    prefill_endpoints(form, &mut errors);

    check_text(&mut errors, "oidc_rp_client_id", &form.oidc_rp_client_id, true);
    check_text(&mut errors, "oidc_rp_client_secret", &form.oidc_rp_client_secret, true);
    check_url(&mut errors, "oidc_op_authorization_endpoint", &form.oidc_op_authorization_endpoint);
    check_url(&mut errors, "oidc_op_token_endpoint", &form.oidc_op_token_endpoint);
    check_url(&mut errors, "oidc_op_user_endpoint", &form.oidc_op_user_endpoint);
    check_url(&mut errors, "oidc_op_jwks_endpoint", &form.oidc_op_jwks_endpoint);
    check_text(&mut errors, "oidc_rp_scopes", &form.oidc_rp_scopes, false);

    // Url::parse drops embedded newlines, so this runs last and wins.
    for (field, value) in [
        ("provider_base_url", &form.provider_base_url),
        ("oidc_rp_client_id", &form.oidc_rp_client_id),
        ("oidc_rp_client_secret", &form.oidc_rp_client_secret),
        ("oidc_op_authorization_endpoint", &form.oidc_op_authorization_endpoint),
        ("oidc_op_token_endpoint", &form.oidc_op_token_endpoint),
        ("oidc_op_user_endpoint", &form.oidc_op_user_endpoint),
        ("oidc_op_jwks_endpoint", &form.oidc_op_jwks_endpoint),
        ("oidc_rp_scopes", &form.oidc_rp_scopes),
    ] {
        if !is_single_line(value) {
            errors.insert(field, LINE_BREAK.to_string());
        }
    }

    let sign_algo = if form.oidc_rp_sign_algo.is_empty() {
        SigningAlgorithm::default()
    } else {
        match form.oidc_rp_sign_algo.parse::<SigningAlgorithm>() {
            Ok(algo) => algo,
            Err(_) => {
                errors.insert("oidc_rp_sign_algo", INVALID_CHOICE.to_string());
                SigningAlgorithm::default()
            }
        }
    };
    form.oidc_rp_sign_algo = sign_algo.to_string();
    if form.oidc_rp_scopes.is_empty() {
        form.oidc_rp_scopes = DEFAULT_SCOPES.to_string();
    }

    if !errors.is_empty() {
        return Err(errors);
    }

    Ok(OidcSettings {
        client_id: form.oidc_rp_client_id.clone(),
        client_secret: form.oidc_rp_client_secret.clone(),
        authorization_endpoint: form.oidc_op_authorization_endpoint.clone(),
        token_endpoint: form.oidc_op_token_endpoint.clone(),
        user_endpoint: form.oidc_op_user_endpoint.clone(),
        jwks_endpoint: form.oidc_op_jwks_endpoint.clone(),
        sign_algo,
        scopes: form.oidc_rp_scopes.clone(),
    })
}

#[derive(Serialize)]
struct Choice {
    value: &'static str,
    label: &'static str,
    selected: bool,
}

#[derive(Serialize)]
struct ConfigPage<'a> {
    form: &'a OidcConfigForm,
    errors: &'a FieldErrors,
    has_errors: bool,
    saved: bool,
    failed: bool,
    providers: Vec<Choice>,
    algorithms: Vec<Choice>,
    csrf_input: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Outcome {
    Initial,
    Saved,
    Failed,
    Invalid,
}

fn render_form(
    state: &AppState,
    headers: &HeaderMap,
    form: &OidcConfigForm,
    errors: &FieldErrors,
    outcome: Outcome,
) -> Result<Response> {
    let token = csrf::current_or_mint(headers);

    let providers = ProviderType::ALL
        .iter()
        .map(|p| Choice {
            value: p.as_str(),
            label: p.label(),
            selected: form.provider_type == p.as_str(),
        })
        .collect();
    let algorithms = SigningAlgorithm::ALL
        .iter()
        .map(|a| Choice {
            value: a.as_str(),
            label: a.as_str(),
            selected: form.oidc_rp_sign_algo == a.as_str(),
        })
        .collect();

    let body = state.templates.render(
        templates::OIDC_CONFIG,
        &ConfigPage {
            form,
            errors,
            has_errors: outcome == Outcome::Invalid,
            saved: outcome == Outcome::Saved,
            failed: outcome == Outcome::Failed,
            providers,
            algorithms,
            csrf_input: csrf::hidden_input(&token),
        },
    )?;

    let status = match outcome {
        Outcome::Failed => StatusCode::INTERNAL_SERVER_ERROR,
        _ => StatusCode::OK,
    };
    Ok(page(status, body, vec![csrf::cookie(&token)]))
}

/// GET /oidc-config/ - Current settings
async fn show_config(State(state): State<Arc<AppState>>, headers: HeaderMap) -> Result<Response> {
    let form = OidcConfigForm::from_settings(state.oidc_client.settings());
    render_form(&state, &headers, &form, &FieldErrors::new(), Outcome::Initial)
}

/// POST /oidc-config/ - Validate and persist settings
async fn save_config(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Form(mut form): Form<OidcConfigForm>,
) -> Result<Response> {
    csrf::verify(&headers, form.csrfmiddlewaretoken.as_deref())?;

    let settings = match validate(&mut form) {
        Ok(settings) => settings,
        Err(errors) => {
            tracing::debug!("OIDC settings form rejected: {:?}", errors.keys());
            return render_form(&state, &headers, &form, &errors, Outcome::Invalid);
        }
    };

    let path = Path::new(&state.config.oidc.env_file);
    let outcome = match save_oidc_settings(path, &settings) {
        Ok(()) => {
            tracing::info!(
                client_id = %settings.client_id,
                sign_algo = %settings.sign_algo,
                "OIDC settings saved; restart required"
            );
            Outcome::Saved
        }
        Err(e) => {
            tracing::error!("Failed to save OIDC settings: {}", e);
            Outcome::Failed
        }
    };

    render_form(&state, &headers, &form, &FieldErrors::new(), outcome)
}

pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/oidc-config/", get(show_config).post(save_config))
        .route_layer(middleware::from_fn_with_state(state.clone(), require_superuser))
        .with_state(state)
}
