//! HTML pages, embedded at compile time and rendered with handlebars.

use handlebars::Handlebars;
use serde::Serialize;

pub const HOME: &str = "home";
pub const OIDC_CONFIG: &str = "oidc_config";
pub const ADMIN_LOGIN: &str = "admin_login";
pub const SESSIONS: &str = "sessions";

const PAGES: [(&str, &str); 4] = [
    (HOME, include_str!("../templates/home.hbs")),
    (OIDC_CONFIG, include_str!("../templates/oidc_config.hbs")),
    (ADMIN_LOGIN, include_str!("../templates/admin_login.hbs")),
    (SESSIONS, include_str!("../templates/sessions.hbs")),
];

#[derive(Debug, thiserror::Error)]
pub enum TemplateError {
    #[error("Failed to register template {0}: {1}")]
    Register(String, String),
    #[error("Failed to render template: {0}")]
    Render(String),
}

/// Registry of every page the service renders.
pub struct Templates {
    registry: Handlebars<'static>,
}

impl Templates {
    pub fn new() -> Result<Self, TemplateError> {
        let mut registry = Handlebars::new();

        registry
            .register_partial("layout_head", include_str!("../templates/layout_head.hbs"))
            .map_err(|e| TemplateError::Register("layout_head".to_string(), e.to_string()))?;

        for (name, source) in PAGES {
            registry
                .register_template_string(name, source)
                .map_err(|e| TemplateError::Register(name.to_string(), e.to_string()))?;
        }

        Ok(Self { registry })
    }

    pub fn render<T: Serialize>(&self, name: &str, data: &T) -> Result<String, TemplateError> {
        self.registry
            .render(name, data)
            .map_err(|e| TemplateError::Render(e.to_string()))
    }
}
