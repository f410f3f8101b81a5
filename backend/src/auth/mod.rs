//! OIDC login: provider client, token verification, user reconciliation,
//! and the request guards built on top of them.

pub mod backend;
pub mod guard;
pub mod jwks;
pub mod oidc;

pub use backend::{OidcAuthBackend, ReconcileError, OIDC_BACKEND};
pub use guard::{login_user, require_login, require_superuser, safe_redirect, CurrentUser};
pub use jwks::{IdTokenClaims, JwksClient};
pub use oidc::{random_token, OidcClient, OidcError, TokenResponse};
