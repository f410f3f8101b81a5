//! Accounts Common Types
//!
//! Shared types used by the accounts backend and its admin tooling.

pub mod claims;
pub mod env_file;
pub mod oidc_settings;
pub mod user;

pub use claims::OidcClaims;
pub use env_file::{EnvFile, EnvFileError};
pub use oidc_settings::{
    OidcSettings, ProviderEndpoints, ProviderType, SigningAlgorithm, DEFAULT_SCOPES, OIDC_KEYS,
};
pub use user::{normalize_email, username_from_email, NewUser, User, UserError};
