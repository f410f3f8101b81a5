//! User record keyed by a unique, lower-cased email address.

use chrono::{DateTime, Utc};
use serde::Serialize;

/// Prefix marking a password that can never match.
pub const UNUSABLE_PASSWORD_PREFIX: &str = "!";

/// A stored user.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct User {
    pub id: i64,
    /// Unique identity key, always lower case.
    pub email: String,
    /// Display name, not unique.
    pub username: String,
    pub first_name: String,
    pub last_name: String,
    /// PHC hash string, or an unusable placeholder for OIDC-only accounts.
    #[serde(skip_serializing)]
    pub password: String,
    pub is_staff: bool,
    pub is_superuser: bool,
    pub is_active: bool,
    pub date_joined: DateTime<Utc>,
    pub last_login: Option<DateTime<Utc>>,
}

impl User {
    pub fn has_usable_password(&self) -> bool {
        !self.password.is_empty() && !self.password.starts_with(UNUSABLE_PASSWORD_PREFIX)
    }

    /// "first last", falling back to the username.
    pub fn full_name(&self) -> String {
        let full = format!("{} {}", self.first_name, self.last_name);
        let full = full.trim();
        if full.is_empty() {
            self.username.clone()
        } else {
            full.to_string()
        }
    }
}

impl std::fmt::Display for User {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.email)
    }
}

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum UserError {
    #[error("The given email must be set")]
    MissingEmail,
    #[error("Superuser must have is_staff=true")]
    SuperuserNotStaff,
}

/// Validated input for creating a user.
#[derive(Debug, Clone, PartialEq)]
pub struct NewUser {
    pub email: String,
    pub username: String,
    pub first_name: String,
    pub last_name: String,
    pub password: String,
    pub is_staff: bool,
    pub is_superuser: bool,
}

impl NewUser {
    /// Regular user. `password` is an already-hashed value or placeholder.
    pub fn new(email: &str, username: &str, password: String) -> Result<Self, UserError> {
        let email = normalize_email(email).ok_or(UserError::MissingEmail)?;
        Ok(Self {
            email,
            username: username.to_string(),
            first_name: String::new(),
            last_name: String::new(),
            password,
            is_staff: false,
            is_superuser: false,
        })
    }

    /// Staff + superuser account for the administrative creation path.
    pub fn superuser(email: &str, username: &str, password: String) -> Result<Self, UserError> {
        let mut user = Self::new(email, username, password)?;
        user.is_staff = true;
        user.is_superuser = true;
        user.validate()?;
        Ok(user)
    }

    fn validate(&self) -> Result<(), UserError> {
        if self.is_superuser && !self.is_staff {
            return Err(UserError::SuperuserNotStaff);
        }
        Ok(())
    }
}

/// Trim and lower-case an email. Returns `None` for blank input.
pub fn normalize_email(email: &str) -> Option<String> {
    let email = email.trim();
    if email.is_empty() {
        None
    } else {
        Some(email.to_lowercase())
    }
}

/// Local part of an email (everything before the first `@`).
pub fn username_from_email(email: &str) -> &str {
    email.split('@').next().unwrap_or(email)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_user(password: &str) -> User {
        User {
            id: 1,
            email: "ada@example.com".to_string(),
            username: "ada".to_string(),
            first_name: String::new(),
            last_name: String::new(),
            password: password.to_string(),
            is_staff: false,
            is_superuser: false,
            is_active: true,
            date_joined: Utc::now(),
            last_login: None,
        }
    }

    #[test]
    fn test_normalize_email_lowercases_whole_address() {
        assert_eq!(normalize_email("  Ada@Example.COM "), Some("ada@example.com".to_string()));
    }

    #[test]
    fn test_normalize_email_blank_is_none() {
        assert_eq!(normalize_email("   "), None);
        assert_eq!(normalize_email(""), None);
    }

    #[test]
    fn test_username_from_email() {
        assert_eq!(username_from_email("grace.hopper@navy.mil"), "grace.hopper");
        assert_eq!(username_from_email("no-at-sign"), "no-at-sign");
    }

    #[test]
    fn test_new_user_requires_email() {
        assert_eq!(NewUser::new("", "x", String::new()), Err(UserError::MissingEmail));
    }

    #[test]
    fn test_new_user_defaults_to_unprivileged() {
        let user = NewUser::new("Bob@Example.com", "bob", "!".to_string()).unwrap();
        assert_eq!(user.email, "bob@example.com");
        assert!(!user.is_staff);
        assert!(!user.is_superuser);
    }

    #[test]
    fn test_superuser_sets_both_flags() {
        let user = NewUser::superuser("root@example.com", "root", "hash".to_string()).unwrap();
        assert!(user.is_staff);
        assert!(user.is_superuser);
    }

    #[test]
    fn test_unusable_password() {
        assert!(!sample_user("!abc").has_usable_password());
        assert!(!sample_user("").has_usable_password());
        assert!(sample_user("$argon2id$v=19$...").has_usable_password());
    }

    #[test]
    fn test_full_name_falls_back_to_username() {
        let mut user = sample_user("!");
        assert_eq!(user.full_name(), "ada");
        user.first_name = "Ada".to_string();
        user.last_name = "Lovelace".to_string();
        assert_eq!(user.full_name(), "Ada Lovelace");
    }

    #[test]
    fn test_password_not_serialized() {
        let json = serde_json::to_string(&sample_user("secret-hash")).unwrap();
        assert!(!json.contains("secret-hash"));
        assert!(json.contains("ada@example.com"));
    }
}
