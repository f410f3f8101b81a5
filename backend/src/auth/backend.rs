//! Reconciles identity-provider claims with local users.

use std::sync::Arc;

use accounts_common::{username_from_email, NewUser, OidcClaims, User, UserError};

use crate::passwords::unusable_password;
use crate::store::{StoreError, UserRepository};

/// Identifier recorded in the session for users logged in through OIDC.
pub const OIDC_BACKEND: &str = "accounts.auth.OidcAuthBackend";

#[derive(Debug, thiserror::Error)]
pub enum ReconcileError {
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error(transparent)]
    User(#[from] UserError),
}

/// Maps claims to exactly one local user, creating it on first login.
pub struct OidcAuthBackend {
    users: Arc<dyn UserRepository>,
    create_users: bool,
}

impl OidcAuthBackend {
    pub fn new(users: Arc<dyn UserRepository>, create_users: bool) -> Self {
        Self { users, create_users }
    }

    /// `email` claim, falling back to `sub`.
    pub fn get_email(claims: &OidcClaims) -> Option<&str> {
        claims
            .get_non_empty("email")
            .or_else(|| claims.get_non_empty("sub"))
    }

    /// Users matching the resolved email. Empty when no email resolves.
    pub fn filter_users_by_claims(&self, claims: &OidcClaims) -> Result<Vec<User>, StoreError> {
        match Self::get_email(claims) {
            Some(email) => self.users.find_by_email(email),
            None => Ok(vec![]),
        }
    }

    /// Create a user from claims, then apply the profile update.
    pub fn create_user(&self, claims: &OidcClaims) -> Result<User, ReconcileError> {
        let email = Self::get_email(claims).ok_or(UserError::MissingEmail)?;
        let username = claims
            .get_non_empty("nickname")
            .unwrap_or_else(|| username_from_email(email))
            .to_lowercase();

        let new_user = NewUser::new(email, &username, unusable_password())?;
        let user = self.users.create(&new_user)?;
        Ok(self.update_user(user, claims)?)
    }

    /// Overwrite first/last name from claims and persist.
    pub fn update_user(&self, mut user: User, claims: &OidcClaims) -> Result<User, StoreError> {
        user.first_name = claims.get_str("given_name").unwrap_or_default().to_string();
        user.last_name = claims.get_str("family_name").unwrap_or_default().to_string();
        self.users.update(&user)?;
        Ok(user)
    }

    /// Resolve claims to a user. `Ok(None)` means "no matching user": no
    /// email could be resolved, the match was ambiguous, creation is
    /// disabled, or the account is inactive.
    pub fn authenticate(&self, claims: &OidcClaims) -> Result<Option<User>, ReconcileError> {
        let mut users = self.filter_users_by_claims(claims)?;

        let user = match users.len() {
            1 => self.update_user(users.remove(0), claims)?,
            0 => {
                if Self::get_email(claims).is_none() {
                    tracing::debug!("Claims carry neither email nor sub; no user resolved");
                    return Ok(None);
                }
                if !self.create_users {
                    tracing::debug!("User creation disabled; rejecting unknown email");
                    return Ok(None);
                }
                self.create_user(claims)?
            }
            n => {
                tracing::warn!("Multiple users ({}) returned for one email", n);
                return Ok(None);
            }
        };

        if !user.is_active {
            tracing::info!("Rejected login for inactive user {}", user.email);
            return Ok(None);
        }
        Ok(Some(user))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::SqliteStore;

    fn backend() -> (OidcAuthBackend, Arc<SqliteStore>) {
        let store = Arc::new(SqliteStore::new(":memory:").unwrap());
        (OidcAuthBackend::new(store.clone(), true), store)
    }

    #[test]
    fn test_get_email_prefers_email_claim() {
        let claims = OidcClaims::new().with("email", "a@x.io").with("sub", "123");
        assert_eq!(OidcAuthBackend::get_email(&claims), Some("a@x.io"));
    }

    #[test]
    fn test_get_email_falls_back_to_sub() {
        let claims = OidcClaims::new().with("email", "").with("sub", "user-42");
        assert_eq!(OidcAuthBackend::get_email(&claims), Some("user-42"));
    }

    #[test]
    fn test_creates_user_with_lowercased_email_and_local_part_username() {
        let (backend, _) = backend();
        let claims = OidcClaims::new()
            .with("email", "Jane.Doe@Example.COM")
            .with("given_name", "Jane")
            .with("family_name", "Doe");

        let user = backend.authenticate(&claims).unwrap().unwrap();
        assert_eq!(user.email, "jane.doe@example.com");
        assert_eq!(user.username, "jane.doe");
        assert_eq!(user.first_name, "Jane");
        assert_eq!(user.last_name, "Doe");
        assert!(!user.has_usable_password());
        assert!(!user.is_staff);
        assert!(!user.is_superuser);
    }

    #[test]
    fn test_nickname_becomes_lowercased_username() {
        let (backend, _) = backend();
        let claims = OidcClaims::new().with("email", "j@example.com").with("nickname", "JD");
        let user = backend.authenticate(&claims).unwrap().unwrap();
        assert_eq!(user.username, "jd");
    }

    #[test]
    fn test_no_email_and_no_sub_yields_none_without_write() {
        let (backend, store) = backend();
        let claims = OidcClaims::new().with("given_name", "Nobody");
        assert!(backend.authenticate(&claims).unwrap().is_none());
        assert!(store.find_by_id(1).unwrap().is_none());
    }

    #[test]
    fn test_reuses_existing_user_regardless_of_case() {
        let (backend, _) = backend();
        let first = backend
            .authenticate(&OidcClaims::new().with("email", "sam@example.com"))
            .unwrap()
            .unwrap();
        let second = backend
            .authenticate(&OidcClaims::new().with("email", "SAM@example.com"))
            .unwrap()
            .unwrap();
        assert_eq!(first.id, second.id);
    }

    #[test]
    fn test_update_overwrites_names_only() {
        let (backend, store) = backend();
        let claims = OidcClaims::new()
            .with("email", "sam@example.com")
            .with("nickname", "sammy")
            .with("given_name", "Sam")
            .with("family_name", "Smith");
        let created = backend.authenticate(&claims).unwrap().unwrap();

        let renamed = OidcClaims::new()
            .with("email", "sam@example.com")
            .with("nickname", "other")
            .with("given_name", "Samantha");
        let updated = backend.authenticate(&renamed).unwrap().unwrap();

        assert_eq!(updated.id, created.id);
        assert_eq!(updated.email, "sam@example.com");
        assert_eq!(updated.username, "sammy");
        assert_eq!(updated.first_name, "Samantha");
        assert_eq!(updated.last_name, "");

        let stored = store.find_by_id(created.id).unwrap().unwrap();
        assert_eq!(stored.first_name, "Samantha");
        assert_eq!(stored.last_name, "");
    }

    #[test]
    fn test_creation_disabled() {
        let store = Arc::new(SqliteStore::new(":memory:").unwrap());
        let backend = OidcAuthBackend::new(store.clone(), false);
        let claims = OidcClaims::new().with("email", "new@example.com");
        assert!(backend.authenticate(&claims).unwrap().is_none());
        assert!(store.find_by_email("new@example.com").unwrap().is_empty());
    }

    #[test]
    fn test_inactive_user_is_rejected() {
        let (backend, store) = backend();
        let claims = OidcClaims::new().with("email", "gone@example.com");
        let mut user = backend.authenticate(&claims).unwrap().unwrap();
        user.is_active = false;
        store.update(&user).unwrap();
        assert!(backend.authenticate(&claims).unwrap().is_none());
    }

    #[test]
    fn test_create_user_without_email_fails() {
        let (backend, _) = backend();
        let err = backend.create_user(&OidcClaims::new()).unwrap_err();
        assert!(matches!(err, ReconcileError::User(UserError::MissingEmail)));
    }
}
