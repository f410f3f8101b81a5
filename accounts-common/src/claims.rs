//! Identity-provider claims as returned by the userinfo endpoint.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Loosely typed claim set. Providers disagree on which claims they send,
/// so lookups go through string accessors instead of fixed fields.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct OidcClaims(Map<String, Value>);

impl OidcClaims {
    pub fn new() -> Self {
        Self::default()
    }

    /// String value of a claim. Non-string values are ignored.
    pub fn get_str(&self, name: &str) -> Option<&str> {
        self.0.get(name).and_then(Value::as_str)
    }

    /// Like [`get_str`](Self::get_str) but treats empty strings as absent.
    pub fn get_non_empty(&self, name: &str) -> Option<&str> {
        self.get_str(name).filter(|v| !v.is_empty())
    }

    pub fn insert(&mut self, name: impl Into<String>, value: impl Into<Value>) {
        self.0.insert(name.into(), value.into());
    }

    pub fn with(mut self, name: &str, value: &str) -> Self {
        self.insert(name, value);
        self
    }

    pub fn as_map(&self) -> &Map<String, Value> {
        &self.0
    }
}

impl From<Map<String, Value>> for OidcClaims {
    fn from(map: Map<String, Value>) -> Self {
        Self(map)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_deserialize_userinfo() {
        let json = r#"{"sub":"248289761001","email":"jane@example.com","email_verified":true}"#;
        let claims: OidcClaims = serde_json::from_str(json).unwrap();
        assert_eq!(claims.get_str("sub"), Some("248289761001"));
        assert_eq!(claims.get_str("email"), Some("jane@example.com"));
        assert_eq!(claims.get_str("email_verified"), None);
    }

    #[test]
    fn test_get_non_empty_skips_blank() {
        let claims = OidcClaims::new().with("nickname", "");
        assert_eq!(claims.get_str("nickname"), Some(""));
        assert_eq!(claims.get_non_empty("nickname"), None);
    }
}
