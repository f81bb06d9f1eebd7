use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Payload of an access token: the engine's own claims plus whatever the
/// schema maps from the user record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccessClaims {
    pub iss: String,
    pub exp: i64,
    /// Unix nanoseconds of the renewal that produced this token.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub refreshed_at: Option<i64>,
    #[serde(flatten)]
    pub fields: BTreeMap<String, String>,
}

impl AccessClaims {
    pub fn field(&self, name: &str) -> Option<&str> {
        self.fields.get(name).map(String::as_str)
    }
}

/// Payload of a refresh token.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RefreshClaims {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
    /// Network address the token was issued to.
    #[serde(default)]
    pub addr: String,
    pub iat: i64,
    /// Sliding expiry.
    pub exp: i64,
    /// Absolute expiry ceiling.
    pub aexp: i64,
    #[serde(default)]
    pub valid: bool,
}

pub(crate) trait Expiring {
    fn expires_at(&self) -> i64;
}

impl Expiring for AccessClaims {
    fn expires_at(&self) -> i64 {
        self.exp
    }
}

impl Expiring for RefreshClaims {
    fn expires_at(&self) -> i64 {
        self.exp
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn access_fields_are_flattened() {
        let claims = AccessClaims {
            iss: "tokenward".into(),
            exp: 1_700_000_000,
            refreshed_at: None,
            fields: [("username".to_string(), "alice".to_string())].into(),
        };
        let json = serde_json::to_value(&claims).unwrap();
        assert_eq!(json["username"], "alice");
        assert_eq!(json["exp"], 1_700_000_000);
        assert!(json.get("refreshed_at").is_none());
        assert!(json.get("fields").is_none());

        let back: AccessClaims = serde_json::from_value(json).unwrap();
        assert_eq!(back, claims);
    }

    #[test]
    fn refresh_validity_is_a_boolean() {
        let raw = r#"{"username":"alice","addr":"127.0.0.1","iat":1,"exp":2,"aexp":3,"valid":true}"#;
        let claims: RefreshClaims = serde_json::from_str(raw).unwrap();
        assert!(claims.valid);

        let raw = r#"{"username":"alice","iat":1,"exp":2,"aexp":3}"#;
        let claims: RefreshClaims = serde_json::from_str(raw).unwrap();
        assert!(!claims.valid);

        let raw = r#"{"username":"alice","iat":1,"exp":2,"aexp":3,"valid":"True"}"#;
        assert!(serde_json::from_str::<RefreshClaims>(raw).is_err());
    }
}
