//! Access and refresh tokens.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use time::Duration;

use crate::error::TokenError;

pub mod claims;
pub mod engine;

pub use claims::{AccessClaims, RefreshClaims};
pub use engine::{TokenEngine, TokenSettings};

/// `iss` of every access token.
pub const ISSUER: &str = "tokenward";
/// Claim read as the username when the schema does not name one.
pub const USERNAME_CLAIM: &str = "username";
/// Claim read as the role when the schema does not name one.
pub const ROLE_CLAIM: &str = "role";

pub const DEFAULT_TOKEN_LIFETIME: Duration = Duration::minutes(15);
pub const DEFAULT_REFRESH_TTL: Duration = Duration::days(3);
pub const DEFAULT_REFRESH_ABSOLUTE_TTL: Duration = Duration::days(15);
/// Longest accepted lifetime for any token class.
pub const MAX_LIFETIME: Duration = Duration::days(365 * 100);

/// Which class of token is being verified; selects the secret.
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum TokenKind {
    Access,
    Refresh,
}

/// Whether a refresh token's absolute-expiry ceiling is checked on
/// verification. The ceiling is always written into the token.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum AbsoluteExpiryPolicy {
    #[default]
    Unenforced,
    Enforced,
}

/// Result of a successful verification. `role` is set for access tokens only.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Identity {
    pub username: String,
    pub role: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RefreshedToken {
    pub access_token: String,
    pub username: String,
}

#[async_trait]
pub trait TokenManager: Send + Sync {
    /// Authenticates against the store and signs an access token.
    async fn generate_token(&self, username: &str, password: &str) -> Result<String, TokenError>;

    /// Signs a refresh token. The caller must already have authenticated.
    fn generate_refresh_token(&self, username: &str, address: &str) -> Result<String, TokenError>;

    fn verify_token(&self, token: &str, kind: TokenKind) -> Result<Identity, TokenError>;

    /// Exchanges a (possibly expired) access token plus a valid refresh token
    /// for a new access token.
    fn refresh_token(
        &self,
        access_token: &str,
        refresh_token: &str,
    ) -> Result<RefreshedToken, TokenError>;
}
