use std::sync::Arc;

use async_trait::async_trait;
use jsonwebtoken::{
    decode, decode_header, encode, errors::ErrorKind, Algorithm, DecodingKey, EncodingKey, Header,
    Validation,
};
use serde::{de::DeserializeOwned, Serialize};
use time::{Duration, OffsetDateTime};
use tracing::{debug, info, warn};

use super::claims::{AccessClaims, Expiring, RefreshClaims};
use super::{
    AbsoluteExpiryPolicy, Identity, RefreshedToken, TokenKind, TokenManager,
    DEFAULT_REFRESH_ABSOLUTE_TTL, DEFAULT_REFRESH_TTL, ISSUER, MAX_LIFETIME, ROLE_CLAIM,
    USERNAME_CLAIM,
};
use crate::error::{ConfigError, TokenError};
use crate::schema::ROLE_COLUMN;
use crate::store::CredentialStore;

/// Everything a `TokenEngine` needs, checked once by `TokenEngine::new`.
pub struct TokenSettings {
    pub access_secret: Option<String>,
    pub refresh_secret: Option<String>,
    pub token_lifetime: Option<Duration>,
    pub refresh_ttl: Duration,
    pub refresh_absolute_ttl: Duration,
    pub absolute_expiry: AbsoluteExpiryPolicy,
    pub store: Option<Arc<dyn CredentialStore>>,
}

impl Default for TokenSettings {
    fn default() -> Self {
        Self {
            access_secret: None,
            refresh_secret: None,
            token_lifetime: None,
            refresh_ttl: DEFAULT_REFRESH_TTL,
            refresh_absolute_ttl: DEFAULT_REFRESH_ABSOLUTE_TTL,
            absolute_expiry: AbsoluteExpiryPolicy::default(),
            store: None,
        }
    }
}

/// Issues, verifies and renews HS256 tokens. Access and refresh tokens use
/// separate secrets so neither verifies as the other.
pub struct TokenEngine {
    access_encoding: EncodingKey,
    access_decoding: DecodingKey,
    refresh_encoding: EncodingKey,
    refresh_decoding: DecodingKey,
    token_lifetime: Duration,
    refresh_ttl: Duration,
    refresh_absolute_ttl: Duration,
    absolute_expiry: AbsoluteExpiryPolicy,
    store: Arc<dyn CredentialStore>,
}

impl TokenEngine {
    pub fn new(settings: TokenSettings) -> Result<Self, ConfigError> {
        let access_secret = settings
            .access_secret
            .filter(|s| !s.is_empty())
            .ok_or(ConfigError::MissingAccessSecret)?;
        let refresh_secret = settings
            .refresh_secret
            .filter(|s| !s.is_empty())
            .ok_or(ConfigError::MissingRefreshSecret)?;
        let token_lifetime = settings
            .token_lifetime
            .filter(|d| d.is_positive())
            .ok_or(ConfigError::MissingTokenLifetime)?;
        if token_lifetime > MAX_LIFETIME {
            return Err(ConfigError::InvalidTokenLifetime);
        }
        if !in_range(settings.refresh_ttl) {
            return Err(ConfigError::InvalidRefreshTtl);
        }
        if !in_range(settings.refresh_absolute_ttl) {
            return Err(ConfigError::InvalidRefreshAbsoluteTtl);
        }
        let store = settings.store.ok_or(ConfigError::MissingStore)?;

        Ok(Self {
            access_encoding: EncodingKey::from_secret(access_secret.as_bytes()),
            access_decoding: DecodingKey::from_secret(access_secret.as_bytes()),
            refresh_encoding: EncodingKey::from_secret(refresh_secret.as_bytes()),
            refresh_decoding: DecodingKey::from_secret(refresh_secret.as_bytes()),
            token_lifetime,
            refresh_ttl: settings.refresh_ttl,
            refresh_absolute_ttl: settings.refresh_absolute_ttl,
            absolute_expiry: settings.absolute_expiry,
            store,
        })
    }

    pub fn token_lifetime(&self) -> Duration {
        self.token_lifetime
    }

    fn username_claim(&self) -> &str {
        let schema = self.store.schema();
        schema
            .claim_name(schema.username_column())
            .unwrap_or(USERNAME_CLAIM)
    }

    fn role_claim(&self) -> &str {
        let schema = self.store.schema();
        schema
            .column(ROLE_COLUMN)
            .and_then(|col| schema.claim_name(col))
            .unwrap_or(ROLE_CLAIM)
    }

    fn sign<T: Serialize>(&self, claims: &T, key: &EncodingKey) -> Result<String, TokenError> {
        encode(&Header::new(Algorithm::HS256), claims, key).map_err(TokenError::Signing)
    }

    fn sign_access(&self, claims: &AccessClaims) -> Result<String, TokenError> {
        self.sign(claims, &self.access_encoding)
    }

    fn sign_refresh(&self, claims: &RefreshClaims) -> Result<String, TokenError> {
        self.sign(claims, &self.refresh_encoding)
    }

    /// Signature, algorithm and expiry checks shared by both token classes.
    fn decode_verified<T>(&self, token: &str, key: &DecodingKey) -> Result<T, TokenError>
    where
        T: DeserializeOwned + Expiring,
    {
        let header = decode_header(token).map_err(|_| TokenError::InvalidToken)?;
        if !matches!(header.alg, Algorithm::HS256 | Algorithm::HS384 | Algorithm::HS512) {
            return Err(TokenError::UnexpectedSigningMethod);
        }

        let mut validation = Validation::new(header.alg);
        validation.leeway = 0;
        validation.validate_aud = false;
        let claims = decode::<T>(token, key, &validation)
            .map_err(classify)?
            .claims;

        if now().unix_timestamp() > claims.expires_at() {
            return Err(TokenError::TokenExpired);
        }
        Ok(claims)
    }

    fn decode_access(&self, token: &str) -> Result<AccessClaims, TokenError> {
        self.decode_verified(token, &self.access_decoding)
    }

    fn decode_refresh(&self, token: &str) -> Result<RefreshClaims, TokenError> {
        let claims: RefreshClaims = self.decode_verified(token, &self.refresh_decoding)?;
        if self.absolute_expiry == AbsoluteExpiryPolicy::Enforced
            && now().unix_timestamp() > claims.aexp
        {
            return Err(TokenError::TokenExpired);
        }
        Ok(claims)
    }

    /// Reads access claims without checking the signature or expiry. Only the
    /// renewal path uses this, after the refresh token has been verified.
    fn decode_unverified(&self, token: &str) -> Result<AccessClaims, TokenError> {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.insecure_disable_signature_validation();
        validation.validate_exp = false;
        validation.validate_aud = false;
        validation.required_spec_claims.clear();
        decode::<AccessClaims>(token, &DecodingKey::from_secret(&[]), &validation)
            .map(|data| data.claims)
            .map_err(classify)
    }

    fn identity(&self, claims: &AccessClaims) -> Result<Identity, TokenError> {
        let username = claims
            .field(self.username_claim())
            .ok_or(TokenError::MissingUsername)?;
        let role = claims
            .field(self.role_claim())
            .ok_or(TokenError::MissingRole)?;
        Ok(Identity {
            username: username.to_string(),
            role: Some(role.to_string()),
        })
    }

    /// Signs `claims` again with a fresh expiry and renewal stamp.
    fn reissue(&self, mut claims: AccessClaims) -> Result<String, TokenError> {
        let now = now();
        claims.iss = ISSUER.to_string();
        claims.exp = expiry_after(now, self.token_lifetime)?;
        claims.refreshed_at = Some(
            i64::try_from(now.unix_timestamp_nanos()).map_err(|_| TokenError::TimeOutOfRange)?,
        );
        self.sign_access(&claims)
    }
}

#[async_trait]
impl TokenManager for TokenEngine {
    async fn generate_token(&self, username: &str, password: &str) -> Result<String, TokenError> {
        let record = self.store.authenticate(username, password).await?;
        let claims = AccessClaims {
            iss: ISSUER.to_string(),
            exp: expiry_after(now(), self.token_lifetime)?,
            refreshed_at: None,
            fields: self.store.schema().claims_for(&record),
        };
        let token = self.sign_access(&claims)?;
        debug!(username = %username, "access token signed");
        Ok(token)
    }

    fn generate_refresh_token(&self, username: &str, address: &str) -> Result<String, TokenError> {
        let now = now();
        let claims = RefreshClaims {
            username: Some(username.to_string()),
            addr: address.to_string(),
            iat: now.unix_timestamp(),
            exp: expiry_after(now, self.refresh_ttl)?,
            aexp: expiry_after(now, self.refresh_absolute_ttl)?,
            valid: true,
        };
        let token = self.sign_refresh(&claims)?;
        debug!(username = %username, addr = %address, "refresh token signed");
        Ok(token)
    }

    fn verify_token(&self, token: &str, kind: TokenKind) -> Result<Identity, TokenError> {
        let identity = match kind {
            TokenKind::Access => self.identity(&self.decode_access(token)?)?,
            TokenKind::Refresh => {
                let claims = self.decode_refresh(token)?;
                if !claims.valid {
                    return Err(TokenError::InvalidToken);
                }
                Identity {
                    username: claims.username.ok_or(TokenError::MissingUsername)?,
                    role: None,
                }
            }
        };
        debug!(username = %identity.username, kind = ?kind, "token verified");
        Ok(identity)
    }

    fn refresh_token(
        &self,
        access_token: &str,
        refresh_token: &str,
    ) -> Result<RefreshedToken, TokenError> {
        match self.verify_token(refresh_token, TokenKind::Refresh) {
            Ok(_) => {}
            Err(TokenError::TokenExpired) => return Err(TokenError::RefreshTokenExpired),
            Err(e) => return Err(e),
        }

        let claims = match self.decode_access(access_token) {
            Ok(claims) => claims,
            Err(TokenError::TokenExpired) => {
                debug!("access token expired; recovering claims for renewal");
                self.decode_unverified(access_token)?
            }
            Err(e) => {
                warn!(error = %e, "access token rejected during refresh");
                return Err(e);
            }
        };
        let Identity { username, .. } = self.identity(&claims)?;

        let access_token = self.reissue(claims)?;
        info!(username = %username, "access token refreshed");
        Ok(RefreshedToken {
            access_token,
            username,
        })
    }
}

fn now() -> OffsetDateTime {
    OffsetDateTime::now_utc()
}

fn in_range(ttl: Duration) -> bool {
    ttl.is_positive() && ttl <= MAX_LIFETIME
}

/// Unix seconds of `from + ttl`.
fn expiry_after(from: OffsetDateTime, ttl: Duration) -> Result<i64, TokenError> {
    from.checked_add(ttl)
        .map(OffsetDateTime::unix_timestamp)
        .ok_or(TokenError::TimeOutOfRange)
}

fn classify(err: jsonwebtoken::errors::Error) -> TokenError {
    match err.kind() {
        ErrorKind::ExpiredSignature => TokenError::TokenExpired,
        ErrorKind::InvalidAlgorithm => TokenError::UnexpectedSigningMethod,
        ErrorKind::Json(_) => TokenError::ClaimsInvalid,
        _ => TokenError::InvalidToken,
    }
}
