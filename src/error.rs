//! Error kinds for each subsystem.
//!
//! Callers match on the variant; temporal token failures are kept apart from
//! structural ones so a transport can decide when a renewal is worth trying.

use thiserror::Error;

/// Problems found while loading or validating a store schema.
#[derive(Debug, Error)]
pub enum SchemaError {
    #[error("unsupported store config version: {0}")]
    UnsupportedVersion(u32),

    #[error("unsupported column type '{type_name}' for column '{column}'")]
    UnsupportedType { column: String, type_name: String },

    #[error("more than one column is flagged primary_key")]
    MultiplePrimaryKeys,

    #[error("schema has no primary key and no 'username' column")]
    NoUsernameColumn,

    #[error("invalid identifier: {0}")]
    InvalidIdentifier(String),

    #[error("column '{column}' maps to reserved claim '{claim}'")]
    ReservedClaim { column: String, claim: String },

    #[error("claim '{0}' is produced by more than one column")]
    DuplicateClaim(String),

    #[error("default value of column '{column}' does not match its type")]
    InvalidDefault { column: String },

    #[error("read store config: {0}")]
    Io(#[from] std::io::Error),

    #[error("parse store config: {0}")]
    Yaml(#[from] serde_yaml::Error),
}

/// Failures of a credential store.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("user already exists")]
    UserExists,

    #[error("user not found")]
    UserNotFound,

    #[error("invalid password for user")]
    InvalidPassword,

    #[error("missing required field: {0}")]
    MissingField(String),

    #[error("value for column '{column}' is not a valid {expected}")]
    InvalidValue { column: String, expected: &'static str },

    #[error("password hash error: {0}")]
    PasswordHash(String),

    #[error(transparent)]
    Schema(#[from] SchemaError),

    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
}

impl StoreError {
    /// Stable snake_case name of the variant, for transports.
    pub fn kind(&self) -> &'static str {
        match self {
            StoreError::UserExists => "user_exists",
            StoreError::UserNotFound => "user_not_found",
            StoreError::InvalidPassword => "invalid_password",
            StoreError::MissingField(_) => "missing_field",
            StoreError::InvalidValue { .. } => "invalid_value",
            StoreError::PasswordHash(_) => "password_hash",
            StoreError::Schema(_) => "schema",
            StoreError::Database(_) => "database",
        }
    }
}

/// A required piece of token engine configuration was not supplied.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("access token secret not provided")]
    MissingAccessSecret,

    #[error("refresh token secret not provided")]
    MissingRefreshSecret,

    #[error("token lifetime not provided")]
    MissingTokenLifetime,

    #[error("token lifetime is out of range")]
    InvalidTokenLifetime,

    #[error("refresh token lifetime must be positive and in range")]
    InvalidRefreshTtl,

    #[error("refresh token absolute lifetime must be positive and in range")]
    InvalidRefreshAbsoluteTtl,

    #[error("store must be provided")]
    MissingStore,
}

/// Failures of token issuance, verification and renewal.
#[derive(Debug, Error)]
pub enum TokenError {
    #[error("token is invalid")]
    InvalidToken,

    #[error("invalid claims")]
    ClaimsInvalid,

    #[error("unexpected signing method")]
    UnexpectedSigningMethod,

    #[error("username missing in token")]
    MissingUsername,

    #[error("role missing in token")]
    MissingRole,

    #[error("token is expired")]
    TokenExpired,

    #[error("refresh token is expired, cannot do refresh, please log in again")]
    RefreshTokenExpired,

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("token signing failed: {0}")]
    Signing(#[source] jsonwebtoken::errors::Error),

    #[error("token timestamp out of range")]
    TimeOutOfRange,
}

impl TokenError {
    /// True for the temporal kinds, where renewal or re-login is the remedy.
    pub fn is_expired(&self) -> bool {
        matches!(self, TokenError::TokenExpired | TokenError::RefreshTokenExpired)
    }

    pub fn kind(&self) -> &'static str {
        match self {
            TokenError::InvalidToken => "invalid_token",
            TokenError::ClaimsInvalid => "claims_invalid",
            TokenError::UnexpectedSigningMethod => "unexpected_signing_method",
            TokenError::MissingUsername => "missing_username",
            TokenError::MissingRole => "missing_role",
            TokenError::TokenExpired => "token_expired",
            TokenError::RefreshTokenExpired => "refresh_token_expired",
            TokenError::Store(err) => err.kind(),
            TokenError::Signing(_) => "signing",
            TokenError::TimeOutOfRange => "time_out_of_range",
        }
    }
}
