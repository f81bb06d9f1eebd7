use std::path::PathBuf;
use std::str::FromStr;

use anyhow::Context;
use serde::Deserialize;
use time::Duration;

use crate::token::{AbsoluteExpiryPolicy, TokenSettings};

const SECONDS_PER_DAY: i64 = 86_400;

#[derive(Debug, Clone, Deserialize)]
pub struct JwtConfig {
    pub access_secret: String,
    pub refresh_secret: String,
    pub ttl_minutes: i64,
    pub refresh_ttl_days: i64,
    pub refresh_absolute_ttl_days: i64,
    pub enforce_absolute_expiry: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    /// Relational store when set, in-memory store otherwise.
    pub database_url: Option<String>,
    pub store_config: PathBuf,
    pub jwt: JwtConfig,
    pub host: String,
    pub port: u16,
}

impl AppConfig {
    pub fn from_env() -> anyhow::Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds the config from any key/value source. Unset numeric values fall
    /// back to defaults; set but unparsable ones are an error.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> anyhow::Result<Self> {
        let database_url = lookup("DATABASE_URL").filter(|v| !v.trim().is_empty());

        let jwt = JwtConfig {
            access_secret: lookup("JWT_SECRET").context("JWT_SECRET must be set")?,
            refresh_secret: lookup("JWT_REFRESH_SECRET")
                .context("JWT_REFRESH_SECRET must be set")?,
            ttl_minutes: parse_or(&lookup, "TOKEN_EXPIRATION_TIME_MINUTES", 15)?,
            refresh_ttl_days: parse_or(&lookup, "REFRESH_TTL_DAYS", 3)?,
            refresh_absolute_ttl_days: parse_or(&lookup, "REFRESH_ABSOLUTE_TTL_DAYS", 15)?,
            enforce_absolute_expiry: parse_or(&lookup, "ENFORCE_ABSOLUTE_EXPIRY", false)?,
        };

        Ok(Self {
            database_url,
            store_config: lookup("STORE_CONFIG")
                .unwrap_or_else(|| "configs/store.yml".into())
                .into(),
            jwt,
            host: lookup("APP_HOST").unwrap_or_else(|| "0.0.0.0".into()),
            port: parse_or(&lookup, "APP_PORT", 8080)?,
        })
    }

    /// Token settings without a store; the service binds one.
    pub fn token_settings(&self) -> TokenSettings {
        let jwt = &self.jwt;
        TokenSettings {
            access_secret: Some(jwt.access_secret.clone()),
            refresh_secret: Some(jwt.refresh_secret.clone()),
            token_lifetime: Some(Duration::seconds(jwt.ttl_minutes.saturating_mul(60))),
            refresh_ttl: Duration::seconds(jwt.refresh_ttl_days.saturating_mul(SECONDS_PER_DAY)),
            refresh_absolute_ttl: Duration::seconds(
                jwt.refresh_absolute_ttl_days.saturating_mul(SECONDS_PER_DAY),
            ),
            absolute_expiry: if jwt.enforce_absolute_expiry {
                AbsoluteExpiryPolicy::Enforced
            } else {
                AbsoluteExpiryPolicy::Unenforced
            },
            store: None,
        }
    }
}

fn parse_or<T>(lookup: &impl Fn(&str) -> Option<String>, key: &str, default: T) -> anyhow::Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match lookup(key) {
        Some(raw) => raw
            .trim()
            .parse()
            .with_context(|| format!("{key} has an invalid value: {raw}")),
        None => Ok(default),
    }
}
