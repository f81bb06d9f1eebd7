use std::collections::HashMap;

use axum::{
    async_trait,
    extract::FromRequestParts,
    http::{header::AUTHORIZATION, request::Parts, StatusCode},
};

use super::dto::{ApiError, ErrorResponse};
use crate::state::AppState;

pub const ACCESS_TOKEN_HEADER: &str = "x-access-token";
pub const REFRESH_TOKEN_HEADER: &str = "x-refresh-token";
pub const USERNAME_HEADER: &str = "x-username";
pub const PASSWORD_HEADER: &str = "x-password";

/// Header carrying `column` on `/createUser`: `x-user-` plus the column name
/// with underscores as hyphens.
pub fn column_header(column: &str) -> String {
    format!("x-user-{}", column.to_ascii_lowercase().replace('_', "-"))
}

/// Trimmed UTF-8 value of `name`; empty counts as absent.
fn header_value(parts: &Parts, name: &str) -> Result<Option<String>, ApiError> {
    let Some(raw) = parts.headers.get(name) else {
        return Ok(None);
    };
    let value = std::str::from_utf8(raw.as_bytes()).map_err(|_| {
        ErrorResponse::reject(
            StatusCode::BAD_REQUEST,
            "invalid_header",
            format!("{name} header is not valid UTF-8"),
        )
    })?;
    let value = value.trim();
    Ok((!value.is_empty()).then(|| value.to_string()))
}

fn missing_header(name: &str) -> ApiError {
    ErrorResponse::reject(
        StatusCode::BAD_REQUEST,
        "missing_header",
        format!("missing {name} header"),
    )
}

/// Values for every schema column present in the request headers. Required
/// columns are checked by the store, not here.
pub struct UserFields(pub HashMap<String, String>);

#[async_trait]
impl FromRequestParts<AppState> for UserFields {
    type Rejection = ApiError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let mut fields = HashMap::new();
        for col in state.schema().columns() {
            if let Some(value) = header_value(parts, &column_header(&col.name))? {
                fields.insert(col.name.clone(), value);
            }
        }
        Ok(UserFields(fields))
    }
}

pub struct Credentials {
    pub username: String,
    pub password: String,
}

#[async_trait]
impl<S: Send + Sync> FromRequestParts<S> for Credentials {
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let username =
            header_value(parts, USERNAME_HEADER)?.ok_or_else(|| missing_header(USERNAME_HEADER))?;
        let password =
            header_value(parts, PASSWORD_HEADER)?.ok_or_else(|| missing_header(PASSWORD_HEADER))?;
        Ok(Credentials { username, password })
    }
}

/// Access token from `x-access-token`, or from `Authorization: Bearer`.
pub struct AccessToken(pub String);

#[async_trait]
impl<S: Send + Sync> FromRequestParts<S> for AccessToken {
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        if let Some(token) = header_value(parts, ACCESS_TOKEN_HEADER)? {
            return Ok(AccessToken(token));
        }

        let bearer = header_value(parts, AUTHORIZATION.as_str())?.and_then(|auth| {
            auth.strip_prefix("Bearer ")
                .or_else(|| auth.strip_prefix("bearer "))
                .map(|t| t.trim().to_string())
        });
        bearer
            .filter(|t| !t.is_empty())
            .map(AccessToken)
            .ok_or_else(|| missing_header(ACCESS_TOKEN_HEADER))
    }
}

pub struct RefreshToken(pub String);

#[async_trait]
impl<S: Send + Sync> FromRequestParts<S> for RefreshToken {
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        header_value(parts, REFRESH_TOKEN_HEADER)?
            .map(RefreshToken)
            .ok_or_else(|| missing_header(REFRESH_TOKEN_HEADER))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn column_headers_use_hyphens() {
        assert_eq!(column_header("username"), "x-user-username");
        assert_eq!(column_header("account_id"), "x-user-account-id");
        assert_eq!(column_header("Display_Name"), "x-user-display-name");
    }
}
