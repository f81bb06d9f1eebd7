use axum::{http::StatusCode, Json};
use serde::{Deserialize, Serialize};

/// Rejection shape shared by handlers and extractors.
pub type ApiError = (StatusCode, Json<ErrorResponse>);

#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    /// Snake_case error kind, e.g. `token_expired`.
    pub error: String,
    pub message: String,
}

impl ErrorResponse {
    pub fn reject(status: StatusCode, error: &str, message: impl Into<String>) -> ApiError {
        (
            status,
            Json(Self {
                error: error.to_string(),
                message: message.into(),
            }),
        )
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct MessageResponse {
    pub message: String,
}

/// Returned by `/generateToken`.
#[derive(Debug, Serialize, Deserialize)]
pub struct TokenPairResponse {
    pub access_token: String,
    pub refresh_token: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct VerifyResponse {
    pub username: String,
    pub role: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct RefreshResponse {
    pub access_token: String,
    pub username: String,
}
