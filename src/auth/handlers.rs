use std::net::SocketAddr;

use axum::{
    extract::{ConnectInfo, State},
    http::StatusCode,
    routing::post,
    Json, Router,
};
use tracing::{error, info, instrument, warn};

use crate::{
    auth::{
        dto::{
            ApiError, ErrorResponse, MessageResponse, RefreshResponse, TokenPairResponse,
            VerifyResponse,
        },
        extractors::{AccessToken, Credentials, RefreshToken, UserFields},
    },
    error::{StoreError, TokenError},
    state::AppState,
    token::TokenKind,
};

pub fn auth_routes() -> Router<AppState> {
    Router::new()
        .route("/createUser", post(create_user))
        .route("/generateToken", post(generate_token))
        .route("/verifyToken", post(verify_token))
        .route("/refreshToken", post(refresh_token))
}

fn store_status(err: &StoreError) -> StatusCode {
    match err {
        StoreError::UserExists => StatusCode::CONFLICT,
        StoreError::MissingField(_) | StoreError::InvalidValue { .. } => StatusCode::BAD_REQUEST,
        StoreError::UserNotFound | StoreError::InvalidPassword => StatusCode::UNAUTHORIZED,
        StoreError::PasswordHash(_) | StoreError::Schema(_) | StoreError::Database(_) => {
            StatusCode::INTERNAL_SERVER_ERROR
        }
    }
}

fn token_status(err: &TokenError) -> StatusCode {
    match err {
        TokenError::Store(e) => store_status(e),
        TokenError::Signing(_) | TokenError::TimeOutOfRange => StatusCode::INTERNAL_SERVER_ERROR,
        _ => StatusCode::UNAUTHORIZED,
    }
}

fn reject(status: StatusCode, kind: &str, message: String) -> ApiError {
    if status.is_server_error() {
        error!(error = %message, kind, "request failed");
    } else {
        warn!(error = %message, kind, "request rejected");
    }
    ErrorResponse::reject(status, kind, message)
}

fn store_failure(err: StoreError) -> ApiError {
    reject(store_status(&err), err.kind(), err.to_string())
}

fn token_failure(err: TokenError) -> ApiError {
    reject(token_status(&err), err.kind(), err.to_string())
}

#[instrument(skip(state, fields))]
pub async fn create_user(
    State(state): State<AppState>,
    UserFields(fields): UserFields,
) -> Result<(StatusCode, Json<MessageResponse>), ApiError> {
    state
        .auth
        .store
        .create_user(fields)
        .await
        .map_err(store_failure)?;

    Ok((
        StatusCode::CREATED,
        Json(MessageResponse {
            message: "user created".into(),
        }),
    ))
}

#[instrument(skip(state, creds, connect), fields(username = %creds.username))]
pub async fn generate_token(
    State(state): State<AppState>,
    connect: Option<ConnectInfo<SocketAddr>>,
    creds: Credentials,
) -> Result<Json<TokenPairResponse>, ApiError> {
    let address = connect
        .map(|ConnectInfo(addr)| addr.to_string())
        .unwrap_or_else(|| "unknown".into());

    let tokens = &state.auth.tokens;
    let access_token = tokens
        .generate_token(&creds.username, &creds.password)
        .await
        .map_err(token_failure)?;
    let refresh_token = tokens
        .generate_refresh_token(&creds.username, &address)
        .map_err(token_failure)?;

    info!(%address, "tokens issued");
    Ok(Json(TokenPairResponse {
        access_token,
        refresh_token,
    }))
}

#[instrument(skip_all)]
pub async fn verify_token(
    State(state): State<AppState>,
    AccessToken(token): AccessToken,
) -> Result<Json<VerifyResponse>, ApiError> {
    let identity = state
        .auth
        .tokens
        .verify_token(&token, TokenKind::Access)
        .map_err(token_failure)?;

    info!(username = %identity.username, "token verified");
    Ok(Json(VerifyResponse {
        username: identity.username,
        role: identity.role,
    }))
}

#[instrument(skip_all)]
pub async fn refresh_token(
    State(state): State<AppState>,
    AccessToken(access): AccessToken,
    RefreshToken(refresh): RefreshToken,
) -> Result<Json<RefreshResponse>, ApiError> {
    let renewed = state
        .auth
        .tokens
        .refresh_token(&access, &refresh)
        .map_err(token_failure)?;

    info!(username = %renewed.username, "token refreshed");
    Ok(Json(RefreshResponse {
        access_token: renewed.access_token,
        username: renewed.username,
    }))
}
