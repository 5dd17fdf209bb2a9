//! Two-step login: password check, then an optional second-factor challenge.
//!
//! No bearer credential exists between the steps. Step 1 either issues a
//! session (2FA disabled) or returns a flag; step 2 is keyed by email again
//! and re-reads the credential record, so concurrent attempts across server
//! processes see the same authoritative state.

use axum::{
    Json,
    extract::Extension,
    http::{HeaderMap, StatusCode, header::SET_COOKIE},
    response::IntoResponse,
};
use sqlx::PgPool;
use std::sync::Arc;
use tracing::error;
use uuid::Uuid;

use crate::twofactor::{TwoFactorError, TwoFactorService, totp::well_formed_code};

use super::{
    rate_limit::{RateLimitAction, RateLimitDecision},
    session::session_cookie,
    state::AuthState,
    storage::{insert_session, lookup_login_record},
    types::{LoginRequest, SecondFactorRequest, SecondFactorRequiredResponse},
    utils::{dummy_verify_password, normalize_email, valid_email, verify_password},
};

#[derive(Debug, thiserror::Error)]
pub enum LoginError {
    #[error("invalid credentials")]
    InvalidCredentials,

    #[error("invalid request: {0}")]
    InvalidRequest(String),

    #[error("second factor verification failed")]
    InvalidSecondFactor,

    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

/// The second-factor method the client chose. Exactly one per request.
#[derive(Debug, PartialEq, Eq)]
pub(super) enum SecondFactorMethod {
    Totp(String),
    Recovery(String),
}

/// Validate the step-2 body before any stored secret is read.
pub(super) fn parse_second_factor(
    request: &SecondFactorRequest,
) -> Result<SecondFactorMethod, LoginError> {
    match (request.code.as_deref(), request.recovery_code.as_deref()) {
        (Some(_), Some(_)) => Err(LoginError::InvalidRequest(
            "provide either code or recovery_code, not both".to_string(),
        )),
        (None, None) => Err(LoginError::InvalidRequest(
            "one of code or recovery_code is required".to_string(),
        )),
        (Some(code), None) => {
            if well_formed_code(code) {
                Ok(SecondFactorMethod::Totp(code.to_string()))
            } else {
                Err(LoginError::InvalidRequest(
                    "code must be 6 digits".to_string(),
                ))
            }
        }
        (None, Some(recovery)) => {
            if recovery.trim().is_empty() {
                Err(LoginError::InvalidRequest(
                    "recovery_code must not be empty".to_string(),
                ))
            } else {
                Ok(SecondFactorMethod::Recovery(recovery.to_string()))
            }
        }
    }
}

#[utoipa::path(
    post,
    path = "/v1/auth/login",
    request_body = LoginRequest,
    responses(
        (status = 204, description = "Authenticated, session cookie set"),
        (status = 200, description = "Second factor required, no session issued", body = SecondFactorRequiredResponse),
        (status = 400, description = "Validation error", body = String),
        (status = 401, description = "Invalid credentials", body = String),
        (status = 429, description = "Rate limited", body = String)
    ),
    tag = "auth"
)]
pub async fn login(
    pool: Extension<PgPool>,
    auth_state: Extension<Arc<AuthState>>,
    payload: Option<Json<LoginRequest>>,
) -> impl IntoResponse {
    let request: LoginRequest = match payload {
        Some(Json(payload)) => payload,
        None => return (StatusCode::BAD_REQUEST, "Missing payload".to_string()).into_response(),
    };

    let email = normalize_email(&request.email);
    if !valid_email(&email) || request.password.is_empty() {
        return (StatusCode::BAD_REQUEST, "Missing credentials".to_string()).into_response();
    }

    if auth_state
        .rate_limiter()
        .check_email(&email, RateLimitAction::Login)
        == RateLimitDecision::Limited
    {
        return (StatusCode::TOO_MANY_REQUESTS, "Rate limited".to_string()).into_response();
    }

    let record = match lookup_login_record(&pool, &email).await {
        Ok(record) => record,
        Err(err) => return internal_error(LoginError::Internal(err)),
    };

    // Unknown email and wrong password must be indistinguishable, in both
    // response and cost.
    let Some(record) = record else {
        dummy_verify_password(&request.password);
        return invalid_credentials();
    };

    match verify_password(&request.password, &record.password_hash) {
        Ok(true) => {}
        Ok(false) => return invalid_credentials(),
        Err(err) => {
            error!("Failed to verify password: {err}");
            return StatusCode::INTERNAL_SERVER_ERROR.into_response();
        }
    }

    if record.totp_enabled {
        // Password accepted, but no session until step 2 completes.
        let body = SecondFactorRequiredResponse {
            second_factor_required: true,
        };
        return (StatusCode::OK, Json(body)).into_response();
    }

    issue_session(&pool, &auth_state, record.user_id).await
}

#[utoipa::path(
    post,
    path = "/v1/auth/login/2fa",
    request_body = SecondFactorRequest,
    responses(
        (status = 204, description = "Second factor accepted, session cookie set"),
        (status = 400, description = "Malformed second-factor submission", body = String),
        (status = 401, description = "Second factor rejected", body = String),
        (status = 429, description = "Rate limited", body = String)
    ),
    tag = "auth"
)]
pub async fn login_second_factor(
    pool: Extension<PgPool>,
    auth_state: Extension<Arc<AuthState>>,
    two_factor: Extension<TwoFactorService>,
    payload: Option<Json<SecondFactorRequest>>,
) -> impl IntoResponse {
    let request: SecondFactorRequest = match payload {
        Some(Json(payload)) => payload,
        None => return (StatusCode::BAD_REQUEST, "Missing payload".to_string()).into_response(),
    };

    let email = normalize_email(&request.email);
    if !valid_email(&email) {
        return (StatusCode::BAD_REQUEST, "Invalid email".to_string()).into_response();
    }

    // Shape validation happens before any stored secret is touched.
    let method = match parse_second_factor(&request) {
        Ok(method) => method,
        Err(err) => return (StatusCode::BAD_REQUEST, err.to_string()).into_response(),
    };

    if auth_state
        .rate_limiter()
        .check_email(&email, RateLimitAction::SecondFactor)
        == RateLimitDecision::Limited
    {
        return (StatusCode::TOO_MANY_REQUESTS, "Rate limited".to_string()).into_response();
    }

    let record = match lookup_login_record(&pool, &email).await {
        Ok(Some(record)) => record,
        // Unknown accounts and accounts without 2FA get the same rejection as
        // a wrong code.
        Ok(None) => return invalid_second_factor(),
        Err(err) => return internal_error(LoginError::Internal(err)),
    };

    let verified = match method {
        SecondFactorMethod::Totp(code) => two_factor.verify_login_code(record.user_id, &code).await,
        SecondFactorMethod::Recovery(code) => {
            // The matching row is consumed before any session exists, so a
            // replay of the same code fails even under concurrency.
            two_factor.consume_recovery_code(record.user_id, &code).await
        }
    };

    match verified {
        Ok(true) => issue_session(&pool, &auth_state, record.user_id).await,
        Ok(false) | Err(TwoFactorError::NotEnabled) => invalid_second_factor(),
        Err(err) => {
            error!("Second factor verification failed: {err}");
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}

async fn issue_session(
    pool: &PgPool,
    auth_state: &AuthState,
    user_id: Uuid,
) -> axum::response::Response {
    let ttl = auth_state.config().session_ttl_seconds();
    let token = match insert_session(pool, user_id, ttl).await {
        Ok(token) => token,
        Err(err) => {
            error!("Failed to create session: {err}");
            return StatusCode::INTERNAL_SERVER_ERROR.into_response();
        }
    };

    let mut headers = HeaderMap::new();
    if let Ok(cookie) = session_cookie(auth_state, &token) {
        headers.insert(SET_COOKIE, cookie);
    }
    (StatusCode::NO_CONTENT, headers).into_response()
}

fn internal_error(err: LoginError) -> axum::response::Response {
    error!("Login failed: {err}");
    StatusCode::INTERNAL_SERVER_ERROR.into_response()
}

fn invalid_credentials() -> axum::response::Response {
    (
        StatusCode::UNAUTHORIZED,
        LoginError::InvalidCredentials.to_string(),
    )
        .into_response()
}

fn invalid_second_factor() -> axum::response::Response {
    (
        StatusCode::UNAUTHORIZED,
        LoginError::InvalidSecondFactor.to_string(),
    )
        .into_response()
}
