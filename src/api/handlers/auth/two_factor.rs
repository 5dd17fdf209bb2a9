//! Two-factor enrollment endpoints.

use axum::{
    Json,
    extract::Extension,
    http::{HeaderMap, StatusCode},
    response::IntoResponse,
};
use sqlx::PgPool;
use std::sync::Arc;
use tracing::error;

use crate::twofactor::{TwoFactorError, TwoFactorService, TwoFactorStatus};

use super::{
    principal::require_auth,
    rate_limit::{RateLimitAction, RateLimitDecision},
    state::AuthState,
    types::{TwoFactorCodeRequest, TwoFactorSetupResponse, TwoFactorStatusResponse},
};

#[utoipa::path(
    get,
    path = "/v1/auth/2fa/status",
    responses(
        (status = 200, description = "Two-factor status for the authenticated user", body = TwoFactorStatusResponse),
        (status = 401, description = "Not authenticated")
    ),
    tag = "2fa"
)]
pub async fn status(
    headers: HeaderMap,
    pool: Extension<PgPool>,
    two_factor: Extension<TwoFactorService>,
) -> impl IntoResponse {
    let principal = match require_auth(&headers, &pool).await {
        Ok(principal) => principal,
        Err(status) => return status.into_response(),
    };

    match two_factor.status(principal.user_id).await {
        Ok(report) => {
            let body = TwoFactorStatusResponse {
                enabled: report.status == TwoFactorStatus::Enabled,
                status: report.status,
                recovery_codes_remaining: report.recovery_codes_remaining,
            };
            (StatusCode::OK, Json(body)).into_response()
        }
        Err(err) => {
            error!("Failed to load two-factor status: {err}");
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}

#[utoipa::path(
    post,
    path = "/v1/auth/2fa/setup",
    responses(
        (status = 200, description = "Enrollment material, shown exactly once", body = TwoFactorSetupResponse),
        (status = 401, description = "Not authenticated"),
        (status = 409, description = "Already enabled", body = String),
        (status = 429, description = "Rate limited", body = String)
    ),
    tag = "2fa"
)]
pub async fn setup(
    headers: HeaderMap,
    pool: Extension<PgPool>,
    auth_state: Extension<Arc<AuthState>>,
    two_factor: Extension<TwoFactorService>,
) -> impl IntoResponse {
    let principal = match require_auth(&headers, &pool).await {
        Ok(principal) => principal,
        Err(status) => return status.into_response(),
    };

    if auth_state
        .rate_limiter()
        .check_email(&principal.email, RateLimitAction::TwoFactorManage)
        == RateLimitDecision::Limited
    {
        return (StatusCode::TOO_MANY_REQUESTS, "Rate limited".to_string()).into_response();
    }

    match two_factor
        .begin_setup(principal.user_id, &principal.email)
        .await
    {
        Ok(start) => {
            let body = TwoFactorSetupResponse {
                secret: start.provisioning.secret_base32,
                otpauth_url: start.provisioning.otpauth_url,
                qr_code: start.provisioning.qr_png_base64,
                recovery_codes: start.recovery_codes,
            };
            (StatusCode::OK, Json(body)).into_response()
        }
        Err(err) => two_factor_error_response(err),
    }
}

#[utoipa::path(
    post,
    path = "/v1/auth/2fa/verify",
    request_body = TwoFactorCodeRequest,
    responses(
        (status = 204, description = "Enrollment confirmed, two-factor enabled"),
        (status = 400, description = "Missing payload", body = String),
        (status = 401, description = "Code rejected", body = String),
        (status = 409, description = "No enrollment in progress", body = String)
    ),
    tag = "2fa"
)]
pub async fn verify(
    headers: HeaderMap,
    pool: Extension<PgPool>,
    two_factor: Extension<TwoFactorService>,
    payload: Option<Json<TwoFactorCodeRequest>>,
) -> impl IntoResponse {
    let principal = match require_auth(&headers, &pool).await {
        Ok(principal) => principal,
        Err(status) => return status.into_response(),
    };
    let request: TwoFactorCodeRequest = match payload {
        Some(Json(payload)) => payload,
        None => return (StatusCode::BAD_REQUEST, "Missing payload".to_string()).into_response(),
    };

    match two_factor.confirm_setup(principal.user_id, &request.code).await {
        Ok(()) => StatusCode::NO_CONTENT.into_response(),
        Err(err) => two_factor_error_response(err),
    }
}

#[utoipa::path(
    post,
    path = "/v1/auth/2fa/disable",
    request_body = TwoFactorCodeRequest,
    responses(
        (status = 204, description = "Two-factor disabled, recovery codes discarded"),
        (status = 400, description = "Missing payload", body = String),
        (status = 401, description = "Code rejected", body = String),
        (status = 409, description = "Two-factor not enabled", body = String)
    ),
    tag = "2fa"
)]
pub async fn disable(
    headers: HeaderMap,
    pool: Extension<PgPool>,
    two_factor: Extension<TwoFactorService>,
    payload: Option<Json<TwoFactorCodeRequest>>,
) -> impl IntoResponse {
    let principal = match require_auth(&headers, &pool).await {
        Ok(principal) => principal,
        Err(status) => return status.into_response(),
    };
    let request: TwoFactorCodeRequest = match payload {
        Some(Json(payload)) => payload,
        None => return (StatusCode::BAD_REQUEST, "Missing payload".to_string()).into_response(),
    };

    match two_factor.disable(principal.user_id, &request.code).await {
        Ok(()) => StatusCode::NO_CONTENT.into_response(),
        Err(err) => two_factor_error_response(err),
    }
}

/// Map state-machine misuse to 409, rejected codes to 401, everything else
/// to 500. Error text never contains secret material.
fn two_factor_error_response(err: TwoFactorError) -> axum::response::Response {
    match err {
        TwoFactorError::AlreadyEnabled
        | TwoFactorError::SetupNotInitiated
        | TwoFactorError::NotEnabled => (StatusCode::CONFLICT, err.to_string()).into_response(),
        TwoFactorError::InvalidCode => (StatusCode::UNAUTHORIZED, err.to_string()).into_response(),
        TwoFactorError::InvalidState(_) | TwoFactorError::Internal(_) => {
            error!("Two-factor operation failed: {err}");
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}
