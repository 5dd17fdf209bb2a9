//! Account registration.

use axum::{
    Json,
    extract::Extension,
    http::{HeaderMap, StatusCode, header::SET_COOKIE},
    response::IntoResponse,
};
use sqlx::PgPool;
use std::sync::Arc;
use tracing::error;

use super::{
    rate_limit::{RateLimitAction, RateLimitDecision},
    state::AuthState,
    storage::{SignupOutcome, insert_session, insert_user},
    session::session_cookie,
    types::RegisterRequest,
    utils::{hash_password, normalize_email, valid_email},
};

const MIN_PASSWORD_LENGTH: usize = 8;
const ROLES: &[&str] = &["doctor", "patient"];

#[utoipa::path(
    post,
    path = "/v1/auth/register",
    request_body = RegisterRequest,
    responses(
        (status = 201, description = "Account created, session issued"),
        (status = 400, description = "Validation error", body = String),
        (status = 409, description = "Email already registered", body = String),
        (status = 429, description = "Rate limited", body = String)
    ),
    tag = "auth"
)]
pub async fn register(
    pool: Extension<PgPool>,
    auth_state: Extension<Arc<AuthState>>,
    payload: Option<Json<RegisterRequest>>,
) -> impl IntoResponse {
    let request: RegisterRequest = match payload {
        Some(Json(payload)) => payload,
        None => return (StatusCode::BAD_REQUEST, "Missing payload".to_string()).into_response(),
    };

    let email = normalize_email(&request.email);
    if !valid_email(&email) {
        return (StatusCode::BAD_REQUEST, "Invalid email".to_string()).into_response();
    }
    if request.name.trim().is_empty() {
        return (StatusCode::BAD_REQUEST, "Missing name".to_string()).into_response();
    }
    if request.password.len() < MIN_PASSWORD_LENGTH {
        return (StatusCode::BAD_REQUEST, "Password too short".to_string()).into_response();
    }
    if !ROLES.contains(&request.role.as_str()) {
        return (StatusCode::BAD_REQUEST, "Invalid role".to_string()).into_response();
    }

    if auth_state
        .rate_limiter()
        .check_email(&email, RateLimitAction::Register)
        == RateLimitDecision::Limited
    {
        return (StatusCode::TOO_MANY_REQUESTS, "Rate limited".to_string()).into_response();
    }

    let password_hash = match hash_password(&request.password) {
        Ok(hash) => hash,
        Err(err) => {
            error!("Failed to hash password: {err}");
            return StatusCode::INTERNAL_SERVER_ERROR.into_response();
        }
    };

    let user_id = match insert_user(&pool, &email, request.name.trim(), &password_hash, &request.role)
        .await
    {
        Ok(SignupOutcome::Created(user_id)) => user_id,
        Ok(SignupOutcome::Conflict) => {
            return (StatusCode::CONFLICT, "Email already registered".to_string()).into_response();
        }
        Err(err) => {
            error!("Failed to insert user: {err}");
            return StatusCode::INTERNAL_SERVER_ERROR.into_response();
        }
    };

    // New accounts have no second factor yet; a session is issued directly.
    let ttl = auth_state.config().session_ttl_seconds();
    let token = match insert_session(&pool, user_id, ttl).await {
        Ok(token) => token,
        Err(err) => {
            error!("Failed to create session: {err}");
            return StatusCode::INTERNAL_SERVER_ERROR.into_response();
        }
    };

    let mut headers = HeaderMap::new();
    if let Ok(cookie) = session_cookie(&auth_state, &token) {
        headers.insert(SET_COOKIE, cookie);
    }
    (StatusCode::CREATED, headers).into_response()
}
