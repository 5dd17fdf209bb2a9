//! Request/response types for auth endpoints.

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::twofactor::TwoFactorStatus;

#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct RegisterRequest {
    pub email: String,
    pub name: String,
    pub password: String,
    pub role: String,
}

#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

/// Step-1 body when the account requires a second factor. No session token is
/// present anywhere in this response.
#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct SecondFactorRequiredResponse {
    pub second_factor_required: bool,
}

/// Step-2 body: exactly one of `code` and `recovery_code` must be set.
#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct SecondFactorRequest {
    pub email: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub recovery_code: Option<String>,
}

#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct SessionResponse {
    pub user_id: String,
    pub email: String,
    pub role: String,
}

#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct TwoFactorStatusResponse {
    pub status: TwoFactorStatus,
    pub enabled: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub recovery_codes_remaining: Option<i64>,
}

/// Returned once from setup. The secret and codes are never retrievable again.
#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct TwoFactorSetupResponse {
    pub secret: String,
    pub otpauth_url: String,
    pub qr_code: String,
    pub recovery_codes: Vec<String>,
}

#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct TwoFactorCodeRequest {
    pub code: String,
}
