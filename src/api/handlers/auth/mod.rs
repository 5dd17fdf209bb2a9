//! Auth handlers and supporting modules.
//!
//! This module coordinates password authentication, the two-step 2FA login
//! challenge, session management, and two-factor enrollment endpoints.
//!
//! ## Login protocol
//!
//! Step 1 (`POST /v1/auth/login`) checks the password and either issues a
//! session or answers with a `second_factor_required` flag. Step 2
//! (`POST /v1/auth/login/2fa`) is keyed by email and accepts exactly one of a
//! TOTP code or a recovery code. No bearer credential of any kind exists
//! between the two steps; all challenge state lives in the credential record.

pub(crate) mod login;
pub(crate) mod principal;
mod rate_limit;
pub(crate) mod register;
pub(crate) mod session;
mod state;
mod storage;
pub(crate) mod two_factor;
pub(crate) mod types;
mod utils;

pub use rate_limit::NoopRateLimiter;
pub use state::{AuthConfig, AuthState};

#[cfg(test)]
mod tests;
