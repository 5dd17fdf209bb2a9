//! TOTP secret generation, provisioning, and code verification.
//!
//! Secrets are 160-bit random values carried around base32-encoded so they can
//! be transferred to authenticator apps via the otpauth URI or its QR code.
//! Verification accepts one 30-second step of skew in either direction.

use anyhow::{Result, anyhow};
use totp_rs::{Algorithm, Secret, TOTP};

const DIGITS: usize = 6;
const SKEW: u8 = 1;
const STEP_SECONDS: u64 = 30;

/// Material handed to the client when a secret is provisioned.
#[derive(Debug)]
pub struct Provisioning {
    pub secret_base32: String,
    pub otpauth_url: String,
    pub qr_png_base64: String,
}

/// Stateless TOTP operations bound to an issuer label.
#[derive(Clone, Debug)]
pub struct TotpManager {
    issuer: String,
}

impl TotpManager {
    #[must_use]
    pub fn new(issuer: String) -> Self {
        Self { issuer }
    }

    #[must_use]
    pub fn issuer(&self) -> &str {
        &self.issuer
    }

    /// Generate a fresh random shared secret, base32-encoded.
    #[must_use]
    pub fn generate_secret() -> String {
        // `to_encoded` always yields the Encoded variant.
        match Secret::generate_secret().to_encoded() {
            Secret::Encoded(encoded) => encoded,
            Secret::Raw(_) => String::new(),
        }
    }

    /// Build the otpauth URI and QR payload for transferring a secret to an
    /// authenticator app.
    ///
    /// # Errors
    /// Returns an error if the secret is not valid base32 or QR rendering fails.
    pub fn provision(&self, account: &str, secret_base32: &str) -> Result<Provisioning> {
        let totp = self.build(secret_base32, account)?;
        let otpauth_url = totp.get_url();
        let qr_png_base64 = totp
            .get_qr_base64()
            .map_err(|err| anyhow!("QR generation error: {err}"))?;
        Ok(Provisioning {
            secret_base32: totp.get_secret_base32(),
            otpauth_url,
            qr_png_base64,
        })
    }

    /// Verify a submitted code against a secret at the current time.
    ///
    /// Malformed codes (wrong length, non-numeric) are rejected before any
    /// computation touches the secret.
    ///
    /// # Errors
    /// Returns an error if the stored secret cannot be decoded.
    pub fn verify(&self, secret_base32: &str, code: &str) -> Result<bool> {
        if !well_formed_code(code) {
            return Ok(false);
        }
        let totp = self.build(secret_base32, "account")?;
        Ok(totp.check_current(code).unwrap_or(false))
    }

    /// Verify a submitted code at an explicit Unix timestamp.
    ///
    /// # Errors
    /// Returns an error if the stored secret cannot be decoded.
    pub fn verify_at(&self, secret_base32: &str, code: &str, time: u64) -> Result<bool> {
        if !well_formed_code(code) {
            return Ok(false);
        }
        let totp = self.build(secret_base32, "account")?;
        Ok(totp.check(code, time))
    }

    /// Compute the code for a secret at an explicit timestamp (test helper for
    /// exercising the acceptance window without a wall clock).
    ///
    /// # Errors
    /// Returns an error if the stored secret cannot be decoded.
    pub fn code_at(&self, secret_base32: &str, time: u64) -> Result<String> {
        let totp = self.build(secret_base32, "account")?;
        Ok(totp.generate(time))
    }

    fn build(&self, secret_base32: &str, account: &str) -> Result<TOTP> {
        let secret_bytes = Secret::Encoded(secret_base32.to_string())
            .to_bytes()
            .map_err(|err| anyhow!("Invalid base32 secret: {err:?}"))?;
        TOTP::new(
            Algorithm::SHA1,
            DIGITS,
            SKEW,
            STEP_SECONDS,
            secret_bytes,
            Some(self.issuer.clone()),
            account.to_string(),
        )
        .map_err(|err| anyhow!("TOTP init error: {err}"))
    }
}

/// Six ASCII digits, nothing else.
pub(crate) fn well_formed_code(code: &str) -> bool {
    code.len() == DIGITS && code.chars().all(|ch| ch.is_ascii_digit())
}
