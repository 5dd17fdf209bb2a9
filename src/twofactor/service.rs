use anyhow::anyhow;
use sqlx::PgPool;
use uuid::Uuid;

use super::recovery::{generate_recovery_codes, hash_recovery_code, normalize_recovery_code};
use super::repo::TwoFactorRepo;
use super::state::{TwoFactorError, TwoFactorState, TwoFactorStatus};
use super::totp::{Provisioning, TotpManager};

/// Result of starting enrollment: everything the user needs to finish it.
/// The secret and recovery codes are shown exactly once.
pub struct SetupStart {
    pub provisioning: Provisioning,
    pub recovery_codes: Vec<String>,
}

/// Snapshot for the status endpoint.
pub struct StatusReport {
    pub status: TwoFactorStatus,
    pub recovery_codes_remaining: Option<i64>,
}

#[derive(Clone)]
pub struct TwoFactorService {
    pool: PgPool,
    totp: TotpManager,
}

impl TwoFactorService {
    #[must_use]
    pub fn new(pool: PgPool, totp: TotpManager) -> Self {
        Self { pool, totp }
    }

    /// Begins enrollment: generates a secret and a fresh recovery batch,
    /// stores them (secret still pending), and returns the plaintext material
    /// for the user. Re-running setup before confirmation regenerates both.
    ///
    /// # Errors
    /// `AlreadyEnabled` when 2FA is active; otherwise storage errors.
    pub async fn begin_setup(&self, user_id: Uuid, email: &str) -> Result<SetupStart, TwoFactorError> {
        self.load(user_id).await?.ensure_setup_allowed()?;

        let secret = TotpManager::generate_secret();
        // Provision first: a QR or URI failure must not leave pending
        // material behind that the user never saw.
        let provisioning = self
            .totp
            .provision(email, &secret)
            .map_err(TwoFactorError::Internal)?;

        let codes = generate_recovery_codes().map_err(TwoFactorError::Internal)?;
        let mut hashes = Vec::with_capacity(codes.len());
        for code in &codes {
            let normalized = normalize_recovery_code(code).map_err(TwoFactorError::Internal)?;
            hashes.push(hash_recovery_code(&normalized));
        }

        TwoFactorRepo::store_pending(&self.pool, user_id, &secret, &hashes)
            .await
            .map_err(TwoFactorError::Internal)?;

        Ok(SetupStart {
            provisioning,
            recovery_codes: codes,
        })
    }

    /// Confirms enrollment by checking the first code against the pending
    /// secret, then promotes it to the committed one.
    ///
    /// # Errors
    /// `SetupNotInitiated` without a pending secret, `AlreadyEnabled` when
    /// already active, `InvalidCode` on a wrong code.
    pub async fn confirm_setup(&self, user_id: Uuid, code: &str) -> Result<(), TwoFactorError> {
        let state = self.load(user_id).await?;
        let pending = state.pending_secret()?;

        if !self
            .totp
            .verify(pending, code)
            .map_err(TwoFactorError::Internal)?
        {
            return Err(TwoFactorError::InvalidCode);
        }

        let promoted = TwoFactorRepo::promote_pending(&self.pool, user_id)
            .await
            .map_err(TwoFactorError::Internal)?;
        if promoted {
            Ok(())
        } else {
            // Pending secret vanished between the check and the update.
            Err(TwoFactorError::SetupNotInitiated)
        }
    }

    /// Disables 2FA after verifying a current code against the committed
    /// secret. A pending secret from an unfinished re-enrollment never
    /// satisfies this check.
    ///
    /// # Errors
    /// `NotEnabled` when 2FA is off, `InvalidCode` on a wrong code.
    pub async fn disable(&self, user_id: Uuid, code: &str) -> Result<(), TwoFactorError> {
        let state = self.load(user_id).await?;
        let secret = state.committed_secret()?;

        if !self
            .totp
            .verify(secret, code)
            .map_err(TwoFactorError::Internal)?
        {
            return Err(TwoFactorError::InvalidCode);
        }

        TwoFactorRepo::clear(&self.pool, user_id)
            .await
            .map_err(TwoFactorError::Internal)
    }

    /// Whether 2FA is enabled for a user. Used by the login flow to decide
    /// between issuing a session and demanding a second factor.
    ///
    /// # Errors
    /// Returns storage errors.
    pub async fn is_enabled(&self, user_id: Uuid) -> Result<bool, TwoFactorError> {
        Ok(self.load(user_id).await?.is_enabled())
    }

    /// Checks a login-time TOTP code against the committed secret.
    ///
    /// # Errors
    /// `NotEnabled` when 2FA is off; otherwise storage errors.
    pub async fn verify_login_code(&self, user_id: Uuid, code: &str) -> Result<bool, TwoFactorError> {
        let state = self.load(user_id).await?;
        let secret = state.committed_secret()?;
        self.totp
            .verify(secret, code)
            .map_err(TwoFactorError::Internal)
    }

    /// Spends a recovery code. Normalization makes `ab12-cd34-...` and
    /// `AB12CD34...` the same code; the delete-by-digest leaves at most one
    /// concurrent caller with `true`.
    ///
    /// # Errors
    /// `NotEnabled` when 2FA is off; otherwise storage errors.
    pub async fn consume_recovery_code(
        &self,
        user_id: Uuid,
        code: &str,
    ) -> Result<bool, TwoFactorError> {
        let state = self.load(user_id).await?;
        state.committed_secret()?;

        // Codes that cannot normalize can never be in the stored set.
        let Ok(normalized) = normalize_recovery_code(code) else {
            return Ok(false);
        };
        let digest = hash_recovery_code(&normalized);
        TwoFactorRepo::consume_recovery_code(&self.pool, user_id, &digest)
            .await
            .map_err(TwoFactorError::Internal)
    }

    /// Current enablement status plus, when enabled, the number of unused
    /// recovery codes.
    ///
    /// # Errors
    /// Returns storage errors.
    pub async fn status(&self, user_id: Uuid) -> Result<StatusReport, TwoFactorError> {
        let state = self.load(user_id).await?;
        let status = state.status();

        let recovery_codes_remaining = if state.is_enabled() {
            let remaining = TwoFactorRepo::recovery_codes_remaining(&self.pool, user_id)
                .await
                .map_err(TwoFactorError::Internal)?;
            Some(remaining)
        } else {
            None
        };

        Ok(StatusReport {
            status,
            recovery_codes_remaining,
        })
    }

    async fn load(&self, user_id: Uuid) -> Result<TwoFactorState, TwoFactorError> {
        TwoFactorRepo::load_state(&self.pool, user_id)
            .await?
            .ok_or_else(|| TwoFactorError::Internal(anyhow!("user {user_id} not found")))
    }
}
