//! Database access for two-factor credential state and recovery codes.

use anyhow::{Context, Result};
use sqlx::{PgPool, Row};
use tracing::Instrument;
use uuid::Uuid;

use super::state::{TwoFactorError, TwoFactorState};

pub struct TwoFactorRepo;

impl TwoFactorRepo {
    /// Load the 2FA state for a user; `None` when the user does not exist.
    ///
    /// # Errors
    /// Returns an error on query failure or contradictory stored columns.
    pub async fn load_state(
        pool: &PgPool,
        user_id: Uuid,
    ) -> Result<Option<TwoFactorState>, TwoFactorError> {
        let query = r"
            SELECT totp_enabled, totp_secret, totp_temp_secret
            FROM users
            WHERE id = $1
            LIMIT 1
        ";
        let span = tracing::info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "SELECT",
            db.statement = query
        );
        let row = sqlx::query(query)
            .bind(user_id)
            .fetch_optional(pool)
            .instrument(span)
            .await
            .context("failed to load two-factor state")?;

        let Some(row) = row else {
            return Ok(None);
        };

        let state = TwoFactorState::from_columns(
            row.get("totp_enabled"),
            row.get("totp_secret"),
            row.get("totp_temp_secret"),
        )?;
        Ok(Some(state))
    }

    /// Store a fresh pending secret and replace the recovery batch.
    ///
    /// Runs in one transaction so a re-run of setup can never leave the old
    /// recovery codes paired with a new secret.
    ///
    /// # Errors
    /// Returns an error if any statement or the commit fails.
    pub async fn store_pending(
        pool: &PgPool,
        user_id: Uuid,
        temp_secret: &str,
        code_hashes: &[Vec<u8>],
    ) -> Result<()> {
        let mut tx = pool.begin().await.context("begin setup transaction")?;

        let query = "UPDATE users SET totp_temp_secret = $2 WHERE id = $1";
        let span = tracing::info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "UPDATE",
            db.statement = query
        );
        sqlx::query(query)
            .bind(user_id)
            .bind(temp_secret)
            .execute(&mut *tx)
            .instrument(span)
            .await
            .context("failed to store pending secret")?;

        let query = "DELETE FROM user_recovery_codes WHERE user_id = $1";
        let span = tracing::info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "DELETE",
            db.statement = query
        );
        sqlx::query(query)
            .bind(user_id)
            .execute(&mut *tx)
            .instrument(span)
            .await
            .context("failed to clear previous recovery codes")?;

        let query = "INSERT INTO user_recovery_codes (user_id, code_hash) VALUES ($1, $2)";
        for hash in code_hashes {
            let span = tracing::info_span!(
                "db.query",
                db.system = "postgresql",
                db.operation = "INSERT",
                db.statement = query
            );
            sqlx::query(query)
                .bind(user_id)
                .bind(hash)
                .execute(&mut *tx)
                .instrument(span)
                .await
                .context("failed to insert recovery code")?;
        }

        tx.commit().await.context("commit setup transaction")?;
        Ok(())
    }

    /// Promote the pending secret to the committed one and flip the enabled
    /// flag. The guard on `totp_temp_secret` makes the promotion a no-op when
    /// setup was cleared concurrently.
    ///
    /// # Errors
    /// Returns an error if the update fails.
    pub async fn promote_pending(pool: &PgPool, user_id: Uuid) -> Result<bool> {
        let query = r"
            UPDATE users
            SET totp_enabled = TRUE,
                totp_secret = totp_temp_secret,
                totp_temp_secret = NULL
            WHERE id = $1
              AND totp_temp_secret IS NOT NULL
        ";
        let span = tracing::info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "UPDATE",
            db.statement = query
        );
        let result = sqlx::query(query)
            .bind(user_id)
            .execute(pool)
            .instrument(span)
            .await
            .context("failed to promote pending secret")?;
        Ok(result.rows_affected() > 0)
    }

    /// Clear all 2FA material for a user.
    ///
    /// # Errors
    /// Returns an error if any statement or the commit fails.
    pub async fn clear(pool: &PgPool, user_id: Uuid) -> Result<()> {
        let mut tx = pool.begin().await.context("begin disable transaction")?;

        let query = r"
            UPDATE users
            SET totp_enabled = FALSE,
                totp_secret = NULL,
                totp_temp_secret = NULL
            WHERE id = $1
        ";
        let span = tracing::info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "UPDATE",
            db.statement = query
        );
        sqlx::query(query)
            .bind(user_id)
            .execute(&mut *tx)
            .instrument(span)
            .await
            .context("failed to clear two-factor columns")?;

        let query = "DELETE FROM user_recovery_codes WHERE user_id = $1";
        let span = tracing::info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "DELETE",
            db.statement = query
        );
        sqlx::query(query)
            .bind(user_id)
            .execute(&mut *tx)
            .instrument(span)
            .await
            .context("failed to delete recovery codes")?;

        tx.commit().await.context("commit disable transaction")?;
        Ok(())
    }

    /// Atomically consume one recovery code by digest. The row delete is the
    /// compare-and-delete that keeps two concurrent logins from spending the
    /// same code: only one of them sees an affected row.
    ///
    /// # Errors
    /// Returns an error if the delete fails.
    pub async fn consume_recovery_code(
        pool: &PgPool,
        user_id: Uuid,
        code_hash: &[u8],
    ) -> Result<bool> {
        let query = r"
            DELETE FROM user_recovery_codes
            WHERE user_id = $1
              AND code_hash = $2
        ";
        let span = tracing::info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "DELETE",
            db.statement = query
        );
        let result = sqlx::query(query)
            .bind(user_id)
            .bind(code_hash)
            .execute(pool)
            .instrument(span)
            .await
            .context("failed to consume recovery code")?;
        Ok(result.rows_affected() > 0)
    }

    /// Remaining unused recovery codes for the status endpoint.
    ///
    /// # Errors
    /// Returns an error if the query fails.
    pub async fn recovery_codes_remaining(pool: &PgPool, user_id: Uuid) -> Result<i64> {
        let query = "SELECT COUNT(*) AS remaining FROM user_recovery_codes WHERE user_id = $1";
        let span = tracing::info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "SELECT",
            db.statement = query
        );
        let row = sqlx::query(query)
            .bind(user_id)
            .fetch_one(pool)
            .instrument(span)
            .await
            .context("failed to count recovery codes")?;
        Ok(row.get("remaining"))
    }
}
