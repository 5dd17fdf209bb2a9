//! Two-factor enrollment state for a user.
//!
//! The credential record stores three columns (`totp_enabled`, `totp_secret`,
//! `totp_temp_secret`); this module folds them into a tagged state so the
//! invalid combinations (both secrets set, enabled without a secret) cannot be
//! acted on. The temp secret exists only between "setup requested" and "setup
//! verified" and is never accepted for login.

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

#[derive(Debug, thiserror::Error)]
pub enum TwoFactorError {
    #[error("two-factor authentication is already enabled")]
    AlreadyEnabled,

    #[error("two-factor setup has not been initiated")]
    SetupNotInitiated,

    #[error("two-factor authentication is not enabled")]
    NotEnabled,

    #[error("verification code did not match")]
    InvalidCode,

    #[error("inconsistent two-factor state: {0}")]
    InvalidState(String),

    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

/// Logical 2FA state, reconstructed from the credential record.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum TwoFactorState {
    Disabled,
    /// Setup requested: a temporary secret is out with the user but not yet
    /// confirmed. Re-running setup replaces it.
    Pending { temp_secret: String },
    /// Setup confirmed: the committed secret is the only one that authorizes
    /// logins or disable requests.
    Enabled { secret: String },
}

/// Wire-facing state label (`/v1/auth/2fa/status`).
#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum TwoFactorStatus {
    Disabled,
    Pending,
    Enabled,
}

impl TwoFactorState {
    /// Fold the stored columns into a state, rejecting combinations the
    /// enrollment machine can never produce.
    ///
    /// # Errors
    /// Returns [`TwoFactorError::InvalidState`] when the columns contradict
    /// each other instead of silently picking a side.
    pub fn from_columns(
        enabled: bool,
        secret: Option<String>,
        temp_secret: Option<String>,
    ) -> Result<Self, TwoFactorError> {
        match (enabled, secret, temp_secret) {
            (true, Some(secret), None) if !secret.is_empty() => Ok(Self::Enabled { secret }),
            (true, _, Some(_)) => Err(TwoFactorError::InvalidState(
                "enabled with a pending temp secret".to_string(),
            )),
            (true, _, None) => Err(TwoFactorError::InvalidState(
                "enabled without a committed secret".to_string(),
            )),
            (false, Some(_), _) => Err(TwoFactorError::InvalidState(
                "committed secret present while disabled".to_string(),
            )),
            (false, None, Some(temp_secret)) if !temp_secret.is_empty() => {
                Ok(Self::Pending { temp_secret })
            }
            (false, None, _) => Ok(Self::Disabled),
        }
    }

    #[must_use]
    pub fn status(&self) -> TwoFactorStatus {
        match self {
            Self::Disabled => TwoFactorStatus::Disabled,
            Self::Pending { .. } => TwoFactorStatus::Pending,
            Self::Enabled { .. } => TwoFactorStatus::Enabled,
        }
    }

    #[must_use]
    pub fn is_enabled(&self) -> bool {
        matches!(self, Self::Enabled { .. })
    }

    /// Gate for `beginSetup`: allowed from `Disabled` and (idempotently,
    /// replacing the previous material) from `Pending`.
    ///
    /// # Errors
    /// Returns [`TwoFactorError::AlreadyEnabled`] from the `Enabled` state.
    pub fn ensure_setup_allowed(&self) -> Result<(), TwoFactorError> {
        match self {
            Self::Enabled { .. } => Err(TwoFactorError::AlreadyEnabled),
            Self::Disabled | Self::Pending { .. } => Ok(()),
        }
    }

    /// The secret `confirmSetup` must verify against.
    ///
    /// # Errors
    /// Returns [`TwoFactorError::SetupNotInitiated`] unless a setup is pending.
    pub fn pending_secret(&self) -> Result<&str, TwoFactorError> {
        match self {
            Self::Pending { temp_secret } => Ok(temp_secret),
            Self::Disabled | Self::Enabled { .. } => Err(TwoFactorError::SetupNotInitiated),
        }
    }

    /// The secret login and disable verification run against. The temp secret
    /// never qualifies.
    ///
    /// # Errors
    /// Returns [`TwoFactorError::NotEnabled`] unless 2FA is enabled.
    pub fn committed_secret(&self) -> Result<&str, TwoFactorError> {
        match self {
            Self::Enabled { secret } => Ok(secret),
            Self::Disabled | Self::Pending { .. } => Err(TwoFactorError::NotEnabled),
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn columns_fold_into_states() {
        assert_eq!(
            TwoFactorState::from_columns(false, None, None).unwrap(),
            TwoFactorState::Disabled
        );
        assert_eq!(
            TwoFactorState::from_columns(false, None, Some("TEMP".to_string())).unwrap(),
            TwoFactorState::Pending {
                temp_secret: "TEMP".to_string()
            }
        );
        assert_eq!(
            TwoFactorState::from_columns(true, Some("SECRET".to_string()), None).unwrap(),
            TwoFactorState::Enabled {
                secret: "SECRET".to_string()
            }
        );
    }

    #[test]
    fn contradictory_columns_are_rejected() {
        assert!(matches!(
            TwoFactorState::from_columns(true, None, None),
            Err(TwoFactorError::InvalidState(_))
        ));
        assert!(matches!(
            TwoFactorState::from_columns(true, Some("S".to_string()), Some("T".to_string())),
            Err(TwoFactorError::InvalidState(_))
        ));
        assert!(matches!(
            TwoFactorState::from_columns(false, Some("S".to_string()), None),
            Err(TwoFactorError::InvalidState(_))
        ));
    }

    #[test]
    fn empty_strings_count_as_absent_or_invalid() {
        assert!(TwoFactorState::from_columns(true, Some(String::new()), None).is_err());
        assert_eq!(
            TwoFactorState::from_columns(false, None, Some(String::new())).unwrap(),
            TwoFactorState::Disabled
        );
    }

    #[test]
    fn setup_gate_blocks_enabled_only() {
        assert!(TwoFactorState::Disabled.ensure_setup_allowed().is_ok());
        let pending = TwoFactorState::Pending {
            temp_secret: "T".to_string(),
        };
        assert!(pending.ensure_setup_allowed().is_ok());
        let enabled = TwoFactorState::Enabled {
            secret: "S".to_string(),
        };
        assert!(matches!(
            enabled.ensure_setup_allowed(),
            Err(TwoFactorError::AlreadyEnabled)
        ));
    }

    #[test]
    fn pending_secret_only_in_pending() {
        let pending = TwoFactorState::Pending {
            temp_secret: "T".to_string(),
        };
        assert_eq!(pending.pending_secret().unwrap(), "T");
        assert!(matches!(
            TwoFactorState::Disabled.pending_secret(),
            Err(TwoFactorError::SetupNotInitiated)
        ));
        let enabled = TwoFactorState::Enabled {
            secret: "S".to_string(),
        };
        assert!(matches!(
            enabled.pending_secret(),
            Err(TwoFactorError::SetupNotInitiated)
        ));
    }

    #[test]
    fn committed_secret_never_comes_from_pending() {
        let enabled = TwoFactorState::Enabled {
            secret: "S".to_string(),
        };
        assert_eq!(enabled.committed_secret().unwrap(), "S");
        let pending = TwoFactorState::Pending {
            temp_secret: "T".to_string(),
        };
        assert!(matches!(
            pending.committed_secret(),
            Err(TwoFactorError::NotEnabled)
        ));
        assert!(matches!(
            TwoFactorState::Disabled.committed_secret(),
            Err(TwoFactorError::NotEnabled)
        ));
    }
}
