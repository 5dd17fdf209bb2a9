//! TOTP two-factor authentication: enrollment state machine, code
//! verification, and single-use recovery codes.

pub mod recovery;
pub mod repo;
pub mod service;
pub mod state;
pub mod totp;

pub use service::{SetupStart, StatusReport, TwoFactorService};
pub use state::{TwoFactorError, TwoFactorState, TwoFactorStatus};
pub use totp::TotpManager;
