//! # MediSafe (Patient Records API)
//!
//! `medisafe` is a patient management backend. It handles account registration,
//! password login with an optional TOTP second factor, and encrypted storage of
//! clinical records.
//!
//! ## Authentication
//!
//! Passwords are hashed with Argon2id. Login is a two step protocol: a correct
//! password either opens a session directly or, when the account has TOTP
//! enabled, returns a `second_factor_required` marker. The session is only
//! issued once the second step presents a valid authenticator code or an
//! unused recovery code.
//!
//! ## Two-factor lifecycle
//!
//! Enrollment stages a temporary secret plus a fresh batch of recovery codes
//! and only commits them after the caller proves possession of the
//! authenticator by confirming a current code. Recovery codes are stored as
//! SHA-256 digests and each one is consumed atomically on use.
//!
//! ## Record encryption
//!
//! Clinical fields are sealed with ChaCha20-Poly1305 before they reach the
//! database. The database only ever sees base64 ciphertext; decryption
//! failures surface as errors instead of partial rows.

pub mod api;
pub mod cli;
pub mod crypto;
pub mod twofactor;

#[allow(clippy::doc_markdown, clippy::needless_raw_string_hashes)]
pub mod built_info {
    include!(concat!(env!("OUT_DIR"), "/built.rs"));
}

pub const GIT_COMMIT_HASH: &str = match built_info::GIT_COMMIT_HASH {
    Some(hash) => hash,
    None => "unknown",
};
