//! Auth module tests.
//!
//! The login protocol and enrollment state machine are exercised against an
//! in-memory credential store so the semantic guarantees hold without a
//! database: session ordering, temp-secret exclusion, and single-use recovery
//! codes all live here.

use std::collections::HashSet;

use super::login::{LoginError, SecondFactorMethod, parse_second_factor};
use super::types::SecondFactorRequest;
use super::utils::{dummy_verify_password, hash_password, verify_password};
use crate::twofactor::recovery::{
    generate_recovery_codes, hash_recovery_code, normalize_recovery_code,
};
use crate::twofactor::state::{TwoFactorError, TwoFactorState};
use crate::twofactor::totp::TotpManager;

const NOW: u64 = 1_700_000_000;

#[derive(Debug, PartialEq, Eq)]
enum Step1 {
    SessionIssued,
    SecondFactorRequired,
    Rejected,
}

#[derive(Debug, PartialEq, Eq)]
enum Step2 {
    SessionIssued,
    Rejected,
}

/// Credential record plus the protocol operations, backed by memory instead
/// of Postgres. Verification goes through the same primitives the handlers
/// use.
struct InMemoryCredentialStore {
    password_hash: String,
    state: TwoFactorState,
    recovery_hashes: HashSet<Vec<u8>>,
    totp: TotpManager,
}

impl InMemoryCredentialStore {
    fn new(password: &str) -> Self {
        Self {
            password_hash: hash_password(password).expect("hash"),
            state: TwoFactorState::Disabled,
            recovery_hashes: HashSet::new(),
            totp: TotpManager::new("MediSafe".to_string()),
        }
    }

    fn begin_setup(&mut self) -> Result<(String, Vec<String>), TwoFactorError> {
        self.state.ensure_setup_allowed()?;
        let secret = TotpManager::generate_secret();
        let codes = generate_recovery_codes().map_err(TwoFactorError::Internal)?;
        self.recovery_hashes = codes
            .iter()
            .map(|code| {
                let normalized = normalize_recovery_code(code).expect("generated code");
                hash_recovery_code(&normalized)
            })
            .collect();
        self.state = TwoFactorState::Pending {
            temp_secret: secret.clone(),
        };
        Ok((secret, codes))
    }

    fn confirm_setup(&mut self, code: &str) -> Result<(), TwoFactorError> {
        let pending = self.state.pending_secret()?.to_string();
        if !self
            .totp
            .verify_at(&pending, code, NOW)
            .map_err(TwoFactorError::Internal)?
        {
            return Err(TwoFactorError::InvalidCode);
        }
        self.state = TwoFactorState::Enabled { secret: pending };
        Ok(())
    }

    fn disable(&mut self, code: &str) -> Result<(), TwoFactorError> {
        // Only the committed secret authorizes teardown; a pending temp
        // secret fails the gate before the code is even checked.
        let secret = self.state.committed_secret()?.to_string();
        if !self
            .totp
            .verify_at(&secret, code, NOW)
            .map_err(TwoFactorError::Internal)?
        {
            return Err(TwoFactorError::InvalidCode);
        }
        self.state = TwoFactorState::Disabled;
        self.recovery_hashes.clear();
        Ok(())
    }

    fn login(&self, password: &str) -> Step1 {
        if !verify_password(password, &self.password_hash).unwrap_or(false) {
            return Step1::Rejected;
        }
        if self.state.is_enabled() {
            Step1::SecondFactorRequired
        } else {
            Step1::SessionIssued
        }
    }

    fn second_factor(&mut self, request: &SecondFactorRequest) -> Result<Step2, LoginError> {
        let method = parse_second_factor(request)?;
        let secret = match self.state.committed_secret() {
            Ok(secret) => secret.to_string(),
            Err(_) => return Ok(Step2::Rejected),
        };
        let verified = match method {
            SecondFactorMethod::Totp(code) => self
                .totp
                .verify_at(&secret, &code, NOW)
                .unwrap_or(false),
            SecondFactorMethod::Recovery(code) => match normalize_recovery_code(&code) {
                // Mirrors the atomic DELETE: removal happens before any
                // session is granted, and a second removal finds nothing.
                Ok(normalized) => self.recovery_hashes.remove(&hash_recovery_code(&normalized)),
                Err(_) => false,
            },
        };
        if verified {
            Ok(Step2::SessionIssued)
        } else {
            Ok(Step2::Rejected)
        }
    }
}

fn totp_request(code: &str) -> SecondFactorRequest {
    SecondFactorRequest {
        email: "alice@example.com".to_string(),
        code: Some(code.to_string()),
        recovery_code: None,
    }
}

fn recovery_request(code: &str) -> SecondFactorRequest {
    SecondFactorRequest {
        email: "alice@example.com".to_string(),
        code: None,
        recovery_code: Some(code.to_string()),
    }
}

#[test]
fn login_without_second_factor_issues_session_directly() {
    let store = InMemoryCredentialStore::new("correct horse");
    assert_eq!(store.login("correct horse"), Step1::SessionIssued);
}

#[test]
fn wrong_password_and_unknown_user_are_indistinguishable() {
    let store = InMemoryCredentialStore::new("correct horse");
    let wrong_password = store.login("battery staple");
    assert_eq!(wrong_password, Step1::Rejected);
    // The unknown-user path burns the same verification work and produces
    // the same outcome.
    dummy_verify_password("battery staple");
}

#[test]
fn enrollment_promotes_temp_secret_and_requires_second_factor() {
    let mut store = InMemoryCredentialStore::new("pw-longer-than-8");
    let (secret, _codes) = store.begin_setup().expect("setup");

    let code = store.totp.code_at(&secret, NOW).expect("code");
    store.confirm_setup(&code).expect("confirm");

    assert!(store.state.is_enabled());
    assert!(store.state.pending_secret().is_err());
    assert_eq!(store.login("pw-longer-than-8"), Step1::SecondFactorRequired);

    let outcome = store.second_factor(&totp_request(&code)).expect("step 2");
    assert_eq!(outcome, Step2::SessionIssued);
}

#[test]
fn confirm_with_wrong_code_leaves_state_pending() {
    let mut store = InMemoryCredentialStore::new("pw-longer-than-8");
    let (secret, _codes) = store.begin_setup().expect("setup");

    // A code from a different secret cannot complete enrollment.
    let other_secret = TotpManager::generate_secret();
    let wrong = store.totp.code_at(&other_secret, NOW).expect("code");
    if wrong != store.totp.code_at(&secret, NOW).expect("code") {
        assert!(matches!(
            store.confirm_setup(&wrong),
            Err(TwoFactorError::InvalidCode)
        ));
        assert_eq!(store.state.pending_secret().ok(), Some(secret.as_str()));
    }
}

#[test]
fn pending_secret_never_authorizes_login() {
    let mut store = InMemoryCredentialStore::new("pw-longer-than-8");
    let (secret, _codes) = store.begin_setup().expect("setup");

    // Enrollment was never confirmed; step 1 issues a session without a
    // challenge and a code for the temp secret buys nothing at step 2.
    assert_eq!(store.login("pw-longer-than-8"), Step1::SessionIssued);
    let code = store.totp.code_at(&secret, NOW).expect("code");
    let outcome = store.second_factor(&totp_request(&code)).expect("step 2");
    assert_eq!(outcome, Step2::Rejected);
}

#[test]
fn setup_while_enabled_is_rejected() {
    let mut store = InMemoryCredentialStore::new("pw-longer-than-8");
    let (secret, _codes) = store.begin_setup().expect("setup");
    let code = store.totp.code_at(&secret, NOW).expect("code");
    store.confirm_setup(&code).expect("confirm");

    assert!(matches!(
        store.begin_setup(),
        Err(TwoFactorError::AlreadyEnabled)
    ));
}

#[test]
fn rerunning_setup_replaces_pending_material() {
    let mut store = InMemoryCredentialStore::new("pw-longer-than-8");
    let (first_secret, first_codes) = store.begin_setup().expect("setup");
    let (second_secret, _second_codes) = store.begin_setup().expect("re-setup");

    assert_ne!(first_secret, second_secret);
    assert_eq!(
        store.state.pending_secret().ok(),
        Some(second_secret.as_str())
    );
    // The first batch of recovery hashes was replaced wholesale.
    let old_normalized = normalize_recovery_code(&first_codes[0]).expect("generated code");
    assert!(
        !store
            .recovery_hashes
            .contains(&hash_recovery_code(&old_normalized))
    );
}

#[test]
fn disable_with_wrong_code_changes_nothing() {
    let mut store = InMemoryCredentialStore::new("pw-longer-than-8");
    let (secret, codes) = store.begin_setup().expect("setup");
    let code = store.totp.code_at(&secret, NOW).expect("code");
    store.confirm_setup(&code).expect("confirm");

    let other_secret = TotpManager::generate_secret();
    let wrong = store.totp.code_at(&other_secret, NOW).expect("code");
    if wrong != code {
        assert!(matches!(
            store.disable(&wrong),
            Err(TwoFactorError::InvalidCode)
        ));
        // Still enabled under the same secret, recovery batch untouched.
        assert_eq!(store.state.committed_secret().ok(), Some(secret.as_str()));
        assert_eq!(store.recovery_hashes.len(), codes.len());
        assert_eq!(store.login("pw-longer-than-8"), Step1::SecondFactorRequired);
    }
}

#[test]
fn disable_clears_secret_and_recovery_codes() {
    let mut store = InMemoryCredentialStore::new("pw-longer-than-8");
    let (secret, codes) = store.begin_setup().expect("setup");
    let code = store.totp.code_at(&secret, NOW).expect("code");
    store.confirm_setup(&code).expect("confirm");

    store.disable(&code).expect("disable");

    assert_eq!(store.state, TwoFactorState::Disabled);
    assert!(store.recovery_hashes.is_empty());
    // Back to the single-step login, and the old recovery codes buy nothing.
    assert_eq!(store.login("pw-longer-than-8"), Step1::SessionIssued);
    assert_eq!(
        store
            .second_factor(&recovery_request(&codes[0]))
            .expect("step 2"),
        Step2::Rejected
    );
}

#[test]
fn pending_secret_never_satisfies_disable() {
    let mut store = InMemoryCredentialStore::new("pw-longer-than-8");
    let (secret, _codes) = store.begin_setup().expect("setup");

    // Enrollment was never confirmed; even a valid code for the temp secret
    // cannot drive the disable path.
    let code = store.totp.code_at(&secret, NOW).expect("code");
    assert!(matches!(
        store.disable(&code),
        Err(TwoFactorError::NotEnabled)
    ));
    assert_eq!(store.state.pending_secret().ok(), Some(secret.as_str()));
}

#[test]
fn recovery_code_is_single_use_and_leaves_others_valid() {
    let mut store = InMemoryCredentialStore::new("pw-longer-than-8");
    let (secret, codes) = store.begin_setup().expect("setup");
    let code = store.totp.code_at(&secret, NOW).expect("code");
    store.confirm_setup(&code).expect("confirm");

    assert_eq!(store.login("pw-longer-than-8"), Step1::SecondFactorRequired);

    // Spend code B, then replay it; A must still work afterwards.
    let b = &codes[1];
    assert_eq!(
        store.second_factor(&recovery_request(b)).expect("step 2"),
        Step2::SessionIssued
    );
    assert_eq!(
        store.second_factor(&recovery_request(b)).expect("replay"),
        Step2::Rejected
    );
    let a = &codes[0];
    assert_eq!(
        store.second_factor(&recovery_request(a)).expect("step 2"),
        Step2::SessionIssued
    );
}

#[test]
fn recovery_codes_match_regardless_of_separators_and_case() {
    let mut store = InMemoryCredentialStore::new("pw-longer-than-8");
    let (secret, codes) = store.begin_setup().expect("setup");
    let code = store.totp.code_at(&secret, NOW).expect("code");
    store.confirm_setup(&code).expect("confirm");

    let reformatted = codes[0].replace('-', " ").to_lowercase();
    assert_eq!(
        store
            .second_factor(&recovery_request(&reformatted))
            .expect("step 2"),
        Step2::SessionIssued
    );
}

#[test]
fn step_two_rejects_malformed_submissions_before_secrets() {
    let both = SecondFactorRequest {
        email: "alice@example.com".to_string(),
        code: Some("123456".to_string()),
        recovery_code: Some("AAAA-BBBB-CCCC-DDDD".to_string()),
    };
    let mut store = InMemoryCredentialStore::new("pw-longer-than-8");
    assert!(matches!(
        store.second_factor(&both),
        Err(LoginError::InvalidRequest(_))
    ));
}
