//! Recovery code generation and normalization.
//!
//! Recovery codes are the one-time fallback when the authenticator app is
//! unavailable. Each code is four groups of four characters from an alphabet
//! without visually ambiguous symbols (no 0/O or 1/I). Only a SHA-256 digest
//! of the normalized code is stored, so consumption can be a single atomic
//! compare-and-delete against the digest.

use anyhow::{Context, Result, anyhow};
use rand::{RngCore, rngs::OsRng};
use sha2::{Digest, Sha256};

pub const RECOVERY_CODE_COUNT: usize = 8;
const RECOVERY_CODE_LEN: usize = 16;
const RECOVERY_CODE_GROUP_SIZE: usize = 4;
const RECOVERY_CODE_ALPHABET: &[u8] = b"ABCDEFGHJKLMNPQRSTUVWXYZ23456789";

/// Generate a batch of recovery codes in grouped display form.
///
/// # Errors
/// Returns an error if the OS entropy source fails.
pub fn generate_recovery_codes() -> Result<Vec<String>> {
    let mut rng = OsRng;
    generate_with_rng(&mut rng, RECOVERY_CODE_COUNT)
}

fn generate_with_rng<R: RngCore + ?Sized>(rng: &mut R, count: usize) -> Result<Vec<String>> {
    let mut codes = Vec::with_capacity(count);
    for _ in 0..count {
        codes.push(generate_code(rng)?);
    }
    Ok(codes)
}

fn generate_code<R: RngCore + ?Sized>(rng: &mut R) -> Result<String> {
    let mut raw = [0u8; RECOVERY_CODE_LEN];
    rng.try_fill_bytes(&mut raw)
        .context("failed to generate recovery code")?;
    let mut normalized = String::with_capacity(RECOVERY_CODE_LEN);
    for byte in raw {
        let idx = usize::from(byte) % RECOVERY_CODE_ALPHABET.len();
        if let Some(&char_byte) = RECOVERY_CODE_ALPHABET.get(idx) {
            normalized.push(char_byte as char);
        }
    }
    format_recovery_code(&normalized)
}

/// Normalize user input for lookup: strip separators, uppercase, and reject
/// anything outside the recovery alphabet.
///
/// # Errors
/// Returns an error for wrong length or characters outside the alphabet.
pub fn normalize_recovery_code(input: &str) -> Result<String> {
    let normalized: String = input
        .chars()
        .filter(char::is_ascii_alphanumeric)
        .map(|ch| ch.to_ascii_uppercase())
        .collect();

    if normalized.len() != RECOVERY_CODE_LEN {
        return Err(anyhow!("invalid recovery code length"));
    }

    if !normalized
        .as_bytes()
        .iter()
        .all(|ch| RECOVERY_CODE_ALPHABET.contains(ch))
    {
        return Err(anyhow!("invalid recovery code characters"));
    }

    Ok(normalized)
}

/// Format a normalized code for display (`ABCD-2345-WXYZ-6789`).
///
/// # Errors
/// Returns an error for inputs of the wrong length.
pub fn format_recovery_code(normalized: &str) -> Result<String> {
    if normalized.len() != RECOVERY_CODE_LEN {
        return Err(anyhow!("invalid recovery code length"));
    }
    let mut out = String::with_capacity(RECOVERY_CODE_LEN + 3);
    for (idx, chunk) in normalized
        .as_bytes()
        .chunks(RECOVERY_CODE_GROUP_SIZE)
        .enumerate()
    {
        if idx > 0 {
            out.push('-');
        }
        out.push_str(std::str::from_utf8(chunk).context("invalid recovery code chunk")?);
    }
    Ok(out)
}

/// Digest stored in place of the code; raw codes never touch the database.
#[must_use]
pub fn hash_recovery_code(normalized: &str) -> Vec<u8> {
    let mut hasher = Sha256::new();
    hasher.update(normalized.as_bytes());
    hasher.finalize().to_vec()
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn generates_eight_grouped_codes() {
        let codes = generate_recovery_codes().unwrap();
        assert_eq!(codes.len(), RECOVERY_CODE_COUNT);
        for code in &codes {
            assert_eq!(code.len(), 19);
            let groups: Vec<&str> = code.split('-').collect();
            assert_eq!(groups.len(), 4);
            assert!(groups.iter().all(|group| group.len() == 4));
        }
    }

    #[test]
    fn codes_avoid_ambiguous_characters() {
        let codes = generate_recovery_codes().unwrap();
        for code in codes {
            for ch in code.chars().filter(|ch| *ch != '-') {
                assert!(
                    RECOVERY_CODE_ALPHABET.contains(&(ch as u8)),
                    "unexpected character {ch} in {code}"
                );
            }
        }
    }

    #[test]
    fn batch_has_no_duplicates() {
        let codes = generate_recovery_codes().unwrap();
        let unique: HashSet<&String> = codes.iter().collect();
        assert_eq!(unique.len(), codes.len());
    }

    #[test]
    fn normalize_strips_separators_and_uppercases() {
        let normalized = normalize_recovery_code("abcd-efgh-jklm-npqr").unwrap();
        assert_eq!(normalized, "ABCDEFGHJKLMNPQR");
        let spaced = normalize_recovery_code("abcd efgh jklm npqr").unwrap();
        assert_eq!(spaced, "ABCDEFGHJKLMNPQR");
    }

    #[test]
    fn normalize_rejects_bad_input() {
        assert!(normalize_recovery_code("too-short").is_err());
        // 0 and 1 are excluded from the alphabet.
        assert!(normalize_recovery_code("ABCD-EFGH-JKLM-NP01").is_err());
    }

    #[test]
    fn format_groups_normalized_code() {
        let formatted = format_recovery_code("ABCDEFGHJKLMNPQR").unwrap();
        assert_eq!(formatted, "ABCD-EFGH-JKLM-NPQR");
    }

    #[test]
    fn hash_is_stable_per_code() {
        let first = hash_recovery_code("ABCDEFGHJKLMNPQR");
        let second = hash_recovery_code("ABCDEFGHJKLMNPQR");
        let other = hash_recovery_code("ABCDEFGHJKLMNPQS");
        assert_eq!(first, second);
        assert_ne!(first, other);
        assert_eq!(first.len(), 32);
    }

    #[test]
    fn generated_codes_normalize_and_hash() {
        let codes = generate_recovery_codes().unwrap();
        for code in codes {
            let normalized = normalize_recovery_code(&code).unwrap();
            assert_eq!(format_recovery_code(&normalized).unwrap(), code);
            assert_eq!(hash_recovery_code(&normalized).len(), 32);
        }
    }
}
