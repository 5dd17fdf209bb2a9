//! At-rest encryption for sensitive clinical fields.
//!
//! Records store condition/treatment/notes as a single opaque string produced
//! by [`FieldCipher`]: the JSON payload is encrypted with ChaCha20-Poly1305
//! under one process-wide key and encoded as base64(`nonce || ciphertext`).
//! Anything that cannot be decrypted with the current key is surfaced as
//! [`CryptoError::Decryption`] rather than treated as missing data.

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use chacha20poly1305::{
    ChaCha20Poly1305, Key, Nonce,
    aead::{Aead, KeyInit},
};
use rand::{RngCore, rngs::OsRng};
use serde_json::Value;

const NONCE_LEN: usize = 12;
pub const KEY_LEN: usize = 32;

#[derive(Debug, thiserror::Error)]
pub enum CryptoError {
    #[error("encryption key must be {KEY_LEN} bytes")]
    InvalidKey,

    #[error("failed to encrypt payload")]
    Encryption,

    #[error("failed to decrypt payload")]
    Decryption,
}

/// Symmetric codec for sensitive record fields, keyed once at startup.
#[derive(Clone)]
pub struct FieldCipher {
    key: [u8; KEY_LEN],
}

impl std::fmt::Debug for FieldCipher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        // Key material stays out of Debug output and logs.
        f.debug_struct("FieldCipher").finish_non_exhaustive()
    }
}

impl FieldCipher {
    /// Build a cipher from raw key bytes.
    ///
    /// # Errors
    /// Returns [`CryptoError::InvalidKey`] unless the key is exactly 32 bytes.
    pub fn new(key_bytes: &[u8]) -> Result<Self, CryptoError> {
        if key_bytes.len() != KEY_LEN {
            return Err(CryptoError::InvalidKey);
        }
        let mut key = [0u8; KEY_LEN];
        key.copy_from_slice(key_bytes);
        Ok(Self { key })
    }

    /// Build a cipher from a base64-encoded 32-byte key (the configuration form).
    ///
    /// # Errors
    /// Returns [`CryptoError::InvalidKey`] if the value is not valid base64 or
    /// decodes to the wrong length.
    pub fn from_base64(encoded: &str) -> Result<Self, CryptoError> {
        let bytes = STANDARD
            .decode(encoded.trim())
            .map_err(|_| CryptoError::InvalidKey)?;
        Self::new(&bytes)
    }

    /// Encrypt a JSON payload into an opaque string.
    ///
    /// Returns base64 of `nonce (12 bytes) || ciphertext`.
    ///
    /// # Errors
    /// Returns [`CryptoError::Encryption`] if serialization or AEAD sealing fails.
    pub fn encrypt(&self, payload: &Value) -> Result<String, CryptoError> {
        let plaintext = serde_json::to_vec(payload).map_err(|_| CryptoError::Encryption)?;

        let cipher = ChaCha20Poly1305::new(Key::from_slice(&self.key));

        let mut nonce_bytes = [0u8; NONCE_LEN];
        OsRng.fill_bytes(&mut nonce_bytes);
        let nonce = Nonce::from_slice(&nonce_bytes);

        let ciphertext = cipher
            .encrypt(nonce, plaintext.as_slice())
            .map_err(|_| CryptoError::Encryption)?;

        let mut sealed = Vec::with_capacity(NONCE_LEN + ciphertext.len());
        sealed.extend_from_slice(&nonce_bytes);
        sealed.extend_from_slice(&ciphertext);

        Ok(STANDARD.encode(sealed))
    }

    /// Encrypt an optional payload; absent input passes through as `None`.
    ///
    /// # Errors
    /// Same as [`FieldCipher::encrypt`].
    pub fn encrypt_opt(&self, payload: Option<&Value>) -> Result<Option<String>, CryptoError> {
        payload.map(|value| self.encrypt(value)).transpose()
    }

    /// Decrypt an opaque string back into its JSON payload.
    ///
    /// # Errors
    /// Returns [`CryptoError::Decryption`] for malformed input, ciphertext
    /// produced under a different key, or plaintext that is not valid JSON.
    pub fn decrypt(&self, sealed: &str) -> Result<Value, CryptoError> {
        let data = STANDARD
            .decode(sealed.trim())
            .map_err(|_| CryptoError::Decryption)?;

        if data.len() < NONCE_LEN {
            return Err(CryptoError::Decryption);
        }

        let (nonce_bytes, ciphertext) = data.split_at(NONCE_LEN);
        let nonce = Nonce::from_slice(nonce_bytes);

        let cipher = ChaCha20Poly1305::new(Key::from_slice(&self.key));
        let plaintext = cipher
            .decrypt(nonce, ciphertext)
            .map_err(|_| CryptoError::Decryption)?;

        serde_json::from_slice(&plaintext).map_err(|_| CryptoError::Decryption)
    }

    /// Decrypt an optional stored value; absent input passes through as `None`.
    ///
    /// # Errors
    /// Same as [`FieldCipher::decrypt`].
    pub fn decrypt_opt(&self, sealed: Option<&str>) -> Result<Option<Value>, CryptoError> {
        sealed.map(|value| self.decrypt(value)).transpose()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use base64::Engine;
    use base64::engine::general_purpose::STANDARD;
    use serde_json::json;

    fn cipher() -> FieldCipher {
        FieldCipher::new(&[42u8; KEY_LEN]).unwrap()
    }

    #[test]
    fn new_rejects_wrong_key_length() {
        assert!(matches!(
            FieldCipher::new(&[0u8; 16]),
            Err(CryptoError::InvalidKey)
        ));
    }

    #[test]
    fn from_base64_round_trips_key() {
        let encoded = STANDARD.encode([7u8; KEY_LEN]);
        assert!(FieldCipher::from_base64(&encoded).is_ok());
        assert!(FieldCipher::from_base64("not-base64!!!").is_err());
        let short = STANDARD.encode([7u8; 16]);
        assert!(FieldCipher::from_base64(&short).is_err());
    }

    #[test]
    fn encrypt_decrypt_round_trip() {
        let payload = json!({
            "condition": "Hypertension",
            "treatment": "Lisinopril 10mg",
            "notes": "Follow up in 3 months",
        });
        let sealed = cipher().encrypt(&payload).unwrap();
        assert_ne!(sealed, payload.to_string());
        let decrypted = cipher().decrypt(&sealed).unwrap();
        assert_eq!(decrypted, payload);
    }

    #[test]
    fn ciphertexts_are_nondeterministic() {
        let payload = json!({"notes": "same plaintext"});
        let first = cipher().encrypt(&payload).unwrap();
        let second = cipher().encrypt(&payload).unwrap();
        // Fresh nonce per call; both still decrypt to the same payload.
        assert_ne!(first, second);
        assert_eq!(cipher().decrypt(&first).unwrap(), payload);
        assert_eq!(cipher().decrypt(&second).unwrap(), payload);
    }

    #[test]
    fn decrypt_fails_on_tampered_ciphertext() {
        let sealed = cipher().encrypt(&json!({"notes": "x"})).unwrap();
        let mut raw = STANDARD.decode(&sealed).unwrap();
        if let Some(byte) = raw.last_mut() {
            *byte ^= 0xFF;
        }
        let tampered = STANDARD.encode(raw);
        assert!(matches!(
            cipher().decrypt(&tampered),
            Err(CryptoError::Decryption)
        ));
    }

    #[test]
    fn decrypt_fails_with_wrong_key() {
        let sealed = cipher().encrypt(&json!({"notes": "x"})).unwrap();
        let other = FieldCipher::new(&[9u8; KEY_LEN]).unwrap();
        assert!(matches!(other.decrypt(&sealed), Err(CryptoError::Decryption)));
    }

    #[test]
    fn decrypt_fails_on_garbage_input() {
        assert!(cipher().decrypt("not-base64!!!").is_err());
        let short = STANDARD.encode([0u8; 4]);
        assert!(cipher().decrypt(&short).is_err());
    }

    #[test]
    fn optional_passthrough() {
        assert!(cipher().encrypt_opt(None).unwrap().is_none());
        assert!(cipher().decrypt_opt(None).unwrap().is_none());
        let payload = json!({"condition": "Asthma"});
        let sealed = cipher().encrypt_opt(Some(&payload)).unwrap().unwrap();
        let decrypted = cipher().decrypt_opt(Some(&sealed)).unwrap().unwrap();
        assert_eq!(decrypted, payload);
    }
}
