//! AES-256-GCM envelope sealing for stored credentials.
//!
//! Sealed form is `base64(nonce || ciphertext || tag)` with a fresh
//! 12-byte nonce per seal, so sealing the same secret twice never
//! produces the same stored string.

use aes_gcm::aead::rand_core::RngCore;
use aes_gcm::aead::{Aead, KeyInit, OsRng};
use aes_gcm::{Aes256Gcm, Key, Nonce};
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use secrecy::{ExposeSecret, SecretString};

use crate::ports::{SecretStore, SecretStoreError};

const NONCE_LEN: usize = 12;

/// [`SecretStore`] sealing under a single 32-byte master key.
///
/// The master key comes from configuration as base64; rotate by opening
/// under the old store and resealing under a new one.
pub struct EnvelopeSecretStore {
    cipher: Aes256Gcm,
}

impl EnvelopeSecretStore {
    pub fn new(key: &[u8; 32]) -> Self {
        Self {
            cipher: Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(key)),
        }
    }

    /// Build from a base64-encoded 32-byte master key.
    pub fn from_base64_key(encoded: &SecretString) -> Result<Self, SecretStoreError> {
        let bytes = STANDARD
            .decode(encoded.expose_secret())
            .map_err(|e| SecretStoreError::BadKey(format!("not valid base64: {e}")))?;
        let key: [u8; 32] = bytes
            .try_into()
            .map_err(|_| SecretStoreError::BadKey("key must be exactly 32 bytes".into()))?;
        Ok(Self::new(&key))
    }

    /// Mint a fresh random master key, base64-encoded for configuration.
    pub fn generate_master_key() -> String {
        let mut key = [0u8; 32];
        OsRng.fill_bytes(&mut key);
        STANDARD.encode(key)
    }
}

impl SecretStore for EnvelopeSecretStore {
    fn seal(&self, secret: &SecretString) -> Result<String, SecretStoreError> {
        let mut nonce_bytes = [0u8; NONCE_LEN];
        OsRng.fill_bytes(&mut nonce_bytes);
        let nonce = Nonce::from_slice(&nonce_bytes);

        let ciphertext = self
            .cipher
            .encrypt(nonce, secret.expose_secret().as_bytes())
            .map_err(|e| SecretStoreError::SealFailed(format!("AES-GCM encrypt: {e}")))?;

        let mut combined = nonce_bytes.to_vec();
        combined.extend_from_slice(&ciphertext);
        Ok(STANDARD.encode(combined))
    }

    fn open(&self, sealed: &str) -> Result<SecretString, SecretStoreError> {
        let combined = STANDARD
            .decode(sealed)
            .map_err(|e| SecretStoreError::OpenFailed(format!("not valid base64: {e}")))?;

        if combined.len() <= NONCE_LEN {
            return Err(SecretStoreError::OpenFailed("sealed value too short".into()));
        }

        let (nonce_bytes, ciphertext) = combined.split_at(NONCE_LEN);
        let plaintext = self
            .cipher
            .decrypt(Nonce::from_slice(nonce_bytes), ciphertext)
            .map_err(|_| {
                SecretStoreError::OpenFailed("authentication failed (wrong key or tampered)".into())
            })?;

        let secret = String::from_utf8(plaintext)
            .map_err(|_| SecretStoreError::OpenFailed("plaintext is not UTF-8".into()))?;
        Ok(SecretString::new(secret))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store() -> EnvelopeSecretStore {
        EnvelopeSecretStore::new(&[42u8; 32])
    }

    #[test]
    fn sealed_secret_opens_to_the_original() {
        let store = store();
        let secret = SecretString::new("sk_live_abc123".to_string());

        let sealed = store.seal(&secret).unwrap();
        let opened = store.open(&sealed).unwrap();

        assert_eq!(opened.expose_secret(), "sk_live_abc123");
    }

    #[test]
    fn sealing_twice_yields_distinct_envelopes() {
        let store = store();
        let secret = SecretString::new("same-secret".to_string());

        let first = store.seal(&secret).unwrap();
        let second = store.seal(&secret).unwrap();

        assert_ne!(first, second);
        assert_eq!(store.open(&second).unwrap().expose_secret(), "same-secret");
    }

    #[test]
    fn wrong_key_fails_to_open() {
        let sealed = store()
            .seal(&SecretString::new("secret".to_string()))
            .unwrap();

        let other = EnvelopeSecretStore::new(&[99u8; 32]);
        let err = other.open(&sealed).unwrap_err();
        assert!(matches!(err, SecretStoreError::OpenFailed(_)));
    }

    #[test]
    fn tampered_envelope_fails_to_open() {
        let store = store();
        let sealed = store.seal(&SecretString::new("secret".to_string())).unwrap();

        let mut bytes = STANDARD.decode(&sealed).unwrap();
        let last = bytes.len() - 1;
        bytes[last] ^= 0x01;
        let tampered = STANDARD.encode(bytes);

        assert!(store.open(&tampered).is_err());
    }

    #[test]
    fn garbage_input_is_rejected() {
        let store = store();
        assert!(matches!(
            store.open("not base64 at all!"),
            Err(SecretStoreError::OpenFailed(_))
        ));
        assert!(matches!(
            store.open("AAAA"),
            Err(SecretStoreError::OpenFailed(_))
        ));
    }

    #[test]
    fn master_keys_parse_from_base64() {
        let encoded = EnvelopeSecretStore::generate_master_key();
        let key = SecretString::new(encoded);
        assert!(EnvelopeSecretStore::from_base64_key(&key).is_ok());

        let short = SecretString::new(STANDARD.encode([1u8; 16]));
        assert!(matches!(
            EnvelopeSecretStore::from_base64_key(&short),
            Err(SecretStoreError::BadKey(_))
        ));
    }
}
