// Session channel cryptography.
//
// One AES-256-GCM key per session, generated locally and transmitted to the
// server exactly once, wrapped under the server's RSA public key during the
// handshake. Everything after the handshake travels as opaque
// `nonce || ciphertext+tag` byte strings.

use aes_gcm::{
    aead::{Aead, KeyInit},
    Aes256Gcm, Nonce,
};
use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
use rand::rngs::OsRng;
use rand::RngCore;
use rsa::pkcs8::DecodePublicKey;
use rsa::{Oaep, RsaPublicKey};
use sha2::Sha256;
use zeroize::Zeroize;

/// 256-bit symmetric session key
pub struct SessionKey([u8; 32]);

impl SessionKey {
    /// Generate a fresh random key
    pub fn random() -> Self {
        let mut key = [0u8; 32];
        OsRng.fill_bytes(&mut key);
        Self(key)
    }

    pub fn from_bytes(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }
}

impl Drop for SessionKey {
    fn drop(&mut self) {
        self.0.zeroize();
    }
}

impl Clone for SessionKey {
    fn clone(&self) -> Self {
        Self(self.0)
    }
}

/// Crypto error types
#[derive(Debug, thiserror::Error)]
pub enum CryptoError {
    #[error("no session key committed, handshake required")]
    NoSessionKey,
    #[error("invalid encryption key")]
    InvalidKey,
    #[error("ciphertext shorter than nonce (expected at least 12 bytes)")]
    TruncatedCiphertext,
    #[error("encryption failed")]
    EncryptionFailed,
    #[error("decryption failed - data corrupted or key mismatch")]
    DecryptionFailed,
    #[error("invalid server public key: {0}")]
    InvalidPublicKey(String),
    #[error("failed to wrap session key: {0}")]
    KeyWrap(String),
}

/// Holds the committed session key and seals/opens payloads with it.
///
/// The key lives inside this value, not in process-global state; its lifetime
/// is tied to whatever owns the channel (normally the `ApiClient`). A new
/// handshake overwrites the key; there is no automatic rotation.
#[derive(Default)]
pub struct CryptoChannel {
    key: Option<SessionKey>,
}

impl CryptoChannel {
    pub fn new() -> Self {
        Self { key: None }
    }

    pub fn has_key(&self) -> bool {
        self.key.is_some()
    }

    /// Commit a new session key, replacing any previous one.
    pub fn commit(&mut self, key: SessionKey) {
        self.key = Some(key);
    }

    /// Drop the committed key. Called when a handshake fails partway so a
    /// stale key is never reused.
    pub fn clear(&mut self) {
        self.key = None;
    }

    /// Encrypt a payload under the committed key.
    /// Returns binary format: nonce (12 bytes) || ciphertext (includes auth tag).
    pub fn encrypt(&self, plaintext: &[u8]) -> Result<Vec<u8>, CryptoError> {
        let key = self.key.as_ref().ok_or(CryptoError::NoSessionKey)?;
        let cipher = Aes256Gcm::new_from_slice(key.as_bytes()).map_err(|_| CryptoError::InvalidKey)?;

        let mut nonce_bytes = [0u8; 12];
        OsRng.fill_bytes(&mut nonce_bytes);
        let nonce = Nonce::from_slice(&nonce_bytes);

        let ciphertext = cipher
            .encrypt(nonce, plaintext)
            .map_err(|_| CryptoError::EncryptionFailed)?;

        let mut sealed = Vec::with_capacity(12 + ciphertext.len());
        sealed.extend_from_slice(&nonce_bytes);
        sealed.extend_from_slice(&ciphertext);
        Ok(sealed)
    }

    /// Decrypt a `nonce || ciphertext` payload under the committed key.
    pub fn decrypt(&self, data: &[u8]) -> Result<Vec<u8>, CryptoError> {
        let key = self.key.as_ref().ok_or(CryptoError::NoSessionKey)?;
        if data.len() < 12 {
            return Err(CryptoError::TruncatedCiphertext);
        }
        let (nonce_bytes, ciphertext) = data.split_at(12);
        let cipher = Aes256Gcm::new_from_slice(key.as_bytes()).map_err(|_| CryptoError::InvalidKey)?;
        let nonce = Nonce::from_slice(nonce_bytes);

        cipher
            .decrypt(nonce, ciphertext)
            .map_err(|_| CryptoError::DecryptionFailed)
    }
}

/// Wrap a session key under the server's PEM-encoded RSA public key for the
/// second handshake round trip. Returns the base64 form that goes on the wire.
pub fn wrap_session_key(public_key_pem: &str, key: &SessionKey) -> Result<String, CryptoError> {
    let public_key = RsaPublicKey::from_public_key_pem(public_key_pem)
        .map_err(|e| CryptoError::InvalidPublicKey(e.to_string()))?;

    let wrapped = public_key
        .encrypt(&mut OsRng, Oaep::new::<Sha256>(), key.as_bytes())
        .map_err(|e| CryptoError::KeyWrap(e.to_string()))?;

    Ok(BASE64.encode(wrapped))
}
