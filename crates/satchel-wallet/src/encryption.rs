//! Password-based encryption for the wallet file.
//!
//! The key is stretched from the password with argon2id and the payload is
//! sealed with AES-256-GCM.
//!
//! # Layout
//! ```text
//! salt (32 bytes) || nonce (12 bytes) || ciphertext + auth_tag (16 bytes)
//! ```

use aes_gcm::aead::{Aead, KeyInit};
use aes_gcm::{Aes256Gcm, Nonce};
use argon2::{Algorithm, Argon2, Params, Version};
use rand::RngCore;
use rand::rngs::OsRng;
use zeroize::Zeroizing;

use crate::error::WalletError;

const SALT_LEN: usize = 32;
const NONCE_LEN: usize = 12;
const TAG_LEN: usize = 16;

/// Shortest well-formed payload: salt, nonce and an empty ciphertext's tag.
const MIN_SEALED_LEN: usize = SALT_LEN + NONCE_LEN + TAG_LEN;

/// Stretch a password into a 256-bit key with argon2id.
///
/// `salt` must be at least 8 bytes.
pub fn derive_key(password: &[u8], salt: &[u8]) -> Result<Zeroizing<[u8; 32]>, WalletError> {
    let argon = Argon2::new(Algorithm::Argon2id, Version::V0x13, Params::default());
    let mut key = Zeroizing::new([0u8; 32]);
    argon
        .hash_password_into(password, salt, key.as_mut())
        .map_err(|e| WalletError::Encryption(format!("key derivation: {e}")))?;
    Ok(key)
}

/// Seal `plaintext` under `password` with a fresh salt and nonce.
pub fn encrypt(plaintext: &[u8], password: &[u8]) -> Result<Vec<u8>, WalletError> {
    let mut salt = [0u8; SALT_LEN];
    let mut nonce = [0u8; NONCE_LEN];
    OsRng.fill_bytes(&mut salt);
    OsRng.fill_bytes(&mut nonce);

    let key = derive_key(password, &salt)?;
    let cipher = Aes256Gcm::new_from_slice(key.as_ref())
        .map_err(|e| WalletError::Encryption(e.to_string()))?;
    let ciphertext = cipher
        .encrypt(Nonce::from_slice(&nonce), plaintext)
        .map_err(|e| WalletError::Encryption(e.to_string()))?;

    let mut sealed = Vec::with_capacity(SALT_LEN + NONCE_LEN + ciphertext.len());
    sealed.extend_from_slice(&salt);
    sealed.extend_from_slice(&nonce);
    sealed.extend_from_slice(&ciphertext);
    Ok(sealed)
}

/// Open a payload produced by [`encrypt`].
///
/// A tag mismatch, whether from a wrong password or tampering, is reported
/// as [`WalletError::InvalidPassword`].
pub fn decrypt(sealed: &[u8], password: &[u8]) -> Result<Zeroizing<Vec<u8>>, WalletError> {
    if sealed.len() < MIN_SEALED_LEN {
        return Err(WalletError::CorruptedFile(format!(
            "encrypted payload too short: {} < {MIN_SEALED_LEN}",
            sealed.len()
        )));
    }
    let (salt, rest) = sealed.split_at(SALT_LEN);
    let (nonce, ciphertext) = rest.split_at(NONCE_LEN);

    let key = derive_key(password, salt)?;
    let cipher = Aes256Gcm::new_from_slice(key.as_ref())
        .map_err(|e| WalletError::Encryption(e.to_string()))?;
    cipher
        .decrypt(Nonce::from_slice(nonce), ciphertext)
        .map(Zeroizing::new)
        .map_err(|_| WalletError::InvalidPassword)
}
