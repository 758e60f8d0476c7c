//! # Packet Cryptography
//!
//! ChaCha20-Poly1305 AEAD with a 64-bit nonce.
//!
//! The packet layer only ever needs two operations: seal a plaintext under
//! `(nonce, key)` and open it again. Nonces here are packet sequence numbers
//! or issuer counters, so they are 8 bytes on the wire and zero-extended to
//! the 12-byte IETF nonce (`[0, 0, 0, 0] ++ nonce.to_le_bytes()`).
//!
//! Both operations write into caller-provided buffers; nothing is allocated
//! per packet. The ciphertext layout is `ciphertext ++ tag`, `MAC_BYTES` of
//! tag after the encrypted bytes.
//!
//! ## Security
//! - A `(nonce, key)` pair must never be sealed twice
//! - Authentication failure is a single opaque outcome; no partial plaintext
//!   is ever exposed to the caller
//! - Keys are generated from the operating system RNG (getrandom)

use chacha20poly1305::aead::{AeadInPlace, KeyInit};
use chacha20poly1305::{ChaCha20Poly1305, Key as CipherKey, Nonce, Tag};
use thiserror::Error;

/// Symmetric key size in bytes
pub const KEY_BYTES: usize = 32;

/// Nonce size carried on the wire
pub const NONCE_BYTES: usize = 8;

/// Authentication tag size
pub const MAC_BYTES: usize = 16;

/// A symmetric AEAD key
pub type Key = [u8; KEY_BYTES];

/// Failure of the AEAD primitive. Deliberately carries no detail.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum CryptoError {
    #[error("encryption failed")]
    EncryptFailed,

    #[error("decryption failed")]
    DecryptFailed,

    #[error("random number generation failed")]
    RandomFailed,
}

/// Fill a fresh key from the operating system RNG.
pub fn generate_key() -> Result<Key, CryptoError> {
    let mut key = [0u8; KEY_BYTES];
    getrandom::fill(&mut key).map_err(|_| CryptoError::RandomFailed)?;
    Ok(key)
}

#[inline]
fn expand_nonce(nonce: u64) -> Nonce {
    let mut bytes = [0u8; 12];
    bytes[4..].copy_from_slice(&nonce.to_le_bytes());
    Nonce::clone_from_slice(&bytes)
}

/// Encrypt `plaintext` into `out`, returning the number of bytes written
/// (`plaintext.len() + MAC_BYTES`).
///
/// Fails if `out` cannot hold the ciphertext and tag.
pub fn encrypt(
    plaintext: &[u8],
    out: &mut [u8],
    nonce: u64,
    key: &Key,
) -> Result<usize, CryptoError> {
    let len = plaintext.len();
    let total = len + MAC_BYTES;
    if out.len() < total {
        return Err(CryptoError::EncryptFailed);
    }

    let cipher = ChaCha20Poly1305::new(CipherKey::from_slice(key));
    out[..len].copy_from_slice(plaintext);

    let tag = cipher
        .encrypt_in_place_detached(&expand_nonce(nonce), b"", &mut out[..len])
        .map_err(|_| CryptoError::EncryptFailed)?;
    out[len..total].copy_from_slice(tag.as_slice());

    Ok(total)
}

/// Decrypt `ciphertext` (which ends in its tag) into `out`, returning the
/// plaintext length.
///
/// Inputs too short to carry a tag, buffers too small for the plaintext and
/// authentication failures all collapse into [`CryptoError::DecryptFailed`].
pub fn decrypt(
    ciphertext: &[u8],
    out: &mut [u8],
    nonce: u64,
    key: &Key,
) -> Result<usize, CryptoError> {
    if ciphertext.len() < MAC_BYTES {
        return Err(CryptoError::DecryptFailed);
    }
    let len = ciphertext.len() - MAC_BYTES;
    if out.len() < len {
        return Err(CryptoError::DecryptFailed);
    }

    let (body, tag) = ciphertext.split_at(len);
    let cipher = ChaCha20Poly1305::new(CipherKey::from_slice(key));
    out[..len].copy_from_slice(body);

    if cipher
        .decrypt_in_place_detached(&expand_nonce(nonce), b"", &mut out[..len], Tag::from_slice(tag))
        .is_err()
    {
        // never leave unauthenticated plaintext behind
        out[..len].fill(0);
        return Err(CryptoError::DecryptFailed);
    }

    Ok(len)
}
