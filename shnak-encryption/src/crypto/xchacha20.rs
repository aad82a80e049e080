// SPDX-License-Identifier: MIT OR Apache-2.0

//! XChaCha20Poly1305 is a ChaCha20Poly1305 AEAD variant with an extended 192-bit (24-byte) nonce.
//!
//! Nonces are drawn at random for every message and travel in front of the ciphertext.
use chacha20poly1305::{AeadInPlace, Key, KeyInit, XChaCha20Poly1305, XNonce};
use thiserror::Error;

use crate::crypto::{Rng, RngError, Secret};

pub type XAeadNonce = [u8; 24];

pub type XAeadKey = [u8; 32];

/// Size of the nonce prefixed to every ciphertext.
pub const NONCE_SIZE: usize = 24;

/// Size of the Poly1305 authentication tag.
pub const TAG_SIZE: usize = 16;

/// 256-bit symmetric key.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SymmetricKey(Secret<32>);

impl SymmetricKey {
    pub(crate) fn from_bytes(bytes: XAeadKey) -> Self {
        Self(Secret::from_bytes(bytes))
    }

    /// Fresh random key.
    pub fn random(rng: &Rng) -> Result<Self, RngError> {
        Ok(Self::from_bytes(rng.random_array()?))
    }
}

/// Encrypts `plaintext`, returning `nonce ∥ ciphertext`.
pub fn encrypt(key: &SymmetricKey, plaintext: &[u8], rng: &Rng) -> Result<Vec<u8>, XAeadError> {
    let nonce: XAeadNonce = rng.random_array()?;
    let ciphertext = x_aead_encrypt(key.0.as_bytes(), plaintext, nonce, None)?;

    let mut out = Vec::with_capacity(NONCE_SIZE + ciphertext.len());
    out.extend_from_slice(&nonce);
    out.extend_from_slice(&ciphertext);
    Ok(out)
}

/// Decrypts bytes produced by [`encrypt`].
pub fn decrypt(key: &SymmetricKey, bytes: &[u8]) -> Result<Vec<u8>, XAeadError> {
    if bytes.len() < NONCE_SIZE + TAG_SIZE {
        return Err(XAeadError::TooShort(bytes.len()));
    }
    let (nonce, ciphertext) = bytes.split_at(NONCE_SIZE);
    let nonce: XAeadNonce = nonce
        .try_into()
        .map_err(|_| XAeadError::TooShort(bytes.len()))?;
    x_aead_decrypt(key.0.as_bytes(), ciphertext, nonce, None)
}

pub fn x_aead_encrypt(
    key: &XAeadKey,
    plaintext: &[u8],
    nonce: XAeadNonce,
    aad: Option<&[u8]>,
) -> Result<Vec<u8>, XAeadError> {
    let key = Key::from_slice(key);
    let nonce = XNonce::from_slice(&nonce);
    let mut ciphertext: Vec<u8> = Vec::from(plaintext);

    let cipher = XChaCha20Poly1305::new(key);
    cipher
        .encrypt_in_place(nonce, aad.unwrap_or_default(), &mut ciphertext)
        .map_err(XAeadError::Encrypt)?;

    Ok(ciphertext)
}

pub fn x_aead_decrypt(
    key: &XAeadKey,
    ciphertext_tag: &[u8],
    nonce: XAeadNonce,
    aad: Option<&[u8]>,
) -> Result<Vec<u8>, XAeadError> {
    let key = Key::from_slice(key);
    let nonce = XNonce::from_slice(&nonce);
    let mut plaintext: Vec<u8> = Vec::from(ciphertext_tag);

    let cipher = XChaCha20Poly1305::new(key);
    cipher
        .decrypt_in_place(nonce, aad.unwrap_or_default(), &mut plaintext)
        .map_err(XAeadError::Decrypt)?;

    Ok(plaintext)
}

#[derive(Debug, Error)]
pub enum XAeadError {
    #[error("could not encrypt with xchacha20poly1305 aead: {0}")]
    Encrypt(chacha20poly1305::Error),

    #[error("could not decrypt with xchacha20poly1305 aead: {0}")]
    Decrypt(chacha20poly1305::Error),

    #[error("ciphertext of {0} bytes is too short to contain nonce and tag")]
    TooShort(usize),

    #[error(transparent)]
    Rng(#[from] RngError),
}
