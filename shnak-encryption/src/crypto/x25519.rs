// SPDX-License-Identifier: MIT OR Apache-2.0

//! Elliptic-curve Diffie–Hellman (ECDH) key agreement (X25519) between Ed25519 identities.
//!
//! The Ed25519 signing key is turned into its clamped X25519 scalar and the peer's Ed25519 public
//! key into its Montgomery form. Both sides arrive at the same shared secret:
//! `DH(a, B) == DH(b, A)`.
use ed25519_dalek::{SigningKey, VerifyingKey};
use shnak_core::{PrivateKey, PublicKey};
use thiserror::Error;
use x25519_dalek::StaticSecret;
use zeroize::Zeroizing;

use crate::crypto::Secret;

/// 256-bit shared secret size.
pub const SHARED_SECRET_SIZE: usize = 32;

/// Output of an X25519 key agreement.
pub type SharedSecret = Secret<SHARED_SECRET_SIZE>;

pub fn calculate_agreement(
    private_key: &PrivateKey,
    their_public: &PublicKey,
) -> Result<SharedSecret, X25519Error> {
    let scalar = Zeroizing::new(SigningKey::from_bytes(private_key.as_bytes()).to_scalar_bytes());
    let secret = StaticSecret::from(*scalar);

    let their_public = VerifyingKey::from_bytes(their_public.as_bytes())
        .map_err(|_| X25519Error::InvalidPublicKey)?;
    let their_public = x25519_dalek::PublicKey::from(their_public.to_montgomery().to_bytes());

    let shared_secret = secret.diffie_hellman(&their_public);
    if !shared_secret.was_contributory() {
        return Err(X25519Error::NonContributory);
    }

    Ok(Secret::from_bytes(shared_secret.to_bytes()))
}

#[derive(Debug, Error)]
pub enum X25519Error {
    #[error("public key is not a valid curve point")]
    InvalidPublicKey,

    #[error("key agreement with low-order point is not contributory")]
    NonContributory,
}
