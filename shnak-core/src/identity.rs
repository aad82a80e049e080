// SPDX-License-Identifier: MIT OR Apache-2.0

//! Ed25519 identities used to sign publications, and the fixed-size key types exchanged on the
//! wire.
//!
//! `PublicKey` is an opaque 32-byte value: routing tags are public-key-shaped bytes
//! derived from shared secrets and are never valid curve points. Point validity is only checked
//! when a key is actually used for verification or key agreement.
use std::fmt;
use std::str::FromStr;

use ed25519_dalek::{Signer, SigningKey, Verifier, VerifyingKey};
use rand::rngs::OsRng;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use zeroize::{Zeroize, ZeroizeOnDrop};

use crate::hash::Hash;
use crate::serde::{deserialize_fixed, serialize_hex};

/// 256-bit public key size.
pub const PUBLIC_KEY_LEN: usize = 32;

/// 256-bit private key (seed) size.
pub const PRIVATE_KEY_LEN: usize = 32;

/// 512-bit signature size.
pub const SIGNATURE_LEN: usize = 64;

/// Public key of an identity, or a public-key-shaped routing tag.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PublicKey([u8; PUBLIC_KEY_LEN]);

impl PublicKey {
    pub const fn from_bytes(bytes: [u8; PUBLIC_KEY_LEN]) -> Self {
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; PUBLIC_KEY_LEN] {
        &self.0
    }

    pub fn to_bytes(self) -> [u8; PUBLIC_KEY_LEN] {
        self.0
    }

    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    /// Verify an Ed25519 signature over `bytes` issued by this key.
    ///
    /// Keys which are not valid curve points can never verify anything.
    pub fn verify(&self, bytes: &[u8], signature: &Signature) -> Result<(), IdentityError> {
        let verifying_key =
            VerifyingKey::from_bytes(&self.0).map_err(|_| IdentityError::SignatureInvalid)?;
        let signature = ed25519_dalek::Signature::from_bytes(&signature.0);
        verifying_key
            .verify(bytes, &signature)
            .map_err(|_| IdentityError::SignatureInvalid)
    }
}

impl TryFrom<&[u8]> for PublicKey {
    type Error = IdentityError;

    fn try_from(value: &[u8]) -> Result<Self, Self::Error> {
        let bytes: [u8; PUBLIC_KEY_LEN] = value
            .try_into()
            .map_err(|_| IdentityError::InvalidKeyLength(value.len()))?;
        Ok(Self(bytes))
    }
}

impl From<[u8; PUBLIC_KEY_LEN]> for PublicKey {
    fn from(value: [u8; PUBLIC_KEY_LEN]) -> Self {
        Self(value)
    }
}

impl FromStr for PublicKey {
    type Err = IdentityError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        Self::try_from(hex::decode(value)?.as_slice())
    }
}

impl fmt::Display for PublicKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_hex())
    }
}

impl fmt::Debug for PublicKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("PublicKey").field(&self.to_hex()).finish()
    }
}

impl Serialize for PublicKey {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serialize_hex(&self.0, serializer)
    }
}

impl<'de> Deserialize<'de> for PublicKey {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        deserialize_fixed(deserializer)
    }
}

/// Ed25519 private key seed.
///
/// Private keys can not be formatted as text, debug output is redacted and the bytes are zeroed
/// when the key is dropped.
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct PrivateKey([u8; PRIVATE_KEY_LEN]);

impl PrivateKey {
    pub const fn from_bytes(bytes: [u8; PRIVATE_KEY_LEN]) -> Self {
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; PRIVATE_KEY_LEN] {
        &self.0
    }

    pub fn public_key(&self) -> PublicKey {
        Identity::from_private_key(self).public_key()
    }
}

impl TryFrom<&[u8]> for PrivateKey {
    type Error = IdentityError;

    fn try_from(value: &[u8]) -> Result<Self, Self::Error> {
        let bytes: [u8; PRIVATE_KEY_LEN] = value
            .try_into()
            .map_err(|_| IdentityError::InvalidKeyLength(value.len()))?;
        Ok(Self(bytes))
    }
}

impl fmt::Debug for PrivateKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // Do not reveal secret values when printing debug info.
        f.debug_tuple("PrivateKey").field(&"***").finish()
    }
}

/// Ed25519 signature over a content hash.
#[derive(Clone, Copy, PartialEq, Eq)]
pub struct Signature([u8; SIGNATURE_LEN]);

impl Signature {
    pub const fn from_bytes(bytes: [u8; SIGNATURE_LEN]) -> Self {
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; SIGNATURE_LEN] {
        &self.0
    }

    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }
}

impl TryFrom<&[u8]> for Signature {
    type Error = IdentityError;

    fn try_from(value: &[u8]) -> Result<Self, Self::Error> {
        let bytes: [u8; SIGNATURE_LEN] = value
            .try_into()
            .map_err(|_| IdentityError::InvalidSignatureLength(value.len()))?;
        Ok(Self(bytes))
    }
}

impl fmt::Debug for Signature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Signature").field(&self.to_hex()).finish()
    }
}

impl Serialize for Signature {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serialize_hex(&self.0, serializer)
    }
}

impl<'de> Deserialize<'de> for Signature {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        deserialize_fixed(deserializer)
    }
}

/// Key pair able to sign content hashes.
#[derive(Clone)]
pub struct Identity(SigningKey);

impl Identity {
    /// Generates a new identity using the systems random number generator (CSPRNG).
    pub fn new() -> Self {
        let mut csprng = OsRng;
        Self(SigningKey::generate(&mut csprng))
    }

    /// Deterministically derives an identity from a 32-byte seed.
    pub fn from_seed(seed: [u8; PRIVATE_KEY_LEN]) -> Self {
        Self(SigningKey::from_bytes(&seed))
    }

    pub fn from_private_key(private_key: &PrivateKey) -> Self {
        Self::from_seed(private_key.0)
    }

    pub fn public_key(&self) -> PublicKey {
        PublicKey(self.0.verifying_key().to_bytes())
    }

    pub fn private_key(&self) -> PrivateKey {
        PrivateKey(self.0.to_bytes())
    }

    /// Signs a content hash.
    pub fn sign(&self, hash: &Hash) -> Signature {
        Signature(self.0.sign(hash.as_bytes()).to_bytes())
    }
}

impl Default for Identity {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for Identity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Identity")
            .field("public_key", &self.public_key())
            .finish_non_exhaustive()
    }
}

/// Errors for key and signature types.
#[derive(Error, Debug)]
pub enum IdentityError {
    /// Key material was not exactly 32 bytes long.
    #[error("invalid key length {0} bytes, expected 32 bytes")]
    InvalidKeyLength(usize),

    /// Signature was not exactly 64 bytes long.
    #[error("invalid signature length {0} bytes, expected 64 bytes")]
    InvalidSignatureLength(usize),

    /// Key string contains invalid hexadecimal characters.
    #[error("invalid hex encoding in key string")]
    InvalidHexEncoding(#[from] hex::FromHexError),

    /// Signature does not match public key and bytes.
    #[error("signature invalid")]
    SignatureInvalid,
}
