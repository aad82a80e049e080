// SPDX-License-Identifier: MIT OR Apache-2.0

//! Derivation of per-channel key material from pairwise X25519 shared secrets.
//!
//! Every channel of a group is keyed by two HKDF-SHA256 expansions of the same shared secret
//! under different context strings: one for the channel key and one for the symmetric
//! encryption key.
//!
//! The group-info channel between the group root and a member uses the channel key as the seed
//! of a signing identity, so only the two holders of the shared secret can publish in it. The
//! broadcast channel between a writer and the group's inner key uses the channel key as a
//! public routing tag attached to every broadcast.
use shnak_core::{Identity, PrivateKey, PublicKey};
use thiserror::Error;

use crate::crypto::Secret;
use crate::crypto::hkdf::{HkdfError, hkdf};
use crate::crypto::x25519::{SharedSecret, X25519Error, calculate_agreement};
use crate::crypto::xchacha20::SymmetricKey;

/// Which channel key material is derived for.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ChannelContext {
    /// Pairwise channel carrying encrypted group info from the root to one member.
    GroupInfo,

    /// Channel carrying encrypted application broadcasts of one writer.
    Broadcast,
}

impl ChannelContext {
    pub fn channel_info(&self) -> &'static [u8] {
        match self {
            ChannelContext::GroupInfo => b"groupChannel",
            ChannelContext::Broadcast => b"broadcastChannel",
        }
    }

    pub fn encryption_info(&self) -> &'static [u8] {
        match self {
            ChannelContext::GroupInfo => b"groupChannelEnc",
            ChannelContext::Broadcast => b"broadcastChannelEnc",
        }
    }
}

/// Key material of one channel.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ChannelKeys {
    channel: Secret<32>,
    encryption_key: SymmetricKey,
}

impl ChannelKeys {
    /// Signing identity seeded by the channel key.
    pub fn sender_identity(&self) -> Identity {
        Identity::from_seed(*self.channel.as_bytes())
    }

    /// Channel key used as an opaque public routing tag.
    pub fn routing_key(&self) -> PublicKey {
        PublicKey::from_bytes(*self.channel.as_bytes())
    }

    pub fn encryption_key(&self) -> &SymmetricKey {
        &self.encryption_key
    }
}

pub fn derive_channel_keys(
    shared_secret: &SharedSecret,
    context: ChannelContext,
) -> Result<ChannelKeys, KeyScheduleError> {
    let channel: [u8; 32] = hkdf(&[], shared_secret.as_bytes(), context.channel_info())?;
    let encryption_key: [u8; 32] = hkdf(&[], shared_secret.as_bytes(), context.encryption_info())?;
    Ok(ChannelKeys {
        channel: Secret::from_bytes(channel),
        encryption_key: SymmetricKey::from_bytes(encryption_key),
    })
}

/// Keys of the group-info channel between `own` and `peer`.
pub fn group_info_keys(
    own: &PrivateKey,
    peer: &PublicKey,
) -> Result<ChannelKeys, KeyScheduleError> {
    let shared_secret = calculate_agreement(own, peer)?;
    derive_channel_keys(&shared_secret, ChannelContext::GroupInfo)
}

/// Keys of the broadcast channel between `own` and `peer`.
pub fn broadcast_keys(own: &PrivateKey, peer: &PublicKey) -> Result<ChannelKeys, KeyScheduleError> {
    let shared_secret = calculate_agreement(own, peer)?;
    derive_channel_keys(&shared_secret, ChannelContext::Broadcast)
}

#[derive(Debug, Error)]
pub enum KeyScheduleError {
    #[error(transparent)]
    X25519(#[from] X25519Error),

    #[error(transparent)]
    Hkdf(#[from] HkdfError),
}
