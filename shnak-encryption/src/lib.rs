// SPDX-License-Identifier: MIT OR Apache-2.0

//! Cryptographic building blocks for encrypted shnak groups.
//!
//! Group members agree on shared secrets by converting their Ed25519 identities into X25519 keys
//! ([`crypto::x25519`]). The [`key_schedule`] expands such a secret with HKDF-SHA256 into the keys
//! of one channel: a channel key (a signing seed or a routing tag, depending on the channel) and
//! a symmetric key for XChaCha20-Poly1305 ([`crypto::xchacha20`]).
pub mod crypto;
pub mod key_schedule;

pub use crypto::{Rng, RngError};
pub use key_schedule::{
    ChannelContext, ChannelKeys, KeyScheduleError, broadcast_keys, derive_channel_keys,
    group_info_keys,
};
