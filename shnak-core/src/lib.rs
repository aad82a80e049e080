// SPDX-License-Identifier: MIT OR Apache-2.0

//! Core data types for signed publish/subscribe messaging.
//!
//! `shnak-core` provides the Ed25519 [`Identity`] every publication is signed with, BLAKE3
//! content [`Hash`]es, the open-ended [`Payload`] type exchanged between peers, its CBOR encoding
//! and the [`Filter`] language channels use to select payloads.
pub mod cbor;
pub mod filter;
pub mod hash;
pub mod identity;
mod serde;
pub mod value;

pub use cbor::{DecodeError, EncodeError};
pub use filter::{Filter, FilterError, Operator};
pub use hash::{Hash, HashError};
pub use identity::{Identity, IdentityError, PrivateKey, PublicKey, Signature};
pub use value::{Payload, Value};
