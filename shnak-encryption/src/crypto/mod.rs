// SPDX-License-Identifier: MIT OR Apache-2.0

//! Implementations of all cryptographic algorithms required for group encryption.
pub mod hkdf;
mod rng;
mod secret;
pub mod x25519;
pub mod xchacha20;

pub use rng::{Rng, RngError};
pub use secret::Secret;
