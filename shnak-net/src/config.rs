// SPDX-License-Identifier: MIT OR Apache-2.0

//! Configuration for endpoints and the channels they create.
use std::num::NonZeroUsize;

use serde::{Deserialize, Serialize};

/// Default maximum size of a single frame in bytes.
pub const DEFAULT_MAX_MESSAGE_SIZE: usize = 1 << 16;

/// Default number of content hashes every channel remembers to detect replays.
pub const DEFAULT_REPLAY_CACHE_CAPACITY: usize = 1 << 16;

/// Configuration parameters of an endpoint.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EndpointConfig {
    /// Maximum frame size in bytes.
    ///
    /// Publishing a larger frame fails, larger inbound frames are dropped.
    pub max_message_size: usize,

    /// Number of content hashes remembered per channel.
    ///
    /// Once full, the least recently delivered hash is forgotten. `None` remembers every hash for
    /// the lifetime of the channel.
    pub replay_cache_capacity: Option<NonZeroUsize>,
}

impl Default for EndpointConfig {
    fn default() -> Self {
        Self {
            max_message_size: DEFAULT_MAX_MESSAGE_SIZE,
            replay_cache_capacity: NonZeroUsize::new(DEFAULT_REPLAY_CACHE_CAPACITY),
        }
    }
}
