// SPDX-License-Identifier: MIT OR Apache-2.0

//! In-memory connections and helpers for tests.
use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use shnak_core::Identity;
use shnak_encryption::Rng;

use crate::connection::{Connection, ConnectionError, ConnectionEvent, ConnectionHandler};
use crate::endpoint::Endpoint;

/// Shared broadcast medium: every frame sent by any attached connection is delivered to every
/// peer, including the sender.
#[derive(Clone, Debug, Default)]
pub struct MemoryBus {
    inner: Arc<Mutex<BusState>>,
}

#[derive(Debug, Default)]
struct BusState {
    queue: VecDeque<Vec<u8>>,
    sent_frames: usize,
    sent_bytes: usize,
}

impl MemoryBus {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn connection(&self) -> MemoryConnection {
        MemoryConnection { bus: self.clone() }
    }

    /// Endpoint attached to this bus with deterministic randomness.
    pub fn endpoint(&self, seed: u8) -> Endpoint<MemoryConnection> {
        Endpoint::builder(self.connection(), Identity::from_seed([seed; 32]))
            .rng(Rng::from_seed([seed; 32]))
            .build()
    }

    /// Queues a raw frame as if a connection had sent it.
    pub fn inject(&self, frame: Vec<u8>) {
        self.state().queue.push_back(frame);
    }

    /// Signals every peer that its connection is open.
    pub fn open(&self, peers: &mut [&mut dyn ConnectionHandler]) {
        for peer in peers.iter_mut() {
            peer.handle_event(ConnectionEvent::Opened);
        }
    }

    /// Delivers queued frames to every peer until no new frames are produced.
    ///
    /// Returns the number of delivered frames.
    pub fn process(&self, peers: &mut [&mut dyn ConnectionHandler]) -> usize {
        let mut delivered = 0;
        while let Some(frame) = self.pop() {
            for peer in peers.iter_mut() {
                peer.handle_event(ConnectionEvent::Message(frame.clone()));
            }
            delivered += 1;
        }
        delivered
    }

    /// Frames waiting for delivery.
    pub fn pending(&self) -> Vec<Vec<u8>> {
        self.state().queue.iter().cloned().collect()
    }

    pub fn sent_frames(&self) -> usize {
        self.state().sent_frames
    }

    pub fn sent_bytes(&self) -> usize {
        self.state().sent_bytes
    }

    fn pop(&self) -> Option<Vec<u8>> {
        self.state().queue.pop_front()
    }

    fn state(&self) -> MutexGuard<'_, BusState> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Connection attached to a [`MemoryBus`].
#[derive(Clone, Debug)]
pub struct MemoryConnection {
    bus: MemoryBus,
}

impl Connection for MemoryConnection {
    fn send(&mut self, bytes: Vec<u8>) -> Result<(), ConnectionError> {
        let mut state = self.bus.state();
        state.sent_frames += 1;
        state.sent_bytes += bytes.len();
        state.queue.push_back(bytes);
        Ok(())
    }
}

pub fn setup_logging() {
    if std::env::var("RUST_LOG").is_ok() {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
            .try_init();
    }
}
