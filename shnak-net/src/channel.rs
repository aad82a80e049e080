// SPDX-License-Identifier: MIT OR Apache-2.0

//! Filtered subscriptions with replay protection.
//!
//! A [`Channel`] decides which publications reach its listeners: a publication is delivered when
//! its payload matches the channel's filters and its content hash has not been delivered before.
//! Hashes of non-matching publications are not remembered, so the replay cache only grows with
//! traffic the channel is actually interested in.
use std::num::NonZeroUsize;

use lru::LruCache;
use shnak_core::filter::matches;
use shnak_core::{Filter, Hash, Payload, PublicKey};
use tokio::sync::mpsc;
use tokio_stream::wrappers::UnboundedReceiverStream;
use tracing::trace;

/// Identifier of a channel within its endpoint or group.
pub type ChannelId = usize;

/// Publication delivered to the listeners of a channel.
#[derive(Clone, Debug, PartialEq)]
pub struct Delivery {
    pub payload: Payload,
    pub sender: PublicKey,
    pub hash: Hash,
    pub routing: Option<PublicKey>,
}

pub struct Channel {
    id: ChannelId,
    filters: Vec<Filter>,
    seen: LruCache<Hash, ()>,
    listeners: Vec<mpsc::UnboundedSender<Delivery>>,
}

impl Channel {
    pub fn new(id: ChannelId, filters: Vec<Filter>, capacity: Option<NonZeroUsize>) -> Self {
        let seen = match capacity {
            Some(capacity) => LruCache::new(capacity),
            None => LruCache::unbounded(),
        };

        Self {
            id,
            filters,
            seen,
            listeners: Vec::new(),
        }
    }

    pub fn id(&self) -> ChannelId {
        self.id
    }

    pub fn filters(&self) -> &[Filter] {
        &self.filters
    }

    /// Registers another listener receiving every future delivery.
    pub fn listen(&mut self) -> Subscription {
        let (tx, rx) = mpsc::unbounded_channel();
        self.listeners.push(tx);
        Subscription { channel: self.id, rx }
    }

    /// Delivers the payload to all listeners unless it was delivered before or does not match.
    ///
    /// Returns `true` if the payload was delivered.
    pub fn broadcast(
        &mut self,
        payload: &Payload,
        sender: PublicKey,
        hash: Hash,
        routing: Option<PublicKey>,
    ) -> bool {
        if self.seen.contains(&hash) {
            trace!(channel = self.id, %hash, "ignore replayed publication");
            return false;
        }

        if !matches(payload, &self.filters) {
            return false;
        }

        self.seen.put(hash, ());

        let delivery = Delivery {
            payload: payload.clone(),
            sender,
            hash,
            routing,
        };
        self.listeners
            .retain(|listener| listener.send(delivery.clone()).is_ok());

        true
    }
}

/// Receiving end of a channel.
///
/// Dropping the subscription unregisters it from its channel.
#[derive(Debug)]
pub struct Subscription {
    channel: ChannelId,
    rx: mpsc::UnboundedReceiver<Delivery>,
}

impl Subscription {
    pub fn channel(&self) -> ChannelId {
        self.channel
    }

    /// Next delivery if one is ready.
    pub fn try_recv(&mut self) -> Option<Delivery> {
        self.rx.try_recv().ok()
    }

    /// Waits for the next delivery.
    pub async fn recv(&mut self) -> Option<Delivery> {
        self.rx.recv().await
    }

    /// Takes every delivery which is ready.
    pub fn drain(&mut self) -> Vec<Delivery> {
        std::iter::from_fn(|| self.try_recv()).collect()
    }

    pub fn into_stream(self) -> UnboundedReceiverStream<Delivery> {
        UnboundedReceiverStream::new(self.rx)
    }
}
