// SPDX-License-Identifier: MIT OR Apache-2.0

//! Encrypted group channels layered on top of an [`Endpoint`].
//!
//! A group is identified by the public key of its root. Every participant derives a pairwise
//! channel with the root from its own key: the root publishes the participant's [`GroupInfo`] on
//! it, signed by an identity nobody else can derive and encrypted with a key nobody else can
//! derive.
//!
//! The group info hands out the keys of a per-iteration inner identity. Its public key grants
//! write access: a writer agrees on broadcast keys with it and tags every broadcast with the
//! resulting routing key. Its private key grants read access: a reader derives the same broadcast
//! keys for every member from the other side and can therefore recognise and decrypt the
//! broadcasts of any writer.
//!
//! Integrity of broadcasts is provided by the signature of the outer publication which covers the
//! ciphertext.
mod info;
#[cfg(test)]
mod tests;

use std::collections::HashMap;
use std::mem;

use shnak_core::value::{KIND_FIELD, ROUTING_FIELD};
use shnak_core::{DecodeError, EncodeError, Filter, Hash, Payload, PublicKey};
use shnak_encryption::crypto::xchacha20::{self, XAeadError};
use shnak_encryption::{ChannelKeys, KeyScheduleError, broadcast_keys, group_info_keys};
use thiserror::Error;
use tracing::{debug, trace, warn};

use crate::channel::{Channel, Delivery, Subscription};
use crate::connection::{Connection, ConnectionEvent, ConnectionHandler};
use crate::endpoint::{Endpoint, EndpointError};
use crate::message::{BROADCAST, DATA_FIELD, MessageError};

pub use info::{GroupInfo, GroupMember};

/// Capabilities this participant holds in the group.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Capability {
    /// No group info has been accepted yet.
    AwaitingInfo,
    ReadOnly,
    WriteOnly,
    ReadWrite,
}

/// Outcome of [`Group::publish`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Published {
    /// Broadcast was sent (or handed to the endpoint while it is still connecting).
    Sent(Hash),

    /// Write access is not granted yet, the broadcast is sent as soon as it is.
    Deferred,
}

pub struct Group<C> {
    endpoint: Endpoint<C>,
    root: PublicKey,

    /// Keys of the pairwise channel with the group root.
    info_keys: ChannelKeys,
    info_sender: PublicKey,
    info_subscription: Subscription,

    /// Highest accepted group info iteration.
    iteration: Option<u32>,
    members: Vec<PublicKey>,

    /// Own broadcast keys, present once write access was granted.
    write: Option<ChannelKeys>,

    /// Broadcast keys of every member, present once read access was granted.
    member_keys: HashMap<PublicKey, ChannelKeys>,
    broadcast_subscription: Option<Subscription>,

    pending: Vec<Payload>,
    channels: Vec<Channel>,
}

impl<C: Connection> Group<C> {
    /// Joins the group with the given root key and starts listening for its group info.
    pub fn new(mut endpoint: Endpoint<C>, root: PublicKey) -> Result<Self, GroupError> {
        let info_keys = group_info_keys(&endpoint.identity().private_key(), &root)?;
        let info_sender = info_keys.sender_identity().public_key();
        let info_subscription = endpoint.subscribe(vec![Filter::equals(KIND_FIELD, BROADCAST)])?;

        debug!(root = %root, info_sender = %info_sender, "join group");

        Ok(Self {
            endpoint,
            root,
            info_keys,
            info_sender,
            info_subscription,
            iteration: None,
            members: Vec::new(),
            write: None,
            member_keys: HashMap::new(),
            broadcast_subscription: None,
            pending: Vec::new(),
            channels: Vec::new(),
        })
    }

    pub fn root(&self) -> PublicKey {
        self.root
    }

    pub fn endpoint(&self) -> &Endpoint<C> {
        &self.endpoint
    }

    pub fn endpoint_mut(&mut self) -> &mut Endpoint<C> {
        &mut self.endpoint
    }

    pub fn into_endpoint(self) -> Endpoint<C> {
        self.endpoint
    }

    pub fn capability(&self) -> Capability {
        match (self.can_read(), self.can_write()) {
            (true, true) => Capability::ReadWrite,
            (true, false) => Capability::ReadOnly,
            (false, true) => Capability::WriteOnly,
            (false, false) => Capability::AwaitingInfo,
        }
    }

    pub fn can_read(&self) -> bool {
        self.broadcast_subscription.is_some()
    }

    pub fn can_write(&self) -> bool {
        self.write.is_some()
    }

    pub fn iteration(&self) -> Option<u32> {
        self.iteration
    }

    /// Members listed in the latest accepted group info.
    pub fn members(&self) -> &[PublicKey] {
        &self.members
    }

    /// Own broadcast keys.
    pub fn write_keys(&self) -> Option<&ChannelKeys> {
        self.write.as_ref()
    }

    /// Broadcast keys this participant derived for a member.
    pub fn member_keys(&self, member: &PublicKey) -> Option<&ChannelKeys> {
        self.member_keys.get(member)
    }

    /// Creates a channel delivering decrypted group broadcasts which match all filters.
    ///
    /// Deliveries name the member as sender and the group root as routing key.
    pub fn subscribe(&mut self, filters: Vec<Filter>) -> Subscription {
        let mut channel = Channel::new(
            self.channels.len(),
            filters,
            self.endpoint.config().replay_cache_capacity,
        );
        let subscription = channel.listen();
        self.channels.push(channel);
        subscription
    }

    /// Encrypts and broadcasts a payload to all readers of the group.
    ///
    /// Without write access the payload is queued and published once access is granted.
    pub fn publish(&mut self, payload: Payload) -> Result<Published, GroupError> {
        if self.write.is_none() {
            trace!(root = %self.root, "defer group publication until write access");
            self.pending.push(payload);
            return Ok(Published::Deferred);
        }

        let hash = self.publish_now(&payload)?;
        Ok(Published::Sent(hash))
    }

    fn publish_now(&mut self, payload: &Payload) -> Result<Hash, GroupError> {
        let keys = self.write.as_ref().ok_or(GroupError::NoWriteAccess)?;
        let ciphertext = xchacha20::encrypt(
            keys.encryption_key(),
            &payload.to_bytes()?,
            self.endpoint.rng(),
        )
        .map_err(GroupError::Encryption)?;

        let broadcast = Payload::with_kind(BROADCAST)
            .with(ROUTING_FIELD, keys.routing_key())
            .with(DATA_FIELD, ciphertext);
        Ok(self.endpoint.publish(&broadcast)?)
    }

    fn process_deliveries(&mut self) {
        for delivery in self.info_subscription.drain() {
            match self.handle_group_info(&delivery) {
                Ok(()) => (),
                Err(GroupError::UnknownSender(_)) => (),
                Err(err) => debug!(hash = %delivery.hash, %err, "ignore group info"),
            }
        }

        let deliveries = match self.broadcast_subscription.as_mut() {
            Some(subscription) => subscription.drain(),
            None => return,
        };
        for delivery in deliveries {
            match self.handle_group_message(&delivery) {
                Ok(()) => (),
                Err(GroupError::MissingRouting) => (),
                Err(err) => debug!(hash = %delivery.hash, %err, "ignore group message"),
            }
        }
    }

    fn handle_group_info(&mut self, delivery: &Delivery) -> Result<(), GroupError> {
        if delivery.sender != self.info_sender {
            return Err(GroupError::UnknownSender(delivery.sender));
        }

        let ciphertext = delivery
            .payload
            .bytes(DATA_FIELD)
            .ok_or(MessageError::MissingField(DATA_FIELD))?;
        let plaintext = xchacha20::decrypt(self.info_keys.encryption_key(), ciphertext)
            .map_err(GroupError::DecryptionFailure)?;
        let info = GroupInfo::from_bytes(&plaintext)?;

        match self.iteration {
            Some(current) if info.iteration <= current => {
                return Err(GroupError::StaleIteration {
                    iteration: info.iteration,
                    current,
                });
            }
            _ => (),
        }

        // Derive all keys before touching any state.
        let private_key = self.endpoint.identity().private_key();
        let write = info
            .public_key
            .map(|inner| broadcast_keys(&private_key, &inner))
            .transpose()?;
        let read = match &info.private_key {
            Some(inner) if !info.members.is_empty() => Some(
                info.members
                    .iter()
                    .map(|member| -> Result<_, KeyScheduleError> {
                        Ok((*member, broadcast_keys(inner, member)?))
                    })
                    .collect::<Result<HashMap<_, _>, KeyScheduleError>>()?,
            ),
            _ => None,
        };

        debug!(
            root = %self.root,
            iteration = info.iteration,
            write = write.is_some(),
            read = read.is_some(),
            "accept group info"
        );
        self.members = info.members;

        if let Some(member_keys) = read {
            self.member_keys = member_keys;
            if self.broadcast_subscription.is_none() {
                let subscription = self
                    .endpoint
                    .subscribe(vec![Filter::equals(KIND_FIELD, BROADCAST)])?;
                self.broadcast_subscription = Some(subscription);
            }
        }

        // Iterations are only recorded once a broadcast channel is active.
        if self.broadcast_subscription.is_some() {
            self.iteration = Some(info.iteration);
        }

        if let Some(keys) = write {
            self.write = Some(keys);
            for payload in mem::take(&mut self.pending) {
                if let Err(err) = self.publish_now(&payload) {
                    warn!(%err, "failed publishing deferred group message");
                }
            }
        }

        Ok(())
    }

    fn handle_group_message(&mut self, delivery: &Delivery) -> Result<(), GroupError> {
        let routing = delivery.routing.ok_or(GroupError::MissingRouting)?;
        let (member, keys) = self
            .member_keys
            .iter()
            .find(|(_, keys)| keys.routing_key() == routing)
            .ok_or(GroupError::UnknownRouting(routing))?;

        let ciphertext = delivery
            .payload
            .bytes(DATA_FIELD)
            .ok_or(MessageError::MissingField(DATA_FIELD))?;
        let plaintext = xchacha20::decrypt(keys.encryption_key(), ciphertext)
            .map_err(GroupError::DecryptionFailure)?;
        let payload = Payload::from_bytes(&plaintext)?;

        trace!(member = %member, hash = %delivery.hash, "received group message");
        let member = *member;
        for channel in &mut self.channels {
            channel.broadcast(&payload, member, delivery.hash, Some(self.root));
        }

        Ok(())
    }
}

impl<C: Connection> ConnectionHandler for Group<C> {
    fn handle_event(&mut self, event: ConnectionEvent) {
        self.endpoint.handle_event(event);
        self.process_deliveries();
    }
}

#[derive(Debug, Error)]
pub enum GroupError {
    #[error(transparent)]
    KeySchedule(#[from] KeyScheduleError),

    #[error(transparent)]
    Endpoint(#[from] EndpointError),

    #[error(transparent)]
    Encode(#[from] EncodeError),

    #[error("could not encrypt group message: {0}")]
    Encryption(XAeadError),

    #[error("could not decrypt group message: {0}")]
    DecryptionFailure(XAeadError),

    #[error("could not decode decrypted group message: {0}")]
    InvalidPlaintext(#[from] DecodeError),

    #[error("malformed group message: {0}")]
    Malformed(#[from] MessageError),

    #[error("group info from unknown sender {0}")]
    UnknownSender(PublicKey),

    #[error("group message without routing key")]
    MissingRouting,

    #[error("group message for unknown routing key {0}")]
    UnknownRouting(PublicKey),

    #[error("group info iteration {iteration} is not newer than {current}")]
    StaleIteration { iteration: u32, current: u32 },

    #[error("write access to group not granted")]
    NoWriteAccess,
}
