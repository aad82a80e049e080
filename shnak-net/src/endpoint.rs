// SPDX-License-Identifier: MIT OR Apache-2.0

//! Publish/subscribe endpoint bound to one connection and one signing identity.
//!
//! Outbound payloads are encoded, signed and framed before they are sent. Inbound frames are
//! decoded, their signature is verified and the payload is dispatched to every channel created
//! with [`Endpoint::subscribe`].
//!
//! Frames produced before the connection is open (subscribe intents and publications) are held
//! back and sent exactly once when the connection opens. They are dropped if the connection closes
//! first.
//!
//! Malformed, oversized or unauthenticated inbound frames never surface to the application. They
//! are logged and dropped, the endpoint keeps processing subsequent frames.
use std::mem;

use shnak_core::{EncodeError, Filter, Hash, Identity, Payload, PublicKey, Value};
use shnak_encryption::crypto::xchacha20::{self, XAeadError};
use shnak_encryption::{KeyScheduleError, Rng, RngError, group_info_keys};
use thiserror::Error;
use tracing::{debug, trace, warn};

use crate::announcements::{Announcement, Announcements, CERTIFICATES_FIELD};
use crate::channel::{Channel, ChannelId, Subscription};
use crate::config::EndpointConfig;
use crate::connection::{
    Connection, ConnectionError, ConnectionEvent, ConnectionHandler, ConnectionState,
};
use crate::group::{GroupInfo, GroupMember};
use crate::message::{
    ANNOUNCE, BROADCAST, Certificate, DATA_FIELD, Envelope, ITERATION_FIELD, MessageError,
    PublishMessage,
};

pub struct Builder<C> {
    connection: C,
    identity: Identity,
    config: Option<EndpointConfig>,
    rng: Option<Rng>,
}

impl<C: Connection> Builder<C> {
    pub fn new(connection: C, identity: Identity) -> Self {
        Self {
            connection,
            identity,
            config: None,
            rng: None,
        }
    }

    pub fn config(mut self, config: EndpointConfig) -> Self {
        self.config = Some(config);
        self
    }

    /// Random number generator used for group keys and nonces.
    pub fn rng(mut self, rng: Rng) -> Self {
        self.rng = Some(rng);
        self
    }

    pub fn build(self) -> Endpoint<C> {
        Endpoint {
            connection: self.connection,
            identity: self.identity,
            config: self.config.unwrap_or_default(),
            rng: self.rng.unwrap_or_default(),
            state: ConnectionState::Connecting,
            channels: Vec::new(),
            deferred: Vec::new(),
            announcements: Announcements::default(),
        }
    }
}

pub struct Endpoint<C> {
    connection: C,
    identity: Identity,
    config: EndpointConfig,
    rng: Rng,
    state: ConnectionState,
    channels: Vec<Channel>,
    deferred: Vec<Vec<u8>>,
    announcements: Announcements,
}

impl<C: Connection> Endpoint<C> {
    pub fn new(connection: C, identity: Identity) -> Self {
        Self::builder(connection, identity).build()
    }

    pub fn builder(connection: C, identity: Identity) -> Builder<C> {
        Builder::new(connection, identity)
    }

    pub fn state(&self) -> ConnectionState {
        self.state
    }

    pub fn public_key(&self) -> PublicKey {
        self.identity.public_key()
    }

    pub fn identity(&self) -> &Identity {
        &self.identity
    }

    pub fn config(&self) -> &EndpointConfig {
        &self.config
    }

    pub fn rng(&self) -> &Rng {
        &self.rng
    }

    pub fn connection(&self) -> &C {
        &self.connection
    }

    /// Certificate announcements received from other publishers.
    pub fn announcements(&self) -> &Announcements {
        &self.announcements
    }

    /// Creates a channel delivering every publication which matches all filters.
    ///
    /// The subscribe intent is sent right away if the connection is open, otherwise it is sent as
    /// soon as it opens.
    pub fn subscribe(&mut self, filters: Vec<Filter>) -> Result<Subscription, EndpointError> {
        let frame = Envelope::Subscribe { channel: 0 }.to_bytes()?;
        match self.send_or_defer(frame) {
            Ok(()) => (),
            Err(EndpointError::Closed) => {
                debug!("connection closed, subscribe intent will not be sent");
            }
            Err(err) => return Err(err),
        }

        let mut channel = Channel::new(
            self.channels.len(),
            filters,
            self.config.replay_cache_capacity,
        );
        let subscription = channel.listen();
        self.channels.push(channel);
        Ok(subscription)
    }

    /// Registers another listener on an existing channel.
    pub fn listen(&mut self, channel: ChannelId) -> Option<Subscription> {
        self.channels.get_mut(channel).map(Channel::listen)
    }

    /// Publishes a payload signed by this endpoint's identity.
    pub fn publish(&mut self, payload: &Payload) -> Result<Hash, EndpointError> {
        let message = PublishMessage::sign(payload.to_bytes()?, &self.identity);
        self.send_publication(message)
    }

    /// Publishes a payload signed by another identity.
    pub fn publish_as(
        &mut self,
        payload: &Payload,
        identity: &Identity,
    ) -> Result<Hash, EndpointError> {
        let message = PublishMessage::sign(payload.to_bytes()?, identity);
        self.send_publication(message)
    }

    /// Distributes read and write capabilities of a new group iteration.
    ///
    /// A fresh inner identity is generated for the iteration. Every member receives its own
    /// encrypted group info containing the inner private key if it may read and the inner public
    /// key if it may write. The group info is published by an identity only the root and that
    /// member can derive.
    pub fn init_group(
        &mut self,
        members: &[GroupMember],
        iteration: u32,
    ) -> Result<(), EndpointError> {
        let inner = Identity::from_seed(self.rng.random_array()?);
        let private_key = self.identity.private_key();
        let member_keys: Vec<PublicKey> = members.iter().map(|member| member.public_key).collect();

        // Derive everything first so an invalid member key fails before anything is sent.
        let mut publications = Vec::with_capacity(members.len());
        for member in members {
            let keys = group_info_keys(&private_key, &member.public_key)?;
            let info = GroupInfo {
                iteration,
                private_key: member.read.then(|| inner.private_key()),
                public_key: member.write.then(|| inner.public_key()),
                members: member_keys.clone(),
            };
            let plaintext = info.to_bytes()?;
            let ciphertext = xchacha20::encrypt(keys.encryption_key(), &plaintext, &self.rng)?;
            let payload = Payload::with_kind(BROADCAST).with(DATA_FIELD, ciphertext);
            publications.push(PublishMessage::sign(
                payload.to_bytes()?,
                &keys.sender_identity(),
            ));
        }

        for message in publications {
            self.send_publication(message)?;
        }

        debug!(
            iteration,
            members = members.len(),
            inner_key = %inner.public_key(),
            "initialised group"
        );
        Ok(())
    }

    /// Publishes the set of keys this endpoint certifies.
    pub fn announce(
        &mut self,
        certificates: &[Certificate],
        iteration: u32,
    ) -> Result<Hash, EndpointError> {
        let certificates: Vec<Value> = certificates.iter().map(Value::from).collect();
        let payload = Payload::with_kind(ANNOUNCE)
            .with(ITERATION_FIELD, iteration)
            .with(CERTIFICATES_FIELD, certificates);
        self.publish(&payload)
    }

    fn send_publication(&mut self, message: PublishMessage) -> Result<Hash, EndpointError> {
        let hash = message.hash();
        let frame = Envelope::Publish(message).to_bytes()?;
        if frame.len() > self.config.max_message_size {
            return Err(EndpointError::MessageTooLarge {
                size: frame.len(),
                max: self.config.max_message_size,
            });
        }

        self.send_or_defer(frame)?;
        trace!(%hash, state = ?self.state, "publish");
        Ok(hash)
    }

    fn send_or_defer(&mut self, frame: Vec<u8>) -> Result<(), EndpointError> {
        match self.state {
            ConnectionState::Open => self.connection.send(frame)?,
            ConnectionState::Idle | ConnectionState::Connecting => self.deferred.push(frame),
            ConnectionState::Closed => return Err(EndpointError::Closed),
        }
        Ok(())
    }

    fn on_open(&mut self) {
        if self.state == ConnectionState::Closed {
            warn!("ignore open signal of closed connection");
            return;
        }

        self.state = ConnectionState::Open;
        let deferred = mem::take(&mut self.deferred);
        debug!(deferred = deferred.len(), "connection open");

        for frame in deferred {
            if let Err(err) = self.connection.send(frame) {
                warn!(%err, "failed sending deferred frame");
            }
        }
    }

    fn on_close(&mut self) {
        self.state = ConnectionState::Closed;
        let dropped = mem::take(&mut self.deferred);
        debug!(dropped = dropped.len(), "connection closed");
    }

    fn process_message(&mut self, bytes: &[u8]) -> Result<(), ProcessingError> {
        if bytes.len() > self.config.max_message_size {
            return Err(ProcessingError::TooLarge {
                size: bytes.len(),
                max: self.config.max_message_size,
            });
        }

        let message = match Envelope::from_bytes(bytes)? {
            Envelope::Publish(message) => message,
            Envelope::Subscribe { .. } => {
                trace!("ignore subscribe intent");
                return Ok(());
            }
            Envelope::Unknown(kind) => return Err(ProcessingError::UnsupportedKind(kind)),
        };

        let hash = message
            .verify()
            .map_err(|_| ProcessingError::SignatureInvalid(message.public_key))?;
        let payload = Payload::from_bytes(&message.payload).map_err(MessageError::from)?;
        let sender = message.public_key;
        trace!(public_key = %sender, %hash, kind = ?payload.kind(), "received publication");

        if payload.kind() == Some(ANNOUNCE) {
            self.handle_announcement(sender, &payload);
        }

        let routing = payload.routing();
        for channel in &mut self.channels {
            channel.broadcast(&payload, sender, hash, routing);
        }

        Ok(())
    }

    fn handle_announcement(&mut self, publisher: PublicKey, payload: &Payload) {
        match Announcement::from_payload(payload) {
            Ok(announcement) => {
                let iteration = announcement.iteration;
                if self.announcements.insert(publisher, announcement) {
                    debug!(public_key = %publisher, iteration, "updated announcement");
                }
            }
            Err(err) => debug!(public_key = %publisher, %err, "ignore invalid announcement"),
        }
    }
}

impl<C: Connection> ConnectionHandler for Endpoint<C> {
    fn handle_event(&mut self, event: ConnectionEvent) {
        match event {
            ConnectionEvent::Opened => self.on_open(),
            ConnectionEvent::Message(bytes) => {
                if let Err(err) = self.process_message(&bytes) {
                    debug!(%err, "dropped inbound message");
                }
            }
            ConnectionEvent::Closed => self.on_close(),
            ConnectionEvent::Error(reason) => {
                warn!(%reason, "connection failed");
                self.on_close();
            }
        }
    }
}

#[derive(Debug, Error)]
pub enum EndpointError {
    #[error("connection is closed")]
    Closed,

    #[error("message of {size} bytes exceeds maximum size of {max} bytes")]
    MessageTooLarge { size: usize, max: usize },

    #[error(transparent)]
    Connection(#[from] ConnectionError),

    #[error(transparent)]
    Message(#[from] MessageError),

    #[error(transparent)]
    Encode(#[from] EncodeError),

    #[error(transparent)]
    Rng(#[from] RngError),

    #[error(transparent)]
    KeySchedule(#[from] KeyScheduleError),

    #[error(transparent)]
    Encryption(#[from] XAeadError),
}

/// Reasons for dropping an inbound frame.
#[derive(Debug, Error)]
pub enum ProcessingError {
    #[error("frame of {size} bytes exceeds maximum size of {max} bytes")]
    TooLarge { size: usize, max: usize },

    #[error("malformed message: {0}")]
    Malformed(#[from] MessageError),

    #[error("invalid signature from {0}")]
    SignatureInvalid(PublicKey),

    #[error("unsupported frame kind {0}")]
    UnsupportedKind(i64),
}
