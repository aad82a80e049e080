// SPDX-License-Identifier: MIT OR Apache-2.0

//! Signed publish/subscribe over a single duplex connection, with encrypted groups on top.
//!
//! An [`Endpoint`] owns one connection and one signing identity. It signs and frames outbound
//! publications, verifies inbound ones and dispatches them to filtered, replay-protected
//! [`Channel`](channel::Channel)s.
//!
//! A [`Group`] wraps an endpoint and negotiates read and write access to an encrypted broadcast
//! channel with the group's root, who distributes capabilities with [`Endpoint::init_group`].
//!
//! Endpoints and groups are driven by feeding them [`ConnectionEvent`]s through the
//! [`ConnectionHandler`] trait, their deliveries are received through [`Subscription`]s.
pub mod announcements;
pub mod channel;
pub mod config;
pub mod connection;
pub mod endpoint;
pub mod group;
pub mod message;
#[cfg(any(test, feature = "test_utils"))]
pub mod test_utils;

pub use channel::{ChannelId, Delivery, Subscription};
pub use config::EndpointConfig;
pub use connection::{
    Connection, ConnectionError, ConnectionEvent, ConnectionHandler, ConnectionState,
};
pub use endpoint::{Builder as EndpointBuilder, Endpoint, EndpointError, ProcessingError};
pub use group::{Capability, Group, GroupError, GroupInfo, GroupMember, Published};
pub use message::{Certificate, Envelope, MessageError, PublishMessage};
