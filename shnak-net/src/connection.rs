// SPDX-License-Identifier: MIT OR Apache-2.0

//! Seam between endpoints and the duplex byte connection they run on.
//!
//! Sending is done through the [`Connection`] trait. Everything the connection observes (opening,
//! incoming frames, closing) is pushed into a [`ConnectionHandler`] as [`ConnectionEvent`]s by
//! whoever drives the underlying socket.
use thiserror::Error;

/// Outbound half of a binary-safe duplex connection.
pub trait Connection {
    /// Sends one frame to the remote peer.
    fn send(&mut self, bytes: Vec<u8>) -> Result<(), ConnectionError>;
}

impl<C: Connection + ?Sized> Connection for Box<C> {
    fn send(&mut self, bytes: Vec<u8>) -> Result<(), ConnectionError> {
        (**self).send(bytes)
    }
}

/// Lifecycle signals and incoming frames of a connection.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ConnectionEvent {
    /// Connection got established.
    Opened,

    /// Frame arrived from the remote peer.
    Message(Vec<u8>),

    /// Connection was closed.
    Closed,

    /// Connection failed, this also closes it.
    Error(String),
}

/// Consumer of connection events.
pub trait ConnectionHandler {
    fn handle_event(&mut self, event: ConnectionEvent);
}

/// State of the connection as seen by an endpoint.
///
/// `Idle` moves to `Connecting` on construction, `Connecting` moves to `Open` when the connection
/// is established and both move to the terminal `Closed` state on close or error.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum ConnectionState {
    #[default]
    Idle,
    Connecting,
    Open,
    Closed,
}

#[derive(Debug, Error)]
pub enum ConnectionError {
    #[error("connection is closed")]
    Closed,

    #[error("failed sending frame: {0}")]
    Send(String),
}
