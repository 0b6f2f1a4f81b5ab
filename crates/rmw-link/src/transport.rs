// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Pub/sub transport seam.
//!
//! The context never talks to a concrete network stack. It opens a
//! [`Session`] through a [`Transport`], asks it for router identities,
//! declares one liveliness subscriber for discovery, and closes the session on
//! shutdown. [`LocalTransport`] implements the seam in-process.
//!
//! Implementations must deliver samples without holding locks the callback
//! could re-enter, and [`Subscriber::undeclare`] must not wait for callbacks
//! that are already running.

pub mod keyexpr;
mod local;

pub use local::{LocalSession, LocalTransport};

use crate::config::SessionConfig;
use std::fmt;
use std::sync::Arc;
use thiserror::Error;

/// Number of bytes in a session identifier.
pub const SESSION_ID_SIZE: usize = 16;

/// 128-bit transport identity, stored least significant byte first.
#[derive(Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SessionId([u8; SESSION_ID_SIZE]);

impl SessionId {
    #[must_use]
    pub const fn from_bytes(bytes: [u8; SESSION_ID_SIZE]) -> Self {
        Self(bytes)
    }

    /// Build an id from its numeric value.
    #[must_use]
    pub const fn from_u128(value: u128) -> Self {
        Self(value.to_le_bytes())
    }

    #[must_use]
    pub const fn as_bytes(&self) -> &[u8; SESSION_ID_SIZE] {
        &self.0
    }

    #[must_use]
    pub fn is_zero(&self) -> bool {
        self.0.iter().all(|&b| b == 0)
    }
}

impl fmt::Display for SessionId {
    /// Lowercase hex, most significant byte first, high zero bytes stripped.
    /// The all-zero id renders as the empty string.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let len = self
            .0
            .iter()
            .rposition(|&b| b != 0)
            .map_or(0, |idx| idx + 1);
        for byte in self.0[..len].iter().rev() {
            write!(f, "{byte:02x}")?;
        }
        Ok(())
    }
}

impl fmt::Debug for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SessionId({self})")
    }
}

/// Kind of a delivered sample.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SampleKind {
    /// Key appeared (or was written).
    Put,
    /// Key disappeared.
    Delete,
}

/// A sample delivered to a subscriber callback.
#[derive(Clone, Debug)]
pub struct Sample {
    pub key_expr: String,
    pub kind: SampleKind,
    pub payload: Vec<u8>,
    pub attachment: Option<Vec<u8>>,
}

impl Sample {
    #[must_use]
    pub fn put(key_expr: impl Into<String>) -> Self {
        Self {
            key_expr: key_expr.into(),
            kind: SampleKind::Put,
            payload: Vec::new(),
            attachment: None,
        }
    }

    #[must_use]
    pub fn delete(key_expr: impl Into<String>) -> Self {
        Self {
            key_expr: key_expr.into(),
            kind: SampleKind::Delete,
            payload: Vec::new(),
            attachment: None,
        }
    }
}

/// Callback bound to a subscriber for its whole lifetime.
pub type SampleCallback = Box<dyn Fn(&Sample) + Send + Sync + 'static>;

/// Options for [`Session::declare_liveliness_subscriber`].
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct SubscriberOptions {
    /// Replay the tokens that were already alive before the declaration.
    pub history: bool,
}

/// Errors reported by transport implementations.
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("session is closed")]
    Closed,
    #[error("invalid key expression '{0}'")]
    InvalidKeyExpr(String),
    #[error("transport configuration rejected: {0}")]
    Config(String),
    #[error("transport operation failed: {0}")]
    Failed(String),
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// Factory for sessions.
pub trait Transport: Send + Sync {
    /// Open a session using `config`.
    fn open(&self, config: &SessionConfig) -> Result<Arc<dyn Session>, TransportError>;
}

/// An open transport session.
pub trait Session: Send + Sync {
    /// Identity assigned to this session by the transport.
    fn zid(&self) -> SessionId;

    /// Invoke `on_router` once per router currently connected to this session.
    ///
    /// Replies are delivered sequentially on the calling thread and the call
    /// returns once the query is complete.
    fn routers_zid(&self, on_router: &mut dyn FnMut(&SessionId));

    /// Declare a liveliness subscriber on `key_expr`.
    fn declare_liveliness_subscriber(
        &self,
        key_expr: &str,
        options: SubscriberOptions,
        callback: SampleCallback,
    ) -> Result<Box<dyn Subscriber>, TransportError>;

    /// Announce `key_expr` as alive until the token is undeclared or the
    /// session closes.
    fn declare_liveliness_token(
        &self,
        key_expr: &str,
    ) -> Result<Box<dyn LivelinessToken>, TransportError>;

    /// Close the session. Further operations fail with [`TransportError::Closed`].
    fn close(&self) -> Result<(), TransportError>;

    fn is_closed(&self) -> bool;
}

/// Handle to a declared subscriber.
pub trait Subscriber: Send {
    fn key_expr(&self) -> &str;

    /// Stop delivery. Callbacks already running may still complete.
    fn undeclare(self: Box<Self>) -> Result<(), TransportError>;
}

/// Handle to a declared liveliness token.
pub trait LivelinessToken: Send {
    fn key_expr(&self) -> &str;

    fn undeclare(self: Box<Self>) -> Result<(), TransportError>;
}
