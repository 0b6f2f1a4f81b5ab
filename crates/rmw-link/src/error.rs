// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Error taxonomy for the transport binding.
//!
//! Construction-time failures (configuration, session open, router
//! reachability, shared memory, discovery subscription) are fatal and surface
//! as a single [`Error`]. Per-message decode failures never show up here: the
//! attachment codec reports them as absent values (see
//! [`crate::attachment::Int64Error`] for the typed variant).

use crate::shm::ShmError;
use crate::transport::TransportError;
use thiserror::Error;

/// Errors emitted by the context lifecycle and its collaborators.
#[derive(Debug, Error)]
pub enum Error {
    /// The transport configuration could not be built or loaded.
    #[error("configuration error: {0}")]
    Config(String),

    /// The transport refused to open a session.
    #[error("session open error: {0}")]
    SessionOpen(#[source] TransportError),

    /// The router probe never saw a router within the attempt budget.
    #[error("unable to connect to a router after {attempts} retries")]
    RouterUnreachable { attempts: u64 },

    /// A single router probe found no connected router.
    #[error("no router connected to the session")]
    NoRouter,

    /// The shared-memory pool could not be provisioned.
    #[error("shm provider error: {0}")]
    ShmProvider(#[source] ShmError),

    /// The discovery subscription could not be declared.
    #[error("subscription error: {0}")]
    Subscription(#[source] TransportError),

    /// Closing the transport session failed during shutdown.
    #[error("error while closing session: {0}")]
    SessionClose(#[source] TransportError),

    /// The guard condition rejected a trigger.
    #[error("guard condition error: {0}")]
    GuardCondition(String),

    /// Operation not valid in the current lifecycle state.
    #[error("invalid state: {0}")]
    InvalidState(String),

    /// Caller supplied an unusable argument.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),
}

/// Crate-wide result alias.
pub type Result<T> = std::result::Result<T, Error>;
