// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! # rmw-link - ROS 2 middleware core over a pub/sub transport
//!
//! The session-level core of a ROS 2 middleware binding: it owns one transport
//! session per context, learns the ROS graph from liveliness tokens, optionally
//! provisions a shared memory pool, and decodes the per-message metadata that
//! publishers attach to samples.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use rmw_link::{init, InitOptions, LocalTransport, Result};
//! use std::sync::Arc;
//!
//! fn main() -> Result<()> {
//!     let transport = Arc::new(LocalTransport::new());
//!     let context = init(transport, &InitOptions::new("/").with_domain_id(0))?;
//!
//!     let entity_id = context.get_next_entity_id();
//!     println!("first entity id: {entity_id}");
//!
//!     context.shutdown()?;
//!     context.finalize()
//! }
//! ```
//!
//! ## Architecture
//!
//! ```text
//! +---------------------------------------------------------------------+
//! |                     rmw layer (nodes, pubs, subs)                   |
//! +---------------------------------------------------------------------+
//! |  Context                                                            |
//! |   session | shm pool | graph cache <- discovery | guard condition   |
//! +---------------------------------------------------------------------+
//! |  Transport seam: Transport / Session / Subscriber / LivelinessToken |
//! +---------------------------------------------------------------------+
//! |  LocalTransport (in-process) | network transports                   |
//! +---------------------------------------------------------------------+
//! ```
//!
//! ## Key Types
//!
//! | Type | Description |
//! |------|-------------|
//! | [`Context`] | Owns the session and the discovery state |
//! | [`ContextBuilder`] | Step-by-step context construction with rollback |
//! | [`Attachment`] | Per-message metadata (sequence number, timestamp, GID) |
//! | [`Transport`] | Factory for transport sessions |
//! | [`ShmProvider`] | Shared memory pool for large payloads |
//!
//! ## Environment
//!
//! See [`env_config`] for the `RMW_LINK_*` variables.

pub mod attachment;
pub mod config;
pub mod context;
pub mod env_config;
pub mod error;
pub mod graph;
pub mod guard;
pub mod init;
pub mod liveliness;
pub mod logging;
pub mod router_check;
pub mod shm;
pub mod transport;

pub use attachment::{
    extract_gid, extract_int64, lookup, read_int64, Attachment, AttachmentData, Gid, Int64Error,
};
pub use config::{get_config, read_shm_enabled, ConfigurableEntity, SessionConfig, SessionMode};
pub use context::{Context, ContextBuilder, LifecycleState};
pub use error::{Error, Result};
pub use graph::GraphCache;
pub use guard::GuardCondition;
pub use init::{init, InitOptions};
pub use router_check::check_router_reachable;
pub use shm::{AllocAlignment, ShmBuf, ShmError, ShmProvider};
pub use transport::{
    LocalTransport, Sample, SampleKind, Session, SessionId, Subscriber, SubscriberOptions,
    Transport, TransportError,
};
