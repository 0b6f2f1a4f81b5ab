// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! In-process transport.
//!
//! Every session opened from one [`LocalTransport`] shares a fabric: the set
//! of open sessions, the live liveliness tokens and the declared subscribers.
//! Sessions opened with `mode: router` are reported as routers to every other
//! session.
//!
//! ```text
//! LocalTransport
//! +-- fabric: Arc<Fabric>
//!     +-- sessions:    HashMap<SessionId, SessionMode>
//!     +-- tokens:      BTreeMap<u64, TokenEntry>
//!     +-- subscribers: BTreeMap<u64, SubscriberEntry>
//! ```
//!
//! Callbacks are always invoked after the fabric lock is released, so a
//! callback may declare tokens or subscribers of its own.

use super::keyexpr;
use super::{
    LivelinessToken, Sample, SampleCallback, Session, SessionId, Subscriber, SubscriberOptions,
    Transport, TransportError,
};
use crate::config::{SessionConfig, SessionMode};
use parking_lot::Mutex;
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

type SharedCallback = Arc<SampleCallback>;

struct TokenEntry {
    key_expr: String,
    owner: SessionId,
}

struct SubscriberEntry {
    key_expr: String,
    owner: SessionId,
    callback: SharedCallback,
}

#[derive(Default)]
struct FabricState {
    sessions: HashMap<SessionId, SessionMode>,
    tokens: BTreeMap<u64, TokenEntry>,
    subscribers: BTreeMap<u64, SubscriberEntry>,
    next_id: u64,
}

impl FabricState {
    fn allocate_id(&mut self) -> u64 {
        self.next_id += 1;
        self.next_id
    }

    fn listeners_for(&self, key_expr: &str) -> Vec<SharedCallback> {
        self.subscribers
            .values()
            .filter(|entry| keyexpr::matches(&entry.key_expr, key_expr))
            .map(|entry| Arc::clone(&entry.callback))
            .collect()
    }
}

#[derive(Default)]
struct Fabric {
    state: Mutex<FabricState>,
    next_zid: AtomicU64,
}

impl Fabric {
    fn deliver(listeners: &[SharedCallback], sample: &Sample) {
        for callback in listeners {
            callback(sample);
        }
    }

    fn remove_token(&self, id: u64) -> Result<(), TransportError> {
        let (entry, listeners) = {
            let mut state = self.state.lock();
            let entry = state
                .tokens
                .remove(&id)
                .ok_or_else(|| TransportError::Failed(format!("unknown token {id}")))?;
            let listeners = state.listeners_for(&entry.key_expr);
            (entry, listeners)
        };
        Self::deliver(&listeners, &Sample::delete(entry.key_expr));
        Ok(())
    }

    fn remove_subscriber(&self, id: u64) -> Result<(), TransportError> {
        self.state
            .lock()
            .subscribers
            .remove(&id)
            .map(|_| ())
            .ok_or_else(|| TransportError::Failed(format!("unknown subscriber {id}")))
    }
}

/// Transport whose sessions all live in the current process.
#[derive(Clone, Default)]
pub struct LocalTransport {
    fabric: Arc<Fabric>,
}

impl LocalTransport {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Open a session and keep the concrete type (tests and tools use the
    /// extra accessors).
    pub fn open_local(&self, config: &SessionConfig) -> Result<Arc<LocalSession>, TransportError> {
        for endpoint in config.connect.iter().chain(config.listen.iter()) {
            if endpoint.trim().is_empty() {
                return Err(TransportError::Config("empty endpoint".to_string()));
            }
        }

        let counter = self.fabric.next_zid.fetch_add(1, Ordering::Relaxed) + 1;
        let zid = SessionId::from_u128((u128::from(std::process::id()) << 64) | u128::from(counter));

        self.fabric.state.lock().sessions.insert(zid, config.mode);
        log::debug!("[local] opened {:?} session {}", config.mode, zid);

        Ok(Arc::new(LocalSession {
            zid,
            mode: config.mode,
            fabric: Arc::clone(&self.fabric),
            closed: AtomicBool::new(false),
        }))
    }

    /// Number of sessions currently open on this fabric.
    #[must_use]
    pub fn session_count(&self) -> usize {
        self.fabric.state.lock().sessions.len()
    }

    /// Number of subscribers currently declared on this fabric.
    #[must_use]
    pub fn subscriber_count(&self) -> usize {
        self.fabric.state.lock().subscribers.len()
    }
}

impl Transport for LocalTransport {
    fn open(&self, config: &SessionConfig) -> Result<Arc<dyn Session>, TransportError> {
        let session: Arc<dyn Session> = self.open_local(config)?;
        Ok(session)
    }
}

/// Session on a [`LocalTransport`] fabric.
pub struct LocalSession {
    zid: SessionId,
    mode: SessionMode,
    fabric: Arc<Fabric>,
    closed: AtomicBool,
}

impl LocalSession {
    #[must_use]
    pub fn mode(&self) -> SessionMode {
        self.mode
    }

    fn ensure_open(&self) -> Result<(), TransportError> {
        if self.closed.load(Ordering::Acquire) {
            return Err(TransportError::Closed);
        }
        Ok(())
    }
}

impl Session for LocalSession {
    fn zid(&self) -> SessionId {
        self.zid
    }

    fn routers_zid(&self, on_router: &mut dyn FnMut(&SessionId)) {
        if self.is_closed() {
            return;
        }
        let routers: Vec<SessionId> = {
            let state = self.fabric.state.lock();
            let mut routers: Vec<SessionId> = state
                .sessions
                .iter()
                .filter(|(zid, mode)| **zid != self.zid && **mode == SessionMode::Router)
                .map(|(zid, _)| *zid)
                .collect();
            routers.sort();
            routers
        };
        for zid in &routers {
            on_router(zid);
        }
    }

    fn declare_liveliness_subscriber(
        &self,
        key_expr: &str,
        options: SubscriberOptions,
        callback: SampleCallback,
    ) -> Result<Box<dyn Subscriber>, TransportError> {
        self.ensure_open()?;
        keyexpr::validate(key_expr)?;

        let callback: SharedCallback = Arc::new(callback);
        let (id, history) = {
            let mut state = self.fabric.state.lock();
            let id = state.allocate_id();
            state.subscribers.insert(
                id,
                SubscriberEntry {
                    key_expr: key_expr.to_string(),
                    owner: self.zid,
                    callback: Arc::clone(&callback),
                },
            );
            let history: BTreeSet<String> = if options.history {
                state
                    .tokens
                    .values()
                    .filter(|token| keyexpr::matches(key_expr, &token.key_expr))
                    .map(|token| token.key_expr.clone())
                    .collect()
            } else {
                BTreeSet::new()
            };
            (id, history)
        };

        for key in history {
            callback(&Sample::put(key));
        }

        Ok(Box::new(LocalSubscriber {
            id,
            key_expr: key_expr.to_string(),
            fabric: Arc::clone(&self.fabric),
            released: false,
        }))
    }

    fn declare_liveliness_token(
        &self,
        key_expr: &str,
    ) -> Result<Box<dyn LivelinessToken>, TransportError> {
        self.ensure_open()?;
        keyexpr::validate(key_expr)?;

        let (id, listeners) = {
            let mut state = self.fabric.state.lock();
            let id = state.allocate_id();
            state.tokens.insert(
                id,
                TokenEntry {
                    key_expr: key_expr.to_string(),
                    owner: self.zid,
                },
            );
            (id, state.listeners_for(key_expr))
        };
        Fabric::deliver(&listeners, &Sample::put(key_expr));

        Ok(Box::new(LocalToken {
            id,
            key_expr: key_expr.to_string(),
            fabric: Arc::clone(&self.fabric),
            released: false,
        }))
    }

    fn close(&self) -> Result<(), TransportError> {
        if self.closed.swap(true, Ordering::AcqRel) {
            return Err(TransportError::Closed);
        }

        let withdrawn: Vec<(String, Vec<SharedCallback>)> = {
            let mut state = self.fabric.state.lock();
            state.sessions.remove(&self.zid);
            state.subscribers.retain(|_, entry| entry.owner != self.zid);

            let owned: Vec<u64> = state
                .tokens
                .iter()
                .filter(|(_, token)| token.owner == self.zid)
                .map(|(id, _)| *id)
                .collect();
            let removed: Vec<TokenEntry> = owned
                .into_iter()
                .filter_map(|id| state.tokens.remove(&id))
                .collect();
            removed
                .into_iter()
                .map(|token| {
                    let listeners = state.listeners_for(&token.key_expr);
                    (token.key_expr, listeners)
                })
                .collect()
        };

        for (key_expr, listeners) in withdrawn {
            Fabric::deliver(&listeners, &Sample::delete(key_expr));
        }
        log::debug!("[local] closed session {}", self.zid);
        Ok(())
    }

    fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }
}

impl Drop for LocalSession {
    fn drop(&mut self) {
        if !self.is_closed() {
            let _ = self.close();
        }
    }
}

struct LocalSubscriber {
    id: u64,
    key_expr: String,
    fabric: Arc<Fabric>,
    released: bool,
}

impl Subscriber for LocalSubscriber {
    fn key_expr(&self) -> &str {
        &self.key_expr
    }

    fn undeclare(mut self: Box<Self>) -> Result<(), TransportError> {
        self.released = true;
        self.fabric.remove_subscriber(self.id)
    }
}

impl Drop for LocalSubscriber {
    fn drop(&mut self) {
        if !self.released {
            let _ = self.fabric.remove_subscriber(self.id);
        }
    }
}

struct LocalToken {
    id: u64,
    key_expr: String,
    fabric: Arc<Fabric>,
    released: bool,
}

impl LivelinessToken for LocalToken {
    fn key_expr(&self) -> &str {
        &self.key_expr
    }

    fn undeclare(mut self: Box<Self>) -> Result<(), TransportError> {
        self.released = true;
        self.fabric.remove_token(self.id)
    }
}

impl Drop for LocalToken {
    fn drop(&mut self) {
        if !self.released {
            // Already withdrawn if the owning session closed first.
            let _ = self.fabric.remove_token(self.id);
        }
    }
}
