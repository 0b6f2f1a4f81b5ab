// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Context lifecycle.
//!
//! A [`Context`] owns one transport session for the lifetime of the middleware
//! instance, the optional shared memory pool, the graph cache fed by the
//! discovery subscription, and the guard condition that tells graph waiters
//! something changed.
//!
//! ```text
//!   build()                     shutdown()
//!  --------> Open --> Subscribed -----------> ShuttingDown --> Closed
//!             |                                  undeclare subscriber
//!             +-- any failure: undo in reverse   drop shm pool
//!                                                close session
//! ```
//!
//! The state lock only guards field reads and writes. Every transport call
//! (declare, undeclare, close) happens with the lock released, so discovery
//! callbacks delivered from transport threads can always take it.

use crate::config::{self, ConfigurableEntity, SessionConfig};
use crate::env_config;
use crate::error::{Error, Result};
use crate::graph::GraphCache;
use crate::guard::GuardCondition;
use crate::liveliness;
use crate::router_check;
use crate::shm::{AllocAlignment, ShmProvider, DEFAULT_ALIGNMENT, SHM_BUFFER_SIZE};
use crate::transport::{
    Sample, SampleCallback, SampleKind, Session, SessionId, Subscriber, SubscriberOptions,
    Transport,
};
use parking_lot::{Condvar, Mutex};
use std::path::PathBuf;
use std::sync::{Arc, Weak};

#[cfg(test)]
mod tests;

/// Where a context is in its life.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LifecycleState {
    /// Session open, discovery not active yet.
    Open,
    /// Discovery subscription declared; callbacks may fire.
    Subscribed,
    /// Resources are being released.
    ShuttingDown,
    /// Terminal.
    Closed,
}

struct ContextData {
    enclave: String,
    domain_id: usize,
    zid: SessionId,
    session: Option<Arc<dyn Session>>,
    shm_provider: Option<ShmProvider>,
    liveliness_key: String,
    graph_cache: Arc<GraphCache>,
    graph_guard_condition: Arc<GuardCondition>,
    subscriber: Option<Box<dyn Subscriber>>,
    next_entity_id: usize,
    is_initialized: bool,
    state: LifecycleState,
}

impl ContextData {
    fn accepts_discovery(&self) -> bool {
        matches!(self.state, LifecycleState::Open | LifecycleState::Subscribed)
    }
}

/// Undo actions registered while a context is being built.
///
/// Runs in reverse registration order unless disarmed.
struct Rollback {
    actions: Vec<(&'static str, Box<dyn FnOnce()>)>,
}

impl Rollback {
    fn new() -> Self {
        Self {
            actions: Vec::new(),
        }
    }

    fn push(&mut self, what: &'static str, action: impl FnOnce() + 'static) {
        self.actions.push((what, Box::new(action)));
    }

    fn disarm(mut self) {
        self.actions.clear();
    }
}

impl Drop for Rollback {
    fn drop(&mut self) {
        while let Some((what, action)) = self.actions.pop() {
            log::debug!("[context] rollback: {}", what);
            action();
        }
    }
}

enum RouterCheck {
    FromEnv,
    Attempts(u64),
    Skip,
}

enum ConfigSource {
    Provider,
    Explicit(SessionConfig),
    File(PathBuf),
}

/// Builder for [`Context`].
pub struct ContextBuilder {
    transport: Arc<dyn Transport>,
    domain_id: usize,
    enclave: String,
    config: ConfigSource,
    router_check: RouterCheck,
    shm_size: usize,
    shm_alignment: AllocAlignment,
}

impl ContextBuilder {
    pub fn new(transport: Arc<dyn Transport>) -> Self {
        Self {
            transport,
            domain_id: 0,
            enclave: String::new(),
            config: ConfigSource::Provider,
            router_check: RouterCheck::FromEnv,
            shm_size: SHM_BUFFER_SIZE,
            shm_alignment: DEFAULT_ALIGNMENT,
        }
    }

    #[must_use]
    pub fn domain_id(mut self, domain_id: usize) -> Self {
        self.domain_id = domain_id;
        self
    }

    #[must_use]
    pub fn enclave(mut self, enclave: impl Into<String>) -> Self {
        self.enclave = enclave.into();
        self
    }

    /// Use `config` instead of asking the configuration provider.
    #[must_use]
    pub fn config(mut self, config: SessionConfig) -> Self {
        self.config = ConfigSource::Explicit(config);
        self
    }

    /// Load the session configuration from `path`.
    #[must_use]
    pub fn config_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.config = ConfigSource::File(path.into());
        self
    }

    /// Probe for a router up to `attempts` times before giving up.
    ///
    /// Overrides `RMW_LINK_ROUTER_CHECK_ATTEMPTS`.
    #[must_use]
    pub fn router_check_attempts(mut self, attempts: u64) -> Self {
        self.router_check = RouterCheck::Attempts(attempts);
        self
    }

    /// Do not probe for a router, whatever the environment says.
    #[must_use]
    pub fn skip_router_check(mut self) -> Self {
        self.router_check = RouterCheck::Skip;
        self
    }

    /// Shared memory pool layout, when the configuration enables it.
    #[must_use]
    pub fn shm_pool(mut self, size: usize, alignment: AllocAlignment) -> Self {
        self.shm_size = size;
        self.shm_alignment = alignment;
        self
    }

    /// Open the session and activate discovery.
    ///
    /// On failure every resource acquired so far is released, in reverse
    /// order, before the error is returned.
    pub fn build(self) -> Result<Context> {
        // 1. configuration
        let config = match self.config {
            ConfigSource::Provider => config::get_config(ConfigurableEntity::Session)?,
            ConfigSource::Explicit(config) => config,
            ConfigSource::File(path) => config::load_config(path)?,
        };

        // 2. shared memory request
        let shm_enabled = config::read_shm_enabled(&config);
        log::debug!("[context] shared memory enabled: {}", shm_enabled);

        let mut rollback = Rollback::new();

        // 3. session
        let session = self.transport.open(&config).map_err(Error::SessionOpen)?;
        {
            let session = Arc::clone(&session);
            rollback.push("close session", move || {
                if let Err(e) = session.close() {
                    log::warn!("[context] closing session during rollback failed: {}", e);
                }
            });
        }

        // 4. router reachability
        let attempts = match self.router_check {
            RouterCheck::FromEnv => env_config::router_check_attempts(),
            RouterCheck::Attempts(n) => Some(n),
            RouterCheck::Skip => None,
        };
        if let Some(attempts) = attempts {
            router_check::wait_for_router(session.as_ref(), attempts)?;
        }

        // 5. identity and graph cache
        let zid = session.zid();
        let graph_cache = Arc::new(GraphCache::new(zid.to_string()));

        // 6. discovery key
        let liveliness_key = liveliness::subscription_token(self.domain_id);

        // 7. shared memory pool
        let shm_provider = if shm_enabled {
            match ShmProvider::new(self.shm_size, self.shm_alignment) {
                Ok(provider) => Some(
                    provider.with_message_size_threshold(
                        config.shared_memory.message_size_threshold,
                    ),
                ),
                Err(e) => {
                    log::error!("[context] unable to create shm provider: {}", e);
                    return Err(Error::ShmProvider(e));
                }
            }
        } else {
            None
        };

        // 8. shared state
        let data = Arc::new(Mutex::new(ContextData {
            enclave: self.enclave,
            domain_id: self.domain_id,
            zid,
            session: Some(Arc::clone(&session)),
            shm_provider,
            liveliness_key: liveliness_key.clone(),
            graph_cache,
            graph_guard_condition: Arc::new(GuardCondition::new()),
            subscriber: None,
            next_entity_id: 0,
            is_initialized: false,
            state: LifecycleState::Open,
        }));
        {
            let data = Arc::clone(&data);
            rollback.push("release shm provider", move || {
                let mut guard = data.lock();
                guard.state = LifecycleState::Closed;
                let shm = guard.shm_provider.take();
                let session = guard.session.take();
                drop(guard);
                if let Some(shm) = shm {
                    shm.release();
                }
                drop(session);
            });
        }

        // 9. discovery subscription, lock released so history replay can land
        let subscriber = session
            .declare_liveliness_subscriber(
                &liveliness_key,
                SubscriberOptions { history: true },
                discovery_callback(Arc::downgrade(&data)),
            )
            .map_err(|e| {
                log::error!("[context] unable to subscribe to {}: {}", liveliness_key, e);
                Error::Subscription(e)
            })?;

        // 10. ready
        {
            let mut guard = data.lock();
            guard.subscriber = Some(subscriber);
            guard.is_initialized = true;
            guard.state = LifecycleState::Subscribed;
        }
        rollback.disarm();

        log::info!(
            "[context] session {} ready (domain {}, discovery on {})",
            zid,
            self.domain_id,
            liveliness_key
        );

        Ok(Context {
            data,
            closed: Condvar::new(),
        })
    }
}

fn discovery_callback(data: Weak<Mutex<ContextData>>) -> SampleCallback {
    Box::new(move |sample: &Sample| {
        let Some(data) = data.upgrade() else {
            return;
        };

        let guard_condition = {
            let guard = data.lock();
            if !guard.accepts_discovery() {
                return;
            }
            match sample.kind {
                SampleKind::Put => {
                    guard.graph_cache.parse_put(&sample.key_expr);
                }
                SampleKind::Delete => {
                    guard.graph_cache.parse_del(&sample.key_expr);
                }
            }
            Arc::clone(&guard.graph_guard_condition)
        };

        if let Err(e) = guard_condition.trigger() {
            log::warn!(
                "[context] unable to trigger graph guard condition for {}: {}",
                sample.key_expr,
                e
            );
        }
    })
}

/// Middleware context: one transport session and everything hanging off it.
pub struct Context {
    data: Arc<Mutex<ContextData>>,
    // paired with `data`, signalled once the state reaches Closed
    closed: Condvar,
}

impl Context {
    pub fn builder(transport: Arc<dyn Transport>) -> ContextBuilder {
        ContextBuilder::new(transport)
    }

    pub fn enclave(&self) -> String {
        self.data.lock().enclave.clone()
    }

    pub fn domain_id(&self) -> usize {
        self.data.lock().domain_id
    }

    /// Identity the transport assigned to this context's session.
    pub fn zid(&self) -> SessionId {
        self.data.lock().zid
    }

    /// The transport session, or `None` once shutdown started.
    pub fn session(&self) -> Option<Arc<dyn Session>> {
        self.data.lock().session.clone()
    }

    pub fn shm_provider(&self) -> Option<ShmProvider> {
        self.data.lock().shm_provider.clone()
    }

    pub fn graph_guard_condition(&self) -> Arc<GuardCondition> {
        Arc::clone(&self.data.lock().graph_guard_condition)
    }

    pub fn graph_cache(&self) -> Arc<GraphCache> {
        Arc::clone(&self.data.lock().graph_cache)
    }

    /// Key expression of the discovery subscription.
    pub fn liveliness_key(&self) -> String {
        self.data.lock().liveliness_key.clone()
    }

    pub fn state(&self) -> LifecycleState {
        self.data.lock().state
    }

    pub fn is_initialized(&self) -> bool {
        self.data.lock().is_initialized
    }

    pub fn is_shutdown(&self) -> bool {
        self.data.lock().state == LifecycleState::Closed
    }

    /// Allocate an entity id. Ids are never handed out twice.
    pub fn get_next_entity_id(&self) -> usize {
        let mut guard = self.data.lock();
        let id = guard.next_entity_id;
        guard.next_entity_id += 1;
        id
    }

    /// Stop discovery and release the pool and the session.
    ///
    /// Idempotent: later calls return `Ok` without touching the transport.
    /// A call that races an ongoing shutdown blocks until the context is
    /// [`LifecycleState::Closed`]. A failing session close is reported, but
    /// the context still ends up closed since the session has been given up.
    pub fn shutdown(&self) -> Result<()> {
        let (subscriber, shm_provider, session) = {
            let mut guard = self.data.lock();
            if !guard.accepts_discovery() {
                while guard.state == LifecycleState::ShuttingDown {
                    self.closed.wait(&mut guard);
                }
                return Ok(());
            }
            guard.state = LifecycleState::ShuttingDown;
            (
                guard.subscriber.take(),
                guard.shm_provider.take(),
                guard.session.take(),
            )
        };

        if let Some(subscriber) = subscriber {
            if let Err(e) = subscriber.undeclare() {
                log::warn!("[context] undeclaring discovery subscriber failed: {}", e);
            }
        }
        if let Some(shm) = shm_provider {
            shm.release();
        }

        let result = match session {
            Some(session) => session.close().map_err(Error::SessionClose),
            None => Ok(()),
        };

        self.data.lock().state = LifecycleState::Closed;
        self.closed.notify_all();
        match &result {
            Ok(()) => log::debug!("[context] shutdown complete"),
            Err(e) => log::error!("[context] {}", e),
        }
        result
    }

    /// Consume a context that has been shut down.
    pub fn finalize(self) -> Result<()> {
        if !self.is_shutdown() {
            return Err(Error::InvalidState(
                "context must be shut down before it is finalized".to_string(),
            ));
        }
        Ok(())
    }
}

impl std::fmt::Debug for Context {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let guard = self.data.lock();
        f.debug_struct("Context")
            .field("zid", &guard.zid)
            .field("domain_id", &guard.domain_id)
            .field("enclave", &guard.enclave)
            .field("state", &guard.state)
            .finish_non_exhaustive()
    }
}

impl Drop for Context {
    fn drop(&mut self) {
        let _ = self.shutdown();
    }
}
