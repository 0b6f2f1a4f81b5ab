// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

use super::*;
use crate::shm::ShmError;
use crate::transport::{LivelinessToken, TransportError};
use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::thread;
use std::time::Duration;

#[derive(Default)]
struct Counters {
    opened: AtomicUsize,
    closed: AtomicUsize,
    declared: AtomicUsize,
    undeclared: AtomicUsize,
    router_queries: AtomicUsize,
}

#[derive(Default)]
struct Faults {
    open: bool,
    declare: bool,
    close: bool,
    close_delay: Option<Duration>,
    routers: usize,
}

/// Transport whose single session records every call and keeps the
/// discovery callback so tests can fire samples by hand.
struct MockTransport {
    counters: Arc<Counters>,
    faults: Faults,
    callback: Arc<Mutex<Option<SampleCallback>>>,
}

impl MockTransport {
    fn new(faults: Faults) -> Arc<Self> {
        Arc::new(Self {
            counters: Arc::new(Counters::default()),
            faults,
            callback: Arc::new(Mutex::new(None)),
        })
    }

    fn healthy() -> Arc<Self> {
        Self::new(Faults::default())
    }

    fn fire(&self, sample: &Sample) {
        if let Some(callback) = self.callback.lock().as_ref() {
            callback(sample);
        }
    }

    fn count(&self, field: fn(&Counters) -> &AtomicUsize) -> usize {
        field(&self.counters).load(Ordering::SeqCst)
    }
}

struct MockSession {
    counters: Arc<Counters>,
    fail_declare: bool,
    fail_close: bool,
    close_delay: Option<Duration>,
    routers: usize,
    closed: AtomicBool,
    callback: Arc<Mutex<Option<SampleCallback>>>,
}

struct MockSubscriber {
    counters: Arc<Counters>,
    key_expr: String,
}

impl Transport for MockTransport {
    fn open(&self, _config: &SessionConfig) -> std::result::Result<Arc<dyn Session>, TransportError> {
        if self.faults.open {
            return Err(TransportError::Failed("open refused".into()));
        }
        self.counters.opened.fetch_add(1, Ordering::SeqCst);
        Ok(Arc::new(MockSession {
            counters: Arc::clone(&self.counters),
            fail_declare: self.faults.declare,
            fail_close: self.faults.close,
            close_delay: self.faults.close_delay,
            routers: self.faults.routers,
            closed: AtomicBool::new(false),
            callback: Arc::clone(&self.callback),
        }))
    }
}

impl Session for MockSession {
    fn zid(&self) -> SessionId {
        SessionId::from_u128(0x1234)
    }

    fn routers_zid(&self, on_router: &mut dyn FnMut(&SessionId)) {
        self.counters.router_queries.fetch_add(1, Ordering::SeqCst);
        for n in 0..self.routers {
            on_router(&SessionId::from_u128(0xf000 + n as u128));
        }
    }

    fn declare_liveliness_subscriber(
        &self,
        key_expr: &str,
        options: SubscriberOptions,
        callback: SampleCallback,
    ) -> std::result::Result<Box<dyn Subscriber>, TransportError> {
        assert!(options.history);
        if self.fail_declare {
            return Err(TransportError::Failed("declare refused".into()));
        }
        self.counters.declared.fetch_add(1, Ordering::SeqCst);
        *self.callback.lock() = Some(callback);
        Ok(Box::new(MockSubscriber {
            counters: Arc::clone(&self.counters),
            key_expr: key_expr.to_string(),
        }))
    }

    fn declare_liveliness_token(
        &self,
        _key_expr: &str,
    ) -> std::result::Result<Box<dyn LivelinessToken>, TransportError> {
        Err(TransportError::Failed("unsupported".into()))
    }

    fn close(&self) -> std::result::Result<(), TransportError> {
        self.counters.closed.fetch_add(1, Ordering::SeqCst);
        if let Some(delay) = self.close_delay {
            thread::sleep(delay);
        }
        self.closed.store(true, Ordering::SeqCst);
        if self.fail_close {
            Err(TransportError::Failed("close refused".into()))
        } else {
            Ok(())
        }
    }

    fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}

impl Subscriber for MockSubscriber {
    fn key_expr(&self) -> &str {
        &self.key_expr
    }

    fn undeclare(self: Box<Self>) -> std::result::Result<(), TransportError> {
        self.counters.undeclared.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

fn build(transport: &Arc<MockTransport>) -> Result<Context> {
    let transport: Arc<dyn Transport> = Arc::clone(transport) as Arc<dyn Transport>;
    Context::builder(transport)
        .domain_id(7)
        .enclave("/")
        .config(SessionConfig::default())
        .skip_router_check()
        .build()
}

fn shm_config() -> SessionConfig {
    let mut config = SessionConfig::default();
    config.shared_memory.enabled = true;
    config
}

#[test]
fn build_reaches_subscribed() {
    let transport = MockTransport::healthy();
    let ctx = build(&transport).expect("context");

    assert_eq!(ctx.state(), LifecycleState::Subscribed);
    assert!(ctx.is_initialized());
    assert!(!ctx.is_shutdown());
    assert_eq!(ctx.domain_id(), 7);
    assert_eq!(ctx.enclave(), "/");
    assert_eq!(ctx.liveliness_key(), "@ros2_lv/7/**");
    assert_eq!(ctx.zid(), SessionId::from_u128(0x1234));
    assert_eq!(ctx.graph_cache().zid(), "1234");
    assert!(ctx.session().is_some());
    assert!(ctx.shm_provider().is_none());
    assert_eq!(transport.count(|c| &c.declared), 1);
}

#[test]
fn discovery_updates_cache_and_triggers_guard() {
    let transport = MockTransport::healthy();
    let ctx = build(&transport).expect("context");
    let guard = ctx.graph_guard_condition();

    transport.fire(&Sample::put("@ros2_lv/7/aa/0/talker"));
    assert!(ctx.graph_cache().contains("@ros2_lv/7/aa/0/talker"));
    assert!(guard.trigger_value());
    assert!(guard.wait(Duration::from_millis(1)));

    transport.fire(&Sample::delete("@ros2_lv/7/aa/0/talker"));
    assert!(ctx.graph_cache().is_empty());
    assert!(guard.trigger_value());
}

#[test]
fn shutdown_twice_releases_once() {
    let transport = MockTransport::healthy();
    let ctx = build(&transport).expect("context");

    ctx.shutdown().expect("first shutdown");
    ctx.shutdown().expect("second shutdown");

    assert!(ctx.is_shutdown());
    assert_eq!(ctx.state(), LifecycleState::Closed);
    assert!(ctx.session().is_none());
    assert_eq!(transport.count(|c| &c.undeclared), 1);
    assert_eq!(transport.count(|c| &c.closed), 1);
}

#[test]
fn drop_after_shutdown_releases_nothing_more() {
    let transport = MockTransport::healthy();
    let ctx = build(&transport).expect("context");
    ctx.shutdown().expect("shutdown");
    drop(ctx);

    assert_eq!(transport.count(|c| &c.undeclared), 1);
    assert_eq!(transport.count(|c| &c.closed), 1);
}

#[test]
fn drop_without_shutdown_releases() {
    let transport = MockTransport::healthy();
    drop(build(&transport).expect("context"));

    assert_eq!(transport.count(|c| &c.undeclared), 1);
    assert_eq!(transport.count(|c| &c.closed), 1);
}

#[test]
fn callback_after_shutdown_is_ignored() {
    let transport = MockTransport::healthy();
    let ctx = build(&transport).expect("context");
    let cache = ctx.graph_cache();
    let guard = ctx.graph_guard_condition();
    ctx.shutdown().expect("shutdown");

    transport.fire(&Sample::put("@ros2_lv/7/aa/0/late"));
    assert!(cache.is_empty());
    assert_eq!(cache.version(), 0);
    assert!(!guard.trigger_value());
}

#[test]
fn callback_after_drop_is_ignored() {
    let transport = MockTransport::healthy();
    let ctx = build(&transport).expect("context");
    let cache = ctx.graph_cache();
    drop(ctx);

    transport.fire(&Sample::put("@ros2_lv/7/aa/0/late"));
    assert!(cache.is_empty());
}

#[test]
fn guard_failure_does_not_lose_update() {
    let transport = MockTransport::healthy();
    let ctx = build(&transport).expect("context");
    ctx.graph_guard_condition().close();

    transport.fire(&Sample::put("@ros2_lv/7/aa/0/talker"));
    assert!(ctx.graph_cache().contains("@ros2_lv/7/aa/0/talker"));
}

#[test]
fn failed_close_still_ends_closed() {
    let transport = MockTransport::new(Faults {
        close: true,
        ..Faults::default()
    });
    let ctx = build(&transport).expect("context");

    assert!(matches!(ctx.shutdown(), Err(Error::SessionClose(_))));
    assert_eq!(ctx.state(), LifecycleState::Closed);
    ctx.shutdown().expect("already closed");
    assert_eq!(transport.count(|c| &c.closed), 1);
}

#[test]
fn racing_shutdown_waits_for_close() {
    let transport = MockTransport::new(Faults {
        close_delay: Some(Duration::from_millis(300)),
        ..Faults::default()
    });
    let ctx = Arc::new(build(&transport).expect("context"));

    let first = {
        let ctx = Arc::clone(&ctx);
        thread::spawn(move || ctx.shutdown())
    };
    while ctx.state() == LifecycleState::Subscribed {
        thread::sleep(Duration::from_millis(1));
    }

    ctx.shutdown().expect("second shutdown");
    assert!(ctx.is_shutdown());
    assert_eq!(ctx.state(), LifecycleState::Closed);
    assert_eq!(transport.count(|c| &c.closed), 1);

    first.join().expect("join").expect("first shutdown");
    assert_eq!(transport.count(|c| &c.closed), 1);
    assert_eq!(transport.count(|c| &c.undeclared), 1);
}

#[test]
fn concurrent_entity_ids_are_unique_and_contiguous() {
    let transport = MockTransport::healthy();
    let ctx = Arc::new(build(&transport).expect("context"));

    let handles: Vec<_> = (0..8)
        .map(|_| {
            let ctx = Arc::clone(&ctx);
            thread::spawn(move || (0..250).map(|_| ctx.get_next_entity_id()).collect::<Vec<_>>())
        })
        .collect();

    let mut seen = HashSet::new();
    for handle in handles {
        for id in handle.join().expect("join") {
            assert!(seen.insert(id), "duplicate id {id}");
        }
    }
    assert_eq!(seen.len(), 2000);
    assert_eq!(seen.iter().max(), Some(&1999));
    assert_eq!(ctx.get_next_entity_id(), 2000);
}

#[test]
fn open_failure_acquires_nothing() {
    let transport = MockTransport::new(Faults {
        open: true,
        ..Faults::default()
    });
    assert!(matches!(build(&transport), Err(Error::SessionOpen(_))));
    assert_eq!(transport.count(|c| &c.closed), 0);
}

#[test]
fn config_failure_opens_nothing() {
    let transport = MockTransport::healthy();
    let err = Context::builder(transport.clone() as Arc<dyn Transport>)
        .config_file("/nonexistent/rmw_link_session.yaml")
        .skip_router_check()
        .build()
        .unwrap_err();
    assert!(matches!(err, Error::Config(_)));
    assert_eq!(transport.count(|c| &c.opened), 0);
}

#[test]
fn router_check_failure_closes_session() {
    let transport = MockTransport::healthy();
    let err = Context::builder(transport.clone() as Arc<dyn Transport>)
        .config(SessionConfig::default())
        .router_check_attempts(2)
        .build()
        .unwrap_err();
    assert!(matches!(err, Error::RouterUnreachable { attempts: 2 }));
    assert_eq!(transport.count(|c| &c.router_queries), 2);
    assert_eq!(transport.count(|c| &c.closed), 1);
    assert_eq!(transport.count(|c| &c.declared), 0);
}

#[test]
fn router_check_success_continues() {
    let transport = MockTransport::new(Faults {
        routers: 1,
        ..Faults::default()
    });
    let ctx = Context::builder(transport.clone() as Arc<dyn Transport>)
        .config(SessionConfig::default())
        .router_check_attempts(3)
        .build()
        .expect("context");
    assert_eq!(transport.count(|c| &c.router_queries), 1);
    assert_eq!(ctx.state(), LifecycleState::Subscribed);
}

#[test]
fn shm_failure_closes_session() {
    let transport = MockTransport::healthy();
    let err = Context::builder(transport.clone() as Arc<dyn Transport>)
        .config(shm_config())
        .skip_router_check()
        .shm_pool(4096, AllocAlignment { pow: 13 })
        .build()
        .unwrap_err();
    assert!(matches!(err, Error::ShmProvider(_)));
    assert_eq!(transport.count(|c| &c.closed), 1);
    assert_eq!(transport.count(|c| &c.declared), 0);
}

#[test]
fn subscription_failure_unwinds_everything() {
    let transport = MockTransport::new(Faults {
        declare: true,
        ..Faults::default()
    });
    let err = Context::builder(transport.clone() as Arc<dyn Transport>)
        .config(shm_config())
        .skip_router_check()
        .shm_pool(4096, DEFAULT_ALIGNMENT)
        .build()
        .unwrap_err();
    assert!(matches!(err, Error::Subscription(_)));
    assert_eq!(transport.count(|c| &c.closed), 1);
    assert_eq!(transport.count(|c| &c.undeclared), 0);
}

#[test]
fn shm_pool_follows_config() {
    let transport = MockTransport::healthy();
    let mut config = shm_config();
    config.shared_memory.message_size_threshold = 512;
    let ctx = Context::builder(transport.clone() as Arc<dyn Transport>)
        .config(config)
        .skip_router_check()
        .shm_pool(64 * 1024, DEFAULT_ALIGNMENT)
        .build()
        .expect("context");

    let shm = ctx.shm_provider().expect("shm provider");
    assert_eq!(shm.capacity(), 64 * 1024);
    assert_eq!(shm.message_size_threshold(), 512);

    ctx.shutdown().expect("shutdown");
    assert!(ctx.shm_provider().is_none());
}

#[test]
fn shutdown_releases_pool_held_elsewhere() {
    let transport = MockTransport::healthy();
    let ctx = Context::builder(transport.clone() as Arc<dyn Transport>)
        .config(shm_config())
        .skip_router_check()
        .shm_pool(64 * 1024, DEFAULT_ALIGNMENT)
        .build()
        .expect("context");

    let shm = ctx.shm_provider().expect("shm provider");
    let buf = shm.alloc(16).expect("alloc before shutdown");

    ctx.shutdown().expect("shutdown");
    assert!(shm.is_released());
    assert!(matches!(shm.alloc(16), Err(ShmError::Released)));
    assert_eq!(buf.len(), 16);
}

#[test]
fn finalize_requires_shutdown() {
    let transport = MockTransport::healthy();
    let ctx = build(&transport).expect("context");
    assert!(matches!(ctx.finalize(), Err(Error::InvalidState(_))));
    // drop still released the session
    assert_eq!(transport.count(|c| &c.closed), 1);

    let ctx = build(&transport).expect("context");
    ctx.shutdown().expect("shutdown");
    ctx.finalize().expect("finalize");
    assert_eq!(transport.count(|c| &c.closed), 2);
}
