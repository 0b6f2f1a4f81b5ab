// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

#![allow(clippy::doc_markdown)] // Test documentation
#![allow(clippy::missing_panics_doc)] // Tests panic on failure

//! Discovery between contexts sharing one in-process transport.
//!
//! Every context subscribes to `@ros2_lv/<domain>/**` with history, so tokens
//! declared by any session in the domain must show up in every cache, late
//! joiners included, and vanish again when the owning session goes away.

use rmw_link::liveliness::entity_token;
use rmw_link::{
    Context, Error, LifecycleState, LocalTransport, SessionConfig, SessionMode, Transport,
};
use std::sync::Arc;
use std::time::Duration;

fn context(transport: &LocalTransport, domain_id: usize) -> anyhow::Result<Context> {
    let transport: Arc<dyn Transport> = Arc::new(transport.clone());
    Ok(Context::builder(transport)
        .domain_id(domain_id)
        .enclave("/")
        .config(SessionConfig::default())
        .skip_router_check()
        .build()?)
}

#[test]
fn token_is_seen_by_other_context() -> anyhow::Result<()> {
    let transport = LocalTransport::new();
    let alice = context(&transport, 0)?;
    let bob = context(&transport, 0)?;

    let key = entity_token(0, &alice.zid(), alice.get_next_entity_id(), "/talker");
    let session = alice.session().expect("session");
    let token = session.declare_liveliness_token(&key)?;

    assert!(bob.graph_cache().contains(&key));
    assert!(bob.graph_guard_condition().wait(Duration::from_millis(10)));

    token.undeclare()?;
    assert!(!bob.graph_cache().contains(&key));
    assert!(bob.graph_guard_condition().trigger_value());

    alice.shutdown()?;
    bob.shutdown()?;
    Ok(())
}

#[test]
fn late_joiner_learns_existing_tokens() -> anyhow::Result<()> {
    let transport = LocalTransport::new();
    let alice = context(&transport, 3)?;
    let key = entity_token(3, &alice.zid(), 0, "/camera");
    let _token = alice
        .session()
        .expect("session")
        .declare_liveliness_token(&key)?;

    let bob = context(&transport, 3)?;
    assert!(bob.graph_cache().contains(&key));
    assert_eq!(bob.graph_cache().version(), 1);
    Ok(())
}

#[test]
fn domains_are_isolated() -> anyhow::Result<()> {
    let transport = LocalTransport::new();
    let alice = context(&transport, 1)?;
    let bob = context(&transport, 2)?;

    let key = entity_token(1, &alice.zid(), 0, "/talker");
    let _token = alice
        .session()
        .expect("session")
        .declare_liveliness_token(&key)?;

    assert!(alice.graph_cache().contains(&key));
    assert!(bob.graph_cache().is_empty());
    Ok(())
}

#[test]
fn shutdown_withdraws_tokens_from_peers() -> anyhow::Result<()> {
    let transport = LocalTransport::new();
    let alice = context(&transport, 0)?;
    let bob = context(&transport, 0)?;
    assert_eq!(transport.session_count(), 2);
    assert_eq!(transport.subscriber_count(), 2);

    let key = entity_token(0, &alice.zid(), 0, "/talker");
    let token = alice
        .session()
        .expect("session")
        .declare_liveliness_token(&key)?;
    assert!(bob.graph_cache().contains(&key));

    alice.shutdown()?;
    assert_eq!(alice.state(), LifecycleState::Closed);
    assert!(!bob.graph_cache().contains(&key));
    assert_eq!(transport.session_count(), 1);
    assert_eq!(transport.subscriber_count(), 1);

    // the token outlived its session; releasing it now is harmless
    drop(token);
    Ok(())
}

#[test]
fn router_check_needs_a_router() -> anyhow::Result<()> {
    let transport = LocalTransport::new();
    let shared: Arc<dyn Transport> = Arc::new(transport.clone());

    let err = Context::builder(Arc::clone(&shared))
        .config(SessionConfig::default())
        .router_check_attempts(1)
        .build()
        .unwrap_err();
    assert!(matches!(err, Error::RouterUnreachable { attempts: 1 }));
    assert_eq!(transport.session_count(), 0);

    let router = transport.open_local(&SessionConfig {
        mode: SessionMode::Router,
        ..SessionConfig::default()
    })?;

    let ctx = Context::builder(shared)
        .config(SessionConfig::default())
        .router_check_attempts(1)
        .build()?;
    assert_eq!(ctx.state(), LifecycleState::Subscribed);
    assert_eq!(
        rmw_link::check_router_reachable(ctx.session().expect("session").as_ref())?,
        1
    );

    drop(ctx);
    drop(router);
    assert_eq!(transport.session_count(), 0);
    Ok(())
}

#[test]
fn init_and_finalize() -> anyhow::Result<()> {
    let transport: Arc<dyn Transport> = Arc::new(LocalTransport::new());
    let options = rmw_link::InitOptions::new("/").with_domain_id(9);

    let ctx = rmw_link::init(transport, &options)?;
    assert_eq!(ctx.liveliness_key(), "@ros2_lv/9/**");
    ctx.shutdown()?;
    ctx.finalize()?;
    Ok(())
}
