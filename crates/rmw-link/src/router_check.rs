// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Router connectivity probe.

use crate::error::{Error, Result};
use crate::transport::Session;
use std::thread;
use std::time::Duration;

/// Pause between two failed probes while waiting for a router.
pub const ROUTER_CHECK_INTERVAL: Duration = Duration::from_millis(100);

/// Ask `session` once for its connected routers.
///
/// Logs every router id and the final count. Returns the count, or
/// [`Error::NoRouter`] when no router answered.
pub fn check_router_reachable(session: &dyn Session) -> Result<usize> {
    let mut count = 0usize;
    session.routers_zid(&mut |zid| {
        log::info!("[router_check] router connected with id {}", zid);
        count += 1;
    });

    if count == 0 {
        log::error!("[router_check] no routers connected (count = 0)");
        Err(Error::NoRouter)
    } else {
        log::info!("[router_check] {} router(s) connected", count);
        Ok(count)
    }
}

/// Probe up to `attempts` times, sleeping [`ROUTER_CHECK_INTERVAL`] between
/// failures.
pub fn wait_for_router(session: &dyn Session, attempts: u64) -> Result<usize> {
    wait_for_router_every(session, attempts, ROUTER_CHECK_INTERVAL)
}

pub(crate) fn wait_for_router_every(
    session: &dyn Session,
    attempts: u64,
    interval: Duration,
) -> Result<usize> {
    let mut tried = 0u64;
    while tried < attempts {
        tried += 1;
        if let Ok(count) = check_router_reachable(session) {
            return Ok(count);
        }
        if tried < attempts {
            log::debug!(
                "[router_check] attempt {}/{} failed, retrying in {:?}",
                tried,
                attempts,
                interval
            );
            thread::sleep(interval);
        }
    }
    Err(Error::RouterUnreachable { attempts })
}
