// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Graph guard condition.
//!
//! A manually triggered flag that wakes threads blocked in [`GuardCondition::wait`].
//! The context triggers it whenever discovery changes the graph cache.

use crate::error::{Error, Result};
use parking_lot::{Condvar, Mutex};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

#[derive(Debug, Default)]
struct GuardState {
    triggered: bool,
    closed: bool,
}

/// Manually-triggered condition.
#[derive(Debug)]
pub struct GuardCondition {
    id: u64,
    state: Mutex<GuardState>,
    cond: Condvar,
}

impl GuardCondition {
    /// Create a new guard condition with trigger value `false`.
    #[must_use]
    pub fn new() -> Self {
        static NEXT_ID: AtomicU64 = AtomicU64::new(1);
        Self {
            id: NEXT_ID.fetch_add(1, Ordering::Relaxed),
            state: Mutex::new(GuardState::default()),
            cond: Condvar::new(),
        }
    }

    #[must_use]
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Raise the trigger and wake every waiter.
    ///
    /// Fails once the condition has been closed.
    pub fn trigger(&self) -> Result<()> {
        let mut state = self.state.lock();
        if state.closed {
            return Err(Error::GuardCondition(format!(
                "guard condition {} is closed",
                self.id
            )));
        }
        state.triggered = true;
        self.cond.notify_all();
        Ok(())
    }

    /// Block until triggered or `timeout` elapses.
    ///
    /// Returns `true` and clears the trigger when it was raised. A closed
    /// condition returns `false` immediately.
    pub fn wait(&self, timeout: Duration) -> bool {
        let deadline = Instant::now().checked_add(timeout);
        let mut state = self.state.lock();
        loop {
            if state.triggered {
                state.triggered = false;
                return true;
            }
            if state.closed {
                return false;
            }
            match deadline {
                Some(deadline) => {
                    if self.cond.wait_until(&mut state, deadline).timed_out() {
                        let hit = state.triggered;
                        state.triggered = false;
                        return hit;
                    }
                }
                None => self.cond.wait(&mut state),
            }
        }
    }

    /// Current trigger value, without clearing it.
    #[must_use]
    pub fn trigger_value(&self) -> bool {
        self.state.lock().triggered
    }

    /// Refuse further triggers and release all waiters.
    pub fn close(&self) {
        let mut state = self.state.lock();
        state.closed = true;
        self.cond.notify_all();
    }

    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.state.lock().closed
    }
}

impl Default for GuardCondition {
    fn default() -> Self {
        Self::new()
    }
}
