// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

use parking_lot::RwLock;
use std::collections::BTreeSet;

#[derive(Default)]
struct GraphState {
    version: u64,
    tokens: BTreeSet<String>,
}

/// Tracks the liveliness tokens seen through discovery.
///
/// Each token is the key expression of a graph entity announced by some
/// session; the cache records which are alive and bumps `version` on every
/// real change so graph queries can detect staleness.
pub struct GraphCache {
    zid: String,
    state: RwLock<GraphState>,
}

impl GraphCache {
    /// Create a cache owned by the session whose id renders as `zid`.
    pub fn new(zid: impl Into<String>) -> Self {
        Self {
            zid: zid.into(),
            state: RwLock::new(GraphState::default()),
        }
    }

    pub fn zid(&self) -> &str {
        &self.zid
    }

    /// Record a token announced alive. Returns `true` if it was new.
    pub fn parse_put(&self, keyexpr: &str) -> bool {
        let mut guard = self.state.write();
        if guard.tokens.insert(keyexpr.to_string()) {
            guard.version += 1;
            log::trace!("[graph] put {} (v{})", keyexpr, guard.version);
            true
        } else {
            false
        }
    }

    /// Record a token withdrawn. Returns `true` if it was known.
    pub fn parse_del(&self, keyexpr: &str) -> bool {
        let mut guard = self.state.write();
        if guard.tokens.remove(keyexpr) {
            guard.version += 1;
            log::trace!("[graph] del {} (v{})", keyexpr, guard.version);
            true
        } else {
            log::trace!("[graph] del of unknown token {}", keyexpr);
            false
        }
    }

    pub fn contains(&self, keyexpr: &str) -> bool {
        self.state.read().tokens.contains(keyexpr)
    }

    pub fn len(&self) -> usize {
        self.state.read().tokens.len()
    }

    pub fn is_empty(&self) -> bool {
        self.state.read().tokens.is_empty()
    }

    pub fn version(&self) -> u64 {
        self.state.read().version
    }

    /// Live tokens in lexical order.
    pub fn tokens(&self) -> Vec<String> {
        self.state.read().tokens.iter().cloned().collect()
    }
}

impl std::fmt::Debug for GraphCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.state.read();
        f.debug_struct("GraphCache")
            .field("zid", &self.zid)
            .field("version", &state.version)
            .field("tokens", &state.tokens.len())
            .finish()
    }
}
