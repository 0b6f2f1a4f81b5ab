// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Environment variable configuration for rmw_link.
//!
//! ## Core Configuration
//! - `RMW_LINK_DOMAIN_ID`: domain ID (default: 0, or `ROS_DOMAIN_ID` if set)
//! - `RMW_LINK_LOG_LEVEL`: logging level (default: "warn")
//! - `RMW_LINK_SESSION_CONFIG_URI`: YAML configuration for sessions
//! - `RMW_LINK_ROUTER_CONFIG_URI`: YAML configuration for routers
//!
//! ## Router Check
//! - `RMW_LINK_ROUTER_CHECK_ATTEMPTS`: how many times context creation probes
//!   for a router before failing. Unset or empty skips the check, `0` checks
//!   indefinitely, a negative value skips the check.
//!
//! ## ROS 2 Compatibility
//! - `ROS_DOMAIN_ID`: fallback for `RMW_LINK_DOMAIN_ID`
//!
//! # Example
//!
//! ```bash
//! export RMW_LINK_DOMAIN_ID=42
//! export RMW_LINK_ROUTER_CHECK_ATTEMPTS=20
//! export RMW_LINK_SESSION_CONFIG_URI=/etc/rmw_link/session.yaml
//! ```

use std::env;

pub const ENV_DOMAIN_ID: &str = "RMW_LINK_DOMAIN_ID";
pub const ENV_LOG_LEVEL: &str = "RMW_LINK_LOG_LEVEL";
pub const ENV_SESSION_CONFIG_URI: &str = "RMW_LINK_SESSION_CONFIG_URI";
pub const ENV_ROUTER_CONFIG_URI: &str = "RMW_LINK_ROUTER_CONFIG_URI";
pub const ENV_ROUTER_CHECK_ATTEMPTS: &str = "RMW_LINK_ROUTER_CHECK_ATTEMPTS";
/// Consulted when `RMW_LINK_DOMAIN_ID` is unset or unparsable.
pub const ENV_ROS_DOMAIN_ID: &str = "ROS_DOMAIN_ID";

const DEFAULT_LOG_LEVEL: &str = "warn";

/// Snapshot of the `RMW_LINK_*` environment.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct EnvConfig {
    pub domain_id: u32,
    /// Router probe budget, `None` skips the probe.
    pub router_check_attempts: Option<u64>,
    /// `env_logger` filter used when `RUST_LOG` is absent.
    pub log_level: String,
    pub session_config_uri: Option<String>,
    pub router_config_uri: Option<String>,
}

impl Default for EnvConfig {
    fn default() -> Self {
        Self {
            domain_id: 0,
            router_check_attempts: None,
            log_level: DEFAULT_LOG_LEVEL.to_string(),
            session_config_uri: None,
            router_config_uri: None,
        }
    }
}

impl EnvConfig {
    /// Read every variable once. Unset, empty or unparsable values fall back
    /// to [`EnvConfig::default`].
    #[must_use]
    pub fn from_env() -> Self {
        let domain_id: u32 = non_empty(ENV_DOMAIN_ID)
            .and_then(|raw| raw.parse().ok())
            .or_else(|| non_empty(ENV_ROS_DOMAIN_ID).and_then(|raw| raw.parse().ok()))
            .unwrap_or_default();

        Self {
            domain_id,
            router_check_attempts: router_check_attempts(),
            log_level: non_empty(ENV_LOG_LEVEL).unwrap_or_else(|| DEFAULT_LOG_LEVEL.to_string()),
            session_config_uri: non_empty(ENV_SESSION_CONFIG_URI),
            router_config_uri: non_empty(ENV_ROUTER_CONFIG_URI),
        }
    }

    /// Export `log_level` as `RUST_LOG` unless the caller already set one.
    pub fn apply_log_level(&self) {
        if env::var_os("RUST_LOG").is_none() {
            env::set_var("RUST_LOG", &self.log_level);
        }
    }
}

fn non_empty(name: &str) -> Option<String> {
    env::var(name)
        .ok()
        .map(|raw| raw.trim().to_string())
        .filter(|raw| !raw.is_empty())
}

/// Read the router probe budget from `RMW_LINK_ROUTER_CHECK_ATTEMPTS`.
#[must_use]
pub fn router_check_attempts() -> Option<u64> {
    parse_router_check_attempts(env::var(ENV_ROUTER_CHECK_ATTEMPTS).ok().as_deref())
}

pub(crate) fn parse_router_check_attempts(raw: Option<&str>) -> Option<u64> {
    let raw = raw.map(str::trim).filter(|s| !s.is_empty())?;
    match raw.parse::<i64>() {
        Ok(0) => Some(u64::MAX),
        Ok(n) if n > 0 => u64::try_from(n).ok(),
        Ok(_) => None,
        Err(_) => {
            log::warn!(
                "[env_config] ignoring invalid {}='{}'",
                ENV_ROUTER_CHECK_ATTEMPTS,
                raw
            );
            None
        }
    }
}
