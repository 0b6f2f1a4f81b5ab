// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Logger installation.
//!
//! The crate logs through the `log` facade only. Embedding applications that
//! already install a logger need nothing from here; standalone users call one
//! of these once at startup.

use crate::env_config::EnvConfig;
use crate::error::{Error, Result};
use log::LevelFilter;

/// Install `env_logger` at a fixed level.
pub fn init_logging(level: LevelFilter) -> Result<()> {
    env_logger::Builder::new()
        .filter_level(level)
        .format_timestamp_millis()
        .try_init()
        .map_err(|_| already_initialized())
}

/// Install `env_logger`, honouring `RUST_LOG` and defaulting to `default_level`.
pub fn init_logging_env(default_level: LevelFilter) -> Result<()> {
    env_logger::Builder::from_env(
        env_logger::Env::default().default_filter_or(default_level.to_string()),
    )
    .format_timestamp_millis()
    .try_init()
    .map_err(|_| already_initialized())
}

/// Install `env_logger` with `RMW_LINK_LOG_LEVEL` as the fallback for `RUST_LOG`.
pub fn init_logging_from_env(config: &EnvConfig) -> Result<()> {
    config.apply_log_level();
    env_logger::Builder::from_default_env()
        .format_timestamp_millis()
        .try_init()
        .map_err(|_| already_initialized())
}

/// Install `env_logger` with a filter string such as `"rmw_link=debug,warn"`.
pub fn init_logging_with_filter(filter: &str) -> Result<()> {
    if filter.trim().is_empty() {
        return Err(Error::InvalidArgument("empty log filter".to_string()));
    }

    env_logger::Builder::new()
        .parse_filters(filter)
        .format_timestamp_millis()
        .try_init()
        .map_err(|_| already_initialized())
}

fn already_initialized() -> Error {
    Error::InvalidState("logger already initialized".to_string())
}
