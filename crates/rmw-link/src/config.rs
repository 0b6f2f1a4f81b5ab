// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Transport configuration provider.
//!
//! Configuration is a small YAML document:
//!
//! ```yaml
//! mode: peer            # peer | client | router
//! connect: ["tcp/192.168.1.10:7447"]
//! listen: []
//! shared_memory:
//!   enabled: true
//!   message_size_threshold: 2048
//! ```
//!
//! [`get_config`] picks the file from `RMW_LINK_SESSION_CONFIG_URI` or
//! `RMW_LINK_ROUTER_CONFIG_URI` depending on the entity and falls back to the
//! built-in defaults when the variable is unset.

use crate::env_config::{ENV_ROUTER_CONFIG_URI, ENV_SESSION_CONFIG_URI};
use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Which kind of transport participant a configuration is for.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ConfigurableEntity {
    Session,
    Router,
}

impl ConfigurableEntity {
    fn env_var(self) -> &'static str {
        match self {
            Self::Session => ENV_SESSION_CONFIG_URI,
            Self::Router => ENV_ROUTER_CONFIG_URI,
        }
    }
}

/// Role a session plays in the transport topology.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionMode {
    #[default]
    Peer,
    Client,
    Router,
}

/// Shared-memory section of the configuration.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SharedMemoryConfig {
    pub enabled: bool,
    /// Messages at least this large go through shared memory.
    pub message_size_threshold: usize,
}

impl Default for SharedMemoryConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            message_size_threshold: 2048,
        }
    }
}

/// Configuration handed to [`crate::transport::Transport::open`].
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SessionConfig {
    pub mode: SessionMode,
    pub connect: Vec<String>,
    pub listen: Vec<String>,
    pub shared_memory: SharedMemoryConfig,
}

impl SessionConfig {
    /// Built-in configuration for `entity`.
    #[must_use]
    pub fn default_for(entity: ConfigurableEntity) -> Self {
        match entity {
            ConfigurableEntity::Session => Self::default(),
            ConfigurableEntity::Router => Self {
                mode: SessionMode::Router,
                ..Self::default()
            },
        }
    }

    pub fn from_yaml_str(yaml: &str) -> Result<Self> {
        serde_yaml::from_str(yaml).map_err(|e| Error::Config(format!("invalid YAML: {e}")))
    }
}

/// Load a configuration file.
pub fn load_config(path: impl AsRef<Path>) -> Result<SessionConfig> {
    let path = path.as_ref();
    let text = std::fs::read_to_string(path)
        .map_err(|e| Error::Config(format!("cannot read {}: {e}", path.display())))?;
    SessionConfig::from_yaml_str(&text)
}

/// Resolve the configuration for `entity`.
///
/// Reads the file named by the entity's environment variable when set and
/// non-empty, otherwise returns [`SessionConfig::default_for`].
pub fn get_config(entity: ConfigurableEntity) -> Result<SessionConfig> {
    match std::env::var(entity.env_var()) {
        Ok(path) if !path.trim().is_empty() => {
            log::debug!("[config] loading {:?} configuration from {}", entity, path);
            load_config(path.trim())
        }
        Ok(_) | Err(std::env::VarError::NotPresent) => Ok(SessionConfig::default_for(entity)),
        Err(std::env::VarError::NotUnicode(_)) => Err(Error::Config(format!(
            "{} is not valid unicode",
            entity.env_var()
        ))),
    }
}

/// Whether the configuration asks for shared memory.
#[must_use]
pub fn read_shm_enabled(config: &SessionConfig) -> bool {
    config.shared_memory.enabled
}
