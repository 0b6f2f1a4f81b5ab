// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Middleware init entry point.

use crate::context::Context;
use crate::env_config::EnvConfig;
use crate::error::{Error, Result};
use crate::transport::Transport;
use std::sync::Arc;

/// Options for [`init`].
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct InitOptions {
    /// Domain to join, `None` means the default domain 0.
    pub domain_id: Option<usize>,
    /// Security enclave; must not be empty.
    pub enclave: String,
    /// Caller-chosen id of this init/shutdown cycle.
    pub instance_id: u64,
}

impl InitOptions {
    pub fn new(enclave: impl Into<String>) -> Self {
        Self {
            enclave: enclave.into(),
            ..Self::default()
        }
    }

    /// Options with the domain id taken from the environment.
    pub fn from_env(enclave: impl Into<String>) -> Self {
        let env = EnvConfig::from_env();
        Self {
            domain_id: usize::try_from(env.domain_id).ok(),
            ..Self::new(enclave)
        }
    }

    #[must_use]
    pub fn with_domain_id(mut self, domain_id: usize) -> Self {
        self.domain_id = Some(domain_id);
        self
    }

    #[must_use]
    pub fn with_instance_id(mut self, instance_id: u64) -> Self {
        self.instance_id = instance_id;
        self
    }
}

/// Create a context for `options` on top of `transport`.
pub fn init(transport: Arc<dyn Transport>, options: &InitOptions) -> Result<Context> {
    if options.enclave.is_empty() {
        return Err(Error::InvalidArgument("enclave is empty".to_string()));
    }

    let domain_id = options.domain_id.unwrap_or(0);
    log::debug!(
        "[init] instance {} joining domain {} (enclave '{}')",
        options.instance_id,
        domain_id,
        options.enclave
    );

    Context::builder(transport)
        .domain_id(domain_id)
        .enclave(options.enclave.clone())
        .build()
}
