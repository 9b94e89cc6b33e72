// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0
use crate::constants::{CONTROLLER_NAME, DEFAULT_RETRY_DELAY_SECS};
use anyhow::{Context, Result};
use std::env;
use std::time::Duration;

/// Operator configuration loaded from environment variables
#[derive(Debug, Clone)]
pub struct Config {
    /// Controller identity written into the managed-by marker and used as field manager
    pub controller_name: String,
    /// Delay applied to every transient failure
    pub retry_delay: Duration,
    /// Requeue interval after a successful sync, if periodic resync is wanted
    pub resync_interval: Option<Duration>,
    /// Restrict the SecretSync watch to a single namespace
    pub watch_namespace: Option<String>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            controller_name: CONTROLLER_NAME.to_string(),
            retry_delay: Duration::from_secs(DEFAULT_RETRY_DELAY_SECS),
            resync_interval: None,
            watch_namespace: None,
        }
    }
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let defaults = Self::default();

        let controller_name = lookup("CONTROLLER_NAME")
            .filter(|v| !v.is_empty())
            .unwrap_or(defaults.controller_name);

        let retry_delay = match lookup("RETRY_DELAY_SECS") {
            Some(v) => Duration::from_secs(
                v.parse()
                    .with_context(|| format!("RETRY_DELAY_SECS is not a number: {v}"))?,
            ),
            None => defaults.retry_delay,
        };

        let resync_interval = lookup("RESYNC_INTERVAL_SECS")
            .map(|v| {
                v.parse()
                    .map(Duration::from_secs)
                    .with_context(|| format!("RESYNC_INTERVAL_SECS is not a number: {v}"))
            })
            .transpose()?
            .filter(|d| !d.is_zero());

        let watch_namespace = lookup("WATCH_NAMESPACE").filter(|v| !v.is_empty());

        Ok(Config {
            controller_name,
            retry_delay,
            resync_interval,
            watch_namespace,
        })
    }
}
