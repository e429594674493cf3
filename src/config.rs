// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0
use anyhow::{bail, Context, Result};
use std::path::PathBuf;
use std::time::Duration;

use crate::constants::{capture, env as vars, liveness};

/// Controller configuration loaded from environment variables
#[derive(Debug, Clone)]
pub struct Config {
    /// Node whose pods this controller captures for
    pub node_name: String,
    /// Directory the capture process writes its files into
    pub capture_dir: PathBuf,
    pub capture_binary: PathBuf,
    /// Size in millions of bytes after which the capture file is rotated
    pub rotate_mb: u64,
    pub interface: String,
    /// How often to look for capture processes that exited on their own, `None` disables the sweep
    pub liveness_interval: Option<Duration>,
    /// Upper bound for stopping all captures at shutdown, `None` waits indefinitely
    pub shutdown_timeout: Option<Duration>,
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load configuration from an arbitrary key lookup
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let node_name = lookup(vars::NODE_NAME)
            .filter(|v| !v.is_empty())
            .context("NODE_NAME environment variable not set")?;

        let capture_dir = lookup(vars::CAPTURE_DIR)
            .unwrap_or_else(|| capture::DEFAULT_DIR.to_string())
            .into();
        let capture_binary = lookup(vars::CAPTURE_BINARY)
            .unwrap_or_else(|| capture::DEFAULT_BINARY.to_string())
            .into();
        let interface =
            lookup(vars::CAPTURE_INTERFACE).unwrap_or_else(|| capture::DEFAULT_INTERFACE.to_string());

        let rotate_mb = match lookup(vars::CAPTURE_ROTATE_MB) {
            Some(v) => v
                .parse::<u64>()
                .with_context(|| format!("CAPTURE_ROTATE_MB is not a number: {v}"))?,
            None => capture::DEFAULT_ROTATE_MB,
        };
        if rotate_mb == 0 {
            bail!("CAPTURE_ROTATE_MB must be greater than zero");
        }

        let liveness_secs = match lookup(vars::LIVENESS_INTERVAL_SECS) {
            Some(v) => v
                .parse::<u64>()
                .with_context(|| format!("LIVENESS_INTERVAL_SECS is not a number: {v}"))?,
            None => liveness::DEFAULT_INTERVAL_SECS,
        };
        let liveness_interval = (liveness_secs > 0).then(|| Duration::from_secs(liveness_secs));

        let shutdown_timeout = lookup(vars::SHUTDOWN_TIMEOUT_SECS)
            .map(|v| {
                v.parse::<u64>()
                    .with_context(|| format!("SHUTDOWN_TIMEOUT_SECS is not a number: {v}"))
            })
            .transpose()?
            .map(Duration::from_secs);

        Ok(Config {
            node_name,
            capture_dir,
            capture_binary,
            rotate_mb,
            interface,
            liveness_interval,
            shutdown_timeout,
        })
    }
}
