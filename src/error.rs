// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0
use thiserror::Error;

#[derive(Error, Debug)]
pub enum CaptureError {
    #[error("Pod watch error: {0}")]
    WatchError(#[from] kube_runtime::watcher::Error),

    #[error("Failed to launch capture process: {0}")]
    LaunchError(#[source] std::io::Error),

    #[error("Failed to signal capture process {pid}: {source}")]
    SignalError { pid: u32, source: nix::Error },

    #[error("Failed to reap capture process: {0}")]
    ReapError(#[source] std::io::Error),

    #[error("Invalid artifact pattern: {0}")]
    PatternError(#[from] glob::PatternError),

    #[error("Failed to remove capture file {path}: {source}")]
    RemoveError {
        path: String,
        source: std::io::Error,
    },
}

pub type Result<T> = std::result::Result<T, CaptureError>;
