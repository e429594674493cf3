// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0

//! Capture process invocation and artifact naming

use crate::config::Config;
use crate::constants::capture::{FILE_PREFIX, FILE_SUFFIX};
use crate::error::{CaptureError, Result};
use glob::Pattern;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use tokio::process::{Child, Command};
use tracing::{error, info, warn};

/// Node-wide settings shared by every capture process
#[derive(Debug, Clone)]
pub struct CaptureSettings {
    pub dir: PathBuf,
    pub binary: PathBuf,
    pub rotate_mb: u64,
    pub interface: String,
}

impl From<&Config> for CaptureSettings {
    fn from(config: &Config) -> Self {
        Self {
            dir: config.capture_dir.clone(),
            binary: config.capture_binary.clone(),
            rotate_mb: config.rotate_mb,
            interface: config.interface.clone(),
        }
    }
}

/// A single capture process invocation for one pod
#[derive(Debug, Clone)]
pub struct CaptureCommand {
    program: PathBuf,
    output: PathBuf,
    rotate_mb: u64,
    max_files: u32,
    interface: String,
}

impl CaptureCommand {
    pub fn new(settings: &CaptureSettings, key: &str, max_files: u32) -> Self {
        Self {
            program: settings.binary.clone(),
            output: artifact_path(&settings.dir, key),
            rotate_mb: settings.rotate_mb,
            max_files,
            interface: settings.interface.clone(),
        }
    }

    pub fn output(&self) -> &Path {
        &self.output
    }

    /// Command line arguments: rotate after `rotate_mb`, keep `max_files`, write to `output`
    pub fn args(&self) -> Vec<String> {
        vec![
            "-C".to_string(),
            self.rotate_mb.to_string(),
            "-W".to_string(),
            self.max_files.to_string(),
            "-w".to_string(),
            self.output.to_string_lossy().into_owned(),
            "-i".to_string(),
            self.interface.clone(),
        ]
    }

    /// Launch the process with its output streams passed through to ours
    pub fn spawn(&self) -> Result<Child> {
        Command::new(&self.program)
            .args(self.args())
            .stdin(Stdio::null())
            .stdout(Stdio::inherit())
            .stderr(Stdio::inherit())
            .kill_on_drop(true)
            .spawn()
            .map_err(CaptureError::LaunchError)
    }
}

/// Path of the first capture file for `key`; rotation appends a number to it
pub fn artifact_path(dir: &Path, key: &str) -> PathBuf {
    dir.join(format!("{FILE_PREFIX}{key}{FILE_SUFFIX}"))
}

/// Glob matching the capture file for `key` and all of its rotated siblings
pub fn artifact_pattern(dir: &Path, key: &str) -> String {
    format!(
        "{}*",
        Pattern::escape(&artifact_path(dir, key).to_string_lossy())
    )
}

/// True for the capture file of `key` itself or one of its numbered rotations.
/// Rejects files of other pods whose names start with `<key>.pcap`.
pub fn is_artifact_of(path: &Path, dir: &Path, key: &str) -> bool {
    let base = artifact_path(dir, key);
    let (Some(name), Some(base_name)) = (path.file_name(), base.file_name()) else {
        return false;
    };
    if path.parent() != base.parent() {
        return false;
    }
    match name.to_string_lossy().strip_prefix(&*base_name.to_string_lossy()) {
        Some(rotation) => rotation.chars().all(|c| c.is_ascii_digit()),
        None => false,
    }
}

/// Files currently on disk that belong to the capture for `key`
pub fn artifact_files(dir: &Path, key: &str) -> Result<Vec<PathBuf>> {
    let mut files = Vec::new();
    for entry in glob::glob(&artifact_pattern(dir, key))? {
        match entry {
            Ok(path) if is_artifact_of(&path, dir, key) => files.push(path),
            Ok(_) => {}
            Err(e) => warn!(pod = %key, "Unreadable capture file entry: {}", e),
        }
    }
    Ok(files)
}

/// Delete every file produced by the capture for `key`.
/// Individual failures are logged and do not stop the remaining removals.
pub fn remove_artifacts(dir: &Path, key: &str) -> Result<usize> {
    let mut removed = 0;

    for path in artifact_files(dir, key)? {
        match std::fs::remove_file(&path) {
            Ok(()) => {
                removed += 1;
                info!(pod = %key, file = %path.display(), "Removed capture file");
            }
            Err(source) => {
                let e = CaptureError::RemoveError {
                    path: path.display().to_string(),
                    source,
                };
                error!(pod = %key, "{}", e);
            }
        }
    }

    Ok(removed)
}
