// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0

//! Owns the table of running captures, one process per pod.

use crate::capture::command::{remove_artifacts, CaptureCommand, CaptureSettings};
use crate::error::{CaptureError, Result};
use futures::future::join_all;
use nix::sys::signal::{kill, Signal};
use nix::unistd::Pid;
use std::collections::HashMap;
use std::path::PathBuf;
use tokio::process::Child;
use tokio::sync::Mutex;
use tracing::{debug, error, info, instrument, warn};

/// A running capture. Only ever created by `start_capture`.
#[derive(Debug)]
struct CaptureState {
    child: Child,
    max_files: u32,
    output: PathBuf,
}

/// Tracks at most one capture process per pod name.
///
/// A single lock guards the table and is held for the whole of every
/// operation, including the wait for a stopping process to exit, so start and
/// stop for the same pod never interleave. Membership in the table is what
/// "capturing" means.
pub struct CaptureManager {
    settings: CaptureSettings,
    captures: Mutex<HashMap<String, CaptureState>>,
}

impl CaptureManager {
    pub fn new(settings: CaptureSettings) -> Self {
        Self {
            settings,
            captures: Mutex::new(HashMap::new()),
        }
    }

    /// Launch a capture for `key` unless one is already tracked.
    /// Returns true when a new process was started.
    #[instrument(skip(self))]
    pub async fn start_capture(&self, key: &str, max_files: u32) -> bool {
        let mut captures = self.captures.lock().await;

        if captures.contains_key(key) {
            debug!("Capture already running");
            return false;
        }

        let command = CaptureCommand::new(&self.settings, key, max_files);
        let child = match command.spawn() {
            Ok(child) => child,
            Err(e) => {
                error!(pod = %key, "{}", e);
                return false;
            }
        };

        info!(
            pod = %key,
            pid = child.id().unwrap_or_default(),
            file = %command.output().display(),
            max_files,
            "Capture started"
        );

        captures.insert(
            key.to_string(),
            CaptureState {
                child,
                max_files,
                output: command.output().to_path_buf(),
            },
        );
        true
    }

    /// Terminate the capture for `key` and delete its files.
    /// Returns false when nothing was tracked for `key`.
    #[instrument(skip(self))]
    pub async fn stop_capture(&self, key: &str) -> bool {
        let mut captures = self.captures.lock().await;

        match captures.remove(key) {
            Some(state) => {
                self.shutdown(key, state).await;
                true
            }
            None => false,
        }
    }

    /// Stop every tracked capture. Used at controller shutdown.
    pub async fn stop_all(&self) {
        let mut captures = self.captures.lock().await;
        if captures.is_empty() {
            return;
        }

        info!("Stopping {} captures", captures.len());

        let stopping: Vec<_> = captures.drain().collect();
        join_all(
            stopping
                .into_iter()
                .map(|(key, state)| async move { self.shutdown(&key, state).await }),
        )
        .await;
    }

    pub async fn is_capturing(&self, key: &str) -> bool {
        self.captures.lock().await.contains_key(key)
    }

    /// Drop captures whose process exited without being asked to, deleting
    /// whatever files they left behind. Returns the affected pod names so the
    /// caller can decide whether to start them again.
    #[instrument(skip(self))]
    pub async fn reap_exited(&self) -> Vec<String> {
        let mut captures = self.captures.lock().await;

        let mut exited = Vec::new();
        for (key, state) in captures.iter_mut() {
            match state.child.try_wait() {
                Ok(Some(status)) => {
                    warn!(
                        pod = %key,
                        file = %state.output.display(),
                        max_files = state.max_files,
                        "Capture process exited unexpectedly: {}",
                        status
                    );
                    exited.push(key.clone());
                }
                Ok(None) => {}
                Err(e) => warn!(pod = %key, "Failed to check capture process: {}", e),
            }
        }

        for key in &exited {
            captures.remove(key);
            self.cleanup(key);
        }

        exited
    }

    async fn shutdown(&self, key: &str, mut state: CaptureState) {
        info!(pod = %key, pid = state.child.id().unwrap_or_default(), "Stopping capture");

        if let Err(e) = terminate(&state.child) {
            error!(pod = %key, "{}", e);
        }

        // Reap regardless of whether the signal went through
        match state.child.wait().await {
            Ok(status) => debug!(pod = %key, "Capture process exited: {}", status),
            Err(e) => error!(pod = %key, "{}", CaptureError::ReapError(e)),
        }

        self.cleanup(key);
    }

    fn cleanup(&self, key: &str) {
        match remove_artifacts(&self.settings.dir, key) {
            Ok(removed) => debug!(pod = %key, "Removed {} capture files", removed),
            Err(e) => error!(pod = %key, "{}", e),
        }
    }
}

/// Ask the process to exit gracefully. A process that was already reaped has no pid and is skipped.
fn terminate(child: &Child) -> Result<()> {
    let Some(pid) = child.id() else {
        return Ok(());
    };
    kill(Pid::from_raw(pid as i32), Signal::SIGTERM)
        .map_err(|source| CaptureError::SignalError { pid, source })
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use std::path::Path;
    use std::sync::OnceLock;
    use std::time::Duration;

    /// Stand-in for tcpdump: creates the output file and one rotated sibling, then idles.
    const FAKE_CAPTURE: &str = "#!/bin/sh\n\
        # -C <mb> -W <files> -w <path> -i <iface>\n\
        touch \"$6\" \"${6}1\"\n\
        exec sleep 300\n";

    /// The script is written exactly once, before any test spawns a process,
    /// so no child inherits an open write handle to it.
    pub(crate) fn fake_capture_binary() -> &'static Path {
        static SCRIPT: OnceLock<(tempfile::TempDir, PathBuf)> = OnceLock::new();
        let (_, path) = SCRIPT.get_or_init(|| {
            use std::os::unix::fs::PermissionsExt;

            let dir = tempfile::tempdir().unwrap();
            let path = dir.path().join("fake-tcpdump");
            std::fs::write(&path, FAKE_CAPTURE).unwrap();
            std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
            (dir, path)
        });
        path
    }

    pub(crate) fn test_manager(dir: &Path, binary: &Path) -> CaptureManager {
        CaptureManager::new(CaptureSettings {
            dir: dir.to_path_buf(),
            binary: binary.to_path_buf(),
            rotate_mb: 1,
            interface: "any".to_string(),
        })
    }

    pub(crate) fn capture_files(dir: &Path, key: &str) -> usize {
        crate::capture::command::artifact_files(dir, key)
            .unwrap()
            .len()
    }

    /// Wait for the fake capture to create both of its files
    pub(crate) async fn wait_for_files(dir: &Path, key: &str) {
        for _ in 0..250 {
            if capture_files(dir, key) >= 2 {
                return;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        panic!("capture files for {key} never appeared");
    }

    async fn pid_of(manager: &CaptureManager, key: &str) -> Option<u32> {
        manager
            .captures
            .lock()
            .await
            .get(key)
            .and_then(|s| s.child.id())
    }

    #[tokio::test]
    async fn test_start_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let manager = test_manager(dir.path(), fake_capture_binary());

        assert!(manager.start_capture("web-0", 2).await);
        let pid = pid_of(&manager, "web-0").await;
        assert!(pid.is_some());

        assert!(!manager.start_capture("web-0", 5).await);
        assert_eq!(pid_of(&manager, "web-0").await, pid);
        assert_eq!(manager.captures.lock().await.len(), 1);
        assert_eq!(manager.captures.lock().await["web-0"].max_files, 2);

        manager.stop_all().await;
    }

    #[tokio::test]
    async fn test_stop_removes_process_and_files() {
        let dir = tempfile::tempdir().unwrap();
        let manager = test_manager(dir.path(), fake_capture_binary());

        manager.start_capture("web-0", 2).await;
        wait_for_files(dir.path(), "web-0").await;
        assert_eq!(capture_files(dir.path(), "web-0"), 2);
        std::fs::write(dir.path().join("capture-web-1.pcap"), b"").unwrap();

        assert!(manager.stop_capture("web-0").await);
        assert!(!manager.is_capturing("web-0").await);
        assert_eq!(capture_files(dir.path(), "web-0"), 0);
        // Files belonging to other pods are left alone
        assert_eq!(capture_files(dir.path(), "web-1"), 1);
    }

    #[tokio::test]
    async fn test_stop_unknown_is_noop() {
        let dir = tempfile::tempdir().unwrap();
        let manager = test_manager(dir.path(), fake_capture_binary());

        assert!(!manager.stop_capture("missing").await);
        assert!(!manager.is_capturing("missing").await);
    }

    #[tokio::test]
    async fn test_launch_failure_leaves_no_entry() {
        let dir = tempfile::tempdir().unwrap();
        fake_capture_binary();
        let manager = test_manager(dir.path(), Path::new("/nonexistent/tcpdump"));

        assert!(!manager.start_capture("web-0", 1).await);
        assert!(!manager.is_capturing("web-0").await);
    }

    #[tokio::test]
    async fn test_restart_after_stop() {
        let dir = tempfile::tempdir().unwrap();
        let manager = test_manager(dir.path(), fake_capture_binary());

        manager.start_capture("web-0", 1).await;
        wait_for_files(dir.path(), "web-0").await;
        manager.stop_capture("web-0").await;
        assert_eq!(capture_files(dir.path(), "web-0"), 0);
        assert!(manager.start_capture("web-0", 1).await);
        assert!(manager.is_capturing("web-0").await);

        manager.stop_all().await;
    }

    #[tokio::test]
    async fn test_stop_leaves_capture_of_dotted_neighbour() {
        let dir = tempfile::tempdir().unwrap();
        let manager = test_manager(dir.path(), fake_capture_binary());

        manager.start_capture("a", 1).await;
        manager.start_capture("a.pcap1", 1).await;
        wait_for_files(dir.path(), "a").await;
        wait_for_files(dir.path(), "a.pcap1").await;

        assert!(manager.stop_capture("a").await);

        assert_eq!(capture_files(dir.path(), "a"), 0);
        assert!(manager.is_capturing("a.pcap1").await);
        assert_eq!(capture_files(dir.path(), "a.pcap1"), 2);

        manager.stop_all().await;
        assert_eq!(capture_files(dir.path(), "a.pcap1"), 0);
    }

    #[tokio::test]
    async fn test_stop_all() {
        let dir = tempfile::tempdir().unwrap();
        let manager = test_manager(dir.path(), fake_capture_binary());

        manager.start_capture("web-0", 1).await;
        manager.start_capture("db-0", 3).await;
        wait_for_files(dir.path(), "web-0").await;
        wait_for_files(dir.path(), "db-0").await;

        manager.stop_all().await;

        assert!(!manager.is_capturing("web-0").await);
        assert!(!manager.is_capturing("db-0").await);
        assert_eq!(capture_files(dir.path(), "web-0"), 0);
        assert_eq!(capture_files(dir.path(), "db-0"), 0);
    }

    #[tokio::test]
    async fn test_concurrent_starts_track_one_process() {
        let dir = tempfile::tempdir().unwrap();
        let manager = test_manager(dir.path(), fake_capture_binary());

        let results = join_all((0..8).map(|_| manager.start_capture("web-0", 1))).await;
        assert_eq!(results.iter().filter(|started| **started).count(), 1);

        manager.stop_all().await;
    }

    #[tokio::test]
    async fn test_reap_exited() {
        let dir = tempfile::tempdir().unwrap();
        fake_capture_binary();
        // `true` exits immediately, like a capture process that crashed
        let manager = test_manager(dir.path(), Path::new("true"));

        assert!(manager.start_capture("web-0", 1).await);
        std::fs::write(dir.path().join("capture-web-0.pcap"), b"").unwrap();

        let mut reaped = Vec::new();
        for _ in 0..100 {
            reaped = manager.reap_exited().await;
            if !reaped.is_empty() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }

        assert_eq!(reaped, vec!["web-0".to_string()]);
        assert!(!manager.is_capturing("web-0").await);
        assert_eq!(capture_files(dir.path(), "web-0"), 0);
    }

    #[tokio::test]
    async fn test_reap_keeps_running_captures() {
        let dir = tempfile::tempdir().unwrap();
        let manager = test_manager(dir.path(), fake_capture_binary());

        manager.start_capture("web-0", 1).await;
        assert!(manager.reap_exited().await.is_empty());
        assert!(manager.is_capturing("web-0").await);

        manager.stop_all().await;
    }
}
