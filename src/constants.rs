// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0

/// Kubernetes annotation keys used by the capture controller
pub mod annotations {
    /// Presence requests a capture; the value is the number of rotated files to keep
    pub const CAPTURE: &str = "tcpdump.antrea.io";
}

/// Environment variables read at startup
pub mod env {
    pub const NODE_NAME: &str = "NODE_NAME";
    pub const CAPTURE_DIR: &str = "CAPTURE_DIR";
    pub const CAPTURE_BINARY: &str = "CAPTURE_BINARY";
    pub const CAPTURE_ROTATE_MB: &str = "CAPTURE_ROTATE_MB";
    pub const CAPTURE_INTERFACE: &str = "CAPTURE_INTERFACE";
    pub const LIVENESS_INTERVAL_SECS: &str = "LIVENESS_INTERVAL_SECS";
    pub const SHUTDOWN_TIMEOUT_SECS: &str = "SHUTDOWN_TIMEOUT_SECS";
}

/// Capture process defaults
pub mod capture {
    pub const DEFAULT_DIR: &str = "/capture";
    pub const DEFAULT_BINARY: &str = "tcpdump";
    /// Rotation threshold in millions of bytes (tcpdump `-C` units)
    pub const DEFAULT_ROTATE_MB: u64 = 1;
    pub const DEFAULT_INTERFACE: &str = "any";
    /// Retained files when the annotation value is not a positive integer
    pub const DEFAULT_MAX_FILES: u32 = 1;
    pub const FILE_PREFIX: &str = "capture-";
    pub const FILE_SUFFIX: &str = ".pcap";
}

/// Liveness sweep configuration
pub mod liveness {
    /// Default interval in seconds between checks for capture processes that exited on their own
    pub const DEFAULT_INTERVAL_SECS: u64 = 30;
}
