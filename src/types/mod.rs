// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0

//! Pod-facing value types shared by the watcher and the reconciler.

pub mod pod;

pub use pod::{parse_max_files, DeletedPod, DesiredIntent, PodEvent, PodRef};
