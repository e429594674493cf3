// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0
use crate::constants::{annotations, capture::DEFAULT_MAX_FILES};
use k8s_openapi::api::core::v1::Pod;
use std::collections::BTreeMap;

/// The parts of a pod the controller looks at
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PodRef {
    /// Capture key; unique among the pods of one node
    pub name: String,
    /// Only used for logging
    pub namespace: String,
    pub annotations: BTreeMap<String, String>,
}

impl PodRef {
    /// Extract identity and annotations. Returns `None` for a pod without a name.
    pub fn from_pod(pod: &Pod) -> Option<Self> {
        let name = pod.metadata.name.clone()?;
        Some(Self {
            name,
            namespace: pod.metadata.namespace.clone().unwrap_or_default(),
            annotations: pod.metadata.annotations.clone().unwrap_or_default(),
        })
    }

    pub fn intent(&self) -> DesiredIntent {
        DesiredIntent::from_annotations(&self.annotations)
    }
}

/// A delete notification, either carrying the pod as it was removed or only
/// the last state seen before the deletion was missed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeletedPod {
    Live(PodRef),
    Tombstone(PodRef),
}

impl DeletedPod {
    pub fn pod(&self) -> &PodRef {
        match self {
            DeletedPod::Live(pod) | DeletedPod::Tombstone(pod) => pod,
        }
    }
}

/// Notifications fed to the reconciler
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PodEvent {
    /// Pod was created or updated
    Applied(PodRef),
    Deleted(DeletedPod),
}

/// Capture state implied by a pod's annotations. Recomputed for every event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DesiredIntent {
    Absent,
    Present { max_files: u32 },
}

impl DesiredIntent {
    pub fn from_annotations(values: &BTreeMap<String, String>) -> Self {
        match values.get(annotations::CAPTURE) {
            Some(value) => DesiredIntent::Present {
                max_files: parse_max_files(value),
            },
            None => DesiredIntent::Absent,
        }
    }
}

/// Number of rotated files to keep. Anything that is not a positive integer
/// (including values too large to represent) falls back to one file.
pub fn parse_max_files(value: &str) -> u32 {
    value
        .parse::<i64>()
        .ok()
        .filter(|n| *n > 0)
        .and_then(|n| u32::try_from(n).ok())
        .unwrap_or(DEFAULT_MAX_FILES)
}
