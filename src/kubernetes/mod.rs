// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0

//! Kubernetes event source for the pods on this node.

pub mod pods;

pub use pods::{pod_events, PodEventTranslator};
