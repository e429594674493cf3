// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0

//! Reconcilers that react to pod events.

pub mod pod;

pub use pod::{Convergence, PodReconciler};
