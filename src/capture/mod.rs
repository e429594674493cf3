// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0

//! Capture process supervision and artifact cleanup.

pub mod command;
pub mod manager;

pub use command::{CaptureCommand, CaptureSettings};
pub use manager::CaptureManager;
