// Copyright (c) 2026 Forgebase Contributors
// SPDX-License-Identifier: Apache-2.0
//! Orchestration engine wake signal (spec.md §4.7).
//!
//! A bare [`tokio::sync::Notify`] shared between whatever inserts
//! `requested` resources (the spec submission HTTP handler, retries) and
//! the engine's poll loop, so a newly submitted resource doesn't have to
//! wait out a full `poll_interval` before its first claim attempt.

use std::sync::Arc;
use tokio::sync::Notify;

pub type WakeSignal = Arc<Notify>;

pub fn new_wake_signal() -> WakeSignal {
    Arc::new(Notify::new())
}
