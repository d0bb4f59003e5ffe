// Copyright (c) 2026 Forgebase Contributors
// SPDX-License-Identifier: Apache-2.0
//! HTTP host for `orchestrator-core`: spec submission, resource queries,
//! retry endpoints, and log streaming (spec.md §2).
//!
//! This crate owns the process: environment parsing, tracing
//! initialization, and the `main` loop all live here. `orchestrator-core`
//! never touches the environment or a global subscriber on its own.

pub mod config;
pub mod http;
pub mod state;
