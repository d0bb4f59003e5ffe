// Copyright (c) 2026 Forgebase Contributors
// SPDX-License-Identifier: Apache-2.0
//! # orchestrator-core
//!
//! The orchestration core: it owns the resource/workflow data model, the
//! provider registry and resolver, the workflow executor, the orchestration
//! engine, and the dependency graph projection. Everything above the
//! persistence boundary is backend-agnostic (PostgreSQL or SQLite).
//!
//! ## Layer structure
//!
//! ```text
//! application/    ← use-cases: resolver, registry, executor, engine, graph
//!     ↓
//! domain/         ← aggregates, value objects, repository traits
//!     ↓
//! infrastructure/ ← Postgres/SQLite repos, YAML parsers, provider loader, step runners
//! ```
//!
//! `domain` types are pure data plus invariant-enforcing constructors; they
//! do not know about SQL or YAML. `application` types hold `Arc<dyn Trait>`
//! repository handles and orchestrate use-cases. `infrastructure` supplies
//! the concrete repository and parser implementations.
//!
//! This crate has no HTTP surface of its own — see the `server` crate for
//! the thin adapter that submits specs, lists resources, and streams logs.

pub mod domain;
pub mod application;
pub mod infrastructure;
pub mod error;

pub use error::CoreError;
