// Copyright (c) 2026 Forgebase Contributors
// SPDX-License-Identifier: Apache-2.0
//! Live log streaming (spec.md §4.6.7, §5 "stream logs").
//!
//! Log lines are both persisted (via `StepExecutionRepository::append_log`)
//! and published here for anyone subscribed to that execution's SSE
//! endpoint. Publishing is in-memory only and best-effort: a line published
//! before a subscriber connects is simply not seen by that subscriber — the
//! persisted `output_logs` column is the source of truth for anything that
//! must survive a restart or a late subscriber.

use dashmap::DashMap;
use std::sync::Arc;
use tokio::sync::broadcast;

use crate::application::executor::LogPublisher;
use crate::domain::execution::WorkflowExecutionId;

const CHANNEL_CAPACITY: usize = 1024;

#[derive(Debug, Clone)]
pub struct LogLine {
    pub step_name: String,
    pub line: String,
}

/// Broadcast hub keyed by execution id. Channels are created lazily on
/// first publish or first subscribe and dropped once every sender and
/// receiver side is gone.
pub struct PubsubLogPublisher {
    channels: DashMap<WorkflowExecutionId, broadcast::Sender<LogLine>>,
}

impl Default for PubsubLogPublisher {
    fn default() -> Self {
        Self::new()
    }
}

impl PubsubLogPublisher {
    pub fn new() -> Self {
        Self { channels: DashMap::new() }
    }

    fn sender(&self, execution_id: WorkflowExecutionId) -> broadcast::Sender<LogLine> {
        self.channels.entry(execution_id).or_insert_with(|| broadcast::channel(CHANNEL_CAPACITY).0).clone()
    }

    pub fn subscribe(&self, execution_id: WorkflowExecutionId) -> broadcast::Receiver<LogLine> {
        self.sender(execution_id).subscribe()
    }
}

impl LogPublisher for PubsubLogPublisher {
    fn publish(&self, execution_id: WorkflowExecutionId, step_name: &str, line: &str) {
        let sender = self.sender(execution_id);
        // No receivers is the overwhelmingly common case (nobody has the
        // logs page open); `send` erroring there is expected, not a fault.
        let _ = sender.send(LogLine { step_name: step_name.to_string(), line: line.to_string() });
    }
}

pub type SharedPubsub = Arc<PubsubLogPublisher>;
