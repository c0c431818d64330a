// Copyright 2026 Streamprobe Contributors
// SPDX-License-Identifier: Apache-2.0

//! Job event bus — typed lifecycle events from the scheduler and registry.
//!
//! The EventBus is a `tokio::sync::broadcast` channel that carries
//! [`JobEvent`] values. The REST SSE endpoint and log consumers subscribe
//! independently. When no subscribers exist, events are silently dropped.

use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

/// Every event the job subsystem emits. Serialized to JSON for SSE.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum JobEvent {
    // ── Job Events ────────────────────────
    /// A job was created in `Pending`.
    JobScheduled {
        id: u64,
        source_url: String,
        generation: u64,
    },
    /// A browser session was started for the job.
    JobStarted { id: u64, generation: u64 },
    /// The job finished with at least one manifest link.
    JobCompleted {
        id: u64,
        generation: u64,
        link_count: usize,
        elapsed_ms: u64,
    },
    /// The job finished without a usable link.
    JobFailed {
        id: u64,
        generation: u64,
        reason: String,
        elapsed_ms: u64,
    },

    // ── Search Events ─────────────────────
    /// A new search replaced the tables.
    SearchReset { generation: u64, entries: usize },
}

/// Fan-out channel for [`JobEvent`]s.
pub struct EventBus {
    sender: broadcast::Sender<JobEvent>,
}

impl EventBus {
    /// Create a new event bus with the given buffer capacity.
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    /// Emit an event to all subscribers. Silently ignores if no subscribers.
    pub fn emit(&self, event: JobEvent) {
        let _ = self.sender.send(event);
    }

    /// Subscribe to receive all future events.
    pub fn subscribe(&self) -> broadcast::Receiver<JobEvent> {
        self.sender.subscribe()
    }
}

/// Check if an event concerns a specific item id.
pub fn event_matches_id(event: &JobEvent, item: u64) -> bool {
    match event {
        JobEvent::JobScheduled { id, .. }
        | JobEvent::JobStarted { id, .. }
        | JobEvent::JobCompleted { id, .. }
        | JobEvent::JobFailed { id, .. } => *id == item,
        // Resets invalidate every id, so every subscriber sees them.
        JobEvent::SearchReset { .. } => true,
    }
}
