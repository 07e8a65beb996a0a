// Copyright (c) 2026 Mnemograph contributors
// SPDX-License-Identifier: AGPL-3.0

//! Domain events for the memory bounded context
//!
//! Sweep jobs emit a completion event on every run, success or failure, so
//! callers always observe an outcome (including partial progress).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::pattern::PatternId;

/// Events published to the audit/event sink.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum MemoryEvent {
    /// A summarization run finished (possibly skipped or partially failed).
    SummarizationCompleted {
        project_id: String,
        workspace_id: String,
        skipped: bool,
        summaries_created: usize,
        episodes_archived: usize,
        episodes_processed: usize,
        duration_ms: u64,
        errors: Vec<String>,
        timestamp: DateTime<Utc>,
    },

    /// A workspace-wide pattern detection sweep finished.
    PatternDetectionCompleted {
        workspace_id: String,
        projects_scanned: usize,
        comparisons: usize,
        new_patterns: usize,
        updated_patterns: usize,
        truncated: bool,
        duration_ms: u64,
        errors: Vec<String>,
        timestamp: DateTime<Utc>,
    },

    /// A human overrode a pattern.
    PatternOverridden {
        pattern_id: PatternId,
        workspace_id: String,
        overridden_by: String,
        reason: String,
        timestamp: DateTime<Utc>,
    },

    /// A previously overridden pattern was restored.
    PatternRestored {
        pattern_id: PatternId,
        workspace_id: String,
        timestamp: DateTime<Utc>,
    },
}

impl MemoryEvent {
    pub fn timestamp(&self) -> DateTime<Utc> {
        match self {
            MemoryEvent::SummarizationCompleted { timestamp, .. } => *timestamp,
            MemoryEvent::PatternDetectionCompleted { timestamp, .. } => *timestamp,
            MemoryEvent::PatternOverridden { timestamp, .. } => *timestamp,
            MemoryEvent::PatternRestored { timestamp, .. } => *timestamp,
        }
    }

    pub fn event_type(&self) -> &'static str {
        match self {
            MemoryEvent::SummarizationCompleted { .. } => "summarization_completed",
            MemoryEvent::PatternDetectionCompleted { .. } => "pattern_detection_completed",
            MemoryEvent::PatternOverridden { .. } => "pattern_overridden",
            MemoryEvent::PatternRestored { .. } => "pattern_restored",
        }
    }
}
