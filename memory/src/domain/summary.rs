// Copyright (c) 2026 Mnemograph contributors
// SPDX-License-Identifier: AGPL-3.0

//! Consolidation summaries — one per project per calendar month
//!
//! # Architecture
//!
//! - **Layer:** Domain Layer
//! - **Purpose:** MemorySummary entity and UTC month arithmetic

use chrono::{DateTime, Datelike, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::fmt;
use uuid::Uuid;

use super::episode::EpisodeId;

/// Summary identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SummaryId(pub Uuid);

impl SummaryId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for SummaryId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for SummaryId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// UTC calendar-month key, used to bucket episodes for consolidation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct MonthKey {
    pub year: i32,
    pub month: u32,
}

impl MonthKey {
    pub fn of(ts: DateTime<Utc>) -> Self {
        Self {
            year: ts.year(),
            month: ts.month(),
        }
    }

    /// Inclusive start and exclusive end of the month.
    pub fn bounds(&self) -> (DateTime<Utc>, DateTime<Utc>) {
        let start = Utc
            .with_ymd_and_hms(self.year, self.month, 1, 0, 0, 0)
            .single()
            .expect("first day of month is a valid instant");
        let (next_year, next_month) = if self.month == 12 {
            (self.year + 1, 1)
        } else {
            (self.year, self.month + 1)
        };
        let end = Utc
            .with_ymd_and_hms(next_year, next_month, 1, 0, 0, 0)
            .single()
            .expect("first day of month is a valid instant");
        (start, end)
    }
}

impl fmt::Display for MonthKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:04}-{:02}", self.year, self.month)
    }
}

/// A derived, append-only consolidation of one project's episodes for one
/// calendar month.
///
/// At most one summary exists per `(project_id, workspace_id, period_start,
/// period_end)`; repeated consolidation runs merge into the existing row
/// instead of duplicating it. Summaries are never deleted.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MemorySummary {
    pub id: SummaryId,
    pub project_id: String,
    pub workspace_id: String,
    pub period_start: DateTime<Utc>,
    pub period_end: DateTime<Utc>,
    pub original_episode_count: usize,
    pub summary: String,
    /// Decision contents preserved verbatim — decisions are excluded from
    /// consolidation but must not be lost.
    pub key_decisions: Vec<String>,
    pub key_patterns: Vec<String>,
    pub archived_episode_ids: Vec<EpisodeId>,
    pub summarization_model: String,
    pub created_at: DateTime<Utc>,
    pub metadata: HashMap<String, Value>,
}

impl MemorySummary {
    /// Merge a newer consolidation run for the same period into this summary.
    ///
    /// Counts accumulate, id/decision/pattern sets union, the newest summary
    /// text wins.
    pub fn merge_from(&mut self, newer: &MemorySummary) {
        self.original_episode_count += newer.original_episode_count;
        self.summary = newer.summary.clone();
        for decision in &newer.key_decisions {
            if !self.key_decisions.contains(decision) {
                self.key_decisions.push(decision.clone());
            }
        }
        for pattern in &newer.key_patterns {
            if !self.key_patterns.contains(pattern) {
                self.key_patterns.push(pattern.clone());
            }
        }
        for id in &newer.archived_episode_ids {
            if !self.archived_episode_ids.contains(id) {
                self.archived_episode_ids.push(*id);
            }
        }
        for (key, value) in &newer.metadata {
            self.metadata.insert(key.clone(), value.clone());
        }
    }
}
