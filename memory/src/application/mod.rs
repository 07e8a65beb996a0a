// Copyright (c) 2026 Mnemograph contributors
// SPDX-License-Identifier: AGPL-3.0

//! Application layer for the memory bounded context

use async_trait::async_trait;

use crate::domain::{MemoryEvent, Result};

/// Event bus trait for publishing domain events.
#[async_trait]
pub trait EventBus: Send + Sync {
    async fn publish(&self, event: MemoryEvent) -> Result<()>;
}

pub mod dedup;
pub mod memory_engine;
pub mod patterns;
pub mod relevance;
pub mod summarizer;
pub mod sweeper;

pub use dedup::{BatchOutcome, DedupConfig, DedupEngine, DedupOutcome};
pub use memory_engine::{AddEpisodeOutcome, MemoryConfig, MemoryEngine};
pub use patterns::{
    AdoptionStats, DetectionOutcome, PatternConfig, PatternEngine, PatternRecommendation,
};
pub use relevance::{
    AgentContext, MemoryQuery, NoopPatternProvider, PatternProvider, QueryResult, RelevanceConfig,
    RelevanceEngine, ScoredEpisode,
};
pub use summarizer::{SummarizationOutcome, Summarizer, SummarizerConfig};
pub use sweeper::{MemorySweeper, SweepTarget, SweeperConfig};
