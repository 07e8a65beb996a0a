// Copyright (c) 2026 Mnemograph contributors
// SPDX-License-Identifier: AGPL-3.0

//! Infrastructure layer for the memory bounded context

pub mod event_bus;
pub mod graph_repositories;
pub mod graph_store;
pub mod memory_repositories;
pub mod repository;

pub use event_bus::{BroadcastEventBus, EventBusError, EventReceiver, NoopEventBus};
pub use graph_repositories::{
    GraphEpisodeRepository, GraphPatternRepository, GraphSummaryRepository,
};
pub use graph_store::{GraphConfig, GraphHealth, GraphStats, GraphStore};
pub use memory_repositories::{
    InMemoryEpisodeRepository, InMemoryPatternRepository, InMemorySummaryRepository,
};
pub use repository::{EpisodeRepository, PatternFilter, PatternRepository, SummaryRepository};
