// Copyright (c) 2026 Mnemograph contributors
// SPDX-License-Identifier: AGPL-3.0
//! Temporal memory engine for AI agents
//!
//! Records discrete observations ("episodes") made by agents working on
//! software projects, retrieves the most relevant ones for a new task,
//! deduplicates near-identical observations, consolidates old ones into
//! monthly summaries, and mines patterns that recur across the projects of a
//! workspace.
//!
//! # Architecture
//!
//! - **Domain:** episode/summary/pattern entities, text similarity, events
//! - **Application:** dedup gate, relevance queries, summarizer, pattern
//!   engine, background sweeper, [`MemoryEngine`] facade
//! - **Infrastructure:** Neo4j graph store adapter plus graph-backed and
//!   in-memory repositories, event bus

pub mod application;
pub mod domain;
pub mod infrastructure;

pub use application::*;
pub use domain::*;
pub use infrastructure::*;
