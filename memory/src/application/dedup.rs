// Copyright (c) 2026 Mnemograph contributors
// SPDX-License-Identifier: AGPL-3.0

//! Deduplication engine
//!
//! Compares incoming episode content against recent episodes of the same
//! project and type using token-set Jaccard similarity. Exact or near
//! duplicates (>= 0.95) are rejected in favor of the existing episode;
//! strong overlaps (>= 0.8) are accepted but flagged for review.
//!
//! The check fails open: if the candidate fetch errors, the write proceeds.
//! Losing a duplicate check is cheaper than losing a memory.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tracing::{debug, warn};

use crate::domain::text::{jaccard, token_set};
use crate::domain::{Episode, EpisodeFilter, EpisodeId, EpisodeInput, EpisodeType, Result};
use crate::infrastructure::EpisodeRepository;

/// Similarity thresholds and candidate bounds for duplicate detection.
#[derive(Debug, Clone)]
pub struct DedupConfig {
    /// At or above this similarity the new episode is rejected as a duplicate.
    pub duplicate_threshold: f64,
    /// At or above this similarity (but below `duplicate_threshold`) the new
    /// episode is accepted and flagged.
    pub flag_threshold: f64,
    /// How many recent same-type episodes to compare against.
    pub candidate_limit: usize,
}

impl Default for DedupConfig {
    fn default() -> Self {
        Self {
            duplicate_threshold: 0.95,
            flag_threshold: 0.8,
            candidate_limit: 500,
        }
    }
}

/// Result of a duplicate check for one incoming episode.
#[derive(Debug, Clone, PartialEq)]
pub enum DedupOutcome {
    /// No overlapping episode found; store as-is.
    Unique,
    /// Accepted, but an existing episode overlaps strongly.
    Flagged {
        duplicate_of: EpisodeId,
        score: f64,
    },
    /// Rejected; the existing episode already covers this content.
    Duplicate {
        existing_id: EpisodeId,
        score: f64,
    },
}

type PoolKey = (String, String, EpisodeType);

/// Summary of a batch ingestion pass.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BatchOutcome {
    pub accepted: usize,
    pub flagged: usize,
    pub skipped: usize,
}

/// Duplicate detection over an [`EpisodeRepository`].
pub struct DedupEngine {
    episodes: Arc<dyn EpisodeRepository>,
    config: DedupConfig,
}

impl DedupEngine {
    pub fn new(episodes: Arc<dyn EpisodeRepository>, config: DedupConfig) -> Self {
        Self { episodes, config }
    }

    pub fn config(&self) -> &DedupConfig {
        &self.config
    }

    /// Check one incoming episode against stored candidates.
    ///
    /// Fails open: a candidate fetch error logs a warning and returns
    /// [`DedupOutcome::Unique`].
    pub async fn check_duplicate(&self, input: &EpisodeInput) -> DedupOutcome {
        let filter = EpisodeFilter::scoped(&input.project_id, &input.workspace_id)
            .with_types(vec![input.episode_type])
            .with_limit(self.config.candidate_limit);
        let candidates = match self.episodes.search_episodes(&filter).await {
            Ok(candidates) => candidates,
            Err(err) => {
                warn!(error = %err, "duplicate check failed; accepting episode");
                return DedupOutcome::Unique;
            }
        };
        self.best_match(&input.content, candidates.iter().map(|e| (e.id, &e.content)))
    }

    /// Rank stored candidates against `content` and map the best similarity
    /// to an outcome.
    fn best_match<'a>(
        &self,
        content: &str,
        candidates: impl Iterator<Item = (EpisodeId, &'a String)>,
    ) -> DedupOutcome {
        let incoming = token_set(content);
        let mut best: Option<(EpisodeId, f64)> = None;
        for (id, existing) in candidates {
            let score = jaccard(&incoming, &token_set(existing));
            if best.map_or(true, |(_, s)| score > s) {
                best = Some((id, score));
            }
        }
        match best {
            Some((id, score)) if score >= self.config.duplicate_threshold => {
                debug!(existing = %id, score, "rejecting duplicate episode");
                DedupOutcome::Duplicate {
                    existing_id: id,
                    score,
                }
            }
            Some((id, score)) if score >= self.config.flag_threshold => DedupOutcome::Flagged {
                duplicate_of: id,
                score,
            },
            _ => DedupOutcome::Unique,
        }
    }

    /// Ingest a batch of inputs. Existing candidates are fetched once per
    /// distinct `(project, workspace, type)` scope, and each input is also
    /// compared against the members of the batch already accepted in the same
    /// scope (earlier entries win). Inputs of different tenants never see each
    /// other's candidates.
    pub async fn deduplicate_batch(&self, inputs: Vec<EpisodeInput>) -> Result<BatchOutcome> {
        let mut outcome = BatchOutcome::default();
        // Per-scope candidate pool, pre-fetched then extended with accepted
        // batch members.
        let mut pools: HashMap<PoolKey, Vec<(EpisodeId, HashSet<String>)>> = HashMap::new();

        for input in inputs {
            input.validate()?;
            let key = (
                input.project_id.clone(),
                input.workspace_id.clone(),
                input.episode_type,
            );
            if !pools.contains_key(&key) {
                let filter = EpisodeFilter::scoped(&input.project_id, &input.workspace_id)
                    .with_types(vec![input.episode_type])
                    .with_limit(self.config.candidate_limit);
                let existing = match self.episodes.search_episodes(&filter).await {
                    Ok(existing) => existing,
                    Err(err) => {
                        warn!(error = %err, "batch candidate fetch failed; continuing without stored candidates");
                        Vec::new()
                    }
                };
                pools.insert(
                    key.clone(),
                    existing
                        .into_iter()
                        .map(|e| (e.id, token_set(&e.content)))
                        .collect(),
                );
            }

            let incoming = token_set(&input.content);
            let pool = pools.entry(key).or_default();
            let best = pool
                .iter()
                .map(|(id, tokens)| (*id, jaccard(&incoming, tokens)))
                .max_by(|a, b| a.1.total_cmp(&b.1));

            match best {
                Some((_, score)) if score >= self.config.duplicate_threshold => {
                    outcome.skipped += 1;
                }
                Some((id, score)) if score >= self.config.flag_threshold => {
                    let mut episode = Episode::from_input(input);
                    episode.metadata.duplicate_of = Some(id);
                    episode.metadata.duplicate_score = Some(score);
                    self.episodes.add_episode(&episode).await?;
                    pool.push((episode.id, incoming));
                    outcome.accepted += 1;
                    outcome.flagged += 1;
                }
                _ => {
                    let episode = Episode::from_input(input);
                    self.episodes.add_episode(&episode).await?;
                    pool.push((episode.id, incoming));
                    outcome.accepted += 1;
                }
            }
        }
        Ok(outcome)
    }
}
