// Copyright (c) 2026 Mnemograph contributors
// SPDX-License-Identifier: AGPL-3.0

//! Background memory sweeper
//!
//! Periodically runs threshold-gated consolidation per project and one
//! pattern detection sweep per workspace. Supports graceful shutdown via a
//! cancellation token.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::interval;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::application::{PatternEngine, Summarizer};

/// One project to consolidate during a sweep cycle.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SweepTarget {
    pub project_id: String,
    pub workspace_id: String,
}

/// Configuration for the background sweeper.
#[derive(Debug, Clone)]
pub struct SweeperConfig {
    /// How often to run a sweep cycle (in seconds).
    pub interval_seconds: u64,
    /// Whether sweeping is enabled.
    pub enabled: bool,
    /// Projects to consolidate each cycle.
    pub targets: Vec<SweepTarget>,
}

impl Default for SweeperConfig {
    fn default() -> Self {
        Self {
            interval_seconds: 3600,
            enabled: true,
            targets: Vec::new(),
        }
    }
}

/// Background task driving the summarizer and pattern engine.
pub struct MemorySweeper {
    summarizer: Arc<Summarizer>,
    patterns: Arc<PatternEngine>,
    config: SweeperConfig,
    shutdown_token: CancellationToken,
}

impl MemorySweeper {
    pub fn new(
        summarizer: Arc<Summarizer>,
        patterns: Arc<PatternEngine>,
        config: SweeperConfig,
    ) -> Self {
        Self {
            summarizer,
            patterns,
            config,
            shutdown_token: CancellationToken::new(),
        }
    }

    /// Get a handle to trigger shutdown.
    pub fn shutdown_token(&self) -> CancellationToken {
        self.shutdown_token.clone()
    }

    /// Start the sweeper background task.
    pub fn start(self: Arc<Self>) -> tokio::task::JoinHandle<()> {
        tokio::spawn(async move {
            self.run().await;
        })
    }

    async fn run(&self) {
        if !self.config.enabled {
            info!("memory sweeper is disabled");
            return;
        }

        info!(
            interval_seconds = self.config.interval_seconds,
            targets = self.config.targets.len(),
            "starting memory sweeper background task"
        );

        let mut tick = interval(Duration::from_secs(self.config.interval_seconds));

        loop {
            tokio::select! {
                _ = tick.tick() => {
                    debug!("running memory sweep cycle");
                    self.sweep_cycle().await;
                }
                _ = self.shutdown_token.cancelled() => {
                    info!("shutdown signal received, stopping memory sweeper");
                    break;
                }
            }
        }

        info!("memory sweeper background task stopped");
    }

    /// One cycle: threshold-gated consolidation per target project, then one
    /// pattern sweep per distinct workspace. Failures are logged and the
    /// cycle continues; both engines emit their own completion events.
    pub async fn sweep_cycle(&self) {
        for target in &self.config.targets {
            match self
                .summarizer
                .check_and_summarize(&target.project_id, &target.workspace_id)
                .await
            {
                Ok(outcome) if !outcome.skipped => {
                    info!(
                        project_id = %target.project_id,
                        summaries = outcome.summaries_created,
                        archived = outcome.episodes_archived,
                        "sweep consolidated a project"
                    );
                }
                Ok(_) => {}
                Err(err) => {
                    warn!(project_id = %target.project_id, error = %err, "sweep consolidation failed");
                }
            }
        }

        let workspaces: HashSet<&str> = self
            .config
            .targets
            .iter()
            .map(|t| t.workspace_id.as_str())
            .collect();
        for workspace_id in workspaces {
            if let Err(err) = self.patterns.detect_patterns(workspace_id).await {
                warn!(workspace_id, error = %err, "sweep pattern detection failed");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::{PatternConfig, SummarizerConfig};
    use crate::domain::{MemoryEvent, Result};
    use crate::infrastructure::{
        InMemoryEpisodeRepository, InMemoryPatternRepository, InMemorySummaryRepository,
    };
    use async_trait::async_trait;
    use std::sync::Mutex;

    struct MockEventBus {
        events: Mutex<Vec<MemoryEvent>>,
    }

    impl MockEventBus {
        fn new() -> Self {
            Self {
                events: Mutex::new(Vec::new()),
            }
        }
    }

    #[async_trait]
    impl crate::application::EventBus for MockEventBus {
        async fn publish(&self, event: MemoryEvent) -> Result<()> {
            self.events.lock().unwrap().push(event);
            Ok(())
        }
    }

    fn sweeper(config: SweeperConfig) -> (MemorySweeper, Arc<MockEventBus>) {
        let episodes = Arc::new(InMemoryEpisodeRepository::new());
        let summaries = Arc::new(InMemorySummaryRepository::new());
        let patterns = Arc::new(InMemoryPatternRepository::new());
        let bus = Arc::new(MockEventBus::new());
        let summarizer = Arc::new(Summarizer::new(
            episodes.clone(),
            summaries,
            bus.clone(),
            SummarizerConfig::default(),
        ));
        let engine = Arc::new(PatternEngine::new(
            episodes,
            patterns,
            bus.clone(),
            PatternConfig::default(),
        ));
        (MemorySweeper::new(summarizer, engine, config), bus)
    }

    #[tokio::test]
    async fn test_cycle_emits_events_per_target() {
        let (sweeper, bus) = sweeper(SweeperConfig {
            interval_seconds: 1,
            enabled: true,
            targets: vec![
                SweepTarget {
                    project_id: "p1".into(),
                    workspace_id: "w1".into(),
                },
                SweepTarget {
                    project_id: "p2".into(),
                    workspace_id: "w1".into(),
                },
            ],
        });

        sweeper.sweep_cycle().await;

        // Two consolidation events (both skipped) and one detection event for
        // the shared workspace.
        let events = bus.events.lock().unwrap();
        let summarizations = events
            .iter()
            .filter(|e| e.event_type() == "summarization_completed")
            .count();
        let detections = events
            .iter()
            .filter(|e| e.event_type() == "pattern_detection_completed")
            .count();
        assert_eq!(summarizations, 2);
        assert_eq!(detections, 1);
    }

    #[tokio::test]
    async fn test_disabled_sweeper_exits_immediately() {
        let (sweeper, _) = sweeper(SweeperConfig {
            enabled: false,
            ..SweeperConfig::default()
        });
        let handle = Arc::new(sweeper).start();
        handle.await.unwrap();
    }

    #[tokio::test]
    async fn test_shutdown_token_stops_the_loop() {
        let (sweeper, _) = sweeper(SweeperConfig {
            interval_seconds: 3600,
            enabled: true,
            targets: vec![],
        });
        let sweeper = Arc::new(sweeper);
        let token = sweeper.shutdown_token();
        let handle = sweeper.start();
        token.cancel();
        handle.await.unwrap();
    }
}
