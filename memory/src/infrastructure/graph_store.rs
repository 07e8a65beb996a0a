// Copyright (c) 2026 Mnemograph contributors
// SPDX-License-Identifier: AGPL-3.0

//! Neo4j graph store adapter
//!
//! Owns the driver lifecycle, schema bootstrap and query execution. A failed
//! connection leaves the adapter disabled rather than crashing the host:
//! callers check [`GraphStore::is_connected`] and degrade (skip memory
//! features) instead of failing their request.

use futures::future::BoxFuture;
use neo4rs::{query, Graph, Query, Row, Txn};
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

use crate::domain::{MemoryError, Result};

/// Connection settings for the graph store.
#[derive(Debug, Clone)]
pub struct GraphConfig {
    pub uri: String,
    pub user: String,
    pub password: String,
}

impl Default for GraphConfig {
    fn default() -> Self {
        Self {
            uri: "bolt://localhost:7687".into(),
            user: "neo4j".into(),
            password: "neo4j".into(),
        }
    }
}

/// Health snapshot reported to hosts.
#[derive(Debug, Clone, serde::Serialize)]
pub struct GraphHealth {
    pub status: &'static str,
    pub connected: bool,
}

/// Node counts per label, for operational dashboards.
#[derive(Debug, Clone, Default, serde::Serialize)]
pub struct GraphStats {
    pub available: bool,
    pub episodes: u64,
    pub entities: u64,
    pub summaries: u64,
    pub patterns: u64,
    pub projects: u64,
    pub workspaces: u64,
}

/// Uniqueness constraints and secondary indexes created at bootstrap.
///
/// All statements are idempotent (`IF NOT EXISTS`); merge-on-conflict
/// semantics across concurrent sweeps depend on them being in place.
const SCHEMA_STATEMENTS: &[&str] = &[
    "CREATE CONSTRAINT episode_id IF NOT EXISTS FOR (e:Episode) REQUIRE e.id IS UNIQUE",
    "CREATE CONSTRAINT entity_id IF NOT EXISTS FOR (n:EntityRef) REQUIRE n.id IS UNIQUE",
    "CREATE CONSTRAINT project_id IF NOT EXISTS FOR (p:Project) REQUIRE p.id IS UNIQUE",
    "CREATE CONSTRAINT workspace_id IF NOT EXISTS FOR (w:Workspace) REQUIRE w.id IS UNIQUE",
    "CREATE CONSTRAINT pattern_id IF NOT EXISTS FOR (p:WorkspacePattern) REQUIRE p.id IS UNIQUE",
    "CREATE CONSTRAINT summary_id IF NOT EXISTS FOR (s:MemorySummary) REQUIRE s.id IS UNIQUE",
    "CREATE INDEX episode_project IF NOT EXISTS FOR (e:Episode) ON (e.project_id, e.workspace_id)",
    "CREATE INDEX episode_timestamp IF NOT EXISTS FOR (e:Episode) ON (e.timestamp)",
    "CREATE INDEX episode_type IF NOT EXISTS FOR (e:Episode) ON (e.episode_type)",
    "CREATE INDEX entity_name IF NOT EXISTS FOR (n:EntityRef) ON (n.name, n.project_id, n.workspace_id)",
    "CREATE INDEX pattern_workspace IF NOT EXISTS FOR (p:WorkspacePattern) ON (p.workspace_id)",
    "CREATE INDEX pattern_type IF NOT EXISTS FOR (p:WorkspacePattern) ON (p.pattern_type)",
    "CREATE INDEX pattern_confidence IF NOT EXISTS FOR (p:WorkspacePattern) ON (p.confidence)",
    "CREATE INDEX summary_period IF NOT EXISTS FOR (s:MemorySummary) ON (s.project_id, s.workspace_id, s.period_start)",
];

/// Driver wrapper with disabled-not-crashed degradation.
pub struct GraphStore {
    config: GraphConfig,
    graph: RwLock<Option<Graph>>,
}

impl GraphStore {
    /// Create a disconnected adapter. Call [`connect`](Self::connect) before
    /// use; every operation on a disconnected store returns
    /// [`MemoryError::GraphUnavailable`].
    pub fn new(config: GraphConfig) -> Self {
        Self {
            config,
            graph: RwLock::new(None),
        }
    }

    /// Establish the driver and verify connectivity with a round-trip.
    ///
    /// On failure the adapter stays disabled and `false` is returned; the
    /// host keeps running without memory features.
    pub async fn connect(&self) -> bool {
        match Graph::new(
            self.config.uri.clone(),
            self.config.user.clone(),
            self.config.password.clone(),
        )
        .await
        {
            Ok(graph) => {
                if let Err(err) = graph.run(query("RETURN 1")).await {
                    warn!(uri = %self.config.uri, error = %err, "graph store connectivity check failed; memory features disabled");
                    return false;
                }
                info!(uri = %self.config.uri, "connected to graph store");
                *self.graph.write().await = Some(graph);
                true
            }
            Err(err) => {
                warn!(uri = %self.config.uri, error = %err, "graph store connection failed; memory features disabled");
                false
            }
        }
    }

    pub async fn is_connected(&self) -> bool {
        self.graph.read().await.is_some()
    }

    async fn graph(&self) -> Result<Graph> {
        self.graph
            .read()
            .await
            .clone()
            .ok_or_else(|| MemoryError::GraphUnavailable("graph store is not connected".into()))
    }

    /// Execute one write statement, discarding any rows.
    pub async fn run(&self, q: Query) -> Result<()> {
        let graph = self.graph().await?;
        graph.run(q).await?;
        Ok(())
    }

    /// Execute one statement and collect all result rows.
    pub async fn execute(&self, q: Query) -> Result<Vec<Row>> {
        let graph = self.graph().await?;
        let mut stream = graph.execute(q).await?;
        let mut rows = Vec::new();
        while let Some(row) = stream.next().await? {
            rows.push(row);
        }
        Ok(rows)
    }

    /// Run `work` inside one transaction: commit on success, roll back on any
    /// error. The session is always released.
    pub async fn run_in_transaction<T, F>(&self, work: F) -> Result<T>
    where
        T: Send,
        F: for<'t> FnOnce(&'t mut Txn) -> BoxFuture<'t, Result<T>> + Send,
    {
        let graph = self.graph().await?;
        let mut txn = graph.start_txn().await?;
        match work(&mut txn).await {
            Ok(value) => {
                txn.commit().await?;
                Ok(value)
            }
            Err(err) => {
                if let Err(rollback_err) = txn.rollback().await {
                    warn!(error = %rollback_err, "transaction rollback failed");
                }
                Err(err)
            }
        }
    }

    /// Create uniqueness constraints and secondary indexes. Idempotent;
    /// individual failures are logged and skipped, never fatal.
    pub async fn bootstrap_schema(&self) {
        if !self.is_connected().await {
            debug!("skipping schema bootstrap: graph store not connected");
            return;
        }
        for statement in SCHEMA_STATEMENTS {
            if let Err(err) = self.run(query(statement)).await {
                warn!(statement, error = %err, "schema statement failed");
            }
        }
        info!(statements = SCHEMA_STATEMENTS.len(), "graph schema bootstrap finished");
    }

    pub async fn health(&self) -> GraphHealth {
        if self.is_connected().await {
            GraphHealth {
                status: "ok",
                connected: true,
            }
        } else {
            GraphHealth {
                status: "unavailable",
                connected: false,
            }
        }
    }

    /// Node counts per label. Degrades to an all-zero, unavailable snapshot
    /// when the store is down.
    pub async fn graph_stats(&self) -> GraphStats {
        if !self.is_connected().await {
            return GraphStats::default();
        }
        let mut stats = GraphStats {
            available: true,
            ..GraphStats::default()
        };
        let counts: [(&str, &mut u64); 6] = [
            ("Episode", &mut stats.episodes),
            ("EntityRef", &mut stats.entities),
            ("MemorySummary", &mut stats.summaries),
            ("WorkspacePattern", &mut stats.patterns),
            ("Project", &mut stats.projects),
            ("Workspace", &mut stats.workspaces),
        ];
        for (label, slot) in counts {
            let q = query(&format!("MATCH (n:{label}) RETURN count(n) AS total"));
            match self.execute(q).await {
                Ok(rows) => {
                    if let Some(row) = rows.first() {
                        *slot = row.get::<i64>("total").unwrap_or(0).max(0) as u64;
                    }
                }
                Err(err) => {
                    warn!(label, error = %err, "label count failed");
                }
            }
        }
        stats
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_disconnected_store_degrades() {
        let store = GraphStore::new(GraphConfig::default());
        assert!(!store.is_connected().await);

        let health = store.health().await;
        assert_eq!(health.status, "unavailable");
        assert!(!health.connected);

        let stats = store.graph_stats().await;
        assert!(!stats.available);
        assert_eq!(stats.episodes, 0);

        let err = store.run(query("RETURN 1")).await.unwrap_err();
        assert!(matches!(err, MemoryError::GraphUnavailable(_)));
    }

    #[test]
    fn test_schema_statements_are_idempotent() {
        for statement in SCHEMA_STATEMENTS {
            assert!(statement.contains("IF NOT EXISTS"), "{statement}");
        }
    }
}
