// Copyright (c) 2026 Mnemograph contributors
// SPDX-License-Identifier: AGPL-3.0

//! Error taxonomy for the memory engine
//!
//! # Architecture
//!
//! - **Layer:** Domain Layer
//! - **Purpose:** Failure classification shared by every component

use thiserror::Error;
use tracing::warn;

/// Failures a memory operation can surface to its caller.
///
/// Read paths treat `GraphUnavailable` as a degradation signal, not a fatal
/// condition: queries return empty results and health reports "unavailable".
#[derive(Debug, Error)]
pub enum MemoryError {
    /// The graph store is unreachable or rejected the statement.
    #[error("graph store unavailable: {0}")]
    GraphUnavailable(String),

    /// The referenced entity does not exist.
    #[error("{kind} not found: {id}")]
    NotFound { kind: &'static str, id: String },

    /// Malformed input (empty content, out-of-range confidence, bad filter).
    #[error("invalid input: {0}")]
    Validation(String),
}

impl MemoryError {
    pub fn not_found(kind: &'static str, id: impl Into<String>) -> Self {
        Self::NotFound {
            kind,
            id: id.into(),
        }
    }
}

impl From<neo4rs::Error> for MemoryError {
    fn from(err: neo4rs::Error) -> Self {
        MemoryError::GraphUnavailable(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, MemoryError>;

/// Run a non-critical side effect, logging and swallowing its failure.
///
/// Call sites that must never abort the primary operation (feedback
/// persistence, event emission, schema statements) route through here so the
/// degrade-gracefully policy lives in one place.
pub fn best_effort<T>(context: &'static str, result: Result<T>) -> Option<T> {
    match result {
        Ok(value) => Some(value),
        Err(err) => {
            warn!(context, error = %err, "best-effort operation failed");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_not_found_display() {
        let err = MemoryError::not_found("pattern", "abc");
        assert_eq!(err.to_string(), "pattern not found: abc");
    }

    #[test]
    fn test_best_effort_swallows_errors() {
        let failed: Result<()> = Err(MemoryError::GraphUnavailable("down".into()));
        assert!(best_effort("unit-test", failed).is_none());
        assert_eq!(best_effort("unit-test", Ok(7)), Some(7));
    }
}
