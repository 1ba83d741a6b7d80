//! Core types for provisioning runs

use crate::retry::RetryConfig;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// What happened to a node that did not fail
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum NodeOutcome {
    /// No prior record; the provider created it
    Created,
    /// Fingerprint changed; the provider updated it
    Updated,
    /// Fingerprint matched the stored record; no provider call
    Unchanged,
    /// Torn down and removed from state
    Deleted,
}

/// Summary of execution results
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecuteSummary {
    pub created: usize,
    pub updated: usize,
    pub unchanged: usize,
    pub deleted: usize,
    pub failed: usize,
    pub skipped: usize,
    pub pending: usize,
}

impl ExecuteSummary {
    /// Total number of actual changes made
    pub fn total_changes(&self) -> usize {
        self.created + self.updated + self.deleted
    }

    /// Check if execution was fully successful
    pub fn is_success(&self) -> bool {
        self.failed == 0 && self.skipped == 0 && self.pending == 0
    }

    /// Total number of resources accounted for
    pub fn total(&self) -> usize {
        self.created
            + self.updated
            + self.unchanged
            + self.deleted
            + self.failed
            + self.skipped
            + self.pending
    }

    /// Add a successful outcome to the summary
    pub fn add_outcome(&mut self, outcome: NodeOutcome) {
        match outcome {
            NodeOutcome::Created => self.created += 1,
            NodeOutcome::Updated => self.updated += 1,
            NodeOutcome::Unchanged => self.unchanged += 1,
            NodeOutcome::Deleted => self.deleted += 1,
        }
    }
}

/// Options for a provisioning run
#[derive(Debug, Clone)]
pub struct EngineOptions {
    /// Maximum provider calls in flight at once
    pub concurrency_limit: usize,
    /// Deadline handed to every provider call
    pub provider_timeout: Duration,
    /// Backoff for transient provider errors
    pub retry: RetryConfig,
    /// Delete recorded resources that are no longer declared after applying
    pub prune: bool,
}

impl Default for EngineOptions {
    fn default() -> Self {
        Self {
            concurrency_limit: 4,
            provider_timeout: Duration::from_secs(600),
            retry: RetryConfig::default(),
            prune: true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_summary_counts() {
        let mut summary = ExecuteSummary::default();
        summary.add_outcome(NodeOutcome::Created);
        summary.add_outcome(NodeOutcome::Unchanged);
        summary.add_outcome(NodeOutcome::Deleted);
        assert_eq!(summary.total(), 3);
        assert_eq!(summary.total_changes(), 2);
        assert!(summary.is_success());

        summary.skipped += 1;
        assert!(!summary.is_success());
    }
}
