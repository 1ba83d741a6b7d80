//! Structured result of a provisioning or tear-down run

use crate::error::NodeError;
use crate::node::{Lifecycle, ResourceKey};
use crate::types::{ExecuteSummary, NodeOutcome};
use serde::{Serialize, Serializer};
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt::Display;

/// A node whose provider call or input resolution failed
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NodeFailure {
    pub key: ResourceKey,
    #[serde(serialize_with = "as_display")]
    pub error: NodeError,
}

/// A node that was never dispatched because something it needs failed
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SkippedNode {
    pub key: ResourceKey,
    /// The failed node that blocked it
    pub blocked_by: ResourceKey,
}

fn as_display<T: Display, S: Serializer>(value: &T, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.collect_str(value)
}

/// Outcome of one run.
///
/// Lists are in topological order (reverse order for deletions). Nothing is
/// silently dropped: every declared node appears in exactly one of
/// `realized`, `failed`, `skipped` or `pending`.
#[derive(Debug, Clone, Default, Serialize)]
pub struct RunReport {
    pub realized: Vec<ResourceKey>,
    pub outcomes: BTreeMap<ResourceKey, NodeOutcome>,
    pub failed: Vec<NodeFailure>,
    pub skipped: Vec<SkippedNode>,
    /// Not dispatched because the run was cancelled
    pub pending: Vec<ResourceKey>,
    pub deleted: Vec<ResourceKey>,
    pub delete_failed: Vec<NodeFailure>,
    /// Deletions held back because a consumer could not be deleted
    pub delete_skipped: Vec<SkippedNode>,
    pub cancelled: bool,
    pub exports: BTreeMap<String, Value>,
    /// Exports whose Output failed or never resolved, with the reason
    pub missing_exports: BTreeMap<String, String>,
}

impl RunReport {
    pub fn failed_keys(&self) -> Vec<&ResourceKey> {
        self.failed.iter().map(|f| &f.key).collect()
    }

    pub fn skipped_keys(&self) -> Vec<&ResourceKey> {
        self.skipped.iter().map(|s| &s.key).collect()
    }

    /// Final lifecycle state of a declared node, if it took part in the run
    pub fn state_of(&self, key: &ResourceKey) -> Option<Lifecycle> {
        if self.realized.contains(key) {
            Some(Lifecycle::Realized)
        } else if self.failed.iter().any(|f| &f.key == key) {
            Some(Lifecycle::Failed)
        } else if self.skipped.iter().any(|s| &s.key == key) {
            Some(Lifecycle::Skipped)
        } else if self.pending.contains(key) {
            Some(Lifecycle::Pending)
        } else {
            None
        }
    }

    pub fn summary(&self) -> ExecuteSummary {
        let mut summary = ExecuteSummary::default();
        for outcome in self.outcomes.values() {
            summary.add_outcome(*outcome);
        }
        summary.deleted += self.deleted.len();
        summary.failed = self.failed.len() + self.delete_failed.len();
        summary.skipped = self.skipped.len() + self.delete_skipped.len();
        summary.pending = self.pending.len();
        summary
    }

    /// Everything declared was realized, every requested export resolved
    /// and every requested deletion happened
    pub fn is_success(&self) -> bool {
        !self.cancelled && self.summary().is_success() && self.missing_exports.is_empty()
    }

    /// Some work succeeded but not all of it
    pub fn is_partial(&self) -> bool {
        !self.is_success() && (!self.realized.is_empty() || !self.deleted.is_empty())
    }

    /// Process exit code for a CLI wrapper: 0 success, 2 cancelled, 1 otherwise
    pub fn exit_code(&self) -> i32 {
        if self.is_success() {
            0
        } else if self.cancelled {
            2
        } else {
            1
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ProviderError;

    fn key(name: &str) -> ResourceKey {
        ResourceKey::new("t", name)
    }

    #[test]
    fn test_partial_success_is_distinguishable() {
        let mut report = RunReport {
            realized: vec![key("a")],
            ..Default::default()
        };
        report.outcomes.insert(key("a"), NodeOutcome::Created);
        assert!(report.is_success());
        assert_eq!(report.exit_code(), 0);

        report.failed.push(NodeFailure {
            key: key("b"),
            error: NodeError::Provider {
                error: ProviderError::permanent("bad sku"),
                attempts: 1,
            },
        });
        assert!(report.is_partial());
        assert_eq!(report.exit_code(), 1);
        assert_eq!(report.state_of(&key("b")), Some(Lifecycle::Failed));
    }

    #[test]
    fn test_missing_export_fails_the_run() {
        let mut report = RunReport {
            realized: vec![key("pip")],
            ..Default::default()
        };
        report.outcomes.insert(key("pip"), NodeOutcome::Created);
        report
            .missing_exports
            .insert("vm_fqdn".into(), "public IP has no fqdn".into());
        assert!(!report.is_success());
        assert!(report.is_partial());
        assert_eq!(report.exit_code(), 1);
    }

    #[test]
    fn test_total_failure_is_not_partial() {
        let report = RunReport {
            failed: vec![NodeFailure {
                key: key("a"),
                error: NodeError::MissingId,
            }],
            ..Default::default()
        };
        assert!(!report.is_success());
        assert!(!report.is_partial());
    }

    #[test]
    fn test_cancelled_exit_code() {
        let report = RunReport {
            realized: vec![key("a")],
            pending: vec![key("b")],
            cancelled: true,
            ..Default::default()
        };
        assert_eq!(report.exit_code(), 2);
        assert_eq!(report.state_of(&key("b")), Some(Lifecycle::Pending));
    }

    #[test]
    fn test_serializes_errors_as_text() {
        let report = RunReport {
            failed: vec![NodeFailure {
                key: key("a"),
                error: NodeError::MissingId,
            }],
            ..Default::default()
        };
        let json = serde_json::to_value(&report).unwrap();
        assert_eq!(json["failed"][0]["key"], "t::a");
        assert_eq!(
            json["failed"][0]["error"],
            "provider returned no 'id' for the resource"
        );
    }
}
