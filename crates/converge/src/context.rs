//! Run context: progress reporting, confirmation and cancellation
//!
//! These traits let the engine run without depending on a particular
//! terminal UI.

use crate::error::{NodeError, ProviderError};
use crate::node::ResourceKey;
use crate::report::RunReport;
use crate::types::NodeOutcome;
use anyhow::Result;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

/// Progress callback for provisioning runs.
///
/// Every method is called from the coordinating thread, never from workers.
pub trait ProgressCallback: Send {
    /// Called once with the number of resources in the run
    fn on_run_start(&mut self, total: usize);

    /// Called when a resource is handed to a worker
    fn on_node_start(&mut self, key: &ResourceKey);

    /// Called when a worker reports back
    fn on_node_complete(&mut self, key: &ResourceKey, result: &Result<NodeOutcome, NodeError>);

    /// Called when a resource will not run because `blocked_by` failed
    fn on_node_skipped(&mut self, key: &ResourceKey, blocked_by: &ResourceKey);

    /// Called when a provider call for `key` is about to be retried
    fn on_retry(&mut self, key: &ResourceKey, attempt: u32, error: &ProviderError, delay: Duration);

    /// Called once when the run finishes
    fn on_run_complete(&mut self, report: &RunReport);
}

/// No-op progress callback
pub struct NoProgress;

impl ProgressCallback for NoProgress {
    fn on_run_start(&mut self, _total: usize) {}
    fn on_node_start(&mut self, _key: &ResourceKey) {}
    fn on_node_complete(&mut self, _key: &ResourceKey, _result: &Result<NodeOutcome, NodeError>) {}
    fn on_node_skipped(&mut self, _key: &ResourceKey, _blocked_by: &ResourceKey) {}
    fn on_retry(&mut self, _key: &ResourceKey, _attempt: u32, _error: &ProviderError, _delay: Duration) {}
    fn on_run_complete(&mut self, _report: &RunReport) {}
}

/// Confirmation callback for user interaction.
pub trait ConfirmCallback: Send {
    /// Ask the user to confirm an action.
    ///
    /// # Returns
    /// `true` if the user confirmed, `false` otherwise
    fn confirm(&mut self, prompt: &str) -> Result<bool>;
}

/// Auto-confirm callback (always returns true)
pub struct AutoConfirm;

impl ConfirmCallback for AutoConfirm {
    fn confirm(&mut self, _prompt: &str) -> Result<bool> {
        Ok(true)
    }
}

/// Auto-decline callback (always returns false)
pub struct AutoDecline;

impl ConfirmCallback for AutoDecline {
    fn confirm(&mut self, _prompt: &str) -> Result<bool> {
        Ok(false)
    }
}

/// Run-level cancellation flag, checked before every dispatch.
///
/// Provider calls already in flight are allowed to finish.
#[derive(Debug, Clone, Default)]
pub struct CancellationToken(Arc<AtomicBool>);

impl CancellationToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}
