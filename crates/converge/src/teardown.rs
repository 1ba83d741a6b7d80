//! Tear-down - deletes recorded resources in reverse dependency order
//!
//! Ordering comes from the producers stored on each reconciliation record,
//! so resources can be deleted even when nothing declares them any more.

use crate::context::{CancellationToken, ConfirmCallback, ProgressCallback};
use crate::error::{EngineError, NodeError, Result};
use crate::executor::Engine;
use crate::graph::DependencyGraph;
use crate::node::ResourceKey;
use crate::provider::Provider;
use crate::report::{NodeFailure, RunReport, SkippedNode};
use crate::retry::{Attempted, with_retry};
use crate::schedule::{Schedule, drive, worker_pool};
use crate::state::{ReconciliationRecord, StateStore};
use crate::types::NodeOutcome;
use std::collections::HashSet;

impl<P: Provider, S: StateStore> Engine<P, S> {
    /// Delete the given recorded resources plus everything recorded as
    /// depending on them.
    pub fn destroy(
        &self,
        targets: &[ResourceKey],
        progress: &mut impl ProgressCallback,
        confirm: &mut impl ConfirmCallback,
        cancel: &CancellationToken,
    ) -> Result<RunReport> {
        let records = self.store.records().map_err(EngineError::Store)?;
        let graph = record_graph(&records)?;

        let mut selected = HashSet::new();
        for target in targets {
            let index = graph
                .index_of(target)
                .ok_or_else(|| EngineError::UnknownResource(target.clone()))?;
            selected.insert(index);
            selected.extend(graph.transitive_consumers(index));
        }

        let chosen: Vec<ReconciliationRecord> = records
            .into_iter()
            .enumerate()
            .filter(|(i, _)| selected.contains(i))
            .map(|(_, r)| r)
            .collect();
        self.confirmed_teardown(chosen, progress, confirm, cancel)
    }

    /// Delete every recorded resource
    pub fn destroy_all(
        &self,
        progress: &mut impl ProgressCallback,
        confirm: &mut impl ConfirmCallback,
        cancel: &CancellationToken,
    ) -> Result<RunReport> {
        let records = self.store.records().map_err(EngineError::Store)?;
        self.confirmed_teardown(records, progress, confirm, cancel)
    }

    fn confirmed_teardown(
        &self,
        records: Vec<ReconciliationRecord>,
        progress: &mut impl ProgressCallback,
        confirm: &mut impl ConfirmCallback,
        cancel: &CancellationToken,
    ) -> Result<RunReport> {
        let mut report = RunReport::default();
        if records.is_empty() {
            log::info!("Nothing to destroy");
            progress.on_run_complete(&report);
            return Ok(report);
        }

        let prompt = format!("Delete {} resource(s)?", records.len());
        if !confirm.confirm(&prompt).map_err(EngineError::Confirm)? {
            log::info!("Destroy declined");
            report.pending = records.into_iter().map(|r| r.key).collect();
            report.pending.sort();
            report.cancelled = true;
            return Ok(report);
        }

        progress.on_run_start(records.len());
        self.teardown(records, progress, cancel, &mut report)?;
        let summary = report.summary();
        log::info!(
            "Destroy finished: {} deleted, {} failed, {} held back",
            summary.deleted,
            summary.failed,
            summary.skipped + summary.pending
        );
        progress.on_run_complete(&report);
        Ok(report)
    }

    /// Delete `records`, consumers before producers, appending to `report`
    pub(crate) fn teardown(
        &self,
        records: Vec<ReconciliationRecord>,
        progress: &mut dyn ProgressCallback,
        cancel: &CancellationToken,
        report: &mut RunReport,
    ) -> Result<()> {
        let graph = record_graph(&records)?;
        let keys: Vec<ResourceKey> = records.iter().map(|r| r.key.clone()).collect();

        // Deleting a node waits on its consumers; later positions go first
        let prerequisites: Vec<Vec<usize>> =
            (0..graph.len()).map(|i| graph.consumers(i).to_vec()).collect();
        let priority = (0..graph.len())
            .map(|i| graph.len() - 1 - graph.position(i))
            .collect();
        let mut schedule = Schedule::new(&prerequisites, priority);

        let mut deleted = Vec::new();
        let mut failed = Vec::new();
        let mut held_back = Vec::new();
        let pool = worker_pool(self.options.concurrency_limit)?;

        let cancelled = drive(
            &pool,
            &mut schedule,
            &keys,
            self.options.concurrency_limit,
            cancel,
            progress,
            |index, notifier| {
                let record = &records[index];
                let Attempted { result, attempts } = with_retry(&self.options.retry, notifier, || {
                    self.provider.delete(
                        &record.key.kind,
                        &record.remote_id,
                        self.options.provider_timeout,
                    )
                });
                result.map_err(|error| NodeError::Provider { error, attempts })?;
                self.store
                    .remove(&record.key)
                    .map_err(|e| NodeError::Store(format!("{e:#}")))
            },
            |index, result, schedule, progress| {
                let key = &keys[index];
                match result {
                    Ok(()) => {
                        log::info!("{key}: deleted");
                        progress.on_node_complete(key, &Ok(NodeOutcome::Deleted));
                        schedule.complete(index);
                        deleted.push(index);
                    }
                    Err(error) => {
                        log::error!("{key}: delete failed: {error}");
                        progress.on_node_complete(key, &Err(error.clone()));
                        for blocked in schedule.fail(index) {
                            log::warn!("{}: kept, {key} could not be deleted", keys[blocked]);
                            progress.on_node_skipped(&keys[blocked], key);
                            held_back.push(SkippedNode {
                                key: keys[blocked].clone(),
                                blocked_by: key.clone(),
                            });
                        }
                        failed.push((index, error));
                    }
                }
                Ok(())
            },
        )?;

        let rank = |i: &usize| graph.len() - graph.position(*i);
        deleted.sort_by_key(rank);
        failed.sort_by_key(|(i, _)| rank(i));

        report.deleted.extend(deleted.into_iter().map(|i| keys[i].clone()));
        report
            .delete_failed
            .extend(failed.into_iter().map(|(i, error)| NodeFailure {
                key: keys[i].clone(),
                error,
            }));
        report.delete_skipped.extend(held_back);
        report
            .pending
            .extend(schedule.unfinished().into_iter().map(|i| keys[i].clone()));
        report.cancelled |= cancelled;
        Ok(())
    }
}

fn record_graph(records: &[ReconciliationRecord]) -> Result<DependencyGraph> {
    Ok(DependencyGraph::from_dependencies(
        records
            .iter()
            .map(|r| (r.key.clone(), r.dependencies.clone()))
            .collect(),
    )?)
}
