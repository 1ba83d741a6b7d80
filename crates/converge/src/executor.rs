//! Execution engine - converges declared resources with bounded parallelism
//!
//! Nodes are dispatched as soon as every producer is realized, up to the
//! configured concurrency limit. A failing node never aborts the run: its
//! transitive consumers are skipped and independent branches keep going.

use crate::context::{CancellationToken, ProgressCallback};
use crate::error::{EngineError, NodeError, Result};
use crate::node::{ResourceKey, ResourceNode};
use crate::output::OutputError;
use crate::property::{PropertyMap, fingerprint};
use crate::provider::{Provider, remote_id};
use crate::report::{NodeFailure, RunReport, SkippedNode};
use crate::retry::{Attempted, with_retry};
use crate::schedule::{RetryNotifier, Schedule, drive, worker_pool};
use crate::stack::Stack;
use crate::state::{ReconciliationRecord, StateStore};
use crate::types::{EngineOptions, NodeOutcome};
use chrono::Utc;
use std::collections::HashSet;

/// What a worker hands back for a realized node
struct Realization {
    outcome: NodeOutcome,
    realized: PropertyMap,
}

/// Drives a provider and a state store through provisioning and tear-down runs.
pub struct Engine<P, S> {
    pub(crate) provider: P,
    pub(crate) store: S,
    pub(crate) options: EngineOptions,
}

impl<P: Provider, S: StateStore> Engine<P, S> {
    pub fn new(provider: P, store: S) -> Self {
        Self {
            provider,
            store,
            options: EngineOptions::default(),
        }
    }

    pub fn with_options(mut self, options: EngineOptions) -> Self {
        self.options = options;
        self
    }

    pub fn provider(&self) -> &P {
        &self.provider
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn options(&self) -> &EngineOptions {
        &self.options
    }

    /// Converge remote state to the stack's declarations.
    ///
    /// Per-node failures end up in the report. Only declaration errors,
    /// store listing failures and broken internal invariants are returned as
    /// errors. A stack's nodes can be applied once; declare a fresh stack
    /// for every run.
    pub fn apply(
        &self,
        stack: &Stack,
        progress: &mut impl ProgressCallback,
        cancel: &CancellationToken,
    ) -> Result<RunReport> {
        let (nodes, graph) = stack.prepare()?;
        let keys: Vec<ResourceKey> = nodes.iter().map(|n| n.key().clone()).collect();

        let orphans = if self.options.prune {
            let declared: HashSet<&ResourceKey> = keys.iter().collect();
            self.store
                .records()
                .map_err(EngineError::Store)?
                .into_iter()
                .filter(|r| !declared.contains(&r.key))
                .collect()
        } else {
            Vec::new()
        };

        log::info!(
            "Applying stack '{}': {} resource(s), {} to prune",
            stack.name(),
            nodes.len(),
            orphans.len()
        );
        progress.on_run_start(nodes.len() + orphans.len());

        let prerequisites: Vec<Vec<usize>> =
            (0..graph.len()).map(|i| graph.producers(i).to_vec()).collect();
        let priority = (0..graph.len()).map(|i| graph.position(i)).collect();
        let mut schedule = Schedule::new(&prerequisites, priority);

        let mut report = RunReport::default();
        let pool = worker_pool(self.options.concurrency_limit)?;

        let cancelled = drive(
            &pool,
            &mut schedule,
            &keys,
            self.options.concurrency_limit,
            cancel,
            progress,
            |index, notifier| self.realize(&nodes[index], notifier),
            |index, result, schedule, progress| {
                let key = &keys[index];
                match result {
                    Ok(Realization { outcome, realized }) => {
                        log::info!("{key}: {outcome:?}");
                        progress.on_node_complete(key, &Ok(outcome));
                        nodes[index]
                            .realized()
                            .resolve(realized)
                            .map_err(|source| EngineError::Internal {
                                key: key.clone(),
                                source,
                            })?;
                        schedule.complete(index);
                        report.realized.push(key.clone());
                        report.outcomes.insert(key.clone(), outcome);
                    }
                    Err(error) => {
                        log::error!("{key}: {error}");
                        progress.on_node_complete(key, &Err(error.clone()));
                        fail_output(&nodes[index], OutputError::from_resource(key.clone(), error.to_string()))?;
                        for blocked in schedule.fail(index) {
                            let blocked_key = &keys[blocked];
                            log::warn!("{blocked_key}: skipped, {key} failed");
                            progress.on_node_skipped(blocked_key, key);
                            fail_output(
                                &nodes[blocked],
                                OutputError::from_resource(
                                    key.clone(),
                                    format!("{blocked_key} skipped because {key} failed"),
                                ),
                            )?;
                            report.skipped.push(SkippedNode {
                                key: blocked_key.clone(),
                                blocked_by: key.clone(),
                            });
                        }
                        report.failed.push(NodeFailure {
                            key: key.clone(),
                            error,
                        });
                    }
                }
                Ok(())
            },
        )?;

        for index in schedule.unfinished() {
            fail_output(&nodes[index], OutputError::new("run cancelled"))?;
            report.pending.push(keys[index].clone());
        }
        report.cancelled = cancelled;

        // Completion order varies between runs; reports do not
        let rank = |key: &ResourceKey| graph.index_of(key).map_or(usize::MAX, |i| graph.position(i));
        report.realized.sort_by_key(|k| rank(k));
        report.failed.sort_by_key(|f| rank(&f.key));
        report.skipped.sort_by_key(|s| rank(&s.key));

        if !orphans.is_empty() {
            if cancelled {
                log::warn!("Skipping prune of {} resource(s): run cancelled", orphans.len());
            } else {
                log::info!("Pruning {} undeclared resource(s)", orphans.len());
                self.teardown(orphans, progress, cancel, &mut report)?;
            }
        }

        for (name, output) in stack.exports() {
            match output.peek() {
                Some(Ok(value)) => {
                    report.exports.insert(name.clone(), value);
                }
                Some(Err(e)) => {
                    report.missing_exports.insert(name.clone(), e.message);
                }
                None => {
                    report
                        .missing_exports
                        .insert(name.clone(), "never resolved".to_string());
                }
            }
        }

        let summary = report.summary();
        log::info!(
            "Apply finished: {} created, {} updated, {} unchanged, {} deleted, {} failed, {} skipped, {} pending",
            summary.created,
            summary.updated,
            summary.unchanged,
            summary.deleted,
            summary.failed,
            summary.skipped,
            summary.pending
        );
        progress.on_run_complete(&report);
        Ok(report)
    }

    /// Realize one node. Runs on a worker thread.
    fn realize(
        &self,
        node: &ResourceNode,
        notifier: &RetryNotifier<Realization>,
    ) -> std::result::Result<Realization, NodeError> {
        let key = node.key();
        let desired = node
            .desired()
            .resolve()
            .map_err(|e| NodeError::Input(e.message))?;
        let fingerprint = fingerprint(node.kind(), &desired);

        let prior = self
            .store
            .get(key)
            .map_err(|e| NodeError::Store(format!("{e:#}")))?;
        if let Some(record) = &prior
            && record.fingerprint == fingerprint
        {
            log::debug!("{key}: fingerprint unchanged, skipping provider");
            return Ok(Realization {
                outcome: NodeOutcome::Unchanged,
                realized: record.realized.clone(),
            });
        }

        let Attempted { result, attempts } = with_retry(&self.options.retry, notifier, || {
            self.provider
                .create_or_update(key, &desired, self.options.provider_timeout)
        });
        let realized = result.map_err(|error| NodeError::Provider { error, attempts })?;
        let remote_id = remote_id(&realized).ok_or(NodeError::MissingId)?.to_string();

        self.store
            .put(ReconciliationRecord {
                key: key.clone(),
                remote_id,
                fingerprint,
                realized: realized.clone(),
                dependencies: node.dependencies().into_iter().collect(),
                updated_at: Utc::now(),
            })
            .map_err(|e| NodeError::Store(format!("{e:#}")))?;

        let outcome = if prior.is_some() {
            NodeOutcome::Updated
        } else {
            NodeOutcome::Created
        };
        Ok(Realization { outcome, realized })
    }
}

fn fail_output(node: &ResourceNode, error: OutputError) -> Result<()> {
    node.realized()
        .fail(error)
        .map_err(|source| EngineError::Internal {
            key: node.key().clone(),
            source,
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::NoProgress;
    use crate::error::{DeclarationError, ProviderError};
    use crate::node::Lifecycle;
    use crate::output::Output;
    use crate::property::Properties;
    use crate::retry::RetryConfig;
    use crate::state::MemoryStore;
    use crate::testing::{Event, FakeProvider};
    use serde_json::json;
    use std::sync::Arc;
    use std::time::Duration;

    const KIND: &str = "test:Thing";

    fn key(name: &str) -> ResourceKey {
        ResourceKey::new(KIND, name)
    }

    fn engine(provider: &Arc<FakeProvider>, store: &Arc<MemoryStore>) -> Engine<Arc<FakeProvider>, Arc<MemoryStore>> {
        Engine::new(Arc::clone(provider), Arc::clone(store)).with_options(EngineOptions {
            retry: RetryConfig::immediate(3),
            ..Default::default()
        })
    }

    /// rg <- vnet <- subnet <- nic, rg <- ip <- nic, plus an unrelated bucket
    fn network(size: i64) -> Stack {
        let mut stack = Stack::new("test");
        let rg = stack
            .add(ResourceNode::new(KIND, "rg", Properties::new().with("location", "westus")))
            .unwrap();
        let vnet = stack
            .add(ResourceNode::new(
                KIND,
                "vnet",
                Properties::new().with("rg", rg.name()).with("size", size),
            ))
            .unwrap();
        let subnet = stack
            .add(ResourceNode::new(KIND, "subnet", Properties::new().with("vnet_id", vnet.id())))
            .unwrap();
        let ip = stack
            .add(ResourceNode::new(KIND, "ip", Properties::new().with("rg", rg.name())))
            .unwrap();
        let nic = stack
            .add(ResourceNode::new(
                KIND,
                "nic",
                Properties::new()
                    .with("subnet_id", subnet.id())
                    .with("ip_id", ip.id()),
            ))
            .unwrap();
        stack
            .add(ResourceNode::new(KIND, "bucket", Properties::new()))
            .unwrap();
        stack.export("nic_id", nic.id());
        stack
    }

    #[derive(Default)]
    struct Recorder {
        total: usize,
        started: Vec<String>,
        retries: Vec<(String, u32)>,
        skipped: Vec<(String, String)>,
        finished: bool,
    }

    impl ProgressCallback for Recorder {
        fn on_run_start(&mut self, total: usize) {
            self.total = total;
        }
        fn on_node_start(&mut self, key: &ResourceKey) {
            self.started.push(key.name.clone());
        }
        fn on_node_complete(&mut self, _key: &ResourceKey, _result: &std::result::Result<NodeOutcome, NodeError>) {}
        fn on_node_skipped(&mut self, key: &ResourceKey, blocked_by: &ResourceKey) {
            self.skipped.push((key.name.clone(), blocked_by.name.clone()));
        }
        fn on_retry(&mut self, key: &ResourceKey, attempt: u32, _error: &ProviderError, _delay: Duration) {
            self.retries.push((key.name.clone(), attempt));
        }
        fn on_run_complete(&mut self, _report: &RunReport) {
            self.finished = true;
        }
    }

    fn position(timeline: &[Event], event: &Event) -> usize {
        timeline
            .iter()
            .position(|e| e == event)
            .unwrap_or_else(|| panic!("{event:?} not in timeline"))
    }

    #[test]
    fn test_producers_finish_before_consumers_start() {
        let provider = Arc::new(FakeProvider::with_latency(Duration::from_millis(5)));
        let store = Arc::new(MemoryStore::new());
        let report = engine(&provider, &store)
            .apply(&network(1), &mut NoProgress, &CancellationToken::new())
            .unwrap();
        assert!(report.is_success());
        assert_eq!(report.realized.len(), 6);

        let timeline = provider.timeline();
        for (producer, consumer) in [("rg", "vnet"), ("vnet", "subnet"), ("rg", "ip"), ("subnet", "nic"), ("ip", "nic")] {
            let end = position(&timeline, &Event::End(producer.into()));
            let start = position(&timeline, &Event::Start(consumer.into()));
            assert!(end < start, "{producer} must finish before {consumer} starts");
        }
    }

    #[test]
    fn test_consumers_receive_resolved_outputs() {
        let provider = Arc::new(FakeProvider::new());
        let store = Arc::new(MemoryStore::new());
        let report = engine(&provider, &store)
            .apply(&network(1), &mut NoProgress, &CancellationToken::new())
            .unwrap();

        let nic = provider.last_desired("nic").unwrap();
        assert_eq!(nic["subnet_id"], json!("/fake/subnet"));
        assert_eq!(nic["ip_id"], json!("/fake/ip"));
        assert_eq!(provider.last_desired("vnet").unwrap()["rg"], json!("rg"));
        assert_eq!(report.exports["nic_id"], json!("/fake/nic"));
    }

    #[test]
    fn test_report_lists_follow_topological_order() {
        let provider = Arc::new(FakeProvider::new());
        let store = Arc::new(MemoryStore::new());
        let report = engine(&provider, &store)
            .apply(&network(1), &mut NoProgress, &CancellationToken::new())
            .unwrap();
        let names: Vec<&str> = report.realized.iter().map(|k| k.name.as_str()).collect();
        assert_eq!(names, vec!["rg", "vnet", "subnet", "ip", "nic", "bucket"]);
    }

    #[test]
    fn test_concurrency_limit_is_respected() {
        let provider = Arc::new(FakeProvider::with_latency(Duration::from_millis(10)));
        let store = Arc::new(MemoryStore::new());
        let mut stack = Stack::new("wide");
        for i in 0..8 {
            stack
                .add(ResourceNode::new(KIND, format!("n{i}"), Properties::new()))
                .unwrap();
        }
        let engine = Engine::new(Arc::clone(&provider), Arc::clone(&store)).with_options(EngineOptions {
            concurrency_limit: 2,
            ..Default::default()
        });
        let report = engine
            .apply(&stack, &mut NoProgress, &CancellationToken::new())
            .unwrap();
        assert_eq!(report.realized.len(), 8);
        assert!(provider.peak_concurrency() <= 2);
    }

    #[test]
    fn test_failure_skips_consumers_but_not_independent_branches() {
        let provider = Arc::new(FakeProvider::new());
        provider.fail_always("vnet", ProviderError::permanent("quota exceeded"));
        let store = Arc::new(MemoryStore::new());
        let mut progress = Recorder::default();
        let report = engine(&provider, &store)
            .apply(&network(1), &mut progress, &CancellationToken::new())
            .unwrap();

        assert_eq!(report.failed_keys(), vec![&key("vnet")]);
        assert_eq!(report.skipped_keys(), vec![&key("subnet"), &key("nic")]);
        assert!(report.skipped.iter().all(|s| s.blocked_by == key("vnet")));
        assert_eq!(report.state_of(&key("ip")), Some(Lifecycle::Realized));
        assert_eq!(report.state_of(&key("bucket")), Some(Lifecycle::Realized));
        assert!(report.is_partial());
        assert_eq!(report.exit_code(), 1);

        // Skipped nodes never reach the provider
        assert!(!provider.created().contains(&"subnet".to_string()));
        assert!(!progress.started.contains(&"nic".to_string()));
        assert_eq!(progress.skipped.len(), 2);

        // The export depended on a skipped node
        assert!(report.missing_exports["nic_id"].contains("vnet"));
        assert!(store.get(&key("vnet")).unwrap().is_none());
    }

    #[test]
    fn test_transient_errors_are_retried() {
        let provider = Arc::new(FakeProvider::new());
        provider.fail_times("rg", ProviderError::transient("throttled"), 2);
        let store = Arc::new(MemoryStore::new());
        let mut progress = Recorder::default();
        let report = engine(&provider, &store)
            .apply(&network(1), &mut progress, &CancellationToken::new())
            .unwrap();

        assert!(report.is_success());
        assert_eq!(provider.created().iter().filter(|n| *n == "rg").count(), 3);
        assert_eq!(progress.retries, vec![("rg".to_string(), 1), ("rg".to_string(), 2)]);
    }

    #[test]
    fn test_exhausted_retries_fail_the_node() {
        let provider = Arc::new(FakeProvider::new());
        provider.fail_times("bucket", ProviderError::transient("throttled"), 5);
        let store = Arc::new(MemoryStore::new());
        let report = engine(&provider, &store)
            .apply(&network(1), &mut NoProgress, &CancellationToken::new())
            .unwrap();

        assert_eq!(
            report.failed[0].error,
            NodeError::Provider {
                error: ProviderError::transient("throttled"),
                attempts: 3,
            }
        );
    }

    #[test]
    fn test_rerun_without_changes_skips_the_provider() {
        let provider = Arc::new(FakeProvider::new());
        let store = Arc::new(MemoryStore::new());
        let engine = engine(&provider, &store);

        let first = engine
            .apply(&network(1), &mut NoProgress, &CancellationToken::new())
            .unwrap();
        assert_eq!(first.summary().created, 6);
        let calls = provider.created().len();

        let second = engine
            .apply(&network(1), &mut NoProgress, &CancellationToken::new())
            .unwrap();
        assert_eq!(second.summary().unchanged, 6);
        assert_eq!(second.summary().total_changes(), 0);
        assert_eq!(provider.created().len(), calls);
        assert_eq!(second.exports["nic_id"], json!("/fake/nic"));
    }

    #[test]
    fn test_changed_property_updates_only_that_node() {
        let provider = Arc::new(FakeProvider::new());
        let store = Arc::new(MemoryStore::new());
        let engine = engine(&provider, &store);
        engine
            .apply(&network(1), &mut NoProgress, &CancellationToken::new())
            .unwrap();

        let report = engine
            .apply(&network(2), &mut NoProgress, &CancellationToken::new())
            .unwrap();
        assert_eq!(report.outcomes[&key("vnet")], NodeOutcome::Updated);
        // Remote ids are stable, so consumers' fingerprints do not move
        assert_eq!(report.outcomes[&key("subnet")], NodeOutcome::Unchanged);
        assert_eq!(report.summary().updated, 1);
    }

    /// a <- b (copies a's size), a <- c (takes a's id)
    fn sized(size: i64) -> Stack {
        let mut stack = Stack::new("test");
        let a = stack
            .add(ResourceNode::new(KIND, "a", Properties::new().with("size", size)))
            .unwrap();
        stack
            .add(ResourceNode::new(KIND, "b", Properties::new().with("size", a.output("size"))))
            .unwrap();
        stack
            .add(ResourceNode::new(KIND, "c", Properties::new().with("a_id", a.id())))
            .unwrap();
        stack
    }

    #[test]
    fn test_changed_output_updates_consumers_that_read_it() {
        let provider = Arc::new(FakeProvider::new());
        let store = Arc::new(MemoryStore::new());
        let engine = engine(&provider, &store);
        engine
            .apply(&sized(1), &mut NoProgress, &CancellationToken::new())
            .unwrap();
        let calls = provider.created().len();

        let report = engine
            .apply(&sized(2), &mut NoProgress, &CancellationToken::new())
            .unwrap();
        assert_eq!(report.outcomes[&key("a")], NodeOutcome::Updated);
        assert_eq!(report.outcomes[&key("b")], NodeOutcome::Updated);
        assert_eq!(report.outcomes[&key("c")], NodeOutcome::Unchanged);
        assert_eq!(provider.created()[calls..], ["a".to_string(), "b".to_string()]);
        assert_eq!(store.get(&key("b")).unwrap().unwrap().realized["size"], json!(2));
    }

    #[test]
    fn test_cancellation_leaves_undispatched_nodes_pending() {
        let provider = Arc::new(FakeProvider::new());
        let store = Arc::new(MemoryStore::new());
        let cancel = CancellationToken::new();
        let trigger = cancel.clone();
        provider.after_create("rg", move || trigger.cancel());

        let mut stack = Stack::new("chain");
        let rg = stack.add(ResourceNode::new(KIND, "rg", Properties::new())).unwrap();
        let vnet = stack
            .add(ResourceNode::new(KIND, "vnet", Properties::new().with("rg", rg.id())))
            .unwrap();
        stack
            .add(ResourceNode::new(KIND, "subnet", Properties::new().with("vnet", vnet.id())))
            .unwrap();

        let report = engine(&provider, &store)
            .apply(&stack, &mut NoProgress, &cancel)
            .unwrap();
        assert!(report.cancelled);
        assert_eq!(report.realized, vec![key("rg")]);
        assert_eq!(report.pending, vec![key("vnet"), key("subnet")]);
        assert_eq!(report.exit_code(), 2);
        assert_eq!(provider.created(), vec!["rg".to_string()]);
        assert!(vnet.id().peek().unwrap().is_err());
    }

    #[test]
    fn test_undeclared_records_are_pruned() {
        let provider = Arc::new(FakeProvider::new());
        let store = Arc::new(MemoryStore::new());
        let engine = engine(&provider, &store);
        engine
            .apply(&network(1), &mut NoProgress, &CancellationToken::new())
            .unwrap();

        let mut smaller = Stack::new("test");
        smaller
            .add(ResourceNode::new(KIND, "bucket", Properties::new()))
            .unwrap();
        let mut progress = Recorder::default();
        let report = engine
            .apply(&smaller, &mut progress, &CancellationToken::new())
            .unwrap();

        assert_eq!(progress.total, 6);
        assert_eq!(report.deleted.len(), 5);
        // Consumers go before their producers
        let deleted = provider.deleted();
        let at = |n: &str| deleted.iter().position(|d| d == n).unwrap();
        assert!(at("nic") < at("subnet"));
        assert!(at("subnet") < at("vnet"));
        assert!(at("vnet") < at("rg"));
        assert!(at("ip") < at("rg"));
        assert_eq!(store.len(), 1);
        assert!(report.is_success());
        assert!(progress.finished);
    }

    #[test]
    fn test_prune_can_be_disabled() {
        let provider = Arc::new(FakeProvider::new());
        let store = Arc::new(MemoryStore::new());
        engine(&provider, &store)
            .apply(&network(1), &mut NoProgress, &CancellationToken::new())
            .unwrap();

        let engine = Engine::new(Arc::clone(&provider), Arc::clone(&store)).with_options(EngineOptions {
            prune: false,
            ..Default::default()
        });
        let report = engine
            .apply(&Stack::new("empty"), &mut NoProgress, &CancellationToken::new())
            .unwrap();
        assert!(report.deleted.is_empty());
        assert_eq!(store.len(), 6);
    }

    #[test]
    fn test_missing_id_fails_the_node() {
        struct Anonymous;
        impl Provider for Anonymous {
            fn create_or_update(
                &self,
                _key: &ResourceKey,
                desired: &PropertyMap,
                _timeout: Duration,
            ) -> std::result::Result<PropertyMap, ProviderError> {
                Ok(desired.clone())
            }
            fn delete(&self, _kind: &str, _id: &str, _timeout: Duration) -> std::result::Result<(), ProviderError> {
                Ok(())
            }
        }

        let store = Arc::new(MemoryStore::new());
        let report = Engine::new(Anonymous, Arc::clone(&store))
            .apply(&network(1), &mut NoProgress, &CancellationToken::new())
            .unwrap();
        assert!(report.failed.iter().all(|f| f.error == NodeError::MissingId));
        assert!(report.realized.is_empty());
        assert!(store.is_empty());
    }

    #[test]
    fn test_undeclared_producer_is_a_declaration_error() {
        let stray = ResourceNode::new(KIND, "stray", Properties::new());
        let mut stack = Stack::new("test");
        stack
            .add(ResourceNode::new(KIND, "x", Properties::new().with("id", stray.handle().id())))
            .unwrap();

        let provider = Arc::new(FakeProvider::new());
        let store = Arc::new(MemoryStore::new());
        let err = engine(&provider, &store)
            .apply(&stack, &mut NoProgress, &CancellationToken::new())
            .unwrap_err();
        assert!(matches!(
            err,
            EngineError::Declaration(DeclarationError::UnknownDependency { .. })
        ));
        assert!(provider.created().is_empty());
    }

    #[test]
    fn test_cycle_is_rejected_before_any_provider_call() {
        let mut a = ResourceNode::new(KIND, "a", Properties::new());
        let mut b = ResourceNode::new(KIND, "b", Properties::new());
        let mut c = ResourceNode::new(KIND, "c", Properties::new());
        b.set("x", a.output("id"));
        c.set("x", b.output("id"));
        a.set("x", c.output("id"));

        let mut stack = Stack::new("test");
        stack
            .add(ResourceNode::new(KIND, "sibling", Properties::new()))
            .unwrap();
        for node in [a, b, c] {
            stack.add(node).unwrap();
        }

        let provider = Arc::new(FakeProvider::new());
        let store = Arc::new(MemoryStore::new());
        let err = engine(&provider, &store)
            .apply(&stack, &mut NoProgress, &CancellationToken::new())
            .unwrap_err();
        let EngineError::Declaration(DeclarationError::CyclicDependency { chain }) = &err else {
            panic!("expected a cycle, got {err:?}");
        };
        for name in ["a", "b", "c"] {
            assert!(chain.contains(&key(name)), "{name} missing from {chain:?}");
        }
        assert!(provider.created().is_empty());
        assert!(store.is_empty());
    }

    #[test]
    fn test_output_without_producer_is_rejected_before_any_provider_call() {
        let mut stack = Stack::new("test");
        stack
            .add(ResourceNode::new(KIND, "sibling", Properties::new()))
            .unwrap();
        stack
            .add(ResourceNode::new(
                KIND,
                "x",
                Properties::new().with("v", Output::<serde_json::Value>::new()),
            ))
            .unwrap();

        let provider = Arc::new(FakeProvider::new());
        let store = Arc::new(MemoryStore::new());
        let err = engine(&provider, &store)
            .apply(&stack, &mut NoProgress, &CancellationToken::new())
            .unwrap_err();
        let EngineError::Declaration(DeclarationError::InvalidProperty { key: bad, message }) = &err
        else {
            panic!("expected an invalid property, got {err:?}");
        };
        assert_eq!(*bad, key("x"));
        assert!(message.starts_with("v: "), "{message}");
        assert!(provider.created().is_empty());
    }

    #[test]
    fn test_applying_a_stack_twice_breaks_single_assignment() {
        let provider = Arc::new(FakeProvider::new());
        let store = Arc::new(MemoryStore::new());
        let engine = engine(&provider, &store);
        let stack = network(1);
        engine
            .apply(&stack, &mut NoProgress, &CancellationToken::new())
            .unwrap();
        let err = engine
            .apply(&stack, &mut NoProgress, &CancellationToken::new())
            .unwrap_err();
        assert!(matches!(err, EngineError::Internal { .. }));
    }
}
