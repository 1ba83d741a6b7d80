//! Ready-queue scheduling shared by provisioning and tear-down
//!
//! A single coordinating thread owns the [`Schedule`]; workers on the rayon
//! pool only ever see one node and report back over a channel. Nothing else
//! touches scheduling state, so lifecycle transitions are serialized.

use crate::context::{CancellationToken, ProgressCallback};
use crate::error::{EngineError, NodeError, ProviderError};
use crate::node::{Lifecycle, ResourceKey};
use crate::retry::RetryCallback;
use rayon::ThreadPool;
use std::cmp::Reverse;
use std::collections::BinaryHeap;
use std::panic::{self, AssertUnwindSafe};
use std::sync::mpsc::{self, Sender};
use std::time::Duration;

/// Lifecycle bookkeeping for one run.
///
/// `prerequisites[n]` lists the nodes that must finish before `n` may start;
/// among ready nodes the lowest `priority` is dispatched first.
#[derive(Debug)]
pub(crate) struct Schedule {
    state: Vec<Lifecycle>,
    waiting: Vec<usize>,
    dependents: Vec<Vec<usize>>,
    priority: Vec<usize>,
    ready: BinaryHeap<Reverse<(usize, usize)>>,
}

impl Schedule {
    pub(crate) fn new(prerequisites: &[Vec<usize>], priority: Vec<usize>) -> Self {
        let len = prerequisites.len();
        let mut dependents = vec![Vec::new(); len];
        for (node, prereqs) in prerequisites.iter().enumerate() {
            for &p in prereqs {
                dependents[p].push(node);
            }
        }

        let mut schedule = Self {
            state: vec![Lifecycle::Pending; len],
            waiting: prerequisites.iter().map(Vec::len).collect(),
            dependents,
            priority,
            ready: BinaryHeap::new(),
        };
        for node in 0..len {
            if schedule.waiting[node] == 0 {
                schedule.enqueue(node);
            }
        }
        schedule
    }

    fn enqueue(&mut self, node: usize) {
        self.state[node] = Lifecycle::Scheduled;
        self.ready.push(Reverse((self.priority[node], node)));
    }

    pub(crate) fn state(&self, node: usize) -> Lifecycle {
        self.state[node]
    }

    /// Take the next ready node and mark it in flight
    pub(crate) fn dispatch(&mut self) -> Option<usize> {
        let Reverse((_, node)) = self.ready.pop()?;
        self.state[node] = Lifecycle::InFlight;
        Some(node)
    }

    /// Mark a node realized and release dependents whose prerequisites are all done
    pub(crate) fn complete(&mut self, node: usize) {
        self.state[node] = Lifecycle::Realized;
        for dependent in self.dependents[node].clone() {
            self.waiting[dependent] -= 1;
            if self.waiting[dependent] == 0 && self.state[dependent] == Lifecycle::Pending {
                self.enqueue(dependent);
            }
        }
    }

    /// Mark a node failed and every transitive dependent skipped.
    ///
    /// Returns the newly skipped nodes in priority order.
    pub(crate) fn fail(&mut self, node: usize) -> Vec<usize> {
        self.state[node] = Lifecycle::Failed;
        let mut blocked = Vec::new();
        let mut stack = self.dependents[node].clone();
        while let Some(dependent) = stack.pop() {
            if self.state[dependent] == Lifecycle::Pending {
                self.state[dependent] = Lifecycle::Skipped;
                blocked.push(dependent);
                stack.extend(self.dependents[dependent].iter().copied());
            }
        }
        blocked.sort_by_key(|&n| self.priority[n]);
        blocked
    }

    /// Nodes that never reached a terminal state, in priority order
    pub(crate) fn unfinished(&self) -> Vec<usize> {
        let mut nodes: Vec<usize> = (0..self.state.len())
            .filter(|&n| matches!(self.state[n], Lifecycle::Pending | Lifecycle::Scheduled))
            .collect();
        nodes.sort_by_key(|&n| self.priority[n]);
        nodes
    }
}

/// Message from a worker to the coordinator
pub(crate) enum Event<R> {
    Done {
        node: usize,
        result: Result<R, NodeError>,
    },
    Retrying {
        node: usize,
        attempt: u32,
        error: ProviderError,
        delay: Duration,
    },
}

/// Forwards retry notices from a worker to the coordinator
pub(crate) struct RetryNotifier<R> {
    node: usize,
    tx: Sender<Event<R>>,
}

impl<R> RetryCallback for RetryNotifier<R> {
    fn on_retry(&self, attempt: u32, _max_attempts: u32, error: &ProviderError, delay: Duration) {
        let _ = self.tx.send(Event::Retrying {
            node: self.node,
            attempt,
            error: error.clone(),
            delay,
        });
    }
}

/// Run a schedule to completion on `pool`.
///
/// `work` runs on pool threads, at most `limit` at a time. `handle` runs on
/// the calling thread for every finished node and is the only place the
/// schedule advances. Cancellation is checked before each dispatch; work
/// already in flight is always drained. Returns whether the run was cancelled.
#[allow(clippy::too_many_arguments)]
pub(crate) fn drive<R, W, H>(
    pool: &ThreadPool,
    schedule: &mut Schedule,
    keys: &[ResourceKey],
    limit: usize,
    cancel: &CancellationToken,
    progress: &mut dyn ProgressCallback,
    work: W,
    mut handle: H,
) -> Result<bool, EngineError>
where
    R: Send,
    W: Fn(usize, &RetryNotifier<R>) -> Result<R, NodeError> + Sync,
    H: FnMut(usize, Result<R, NodeError>, &mut Schedule, &mut dyn ProgressCallback) -> Result<(), EngineError>,
{
    let (tx, rx) = mpsc::channel::<Event<R>>();
    let work = &work;
    let limit = limit.max(1);
    let mut cancelled = false;
    let mut fatal: Option<EngineError> = None;

    pool.in_place_scope(|scope| {
        let mut in_flight = 0usize;
        loop {
            while fatal.is_none() && in_flight < limit {
                if cancel.is_cancelled() {
                    if !cancelled {
                        log::warn!("Run cancelled, waiting for {in_flight} in-flight call(s)");
                    }
                    cancelled = true;
                    break;
                }
                let Some(node) = schedule.dispatch() else {
                    break;
                };
                log::debug!("Dispatching {}", keys[node]);
                progress.on_node_start(&keys[node]);
                in_flight += 1;

                let tx = tx.clone();
                scope.spawn(move |_| {
                    let notifier = RetryNotifier {
                        node,
                        tx: tx.clone(),
                    };
                    // A panicking worker still has to report back, or in_flight never drains
                    let result = panic::catch_unwind(AssertUnwindSafe(|| work(node, &notifier)))
                        .unwrap_or_else(|_| {
                            Err(NodeError::Provider {
                                error: ProviderError::permanent("provider panicked"),
                                attempts: 1,
                            })
                        });
                    let _ = tx.send(Event::Done { node, result });
                });
            }

            if in_flight == 0 {
                break;
            }
            let Ok(event) = rx.recv() else {
                break;
            };
            match event {
                Event::Retrying {
                    node,
                    attempt,
                    error,
                    delay,
                } => progress.on_retry(&keys[node], attempt, &error, delay),
                Event::Done { node, result } => {
                    in_flight -= 1;
                    if let Err(e) = handle(node, result, schedule, progress) {
                        log::error!("{e}");
                        fatal.get_or_insert(e);
                    }
                }
            }
        }
    });

    match fatal {
        Some(e) => Err(e),
        None => Ok(cancelled),
    }
}

/// Build the worker pool for a run
pub(crate) fn worker_pool(limit: usize) -> Result<ThreadPool, EngineError> {
    Ok(rayon::ThreadPoolBuilder::new()
        .num_threads(limit.max(1))
        .thread_name(|i| format!("converge-worker-{i}"))
        .build()?)
}
