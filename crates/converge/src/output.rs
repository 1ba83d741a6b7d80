//! Single-assignment future cells
//!
//! An [`Output`] holds a value that only exists once the resource producing it
//! has been realized, such as the remote id of a virtual network. Outputs are
//! embedded in other resources' properties; the set of resources an Output
//! came from (its provenance) is what the graph builder turns into edges.
//!
//! Resolution is synchronous: settling a cell runs every registered
//! continuation, in registration order, on the thread that settled it.

use crate::error::AlreadyResolvedError;
use crate::node::ResourceKey;
use std::collections::BTreeSet;
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use thiserror::Error;

/// Why an Output will never produce a value.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("{message}")]
pub struct OutputError {
    /// Resource whose failure caused this error, if any
    pub origin: Option<ResourceKey>,
    pub message: String,
}

impl OutputError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            origin: None,
            message: message.into(),
        }
    }

    pub fn from_resource(origin: ResourceKey, message: impl Into<String>) -> Self {
        Self {
            origin: Some(origin),
            message: message.into(),
        }
    }
}

type Settled<T> = Result<T, OutputError>;
type Continuation<T> = Box<dyn FnOnce(&Settled<T>) + Send>;

enum Slot<T> {
    Pending(Vec<Continuation<T>>),
    Settled(Settled<T>),
}

struct Cell<T> {
    slot: Mutex<Slot<T>>,
    dependencies: BTreeSet<ResourceKey>,
}

/// A value that becomes available once its producing resource is realized.
///
/// Cloning an Output yields another handle to the same cell.
pub struct Output<T> {
    cell: Arc<Cell<T>>,
}

impl<T> Clone for Output<T> {
    fn clone(&self) -> Self {
        Self {
            cell: Arc::clone(&self.cell),
        }
    }
}

impl<T: Clone + Send + 'static> Default for Output<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Clone + Send + 'static> Output<T> {
    /// Create an unresolved Output with no provenance
    pub fn new() -> Self {
        Self::pending_from(BTreeSet::new())
    }

    /// Create an unresolved Output produced by the given resources
    pub fn pending_from(dependencies: BTreeSet<ResourceKey>) -> Self {
        Self {
            cell: Arc::new(Cell {
                slot: Mutex::new(Slot::Pending(Vec::new())),
                dependencies,
            }),
        }
    }

    /// Create an Output that is already resolved
    pub fn resolved(value: T) -> Self {
        Self {
            cell: Arc::new(Cell {
                slot: Mutex::new(Slot::Settled(Ok(value))),
                dependencies: BTreeSet::new(),
            }),
        }
    }

    /// Resources this Output is derived from
    pub fn dependencies(&self) -> &BTreeSet<ResourceKey> {
        &self.cell.dependencies
    }

    /// Resolve the Output with a value.
    ///
    /// Fails with [`AlreadyResolvedError`] if the cell was settled before.
    pub fn resolve(&self, value: T) -> Result<(), AlreadyResolvedError> {
        self.settle(Ok(value))
    }

    /// Settle the Output with an error. Consumers see the error instead of a value.
    pub fn fail(&self, error: OutputError) -> Result<(), AlreadyResolvedError> {
        self.settle(Err(error))
    }

    /// Current value, or `None` while pending.
    pub fn peek(&self) -> Option<Settled<T>> {
        match &*self.lock() {
            Slot::Pending(_) => None,
            Slot::Settled(result) => Some(result.clone()),
        }
    }

    pub fn is_settled(&self) -> bool {
        matches!(&*self.lock(), Slot::Settled(_))
    }

    /// Register a continuation that runs once the Output settles.
    ///
    /// Runs immediately on the calling thread if the cell is already settled.
    pub fn on_settled<F>(&self, continuation: F)
    where
        F: FnOnce(&Settled<T>) + Send + 'static,
    {
        let settled = {
            let mut slot = self.lock();
            match &mut *slot {
                Slot::Pending(waiting) => {
                    waiting.push(Box::new(continuation));
                    return;
                }
                Slot::Settled(result) => result.clone(),
            }
        };
        continuation(&settled);
    }

    /// Transform the value once it resolves. Errors propagate unchanged.
    pub fn then<U, F>(&self, f: F) -> Output<U>
    where
        U: Clone + Send + 'static,
        F: FnOnce(T) -> U + Send + 'static,
    {
        self.and_then(move |value| Ok(f(value)))
    }

    /// Like [`then`](Self::then), but the transformation itself may fail.
    pub fn and_then<U, F>(&self, f: F) -> Output<U>
    where
        U: Clone + Send + 'static,
        F: FnOnce(T) -> Result<U, OutputError> + Send + 'static,
    {
        let next = Output::pending_from(self.dependencies().clone());
        let target = next.clone();
        self.on_settled(move |result| {
            // `target` is private to this continuation, so it settles exactly once
            let _ = target.settle(result.clone().and_then(f));
        });
        next
    }

    /// Combine Outputs into one that resolves when every input has resolved.
    ///
    /// Values keep input order whatever order the inputs resolve in. The first
    /// failing input fails the combined Output immediately.
    pub fn all(outputs: Vec<Output<T>>) -> Output<Vec<T>> {
        let dependencies = outputs
            .iter()
            .flat_map(|o| o.dependencies().iter().cloned())
            .collect();
        let combined = Output::pending_from(dependencies);

        if outputs.is_empty() {
            let _ = combined.resolve(Vec::new());
            return combined;
        }

        let gather = Arc::new(Mutex::new(Gather {
            values: vec![None; outputs.len()],
            remaining: outputs.len(),
        }));

        for (index, output) in outputs.iter().enumerate() {
            let gather = Arc::clone(&gather);
            let target = combined.clone();
            output.on_settled(move |result| match result {
                Err(e) => {
                    // Later failures find the cell settled already
                    let _ = target.fail(e.clone());
                }
                Ok(value) => {
                    let complete: Option<Vec<T>> = {
                        let mut g = gather.lock().unwrap_or_else(PoisonError::into_inner);
                        g.values[index] = Some(value.clone());
                        g.remaining -= 1;
                        (g.remaining == 0).then(|| g.values.drain(..).flatten().collect())
                    };
                    if let Some(values) = complete {
                        let _ = target.resolve(values);
                    }
                }
            });
        }

        combined
    }

    fn settle(&self, result: Settled<T>) -> Result<(), AlreadyResolvedError> {
        let waiting = {
            let mut slot = self.lock();
            match std::mem::replace(&mut *slot, Slot::Settled(result.clone())) {
                Slot::Pending(waiting) => waiting,
                previous @ Slot::Settled(_) => {
                    *slot = previous;
                    return Err(AlreadyResolvedError);
                }
            }
        };
        for continuation in waiting {
            continuation(&result);
        }
        Ok(())
    }

    fn lock(&self) -> MutexGuard<'_, Slot<T>> {
        self.cell.slot.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

struct Gather<T> {
    values: Vec<Option<T>>,
    remaining: usize,
}

impl<T: Clone + Send + 'static + fmt::Debug> fmt::Debug for Output<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut s = f.debug_struct("Output");
        match self.peek() {
            None => s.field("state", &"pending"),
            Some(Ok(value)) => s.field("value", &value),
            Some(Err(e)) => s.field("error", &e.message),
        };
        s.field("dependencies", &self.cell.dependencies).finish()
    }
}
