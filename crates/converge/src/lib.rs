//! # Converge
//!
//! Declarative resource provisioning.
//!
//! Programs declare the resources they want as [`ResourceNode`]s in a
//! [`Stack`]. Properties of one resource may embed [`Output`]s of another,
//! such as a subnet taking the id of the virtual network it lives in. Those
//! references become the edges of a [`DependencyGraph`], and the [`Engine`]
//! realizes nodes through a [`Provider`] as soon as their producers are done.
//!
//! ## Core Concepts
//!
//! - **Output**: a single-assignment cell holding a value that only exists
//!   after its producer is realized
//! - **ResourceNode**: one declared resource and its desired properties
//! - **DependencyGraph**: validated producer/consumer edges with a
//!   deterministic topological order
//! - **Engine**: bounded-parallel convergence with retries, cancellation,
//!   idempotent re-runs and reverse-order tear-down
//! - **StateStore**: per-resource reconciliation records keyed by logical name
//!
//! ## Example
//!
//! ```ignore
//! use converge::{CancellationToken, Engine, MemoryStore, NoProgress, Properties, ResourceNode, Stack};
//!
//! let mut stack = Stack::new("dev");
//! let vnet = stack.add(ResourceNode::new(
//!     "network:VirtualNetwork",
//!     "vnet",
//!     Properties::new().with("address_space", "10.0.0.0/16"),
//! ))?;
//! stack.add(ResourceNode::new(
//!     "network:Subnet",
//!     "snet",
//!     Properties::new().with("virtual_network_id", vnet.id()),
//! ))?;
//!
//! let engine = Engine::new(provider, MemoryStore::new());
//! let report = engine.apply(&stack, &mut NoProgress, &CancellationToken::new())?;
//! assert!(report.is_success());
//! ```

pub mod context;
pub mod error;
pub mod executor;
pub mod graph;
pub mod node;
pub mod output;
pub mod property;
pub mod provider;
pub mod report;
pub mod retry;
mod schedule;
pub mod stack;
pub mod state;
mod teardown;
pub mod types;

#[cfg(test)]
mod testing;

pub use context::{AutoConfirm, AutoDecline, CancellationToken, ConfirmCallback, NoProgress, ProgressCallback};
pub use error::{AlreadyResolvedError, DeclarationError, EngineError, ErrorCategory, NodeError, ProviderError, Result};
pub use executor::Engine;
pub use graph::DependencyGraph;
pub use node::{Lifecycle, ResourceHandle, ResourceKey, ResourceNode, ResourceSpec};
pub use output::{Output, OutputError};
pub use property::{Properties, Property, PropertyMap, fingerprint};
pub use provider::{Provider, remote_id};
pub use report::{NodeFailure, RunReport, SkippedNode};
pub use retry::{RetryCallback, RetryConfig, with_retry};
pub use stack::{Stack, TAGS_PROPERTY};
pub use state::{MemoryStore, ReconciliationRecord, StateStore};
pub use types::{EngineOptions, ExecuteSummary, NodeOutcome};
