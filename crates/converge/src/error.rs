//! Error types for declaration, provider and engine failures.
//!
//! Errors are split by who can act on them:
//! - [`DeclarationError`] aborts a run before any provider call
//! - [`ProviderError`] is scoped to one node and categorized for retry
//! - [`EngineError`] is fatal to a whole run

use crate::node::ResourceKey;
use std::time::Duration;
use thiserror::Error;

/// Problems with the declared resource set, found before execution starts.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum DeclarationError {
    /// Two nodes share the same logical key
    #[error("duplicate resource: {0}")]
    DuplicateResource(ResourceKey),

    /// The dependency graph contains a cycle
    #[error("cyclic dependency: {}", format_chain(.chain))]
    CyclicDependency {
        /// Participating nodes, first node repeated at the end
        chain: Vec<ResourceKey>,
    },

    /// A property or `depends_on` references a node that was never declared
    #[error("{consumer} depends on undeclared resource {producer}")]
    UnknownDependency {
        consumer: ResourceKey,
        producer: ResourceKey,
    },

    /// Logical name does not match the allowed pattern
    #[error("invalid resource name '{0}': names must start with a letter and contain only letters, digits, '_', '-' or '.'")]
    InvalidName(String),

    /// A property failed validation
    #[error("invalid property on {key}: {message}")]
    InvalidProperty { key: ResourceKey, message: String },
}

fn format_chain(chain: &[ResourceKey]) -> String {
    chain
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(" -> ")
}

/// An Output was resolved twice. Always a bug in the caller.
#[derive(Debug, Clone, Copy, Error, PartialEq, Eq)]
#[error("output already resolved")]
pub struct AlreadyResolvedError;

/// Categories of provider errors for retry logic.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    /// Rate limits, 5xx-equivalents, dropped connections
    Transient,
    /// The call did not finish within its deadline
    Timeout,
    /// Invalid property, conflict, 4xx-equivalents
    Permanent,
}

impl ErrorCategory {
    /// Whether this error category is worth retrying.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Transient | Self::Timeout)
    }

    /// Get a user-friendly description of this error category.
    pub fn description(&self) -> &'static str {
        match self {
            Self::Transient => "Transient provider error",
            Self::Timeout => "Provider call timed out",
            Self::Permanent => "Provider rejected the request",
        }
    }
}

/// Errors returned by a [`Provider`](crate::Provider).
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ProviderError {
    /// Retryable failure
    #[error("transient provider error: {message}")]
    Transient { message: String },

    /// The call exceeded its timeout
    #[error("provider call timed out after {}s", .after.as_secs_f64())]
    Timeout { after: Duration },

    /// Non-retryable failure
    #[error("provider error: {message}")]
    Permanent { message: String },
}

impl ProviderError {
    pub fn transient(message: impl Into<String>) -> Self {
        Self::Transient {
            message: message.into(),
        }
    }

    pub fn permanent(message: impl Into<String>) -> Self {
        Self::Permanent {
            message: message.into(),
        }
    }

    /// Get the error category for retry logic.
    pub fn category(&self) -> ErrorCategory {
        match self {
            Self::Transient { .. } => ErrorCategory::Transient,
            Self::Timeout { .. } => ErrorCategory::Timeout,
            Self::Permanent { .. } => ErrorCategory::Permanent,
        }
    }

    /// Whether this error is typically transient and worth retrying.
    pub fn is_retryable(&self) -> bool {
        self.category().is_retryable()
    }
}

/// Why a single node failed. Recorded in the run report, never fatal.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum NodeError {
    /// Provider failed permanently, or transiently until retries ran out
    #[error("{error} (after {attempts} attempt(s))")]
    Provider { error: ProviderError, attempts: u32 },

    /// A dependency resolved to an error at execution time
    #[error("unresolved input: {0}")]
    Input(String),

    /// Provider answered without a usable remote identifier
    #[error("provider returned no 'id' for the resource")]
    MissingId,

    /// Reconciliation store read or write failed
    #[error("state store: {0}")]
    Store(String),
}

/// Fatal run errors.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error(transparent)]
    Declaration(#[from] DeclarationError),

    /// An internal invariant broke (e.g. a node's output resolved twice)
    #[error("internal engine error on {key}: {source}")]
    Internal {
        key: ResourceKey,
        #[source]
        source: AlreadyResolvedError,
    },

    /// The reconciliation store could not be listed
    #[error("state store: {0}")]
    Store(#[source] anyhow::Error),

    #[error("failed to create worker pool: {0}")]
    Pool(#[from] rayon::ThreadPoolBuildError),

    /// Tear-down target with no reconciliation record
    #[error("no recorded resource named {0}")]
    UnknownResource(ResourceKey),

    #[error("confirmation failed: {0}")]
    Confirm(#[source] anyhow::Error),
}

/// Result type for engine operations
pub type Result<T> = std::result::Result<T, EngineError>;
