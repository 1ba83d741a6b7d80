//! Error types for argument validation.
//!
//! Validation errors are raised while a stack is being declared, before any
//! call reaches a control plane. Each variant names the offending value so
//! the message is actionable on its own.

use thiserror::Error;

/// Errors raised while parsing or validating resource arguments.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum Error {
    /// Malformed CIDR block
    #[error("invalid CIDR '{value}': {reason}")]
    InvalidCidr {
        /// The text that failed to parse
        value: String,
        /// What is wrong with it
        reason: String,
    },

    /// Malformed or out-of-range IP address
    #[error("invalid address '{value}': {reason}")]
    InvalidAddress {
        /// The text that failed to parse
        value: String,
        /// What is wrong with it
        reason: String,
    },

    /// A field holds a value the control plane would reject
    #[error("{field}: {message}")]
    InvalidField {
        /// Argument field name
        field: &'static str,
        /// Description of the problem
        message: String,
    },
}

impl Error {
    /// Shorthand for [`Error::InvalidField`].
    pub fn field(field: &'static str, message: impl Into<String>) -> Self {
        Self::InvalidField {
            field,
            message: message.into(),
        }
    }
}

/// Result type for argument validation.
pub type Result<T> = std::result::Result<T, Error>;
