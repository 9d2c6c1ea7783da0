//! Error taxonomy
//!
//! Parse and configuration failures abort before any control-plane
//! interaction. Control-plane failures inside background node tasks are
//! logged and swallowed; inside a scenario step they abort the scenario.
//! Shutdown failures are logged, never raised.

use thiserror::Error;

/// Main error type for fleet and scenario operations
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum Error {
    /// Kubernetes API error without further context
    #[error("kubernetes error: {0}")]
    Kube(#[from] kube::Error),

    /// Kubernetes API error with the failing operation and target attached
    #[error("{operation} `{target}`: {source}")]
    ControlPlane {
        /// Operation that failed (e.g. "list pods", "create node")
        operation: String,
        /// Target name or selector the operation was applied to
        target: String,
        /// The underlying kube-rs error
        #[source]
        source: kube::Error,
    },

    /// Malformed scenario line or configuration document
    #[error("parse error: {message} (input: `{input}`)")]
    Parse {
        /// The offending input
        input: String,
        /// What was expected instead
        message: String,
    },

    /// Semantically invalid or missing configuration
    #[error("config error: {0}")]
    Config(String),

    /// An assert step did not observe the expected state within its window
    #[error("assertion failed: {0}")]
    Assertion(String),

    /// A change or delete step had no valid transition to perform
    #[error("transition error: {0}")]
    Transition(String),

    /// Filesystem error while reading configs or resource descriptors
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// YAML/JSON encoding or decoding error
    #[error("serialization error: {0}")]
    Serialization(String),
}

impl Error {
    /// Create a control-plane error with operation and target context
    pub fn control_plane(
        operation: impl Into<String>,
        target: impl Into<String>,
        source: kube::Error,
    ) -> Self {
        Self::ControlPlane {
            operation: operation.into(),
            target: target.into(),
            source,
        }
    }

    /// Create a parse error carrying the offending input
    pub fn parse(input: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Parse {
            input: input.into(),
            message: message.into(),
        }
    }

    /// Create a config error with the given message
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Create an assertion failure with the given message
    pub fn assertion(msg: impl Into<String>) -> Self {
        Self::Assertion(msg.into())
    }

    /// Create a transition error with the given message
    pub fn transition(msg: impl Into<String>) -> Self {
        Self::Transition(msg.into())
    }

    /// Create a serialization error with the given message
    pub fn serialization(msg: impl Into<String>) -> Self {
        Self::Serialization(msg.into())
    }
}
