//! Build errors for node and machine builders.

use thiserror::Error;

/// Errors that can occur when building nodes, transitions and machines.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum BuildError {
    #[error("Initial state ({initial}) of {path} is not a child. Add it with .state(name, node)")]
    UnknownInitial { path: String, initial: String },

    #[error("Transition target ({target}) declared at {path} does not exist")]
    InvalidTarget { path: String, target: String },

    #[error("Event type declared at {path} is empty")]
    EmptyEventType { path: String },

    #[error("Promise id declared at {path} is empty")]
    EmptyPromiseId { path: String },

    #[error("Context must be a JSON object")]
    InvalidContext,
}
