//! Warnings and errors collected while interpreting a machine.
//!
//! Nothing inside the interpreter panics on a bad reference or a misbehaving
//! callable. Problems are described by a [`Diagnostic`] and funneled into a
//! [`Collector`], which logs them and decides when they surface.

mod collector;

pub use collector::Collector;

use std::time::Duration;
use thiserror::Error;

/// A problem observed at runtime.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum Diagnostic {
    #[error("Action ({name}) is not provided")]
    UnresolvedAction { name: String },

    #[error("Predicate ({name}) is not provided")]
    UnresolvedPredicate { name: String },

    #[error("Delay ({name}) is not provided")]
    UnresolvedDelay { name: String },

    #[error("Promise ({name}) is not provided")]
    UnresolvedPromise { name: String },

    #[error("Child ({id}) is not defined")]
    UnknownChild { id: String },

    #[error("Delay ({name}) is too short")]
    DelayTooShort { name: String, delay: Duration },

    #[error("Delay ({name}) is too long")]
    DelayTooLong { name: String, delay: Duration },

    #[error("{operation} timed out after {after:?}")]
    Timeout { operation: String, after: Duration },

    #[error("Too many self-transitions ({max})")]
    MaxSelfTransitions { max: usize },

    #[error("Target ({target}) is not reachable")]
    UnreachableTarget { target: String },

    #[error("No async runtime to drive {operation}")]
    NoRuntime { operation: String },
}
