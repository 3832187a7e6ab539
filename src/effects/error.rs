//! Errors surfaced by interpreter operations.

use crate::diagnostics::Diagnostic;
use thiserror::Error;

/// Errors returned by the public interpreter operations.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum InterpreterError {
    #[error("Maximum self-transitions ({max}) exceeded")]
    SelfTransitionsExceeded { max: usize },

    #[error("Interpreter is stopped")]
    Stopped,

    #[error("{} error(s) collected: {}", .0.len(), join(.0))]
    Checkpoint(Vec<Diagnostic>),
}

fn join(diagnostics: &[Diagnostic]) -> String {
    diagnostics
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn checkpoint_lists_every_diagnostic() {
        let error = InterpreterError::Checkpoint(vec![
            Diagnostic::UnknownChild {
                id: "a".to_string(),
            },
            Diagnostic::MaxSelfTransitions { max: 3 },
        ]);
        assert_eq!(
            error.to_string(),
            "2 error(s) collected: Child (a) is not defined; Too many self-transitions (3)"
        );
    }
}
