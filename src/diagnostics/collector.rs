//! Accumulating collector for runtime diagnostics.

use super::Diagnostic;
use stillwater::validation::Validation;
use stillwater::NonEmptyVec;

/// Keeps every warning and error an interpreter has seen.
///
/// Errors are also queued as pending until the next [`Collector::checkpoint`],
/// which reports all of them at once.
///
/// # Example
///
/// ```rust
/// use statecharts::diagnostics::{Collector, Diagnostic};
///
/// let mut collector = Collector::new();
/// collector.error(Diagnostic::UnknownChild { id: "logger".to_string() });
/// collector.error(Diagnostic::UnresolvedAction { name: "inc".to_string() });
///
/// assert!(collector.checkpoint().is_failure());
/// assert!(collector.checkpoint().is_success());
/// assert_eq!(collector.errors().len(), 2);
/// ```
#[derive(Debug, Default, Clone)]
pub struct Collector {
    warnings: Vec<Diagnostic>,
    errors: Vec<Diagnostic>,
    pending: Vec<Diagnostic>,
}

impl Collector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn warn(&mut self, diagnostic: Diagnostic) {
        tracing::warn!(%diagnostic, "statechart warning");
        self.warnings.push(diagnostic);
    }

    pub fn error(&mut self, diagnostic: Diagnostic) {
        tracing::error!(%diagnostic, "statechart error");
        self.errors.push(diagnostic.clone());
        self.pending.push(diagnostic);
    }

    pub fn warnings(&self) -> &[Diagnostic] {
        &self.warnings
    }

    pub fn errors(&self) -> &[Diagnostic] {
        &self.errors
    }

    pub fn has_pending(&self) -> bool {
        !self.pending.is_empty()
    }

    /// Drain pending errors, accumulating all of them into one failure.
    pub fn checkpoint(&mut self) -> Validation<(), NonEmptyVec<Diagnostic>> {
        let checks: Vec<Validation<(), NonEmptyVec<Diagnostic>>> = self
            .pending
            .drain(..)
            .map(Validation::fail)
            .collect();
        Validation::all_vec(checks).map(|_| ())
    }
}
