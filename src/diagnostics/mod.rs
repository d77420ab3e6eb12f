//! Diagnostics shared by every pipeline stage.
//!
//! Stages never fail on input-shaped problems. They record a [`Diagnostic`]
//! in a [`Diagnostics`] collector and carry on with a best-effort result.
//! The collector drops exact duplicates so repeated passes over the same
//! input do not inflate reports.
//!
//! ```rust
//! use gmake2cmake::diagnostics::{DiagCode, Diagnostics, Severity};
//!
//! let mut diags = Diagnostics::new();
//! diags.report(DiagCode::IrUnmappedFlag, "flag '-Wall' has no mapping", None);
//! diags.report(DiagCode::IrUnmappedFlag, "flag '-Wall' has no mapping", None);
//! assert_eq!(diags.len(), 1);
//! assert!(!diags.has_errors());
//! diags.add(Severity::Error, DiagCode::IrDuplicateTarget, "dup", None, None);
//! assert!(diags.has_errors());
//! ```

mod codes;

use std::collections::HashSet;
use std::fmt;

use serde::Serialize;

use crate::ast::SourceLocation;

pub use codes::{Category, DiagCode};

/// How serious a diagnostic is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Severity {
    /// The run is considered failed.
    Error,
    /// Output was produced but degraded.
    Warn,
    /// Informational only.
    Info,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Error => "ERROR",
            Self::Warn => "WARN",
            Self::Info => "INFO",
        })
    }
}

/// A single message produced by a pipeline stage.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct Diagnostic {
    /// Effective severity.
    pub severity: Severity,
    /// Code from the closed vocabulary.
    pub code: DiagCode,
    /// Human readable message.
    pub message: String,
    /// Source position, when the problem is tied to one.
    pub location: Option<SourceLocation>,
    /// Free-form provenance, such as the target or file involved.
    pub origin: Option<String>,
}

impl Diagnostic {
    /// Whether this diagnostic fails the run.
    #[must_use]
    pub fn is_error(&self) -> bool {
        self.severity == Severity::Error
    }

    /// Category of the diagnostic's code.
    #[must_use]
    pub const fn category(&self) -> Category {
        self.code.category()
    }
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}[{}]", self.severity, self.code)?;
        if let Some(location) = &self.location {
            write!(f, " {location}")?;
        }
        write!(f, ": {}", self.message)?;
        if let Some(origin) = &self.origin {
            write!(f, " ({origin})")?;
        }
        Ok(())
    }
}

/// Ordered, deduplicating collection of diagnostics.
#[derive(Debug, Clone, Default)]
pub struct Diagnostics {
    items: Vec<Diagnostic>,
    seen: HashSet<Diagnostic>,
}

impl Diagnostics {
    /// Create an empty collector.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a diagnostic with an explicit severity.
    ///
    /// Exact duplicates of an earlier entry are ignored.
    pub fn add(
        &mut self,
        severity: Severity,
        code: DiagCode,
        message: impl Into<String>,
        location: Option<SourceLocation>,
        origin: Option<String>,
    ) {
        self.push(Diagnostic {
            severity,
            code,
            message: message.into(),
            location,
            origin,
        });
    }

    /// Record a diagnostic using the code's default severity.
    pub fn report(
        &mut self,
        code: DiagCode,
        message: impl Into<String>,
        location: Option<SourceLocation>,
    ) {
        self.add(code.default_severity(), code, message, location, None);
    }

    /// Record a diagnostic with an origin using the code's default severity.
    pub fn report_from(
        &mut self,
        code: DiagCode,
        message: impl Into<String>,
        location: Option<SourceLocation>,
        origin: impl Into<String>,
    ) {
        self.add(
            code.default_severity(),
            code,
            message,
            location,
            Some(origin.into()),
        );
    }

    /// Record an already built diagnostic.
    pub fn push(&mut self, diagnostic: Diagnostic) {
        if self.seen.insert(diagnostic.clone()) {
            self.items.push(diagnostic);
        }
    }

    /// Whether any `ERROR` diagnostic was recorded.
    #[must_use]
    pub fn has_errors(&self) -> bool {
        self.items.iter().any(Diagnostic::is_error)
    }

    /// Number of recorded diagnostics.
    #[must_use]
    pub fn len(&self) -> usize {
        self.items.len()
    }

    /// Whether nothing was recorded.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Iterate in recording order.
    pub fn iter(&self) -> impl Iterator<Item = &Diagnostic> {
        self.items.iter()
    }

    /// Diagnostics carrying `code`.
    pub fn with_code(&self, code: DiagCode) -> impl Iterator<Item = &Diagnostic> {
        self.items.iter().filter(move |d| d.code == code)
    }

    /// Number of diagnostics carrying `code`.
    #[must_use]
    pub fn count(&self, code: DiagCode) -> usize {
        self.with_code(code).count()
    }

    /// Recorded diagnostics as a slice.
    #[must_use]
    pub fn as_slice(&self) -> &[Diagnostic] {
        &self.items
    }

    /// Consume the collector.
    #[must_use]
    pub fn into_vec(self) -> Vec<Diagnostic> {
        self.items
    }
}

impl Extend<Diagnostic> for Diagnostics {
    fn extend<T: IntoIterator<Item = Diagnostic>>(&mut self, iter: T) {
        for diagnostic in iter {
            self.push(diagnostic);
        }
    }
}

impl IntoIterator for Diagnostics {
    type Item = Diagnostic;
    type IntoIter = std::vec::IntoIter<Diagnostic>;

    fn into_iter(self) -> Self::IntoIter {
        self.items.into_iter()
    }
}

impl<'a> IntoIterator for &'a Diagnostics {
    type Item = &'a Diagnostic;
    type IntoIter = std::slice::Iter<'a, Diagnostic>;

    fn into_iter(self) -> Self::IntoIter {
        self.items.iter()
    }
}

impl Serialize for Diagnostics {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.items.serialize(serializer)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    fn loc(line: usize) -> Option<SourceLocation> {
        Some(SourceLocation::new("Makefile", line, 1))
    }

    #[rstest]
    fn dedupes_on_the_full_tuple() {
        let mut diags = Diagnostics::new();
        diags.report(DiagCode::ParserUnknownConstruct, "odd line", loc(1));
        diags.report(DiagCode::ParserUnknownConstruct, "odd line", loc(1));
        diags.report(DiagCode::ParserUnknownConstruct, "odd line", loc(2));
        diags.add(
            Severity::Error,
            DiagCode::ParserUnknownConstruct,
            "odd line",
            loc(2),
            None,
        );
        diags.report_from(DiagCode::ParserUnknownConstruct, "odd line", loc(2), "x");
        assert_eq!(diags.len(), 4);
    }

    #[rstest]
    fn has_errors_only_for_error_severity() {
        let mut diags = Diagnostics::new();
        diags.report(DiagCode::PatternNoMatch, "no files", None);
        diags.report(DiagCode::DiscoveryIgnoredPath, "skipped", None);
        assert!(!diags.has_errors());
        diags.report(DiagCode::IrDependencyCycle, "a -> a", None);
        assert!(diags.has_errors());
    }

    #[rstest]
    fn display_includes_code_location_and_origin() {
        let diag = Diagnostic {
            severity: Severity::Warn,
            code: DiagCode::IrUnmappedFlag,
            message: "flag '-Wall' has no mapping".into(),
            location: loc(3),
            origin: Some("app".into()),
        };
        insta::assert_snapshot!(
            diag.to_string(),
            @"WARN[IR_UNMAPPED_FLAG] Makefile:3:1: flag '-Wall' has no mapping (app)"
        );
    }
}
