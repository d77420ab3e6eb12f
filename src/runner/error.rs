//! Error types for the runner module.
//!
//! Kept in their own submodule so the lint suppression needed by the
//! derive macros stays narrow.

// The unused_assignments lint fires on thiserror/miette derive output in
// some compiler versions only, so `#[expect]` cannot be used here.
// FIXME(rust-lang/rust#130021): remove once upstream is fixed.
#![allow(
    clippy::allow_attributes,
    clippy::allow_attributes_without_reason,
    unused_assignments
)]

use camino::Utf8PathBuf;
use miette::Diagnostic;
use thiserror::Error;

/// Errors raised while running a translation from the CLI.
#[derive(Debug, Error, Diagnostic)]
pub enum RunnerError {
    /// At least one `ERROR` diagnostic was recorded.
    #[error("translation finished with {count} error diagnostic(s)")]
    #[diagnostic(
        code(gmake2cmake::runner::translation_failed),
        help("pass --report FILE to see every diagnostic")
    )]
    TranslationFailed {
        /// Number of error diagnostics.
        count: usize,
    },
    /// An output could not be written.
    #[error("failed to write {what} to {path}")]
    #[diagnostic(code(gmake2cmake::runner::write_failed))]
    Output {
        /// Which output failed.
        what: &'static str,
        /// Destination path.
        path: Utf8PathBuf,
        /// Underlying I/O failure.
        #[source]
        source: std::io::Error,
    },
}
