//! CLI execution logic.
//!
//! This module keeps `main` minimal by providing a single entry point that
//! loads configuration, runs the translation pipeline, writes the IR and
//! the run report, and turns error diagnostics into a failing result.

mod error;

pub use error::RunnerError;

use std::io::{self, Write as _};

use anyhow::{Context, Result};
use camino::Utf8Path;
use serde::Serialize;
use tracing::{debug, error, info, warn};

use crate::cli::Cli;
use crate::config::Config;
use crate::diagnostics::{DiagCode, Diagnostics, Severity};
use crate::fs::LocalFileSystem;
use crate::pipeline::{Translation, translate};
use crate::unknown::UnknownConstruct;

/// JSON document written by `--report`.
#[derive(Debug, Serialize)]
pub struct RunReport<'a> {
    /// Every diagnostic, in stage order.
    pub diagnostics: &'a Diagnostics,
    /// Every unknown construct, in id order.
    pub unknown_constructs: &'a [UnknownConstruct],
}

/// Execute the translation described by `cli`.
///
/// # Errors
///
/// Returns an error when the source directory or configuration cannot be
/// loaded, when an output cannot be written, or when the translation
/// recorded any `ERROR` diagnostic.
pub fn run(cli: &Cli) -> Result<()> {
    let source_dir = cli
        .directory
        .canonicalize_utf8()
        .with_context(|| format!("failed to resolve source directory {}", cli.directory))?;
    let config = load_config(cli, &source_dir)?;
    let mut translation = translate_with_pool(cli.jobs(), &source_dir, cli.file.as_deref(), &config)?;
    if tracing::enabled!(tracing::Level::DEBUG) {
        let graph = serde_json::to_string_pretty(&translation.include_graph)
            .context("failed to serialise include graph")?;
        debug!("include graph:\n{graph}");
    }
    mirror_diagnostics(&translation.diagnostics);

    let ir = serde_json::to_string_pretty(&translation.project)
        .context("failed to serialise project IR")?;
    let written = write_output("project IR", cli.output.as_deref(), &ir);
    if let Err(err) = &written {
        error!(code = %DiagCode::EmitWriteFailed, "{err}");
        translation.diagnostics.report_from(
            DiagCode::EmitWriteFailed,
            err.to_string(),
            None,
            "output",
        );
    }
    if let Some(path) = &cli.report {
        let report = RunReport {
            diagnostics: &translation.diagnostics,
            unknown_constructs: &translation.unknown_constructs,
        };
        let text = serde_json::to_string_pretty(&report).context("failed to serialise run report")?;
        write_output("run report", Some(path.as_path()), &text)
            .inspect_err(|err| error!(code = %DiagCode::EmitWriteFailed, "{err}"))?;
    }
    written?;

    let errors = translation.diagnostics.iter().filter(|d| d.is_error()).count();
    if errors > 0 {
        return Err(RunnerError::TranslationFailed { count: errors }.into());
    }
    Ok(())
}

/// Load `--config` (or defaults) and apply CLI overrides.
fn load_config(cli: &Cli, source_dir: &Utf8Path) -> Result<Config> {
    let mut config = match &cli.config {
        Some(path) => Config::from_path(path)
            .inspect_err(|err| error!(code = %err.code(), "{err}"))
            .with_context(|| format!("failed to load configuration {path}"))?,
        None => Config::default(),
    };
    if config.project_name.is_none() {
        config.project_name = source_dir.file_name().map(str::to_owned);
    }
    config.break_cycles |= cli.break_cycles;
    config.parallel |= cli.jobs() > 1;
    Ok(config)
}

fn translate_with_pool(
    jobs: usize,
    source_dir: &Utf8Path,
    entry: Option<&str>,
    config: &Config,
) -> Result<Translation> {
    let fs = LocalFileSystem;
    if !config.parallel {
        return Ok(translate(source_dir, entry, config, &fs));
    }
    // Zero lets rayon pick a thread count when parallelism came from config.
    let threads = if jobs > 1 { jobs } else { 0 };
    let pool = rayon::ThreadPoolBuilder::new()
        .num_threads(threads)
        .build()
        .context("failed to start evaluation worker pool")?;
    debug!(threads = pool.current_num_threads(), "evaluating on worker pool");
    Ok(pool.install(|| translate(source_dir, entry, config, &fs)))
}

/// Log each diagnostic at the level matching its severity.
fn mirror_diagnostics(diagnostics: &Diagnostics) {
    for diagnostic in diagnostics {
        match diagnostic.severity {
            Severity::Error => error!("{diagnostic}"),
            Severity::Warn => warn!("{diagnostic}"),
            Severity::Info => info!("{diagnostic}"),
        }
    }
}

/// Write `text` to `path`, or to standard output when no path is given.
fn write_output(what: &'static str, path: Option<&Utf8Path>, text: &str) -> Result<(), RunnerError> {
    let Some(path) = path else {
        let mut stdout = io::stdout().lock();
        return writeln!(stdout, "{text}").map_err(|source| RunnerError::Output {
            what,
            path: "<stdout>".into(),
            source,
        });
    };
    write_file(path, text).map_err(|source| RunnerError::Output {
        what,
        path: path.to_path_buf(),
        source,
    })?;
    info!(path = %path, "wrote {what}");
    Ok(())
}

fn write_file(path: &Utf8Path, text: &str) -> io::Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_str().is_empty()) {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::write(path, text)
}

#[cfg(test)]
mod tests;
