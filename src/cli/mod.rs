//! Command line interface definition using clap.
//!
//! The surface is deliberately small: where to find the makefile, where
//! to write the IR and the run report, and how much parallelism to use.

use camino::Utf8PathBuf;
use clap::Parser;

mod parsing;

use parsing::parse_jobs;

/// Maximum number of jobs accepted by the CLI.
const MAX_JOBS: usize = 64;

/// Translate a GNU make project into a target-based build IR.
#[derive(Debug, Clone, Parser)]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Directory containing the entry makefile.
    #[arg(short = 'C', long, value_name = "DIR", default_value = ".")]
    pub directory: Utf8PathBuf,

    /// Entry makefile name, tried before the canonical names.
    #[arg(short, long, value_name = "NAME")]
    pub file: Option<String>,

    /// YAML configuration file.
    #[arg(long, value_name = "FILE")]
    pub config: Option<Utf8PathBuf>,

    /// Write the project IR here instead of standard output.
    #[arg(short, long, value_name = "FILE")]
    pub output: Option<Utf8PathBuf>,

    /// Write diagnostics and unknown constructs to this JSON file.
    #[arg(long, value_name = "FILE")]
    pub report: Option<Utf8PathBuf>,

    /// Evaluate independent makefile groups on this many threads.
    #[arg(short, long, value_name = "N", value_parser = parse_jobs)]
    pub jobs: Option<usize>,

    /// Remove one edge from each dependency cycle.
    #[arg(long)]
    pub break_cycles: bool,

    /// Enable verbose logging output.
    #[arg(short, long)]
    pub verbose: bool,
}

impl Cli {
    /// Number of worker threads requested, defaulting to one.
    #[must_use]
    pub fn jobs(&self) -> usize {
        self.jobs.unwrap_or(1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    fn defaults() {
        let cli = Cli::try_parse_from(["gmake2cmake"]).expect("parse");
        assert_eq!(cli.directory, ".");
        assert_eq!(cli.jobs(), 1);
        assert!(cli.output.is_none());
        assert!(!cli.break_cycles);
    }

    #[rstest]
    fn all_flags() {
        let cli = Cli::try_parse_from([
            "gmake2cmake",
            "-C",
            "proj",
            "-f",
            "build.mk",
            "--config",
            "g2c.yaml",
            "-o",
            "ir.json",
            "--report",
            "report.json",
            "-j",
            "4",
            "--break-cycles",
            "-v",
        ])
        .expect("parse");
        assert_eq!(cli.directory, "proj");
        assert_eq!(cli.file.as_deref(), Some("build.mk"));
        assert_eq!(cli.jobs(), 4);
        assert!(cli.break_cycles);
        assert!(cli.verbose);
    }

    #[rstest]
    #[case("0")]
    #[case("65")]
    #[case("many")]
    fn invalid_job_counts(#[case] jobs: &str) {
        let err = Cli::try_parse_from(["gmake2cmake", "-j", jobs]).expect_err("invalid jobs");
        assert_eq!(err.kind(), clap::error::ErrorKind::ValueValidation);
    }
}
