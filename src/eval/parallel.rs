//! Evaluation of include-graph partitions, serially or on a rayon pool.
//!
//! Each partition is an isolated producer of [`BuildFacts`]: every file
//! gets a fresh [`VariableEnv`] and nothing mutable is shared between
//! workers. Results are merged in partition order, so the outcome does not
//! depend on which worker finishes first.

use std::panic::{AssertUnwindSafe, catch_unwind};

use camino::Utf8Path;
use rayon::prelude::*;
use tracing::{debug, warn};

use crate::config::Config;
use crate::diagnostics::DiagCode;
use crate::discovery::SourceFile;
use crate::fs::FileSystem;
use crate::parser;

use super::{BuildFacts, Evaluator, VariableEnv};

/// Parse and evaluate the files of one partition in order.
#[must_use]
pub fn evaluate_partition(
    files: &[&SourceFile],
    root: &Utf8Path,
    config: &Config,
    fs: &dyn FileSystem,
) -> BuildFacts {
    let mut facts = BuildFacts::default();
    for file in files {
        let nodes = parser::parse(
            &file.contents,
            &file.relative,
            &mut facts.diagnostics,
            &mut facts.unknown_constructs,
        );
        let base = file.build_dir.strip_prefix(root).unwrap_or(Utf8Path::new(""));
        let mut env = VariableEnv::with_defaults(&file.build_dir);
        Evaluator::new(config)
            .with_pattern_source(fs, &file.build_dir)
            .with_base_dir(base)
            .evaluate_into(&nodes, &mut env, &mut facts);
        debug!(file = %file.relative, rules = facts.rules.len(), "evaluated makefile");
    }
    facts.sort();
    facts
}

/// Evaluate every partition and merge the results.
///
/// With `config.parallel` set the partitions run on the current rayon
/// pool. A partition that panics contributes empty facts plus an
/// `EVAL_PARTITION_FAILED` warning; the others are unaffected.
#[must_use]
pub fn evaluate_partitions(
    partitions: &[Vec<&SourceFile>],
    root: &Utf8Path,
    config: &Config,
    fs: &dyn FileSystem,
) -> BuildFacts {
    let run = |(index, files): (usize, &Vec<&SourceFile>)| {
        catch_unwind(AssertUnwindSafe(|| {
            evaluate_partition(files, root, config, fs)
        }))
        .unwrap_or_else(|_| failed_partition(index, files))
    };
    let results: Vec<BuildFacts> = if config.parallel && partitions.len() > 1 {
        debug!(partitions = partitions.len(), threads = rayon::current_num_threads(), "evaluating in parallel");
        partitions.par_iter().enumerate().map(run).collect()
    } else {
        partitions.iter().enumerate().map(run).collect()
    };
    BuildFacts::merge(results)
}

fn failed_partition(index: usize, files: &[&SourceFile]) -> BuildFacts {
    let first = files
        .first()
        .map_or_else(String::new, |file| file.relative.to_string());
    warn!(partition = index, first = %first, "partition evaluation failed; continuing without it");
    let mut facts = BuildFacts::default();
    facts.diagnostics.report(
        DiagCode::EvalPartitionFailed,
        format!("evaluation of partition {index} (starting at {first}) failed; its facts are empty"),
        None,
    );
    facts
}
