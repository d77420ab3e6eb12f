//! Instantiation of simple pattern rules against the files on disk.
//!
//! Only the `%.o: %.c` shape is handled: one target and one prerequisite,
//! each with exactly one `%` and no `:`. The prerequisite pattern becomes
//! an anchored regular expression, the source tree is walked, and each
//! matching file yields one concrete rule whose recipe is the pattern's
//! recipe copied verbatim. Every other shape is recorded as an unknown
//! construct.

use std::collections::BTreeMap;

use camino::{Utf8Path, Utf8PathBuf};
use regex::Regex;
use tracing::debug;

use crate::config::Config;
use crate::diagnostics::{DiagCode, Diagnostics};
use crate::eval::EvaluatedRule;
use crate::fs::FileSystem;
use crate::unknown::{UnknownCategory, UnknownDraft, UnknownRegistry};

/// Result of [`instantiate`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PatternExpansion {
    /// Concrete rules ordered by source path.
    pub rules: Vec<EvaluatedRule>,
    /// Concrete targets produced by each pattern, keyed by `target: prerequisite`.
    pub pattern_targets: BTreeMap<String, Vec<String>>,
    /// Patterns that could not be instantiated.
    pub unmappable: Vec<String>,
}

/// A pattern rule in the supported shape.
struct SimplePattern<'r> {
    rule: &'r EvaluatedRule,
    key: String,
    target: &'r str,
    matcher: Regex,
    literal_len: usize,
}

impl<'r> SimplePattern<'r> {
    fn new(rule: &'r EvaluatedRule) -> Option<Self> {
        let ([target], [prerequisite]) = (rule.targets.as_slice(), rule.prerequisites.as_slice())
        else {
            return None;
        };
        if !is_simple(target) || !is_simple(prerequisite) {
            return None;
        }
        let (prefix, suffix) = prerequisite.split_once('%')?;
        let matcher = Regex::new(&format!(
            "^{}(.+){}$",
            regex::escape(prefix),
            regex::escape(suffix)
        ))
        .ok()?;
        Some(Self {
            rule,
            key: pattern_key(rule),
            target,
            matcher,
            literal_len: prefix.len() + suffix.len(),
        })
    }

    fn stem<'p>(&self, path: &'p str) -> Option<&'p str> {
        self.matcher
            .captures(path)
            .and_then(|caps| caps.get(1))
            .map(|stem| stem.as_str())
    }
}

fn is_simple(pattern: &str) -> bool {
    pattern.matches('%').count() == 1 && !pattern.contains(':')
}

fn pattern_key(rule: &EvaluatedRule) -> String {
    format!("{}: {}", rule.targets.join(" "), rule.prerequisites.join(" "))
}

struct Candidate {
    pattern: usize,
    source: String,
    stem: String,
    target: String,
    literal_len: usize,
}

/// Expand `rules` (pattern rules, in input order) against the files below
/// `source_dir`.
///
/// Paths are matched relative to `source_dir`. When two patterns produce
/// the same target, the one whose prerequisite pattern has the longer
/// literal part wins; ties go to the earlier rule.
pub fn instantiate(
    rules: &[EvaluatedRule],
    source_dir: &Utf8Path,
    fs: &dyn FileSystem,
    config: &Config,
    diagnostics: &mut Diagnostics,
    unknowns: &mut UnknownRegistry,
) -> PatternExpansion {
    let mut expansion = PatternExpansion::default();
    let mut patterns = Vec::new();
    for rule in rules {
        match SimplePattern::new(rule) {
            Some(pattern) => patterns.push(pattern),
            None => unsupported(rule, &mut expansion, diagnostics, unknowns),
        }
    }
    if patterns.is_empty() {
        return expansion;
    }

    let files = match fs.walk_files(source_dir, config.max_scan_depth) {
        Ok(found) => relative_files(found, source_dir, config),
        Err(err) => {
            for pattern in &patterns {
                diagnostics.report_from(
                    DiagCode::PatternScanFailed,
                    format!("cannot scan {source_dir} for '{}': {err}", pattern.key),
                    Some(pattern.rule.location.clone()),
                    pattern.key.clone(),
                );
                expansion.pattern_targets.insert(pattern.key.clone(), Vec::new());
            }
            return expansion;
        }
    };
    debug!(dir = %source_dir, files = files.len(), patterns = patterns.len(), "scanning for pattern inputs");

    let mut winners: BTreeMap<String, Candidate> = BTreeMap::new();
    for (index, pattern) in patterns.iter().enumerate() {
        for file in &files {
            let Some(stem) = pattern.stem(file.as_str()) else {
                continue;
            };
            let candidate = Candidate {
                pattern: index,
                source: file.to_string(),
                stem: stem.to_owned(),
                target: pattern.target.replacen('%', stem, 1),
                literal_len: pattern.literal_len,
            };
            let replace = winners
                .get(&candidate.target)
                .is_none_or(|current| candidate.literal_len > current.literal_len);
            if replace {
                winners.insert(candidate.target.clone(), candidate);
            }
        }
    }

    let mut chosen: Vec<Candidate> = winners.into_values().collect();
    chosen.sort_by(|a, b| (&a.source, &a.target).cmp(&(&b.source, &b.target)));

    for pattern in &patterns {
        expansion.pattern_targets.entry(pattern.key.clone()).or_default();
    }
    for candidate in chosen {
        let Some(pattern) = patterns.get(candidate.pattern) else {
            continue;
        };
        expansion
            .pattern_targets
            .entry(pattern.key.clone())
            .or_default()
            .push(candidate.target.clone());
        expansion.rules.push(EvaluatedRule {
            targets: vec![candidate.target],
            prerequisites: vec![candidate.source],
            raw_targets: pattern.rule.raw_targets.clone(),
            raw_prerequisites: pattern.rule.raw_prerequisites.clone(),
            commands: pattern.rule.commands.clone(),
            location: pattern.rule.location.clone(),
            is_pattern: false,
            pattern_stem: Some(candidate.stem),
        });
    }

    for pattern in &patterns {
        let matched = expansion
            .pattern_targets
            .get(&pattern.key)
            .is_some_and(|targets| !targets.is_empty());
        if !matched {
            diagnostics.report_from(
                DiagCode::PatternNoMatch,
                format!("pattern rule '{}' matched no files", pattern.key),
                Some(pattern.rule.location.clone()),
                pattern.key.clone(),
            );
        }
    }
    debug!(dir = %source_dir, rules = expansion.rules.len(), "instantiated pattern rules");
    expansion
}

fn relative_files(found: Vec<Utf8PathBuf>, source_dir: &Utf8Path, config: &Config) -> Vec<Utf8PathBuf> {
    found
        .into_iter()
        .filter_map(|path| path.strip_prefix(source_dir).ok().map(Utf8Path::to_path_buf))
        .filter(|relative| !config.is_ignored(relative))
        .collect()
}

fn unsupported(
    rule: &EvaluatedRule,
    expansion: &mut PatternExpansion,
    diagnostics: &mut Diagnostics,
    unknowns: &mut UnknownRegistry,
) {
    let key = pattern_key(rule);
    unknowns.record_unique(
        UnknownDraft::at(UnknownCategory::PatternRule, &rule.location, key.clone())
            .context("pattern")
            .impact("pattern rule not instantiated"),
    );
    diagnostics.report_from(
        DiagCode::PatternUnsupported,
        format!("unsupported pattern rule shape '{key}'"),
        Some(rule.location.clone()),
        key.clone(),
    );
    expansion.unmappable.push(key);
}
