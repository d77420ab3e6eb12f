//! The evaluator's output and its deterministic merge.

use serde::Serialize;

use crate::ast::SourceLocation;
use crate::diagnostics::Diagnostics;
use crate::unknown::UnknownRegistry;

use super::compile::{CustomCommand, InferredCompile, InferredLink};
use super::globals::ProjectGlobals;

/// A recipe line in raw and expanded form.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EvaluatedCommand {
    /// Text as written.
    pub raw: String,
    /// Text after expansion with automatic variables bound.
    pub expanded: String,
    /// Where the line was written.
    pub location: SourceLocation,
}

/// A rule after its target and prerequisite lists were expanded.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EvaluatedRule {
    /// Expanded targets, split on whitespace.
    pub targets: Vec<String>,
    /// Expanded prerequisites, split on whitespace.
    pub prerequisites: Vec<String>,
    /// Targets as written.
    pub raw_targets: Vec<String>,
    /// Prerequisites as written.
    pub raw_prerequisites: Vec<String>,
    /// Recipe lines.
    pub commands: Vec<EvaluatedCommand>,
    /// Where the rule header was written.
    pub location: SourceLocation,
    /// Whether this is an uninstantiated pattern rule.
    pub is_pattern: bool,
    /// Stem bound when the rule was produced from a pattern.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pattern_stem: Option<String>,
}

/// Everything learned from evaluating one or more makefiles.
#[derive(Debug, Clone, Default, Serialize)]
pub struct BuildFacts {
    /// Explicit rules plus pattern rules and their instantiations.
    pub rules: Vec<EvaluatedRule>,
    /// Recognised compiles.
    pub inferred_compiles: Vec<InferredCompile>,
    /// Recognised links and archives.
    pub inferred_links: Vec<InferredLink>,
    /// Other recipe lines.
    pub custom_commands: Vec<CustomCommand>,
    /// Settings from global configuration files.
    pub project_globals: ProjectGlobals,
    /// Problems found while evaluating.
    pub diagnostics: Diagnostics,
    /// Constructs that could not be modelled.
    pub unknown_constructs: UnknownRegistry,
}

impl BuildFacts {
    /// Combine partial results into one, independent of the order in which
    /// the parts finished.
    ///
    /// Parts must be supplied in a fixed order: globals from later parts
    /// overwrite earlier ones and unknown constructs are renumbered in
    /// that order.
    #[must_use]
    pub fn merge(parts: impl IntoIterator<Item = Self>) -> Self {
        let mut merged = Self::default();
        for part in parts {
            merged.rules.extend(part.rules);
            merged.inferred_compiles.extend(part.inferred_compiles);
            merged.inferred_links.extend(part.inferred_links);
            merged.custom_commands.extend(part.custom_commands);
            merged.project_globals.merge(part.project_globals);
            merged.diagnostics.extend(part.diagnostics);
            merged.unknown_constructs.absorb(part.unknown_constructs);
        }
        merged.sort();
        merged
    }

    /// Order rules by position and compiles by position then source.
    pub fn sort(&mut self) {
        self.rules.sort_by(|a, b| a.location.cmp(&b.location));
        self.inferred_compiles.sort_by(|a, b| {
            (&a.location.path, a.location.line, &a.source).cmp(&(
                &b.location.path,
                b.location.line,
                &b.source,
            ))
        });
        self.inferred_links.sort_by(|a, b| a.location.cmp(&b.location));
        self.custom_commands.sort_by(|a, b| a.location.cmp(&b.location));
    }
}
