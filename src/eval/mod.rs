//! Macro evaluation and build fact extraction.
//!
//! The [`Evaluator`] walks one file's AST in document order against a
//! mutable [`VariableEnv`]. Assignments update the environment, rule
//! headers are expanded immediately and recipes are expanded once the
//! whole file has been read, the way make does it. Every recipe line is
//! then matched against known compilers, linkers and archivers; what is
//! not recognised is kept as a [`CustomCommand`].
//!
//! Nested conditional bodies share the environment of their parent; there
//! is no lexical scoping.
//!
//! ```rust
//! use camino::Utf8Path;
//! use gmake2cmake::config::Config;
//! use gmake2cmake::eval::{VariableEnv, evaluate};
//! use gmake2cmake::parser::parse_source;
//!
//! let text = "OBJ := main.o\napp: $(OBJ)\n\t$(CC) -o $@ $^\nmain.o: main.c\n\t$(CC) -c $< -o $@\n";
//! let parsed = parse_source(text, Utf8Path::new("Makefile"));
//! let mut env = VariableEnv::with_defaults(Utf8Path::new("."));
//! let facts = evaluate(&parsed.nodes, &mut env, &Config::default());
//! assert_eq!(facts.rules[0].prerequisites, ["main.o"]);
//! assert_eq!(facts.inferred_compiles[0].source, "main.c");
//! assert_eq!(facts.inferred_links[0].output, "app");
//! ```

pub mod compile;
mod env;
mod expand;
mod facts;
mod functions;
mod globals;
pub mod parallel;

use std::collections::BTreeSet;

use camino::{Utf8Path, Utf8PathBuf};
use tracing::debug;

use crate::ast::{AssignKind, CommandLine, ConditionalKind, ConditionalTest, Node, NodeKind, SourceLocation};
use crate::config::Config;
use crate::diagnostics::DiagCode;
use crate::fs::FileSystem;
use crate::parser::lines::find_top_level;
use crate::pattern;
use crate::unknown::{UnknownCategory, UnknownDraft};

pub use compile::{
    CustomCommand, Inference, InferredCompile, InferredLink, LinkKind, infer_command,
    source_language,
};
pub use env::{Flavor, Variable, VariableEnv};
pub use expand::{AutoVars, Expander, MAX_EXPANSION_DEPTH, expand};
pub use facts::{BuildFacts, EvaluatedCommand, EvaluatedRule};
pub use functions::{pattern_stem, patsubst_word};
pub use globals::{FeatureToggle, ProjectGlobals};
pub use parallel::{evaluate_partition, evaluate_partitions};

/// Walks AST nodes and accumulates [`BuildFacts`].
#[derive(Clone, Copy)]
pub struct Evaluator<'a> {
    config: &'a Config,
    pattern_source: Option<(&'a dyn FileSystem, &'a Utf8Path)>,
    base_dir: Option<&'a Utf8Path>,
}

impl<'a> Evaluator<'a> {
    /// Evaluator without pattern instantiation.
    #[must_use]
    pub const fn new(config: &'a Config) -> Self {
        Self {
            config,
            pattern_source: None,
            base_dir: None,
        }
    }

    /// Instantiate pattern rules against the files below `dir`.
    #[must_use]
    pub const fn with_pattern_source(mut self, fs: &'a dyn FileSystem, dir: &'a Utf8Path) -> Self {
        self.pattern_source = Some((fs, dir));
        self
    }

    /// Prefix relative paths of inferred actions and rules with `dir`, the
    /// build directory relative to the project root.
    #[must_use]
    pub const fn with_base_dir(mut self, dir: &'a Utf8Path) -> Self {
        self.base_dir = Some(dir);
        self
    }

    /// Evaluate `nodes` into fresh facts.
    #[must_use]
    pub fn evaluate(&self, nodes: &[Node], env: &mut VariableEnv) -> BuildFacts {
        let mut facts = BuildFacts::default();
        self.evaluate_into(nodes, env, &mut facts);
        facts.sort();
        facts
    }

    /// Evaluate `nodes`, appending to `facts`.
    ///
    /// Recipe lines are only attached to rules of this call.
    pub fn evaluate_into(&self, nodes: &[Node], env: &mut VariableEnv, facts: &mut BuildFacts) {
        let mut pass = Pass {
            config: self.config,
            env,
            first_rule: facts.rules.len(),
            facts,
            files_with_rules: BTreeSet::new(),
        };
        pass.walk(nodes);
        pass.finish(self.pattern_source, self.base_dir);
    }
}

/// Evaluate `nodes` with `config` and no pattern instantiation.
#[must_use]
pub fn evaluate(nodes: &[Node], env: &mut VariableEnv, config: &Config) -> BuildFacts {
    Evaluator::new(config).evaluate(nodes, env)
}

struct Pass<'p> {
    config: &'p Config,
    env: &'p mut VariableEnv,
    facts: &'p mut BuildFacts,
    first_rule: usize,
    files_with_rules: BTreeSet<Utf8PathBuf>,
}

impl Pass<'_> {
    fn walk(&mut self, nodes: &[Node]) {
        for node in nodes {
            self.visit(node);
        }
    }

    fn visit(&mut self, node: &Node) {
        let location = &node.location;
        match &node.kind {
            NodeKind::VariableAssign { name, value, kind } => {
                self.assign(name, value, *kind, location);
            }
            NodeKind::Rule {
                targets,
                prerequisites,
                commands,
            } => self.rule(targets, prerequisites, commands, location, false),
            NodeKind::PatternRule {
                target_patterns,
                prerequisite_patterns,
                commands,
            } => self.rule(target_patterns, prerequisite_patterns, commands, location, true),
            NodeKind::IncludeStmt { paths, .. } => {
                debug!(file = %location.path, includes = ?paths, "include handled by discovery");
            }
            NodeKind::Conditional {
                test,
                true_body,
                false_body,
            } => {
                if self.test_holds(test, location) {
                    self.walk(true_body);
                } else {
                    self.walk(false_body);
                }
            }
            NodeKind::RawCommand { text } => self.raw_command(text, location),
        }
    }

    fn expand(&mut self, text: &str, location: &SourceLocation) -> String {
        expand(
            text,
            self.env,
            location,
            &mut self.facts.diagnostics,
            &mut self.facts.unknown_constructs,
        )
    }

    fn expand_words(&mut self, words: &[String], location: &SourceLocation) -> Vec<String> {
        self.expand(&words.join(" "), location)
            .split_whitespace()
            .map(str::to_owned)
            .collect()
    }

    fn assign(&mut self, raw_name: &str, value: &str, kind: AssignKind, location: &SourceLocation) {
        let name = self.expand(raw_name, location).trim().to_owned();
        if name.is_empty() {
            return;
        }
        let previously_defined = self.env.get(&name).is_some();
        match kind {
            AssignKind::Simple => {
                let expanded = self.expand(value, location);
                self.env.set(&name, expanded, Flavor::Simple);
            }
            AssignKind::Recursive => self.env.set(&name, value, Flavor::Recursive),
            AssignKind::Append => {
                let simple = self.env.get(&name).is_some_and(|var| var.flavor == Flavor::Simple);
                if simple {
                    let expanded = self.expand(value, location);
                    self.env.append(&name, &expanded);
                } else {
                    self.env.append(&name, value);
                }
            }
            AssignKind::Conditional => self.env.set_if_unset(&name, value),
        }
        if kind != AssignKind::Conditional || !previously_defined {
            self.env.mark_defined(&name, location);
        }
        self.record_global(&name, location);
    }

    /// Fold the variable into the project globals when it is assigned in a
    /// global configuration file before that file's first rule.
    fn record_global(&mut self, name: &str, location: &SourceLocation) {
        let path = &location.path;
        let is_global = path
            .file_name()
            .is_some_and(|base| self.config.is_global_config_file(base));
        if !is_global || self.files_with_rules.contains(path) {
            return;
        }
        let value = Expander::new(
            self.env,
            location,
            &mut self.facts.diagnostics,
            &mut self.facts.unknown_constructs,
        )
        .value_of(name);
        self.facts.project_globals.record(name, &value, path);
    }

    fn rule(
        &mut self,
        raw_targets: &[String],
        raw_prerequisites: &[String],
        commands: &[CommandLine],
        location: &SourceLocation,
        is_pattern: bool,
    ) {
        self.files_with_rules.insert(location.path.clone());
        let targets = self.expand_words(raw_targets, location);
        let prerequisites = self.expand_words(raw_prerequisites, location);
        self.facts.rules.push(EvaluatedRule {
            targets,
            prerequisites,
            raw_targets: raw_targets.to_vec(),
            raw_prerequisites: raw_prerequisites.to_vec(),
            commands: commands
                .iter()
                .map(|command| EvaluatedCommand {
                    raw: command.text.clone(),
                    expanded: String::new(),
                    location: command.location.clone(),
                })
                .collect(),
            location: location.clone(),
            is_pattern,
            pattern_stem: None,
        });
    }

    fn raw_command(&mut self, text: &str, location: &SourceLocation) {
        let first_rule = self.first_rule;
        if let Some(rule) = self
            .facts
            .rules
            .get_mut(first_rule..)
            .and_then(<[EvaluatedRule]>::last_mut)
        {
            rule.commands.push(EvaluatedCommand {
                raw: text.to_owned(),
                expanded: String::new(),
                location: location.clone(),
            });
            return;
        }
        self.facts.unknown_constructs.record(
            UnknownDraft::at(UnknownCategory::OrphanCommand, location, text)
                .context("evaluator")
                .impact("recipe line without a rule is ignored"),
        );
        self.facts.diagnostics.report(
            DiagCode::EvalOrphanCommand,
            "recipe line appears before any rule",
            Some(location.clone()),
        );
    }

    fn test_holds(&mut self, test: &ConditionalTest, location: &SourceLocation) -> bool {
        if !self.config.evaluate_conditionals {
            return true;
        }
        let outcome = match test.kind {
            ConditionalKind::Ifdef | ConditionalKind::Ifndef => {
                let name = self.expand(&test.argument, location);
                let trimmed = name.trim();
                (!trimmed.is_empty() && !trimmed.contains(char::is_whitespace))
                    .then(|| self.env.is_defined(trimmed) == (test.kind == ConditionalKind::Ifdef))
            }
            ConditionalKind::Ifeq | ConditionalKind::Ifneq => {
                split_comparison(&test.argument).map(|(left, right)| {
                    let lhs = self.expand(left, location);
                    let rhs = self.expand(right, location);
                    (lhs.trim() == rhs.trim()) == (test.kind == ConditionalKind::Ifeq)
                })
            }
        };
        outcome.unwrap_or_else(|| {
            let raw = format!("{} {}", test.kind.keyword(), test.argument);
            self.facts.unknown_constructs.record(
                UnknownDraft::at(UnknownCategory::Conditional, location, raw.clone())
                    .context("evaluator")
                    .impact("true branch taken without evaluating the test"),
            );
            self.facts.diagnostics.report(
                DiagCode::EvalUnsupportedConditional,
                format!("cannot evaluate conditional '{raw}'; taking the true branch"),
                Some(location.clone()),
            );
            true
        })
    }

    /// Expand recipes, instantiate pattern rules and infer actions for the
    /// rules of this pass.
    fn finish(
        &mut self,
        pattern_source: Option<(&dyn FileSystem, &Utf8Path)>,
        base_dir: Option<&Utf8Path>,
    ) {
        let first_rule = self.first_rule;
        let patterns: Vec<EvaluatedRule> = self
            .facts
            .rules
            .get(first_rule..)
            .unwrap_or_default()
            .iter()
            .filter(|rule| rule.is_pattern)
            .cloned()
            .collect();
        if let (Some((fs, dir)), false) = (pattern_source, patterns.is_empty()) {
            let expansion = pattern::instantiate(
                &patterns,
                dir,
                fs,
                self.config,
                &mut self.facts.diagnostics,
                &mut self.facts.unknown_constructs,
            );
            debug!(dir = %dir, concrete = expansion.rules.len(), "pattern rules instantiated");
            self.facts.rules.extend(expansion.rules);
        }

        let base = base_dir.map_or("", Utf8Path::as_str);
        let BuildFacts {
            rules,
            inferred_compiles,
            inferred_links,
            custom_commands,
            diagnostics,
            unknown_constructs,
            ..
        } = &mut *self.facts;
        for rule in rules.iter_mut().skip(first_rule) {
            if rule.is_pattern {
                continue;
            }
            let target = rule.targets.first().cloned().unwrap_or_default();
            let mut auto = AutoVars::new(target, rule.prerequisites.clone());
            if let Some(stem) = &rule.pattern_stem {
                auto = auto.with_stem(stem.clone());
            }
            for command in &mut rule.commands {
                command.expanded = Expander::new(self.env, &command.location, diagnostics, unknown_constructs)
                    .with_auto(&auto)
                    .expand(&command.raw);
                let found = infer_command(&command.expanded, &command.location);
                if found.is_empty() {
                    if !command.expanded.trim().is_empty() {
                        custom_commands.push(CustomCommand {
                            targets: rebase_all(base, &rule.targets),
                            prerequisites: rebase_all(base, &rule.prerequisites),
                            command: command.expanded.clone(),
                            location: command.location.clone(),
                        });
                    }
                    continue;
                }
                for inference in found {
                    match inference.rebased(base) {
                        Inference::Compile(compile) => inferred_compiles.push(compile),
                        Inference::Link(link) => inferred_links.push(link),
                    }
                }
            }
        }
        if !base.is_empty() {
            for rule in rules.iter_mut().skip(first_rule) {
                rule.targets = rebase_all(base, &rule.targets);
                rule.prerequisites = rebase_all(base, &rule.prerequisites);
            }
        }
    }
}

fn rebase_all(base: &str, paths: &[String]) -> Vec<String> {
    paths.iter().map(|path| compile::rebase(base, path)).collect()
}

/// Split an `ifeq` argument in `(a,b)`, `"a" "b"` or `'a' 'b'` form.
fn split_comparison(argument: &str) -> Option<(&str, &str)> {
    let arg = argument.trim();
    if let Some(inner) = arg.strip_prefix('(').and_then(|rest| rest.strip_suffix(')')) {
        let comma = find_top_level(inner, ',')?;
        let (left, right) = inner.split_at(comma);
        return Some((left, right.get(1..)?));
    }
    let (left, rest) = quoted(arg)?;
    let (right, tail) = quoted(rest.trim_start())?;
    tail.trim().is_empty().then_some((left, right))
}

fn quoted(text: &str) -> Option<(&str, &str)> {
    let quote = text.chars().next().filter(|c| matches!(c, '"' | '\''))?;
    let body = text.get(1..)?;
    let end = body.find(quote)?;
    Some((body.get(..end)?, body.get(end + 1..)?))
}

#[cfg(test)]
mod tests;
