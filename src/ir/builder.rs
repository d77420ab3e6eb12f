//! Conversion of [`BuildFacts`] into a [`Project`].
//!
//! Building runs in fixed stages: compiles are grouped into one target per
//! artifact (compiles whose objects feed a link are folded into the link's
//! artifact), links add their libraries, configuration overrides are
//! applied, dependencies are attached from rules and link inputs, and
//! finally names and aliases are checked for duplicates. Validation only
//! reports; it never removes or merges targets.

use std::collections::{BTreeMap, BTreeSet};

use indexmap::IndexMap;
use tracing::debug;

use super::{Language, Project, Target, TargetType};
use crate::config::{Classification, Config, sanitize_identifier};
use crate::diagnostics::{DiagCode, Diagnostics};
use crate::eval::{BuildFacts, InferredCompile, InferredLink, LinkKind};

/// Build the project IR from evaluated facts.
pub fn build_project(facts: &BuildFacts, config: &Config, diagnostics: &mut Diagnostics) -> Project {
    let mut builder = Builder {
        config,
        namespace: config.namespace(),
        diagnostics: &mut *diagnostics,
        targets: IndexMap::new(),
        languages: BTreeSet::new(),
    };
    let owners = object_owners(&facts.inferred_links);
    builder.process_compiles(&facts.inferred_compiles, &owners);
    builder.process_links(&facts.inferred_links);
    builder.apply_configuration();
    builder.attach_dependencies(facts);

    let mut project = Project {
        name: config.project_name().to_owned(),
        version: config.version.clone(),
        namespace: Some(builder.namespace.clone()),
        languages: builder.languages.iter().copied().collect(),
        targets: Vec::new(),
        project_config: facts.project_globals.clone(),
        custom_commands: Vec::new(),
        unknown_constructs: facts.unknown_constructs.as_slice().to_vec(),
    };
    let index = Resolver::new(builder.targets.values());
    for command in &facts.custom_commands {
        let owner = command.targets.iter().find_map(|t| index.resolve(t));
        match owner.and_then(|idx| builder.targets.get_index_mut(idx)) {
            Some((_, target)) => target.custom_commands.push(command.clone()),
            None => project.custom_commands.push(command.clone()),
        }
    }
    project.targets = builder.targets.into_values().collect();
    validate(&project.targets, diagnostics);
    debug!(targets = project.targets.len(), "built project IR");
    project
}

/// Map each object consumed by a link to the link's artifact; the first
/// link to consume an object owns it.
fn object_owners(links: &[InferredLink]) -> BTreeMap<&str, &str> {
    let mut owners = BTreeMap::new();
    for link in links {
        for input in &link.inputs {
            if is_object(input) {
                owners.entry(input.as_str()).or_insert(link.output.as_str());
            }
        }
    }
    owners
}

fn is_object(path: &str) -> bool {
    path.ends_with(".o") || path.ends_with(".obj")
}

fn file_name(path: &str) -> &str {
    path.rsplit('/').next().unwrap_or(path)
}

/// Artifact name without directory and extension; shared objects lose
/// everything after the first dot (`libfoo.so.1` gives `libfoo`).
#[must_use]
pub fn artifact_stem(artifact: &str) -> &str {
    let name = file_name(artifact);
    if TargetType::from_artifact(artifact) == TargetType::Shared {
        return name.split('.').next().unwrap_or(name);
    }
    name.rsplit_once('.')
        .filter(|(stem, _)| !stem.is_empty())
        .map_or(name, |(stem, _)| stem)
}

/// Object file make would produce for `source` when no `-o` is given.
fn default_object(source: &str) -> String {
    let name = file_name(source);
    let stem = name.rsplit_once('.').map_or(name, |(stem, _)| stem);
    format!("{stem}.o")
}

fn push_unique(list: &mut Vec<String>, item: &str) {
    if !list.iter().any(|existing| existing == item) {
        list.push(item.to_owned());
    }
}

struct Builder<'b> {
    config: &'b Config,
    namespace: String,
    diagnostics: &'b mut Diagnostics,
    targets: IndexMap<String, Target>,
    languages: BTreeSet<Language>,
}

impl Builder<'_> {
    fn target_mut(&mut self, artifact: &str, target_type: TargetType) -> &mut Target {
        let namespace = &self.namespace;
        self.targets.entry(artifact.to_owned()).or_insert_with(|| {
            let stem = artifact_stem(artifact);
            let mut target = Target::new(
                artifact,
                format!("{namespace}_{}", sanitize_identifier(stem)),
                target_type,
            );
            target.alias = Some(format!("{namespace}::{stem}"));
            target
        })
    }

    fn process_compiles(&mut self, compiles: &[InferredCompile], owners: &BTreeMap<&str, &str>) {
        for compile in compiles {
            let object = compile.output.clone().unwrap_or_else(|| default_object(&compile.source));
            let artifact = owners
                .get(object.as_str())
                .map(|owner| (*owner).to_owned())
                .or_else(|| compile.output.clone())
                .unwrap_or_else(|| compile.source.clone());
            self.languages.insert(compile.language);
            let options = self.map_flags(&compile.flags, &artifact);
            let target = self.target_mut(&artifact, TargetType::from_artifact(&artifact));
            push_unique(&mut target.sources, &compile.source);
            for dir in &compile.includes {
                push_unique(&mut target.include_dirs, dir);
            }
            for define in &compile.defines {
                push_unique(&mut target.defines, define);
            }
            for option in &options {
                push_unique(&mut target.compile_options, option);
            }
            for lib in &compile.link_libs {
                push_unique(&mut target.link_libs, lib);
            }
            for option in &compile.link_options {
                push_unique(&mut target.link_options, option);
            }
        }
    }

    /// Translate flags through `flag_mappings`. Unmapped flags are kept
    /// and reported; flags mapped to the empty string are dropped.
    fn map_flags(&mut self, flags: &[String], artifact: &str) -> Vec<String> {
        let mut mapped = Vec::new();
        for flag in flags {
            match self.config.flag_mappings.get(flag) {
                Some(replacement) if replacement.is_empty() => {}
                Some(replacement) => mapped.push(replacement.clone()),
                None => {
                    self.diagnostics.report_from(
                        DiagCode::IrUnmappedFlag,
                        format!("flag '{flag}' has no mapping; kept verbatim"),
                        None,
                        artifact,
                    );
                    mapped.push(flag.clone());
                }
            }
        }
        mapped
    }

    fn process_links(&mut self, links: &[InferredLink]) {
        for link in links {
            let target_type = match link.kind {
                LinkKind::Archive => TargetType::Static,
                LinkKind::Link if link.link_options.iter().any(|o| o == "-shared") => {
                    TargetType::Shared
                }
                LinkKind::Link => TargetType::from_artifact(&link.output),
            };
            let target = self.target_mut(&link.output, target_type);
            target.target_type = target_type;
            for lib in &link.link_libs {
                push_unique(&mut target.link_libs, lib);
            }
            for option in &link.link_options {
                push_unique(&mut target.link_options, option);
            }
        }
    }

    fn apply_configuration(&mut self) {
        let config = self.config;
        for target in self.targets.values_mut() {
            let stem = artifact_stem(&target.artifact).to_owned();
            if let Some(mapping) = config.target_mappings.get(&stem) {
                if let Some(name) = &mapping.dest_name {
                    target.name.clone_from(name);
                }
                if let Some(target_type) = mapping.type_override {
                    target.target_type = target_type;
                }
                for lib in &mapping.link_libs {
                    push_unique(&mut target.link_libs, lib);
                }
                for dir in &mapping.include_dirs {
                    push_unique(&mut target.include_dirs, dir);
                }
                for define in &mapping.defines {
                    push_unique(&mut target.defines, define);
                }
                for option in &mapping.options {
                    push_unique(&mut target.compile_options, option);
                }
                if mapping.visibility.is_some() {
                    target.visibility = mapping.visibility;
                }
            }

            let link_override = config.link_overrides.get(&stem);
            let classification = link_override.map(|o| o.classification).or_else(|| {
                target
                    .artifact
                    .starts_with('/')
                    .then_some(Classification::External)
            });
            let explicit_alias = link_override.and_then(|o| o.alias.clone());
            match classification {
                Some(Classification::Imported) => {
                    target.sources.clear();
                    target.target_type = TargetType::Imported;
                    target.alias = explicit_alias;
                    match link_override.and_then(|o| o.imported_target.as_ref()) {
                        Some(imported) => target.name.clone_from(imported),
                        None => self.diagnostics.report_from(
                            DiagCode::IrImportedWithoutTarget,
                            format!(
                                "'{stem}' is imported but no imported_target is configured; keeping '{}'",
                                target.name
                            ),
                            None,
                            target.artifact.clone(),
                        ),
                    }
                }
                Some(Classification::External) => target.alias = explicit_alias,
                Some(Classification::Internal) => {
                    if explicit_alias.is_some() {
                        target.alias = explicit_alias;
                    }
                }
                None => {}
            }
        }
    }

    /// Add an edge for every rule prerequisite and link input that names
    /// another target.
    fn attach_dependencies(&mut self, facts: &BuildFacts) {
        let index = Resolver::new(self.targets.values());
        let refs: Vec<String> = self
            .targets
            .values()
            .map(|t| t.alias_or_name().to_owned())
            .collect();
        let mut edges: BTreeSet<(usize, usize)> = BTreeSet::new();
        for rule in facts.rules.iter().filter(|r| !r.is_pattern) {
            for dependent in rule.targets.iter().filter_map(|t| index.resolve(t)) {
                for dependency in rule.prerequisites.iter().filter_map(|p| index.resolve(p)) {
                    edges.insert((dependent, dependency));
                }
            }
        }
        for link in &facts.inferred_links {
            if let Some(dependent) = index.resolve(&link.output) {
                for dependency in link.inputs.iter().filter_map(|i| index.resolve(i)) {
                    edges.insert((dependent, dependency));
                }
            }
        }
        for (dependent, dependency) in edges {
            if dependent == dependency {
                continue;
            }
            let (Some(reference), Some((_, target))) =
                (refs.get(dependency), self.targets.get_index_mut(dependent))
            else {
                continue;
            };
            push_unique(&mut target.deps, reference);
        }
        for target in self.targets.values_mut() {
            target.deps.sort();
        }
    }
}

/// Looks targets up by artifact path, file name or stem.
struct Resolver {
    by_artifact: BTreeMap<String, usize>,
    by_file_name: BTreeMap<String, usize>,
    by_stem: BTreeMap<String, usize>,
}

impl Resolver {
    fn new<'t>(targets: impl Iterator<Item = &'t Target>) -> Self {
        let mut index = Self {
            by_artifact: BTreeMap::new(),
            by_file_name: BTreeMap::new(),
            by_stem: BTreeMap::new(),
        };
        for (idx, target) in targets.enumerate() {
            let artifact = target.artifact.as_str();
            index.by_artifact.entry(artifact.to_owned()).or_insert(idx);
            index.by_file_name.entry(file_name(artifact).to_owned()).or_insert(idx);
            index.by_stem.entry(artifact_stem(artifact).to_owned()).or_insert(idx);
        }
        index
    }

    fn resolve(&self, reference: &str) -> Option<usize> {
        self.by_artifact
            .get(reference)
            .or_else(|| self.by_file_name.get(file_name(reference)))
            .or_else(|| self.by_stem.get(artifact_stem(reference)))
            .copied()
    }
}

/// Report duplicate names and aliases. Targets are left untouched.
fn validate(targets: &[Target], diagnostics: &mut Diagnostics) {
    let mut names: BTreeMap<&str, Vec<&str>> = BTreeMap::new();
    let mut aliases: BTreeMap<&str, Vec<&str>> = BTreeMap::new();
    for target in targets {
        names
            .entry(target.name.as_str())
            .or_default()
            .push(target.artifact.as_str());
        if let Some(alias) = &target.alias {
            aliases
                .entry(alias.as_str())
                .or_default()
                .push(target.artifact.as_str());
        }
    }
    for (code, kind, map) in [
        (DiagCode::IrDuplicateTarget, "target name", names),
        (DiagCode::IrDuplicateAlias, "alias", aliases),
    ] {
        for (id, artifacts) in map.into_iter().filter(|(_, a)| a.len() > 1) {
            diagnostics.report_from(
                code,
                format!("duplicate {kind} '{id}' used by {}", artifacts.join(", ")),
                None,
                id,
            );
        }
    }
}
