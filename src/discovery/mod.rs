//! Entry resolution and include graph discovery.
//!
//! Starting from the entry makefile, [`scan_includes`] follows `include`
//! directives and recursive `$(MAKE) -C dir` invocations depth first,
//! recording every edge. Cycles are found by tracking the DFS stack and
//! are reported once per distinct set of files. [`collect_contents`] then
//! re-walks the graph with sorted children so evaluation order does not
//! depend on the order in which files were found.

use std::collections::{BTreeMap, BTreeSet};

use camino::{Utf8Component, Utf8Path, Utf8PathBuf};
use itertools::Itertools;
use serde::Serialize;
use tracing::debug;

use crate::ast::SourceLocation;
use crate::config::Config;
use crate::diagnostics::{DiagCode, Diagnostics};
use crate::fs::FileSystem;
use crate::parser::keyword_is_name;
use crate::parser::lines::logical_lines;


/// Makefile names tried, in order, when no override is given.
pub const CANONICAL_NAMES: &[&str] = &["Makefile", "makefile", "GNUmakefile"];

/// Deepest chain of includes and sub-builds followed.
pub const MAX_INCLUDE_DEPTH: usize = 64;

const TEMPLATE_SUFFIXES: &[&str] = &["in", "tpl", "def"];

/// How one file reaches another.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum EdgeKind {
    /// `include`, `-include` or `sinclude`.
    Include,
    /// A recursive make invocation in a recipe.
    SubBuild,
}

/// A traversed edge of the include graph.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct IncludeEdge {
    /// Including file.
    pub from: Utf8PathBuf,
    /// Included file or sub-build entry.
    pub to: Utf8PathBuf,
    /// Directive kind.
    pub kind: EdgeKind,
    /// Where the directive was written.
    pub location: SourceLocation,
}

/// A makefile read during discovery.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SourceFile {
    /// Path used to read the file.
    pub path: Utf8PathBuf,
    /// Path relative to the project root, used in locations.
    pub relative: Utf8PathBuf,
    /// Directory make would run in while reading the file.
    pub build_dir: Utf8PathBuf,
    /// File text.
    #[serde(skip)]
    pub contents: String,
}

/// Files and edges found by [`scan_includes`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct IncludeGraph {
    /// Project root directory.
    pub root_dir: Utf8PathBuf,
    /// Entry files.
    pub roots: Vec<Utf8PathBuf>,
    /// Every traversed edge in discovery order.
    pub edges: Vec<IncludeEdge>,
    /// Successfully read files.
    pub files: BTreeMap<Utf8PathBuf, SourceFile>,
    /// Include cycles, each starting at the file first reached.
    pub cycles: Vec<Vec<Utf8PathBuf>>,
}

impl IncludeGraph {
    /// Distinct successors of `path`, sorted.
    #[must_use]
    pub fn children(&self, path: &Utf8Path) -> Vec<&Utf8Path> {
        self.edges
            .iter()
            .filter(|edge| edge.from == path)
            .map(|edge| edge.to.as_path())
            .sorted()
            .dedup()
            .collect()
    }

    /// Independent groups of files for evaluation.
    ///
    /// Files joined by include edges belong together; a sub-build starts a
    /// group of its own. Each group keeps collection order and groups are
    /// ordered by their first file.
    #[must_use]
    pub fn partitions(&self) -> Vec<Vec<&SourceFile>> {
        let ordered = collect_contents(self);
        let mut group_of: BTreeMap<&Utf8Path, usize> = BTreeMap::new();
        let mut parent: Vec<usize> = Vec::new();
        for file in &ordered {
            group_of.insert(file.path.as_path(), parent.len());
            parent.push(parent.len());
        }
        for edge in self.edges.iter().filter(|e| e.kind == EdgeKind::Include) {
            if let (Some(&a), Some(&b)) = (
                group_of.get(edge.from.as_path()),
                group_of.get(edge.to.as_path()),
            ) {
                let (ra, rb) = (find_root(&mut parent, a), find_root(&mut parent, b));
                if ra != rb {
                    let (low, high) = (ra.min(rb), ra.max(rb));
                    if let Some(slot) = parent.get_mut(high) {
                        *slot = low;
                    }
                }
            }
        }
        let mut groups: BTreeMap<usize, Vec<&SourceFile>> = BTreeMap::new();
        for (index, file) in ordered.into_iter().enumerate() {
            let root = find_root(&mut parent, index);
            groups.entry(root).or_default().push(file);
        }
        groups.into_values().collect()
    }
}

fn find_root(parent: &mut [usize], start: usize) -> usize {
    let mut node = start;
    while let Some(&next) = parent.get(node) {
        if next == node {
            break;
        }
        node = next;
    }
    if let Some(slot) = parent.get_mut(start) {
        *slot = node;
    }
    node
}

/// Find the makefile make would read in `dir`.
///
/// `override_name` is tried first, then [`CANONICAL_NAMES`]. When nothing
/// exists, an error is reported, plus a warning for each unconfigured
/// template such as `Makefile.in`.
pub fn resolve_entry(
    dir: &Utf8Path,
    override_name: Option<&str>,
    fs: &dyn FileSystem,
    diagnostics: &mut Diagnostics,
) -> Option<Utf8PathBuf> {
    let names: Vec<&str> = override_name
        .into_iter()
        .chain(CANONICAL_NAMES.iter().copied())
        .collect();
    if let Some(found) = names
        .iter()
        .map(|name| dir.join(name))
        .find(|candidate| fs.is_file(candidate))
    {
        return Some(found);
    }
    diagnostics.report(
        DiagCode::DiscoveryEntryMissing,
        format!("no makefile found in {dir} (tried {})", names.join(", ")),
        None,
    );
    for template in names
        .iter()
        .cartesian_product(TEMPLATE_SUFFIXES)
        .map(|(name, suffix)| dir.join(format!("{name}.{suffix}")))
        .filter(|candidate| fs.is_file(candidate))
    {
        diagnostics.report(
            DiagCode::DiscoveryUnconfiguredTemplate,
            format!("found unconfigured template {template}; run the configure step first"),
            None,
        );
    }
    None
}

/// Follow includes and sub-builds from `entry`.
///
/// `root` is the project root; paths below it are matched against
/// `ignore_paths` and made relative for locations.
pub fn scan_includes(
    entry: &Utf8Path,
    root: &Utf8Path,
    fs: &dyn FileSystem,
    config: &Config,
    diagnostics: &mut Diagnostics,
) -> IncludeGraph {
    let start = lexical(entry);
    let mut scanner = Scanner {
        fs,
        config,
        root,
        diagnostics,
        graph: IncludeGraph {
            root_dir: root.to_path_buf(),
            roots: vec![start.clone()],
            ..IncludeGraph::default()
        },
        stack: Vec::new(),
        cycle_sets: BTreeSet::new(),
    };
    let build_dir = start
        .parent()
        .filter(|dir| !dir.as_str().is_empty())
        .map_or_else(|| root.to_path_buf(), Utf8Path::to_path_buf);
    scanner.visit(&start, &build_dir, 0);
    debug!(
        entry = %entry,
        files = scanner.graph.files.len(),
        edges = scanner.graph.edges.len(),
        "include scan complete"
    );
    scanner.graph
}

/// Files reachable from the roots in post-order: included files come
/// before their includer, and children are visited in sorted order.
#[must_use]
pub fn collect_contents(graph: &IncludeGraph) -> Vec<&SourceFile> {
    fn walk<'g>(
        graph: &'g IncludeGraph,
        path: &Utf8Path,
        seen: &mut BTreeSet<Utf8PathBuf>,
        out: &mut Vec<&'g SourceFile>,
    ) {
        if !seen.insert(path.to_path_buf()) {
            return;
        }
        for child in graph.children(path) {
            walk(graph, child, seen, out);
        }
        if let Some(file) = graph.files.get(path) {
            out.push(file);
        }
    }

    let mut seen = BTreeSet::new();
    let mut out = Vec::new();
    for root in &graph.roots {
        walk(graph, root, &mut seen, &mut out);
    }
    out
}

struct Scanner<'s> {
    fs: &'s dyn FileSystem,
    config: &'s Config,
    root: &'s Utf8Path,
    diagnostics: &'s mut Diagnostics,
    graph: IncludeGraph,
    stack: Vec<Utf8PathBuf>,
    cycle_sets: BTreeSet<BTreeSet<Utf8PathBuf>>,
}

/// A reference to another file found in a makefile.
struct Reference {
    raw: String,
    kind: EdgeKind,
    optional: bool,
    location: SourceLocation,
}

impl Scanner<'_> {
    fn relative(&self, path: &Utf8Path) -> Utf8PathBuf {
        path.strip_prefix(self.root)
            .map_or_else(|_| path.to_path_buf(), Utf8Path::to_path_buf)
    }

    fn visit(&mut self, path: &Utf8Path, build_dir: &Utf8Path, depth: usize) {
        if let Some(start) = self.stack.iter().position(|p| p == path) {
            self.record_cycle(start, path);
            return;
        }
        if self.graph.files.contains_key(path) {
            return;
        }
        if depth > MAX_INCLUDE_DEPTH {
            self.diagnostics.report(
                DiagCode::DiscoveryDepthExceeded,
                format!("include depth {MAX_INCLUDE_DEPTH} exceeded at {path}"),
                None,
            );
            return;
        }
        let contents = match self.fs.read_text(path) {
            Ok(text) => text,
            Err(err) => {
                let code = if depth == 0 {
                    DiagCode::DiscoveryEntryMissing
                } else {
                    DiagCode::DiscoveryReadFailed
                };
                self.diagnostics
                    .report(code, format!("cannot read {path}: {err}"), None);
                return;
            }
        };
        let relative = self.relative(path);
        let references = references(&contents, &relative);
        self.graph.files.insert(
            path.to_path_buf(),
            SourceFile {
                path: path.to_path_buf(),
                relative,
                build_dir: build_dir.to_path_buf(),
                contents,
            },
        );
        debug!(file = %path, references = references.len(), "scanning makefile");

        self.stack.push(path.to_path_buf());
        for reference in references {
            self.follow(path, build_dir, &reference, depth);
        }
        self.stack.pop();
    }

    fn follow(&mut self, from: &Utf8Path, build_dir: &Utf8Path, reference: &Reference, depth: usize) {
        let raw = reference.raw.as_str();
        if raw.contains('$') || raw.contains(['*', '?', '[']) {
            self.diagnostics.report(
                DiagCode::DiscoveryUnresolvedPath,
                format!("cannot resolve '{raw}' statically; not followed"),
                Some(reference.location.clone()),
            );
            return;
        }
        let target = lexical(&build_dir.join(raw));
        let relative = self.relative(&target);
        if self.config.is_ignored(&relative) {
            self.diagnostics.report(
                DiagCode::DiscoveryIgnoredPath,
                format!("{relative} matches ignore_paths; not followed"),
                Some(reference.location.clone()),
            );
            return;
        }
        let (next, next_dir) = match reference.kind {
            EdgeKind::Include => (target, build_dir.to_path_buf()),
            EdgeKind::SubBuild => {
                let found = CANONICAL_NAMES
                    .iter()
                    .map(|name| target.join(name))
                    .find(|candidate| self.fs.is_file(candidate));
                let Some(entry) = found else {
                    self.diagnostics.report(
                        DiagCode::DiscoveryIncludeMissing,
                        format!("sub-build directory {relative} has no makefile"),
                        Some(reference.location.clone()),
                    );
                    return;
                };
                (entry, target)
            }
        };
        if reference.kind == EdgeKind::Include && !self.fs.is_file(&next) {
            let (code, wording) = if reference.optional {
                (DiagCode::DiscoveryOptionalIncludeMissing, "optional include")
            } else {
                (DiagCode::DiscoveryIncludeMissing, "include")
            };
            self.diagnostics.report(
                code,
                format!("{wording} {relative} not found"),
                Some(reference.location.clone()),
            );
            return;
        }
        self.graph.edges.push(IncludeEdge {
            from: from.to_path_buf(),
            to: next.clone(),
            kind: reference.kind,
            location: reference.location.clone(),
        });
        self.visit(&next, &next_dir, depth + 1);
    }

    fn record_cycle(&mut self, start: usize, closing: &Utf8Path) {
        let members: Vec<Utf8PathBuf> = self.stack.get(start..).unwrap_or_default().to_vec();
        if !self.cycle_sets.insert(members.iter().cloned().collect()) {
            return;
        }
        let mut shown: Vec<String> = members.iter().map(|p| self.relative(p).to_string()).collect();
        shown.push(self.relative(closing).to_string());
        let path = shown.join(" -> ");
        self.diagnostics.report(
            DiagCode::DiscoveryIncludeCycle,
            format!("include cycle: {path}"),
            None,
        );
        self.graph.cycles.push(members);
    }
}

/// Include directives and sub-build invocations in document order.
fn references(contents: &str, relative: &Utf8Path) -> Vec<Reference> {
    let mut found = Vec::new();
    for line in logical_lines(contents) {
        let location = SourceLocation::new(relative, line.line, line.column);
        if line.is_command {
            if let Some(dir) = sub_build_dir(&line.text) {
                found.push(Reference {
                    raw: dir,
                    kind: EdgeKind::SubBuild,
                    optional: false,
                    location,
                });
            }
            continue;
        }
        let Some((keyword, rest)) = line.text.split_once(char::is_whitespace) else {
            continue;
        };
        let optional = match keyword {
            "include" => false,
            "-include" | "sinclude" => true,
            _ => continue,
        };
        if keyword_is_name(rest.trim_start()) {
            continue;
        }
        for raw in rest.split_whitespace() {
            found.push(Reference {
                raw: raw.to_owned(),
                kind: EdgeKind::Include,
                optional,
                location: location.clone(),
            });
        }
    }
    found
}

/// Fold `.` and `..` components without touching the filesystem.
fn lexical(path: &Utf8Path) -> Utf8PathBuf {
    let mut out = Utf8PathBuf::new();
    for component in path.components() {
        match component {
            Utf8Component::CurDir => {}
            Utf8Component::ParentDir
                if matches!(out.components().next_back(), Some(Utf8Component::Normal(_))) =>
            {
                out.pop();
            }
            other => out.push(other),
        }
    }
    out
}

fn is_make(token: &str) -> bool {
    matches!(token, "$(MAKE)" | "${MAKE}" | "make" | "gmake")
        || token.ends_with("/make")
        || token.ends_with("/gmake")
}

/// Directory of a recursive make invocation in a recipe line.
///
/// Recognises `-C DIR`, `-CDIR`, `--directory=DIR`, `--directory DIR` and
/// a preceding `cd DIR`.
pub fn sub_build_dir(command: &str) -> Option<String> {
    let line = command.trim_start_matches(|c: char| matches!(c, '@' | '-' | '+') || c.is_whitespace());
    let tokens = shlex::split(line)
        .unwrap_or_else(|| line.split_whitespace().map(str::to_owned).collect());
    let mut cd_dir: Option<String> = None;
    let mut iter = tokens.iter().map(String::as_str).peekable();
    while let Some(token) = iter.next() {
        if token == "cd" {
            cd_dir = iter.next().map(|dir| dir.trim_end_matches(';').to_owned());
            continue;
        }
        if !is_make(token) {
            continue;
        }
        while let Some(arg) = iter.next() {
            match arg {
                "-C" | "--directory" => return iter.next().map(str::to_owned),
                "&&" | "||" | ";" | "|" => break,
                _ => {
                    if let Some(dir) = arg.strip_prefix("--directory=") {
                        return Some(dir.to_owned());
                    }
                    if let Some(dir) = arg.strip_prefix("-C").filter(|d| !d.is_empty()) {
                        return Some(dir.to_owned());
                    }
                }
            }
        }
        if cd_dir.is_some() {
            return cd_dir;
        }
    }
    None
}
