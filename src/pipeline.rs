//! End-to-end translation of a make project into the IR.
//!
//! The stages run in a fixed order: discovery, parsing and evaluation
//! (per partition, with pattern instantiation), IR construction, and cycle
//! detection. Every stage reports into diagnostics instead of failing, so
//! [`translate`] always returns a best-effort [`Translation`].

use camino::Utf8Path;
use tracing::{debug, info};

use crate::config::Config;
use crate::diagnostics::Diagnostics;
use crate::discovery::{IncludeGraph, resolve_entry, scan_includes};
use crate::eval::{BuildFacts, evaluate_partitions};
use crate::fs::FileSystem;
use crate::ir::{CycleReport, Project, break_cycles, build_project, detect};
use crate::unknown::UnknownConstruct;

/// Everything a translation run produced.
#[derive(Debug, Clone)]
pub struct Translation {
    /// The project IR.
    pub project: Project,
    /// Diagnostics from every stage, in stage order.
    pub diagnostics: Diagnostics,
    /// Constructs that could not be translated, with gapless ids.
    pub unknown_constructs: Vec<UnknownConstruct>,
    /// The include graph that was evaluated.
    pub include_graph: IncludeGraph,
    /// Dependency cycles left in the returned project.
    pub cycles: CycleReport,
}

impl Translation {
    /// Whether the run failed.
    #[must_use]
    pub fn has_errors(&self) -> bool {
        self.diagnostics.has_errors()
    }
}

/// Translate the project rooted at `source_dir`.
///
/// `entry_override` names the entry makefile inside `source_dir`; when it
/// is absent the canonical names are tried. With `config.break_cycles`
/// set, one edge per cycle is removed and the cycles are detected again.
/// The first detection's diagnostics are kept either way.
///
/// # Examples
///
/// ```rust
/// use camino::Utf8Path;
/// use gmake2cmake::config::Config;
/// use gmake2cmake::fs::MemoryFileSystem;
/// use gmake2cmake::pipeline::translate;
///
/// let fs = MemoryFileSystem::new()
///     .with_file("proj/Makefile", "app: main.c\n\tcc -o app main.c\n");
/// let run = translate(Utf8Path::new("proj"), None, &Config::default(), &fs);
/// assert!(!run.has_errors());
/// assert_eq!(run.project.targets[0].sources, ["main.c"]);
/// ```
#[must_use]
pub fn translate(
    source_dir: &Utf8Path,
    entry_override: Option<&str>,
    config: &Config,
    fs: &dyn FileSystem,
) -> Translation {
    let mut diagnostics = Diagnostics::new();
    let Some(entry) = resolve_entry(source_dir, entry_override, fs, &mut diagnostics) else {
        let project = build_project(&BuildFacts::default(), config, &mut diagnostics);
        return Translation {
            project,
            diagnostics,
            unknown_constructs: Vec::new(),
            include_graph: IncludeGraph::default(),
            cycles: CycleReport::default(),
        };
    };
    debug!(entry = %entry, "resolved entry makefile");

    let include_graph = scan_includes(&entry, source_dir, fs, config, &mut diagnostics);
    let facts = {
        let partitions = include_graph.partitions();
        debug!(partitions = partitions.len(), files = include_graph.files.len(), "evaluating");
        evaluate_partitions(&partitions, source_dir, config, fs)
    };
    diagnostics.extend(facts.diagnostics.iter().cloned());

    let mut project = build_project(&facts, config, &mut diagnostics);
    let mut cycles = detect(&project.targets, &mut diagnostics);
    if config.break_cycles && cycles.has_cycles() {
        break_cycles(&mut project.targets, &cycles.cycles);
        cycles = detect(&project.targets, &mut Diagnostics::new());
        debug!(remaining = cycles.cycles.len(), "cycle breaking applied");
    }

    info!(
        targets = project.targets.len(),
        diagnostics = diagnostics.len(),
        unknown = project.unknown_constructs.len(),
        "translation finished"
    );
    Translation {
        unknown_constructs: project.unknown_constructs.clone(),
        project,
        diagnostics,
        include_graph,
        cycles,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::diagnostics::DiagCode;
    use crate::fs::MemoryFileSystem;
    use crate::ir::TargetType;
    use rstest::rstest;

    const MAKEFILE: &str = "\
CC = gcc
all: app
app: main.o libfoo.a
\t$(CC) -o app main.o libfoo.a -lm
libfoo.a: foo.o
\tar rcs libfoo.a foo.o
%.o: %.c
\t$(CC) -O2 -c $< -o $@
";

    const CYCLIC: &str = "\
liba.a: libb.a
\tar rcs liba.a a.o
libb.a: liba.a
\tar rcs libb.a b.o
";

    fn namespaced() -> Config {
        Config {
            namespace: Some("proj".to_owned()),
            ..Config::default()
        }
    }

    #[rstest]
    fn translates_a_small_project() {
        let fs = MemoryFileSystem::new()
            .with_file("proj/Makefile", MAKEFILE)
            .with_file("proj/main.c", "")
            .with_file("proj/foo.c", "");
        let run = translate(Utf8Path::new("proj"), None, &namespaced(), &fs);
        assert!(!run.has_errors(), "{:?}", run.diagnostics);
        let app = run.project.target_for_artifact("app").expect("app");
        assert_eq!(app.sources, ["main.c"]);
        assert_eq!(app.link_libs, ["m"]);
        assert_eq!(app.deps, ["proj::libfoo"]);
        let lib = run.project.target_for_artifact("libfoo.a").expect("lib");
        assert_eq!(lib.target_type, TargetType::Static);
        assert_eq!(lib.sources, ["foo.c"]);
        assert!(!run.cycles.has_cycles());
    }

    #[rstest]
    fn missing_entry_yields_an_empty_project() {
        let fs = MemoryFileSystem::new();
        let run = translate(Utf8Path::new("proj"), None, &namespaced(), &fs);
        assert!(run.has_errors());
        assert!(run.project.targets.is_empty());
        assert_eq!(run.diagnostics.count(DiagCode::DiscoveryEntryMissing), 1);
    }

    #[rstest]
    #[case(false, true)]
    #[case(true, false)]
    fn cycles_are_reported_and_optionally_broken(#[case] break_them: bool, #[case] remaining: bool) {
        let fs = MemoryFileSystem::new().with_file("proj/Makefile", CYCLIC);
        let config = Config {
            break_cycles: break_them,
            ..namespaced()
        };
        let run = translate(Utf8Path::new("proj"), None, &config, &fs);
        assert_eq!(run.diagnostics.count(DiagCode::IrDependencyCycle), 1);
        assert_eq!(run.cycles.has_cycles(), remaining);
    }

    #[rstest]
    fn serial_and_parallel_runs_agree() {
        let fs = MemoryFileSystem::new()
            .with_file("proj/Makefile", "all:\n\t$(MAKE) -C lib\n\t$(MAKE) -C app\n")
            .with_file("proj/lib/Makefile", MAKEFILE)
            .with_file("proj/lib/main.c", "")
            .with_file("proj/lib/foo.c", "")
            .with_file("proj/app/Makefile", "tool: t.c\n\tcc -o tool t.c $(shell echo x)\n");
        let serial = translate(Utf8Path::new("proj"), None, &namespaced(), &fs);
        let config = Config {
            parallel: true,
            ..namespaced()
        };
        let parallel = translate(Utf8Path::new("proj"), None, &config, &fs);
        assert_eq!(serial.project, parallel.project);
        assert_eq!(serial.diagnostics.as_slice(), parallel.diagnostics.as_slice());
        let lib = serial.project.target_for_artifact("lib/libfoo.a").expect("lib");
        assert_eq!(lib.sources, ["lib/foo.c"]);
    }

    /// Delegates to a [`MemoryFileSystem`] but panics when asked to scan
    /// one directory, which happens inside partition evaluation.
    struct ExplodingScan {
        inner: MemoryFileSystem,
        poisoned: &'static str,
    }

    impl FileSystem for ExplodingScan {
        fn read_text(&self, path: &Utf8Path) -> std::io::Result<String> {
            self.inner.read_text(path)
        }

        fn exists(&self, path: &Utf8Path) -> bool {
            self.inner.exists(path)
        }

        fn is_file(&self, path: &Utf8Path) -> bool {
            self.inner.is_file(path)
        }

        fn is_dir(&self, path: &Utf8Path) -> bool {
            self.inner.is_dir(path)
        }

        fn list_dir(&self, path: &Utf8Path) -> std::io::Result<Vec<camino::Utf8PathBuf>> {
            self.inner.list_dir(path)
        }

        fn walk_files(
            &self,
            root: &Utf8Path,
            max_depth: usize,
        ) -> std::io::Result<Vec<camino::Utf8PathBuf>> {
            assert_ne!(root.as_str(), self.poisoned, "scan of {root} exploded");
            self.inner.walk_files(root, max_depth)
        }
    }

    #[rstest]
    #[case(false)]
    #[case(true)]
    fn a_failing_partition_leaves_its_siblings_intact(#[case] parallel: bool) {
        let fs = ExplodingScan {
            inner: MemoryFileSystem::new()
                .with_file("proj/Makefile", "all:\n\t$(MAKE) -C lib\n\t$(MAKE) -C app\n")
                .with_file("proj/lib/Makefile", MAKEFILE)
                .with_file("proj/lib/foo.c", "")
                .with_file("proj/app/Makefile", "tool: t.c\n\tcc -o tool t.c\n"),
            poisoned: "proj/lib",
        };
        let config = Config {
            parallel,
            ..namespaced()
        };
        let run = translate(Utf8Path::new("proj"), None, &config, &fs);
        assert_eq!(run.diagnostics.count(DiagCode::EvalPartitionFailed), 1);
        assert!(!run.has_errors(), "{:?}", run.diagnostics);
        let tool = run.project.target_for_artifact("app/tool").expect("tool");
        assert_eq!(tool.sources, ["app/t.c"]);
        assert!(run.project.target_for_artifact("lib/libfoo.a").is_none());
    }
}
