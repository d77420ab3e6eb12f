//! Recognition of compiler, linker and archiver invocations in recipes.
//!
//! Recipes are free-form shell. Each expanded command line is split into
//! chained commands, tokenised with `shlex`, and matched against a small
//! set of known tools. Anything that is not recognised stays a plain
//! [`CustomCommand`].

use serde::Serialize;

use crate::ast::SourceLocation;
use crate::ir::Language;

/// A compile action recovered from a recipe.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct InferredCompile {
    /// Source file being compiled.
    pub source: String,
    /// Output named with `-o`, when it applies to this source.
    pub output: Option<String>,
    /// Language from the source extension, else from the compiler.
    pub language: Language,
    /// Remaining dash-prefixed tokens.
    pub flags: Vec<String>,
    /// `-I` and `-isystem` directories.
    pub includes: Vec<String>,
    /// `-D` definitions without the prefix.
    pub defines: Vec<String>,
    /// `-l` libraries without the prefix.
    pub link_libs: Vec<String>,
    /// `-L`, `-Wl,`, `-shared` and `-pthread`.
    pub link_options: Vec<String>,
    /// Recipe line the compile came from.
    pub location: SourceLocation,
}

/// Whether an inferred link produces an archive or a linked binary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum LinkKind {
    /// `ar r…`
    Archive,
    /// Compiler driver invoked without sources.
    Link,
}

/// A link or archive action recovered from a recipe.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct InferredLink {
    /// Artifact produced.
    pub output: String,
    /// Objects and libraries consumed.
    pub inputs: Vec<String>,
    /// Archive or link.
    pub kind: LinkKind,
    /// `-l` libraries without the prefix.
    pub link_libs: Vec<String>,
    /// Other link options.
    pub link_options: Vec<String>,
    /// Recipe line the link came from.
    pub location: SourceLocation,
}

/// A recipe line that is neither a compile nor a link.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CustomCommand {
    /// Targets of the owning rule.
    pub targets: Vec<String>,
    /// Prerequisites of the owning rule.
    pub prerequisites: Vec<String>,
    /// Expanded command text.
    pub command: String,
    /// Where the command was written.
    pub location: SourceLocation,
}

/// One recognised action.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Inference {
    /// A compile.
    Compile(InferredCompile),
    /// A link or archive.
    Link(InferredLink),
}

const WRAPPERS: &[&str] = &["ccache", "distcc", "env"];

/// Flags whose argument is the following token.
const FLAGS_WITH_ARGUMENT: &[&str] = &[
    "-MF", "-MT", "-MQ", "-include", "-imacros", "-x", "-arch", "-target",
];

/// Recognise every compile, link and archive in one expanded recipe line.
///
/// ```
/// use gmake2cmake::ast::SourceLocation;
/// use gmake2cmake::eval::{Inference, infer_command};
///
/// let location = SourceLocation::new("Makefile", 3, 2);
/// let found = infer_command("@ccache gcc-12 -Iinc -DNDEBUG -O2 -c a.c -o a.o", &location);
/// let [Inference::Compile(compile)] = found.as_slice() else { panic!("{found:?}") };
/// assert_eq!(compile.source, "a.c");
/// assert_eq!(compile.output.as_deref(), Some("a.o"));
/// assert_eq!(compile.includes, ["inc"]);
/// assert_eq!(compile.defines, ["NDEBUG"]);
/// assert_eq!(compile.flags, ["-O2"]);
/// ```
#[must_use]
pub fn infer_command(command: &str, location: &SourceLocation) -> Vec<Inference> {
    let line = command.trim_start_matches(|c: char| matches!(c, '@' | '-' | '+') || c.is_whitespace());
    let mut found = Vec::new();
    let mut workdir = String::new();
    for tokens in split_chain(line).into_iter().filter_map(shlex::split) {
        if let [cd, dir] = tokens.as_slice()
            && cd == "cd"
        {
            workdir = rebase(&workdir, dir);
            continue;
        }
        found.extend(
            infer_tokens(&tokens, location)
                .into_iter()
                .map(|inference| inference.rebased(&workdir)),
        );
    }
    found
}

/// Resolve `path` against a `cd` directory, folding `.` and `..`
/// lexically. Absolute paths are kept as written.
pub(crate) fn rebase(workdir: &str, path: &str) -> String {
    if workdir.is_empty() || path.starts_with('/') {
        return path.to_owned();
    }
    let mut parts: Vec<&str> = Vec::new();
    for part in workdir.split('/').chain(path.split('/')) {
        match part {
            "" | "." => {}
            ".." if parts.last().is_some_and(|last| *last != "..") => {
                parts.pop();
            }
            other => parts.push(other),
        }
    }
    parts.join("/")
}

impl Inference {
    pub(crate) fn rebased(self, workdir: &str) -> Self {
        if workdir.is_empty() {
            return self;
        }
        match self {
            Self::Compile(mut compile) => {
                compile.source = rebase(workdir, &compile.source);
                compile.output = compile.output.map(|out| rebase(workdir, &out));
                Self::Compile(compile)
            }
            Self::Link(mut link) => {
                link.output = rebase(workdir, &link.output);
                link.inputs = link.inputs.iter().map(|input| rebase(workdir, input)).collect();
                Self::Link(link)
            }
        }
    }
}

/// Split on `&&`, `||` and `;` outside quotes.
fn split_chain(line: &str) -> Vec<&str> {
    let mut segments = Vec::new();
    let mut quote: Option<char> = None;
    let mut start = 0;
    let mut chars = line.char_indices().peekable();
    while let Some((idx, ch)) = chars.next() {
        match (quote, ch) {
            (Some(open), c) if c == open => quote = None,
            (Some(_), _) => {}
            (None, '\'' | '"') => quote = Some(ch),
            (None, ';') => {
                segments.push(line.get(start..idx).unwrap_or_default());
                start = idx + 1;
            }
            (None, '&' | '|') if chars.peek().is_some_and(|&(_, next)| next == ch) => {
                chars.next();
                segments.push(line.get(start..idx).unwrap_or_default());
                start = idx + 2;
            }
            _ => {}
        }
    }
    segments.push(line.get(start..).unwrap_or_default());
    segments
        .into_iter()
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .collect()
}

fn is_env_assignment(token: &str) -> bool {
    token.split_once('=').is_some_and(|(name, _)| {
        !name.is_empty()
            && name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_')
            && !name.starts_with(|c: char| c.is_ascii_digit())
    })
}

fn program_name(token: &str) -> &str {
    let base = token.rsplit('/').next().unwrap_or(token);
    match base.rsplit_once('-') {
        Some((head, version))
            if !version.is_empty() && version.chars().all(|c| c.is_ascii_digit() || c == '.') =>
        {
            head
        }
        _ => base,
    }
}

/// Compiler family for a program token, allowing cross prefixes and
/// version suffixes (`arm-none-eabi-gcc`, `clang++-15`).
fn compiler_language(token: &str) -> Option<Language> {
    let program = program_name(token);
    let tool = program.rsplit('-').next().unwrap_or(program);
    match tool {
        "gcc" | "cc" | "clang" => Some(Language::C),
        "g++" | "c++" | "clang++" => Some(Language::Cxx),
        _ => None,
    }
}

fn is_archiver(token: &str) -> bool {
    let program = program_name(token);
    program == "ar" || program.ends_with("-ar")
}

/// Language implied by a source file extension.
#[must_use]
pub fn source_language(path: &str) -> Option<Language> {
    let (_, ext) = path.rsplit_once('.')?;
    match ext {
        "c" => Some(Language::C),
        "cc" | "cpp" | "cxx" | "cp" | "c++" | "C" | "CPP" => Some(Language::Cxx),
        "s" | "S" | "sx" | "asm" => Some(Language::Asm),
        _ => None,
    }
}

fn is_link_input(path: &str) -> bool {
    let file = path.rsplit('/').next().unwrap_or(path);
    [".o", ".obj", ".a", ".so", ".dylib"]
        .iter()
        .any(|ext| file.ends_with(ext))
        || file.contains(".so.")
}

fn infer_tokens(tokens: &[String], location: &SourceLocation) -> Vec<Inference> {
    let Some(start) = tokens
        .iter()
        .position(|t| !is_env_assignment(t) && !WRAPPERS.contains(&program_name(t)))
    else {
        return Vec::new();
    };
    let Some((program, args)) = tokens.get(start..).and_then(<[String]>::split_first) else {
        return Vec::new();
    };
    if let Some(language) = compiler_language(program) {
        return CompilerArgs::parse(args).into_inferences(language, location);
    }
    if is_archiver(program) {
        return archive(args, location).into_iter().collect();
    }
    Vec::new()
}

#[derive(Debug, Default)]
struct CompilerArgs {
    sources: Vec<String>,
    inputs: Vec<String>,
    output: Option<String>,
    compile_only: bool,
    flags: Vec<String>,
    includes: Vec<String>,
    defines: Vec<String>,
    link_libs: Vec<String>,
    link_options: Vec<String>,
}

impl CompilerArgs {
    fn parse(args: &[String]) -> Self {
        let mut parsed = Self::default();
        let mut iter = args.iter();
        while let Some(token) = iter.next() {
            let tok = token.as_str();
            match tok {
                "-c" => parsed.compile_only = true,
                "-o" => parsed.output = iter.next().cloned(),
                "-I" | "-isystem" => parsed.includes.extend(iter.next().cloned()),
                "-D" => parsed.defines.extend(iter.next().cloned()),
                "-l" => parsed.link_libs.extend(iter.next().cloned()),
                "-L" => {
                    if let Some(dir) = iter.next() {
                        parsed.link_options.push(format!("-L{dir}"));
                    }
                }
                "-shared" | "-pthread" => parsed.link_options.push(tok.to_owned()),
                flag if FLAGS_WITH_ARGUMENT.contains(&flag) => {
                    parsed.flags.push(flag.to_owned());
                    parsed.flags.extend(iter.next().cloned());
                }
                _ => parsed.classify(tok),
            }
        }
        parsed
    }

    fn classify(&mut self, tok: &str) {
        if let Some(dir) = tok.strip_prefix("-I") {
            self.includes.push(dir.to_owned());
        } else if let Some(def) = tok.strip_prefix("-D") {
            self.defines.push(def.to_owned());
        } else if let Some(lib) = tok.strip_prefix("-l") {
            self.link_libs.push(lib.to_owned());
        } else if let Some(out) = tok.strip_prefix("-o") {
            self.output = Some(out.to_owned());
        } else if tok.starts_with("-L") || tok.starts_with("-Wl,") {
            self.link_options.push(tok.to_owned());
        } else if tok.starts_with('-') {
            self.flags.push(tok.to_owned());
        } else if source_language(tok).is_some() {
            self.sources.push(tok.to_owned());
        } else if is_link_input(tok) {
            self.inputs.push(tok.to_owned());
        }
    }

    fn into_inferences(self, compiler: Language, location: &SourceLocation) -> Vec<Inference> {
        let mut found = Vec::new();
        let per_source_output = self.sources.len() == 1 || !self.compile_only;
        for source in &self.sources {
            found.push(Inference::Compile(InferredCompile {
                source: source.clone(),
                output: self.output.clone().filter(|_| per_source_output),
                language: source_language(source).unwrap_or(compiler),
                flags: self.flags.clone(),
                includes: self.includes.clone(),
                defines: self.defines.clone(),
                link_libs: self.link_libs.clone(),
                link_options: self.link_options.clone(),
                location: location.clone(),
            }));
        }
        let links = !self.compile_only && (self.sources.is_empty() || !self.inputs.is_empty());
        if let (true, Some(output)) = (links, self.output) {
            found.push(Inference::Link(InferredLink {
                output,
                inputs: self.inputs,
                kind: LinkKind::Link,
                link_libs: self.link_libs,
                link_options: self.link_options,
                location: location.clone(),
            }));
        }
        found
    }
}

fn archive(args: &[String], location: &SourceLocation) -> Option<Inference> {
    let (operation, rest) = args.split_first()?;
    if !operation.trim_start_matches('-').contains('r') {
        return None;
    }
    let (output, inputs) = rest.split_first()?;
    Some(Inference::Link(InferredLink {
        output: output.clone(),
        inputs: inputs.to_vec(),
        kind: LinkKind::Archive,
        link_libs: Vec::new(),
        link_options: Vec::new(),
        location: location.clone(),
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    fn infer(command: &str) -> Vec<Inference> {
        infer_command(command, &SourceLocation::new("Makefile", 1, 2))
    }

    fn compiles(command: &str) -> Vec<InferredCompile> {
        infer(command)
            .into_iter()
            .filter_map(|i| match i {
                Inference::Compile(c) => Some(c),
                Inference::Link(_) => None,
            })
            .collect()
    }

    fn links(command: &str) -> Vec<InferredLink> {
        infer(command)
            .into_iter()
            .filter_map(|i| match i {
                Inference::Link(l) => Some(l),
                Inference::Compile(_) => None,
            })
            .collect()
    }

    #[rstest]
    #[case("gcc -c a.c", Language::C)]
    #[case("g++ -c a.cpp -o a.o", Language::Cxx)]
    #[case("gcc -c start.S", Language::Asm)]
    #[case("arm-none-eabi-gcc -c a.c", Language::C)]
    #[case("/usr/bin/clang++-15 -c a.cc", Language::Cxx)]
    #[case("CCACHE_DIR=/tmp ccache cc -c a.c", Language::C)]
    #[case("-@x86_64-linux-gnu-gcc-12 -c a.c", Language::C)]
    #[case("c++ -c a.c", Language::C)]
    fn recognises_compilers(#[case] command: &str, #[case] language: Language) {
        let found = compiles(command);
        assert_eq!(found.len(), 1, "{command}");
        assert_eq!(found[0].language, language);
    }

    #[rstest]
    #[case("echo gcc -c a.c")]
    #[case("rm -f a.o")]
    #[case("gcc --version")]
    #[case("mkdir -p build")]
    fn ignores_non_compiles(#[case] command: &str) {
        assert!(infer(command).is_empty(), "{command}");
    }

    #[rstest]
    fn chained_commands_are_split() {
        let found = compiles("mkdir -p obj && gcc -c a.c -o obj/a.o; gcc -c b.c || true");
        let sources: Vec<_> = found.iter().map(|c| c.source.as_str()).collect();
        assert_eq!(sources, ["a.c", "b.c"]);
    }

    #[rstest]
    fn cd_prefix_rebases_paths() {
        let found = compiles("cd src && gcc -c a.c -o ../obj/a.o");
        assert_eq!(found[0].source, "src/a.c");
        assert_eq!(found[0].output.as_deref(), Some("obj/a.o"));
    }

    #[rstest]
    fn quoted_separators_are_not_split() {
        let found = compiles("gcc -DMSG='\"a;b\"' -c a.c");
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].defines, ["MSG=\"a;b\""]);
    }

    #[rstest]
    fn argument_flags_consume_their_argument() {
        let found = compiles("gcc -MF a.d -MT a.o -isystem /opt/inc -x c -c a.c");
        assert_eq!(found[0].includes, ["/opt/inc"]);
        assert_eq!(found[0].flags, ["-MF", "a.d", "-MT", "a.o", "-x", "c"]);
        assert_eq!(found[0].source, "a.c");
    }

    #[rstest]
    fn link_flags_are_not_compile_flags() {
        let found = compiles("gcc -O2 -pthread main.c -o app -Llib -lm -Wl,-rpath,/x");
        assert_eq!(found[0].flags, ["-O2"]);
        assert_eq!(found[0].link_libs, ["m"]);
        assert_eq!(found[0].link_options, ["-pthread", "-Llib", "-Wl,-rpath,/x"]);
        assert_eq!(found[0].output.as_deref(), Some("app"));
    }

    #[rstest]
    fn multiple_sources_with_dash_c_have_no_output() {
        let found = compiles("gcc -c a.c b.c -o out.o");
        assert!(found.iter().all(|c| c.output.is_none()));
    }

    #[rstest]
    fn driver_without_sources_is_a_link() {
        let found = links("cc -o app main.o util.o libfoo.a -lz");
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].kind, LinkKind::Link);
        assert_eq!(found[0].output, "app");
        assert_eq!(found[0].inputs, ["main.o", "util.o", "libfoo.a"]);
        assert_eq!(found[0].link_libs, ["z"]);
    }

    #[rstest]
    #[case("ar rcs libfoo.a a.o b.o")]
    #[case("ar -rv libfoo.a a.o b.o")]
    #[case("arm-none-eabi-ar cr libfoo.a a.o b.o")]
    fn archives(#[case] command: &str) {
        let found = links(command);
        assert_eq!(found.len(), 1, "{command}");
        assert_eq!(found[0].kind, LinkKind::Archive);
        assert_eq!(found[0].output, "libfoo.a");
        assert_eq!(found[0].inputs, ["a.o", "b.o"]);
    }

    #[rstest]
    fn ar_without_insert_is_ignored() {
        assert!(links("ar t libfoo.a").is_empty());
    }
}
