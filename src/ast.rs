//! Abstract Syntax Tree for the Make dialect.
//!
//! The parser turns each makefile into an ordered list of [`Node`]s. Nodes
//! are immutable values: they are produced once and only read afterwards by
//! the evaluator. Every node carries the [`SourceLocation`] of the logical
//! line that produced it.
//!
//! ```rust
//! use camino::Utf8Path;
//! use gmake2cmake::ast::{AssignKind, NodeKind};
//! use gmake2cmake::parser::parse_source;
//!
//! let out = parse_source("CC := gcc\n", Utf8Path::new("Makefile"));
//! match &out.nodes[0].kind {
//!     NodeKind::VariableAssign { name, kind, .. } => {
//!         assert_eq!(name, "CC");
//!         assert_eq!(*kind, AssignKind::Simple);
//!     }
//!     other => panic!("unexpected node {other:?}"),
//! }
//! ```

use std::fmt;

use camino::Utf8PathBuf;
use serde::Serialize;

/// Position of a construct inside a source file.
///
/// Lines and columns are 1-based.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub struct SourceLocation {
    /// File the construct was read from.
    pub path: Utf8PathBuf,
    /// 1-based line of the first physical line of the construct.
    pub line: usize,
    /// 1-based column of the first significant character.
    pub column: usize,
}

impl SourceLocation {
    /// Build a location from its parts.
    #[must_use]
    pub fn new(path: impl Into<Utf8PathBuf>, line: usize, column: usize) -> Self {
        Self {
            path: path.into(),
            line,
            column,
        }
    }
}

impl fmt::Display for SourceLocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}:{}", self.path, self.line, self.column)
    }
}

/// Assignment operator used by a variable definition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AssignKind {
    /// `:=` or `::=`; the value is expanded once, at assignment time.
    Simple,
    /// `=`; the value is stored raw and expanded on every use.
    Recursive,
    /// `+=`; appends to the existing value.
    Append,
    /// `?=`; assigns only when the variable is unset.
    Conditional,
}

/// Directive that opens a conditional block.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ConditionalKind {
    /// `ifeq`
    Ifeq,
    /// `ifneq`
    Ifneq,
    /// `ifdef`
    Ifdef,
    /// `ifndef`
    Ifndef,
}

impl ConditionalKind {
    /// Recognise a conditional keyword.
    #[must_use]
    pub fn from_keyword(word: &str) -> Option<Self> {
        match word {
            "ifeq" => Some(Self::Ifeq),
            "ifneq" => Some(Self::Ifneq),
            "ifdef" => Some(Self::Ifdef),
            "ifndef" => Some(Self::Ifndef),
            _ => None,
        }
    }

    /// The directive keyword.
    #[must_use]
    pub const fn keyword(self) -> &'static str {
        match self {
            Self::Ifeq => "ifeq",
            Self::Ifneq => "ifneq",
            Self::Ifdef => "ifdef",
            Self::Ifndef => "ifndef",
        }
    }
}

/// The test of a conditional, kept unevaluated.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ConditionalTest {
    /// Which directive opened the block.
    pub kind: ConditionalKind,
    /// Raw argument text following the keyword.
    pub argument: String,
}

/// A recipe line as written, without its leading tab.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CommandLine {
    /// Command text.
    pub text: String,
    /// Where the command was written.
    pub location: SourceLocation,
}

/// A parsed statement together with its location.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Node {
    /// What the statement is.
    pub kind: NodeKind,
    /// Where the statement starts.
    pub location: SourceLocation,
}

impl Node {
    /// Pair a node kind with its location.
    #[must_use]
    pub const fn new(kind: NodeKind, location: SourceLocation) -> Self {
        Self { kind, location }
    }
}

/// Closed set of statements understood by the translator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "node", rename_all = "snake_case")]
pub enum NodeKind {
    /// `NAME op value`.
    VariableAssign {
        /// Variable name.
        name: String,
        /// Unexpanded right-hand side.
        value: String,
        /// Assignment operator.
        kind: AssignKind,
    },
    /// An explicit rule.
    Rule {
        /// Targets left of the colon.
        targets: Vec<String>,
        /// Prerequisites right of the colon.
        prerequisites: Vec<String>,
        /// Recipe lines.
        commands: Vec<CommandLine>,
    },
    /// A rule whose targets contain `%`.
    PatternRule {
        /// Target patterns.
        target_patterns: Vec<String>,
        /// Prerequisite patterns.
        prerequisite_patterns: Vec<String>,
        /// Recipe template lines.
        commands: Vec<CommandLine>,
    },
    /// `include`, `-include` or `sinclude`.
    IncludeStmt {
        /// Paths named by the directive.
        paths: Vec<String>,
        /// `true` for `-include` and `sinclude`.
        optional: bool,
    },
    /// An `ifeq`/`ifneq`/`ifdef`/`ifndef` block.
    Conditional {
        /// The unevaluated test.
        test: ConditionalTest,
        /// Statements before `else`.
        true_body: Vec<Node>,
        /// Statements after `else`.
        false_body: Vec<Node>,
    },
    /// A tab-prefixed line not attached to a rule header.
    RawCommand {
        /// Command text without the tab.
        text: String,
    },
}
