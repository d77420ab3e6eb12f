//! Intermediate Representation structures.
//!
//! The IR is the typed build graph handed to a code generator. It mirrors
//! the conceptual model of a CMake project (named targets with sources,
//! usage requirements and dependencies) without embedding any CMake
//! syntax.
//!
//! # Examples
//!
//! ```
//! use gmake2cmake::ir::{Project, Target, TargetType};
//!
//! let mut lib = Target::new("libfoo.a", "demo_libfoo", TargetType::Static);
//! lib.alias = Some("demo::libfoo".into());
//! let mut app = Target::new("app", "demo_app", TargetType::Executable);
//! app.deps.push(lib.alias_or_name().to_owned());
//! let project = Project {
//!     name: "demo".into(),
//!     targets: vec![lib, app],
//!     ..Project::default()
//! };
//! assert_eq!(project.target("demo_app").map(|t| t.deps.len()), Some(1));
//! ```

pub mod builder;
pub mod cycle;

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::eval::{CustomCommand, ProjectGlobals};
use crate::unknown::UnknownConstruct;

pub use builder::build_project;
pub use cycle::{CycleReport, break_cycles, detect, find_cycles, is_acyclic};

/// Kind of artifact a target produces.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TargetType {
    /// Static archive (`.a`).
    Static,
    /// Shared library (`.so`, `.so.N`, `.dylib`).
    Shared,
    /// Object file collection (`.o`).
    Object,
    /// Linked program.
    Executable,
    /// Provided by an external package.
    Imported,
    /// Header-only or usage-requirement-only target.
    Interface,
}

impl TargetType {
    /// Infer the type from an artifact path's extension.
    ///
    /// ```
    /// use gmake2cmake::ir::TargetType;
    ///
    /// assert_eq!(TargetType::from_artifact("out/libz.so.1"), TargetType::Shared);
    /// assert_eq!(TargetType::from_artifact("app"), TargetType::Executable);
    /// ```
    #[must_use]
    pub fn from_artifact(artifact: &str) -> Self {
        let file = artifact.rsplit('/').next().unwrap_or(artifact);
        if file.ends_with(".a") {
            Self::Static
        } else if file.ends_with(".so") || file.ends_with(".dylib") || file.contains(".so.") {
            Self::Shared
        } else if file.ends_with(".o") || file.ends_with(".obj") {
            Self::Object
        } else {
            Self::Executable
        }
    }
}

/// Scope of a target's usage requirements.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Visibility {
    /// Used by the target and its consumers.
    Public,
    /// Used by the target only.
    Private,
    /// Used by consumers only.
    Interface,
}

/// Source language of a compile.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Language {
    /// C.
    #[serde(rename = "C")]
    C,
    /// C++.
    #[serde(rename = "CXX")]
    Cxx,
    /// Assembler.
    #[serde(rename = "ASM")]
    Asm,
}

impl fmt::Display for Language {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::C => "C",
            Self::Cxx => "CXX",
            Self::Asm => "ASM",
        })
    }
}

/// A single build artifact and everything needed to produce it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Target {
    /// Output path; the target's identity.
    pub artifact: String,
    /// Physical build-tool name.
    pub name: String,
    /// Namespaced alias.
    pub alias: Option<String>,
    /// Artifact kind.
    #[serde(rename = "type")]
    pub target_type: TargetType,
    /// Source files.
    pub sources: Vec<String>,
    /// Include directories.
    pub include_dirs: Vec<String>,
    /// Preprocessor definitions without the `-D`.
    pub defines: Vec<String>,
    /// Compile options after flag mapping.
    pub compile_options: Vec<String>,
    /// Link options (`-L`, `-Wl,`).
    pub link_options: Vec<String>,
    /// Libraries to link.
    pub link_libs: Vec<String>,
    /// Alias-or-name of each dependency, sorted.
    pub deps: Vec<String>,
    /// Commands attached to this target.
    pub custom_commands: Vec<CustomCommand>,
    /// Scope of configured usage requirements.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub visibility: Option<Visibility>,
}

impl Target {
    /// Create an empty target.
    #[must_use]
    pub fn new(
        artifact: impl Into<String>,
        name: impl Into<String>,
        target_type: TargetType,
    ) -> Self {
        Self {
            artifact: artifact.into(),
            name: name.into(),
            alias: None,
            target_type,
            sources: Vec::new(),
            include_dirs: Vec::new(),
            defines: Vec::new(),
            compile_options: Vec::new(),
            link_options: Vec::new(),
            link_libs: Vec::new(),
            deps: Vec::new(),
            custom_commands: Vec::new(),
            visibility: None,
        }
    }

    /// The identifier other targets use to depend on this one.
    #[must_use]
    pub fn alias_or_name(&self) -> &str {
        self.alias.as_deref().unwrap_or(&self.name)
    }
}

/// The IR root.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Project {
    /// Project name.
    pub name: String,
    /// Project version.
    pub version: Option<String>,
    /// Namespace used for names and aliases.
    pub namespace: Option<String>,
    /// Languages used by any compile, sorted.
    pub languages: Vec<Language>,
    /// Targets in creation order.
    pub targets: Vec<Target>,
    /// Global settings gathered from configuration makefiles.
    pub project_config: ProjectGlobals,
    /// Commands that produce no known target.
    pub custom_commands: Vec<CustomCommand>,
    /// Everything the frontend could not model.
    pub unknown_constructs: Vec<UnknownConstruct>,
}

impl Project {
    /// Find a target by physical name.
    #[must_use]
    pub fn target(&self, name: &str) -> Option<&Target> {
        self.targets.iter().find(|target| target.name == name)
    }

    /// Find a target by artifact path.
    #[must_use]
    pub fn target_for_artifact(&self, artifact: &str) -> Option<&Target> {
        self.targets.iter().find(|target| target.artifact == artifact)
    }
}
