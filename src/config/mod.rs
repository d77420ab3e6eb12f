//! Translator configuration.
//!
//! Configuration is a YAML document deserialised into [`Config`]. Every map
//! is a `BTreeMap` so that nothing observable depends on hash ordering.
//!
//! ```rust
//! use gmake2cmake::config::{Classification, Config};
//!
//! let config = Config::from_yaml_str(concat!(
//!     "project_name: demo\n",
//!     "namespace: Demo\n",
//!     "flag_mappings:\n",
//!     "  \"-O2\": \"-O3\"\n",
//!     "link_overrides:\n",
//!     "  libz:\n",
//!     "    classification: imported\n",
//!     "    imported_target: ZLIB::ZLIB\n",
//! ))
//! .expect("valid config");
//! assert_eq!(config.namespace(), "Demo");
//! assert_eq!(config.flag_mappings["-O2"], "-O3");
//! assert_eq!(
//!     config.link_overrides["libz"].classification,
//!     Classification::Imported
//! );
//! ```

use std::collections::BTreeMap;

use camino::{Utf8Path, Utf8PathBuf};
use glob::{MatchOptions, Pattern};
use miette::Diagnostic;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::diagnostics::DiagCode;
use crate::ir::{TargetType, Visibility};

/// Default basenames whose leading assignments feed project globals.
pub const DEFAULT_GLOBAL_CONFIG_FILES: &[&str] = &["config.mk", "common.mk", "defs.mk"];

const DEFAULT_MAX_SCAN_DEPTH: usize = 16;

/// Errors raised while loading configuration.
#[derive(Debug, Error, Diagnostic)]
pub enum ConfigError {
    /// The configuration file could not be read.
    #[error("failed to read configuration {path}")]
    #[diagnostic(code(gmake2cmake::config::read))]
    Read {
        /// File that was requested.
        path: Utf8PathBuf,
        /// Underlying I/O failure.
        #[source]
        source: std::io::Error,
    },
    /// The YAML did not match the configuration schema.
    #[error("invalid configuration {name}: {message}")]
    #[diagnostic(
        code(gmake2cmake::config::parse),
        help("check key names and value types; unknown keys are rejected")
    )]
    Parse {
        /// Display name of the document.
        name: String,
        /// Parser message.
        message: String,
    },
    /// An `ignore_paths` entry is not a valid glob.
    #[error("invalid ignore pattern '{pattern}': {message}")]
    #[diagnostic(code(gmake2cmake::config::ignore_pattern))]
    InvalidIgnorePattern {
        /// The offending pattern.
        pattern: String,
        /// Why the glob was rejected.
        message: String,
    },
}

impl ConfigError {
    /// Diagnostic code reported for this failure.
    #[must_use]
    pub const fn code(&self) -> DiagCode {
        match self {
            Self::Read { .. } | Self::Parse { .. } => DiagCode::ConfigParseError,
            Self::InvalidIgnorePattern { .. } => DiagCode::ConfigInvalidPattern,
        }
    }
}

/// How a target relates to the project being translated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Classification {
    /// Built by this project.
    Internal,
    /// Built elsewhere; no alias is generated unless one is supplied.
    External,
    /// Provided by a package; sources are dropped and a caller-provided
    /// target name is used instead.
    Imported,
}

/// Per-target adjustments keyed by artifact stem.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct TargetMapping {
    /// Replacement physical name.
    pub dest_name: Option<String>,
    /// Replacement target type.
    pub type_override: Option<TargetType>,
    /// Extra libraries to link.
    pub link_libs: Vec<String>,
    /// Extra include directories.
    pub include_dirs: Vec<String>,
    /// Extra preprocessor definitions.
    pub defines: Vec<String>,
    /// Extra compile options.
    pub options: Vec<String>,
    /// Usage requirement scope for the extras.
    pub visibility: Option<Visibility>,
}

/// Reclassification of a target keyed by artifact stem.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LinkOverride {
    /// New classification.
    pub classification: Classification,
    /// Explicit alias to keep or introduce.
    #[serde(default)]
    pub alias: Option<String>,
    /// Target name substituted for imported targets.
    #[serde(default)]
    pub imported_target: Option<String>,
}

/// Complete translator configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    /// Project name; the runner falls back to the source directory name.
    pub project_name: Option<String>,
    /// Project version.
    pub version: Option<String>,
    /// Namespace for target names and aliases.
    pub namespace: Option<String>,
    /// Compile flag translations; an empty value drops the flag.
    pub flag_mappings: BTreeMap<String, String>,
    /// Globs, relative to the source root, that discovery and pattern
    /// scanning skip.
    pub ignore_paths: Vec<String>,
    /// Per-target adjustments keyed by artifact stem.
    pub target_mappings: BTreeMap<String, TargetMapping>,
    /// Reclassifications keyed by artifact stem.
    pub link_overrides: BTreeMap<String, LinkOverride>,
    /// Basenames whose leading assignments become project globals.
    pub global_config_files: Vec<String>,
    /// Evaluate conditional tests; `false` always takes the true branch.
    pub evaluate_conditionals: bool,
    /// Evaluate independent include-graph partitions on worker threads.
    pub parallel: bool,
    /// Remove one edge per detected dependency cycle.
    pub break_cycles: bool,
    /// Directory levels scanned below the source root for pattern inputs.
    pub max_scan_depth: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            project_name: None,
            version: None,
            namespace: None,
            flag_mappings: BTreeMap::new(),
            ignore_paths: Vec::new(),
            target_mappings: BTreeMap::new(),
            link_overrides: BTreeMap::new(),
            global_config_files: DEFAULT_GLOBAL_CONFIG_FILES
                .iter()
                .map(|name| (*name).to_owned())
                .collect(),
            evaluate_conditionals: true,
            parallel: false,
            break_cycles: false,
            max_scan_depth: DEFAULT_MAX_SCAN_DEPTH,
        }
    }
}

impl Config {
    /// Parse and validate a YAML document.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Parse`] for schema violations and
    /// [`ConfigError::InvalidIgnorePattern`] for malformed globs.
    pub fn from_yaml_str(yaml: &str) -> Result<Self, ConfigError> {
        Self::from_yaml_named(yaml, "<inline>")
    }

    /// Load and validate a YAML file.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Read`] when the file cannot be read, otherwise
    /// the errors of [`Config::from_yaml_str`].
    pub fn from_path(path: &Utf8Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_yaml_named(&text, path.as_str())
    }

    fn from_yaml_named(yaml: &str, name: &str) -> Result<Self, ConfigError> {
        let config: Self = if yaml.trim().is_empty() {
            Self::default()
        } else {
            serde_saphyr::from_str(yaml).map_err(|err| ConfigError::Parse {
                name: name.to_owned(),
                message: err.to_string(),
            })?
        };
        config.validate()?;
        Ok(config)
    }

    /// Check values serde cannot check.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::InvalidIgnorePattern`] for the first malformed
    /// `ignore_paths` glob.
    pub fn validate(&self) -> Result<(), ConfigError> {
        for pattern in &self.ignore_paths {
            Pattern::new(pattern).map_err(|err| ConfigError::InvalidIgnorePattern {
                pattern: pattern.clone(),
                message: err.msg.to_owned(),
            })?;
        }
        Ok(())
    }

    /// Whether `relative` (a path below the source root) matches an
    /// `ignore_paths` glob. Malformed globs never match.
    #[must_use]
    pub fn is_ignored(&self, relative: &Utf8Path) -> bool {
        let options = MatchOptions {
            case_sensitive: true,
            require_literal_separator: false,
            require_literal_leading_dot: false,
        };
        let candidate = relative.as_str().replace('\\', "/");
        self.ignore_paths.iter().any(|raw| {
            Pattern::new(raw).is_ok_and(|pattern| pattern.matches_with(&candidate, options))
        })
    }

    /// Whether `basename` names a global configuration file.
    #[must_use]
    pub fn is_global_config_file(&self, basename: &str) -> bool {
        self.global_config_files.iter().any(|name| name == basename)
    }

    /// Project name, or `"project"` when unset.
    #[must_use]
    pub fn project_name(&self) -> &str {
        self.project_name.as_deref().unwrap_or("project")
    }

    /// Namespace used for names and aliases.
    ///
    /// Falls back to the project name with non-identifier characters
    /// replaced by `_`.
    #[must_use]
    pub fn namespace(&self) -> String {
        self.namespace
            .clone()
            .unwrap_or_else(|| sanitize_identifier(self.project_name()))
    }
}

/// Replace characters that cannot appear in a build-tool identifier.
#[must_use]
pub fn sanitize_identifier(raw: &str) -> String {
    raw.chars()
        .map(|ch| {
            if ch.is_ascii_alphanumeric() || ch == '_' {
                ch
            } else {
                '_'
            }
        })
        .collect()
}
