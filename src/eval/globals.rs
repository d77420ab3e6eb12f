//! Project-wide settings harvested from global configuration files.

use std::collections::{BTreeMap, BTreeSet};

use camino::{Utf8Path, Utf8PathBuf};
use serde::Serialize;

use crate::ir::Language;

const TOGGLE_PREFIXES: &[&str] = &["ENABLE_", "USE_", "WITH_"];

/// Value of a feature toggle variable such as `ENABLE_SSL`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum FeatureToggle {
    /// A recognised yes/no spelling.
    Bool(bool),
    /// Anything else, kept verbatim.
    Text(String),
}

impl FeatureToggle {
    /// Interpret a variable value.
    #[must_use]
    pub fn parse(value: &str) -> Self {
        match value.trim().to_ascii_lowercase().as_str() {
            "1" | "yes" | "true" | "on" => Self::Bool(true),
            "" | "0" | "no" | "false" | "off" => Self::Bool(false),
            _ => Self::Text(value.trim().to_owned()),
        }
    }
}

/// Settings that apply to the whole project.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ProjectGlobals {
    /// Expanded variable values.
    pub vars: BTreeMap<String, String>,
    /// Compile flags per language, without `-D`/`-I`.
    pub flags: BTreeMap<Language, Vec<String>>,
    /// Preprocessor definitions.
    pub defines: Vec<String>,
    /// Include directories.
    pub includes: Vec<String>,
    /// `ENABLE_*`, `USE_*` and `WITH_*` variables.
    pub feature_toggles: BTreeMap<String, FeatureToggle>,
    /// Files the settings were read from.
    pub sources: BTreeSet<Utf8PathBuf>,
    #[serde(skip)]
    language_flags: BTreeMap<Language, Vec<String>>,
    #[serde(skip)]
    preprocessor_extras: Option<Vec<String>>,
}

impl ProjectGlobals {
    /// Record the current, expanded value of `name` as assigned in `source`.
    pub fn record(&mut self, name: &str, value: &str, source: &Utf8Path) {
        self.vars.insert(name.to_owned(), value.to_owned());
        self.sources.insert(source.to_path_buf());
        match name {
            "CFLAGS" => self.set_language_flags(Language::C, value),
            "CXXFLAGS" => self.set_language_flags(Language::Cxx, value),
            "ASFLAGS" => self.set_language_flags(Language::Asm, value),
            "CPPFLAGS" => {
                let rest = self.split_preprocessor(value);
                self.preprocessor_extras = Some(rest);
                self.rebuild_flags();
            }
            _ => {}
        }
        if TOGGLE_PREFIXES.iter().any(|prefix| name.starts_with(prefix)) {
            self.feature_toggles
                .insert(name.to_owned(), FeatureToggle::parse(value));
        }
    }

    fn set_language_flags(&mut self, language: Language, value: &str) {
        let rest = self.split_preprocessor(value);
        self.language_flags.insert(language, rest);
        self.rebuild_flags();
    }

    /// Per-language flags followed by the `CPPFLAGS` extras for C and C++.
    fn rebuild_flags(&mut self) {
        self.flags = self.language_flags.clone();
        if let Some(extras) = &self.preprocessor_extras {
            for language in [Language::C, Language::Cxx] {
                let flags = self.flags.entry(language).or_default();
                for flag in extras {
                    push_unique(flags, flag);
                }
            }
        }
    }

    /// Move `-D` and `-I` into the shared lists and return the other flags.
    fn split_preprocessor(&mut self, value: &str) -> Vec<String> {
        let tokens = shlex::split(value)
            .unwrap_or_else(|| value.split_whitespace().map(str::to_owned).collect());
        let mut rest = Vec::new();
        let mut iter = tokens.into_iter();
        while let Some(token) = iter.next() {
            match token.as_str() {
                "-D" => {
                    if let Some(define) = iter.next() {
                        push_unique(&mut self.defines, &define);
                    }
                }
                "-I" => {
                    if let Some(dir) = iter.next() {
                        push_unique(&mut self.includes, &dir);
                    }
                }
                tok => {
                    if let Some(def) = tok.strip_prefix("-D") {
                        push_unique(&mut self.defines, def);
                    } else if let Some(dir) = tok.strip_prefix("-I") {
                        push_unique(&mut self.includes, dir);
                    } else {
                        rest.push(tok.to_owned());
                    }
                }
            }
        }
        rest
    }

    /// Fold `other` in; values from `other` replace equal keys.
    pub fn merge(&mut self, other: Self) {
        self.vars.extend(other.vars);
        self.language_flags.extend(other.language_flags);
        if other.preprocessor_extras.is_some() {
            self.preprocessor_extras = other.preprocessor_extras;
        }
        self.rebuild_flags();
        for define in &other.defines {
            push_unique(&mut self.defines, define);
        }
        for include in &other.includes {
            push_unique(&mut self.includes, include);
        }
        self.feature_toggles.extend(other.feature_toggles);
        self.sources.extend(other.sources);
    }

    /// Whether nothing was recorded.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.vars.is_empty()
    }
}

fn push_unique(list: &mut Vec<String>, item: &str) {
    if !list.iter().any(|existing| existing == item) {
        list.push(item.to_owned());
    }
}
