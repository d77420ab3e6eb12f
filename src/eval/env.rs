//! Macro environment threaded through one evaluation pass.

use std::collections::BTreeMap;

use camino::Utf8Path;

use crate::ast::SourceLocation;

/// How a variable's value is stored.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flavor {
    /// Expanded once at assignment (`:=`).
    Simple,
    /// Stored raw and expanded on every use (`=`).
    Recursive,
}

/// A defined variable.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Variable {
    /// Stored value; raw for recursive variables.
    pub value: String,
    /// Storage flavor.
    pub flavor: Flavor,
    /// Where the value was last assigned in a makefile.
    pub defined_at: Option<SourceLocation>,
}

/// Mapping of variable names to values, last write wins.
///
/// ```
/// use gmake2cmake::eval::{Flavor, VariableEnv};
///
/// let mut env = VariableEnv::new();
/// env.append("CFLAGS", "-O2");
/// env.append("CFLAGS", "-g");
/// assert_eq!(env.value("CFLAGS"), Some("-O2 -g"));
/// env.set_if_unset("CFLAGS", "-O0");
/// assert_eq!(env.value("CFLAGS"), Some("-O2 -g"));
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct VariableEnv {
    vars: BTreeMap<String, Variable>,
}

impl VariableEnv {
    /// Create an empty environment.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Environment seeded with the built-in variables make provides.
    #[must_use]
    pub fn with_defaults(dir: &Utf8Path) -> Self {
        let mut env = Self::new();
        for (name, value) in [
            ("CC", "cc"),
            ("CXX", "g++"),
            ("AR", "ar"),
            ("RM", "rm -f"),
            ("MAKE", "make"),
        ] {
            env.set(name, value, Flavor::Recursive);
        }
        env.set("CURDIR", dir.as_str(), Flavor::Simple);
        env
    }

    /// Look a variable up.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&Variable> {
        self.vars.get(name)
    }

    /// Stored value of a variable.
    #[must_use]
    pub fn value(&self, name: &str) -> Option<&str> {
        self.get(name).map(|var| var.value.as_str())
    }

    /// Whether the variable has a non-empty stored value, the test used by
    /// `ifdef`.
    #[must_use]
    pub fn is_defined(&self, name: &str) -> bool {
        self.value(name).is_some_and(|value| !value.is_empty())
    }

    /// Define or replace a variable.
    pub fn set(&mut self, name: &str, value: impl Into<String>, flavor: Flavor) {
        self.vars.insert(
            name.to_owned(),
            Variable {
                value: value.into(),
                flavor,
                defined_at: None,
            },
        );
    }

    /// Append `text`, separated by a space when the old value is non-empty.
    ///
    /// The existing flavor is kept; an unset variable becomes recursive.
    /// Callers expand `text` first when appending to a simple variable.
    pub fn append(&mut self, name: &str, text: &str) {
        let var = self.vars.entry(name.to_owned()).or_insert_with(|| Variable {
            value: String::new(),
            flavor: Flavor::Recursive,
            defined_at: None,
        });
        if !var.value.is_empty() && !text.is_empty() {
            var.value.push(' ');
        }
        var.value.push_str(text);
    }

    /// Define a recursive variable only when it is unset.
    pub fn set_if_unset(&mut self, name: &str, value: &str) {
        if !self.vars.contains_key(name) {
            self.set(name, value, Flavor::Recursive);
        }
    }

    /// Remember the makefile line that last assigned `name`.
    pub fn mark_defined(&mut self, name: &str, location: &SourceLocation) {
        if let Some(var) = self.vars.get_mut(name) {
            var.defined_at = Some(location.clone());
        }
    }

    /// Defined names in sorted order.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.vars.keys().map(String::as_str)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    fn append_to_unset_has_no_leading_space() {
        let mut env = VariableEnv::new();
        env.append("X", "a");
        assert_eq!(env.value("X"), Some("a"));
        assert_eq!(env.get("X").map(|v| v.flavor), Some(Flavor::Recursive));
    }

    #[rstest]
    fn append_keeps_flavor() {
        let mut env = VariableEnv::new();
        env.set("X", "a", Flavor::Simple);
        env.append("X", "b");
        assert_eq!(
            env.get("X"),
            Some(&Variable {
                value: "a b".into(),
                flavor: Flavor::Simple,
                defined_at: None,
            })
        );
    }

    #[rstest]
    fn defaults_include_make_and_curdir() {
        let env = VariableEnv::with_defaults(Utf8Path::new("/src/proj"));
        assert_eq!(env.value("MAKE"), Some("make"));
        assert_eq!(env.value("CURDIR"), Some("/src/proj"));
        assert!(env.is_defined("CC"));
        assert!(!env.is_defined("CFLAGS"));
    }
}
