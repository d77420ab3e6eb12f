//! Records of input the translator could not model.
//!
//! Anything the frontend drops or degrades is captured as exactly one
//! [`UnknownConstruct`] so it can be reviewed by hand. Identifiers are
//! allocated by an [`UnknownRegistry`] and form a gapless `UC0001`, `UC0002`,
//! … sequence for a run.
//!
//! ```rust
//! use gmake2cmake::unknown::{UnknownCategory, UnknownDraft, UnknownRegistry};
//!
//! let mut registry = UnknownRegistry::new();
//! let id = registry.record(UnknownDraft::new(
//!     UnknownCategory::Directive,
//!     "Makefile",
//!     "vpath %.c src",
//! ));
//! assert_eq!(id, "UC0001");
//! assert_eq!(registry.as_slice()[0].normalized_form, "vpath %.c src");
//! ```

use std::collections::HashSet;

use camino::Utf8PathBuf;
use serde::Serialize;

use crate::ast::SourceLocation;

/// Longest raw snippet kept on a record, in characters.
pub const MAX_SNIPPET_CHARS: usize = 160;

const ELLIPSIS: &str = "...";

/// Kind of construct that could not be translated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum UnknownCategory {
    /// A line that matches no statement form.
    MakeSyntax,
    /// A directive the translator does not model (`vpath`, bare `export`).
    Directive,
    /// A conditional whose test could not be evaluated.
    Conditional,
    /// A pattern rule outside the supported single-wildcard shape.
    PatternRule,
    /// A make function or shell assignment with no static meaning.
    MakeFunction,
    /// A target-specific variable assignment.
    TargetVariable,
    /// A recipe line with no rule to attach to.
    OrphanCommand,
}

/// Whether the backend produced anything for the construct.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CMakeStatus {
    /// Nothing was generated.
    NotGenerated,
    /// An equivalent was generated.
    Generated,
    /// Something was generated but it is incomplete.
    Partial,
}

/// What a reviewer should do with the construct.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SuggestedAction {
    /// Inspect and port by hand.
    ManualReview,
    /// Already handled automatically.
    AutoFixed,
    /// Safe to ignore.
    Skip,
}

/// A structured record of untranslatable input.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UnknownConstruct {
    /// Run-unique identifier, `UC` followed by four or more digits.
    pub id: String,
    /// Kind of construct.
    pub category: UnknownCategory,
    /// File containing the construct.
    pub file: Utf8PathBuf,
    /// 1-based line, when known.
    pub line: Option<usize>,
    /// 1-based column, when known.
    pub column: Option<usize>,
    /// Original text, ellipsized to [`MAX_SNIPPET_CHARS`].
    pub raw_snippet: String,
    /// Whitespace-collapsed form of the snippet.
    pub normalized_form: String,
    /// Where in the pipeline the construct was met.
    pub context: String,
    /// Consequence for the generated build.
    pub impact: String,
    /// Backend outcome.
    pub cmake_status: CMakeStatus,
    /// Reviewer guidance.
    pub suggested_action: SuggestedAction,
}

/// The fields of an [`UnknownConstruct`] before an id is assigned.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnknownDraft {
    /// Kind of construct.
    pub category: UnknownCategory,
    /// File containing the construct.
    pub file: Utf8PathBuf,
    /// 1-based line, when known.
    pub line: Option<usize>,
    /// 1-based column, when known.
    pub column: Option<usize>,
    /// Original, untruncated text.
    pub raw: String,
    /// Where in the pipeline the construct was met.
    pub context: String,
    /// Consequence for the generated build.
    pub impact: String,
    /// Backend outcome.
    pub cmake_status: CMakeStatus,
    /// Reviewer guidance.
    pub suggested_action: SuggestedAction,
}

impl UnknownDraft {
    /// Start a draft with neutral defaults.
    #[must_use]
    pub fn new(
        category: UnknownCategory,
        file: impl Into<Utf8PathBuf>,
        raw: impl Into<String>,
    ) -> Self {
        Self {
            category,
            file: file.into(),
            line: None,
            column: None,
            raw: raw.into(),
            context: String::new(),
            impact: "construct not translated".to_owned(),
            cmake_status: CMakeStatus::NotGenerated,
            suggested_action: SuggestedAction::ManualReview,
        }
    }

    /// Start a draft positioned at `location`.
    #[must_use]
    pub fn at(
        category: UnknownCategory,
        location: &SourceLocation,
        raw: impl Into<String>,
    ) -> Self {
        let mut draft = Self::new(category, location.path.clone(), raw);
        draft.line = Some(location.line);
        draft.column = Some(location.column);
        draft
    }

    /// Set the pipeline context.
    #[must_use]
    pub fn context(mut self, context: impl Into<String>) -> Self {
        self.context = context.into();
        self
    }

    /// Set the impact description.
    #[must_use]
    pub fn impact(mut self, impact: impl Into<String>) -> Self {
        self.impact = impact.into();
        self
    }

    /// Set the reviewer guidance.
    #[must_use]
    pub const fn suggested_action(mut self, action: SuggestedAction) -> Self {
        self.suggested_action = action;
        self
    }

    /// Set the backend outcome.
    #[must_use]
    pub const fn cmake_status(mut self, status: CMakeStatus) -> Self {
        self.cmake_status = status;
        self
    }
}

/// Truncate `raw` to [`MAX_SNIPPET_CHARS`], ending with `...` when cut.
#[must_use]
pub fn ellipsize(raw: &str) -> String {
    if raw.chars().count() <= MAX_SNIPPET_CHARS {
        return raw.to_owned();
    }
    let keep = MAX_SNIPPET_CHARS - ELLIPSIS.len();
    let mut out: String = raw.chars().take(keep).collect();
    out.push_str(ELLIPSIS);
    out
}

fn normalize(raw: &str) -> String {
    raw.split_whitespace().collect::<Vec<_>>().join(" ")
}

fn format_id(seq: usize) -> String {
    format!("UC{seq:04}")
}

/// Allocates ids and stores unknown constructs in recording order.
#[derive(Debug, Clone, Default)]
pub struct UnknownRegistry {
    items: Vec<UnknownConstruct>,
}

impl UnknownRegistry {
    /// Create an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Assign the next id to `draft`, store it and return the id.
    pub fn record(&mut self, draft: UnknownDraft) -> String {
        let id = format_id(self.items.len() + 1);
        let construct = UnknownConstruct {
            id,
            category: draft.category,
            file: draft.file,
            line: draft.line,
            column: draft.column,
            raw_snippet: ellipsize(&draft.raw),
            normalized_form: ellipsize(&normalize(&draft.raw)),
            context: draft.context,
            impact: draft.impact,
            cmake_status: draft.cmake_status,
            suggested_action: draft.suggested_action,
        };
        let assigned = construct.id.clone();
        self.items.push(construct);
        assigned
    }

    /// Like [`UnknownRegistry::record`], but returns the id of an existing
    /// record for the same construct instead of adding a second one.
    pub fn record_unique(&mut self, draft: UnknownDraft) -> String {
        let snippet = ellipsize(&draft.raw);
        let existing = self.items.iter().find(|c| {
            c.category == draft.category
                && c.file == draft.file
                && c.line == draft.line
                && c.column == draft.column
                && c.raw_snippet == snippet
        });
        match existing {
            Some(construct) => construct.id.clone(),
            None => self.record(draft),
        }
    }

    /// Append the records of `other`, skipping ones already present and
    /// renumbering the rest so ids stay gapless.
    ///
    /// Two records are the same construct when category, file, position and
    /// snippet agree.
    pub fn absorb(&mut self, other: Self) {
        let mut seen: HashSet<_> = self.items.iter().map(identity_key).collect();
        for mut construct in other.items {
            if !seen.insert(identity_key(&construct)) {
                continue;
            }
            construct.id = format_id(self.items.len() + 1);
            self.items.push(construct);
        }
    }

    /// Number of records.
    #[must_use]
    pub fn len(&self) -> usize {
        self.items.len()
    }

    /// Whether nothing was recorded.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Records in id order.
    #[must_use]
    pub fn as_slice(&self) -> &[UnknownConstruct] {
        &self.items
    }

    /// Iterate in id order.
    pub fn iter(&self) -> impl Iterator<Item = &UnknownConstruct> {
        self.items.iter()
    }

    /// Consume the registry.
    #[must_use]
    pub fn into_vec(self) -> Vec<UnknownConstruct> {
        self.items
    }
}

impl Serialize for UnknownRegistry {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.items.serialize(serializer)
    }
}

type IdentityKey = (
    UnknownCategory,
    Utf8PathBuf,
    Option<usize>,
    Option<usize>,
    String,
);

fn identity_key(construct: &UnknownConstruct) -> IdentityKey {
    (
        construct.category,
        construct.file.clone(),
        construct.line,
        construct.column,
        construct.raw_snippet.clone(),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    fn draft(raw: &str, line: usize) -> UnknownDraft {
        UnknownDraft::at(
            UnknownCategory::MakeSyntax,
            &SourceLocation::new("Makefile", line, 1),
            raw,
        )
    }

    #[rstest]
    fn ids_are_gapless_from_one() {
        let mut registry = UnknownRegistry::new();
        for line in 1..=12 {
            registry.record(draft("???", line));
        }
        let ids: Vec<_> = registry.iter().map(|c| c.id.clone()).collect();
        let expected: Vec<_> = (1..=12).map(|n| format!("UC{n:04}")).collect();
        assert_eq!(ids, expected);
    }

    #[rstest]
    #[case(0)]
    #[case(MAX_SNIPPET_CHARS)]
    #[case(MAX_SNIPPET_CHARS + 1)]
    #[case(4 * MAX_SNIPPET_CHARS)]
    fn snippets_never_exceed_limit(#[case] len: usize) {
        let raw = "é".repeat(len);
        let mut registry = UnknownRegistry::new();
        registry.record(draft(&raw, 1));
        let construct = &registry.as_slice()[0];
        assert!(construct.raw_snippet.chars().count() <= MAX_SNIPPET_CHARS);
        if len > MAX_SNIPPET_CHARS {
            assert!(construct.raw_snippet.ends_with("..."));
        } else {
            assert_eq!(construct.raw_snippet, raw);
        }
    }

    #[rstest]
    fn normalized_form_collapses_whitespace() {
        let mut registry = UnknownRegistry::new();
        registry.record(draft("  vpath   %.c\tsrc ", 1));
        assert_eq!(registry.as_slice()[0].normalized_form, "vpath %.c src");
    }

    #[rstest]
    fn record_unique_reuses_existing_ids() {
        let mut registry = UnknownRegistry::new();
        let first = registry.record_unique(draft("$(shell date)", 4));
        let again = registry.record_unique(draft("$(shell date)", 4));
        let other = registry.record_unique(draft("$(shell date)", 5));
        assert_eq!(first, again);
        assert_eq!(other, "UC0002");
        assert_eq!(registry.len(), 2);
    }

    #[rstest]
    fn absorb_dedupes_and_renumbers() {
        let mut left = UnknownRegistry::new();
        left.record(draft("a", 1));
        let mut right = UnknownRegistry::new();
        right.record(draft("a", 1));
        right.record(draft("b", 2));
        left.absorb(right);
        let summary: Vec<_> = left
            .iter()
            .map(|c| (c.id.as_str(), c.raw_snippet.as_str()))
            .collect();
        assert_eq!(summary, vec![("UC0001", "a"), ("UC0002", "b")]);
    }
}
