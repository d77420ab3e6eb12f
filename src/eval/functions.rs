//! Make's text functions over already expanded arguments.

use std::collections::BTreeSet;

use itertools::{EitherOrBoth, Itertools};

use crate::parser::lines::top_level_positions;

/// Functions with no static meaning; they expand to nothing and are
/// recorded for review.
pub(crate) const UNSUPPORTED: &[&str] = &[
    "shell", "wildcard", "call", "eval", "foreach", "origin", "value", "flavor", "error",
    "warning", "info", "file", "realpath", "abspath", "guile", "let", "intcmp",
];

/// Built-in text functions understood by the expander.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Builtin {
    Subst,
    Patsubst,
    Strip,
    Findstring,
    Filter,
    FilterOut,
    Sort,
    Word,
    Words,
    Firstword,
    Lastword,
    Dir,
    Notdir,
    Suffix,
    Basename,
    Addsuffix,
    Addprefix,
    Join,
    If,
    Or,
    And,
}

impl Builtin {
    pub(crate) fn from_name(name: &str) -> Option<Self> {
        Some(match name {
            "subst" => Self::Subst,
            "patsubst" => Self::Patsubst,
            "strip" => Self::Strip,
            "findstring" => Self::Findstring,
            "filter" => Self::Filter,
            "filter-out" => Self::FilterOut,
            "sort" => Self::Sort,
            "word" => Self::Word,
            "words" => Self::Words,
            "firstword" => Self::Firstword,
            "lastword" => Self::Lastword,
            "dir" => Self::Dir,
            "notdir" => Self::Notdir,
            "suffix" => Self::Suffix,
            "basename" => Self::Basename,
            "addsuffix" => Self::Addsuffix,
            "addprefix" => Self::Addprefix,
            "join" => Self::Join,
            "if" => Self::If,
            "or" => Self::Or,
            "and" => Self::And,
            _ => return None,
        })
    }

    /// Maximum number of comma separated arguments; commas beyond it are
    /// part of the last argument.
    pub(crate) const fn arity(self) -> usize {
        match self {
            Self::Strip
            | Self::Sort
            | Self::Words
            | Self::Firstword
            | Self::Lastword
            | Self::Dir
            | Self::Notdir
            | Self::Suffix
            | Self::Basename => 1,
            Self::Findstring
            | Self::Filter
            | Self::FilterOut
            | Self::Word
            | Self::Addsuffix
            | Self::Addprefix
            | Self::Join => 2,
            Self::Subst | Self::Patsubst | Self::If => 3,
            Self::Or | Self::And => usize::MAX,
        }
    }

    /// Apply an eagerly evaluated function. `if`, `or` and `and` are lazy
    /// and handled by the expander.
    pub(crate) fn apply(self, args: &[String]) -> String {
        let arg = |idx: usize| args.get(idx).map_or("", String::as_str);
        match self {
            Self::Subst => {
                if arg(0).is_empty() {
                    arg(2).to_owned()
                } else {
                    arg(2).replace(arg(0), arg(1))
                }
            }
            Self::Patsubst => map_words(arg(2), |w| patsubst_word(arg(0), arg(1), w)),
            Self::Strip => words(arg(0)).join(" "),
            Self::Findstring => {
                if arg(1).contains(arg(0)) {
                    arg(0).to_owned()
                } else {
                    String::new()
                }
            }
            Self::Filter => filter_words(arg(0), arg(1), true),
            Self::FilterOut => filter_words(arg(0), arg(1), false),
            Self::Sort => words(arg(0))
                .into_iter()
                .collect::<BTreeSet<_>>()
                .into_iter()
                .join(" "),
            Self::Word => arg(0)
                .trim()
                .parse::<usize>()
                .ok()
                .and_then(|n| n.checked_sub(1))
                .and_then(|idx| words(arg(1)).get(idx).map(|w| (*w).to_owned()))
                .unwrap_or_default(),
            Self::Words => words(arg(0)).len().to_string(),
            Self::Firstword => words(arg(0)).first().map(|w| (*w).to_owned()).unwrap_or_default(),
            Self::Lastword => words(arg(0)).last().map(|w| (*w).to_owned()).unwrap_or_default(),
            Self::Dir => map_words(arg(0), |w| match w.rfind('/') {
                Some(idx) => w.get(..=idx).unwrap_or(w).to_owned(),
                None => "./".to_owned(),
            }),
            Self::Notdir => map_words(arg(0), |w| notdir(w).to_owned()),
            Self::Suffix => words(arg(0))
                .into_iter()
                .filter_map(suffix)
                .join(" "),
            Self::Basename => map_words(arg(0), |w| {
                let cut = suffix(w).map_or(0, str::len);
                w.get(..w.len() - cut).unwrap_or(w).to_owned()
            }),
            Self::Addsuffix => map_words(arg(1), |w| format!("{w}{}", arg(0))),
            Self::Addprefix => map_words(arg(1), |w| format!("{}{w}", arg(0))),
            Self::Join => words(arg(0))
                .into_iter()
                .zip_longest(words(arg(1)))
                .map(|pair| match pair {
                    EitherOrBoth::Both(a, b) => format!("{a}{b}"),
                    EitherOrBoth::Left(a) | EitherOrBoth::Right(a) => a.to_owned(),
                })
                .join(" "),
            Self::If | Self::Or | Self::And => String::new(),
        }
    }
}

/// Split raw function arguments on top-level commas, keeping at most
/// `max` pieces.
pub(crate) fn split_args(raw: &str, max: usize) -> Vec<&str> {
    let mut args = Vec::new();
    let mut start = 0;
    for comma in top_level_positions(raw, ',') {
        if args.len() + 1 >= max {
            break;
        }
        args.push(raw.get(start..comma).unwrap_or_default());
        start = comma + 1;
    }
    args.push(raw.get(start..).unwrap_or_default());
    args
}

fn words(text: &str) -> Vec<&str> {
    text.split_whitespace().collect()
}

fn map_words(text: &str, f: impl Fn(&str) -> String) -> String {
    text.split_whitespace().map(f).join(" ")
}

fn filter_words(pattern_text: &str, text: &str, keep: bool) -> String {
    let patterns = words(pattern_text);
    text.split_whitespace()
        .filter(|w| patterns.iter().any(|p| pattern_stem(p, w).is_some()) == keep)
        .join(" ")
}

fn notdir(word: &str) -> &str {
    word.rsplit('/').next().unwrap_or(word)
}

fn suffix(word: &str) -> Option<&str> {
    let name = notdir(word);
    name.rfind('.').and_then(|idx| name.get(idx..))
}

/// The part of `word` matched by the `%` in `pattern`, or `""` for an
/// exact match of a pattern without `%`.
///
/// ```
/// use gmake2cmake::eval::pattern_stem;
///
/// assert_eq!(pattern_stem("src/%.c", "src/main.c"), Some("main"));
/// assert_eq!(pattern_stem("%.c", "main.o"), None);
/// ```
#[must_use]
pub fn pattern_stem<'w>(pattern: &str, word: &'w str) -> Option<&'w str> {
    match pattern.split_once('%') {
        Some((prefix, suffix)) => word.strip_prefix(prefix)?.strip_suffix(suffix),
        None => (pattern == word).then_some(""),
    }
}

/// Apply one `patsubst` substitution to a single word.
#[must_use]
pub fn patsubst_word(pattern: &str, replacement: &str, word: &str) -> String {
    match pattern_stem(pattern, word) {
        Some(stem) if pattern.contains('%') => replacement.replacen('%', stem, 1),
        Some(_) => replacement.to_owned(),
        None => word.to_owned(),
    }
}

/// Substitution reference semantics: `from`/`to` without `%` act as
/// suffixes.
pub(crate) fn substitute_words(value: &str, from: &str, to: &str) -> String {
    if from.contains('%') {
        map_words(value, |w| patsubst_word(from, to, w))
    } else {
        let pattern = format!("%{from}");
        let replacement = format!("%{to}");
        map_words(value, |w| patsubst_word(&pattern, &replacement, w))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    fn call(name: &str, args: &[&str]) -> String {
        let builtin = Builtin::from_name(name).expect("known function");
        let owned: Vec<String> = args.iter().map(|a| (*a).to_owned()).collect();
        builtin.apply(&owned)
    }

    #[rstest]
    #[case("subst", &["ee", "EE", "feet on the street"], "fEEt on the strEEt")]
    #[case("patsubst", &["%.c", "%.o", "a.c b.c x.h"], "a.o b.o x.h")]
    #[case("strip", &["  a   b  "], "a b")]
    #[case("findstring", &["a", "a b c"], "a")]
    #[case("findstring", &["z", "a b c"], "")]
    #[case("filter", &["%.c %.s", "foo.c bar.c baz.s ugh.h"], "foo.c bar.c baz.s")]
    #[case("filter-out", &["main.o", "main.o foo.o"], "foo.o")]
    #[case("sort", &["foo bar lose foo"], "bar foo lose")]
    #[case("word", &["2", "foo bar baz"], "bar")]
    #[case("word", &["9", "foo"], "")]
    #[case("words", &["foo bar baz"], "3")]
    #[case("firstword", &["foo bar"], "foo")]
    #[case("lastword", &["foo bar"], "bar")]
    #[case("dir", &["src/foo.c hacks"], "src/ ./")]
    #[case("notdir", &["src/foo.c hacks"], "foo.c hacks")]
    #[case("suffix", &["src/foo.c src-1.0/bar.c hacks"], ".c .c")]
    #[case("basename", &["src/foo.c src-1.0/bar hacks"], "src/foo src-1.0/bar hacks")]
    #[case("addsuffix", &[".c", "foo bar"], "foo.c bar.c")]
    #[case("addprefix", &["src/", "foo bar"], "src/foo src/bar")]
    #[case("join", &["a b c", ".c .o"], "a.c b.o c")]
    fn builtins(#[case] name: &str, #[case] args: &[&str], #[case] expected: &str) {
        assert_eq!(call(name, args), expected);
    }

    #[rstest]
    fn split_args_respects_arity_and_nesting() {
        assert_eq!(split_args("a,b,c,d", 3), vec!["a", "b", "c,d"]);
        assert_eq!(split_args("$(x,y),b", 2), vec!["$(x,y)", "b"]);
        assert_eq!(split_args("only", 1), vec!["only"]);
    }

    #[rstest]
    #[case("a.c b.c", ".c", ".o", "a.o b.o")]
    #[case("src/a.c", "src/%.c", "obj/%.o", "obj/a.o")]
    fn substitution_references(
        #[case] value: &str,
        #[case] from: &str,
        #[case] to: &str,
        #[case] expected: &str,
    ) {
        assert_eq!(substitute_words(value, from, to), expected);
    }
}
