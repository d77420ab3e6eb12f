//! Variable reference expansion.
//!
//! [`Expander`] substitutes `$(...)`, `${...}` and `$X` references against a
//! [`VariableEnv`], one level at a time. Self or mutual recursion is caught
//! by tracking the variables currently being expanded, and total nesting is
//! bounded by [`MAX_EXPANSION_DEPTH`], so expansion always terminates. Either
//! condition abandons the rest of the value: the result is whatever was
//! produced before the point of detection.

use crate::ast::SourceLocation;
use crate::diagnostics::{DiagCode, Diagnostics};
use crate::parser::lines::find_top_level;
use crate::unknown::{UnknownCategory, UnknownDraft, UnknownRegistry, ellipsize};

use super::env::{Flavor, VariableEnv};
use super::functions::{Builtin, UNSUPPORTED, split_args, substitute_words};

/// Deepest nesting of expansions before the value is truncated.
pub const MAX_EXPANSION_DEPTH: usize = 64;

/// Automatic variables bound while expanding a rule's recipe.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AutoVars {
    /// `$@`
    pub target: String,
    /// Prerequisites in order, duplicates kept (`$+`).
    pub prerequisites: Vec<String>,
    /// `$*` for pattern-instantiated rules.
    pub stem: Option<String>,
}

impl AutoVars {
    /// Bind the variables of an explicit rule.
    #[must_use]
    pub fn new(target: impl Into<String>, prerequisites: Vec<String>) -> Self {
        Self {
            target: target.into(),
            prerequisites,
            stem: None,
        }
    }

    /// Bind `$*`.
    #[must_use]
    pub fn with_stem(mut self, stem: impl Into<String>) -> Self {
        self.stem = Some(stem.into());
        self
    }

    fn unique_prerequisites(&self) -> String {
        let mut seen = Vec::new();
        for prereq in &self.prerequisites {
            if !seen.contains(&prereq.as_str()) {
                seen.push(prereq.as_str());
            }
        }
        seen.join(" ")
    }

    fn stem_value(&self) -> String {
        self.stem.clone().unwrap_or_else(|| {
            let file_start = self.target.rfind('/').map_or(0, |idx| idx + 1);
            match self.target.rfind('.') {
                Some(dot) if dot > file_start => {
                    self.target.get(..dot).unwrap_or_default().to_owned()
                }
                _ => String::new(),
            }
        })
    }

    fn get(&self, name: &str) -> Option<String> {
        let mut chars = name.chars();
        let base = chars.next()?;
        let modifier = chars.next();
        if chars.next().is_some() {
            return None;
        }
        let value = match base {
            '@' => self.target.clone(),
            '<' => self.prerequisites.first().cloned().unwrap_or_default(),
            '^' | '?' => self.unique_prerequisites(),
            '+' => self.prerequisites.join(" "),
            '*' => self.stem_value(),
            _ => return None,
        };
        match modifier {
            None => Some(value),
            Some('D') => Some(
                value
                    .split_whitespace()
                    .map(|w| w.rfind('/').and_then(|idx| w.get(..idx)).unwrap_or("."))
                    .collect::<Vec<_>>()
                    .join(" "),
            ),
            Some('F') => Some(
                value
                    .split_whitespace()
                    .map(|w| w.rsplit('/').next().unwrap_or(w))
                    .collect::<Vec<_>>()
                    .join(" "),
            ),
            Some(_) => None,
        }
    }
}

fn is_automatic(name: &str) -> bool {
    matches!(
        name,
        "@" | "<" | "^" | "+" | "?" | "*" | "@D" | "@F" | "<D" | "<F" | "^D" | "^F" | "*D" | "*F"
    )
}

/// Expands text against an environment, reporting problems at a fixed
/// location.
///
/// Unsupported functions found inside a recursive variable are recorded
/// at the line that defined the variable, so one construct is reported
/// once however many places use it.
pub struct Expander<'a> {
    env: &'a VariableEnv,
    auto: Option<&'a AutoVars>,
    location: &'a SourceLocation,
    diagnostics: &'a mut Diagnostics,
    unknowns: &'a mut UnknownRegistry,
    active: Vec<String>,
    definitions: Vec<&'a SourceLocation>,
    depth: usize,
    aborted: bool,
}

impl<'a> Expander<'a> {
    /// Create an expander without automatic variables.
    pub fn new(
        env: &'a VariableEnv,
        location: &'a SourceLocation,
        diagnostics: &'a mut Diagnostics,
        unknowns: &'a mut UnknownRegistry,
    ) -> Self {
        Self {
            env,
            auto: None,
            location,
            diagnostics,
            unknowns,
            active: Vec::new(),
            definitions: Vec::new(),
            depth: 0,
            aborted: false,
        }
    }

    /// Bind automatic variables for recipe expansion.
    #[must_use]
    pub fn with_auto(mut self, auto: &'a AutoVars) -> Self {
        self.auto = Some(auto);
        self
    }

    /// Expand every reference in `text`.
    pub fn expand(&mut self, text: &str) -> String {
        self.aborted = false;
        self.expand_text(text)
    }

    /// Expanded value of a single variable; empty when unset.
    pub fn value_of(&mut self, name: &str) -> String {
        self.aborted = false;
        self.lookup(name)
    }

    fn expand_text(&mut self, text: &str) -> String {
        if self.aborted {
            return String::new();
        }
        if self.depth >= MAX_EXPANSION_DEPTH {
            self.diagnostics.report(
                DiagCode::EvalRecursiveLoop,
                format!("expansion nested deeper than {MAX_EXPANSION_DEPTH} levels"),
                Some(self.location.clone()),
            );
            self.aborted = true;
            return String::new();
        }
        self.depth += 1;
        let out = self.expand_level(text);
        self.depth -= 1;
        out
    }

    fn expand_level(&mut self, text: &str) -> String {
        let mut out = String::with_capacity(text.len());
        let mut rest = text;
        while let Some(pos) = rest.find('$') {
            let (literal, tail) = rest.split_at(pos);
            out.push_str(literal);
            let after = tail.get(1..).unwrap_or_default();
            let mut chars = after.chars();
            match chars.next() {
                None => {
                    out.push('$');
                    return out;
                }
                Some('$') => {
                    out.push('$');
                    rest = chars.as_str();
                }
                Some(open @ ('(' | '{')) => {
                    let Some(close) = matching_close(after, open) else {
                        self.diagnostics.report(
                            DiagCode::EvalUnterminatedReference,
                            format!("unterminated variable reference in '{}'", ellipsize(text)),
                            Some(self.location.clone()),
                        );
                        return out;
                    };
                    let body = after.get(1..close).unwrap_or_default();
                    let value = self.reference(body);
                    out.push_str(&value);
                    if self.aborted {
                        return out;
                    }
                    rest = after.get(close + 1..).unwrap_or_default();
                }
                Some(single) => {
                    let mut buf = [0u8; 4];
                    let value = self.lookup(single.encode_utf8(&mut buf));
                    out.push_str(&value);
                    if self.aborted {
                        return out;
                    }
                    rest = chars.as_str();
                }
            }
        }
        out.push_str(rest);
        out
    }

    /// Resolve the inside of a `$(...)` reference.
    fn reference(&mut self, body: &str) -> String {
        if let Some((head, args)) = body.split_once(char::is_whitespace) {
            if let Some(builtin) = Builtin::from_name(head) {
                return self.call(builtin, args.trim_start());
            }
            if UNSUPPORTED.contains(&head) {
                return self.unsupported(head, body);
            }
        }
        if let Some(colon) = find_top_level(body, ':') {
            let name_part = body.get(..colon).unwrap_or_default();
            let replacement = body.get(colon + 1..).unwrap_or_default();
            if let Some(eq) = find_top_level(replacement, '=') {
                let name = self.expand_text(name_part);
                let from = self.expand_text(replacement.get(..eq).unwrap_or_default());
                let to = self.expand_text(replacement.get(eq + 1..).unwrap_or_default());
                let value = self.lookup(name.trim());
                return substitute_words(&value, &from, &to);
            }
        }
        let name = self.expand_text(body);
        self.lookup(name.trim())
    }

    fn call(&mut self, builtin: Builtin, raw_args: &str) -> String {
        let args = split_args(raw_args, builtin.arity());
        let arg = |idx: usize| args.get(idx).copied().unwrap_or_default();
        match builtin {
            Builtin::If => {
                let condition = self.expand_text(arg(0));
                if condition.trim().is_empty() {
                    self.expand_text(arg(2))
                } else {
                    self.expand_text(arg(1))
                }
            }
            Builtin::Or => {
                for raw in &args {
                    let value = self.expand_text(raw);
                    if !value.trim().is_empty() {
                        return value;
                    }
                }
                String::new()
            }
            Builtin::And => {
                let mut last = String::new();
                for raw in &args {
                    last = self.expand_text(raw);
                    if last.trim().is_empty() {
                        return String::new();
                    }
                }
                last
            }
            eager => {
                let expanded: Vec<String> = args.iter().map(|raw| self.expand_text(raw)).collect();
                eager.apply(&expanded)
            }
        }
    }

    fn unsupported(&mut self, name: &str, body: &str) -> String {
        let location = self.definitions.last().copied().unwrap_or(self.location);
        let before = self.unknowns.len();
        self.unknowns.record_unique(
            UnknownDraft::at(UnknownCategory::MakeFunction, location, format!("$({body})"))
                .context("evaluator")
                .impact(format!("$({name} ...) expanded to an empty string")),
        );
        if self.unknowns.len() > before {
            self.diagnostics.report(
                DiagCode::EvalUnsupportedFunction,
                format!("unsupported function '{name}' expands to an empty string"),
                Some(location.clone()),
            );
        }
        String::new()
    }

    fn lookup(&mut self, name: &str) -> String {
        if self.aborted {
            return String::new();
        }
        if let Some(value) = self.auto.and_then(|auto| auto.get(name)) {
            return value;
        }
        if is_automatic(name) {
            return String::new();
        }
        let env = self.env;
        let Some(var) = env.get(name) else {
            return String::new();
        };
        match var.flavor {
            Flavor::Simple => var.value.clone(),
            Flavor::Recursive => {
                if self.active.iter().any(|active| active == name) {
                    let chain = self.active.join(" -> ");
                    self.diagnostics.report(
                        DiagCode::EvalRecursiveLoop,
                        format!("variable '{name}' references itself ({chain} -> {name})"),
                        Some(self.location.clone()),
                    );
                    self.aborted = true;
                    return String::new();
                }
                self.active.push(name.to_owned());
                let defined = var.defined_at.as_ref();
                if let Some(location) = defined {
                    self.definitions.push(location);
                }
                let out = self.expand_text(&var.value);
                if defined.is_some() {
                    self.definitions.pop();
                }
                self.active.pop();
                out
            }
        }
    }
}

/// Byte offset of the bracket closing the one `text` starts with.
fn matching_close(text: &str, open: char) -> Option<usize> {
    let close = if open == '(' { ')' } else { '}' };
    let mut depth = 0usize;
    for (idx, ch) in text.char_indices() {
        if ch == open {
            depth += 1;
        } else if ch == close {
            depth = depth.saturating_sub(1);
            if depth == 0 {
                return Some(idx);
            }
        }
    }
    None
}

/// Expand `text` once with fresh recursion tracking.
pub fn expand(
    text: &str,
    env: &VariableEnv,
    location: &SourceLocation,
    diagnostics: &mut Diagnostics,
    unknowns: &mut UnknownRegistry,
) -> String {
    Expander::new(env, location, diagnostics, unknowns).expand(text)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::{fixture, rstest};

    struct Run {
        out: String,
        diagnostics: Diagnostics,
        unknowns: UnknownRegistry,
    }

    #[fixture]
    fn env() -> VariableEnv {
        let mut env = VariableEnv::new();
        env.set("SRCS", "a.c b.c", Flavor::Recursive);
        env.set("CC", "gcc", Flavor::Recursive);
        env.set("COMPILER", "$(CC)", Flavor::Recursive);
        env.set("PRE", "src", Flavor::Simple);
        env.set("src_files", "x.c", Flavor::Simple);
        env
    }

    fn run(env: &VariableEnv, text: &str) -> Run {
        let location = SourceLocation::new("Makefile", 7, 1);
        let mut diagnostics = Diagnostics::new();
        let mut unknowns = UnknownRegistry::new();
        let out = expand(text, env, &location, &mut diagnostics, &mut unknowns);
        Run {
            out,
            diagnostics,
            unknowns,
        }
    }

    #[rstest]
    #[case("$(COMPILER) -c", "gcc -c")]
    #[case("${CC}", "gcc")]
    #[case("$(SRCS:.c=.o)", "a.o b.o")]
    #[case("$(SRCS:%.c=obj/%.o)", "obj/a.o obj/b.o")]
    #[case("$($(PRE)_files)", "x.c")]
    #[case("cost: $$5", "cost: $5")]
    #[case("$(patsubst %.c,%.o,$(SRCS))", "a.o b.o")]
    #[case("$(if $(CC),yes,no)", "yes")]
    #[case("$(if $(NOPE),yes,no)", "no")]
    #[case("$(or $(NOPE),$(CC))", "gcc")]
    #[case("$(and $(CC),$(NOPE))", "")]
    #[case("$(addprefix -I,inc src)", "-Iinc -Isrc")]
    fn expands_references_and_functions(
        env: VariableEnv,
        #[case] text: &str,
        #[case] expected: &str,
    ) {
        let result = run(&env, text);
        assert_eq!(result.out, expected);
        assert!(result.diagnostics.is_empty(), "{:?}", result.diagnostics);
    }

    #[rstest]
    #[case("pre $(UNSET) post", "pre  post")]
    #[case("$(UNSET)", "")]
    #[case("a${UNSET}b", "ab")]
    fn unset_variables_expand_to_empty(
        env: VariableEnv,
        #[case] text: &str,
        #[case] expected: &str,
    ) {
        let result = run(&env, text);
        assert_eq!(result.out, expected);
        assert!(result.diagnostics.is_empty());
    }

    #[rstest]
    fn self_reference_reports_once_and_truncates() {
        let mut env = VariableEnv::new();
        env.set("FOO", "x $(FOO) $(FOO)", Flavor::Recursive);
        let result = run(&env, "$(FOO)");
        assert_eq!(result.out, "x ");
        assert_eq!(result.diagnostics.count(DiagCode::EvalRecursiveLoop), 1);
        assert!(result.diagnostics.has_errors());
    }

    #[rstest]
    fn text_after_a_recursive_reference_is_dropped() {
        let mut env = VariableEnv::new();
        env.set("FOO", "a $(FOO) b", Flavor::Recursive);
        let result = run(&env, "$(FOO) tail");
        assert_eq!(result.out, "a ");
        assert_eq!(result.diagnostics.count(DiagCode::EvalRecursiveLoop), 1);
    }

    #[rstest]
    fn truncation_is_scoped_to_one_value(mut env: VariableEnv) {
        env.set("FOO", "$(FOO)", Flavor::Recursive);
        let location = SourceLocation::new("Makefile", 3, 1);
        let mut diagnostics = Diagnostics::new();
        let mut unknowns = UnknownRegistry::new();
        let mut expander = Expander::new(&env, &location, &mut diagnostics, &mut unknowns);
        assert_eq!(expander.expand("pre $(FOO) post"), "pre ");
        assert_eq!(expander.expand("$(CC) -c"), "gcc -c");
    }

    #[rstest]
    fn mutual_recursion_terminates() {
        let mut env = VariableEnv::new();
        env.set("A", "$(B)", Flavor::Recursive);
        env.set("B", "$(A)", Flavor::Recursive);
        let result = run(&env, "$(A)");
        assert_eq!(result.out, "");
        assert_eq!(result.diagnostics.count(DiagCode::EvalRecursiveLoop), 1);
    }

    #[rstest]
    fn deep_but_finite_chains_are_bounded() {
        let mut env = VariableEnv::new();
        for idx in 0..100 {
            env.set(&format!("V{idx}"), format!("$(V{})", idx + 1), Flavor::Recursive);
        }
        let result = run(&env, "$(V0)");
        assert_eq!(result.out, "");
        assert_eq!(result.diagnostics.count(DiagCode::EvalRecursiveLoop), 1);
    }

    #[rstest]
    fn unterminated_reference_halts_expansion(env: VariableEnv) {
        let result = run(&env, "$(CC) -o $(OUT");
        assert_eq!(result.out, "gcc -o ");
        assert_eq!(result.diagnostics.count(DiagCode::EvalUnterminatedReference), 1);
    }

    #[rstest]
    fn unsupported_function_is_recorded(env: VariableEnv) {
        let result = run(&env, "$(shell uname -s)-$(CC)");
        assert_eq!(result.out, "-gcc");
        assert_eq!(result.diagnostics.count(DiagCode::EvalUnsupportedFunction), 1);
        let construct = &result.unknowns.as_slice()[0];
        assert_eq!(construct.category, UnknownCategory::MakeFunction);
        assert_eq!(construct.raw_snippet, "$(shell uname -s)");
        assert_eq!(construct.line, Some(7));
    }

    #[rstest]
    fn automatic_variables_in_recipes(env: VariableEnv) {
        let auto = AutoVars::new(
            "build/app.bin",
            vec!["src/main.o".into(), "lib.a".into(), "lib.a".into()],
        );
        let location = SourceLocation::new("Makefile", 1, 1);
        let mut diagnostics = Diagnostics::new();
        let mut unknowns = UnknownRegistry::new();
        let out = Expander::new(&env, &location, &mut diagnostics, &mut unknowns)
            .with_auto(&auto)
            .expand("$(CC) -o $@ $^ | $+ | $< $(@D) $(@F) $(<D) $*");
        assert_eq!(
            out,
            "gcc -o build/app.bin src/main.o lib.a | src/main.o lib.a lib.a | src/main.o build app.bin src build/app"
        );
    }

    #[rstest]
    fn stem_is_bound_for_pattern_rules(env: VariableEnv) {
        let auto = AutoVars::new("obj/a.o", vec!["src/a.c".into()]).with_stem("a");
        let location = SourceLocation::new("Makefile", 1, 1);
        let mut diagnostics = Diagnostics::new();
        let mut unknowns = UnknownRegistry::new();
        let out = Expander::new(&env, &location, &mut diagnostics, &mut unknowns)
            .with_auto(&auto)
            .expand("$* $(*F)");
        assert_eq!(out, "a a");
    }
}
