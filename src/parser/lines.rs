//! Physical-to-logical line handling.
//!
//! A logical line is one or more physical lines spliced together by a
//! trailing backslash. Comments are stripped from everything except recipe
//! lines, which belong to the shell.

/// One logical line of a makefile.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogicalLine {
    /// Text with continuations joined and, for non-recipe lines, comments
    /// removed. Recipe lines lose their leading tab.
    pub text: String,
    /// 1-based number of the first physical line.
    pub line: usize,
    /// 1-based column of the first significant character.
    pub column: usize,
    /// Whether the line started with a tab.
    pub is_command: bool,
}

/// Split `source` into logical lines, dropping blank and comment-only
/// non-recipe lines.
#[must_use]
pub fn logical_lines(source: &str) -> Vec<LogicalLine> {
    let physical: Vec<&str> = source.lines().collect();
    let mut out = Vec::new();
    let mut index = 0;
    while let Some(first) = physical.get(index) {
        let start = index;
        let mut joined = (*first).to_owned();
        while ends_with_continuation(&joined) {
            joined.pop();
            index += 1;
            match physical.get(index) {
                Some(next) => {
                    let kept = joined.trim_end().len();
                    joined.truncate(kept);
                    joined.push(' ');
                    joined.push_str(next.trim_start());
                }
                None => break,
            }
        }
        index += 1;

        if let Some(command) = joined.strip_prefix('\t') {
            let text = command.trim_end();
            out.push(LogicalLine {
                text: text.to_owned(),
                line: start + 1,
                column: 2,
                is_command: true,
            });
            continue;
        }

        let stripped = strip_comment(&joined);
        let trimmed = stripped.trim();
        if trimmed.is_empty() {
            continue;
        }
        let indent = stripped.chars().take_while(|c| c.is_whitespace()).count();
        out.push(LogicalLine {
            text: trimmed.to_owned(),
            line: start + 1,
            column: indent + 1,
            is_command: false,
        });
    }
    out
}

fn ends_with_continuation(line: &str) -> bool {
    let trailing = line.chars().rev().take_while(|&c| c == '\\').count();
    !trailing.is_multiple_of(2)
}

/// Remove a trailing `#` comment, honouring `\#` escapes, and unescape
/// the escaped hashes that remain.
///
/// ```rust
/// use gmake2cmake::parser::lines::strip_comment;
///
/// assert_eq!(strip_comment("CFLAGS = -O2 # tuned"), "CFLAGS = -O2 ");
/// assert_eq!(strip_comment(r"URL = a\#b # note"), "URL = a#b ");
/// ```
#[must_use]
pub fn strip_comment(line: &str) -> String {
    let mut out = String::with_capacity(line.len());
    let mut backslashes = 0usize;
    for ch in line.chars() {
        if ch == '#' {
            if !backslashes.is_multiple_of(2) {
                out.pop();
                out.push('#');
                backslashes = 0;
                continue;
            }
            break;
        }
        backslashes = if ch == '\\' { backslashes + 1 } else { 0 };
        out.push(ch);
    }
    out
}

/// Byte offsets of `needle` in `text` that sit outside any `$(...)` or
/// `${...}` reference and are not backslash-escaped.
#[must_use]
pub fn top_level_positions(text: &str, needle: char) -> Vec<usize> {
    let mut positions = Vec::new();
    let mut closers: Vec<char> = Vec::new();
    let mut prev_dollar = false;
    let mut prev_backslash = false;
    for (idx, ch) in text.char_indices() {
        let escaped = prev_backslash;
        prev_backslash = ch == '\\' && !escaped;
        if prev_dollar && (ch == '(' || ch == '{') {
            closers.push(if ch == '(' { ')' } else { '}' });
            prev_dollar = false;
            continue;
        }
        prev_dollar = ch == '$' && !prev_dollar;
        if let Some(&closer) = closers.last() {
            if ch == closer {
                closers.pop();
            } else if ch == '(' || ch == '{' {
                closers.push(if ch == '(' { ')' } else { '}' });
            }
            continue;
        }
        if ch == needle && !escaped {
            positions.push(idx);
        }
    }
    positions
}

/// First top-level, unescaped occurrence of `needle`.
#[must_use]
pub fn find_top_level(text: &str, needle: char) -> Option<usize> {
    top_level_positions(text, needle).into_iter().next()
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    fn continuation_joins_and_keeps_first_line_number() {
        let lines = logical_lines("SRCS = a.c \\\n       b.c \\\n  c.c\nall:\n");
        assert_eq!(lines.len(), 2);
        assert_eq!(lines[0].text, "SRCS = a.c b.c c.c");
        assert_eq!(lines[0].line, 1);
        assert_eq!(lines[1].line, 4);
    }

    #[rstest]
    fn escaped_backslash_is_not_a_continuation() {
        let lines = logical_lines("A = x\\\\\nB = y\n");
        assert_eq!(lines.len(), 2);
        assert_eq!(lines[0].text, "A = x\\\\");
    }

    #[rstest]
    fn trailing_continuation_at_eof_is_dropped() {
        let lines = logical_lines("A = x \\");
        assert_eq!(lines.len(), 1);
        assert_eq!(lines[0].text, "A = x");
    }

    #[rstest]
    fn recipe_lines_keep_hashes() {
        let lines = logical_lines("all:\n\techo '#not a comment'\n# gone\n\n");
        assert_eq!(lines.len(), 2);
        assert!(lines[1].is_command);
        assert_eq!(lines[1].text, "echo '#not a comment'");
    }

    #[rstest]
    #[case("a: b", ':', vec![1])]
    #[case("$(SRC:.c=.o): x", ':', vec![12])]
    #[case("${A:b=c} d:e", ':', vec![10])]
    #[case(r"c\:d: e", ':', vec![4])]
    #[case("A = $(call f,$(x)) = y", '=', vec![2, 19])]
    fn top_level_positions_skip_references(
        #[case] text: &str,
        #[case] needle: char,
        #[case] expected: Vec<usize>,
    ) {
        assert_eq!(top_level_positions(text, needle), expected);
    }
}
