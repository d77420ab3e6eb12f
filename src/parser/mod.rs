//! Line-oriented makefile parser.
//!
//! [`parse`] turns one file into an ordered list of [`Node`]s. It never
//! fails: lines it cannot model become [`UnknownConstruct`] records with a
//! `PARSER_UNKNOWN_CONSTRUCT` warning, and parsing resumes at the next
//! logical line.
//!
//! Statements are recognised in priority order: directives (`include`,
//! conditionals, `define`, `export`/`override`), then assignments, then rule
//! headers, then stray recipe lines.
//!
//! [`UnknownConstruct`]: crate::unknown::UnknownConstruct

pub mod lines;

use camino::Utf8Path;

use crate::ast::{
    AssignKind, CommandLine, ConditionalKind, ConditionalTest, Node, NodeKind, SourceLocation,
};
use crate::diagnostics::{DiagCode, Diagnostics};
use crate::unknown::{
    SuggestedAction, UnknownCategory, UnknownDraft, UnknownRegistry, ellipsize,
};

use self::lines::{LogicalLine, find_top_level, logical_lines};

/// Everything produced by [`parse_source`].
#[derive(Debug, Clone, Default)]
pub struct ParseOutput {
    /// Parsed statements in document order.
    pub nodes: Vec<Node>,
    /// Problems found while parsing.
    pub diagnostics: Diagnostics,
    /// Lines the parser could not model.
    pub unknown_constructs: UnknownRegistry,
}

/// Parse `text` with fresh collectors.
#[must_use]
pub fn parse_source(text: &str, path: &Utf8Path) -> ParseOutput {
    let mut out = ParseOutput::default();
    out.nodes = parse(
        text,
        path,
        &mut out.diagnostics,
        &mut out.unknown_constructs,
    );
    out
}

/// Parse `text`, read from `path`, into AST nodes.
///
/// Diagnostics and unknown constructs are appended to the caller's
/// collectors so ids stay unique across the files of one run.
pub fn parse(
    text: &str,
    path: &Utf8Path,
    diagnostics: &mut Diagnostics,
    unknowns: &mut UnknownRegistry,
) -> Vec<Node> {
    let mut parser = Parser {
        lines: logical_lines(text),
        pos: 0,
        path,
        diagnostics,
        unknowns,
    };
    let nodes = parser.parse_file();
    tracing::debug!(file = %path, nodes = nodes.len(), "parsed makefile");
    nodes
}

/// Assignment operator as written, including the shell form the AST does
/// not model.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum AssignOp {
    Kind(AssignKind),
    Shell,
}

/// A split `NAME op value` line.
#[derive(Debug)]
struct Assignment<'a> {
    name: &'a str,
    op: AssignOp,
    value: &'a str,
}

/// Split an assignment, rejecting lines where a top-level `:` precedes the
/// operator (those are rule headers).
fn split_assignment(text: &str) -> Option<Assignment<'_>> {
    let eq = find_top_level(text, '=')?;
    let before = text.get(..eq)?;
    let (op, name_end) = if before.ends_with("::") {
        (AssignOp::Kind(AssignKind::Simple), eq - 2)
    } else if before.ends_with(':') {
        (AssignOp::Kind(AssignKind::Simple), eq - 1)
    } else if before.ends_with('+') {
        (AssignOp::Kind(AssignKind::Append), eq - 1)
    } else if before.ends_with('?') {
        (AssignOp::Kind(AssignKind::Conditional), eq - 1)
    } else if before.ends_with('!') {
        (AssignOp::Shell, eq - 1)
    } else {
        (AssignOp::Kind(AssignKind::Recursive), eq)
    };
    if find_top_level(text, ':').is_some_and(|colon| colon < name_end) {
        return None;
    }
    let name = text.get(..name_end)?.trim();
    if name.is_empty() || name.contains(char::is_whitespace) {
        return None;
    }
    let value = text.get(eq + 1..)?.trim();
    Some(Assignment { name, op, value })
}

/// Split off the first word, stopping at whitespace or `(` so that
/// `ifeq(a,b)` is recognised.
fn split_first_word(text: &str) -> (&str, &str) {
    let end = text
        .find(|c: char| c.is_whitespace() || c == '(')
        .unwrap_or(text.len());
    let (word, rest) = text.split_at(end);
    (word, rest.trim())
}

/// Whether the remainder after a directive keyword shows the keyword is
/// really a variable or target name (`include = x`, `define: y`).
pub(crate) fn keyword_is_name(rest: &str) -> bool {
    ["=", ":", "+=", "?=", "!="]
        .iter()
        .any(|op| rest.starts_with(op))
}

enum BlockEnd {
    Else { line: LogicalLine, rest: String },
    Endif(LogicalLine),
    Eof,
}

struct Parser<'a> {
    lines: Vec<LogicalLine>,
    pos: usize,
    path: &'a Utf8Path,
    diagnostics: &'a mut Diagnostics,
    unknowns: &'a mut UnknownRegistry,
}

impl Parser<'_> {
    fn location(&self, line: &LogicalLine) -> SourceLocation {
        SourceLocation::new(self.path, line.line, line.column)
    }

    fn next_line(&mut self) -> Option<LogicalLine> {
        let line = self.lines.get(self.pos).cloned()?;
        self.pos += 1;
        Some(line)
    }

    fn peek_command(&self) -> Option<&LogicalLine> {
        self.lines.get(self.pos).filter(|line| line.is_command)
    }

    fn parse_file(&mut self) -> Vec<Node> {
        let mut nodes = Vec::new();
        loop {
            let (block, end) = self.parse_block();
            nodes.extend(block);
            match end {
                BlockEnd::Eof => break,
                BlockEnd::Else { line, .. } => {
                    self.unknown(UnknownCategory::Directive, &line, "else without matching if");
                }
                BlockEnd::Endif(line) => {
                    self.unknown(UnknownCategory::Directive, &line, "endif without matching if");
                }
            }
        }
        nodes
    }

    /// Parse statements until `else`, `endif` or end of input.
    fn parse_block(&mut self) -> (Vec<Node>, BlockEnd) {
        let mut nodes = Vec::new();
        while let Some(line) = self.next_line() {
            if line.is_command {
                if !line.text.is_empty() {
                    let location = self.location(&line);
                    nodes.push(Node::new(NodeKind::RawCommand { text: line.text }, location));
                }
                continue;
            }
            let (word, rest) = split_first_word(&line.text);
            if keyword_is_name(rest) {
                nodes.extend(self.parse_statement(&line.text, &line));
                continue;
            }
            match word {
                "else" => {
                    let tail = rest.to_owned();
                    return (nodes, BlockEnd::Else { line, rest: tail });
                }
                "endif" => return (nodes, BlockEnd::Endif(line)),
                "include" | "-include" | "sinclude" => {
                    let paths = rest.split_whitespace().map(str::to_owned).collect();
                    let kind = NodeKind::IncludeStmt {
                        paths,
                        optional: word != "include",
                    };
                    nodes.push(Node::new(kind, self.location(&line)));
                }
                "define" => nodes.extend(self.parse_define(rest, &line)),
                "endef" => {
                    self.unknown(UnknownCategory::Directive, &line, "endef without define");
                }
                "export" | "unexport" | "override" | "private" => {
                    nodes.extend(self.parse_prefixed(word, rest, &line));
                }
                "vpath" | "undefine" | "load" | "-load" => {
                    self.unknown(UnknownCategory::Directive, &line, "unsupported directive");
                }
                other => {
                    if let Some(kind) = ConditionalKind::from_keyword(other) {
                        nodes.push(self.parse_conditional(kind, rest, &line));
                    } else {
                        nodes.extend(self.parse_statement(&line.text, &line));
                    }
                }
            }
        }
        (nodes, BlockEnd::Eof)
    }

    fn parse_conditional(
        &mut self,
        kind: ConditionalKind,
        argument: &str,
        header: &LogicalLine,
    ) -> Node {
        let location = self.location(header);
        let test = ConditionalTest {
            kind,
            argument: argument.trim().to_owned(),
        };
        let (true_body, end) = self.parse_block();
        let mut false_body = Vec::new();
        match end {
            BlockEnd::Endif(_) => {}
            BlockEnd::Eof => self.unterminated_conditional(kind, &location),
            BlockEnd::Else { line, rest } => {
                let (word, tail) = split_first_word(&rest);
                if rest.is_empty() {
                    self.parse_else_body(&mut false_body, kind, &location);
                } else if let Some(chained) = ConditionalKind::from_keyword(word) {
                    false_body.push(self.parse_conditional(chained, tail, &line));
                } else {
                    self.unknown(UnknownCategory::Directive, &line, "malformed else");
                    self.parse_else_body(&mut false_body, kind, &location);
                }
            }
        }
        Node::new(
            NodeKind::Conditional {
                test,
                true_body,
                false_body,
            },
            location,
        )
    }

    fn parse_else_body(
        &mut self,
        body: &mut Vec<Node>,
        kind: ConditionalKind,
        location: &SourceLocation,
    ) {
        loop {
            let (nodes, end) = self.parse_block();
            body.extend(nodes);
            match end {
                BlockEnd::Endif(_) => break,
                BlockEnd::Eof => {
                    self.unterminated_conditional(kind, location);
                    break;
                }
                BlockEnd::Else { line, .. } => {
                    self.unknown(UnknownCategory::Directive, &line, "second else in conditional");
                }
            }
        }
    }

    fn unterminated_conditional(&mut self, kind: ConditionalKind, location: &SourceLocation) {
        self.diagnostics.report(
            DiagCode::ParserUnterminatedConditional,
            format!("'{}' block has no matching endif", kind.keyword()),
            Some(location.clone()),
        );
    }

    fn parse_define(&mut self, header: &str, line: &LogicalLine) -> Option<Node> {
        let mut words = header.split_whitespace();
        let Some(name) = words.next() else {
            self.unknown(UnknownCategory::Directive, line, "define without a name");
            return None;
        };
        let kind = match words.next() {
            Some(":=" | "::=") => AssignKind::Simple,
            Some("+=") => AssignKind::Append,
            Some("?=") => AssignKind::Conditional,
            _ => AssignKind::Recursive,
        };
        let location = self.location(line);
        let mut body = Vec::new();
        let mut depth = 0usize;
        let mut terminated = false;
        while let Some(next) = self.next_line() {
            if next.is_command {
                body.push(format!("\t{}", next.text));
                continue;
            }
            let (word, _) = split_first_word(&next.text);
            if word == "endef" {
                if depth == 0 {
                    terminated = true;
                    break;
                }
                depth -= 1;
            } else if word == "define" {
                depth += 1;
            }
            body.push(next.text);
        }
        if !terminated {
            self.diagnostics.report(
                DiagCode::ParserUnterminatedDefine,
                format!("define '{name}' has no matching endef"),
                Some(location.clone()),
            );
        }
        Some(Node::new(
            NodeKind::VariableAssign {
                name: name.to_owned(),
                value: body.join("\n"),
                kind,
            },
            location,
        ))
    }

    /// `export`, `unexport`, `override` and `private` only matter to us when
    /// they prefix an assignment.
    fn parse_prefixed(&mut self, word: &str, rest: &str, line: &LogicalLine) -> Option<Node> {
        let (inner_word, inner_rest) = split_first_word(rest);
        if inner_word == "define" && word != "unexport" {
            return self.parse_define(inner_rest, line);
        }
        if word != "unexport" {
            if let Some(assignment) = split_assignment(rest) {
                return self.assignment_node(&assignment, line);
            }
        }
        let reason = if rest.is_empty() {
            format!("bare '{word}' directive")
        } else {
            format!("'{word}' without an assignment")
        };
        self.unknown(UnknownCategory::Directive, line, &reason);
        None
    }

    fn parse_statement(&mut self, text: &str, line: &LogicalLine) -> Option<Node> {
        if let Some(assignment) = split_assignment(text) {
            return self.assignment_node(&assignment, line);
        }
        if let Some(colon) = find_top_level(text, ':') {
            return self.parse_rule(text, colon, line);
        }
        self.unknown(UnknownCategory::MakeSyntax, line, "unrecognised line");
        None
    }

    fn assignment_node(&mut self, assignment: &Assignment<'_>, line: &LogicalLine) -> Option<Node> {
        match assignment.op {
            AssignOp::Shell => {
                self.unknown(
                    UnknownCategory::MakeFunction,
                    line,
                    "shell assignment is not evaluated",
                );
                None
            }
            AssignOp::Kind(kind) => Some(Node::new(
                NodeKind::VariableAssign {
                    name: assignment.name.to_owned(),
                    value: assignment.value.to_owned(),
                    kind,
                },
                self.location(line),
            )),
        }
    }

    fn parse_rule(&mut self, text: &str, colon: usize, line: &LogicalLine) -> Option<Node> {
        let head = text.get(..colon).unwrap_or_default();
        let mut tail = text.get(colon + 1..).unwrap_or_default();
        if let Some(stripped) = tail.strip_prefix(':') {
            tail = stripped;
        }
        let (prereq_text, inline_command) = match find_top_level(tail, ';') {
            Some(semi) => (
                tail.get(..semi).unwrap_or_default(),
                tail.get(semi + 1..).map(str::trim),
            ),
            None => (tail, None),
        };

        let targets: Vec<String> = head.split_whitespace().map(str::to_owned).collect();
        if targets.is_empty() {
            self.unknown(UnknownCategory::MakeSyntax, line, "rule without targets");
            self.skip_commands();
            return None;
        }
        if split_assignment(prereq_text).is_some() {
            self.unknown(
                UnknownCategory::TargetVariable,
                line,
                "target-specific variable",
            );
            return None;
        }

        let prerequisites: Vec<String> = prereq_text
            .split_whitespace()
            .filter(|token| *token != "|")
            .map(str::to_owned)
            .collect();

        let mut commands = Vec::new();
        if let Some(command) = inline_command.filter(|c| !c.is_empty()) {
            commands.push(CommandLine {
                text: command.to_owned(),
                location: self.location(line),
            });
        }
        commands.extend(self.take_commands());

        let location = self.location(line);
        let is_static_pattern =
            find_top_level(prereq_text, ':').is_some() && prereq_text.contains('%');
        let kind = if is_static_pattern || targets.iter().any(|t| t.contains('%')) {
            NodeKind::PatternRule {
                target_patterns: targets,
                prerequisite_patterns: prerequisites,
                commands,
            }
        } else {
            NodeKind::Rule {
                targets,
                prerequisites,
                commands,
            }
        };
        Some(Node::new(kind, location))
    }

    fn take_commands(&mut self) -> Vec<CommandLine> {
        let mut commands = Vec::new();
        while self.peek_command().is_some() {
            let Some(line) = self.next_line() else { break };
            if line.text.is_empty() {
                continue;
            }
            let location = self.location(&line);
            commands.push(CommandLine {
                text: line.text,
                location,
            });
        }
        commands
    }

    fn skip_commands(&mut self) {
        while self.peek_command().is_some() {
            self.pos += 1;
        }
    }

    fn unknown(&mut self, category: UnknownCategory, line: &LogicalLine, reason: &str) {
        let location = self.location(line);
        let action = match category {
            UnknownCategory::Directive => SuggestedAction::Skip,
            _ => SuggestedAction::ManualReview,
        };
        self.unknowns.record(
            UnknownDraft::at(category, &location, line.text.as_str())
                .context("parser")
                .impact(reason)
                .suggested_action(action),
        );
        self.diagnostics.report(
            DiagCode::ParserUnknownConstruct,
            format!("{reason}: {}", ellipsize(&line.text)),
            Some(location),
        );
    }
}

#[cfg(test)]
mod tests;
