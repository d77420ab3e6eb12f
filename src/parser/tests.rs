//! Tests for statement dispatch, conditionals and error recovery.

use super::*;
use rstest::rstest;

fn parse_ok(text: &str) -> Vec<Node> {
    let out = parse_source(text, Utf8Path::new("Makefile"));
    assert!(out.diagnostics.is_empty(), "{:?}", out.diagnostics);
    out.nodes
}

fn only(nodes: &[Node]) -> &NodeKind {
    assert_eq!(nodes.len(), 1, "{nodes:?}");
    &nodes.first().expect("one node").kind
}

fn command_texts(commands: &[CommandLine]) -> Vec<&str> {
    commands.iter().map(|c| c.text.as_str()).collect()
}

#[rstest]
fn assignment_then_rule_with_command() {
    let nodes = parse_ok("VAR = 1\nfoo: bar baz\n\tcc -c foo.c -o foo.o\n");
    assert_eq!(nodes.len(), 2);
    assert_eq!(
        nodes[0].kind,
        NodeKind::VariableAssign {
            name: "VAR".into(),
            value: "1".into(),
            kind: AssignKind::Recursive,
        }
    );
    let NodeKind::Rule {
        targets,
        prerequisites,
        commands,
    } = &nodes[1].kind
    else {
        panic!("expected rule, got {:?}", nodes[1].kind);
    };
    assert_eq!(targets, &["foo"]);
    assert_eq!(prerequisites, &["bar", "baz"]);
    assert_eq!(command_texts(commands), ["cc -c foo.c -o foo.o"]);
    assert_eq!(commands[0].location, SourceLocation::new("Makefile", 3, 2));
}

#[rstest]
#[case("A := x", AssignKind::Simple, "x")]
#[case("A ::= x", AssignKind::Simple, "x")]
#[case("A += x y", AssignKind::Append, "x y")]
#[case("A ?= x", AssignKind::Conditional, "x")]
#[case("A=", AssignKind::Recursive, "")]
#[case("OBJS = $(SRCS:.c=.o)", AssignKind::Recursive, "$(SRCS:.c=.o)")]
#[case("export A = x", AssignKind::Recursive, "x")]
#[case("override A := x", AssignKind::Simple, "x")]
fn assignment_kinds(#[case] text: &str, #[case] kind: AssignKind, #[case] value: &str) {
    let nodes = parse_ok(text);
    let NodeKind::VariableAssign {
        kind: got_kind,
        value: got_value,
        ..
    } = only(&nodes)
    else {
        panic!("expected assignment in {nodes:?}");
    };
    assert_eq!(*got_kind, kind);
    assert_eq!(got_value, value);
}

#[rstest]
fn colon_inside_reference_does_not_start_a_rule() {
    let nodes = parse_ok("$(OBJS:.o=.d): deps.mk\n");
    let NodeKind::Rule { targets, .. } = only(&nodes) else {
        panic!("expected rule");
    };
    assert_eq!(targets, &["$(OBJS:.o=.d)"]);
}

#[rstest]
fn inline_recipe_double_colon_and_order_only() {
    let nodes = parse_ok("out:: a | dir ; touch out\n\techo done\n");
    let NodeKind::Rule {
        prerequisites,
        commands,
        ..
    } = only(&nodes)
    else {
        panic!("expected rule");
    };
    assert_eq!(prerequisites, &["a", "dir"]);
    assert_eq!(command_texts(commands), ["touch out", "echo done"]);
}

#[rstest]
fn recipe_survives_blank_and_comment_lines() {
    let nodes = parse_ok("all:\n\tone\n\n# note\n\ttwo\nX = 1\n");
    assert_eq!(nodes.len(), 2);
    let NodeKind::Rule { commands, .. } = &nodes[0].kind else {
        panic!("expected rule");
    };
    assert_eq!(command_texts(commands), ["one", "two"]);
}

#[rstest]
#[case("%.o: %.c\n\t$(CC) -c $< -o $@\n", vec!["%.o"], vec!["%.c"])]
#[case("$(OBJS): %.o: %.c\n", vec!["$(OBJS)"], vec!["%.o:", "%.c"])]
fn pattern_rules_are_recognised(
    #[case] text: &str,
    #[case] targets: Vec<&str>,
    #[case] prereqs: Vec<&str>,
) {
    let nodes = parse_ok(text);
    let NodeKind::PatternRule {
        target_patterns,
        prerequisite_patterns,
        ..
    } = only(&nodes)
    else {
        panic!("expected pattern rule in {nodes:?}");
    };
    assert_eq!(target_patterns, &targets);
    assert_eq!(prerequisite_patterns, &prereqs);
}

#[rstest]
#[case("include a.mk b.mk", false)]
#[case("-include deps.d", true)]
#[case("sinclude deps.d", true)]
fn include_statements(#[case] text: &str, #[case] optional: bool) {
    let nodes = parse_ok(text);
    let NodeKind::IncludeStmt {
        paths,
        optional: got,
    } = only(&nodes)
    else {
        panic!("expected include");
    };
    assert!(!paths.is_empty());
    assert_eq!(*got, optional);
}

#[rstest]
fn conditional_with_else_and_nesting() {
    let text = "ifeq ($(OS),linux)\nA = 1\nifdef DEBUG\nB = 2\nendif\nelse\nA = 0\nendif\n";
    let nodes = parse_ok(text);
    let NodeKind::Conditional {
        test,
        true_body,
        false_body,
    } = only(&nodes)
    else {
        panic!("expected conditional");
    };
    assert_eq!(test.kind, ConditionalKind::Ifeq);
    assert_eq!(test.argument, "($(OS),linux)");
    assert_eq!(true_body.len(), 2);
    assert!(matches!(true_body[1].kind, NodeKind::Conditional { .. }));
    assert_eq!(false_body.len(), 1);
}

#[rstest]
fn else_if_chain_shares_endif() {
    let text = "ifeq ($(X),a)\nR = a\nelse ifeq ($(X),b)\nR = b\nelse\nR = c\nendif\nTAIL = 1\n";
    let nodes = parse_ok(text);
    assert_eq!(nodes.len(), 2);
    let NodeKind::Conditional { false_body, .. } = &nodes[0].kind else {
        panic!("expected conditional");
    };
    let NodeKind::Conditional {
        test,
        true_body,
        false_body: inner_false,
    } = only(false_body)
    else {
        panic!("expected chained conditional");
    };
    assert_eq!(test.argument, "($(X),b)");
    assert_eq!(true_body.len(), 1);
    assert_eq!(inner_false.len(), 1);
}

#[rstest]
fn unterminated_conditional_keeps_partial_body() {
    let out = parse_source("ifdef X\nA = 1\nall:\n", Utf8Path::new("Makefile"));
    assert_eq!(out.diagnostics.count(DiagCode::ParserUnterminatedConditional), 1);
    assert!(out.diagnostics.has_errors());
    let NodeKind::Conditional { true_body, .. } = only(&out.nodes) else {
        panic!("expected conditional");
    };
    assert_eq!(true_body.len(), 2);
}

#[rstest]
fn define_block_becomes_assignment() {
    let nodes = parse_ok("define RECIPE :=\n\techo one\necho two\nendef\n");
    let NodeKind::VariableAssign { name, value, kind } = only(&nodes) else {
        panic!("expected assignment");
    };
    assert_eq!(name, "RECIPE");
    assert_eq!(*kind, AssignKind::Simple);
    assert_eq!(value, "\techo one\necho two");
}

#[rstest]
fn unterminated_define_is_an_error() {
    let out = parse_source("define X\nbody\n", Utf8Path::new("Makefile"));
    assert_eq!(out.diagnostics.count(DiagCode::ParserUnterminatedDefine), 1);
    assert_eq!(out.nodes.len(), 1);
}

#[rstest]
#[case("this is not make", UnknownCategory::MakeSyntax)]
#[case("vpath %.c src", UnknownCategory::Directive)]
#[case("export", UnknownCategory::Directive)]
#[case("unexport PATH", UnknownCategory::Directive)]
#[case("endif", UnknownCategory::Directive)]
#[case("REV != git rev-parse HEAD", UnknownCategory::MakeFunction)]
#[case("app: CFLAGS += -g", UnknownCategory::TargetVariable)]
fn unsupported_lines_become_unknowns(#[case] text: &str, #[case] category: UnknownCategory) {
    let source = format!("{text}\nNEXT = 1\n");
    let out = parse_source(&source, Utf8Path::new("Makefile"));
    assert_eq!(out.unknown_constructs.len(), 1);
    let construct = &out.unknown_constructs.as_slice()[0];
    assert_eq!(construct.category, category);
    assert_eq!(construct.line, Some(1));
    assert_eq!(construct.raw_snippet, text);
    assert_eq!(out.diagnostics.count(DiagCode::ParserUnknownConstruct), 1);
    assert!(!out.diagnostics.has_errors());
    assert!(matches!(
        out.nodes.last().map(|n| &n.kind),
        Some(NodeKind::VariableAssign { name, .. }) if name == "NEXT"
    ));
}

#[rstest]
fn unknown_diagnostic_names_the_line() {
    let out = parse_source("  ??? odd\n", Utf8Path::new("sub/rules.mk"));
    let rendered: Vec<String> = out.diagnostics.iter().map(ToString::to_string).collect();
    insta::assert_snapshot!(
        rendered.join("\n"),
        @"WARN[PARSER_UNKNOWN_CONSTRUCT] sub/rules.mk:1:3: unrecognised line: ??? odd"
    );
}

#[rstest]
fn stray_tab_line_is_a_raw_command() {
    let nodes = parse_ok("X = 1\n\techo orphan\n");
    assert_eq!(
        nodes[1].kind,
        NodeKind::RawCommand {
            text: "echo orphan".into()
        }
    );
}
