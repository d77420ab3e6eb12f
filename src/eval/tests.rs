use super::*;
use crate::diagnostics::Diagnostics;
use crate::fs::MemoryFileSystem;
use crate::parser::parse_source;
use crate::unknown::UnknownCategory;
use rstest::{fixture, rstest};

#[fixture]
fn config() -> Config {
    Config::default()
}

fn eval_at(path: &str, text: &str, config: &Config) -> (BuildFacts, VariableEnv) {
    let parsed = parse_source(text, Utf8Path::new(path));
    let mut env = VariableEnv::with_defaults(Utf8Path::new("."));
    let facts = Evaluator::new(config).evaluate(&parsed.nodes, &mut env);
    (facts, env)
}

fn eval(text: &str, config: &Config) -> (BuildFacts, VariableEnv) {
    eval_at("Makefile", text, config)
}

fn codes(diagnostics: &Diagnostics) -> Vec<&'static str> {
    diagnostics.iter().map(|d| d.code.as_str()).collect()
}

#[rstest]
fn assignments_follow_flavor_rules(config: Config) {
    let text = "\
A = $(B)
B = one
S := $(B)
B = two
S += $(B)
A += x
C ?= first
C ?= second
";
    let (_, env) = eval(text, &config);
    assert_eq!(env.value("A"), Some("$(B) x"));
    assert_eq!(env.value("S"), Some("one two"));
    assert_eq!(env.value("C"), Some("first"));
}

#[rstest]
fn rule_lists_are_expanded(config: Config) {
    let text = "SRCS := a.c b.c\nOBJS := $(SRCS:.c=.o)\nprog: $(OBJS)\n";
    let (facts, _) = eval(text, &config);
    assert_eq!(facts.rules[0].targets, ["prog"]);
    assert_eq!(facts.rules[0].prerequisites, ["a.o", "b.o"]);
    assert_eq!(facts.rules[0].raw_prerequisites, ["$(OBJS)"]);
}

#[rstest]
fn recipes_see_the_final_environment(config: Config) {
    let text = "\
a.o: a.c
\t$(CC) $(CFLAGS) -c $< -o $@
CFLAGS = -O2 -Iinc
";
    let (facts, _) = eval(text, &config);
    let compile = &facts.inferred_compiles[0];
    assert_eq!(compile.source, "a.c");
    assert_eq!(compile.output.as_deref(), Some("a.o"));
    assert_eq!(compile.flags, ["-O2"]);
    assert_eq!(compile.includes, ["inc"]);
    assert_eq!(facts.rules[0].commands[0].expanded, "cc -O2 -Iinc -c a.c -o a.o");
}

#[rstest]
fn links_archives_and_custom_commands(config: Config) {
    let text = "\
app: main.o libfoo.a
\t$(CC) -o $@ $^ -lm
libfoo.a: foo.o
\t$(AR) rcs $@ $^
clean:
\t$(RM) *.o app
";
    let (facts, _) = eval(text, &config);
    let kinds: Vec<_> = facts.inferred_links.iter().map(|l| (l.output.as_str(), l.kind)).collect();
    assert_eq!(kinds, [("app", LinkKind::Link), ("libfoo.a", LinkKind::Archive)]);
    assert_eq!(facts.custom_commands.len(), 1);
    assert_eq!(facts.custom_commands[0].command, "rm -f *.o app");
    assert_eq!(facts.custom_commands[0].targets, ["clean"]);
}

#[rstest]
#[case("ifeq ($(MODE),debug)", true)]
#[case("ifeq \"$(MODE)\" \"release\"", false)]
#[case("ifneq ('$(MODE)','release')", true)]
#[case("ifdef MODE", true)]
#[case("ifdef NOPE", false)]
#[case("ifndef NOPE", true)]
fn conditionals_are_evaluated(config: Config, #[case] test: &str, #[case] holds: bool) {
    let text = format!("MODE = debug\n{test}\nPICK = yes\nelse\nPICK = no\nendif\n");
    let (facts, env) = eval(&text, &config);
    assert_eq!(env.value("PICK"), Some(if holds { "yes" } else { "no" }));
    assert!(facts.diagnostics.is_empty(), "{:?}", codes(&facts.diagnostics));
}

#[rstest]
fn legacy_mode_always_takes_the_true_branch() {
    let config = Config {
        evaluate_conditionals: false,
        ..Config::default()
    };
    let (_, env) = eval("ifdef NOPE\nPICK = yes\nelse\nPICK = no\nendif\n", &config);
    assert_eq!(env.value("PICK"), Some("yes"));
}

#[rstest]
fn unparseable_conditionals_take_the_true_branch(config: Config) {
    let (facts, env) = eval("ifeq garbage\nPICK = yes\nelse\nPICK = no\nendif\n", &config);
    assert_eq!(env.value("PICK"), Some("yes"));
    assert_eq!(codes(&facts.diagnostics), ["EVAL_UNSUPPORTED_CONDITIONAL"]);
    assert_eq!(
        facts.unknown_constructs.as_slice()[0].category,
        UnknownCategory::Conditional
    );
}

#[rstest]
fn recipe_lines_in_conditionals_join_the_last_rule(config: Config) {
    let text = "\
all: a.o
\techo start
ifdef CC
\t$(CC) -c a.c
endif
";
    let (facts, _) = eval(text, &config);
    assert_eq!(facts.rules[0].commands.len(), 2);
    assert_eq!(facts.inferred_compiles.len(), 1);
}

#[rstest]
fn orphan_commands_are_unknown(config: Config) {
    let (facts, _) = eval("ifdef CC\n\techo hi\nendif\n", &config);
    assert_eq!(codes(&facts.diagnostics), ["EVAL_ORPHAN_COMMAND"]);
    assert_eq!(
        facts.unknown_constructs.as_slice()[0].category,
        UnknownCategory::OrphanCommand
    );
}

#[rstest]
fn self_reference_reports_once(config: Config) {
    let (facts, _) = eval("FOO = $(FOO)\nall: $(FOO)\n", &config);
    assert_eq!(facts.diagnostics.count(DiagCode::EvalRecursiveLoop), 1);
    assert!(facts.rules[0].prerequisites.is_empty());
}

#[rstest]
fn globals_stop_at_the_first_rule(config: Config) {
    let text = "\
CFLAGS = -O2 -DNDEBUG
ENABLE_SSL = yes
all: app
LATE = 1
";
    let (facts, _) = eval_at("build/config.mk", text, &config);
    let globals = &facts.project_globals;
    assert_eq!(globals.vars.keys().collect::<Vec<_>>(), ["CFLAGS", "ENABLE_SSL"]);
    assert_eq!(globals.defines, ["NDEBUG"]);
    assert_eq!(globals.feature_toggles["ENABLE_SSL"], FeatureToggle::Bool(true));
}

#[rstest]
fn globals_ignore_other_files(config: Config) {
    let (facts, _) = eval("CFLAGS = -O2\n", &config);
    assert!(facts.project_globals.is_empty());
}

#[rstest]
fn pattern_rules_are_instantiated_with_stems(config: Config) {
    let fs = MemoryFileSystem::new()
        .with_file("proj/Makefile", "")
        .with_file("proj/a.c", "")
        .with_file("proj/b.c", "");
    let text = "%.o: %.c\n\t$(CC) -DNAME=$* -c $< -o $@\n";
    let parsed = parse_source(text, Utf8Path::new("proj/Makefile"));
    let mut env = VariableEnv::new();
    env.set("CC", "gcc", Flavor::Recursive);
    let facts = Evaluator::new(&config)
        .with_pattern_source(&fs, Utf8Path::new("proj"))
        .evaluate(&parsed.nodes, &mut env);
    let compiled: Vec<_> = facts
        .inferred_compiles
        .iter()
        .map(|c| (c.source.as_str(), c.output.as_deref(), c.defines.join(",")))
        .collect();
    assert_eq!(
        compiled,
        [
            ("a.c", Some("a.o"), "NAME=a".to_owned()),
            ("b.c", Some("b.o"), "NAME=b".to_owned())
        ]
    );
    assert_eq!(facts.rules.iter().filter(|r| r.is_pattern).count(), 1);
}

#[rstest]
fn base_dir_prefixes_paths(config: Config) {
    let text = "lib.a: x.o\n\tar rcs $@ $^\nx.o: x.c\n\tcc -c x.c -o x.o\n";
    let parsed = parse_source(text, Utf8Path::new("sub/Makefile"));
    let mut env = VariableEnv::new();
    let facts = Evaluator::new(&config)
        .with_base_dir(Utf8Path::new("sub"))
        .evaluate(&parsed.nodes, &mut env);
    assert_eq!(facts.inferred_links[0].output, "sub/lib.a");
    assert_eq!(facts.inferred_links[0].inputs, ["sub/x.o"]);
    assert_eq!(facts.inferred_compiles[0].source, "sub/x.c");
    assert_eq!(facts.rules[0].targets, ["sub/lib.a"]);
}

#[rstest]
fn unsupported_function_in_a_variable_is_reported_at_its_definition(config: Config) {
    let text = "\
STAMP = $(shell date)
a:
\techo $(STAMP)
b:
\techo $(STAMP) $(STAMP)
";
    let (facts, env) = eval(text, &config);
    assert_eq!(codes(&facts.diagnostics), ["EVAL_UNSUPPORTED_FUNCTION"]);
    let constructs = facts.unknown_constructs.as_slice();
    assert_eq!(constructs.len(), 1);
    assert_eq!(constructs[0].line, Some(1));
    assert_eq!(constructs[0].raw_snippet, "$(shell date)");
    let defined = env.get("STAMP").and_then(|var| var.defined_at.as_ref());
    assert_eq!(defined.map(|location| location.line), Some(1));
}
