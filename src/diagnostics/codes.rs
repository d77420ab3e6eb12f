//! The closed vocabulary of diagnostic codes.
//!
//! Codes are part of the observable contract of the translator: reports and
//! conformance tests compare them verbatim. Each code belongs to exactly one
//! [`Category`] and has a default [`Severity`].

use std::fmt;

use serde::{Serialize, Serializer};

use super::Severity;

/// Pipeline stage that owns a diagnostic code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Category {
    /// Configuration loading and validation.
    Config,
    /// Entry resolution and include traversal.
    Discovery,
    /// Line-oriented parsing.
    Parser,
    /// Macro expansion and rule evaluation.
    Eval,
    /// Pattern rule instantiation.
    Pattern,
    /// IR construction and validation.
    Ir,
    /// Writing outputs.
    Emit,
}

macro_rules! diag_codes {
    ($($variant:ident => ($text:literal, $category:ident, $severity:ident)),+ $(,)?) => {
        /// Every diagnostic the translator can produce.
        #[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
        #[non_exhaustive]
        pub enum DiagCode {
            $(
                #[doc = concat!("`", $text, "`")]
                $variant,
            )+
        }

        impl DiagCode {
            /// All codes, in declaration order.
            pub const ALL: &'static [Self] = &[$(Self::$variant),+];

            /// Stable textual form of the code.
            #[must_use]
            pub const fn as_str(self) -> &'static str {
                match self {
                    $(Self::$variant => $text,)+
                }
            }

            /// Stage that owns the code.
            #[must_use]
            pub const fn category(self) -> Category {
                match self {
                    $(Self::$variant => Category::$category,)+
                }
            }

            /// Severity used when the caller does not override it.
            #[must_use]
            pub const fn default_severity(self) -> Severity {
                match self {
                    $(Self::$variant => Severity::$severity,)+
                }
            }
        }
    };
}

diag_codes! {
    ConfigParseError => ("CONFIG_PARSE_ERROR", Config, Error),
    ConfigInvalidPattern => ("CONFIG_INVALID_PATTERN", Config, Error),
    DiscoveryEntryMissing => ("DISCOVERY_ENTRY_MISSING", Discovery, Error),
    DiscoveryUnconfiguredTemplate => ("DISCOVERY_UNCONFIGURED_TEMPLATE", Discovery, Warn),
    DiscoveryIncludeMissing => ("DISCOVERY_INCLUDE_MISSING", Discovery, Error),
    DiscoveryOptionalIncludeMissing => ("DISCOVERY_OPTIONAL_INCLUDE_MISSING", Discovery, Warn),
    DiscoveryIncludeCycle => ("DISCOVERY_INCLUDE_CYCLE", Discovery, Error),
    DiscoveryUnresolvedPath => ("DISCOVERY_UNRESOLVED_PATH", Discovery, Info),
    DiscoveryReadFailed => ("DISCOVERY_READ_FAILED", Discovery, Warn),
    DiscoveryDepthExceeded => ("DISCOVERY_DEPTH_EXCEEDED", Discovery, Warn),
    DiscoveryIgnoredPath => ("DISCOVERY_IGNORED_PATH", Discovery, Info),
    ParserUnknownConstruct => ("PARSER_UNKNOWN_CONSTRUCT", Parser, Warn),
    ParserUnterminatedConditional => ("PARSER_UNTERMINATED_CONDITIONAL", Parser, Error),
    ParserUnterminatedDefine => ("PARSER_UNTERMINATED_DEFINE", Parser, Error),
    EvalRecursiveLoop => ("EVAL_RECURSIVE_LOOP", Eval, Error),
    EvalUnterminatedReference => ("EVAL_UNTERMINATED_REFERENCE", Eval, Error),
    EvalUnsupportedFunction => ("EVAL_UNSUPPORTED_FUNCTION", Eval, Warn),
    EvalUnsupportedConditional => ("EVAL_UNSUPPORTED_CONDITIONAL", Eval, Warn),
    EvalOrphanCommand => ("EVAL_ORPHAN_COMMAND", Eval, Warn),
    EvalPartitionFailed => ("EVAL_PARTITION_FAILED", Eval, Warn),
    PatternUnsupported => ("PATTERN_UNSUPPORTED", Pattern, Warn),
    PatternNoMatch => ("PATTERN_NO_MATCH", Pattern, Warn),
    PatternScanFailed => ("PATTERN_SCAN_FAILED", Pattern, Warn),
    IrUnmappedFlag => ("IR_UNMAPPED_FLAG", Ir, Warn),
    IrDuplicateTarget => ("IR_DUPLICATE_TARGET", Ir, Error),
    IrDuplicateAlias => ("IR_DUPLICATE_ALIAS", Ir, Error),
    IrDependencyCycle => ("IR_DEPENDENCY_CYCLE", Ir, Error),
    IrImportedWithoutTarget => ("IR_IMPORTED_WITHOUT_TARGET", Ir, Warn),
    EmitWriteFailed => ("EMIT_WRITE_FAILED", Emit, Error),
}

impl fmt::Display for DiagCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Serialize for DiagCode {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;
    use std::collections::HashSet;

    #[rstest]
    fn codes_are_unique_and_prefixed_by_category() {
        let mut seen = HashSet::new();
        for code in DiagCode::ALL {
            assert!(seen.insert(code.as_str()), "duplicate code {code}");
            let prefix = match code.category() {
                Category::Config => "CONFIG_",
                Category::Discovery => "DISCOVERY_",
                Category::Parser => "PARSER_",
                Category::Eval => "EVAL_",
                Category::Pattern => "PATTERN_",
                Category::Ir => "IR_",
                Category::Emit => "EMIT_",
            };
            assert!(code.as_str().starts_with(prefix), "{code} outside {prefix}");
        }
    }

    #[rstest]
    #[case(DiagCode::EvalRecursiveLoop, Severity::Error)]
    #[case(DiagCode::IrUnmappedFlag, Severity::Warn)]
    #[case(DiagCode::DiscoveryUnresolvedPath, Severity::Info)]
    fn default_severities(#[case] code: DiagCode, #[case] expected: Severity) {
        assert_eq!(code.default_severity(), expected);
    }
}
