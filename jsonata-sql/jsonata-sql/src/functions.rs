//! Static map from query-language function names to SQL templates.
//!
//! Templates use `{0}`, `{1}`, … placeholders for translated arguments.
//! A function may carry several templates keyed by arity. Absence of a name
//! is not an error here; the validator warns and the translator fails, each
//! on its own terms.

use std::collections::HashMap;
use std::sync::OnceLock;

use crate::classify::Tier;
use crate::sql::ast::strength;

#[derive(Debug, Clone, Copy)]
pub struct FunctionMapping {
    pub tier: Tier,
    /// (arity, template) pairs; the translator picks by argument count.
    pub templates: &'static [(usize, &'static str)],
    /// SQL aggregate name when the function aggregates over a root-rooted
    /// path argument.
    pub aggregate: Option<&'static str>,
    /// Binding strength of the rendered result.
    pub strength: u8,
    /// Index of an argument that shifts from 0-based source indexing to
    /// 1-based SQL indexing.
    pub one_based_arg: Option<usize>,
    pub constraints: &'static [&'static str],
}

const fn scalar(templates: &'static [(usize, &'static str)]) -> FunctionMapping {
    FunctionMapping {
        tier: Tier::Full,
        templates,
        aggregate: None,
        strength: strength::ATOM,
        one_based_arg: None,
        constraints: &[],
    }
}

const fn aggregate(name: &'static str) -> FunctionMapping {
    FunctionMapping {
        tier: Tier::Full,
        templates: &[(1, "")],
        aggregate: Some(name),
        strength: strength::ATOM,
        one_based_arg: None,
        constraints: &["argument must be a root-rooted path"],
    }
}

/// Look up the SQL mapping for a function name (without the `$` sigil).
pub fn function_mapping(name: &str) -> Option<&'static FunctionMapping> {
    static TABLE: OnceLock<HashMap<&'static str, FunctionMapping>> = OnceLock::new();
    TABLE
        .get_or_init(|| {
            HashMap::from([
                // string functions
                ("lowercase", scalar(&[(1, "LOWER({0})")])),
                ("uppercase", scalar(&[(1, "UPPER({0})")])),
                ("length", scalar(&[(1, "CHAR_LENGTH({0})")])),
                ("trim", scalar(&[(1, "TRIM({0})")])),
                (
                    "substring",
                    FunctionMapping {
                        tier: Tier::Full,
                        templates: &[
                            (2, "SUBSTRING({0} FROM {1})"),
                            (3, "SUBSTRING({0} FROM {1} FOR {2})"),
                        ],
                        aggregate: None,
                        strength: strength::ATOM,
                        one_based_arg: Some(1),
                        constraints: &["start index shifts from 0-based to 1-based"],
                    },
                ),
                ("split", scalar(&[(2, "STRING_TO_ARRAY({0}, {1})")])),
                ("join", scalar(&[(2, "ARRAY_TO_STRING({0}, {1})")])),
                (
                    "contains",
                    FunctionMapping {
                        tier: Tier::Full,
                        templates: &[(2, "POSITION({1} IN {0}) > 0")],
                        aggregate: None,
                        strength: strength::COMPARISON,
                        one_based_arg: None,
                        constraints: &[],
                    },
                ),
                // numeric functions
                ("round", scalar(&[(1, "ROUND({0})"), (2, "ROUND({0}, {1})")])),
                ("floor", scalar(&[(1, "FLOOR({0})")])),
                ("ceil", scalar(&[(1, "CEIL({0})")])),
                ("abs", scalar(&[(1, "ABS({0})")])),
                ("power", scalar(&[(2, "POWER({0}, {1})")])),
                ("sqrt", scalar(&[(1, "SQRT({0})")])),
                // existence and casting
                (
                    "exists",
                    FunctionMapping {
                        tier: Tier::Full,
                        templates: &[(1, "{0} IS NOT NULL")],
                        aggregate: None,
                        strength: strength::COMPARISON,
                        one_based_arg: None,
                        constraints: &[],
                    },
                ),
                ("string", scalar(&[(1, "CAST({0} AS TEXT)")])),
                ("number", scalar(&[(1, "CAST({0} AS NUMERIC)")])),
                // aggregates
                ("sum", aggregate("SUM")),
                ("count", aggregate("COUNT")),
                ("average", aggregate("AVG")),
                ("min", aggregate("MIN")),
                ("max", aggregate("MAX")),
            ])
        })
        .get(name)
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn known_functions_resolve() {
        assert_eq!(
            function_mapping("lowercase").unwrap().templates,
            &[(1, "LOWER({0})")]
        );
        assert!(function_mapping("madeUp").is_none());
    }

    #[test]
    fn substring_shifts_to_one_based() {
        let m = function_mapping("substring").unwrap();
        assert_eq!(m.one_based_arg, Some(1));
        assert_eq!(m.templates.len(), 2);
    }

    #[test]
    fn aggregates_carry_sql_names() {
        assert_eq!(function_mapping("average").unwrap().aggregate, Some("AVG"));
        assert_eq!(function_mapping("count").unwrap().aggregate, Some("COUNT"));
        assert!(function_mapping("trim").unwrap().aggregate.is_none());
    }
}
