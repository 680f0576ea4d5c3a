//! Static support-tier tables for AST node kinds, binary operators and path
//! extensions.
//!
//! The tables are data, not logic: they must stay in lock-step with what the
//! translator actually handles. The validator consults them to produce
//! diagnostics without attempting translation.

use std::collections::HashMap;
use std::sync::OnceLock;

use strum::AsRefStr;

/// How much translation support a construct has.
#[derive(Debug, Clone, Copy, PartialEq, Eq, AsRefStr)]
#[strum(serialize_all = "UPPERCASE")]
pub enum Tier {
    /// Unconditionally translatable.
    Full,
    /// Translatable with caveats listed in `constraints`.
    Partial,
    /// Support depends on the surrounding node; reported as a warning.
    Contextual,
    /// Translation aborts with an error naming the construct.
    Unsupported,
}

#[derive(Debug, Clone, Copy)]
pub struct Classification {
    pub tier: Tier,
    pub notes: &'static str,
    pub constraints: &'static [&'static str],
}

const fn entry(tier: Tier, notes: &'static str) -> Classification {
    Classification {
        tier,
        notes,
        constraints: &[],
    }
}

const fn entry_with(
    tier: Tier,
    notes: &'static str,
    constraints: &'static [&'static str],
) -> Classification {
    Classification {
        tier,
        notes,
        constraints,
    }
}

/// Classification of an AST node kind, keyed by [ExprKind::name].
///
/// [ExprKind::name]: jsonata_sql_parser::parser::pr::ExprKind::name
pub fn classify_node(kind: &str) -> Option<&'static Classification> {
    static TABLE: OnceLock<HashMap<&'static str, Classification>> = OnceLock::new();
    TABLE
        .get_or_init(|| {
            HashMap::from([
                ("literal", entry(Tier::Full, "inlined SQL constant")),
                ("name", entry(Tier::Full, "resolved as field or relation")),
                (
                    "variable",
                    entry_with(
                        Tier::Contextual,
                        "only the context root, the reserved input parameter and block-bound names resolve",
                        &["other names become bound query parameters"],
                    ),
                ),
                ("path", entry(Tier::Full, "table, field and relation traversal")),
                ("binary", entry(Tier::Full, "per-operator table applies")),
                (
                    "unary",
                    entry(Tier::Full, "negation, array constructor, object constructor"),
                ),
                ("function", entry(Tier::Full, "per-function mapping table applies")),
                ("condition", entry(Tier::Full, "renders as CASE WHEN")),
                ("block", entry(Tier::Full, "bindings evaluate left to right")),
                ("bind", entry(Tier::Full, "variable binding inside a block")),
                (
                    "range",
                    entry_with(
                        Tier::Partial,
                        "only meaningful inside an index filter",
                        &["`[a..b]` outside an index position is rejected"],
                    ),
                ),
                ("wildcard", entry(Tier::Unsupported, "wildcard field traversal")),
                (
                    "descendant",
                    entry(Tier::Unsupported, "recursive descendant traversal"),
                ),
                ("parent", entry(Tier::Unsupported, "parent/ancestor reference")),
                ("apply", entry(Tier::Unsupported, "`~>` function application")),
                ("partial", entry(Tier::Unsupported, "partial function application")),
                ("lambda", entry(Tier::Unsupported, "user-defined function")),
                ("transform", entry(Tier::Unsupported, "`|…|…|` transform operator")),
            ])
        })
        .get(kind)
}

/// Classification of a binary operator, keyed by its source spelling.
pub fn classify_operator(op: &str) -> Option<&'static Classification> {
    static TABLE: OnceLock<HashMap<&'static str, Classification>> = OnceLock::new();
    TABLE
        .get_or_init(|| {
            HashMap::from([
                ("=", entry(Tier::Full, "comparison")),
                ("!=", entry(Tier::Full, "comparison, renders as <>")),
                ("<", entry(Tier::Full, "comparison")),
                ("<=", entry(Tier::Full, "comparison")),
                (">", entry(Tier::Full, "comparison")),
                (">=", entry(Tier::Full, "comparison")),
                ("and", entry(Tier::Full, "boolean connective")),
                ("or", entry(Tier::Full, "boolean connective")),
                ("in", entry(Tier::Full, "membership, renders as IN (…)")),
                ("&", entry(Tier::Full, "string concatenation, renders as ||")),
                ("+", entry(Tier::Full, "arithmetic")),
                ("-", entry(Tier::Full, "arithmetic")),
                ("*", entry(Tier::Full, "arithmetic")),
                ("/", entry(Tier::Full, "arithmetic")),
                ("%", entry(Tier::Full, "arithmetic modulo")),
                (
                    "..",
                    entry_with(
                        Tier::Partial,
                        "range",
                        &["only meaningful inside an index filter"],
                    ),
                ),
            ])
        })
        .get(op)
}

/// Classification of a path extension, keyed by [Stage::name].
///
/// [Stage::name]: jsonata_sql_parser::parser::pr::Stage::name
pub fn classify_path_extension(name: &str) -> Option<&'static Classification> {
    static TABLE: OnceLock<HashMap<&'static str, Classification>> = OnceLock::new();
    TABLE
        .get_or_init(|| {
            HashMap::from([
                (
                    "filter",
                    entry(Tier::Full, "predicate, index or slice filter"),
                ),
                ("sort", entry(Tier::Full, "multi-key ORDER BY")),
                (
                    "focus-bind",
                    entry_with(
                        Tier::Contextual,
                        "binds the current row for correlated subqueries",
                        &["the bound name resolves only inside the same compile"],
                    ),
                ),
                ("index-bind", entry(Tier::Unsupported, "`#$var` index binding")),
            ])
        })
        .get(name)
}
