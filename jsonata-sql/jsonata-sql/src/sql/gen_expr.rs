//! Recursive translation of one AST node into a column reference, a rendered
//! SQL fragment, or a composable sub-select.

use itertools::Itertools;

use jsonata_sql_parser::parser::pr::{BinaryOp, Expr, ExprKind, Literal, Path};

use crate::classify::classify_node;
use crate::error::{Error, Reason, WithErrorInfo};
use crate::functions::function_mapping;
use crate::sql::ast::{quote_string, strength, SelectQuery, SqlFragment};
use crate::sql::context::Context;
use crate::sql::gen_subquery::{build_nested_query, build_scalar_subquery, is_root_rooted};
use crate::Result;

/// Every translation step yields exactly one of these; every consumer
/// matches all three.
#[derive(Debug, Clone, PartialEq)]
pub enum TranslationResult {
    /// A column of an aliased table. `column` of `None` is the whole row,
    /// as produced by the context variable and focus bindings.
    Reference {
        alias: String,
        column: Option<String>,
    },
    /// A rendered SQL expression.
    Expression(SqlFragment),
    /// A composable sub-select.
    Query(SelectQuery),
}

impl TranslationResult {
    pub fn into_fragment(self) -> Result<SqlFragment> {
        match self {
            TranslationResult::Reference {
                alias,
                column: Some(column),
            } => Ok(SqlFragment::atom(format!("{alias}.{column}"))),
            TranslationResult::Reference { alias, column: None } => Err(Error::new_simple(
                format!("row reference `{alias}` cannot be used as a scalar value"),
            )),
            TranslationResult::Expression(fragment) => Ok(fragment),
            TranslationResult::Query(query) => Ok(SqlFragment::atom(query.render_scalar())),
        }
    }

    pub fn embed(self, parent_strength: u8) -> Result<String> {
        Ok(self.into_fragment()?.embed(parent_strength))
    }
}

pub fn translate_expr(expr: &Expr, ctx: &mut Context) -> Result<TranslationResult> {
    translate_kind(expr, ctx).with_span_fallback(expr.span)
}

fn translate_kind(expr: &Expr, ctx: &mut Context) -> Result<TranslationResult> {
    match &expr.kind {
        ExprKind::Literal(literal) => Ok(TranslationResult::Expression(translate_literal(literal))),

        ExprKind::Name(name) => translate_name(name, ctx),

        ExprKind::Variable(name) => match name.as_str() {
            "" => Ok(TranslationResult::Reference {
                alias: ctx.current_alias.clone(),
                column: None,
            }),
            "$" => Err(Error::new_simple(
                "the query root `$$` must be followed by a table name",
            )),
            _ => {
                if let Some(bound) = ctx.variables.get(name) {
                    Ok(bound.clone())
                } else {
                    let placeholder = ctx.bind_param(name);
                    Ok(TranslationResult::Expression(SqlFragment::atom(placeholder)))
                }
            }
        },

        ExprKind::Path(path) => translate_value_path(path, ctx),

        ExprKind::Binary { op, left, right } => translate_binary(*op, left, right, ctx),

        ExprKind::Negate(operand) => {
            let sql = translate_expr(operand, ctx)?.embed(strength::UNARY)?;
            Ok(TranslationResult::Expression(SqlFragment::new(
                format!("-{sql}"),
                strength::UNARY,
            )))
        }

        ExprKind::Array(items) => {
            let mut rendered = Vec::with_capacity(items.len());
            for item in items {
                rendered.push(translate_expr(item, ctx)?.into_fragment()?.into_text());
            }
            Ok(TranslationResult::Expression(SqlFragment::atom(format!(
                "ARRAY[{}]",
                rendered.join(", ")
            ))))
        }

        ExprKind::Object(_) => Err(Error::new_simple(
            "object constructors are only supported as a path's final projection step",
        )),

        ExprKind::Function { callee, args } => translate_function(callee, args, ctx),

        ExprKind::Condition {
            condition,
            then,
            otherwise,
        } => {
            let cond = translate_expr(condition, ctx)?.into_fragment()?.into_text();
            let then = translate_expr(then, ctx)?.into_fragment()?.into_text();
            let text = match otherwise {
                Some(otherwise) => {
                    let other = translate_expr(otherwise, ctx)?.into_fragment()?.into_text();
                    format!("CASE WHEN {cond} THEN {then} ELSE {other} END")
                }
                None => format!("CASE WHEN {cond} THEN {then} END"),
            };
            Ok(TranslationResult::Expression(SqlFragment::atom(text)))
        }

        ExprKind::Block(exprs) => {
            let mut result = None;
            for inner in exprs {
                result = Some(translate_expr(inner, ctx)?);
            }
            result.ok_or_else(|| Error::new_simple("a block must contain at least one expression"))
        }

        ExprKind::Bind { name, value } => {
            let result = translate_expr(value, ctx)?;
            ctx.variables.insert(name.clone(), result.clone());
            Ok(result)
        }

        ExprKind::Range { .. } => Err(Error::new_simple(
            "a range is only meaningful inside an index filter, e.g. `items[[0..9]]`",
        )),

        kind @ (ExprKind::Wildcard
        | ExprKind::Descendant
        | ExprKind::Parent
        | ExprKind::Apply { .. }
        | ExprKind::Partial { .. }
        | ExprKind::Lambda { .. }
        | ExprKind::Transform { .. }) => Err(unsupported(kind)),
    }
}

fn translate_literal(literal: &Literal) -> SqlFragment {
    match literal {
        Literal::Null => SqlFragment::atom("NULL"),
        Literal::Boolean(true) => SqlFragment::atom("TRUE"),
        Literal::Boolean(false) => SqlFragment::atom("FALSE"),
        Literal::Integer(value) => SqlFragment::atom(value.to_string()),
        Literal::Float(value) => SqlFragment::atom(value.to_string()),
        Literal::String(value) => SqlFragment::atom(quote_string(value)),
    }
}

fn translate_name(name: &str, ctx: &mut Context) -> Result<TranslationResult> {
    if let Some(field) = ctx.schema.field(&ctx.current_table, name) {
        return Ok(TranslationResult::Reference {
            alias: ctx.current_alias.clone(),
            column: Some(field.column.clone()),
        });
    }
    if ctx.schema.relation(&ctx.current_table, name).is_some() {
        return Err(Error::new_simple(format!(
            "relation `{name}` is not a value; select one of its fields"
        )));
    }
    if ctx.schema.table(name).is_some() {
        return Err(Error::new_simple(format!(
            "table `{name}` cannot be used as a value here"
        )));
    }
    Err(Error::new(Reason::NotFound {
        name: name.to_string(),
        namespace: format!("field of table `{}`", ctx.current_table),
    }))
}

/// Walk a non-root-rooted path as a value: relation steps become joins, the
/// final step must land on a field.
fn translate_value_path(path: &Path, ctx: &mut Context) -> Result<TranslationResult> {
    if is_root_rooted(path, ctx) {
        return build_nested_query(path, ctx);
    }

    let mut cursor_alias = ctx.current_alias.clone();
    let mut cursor_table = ctx.current_table.clone();

    for (i, step) in path.steps.iter().enumerate() {
        if !step.stages.is_empty() {
            return Err(Error::new_simple(format!(
                "a {} stage is only supported on the query's base table or inside a nested query",
                step.stages[0].name()
            ))
            .with_span(step.base.span));
        }
        let last = i + 1 == path.steps.len();

        match &step.base.kind {
            ExprKind::Variable(_) if i == 0 => {
                match translate_kind(&step.base, ctx).with_span_fallback(step.base.span)? {
                    TranslationResult::Reference {
                        alias,
                        column: None,
                    } => {
                        cursor_table = ctx
                            .alias_tables
                            .get(&alias)
                            .cloned()
                            .ok_or_else(|| {
                                Error::new_assert(format!("alias `{alias}` has no table"))
                            })?;
                        if last {
                            return Ok(TranslationResult::Reference {
                                alias,
                                column: None,
                            });
                        }
                        cursor_alias = alias;
                    }
                    other if last => return Ok(other),
                    _ => {
                        return Err(Error::new_simple(
                            "cannot traverse into a scalar value",
                        )
                        .with_span(step.base.span))
                    }
                }
            }
            ExprKind::Name(name) => {
                if let Some(field) = ctx.schema.field(&cursor_table, name) {
                    if !last {
                        return Err(Error::new_simple(format!(
                            "field `{name}` is a scalar and cannot be traversed into"
                        ))
                        .with_span(step.base.span));
                    }
                    return Ok(TranslationResult::Reference {
                        alias: cursor_alias,
                        column: Some(field.column.clone()),
                    });
                }
                if ctx.schema.relation(&cursor_table, name).is_some() {
                    if last {
                        return Err(Error::new_simple(format!(
                            "relation `{name}` is not a value; select one of its fields"
                        ))
                        .with_span(step.base.span));
                    }
                    let target_alias = ctx.ensure_join(&cursor_alias, name)?;
                    cursor_table = ctx
                        .alias_tables
                        .get(&target_alias)
                        .cloned()
                        .ok_or_else(|| Error::new_assert("join target alias has no table"))?;
                    cursor_alias = target_alias;
                } else {
                    return Err(Error::new(Reason::NotFound {
                        name: name.clone(),
                        namespace: format!("field or relation of table `{cursor_table}`"),
                    })
                    .with_span(step.base.span));
                }
            }
            kind => {
                return Err(Error::new_simple(format!(
                    "a `{}` cannot appear as a path step here",
                    kind.name()
                ))
                .with_span(step.base.span))
            }
        }
    }

    Err(Error::new_assert("path walk fell through without a result"))
}

fn translate_binary(
    op: BinaryOp,
    left: &Expr,
    right: &Expr,
    ctx: &mut Context,
) -> Result<TranslationResult> {
    use strength::*;

    // `in` takes a list or a nested query on the right, not a scalar.
    if op == BinaryOp::In {
        let left_sql = translate_expr(left, ctx)?.embed(COMPARISON)?;
        let right_sql = match &right.kind {
            ExprKind::Array(items) => {
                let mut rendered = Vec::with_capacity(items.len());
                for item in items {
                    rendered.push(translate_expr(item, ctx)?.into_fragment()?.into_text());
                }
                rendered.join(", ")
            }
            _ => match translate_expr(right, ctx)? {
                TranslationResult::Query(query) => query.render(),
                _ => {
                    return Err(Error::new_simple(
                        "the right side of `in` must be an array or a nested query",
                    )
                    .with_span(right.span))
                }
            },
        };
        return Ok(TranslationResult::Expression(SqlFragment::new(
            format!("{left_sql} IN ({right_sql})"),
            COMPARISON,
        )));
    }

    // (sql spelling, strength, extra strength for the right operand of
    // non-associative operators)
    let (sql_op, op_strength, right_extra) = match op {
        BinaryOp::Eq => ("=", COMPARISON, 1),
        BinaryOp::Ne => ("<>", COMPARISON, 1),
        BinaryOp::Lt => ("<", COMPARISON, 1),
        BinaryOp::Le => ("<=", COMPARISON, 1),
        BinaryOp::Gt => (">", COMPARISON, 1),
        BinaryOp::Ge => (">=", COMPARISON, 1),
        BinaryOp::And => ("AND", AND, 0),
        BinaryOp::Or => ("OR", OR, 0),
        BinaryOp::Concat => ("||", ADDITIVE, 0),
        BinaryOp::Add => ("+", ADDITIVE, 0),
        BinaryOp::Sub => ("-", ADDITIVE, 1),
        BinaryOp::Mul => ("*", MULTIPLICATIVE, 0),
        BinaryOp::Div => ("/", MULTIPLICATIVE, 1),
        BinaryOp::Mod => ("%", MULTIPLICATIVE, 1),
        BinaryOp::In => return Err(Error::new_assert("`in` handled above")),
    };

    let left_sql = translate_expr(left, ctx)?.embed(op_strength)?;
    let right_sql = translate_expr(right, ctx)?.embed(op_strength + right_extra)?;
    Ok(TranslationResult::Expression(SqlFragment::new(
        format!("{left_sql} {sql_op} {right_sql}"),
        op_strength,
    )))
}

fn translate_function(callee: &Expr, args: &[Expr], ctx: &mut Context) -> Result<TranslationResult> {
    let name = match &callee.kind {
        ExprKind::Variable(name) if !name.is_empty() && name != "$" => name.clone(),
        _ => {
            return Err(Error::new_simple(
                "only direct `$name(…)` function calls are supported",
            )
            .with_span(callee.span))
        }
    };

    let Some(mapping) = function_mapping(&name) else {
        return Err(Error::new(Reason::NotFound {
            name: format!("${name}"),
            namespace: "function".to_string(),
        })
        .with_span(callee.span)
        .push_hint("see the function mapping table for the supported set"));
    };

    if let Some(aggregate) = mapping.aggregate {
        if args.len() != 1 {
            return Err(Error::new_simple(format!(
                "`${name}` takes 1 argument, got {}",
                args.len()
            )));
        }
        return build_scalar_subquery(aggregate, &args[0], ctx);
    }

    let Some((_, template)) = mapping.templates.iter().find(|(arity, _)| *arity == args.len())
    else {
        let arities = mapping.templates.iter().map(|(arity, _)| arity).join(" or ");
        return Err(Error::new_simple(format!(
            "`${name}` takes {arities} argument(s), got {}",
            args.len()
        )));
    };

    // Inside a function's own parentheses any fragment embeds bare; only
    // templates whose result is an operator expression need protection.
    let arg_strength = if mapping.strength == strength::ATOM {
        0
    } else {
        mapping.strength
    };

    let mut rendered = template.to_string();
    for (i, arg) in args.iter().enumerate() {
        let mut fragment = translate_expr(arg, ctx)?.into_fragment()?;
        if mapping.one_based_arg == Some(i) {
            fragment = shift_one_based(fragment);
        }
        rendered = rendered.replace(&format!("{{{i}}}"), &fragment.embed(arg_strength));
    }
    Ok(TranslationResult::Expression(SqlFragment::new(
        rendered,
        mapping.strength,
    )))
}

/// Shift a 0-based source index to SQL's 1-based indexing. Constant indices
/// fold; anything else gains an explicit `+ 1`.
fn shift_one_based(fragment: SqlFragment) -> SqlFragment {
    match fragment.text.parse::<i64>() {
        Ok(value) => SqlFragment::atom((value + 1).to_string()),
        Err(_) => SqlFragment::atom(format!("({} + 1)", fragment.text)),
    }
}

fn unsupported(kind: &ExprKind) -> Error {
    let name = kind.name();
    let mut error = Error::new_simple(format!("`{name}` is not supported"));
    if let Some(classification) = classify_node(name) {
        error = error.push_hint(classification.notes);
    }
    error
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::schema::Schema;

    fn schema() -> Schema {
        Schema::from_json(
            r#"{
            "tables": {
                "pubs": {
                    "table": "pubs",
                    "fields": {
                        "id": { "column": "id", "type": "integer" },
                        "title": { "column": "title", "type": "text" },
                        "status": { "column": "status", "type": "text" },
                        "views": { "column": "views", "type": "integer" }
                    },
                    "relations": {
                        "author": {
                            "target": "authors",
                            "foreignKey": "author_id",
                            "targetKey": "id",
                            "type": "one"
                        }
                    }
                },
                "authors": {
                    "table": "authors",
                    "fields": {
                        "id": { "column": "id", "type": "integer" },
                        "name": { "column": "name", "type": "text" }
                    }
                }
            }
        }"#,
        )
        .unwrap()
    }

    fn translate(source: &str) -> String {
        let schema = schema();
        let mut ctx = Context::root(&schema, "pubs").unwrap();
        let expr = jsonata_sql_parser::parse(source).unwrap();
        translate_expr(&expr, &mut ctx)
            .unwrap()
            .into_fragment()
            .unwrap()
            .into_text()
    }

    fn translate_err(source: &str) -> Error {
        let schema = schema();
        let mut ctx = Context::root(&schema, "pubs").unwrap();
        let expr = jsonata_sql_parser::parse(source).unwrap();
        translate_expr(&expr, &mut ctx).unwrap_err()
    }

    #[test]
    fn literals_inline() {
        assert_eq!(translate("42"), "42");
        assert_eq!(translate("true"), "TRUE");
        assert_eq!(translate("null"), "NULL");
        assert_eq!(translate(r#""it's""#), "'it''s'");
    }

    #[test]
    fn fields_resolve_to_the_current_alias() {
        assert_eq!(translate("title"), "t0.title");
        assert_eq!(translate(r#"status = "published""#), "t0.status = 'published'");
    }

    #[test]
    fn relation_paths_join() {
        assert_eq!(translate("author.name"), "t1.name");
    }

    #[test]
    fn connective_precedence() {
        assert_eq!(
            translate("(views = 1 or views = 2) and views < 9"),
            "(t0.views = 1 OR t0.views = 2) AND t0.views < 9"
        );
        assert_eq!(
            translate("views = 1 or views = 2 and views < 9"),
            "t0.views = 1 OR t0.views = 2 AND t0.views < 9"
        );
    }

    #[test]
    fn arithmetic_and_concat() {
        assert_eq!(translate("(views + 1) * 2"), "(t0.views + 1) * 2");
        assert_eq!(translate("views - (views - 1)"), "t0.views - (t0.views - 1)");
        assert_eq!(translate(r#"title & "!""#), "t0.title || '!'");
    }

    #[test]
    fn in_renders_lists() {
        assert_eq!(
            translate(r#"status in ["draft", "published"]"#),
            "t0.status IN ('draft', 'published')"
        );
    }

    #[test]
    fn functions_render_templates() {
        assert_eq!(translate("$lowercase(title)"), "LOWER(t0.title)");
        assert_eq!(translate("$exists(title)"), "t0.title IS NOT NULL");
        assert_eq!(
            translate(r#"$contains(title, "x")"#),
            "POSITION('x' IN t0.title) > 0"
        );
    }

    #[test]
    fn substring_shifts_to_one_based() {
        assert_eq!(
            translate("$substring(title, 0, 5)"),
            "SUBSTRING(t0.title FROM 1 FOR 5)"
        );
        assert_eq!(
            translate("$substring(title, views)"),
            "SUBSTRING(t0.title FROM (t0.views + 1))"
        );
    }

    #[test]
    fn ternary_nests_as_case() {
        assert_eq!(
            translate(r#"views > 9 ? "hot" : views > 1 ? "warm" : "cold""#),
            "CASE WHEN t0.views > 9 THEN 'hot' \
             ELSE CASE WHEN t0.views > 1 THEN 'warm' ELSE 'cold' END END"
        );
    }

    #[test]
    fn aggregate_builds_scalar_subquery() {
        assert_eq!(
            translate("views > $average(pubs.views)"),
            "t0.views > (SELECT AVG(s1_0.views) FROM pubs AS s1_0)"
        );
    }

    #[test]
    fn unbound_variables_become_parameters() {
        assert_eq!(translate("views > $threshold"), "t0.views > $1");
    }

    #[test]
    fn block_bindings_resolve() {
        assert_eq!(translate("($x := 5; views > $x)"), "t0.views > 5");
    }

    #[test]
    fn unknown_names_and_functions_fail() {
        assert!(matches!(translate_err("nope").reason, Reason::NotFound { .. }));
        assert!(matches!(
            translate_err("$nope(title)").reason,
            Reason::NotFound { .. }
        ));
        let err = translate_err("$lowercase(title, title)");
        assert!(err.to_string().contains("argument"));
    }

    #[test]
    fn unsupported_kinds_abort() {
        assert!(translate_err("a ~> $f()").to_string().contains("apply"));
        assert!(translate_err("$substring(?, 0, 5)")
            .to_string()
            .contains("partial"));
    }
}
