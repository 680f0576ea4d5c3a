//! Synthesis of scalar, correlated and array-aggregating subqueries from
//! root-rooted path references.

use jsonata_sql_parser::parser::pr::{Expr, ExprKind, Path, PathStep};

use crate::error::{Error, WithErrorInfo};
use crate::schema::Schema;
use crate::sql::ast::{SelectItem, SelectQuery, SqlFragment};
use crate::sql::context::Context;
use crate::sql::gen_expr::TranslationResult;
use crate::sql::gen_query::apply_steps;
use crate::Result;

/// Whether a path starts a new query over a table instead of reading from
/// the current row. A bare name only counts when the current table does not
/// declare a field or relation of the same name.
pub(crate) fn is_root_rooted(path: &Path, ctx: &Context) -> bool {
    match path.steps.first().map(|step| &step.base.kind) {
        Some(ExprKind::Variable(name)) => name == "$",
        Some(ExprKind::Name(name)) => {
            ctx.schema.table(name).is_some()
                && ctx.schema.field(&ctx.current_table, name).is_none()
                && ctx.schema.relation(&ctx.current_table, name).is_none()
        }
        _ => false,
    }
}

/// Resolve the table a path is rooted on. Returns the table's logical name
/// and the index of the step carrying that table (its stages apply to the
/// new query).
pub(crate) fn path_root(path: &Path, schema: &Schema) -> Result<(String, usize)> {
    let first = path
        .steps
        .first()
        .ok_or_else(|| Error::new_assert("a path always has at least one step"))?;
    match &first.base.kind {
        ExprKind::Variable(name) if name == "$" => {
            if !first.stages.is_empty() {
                return Err(Error::new_simple(
                    "the query root `$$` cannot carry filters itself",
                )
                .with_span(first.base.span));
            }
            let second = path.steps.get(1).ok_or_else(|| {
                Error::new_simple("the query root `$$` must be followed by a table name")
                    .with_span(first.base.span)
            })?;
            match &second.base.kind {
                ExprKind::Name(name) => {
                    schema.expect_table(name).with_span(second.base.span)?;
                    Ok((name.clone(), 1))
                }
                kind => Err(Error::new_simple(format!(
                    "expected a table name after `$$`, found `{}`",
                    kind.name()
                ))
                .with_span(second.base.span)),
            }
        }
        ExprKind::Name(name) => {
            schema.expect_table(name).with_span(first.base.span)?;
            Ok((name.clone(), 0))
        }
        kind => Err(Error::new_simple(format!(
            "expected a table name, found `{}`",
            kind.name()
        ))
        .with_span(first.base.span)),
    }
}

/// Build a nested SELECT for a root-rooted path. The child context inherits
/// the caller's variable bindings and alias map, so conditions written
/// against a bound outer row correlate against the enclosing query.
pub(crate) fn build_nested_query(path: &Path, ctx: &mut Context) -> Result<TranslationResult> {
    let (table, start) = path_root(path, ctx.schema)?;
    let mut child = ctx.child(&table)?;
    apply_steps(&path.steps[start..], &mut child)?;
    let query = std::mem::take(&mut child.query);
    ctx.absorb(child);
    Ok(TranslationResult::Query(query))
}

/// Build `(SELECT AGG(col) FROM … [WHERE …])` for an aggregate applied to a
/// root-rooted path.
pub(crate) fn build_scalar_subquery(
    aggregate: &'static str,
    arg: &Expr,
    ctx: &mut Context,
) -> Result<TranslationResult> {
    let path = match &arg.kind {
        ExprKind::Path(path) => path.clone(),
        ExprKind::Name(name) if ctx.schema.table(name).is_some() => Path {
            steps: vec![PathStep {
                base: arg.clone(),
                stages: vec![],
            }],
        },
        _ => {
            return Err(Error::new_simple(format!(
                "`{aggregate}` requires a root-rooted path argument, e.g. `table.field`"
            ))
            .with_span(arg.span))
        }
    };

    let (table, start) = path_root(&path, ctx.schema)?;
    let mut child = ctx.child(&table)?;
    apply_steps(&path.steps[start..], &mut child)?;
    let mut query = std::mem::take(&mut child.query);
    ctx.absorb(child);

    let aggregated = match query.projection.as_slice() {
        [] if aggregate == "COUNT" => "COUNT(*)".to_string(),
        [] => {
            return Err(Error::new_simple(format!(
                "`{aggregate}` needs a column to aggregate, e.g. `table.field`"
            ))
            .with_span(arg.span))
        }
        [SelectItem::Expr { sql, alias: None }] => format!("{aggregate}({sql})"),
        _ => {
            return Err(Error::new_simple(format!(
                "`{aggregate}` aggregates exactly one column"
            ))
            .with_span(arg.span))
        }
    };
    query.projection = vec![SelectItem::Expr {
        sql: aggregated,
        alias: None,
    }];

    Ok(TranslationResult::Expression(SqlFragment::atom(
        query.render_scalar(),
    )))
}

/// Wrap a row-set subquery for use as a single projected column: rows with
/// no matches project an empty JSON array rather than null.
pub(crate) fn wrap_array_projection(query: &SelectQuery) -> String {
    format!(
        "COALESCE((SELECT json_agg(sub.*) FROM ({}) AS sub), '[]')",
        query.render()
    )
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::schema::Schema;
    use crate::sql::gen_expr::translate_expr;

    fn schema() -> Schema {
        Schema::from_json(
            r#"{
            "tables": {
                "pubs": {
                    "table": "pubs",
                    "fields": {
                        "id": { "column": "id", "type": "integer" },
                        "status": { "column": "status", "type": "text" },
                        "views": { "column": "views", "type": "integer" },
                        "author_id": { "column": "author_id", "type": "integer" }
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

    #[test]
    fn root_rooted_detection_respects_shadowing() {
        let schema = Schema::from_json(
            r#"{
            "tables": {
                "pubs": {
                    "table": "pubs",
                    "fields": { "authors": { "column": "authors", "type": "json" } }
                },
                "authors": { "table": "authors", "fields": {} }
            }
        }"#,
        )
        .unwrap();
        let ctx = Context::root(&schema, "pubs").unwrap();
        // `authors` is a field of pubs here, so it reads from the row.
        let expr = jsonata_sql_parser::parse("authors").unwrap();
        let path = Path {
            steps: vec![PathStep {
                base: expr,
                stages: vec![],
            }],
        };
        assert!(!is_root_rooted(&path, &ctx));
    }

    #[test]
    fn nested_query_from_filtered_root_path() {
        let schema = schema();
        let mut ctx = Context::root(&schema, "authors").unwrap();
        let expr = jsonata_sql_parser::parse(r#"pubs[status = "published"]"#).unwrap();
        let path = expr.kind.as_path().unwrap();
        let result = build_nested_query(path, &mut ctx).unwrap();
        let TranslationResult::Query(query) = result else {
            panic!("expected a query result");
        };
        assert_eq!(
            query.render(),
            "SELECT * FROM pubs AS s1_0 WHERE s1_0.status = 'published'"
        );
    }

    #[test]
    fn correlated_condition_references_outer_alias() {
        let schema = schema();
        let mut ctx = Context::root(&schema, "authors").unwrap();
        ctx.variables.insert(
            "a".to_string(),
            TranslationResult::Reference {
                alias: "t0".to_string(),
                column: None,
            },
        );
        let expr = jsonata_sql_parser::parse("pubs[author_id = $a.id]").unwrap();
        let path = expr.kind.as_path().unwrap();
        let TranslationResult::Query(query) = build_nested_query(path, &mut ctx).unwrap() else {
            panic!("expected a query result");
        };
        assert_eq!(
            query.render(),
            "SELECT * FROM pubs AS s1_0 WHERE s1_0.author_id = t0.id"
        );
    }

    #[test]
    fn count_without_a_column_is_count_star() {
        let schema = schema();
        let mut ctx = Context::root(&schema, "authors").unwrap();
        let expr = jsonata_sql_parser::parse("$count(pubs)").unwrap();
        let sql = translate_expr(&expr, &mut ctx)
            .unwrap()
            .into_fragment()
            .unwrap()
            .into_text();
        assert_eq!(sql, "(SELECT COUNT(*) FROM pubs AS s1_0)");
    }

    #[test]
    fn array_projection_wraps_with_coalesce() {
        let query = SelectQuery::new("pubs", "s1_0");
        assert_eq!(
            wrap_array_projection(&query),
            "COALESCE((SELECT json_agg(sub.*) FROM \
             (SELECT * FROM pubs AS s1_0) AS sub), '[]')"
        );
    }
}
