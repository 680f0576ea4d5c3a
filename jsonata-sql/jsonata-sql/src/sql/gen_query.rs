//! The top-level path compiler: drives a full path expression (table →
//! filters → sort → limit/offset → projection) into one SELECT.

use log::debug;

use jsonata_sql_parser::parser::pr::{
    Expr, ExprKind, Literal, Path, PathStep, SortTerm, Stage,
};

use crate::error::{Error, Reason, WithErrorInfo};
use crate::schema::Schema;
use crate::sql::ast::{OrderByItem, SelectItem, SelectQuery};
use crate::sql::context::Context;
use crate::sql::gen_expr::{translate_expr, TranslationResult};
use crate::sql::gen_subquery::{path_root, wrap_array_projection};
use crate::Result;

/// Compile a parsed expression into a SELECT plus the ordered list of bound
/// parameter names.
pub fn compile_query(expr: &Expr, schema: &Schema) -> Result<(SelectQuery, Vec<String>)> {
    match &expr.kind {
        // `table` alone selects everything.
        ExprKind::Name(name) => {
            let ctx = Context::root(schema, name)
                .map_err(|e| e.with_span_fallback(expr.span))?;
            Ok((ctx.query, ctx.params))
        }
        ExprKind::Path(path) => compile_path(path, &[], schema),
        // `( $x := …; table[…] )` — bindings first, the last expression is
        // the query.
        ExprKind::Block(exprs) => {
            let Some((last, bindings)) = exprs.split_last() else {
                return Err(Error::new_simple("a block must contain at least one expression")
                    .with_span(expr.span));
            };
            match &last.kind {
                ExprKind::Path(path) => compile_path(path, bindings, schema),
                ExprKind::Name(name) => {
                    let path = Path {
                        steps: vec![PathStep {
                            base: Expr {
                                kind: ExprKind::Name(name.clone()),
                                span: last.span,
                            },
                            stages: vec![],
                        }],
                    };
                    compile_path(&path, bindings, schema)
                }
                kind => Err(Error::new_simple(format!(
                    "a block must end in a table path, found `{}`",
                    kind.name()
                ))
                .with_span(last.span)),
            }
        }
        kind => Err(Error::new_simple(format!(
            "expression must be a table path, found `{}`",
            kind.name()
        ))
        .with_span(expr.span)),
    }
}

fn compile_path(
    path: &Path,
    bindings: &[Expr],
    schema: &Schema,
) -> Result<(SelectQuery, Vec<String>)> {
    let (table, start) = path_root(path, schema)?;
    let mut ctx = Context::root(schema, &table)?;
    debug!("compiling path rooted on table `{table}` as {}", ctx.current_alias);

    for binding in bindings {
        if !binding.kind.is_bind() {
            return Err(Error::new_simple(
                "only `$name := …` bindings may precede the query expression",
            )
            .with_span(binding.span));
        }
        translate_expr(binding, &mut ctx)?;
    }

    apply_steps(&path.steps[start..], &mut ctx)?;
    Ok((ctx.query, ctx.params))
}

/// Walk path steps against a context already positioned on the root table:
/// process the root step's stages, then traverse relations, a final field
/// selection, or a final object projection.
pub(crate) fn apply_steps(steps: &[PathStep], ctx: &mut Context) -> Result<()> {
    for (i, step) in steps.iter().enumerate() {
        let last = i + 1 == steps.len();

        if i > 0 {
            match &step.base.kind {
                ExprKind::Name(name) => {
                    if ctx.schema.relation(&ctx.current_table, name).is_some() {
                        let src_alias = ctx.current_alias.clone();
                        let alias = ctx.ensure_join(&src_alias, name)?;
                        ctx.current_table = ctx
                            .alias_tables
                            .get(&alias)
                            .cloned()
                            .ok_or_else(|| Error::new_assert("join target alias has no table"))?;
                        ctx.current_alias = alias;
                    } else if let Some(field) = ctx.schema.field(&ctx.current_table, name) {
                        if !last {
                            return Err(Error::new_simple(format!(
                                "field `{name}` is a scalar and cannot be traversed into"
                            ))
                            .with_span(step.base.span));
                        }
                        if !step.stages.is_empty() {
                            return Err(Error::new_simple(
                                "stages cannot follow a field selection",
                            )
                            .with_span(step.base.span));
                        }
                        ctx.query.projection = vec![SelectItem::Expr {
                            sql: format!("{}.{}", ctx.current_alias, field.column),
                            alias: None,
                        }];
                        return Ok(());
                    } else {
                        return Err(Error::new(Reason::NotFound {
                            name: name.clone(),
                            namespace: format!(
                                "field or relation of table `{}`",
                                ctx.current_table
                            ),
                        })
                        .with_span(step.base.span));
                    }
                }
                ExprKind::Object(pairs) if last => {
                    if !step.stages.is_empty() {
                        return Err(Error::new_simple("stages cannot follow a projection")
                            .with_span(step.base.span));
                    }
                    return compile_projection(pairs, ctx);
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

        for stage in &step.stages {
            apply_stage(stage, ctx).with_span_fallback(step.base.span)?;
        }
    }
    Ok(())
}

/// What an `[…]` filter stage means once its payload shape is known.
enum FilterKind<'a> {
    Predicate(&'a Expr),
    Index(i64),
    Slice(i64, i64),
}

fn classify_filter(expr: &Expr) -> Result<FilterKind> {
    match &expr.kind {
        ExprKind::Literal(Literal::Integer(value)) => Ok(FilterKind::Index(*value)),
        ExprKind::Range { start, end } => classify_slice(start, end),
        // `[[a..b]]` parses as an array holding one range.
        ExprKind::Array(items) => match items.as_slice() {
            [Expr {
                kind: ExprKind::Range { start, end },
                ..
            }] => classify_slice(start, end),
            _ => Ok(FilterKind::Predicate(expr)),
        },
        _ => Ok(FilterKind::Predicate(expr)),
    }
}

fn classify_slice<'a>(start: &Expr, end: &Expr) -> Result<FilterKind<'a>> {
    let bound = |e: &Expr| match &e.kind {
        ExprKind::Literal(Literal::Integer(value)) => Ok(*value),
        kind => Err(Error::new_simple(format!(
            "slice bounds must be integer literals, found `{}`",
            kind.name()
        ))
        .with_span(e.span)),
    };
    Ok(FilterKind::Slice(bound(start)?, bound(end)?))
}

fn apply_stage(stage: &Stage, ctx: &mut Context) -> Result<()> {
    match stage {
        Stage::Filter(expr) => match classify_filter(expr)? {
            FilterKind::Predicate(predicate) => {
                let fragment = translate_expr(predicate, ctx)?.into_fragment()?;
                ctx.query.filters.push(fragment);
                Ok(())
            }
            FilterKind::Index(index) => {
                if index < 0 {
                    // Negative indexing needs a defined ordering to count
                    // back from; there is no sound default here.
                    return Err(Error::new_simple(
                        "negative index access is not supported",
                    )
                    .push_hint("sort explicitly in the inverse direction and index from 0")
                    .with_span(expr.span));
                }
                set_window(ctx, 1, index as u64, expr)
            }
            FilterKind::Slice(start, end) => {
                if start < 0 || end < start {
                    return Err(Error::new_simple(format!(
                        "invalid slice `[{start}..{end}]`"
                    ))
                    .with_span(expr.span));
                }
                set_window(ctx, (end - start + 1) as u64, start as u64, expr)
            }
        },
        Stage::Sort(terms) => apply_sort(terms, ctx),
        Stage::FocusBind(name) => {
            ctx.variables.insert(
                name.clone(),
                TranslationResult::Reference {
                    alias: ctx.current_alias.clone(),
                    column: None,
                },
            );
            Ok(())
        }
        Stage::IndexBind(_) => Err(Error::new_simple(
            "`#$var` index bindings are not supported",
        )),
    }
}

fn set_window(ctx: &mut Context, limit: u64, offset: u64, expr: &Expr) -> Result<()> {
    if ctx.query.limit.is_some() {
        return Err(
            Error::new_simple("an index or slice filter may only appear once")
                .with_span(expr.span),
        );
    }
    ctx.query.limit = Some(limit);
    ctx.query.offset = Some(offset);
    Ok(())
}

fn apply_sort(terms: &[SortTerm], ctx: &mut Context) -> Result<()> {
    if !ctx.query.order_by.is_empty() {
        return Err(Error::new_simple("a sort stage may only appear once"));
    }
    for term in terms {
        let sql = translate_expr(&term.expr, ctx)?.into_fragment()?.into_text();
        ctx.query.order_by.push(OrderByItem {
            sql,
            direction: term.direction,
        });
    }
    Ok(())
}

/// A terminal `{ "key": value, … }` step becomes the SELECT list. Nested
/// query values are wrapped as JSON arrays so each outer row projects a
/// (possibly empty) list.
fn compile_projection(pairs: &[(Expr, Expr)], ctx: &mut Context) -> Result<()> {
    if !ctx.query.projection.is_empty() {
        return Err(Error::new_simple("a projection may only appear once"));
    }
    for (key, value) in pairs {
        let name = match &key.kind {
            ExprKind::Literal(Literal::String(name)) => name.clone(),
            kind => {
                return Err(Error::new_simple(format!(
                    "projection keys must be string literals, found `{}`",
                    kind.name()
                ))
                .with_span(key.span))
            }
        };
        let sql = match translate_expr(value, ctx)? {
            TranslationResult::Query(query) => wrap_array_projection(&query),
            other => other
                .into_fragment()
                .with_span_fallback(value.span)?
                .into_text(),
        };
        ctx.query.projection.push(SelectItem::Expr {
            sql,
            alias: Some(name),
        });
    }
    Ok(())
}

#[cfg(test)]
mod test {
    use super::*;

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
                        "views": { "column": "views", "type": "integer" },
                        "author_id": { "column": "author_id", "type": "integer" }
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

    fn compile_sql(source: &str) -> String {
        let schema = schema();
        let expr = jsonata_sql_parser::parse(source).unwrap();
        compile_query(&expr, &schema).unwrap().0.render()
    }

    fn compile_err(source: &str) -> Error {
        let schema = schema();
        let expr = jsonata_sql_parser::parse(source).unwrap();
        compile_query(&expr, &schema).unwrap_err()
    }

    #[test]
    fn bare_table_selects_all() {
        assert_eq!(compile_sql("pubs"), "SELECT * FROM pubs AS t0");
        assert_eq!(compile_sql("$$.pubs"), "SELECT * FROM pubs AS t0");
    }

    #[test]
    fn chained_filters_and_combined() {
        assert_eq!(
            compile_sql(r#"pubs[status = "published"][views > 100]"#),
            "SELECT * FROM pubs AS t0 \
             WHERE t0.status = 'published' AND t0.views > 100"
        );
        assert_eq!(
            compile_sql(r#"pubs[status = "published" and views > 100]"#),
            "SELECT * FROM pubs AS t0 \
             WHERE t0.status = 'published' AND t0.views > 100"
        );
    }

    #[test]
    fn index_and_slice_windows() {
        assert_eq!(compile_sql("pubs[0]"), "SELECT * FROM pubs AS t0 LIMIT 1");
        assert_eq!(
            compile_sql("pubs[5]"),
            "SELECT * FROM pubs AS t0 LIMIT 1 OFFSET 5"
        );
        assert_eq!(
            compile_sql("pubs[[0..9]]"),
            "SELECT * FROM pubs AS t0 LIMIT 10"
        );
        assert_eq!(
            compile_sql("pubs[[10..19]]"),
            "SELECT * FROM pubs AS t0 LIMIT 10 OFFSET 10"
        );
    }

    #[test]
    fn negative_index_is_rejected() {
        let err = compile_err("pubs[-1]");
        assert!(err.to_string().contains("negative index"));
    }

    #[test]
    fn sort_precedes_limit() {
        assert_eq!(
            compile_sql("pubs^(>views)[[0..9]]"),
            "SELECT * FROM pubs AS t0 ORDER BY t0.views DESC LIMIT 10"
        );
        assert_eq!(
            compile_sql("pubs^(<title, >views)"),
            "SELECT * FROM pubs AS t0 ORDER BY t0.title ASC, t0.views DESC"
        );
    }

    #[test]
    fn projection_with_relation_join() {
        assert_eq!(
            compile_sql(r#"pubs.{ "title": title, "authorName": author.name }"#),
            "SELECT t0.title AS \"title\", t1.name AS \"authorName\" \
             FROM pubs AS t0 LEFT JOIN authors AS t1 ON t0.author_id = t1.id"
        );
    }

    #[test]
    fn relation_traversal_selects_target() {
        assert_eq!(
            compile_sql("pubs.author.name"),
            "SELECT t1.name FROM pubs AS t0 \
             LEFT JOIN authors AS t1 ON t0.author_id = t1.id"
        );
    }

    #[test]
    fn field_selection_projects_one_column() {
        assert_eq!(
            compile_sql("pubs.title"),
            "SELECT t0.title FROM pubs AS t0"
        );
    }

    #[test]
    fn aggregate_filter_builds_two_selects() {
        let sql = compile_sql("pubs[views > $average(pubs.views)]");
        assert_eq!(
            sql,
            "SELECT * FROM pubs AS t0 \
             WHERE t0.views > (SELECT AVG(s1_0.views) FROM pubs AS s1_0)"
        );
        assert_eq!(sql.matches("SELECT").count(), 2);
    }

    #[test]
    fn correlated_array_projection() {
        assert_eq!(
            compile_sql(
                r#"authors@$a.{ "name": name, "pubs": pubs[author_id = $a.id] }"#
            ),
            "SELECT t0.name AS \"name\", \
             COALESCE((SELECT json_agg(sub.*) FROM \
             (SELECT * FROM pubs AS s1_0 WHERE s1_0.author_id = t0.id) AS sub), '[]') \
             AS \"pubs\" FROM authors AS t0"
        );
    }

    #[test]
    fn block_bindings_feed_the_query() {
        let schema = schema();
        let expr =
            jsonata_sql_parser::parse("($min := 10; pubs[views > $min])").unwrap();
        let (query, params) = compile_query(&expr, &schema).unwrap();
        assert_eq!(
            query.render(),
            "SELECT * FROM pubs AS t0 WHERE t0.views > 10"
        );
        assert!(params.is_empty());
    }

    #[test]
    fn unbound_variables_surface_as_params() {
        let schema = schema();
        let expr = jsonata_sql_parser::parse("pubs[views > $threshold]").unwrap();
        let (query, params) = compile_query(&expr, &schema).unwrap();
        assert_eq!(
            query.render(),
            "SELECT * FROM pubs AS t0 WHERE t0.views > $1"
        );
        assert_eq!(params, vec!["threshold"]);
    }

    #[test]
    fn unknown_table_and_field_fail() {
        assert!(matches!(
            compile_err("missing[x = 1]").reason,
            Reason::NotFound { .. }
        ));
        assert!(matches!(
            compile_err("pubs[missing = 1]").reason,
            Reason::NotFound { .. }
        ));
    }

    #[test]
    fn duplicate_windows_and_sorts_fail() {
        assert!(compile_err("pubs[0][1]").to_string().contains("once"));
        assert!(compile_err("pubs^(>views)^(<title)")
            .to_string()
            .contains("once"));
    }

    #[test]
    fn end_to_end_pipeline() {
        assert_eq!(
            compile_sql(
                r#"pubs[status="published"]^(>views)[[0..9]].{"title":title,"authorName":author.name}"#
            ),
            "SELECT t0.title AS \"title\", t1.name AS \"authorName\" \
             FROM pubs AS t0 LEFT JOIN authors AS t1 ON t0.author_id = t1.id \
             WHERE t0.status = 'published' ORDER BY t0.views DESC LIMIT 10"
        );
    }
}
