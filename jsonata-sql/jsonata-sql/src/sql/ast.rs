//! Rendered SQL building blocks.
//!
//! Fragments carry a binding strength so composition can parenthesize
//! exactly when the surrounding operator binds tighter, instead of wrapping
//! everything defensively.

use itertools::Itertools;

use jsonata_sql_parser::parser::pr::SortDirection;

/// Binding strengths of rendered SQL operators. Larger binds tighter.
pub mod strength {
    pub const OR: u8 = 25;
    pub const AND: u8 = 30;
    pub const COMPARISON: u8 = 40;
    pub const ADDITIVE: u8 = 50;
    pub const MULTIPLICATIVE: u8 = 60;
    pub const UNARY: u8 = 90;
    pub const ATOM: u8 = 100;
}

/// A rendered SQL expression plus the binding strength of its top-level
/// operator.
#[derive(Debug, Clone, PartialEq)]
pub struct SqlFragment {
    pub text: String,
    pub strength: u8,
}

impl SqlFragment {
    pub fn new<S: Into<String>>(text: S, strength: u8) -> Self {
        SqlFragment {
            text: text.into(),
            strength,
        }
    }

    /// An expression that never needs parenthesizing (literal, column
    /// reference, function call, already-parenthesized subquery).
    pub fn atom<S: Into<String>>(text: S) -> Self {
        SqlFragment::new(text, strength::ATOM)
    }

    /// Render for embedding under an operator of the given strength,
    /// parenthesizing when this fragment binds more loosely.
    pub fn embed(&self, parent_strength: u8) -> String {
        if self.strength < parent_strength {
            format!("({})", self.text)
        } else {
            self.text.clone()
        }
    }

    pub fn into_text(self) -> String {
        self.text
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum SelectItem {
    Wildcard,
    Expr { sql: String, alias: Option<String> },
}

#[derive(Debug, Clone, PartialEq)]
pub struct JoinClause {
    pub table: String,
    pub alias: String,
    pub on: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct OrderByItem {
    pub sql: String,
    pub direction: SortDirection,
}

/// One SELECT statement under construction. Rendering is deterministic:
/// clause order is fixed regardless of the order stages appeared in the
/// source expression.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct SelectQuery {
    pub projection: Vec<SelectItem>,
    pub from_table: String,
    pub from_alias: String,
    pub joins: Vec<JoinClause>,
    pub filters: Vec<SqlFragment>,
    pub order_by: Vec<OrderByItem>,
    pub limit: Option<u64>,
    pub offset: Option<u64>,
}

impl SelectQuery {
    pub fn new<T: Into<String>, A: Into<String>>(table: T, alias: A) -> Self {
        SelectQuery {
            from_table: table.into(),
            from_alias: alias.into(),
            ..Default::default()
        }
    }

    pub fn render(&self) -> String {
        let mut sql = String::from("SELECT ");

        if self.projection.is_empty() {
            sql.push('*');
        } else {
            let items = self
                .projection
                .iter()
                .map(|item| match item {
                    SelectItem::Wildcard => format!("{}.*", self.from_alias),
                    SelectItem::Expr { sql, alias: None } => sql.clone(),
                    SelectItem::Expr {
                        sql,
                        alias: Some(alias),
                    } => format!("{sql} AS {}", quote_ident(alias)),
                })
                .join(", ");
            sql.push_str(&items);
        }

        sql.push_str(&format!(" FROM {} AS {}", self.from_table, self.from_alias));

        for join in &self.joins {
            sql.push_str(&format!(
                " LEFT JOIN {} AS {} ON {}",
                join.table, join.alias, join.on
            ));
        }

        if !self.filters.is_empty() {
            let conditions = self
                .filters
                .iter()
                .map(|f| f.embed(strength::AND))
                .join(" AND ");
            sql.push_str(&format!(" WHERE {conditions}"));
        }

        if !self.order_by.is_empty() {
            let terms = self
                .order_by
                .iter()
                .map(|item| {
                    let dir = match item.direction {
                        SortDirection::Asc => "ASC",
                        SortDirection::Desc => "DESC",
                    };
                    format!("{} {dir}", item.sql)
                })
                .join(", ");
            sql.push_str(&format!(" ORDER BY {terms}"));
        }

        if let Some(limit) = self.limit {
            sql.push_str(&format!(" LIMIT {limit}"));
        }
        if let Some(offset) = self.offset {
            if offset > 0 {
                sql.push_str(&format!(" OFFSET {offset}"));
            }
        }

        sql
    }

    /// Render as a parenthesized scalar expression for embedding inside an
    /// enclosing statement.
    pub fn render_scalar(&self) -> String {
        format!("({})", self.render())
    }
}

/// Render a string literal with `'` doubling.
pub fn quote_string(value: &str) -> String {
    format!("'{}'", value.replace('\'', "''"))
}

/// Render a quoted identifier with `"` doubling.
pub fn quote_ident(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn embed_parenthesizes_looser_fragments() {
        let or = SqlFragment::new("a OR b", strength::OR);
        assert_eq!(or.embed(strength::AND), "(a OR b)");
        assert_eq!(or.embed(strength::OR), "a OR b");
        assert_eq!(SqlFragment::atom("t0.x").embed(strength::AND), "t0.x");
    }

    #[test]
    fn render_clause_order_is_fixed() {
        let mut query = SelectQuery::new("pubs", "t0");
        query.limit = Some(10);
        query.order_by.push(OrderByItem {
            sql: "t0.views".to_string(),
            direction: SortDirection::Desc,
        });
        query
            .filters
            .push(SqlFragment::new("t0.status = 'published'", strength::COMPARISON));
        assert_eq!(
            query.render(),
            "SELECT * FROM pubs AS t0 WHERE t0.status = 'published' \
             ORDER BY t0.views DESC LIMIT 10"
        );
    }

    #[test]
    fn render_joins_and_projection() {
        let mut query = SelectQuery::new("pubs", "t0");
        query.joins.push(JoinClause {
            table: "authors".to_string(),
            alias: "t1".to_string(),
            on: "t0.author_id = t1.id".to_string(),
        });
        query.projection.push(SelectItem::Expr {
            sql: "t0.title".to_string(),
            alias: Some("title".to_string()),
        });
        query.projection.push(SelectItem::Expr {
            sql: "t1.name".to_string(),
            alias: Some("authorName".to_string()),
        });
        assert_eq!(
            query.render(),
            "SELECT t0.title AS \"title\", t1.name AS \"authorName\" \
             FROM pubs AS t0 LEFT JOIN authors AS t1 ON t0.author_id = t1.id"
        );
    }

    #[test]
    fn render_omits_zero_offset() {
        let mut query = SelectQuery::new("pubs", "t0");
        query.limit = Some(1);
        query.offset = Some(0);
        assert_eq!(query.render(), "SELECT * FROM pubs AS t0 LIMIT 1");
        query.offset = Some(5);
        assert_eq!(query.render(), "SELECT * FROM pubs AS t0 LIMIT 1 OFFSET 5");
    }

    #[test]
    fn quoting_doubles_delimiters() {
        assert_eq!(quote_string("it's"), "'it''s'");
        assert_eq!(quote_ident("a\"b"), "\"a\"\"b\"");
    }
}
