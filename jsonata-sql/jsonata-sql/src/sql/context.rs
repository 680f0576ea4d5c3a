//! Per-compile mutable state.
//!
//! One root context per `compile()` call; every nested subquery gets a child
//! with its own alias counter and deeper nesting level, so aliases generated
//! in a child can never collide with the parent's.

use std::collections::HashMap;

use log::debug;

use crate::schema::Schema;
use crate::sql::ast::{JoinClause, SelectQuery};
use crate::sql::gen_expr::TranslationResult;
use crate::Result;

pub struct Context<'a> {
    pub schema: &'a Schema,
    pub query: SelectQuery,
    /// Logical name of the table the current row context refers to.
    pub current_table: String,
    pub current_alias: String,
    pub depth: usize,
    /// Variable name → result it resolves to. Includes `@$var` focus
    /// bindings and `$name := expr` block bindings.
    pub variables: HashMap<String, TranslationResult>,
    /// Alias → logical table name, for resolving fields against any alias
    /// in scope (including inherited outer aliases).
    pub alias_tables: HashMap<String, String>,
    /// Parameter names in `$1`, `$2`, … order.
    pub params: Vec<String>,
    alias_counter: usize,
    /// (source alias, relation name) → target alias, for join de-duplication.
    joined: HashMap<(String, String), String>,
}

impl<'a> Context<'a> {
    /// Root context for a top-level compile, positioned on `table`.
    pub fn root(schema: &'a Schema, table: &str) -> Result<Self> {
        let physical = schema.expect_table(table)?.table.clone();
        let mut ctx = Context {
            schema,
            query: SelectQuery::default(),
            current_table: table.to_string(),
            current_alias: String::new(),
            depth: 0,
            variables: HashMap::new(),
            alias_tables: HashMap::new(),
            params: Vec::new(),
            alias_counter: 0,
            joined: HashMap::new(),
        };
        let alias = ctx.fresh_alias();
        ctx.alias_tables.insert(alias.clone(), table.to_string());
        ctx.query = SelectQuery::new(physical, alias.clone());
        ctx.current_alias = alias;
        Ok(ctx)
    }

    /// Child context for a nested subquery positioned on `table`. Inherits
    /// variable bindings and alias resolution so inner expressions can
    /// correlate against outer rows, but owns a fresh alias counter.
    pub fn child(&self, table: &str) -> Result<Context<'a>> {
        let physical = self.schema.expect_table(table)?.table.clone();
        let mut ctx = Context {
            schema: self.schema,
            query: SelectQuery::default(),
            current_table: table.to_string(),
            current_alias: String::new(),
            depth: self.depth + 1,
            variables: self.variables.clone(),
            alias_tables: self.alias_tables.clone(),
            params: self.params.clone(),
            alias_counter: 0,
            joined: HashMap::new(),
        };
        let alias = ctx.fresh_alias();
        ctx.alias_tables.insert(alias.clone(), table.to_string());
        ctx.query = SelectQuery::new(physical, alias.clone());
        ctx.current_alias = alias;
        Ok(ctx)
    }

    /// Merge parameter state back from a finished child context.
    pub fn absorb(&mut self, child: Context<'a>) {
        self.params = child.params;
    }

    /// Next alias in this context. Depth is baked into nested aliases so a
    /// child can never shadow an inherited outer alias.
    pub fn fresh_alias(&mut self) -> String {
        let n = self.alias_counter;
        self.alias_counter += 1;
        if self.depth == 0 {
            format!("t{n}")
        } else {
            format!("s{}_{n}", self.depth)
        }
    }

    /// Register `name` as a bound parameter and return its `$n` placeholder.
    pub fn bind_param(&mut self, name: &str) -> String {
        if let Some(pos) = self.params.iter().position(|p| p == name) {
            return format!("${}", pos + 1);
        }
        self.params.push(name.to_string());
        format!("${}", self.params.len())
    }

    /// Ensure a LEFT JOIN over `relation` out of `src_alias` exists, reusing
    /// the join when the same relation was already traversed from the same
    /// alias. Returns the target table's alias.
    pub fn ensure_join(&mut self, src_alias: &str, relation: &str) -> Result<String> {
        let key = (src_alias.to_string(), relation.to_string());
        if let Some(alias) = self.joined.get(&key) {
            return Ok(alias.clone());
        }
        let src_table = self.alias_tables.get(src_alias).cloned().ok_or_else(|| {
            crate::error::Error::new_assert(format!("alias `{src_alias}` has no table"))
        })?;
        let rel = self.schema.expect_relation(&src_table, relation)?.clone();
        let target = self.schema.expect_table(&rel.target)?;
        let alias = self.fresh_alias();
        debug!(
            "joining {} as {} via relation {}",
            target.table, alias, relation
        );
        self.query.joins.push(JoinClause {
            table: target.table.clone(),
            alias: alias.clone(),
            on: format!(
                "{src_alias}.{} = {alias}.{}",
                rel.foreign_key, rel.target_key
            ),
        });
        self.alias_tables.insert(alias.clone(), rel.target.clone());
        self.joined.insert(key, alias.clone());
        Ok(alias)
    }
}
