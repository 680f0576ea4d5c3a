//! # jsonata-sql
//!
//! Compiler from a restricted JSONata-like query language to relational SQL,
//! resolved against a caller-declared [Schema].
//!
//! ```
//! use jsonata_sql::{compile, Options, Schema};
//!
//! let schema = Schema::from_json(
//!     r#"{
//!     "tables": {
//!         "pubs": {
//!             "table": "pubs",
//!             "fields": {
//!                 "title": { "column": "title", "type": "text" },
//!                 "views": { "column": "views", "type": "integer" }
//!             }
//!         }
//!     }
//! }"#,
//! )
//! .unwrap();
//!
//! let query = compile("pubs[views > 100]", &schema, &Options::default()).unwrap();
//! assert_eq!(query.sql, "SELECT * FROM pubs AS t0 WHERE t0.views > 100");
//! ```
//!
//! Callers validating user-authored expressions should run [validate] first
//! and block on its errors; [compile] fails fast on the first unresolvable
//! construct and never returns partially-built SQL.

#![forbid(unsafe_code)]

pub mod classify;
pub mod functions;
pub mod schema;
pub mod sql;
pub mod validate;

pub use jsonata_sql_parser::error;
pub use jsonata_sql_parser::parse;
pub use jsonata_sql_parser::parser::pr;
pub use jsonata_sql_parser::span::Span;

pub use jsonata_sql_parser::error::{Error, Errors, MessageKind, Reason, WithErrorInfo};
pub use schema::Schema;
pub use validate::{validate, ValidationIssue, ValidationResult};

use log::debug;

pub type Result<T, E = Error> = core::result::Result<T, E>;

/// A compiled statement: the SQL text plus the names behind its `$1`, `$2`,
/// … placeholders, in order.
#[derive(Debug, Clone, PartialEq)]
pub struct CompiledQuery {
    pub sql: String,
    pub params: Vec<String>,
}

/// Compilation options.
#[derive(Debug, Clone, Default)]
pub struct Options {
    /// Reformat the generated SQL across multiple lines. Off by default;
    /// the raw rendering is single-line and byte-stable.
    pub format: bool,
}

impl Options {
    pub fn with_format(mut self) -> Self {
        self.format = true;
        self
    }
}

/// Compile an expression against a schema into one SELECT statement.
pub fn compile(expr: &str, schema: &Schema, options: &Options) -> Result<CompiledQuery, Errors> {
    let ast = parse(expr)?;
    let (query, params) = sql::compile_query(&ast, schema).map_err(Errors::from)?;
    let mut sql = query.render();
    debug!("compiled `{expr}` to `{sql}`");
    if options.format {
        sql = sqlformat::format(
            &sql,
            &sqlformat::QueryParams::default(),
            sqlformat::FormatOptions::default(),
        );
    }
    Ok(CompiledQuery { sql, params })
}
