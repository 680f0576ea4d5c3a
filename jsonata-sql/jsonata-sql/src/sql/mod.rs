//! Translation of the parsed expression tree into SQL.

pub mod ast;
pub mod context;
pub mod gen_expr;
pub mod gen_query;
pub mod gen_subquery;

pub use ast::{SelectQuery, SqlFragment};
pub use context::Context;
pub use gen_expr::{translate_expr, TranslationResult};
pub use gen_query::compile_query;
