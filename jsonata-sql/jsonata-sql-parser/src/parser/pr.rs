//! Parsed representation: a closed union of expression node kinds.
//!
//! Every consumer matches exhaustively on [ExprKind], so extending the
//! language surface forces the validator and translator to take a position
//! on the new construct at compile time.

use enum_as_inner::EnumAsInner;
use serde::Serialize;

use crate::span::Span;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Expr {
    pub kind: ExprKind,
    pub span: Option<Span>,
}

impl Expr {
    pub fn new(kind: ExprKind, span: Span) -> Self {
        Expr {
            kind,
            span: Some(span),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, EnumAsInner)]
pub enum ExprKind {
    Literal(Literal),
    /// A bare field, relation or table name.
    Name(String),
    /// `$name`; `""` is the context variable `$`, `"$"` is the query root `$$`.
    Variable(String),
    Path(Path),
    Binary {
        op: BinaryOp,
        left: Box<Expr>,
        right: Box<Expr>,
    },
    Negate(Box<Expr>),
    /// `[a, b, c]` array constructor.
    Array(Vec<Expr>),
    /// `{ "key": value, … }` object constructor.
    Object(Vec<(Expr, Expr)>),
    Function {
        callee: Box<Expr>,
        args: Vec<Expr>,
    },
    /// A call with `?` placeholder arguments; `None` marks a placeholder.
    Partial {
        callee: Box<Expr>,
        args: Vec<Option<Expr>>,
    },
    Condition {
        condition: Box<Expr>,
        then: Box<Expr>,
        otherwise: Option<Box<Expr>>,
    },
    /// `( a; b; c )` — bindings evaluate left to right, the last expression
    /// is the block's value.
    Block(Vec<Expr>),
    /// `$name := value`.
    Bind {
        name: String,
        value: Box<Expr>,
    },
    /// `a..b`, only meaningful inside an index filter.
    Range {
        start: Box<Expr>,
        end: Box<Expr>,
    },
    Wildcard,
    Descendant,
    Parent,
    Apply {
        left: Box<Expr>,
        right: Box<Expr>,
    },
    Lambda {
        params: Vec<String>,
        body: Box<Expr>,
    },
    Transform {
        pattern: Box<Expr>,
        update: Box<Expr>,
        delete: Option<Box<Expr>>,
    },
}

impl ExprKind {
    /// Node kind name as used by the classification tables and diagnostics.
    pub fn name(&self) -> &'static str {
        match self {
            ExprKind::Literal(_) => "literal",
            ExprKind::Name(_) => "name",
            ExprKind::Variable(_) => "variable",
            ExprKind::Path(_) => "path",
            ExprKind::Binary { .. } => "binary",
            ExprKind::Negate(_) | ExprKind::Array(_) | ExprKind::Object(_) => "unary",
            ExprKind::Function { .. } => "function",
            ExprKind::Partial { .. } => "partial",
            ExprKind::Condition { .. } => "condition",
            ExprKind::Block(_) => "block",
            ExprKind::Bind { .. } => "bind",
            ExprKind::Range { .. } => "range",
            ExprKind::Wildcard => "wildcard",
            ExprKind::Descendant => "descendant",
            ExprKind::Parent => "parent",
            ExprKind::Apply { .. } => "apply",
            ExprKind::Lambda { .. } => "lambda",
            ExprKind::Transform { .. } => "transform",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum Literal {
    Null,
    Boolean(bool),
    Integer(i64),
    Float(f64),
    String(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum BinaryOp {
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    And,
    Or,
    In,
    Concat,
    Add,
    Sub,
    Mul,
    Div,
    Mod,
}

impl BinaryOp {
    /// Source spelling, which is also the key into the operator
    /// classification table.
    pub fn as_str(&self) -> &'static str {
        match self {
            BinaryOp::Eq => "=",
            BinaryOp::Ne => "!=",
            BinaryOp::Lt => "<",
            BinaryOp::Le => "<=",
            BinaryOp::Gt => ">",
            BinaryOp::Ge => ">=",
            BinaryOp::And => "and",
            BinaryOp::Or => "or",
            BinaryOp::In => "in",
            BinaryOp::Concat => "&",
            BinaryOp::Add => "+",
            BinaryOp::Sub => "-",
            BinaryOp::Mul => "*",
            BinaryOp::Div => "/",
            BinaryOp::Mod => "%",
        }
    }
}

/// A location path: one step per `.`-separated segment, each carrying the
/// stages (filters, sorts, bindings) written against it.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Path {
    pub steps: Vec<PathStep>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PathStep {
    pub base: Expr,
    pub stages: Vec<Stage>,
}

/// A path extension attached to a step.
#[derive(Debug, Clone, PartialEq, Serialize, EnumAsInner)]
pub enum Stage {
    /// `[expr]` — a predicate, or an index/slice when the payload is numeric.
    Filter(Expr),
    /// `^(>a, <b)`.
    Sort(Vec<SortTerm>),
    /// `@$var` focus binding.
    FocusBind(String),
    /// `#$var` index binding.
    IndexBind(String),
}

impl Stage {
    /// Key into the path-extension classification table.
    pub fn name(&self) -> &'static str {
        match self {
            Stage::Filter(_) => "filter",
            Stage::Sort(_) => "sort",
            Stage::FocusBind(_) => "focus-bind",
            Stage::IndexBind(_) => "index-bind",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SortTerm {
    pub expr: Expr,
    pub direction: SortDirection,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum SortDirection {
    Asc,
    Desc,
}
