//! Top-down operator-precedence parser for the JSONata expression grammar.
//!
//! Binding powers follow the reference grammar: `[`/`(` 80, `.`/`^` 75,
//! multiplicative 60, additive and `&` 50, comparisons/`in`/`~>` 40, `and`
//! 30, `or` 25, `?`/`..` 20, `:=` 10.

pub mod pr;

use crate::error::{Error, Errors, Reason, WithErrorInfo};
use crate::lexer::{lex, Token, TokenKind};
use crate::span::Span;
use pr::*;

/// Parse a source expression into its AST.
pub fn parse(source: &str) -> Result<Expr, Errors> {
    let tokens = lex(source)?;
    let end = source.chars().count();
    let mut parser = Parser { tokens, pos: 0, end };
    let expr = parser.parse_expr(0).map_err(Errors::from)?;
    if let Some(tok) = parser.peek_token() {
        return Err(Errors::from(
            Error::new(Reason::Expected {
                who: None,
                expected: "end of input".to_string(),
                found: describe(&tok.kind),
            })
            .with_span(Some(tok.span)),
        ));
    }
    Ok(expr)
}

struct Parser {
    tokens: Vec<Token>,
    pos: usize,
    end: usize,
}

fn binding_power(kind: &TokenKind) -> u8 {
    use TokenKind::*;
    match kind {
        LBracket | LParen | At | Hash => 80,
        Dot | Caret => 75,
        Star | Slash | Percent => 60,
        Plus | Minus | Amp => 50,
        Eq | Ne | Lt | Le | Gt | Ge | In | Apply => 40,
        And => 30,
        Or => 25,
        Question | Range => 20,
        Bind => 10,
        _ => 0,
    }
}

fn binary_op(kind: &TokenKind) -> Option<BinaryOp> {
    Some(match kind {
        TokenKind::Eq => BinaryOp::Eq,
        TokenKind::Ne => BinaryOp::Ne,
        TokenKind::Lt => BinaryOp::Lt,
        TokenKind::Le => BinaryOp::Le,
        TokenKind::Gt => BinaryOp::Gt,
        TokenKind::Ge => BinaryOp::Ge,
        TokenKind::And => BinaryOp::And,
        TokenKind::Or => BinaryOp::Or,
        TokenKind::In => BinaryOp::In,
        TokenKind::Amp => BinaryOp::Concat,
        TokenKind::Plus => BinaryOp::Add,
        TokenKind::Minus => BinaryOp::Sub,
        TokenKind::Star => BinaryOp::Mul,
        TokenKind::Slash => BinaryOp::Div,
        TokenKind::Percent => BinaryOp::Mod,
        _ => return None,
    })
}

fn describe(kind: &TokenKind) -> String {
    format!("{kind:?}")
}

impl Parser {
    fn peek_token(&self) -> Option<&Token> {
        self.tokens.get(self.pos)
    }

    fn peek(&self) -> Option<&TokenKind> {
        self.peek_token().map(|t| &t.kind)
    }

    fn peek_at(&self, offset: usize) -> Option<&TokenKind> {
        self.tokens.get(self.pos + offset).map(|t| &t.kind)
    }

    fn advance(&mut self) -> Token {
        let tok = self.tokens[self.pos].clone();
        self.pos += 1;
        tok
    }

    fn at(&self, kind: &TokenKind) -> bool {
        self.peek() == Some(kind)
    }

    fn eat(&mut self, kind: &TokenKind) -> bool {
        if self.at(kind) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn expect(&mut self, kind: TokenKind, who: &str) -> Result<Token, Error> {
        match self.peek_token() {
            Some(tok) if tok.kind == kind => Ok(self.advance()),
            Some(tok) => Err(Error::new(Reason::Expected {
                who: Some(who.to_string()),
                expected: describe(&kind),
                found: describe(&tok.kind),
            })
            .with_span(Some(tok.span))),
            None => Err(self.eof(&describe(&kind))),
        }
    }

    fn eof(&self, expected: &str) -> Error {
        Error::new(Reason::Expected {
            who: None,
            expected: expected.to_string(),
            found: "end of input".to_string(),
        })
        .with_span(Some(Span::new(self.end, self.end)))
    }

    fn parse_expr(&mut self, rbp: u8) -> Result<Expr, Error> {
        let mut left = self.parse_prefix()?;
        while self.peek().map(binding_power).unwrap_or(0) > rbp {
            left = self.parse_infix(left)?;
        }
        Ok(left)
    }

    fn parse_prefix(&mut self) -> Result<Expr, Error> {
        let Some(tok) = self.peek_token() else {
            return Err(self.eof("an expression"));
        };
        let span = tok.span;
        let tok = self.advance();

        let kind = match tok.kind {
            TokenKind::Int(v) => ExprKind::Literal(Literal::Integer(v)),
            TokenKind::Float(v) => ExprKind::Literal(Literal::Float(v)),
            TokenKind::Str(v) => ExprKind::Literal(Literal::String(v)),
            TokenKind::Bool(v) => ExprKind::Literal(Literal::Boolean(v)),
            TokenKind::Null => ExprKind::Literal(Literal::Null),
            TokenKind::Ident(name) => ExprKind::Name(name),
            TokenKind::Variable(name) => ExprKind::Variable(name),
            TokenKind::Minus => {
                let operand = self.parse_expr(70)?;
                // Fold negated numeric literals so index filters see them.
                match operand.kind {
                    ExprKind::Literal(Literal::Integer(v)) => {
                        ExprKind::Literal(Literal::Integer(-v))
                    }
                    ExprKind::Literal(Literal::Float(v)) => ExprKind::Literal(Literal::Float(-v)),
                    _ => ExprKind::Negate(Box::new(operand)),
                }
            }
            TokenKind::LParen => return self.parse_block(span),
            TokenKind::LBracket => return self.parse_array(span),
            TokenKind::LBrace => return self.parse_object(span),
            TokenKind::Star => ExprKind::Wildcard,
            TokenKind::Descendant => ExprKind::Descendant,
            TokenKind::Percent => ExprKind::Parent,
            TokenKind::Function => return self.parse_lambda(span),
            TokenKind::Pipe => return self.parse_transform(span),
            other => {
                return Err(Error::new(Reason::Expected {
                    who: None,
                    expected: "an expression".to_string(),
                    found: describe(&other),
                })
                .with_span(Some(span)))
            }
        };
        Ok(Expr::new(kind, span))
    }

    fn parse_block(&mut self, start: Span) -> Result<Expr, Error> {
        let mut exprs = Vec::new();
        if !self.at(&TokenKind::RParen) {
            loop {
                exprs.push(self.parse_expr(0)?);
                if !self.eat(&TokenKind::Semicolon) {
                    break;
                }
                if self.at(&TokenKind::RParen) {
                    break;
                }
            }
        }
        let end = self.expect(TokenKind::RParen, "block")?;
        let span = Span::new(start.start, end.span.end);
        // A parenthesized single expression is just grouping, unless it binds
        // a variable (then block scoping matters to the consumer).
        if exprs.len() == 1 && !matches!(exprs[0].kind, ExprKind::Bind { .. }) {
            return Ok(exprs.into_iter().next().expect("just checked length"));
        }
        Ok(Expr::new(ExprKind::Block(exprs), span))
    }

    fn parse_array(&mut self, start: Span) -> Result<Expr, Error> {
        let mut items = Vec::new();
        if !self.at(&TokenKind::RBracket) {
            loop {
                items.push(self.parse_expr(0)?);
                if !self.eat(&TokenKind::Comma) {
                    break;
                }
            }
        }
        let end = self.expect(TokenKind::RBracket, "array constructor")?;
        Ok(Expr::new(
            ExprKind::Array(items),
            Span::new(start.start, end.span.end),
        ))
    }

    fn parse_object(&mut self, start: Span) -> Result<Expr, Error> {
        let mut pairs = Vec::new();
        if !self.at(&TokenKind::RBrace) {
            loop {
                let key = self.parse_expr(0)?;
                self.expect(TokenKind::Colon, "object constructor")?;
                let value = self.parse_expr(0)?;
                pairs.push((key, value));
                if !self.eat(&TokenKind::Comma) {
                    break;
                }
            }
        }
        let end = self.expect(TokenKind::RBrace, "object constructor")?;
        Ok(Expr::new(
            ExprKind::Object(pairs),
            Span::new(start.start, end.span.end),
        ))
    }

    fn parse_lambda(&mut self, start: Span) -> Result<Expr, Error> {
        self.expect(TokenKind::LParen, "lambda")?;
        let mut params = Vec::new();
        if !self.at(&TokenKind::RParen) {
            loop {
                match self.peek_token() {
                    Some(Token {
                        kind: TokenKind::Variable(_),
                        ..
                    }) => {
                        let tok = self.advance();
                        if let TokenKind::Variable(name) = tok.kind {
                            params.push(name);
                        }
                    }
                    Some(tok) => {
                        return Err(Error::new(Reason::Expected {
                            who: Some("lambda".to_string()),
                            expected: "a parameter variable".to_string(),
                            found: describe(&tok.kind),
                        })
                        .with_span(Some(tok.span)))
                    }
                    None => return Err(self.eof("a parameter variable")),
                }
                if !self.eat(&TokenKind::Comma) {
                    break;
                }
            }
        }
        self.expect(TokenKind::RParen, "lambda")?;
        self.expect(TokenKind::LBrace, "lambda")?;
        let body = self.parse_expr(0)?;
        let end = self.expect(TokenKind::RBrace, "lambda")?;
        Ok(Expr::new(
            ExprKind::Lambda {
                params,
                body: Box::new(body),
            },
            Span::new(start.start, end.span.end),
        ))
    }

    fn parse_transform(&mut self, start: Span) -> Result<Expr, Error> {
        let pattern = self.parse_expr(0)?;
        self.expect(TokenKind::Pipe, "transform")?;
        let update = self.parse_expr(0)?;
        let delete = if self.eat(&TokenKind::Comma) {
            Some(Box::new(self.parse_expr(0)?))
        } else {
            None
        };
        let end = self.expect(TokenKind::Pipe, "transform")?;
        Ok(Expr::new(
            ExprKind::Transform {
                pattern: Box::new(pattern),
                update: Box::new(update),
                delete,
            },
            Span::new(start.start, end.span.end),
        ))
    }

    fn parse_infix(&mut self, left: Expr) -> Result<Expr, Error> {
        let tok = self.advance();
        let op_span = tok.span;

        match tok.kind {
            TokenKind::Dot => {
                let right = self.parse_expr(75)?;
                Ok(path_append(left, right))
            }
            TokenKind::LBracket => {
                // `a[]` is the array-keep marker; it has no relational
                // meaning, so it parses to nothing.
                if self.eat(&TokenKind::RBracket) {
                    return Ok(left);
                }
                let filter = self.parse_expr(0)?;
                let end = self.expect(TokenKind::RBracket, "filter")?;
                Ok(attach_stage(
                    left,
                    Stage::Filter(filter),
                    Span::new(op_span.start, end.span.end),
                ))
            }
            TokenKind::Caret => {
                self.expect(TokenKind::LParen, "sort")?;
                let mut terms = Vec::new();
                loop {
                    let direction = if self.eat(&TokenKind::Gt) {
                        SortDirection::Desc
                    } else {
                        self.eat(&TokenKind::Lt);
                        SortDirection::Asc
                    };
                    let expr = self.parse_expr(0)?;
                    terms.push(SortTerm { expr, direction });
                    if !self.eat(&TokenKind::Comma) {
                        break;
                    }
                }
                let end = self.expect(TokenKind::RParen, "sort")?;
                Ok(attach_stage(
                    left,
                    Stage::Sort(terms),
                    Span::new(op_span.start, end.span.end),
                ))
            }
            TokenKind::LParen => self.parse_call(left),
            TokenKind::At => {
                let name = self.expect_variable("focus binding")?;
                Ok(attach_stage(left, Stage::FocusBind(name), op_span))
            }
            TokenKind::Hash => {
                let name = self.expect_variable("index binding")?;
                Ok(attach_stage(left, Stage::IndexBind(name), op_span))
            }
            TokenKind::Question => {
                let then = self.parse_expr(0)?;
                let otherwise = if self.eat(&TokenKind::Colon) {
                    Some(Box::new(self.parse_expr(0)?))
                } else {
                    None
                };
                let span = Span::union(
                    left.span,
                    otherwise
                        .as_ref()
                        .map(|e| e.span)
                        .unwrap_or(then.span)
                        .or(Some(op_span)),
                );
                Ok(Expr {
                    kind: ExprKind::Condition {
                        condition: Box::new(left),
                        then: Box::new(then),
                        otherwise,
                    },
                    span,
                })
            }
            TokenKind::Bind => {
                let name = match left.kind {
                    ExprKind::Variable(name) => name,
                    _ => {
                        return Err(Error::new_simple(
                            "only variables can be bound with `:=`",
                        )
                        .with_span(left.span))
                    }
                };
                let value = self.parse_expr(9)?;
                let span = Span::union(left.span.or(Some(op_span)), value.span);
                Ok(Expr {
                    kind: ExprKind::Bind {
                        name,
                        value: Box::new(value),
                    },
                    span,
                })
            }
            TokenKind::Range => {
                let end = self.parse_expr(20)?;
                let span = Span::union(left.span, end.span);
                Ok(Expr {
                    kind: ExprKind::Range {
                        start: Box::new(left),
                        end: Box::new(end),
                    },
                    span,
                })
            }
            TokenKind::Apply => {
                let right = self.parse_expr(40)?;
                let span = Span::union(left.span, right.span);
                Ok(Expr {
                    kind: ExprKind::Apply {
                        left: Box::new(left),
                        right: Box::new(right),
                    },
                    span,
                })
            }
            other => match binary_op(&other) {
                Some(op) => {
                    let right = self.parse_expr(binding_power(&other))?;
                    let span = Span::union(left.span, right.span);
                    Ok(Expr {
                        kind: ExprKind::Binary {
                            op,
                            left: Box::new(left),
                            right: Box::new(right),
                        },
                        span,
                    })
                }
                None => Err(Error::new_assert(format!(
                    "token {other:?} has a binding power but no infix rule"
                ))
                .with_span(Some(op_span))),
            },
        }
    }

    fn parse_call(&mut self, callee: Expr) -> Result<Expr, Error> {
        let mut args: Vec<Option<Expr>> = Vec::new();
        if !self.at(&TokenKind::RParen) {
            loop {
                let is_placeholder = self.at(&TokenKind::Question)
                    && matches!(
                        self.peek_at(1),
                        Some(TokenKind::Comma) | Some(TokenKind::RParen)
                    );
                if is_placeholder {
                    self.advance();
                    args.push(None);
                } else {
                    args.push(Some(self.parse_expr(0)?));
                }
                if !self.eat(&TokenKind::Comma) {
                    break;
                }
            }
        }
        let end = self.expect(TokenKind::RParen, "function call")?;
        let span = Span::union(callee.span, Some(end.span));

        if args.iter().any(Option::is_none) {
            Ok(Expr {
                kind: ExprKind::Partial {
                    callee: Box::new(callee),
                    args,
                },
                span,
            })
        } else {
            Ok(Expr {
                kind: ExprKind::Function {
                    callee: Box::new(callee),
                    args: args.into_iter().flatten().collect(),
                },
                span,
            })
        }
    }

    fn expect_variable(&mut self, who: &str) -> Result<String, Error> {
        match self.peek_token() {
            Some(Token {
                kind: TokenKind::Variable(_),
                ..
            }) => {
                let tok = self.advance();
                match tok.kind {
                    TokenKind::Variable(name) => Ok(name),
                    _ => unreachable!("peeked a variable token"),
                }
            }
            Some(tok) => Err(Error::new(Reason::Expected {
                who: Some(who.to_string()),
                expected: "a variable".to_string(),
                found: describe(&tok.kind),
            })
            .with_span(Some(tok.span))),
            None => Err(self.eof("a variable")),
        }
    }
}

fn into_path(expr: Expr) -> (Path, Option<Span>) {
    let span = expr.span;
    match expr.kind {
        ExprKind::Path(path) => (path, span),
        kind => (
            Path {
                steps: vec![PathStep {
                    base: Expr { kind, span },
                    stages: vec![],
                }],
            },
            span,
        ),
    }
}

fn path_append(left: Expr, right: Expr) -> Expr {
    let (mut path, left_span) = into_path(left);
    let right_span = right.span;
    match right.kind {
        ExprKind::Path(p) => path.steps.extend(p.steps),
        kind => path.steps.push(PathStep {
            base: Expr {
                kind,
                span: right_span,
            },
            stages: vec![],
        }),
    }
    Expr {
        kind: ExprKind::Path(path),
        span: Span::union(left_span, right_span),
    }
}

fn attach_stage(left: Expr, stage: Stage, op_span: Span) -> Expr {
    let (mut path, left_span) = into_path(left);
    path.steps
        .last_mut()
        .expect("a path always has at least one step")
        .stages
        .push(stage);
    Expr {
        kind: ExprKind::Path(path),
        span: Span::union(left_span, Some(op_span)),
    }
}

#[cfg(test)]
mod test {
    use super::*;

    fn parse_ok(source: &str) -> Expr {
        parse(source).unwrap()
    }

    #[test]
    fn parse_bare_name() {
        assert_eq!(parse_ok("pubs").kind, ExprKind::Name("pubs".to_string()));
    }

    #[test]
    fn parse_filter_attaches_to_last_step() {
        let expr = parse_ok(r#"pubs[status = "published"]"#);
        let path = expr.kind.as_path().unwrap();
        assert_eq!(path.steps.len(), 1);
        assert_eq!(path.steps[0].base.kind, ExprKind::Name("pubs".to_string()));
        let filter = path.steps[0].stages[0].as_filter().unwrap();
        assert!(matches!(
            filter.kind,
            ExprKind::Binary {
                op: BinaryOp::Eq,
                ..
            }
        ));
    }

    #[test]
    fn parse_chained_filters_stay_on_one_step() {
        let expr = parse_ok("pubs[a][b]");
        let path = expr.kind.as_path().unwrap();
        assert_eq!(path.steps.len(), 1);
        assert_eq!(path.steps[0].stages.len(), 2);
    }

    #[test]
    fn parse_sort_and_slice() {
        let expr = parse_ok("pubs^(>views)[[0..9]]");
        let path = expr.kind.as_path().unwrap();
        let stages = &path.steps[0].stages;
        let terms = stages[0].as_sort().unwrap();
        assert_eq!(terms[0].direction, SortDirection::Desc);
        assert_eq!(terms[0].expr.kind, ExprKind::Name("views".to_string()));
        let slice = stages[1].as_filter().unwrap();
        let items = slice.kind.as_array().unwrap();
        assert!(matches!(items[0].kind, ExprKind::Range { .. }));
    }

    #[test]
    fn parse_projection_step() {
        let expr = parse_ok(r#"pubs.{ "t": title, "a": author.name }"#);
        let path = expr.kind.as_path().unwrap();
        assert_eq!(path.steps.len(), 2);
        let pairs = path.steps[1].base.kind.as_object().unwrap();
        assert_eq!(pairs.len(), 2);
        assert!(pairs[1].1.kind.is_path());
    }

    #[test]
    fn parse_precedence_and_or() {
        // `a = 1 or b = 2 and c = 3` — `and` binds tighter than `or`.
        let expr = parse_ok("a = 1 or b = 2 and c = 3");
        let (op, _, right) = expr.kind.as_binary().unwrap();
        assert_eq!(*op, BinaryOp::Or);
        let (op, _, _) = right.kind.as_binary().unwrap();
        assert_eq!(*op, BinaryOp::And);
    }

    #[test]
    fn parse_function_call_and_apply() {
        let expr = parse_ok("$lowercase(name)");
        let (callee, args) = expr.kind.as_function().unwrap();
        assert_eq!(callee.kind, ExprKind::Variable("lowercase".to_string()));
        assert_eq!(args.len(), 1);

        let expr = parse_ok("a ~> $f()");
        assert!(expr.kind.is_apply());
    }

    #[test]
    fn parse_partial_application_placeholder() {
        let expr = parse_ok("$substring(?, 0, 5)");
        let (_, args) = expr.kind.as_partial().unwrap();
        assert_eq!(args.len(), 3);
        assert!(args[0].is_none());
        assert!(args[1].is_some());
    }

    #[test]
    fn parse_block_bindings() {
        let expr = parse_ok("($x := 5; pubs[views > $x])");
        let exprs = expr.kind.as_block().unwrap();
        assert_eq!(exprs.len(), 2);
        assert!(matches!(exprs[0].kind, ExprKind::Bind { .. }));

        // grouping without a binding is transparent
        let expr = parse_ok("(a + b) * c");
        let (op, _, _) = expr.kind.as_binary().unwrap();
        assert_eq!(*op, BinaryOp::Mul);
    }

    #[test]
    fn parse_ternary_nests_in_else() {
        let expr = parse_ok(r#"a ? "x" : b ? "y" : "z""#);
        let (_, _, otherwise) = expr.kind.as_condition().unwrap();
        assert!(otherwise.as_ref().unwrap().kind.is_condition());
    }

    #[test]
    fn parse_negative_literal_folds() {
        let expr = parse_ok("items[-1]");
        let path = expr.kind.as_path().unwrap();
        let filter = path.steps[0].stages[0].as_filter().unwrap();
        assert_eq!(filter.kind, ExprKind::Literal(Literal::Integer(-1)));
    }

    #[test]
    fn parse_unsupported_constructs() {
        assert!(parse_ok("user.*").kind.is_path());
        assert!(parse_ok("a.**.b").kind.is_path());
        assert!(parse_ok("%.price").kind.is_path());
        assert!(parse_ok("function($x){ $x }").kind.is_lambda());
        assert!(parse_ok("a ~> |b|{ \"c\": 1 }|").kind.is_apply());
    }

    #[test]
    fn parse_root_variable() {
        let expr = parse_ok("$$.pubs[id = 1]");
        let path = expr.kind.as_path().unwrap();
        assert_eq!(
            path.steps[0].base.kind,
            ExprKind::Variable("$".to_string())
        );
        assert_eq!(path.steps[1].base.kind, ExprKind::Name("pubs".to_string()));
    }

    #[test]
    fn parse_reports_position() {
        let err = parse("a = ").unwrap_err();
        let e = &err.0[0];
        assert!(e.span.is_some());
    }

    #[test]
    fn parse_trailing_tokens_rejected() {
        assert!(parse("a b").is_err());
    }
}
