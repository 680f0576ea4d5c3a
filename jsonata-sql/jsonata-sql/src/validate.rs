//! Read-only subset validation.
//!
//! Walks an AST without translating it and reports which constructs fall
//! outside the supported subset. Intended as a pre-flight check for
//! user-authored expressions: callers block on `errors` and surface
//! `warnings` as advisory. This function never panics and never mutates
//! anything.

use serde::Serialize;

use jsonata_sql_parser::parser::pr::{Expr, ExprKind, Stage};
use jsonata_sql_parser::span::Span;

use crate::classify::{classify_node, classify_operator, classify_path_extension, Tier};
use crate::functions::function_mapping;

#[derive(Debug, Clone, Serialize)]
pub struct ValidationResult {
    pub valid: bool,
    pub errors: Vec<ValidationIssue>,
    pub warnings: Vec<String>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ValidationIssue {
    pub message: String,
    pub node_type: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub position: Option<usize>,
    /// Structural path to the offending node, e.g.
    /// `["binary", "rhs", "path", "steps[1]"]`.
    pub path: Vec<String>,
}

/// Validate a source expression against the classification tables.
pub fn validate(source: &str) -> ValidationResult {
    let mut validator = Validator::default();
    match jsonata_sql_parser::parse(source) {
        Ok(expr) => validator.walk(&expr),
        Err(errors) => {
            // Parse failures surface as a single issue per reported error.
            for error in errors.0 {
                validator.errors.push(ValidationIssue {
                    message: error.reason.to_string(),
                    node_type: "error".to_string(),
                    position: error.span.map(|span| span.start),
                    path: vec![],
                });
            }
        }
    }
    ValidationResult {
        valid: validator.errors.is_empty(),
        errors: validator.errors,
        warnings: validator.warnings,
    }
}

#[derive(Default)]
struct Validator {
    errors: Vec<ValidationIssue>,
    warnings: Vec<String>,
    trail: Vec<String>,
}

impl Validator {
    fn edge<F: FnOnce(&mut Self)>(&mut self, label: String, f: F) {
        self.trail.push(label);
        f(self);
        self.trail.pop();
    }

    /// Path to the node currently being visited, excluding its own kind.
    fn node_path(&self) -> Vec<String> {
        self.trail[..self.trail.len().saturating_sub(1)].to_vec()
    }

    fn walk(&mut self, expr: &Expr) {
        let name = expr.kind.name();
        self.trail.push(name.to_string());

        // Variables get bespoke handling instead of the generic CONTEXTUAL
        // warning: reserved names pass silently.
        if let ExprKind::Variable(var) = &expr.kind {
            match var.as_str() {
                "" | "$" | "input" => {}
                other => self.warnings.push(format!(
                    "variable `${other}` must be supplied as a query parameter \
                     or bound in a block"
                )),
            }
            self.trail.pop();
            return;
        }

        if let Some(classification) = classify_node(name) {
            match classification.tier {
                Tier::Unsupported => {
                    self.errors.push(ValidationIssue {
                        message: format!(
                            "`{name}` is not supported: {}",
                            classification.notes
                        ),
                        node_type: name.to_string(),
                        position: expr.span.map(|span| span.start),
                        path: self.node_path(),
                    });
                    // No recursion below an unsupported node; one error per
                    // offending subtree is enough.
                    self.trail.pop();
                    return;
                }
                Tier::Contextual => {
                    self.warnings.push(format!("`{name}`: {}", classification.notes));
                }
                Tier::Full | Tier::Partial => {}
            }
        }

        self.visit_children(expr);
        self.trail.pop();
    }

    fn visit_children(&mut self, expr: &Expr) {
        match &expr.kind {
            ExprKind::Literal(_) | ExprKind::Name(_) | ExprKind::Variable(_) => {}

            ExprKind::Path(path) => {
                for (i, step) in path.steps.iter().enumerate() {
                    self.edge(format!("steps[{i}]"), |v| v.walk(&step.base));
                    for (j, stage) in step.stages.iter().enumerate() {
                        self.visit_stage(stage, i, j, expr.span);
                    }
                }
            }

            ExprKind::Binary { op, left, right } => {
                if let Some(classification) = classify_operator(op.as_str()) {
                    if classification.tier == Tier::Unsupported {
                        self.errors.push(ValidationIssue {
                            message: format!(
                                "operator `{}` is not supported: {}",
                                op.as_str(),
                                classification.notes
                            ),
                            node_type: "binary".to_string(),
                            position: expr.span.map(|span| span.start),
                            path: self.node_path(),
                        });
                        return;
                    }
                }
                self.edge("lhs".to_string(), |v| v.walk(left));
                self.edge("rhs".to_string(), |v| v.walk(right));
            }

            ExprKind::Negate(operand) => {
                self.edge("operand".to_string(), |v| v.walk(operand));
            }

            ExprKind::Array(items) => {
                for (i, item) in items.iter().enumerate() {
                    self.edge(format!("items[{i}]"), |v| v.walk(item));
                }
            }

            ExprKind::Object(pairs) => {
                for (i, (key, value)) in pairs.iter().enumerate() {
                    self.edge(format!("pairs[{i}].key"), |v| v.walk(key));
                    self.edge(format!("pairs[{i}].value"), |v| v.walk(value));
                }
            }

            ExprKind::Function { callee, args } => {
                match &callee.kind {
                    ExprKind::Variable(name) if !name.is_empty() && name != "$" => {
                        // Unknown names are a warning, not an error: the
                        // subset is conservative but not closed-world.
                        if function_mapping(name).is_none() {
                            self.warnings.push(format!(
                                "unknown function `${name}`; it is not in the \
                                 supported mapping table"
                            ));
                        }
                    }
                    _ => {
                        self.errors.push(ValidationIssue {
                            message: "functions must be called directly as `$name(…)`"
                                .to_string(),
                            node_type: "function".to_string(),
                            position: expr.span.map(|span| span.start),
                            path: self.node_path(),
                        });
                    }
                }
                for (i, arg) in args.iter().enumerate() {
                    self.edge(format!("args[{i}]"), |v| v.walk(arg));
                }
            }

            ExprKind::Condition {
                condition,
                then,
                otherwise,
            } => {
                self.edge("condition".to_string(), |v| v.walk(condition));
                self.edge("then".to_string(), |v| v.walk(then));
                if let Some(otherwise) = otherwise {
                    self.edge("else".to_string(), |v| v.walk(otherwise));
                }
            }

            ExprKind::Block(exprs) => {
                for (i, inner) in exprs.iter().enumerate() {
                    self.edge(format!("exprs[{i}]"), |v| v.walk(inner));
                }
            }

            ExprKind::Bind { value, .. } => {
                self.edge("value".to_string(), |v| v.walk(value));
            }

            ExprKind::Range { start, end } => {
                self.edge("start".to_string(), |v| v.walk(start));
                self.edge("end".to_string(), |v| v.walk(end));
            }

            // Unsupported kinds were rejected in `walk` before recursion.
            ExprKind::Wildcard
            | ExprKind::Descendant
            | ExprKind::Parent
            | ExprKind::Apply { .. }
            | ExprKind::Partial { .. }
            | ExprKind::Lambda { .. }
            | ExprKind::Transform { .. } => {}
        }
    }

    fn visit_stage(&mut self, stage: &Stage, step: usize, index: usize, span: Option<Span>) {
        let name = stage.name();
        if let Some(classification) = classify_path_extension(name) {
            match classification.tier {
                Tier::Unsupported => {
                    let mut path = self.trail.clone();
                    path.push(format!("steps[{step}].stages[{index}]"));
                    self.errors.push(ValidationIssue {
                        message: format!(
                            "`{name}` path extension is not supported: {}",
                            classification.notes
                        ),
                        node_type: name.to_string(),
                        position: span.map(|span| span.start),
                        path,
                    });
                    return;
                }
                Tier::Contextual => {
                    self.warnings.push(format!("`{name}`: {}", classification.notes));
                }
                Tier::Full | Tier::Partial => {}
            }
        }
        match stage {
            Stage::Filter(filter) => {
                self.edge(format!("steps[{step}].stages[{index}]"), |v| v.walk(filter));
            }
            Stage::Sort(terms) => {
                for (k, term) in terms.iter().enumerate() {
                    self.edge(format!("steps[{step}].stages[{index}].terms[{k}]"), |v| {
                        v.walk(&term.expr)
                    });
                }
            }
            Stage::FocusBind(_) | Stage::IndexBind(_) => {}
        }
    }
}
