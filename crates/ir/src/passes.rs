//! Rewrite passes built on the rewrite engine.

use crate::expr::{BinaryOp, Expr, ExprRef, UnaryOp};
use crate::rewrite::{rewrite_expr, walk_expr, Rewriter};
use alloc::string::String;
use alloc::sync::Arc;
use hashbrown::HashMap;
use zsql_core::Value;

/// Replaces free variables by expressions.
///
/// A closure parameter shadows a substitution of the same name inside the
/// closure body.
#[derive(Clone, Debug, Default)]
pub struct Substitute {
    bindings: HashMap<String, ExprRef>,
}

impl Substitute {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn bind(mut self, name: impl Into<String>, value: ExprRef) -> Self {
        self.bindings.insert(name.into(), value);
        self
    }

    /// Applies the substitution to `expr`.
    pub fn apply(&mut self, expr: &ExprRef) -> ExprRef {
        rewrite_expr(self, expr)
    }
}

impl Rewriter for Substitute {
    fn rewrite_var(&mut self, expr: &ExprRef) -> ExprRef {
        if let Expr::Var { name, .. } = &**expr {
            if let Some(value) = self.bindings.get(name) {
                return value.clone();
            }
        }
        walk_expr(self, expr)
    }

    fn rewrite_closure(&mut self, expr: &ExprRef) -> ExprRef {
        let Expr::Closure { params, body } = &**expr else {
            return walk_expr(self, expr);
        };
        if !params.iter().any(|p| self.bindings.contains_key(&p.name)) {
            return walk_expr(self, expr);
        }
        let mut inner = self.clone();
        for p in params {
            inner.bindings.remove(&p.name);
        }
        let new_body = rewrite_expr(&mut inner, body);
        if Arc::ptr_eq(&new_body, body) {
            return expr.clone();
        }
        Arc::new(Expr::Closure {
            params: params.clone(),
            body: new_body,
        })
    }
}

/// Local simplifications: casts to the source's own type, boolean identities
/// (`true AND x`, `false OR x`, `NOT NOT x`) and `wrap_bool` of a non-null
/// operand.
#[derive(Clone, Copy, Debug, Default)]
pub struct Simplify;

impl Simplify {
    pub fn apply(expr: &ExprRef) -> ExprRef {
        rewrite_expr(&mut Simplify, expr)
    }
}

fn bool_literal(expr: &Expr) -> Option<bool> {
    match expr.as_literal() {
        Some(Value::Boolean(b)) => Some(*b),
        _ => None,
    }
}

impl Rewriter for Simplify {
    fn rewrite_cast(&mut self, expr: &ExprRef) -> ExprRef {
        let walked = walk_expr(self, expr);
        if let Expr::Cast { source, ty } = &*walked {
            if source.ty().same_type(ty) {
                return source.clone();
            }
        }
        walked
    }

    fn rewrite_binary(&mut self, expr: &ExprRef) -> ExprRef {
        let walked = walk_expr(self, expr);
        if let Expr::Binary {
            op, left, right, ..
        } = &*walked
        {
            match (op, bool_literal(left), bool_literal(right)) {
                (BinaryOp::And, Some(true), _) | (BinaryOp::Or, Some(false), _) => {
                    return right.clone()
                }
                (BinaryOp::And, _, Some(true)) | (BinaryOp::Or, _, Some(false)) => {
                    return left.clone()
                }
                _ => {}
            }
        }
        walked
    }

    fn rewrite_unary(&mut self, expr: &ExprRef) -> ExprRef {
        let walked = walk_expr(self, expr);
        if let Expr::Unary { op, operand, .. } = &*walked {
            match op {
                UnaryOp::WrapBool if !operand.ty().may_be_null() => return operand.clone(),
                UnaryOp::Not => {
                    if let Expr::Unary {
                        op: UnaryOp::Not,
                        operand: inner,
                        ..
                    } = &**operand
                    {
                        return inner.clone();
                    }
                }
                _ => {}
            }
        }
        walked
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::expr::{ExprExt, Param};
    use crate::types::Type;
    use alloc::vec;

    #[test]
    fn test_substitute_respects_shadowing() {
        let x = Expr::var("x", Type::int64(false));
        let inner = x.closure(vec![Param::new("x", Type::int64(false))]);
        let outer = Expr::tuple(vec![x.clone(), inner.clone()]);
        let mut s = Substitute::new().bind("x", Expr::i64_literal(7));
        let out = s.apply(&outer);
        match &*out {
            Expr::Tuple { fields } => {
                assert_eq!(fields[0].as_literal(), Some(&Value::Int64(7)));
                assert!(Arc::ptr_eq(&fields[1], &inner));
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_simplify_boolean_identities() {
        let b = Expr::var("b", Type::boolean(false));
        let e = Expr::binary(BinaryOp::And, Expr::bool_literal(true), b.clone(), Type::boolean(false));
        assert!(Arc::ptr_eq(&Simplify::apply(&e), &b));
        let e = Expr::binary(BinaryOp::Or, b.clone(), Expr::bool_literal(false), Type::boolean(false));
        assert!(Arc::ptr_eq(&Simplify::apply(&e), &b));
        assert!(Arc::ptr_eq(&Simplify::apply(&b.not().not()), &b));
    }

    #[test]
    fn test_simplify_redundant_cast_and_wrap_bool() {
        let x = Expr::var("x", Type::int64(false));
        let cast = Arc::new(Expr::Cast {
            source: x.clone(),
            ty: Type::int64(false),
        });
        assert!(Arc::ptr_eq(&Simplify::apply(&cast), &x));
        let b = Expr::var("b", Type::boolean(false));
        let wrapped = Expr::unary(UnaryOp::WrapBool, b.clone(), Type::boolean(false));
        assert!(Arc::ptr_eq(&Simplify::apply(&wrapped), &b));
        let nb = Expr::var("nb", Type::boolean(true));
        let kept = nb.wrap_bool();
        assert!(Arc::ptr_eq(&Simplify::apply(&kept), &kept));
    }
}
