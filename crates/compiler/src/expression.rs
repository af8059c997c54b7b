//! Compilation of row expressions to IR expressions.

use crate::type_compiler::TypeCompiler;
use alloc::format;
use alloc::vec::Vec;
use zsql_core::{DataType, Error, Origin, Result, Value};
use zsql_ir::{BinaryOp, Expr, ExprExt, ExprRef, Param, Type, TypeRef, UnaryOp};
use zsql_plan::{RexNode, RexOp, SqlType};

/// Compiles `RexNode`s evaluated against one row.
///
/// Input references address the fields of `row`; references past the row
/// width address `constants`, which is how window operators expose their
/// constant arguments.
pub struct ExpressionCompiler<'a> {
    row: Option<Param>,
    constants: &'a [RexNode],
    types: &'a TypeCompiler,
    origin: Origin,
}

impl<'a> ExpressionCompiler<'a> {
    pub fn new(row: Option<Param>, types: &'a TypeCompiler, origin: Origin) -> Self {
        Self {
            row,
            constants: &[],
            types,
            origin,
        }
    }

    pub fn with_constants(mut self, constants: &'a [RexNode]) -> Self {
        self.constants = constants;
        self
    }

    pub fn compile(&self, rex: &RexNode) -> Result<ExprRef> {
        match rex {
            RexNode::InputRef { index, .. } => self.input_ref(*index),
            RexNode::Literal { value, ty } => Ok(self.literal(value, &self.types.convert_type(ty, false))),
            RexNode::Call { op, operands, ty } => self.call(*op, operands, ty),
            RexNode::FieldAccess { field, .. } => Err(Error::unimplemented(
                format!("Correlated reference to {} outside of UNNEST", field),
                self.origin.clone(),
            )),
            RexNode::Over { .. } => Err(Error::unsupported(
                "Optimizer should have removed OVER expressions",
                self.origin.clone(),
            )),
        }
    }

    fn input_ref(&self, index: usize) -> Result<ExprRef> {
        let arity = self.row.as_ref().map(|r| r.ty.arity()).unwrap_or(0);
        if let Some(row) = &self.row {
            if index < arity {
                return Ok(row.var().field(index));
            }
        }
        match self.constants.get(index - arity) {
            Some(constant) => self.compile(constant),
            None => Err(Error::internal(
                format!("Input reference ${} is out of bounds", index),
                self.origin.clone(),
            )),
        }
    }

    fn literal(&self, value: &Value, ty: &TypeRef) -> ExprRef {
        if value.is_null() {
            return Expr::none(ty);
        }
        let value = match ty.data_type() {
            Some(dt) => value.cast(dt).unwrap_or_else(|| value.clone()),
            None => value.clone(),
        };
        Expr::literal(value, ty.clone())
    }

    fn call(&self, op: RexOp, operands: &[RexNode], ty: &SqlType) -> Result<ExprRef> {
        let result_type = self.types.convert_type(ty, false);
        let args = operands
            .iter()
            .map(|o| self.compile(o))
            .collect::<Result<Vec<_>>>()?;
        match (op, args.as_slice()) {
            (RexOp::Eq | RexOp::NotEq | RexOp::Lt | RexOp::LtEq | RexOp::Gt | RexOp::GtEq, [l, r]) => {
                let (l, r) = promote(l, r);
                let nullable = l.ty().may_be_null() || r.ty().may_be_null();
                Ok(Expr::binary(comparison(op), l, r, Type::boolean(nullable)))
            }
            (RexOp::And | RexOp::Or, [_, ..]) => {
                let op = if op == RexOp::And { BinaryOp::And } else { BinaryOp::Or };
                let folded = args.iter().cloned().reduce(|acc, e| {
                    let nullable = acc.ty().may_be_null() || e.ty().may_be_null();
                    Expr::binary(op, acc, e, Type::boolean(nullable))
                });
                folded.ok_or_else(|| self.arity_error(op.symbol()))
            }
            (RexOp::Not, [e]) => Ok(e.not()),
            (RexOp::Plus | RexOp::Minus | RexOp::Times | RexOp::Divide | RexOp::Mod, [l, r]) => {
                let op = match op {
                    RexOp::Plus => BinaryOp::Add,
                    RexOp::Minus => BinaryOp::Sub,
                    RexOp::Times => BinaryOp::Mul,
                    RexOp::Divide => BinaryOp::Div,
                    _ => BinaryOp::Mod,
                };
                let l = cast_scalar(l, &result_type);
                let r = cast_scalar(r, &result_type);
                Ok(Expr::binary(op, l, r, result_type))
            }
            (RexOp::Negate, [e]) => Ok(Expr::unary(UnaryOp::Neg, cast_scalar(e, &result_type), result_type)),
            (RexOp::IsNull, [e]) => Ok(e.is_null()),
            (RexOp::IsNotNull, [e]) => Ok(e.is_null().not()),
            (RexOp::Cast, [e]) => Ok(e.cast(&result_type)),
            (RexOp::Case, [_, ..]) => Ok(self.case(args, &result_type)),
            _ => Err(self.arity_error(op.symbol())),
        }
    }

    /// `CASE WHEN c1 THEN v1 ... ELSE e END` as nested conditionals.
    fn case(&self, mut args: Vec<ExprRef>, ty: &TypeRef) -> ExprRef {
        let otherwise = if args.len() % 2 == 1 {
            args.pop().map(|e| e.cast(ty))
        } else {
            None
        };
        let mut result = otherwise.unwrap_or_else(|| Expr::none(ty));
        for pair in args.chunks(2).rev() {
            if let [condition, value] = pair {
                result = Expr::if_else(condition.wrap_bool(), value.cast(ty), result, ty.clone());
            }
        }
        result
    }

    fn arity_error(&self, op: &str) -> Error {
        Error::internal(
            format!("Unexpected operands for {}", op),
            self.origin.clone(),
        )
    }
}

fn comparison(op: RexOp) -> BinaryOp {
    match op {
        RexOp::Eq => BinaryOp::Eq,
        RexOp::NotEq => BinaryOp::Neq,
        RexOp::Lt => BinaryOp::Lt,
        RexOp::LtEq => BinaryOp::Lte,
        RexOp::Gt => BinaryOp::Gt,
        _ => BinaryOp::Gte,
    }
}

/// Casts a scalar operand to the scalar type of `target`, keeping its own nullability.
fn cast_scalar(e: &ExprRef, target: &TypeRef) -> ExprRef {
    match (e.ty().data_type(), target.data_type()) {
        (Some(from), Some(to)) if from != to => {
            e.cast(&Type::primitive(to, e.ty().may_be_null()))
        }
        _ => e.clone(),
    }
}

/// Promotes both sides of a comparison to their common scalar type.
fn promote(l: &ExprRef, r: &ExprRef) -> (ExprRef, ExprRef) {
    let common = match (l.ty().data_type(), r.ty().data_type()) {
        (Some(a), Some(b)) => DataType::common_type(a, b),
        _ => None,
    };
    match common {
        Some(dt) => {
            let target = Type::primitive(dt, false);
            (cast_scalar(l, &target), cast_scalar(r, &target))
        }
        None => (l.clone(), r.clone()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloc::vec;

    fn int() -> SqlType {
        SqlType::scalar(DataType::Int32)
    }

    fn row() -> Param {
        Param::new(
            "t",
            Type::tuple(vec![
                Type::primitive(DataType::Int32, false),
                Type::primitive(DataType::Int64, true),
            ]),
        )
    }

    #[test]
    fn test_comparison_promotes_operands() {
        let types = TypeCompiler::new();
        let ec = ExpressionCompiler::new(Some(row()), &types, Origin::empty());
        let cond = RexNode::eq(
            RexNode::input_ref(0, int()),
            RexNode::input_ref(1, SqlType::scalar(DataType::Int64).nullable()),
        );
        let e = ec.compile(&cond).unwrap();
        match &*e {
            Expr::Binary { op, left, ty, .. } => {
                assert_eq!(*op, BinaryOp::Eq);
                assert_eq!(left.ty(), Type::primitive(DataType::Int64, false));
                assert!(ty.may_be_null());
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_constants_follow_the_row() {
        let types = TypeCompiler::new();
        let constants = [RexNode::int32(7)];
        let ec = ExpressionCompiler::new(Some(row()), &types, Origin::empty())
            .with_constants(&constants);
        let e = ec.compile(&RexNode::input_ref(2, int())).unwrap();
        assert_eq!(e.as_literal(), Some(&Value::Int32(7)));
        assert!(ec.compile(&RexNode::input_ref(3, int())).unwrap_err().is_internal());
    }

    #[test]
    fn test_case_becomes_nested_if() {
        let types = TypeCompiler::new();
        let ec = ExpressionCompiler::new(Some(row()), &types, Origin::empty());
        let case = RexNode::call(
            RexOp::Case,
            vec![
                RexNode::gt(RexNode::input_ref(0, int()), RexNode::int32(1)),
                RexNode::int32(10),
                RexNode::int32(20),
            ],
            int(),
        );
        let e = ec.compile(&case).unwrap();
        assert!(matches!(&*e, Expr::If { .. }));
        assert_eq!(e.ty(), Type::primitive(DataType::Int32, false));
    }

    #[test]
    fn test_null_literal_is_typed() {
        let types = TypeCompiler::new();
        let ec = ExpressionCompiler::new(None, &types, Origin::empty());
        let e = ec.compile(&RexNode::null(int())).unwrap();
        assert_eq!(e.ty(), Type::primitive(DataType::Int32, true));
        assert!(ec.compile(&RexNode::input_ref(0, int())).is_err());
    }

    #[test]
    fn test_over_is_unsupported() {
        let types = TypeCompiler::new();
        let ec = ExpressionCompiler::new(None, &types, Origin::empty());
        let over = RexNode::Over {
            function: zsql_plan::AggKind::Rank,
            ty: int(),
        };
        assert!(matches!(ec.compile(&over), Err(Error::Unsupported { .. })));
    }
}
