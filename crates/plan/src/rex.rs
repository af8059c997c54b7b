//! Row expressions.
//!
//! A `RexNode` is evaluated against one input row: field references are by
//! position in the input row type. Every node carries its SQL type.

use crate::rel::AggKind;
use crate::types::SqlType;
use alloc::string::String;
use alloc::vec;
use alloc::vec::Vec;
use core::fmt;
use zsql_core::{DataType, Value};

/// Operator of a `RexNode::Call`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum RexOp {
    Eq,
    NotEq,
    Lt,
    LtEq,
    Gt,
    GtEq,
    And,
    Or,
    Not,
    Plus,
    Minus,
    Times,
    Divide,
    Mod,
    Negate,
    IsNull,
    IsNotNull,
    /// `CAST(operand AS type)`; the target is the call's type.
    Cast,
    /// `CASE WHEN c1 THEN v1 ... ELSE e END` as operands `[c1, v1, ..., e]`.
    Case,
}

impl RexOp {
    /// Returns true for the six comparison operators.
    pub fn is_comparison(&self) -> bool {
        matches!(
            self,
            RexOp::Eq | RexOp::NotEq | RexOp::Lt | RexOp::LtEq | RexOp::Gt | RexOp::GtEq
        )
    }

    pub fn symbol(&self) -> &'static str {
        match self {
            RexOp::Eq => "=",
            RexOp::NotEq => "<>",
            RexOp::Lt => "<",
            RexOp::LtEq => "<=",
            RexOp::Gt => ">",
            RexOp::GtEq => ">=",
            RexOp::And => "AND",
            RexOp::Or => "OR",
            RexOp::Not => "NOT",
            RexOp::Plus => "+",
            RexOp::Minus => "-",
            RexOp::Times => "*",
            RexOp::Divide => "/",
            RexOp::Mod => "%",
            RexOp::Negate => "-",
            RexOp::IsNull => "IS NULL",
            RexOp::IsNotNull => "IS NOT NULL",
            RexOp::Cast => "CAST",
            RexOp::Case => "CASE",
        }
    }
}

/// A typed row expression.
#[derive(Clone, Debug, PartialEq)]
pub enum RexNode {
    /// Reference to a field of the input row.
    InputRef { index: usize, ty: SqlType },
    /// A literal value.
    Literal { value: Value, ty: SqlType },
    /// Operator application.
    Call {
        op: RexOp,
        operands: Vec<RexNode>,
        ty: SqlType,
    },
    /// Field of a correlation variable, e.g. `$cor0.ARR`.
    FieldAccess {
        correlation: usize,
        field: String,
        ty: SqlType,
    },
    /// A windowed aggregate left inside a projection.
    Over { function: AggKind, ty: SqlType },
}

impl RexNode {
    /// Creates a reference to input field `index`.
    pub fn input_ref(index: usize, ty: SqlType) -> Self {
        RexNode::InputRef { index, ty }
    }

    /// Creates a literal.
    pub fn literal(value: impl Into<Value>, ty: SqlType) -> Self {
        RexNode::Literal {
            value: value.into(),
            ty,
        }
    }

    /// Creates a non-null INTEGER literal.
    pub fn int32(value: i32) -> Self {
        Self::literal(value, SqlType::scalar(DataType::Int32))
    }

    /// Creates a non-null BOOLEAN literal.
    pub fn boolean(value: bool) -> Self {
        Self::literal(value, SqlType::scalar(DataType::Boolean))
    }

    /// Creates a typed NULL literal.
    pub fn null(ty: SqlType) -> Self {
        RexNode::Literal {
            value: Value::Null,
            ty: ty.nullable(),
        }
    }

    /// Creates a call with an explicit result type.
    pub fn call(op: RexOp, operands: Vec<RexNode>, ty: SqlType) -> Self {
        RexNode::Call { op, operands, ty }
    }

    fn bool_call(op: RexOp, operands: Vec<RexNode>) -> Self {
        let nullable = operands.iter().any(|o| o.ty().nullable);
        Self::call(
            op,
            operands,
            SqlType::scalar(DataType::Boolean).with_nullable(nullable),
        )
    }

    pub fn eq(left: RexNode, right: RexNode) -> Self {
        Self::bool_call(RexOp::Eq, vec![left, right])
    }

    pub fn not_eq(left: RexNode, right: RexNode) -> Self {
        Self::bool_call(RexOp::NotEq, vec![left, right])
    }

    pub fn lt(left: RexNode, right: RexNode) -> Self {
        Self::bool_call(RexOp::Lt, vec![left, right])
    }

    pub fn lt_eq(left: RexNode, right: RexNode) -> Self {
        Self::bool_call(RexOp::LtEq, vec![left, right])
    }

    pub fn gt(left: RexNode, right: RexNode) -> Self {
        Self::bool_call(RexOp::Gt, vec![left, right])
    }

    pub fn gt_eq(left: RexNode, right: RexNode) -> Self {
        Self::bool_call(RexOp::GtEq, vec![left, right])
    }

    pub fn and(left: RexNode, right: RexNode) -> Self {
        Self::bool_call(RexOp::And, vec![left, right])
    }

    pub fn or(left: RexNode, right: RexNode) -> Self {
        Self::bool_call(RexOp::Or, vec![left, right])
    }

    pub fn not(operand: RexNode) -> Self {
        Self::bool_call(RexOp::Not, vec![operand])
    }

    pub fn is_null(operand: RexNode) -> Self {
        Self::call(
            RexOp::IsNull,
            vec![operand],
            SqlType::scalar(DataType::Boolean),
        )
    }

    pub fn is_not_null(operand: RexNode) -> Self {
        Self::call(
            RexOp::IsNotNull,
            vec![operand],
            SqlType::scalar(DataType::Boolean),
        )
    }

    /// Arithmetic with the result type given by the caller.
    pub fn arithmetic(op: RexOp, left: RexNode, right: RexNode, ty: SqlType) -> Self {
        Self::call(op, vec![left, right], ty)
    }

    /// `CAST(operand AS ty)`.
    pub fn cast(operand: RexNode, ty: SqlType) -> Self {
        Self::call(RexOp::Cast, vec![operand], ty)
    }

    /// A correlated field access.
    pub fn field_access(correlation: usize, field: impl Into<String>, ty: SqlType) -> Self {
        RexNode::FieldAccess {
            correlation,
            field: field.into(),
            ty,
        }
    }

    /// Returns the type of this expression.
    pub fn ty(&self) -> &SqlType {
        match self {
            RexNode::InputRef { ty, .. }
            | RexNode::Literal { ty, .. }
            | RexNode::Call { ty, .. }
            | RexNode::FieldAccess { ty, .. }
            | RexNode::Over { ty, .. } => ty,
        }
    }

    /// Returns the referenced field index if this is an input reference.
    pub fn as_input_ref(&self) -> Option<usize> {
        match self {
            RexNode::InputRef { index, .. } => Some(*index),
            _ => None,
        }
    }

    /// Returns true if this is the literal `TRUE`.
    pub fn is_true_literal(&self) -> bool {
        matches!(
            self,
            RexNode::Literal {
                value: Value::Boolean(true),
                ..
            }
        )
    }

    /// Returns the operator and operands if this is a call.
    pub fn as_call(&self) -> Option<(RexOp, &[RexNode])> {
        match self {
            RexNode::Call { op, operands, .. } => Some((*op, operands.as_slice())),
            _ => None,
        }
    }
}

impl fmt::Display for RexNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RexNode::InputRef { index, .. } => write!(f, "${}", index),
            RexNode::Literal { value, .. } => write!(f, "{}", value),
            RexNode::Call { op, operands, ty } => match (op, operands.as_slice()) {
                (RexOp::Cast, [operand]) => write!(f, "CAST({} AS {})", operand, ty),
                (RexOp::IsNull | RexOp::IsNotNull, [operand]) => {
                    write!(f, "{} {}", operand, op.symbol())
                }
                (_, [operand]) => write!(f, "{}({})", op.symbol(), operand),
                (_, [left, right]) => write!(f, "({} {} {})", left, op.symbol(), right),
                (_, operands) => {
                    write!(f, "{}(", op.symbol())?;
                    for (i, operand) in operands.iter().enumerate() {
                        if i > 0 {
                            f.write_str(", ")?;
                        }
                        write!(f, "{}", operand)?;
                    }
                    f.write_str(")")
                }
            },
            RexNode::FieldAccess {
                correlation, field, ..
            } => write!(f, "$cor{}.{}", correlation, field),
            RexNode::Over { function, .. } => write!(f, "{:?}() OVER (...)", function),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloc::string::ToString;

    fn int(index: usize) -> RexNode {
        RexNode::input_ref(index, SqlType::scalar(DataType::Int32))
    }

    fn nullable_int(index: usize) -> RexNode {
        RexNode::input_ref(index, SqlType::scalar(DataType::Int32).nullable())
    }

    #[test]
    fn test_comparison_nullability() {
        assert!(!RexNode::eq(int(0), int(1)).ty().nullable);
        assert!(RexNode::eq(int(0), nullable_int(1)).ty().nullable);
        assert!(!RexNode::is_null(nullable_int(1)).ty().nullable);
    }

    #[test]
    fn test_accessors() {
        assert_eq!(int(3).as_input_ref(), Some(3));
        assert_eq!(RexNode::int32(3).as_input_ref(), None);
        assert!(RexNode::boolean(true).is_true_literal());
        assert!(!RexNode::boolean(false).is_true_literal());
        let call = RexNode::and(RexNode::boolean(true), RexNode::boolean(false));
        assert_eq!(call.as_call().map(|(op, args)| (op, args.len())), Some((RexOp::And, 2)));
    }

    #[test]
    fn test_display() {
        let e = RexNode::and(RexNode::eq(int(0), int(2)), RexNode::is_null(nullable_int(1)));
        assert_eq!(e.to_string(), "(($0 = $2) AND $1 IS NULL)");
        let c = RexNode::cast(int(0), SqlType::scalar(DataType::Int64));
        assert_eq!(c.to_string(), "CAST($0 AS i64 NOT NULL)");
    }
}
