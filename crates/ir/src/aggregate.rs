//! Aggregate descriptions.
//!
//! An aggregate is a set of folds evaluated together over the rows of one
//! group. Each fold carries its own zero, increment and optional
//! post-processing; the aggregate's output is the tuple of all post-processed
//! accumulators.

use crate::expr::{Expr, ExprRef, Param};
use crate::types::{Type, TypeRef};
use alloc::vec::Vec;

/// A fold over weighted rows.
#[derive(Clone, Debug, PartialEq)]
pub struct Fold {
    /// Initial accumulator.
    pub zero: ExprRef,
    /// Closure `(accumulator, row, weight) -> accumulator`.
    pub increment: ExprRef,
    /// Closure `accumulator -> result`; None when the accumulator is the result.
    pub post_process: Option<ExprRef>,
    /// The semigroup combining partial accumulators.
    pub semigroup: TypeRef,
}

impl Fold {
    /// Type of the folded result.
    pub fn result_type(&self) -> TypeRef {
        match &self.post_process {
            Some(post) => match &*post.ty() {
                Type::Function { result, .. } => result.clone(),
                _ => self.zero.ty(),
            },
            None => self.zero.ty(),
        }
    }
}

/// One aggregate function call compiled to a fold.
#[derive(Clone, Debug, PartialEq)]
pub struct Implementation {
    pub fold: Fold,
    /// Result over an empty input, used for global aggregates.
    pub empty_result: ExprRef,
    /// Whether the fold is a linear function of its input weights.
    pub linear: bool,
}

/// All aggregate calls of one group, evaluated over rows bound to `row_var`.
#[derive(Clone, Debug, PartialEq)]
pub struct Aggregate {
    pub row_var: Param,
    pub implementations: Vec<Implementation>,
}

impl Aggregate {
    pub fn new(row_var: Param, implementations: Vec<Implementation>) -> Self {
        Self {
            row_var,
            implementations,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.implementations.is_empty()
    }

    /// Linear when every component is.
    pub fn is_linear(&self) -> bool {
        self.implementations.iter().all(|i| i.linear)
    }

    /// Output tuple type.
    pub fn result_type(&self) -> TypeRef {
        Type::tuple(
            self.implementations
                .iter()
                .map(|i| i.fold.result_type())
                .collect(),
        )
    }

    /// The tuple of results over an empty input.
    pub fn default_zero(&self) -> ExprRef {
        Expr::tuple(
            self.implementations
                .iter()
                .map(|i| i.empty_result.clone())
                .collect(),
        )
    }

    pub fn default_zero_type(&self) -> TypeRef {
        self.default_zero().ty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::expr::{BinaryOp, ExprExt};
    use alloc::vec;

    fn count() -> Implementation {
        let acc = Param::new("a", Type::int64(false));
        let row = Param::new("t", Type::tuple(vec![]));
        let w = Param::new("w", Type::weight());
        let body = Expr::binary(BinaryOp::Add, acc.var(), w.var(), Type::int64(false));
        Implementation {
            fold: Fold {
                zero: Expr::i64_literal(0),
                increment: body.closure(vec![acc, row, w]),
                post_process: None,
                semigroup: Type::user("DefaultSemigroup", vec![Type::int64(false)]),
            },
            empty_result: Expr::i64_literal(0),
            linear: true,
        }
    }

    #[test]
    fn test_default_zero() {
        let agg = Aggregate::new(Param::new("t", Type::tuple(vec![])), vec![count(), count()]);
        assert!(!agg.is_empty());
        assert!(agg.is_linear());
        assert_eq!(agg.default_zero_type().arity(), 2);
        assert_eq!(agg.result_type(), agg.default_zero_type());
    }

    #[test]
    fn test_post_process_result_type() {
        let mut imp = count();
        let acc = Param::new("a", Type::int64(false));
        imp.fold.post_process = Some(acc.var().cast(&Type::int64(true)).closure(vec![acc]));
        assert_eq!(imp.fold.result_type(), Type::int64(true));
    }
}
