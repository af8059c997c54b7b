//! Fold implementations of aggregate calls.
//!
//! Every increment is a closure `(a, row, w)`: the accumulator, the input
//! row and the row's signed weight. Linear folds are weight homomorphic and
//! may be evaluated on deltas directly.

use crate::type_compiler::TypeCompiler;
use alloc::format;
use alloc::vec;
use alloc::vec::Vec;
use zsql_core::{Error, Origin, Result, Value};
use zsql_ir::{
    Aggregate, BinaryOp, Expr, ExprExt, ExprRef, Fold, Implementation, Param, Type, TypeRef,
    TypeRefExt,
};
use zsql_plan::{AggKind, AggregateCall};

/// Builds the folds of the aggregate calls over rows bound to `row`.
pub struct AggregateBuilder<'a> {
    types: &'a TypeCompiler,
    row: Param,
    origin: Origin,
}

impl<'a> AggregateBuilder<'a> {
    pub fn new(types: &'a TypeCompiler, row: Param, origin: Origin) -> Self {
        Self { types, row, origin }
    }

    pub fn build(&self, calls: &[AggregateCall]) -> Result<Aggregate> {
        let implementations = calls
            .iter()
            .map(|call| self.implement(call))
            .collect::<Result<Vec<_>>>()?;
        Ok(Aggregate::new(self.row.clone(), implementations))
    }

    pub fn implement(&self, call: &AggregateCall) -> Result<Implementation> {
        if call.distinct {
            return Err(Error::unimplemented(
                format!("{:?}(DISTINCT ...)", call.kind),
                self.origin.clone(),
            ));
        }
        let result = self.types.convert_type(&call.ty, false);
        match call.kind {
            AggKind::Count => self.count(call, result),
            AggKind::Sum => self.sum(call, result),
            AggKind::Avg => self.average(call, result),
            AggKind::Min => self.min_max(call, result, BinaryOp::Min, "MinSemigroup"),
            AggKind::Max => self.min_max(call, result, BinaryOp::Max, "MaxSemigroup"),
            AggKind::ArrayAgg => self.array_agg(call, result),
            other => Err(Error::unimplemented(
                format!("Aggregate function {:?}", other),
                self.origin.clone(),
            )),
        }
    }

    fn arg(&self, call: &AggregateCall, position: usize) -> Result<ExprRef> {
        let field = call.args.get(position).copied().ok_or_else(|| {
            Error::internal(
                format!("{:?} expects an argument", call.kind),
                self.origin.clone(),
            )
        })?;
        if field >= self.row.ty.arity() {
            return Err(Error::internal(
                format!("Aggregate references unknown field {}", field),
                self.origin.clone(),
            ));
        }
        Ok(self.row.var().field(field))
    }

    fn increment(&self, acc: &Param, body: ExprRef) -> ExprRef {
        body.closure(vec![acc.clone(), self.row.clone(), weight()])
    }

    fn count(&self, call: &AggregateCall, result: TypeRef) -> Result<Implementation> {
        let acc = Param::new("a", Type::int64(false));
        let a = acc.var();
        let plus_w = Expr::binary(BinaryOp::Add, a.clone(), weight().var(), Type::int64(false));
        let mut nulls = Vec::new();
        for position in 0..call.args.len() {
            let arg = self.arg(call, position)?;
            if arg.ty().may_be_null() {
                nulls.push(arg.is_null());
            }
        }
        let body = match Expr::or_all(nulls) {
            Some(any_null) => Expr::if_else(any_null, a.clone(), plus_w, Type::int64(false)),
            None => plus_w,
        };
        let zero = Expr::i64_literal(0);
        Ok(Implementation {
            fold: Fold {
                increment: self.increment(&acc, body),
                post_process: post_cast(&acc, &result),
                semigroup: Type::user("DefaultSemigroup", vec![Type::int64(false)]),
                zero: zero.clone(),
            },
            empty_result: zero.cast(&result),
            linear: true,
        })
    }

    fn sum(&self, call: &AggregateCall, result: TypeRef) -> Result<Implementation> {
        let acc_type = result.with_nullable(true);
        let acc = Param::new("a", acc_type.clone());
        let a = acc.var();
        let x = self.arg(call, 0)?.cast(&acc_type);
        let scaled = Expr::binary(BinaryOp::MulWeight, x.clone(), weight().var(), acc_type.clone());
        let added = Expr::binary(BinaryOp::Add, a.clone(), scaled.clone(), acc_type.clone());
        let body = Expr::if_else(
            x.is_null(),
            a.clone(),
            Expr::if_else(a.is_null(), scaled, added, acc_type.clone()),
            acc_type.clone(),
        );
        Ok(Implementation {
            fold: Fold {
                zero: Expr::none(&acc_type),
                increment: self.increment(&acc, body),
                post_process: post_cast(&acc, &result),
                semigroup: Type::user("DefaultOptSemigroup", vec![acc_type]),
            },
            empty_result: Expr::none(&result),
            linear: true,
        })
    }

    /// AVG keeps a (sum, count) pair and divides when the result is read.
    fn average(&self, call: &AggregateCall, result: TypeRef) -> Result<Implementation> {
        let sum_type = result.with_nullable(true);
        let acc_type = Type::tuple(vec![sum_type.clone(), Type::int64(false)]);
        let acc = Param::new("a", acc_type.clone());
        let a = acc.var();
        let w = weight().var();
        let x = self.arg(call, 0)?.cast(&sum_type);
        let scaled = Expr::binary(BinaryOp::MulWeight, x.clone(), w.clone(), sum_type.clone());
        let sum = Expr::if_else(
            a.field(0).is_null(),
            scaled.clone(),
            Expr::binary(BinaryOp::Add, a.field(0), scaled, sum_type.clone()),
            sum_type.clone(),
        );
        let count = Expr::binary(BinaryOp::Add, a.field(1), w, Type::int64(false));
        let body = Expr::if_else(
            x.is_null(),
            a.clone(),
            Expr::tuple(vec![sum, count]),
            acc_type.clone(),
        );

        let post_acc = Param::new("a", acc_type.clone());
        let p = post_acc.var();
        let empty = Expr::binary(BinaryOp::Eq, p.field(1), Expr::i64_literal(0), Type::boolean(false));
        let divided = Expr::binary(BinaryOp::Div, p.field(0), p.field(1).cast(&sum_type), sum_type.clone());
        let post = Expr::if_else(empty, Expr::none(&result), divided, sum_type.clone()).cast(&result);
        Ok(Implementation {
            fold: Fold {
                zero: Expr::tuple(vec![Expr::none(&sum_type), Expr::i64_literal(0)]),
                increment: self.increment(&acc, body),
                post_process: Some(post.closure(vec![post_acc])),
                semigroup: Type::user("PairSemigroup", vec![sum_type, Type::int64(false)]),
            },
            empty_result: Expr::none(&result),
            linear: true,
        })
    }

    fn min_max(
        &self,
        call: &AggregateCall,
        result: TypeRef,
        op: BinaryOp,
        semigroup: &str,
    ) -> Result<Implementation> {
        let acc_type = result.with_nullable(true);
        let acc = Param::new("a", acc_type.clone());
        let a = acc.var();
        let x = self.arg(call, 0)?.cast(&acc_type);
        let body = Expr::if_else(
            x.is_null(),
            a.clone(),
            Expr::if_else(
                a.is_null(),
                x.clone(),
                Expr::binary(op, a.clone(), x, acc_type.clone()),
                acc_type.clone(),
            ),
            acc_type.clone(),
        );
        Ok(Implementation {
            fold: Fold {
                zero: Expr::none(&acc_type),
                increment: self.increment(&acc, body),
                post_process: post_cast(&acc, &result),
                semigroup: Type::user(semigroup, vec![acc_type]),
            },
            empty_result: Expr::none(&result),
            linear: false,
        })
    }

    fn array_agg(&self, call: &AggregateCall, result: TypeRef) -> Result<Implementation> {
        let acc_type = result.with_nullable(false);
        let acc = Param::new("a", acc_type.clone());
        let x = self.arg(call, 0)?;
        let body = Expr::apply(
            "weighted_push",
            vec![acc.var(), x, weight().var()],
            acc_type.clone(),
        );
        Ok(Implementation {
            fold: Fold {
                zero: Expr::literal(Value::Array(Vec::new()), acc_type.clone()),
                increment: self.increment(&acc, body),
                post_process: post_cast(&acc, &result),
                semigroup: Type::user("ConcatSemigroup", vec![acc_type]),
            },
            empty_result: Expr::none(&result),
            linear: false,
        })
    }
}

fn weight() -> Param {
    Param::new("w", Type::weight())
}

/// A post-processing cast, when the accumulator type differs from the result.
fn post_cast(acc: &Param, result: &TypeRef) -> Option<ExprRef> {
    if acc.ty.same_type(result) {
        None
    } else {
        Some(acc.var().cast(result).closure(vec![acc.clone()]))
    }
}
