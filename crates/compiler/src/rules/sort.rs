//! ORDER BY and LIMIT.

use super::window::order_comparator;
use crate::compiler::CircuitCompiler;
use crate::expression::ExpressionCompiler;
use alloc::sync::Arc;
use alloc::vec;
use alloc::vec::Vec;
use zsql_circuit::{AggregateBody, Numbering, OperatorKind};
use zsql_core::{Error, Result, Value};
use zsql_ir::{Expr, ExprExt, Fold, Param, Type};
use zsql_plan::{FieldCollation, Plan, PlanId, RexNode};

impl CircuitCompiler {
    /// All rows are gathered under one key, optionally cut down by a top-k,
    /// and folded into a vector that is then sorted.
    pub(crate) fn compile_sort(
        &mut self,
        plan: &Plan,
        id: PlanId,
        input: PlanId,
        collation: &[FieldCollation],
        fetch: Option<&RexNode>,
        offset: Option<&RexNode>,
    ) -> Result<()> {
        let origin = Self::origin(plan, id);
        let op_input = self.get_operator(plan, input)?;
        if self.options.ignore_order_by && fetch.is_none() {
            return self.assign_operator(plan, id, op_input);
        }
        if offset.is_some() {
            return Err(Error::unimplemented("OFFSET", origin));
        }
        let limit = match fetch {
            Some(fetch) => Some(ExpressionCompiler::new(None, &self.types, origin.clone()).compile(fetch)?),
            None => None,
        };

        let input_op = self.operator(op_input)?;
        let input_type = input_op.element_type();
        let t = Param::new("t", input_type.clone());
        let function = Expr::raw_tuple(vec![Expr::raw_tuple(vec![]), Expr::tuple(t.var().flatten())]).closure(vec![t]);
        let indexed_type = Type::indexed_zset(Type::unit(), input_type.clone());
        let mut index = self.add(
            &origin,
            OperatorKind::Index { function },
            indexed_type.clone(),
            input_op.is_multiset,
            vec![op_input],
        )?;
        let comparator = order_comparator(&input_type, collation, &origin)?;

        if let Some(limit) = limit {
            let diff = self.add_same_type(&origin, OperatorKind::Differentiate, input_op.is_multiset, index)?;
            let topk = self.add(
                &origin,
                OperatorKind::IndexedTopK {
                    numbering: Numbering::RowNumber,
                    comparator: comparator.clone(),
                    limit,
                    output_producer: None,
                },
                indexed_type,
                false,
                vec![diff],
            )?;
            let integral = self.add_same_type(&origin, OperatorKind::Integrate, false, topk)?;
            if self.options.ignore_order_by {
                let deindex = self.add(&origin, OperatorKind::Deindex, Type::zset(input_type), false, vec![integral])?;
                return self.assign_operator(plan, id, deindex);
            }
            index = integral;
        }

        // A row of weight w is pushed w times.
        let vec_type = Type::vec(input_type.clone());
        let acc = Param::new("a", vec_type.clone());
        let row = Param::new("v", input_type.clone());
        let w = Param::new("w", Type::weight());
        let push = Expr::apply(
            "weighted_push",
            vec![acc.var(), row.var(), w.var()],
            vec_type.clone(),
        );
        let fold = Fold {
            zero: Expr::literal(Value::Array(Vec::new()), vec_type.clone()),
            increment: push.closure(vec![acc, row, w]),
            post_process: None,
            semigroup: Type::user("UnimplementedSemigroup", vec![Type::any()]),
        };
        let aggregate = self.add(
            &origin,
            OperatorKind::StreamAggregate {
                body: AggregateBody::Fold(fold),
                linear: false,
            },
            Type::indexed_zset(Type::unit(), vec_type.clone()),
            false,
            vec![index],
        )?;
        let sorter = Arc::new(Expr::Sort {
            element: input_type,
            comparator,
        });
        let sorted = self.add(
            &origin,
            OperatorKind::Map { function: sorter },
            Type::zset(vec_type),
            true,
            vec![aggregate],
        )?;
        self.assign_operator(plan, id, sorted)
    }
}
