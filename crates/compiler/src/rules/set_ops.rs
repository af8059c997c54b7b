//! UNION, EXCEPT and INTERSECT.

use crate::compiler::CircuitCompiler;
use alloc::vec;
use alloc::vec::Vec;
use zsql_circuit::{OperatorId, OperatorKind};
use zsql_core::{Error, Origin, Result};
use zsql_ir::{Expr, ExprExt, Param, Type, TypeRef};
use zsql_plan::{Plan, PlanId};

impl CircuitCompiler {
    pub(crate) fn compile_union(&mut self, plan: &Plan, id: PlanId, inputs: &[PlanId], all: bool) -> Result<()> {
        let origin = Self::origin(plan, id);
        let output = self.types.convert_row(plan.row_type(id));
        let mut ops = Vec::with_capacity(inputs.len());
        for &input in inputs {
            let op = self.get_operator(plan, input)?;
            ops.push(self.cast_output(&origin, op, &output)?);
        }
        let sum = self.sum_set(&origin, ops, &output, all)?;
        self.assign_operator(plan, id, sum)
    }

    /// Subtrahends are negated one by one before the sum.
    pub(crate) fn compile_minus(&mut self, plan: &Plan, id: PlanId, inputs: &[PlanId], all: bool) -> Result<()> {
        let origin = Self::origin(plan, id);
        let output = self.types.convert_row(plan.row_type(id));
        let mut ops = Vec::with_capacity(inputs.len());
        for (i, &input) in inputs.iter().enumerate() {
            let mut op = self.get_input_as(plan, input, false)?;
            if i > 0 {
                op = self.add_same_type(&origin, OperatorKind::Negate, true, op)?;
            }
            ops.push(self.cast_output(&origin, op, &output)?);
        }
        let sum = self.sum_set(&origin, ops, &output, all)?;
        self.assign_operator(plan, id, sum)
    }

    fn sum_set(&mut self, origin: &Origin, ops: Vec<OperatorId>, output: &TypeRef, all: bool) -> Result<OperatorId> {
        let sum = self.add(origin, OperatorKind::Sum, Type::zset(output.clone()), true, ops)?;
        if all {
            Ok(sum)
        } else {
            self.add_same_type(origin, OperatorKind::Distinct, false, sum)
        }
    }

    /// A chain of joins keyed by the whole row.
    pub(crate) fn compile_intersect(&mut self, plan: &Plan, id: PlanId, inputs: &[PlanId]) -> Result<()> {
        let origin = Self::origin(plan, id);
        let Some((&first, rest)) = inputs.split_first() else {
            return Err(Error::unsupported("Empty intersection", origin));
        };
        let mut previous = self.get_input_as(plan, first, false)?;
        if rest.is_empty() {
            return self.assign_operator(plan, id, previous);
        }
        let output = self.types.convert_row(plan.row_type(id));
        for &input in rest {
            let left = self.index_whole_row(&origin, previous, &output)?;
            let next = self.get_input_as(plan, input, false)?;
            let right = self.index_whole_row(&origin, next, &output)?;
            let k = Param::new("k", output.clone());
            let l = Param::new("l", Type::unit());
            let r = Param::new("r", Type::unit());
            let function = Expr::tuple(k.var().flatten()).closure(vec![k, l, r]);
            previous = self.add(
                &origin,
                OperatorKind::Join { function },
                Type::zset(output.clone()),
                false,
                vec![left, right],
            )?;
        }
        self.assign_operator(plan, id, previous)
    }

    fn index_whole_row(&mut self, origin: &Origin, op: OperatorId, key: &TypeRef) -> Result<OperatorId> {
        let operator = self.operator(op)?;
        let t = Param::new("t", operator.element_type());
        let fields = (0..key.arity())
            .map(|i| t.var().field(i).cast(&key.field_type(i).unwrap_or_else(Type::any)))
            .collect();
        let function = Expr::raw_tuple(vec![Expr::tuple(fields), Expr::raw_tuple(vec![])]).closure(vec![t]);
        self.add(
            origin,
            OperatorKind::Index { function },
            Type::indexed_zset(key.clone(), Type::unit()),
            operator.is_multiset,
            vec![op],
        )
    }
}
