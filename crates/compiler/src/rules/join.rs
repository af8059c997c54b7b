//! Inner and outer equi-joins.

use crate::compiler::CircuitCompiler;
use crate::expression::ExpressionCompiler;
use crate::join_condition::{EquiPair, JoinConditionAnalyzer};
use alloc::vec;
use alloc::vec::Vec;
use zsql_circuit::{OperatorId, OperatorKind};
use zsql_core::{Error, Origin, Result};
use zsql_ir::{Expr, ExprExt, ExprRef, Param, Type, TypeRef, TypeRefExt};
use zsql_plan::{JoinType, Plan, PlanId, RexNode};

/// Which side of a join an outer padding step preserves.
#[derive(Clone, Copy, PartialEq, Eq)]
enum Side {
    Left,
    Right,
}

impl CircuitCompiler {
    pub(crate) fn compile_join(
        &mut self,
        plan: &Plan,
        id: PlanId,
        inputs: &[PlanId],
        condition: &RexNode,
        join_type: JoinType,
    ) -> Result<()> {
        let origin = Self::origin(plan, id);
        if matches!(join_type, JoinType::Semi | JoinType::Anti) {
            return Err(Error::unimplemented("Semi and anti joins", origin));
        }
        let &[left_node, right_node] = inputs else {
            return Err(Error::internal("Unexpected number of join inputs", origin));
        };
        let left = self.get_input_as(plan, left_node, true)?;
        let right = self.get_input_as(plan, right_node, true)?;
        let left_op = self.operator(left)?;
        let right_op = self.operator(right)?;
        let left_element = left_op.element_type();
        let right_element = right_op.element_type();
        let left_arity = left_element.arity();

        let decomposition = JoinConditionAnalyzer::new(left_arity).analyze(condition);
        let filtered_left = self.filter_non_null_keys(&origin, left, &decomposition.left_columns())?;
        let filtered_right = self.filter_non_null_keys(&origin, right, &decomposition.right_columns())?;

        let result_type = self.types.convert_row(plan.row_type(id));
        let mut lr_fields = left_element.fields().unwrap_or_default();
        lr_fields.extend(right_element.fields().unwrap_or_default());
        let lr_type = Type::tuple(lr_fields);

        // Null keys were filtered above, so keys are never NULL.
        let key_type = Type::tuple(
            decomposition
                .comparisons
                .iter()
                .map(|c| c.common_type.with_nullable(false))
                .collect(),
        );
        let pairs = &decomposition.comparisons;
        let left_index = self.index_by_key(&origin, filtered_left, &key_type, pairs, |p| p.left_column)?;
        let right_index = self.index_by_key(&origin, filtered_right, &key_type, pairs, |p| p.right_column)?;

        let k = Param::new("k", key_type);
        let l = Param::new("l", left_element.clone());
        let r = Param::new("r", right_element.clone());
        let mut fields = l.var().flatten();
        fields.extend(r.var().flatten());
        let function = Expr::tuple(fields).closure(vec![k, l, r]);
        let mut inner = self.add(
            &origin,
            OperatorKind::Join { function },
            Type::zset(lr_type.clone()),
            left_op.is_multiset || right_op.is_multiset,
            vec![left_index, right_index],
        )?;

        if let Some(residual) = &decomposition.residual {
            let t = Param::new("t", lr_type.clone());
            let compiler = ExpressionCompiler::new(Some(t.clone()), &self.types, origin.clone());
            let predicate = compiler.compile(residual)?.wrap_bool();
            if !predicate.is_true_literal() {
                let predicate = predicate.closure(vec![t]);
                let multiset = self.operator(inner)?.is_multiset;
                inner = self.add_same_type(&origin, OperatorKind::Filter { predicate }, multiset, inner)?;
            }
        }

        let mut result = self.cast_output(&origin, inner, &result_type)?;
        if join_type.preserves_left() {
            let expand = self.unmatched_rows(&origin, Side::Left, inner, left, left_arity, &result_type)?;
            result = self.add(&origin, OperatorKind::Sum, Type::zset(result_type.clone()), true, vec![result, expand])?;
        }
        if join_type.preserves_right() {
            let expand = self.unmatched_rows(&origin, Side::Right, inner, right, left_arity, &result_type)?;
            result = self.add(&origin, OperatorKind::Sum, Type::zset(result_type.clone()), true, vec![result, expand])?;
        }
        self.assign_operator(plan, id, result)
    }

    fn index_by_key<F>(
        &mut self,
        origin: &Origin,
        op: OperatorId,
        key_type: &TypeRef,
        pairs: &[EquiPair],
        column: F,
    ) -> Result<OperatorId>
    where
        F: Fn(&EquiPair) -> usize,
    {
        let element = self.operator(op)?.element_type();
        let t = Param::new("t", element.clone());
        let key = pairs
            .iter()
            .enumerate()
            .map(|(i, p)| {
                let ty = key_type.field_type(i).unwrap_or_else(Type::any);
                t.var().field(column(p)).cast(&ty)
            })
            .collect();
        let value = Expr::tuple(t.var().flatten());
        let function = Expr::raw_tuple(vec![Expr::tuple(key), value]).closure(vec![t]);
        self.add(
            origin,
            OperatorKind::Index { function },
            Type::indexed_zset(key_type.clone(), element),
            false,
            vec![op],
        )
    }

    /// Rows of the preserved side without a match, padded with NULLs.
    fn unmatched_rows(
        &mut self,
        origin: &Origin,
        side: Side,
        inner: OperatorId,
        preserved: OperatorId,
        left_arity: usize,
        result_type: &TypeRef,
    ) -> Result<OperatorId> {
        let (start, end) = match side {
            Side::Left => (0, left_arity),
            Side::Right => (left_arity, result_type.arity()),
        };
        let side_type = result_type.slice(start, end);

        let t = Param::new("t", self.operator(inner)?.element_type());
        let columns = (start..end)
            .map(|i| {
                let ty = result_type.field_type(i).unwrap_or_else(Type::any);
                t.var().field(i).cast(&ty)
            })
            .collect();
        let function = Expr::tuple(columns).closure(vec![t]);
        let matched = self.add(origin, OperatorKind::Map { function }, Type::zset(side_type.clone()), true, vec![inner])?;
        let matched = self.add_same_type(origin, OperatorKind::Distinct, false, matched)?;

        let preserved = self.cast_output(origin, preserved, &side_type)?;
        let unmatched = self.add(
            origin,
            OperatorKind::Subtract,
            Type::zset(side_type.clone()),
            true,
            vec![preserved, matched],
        )?;
        let unmatched = self.add_same_type(origin, OperatorKind::Distinct, false, unmatched)?;

        let row = Param::new("r", side_type.clone());
        let nulls = |range: core::ops::Range<usize>| -> Vec<ExprRef> {
            range
                .map(|i| Expr::none(&result_type.field_type(i).unwrap_or_else(Type::any)))
                .collect()
        };
        let fields: Vec<ExprRef> = match side {
            Side::Left => {
                let mut fields = row.var().flatten();
                fields.extend(nulls(left_arity..result_type.arity()));
                fields
            }
            Side::Right => {
                let mut fields = nulls(0..left_arity);
                fields.extend(row.var().flatten());
                fields
            }
        };
        let function = Expr::tuple(fields).closure(vec![row]);
        self.add(origin, OperatorKind::Map { function }, Type::zset(result_type.clone()), true, vec![unmatched])
    }
}
