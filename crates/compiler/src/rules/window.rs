//! OVER clauses: range-window aggregates and the ranking top-k pattern.

use crate::aggregate_builder::AggregateBuilder;
use crate::compiler::CircuitCompiler;
use crate::expression::ExpressionCompiler;
use alloc::format;
use alloc::sync::Arc;
use alloc::vec;
use alloc::vec::Vec;
use zsql_circuit::{Numbering, OperatorId, OperatorKind, RelDirection, RelOffset, RelRange};
use zsql_core::{DataType, Error, Origin, Result, Value};
use zsql_ir::{Expr, ExprExt, ExprRef, Param, Type, TypeRef};
use zsql_plan::{
    AggKind, AggregateCall, BoundKind, Direction, FieldCollation, Plan, PlanId, RelKind, RexNode,
    RexOp, WindowBound, WindowGroup,
};

/// A comparator ordering rows by `collation`, earlier fields first.
pub(crate) fn order_comparator(element: &TypeRef, collation: &[FieldCollation], origin: &Origin) -> Result<ExprRef> {
    let mut comparator = Expr::no_comparator(element.clone());
    for c in collation {
        let ascending = match c.direction {
            Direction::Ascending => true,
            Direction::Descending => false,
            other => {
                return Err(Error::unimplemented(
                    format!("Sort direction {:?}", other),
                    origin.clone(),
                ))
            }
        };
        comparator = Arc::new(Expr::FieldComparator {
            source: comparator,
            field: c.field,
            ascending,
        });
    }
    Ok(comparator)
}

/// The bound a comparison of field `index` with an integer literal puts on
/// that field. Strict comparisons tighten the bound by one.
fn limit_value(compared: &RexNode, index: usize, limit: &RexNode, inclusive: bool) -> Option<i64> {
    if compared.as_input_ref() != Some(index) {
        return None;
    }
    let RexNode::Literal { value, ty } = limit else {
        return None;
    };
    if !ty.is_integer() {
        return None;
    }
    let value = value.as_i64()?;
    let value = if inclusive { value } else { value - 1 };
    (value >= 0).then_some(value)
}

/// Recognizes `field <op> constant` and its mirror image as a row limit.
///
/// Equality only qualifies as `field = 1`, the smallest rank there is.
pub(crate) fn is_limit(condition: &RexNode, index: usize) -> Option<i64> {
    let (op, operands) = condition.as_call()?;
    let [left, right] = operands else {
        return None;
    };
    match op {
        RexOp::Eq => (limit_value(left, index, right, true) == Some(1)).then_some(1),
        RexOp::Lt => limit_value(left, index, right, false),
        RexOp::LtEq => limit_value(left, index, right, true),
        RexOp::Gt => limit_value(right, index, left, false),
        RexOp::GtEq => limit_value(right, index, left, true),
        _ => None,
    }
}

impl CircuitCompiler {
    pub(crate) fn compile_window(
        &mut self,
        plan: &Plan,
        id: PlanId,
        input: PlanId,
        groups: &[WindowGroup],
        constants: &[RexNode],
    ) -> Result<()> {
        let origin = Self::origin(plan, id);
        let op_input = self.get_input_as(plan, input, true)?;
        let input_arity = self.operator(op_input)?.element_type().arity();

        if let Some((filter, limit)) = self.ranking_limit(plan, groups, input_arity) {
            return self.compile_nested_topk(plan, id, op_input, &groups[0], limit, filter);
        }

        let output = self.types.convert_row(plan.row_type(id));
        let mut last = op_input;
        let mut field_index = input_arity;
        for group in groups {
            let mut run: Vec<AggregateCall> = Vec::new();
            for call in &group.calls {
                if call.kind.is_lead_lag() {
                    return Err(Error::unimplemented(
                        format!("{:?} over a window", call.kind),
                        origin,
                    ));
                }
                run.push(call.clone());
            }
            if !run.is_empty() {
                last = self.window_aggregates(&origin, op_input, last, group, &run, field_index, constants, &output)?;
                field_index += run.len();
            }
        }
        self.assign_operator(plan, id, last)
    }

    /// The parent filter and its limit, when a single ranking call is
    /// immediately bounded by that filter.
    fn ranking_limit(&self, plan: &Plan, groups: &[WindowGroup], input_arity: usize) -> Option<(PlanId, i64)> {
        let [group] = groups else {
            return None;
        };
        let [call] = group.calls.as_slice() else {
            return None;
        };
        if !call.kind.is_ranking() {
            return None;
        }
        let parent = self.parent()?;
        let RelKind::Filter { condition, .. } = &plan.get(parent)?.kind else {
            return None;
        };
        is_limit(condition, input_arity).map(|limit| (parent, limit))
    }

    fn compile_nested_topk(
        &mut self,
        plan: &Plan,
        id: PlanId,
        input: OperatorId,
        group: &WindowGroup,
        limit: i64,
        filter: PlanId,
    ) -> Result<()> {
        let origin = Self::origin(plan, id);
        let call = &group.calls[0];
        tracing::debug!(window = id, filter, limit, "Fusing ranking filter into top-k");
        let numbering = match call.kind {
            AggKind::Rank => Numbering::Rank,
            AggKind::DenseRank => Numbering::DenseRank,
            AggKind::RowNumber => Numbering::RowNumber,
            other => {
                return Err(Error::unimplemented(
                    format!("Ranking function {:?}", other),
                    origin,
                ))
            }
        };
        let input_op = self.operator(input)?;
        let input_type = input_op.element_type();
        let index = self.index_partition(&origin, input, &group.keys)?;
        let key_type = self.key_type(index)?;
        let comparator = order_comparator(&input_type, &group.order_keys, &origin)?;

        // The rank is appended after the input columns.
        let output = self.types.convert_row(plan.row_type(id));
        let rank_type = output
            .field_type(input_type.arity())
            .unwrap_or_else(|| Type::int64(false));
        let rank = Param::new("rank", Type::int64(false));
        let row = Param::new("row", input_type);
        let mut fields = row.var().flatten();
        fields.push(rank.var().cast(&rank_type));
        let output_producer = Expr::tuple(fields).closure(vec![rank, row]);

        let diff = self.add_same_type(&origin, OperatorKind::Differentiate, input_op.is_multiset, index)?;
        let topk = self.add(
            &origin,
            OperatorKind::IndexedTopK {
                numbering,
                comparator,
                limit: Expr::i64_literal(limit),
                output_producer: Some(output_producer),
            },
            Type::indexed_zset(key_type, output.clone()),
            false,
            vec![diff],
        )?;
        let integral = self.add_same_type(&origin, OperatorKind::Integrate, false, topk)?;
        let deindex = self.add(&origin, OperatorKind::Deindex, Type::zset(output), false, vec![integral])?;
        if self.pending_filter.is_some() {
            return Err(Error::internal("Unexpected filter implementation", origin));
        }
        self.pending_filter = Some((filter, deindex));
        self.assign_operator(plan, id, deindex)
    }

    /// Indexes rows by the partition fields `keys`, keeping the whole row.
    pub(crate) fn index_partition(&mut self, origin: &Origin, op: OperatorId, keys: &[usize]) -> Result<OperatorId> {
        let operator = self.operator(op)?;
        let element = operator.element_type();
        let t = Param::new("t", element.clone());
        let key = Expr::tuple(keys.iter().map(|&k| t.var().field(k)).collect());
        let key_type = key.ty();
        let function = Expr::raw_tuple(vec![key, Expr::tuple(t.var().flatten())]).closure(vec![t]);
        self.add(
            origin,
            OperatorKind::Index { function },
            Type::indexed_zset(key_type, element),
            operator.is_multiset,
            vec![op],
        )
    }

    fn key_type(&self, op: OperatorId) -> Result<TypeRef> {
        self.operator(op)?
            .output_type
            .key_value_types()
            .map(|(k, _)| k)
            .ok_or_else(|| Error::invariant(format!("Operator {} is not indexed", op)))
    }

    /// One group's run of ordinary aggregate calls, joined back onto `last`.
    #[allow(clippy::too_many_arguments)]
    fn window_aggregates(
        &mut self,
        origin: &Origin,
        input: OperatorId,
        last: OperatorId,
        group: &WindowGroup,
        calls: &[AggregateCall],
        field_index: usize,
        constants: &[RexNode],
        output: &TypeRef,
    ) -> Result<OperatorId> {
        let input_type = self.operator(input)?.element_type();
        let collation = match group.order_keys.as_slice() {
            [collation] => *collation,
            [] => return Err(Error::unimplemented("OVER without ORDER BY", origin.clone())),
            _ => {
                return Err(Error::unimplemented(
                    "ORDER BY not yet supported with multiple columns",
                    origin.clone(),
                ))
            }
        };
        if collation.direction != Direction::Ascending {
            return Err(Error::unimplemented("OVER only supports ascending sorting", origin.clone()));
        }
        let order_column = collation.field;
        let sort_type = input_type.field_type(order_column).unwrap_or_else(Type::any);
        let sort = match sort_type.data_type() {
            Some(dt) if dt.is_window_orderable() => dt,
            _ => {
                return Err(Error::unimplemented(
                    format!("OVER cannot order by {}", sort_type),
                    origin.clone(),
                ))
            }
        };
        if sort_type.may_be_null() {
            return Err(Error::unimplemented(
                format!("OVER cannot order by nullable column {}", order_column),
                origin.clone(),
            ));
        }

        // |t| (partition, (order, row))
        let t = Param::new("t", input_type.clone());
        let partition = Expr::tuple(group.keys.iter().map(|&k| t.var().field(k)).collect());
        let partition_type = partition.ty();
        let order_and_row = Expr::tuple(vec![t.var().field(order_column), t.var()]);
        let order_and_row_type = order_and_row.ty();
        let function = Expr::raw_tuple(vec![partition, order_and_row]).closure(vec![t.clone()]);
        let index = self.add(
            origin,
            OperatorKind::Index { function },
            Type::indexed_zset(partition_type.clone(), order_and_row_type),
            true,
            vec![input],
        )?;
        let diff = self.add_same_type(origin, OperatorKind::Differentiate, true, index)?;

        let compiler = ExpressionCompiler::new(Some(t), &self.types, origin.clone()).with_constants(constants);
        let window = RelRange {
            lower: window_bound(&group.lower, sort, &compiler, origin)?,
            upper: window_bound(&group.upper, sort, &compiler, origin)?,
        };
        let aggregate = AggregateBuilder::new(&self.types, Param::new("v", input_type), origin.clone()).build(calls)?;
        let result_type = aggregate.default_zero_type();
        let key_type = Type::tuple(vec![partition_type, sort_type]);
        let window_agg = self.add(
            origin,
            OperatorKind::WindowAggregate { aggregate, window },
            Type::indexed_zset(key_type.clone(), result_type.clone()),
            false,
            vec![diff],
        )?;
        let integral = self.add_same_type(origin, OperatorKind::Integrate, false, window_agg)?;

        // Index the running result by (partition, order) and append the new columns.
        let last_op = self.operator(last)?;
        let last_type = last_op.element_type();
        let row = Param::new("t", last_type.clone());
        let key = Expr::tuple(vec![
            Expr::tuple(group.keys.iter().map(|&k| row.var().field(k)).collect()),
            row.var().field(order_column),
        ]);
        let function = Expr::raw_tuple(vec![key, Expr::tuple(row.var().flatten())]).closure(vec![row]);
        let indexed_last = self.add(
            origin,
            OperatorKind::Index { function },
            Type::indexed_zset(key_type.clone(), last_type.clone()),
            last_op.is_multiset,
            vec![last],
        )?;

        let k = Param::new("k", key_type);
        let l = Param::new("l", last_type);
        let r = Param::new("r", result_type.clone());
        let mut fields = l.var().flatten();
        for i in 0..result_type.arity() {
            let target = output.field_type(field_index + i).unwrap_or_else(Type::any);
            fields.push(r.var().field(i).cast(&target));
        }
        let body = Expr::tuple(fields);
        let joined_type = body.ty();
        self.add(
            origin,
            OperatorKind::Join {
                function: body.closure(vec![k, l, r]),
            },
            Type::zset(joined_type),
            last_op.is_multiset,
            vec![indexed_last, integral],
        )
    }
}

fn window_bound(
    bound: &WindowBound,
    sort: DataType,
    compiler: &ExpressionCompiler<'_>,
    origin: &Origin,
) -> Result<RelOffset> {
    let sort_type = Type::primitive(sort, false);
    let sentinel = |value: Option<Value>| {
        value
            .map(|v| Expr::literal(v, sort_type.clone()))
            .ok_or_else(|| Error::internal(format!("No window bound for {}", sort_type), origin.clone()))
    };
    let value = match &bound.kind {
        BoundKind::Unbounded => sentinel(Value::max_for_type(sort))?,
        BoundKind::CurrentRow => sentinel(Value::zero_for_type(sort))?,
        BoundKind::Offset(offset) => compiler.compile(offset)?.cast(&sort_type),
    };
    let direction = if bound.preceding {
        RelDirection::Before
    } else {
        RelDirection::After
    };
    Ok(RelOffset { direction, value })
}

#[cfg(test)]
mod tests {
    use super::is_limit;
    use crate::{CircuitCompiler, CompilerOptions};
    use alloc::vec;
    use alloc::vec::Vec;
    use zsql_circuit::OperatorKind;
    use zsql_core::{DataType, Error};
    use zsql_plan::{
        AggKind, AggregateCall, FieldCollation, Plan, PlanId, RexNode, RowType, SqlType, WindowBound,
        WindowGroup,
    };

    fn int() -> SqlType {
        SqlType::scalar(DataType::Int32)
    }

    fn rank_ref() -> RexNode {
        RexNode::input_ref(2, SqlType::scalar(DataType::Int64))
    }

    #[test]
    fn test_limit_shapes() {
        assert_eq!(is_limit(&RexNode::lt_eq(rank_ref(), RexNode::int32(3)), 2), Some(3));
        assert_eq!(is_limit(&RexNode::lt(rank_ref(), RexNode::int32(3)), 2), Some(2));
        assert_eq!(is_limit(&RexNode::gt_eq(RexNode::int32(3), rank_ref()), 2), Some(3));
        assert_eq!(is_limit(&RexNode::gt(RexNode::int32(3), rank_ref()), 2), Some(2));
        assert_eq!(is_limit(&RexNode::eq(rank_ref(), RexNode::int32(1)), 2), Some(1));
        assert_eq!(is_limit(&RexNode::eq(rank_ref(), RexNode::int32(2)), 2), None);
        assert_eq!(is_limit(&RexNode::not_eq(rank_ref(), RexNode::int32(1)), 2), None);
        assert_eq!(is_limit(&RexNode::lt_eq(rank_ref(), RexNode::int32(3)), 1), None);
    }

    #[test]
    fn test_constant_on_the_left_of_equality_is_not_a_limit() {
        assert_eq!(is_limit(&RexNode::eq(RexNode::int32(1), rank_ref()), 2), None);
    }

    fn table(plan: &mut Plan, order: SqlType) -> PlanId {
        plan.external_scan("t", RowType::of(&[("p", int()), ("o", order)]))
    }

    fn kinds(compiler: &CircuitCompiler) -> Vec<&'static str> {
        compiler.circuit().operators().map(|(_, op)| op.kind.name()).collect()
    }

    fn compile(plan: &Plan, root: PlanId) -> Result<CircuitCompiler, Error> {
        let mut compiler = CircuitCompiler::new(CompilerOptions::default());
        compiler.go(plan, root)?;
        Ok(compiler)
    }

    #[test]
    fn test_rank_filter_becomes_topk() {
        let mut plan = Plan::new();
        let t = table(&mut plan, int());
        let rank = AggregateCall::new(AggKind::Rank, vec![], SqlType::scalar(DataType::Int64));
        let w = plan.window(t, vec![WindowGroup::new(vec![0], vec![FieldCollation::asc(1)], vec![rank])], vec![]);
        let f = plan.filter(w, RexNode::lt_eq(rank_ref(), RexNode::int32(3)));
        let compiler = compile(&plan, f).unwrap();
        assert_eq!(
            kinds(&compiler),
            ["source", "index", "differentiate", "topk", "integrate", "deindex"]
        );
        assert!(compiler.pending_filter.is_none());
    }

    #[test]
    fn test_rank_without_limit_is_unimplemented() {
        let mut plan = Plan::new();
        let t = table(&mut plan, int());
        let rank = AggregateCall::new(AggKind::Rank, vec![], SqlType::scalar(DataType::Int64));
        let w = plan.window(t, vec![WindowGroup::new(vec![0], vec![FieldCollation::asc(1)], vec![rank])], vec![]);
        let f = plan.filter(w, RexNode::eq(RexNode::int32(1), rank_ref()));
        assert!(compile(&plan, f).err().map(|e| e.is_unimplemented()).unwrap_or(false));
    }

    #[test]
    fn test_running_sum_joins_back() {
        let mut plan = Plan::new();
        let t = table(&mut plan, int());
        let sum = AggregateCall::new(AggKind::Sum, vec![0], int().nullable());
        let group = WindowGroup::new(vec![0], vec![FieldCollation::asc(1)], vec![sum])
            .with_frame(WindowBound::preceding(RexNode::int32(2)), WindowBound::current_row());
        let w = plan.window(t, vec![group], vec![]);
        let compiler = compile(&plan, w).unwrap();
        assert_eq!(
            kinds(&compiler),
            ["source", "index", "differentiate", "window_aggregate", "integrate", "index", "join"]
        );
        let join = compiler.circuit().operator(6).unwrap();
        assert_eq!(join.element_type().arity(), 3);
        assert!(matches!(
            compiler.circuit().operator(3).map(|o| &o.kind),
            Some(OperatorKind::WindowAggregate { .. })
        ));
    }

    #[test]
    fn test_unsupported_windows() {
        let sum = || AggregateCall::new(AggKind::Sum, vec![0], int().nullable());
        let cases: Vec<(SqlType, WindowGroup)> = vec![
            (int().nullable(), WindowGroup::new(vec![0], vec![FieldCollation::asc(1)], vec![sum()])),
            (SqlType::scalar(DataType::String), WindowGroup::new(vec![0], vec![FieldCollation::asc(1)], vec![sum()])),
            (int(), WindowGroup::new(vec![0], vec![FieldCollation::desc(1)], vec![sum()])),
            (int(), WindowGroup::new(vec![0], vec![], vec![sum()])),
            (
                int(),
                WindowGroup::new(
                    vec![0],
                    vec![FieldCollation::asc(1)],
                    vec![AggregateCall::new(AggKind::Lag, vec![0], int().nullable())],
                ),
            ),
        ];
        for (order, group) in cases {
            let mut plan = Plan::new();
            let t = table(&mut plan, order);
            let w = plan.window(t, vec![group], vec![]);
            assert!(compile(&plan, w).err().map(|e| e.is_unimplemented()).unwrap_or(false));
        }
    }
}
