//! GROUP BY, grouping sets and plain DISTINCT.

use crate::aggregate_builder::AggregateBuilder;
use crate::compiler::CircuitCompiler;
use alloc::vec;
use alloc::vec::Vec;
use zsql_circuit::{AggregateBody, OperatorId, OperatorKind};
use zsql_core::{Origin, Result};
use zsql_ir::{Expr, ExprExt, ExprRef, Param, Type, TypeRef};
use zsql_plan::{AggregateCall, Plan, PlanId};

/// Grouping sets to evaluate, widest first.
fn plan_groups(group_set: &[usize], group_sets: &[Vec<usize>]) -> Vec<Vec<usize>> {
    let mut ordered: Vec<Vec<usize>> = if group_sets.is_empty() {
        vec![group_set.to_vec()]
    } else {
        group_sets.to_vec()
    };
    ordered.sort_by_key(|set| set.len());
    ordered.reverse();
    ordered
}

impl CircuitCompiler {
    pub(crate) fn compile_aggregate(
        &mut self,
        plan: &Plan,
        id: PlanId,
        input: PlanId,
        group_set: &[usize],
        group_sets: &[Vec<usize>],
        calls: &[AggregateCall],
    ) -> Result<()> {
        let origin = Self::origin(plan, id);
        let groups = plan_groups(group_set, group_sets);
        if calls.is_empty() && groups.len() == 1 {
            // SELECT DISTINCT
            let op = self.get_input_as(plan, input, true)?;
            let distinct = self.add_same_type(&origin, OperatorKind::Distinct, false, op)?;
            return self.assign_operator(plan, id, distinct);
        }
        let output = self.types.convert_row(plan.row_type(id));
        let mut parts = Vec::with_capacity(groups.len());
        for local in &groups {
            parts.push(self.implement_grouping(plan, id, input, group_set, local, calls)?);
        }
        let sum = self.add(&origin, OperatorKind::Sum, Type::zset(output), true, parts)?;
        self.assign_operator(plan, id, sum)
    }

    /// One grouping set, re-keyed to the full group key and flattened.
    fn implement_grouping(
        &mut self,
        plan: &Plan,
        id: PlanId,
        input: PlanId,
        group_set: &[usize],
        local: &[usize],
        calls: &[AggregateCall],
    ) -> Result<OperatorId> {
        let origin = Self::origin(plan, id);
        let op_input = self.get_input_as(plan, input, true)?;
        let input_type = self.operator(op_input)?.element_type();
        let output = self.types.convert_row(plan.row_type(id));
        let group_count = group_set.len();
        let output_field = |i: usize| output.field_type(i).unwrap_or_else(Type::any);

        let aggregate = AggregateBuilder::new(&self.types, Param::new("v", input_type.clone()), origin.clone())
            .build(calls)?;
        let zero_type = aggregate.default_zero_type();

        // Key positions present in this grouping set.
        let positions: Vec<usize> = (0..group_count)
            .filter(|&p| local.contains(&group_set[p]))
            .collect();
        let t = Param::new("t", input_type.clone());
        let local_key: Vec<ExprRef> = positions
            .iter()
            .map(|&p| t.var().field(group_set[p]).cast(&output_field(p)))
            .collect();
        let local_key = Expr::tuple(local_key);
        let local_key_type = local_key.ty();
        let function = Expr::raw_tuple(vec![local_key, Expr::tuple(t.var().flatten())]).closure(vec![t]);
        let index = self.add(
            &origin,
            OperatorKind::Index { function },
            Type::indexed_zset(local_key_type.clone(), input_type.clone()),
            false,
            vec![op_input],
        )?;

        let grouped_type = Type::indexed_zset(local_key_type.clone(), zero_type.clone());
        let grouped = if aggregate.is_empty() {
            let kv = Param::new("t", Type::raw_tuple(vec![local_key_type.clone(), input_type]));
            let function = Expr::raw_tuple(vec![kv.var().field(0), Expr::tuple(vec![])]).closure(vec![kv]);
            let keys = self.add(&origin, OperatorKind::MapIndex { function }, grouped_type, true, vec![index])?;
            self.add_same_type(&origin, OperatorKind::Distinct, false, keys)?
        } else {
            let linear = aggregate.is_linear();
            self.add(
                &origin,
                OperatorKind::StreamAggregate {
                    body: AggregateBody::Aggregate(aggregate.clone()),
                    linear,
                },
                grouped_type,
                false,
                vec![index],
            )?
        };

        let global_key_type = Type::tuple((0..group_count).map(output_field).collect());
        let adjusted = if positions.len() == group_count {
            grouped
        } else {
            let kv = Param::new("t", Type::raw_tuple(vec![local_key_type, zero_type.clone()]));
            let mut local_index = 0;
            let mut fields = Vec::with_capacity(group_count);
            for p in 0..group_count {
                if positions.contains(&p) {
                    fields.push(kv.var().field(0).field(local_index));
                    local_index += 1;
                } else {
                    fields.push(Expr::none(&output_field(p)));
                }
            }
            let function = Expr::raw_tuple(vec![Expr::tuple(fields), kv.var().field(1)]).closure(vec![kv]);
            self.add(
                &origin,
                OperatorKind::MapIndex { function },
                Type::indexed_zset(global_key_type.clone(), zero_type.clone()),
                false,
                vec![grouped],
            )?
        };

        let kv = Param::new("kv", Type::raw_tuple(vec![global_key_type, zero_type.clone()]));
        let mut fields = Vec::with_capacity(output.arity());
        for i in 0..group_count {
            fields.push(kv.var().field(0).field(i).cast(&output_field(i)));
        }
        for i in 0..zero_type.arity() {
            fields.push(kv.var().field(1).field(i).cast(&output_field(group_count + i)));
        }
        let function = Expr::tuple(fields).closure(vec![kv]);
        let flat = self.add(&origin, OperatorKind::Map { function }, Type::zset(output.clone()), true, vec![adjusted])?;
        if group_count != 0 || calls.is_empty() {
            return Ok(flat);
        }

        let zero = Expr::tuple(
            aggregate
                .implementations
                .iter()
                .enumerate()
                .map(|(i, imp)| imp.empty_result.cast(&output_field(i)))
                .collect(),
        );
        self.correct_empty_input(&origin, flat, zero, &output)
    }

    /// `zero - zero(actual) + actual`: a fold over an empty input yields no
    /// row at all, but a global aggregate must yield exactly one.
    fn correct_empty_input(
        &mut self,
        origin: &Origin,
        actual: OperatorId,
        zero: ExprRef,
        output: &TypeRef,
    ) -> Result<OperatorId> {
        let t = Param::new("_t", output.clone());
        let function = zero.clone().closure(vec![t]);
        let zeros = self.add(origin, OperatorKind::Map { function }, Type::zset(output.clone()), true, vec![actual])?;
        let negated = self.add_same_type(origin, OperatorKind::Negate, true, zeros)?;
        let constant = self.add(
            origin,
            OperatorKind::Constant {
                value: Expr::zset_literal(output.clone(), vec![(zero, 1)]),
            },
            Type::zset(output.clone()),
            false,
            vec![],
        )?;
        self.add(
            origin,
            OperatorKind::Sum,
            Type::zset(output.clone()),
            true,
            vec![constant, negated, actual],
        )
    }
}

#[cfg(test)]
mod tests {
    use super::plan_groups;
    use crate::{CircuitCompiler, CompilerOptions};
    use alloc::vec;
    use alloc::vec::Vec;
    use zsql_circuit::OperatorKind;
    use zsql_core::DataType;
    use zsql_plan::{AggKind, AggregateCall, Plan, PlanId, RowType, SqlType};

    fn int() -> SqlType {
        SqlType::scalar(DataType::Int32)
    }

    fn table(plan: &mut Plan) -> PlanId {
        plan.external_scan("t", RowType::of(&[("a", int()), ("b", int()), ("c", int())]))
    }

    fn kinds(plan: &Plan, root: PlanId) -> Vec<&'static str> {
        let mut compiler = CircuitCompiler::new(CompilerOptions::default());
        compiler.go(plan, root).unwrap();
        compiler.circuit().operators().map(|(_, op)| op.kind.name()).collect()
    }

    #[test]
    fn test_groups_widest_first() {
        let groups = plan_groups(&[0, 1], &[vec![], vec![0, 1], vec![0]]);
        assert_eq!(groups, vec![vec![0, 1], vec![0], vec![]]);
        assert_eq!(plan_groups(&[2], &[]), vec![vec![2]]);
    }

    #[test]
    fn test_distinct_without_calls() {
        let mut plan = Plan::new();
        let t = table(&mut plan);
        let agg = plan.aggregate(t, vec![0], vec![]);
        assert_eq!(kinds(&plan, agg), ["source", "distinct"]);
    }

    #[test]
    fn test_grouped_count() {
        let mut plan = Plan::new();
        let t = table(&mut plan);
        let agg = plan.aggregate(t, vec![1], vec![AggregateCall::count_star()]);
        assert_eq!(kinds(&plan, agg), ["source", "index", "stream_aggregate", "map", "sum"]);
    }

    #[test]
    fn test_global_aggregate_is_corrected_for_empty_input() {
        let mut plan = Plan::new();
        let t = table(&mut plan);
        let agg = plan.aggregate(t, vec![], vec![AggregateCall::count_star()]);
        assert_eq!(
            kinds(&plan, agg),
            ["source", "index", "stream_aggregate", "map", "map", "neg", "constant", "sum", "sum"]
        );
    }

    #[test]
    fn test_rollup_rekeys_partial_groups() {
        let mut plan = Plan::new();
        let t = table(&mut plan);
        let sum = AggregateCall::new(AggKind::Sum, vec![2], int().nullable());
        let agg = plan.aggregate_with_sets(t, vec![0, 1], vec![vec![0, 1], vec![0], vec![]], vec![sum]);
        let mut compiler = CircuitCompiler::new(CompilerOptions::default());
        compiler.go(&plan, agg).unwrap();
        let circuit = compiler.circuit();
        let remaps = circuit
            .operators()
            .filter(|(_, op)| matches!(op.kind, OperatorKind::MapIndex { .. }))
            .count();
        assert_eq!(remaps, 2);
        let last = circuit.operator(circuit.len() - 1).unwrap();
        assert!(matches!(last.kind, OperatorKind::Sum));
        assert_eq!(last.inputs.len(), 3);
        // Both key columns become nullable under the rollup.
        let element = last.element_type();
        assert!(element.field_type(0).unwrap().may_be_null());
        assert!(element.field_type(1).unwrap().may_be_null());
    }
}
