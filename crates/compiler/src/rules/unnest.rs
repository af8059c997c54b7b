//! UNNEST, alone or correlated with the row holding the array.

use crate::compiler::CircuitCompiler;
use alloc::format;
use alloc::sync::Arc;
use alloc::vec;
use alloc::vec::Vec;
use zsql_circuit::OperatorKind;
use zsql_core::{Error, Result};
use zsql_ir::{Expr, FlatmapField, Type};
use zsql_plan::{JoinType, Plan, PlanId, RelKind, RexNode};

impl CircuitCompiler {
    /// Only `Correlate(left, Uncollect(Project($cor.field)))` is supported.
    /// The right subtree is read as a pattern and never compiled.
    pub(crate) fn compile_correlate(
        &mut self,
        plan: &Plan,
        id: PlanId,
        left: PlanId,
        right: PlanId,
        join_type: JoinType,
    ) -> Result<()> {
        let origin = Self::origin(plan, id);
        let output = self.types.convert_row(plan.row_type(id));
        if join_type.is_outer() {
            return Err(Error::unimplemented(
                format!("{:?} correlated UNNEST", join_type),
                origin,
            ));
        }
        self.go(plan, left)?;
        let left_op = self.get_input_as(plan, left, true)?;
        let left_element = self.operator(left_op)?.element_type();

        let unsupported = || Error::unimplemented("Correlated subquery other than UNNEST", origin.clone());
        let Some(RelKind::Uncollect {
            input,
            with_ordinality,
        }) = plan.get(right).map(|n| &n.kind)
        else {
            return Err(unsupported());
        };
        let Some(RelKind::Project { projects, .. }) = plan.get(*input).map(|n| &n.kind) else {
            return Err(unsupported());
        };
        let [RexNode::FieldAccess { field, .. }] = projects.as_slice() else {
            return Err(unsupported());
        };
        let collection_field = plan.row_type(left).index_of(field).ok_or_else(|| {
            Error::internal(format!("Row has no field named {}", field), origin.clone())
        })?;

        let mut fields: Vec<FlatmapField> = (0..left_element.arity()).map(FlatmapField::Input).collect();
        fields.push(FlatmapField::Element);
        let index_type = if *with_ordinality {
            fields.push(FlatmapField::Index);
            output.field_type(output.arity().saturating_sub(1))
        } else {
            None
        };
        let function = Arc::new(Expr::Flatmap {
            input: left_element,
            collection_field,
            output: fields,
            index_type,
        });
        let flat_map = self.add(
            &Self::origin(plan, right),
            OperatorKind::FlatMap { function },
            Type::zset(output),
            true,
            vec![left_op],
        )?;
        self.assign_operator(plan, id, flat_map)
    }

    /// Unnests the single array field of the input.
    pub(crate) fn compile_uncollect(&mut self, plan: &Plan, id: PlanId, input: PlanId, with_ordinality: bool) -> Result<()> {
        let origin = Self::origin(plan, id);
        let output = self.types.convert_row(plan.row_type(id));
        let op_input = self.get_input_as(plan, input, true)?;
        let input_type = self.operator(op_input)?.element_type();
        let mut fields = vec![FlatmapField::Element];
        let index_type = if with_ordinality {
            fields.push(FlatmapField::Index);
            output.field_type(1)
        } else {
            None
        };
        let function = Arc::new(Expr::Flatmap {
            input: input_type,
            collection_field: 0,
            output: fields,
            index_type,
        });
        let flat_map = self.add(
            &origin,
            OperatorKind::FlatMap { function },
            Type::zset(output),
            true,
            vec![op_input],
        )?;
        self.assign_operator(plan, id, flat_map)
    }
}

#[cfg(test)]
mod tests {
    use crate::{CircuitCompiler, CompilerOptions};
    use alloc::vec;
    use zsql_circuit::OperatorKind;
    use zsql_core::{DataType, Value};
    use zsql_ir::{Expr, FlatmapField};
    use zsql_plan::{JoinType, Plan, PlanId, RexNode, RowType, SqlType};

    fn int() -> SqlType {
        SqlType::scalar(DataType::Int32)
    }

    fn unnest_plan(join_type: JoinType, ordinality: bool) -> (Plan, PlanId) {
        let mut plan = Plan::new();
        let arr = SqlType::array(int());
        let t = plan.external_scan("t", RowType::of(&[("id", int()), ("arr", arr.clone())]));
        let one = plan.values(RowType::of(&[("zero", int())]), vec![vec![Value::Int32(0)]]);
        let project = plan.project(one, vec![RexNode::field_access(0, "ARR", arr)], &["arr"]);
        let uncollect = plan.uncollect(project, ordinality);
        let correlate = plan.correlate(t, uncollect, join_type);
        (plan, correlate)
    }

    #[test]
    fn test_correlated_unnest_is_a_flatmap() {
        let (plan, root) = unnest_plan(JoinType::Inner, true);
        let mut compiler = CircuitCompiler::new(CompilerOptions::default());
        compiler.go(&plan, root).unwrap();
        // The values and projection under the uncollect are never compiled.
        assert_eq!(compiler.circuit().len(), 2);
        let op = compiler.circuit().operator(1).unwrap();
        assert_eq!(op.element_type().arity(), 4);
        match &op.kind {
            OperatorKind::FlatMap { function } => match &**function {
                Expr::Flatmap {
                    collection_field,
                    output,
                    index_type,
                    ..
                } => {
                    assert_eq!(*collection_field, 1);
                    assert_eq!(
                        output,
                        &vec![
                            FlatmapField::Input(0),
                            FlatmapField::Input(1),
                            FlatmapField::Element,
                            FlatmapField::Index
                        ]
                    );
                    assert!(index_type.is_some());
                }
                other => panic!("unexpected {:?}", other),
            },
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_outer_correlate_is_unimplemented() {
        let (plan, root) = unnest_plan(JoinType::Left, false);
        let mut compiler = CircuitCompiler::new(CompilerOptions::default());
        assert!(compiler.go(&plan, root).unwrap_err().is_unimplemented());
    }

    #[test]
    fn test_plain_uncollect() {
        let mut plan = Plan::new();
        let t = plan.external_scan("t", RowType::of(&[("arr", SqlType::array(int()))]));
        let u = plan.uncollect(t, false);
        let mut compiler = CircuitCompiler::new(CompilerOptions::default());
        compiler.go(&plan, u).unwrap();
        let op = compiler.circuit().operator(1).unwrap();
        assert!(matches!(op.kind, OperatorKind::FlatMap { .. }));
        assert_eq!(op.element_type().arity(), 1);
    }
}
