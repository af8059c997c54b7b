//! Scans, projections, filters and literal rows.

use crate::compiler::CircuitCompiler;
use crate::expression::ExpressionCompiler;
use alloc::format;
use alloc::vec;
use alloc::vec::Vec;
use zsql_circuit::{InputColumnMetadata, InputTableMetadata, OperatorId, OperatorKind};
use zsql_core::{Error, Origin, Result, Value};
use zsql_ir::{Expr, ExprExt, ExprRef, Param, Type};
use zsql_plan::{Plan, PlanId, RexNode};

impl CircuitCompiler {
    pub(crate) fn compile_scan(&mut self, plan: &Plan, id: PlanId, table: &str, external: bool) -> Result<()> {
        if let Some(source) = self.circuit.get_input(table) {
            return self.assign_operator(plan, id, source);
        }
        // A view read as a table.
        if let Some(sink) = self.circuit.get_output(table) {
            let input = self.operator(sink)?.input().ok_or_else(|| {
                Error::internal(format!("Sink {} has no input", table), Self::origin(plan, id))
            })?;
            return self.assign_operator(plan, id, input);
        }
        if let Some(noop) = self.circuit.get_noop(table) {
            return self.assign_operator(plan, id, noop);
        }
        if !external {
            return Err(Error::internal(
                format!("Could not find operator for table {}", table),
                Self::origin(plan, id),
            ));
        }
        let row_type = plan.row_type(id);
        let columns = row_type
            .fields
            .iter()
            .map(|f| InputColumnMetadata::new(f.name.clone(), self.types.convert_type(&f.ty, false)))
            .collect();
        let source = self.add(
            &Self::origin(plan, id),
            OperatorKind::Source {
                name: table.into(),
                original_row_type: self.types.convert_row_as_struct(table, row_type),
                metadata: InputTableMetadata::new(columns),
            },
            Type::zset(self.types.convert_row(row_type)),
            true,
            vec![],
        )?;
        self.assign_operator(plan, id, source)
    }

    pub(crate) fn compile_project(&mut self, plan: &Plan, id: PlanId, input: PlanId, projects: &[RexNode]) -> Result<()> {
        let origin = Self::origin(plan, id);
        let op = self.get_input_as(plan, input, true)?;
        let row = Param::new("t", self.operator(op)?.element_type());
        let output = self.types.convert_row(plan.row_type(id));
        let compiler = ExpressionCompiler::new(Some(row.clone()), &self.types, origin.clone());
        let mut fields = Vec::with_capacity(projects.len());
        for (i, project) in projects.iter().enumerate() {
            if let RexNode::Over { .. } = project {
                return Err(Error::unsupported(
                    "Optimizer should have removed OVER expressions",
                    origin,
                ));
            }
            let target = output.field_type(i).ok_or_else(|| {
                Error::internal(format!("Projection {} has no output field", i), origin.clone())
            })?;
            fields.push(compiler.compile(project)?.cast(&target));
        }
        let function = Expr::tuple(fields).closure(vec![row]);
        let map = self.add(&origin, OperatorKind::Map { function }, Type::zset(output), true, vec![op])?;
        self.assign_operator(plan, id, map)
    }

    pub(crate) fn compile_filter(&mut self, plan: &Plan, id: PlanId, input: PlanId, condition: &RexNode) -> Result<()> {
        if let Some((node, op)) = self.pending_filter.take() {
            if node != id {
                return Err(Error::internal(
                    format!("Filter replacement for node {} reached another filter", node),
                    Self::origin(plan, id),
                ));
            }
            return self.assign_operator(plan, id, op);
        }
        let origin = Self::origin(plan, id);
        let op = self.get_operator(plan, input)?;
        let operator = self.operator(op)?;
        let row = Param::new("t", operator.element_type());
        let compiler = ExpressionCompiler::new(Some(row.clone()), &self.types, origin.clone());
        let predicate = compiler.compile(condition)?.wrap_bool().closure(vec![row]);
        let filter = self.add_same_type(&origin, OperatorKind::Filter { predicate }, operator.is_multiset, op)?;
        self.assign_operator(plan, id, filter)
    }

    /// Drops rows with a NULL in any of `keys`; such rows can never join.
    pub(crate) fn filter_non_null_keys(&mut self, origin: &Origin, op: OperatorId, keys: &[usize]) -> Result<OperatorId> {
        let operator = self.operator(op)?;
        let element = operator.element_type();
        let row = Param::new("t", element.clone());
        let nullable: Vec<ExprRef> = (0..element.arity())
            .filter(|i| keys.contains(i))
            .filter(|&i| element.field_type(i).map(|t| t.may_be_null()).unwrap_or(false))
            .map(|i| row.var().field(i).is_null())
            .collect();
        let Some(any_null) = Expr::or_all(nullable) else {
            return Ok(op);
        };
        let predicate = any_null.not().closure(vec![row]);
        self.add_same_type(origin, OperatorKind::Filter { predicate }, operator.is_multiset, op)
    }

    pub(crate) fn compile_values(&mut self, plan: &Plan, id: PlanId, tuples: &[Vec<RexNode>]) -> Result<()> {
        let origin = Self::origin(plan, id);
        let source_type = self.types.convert_row(plan.row_type(id));
        let result_type = match &self.modify_table {
            Some(translation) => {
                let result_type = translation.result_type();
                if result_type.arity() != source_type.arity() {
                    return Err(Error::internal(
                        format!("Expected a tuple with {} values", result_type.arity()),
                        origin,
                    ));
                }
                result_type
            }
            None => source_type.clone(),
        };
        let compiler = ExpressionCompiler::new(None, &self.types, origin.clone());
        let mut rows = Vec::with_capacity(tuples.len());
        for tuple in tuples {
            if tuple.len() != source_type.arity() {
                return Err(Error::internal(
                    format!("Expected a tuple with {} values but got {}", source_type.arity(), tuple.len()),
                    origin,
                ));
            }
            let mut fields = Vec::with_capacity(tuple.len());
            for (i, rex) in tuple.iter().enumerate() {
                let target = result_type.field_type(i).unwrap_or_else(Type::any);
                let expr = compiler.compile(rex)?;
                let expr = if matches!(expr.as_literal(), Some(Value::Null)) {
                    Expr::none(&target)
                } else {
                    expr.cast(&target)
                };
                fields.push(expr);
            }
            rows.push((Expr::tuple(fields), 1));
        }
        let literal = Expr::zset_literal(result_type.clone(), rows);
        if let Some(translation) = self.modify_table.as_mut() {
            translation.set_result(literal);
            return Ok(());
        }
        let constant = self.add(
            &origin,
            OperatorKind::Constant { value: literal },
            Type::zset(result_type),
            false,
            vec![],
        )?;
        self.assign_operator(plan, id, constant)
    }
}

#[cfg(test)]
mod tests {
    use crate::{CircuitCompiler, CompilerOptions};
    use alloc::vec;
    use zsql_circuit::OperatorKind;
    use zsql_core::{DataType, Error, Value};
    use zsql_ir::{Expr, Type};
    use zsql_plan::{AggKind, Plan, RexNode, RowType, SqlType};

    fn int() -> SqlType {
        SqlType::scalar(DataType::Int32)
    }

    fn compile(plan: &Plan, root: usize) -> Result<CircuitCompiler, Error> {
        let mut compiler = CircuitCompiler::new(CompilerOptions::default());
        compiler.go(plan, root)?;
        Ok(compiler)
    }

    #[test]
    fn test_scan_of_unknown_table_is_internal() {
        let mut plan = Plan::new();
        let t = plan.scan("t", RowType::of(&[("x", int())]));
        assert!(compile(&plan, t).err().map(|e| e.is_internal()).unwrap_or(false));
    }

    #[test]
    fn test_project_casts_to_declared_types() {
        let mut plan = Plan::new();
        let t = plan.external_scan("t", RowType::of(&[("x", int())]));
        // Declared wider than the expression produces.
        let p = plan.add(zsql_plan::RelNode::new(
            zsql_plan::RelKind::Project {
                input: t,
                projects: vec![RexNode::input_ref(0, int())],
            },
            RowType::of(&[("y", SqlType::scalar(DataType::Int64).nullable())]),
        ));
        let compiler = compile(&plan, p).unwrap();
        let map = compiler.circuit().operator(1).unwrap();
        assert!(matches!(map.kind, OperatorKind::Map { .. }));
        assert_eq!(
            map.element_type(),
            Type::tuple(vec![Type::primitive(DataType::Int64, true)])
        );
    }

    #[test]
    fn test_over_in_project_is_unsupported() {
        let mut plan = Plan::new();
        let t = plan.external_scan("t", RowType::of(&[("x", int())]));
        let over = RexNode::Over {
            function: AggKind::RowNumber,
            ty: int(),
        };
        let p = plan.project(t, vec![over], &["r"]);
        assert!(matches!(compile(&plan, p), Err(Error::Unsupported { .. })));
    }

    #[test]
    fn test_nullable_filter_is_wrapped() {
        let mut plan = Plan::new();
        let t = plan.external_scan("t", RowType::of(&[("x", int().nullable())]));
        let cond = RexNode::gt(RexNode::input_ref(0, int().nullable()), RexNode::int32(1));
        let f = plan.filter(t, cond);
        let compiler = compile(&plan, f).unwrap();
        match &compiler.circuit().operator(1).unwrap().kind {
            OperatorKind::Filter { predicate } => {
                let (_, body) = predicate.as_closure().unwrap();
                assert!(!body.ty().may_be_null());
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_values_become_a_constant() {
        let mut plan = Plan::new();
        let v = plan.values(
            RowType::of(&[("x", int().nullable())]),
            vec![vec![Value::Int32(1)], vec![Value::Null]],
        );
        let compiler = compile(&plan, v).unwrap();
        let op = compiler.circuit().operator(0).unwrap();
        assert!(!op.is_multiset);
        match &op.kind {
            OperatorKind::Constant { value } => match &**value {
                Expr::ZSetLiteral { rows, .. } => {
                    assert_eq!(rows.len(), 2);
                    assert_eq!(rows[1].0.ty(), Type::tuple(vec![Type::primitive(DataType::Int32, true)]));
                }
                other => panic!("unexpected {:?}", other),
            },
            other => panic!("unexpected {:?}", other),
        }
    }
}
