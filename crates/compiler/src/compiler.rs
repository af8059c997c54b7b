//! The circuit compiler: state shared by the translation rules.

use crate::options::CompilerOptions;
use crate::statements::ModifyTableTranslation;
use crate::table_contents::TableContents;
use crate::type_compiler::TypeCompiler;
use alloc::format;
use alloc::vec;
use alloc::vec::Vec;
use core::mem;
use hashbrown::HashMap;
use zsql_circuit::{Circuit, Operator, OperatorId, OperatorKind, OperatorRef};
use zsql_core::{Error, Origin, Result};
use zsql_ir::{Expr, ExprExt, Param, Type, TypeRef};
use zsql_plan::{Plan, PlanId};

/// Translates plans into operators of one circuit.
///
/// Statements are compiled in order; tables and views created by earlier
/// statements are visible to later ones through the circuit's registries.
pub struct CircuitCompiler {
    pub(crate) options: CompilerOptions,
    pub(crate) circuit: Circuit,
    pub(crate) types: TypeCompiler,
    pub(crate) table_contents: TableContents,
    pub(crate) generate_output: bool,
    /// Operator implementing each plan node of the current statement.
    pub(crate) memo: HashMap<PlanId, OperatorId>,
    /// Nodes whose children are being visited, innermost last.
    pub(crate) ancestors: Vec<PlanId>,
    /// An operator already implementing a Filter node, keyed by that node.
    pub(crate) pending_filter: Option<(PlanId, OperatorId)>,
    pub(crate) modify_table: Option<ModifyTableTranslation>,
}

impl CircuitCompiler {
    pub fn new(options: CompilerOptions) -> Self {
        Self {
            circuit: Circuit::new("circuit"),
            types: TypeCompiler::new(),
            table_contents: TableContents::new(options.track_table_contents),
            generate_output: options.generate_outputs,
            memo: HashMap::new(),
            ancestors: Vec::new(),
            pending_filter: None,
            modify_table: None,
            options,
        }
    }

    pub fn options(&self) -> &CompilerOptions {
        &self.options
    }

    /// The circuit built so far.
    pub fn circuit(&self) -> &Circuit {
        &self.circuit
    }

    pub fn table_contents(&self) -> &TableContents {
        &self.table_contents
    }

    pub fn type_compiler(&self) -> &TypeCompiler {
        &self.types
    }

    /// Whether the next CREATE VIEW gets a sink or only a placeholder.
    ///
    /// The setting is sticky until changed again.
    pub fn set_generate_output_for_next_view(&mut self, generate: bool) {
        self.generate_output = generate;
    }

    /// Hands out the circuit built so far and starts a new, empty one.
    pub fn get_final_circuit(&mut self, name: &str) -> Circuit {
        self.memo.clear();
        self.ancestors.clear();
        self.pending_filter = None;
        mem::replace(&mut self.circuit, Circuit::new(name)).with_name(name)
    }

    pub(crate) fn origin(plan: &Plan, id: PlanId) -> Origin {
        Origin::node(id, plan.node(id).kind_name())
    }

    pub(crate) fn operator(&self, id: OperatorId) -> Result<OperatorRef> {
        self.circuit
            .operator_ref(id)
            .cloned()
            .ok_or_else(|| Error::invariant(format!("Unknown operator {}", id)))
    }

    pub(crate) fn add(
        &mut self,
        origin: &Origin,
        kind: OperatorKind,
        output_type: TypeRef,
        is_multiset: bool,
        inputs: Vec<OperatorId>,
    ) -> Result<OperatorId> {
        self.circuit.add_operator(Operator::new(
            origin.clone(),
            kind,
            output_type,
            is_multiset,
            inputs,
        ))
    }

    /// An operator with the same output type as its single input.
    pub(crate) fn add_same_type(
        &mut self,
        origin: &Origin,
        kind: OperatorKind,
        is_multiset: bool,
        input: OperatorId,
    ) -> Result<OperatorId> {
        let output_type = self.operator(input)?.output_type.clone();
        self.add(origin, kind, output_type, is_multiset, vec![input])
    }

    /// The operator implementing an already compiled node.
    pub(crate) fn get_operator(&self, plan: &Plan, id: PlanId) -> Result<OperatorId> {
        self.memo.get(&id).copied().ok_or_else(|| {
            Error::internal("Input was not compiled", Self::origin(plan, id))
        })
    }

    /// The operator of a compiled node, made a set unless `as_multiset`.
    pub(crate) fn get_input_as(&mut self, plan: &Plan, id: PlanId, as_multiset: bool) -> Result<OperatorId> {
        let op = self.get_operator(plan, id)?;
        let operator = self.operator(op)?;
        if operator.is_multiset && !as_multiset {
            let origin = operator.origin.clone();
            return self.add_same_type(&origin, OperatorKind::Distinct, false, op);
        }
        Ok(op)
    }

    pub(crate) fn assign_operator(&mut self, plan: &Plan, id: PlanId, op: OperatorId) -> Result<()> {
        if self.memo.insert(id, op).is_some() {
            return Err(Error::internal(
                "Node compiled twice",
                Self::origin(plan, id),
            ));
        }
        Ok(())
    }

    /// Casts the elements of `op` field by field to `element`, if they differ.
    pub(crate) fn cast_output(&mut self, origin: &Origin, op: OperatorId, element: &TypeRef) -> Result<OperatorId> {
        let source = self.operator(op)?.element_type();
        if source.same_type(element) {
            return Ok(op);
        }
        let t = Param::new("t", source);
        let fields = (0..element.arity())
            .map(|i| {
                let target = element.field_type(i).unwrap_or_else(Type::any);
                t.var().field(i).cast(&target)
            })
            .collect();
        let function = Expr::tuple(fields).closure(vec![t]);
        self.add(
            origin,
            OperatorKind::Map { function },
            Type::zset(element.clone()),
            true,
            vec![op],
        )
    }
}
