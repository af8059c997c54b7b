//! Depth-first, memoized traversal of a plan.

use crate::compiler::CircuitCompiler;
use alloc::format;
use zsql_core::{Error, Origin, Result};
use zsql_plan::{Plan, PlanId, RelKind};

impl CircuitCompiler {
    /// Compiles `id` after everything it reads from.
    ///
    /// A node reachable along several paths is compiled once. Correlate nodes
    /// do not visit their children here; their rule reads the subtree itself.
    pub(crate) fn go(&mut self, plan: &Plan, id: PlanId) -> Result<()> {
        if self.memo.contains_key(&id) {
            return Ok(());
        }
        let node = plan.get(id).ok_or_else(|| {
            Error::internal(format!("Unknown plan node {}", id), Origin::describe("plan"))
        })?;
        if !matches!(node.kind, RelKind::Correlate { .. }) {
            self.ancestors.push(id);
            for input in node.inputs() {
                self.go(plan, input)?;
            }
            self.ancestors.pop();
        }
        tracing::debug!(node = id, kind = %node.kind_name(), "Processing node");
        match &node.kind {
            RelKind::Scan { table, external } => self.compile_scan(plan, id, table, *external),
            RelKind::Project { input, projects } => self.compile_project(plan, id, *input, projects),
            RelKind::Union { inputs, all } => self.compile_union(plan, id, inputs, *all),
            RelKind::Minus { inputs, all } => self.compile_minus(plan, id, inputs, *all),
            RelKind::Filter { input, condition } => self.compile_filter(plan, id, *input, condition),
            RelKind::Values { tuples } => self.compile_values(plan, id, tuples),
            RelKind::Aggregate {
                input,
                group_set,
                group_sets,
                calls,
            } => self.compile_aggregate(plan, id, *input, group_set, group_sets, calls),
            RelKind::Join {
                inputs,
                condition,
                join_type,
            } => self.compile_join(plan, id, inputs, condition, *join_type),
            RelKind::Intersect { inputs, .. } => self.compile_intersect(plan, id, inputs),
            RelKind::Window {
                input,
                groups,
                constants,
            } => self.compile_window(plan, id, *input, groups, constants),
            RelKind::Sort {
                input,
                collation,
                fetch,
                offset,
            } => self.compile_sort(plan, id, *input, collation, fetch.as_ref(), offset.as_ref()),
            RelKind::Uncollect {
                input,
                with_ordinality,
            } => self.compile_uncollect(plan, id, *input, *with_ordinality),
            RelKind::Correlate {
                left,
                right,
                join_type,
            } => self.compile_correlate(plan, id, *left, *right, *join_type),
        }
    }

    /// The node whose children are being compiled, if any.
    pub(crate) fn parent(&self) -> Option<PlanId> {
        self.ancestors.last().copied()
    }
}
