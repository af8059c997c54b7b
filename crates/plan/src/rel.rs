//! Relational plan nodes.
//!
//! Nodes live in a `Plan` arena and refer to their inputs by `PlanId`. The
//! builder methods on `Plan` derive each node's row type the way a SQL
//! validator would, which keeps hand-written plans consistent.

use crate::rex::RexNode;
use crate::types::{Field, RowType, SqlType};
use alloc::format;
use alloc::string::String;
use alloc::vec;
use alloc::vec::Vec;
use zsql_core::{DataType, Value};

/// Identity of a node inside a `Plan`.
pub type PlanId = usize;

/// Join type.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum JoinType {
    Inner,
    Left,
    Right,
    Full,
    Semi,
    Anti,
}

impl JoinType {
    /// Whether unmatched left rows are preserved.
    pub fn preserves_left(&self) -> bool {
        matches!(self, JoinType::Left | JoinType::Full)
    }

    /// Whether unmatched right rows are preserved.
    pub fn preserves_right(&self) -> bool {
        matches!(self, JoinType::Right | JoinType::Full)
    }

    /// Whether this is an outer join of any side.
    pub fn is_outer(&self) -> bool {
        self.preserves_left() || self.preserves_right()
    }
}

/// Sort direction of a collation entry.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Direction {
    Ascending,
    Descending,
    StrictlyAscending,
    StrictlyDescending,
    Clustered,
}

/// One entry of an ORDER BY list.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct FieldCollation {
    pub field: usize,
    pub direction: Direction,
}

impl FieldCollation {
    pub fn asc(field: usize) -> Self {
        Self {
            field,
            direction: Direction::Ascending,
        }
    }

    pub fn desc(field: usize) -> Self {
        Self {
            field,
            direction: Direction::Descending,
        }
    }
}

/// Aggregate and window function kinds.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum AggKind {
    Count,
    Sum,
    Avg,
    Min,
    Max,
    ArrayAgg,
    Rank,
    DenseRank,
    RowNumber,
    Lag,
    Lead,
}

impl AggKind {
    /// RANK, DENSE_RANK and ROW_NUMBER.
    pub fn is_ranking(&self) -> bool {
        matches!(self, AggKind::Rank | AggKind::DenseRank | AggKind::RowNumber)
    }

    /// LEAD and LAG.
    pub fn is_lead_lag(&self) -> bool {
        matches!(self, AggKind::Lag | AggKind::Lead)
    }
}

/// An aggregate function call: `kind(args...)` over input field positions.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct AggregateCall {
    pub kind: AggKind,
    pub args: Vec<usize>,
    pub distinct: bool,
    pub ty: SqlType,
    pub name: Option<String>,
}

impl AggregateCall {
    pub fn new(kind: AggKind, args: Vec<usize>, ty: SqlType) -> Self {
        Self {
            kind,
            args,
            distinct: false,
            ty,
            name: None,
        }
    }

    /// `COUNT(*)`.
    pub fn count_star() -> Self {
        Self::new(AggKind::Count, Vec::new(), SqlType::scalar(DataType::Int64))
    }

    pub fn named(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn with_distinct(mut self, distinct: bool) -> Self {
        self.distinct = distinct;
        self
    }
}

/// Kind of a window frame bound.
#[derive(Clone, Debug, PartialEq)]
pub enum BoundKind {
    Unbounded,
    CurrentRow,
    /// A constant offset from the current row.
    Offset(RexNode),
}

/// A window frame bound.
#[derive(Clone, Debug, PartialEq)]
pub struct WindowBound {
    pub kind: BoundKind,
    pub preceding: bool,
}

impl WindowBound {
    pub fn unbounded_preceding() -> Self {
        Self {
            kind: BoundKind::Unbounded,
            preceding: true,
        }
    }

    pub fn unbounded_following() -> Self {
        Self {
            kind: BoundKind::Unbounded,
            preceding: false,
        }
    }

    pub fn current_row() -> Self {
        Self {
            kind: BoundKind::CurrentRow,
            preceding: false,
        }
    }

    pub fn preceding(offset: RexNode) -> Self {
        Self {
            kind: BoundKind::Offset(offset),
            preceding: true,
        }
    }

    pub fn following(offset: RexNode) -> Self {
        Self {
            kind: BoundKind::Offset(offset),
            preceding: false,
        }
    }
}

/// One OVER specification and the calls sharing it.
#[derive(Clone, Debug, PartialEq)]
pub struct WindowGroup {
    /// Partition key fields.
    pub keys: Vec<usize>,
    pub order_keys: Vec<FieldCollation>,
    pub lower: WindowBound,
    pub upper: WindowBound,
    pub calls: Vec<AggregateCall>,
}

impl WindowGroup {
    /// A group with the default `RANGE BETWEEN UNBOUNDED PRECEDING AND CURRENT ROW` frame.
    pub fn new(keys: Vec<usize>, order_keys: Vec<FieldCollation>, calls: Vec<AggregateCall>) -> Self {
        Self {
            keys,
            order_keys,
            lower: WindowBound::unbounded_preceding(),
            upper: WindowBound::current_row(),
            calls,
        }
    }

    pub fn with_frame(mut self, lower: WindowBound, upper: WindowBound) -> Self {
        self.lower = lower;
        self.upper = upper;
        self
    }
}

/// Relational operator kinds and their payloads.
#[derive(Clone, Debug, PartialEq)]
pub enum RelKind {
    /// Scan of a table or view. `external` scans may synthesize a source.
    Scan { table: String, external: bool },
    Project { input: PlanId, projects: Vec<RexNode> },
    Filter { input: PlanId, condition: RexNode },
    Join {
        inputs: Vec<PlanId>,
        condition: RexNode,
        join_type: JoinType,
    },
    Aggregate {
        input: PlanId,
        group_set: Vec<usize>,
        /// Grouping sets; a plain GROUP BY has exactly `[group_set]`.
        group_sets: Vec<Vec<usize>>,
        calls: Vec<AggregateCall>,
    },
    Union { inputs: Vec<PlanId>, all: bool },
    Minus { inputs: Vec<PlanId>, all: bool },
    Intersect { inputs: Vec<PlanId>, all: bool },
    Window {
        input: PlanId,
        groups: Vec<WindowGroup>,
        /// Constants referenced by input refs past the input width.
        constants: Vec<RexNode>,
    },
    Sort {
        input: PlanId,
        collation: Vec<FieldCollation>,
        fetch: Option<RexNode>,
        offset: Option<RexNode>,
    },
    Values { tuples: Vec<Vec<RexNode>> },
    Correlate {
        left: PlanId,
        right: PlanId,
        join_type: JoinType,
    },
    Uncollect { input: PlanId, with_ordinality: bool },
}

/// A plan node: a kind plus the row type it produces.
#[derive(Clone, Debug, PartialEq)]
pub struct RelNode {
    pub kind: RelKind,
    pub row_type: RowType,
}

impl RelNode {
    pub fn new(kind: RelKind, row_type: RowType) -> Self {
        Self { kind, row_type }
    }

    /// Returns the input node ids, in order.
    pub fn inputs(&self) -> Vec<PlanId> {
        match &self.kind {
            RelKind::Scan { .. } | RelKind::Values { .. } => Vec::new(),
            RelKind::Project { input, .. }
            | RelKind::Filter { input, .. }
            | RelKind::Aggregate { input, .. }
            | RelKind::Window { input, .. }
            | RelKind::Sort { input, .. }
            | RelKind::Uncollect { input, .. } => vec![*input],
            RelKind::Join { inputs, .. }
            | RelKind::Union { inputs, .. }
            | RelKind::Minus { inputs, .. }
            | RelKind::Intersect { inputs, .. } => inputs.clone(),
            RelKind::Correlate { left, right, .. } => vec![*left, *right],
        }
    }

    /// Short name of the node kind, used in diagnostics.
    pub fn kind_name(&self) -> String {
        match &self.kind {
            RelKind::Scan { table, .. } => format!("Scan({})", table),
            RelKind::Project { .. } => "Project".into(),
            RelKind::Filter { .. } => "Filter".into(),
            RelKind::Join { join_type, .. } => format!("Join({:?})", join_type),
            RelKind::Aggregate { .. } => "Aggregate".into(),
            RelKind::Union { all, .. } => format!("Union(all={})", all),
            RelKind::Minus { all, .. } => format!("Minus(all={})", all),
            RelKind::Intersect { all, .. } => format!("Intersect(all={})", all),
            RelKind::Window { .. } => "Window".into(),
            RelKind::Sort { .. } => "Sort".into(),
            RelKind::Values { .. } => "Values".into(),
            RelKind::Correlate { join_type, .. } => format!("Correlate({:?})", join_type),
            RelKind::Uncollect { .. } => "Uncollect".into(),
        }
    }
}

/// An arena of plan nodes forming a DAG.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Plan {
    nodes: Vec<RelNode>,
}

impl Plan {
    /// Creates an empty plan.
    pub fn new() -> Self {
        Self { nodes: Vec::new() }
    }

    /// Adds a node with an explicit row type.
    pub fn add(&mut self, node: RelNode) -> PlanId {
        self.nodes.push(node);
        self.nodes.len() - 1
    }

    /// Returns the node with the given id.
    ///
    /// # Panics
    ///
    /// Panics if `id` was not produced by this plan.
    pub fn node(&self, id: PlanId) -> &RelNode {
        &self.nodes[id]
    }

    /// Returns the node with the given id, if any.
    pub fn get(&self, id: PlanId) -> Option<&RelNode> {
        self.nodes.get(id)
    }

    /// Row type of a node.
    pub fn row_type(&self, id: PlanId) -> &RowType {
        &self.nodes[id].row_type
    }

    /// Number of nodes in the arena.
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Scan of a table or view known to the compiler.
    pub fn scan(&mut self, table: impl Into<String>, row_type: RowType) -> PlanId {
        let kind = RelKind::Scan {
            table: table.into(),
            external: false,
        };
        self.add(RelNode::new(kind, row_type))
    }

    /// Scan of a table whose schema comes from an external catalog.
    pub fn external_scan(&mut self, table: impl Into<String>, row_type: RowType) -> PlanId {
        let kind = RelKind::Scan {
            table: table.into(),
            external: true,
        };
        self.add(RelNode::new(kind, row_type))
    }

    /// Projection; output fields are named `names`, typed by the expressions.
    pub fn project(&mut self, input: PlanId, projects: Vec<RexNode>, names: &[&str]) -> PlanId {
        let fields = projects
            .iter()
            .enumerate()
            .map(|(i, p)| {
                let name = names
                    .get(i)
                    .map(|n| String::from(*n))
                    .unwrap_or_else(|| format!("EXPR${}", i));
                Field::new(name, p.ty().clone())
            })
            .collect();
        self.add(RelNode::new(
            RelKind::Project { input, projects },
            RowType::new(fields),
        ))
    }

    pub fn filter(&mut self, input: PlanId, condition: RexNode) -> PlanId {
        let row_type = self.row_type(input).clone();
        self.add(RelNode::new(RelKind::Filter { input, condition }, row_type))
    }

    /// Binary join; fields of a side that may be padded become nullable.
    pub fn join(&mut self, left: PlanId, right: PlanId, condition: RexNode, join_type: JoinType) -> PlanId {
        let mut l = self.row_type(left).clone();
        let mut r = self.row_type(right).clone();
        if join_type.preserves_right() {
            l = l.as_nullable();
        }
        if join_type.preserves_left() {
            r = r.as_nullable();
        }
        let row_type = match join_type {
            JoinType::Semi | JoinType::Anti => l,
            _ => l.concat(&r),
        };
        self.add(RelNode::new(
            RelKind::Join {
                inputs: vec![left, right],
                condition,
                join_type,
            },
            row_type,
        ))
    }

    /// GROUP BY `group_set` with a single grouping set.
    pub fn aggregate(&mut self, input: PlanId, group_set: Vec<usize>, calls: Vec<AggregateCall>) -> PlanId {
        let sets = vec![group_set.clone()];
        self.aggregate_with_sets(input, group_set, sets, calls)
    }

    /// GROUP BY with grouping sets (ROLLUP, CUBE, GROUPING SETS).
    ///
    /// Group fields absent from some grouping set become nullable.
    pub fn aggregate_with_sets(
        &mut self,
        input: PlanId,
        group_set: Vec<usize>,
        group_sets: Vec<Vec<usize>>,
        calls: Vec<AggregateCall>,
    ) -> PlanId {
        let input_type = self.row_type(input).clone();
        let mut fields = Vec::new();
        for &g in &group_set {
            let in_all = group_sets.iter().all(|s| s.contains(&g));
            let field = &input_type.fields[g];
            let ty = field.ty.clone();
            let ty = if in_all { ty } else { ty.nullable() };
            fields.push(Field::new(field.name.clone(), ty));
        }
        for (i, call) in calls.iter().enumerate() {
            let name = call.name.clone().unwrap_or_else(|| format!("EXPR${}", i));
            fields.push(Field::new(name, call.ty.clone()));
        }
        self.add(RelNode::new(
            RelKind::Aggregate {
                input,
                group_set,
                group_sets,
                calls,
            },
            RowType::new(fields),
        ))
    }

    fn set_op_type(&self, inputs: &[PlanId]) -> RowType {
        let mut row_type = inputs
            .first()
            .map(|i| self.row_type(*i).clone())
            .unwrap_or_default();
        for input in inputs.iter().skip(1) {
            for (field, other) in row_type.fields.iter_mut().zip(&self.row_type(*input).fields) {
                field.ty.nullable |= other.ty.nullable;
            }
        }
        row_type
    }

    pub fn union(&mut self, inputs: Vec<PlanId>, all: bool) -> PlanId {
        let row_type = self.set_op_type(&inputs);
        self.add(RelNode::new(RelKind::Union { inputs, all }, row_type))
    }

    pub fn minus(&mut self, inputs: Vec<PlanId>, all: bool) -> PlanId {
        let row_type = inputs
            .first()
            .map(|i| self.row_type(*i).clone())
            .unwrap_or_default();
        self.add(RelNode::new(RelKind::Minus { inputs, all }, row_type))
    }

    pub fn intersect(&mut self, inputs: Vec<PlanId>, all: bool) -> PlanId {
        let row_type = self.set_op_type(&inputs);
        self.add(RelNode::new(RelKind::Intersect { inputs, all }, row_type))
    }

    /// Window; output is the input row followed by one field per call.
    pub fn window(&mut self, input: PlanId, groups: Vec<WindowGroup>, constants: Vec<RexNode>) -> PlanId {
        let mut fields = self.row_type(input).fields.clone();
        let mut index = 0;
        for group in &groups {
            for call in &group.calls {
                let name = call.name.clone().unwrap_or_else(|| format!("w{}$o{}", index, index));
                fields.push(Field::new(name, call.ty.clone()));
                index += 1;
            }
        }
        self.add(RelNode::new(
            RelKind::Window {
                input,
                groups,
                constants,
            },
            RowType::new(fields),
        ))
    }

    pub fn sort(
        &mut self,
        input: PlanId,
        collation: Vec<FieldCollation>,
        fetch: Option<RexNode>,
        offset: Option<RexNode>,
    ) -> PlanId {
        let row_type = self.row_type(input).clone();
        self.add(RelNode::new(
            RelKind::Sort {
                input,
                collation,
                fetch,
                offset,
            },
            row_type,
        ))
    }

    /// Literal rows.
    pub fn values(&mut self, row_type: RowType, tuples: Vec<Vec<Value>>) -> PlanId {
        let tuples = tuples
            .into_iter()
            .map(|row| {
                row.into_iter()
                    .zip(&row_type.fields)
                    .map(|(value, field)| {
                        let ty = if value.is_null() {
                            field.ty.clone().nullable()
                        } else {
                            field.ty.clone()
                        };
                        RexNode::literal(value, ty)
                    })
                    .collect()
            })
            .collect();
        self.add(RelNode::new(RelKind::Values { tuples }, row_type))
    }

    pub fn correlate(&mut self, left: PlanId, right: PlanId, join_type: JoinType) -> PlanId {
        let mut r = self.row_type(right).clone();
        if join_type.preserves_left() {
            r = r.as_nullable();
        }
        let row_type = self.row_type(left).concat(&r);
        self.add(RelNode::new(
            RelKind::Correlate {
                left,
                right,
                join_type,
            },
            row_type,
        ))
    }

    /// UNNEST of the single array field of `input`.
    pub fn uncollect(&mut self, input: PlanId, with_ordinality: bool) -> PlanId {
        let input_type = self.row_type(input).clone();
        let mut fields = Vec::new();
        if let Some(field) = input_type.fields.first() {
            let element = field
                .ty
                .element()
                .cloned()
                .unwrap_or_else(|| field.ty.clone());
            fields.push(Field::new(field.name.clone(), element));
        }
        if with_ordinality {
            fields.push(Field::new("ORDINALITY", SqlType::scalar(DataType::Int32)));
        }
        self.add(RelNode::new(
            RelKind::Uncollect {
                input,
                with_ordinality,
            },
            RowType::new(fields),
        ))
    }
}
