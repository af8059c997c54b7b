//! Circuit operator definitions.

use crate::metadata::InputTableMetadata;
use alloc::string::String;
use alloc::sync::Arc;
use alloc::vec::Vec;
use core::fmt;
use zsql_core::Origin;
use zsql_ir::{
    rewrite_aggregate, rewrite_expr, rewrite_fold, Aggregate, ExprRef, Fold, Rewriter, TypeRef,
};

/// Position of an operator in its circuit.
pub type OperatorId = usize;

/// Shared reference to an operator.
pub type OperatorRef = Arc<Operator>;

/// Row numbering used by a top-k operator.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Numbering {
    Rank,
    DenseRank,
    RowNumber,
}

/// Side of a window bound relative to the current row.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum RelDirection {
    Before,
    After,
}

/// One bound of a range window: an offset from the current row's ordering value.
#[derive(Clone, Debug, PartialEq)]
pub struct RelOffset {
    pub direction: RelDirection,
    pub value: ExprRef,
}

/// The frame of a range window, inclusive on both ends.
#[derive(Clone, Debug, PartialEq)]
pub struct RelRange {
    pub lower: RelOffset,
    pub upper: RelOffset,
}

/// What a stream aggregate folds with.
#[derive(Clone, Debug, PartialEq)]
pub enum AggregateBody {
    /// A set of aggregate calls producing a tuple.
    Aggregate(Aggregate),
    /// A single fold producing its accumulator.
    Fold(Fold),
}

/// An operator kind and its payload.
///
/// Closures are IR expressions. Operators over indexed Z-sets receive each
/// element as a `(key, value)` raw tuple.
#[derive(Clone, Debug, PartialEq)]
pub enum OperatorKind {
    /// Input table.
    Source {
        name: String,
        /// The table's row type as a named struct.
        original_row_type: TypeRef,
        metadata: InputTableMetadata,
    },
    /// Output view.
    Sink {
        name: String,
        original_row_type: TypeRef,
        query: String,
        comment: Option<String>,
    },
    /// Applies a closure to every element.
    Map { function: ExprRef },
    /// Keeps elements for which the closure returns true.
    Filter { predicate: ExprRef },
    /// Splits every row into a `(key, value)` pair.
    Index { function: ExprRef },
    /// Drops the keys of an indexed Z-set.
    Deindex,
    /// Maps `(key, value)` pairs to new pairs.
    MapIndex { function: ExprRef },
    /// Equi-join of two indexed Z-sets; the closure gets `(key, left, right)`.
    Join { function: ExprRef },
    /// Folds the values of every key.
    StreamAggregate { body: AggregateBody, linear: bool },
    /// Range-window aggregate over `(partition, (order, row))` deltas.
    WindowAggregate {
        aggregate: Aggregate,
        window: RelRange,
    },
    /// Keeps the first `limit` values of every key under `comparator`.
    IndexedTopK {
        numbering: Numbering,
        comparator: ExprRef,
        limit: ExprRef,
        /// Closure `(rank, row)` building each output value.
        output_producer: Option<ExprRef>,
    },
    /// LAG/LEAD over the values of every key.
    ///
    /// Reserved: the compiler reports LAG/LEAD windows as unimplemented and
    /// never emits this operator, and `CircuitRunner::new` rejects circuits
    /// that contain it.
    Lag {
        offset: i32,
        comparator: ExprRef,
        projection: ExprRef,
        output_producer: ExprRef,
    },
    Sum,
    Negate,
    /// First input minus the second.
    Subtract,
    /// Clamps every weight to 1.
    Distinct,
    Differentiate,
    Integrate,
    /// Expands every row into zero or more rows.
    FlatMap { function: ExprRef },
    /// A constant Z-set.
    Constant { value: ExprRef },
    /// Placeholder for a view compiled without an output.
    Noop { name: String },
}

impl OperatorKind {
    /// Short name used in diagnostics.
    pub fn name(&self) -> &'static str {
        match self {
            OperatorKind::Source { .. } => "source",
            OperatorKind::Sink { .. } => "sink",
            OperatorKind::Map { .. } => "map",
            OperatorKind::Filter { .. } => "filter",
            OperatorKind::Index { .. } => "index",
            OperatorKind::Deindex => "deindex",
            OperatorKind::MapIndex { .. } => "map_index",
            OperatorKind::Join { .. } => "join",
            OperatorKind::StreamAggregate { .. } => "stream_aggregate",
            OperatorKind::WindowAggregate { .. } => "window_aggregate",
            OperatorKind::IndexedTopK { .. } => "topk",
            OperatorKind::Lag { .. } => "lag",
            OperatorKind::Sum => "sum",
            OperatorKind::Negate => "neg",
            OperatorKind::Subtract => "subtract",
            OperatorKind::Distinct => "distinct",
            OperatorKind::Differentiate => "differentiate",
            OperatorKind::Integrate => "integrate",
            OperatorKind::FlatMap { .. } => "flat_map",
            OperatorKind::Constant { .. } => "constant",
            OperatorKind::Noop { .. } => "noop",
        }
    }

    /// Whether the kind is defined only over deltas and needs a
    /// Differentiate before it and an Integrate after it.
    pub fn is_incremental_only(&self) -> bool {
        matches!(
            self,
            OperatorKind::IndexedTopK { .. }
                | OperatorKind::WindowAggregate { .. }
                | OperatorKind::Lag { .. }
        )
    }

    fn rewrite<R: Rewriter + ?Sized>(&self, r: &mut R) -> Option<OperatorKind> {
        fn expr<R: Rewriter + ?Sized>(r: &mut R, e: &ExprRef, changed: &mut bool) -> ExprRef {
            let out = rewrite_expr(r, e);
            *changed |= !Arc::ptr_eq(&out, e);
            out
        }
        fn ty<R: Rewriter + ?Sized>(r: &mut R, t: &TypeRef, changed: &mut bool) -> TypeRef {
            let out = r.rewrite_type(t);
            *changed |= !Arc::ptr_eq(&out, t);
            out
        }
        let mut changed = false;
        let c = &mut changed;
        let kind = match self {
            OperatorKind::Source {
                name,
                original_row_type,
                metadata,
            } => OperatorKind::Source {
                name: name.clone(),
                original_row_type: ty(r, original_row_type, c),
                metadata: metadata.clone(),
            },
            OperatorKind::Sink {
                name,
                original_row_type,
                query,
                comment,
            } => OperatorKind::Sink {
                name: name.clone(),
                original_row_type: ty(r, original_row_type, c),
                query: query.clone(),
                comment: comment.clone(),
            },
            OperatorKind::Map { function } => OperatorKind::Map {
                function: expr(r, function, c),
            },
            OperatorKind::Filter { predicate } => OperatorKind::Filter {
                predicate: expr(r, predicate, c),
            },
            OperatorKind::Index { function } => OperatorKind::Index {
                function: expr(r, function, c),
            },
            OperatorKind::MapIndex { function } => OperatorKind::MapIndex {
                function: expr(r, function, c),
            },
            OperatorKind::Join { function } => OperatorKind::Join {
                function: expr(r, function, c),
            },
            OperatorKind::FlatMap { function } => OperatorKind::FlatMap {
                function: expr(r, function, c),
            },
            OperatorKind::Constant { value } => OperatorKind::Constant {
                value: expr(r, value, c),
            },
            OperatorKind::StreamAggregate { body, linear } => {
                let body = match body {
                    AggregateBody::Aggregate(a) => AggregateBody::Aggregate(rewrite_aggregate(r, a)),
                    AggregateBody::Fold(f) => AggregateBody::Fold(rewrite_fold(r, f)),
                };
                OperatorKind::StreamAggregate {
                    body,
                    linear: *linear,
                }
            }
            OperatorKind::WindowAggregate { aggregate, window } => {
                OperatorKind::WindowAggregate {
                    aggregate: rewrite_aggregate(r, aggregate),
                    window: RelRange {
                        lower: RelOffset {
                            direction: window.lower.direction,
                            value: expr(r, &window.lower.value, c),
                        },
                        upper: RelOffset {
                            direction: window.upper.direction,
                            value: expr(r, &window.upper.value, c),
                        },
                    },
                }
            }
            OperatorKind::IndexedTopK {
                numbering,
                comparator,
                limit,
                output_producer,
            } => OperatorKind::IndexedTopK {
                numbering: *numbering,
                comparator: expr(r, comparator, c),
                limit: expr(r, limit, c),
                output_producer: output_producer.as_ref().map(|p| expr(r, p, c)),
            },
            OperatorKind::Lag {
                offset,
                comparator,
                projection,
                output_producer,
            } => OperatorKind::Lag {
                offset: *offset,
                comparator: expr(r, comparator, c),
                projection: expr(r, projection, c),
                output_producer: expr(r, output_producer, c),
            },
            OperatorKind::Deindex
            | OperatorKind::Sum
            | OperatorKind::Negate
            | OperatorKind::Subtract
            | OperatorKind::Distinct
            | OperatorKind::Differentiate
            | OperatorKind::Integrate
            | OperatorKind::Noop { .. } => return None,
        };
        // Aggregates are rebuilt wholesale; compare them by value.
        let aggregate_changed = match (self, &kind) {
            (
                OperatorKind::StreamAggregate { body: old, .. },
                OperatorKind::StreamAggregate { body: new, .. },
            ) => old != new,
            (
                OperatorKind::WindowAggregate { aggregate: old, .. },
                OperatorKind::WindowAggregate { aggregate: new, .. },
            ) => old != new,
            _ => false,
        };
        if changed || aggregate_changed {
            Some(kind)
        } else {
            None
        }
    }
}

/// A circuit operator.
#[derive(Clone, Debug, PartialEq)]
pub struct Operator {
    pub kind: OperatorKind,
    /// A Z-set or indexed Z-set type.
    pub output_type: TypeRef,
    /// Whether the output may hold duplicates that set semantics must remove.
    pub is_multiset: bool,
    pub inputs: Vec<OperatorId>,
    /// The plan fragment the operator was compiled from.
    pub origin: Origin,
}

impl Operator {
    pub fn new(
        origin: Origin,
        kind: OperatorKind,
        output_type: TypeRef,
        is_multiset: bool,
        inputs: Vec<OperatorId>,
    ) -> Self {
        Self {
            kind,
            output_type,
            is_multiset,
            inputs,
            origin,
        }
    }

    /// Element type of a Z-set output; the `(key, value)` raw tuple of an
    /// indexed output.
    pub fn element_type(&self) -> TypeRef {
        match self.output_type.key_value_types() {
            Some((k, v)) => zsql_ir::Type::raw_tuple(alloc::vec![k, v]),
            None => self
                .output_type
                .element_type()
                .unwrap_or_else(zsql_ir::Type::any),
        }
    }

    pub fn is_indexed(&self) -> bool {
        self.output_type.is_indexed()
    }

    /// The first input; every non-source operator has one.
    pub fn input(&self) -> Option<OperatorId> {
        self.inputs.first().copied()
    }

    /// Returns the rewritten operator, or None when nothing changed.
    pub fn rewrite<R: Rewriter + ?Sized>(&self, r: &mut R) -> Option<Operator> {
        let kind = self.kind.rewrite(r);
        let output_type = r.rewrite_type(&self.output_type);
        if kind.is_none() && Arc::ptr_eq(&output_type, &self.output_type) {
            return None;
        }
        Some(Operator {
            kind: kind.unwrap_or_else(|| self.kind.clone()),
            output_type,
            is_multiset: self.is_multiset,
            inputs: self.inputs.clone(),
            origin: self.origin.clone(),
        })
    }
}

impl fmt::Display for Operator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.kind.name())?;
        match &self.kind {
            OperatorKind::Source { name, .. }
            | OperatorKind::Sink { name, .. }
            | OperatorKind::Noop { name } => write!(f, "[{}]", name)?,
            OperatorKind::Map { function }
            | OperatorKind::Index { function }
            | OperatorKind::MapIndex { function }
            | OperatorKind::Join { function }
            | OperatorKind::FlatMap { function } => write!(f, "[{}]", function)?,
            OperatorKind::Filter { predicate } => write!(f, "[{}]", predicate)?,
            OperatorKind::Constant { value } => write!(f, "[{}]", value)?,
            OperatorKind::IndexedTopK {
                numbering, limit, ..
            } => write!(f, "[{:?} <= {}]", numbering, limit)?,
            _ => {}
        }
        f.write_str("(")?;
        for (i, input) in self.inputs.iter().enumerate() {
            if i > 0 {
                f.write_str(", ")?;
            }
            write!(f, "stream{}", input)?;
        }
        write!(f, "): {}", self.output_type)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloc::string::ToString;
    use alloc::vec;
    use zsql_ir::{Expr, ExprExt, Identity, Param, Type};

    fn row() -> TypeRef {
        Type::tuple(vec![Type::int64(false), Type::boolean(true)])
    }

    fn map_op() -> Operator {
        let t = Param::new("t", row());
        let function = Expr::tuple(vec![t.var().field(0)]).closure(vec![t]);
        Operator::new(
            Origin::node(1, "Project"),
            OperatorKind::Map { function },
            Type::zset(Type::tuple(vec![Type::int64(false)])),
            true,
            vec![0],
        )
    }

    #[test]
    fn test_identity_rewrite_reports_no_change() {
        assert!(map_op().rewrite(&mut Identity).is_none());
    }

    #[test]
    fn test_element_types() {
        let op = map_op();
        assert_eq!(op.element_type().arity(), 1);
        assert!(!op.is_indexed());
        let indexed = Operator::new(
            Origin::empty(),
            OperatorKind::Index {
                function: Expr::tuple(vec![]),
            },
            Type::indexed_zset(Type::unit(), row()),
            false,
            vec![0],
        );
        assert!(indexed.is_indexed());
        assert_eq!(indexed.element_type(), Type::raw_tuple(vec![Type::unit(), row()]));
    }

    #[test]
    fn test_display() {
        assert_eq!(
            map_op().to_string(),
            "map[move |t: Tup2<i64, bool?>| Tup1::new(t.0)](stream0): ZSet<Tup1<i64>>"
        );
    }

    #[test]
    fn test_incremental_only_kinds() {
        let topk = OperatorKind::IndexedTopK {
            numbering: Numbering::RowNumber,
            comparator: Expr::no_comparator(row()),
            limit: Expr::i64_literal(3),
            output_producer: None,
        };
        assert!(topk.is_incremental_only());
        assert!(!OperatorKind::Distinct.is_incremental_only());
    }
}
