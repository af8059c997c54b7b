//! zsql Plan - The relational plan DAG handed to the circuit compiler.
//!
//! A validated, decorrelated SQL front end produces, for each statement, a
//! `Plan`: an arena of immutable `RelNode`s addressed by `PlanId`. A node may
//! be referenced by several parents, so the plan is a DAG rather than a tree.
//!
//! - `SqlType` / `RowType`: field types with nullability
//! - `RexNode`: row expressions (input references, literals, calls)
//! - `RelNode` / `RelKind`: relational operators (scan, project, join, ...)
//! - `Statement`: DDL and DML statements wrapping plans
//!
//! # Example
//!
//! ```rust
//! use zsql_core::DataType;
//! use zsql_plan::{Plan, RexNode, RowType, SqlType};
//!
//! let mut plan = Plan::new();
//! let t = plan.scan("t", RowType::of(&[("a", SqlType::scalar(DataType::Int32))]));
//! let a = RexNode::input_ref(0, SqlType::scalar(DataType::Int32));
//! let f = plan.filter(t, RexNode::gt(a, RexNode::int32(3)));
//! assert_eq!(plan.node(f).inputs(), vec![t]);
//! ```

#![no_std]

extern crate alloc;

mod rel;
mod rex;
mod statement;
mod types;

pub use rel::{
    AggKind, AggregateCall, BoundKind, Direction, FieldCollation, JoinType, Plan, PlanId, RelKind,
    RelNode, WindowBound, WindowGroup,
};
pub use rex::{RexNode, RexOp};
pub use statement::{AttributeType, ColumnDef, Statement, TypeAttribute};
pub use types::{Field, RowType, SqlType, SqlTypeKind};
