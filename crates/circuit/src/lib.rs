//! zsql Circuit - the dataflow circuits produced by the zsql compiler.
//!
//! A circuit is an append-only list of operators over Z-sets (weighted
//! multisets) and indexed Z-sets, with named sources for tables and named
//! sinks for views.
//!
//! # Core Concepts
//!
//! - `Operator`: an operator kind, its output type, a multiset flag and input ids
//! - `OperatorKind`: Source, Sink, Map, Filter, Index, Join, aggregates, TopK, ...
//! - `Circuit`: the operators plus name registries and declarations
//! - `InputTableMetadata`: primary keys, defaults and lateness of table columns
//!
//! Operators never reference inputs that come after them, so the insertion
//! order is a valid evaluation order.

#![no_std]

extern crate alloc;

pub mod circuit;
pub mod metadata;
pub mod operator;

pub use circuit::Circuit;
pub use metadata::{InputColumnMetadata, InputTableMetadata};
pub use operator::{
    AggregateBody, Numbering, Operator, OperatorId, OperatorKind, OperatorRef, RelDirection,
    RelOffset, RelRange,
};
