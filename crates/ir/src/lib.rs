//! zsql IR - the expressions, types and statements embedded in circuit operators.
//!
//! This crate provides:
//! - `Type`: tuples, raw tuples, Z-set and indexed Z-set element types, structs
//! - `Expr`: closures and the scalar expressions inside them
//! - `Statement` and `Item`: block statements and top-level declarations
//! - `Aggregate`: fold descriptors produced for aggregate calls
//! - `Rewriter`: a structure-sharing, bottom-up rewrite engine
//! - `Substitute` and `Simplify`: passes built on the engine
//!
//! # Example
//!
//! ```rust
//! use zsql_ir::{rewrite_expr, Expr, ExprExt, Identity, Param, Type};
//!
//! let row = Param::new("t", Type::tuple(vec![Type::int64(false)]));
//! let closure = row.var().field(0).closure(vec![row]);
//! let same = rewrite_expr(&mut Identity, &closure);
//! assert!(std::sync::Arc::ptr_eq(&closure, &same));
//! ```

#![no_std]

extern crate alloc;

pub mod aggregate;
pub mod display;
pub mod expr;
pub mod passes;
pub mod rewrite;
pub mod statement;
pub mod types;

pub use aggregate::{Aggregate, Fold, Implementation};
pub use expr::{BinaryOp, Expr, ExprExt, ExprRef, FlatmapField, Param, UnaryOp};
pub use passes::{Simplify, Substitute};
pub use rewrite::{
    rewrite_aggregate, rewrite_expr, rewrite_fold, walk_expr, walk_statement, walk_type, Identity,
    Rewriter,
};
pub use statement::{Function, Item, Statement, StatementRef};
pub use types::{StructField, Type, TypeRef, TypeRefExt};
