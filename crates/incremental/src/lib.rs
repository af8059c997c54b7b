//! zsql Incremental - Reference evaluation of zsql circuits over Z-sets.
//!
//! A circuit produced by the compiler describes how view contents follow
//! from table contents. This crate executes such circuits step by step,
//! which makes it possible to check the compiled dataflow against the SQL
//! it came from.
//!
//! # Core Concepts
//!
//! - `ZSet`: A multiset with signed weights; holds both contents and changes
//! - `CircuitRunner`: Evaluates every operator of a circuit once per step
//! - `TopK` / `WindowAggregator`: Stateful operators defined over changes
//!
//! # Example
//!
//! ```ignore
//! use zsql_incremental::{CircuitRunner, ZSet};
//! use zsql_core::Value;
//!
//! let mut runner = CircuitRunner::new(circuit)?;
//! let row = Value::tuple(vec![Value::Int32(1)]);
//! let changes = runner.on_table_change("t", &ZSet::singleton(row, 1))?;
//! for (view, delta) in changes {
//!     println!("{}: {} rows changed", view, delta.len());
//! }
//! ```

#![no_std]

extern crate alloc;

pub mod eval;
pub mod operators;
mod runner;
mod zset;

pub use eval::{apply_function, call, eval, eval_constant, Env};
pub use operators::{fold_aggregate, fold_single, TopK, WindowAggregator};
pub use runner::CircuitRunner;
pub use zset::{pair, split_pair, ZSet};
