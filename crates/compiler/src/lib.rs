//! zsql Compiler - translates relational plans into incremental circuits.
//!
//! The compiler walks each statement's plan bottom-up and emits operators
//! over Z-sets into a single circuit shared by all statements.
//!
//! # Core Concepts
//!
//! - `CircuitCompiler`: per-statement entry point and the state shared by the rules
//! - `ExpressionCompiler`: row expressions to IR closure bodies
//! - `TypeCompiler`: SQL types to IR types, with registered struct types
//! - `JoinConditionAnalyzer`: splits a join condition into equi-keys and a residual
//! - `AggregateBuilder`: aggregate calls to fold implementations
//! - `TableContents`: rows written by INSERT and DELETE, for tests and copies
//!
//! # Example
//!
//! ```rust
//! use zsql_compiler::{CircuitCompiler, CompilerOptions, StatementResult};
//! use zsql_core::DataType;
//! use zsql_plan::{ColumnDef, Plan, RowType, SqlType, Statement};
//!
//! let mut compiler = CircuitCompiler::new(CompilerOptions::default());
//! let int = SqlType::scalar(DataType::Int32);
//! compiler
//!     .compile(&Statement::create_table("t", vec![ColumnDef::new("x", int.clone())]))
//!     .unwrap();
//!
//! let mut plan = Plan::new();
//! let scan = plan.scan("t", RowType::of(&[("x", int)]));
//! let view = compiler.compile(&Statement::create_view("v", plan, scan)).unwrap();
//! assert!(matches!(view, StatementResult::Operator(_)));
//! assert_eq!(compiler.circuit().len(), 2);
//! ```

#![no_std]

extern crate alloc;

mod aggregate_builder;
mod compiler;
mod expression;
mod join_condition;
mod options;
mod rules;
mod statements;
mod table_contents;
mod type_compiler;
mod walker;

pub use aggregate_builder::AggregateBuilder;
pub use compiler::CircuitCompiler;
pub use expression::ExpressionCompiler;
pub use join_condition::{EquiPair, JoinConditionAnalyzer, JoinDecomposition};
pub use options::CompilerOptions;
pub use statements::StatementResult;
pub use table_contents::{add_literals, negate_literal, TableContents, TableDefinition};
pub use type_compiler::TypeCompiler;
