//! zsql Core - Scalar types, runtime values and errors for the zsql circuit compiler.
//!
//! This crate provides the foundational types shared by every other zsql crate:
//!
//! - `DataType`: SQL scalar types (Boolean, integers, Float64, String, Date, Timestamp, Bytes)
//! - `Value`: Runtime values, including the composite tuple and array values used by circuits
//! - `Origin`: Identity of the plan fragment an error or operator was produced from
//! - `Error`: Error types for compilation and evaluation
//!
//! # Example
//!
//! ```rust
//! use zsql_core::{DataType, Value};
//!
//! let row = Value::tuple(vec![Value::Int32(1), Value::String("x".into())]);
//! assert_eq!(row.field(0), Some(&Value::Int32(1)));
//! assert_eq!(Value::Int32(7).data_type(), Some(DataType::Int32));
//! ```

#![no_std]

extern crate alloc;

mod error;
mod types;
mod value;

pub use error::{Error, Origin, Result};
pub use types::DataType;
pub use value::Value;
