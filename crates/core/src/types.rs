//! Scalar data type definitions.
//!
//! This module defines the SQL scalar types that may appear in relational rows
//! and in circuit element types. Nullability is not part of `DataType`; it is
//! carried by the type that wraps it.

use core::fmt;

/// Supported scalar data types.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum DataType {
    /// Boolean type (true/false)
    Boolean,
    /// 16-bit signed integer
    Int16,
    /// 32-bit signed integer
    Int32,
    /// 64-bit signed integer
    Int64,
    /// 64-bit floating point number
    Float64,
    /// UTF-8 string
    String,
    /// Date stored as days since the Unix epoch
    Date,
    /// Timestamp stored as milliseconds since the Unix epoch
    Timestamp,
    /// Binary data
    Bytes,
    /// The type of the untyped NULL literal
    Null,
}

impl DataType {
    /// Returns whether this is one of the integer types.
    pub fn is_integer(&self) -> bool {
        matches!(self, DataType::Int16 | DataType::Int32 | DataType::Int64)
    }

    /// Returns whether values of this type support arithmetic.
    pub fn is_numeric(&self) -> bool {
        self.is_integer() || matches!(self, DataType::Float64)
    }

    /// Returns whether this type can order a range-framed window.
    ///
    /// Window frames are computed by offsetting the ordering value, so only
    /// integer-like types qualify.
    pub fn is_window_orderable(&self) -> bool {
        self.is_integer() || matches!(self, DataType::Date | DataType::Timestamp)
    }

    /// Returns the common type two comparable types are promoted to, if any.
    pub fn common_type(a: DataType, b: DataType) -> Option<DataType> {
        if a == b {
            return Some(a);
        }
        match (a, b) {
            (DataType::Null, other) | (other, DataType::Null) => Some(other),
            (x, y) if x.is_numeric() && y.is_numeric() => {
                if matches!(x, DataType::Float64) || matches!(y, DataType::Float64) {
                    Some(DataType::Float64)
                } else {
                    Some(core::cmp::max(x, y))
                }
            }
            _ => None,
        }
    }

    /// Returns the lowercase SQL-ish name of the type.
    pub fn name(&self) -> &'static str {
        match self {
            DataType::Boolean => "bool",
            DataType::Int16 => "i16",
            DataType::Int32 => "i32",
            DataType::Int64 => "i64",
            DataType::Float64 => "f64",
            DataType::String => "string",
            DataType::Date => "date",
            DataType::Timestamp => "timestamp",
            DataType::Bytes => "bytes",
            DataType::Null => "null",
        }
    }
}

impl fmt::Display for DataType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}
