//! Runtime value definitions.
//!
//! `Value` covers the SQL scalars plus the two composite shapes circuits move
//! around: tuples (rows, keys, accumulators) and arrays (SQL arrays and the
//! sorted vectors produced by ORDER BY).

use crate::types::DataType;
use alloc::string::{String, ToString};
use alloc::vec::Vec;
use core::cmp::Ordering;
use core::fmt;
use core::hash::{Hash, Hasher};

/// A runtime value.
#[derive(Clone, Debug)]
pub enum Value {
    /// Null value
    Null,
    /// Boolean value
    Boolean(bool),
    /// 16-bit signed integer
    Int16(i16),
    /// 32-bit signed integer
    Int32(i32),
    /// 64-bit signed integer
    Int64(i64),
    /// 64-bit floating point
    Float64(f64),
    /// UTF-8 string
    String(String),
    /// Days since the Unix epoch
    Date(i32),
    /// Milliseconds since the Unix epoch
    Timestamp(i64),
    /// Binary data
    Bytes(Vec<u8>),
    /// SQL array, or a sorted vector of rows
    Array(Vec<Value>),
    /// Row, key or accumulator tuple
    Tuple(Vec<Value>),
}

impl Value {
    /// Creates a tuple value.
    pub fn tuple(fields: Vec<Value>) -> Self {
        Value::Tuple(fields)
    }

    /// Creates the empty tuple, used as the key of globally indexed collections.
    pub fn unit() -> Self {
        Value::Tuple(Vec::new())
    }

    /// Returns the scalar data type of this value, or None for Null and composites.
    pub fn data_type(&self) -> Option<DataType> {
        match self {
            Value::Null | Value::Array(_) | Value::Tuple(_) => None,
            Value::Boolean(_) => Some(DataType::Boolean),
            Value::Int16(_) => Some(DataType::Int16),
            Value::Int32(_) => Some(DataType::Int32),
            Value::Int64(_) => Some(DataType::Int64),
            Value::Float64(_) => Some(DataType::Float64),
            Value::String(_) => Some(DataType::String),
            Value::Date(_) => Some(DataType::Date),
            Value::Timestamp(_) => Some(DataType::Timestamp),
            Value::Bytes(_) => Some(DataType::Bytes),
        }
    }

    /// Returns true if this value is Null.
    #[inline]
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// Returns the boolean value if this is a Boolean, None otherwise.
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Boolean(v) => Some(*v),
            _ => None,
        }
    }

    /// Returns the value widened to i64 if this is any integer.
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Value::Int16(v) => Some(*v as i64),
            Value::Int32(v) => Some(*v as i64),
            Value::Int64(v) => Some(*v),
            _ => None,
        }
    }

    /// Returns the value as f64 if this is any number.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Float64(v) => Some(*v),
            other => other.as_i64().map(|v| v as f64),
        }
    }

    /// Returns the ordinal of an integer, date or timestamp value.
    ///
    /// Used for window frame arithmetic, which is computed on a common wide integer.
    pub fn as_ordinal(&self) -> Option<i128> {
        match self {
            Value::Date(v) => Some(*v as i128),
            Value::Timestamp(v) => Some(*v as i128),
            other => other.as_i64().map(|v| v as i128),
        }
    }

    /// Returns a reference to the string if this is a String, None otherwise.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(v) => Some(v.as_str()),
            _ => None,
        }
    }

    /// Returns the fields if this is a Tuple.
    pub fn as_tuple(&self) -> Option<&[Value]> {
        match self {
            Value::Tuple(fields) => Some(fields.as_slice()),
            _ => None,
        }
    }

    /// Returns the elements if this is an Array.
    pub fn as_array(&self) -> Option<&[Value]> {
        match self {
            Value::Array(items) => Some(items.as_slice()),
            _ => None,
        }
    }

    /// Returns a field of a tuple value.
    pub fn field(&self, index: usize) -> Option<&Value> {
        self.as_tuple().and_then(|fields| fields.get(index))
    }

    /// Creates the zero value of a numeric or ordinal type.
    pub fn zero_for_type(dt: DataType) -> Option<Self> {
        Self::from_ordinal(dt, 0)
    }

    /// Creates the maximum value of an integer-like type.
    pub fn max_for_type(dt: DataType) -> Option<Self> {
        match dt {
            DataType::Int16 => Some(Value::Int16(i16::MAX)),
            DataType::Int32 => Some(Value::Int32(i32::MAX)),
            DataType::Int64 => Some(Value::Int64(i64::MAX)),
            DataType::Float64 => Some(Value::Float64(f64::MAX)),
            DataType::Date => Some(Value::Date(i32::MAX)),
            DataType::Timestamp => Some(Value::Timestamp(i64::MAX)),
            _ => None,
        }
    }

    /// Builds a value of an integer-like type from a wide ordinal, saturating.
    pub fn from_ordinal(dt: DataType, v: i128) -> Option<Self> {
        fn clamp<T: TryFrom<i128>>(v: i128, min: i128, max: i128) -> Option<T> {
            T::try_from(v.clamp(min, max)).ok()
        }
        match dt {
            DataType::Int16 => clamp(v, i16::MIN as i128, i16::MAX as i128).map(Value::Int16),
            DataType::Int32 => clamp(v, i32::MIN as i128, i32::MAX as i128).map(Value::Int32),
            DataType::Int64 => clamp(v, i64::MIN as i128, i64::MAX as i128).map(Value::Int64),
            DataType::Date => clamp(v, i32::MIN as i128, i32::MAX as i128).map(Value::Date),
            DataType::Timestamp => {
                clamp(v, i64::MIN as i128, i64::MAX as i128).map(Value::Timestamp)
            }
            DataType::Float64 => Some(Value::Float64(v as f64)),
            _ => None,
        }
    }

    /// Converts a scalar to another scalar type.
    ///
    /// Null converts to Null. Returns None when no conversion exists or the
    /// value does not fit the target type.
    pub fn cast(&self, target: DataType) -> Option<Value> {
        if self.is_null() {
            return Some(Value::Null);
        }
        if self.data_type() == Some(target) {
            return Some(self.clone());
        }
        match target {
            DataType::Int16 => self.as_whole().and_then(|v| i16::try_from(v).ok()).map(Value::Int16),
            DataType::Int32 => self.as_whole().and_then(|v| i32::try_from(v).ok()).map(Value::Int32),
            DataType::Int64 => self.as_whole().map(Value::Int64),
            DataType::Float64 => self.as_f64().map(Value::Float64),
            DataType::Boolean => match self {
                Value::String(s) => match s.to_ascii_lowercase().as_str() {
                    "true" => Some(Value::Boolean(true)),
                    "false" => Some(Value::Boolean(false)),
                    _ => None,
                },
                other => other.as_i64().map(|v| Value::Boolean(v != 0)),
            },
            DataType::String => Some(Value::String(self.to_string())),
            DataType::Date => match self {
                Value::Timestamp(ms) => i32::try_from(ms.div_euclid(86_400_000)).ok().map(Value::Date),
                other => other.as_i64().and_then(|v| i32::try_from(v).ok()).map(Value::Date),
            },
            DataType::Timestamp => match self {
                Value::Date(d) => Some(Value::Timestamp(*d as i64 * 86_400_000)),
                other => other.as_i64().map(Value::Timestamp),
            },
            DataType::Bytes => match self {
                Value::String(s) => Some(Value::Bytes(s.as_bytes().to_vec())),
                _ => None,
            },
            DataType::Null => None,
        }
    }

    fn as_whole(&self) -> Option<i64> {
        match self {
            Value::Float64(f) if f.is_finite() => Some(*f as i64),
            Value::String(s) => s.trim().parse::<i64>().ok(),
            Value::Boolean(b) => Some(*b as i64),
            other => other.as_i64(),
        }
    }

    /// SQL comparison: numbers compare across widths, Null is incomparable.
    pub fn sql_cmp(&self, other: &Value) -> Option<Ordering> {
        if self.is_null() || other.is_null() {
            return None;
        }
        match (self, other) {
            (Value::Float64(_), _) | (_, Value::Float64(_)) => {
                let (a, b) = (self.as_f64()?, other.as_f64()?);
                a.partial_cmp(&b)
            }
            _ => match (self.as_i64(), other.as_i64()) {
                (Some(a), Some(b)) => Some(a.cmp(&b)),
                _ if self.type_order() == other.type_order() => Some(self.cmp(other)),
                _ => None,
            },
        }
    }

    /// Returns a type ordering value for comparing different types.
    fn type_order(&self) -> u8 {
        match self {
            Value::Null => 0,
            Value::Boolean(_) => 1,
            Value::Int16(_) => 2,
            Value::Int32(_) => 3,
            Value::Int64(_) => 4,
            Value::Float64(_) => 5,
            Value::String(_) => 6,
            Value::Date(_) => 7,
            Value::Timestamp(_) => 8,
            Value::Bytes(_) => 9,
            Value::Array(_) => 10,
            Value::Tuple(_) => 11,
        }
    }
}

fn cmp_f64(a: f64, b: f64) -> Ordering {
    // NaN sorts after every other value and equals itself.
    match (a.is_nan(), b.is_nan()) {
        (true, true) => Ordering::Equal,
        (true, false) => Ordering::Greater,
        (false, true) => Ordering::Less,
        (false, false) => a.partial_cmp(&b).unwrap_or(Ordering::Equal),
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Value {}

impl PartialOrd for Value {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Value {
    fn cmp(&self, other: &Self) -> Ordering {
        match (self, other) {
            (Value::Null, Value::Null) => Ordering::Equal,
            (Value::Boolean(a), Value::Boolean(b)) => a.cmp(b),
            (Value::Int16(a), Value::Int16(b)) => a.cmp(b),
            (Value::Int32(a), Value::Int32(b)) => a.cmp(b),
            (Value::Int64(a), Value::Int64(b)) => a.cmp(b),
            (Value::Float64(a), Value::Float64(b)) => cmp_f64(*a, *b),
            (Value::String(a), Value::String(b)) => a.cmp(b),
            (Value::Date(a), Value::Date(b)) => a.cmp(b),
            (Value::Timestamp(a), Value::Timestamp(b)) => a.cmp(b),
            (Value::Bytes(a), Value::Bytes(b)) => a.cmp(b),
            (Value::Array(a), Value::Array(b)) => a.cmp(b),
            (Value::Tuple(a), Value::Tuple(b)) => a.cmp(b),
            // Different types: order by type discriminant
            _ => self.type_order().cmp(&other.type_order()),
        }
    }
}

impl Hash for Value {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.type_order().hash(state);
        match self {
            Value::Null => {}
            Value::Boolean(b) => b.hash(state),
            Value::Int16(i) => i.hash(state),
            Value::Int32(i) => i.hash(state),
            Value::Int64(i) => i.hash(state),
            Value::Float64(f) => {
                // -0.0 and 0.0 compare equal
                let f = if *f == 0.0 { 0.0 } else { *f };
                f.to_bits().hash(state)
            }
            Value::String(s) => s.hash(state),
            Value::Date(d) => d.hash(state),
            Value::Timestamp(t) => t.hash(state),
            Value::Bytes(b) => b.hash(state),
            Value::Array(items) | Value::Tuple(items) => items.hash(state),
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fn list(f: &mut fmt::Formatter<'_>, items: &[Value]) -> fmt::Result {
            for (i, item) in items.iter().enumerate() {
                if i > 0 {
                    f.write_str(", ")?;
                }
                write!(f, "{}", item)?;
            }
            Ok(())
        }
        match self {
            Value::Null => f.write_str("NULL"),
            Value::Boolean(b) => write!(f, "{}", b),
            Value::Int16(i) => write!(f, "{}", i),
            Value::Int32(i) => write!(f, "{}", i),
            Value::Int64(i) => write!(f, "{}", i),
            Value::Float64(v) => write!(f, "{}", v),
            Value::String(s) => f.write_str(s),
            Value::Date(d) => write!(f, "date({})", d),
            Value::Timestamp(t) => write!(f, "timestamp({})", t),
            Value::Bytes(b) => write!(f, "bytes[{}]", b.len()),
            Value::Array(items) => {
                f.write_str("[")?;
                list(f, items)?;
                f.write_str("]")
            }
            Value::Tuple(items) => {
                f.write_str("(")?;
                list(f, items)?;
                f.write_str(")")
            }
        }
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Value::Boolean(v)
    }
}

impl From<i16> for Value {
    fn from(v: i16) -> Self {
        Value::Int16(v)
    }
}

impl From<i32> for Value {
    fn from(v: i32) -> Self {
        Value::Int32(v)
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::Int64(v)
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::Float64(v)
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Value::String(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::String(v.to_string())
    }
}

impl<T> From<Option<T>> for Value
where
    T: Into<Value>,
{
    fn from(v: Option<T>) -> Self {
        match v {
            Some(val) => val.into(),
            None => Value::Null,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloc::vec;

    #[test]
    fn test_value_null() {
        let v = Value::Null;
        assert_eq!(v.data_type(), None);
        assert!(v.is_null());
    }

    #[test]
    fn test_value_accessors() {
        assert_eq!(Value::Boolean(true).as_bool(), Some(true));
        assert_eq!(Value::Int16(4).as_i64(), Some(4));
        assert_eq!(Value::Int32(42).as_i64(), Some(42));
        assert_eq!(Value::Int32(3).as_f64(), Some(3.0));
        assert_eq!(Value::Date(10).as_ordinal(), Some(10));
        assert_eq!(Value::String("hello".into()).as_str(), Some("hello"));
    }

    #[test]
    fn test_tuple_fields() {
        let row = Value::tuple(vec![Value::Int32(1), Value::Null]);
        assert_eq!(row.field(0), Some(&Value::Int32(1)));
        assert_eq!(row.field(1), Some(&Value::Null));
        assert_eq!(row.field(2), None);
        assert_eq!(Value::Int32(1).field(0), None);
    }

    #[test]
    fn test_equality_is_structural() {
        assert_eq!(Value::Int32(42), Value::Int32(42));
        assert_ne!(Value::Int32(42), Value::Int64(42));
        assert_eq!(Value::Null, Value::Null);
        assert_eq!(Value::Float64(f64::NAN), Value::Float64(f64::NAN));
    }

    #[test]
    fn test_value_ordering() {
        assert!(Value::Int32(1) < Value::Int32(2));
        assert!(Value::String("a".into()) < Value::String("b".into()));
        assert!(Value::Null < Value::Int32(0));
        assert!(Value::tuple(vec![Value::Int32(1)]) < Value::tuple(vec![Value::Int32(2)]));
    }

    #[test]
    fn test_sql_cmp() {
        assert_eq!(Value::Int32(1).sql_cmp(&Value::Int64(1)), Some(Ordering::Equal));
        assert_eq!(Value::Int16(1).sql_cmp(&Value::Float64(1.5)), Some(Ordering::Less));
        assert_eq!(Value::Null.sql_cmp(&Value::Int32(1)), None);
        assert_eq!(Value::String("a".into()).sql_cmp(&Value::Int32(1)), None);
    }

    #[test]
    fn test_cast() {
        assert_eq!(Value::Int32(5).cast(DataType::Int64), Some(Value::Int64(5)));
        assert_eq!(Value::Int64(70_000).cast(DataType::Int16), None);
        assert_eq!(Value::Null.cast(DataType::Int32), Some(Value::Null));
        assert_eq!(
            Value::Int32(5).cast(DataType::String),
            Some(Value::String("5".into()))
        );
        assert_eq!(Value::Float64(2.9).cast(DataType::Int32), Some(Value::Int32(2)));
        assert_eq!(Value::Date(1).cast(DataType::Timestamp), Some(Value::Timestamp(86_400_000)));
    }

    #[test]
    fn test_ordinals() {
        assert_eq!(Value::max_for_type(DataType::Int32), Some(Value::Int32(i32::MAX)));
        assert_eq!(Value::zero_for_type(DataType::Date), Some(Value::Date(0)));
        assert_eq!(
            Value::from_ordinal(DataType::Int16, 1_000_000),
            Some(Value::Int16(i16::MAX))
        );
        assert_eq!(Value::max_for_type(DataType::String), None);
    }

    #[test]
    fn test_value_from_impls() {
        let v: Value = 42i32.into();
        assert_eq!(v, Value::Int32(42));

        let v: Value = Some(100i64).into();
        assert_eq!(v.as_i64(), Some(100));

        let v: Value = None::<i32>.into();
        assert!(v.is_null());
    }

    #[test]
    fn test_display() {
        let row = Value::tuple(vec![Value::Int32(1), Value::String("x".into()), Value::Null]);
        assert_eq!(row.to_string(), "(1, x, NULL)");
    }
}
