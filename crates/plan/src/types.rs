//! SQL types as seen by the relational plan.

use alloc::boxed::Box;
use alloc::string::String;
use alloc::vec::Vec;
use core::fmt;
use zsql_core::DataType;

/// The shape of a SQL type.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum SqlTypeKind {
    /// A scalar type.
    Scalar(DataType),
    /// An array of elements.
    Array(Box<SqlType>),
    /// A structured (row) type, optionally named by CREATE TYPE.
    Struct { name: Option<String>, fields: Vec<Field> },
}

/// A SQL type with nullability.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct SqlType {
    pub kind: SqlTypeKind,
    pub nullable: bool,
}

impl SqlType {
    /// Creates a non-nullable scalar type.
    pub fn scalar(dt: DataType) -> Self {
        Self {
            kind: SqlTypeKind::Scalar(dt),
            nullable: false,
        }
    }

    /// Creates a non-nullable array type.
    pub fn array(element: SqlType) -> Self {
        Self {
            kind: SqlTypeKind::Array(Box::new(element)),
            nullable: false,
        }
    }

    /// Creates a non-nullable struct type.
    pub fn structure(name: Option<String>, fields: Vec<Field>) -> Self {
        Self {
            kind: SqlTypeKind::Struct { name, fields },
            nullable: false,
        }
    }

    /// Returns this type made nullable.
    pub fn nullable(self) -> Self {
        self.with_nullable(true)
    }

    /// Returns this type with the given nullability.
    pub fn with_nullable(mut self, nullable: bool) -> Self {
        self.nullable = nullable;
        self
    }

    /// Returns the scalar type, if this is a scalar.
    pub fn data_type(&self) -> Option<DataType> {
        match &self.kind {
            SqlTypeKind::Scalar(dt) => Some(*dt),
            _ => None,
        }
    }

    /// Returns the element type, if this is an array.
    pub fn element(&self) -> Option<&SqlType> {
        match &self.kind {
            SqlTypeKind::Array(element) => Some(element),
            _ => None,
        }
    }

    /// Returns true if this is an integer type of any width.
    pub fn is_integer(&self) -> bool {
        self.data_type().map(|dt| dt.is_integer()).unwrap_or(false)
    }
}

impl fmt::Display for SqlType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.kind {
            SqlTypeKind::Scalar(dt) => write!(f, "{}", dt)?,
            SqlTypeKind::Array(element) => write!(f, "{} ARRAY", element)?,
            SqlTypeKind::Struct { name: Some(name), .. } => f.write_str(name)?,
            SqlTypeKind::Struct { name: None, fields } => {
                f.write_str("ROW(")?;
                for (i, field) in fields.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{} {}", field.name, field.ty)?;
                }
                f.write_str(")")?;
            }
        }
        if !self.nullable {
            f.write_str(" NOT NULL")?;
        }
        Ok(())
    }
}

/// A named field of a row or struct type.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct Field {
    pub name: String,
    pub ty: SqlType,
}

impl Field {
    pub fn new(name: impl Into<String>, ty: SqlType) -> Self {
        Self {
            name: name.into(),
            ty,
        }
    }
}

/// The ordered field list of a relation.
#[derive(Clone, Debug, Default, PartialEq, Eq, Hash)]
pub struct RowType {
    pub fields: Vec<Field>,
}

impl RowType {
    pub fn new(fields: Vec<Field>) -> Self {
        Self { fields }
    }

    /// Builds a row type from `(name, type)` pairs.
    pub fn of(fields: &[(&str, SqlType)]) -> Self {
        Self {
            fields: fields
                .iter()
                .map(|(name, ty)| Field::new(*name, ty.clone()))
                .collect(),
        }
    }

    /// Number of fields.
    pub fn len(&self) -> usize {
        self.fields.len()
    }

    /// Returns true if the row has no fields.
    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Type of the field at `index`.
    pub fn field_type(&self, index: usize) -> Option<&SqlType> {
        self.fields.get(index).map(|f| &f.ty)
    }

    /// Index of the field with the given name, compared case-insensitively.
    pub fn index_of(&self, name: &str) -> Option<usize> {
        self.fields
            .iter()
            .position(|f| f.name.eq_ignore_ascii_case(name))
    }

    /// Concatenates two row types.
    pub fn concat(&self, other: &RowType) -> RowType {
        let mut fields = self.fields.clone();
        fields.extend(other.fields.iter().cloned());
        RowType { fields }
    }

    /// Returns a copy with every field made nullable.
    pub fn as_nullable(&self) -> RowType {
        RowType {
            fields: self
                .fields
                .iter()
                .map(|f| Field::new(f.name.clone(), f.ty.clone().nullable()))
                .collect(),
        }
    }
}
