//! Metadata attached to source operators.

use alloc::string::String;
use alloc::vec::Vec;
use zsql_ir::{ExprRef, TypeRef};

/// One column of an input table.
#[derive(Clone, Debug, PartialEq)]
pub struct InputColumnMetadata {
    pub name: String,
    pub ty: TypeRef,
    pub is_primary_key: bool,
    /// How far behind the largest value seen an update may still arrive.
    pub lateness: Option<ExprRef>,
    /// Value used when an INSERT omits the column, already cast to `ty`.
    pub default_value: Option<ExprRef>,
}

impl InputColumnMetadata {
    pub fn new(name: impl Into<String>, ty: TypeRef) -> Self {
        Self {
            name: name.into(),
            ty,
            is_primary_key: false,
            lateness: None,
            default_value: None,
        }
    }
}

/// Metadata of an input table, one entry per column in declaration order.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct InputTableMetadata {
    pub columns: Vec<InputColumnMetadata>,
}

impl InputTableMetadata {
    pub fn new(columns: Vec<InputColumnMetadata>) -> Self {
        Self { columns }
    }

    /// Names of the primary key columns.
    pub fn primary_keys(&self) -> Vec<&str> {
        self.columns
            .iter()
            .filter(|c| c.is_primary_key)
            .map(|c| c.name.as_str())
            .collect()
    }

    pub fn column(&self, name: &str) -> Option<&InputColumnMetadata> {
        self.columns
            .iter()
            .find(|c| c.name.eq_ignore_ascii_case(name))
    }
}
