//! Conversion of SQL types to IR types.

use alloc::string::String;
use alloc::sync::Arc;
use alloc::vec::Vec;
use hashbrown::HashMap;
use zsql_ir::{StructField, Type, TypeRef, TypeRefExt};
use zsql_plan::{RowType, SqlType, SqlTypeKind};

/// Converts plan types to IR types and remembers user-defined struct types.
#[derive(Clone, Debug, Default)]
pub struct TypeCompiler {
    structs: HashMap<String, TypeRef>,
}

impl TypeCompiler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Converts a SQL type.
    ///
    /// Structured types become tuples unless `as_struct` is set, in which
    /// case they keep their field names.
    pub fn convert_type(&self, ty: &SqlType, as_struct: bool) -> TypeRef {
        match &ty.kind {
            SqlTypeKind::Scalar(dt) => Type::primitive(*dt, ty.nullable),
            SqlTypeKind::Array(element) => Arc::new(Type::Vec {
                element: self.convert_type(element, as_struct),
                nullable: ty.nullable,
            }),
            SqlTypeKind::Struct { name, fields } => {
                if as_struct {
                    if let Some(known) = name.as_deref().and_then(|n| self.struct_by_name(n)) {
                        return known.with_nullable(ty.nullable);
                    }
                    Arc::new(Type::Struct {
                        name: name.clone().unwrap_or_default(),
                        fields: fields
                            .iter()
                            .map(|f| StructField::new(f.name.clone(), self.convert_type(&f.ty, true)))
                            .collect(),
                        nullable: ty.nullable,
                    })
                } else {
                    Arc::new(Type::Tuple {
                        fields: fields
                            .iter()
                            .map(|f| self.convert_type(&f.ty, false))
                            .collect(),
                        nullable: ty.nullable,
                    })
                }
            }
        }
    }

    /// The Z-set element type of a relation: a tuple of its field types.
    pub fn convert_row(&self, row: &RowType) -> TypeRef {
        Type::tuple(
            row.fields
                .iter()
                .map(|f| self.convert_type(&f.ty, false))
                .collect(),
        )
    }

    /// A relation's row type as a struct named `name`, used for the
    /// schema of sources and sinks.
    pub fn convert_row_as_struct(&self, name: &str, row: &RowType) -> TypeRef {
        let fields: Vec<StructField> = row
            .fields
            .iter()
            .map(|f| StructField::new(f.name.clone(), self.convert_type(&f.ty, true)))
            .collect();
        Type::structure(name, fields)
    }

    /// Registers a struct type declared by CREATE TYPE.
    pub fn register_struct(&mut self, ty: TypeRef) {
        if let Type::Struct { name, .. } = &*ty {
            self.structs.insert(name.to_ascii_lowercase(), ty.clone());
        }
    }

    /// Looks up a registered struct, ignoring case.
    pub fn struct_by_name(&self, name: &str) -> Option<TypeRef> {
        self.structs.get(&name.to_ascii_lowercase()).cloned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloc::vec;
    use zsql_core::DataType;
    use zsql_plan::Field;

    #[test]
    fn test_scalars_keep_nullability() {
        let tc = TypeCompiler::new();
        let t = tc.convert_type(&SqlType::scalar(DataType::Int32).nullable(), false);
        assert_eq!(t, Type::primitive(DataType::Int32, true));
    }

    #[test]
    fn test_row_to_tuple_and_struct() {
        let tc = TypeCompiler::new();
        let row = RowType::of(&[
            ("a", SqlType::scalar(DataType::Int64)),
            ("b", SqlType::array(SqlType::scalar(DataType::String))),
        ]);
        let tuple = tc.convert_row(&row);
        assert_eq!(tuple.arity(), 2);
        assert!(matches!(&*tuple.field_type(1).unwrap(), Type::Vec { .. }));
        let st = tc.convert_row_as_struct("T", &row);
        match &*st {
            Type::Struct { name, fields, .. } => {
                assert_eq!(name, "T");
                assert_eq!(fields[0].name, "a");
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_registered_structs_are_reused() {
        let mut tc = TypeCompiler::new();
        let address = Type::structure(
            "Address",
            vec![StructField::new("city", Type::primitive(DataType::String, false))],
        );
        tc.register_struct(address.clone());
        let sql = SqlType::structure(
            Some("ADDRESS".into()),
            vec![Field::new("city", SqlType::scalar(DataType::String))],
        );
        assert!(Arc::ptr_eq(&tc.convert_type(&sql, true), &address));
        assert_eq!(tc.convert_type(&sql, false).arity(), 1);
    }
}
