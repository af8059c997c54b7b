//! IR types.
//!
//! Types are immutable and shared through `TypeRef`. Nullability lives on the
//! type kinds that can hold a SQL NULL.

use alloc::string::String;
use alloc::sync::Arc;
use alloc::vec::Vec;
use zsql_core::DataType;

/// Shared reference to an IR type.
pub type TypeRef = Arc<Type>;

/// A named field of a struct type.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct StructField {
    pub name: String,
    pub ty: TypeRef,
}

impl StructField {
    pub fn new(name: impl Into<String>, ty: TypeRef) -> Self {
        Self {
            name: name.into(),
            ty,
        }
    }
}

/// An IR type.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum Type {
    /// A scalar.
    Primitive { code: DataType, nullable: bool },
    /// A row: fields addressed by position.
    Tuple { fields: Vec<TypeRef>, nullable: bool },
    /// A key/value pair or other transient grouping; never nullable.
    RawTuple { fields: Vec<TypeRef> },
    /// A vector (SQL array or sorted rows).
    Vec { element: TypeRef, nullable: bool },
    /// A weighted multiset.
    ZSet { element: TypeRef },
    /// A weighted multiset of key/value pairs.
    IndexedZSet { key: TypeRef, value: TypeRef },
    /// A named struct; the original row type of tables and views.
    Struct {
        name: String,
        fields: Vec<StructField>,
        nullable: bool,
    },
    /// A type defined by the runtime library, e.g. a semigroup.
    User {
        name: String,
        args: Vec<TypeRef>,
        nullable: bool,
    },
    /// The type of a closure.
    Function { result: TypeRef, params: Vec<TypeRef> },
    /// The result of a side-effecting call.
    Void,
    /// An unconstrained type.
    Any,
}

impl Type {
    pub fn primitive(code: DataType, nullable: bool) -> TypeRef {
        Arc::new(Type::Primitive { code, nullable })
    }

    pub fn boolean(nullable: bool) -> TypeRef {
        Self::primitive(DataType::Boolean, nullable)
    }

    pub fn int64(nullable: bool) -> TypeRef {
        Self::primitive(DataType::Int64, nullable)
    }

    /// The type of Z-set weights.
    pub fn weight() -> TypeRef {
        Self::int64(false)
    }

    pub fn tuple(fields: Vec<TypeRef>) -> TypeRef {
        Arc::new(Type::Tuple {
            fields,
            nullable: false,
        })
    }

    pub fn raw_tuple(fields: Vec<TypeRef>) -> TypeRef {
        Arc::new(Type::RawTuple { fields })
    }

    /// The empty raw tuple, used as the key of global groups.
    pub fn unit() -> TypeRef {
        Self::raw_tuple(Vec::new())
    }

    pub fn vec(element: TypeRef) -> TypeRef {
        Arc::new(Type::Vec {
            element,
            nullable: false,
        })
    }

    pub fn zset(element: TypeRef) -> TypeRef {
        Arc::new(Type::ZSet { element })
    }

    pub fn indexed_zset(key: TypeRef, value: TypeRef) -> TypeRef {
        Arc::new(Type::IndexedZSet { key, value })
    }

    pub fn structure(name: impl Into<String>, fields: Vec<StructField>) -> TypeRef {
        Arc::new(Type::Struct {
            name: name.into(),
            fields,
            nullable: false,
        })
    }

    pub fn user(name: impl Into<String>, args: Vec<TypeRef>) -> TypeRef {
        Arc::new(Type::User {
            name: name.into(),
            args,
            nullable: false,
        })
    }

    pub fn function(result: TypeRef, params: Vec<TypeRef>) -> TypeRef {
        Arc::new(Type::Function { result, params })
    }

    pub fn void() -> TypeRef {
        Arc::new(Type::Void)
    }

    pub fn any() -> TypeRef {
        Arc::new(Type::Any)
    }

    /// Whether values of this type may be NULL.
    pub fn may_be_null(&self) -> bool {
        match self {
            Type::Primitive { nullable, .. }
            | Type::Tuple { nullable, .. }
            | Type::Vec { nullable, .. }
            | Type::Struct { nullable, .. }
            | Type::User { nullable, .. } => *nullable,
            _ => false,
        }
    }

    /// The scalar type code, if this is a primitive.
    pub fn data_type(&self) -> Option<DataType> {
        match self {
            Type::Primitive { code, .. } => Some(*code),
            _ => None,
        }
    }

    /// Returns true for integer primitives.
    pub fn is_integer(&self) -> bool {
        self.data_type().map(|c| c.is_integer()).unwrap_or(false)
    }

    /// Field types of a tuple, raw tuple or struct.
    pub fn fields(&self) -> Option<Vec<TypeRef>> {
        match self {
            Type::Tuple { fields, .. } | Type::RawTuple { fields } => Some(fields.clone()),
            Type::Struct { fields, .. } => Some(fields.iter().map(|f| f.ty.clone()).collect()),
            _ => None,
        }
    }

    /// Type of field `index` of a tuple-like type.
    pub fn field_type(&self, index: usize) -> Option<TypeRef> {
        match self {
            Type::Tuple { fields, .. } | Type::RawTuple { fields } => fields.get(index).cloned(),
            Type::Struct { fields, .. } => fields.get(index).map(|f| f.ty.clone()),
            _ => None,
        }
    }

    /// Number of fields of a tuple-like type; 0 for anything else.
    pub fn arity(&self) -> usize {
        match self {
            Type::Tuple { fields, .. } | Type::RawTuple { fields } => fields.len(),
            Type::Struct { fields, .. } => fields.len(),
            _ => 0,
        }
    }

    /// A tuple of fields `start..end` of this tuple type.
    pub fn slice(&self, start: usize, end: usize) -> TypeRef {
        let fields = self.fields().unwrap_or_default();
        let end = end.min(fields.len());
        let start = start.min(end);
        Type::tuple(fields[start..end].to_vec())
    }

    /// Element type of a Z-set or vector.
    pub fn element_type(&self) -> Option<TypeRef> {
        match self {
            Type::ZSet { element } | Type::Vec { element, .. } => Some(element.clone()),
            _ => None,
        }
    }

    /// Key and value types of an indexed Z-set.
    pub fn key_value_types(&self) -> Option<(TypeRef, TypeRef)> {
        match self {
            Type::IndexedZSet { key, value } => Some((key.clone(), value.clone())),
            _ => None,
        }
    }

    pub fn is_indexed(&self) -> bool {
        matches!(self, Type::IndexedZSet { .. })
    }

    /// Structural type equality, including nullability.
    pub fn same_type(&self, other: &Type) -> bool {
        self == other
    }

    /// Shallow equality used by the rewrite engine: scalar fields compared by
    /// value, child types by identity.
    pub fn same_fields(&self, other: &Type) -> bool {
        fn same_refs(a: &[TypeRef], b: &[TypeRef]) -> bool {
            a.len() == b.len() && a.iter().zip(b).all(|(x, y)| Arc::ptr_eq(x, y))
        }
        match (self, other) {
            (
                Type::Primitive { code, nullable },
                Type::Primitive {
                    code: c2,
                    nullable: n2,
                },
            ) => code == c2 && nullable == n2,
            (
                Type::Tuple { fields, nullable },
                Type::Tuple {
                    fields: f2,
                    nullable: n2,
                },
            ) => nullable == n2 && same_refs(fields, f2),
            (Type::RawTuple { fields }, Type::RawTuple { fields: f2 }) => same_refs(fields, f2),
            (
                Type::Vec { element, nullable },
                Type::Vec {
                    element: e2,
                    nullable: n2,
                },
            ) => nullable == n2 && Arc::ptr_eq(element, e2),
            (Type::ZSet { element }, Type::ZSet { element: e2 }) => Arc::ptr_eq(element, e2),
            (Type::IndexedZSet { key, value }, Type::IndexedZSet { key: k2, value: v2 }) => {
                Arc::ptr_eq(key, k2) && Arc::ptr_eq(value, v2)
            }
            (
                Type::Struct {
                    name,
                    fields,
                    nullable,
                },
                Type::Struct {
                    name: name2,
                    fields: f2,
                    nullable: n2,
                },
            ) => {
                name == name2
                    && nullable == n2
                    && fields.len() == f2.len()
                    && fields
                        .iter()
                        .zip(f2)
                        .all(|(a, b)| a.name == b.name && Arc::ptr_eq(&a.ty, &b.ty))
            }
            (
                Type::User {
                    name,
                    args,
                    nullable,
                },
                Type::User {
                    name: name2,
                    args: a2,
                    nullable: n2,
                },
            ) => name == name2 && nullable == n2 && same_refs(args, a2),
            (Type::Function { result, params }, Type::Function { result: r2, params: p2 }) => {
                Arc::ptr_eq(result, r2) && same_refs(params, p2)
            }
            (Type::Void, Type::Void) | (Type::Any, Type::Any) => true,
            _ => false,
        }
    }
}

/// Operations on shared types that may return the receiver itself.
pub trait TypeRefExt {
    /// Returns a copy with the given top-level nullability.
    ///
    /// Kinds that cannot be null, and types that already have the requested
    /// nullability, are returned as the same instance.
    fn with_nullable(&self, may_be_null: bool) -> TypeRef;

    /// Converts a struct type to the equivalent tuple type.
    fn to_tuple(&self) -> TypeRef;
}

impl TypeRefExt for TypeRef {
    fn with_nullable(&self, may_be_null: bool) -> TypeRef {
        if self.may_be_null() == may_be_null {
            return self.clone();
        }
        let mut copy = (**self).clone();
        match &mut copy {
            Type::Primitive { nullable, .. }
            | Type::Tuple { nullable, .. }
            | Type::Vec { nullable, .. }
            | Type::Struct { nullable, .. }
            | Type::User { nullable, .. } => *nullable = may_be_null,
            _ => return self.clone(),
        }
        Arc::new(copy)
    }

    fn to_tuple(&self) -> TypeRef {
        match &**self {
            Type::Struct {
                fields, nullable, ..
            } => Arc::new(Type::Tuple {
                fields: fields.iter().map(|f| f.ty.clone()).collect(),
                nullable: *nullable,
            }),
            _ => self.clone(),
        }
    }
}
