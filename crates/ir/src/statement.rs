//! IR statements and top-level declarations.

use crate::expr::{ExprRef, Param};
use crate::types::TypeRef;
use alloc::string::String;
use alloc::sync::Arc;
use alloc::vec::Vec;

/// Shared reference to a statement.
pub type StatementRef = Arc<Statement>;

/// A statement inside a block expression.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum Statement {
    Let {
        name: String,
        ty: TypeRef,
        init: ExprRef,
    },
    Expr(ExprRef),
    Comment(String),
}

impl Statement {
    pub fn let_binding(name: impl Into<String>, init: ExprRef) -> StatementRef {
        Arc::new(Statement::Let {
            name: name.into(),
            ty: init.ty(),
            init,
        })
    }

    pub fn expr(expr: ExprRef) -> StatementRef {
        Arc::new(Statement::Expr(expr))
    }

    pub fn comment(text: impl Into<String>) -> StatementRef {
        Arc::new(Statement::Comment(text.into()))
    }

    /// Shallow equality, children by identity.
    pub fn same_fields(&self, other: &Statement) -> bool {
        match (self, other) {
            (
                Statement::Let { name, ty, init },
                Statement::Let {
                    name: n2,
                    ty: t2,
                    init: i2,
                },
            ) => name == n2 && Arc::ptr_eq(ty, t2) && Arc::ptr_eq(init, i2),
            (Statement::Expr(a), Statement::Expr(b)) => Arc::ptr_eq(a, b),
            (Statement::Comment(a), Statement::Comment(b)) => a == b,
            _ => false,
        }
    }
}

/// A user-defined function.
#[derive(Clone, Debug, PartialEq)]
pub struct Function {
    pub name: String,
    pub params: Vec<Param>,
    pub result: TypeRef,
    /// None for functions implemented outside the circuit.
    pub body: Option<ExprRef>,
}

/// A top-level declaration attached to a circuit.
#[derive(Clone, Debug, PartialEq)]
pub enum Item {
    /// A struct type, referenced by name from other types.
    Struct(TypeRef),
    Function(Function),
}

impl Item {
    /// The declared name, if the item is well formed.
    pub fn name(&self) -> Option<&str> {
        match self {
            Item::Struct(ty) => match &**ty {
                crate::types::Type::Struct { name, .. } => Some(name.as_str()),
                _ => None,
            },
            Item::Function(f) => Some(f.name.as_str()),
        }
    }
}
