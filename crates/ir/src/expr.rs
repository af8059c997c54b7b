//! IR expressions.
//!
//! Expressions are immutable trees shared through `ExprRef`. Closures are the
//! functions operators apply to rows; everything else is ordinary expression
//! structure inside closure bodies.

use crate::statement::StatementRef;
use crate::types::{Type, TypeRef};
use alloc::string::String;
use alloc::sync::Arc;
use alloc::vec::Vec;
use zsql_core::{DataType, Value};

/// Shared reference to an IR expression.
pub type ExprRef = Arc<Expr>;

/// Binary operators.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum BinaryOp {
    Eq,
    Neq,
    Lt,
    Lte,
    Gt,
    Gte,
    And,
    Or,
    Add,
    Sub,
    Mul,
    Div,
    Mod,
    /// Multiplies a value by a Z-set weight, keeping the value's type.
    MulWeight,
    Min,
    Max,
}

impl BinaryOp {
    pub fn is_comparison(&self) -> bool {
        matches!(
            self,
            BinaryOp::Eq | BinaryOp::Neq | BinaryOp::Lt | BinaryOp::Lte | BinaryOp::Gt | BinaryOp::Gte
        )
    }

    pub fn symbol(&self) -> &'static str {
        match self {
            BinaryOp::Eq => "==",
            BinaryOp::Neq => "!=",
            BinaryOp::Lt => "<",
            BinaryOp::Lte => "<=",
            BinaryOp::Gt => ">",
            BinaryOp::Gte => ">=",
            BinaryOp::And => "&&",
            BinaryOp::Or => "||",
            BinaryOp::Add => "+",
            BinaryOp::Sub => "-",
            BinaryOp::Mul => "*",
            BinaryOp::Div => "/",
            BinaryOp::Mod => "%",
            BinaryOp::MulWeight => "*w",
            BinaryOp::Min => "min",
            BinaryOp::Max => "max",
        }
    }
}

/// Unary operators.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum UnaryOp {
    Not,
    Neg,
    IsNull,
    /// Collapses a nullable boolean to a boolean, NULL becoming false.
    WrapBool,
}

/// One output column of a flatmap.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum FlatmapField {
    /// Field of the input row.
    Input(usize),
    /// The collection element being iterated.
    Element,
    /// The 0-based position of the element in the collection.
    Index,
}

/// A closure parameter.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct Param {
    pub name: String,
    pub ty: TypeRef,
}

impl Param {
    pub fn new(name: impl Into<String>, ty: TypeRef) -> Self {
        Self {
            name: name.into(),
            ty,
        }
    }

    /// A variable referring to this parameter.
    pub fn var(&self) -> ExprRef {
        Expr::var(self.name.clone(), self.ty.clone())
    }
}

/// An IR expression.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum Expr {
    Literal { value: Value, ty: TypeRef },
    Var { name: String, ty: TypeRef },
    /// Positional field of a tuple-valued expression.
    Field { base: ExprRef, index: usize },
    Tuple { fields: Vec<ExprRef> },
    RawTuple { fields: Vec<ExprRef> },
    Closure { params: Vec<Param>, body: ExprRef },
    Binary {
        op: BinaryOp,
        left: ExprRef,
        right: ExprRef,
        ty: TypeRef,
    },
    Unary {
        op: UnaryOp,
        operand: ExprRef,
        ty: TypeRef,
    },
    Cast { source: ExprRef, ty: TypeRef },
    If {
        condition: ExprRef,
        positive: ExprRef,
        negative: ExprRef,
        ty: TypeRef,
    },
    /// Call of a runtime library function.
    Apply {
        function: String,
        args: Vec<ExprRef>,
        ty: TypeRef,
    },
    Block {
        statements: Vec<StatementRef>,
        result: Option<ExprRef>,
    },
    /// A comparator under which all values are equal.
    NoComparator { element: TypeRef },
    /// Refines `source` by one field; earlier fields take precedence.
    FieldComparator {
        source: ExprRef,
        field: usize,
        ascending: bool,
    },
    /// Sorts the vector of an `(key, vec)` pair with a comparator.
    Sort { element: TypeRef, comparator: ExprRef },
    /// Expands one row into one row per element of a collection field.
    Flatmap {
        input: TypeRef,
        collection_field: usize,
        output: Vec<FlatmapField>,
        index_type: Option<TypeRef>,
    },
    /// A constant Z-set.
    ZSetLiteral {
        element: TypeRef,
        rows: Vec<(ExprRef, i64)>,
    },
}

impl Expr {
    pub fn literal(value: Value, ty: TypeRef) -> ExprRef {
        Arc::new(Expr::Literal { value, ty })
    }

    /// A NULL of the nullable version of `ty`.
    pub fn none(ty: &TypeRef) -> ExprRef {
        use crate::types::TypeRefExt;
        Self::literal(Value::Null, ty.with_nullable(true))
    }

    pub fn bool_literal(value: bool) -> ExprRef {
        Self::literal(Value::Boolean(value), Type::boolean(false))
    }

    pub fn i64_literal(value: i64) -> ExprRef {
        Self::literal(Value::Int64(value), Type::int64(false))
    }

    pub fn var(name: impl Into<String>, ty: TypeRef) -> ExprRef {
        Arc::new(Expr::Var {
            name: name.into(),
            ty,
        })
    }

    pub fn tuple(fields: Vec<ExprRef>) -> ExprRef {
        Arc::new(Expr::Tuple { fields })
    }

    pub fn raw_tuple(fields: Vec<ExprRef>) -> ExprRef {
        Arc::new(Expr::RawTuple { fields })
    }

    pub fn binary(op: BinaryOp, left: ExprRef, right: ExprRef, ty: TypeRef) -> ExprRef {
        Arc::new(Expr::Binary {
            op,
            left,
            right,
            ty,
        })
    }

    pub fn unary(op: UnaryOp, operand: ExprRef, ty: TypeRef) -> ExprRef {
        Arc::new(Expr::Unary { op, operand, ty })
    }

    pub fn if_else(condition: ExprRef, positive: ExprRef, negative: ExprRef, ty: TypeRef) -> ExprRef {
        Arc::new(Expr::If {
            condition,
            positive,
            negative,
            ty,
        })
    }

    pub fn apply(function: impl Into<String>, args: Vec<ExprRef>, ty: TypeRef) -> ExprRef {
        Arc::new(Expr::Apply {
            function: function.into(),
            args,
            ty,
        })
    }

    pub fn block(statements: Vec<StatementRef>, result: Option<ExprRef>) -> ExprRef {
        Arc::new(Expr::Block { statements, result })
    }

    pub fn no_comparator(element: TypeRef) -> ExprRef {
        Arc::new(Expr::NoComparator { element })
    }

    pub fn zset_literal(element: TypeRef, rows: Vec<(ExprRef, i64)>) -> ExprRef {
        Arc::new(Expr::ZSetLiteral { element, rows })
    }

    /// Disjunction of `exprs`; None when empty.
    pub fn or_all(exprs: Vec<ExprRef>) -> Option<ExprRef> {
        exprs.into_iter().reduce(|acc, e| {
            let nullable = acc.ty().may_be_null() || e.ty().may_be_null();
            Self::binary(BinaryOp::Or, acc, e, Type::boolean(nullable))
        })
    }

    /// Returns the type of this expression.
    pub fn ty(&self) -> TypeRef {
        match self {
            Expr::Literal { ty, .. }
            | Expr::Var { ty, .. }
            | Expr::Binary { ty, .. }
            | Expr::Unary { ty, .. }
            | Expr::Cast { ty, .. }
            | Expr::If { ty, .. }
            | Expr::Apply { ty, .. } => ty.clone(),
            Expr::Field { base, index } => base.ty().field_type(*index).unwrap_or_else(Type::any),
            Expr::Tuple { fields } => Type::tuple(fields.iter().map(|f| f.ty()).collect()),
            Expr::RawTuple { fields } => Type::raw_tuple(fields.iter().map(|f| f.ty()).collect()),
            Expr::Closure { params, body } => {
                Type::function(body.ty(), params.iter().map(|p| p.ty.clone()).collect())
            }
            Expr::Block { result, .. } => result.as_ref().map(|r| r.ty()).unwrap_or_else(Type::void),
            Expr::NoComparator { element } => Type::user("Comparator", alloc::vec![element.clone()]),
            Expr::FieldComparator { source, .. } => source.ty(),
            Expr::Sort { element, .. } => {
                Type::function(Type::vec(element.clone()), alloc::vec![Type::any()])
            }
            Expr::Flatmap { input, .. } => Type::function(Type::any(), alloc::vec![input.clone()]),
            Expr::ZSetLiteral { element, .. } => Type::zset(element.clone()),
        }
    }

    /// The literal value, if this is a literal.
    pub fn as_literal(&self) -> Option<&Value> {
        match self {
            Expr::Literal { value, .. } => Some(value),
            _ => None,
        }
    }

    /// Returns true if this is the boolean literal `true`.
    pub fn is_true_literal(&self) -> bool {
        matches!(self.as_literal(), Some(Value::Boolean(true)))
    }

    /// Parameters and body of a closure.
    pub fn as_closure(&self) -> Option<(&[Param], &ExprRef)> {
        match self {
            Expr::Closure { params, body } => Some((params.as_slice(), body)),
            _ => None,
        }
    }

    /// Shallow equality used by the rewrite engine: scalar fields compared by
    /// value, child nodes and types by identity.
    pub fn same_fields(&self, other: &Expr) -> bool {
        fn same<T>(a: &Arc<T>, b: &Arc<T>) -> bool {
            Arc::ptr_eq(a, b)
        }
        fn same_all<T>(a: &[Arc<T>], b: &[Arc<T>]) -> bool {
            a.len() == b.len() && a.iter().zip(b).all(|(x, y)| Arc::ptr_eq(x, y))
        }
        fn same_opt<T>(a: &Option<Arc<T>>, b: &Option<Arc<T>>) -> bool {
            match (a, b) {
                (Some(x), Some(y)) => Arc::ptr_eq(x, y),
                (None, None) => true,
                _ => false,
            }
        }
        match (self, other) {
            (Expr::Literal { value, ty }, Expr::Literal { value: v2, ty: t2 }) => {
                value == v2 && same(ty, t2)
            }
            (Expr::Var { name, ty }, Expr::Var { name: n2, ty: t2 }) => name == n2 && same(ty, t2),
            (Expr::Field { base, index }, Expr::Field { base: b2, index: i2 }) => {
                index == i2 && same(base, b2)
            }
            (Expr::Tuple { fields }, Expr::Tuple { fields: f2 })
            | (Expr::RawTuple { fields }, Expr::RawTuple { fields: f2 }) => same_all(fields, f2),
            (Expr::Closure { params, body }, Expr::Closure { params: p2, body: b2 }) => {
                same(body, b2)
                    && params.len() == p2.len()
                    && params
                        .iter()
                        .zip(p2)
                        .all(|(a, b)| a.name == b.name && same(&a.ty, &b.ty))
            }
            (
                Expr::Binary {
                    op,
                    left,
                    right,
                    ty,
                },
                Expr::Binary {
                    op: o2,
                    left: l2,
                    right: r2,
                    ty: t2,
                },
            ) => op == o2 && same(left, l2) && same(right, r2) && same(ty, t2),
            (
                Expr::Unary { op, operand, ty },
                Expr::Unary {
                    op: o2,
                    operand: e2,
                    ty: t2,
                },
            ) => op == o2 && same(operand, e2) && same(ty, t2),
            (Expr::Cast { source, ty }, Expr::Cast { source: s2, ty: t2 }) => {
                same(source, s2) && same(ty, t2)
            }
            (
                Expr::If {
                    condition,
                    positive,
                    negative,
                    ty,
                },
                Expr::If {
                    condition: c2,
                    positive: p2,
                    negative: n2,
                    ty: t2,
                },
            ) => same(condition, c2) && same(positive, p2) && same(negative, n2) && same(ty, t2),
            (
                Expr::Apply { function, args, ty },
                Expr::Apply {
                    function: f2,
                    args: a2,
                    ty: t2,
                },
            ) => function == f2 && same_all(args, a2) && same(ty, t2),
            (
                Expr::Block { statements, result },
                Expr::Block {
                    statements: s2,
                    result: r2,
                },
            ) => same_all(statements, s2) && same_opt(result, r2),
            (Expr::NoComparator { element }, Expr::NoComparator { element: e2 }) => {
                same(element, e2)
            }
            (
                Expr::FieldComparator {
                    source,
                    field,
                    ascending,
                },
                Expr::FieldComparator {
                    source: s2,
                    field: f2,
                    ascending: a2,
                },
            ) => field == f2 && ascending == a2 && same(source, s2),
            (
                Expr::Sort {
                    element,
                    comparator,
                },
                Expr::Sort {
                    element: e2,
                    comparator: c2,
                },
            ) => same(element, e2) && same(comparator, c2),
            (
                Expr::Flatmap {
                    input,
                    collection_field,
                    output,
                    index_type,
                },
                Expr::Flatmap {
                    input: i2,
                    collection_field: c2,
                    output: o2,
                    index_type: t2,
                },
            ) => same(input, i2) && collection_field == c2 && output == o2 && same_opt(index_type, t2),
            (Expr::ZSetLiteral { element, rows }, Expr::ZSetLiteral { element: e2, rows: r2 }) => {
                same(element, e2)
                    && rows.len() == r2.len()
                    && rows
                        .iter()
                        .zip(r2)
                        .all(|((a, wa), (b, wb))| wa == wb && same(a, b))
            }
            _ => false,
        }
    }
}

/// Fluent construction on shared expressions.
pub trait ExprExt {
    /// Positional field access.
    fn field(&self, index: usize) -> ExprRef;
    /// Cast to `ty`; returns the receiver when it already has that type.
    fn cast(&self, ty: &TypeRef) -> ExprRef;
    fn is_null(&self) -> ExprRef;
    fn not(&self) -> ExprRef;
    /// Wraps a nullable boolean so that NULL reads as false.
    fn wrap_bool(&self) -> ExprRef;
    /// A closure with this expression as body.
    fn closure(&self, params: Vec<Param>) -> ExprRef;
    /// Fields `0..arity` of a tuple-valued expression, one access each.
    fn flatten(&self) -> Vec<ExprRef>;
}

impl ExprExt for ExprRef {
    fn field(&self, index: usize) -> ExprRef {
        Arc::new(Expr::Field {
            base: self.clone(),
            index,
        })
    }

    fn cast(&self, ty: &TypeRef) -> ExprRef {
        if self.ty().same_type(ty) {
            return self.clone();
        }
        Arc::new(Expr::Cast {
            source: self.clone(),
            ty: ty.clone(),
        })
    }

    fn is_null(&self) -> ExprRef {
        Expr::unary(UnaryOp::IsNull, self.clone(), Type::boolean(false))
    }

    fn not(&self) -> ExprRef {
        let ty = self.ty();
        Expr::unary(UnaryOp::Not, self.clone(), ty)
    }

    fn wrap_bool(&self) -> ExprRef {
        if !self.ty().may_be_null() {
            return self.clone();
        }
        Expr::unary(UnaryOp::WrapBool, self.clone(), Type::boolean(false))
    }

    fn closure(&self, params: Vec<Param>) -> ExprRef {
        Arc::new(Expr::Closure {
            params,
            body: self.clone(),
        })
    }

    fn flatten(&self) -> Vec<ExprRef> {
        (0..self.ty().arity()).map(|i| self.field(i)).collect()
    }
}

/// Shorthand for a primitive type used by expression builders.
pub fn scalar(code: DataType, nullable: bool) -> TypeRef {
    Type::primitive(code, nullable)
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloc::vec;

    fn row_type() -> TypeRef {
        Type::tuple(vec![scalar(DataType::Int32, false), scalar(DataType::String, true)])
    }

    #[test]
    fn test_field_types() {
        let t = Expr::var("t", row_type());
        assert_eq!(t.field(0).ty(), scalar(DataType::Int32, false));
        assert_eq!(t.field(1).ty(), scalar(DataType::String, true));
        assert_eq!(t.flatten().len(), 2);
    }

    #[test]
    fn test_cast_to_same_type_is_identity() {
        let t = Expr::var("t", row_type());
        let f = t.field(0);
        assert!(Arc::ptr_eq(&f, &f.cast(&scalar(DataType::Int32, false))));
        let c = f.cast(&scalar(DataType::Int32, true));
        assert!(matches!(&*c, Expr::Cast { .. }));
        assert!(c.ty().may_be_null());
    }

    #[test]
    fn test_closure_type() {
        let p = Param::new("t", row_type());
        let c = p.var().field(0).closure(vec![p.clone()]);
        match &*c.ty() {
            Type::Function { result, params } => {
                assert_eq!(result, &scalar(DataType::Int32, false));
                assert_eq!(params.len(), 1);
            }
            other => panic!("unexpected type {:?}", other),
        }
    }

    #[test]
    fn test_wrap_bool_only_for_nullable() {
        let b = Expr::var("b", Type::boolean(false));
        assert!(Arc::ptr_eq(&b, &b.wrap_bool()));
        let nb = Expr::var("b", Type::boolean(true));
        assert!(!nb.wrap_bool().ty().may_be_null());
    }

    #[test]
    fn test_or_all() {
        assert!(Expr::or_all(vec![]).is_none());
        let a = Expr::var("a", Type::boolean(false));
        let b = Expr::var("b", Type::boolean(false));
        let or = Expr::or_all(vec![a, b]).map(|e| e.ty());
        assert_eq!(or, Some(Type::boolean(false)));
    }

    #[test]
    fn test_same_fields_compares_children_by_identity() {
        let x = Expr::var("x", Type::int64(false));
        let y = Expr::var("x", Type::int64(false));
        let a = Expr::binary(BinaryOp::Add, x.clone(), x.clone(), Type::int64(false));
        let b = Expr::binary(BinaryOp::Add, x.clone(), x.clone(), Type::int64(false));
        let c = Expr::binary(BinaryOp::Add, x.clone(), y, Type::int64(false));
        // Types are compared by identity as well.
        assert!(!a.same_fields(&b));
        if let Expr::Binary { ty, .. } = &*a {
            let d = Expr::binary(BinaryOp::Add, x.clone(), x.clone(), ty.clone());
            assert!(a.same_fields(&d));
        }
        assert!(!a.same_fields(&c));
        assert_eq!(a, c);
    }
}
