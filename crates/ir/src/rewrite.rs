//! Structure-sharing rewriting of IR trees.
//!
//! A [`Rewriter`] has one hook per expression kind, plus one for types and one
//! for statements. Every hook defaults to the matching `walk_*` function, which
//! rewrites the children of a node bottom-up and rebuilds the node only if one
//! of its immediate fields changed. An unchanged subtree comes back as the very
//! same `Arc`, so `Arc::ptr_eq` answers "did anything change here".
//!
//! An override that needs context for its children (for example variable
//! shadowing under a closure) visits them itself through [`rewrite_expr`].

use crate::aggregate::{Aggregate, Fold, Implementation};
use crate::expr::{Expr, ExprRef, Param};
use crate::statement::{Statement, StatementRef};
use crate::types::{StructField, Type, TypeRef};
use alloc::sync::Arc;
use alloc::vec::Vec;

/// Per-kind hooks of the rewrite engine.
pub trait Rewriter {
    fn rewrite_literal(&mut self, expr: &ExprRef) -> ExprRef {
        walk_expr(self, expr)
    }

    fn rewrite_var(&mut self, expr: &ExprRef) -> ExprRef {
        walk_expr(self, expr)
    }

    fn rewrite_field(&mut self, expr: &ExprRef) -> ExprRef {
        walk_expr(self, expr)
    }

    /// Tuples and raw tuples.
    fn rewrite_tuple(&mut self, expr: &ExprRef) -> ExprRef {
        walk_expr(self, expr)
    }

    fn rewrite_closure(&mut self, expr: &ExprRef) -> ExprRef {
        walk_expr(self, expr)
    }

    fn rewrite_binary(&mut self, expr: &ExprRef) -> ExprRef {
        walk_expr(self, expr)
    }

    fn rewrite_unary(&mut self, expr: &ExprRef) -> ExprRef {
        walk_expr(self, expr)
    }

    fn rewrite_cast(&mut self, expr: &ExprRef) -> ExprRef {
        walk_expr(self, expr)
    }

    fn rewrite_if(&mut self, expr: &ExprRef) -> ExprRef {
        walk_expr(self, expr)
    }

    fn rewrite_apply(&mut self, expr: &ExprRef) -> ExprRef {
        walk_expr(self, expr)
    }

    fn rewrite_block(&mut self, expr: &ExprRef) -> ExprRef {
        walk_expr(self, expr)
    }

    /// Both comparator kinds.
    fn rewrite_comparator(&mut self, expr: &ExprRef) -> ExprRef {
        walk_expr(self, expr)
    }

    fn rewrite_sort(&mut self, expr: &ExprRef) -> ExprRef {
        walk_expr(self, expr)
    }

    fn rewrite_flatmap(&mut self, expr: &ExprRef) -> ExprRef {
        walk_expr(self, expr)
    }

    fn rewrite_zset_literal(&mut self, expr: &ExprRef) -> ExprRef {
        walk_expr(self, expr)
    }

    fn rewrite_type(&mut self, ty: &TypeRef) -> TypeRef {
        walk_type(self, ty)
    }

    fn rewrite_statement(&mut self, stmt: &StatementRef) -> StatementRef {
        walk_statement(self, stmt)
    }
}

/// Dispatches `expr` to the hook for its kind.
pub fn rewrite_expr<R: Rewriter + ?Sized>(r: &mut R, expr: &ExprRef) -> ExprRef {
    match &**expr {
        Expr::Literal { .. } => r.rewrite_literal(expr),
        Expr::Var { .. } => r.rewrite_var(expr),
        Expr::Field { .. } => r.rewrite_field(expr),
        Expr::Tuple { .. } | Expr::RawTuple { .. } => r.rewrite_tuple(expr),
        Expr::Closure { .. } => r.rewrite_closure(expr),
        Expr::Binary { .. } => r.rewrite_binary(expr),
        Expr::Unary { .. } => r.rewrite_unary(expr),
        Expr::Cast { .. } => r.rewrite_cast(expr),
        Expr::If { .. } => r.rewrite_if(expr),
        Expr::Apply { .. } => r.rewrite_apply(expr),
        Expr::Block { .. } => r.rewrite_block(expr),
        Expr::NoComparator { .. } | Expr::FieldComparator { .. } => r.rewrite_comparator(expr),
        Expr::Sort { .. } => r.rewrite_sort(expr),
        Expr::Flatmap { .. } => r.rewrite_flatmap(expr),
        Expr::ZSetLiteral { .. } => r.rewrite_zset_literal(expr),
    }
}

fn exprs<R: Rewriter + ?Sized>(r: &mut R, items: &[ExprRef]) -> Vec<ExprRef> {
    items.iter().map(|e| rewrite_expr(r, e)).collect()
}

fn types<R: Rewriter + ?Sized>(r: &mut R, items: &[TypeRef]) -> Vec<TypeRef> {
    items.iter().map(|t| r.rewrite_type(t)).collect()
}

fn params<R: Rewriter + ?Sized>(r: &mut R, items: &[Param]) -> Vec<Param> {
    items
        .iter()
        .map(|p| Param {
            name: p.name.clone(),
            ty: r.rewrite_type(&p.ty),
        })
        .collect()
}

fn keep_or_replace<T, F>(old: &Arc<T>, new: T, same: F) -> Arc<T>
where
    T: core::fmt::Display,
    F: Fn(&T, &T) -> bool,
{
    if same(&**old, &new) {
        return old.clone();
    }
    tracing::trace!("{} -> {}", old, new);
    Arc::new(new)
}

/// Rewrites the children of `expr` and rebuilds it if any immediate field changed.
pub fn walk_expr<R: Rewriter + ?Sized>(r: &mut R, expr: &ExprRef) -> ExprRef {
    let rebuilt = match &**expr {
        Expr::Literal { value, ty } => Expr::Literal {
            value: value.clone(),
            ty: r.rewrite_type(ty),
        },
        Expr::Var { name, ty } => Expr::Var {
            name: name.clone(),
            ty: r.rewrite_type(ty),
        },
        Expr::Field { base, index } => Expr::Field {
            base: rewrite_expr(r, base),
            index: *index,
        },
        Expr::Tuple { fields } => Expr::Tuple {
            fields: exprs(r, fields),
        },
        Expr::RawTuple { fields } => Expr::RawTuple {
            fields: exprs(r, fields),
        },
        Expr::Closure { params: ps, body } => Expr::Closure {
            params: params(r, ps),
            body: rewrite_expr(r, body),
        },
        Expr::Binary {
            op,
            left,
            right,
            ty,
        } => Expr::Binary {
            op: *op,
            left: rewrite_expr(r, left),
            right: rewrite_expr(r, right),
            ty: r.rewrite_type(ty),
        },
        Expr::Unary { op, operand, ty } => Expr::Unary {
            op: *op,
            operand: rewrite_expr(r, operand),
            ty: r.rewrite_type(ty),
        },
        Expr::Cast { source, ty } => Expr::Cast {
            source: rewrite_expr(r, source),
            ty: r.rewrite_type(ty),
        },
        Expr::If {
            condition,
            positive,
            negative,
            ty,
        } => Expr::If {
            condition: rewrite_expr(r, condition),
            positive: rewrite_expr(r, positive),
            negative: rewrite_expr(r, negative),
            ty: r.rewrite_type(ty),
        },
        Expr::Apply { function, args, ty } => Expr::Apply {
            function: function.clone(),
            args: exprs(r, args),
            ty: r.rewrite_type(ty),
        },
        Expr::Block { statements, result } => Expr::Block {
            statements: statements.iter().map(|s| r.rewrite_statement(s)).collect(),
            result: result.as_ref().map(|e| rewrite_expr(r, e)),
        },
        Expr::NoComparator { element } => Expr::NoComparator {
            element: r.rewrite_type(element),
        },
        Expr::FieldComparator {
            source,
            field,
            ascending,
        } => Expr::FieldComparator {
            source: rewrite_expr(r, source),
            field: *field,
            ascending: *ascending,
        },
        Expr::Sort {
            element,
            comparator,
        } => Expr::Sort {
            element: r.rewrite_type(element),
            comparator: rewrite_expr(r, comparator),
        },
        Expr::Flatmap {
            input,
            collection_field,
            output,
            index_type,
        } => Expr::Flatmap {
            input: r.rewrite_type(input),
            collection_field: *collection_field,
            output: output.clone(),
            index_type: index_type.as_ref().map(|t| r.rewrite_type(t)),
        },
        Expr::ZSetLiteral { element, rows } => Expr::ZSetLiteral {
            element: r.rewrite_type(element),
            rows: rows
                .iter()
                .map(|(row, w)| (rewrite_expr(r, row), *w))
                .collect(),
        },
    };
    keep_or_replace(expr, rebuilt, Expr::same_fields)
}

/// Rewrites the component types of `ty` and rebuilds it if any changed.
pub fn walk_type<R: Rewriter + ?Sized>(r: &mut R, ty: &TypeRef) -> TypeRef {
    let rebuilt = match &**ty {
        Type::Primitive { .. } | Type::Void | Type::Any => return ty.clone(),
        Type::Tuple { fields, nullable } => Type::Tuple {
            fields: types(r, fields),
            nullable: *nullable,
        },
        Type::RawTuple { fields } => Type::RawTuple {
            fields: types(r, fields),
        },
        Type::Vec { element, nullable } => Type::Vec {
            element: r.rewrite_type(element),
            nullable: *nullable,
        },
        Type::ZSet { element } => Type::ZSet {
            element: r.rewrite_type(element),
        },
        Type::IndexedZSet { key, value } => Type::IndexedZSet {
            key: r.rewrite_type(key),
            value: r.rewrite_type(value),
        },
        Type::Struct {
            name,
            fields,
            nullable,
        } => Type::Struct {
            name: name.clone(),
            fields: fields
                .iter()
                .map(|f| StructField::new(f.name.clone(), r.rewrite_type(&f.ty)))
                .collect(),
            nullable: *nullable,
        },
        Type::User {
            name,
            args,
            nullable,
        } => Type::User {
            name: name.clone(),
            args: types(r, args),
            nullable: *nullable,
        },
        Type::Function { result, params } => Type::Function {
            result: r.rewrite_type(result),
            params: types(r, params),
        },
    };
    keep_or_replace(ty, rebuilt, Type::same_fields)
}

/// Rewrites the expressions and types of `stmt` and rebuilds it if any changed.
pub fn walk_statement<R: Rewriter + ?Sized>(r: &mut R, stmt: &StatementRef) -> StatementRef {
    let rebuilt = match &**stmt {
        Statement::Let { name, ty, init } => Statement::Let {
            name: name.clone(),
            ty: r.rewrite_type(ty),
            init: rewrite_expr(r, init),
        },
        Statement::Expr(e) => Statement::Expr(rewrite_expr(r, e)),
        Statement::Comment(_) => return stmt.clone(),
    };
    keep_or_replace(stmt, rebuilt, Statement::same_fields)
}

/// Rewrites every expression and type of a fold.
pub fn rewrite_fold<R: Rewriter + ?Sized>(r: &mut R, fold: &Fold) -> Fold {
    Fold {
        zero: rewrite_expr(r, &fold.zero),
        increment: rewrite_expr(r, &fold.increment),
        post_process: fold.post_process.as_ref().map(|p| rewrite_expr(r, p)),
        semigroup: r.rewrite_type(&fold.semigroup),
    }
}

/// Rewrites every expression and type of an aggregate.
pub fn rewrite_aggregate<R: Rewriter + ?Sized>(r: &mut R, aggregate: &Aggregate) -> Aggregate {
    Aggregate {
        row_var: Param {
            name: aggregate.row_var.name.clone(),
            ty: r.rewrite_type(&aggregate.row_var.ty),
        },
        implementations: aggregate
            .implementations
            .iter()
            .map(|i| Implementation {
                fold: rewrite_fold(r, &i.fold),
                empty_result: rewrite_expr(r, &i.empty_result),
                linear: i.linear,
            })
            .collect(),
    }
}

/// The rewriter that overrides nothing.
#[derive(Clone, Copy, Debug, Default)]
pub struct Identity;

impl Rewriter for Identity {}
