//! Interpreter for the IR expressions embedded in circuit operators.
//!
//! Tuples and raw tuples both evaluate to `Value::Tuple`. Scalar operators
//! follow SQL semantics: arithmetic and comparisons propagate NULL, AND/OR
//! use three-valued logic and division by zero is an evaluation error.

use crate::zset::ZSet;
use alloc::format;
use alloc::string::String;
use alloc::vec::Vec;
use core::cmp::Ordering;
use zsql_core::{DataType, Error, Result, Value};
use zsql_ir::{BinaryOp, Expr, ExprRef, FlatmapField, Statement, Type, UnaryOp};

/// Variable bindings visible to an expression, innermost last.
#[derive(Clone, Debug, Default)]
pub struct Env {
    bindings: Vec<(String, Value)>,
}

impl Env {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn bind(&mut self, name: impl Into<String>, value: Value) {
        self.bindings.push((name.into(), value));
    }

    pub fn lookup(&self, name: &str) -> Option<&Value> {
        self.bindings
            .iter()
            .rev()
            .find(|(n, _)| n == name)
            .map(|(_, v)| v)
    }

    fn depth(&self) -> usize {
        self.bindings.len()
    }

    fn truncate(&mut self, depth: usize) {
        self.bindings.truncate(depth);
    }
}

/// Evaluates a closed expression.
pub fn eval_constant(expr: &Expr) -> Result<Value> {
    eval(expr, &mut Env::new())
}

/// Applies a closure to its arguments.
pub fn call(closure: &Expr, args: Vec<Value>) -> Result<Value> {
    call_in(closure, args, &mut Env::new())
}

fn call_in(closure: &Expr, args: Vec<Value>, env: &mut Env) -> Result<Value> {
    let Some((params, body)) = closure.as_closure() else {
        return Err(Error::evaluation("Expected a closure"));
    };
    if params.len() != args.len() {
        return Err(Error::evaluation(format!(
            "Closure expects {} arguments but got {}",
            params.len(),
            args.len()
        )));
    }
    let depth = env.depth();
    for (param, arg) in params.iter().zip(args) {
        env.bind(param.name.clone(), arg);
    }
    let result = eval(body, env);
    env.truncate(depth);
    result
}

/// Applies an operator function to one element: a closure, or a sort of the
/// vector in a `(key, vec)` pair.
pub fn apply_function(function: &Expr, element: Value) -> Result<Value> {
    match function {
        Expr::Closure { .. } => call(function, alloc::vec![element]),
        Expr::Sort { comparator, .. } => {
            let rows = element
                .field(1)
                .and_then(Value::as_array)
                .ok_or_else(|| Error::evaluation(format!("Cannot sort {}", element)))?;
            let mut rows = rows.to_vec();
            sort_values(&mut rows, comparator)?;
            Ok(Value::Array(rows))
        }
        other => Err(Error::evaluation(format!("{} is not a function", other))),
    }
}

pub fn eval(expr: &Expr, env: &mut Env) -> Result<Value> {
    match expr {
        Expr::Literal { value, .. } => Ok(value.clone()),
        Expr::Var { name, .. } => env
            .lookup(name)
            .cloned()
            .ok_or_else(|| Error::evaluation(format!("Unbound variable {}", name))),
        Expr::Field { base, index } => {
            let base = eval(base, env)?;
            if base.is_null() {
                return Ok(Value::Null);
            }
            base.field(*index)
                .cloned()
                .ok_or_else(|| Error::evaluation(format!("No field {} in {}", index, base)))
        }
        Expr::Tuple { fields } | Expr::RawTuple { fields } => fields
            .iter()
            .map(|f| eval(f, env))
            .collect::<Result<Vec<_>>>()
            .map(Value::Tuple),
        Expr::Binary {
            op,
            left,
            right,
            ty,
        } => {
            let l = eval(left, env)?;
            let r = eval(right, env)?;
            binary(*op, &l, &r, ty)
        }
        Expr::Unary { op, operand, .. } => {
            let v = eval(operand, env)?;
            unary(*op, v)
        }
        Expr::Cast { source, ty } => cast(eval(source, env)?, ty),
        Expr::If {
            condition,
            positive,
            negative,
            ..
        } => {
            if eval(condition, env)?.as_bool() == Some(true) {
                eval(positive, env)
            } else {
                eval(negative, env)
            }
        }
        Expr::Apply { function, args, .. } => apply(function, args, env),
        Expr::Block { statements, result } => {
            let depth = env.depth();
            for statement in statements {
                match &**statement {
                    Statement::Let { name, init, .. } => {
                        let value = eval(init, env)?;
                        env.bind(name.clone(), value);
                    }
                    Statement::Expr(e) => {
                        eval(e, env)?;
                    }
                    Statement::Comment(_) => {}
                }
            }
            let value = match result {
                Some(result) => eval(result, env),
                None => Ok(Value::unit()),
            };
            env.truncate(depth);
            value
        }
        Expr::Closure { .. }
        | Expr::NoComparator { .. }
        | Expr::FieldComparator { .. }
        | Expr::Sort { .. }
        | Expr::Flatmap { .. }
        | Expr::ZSetLiteral { .. } => Err(Error::evaluation(format!("{} is not a scalar expression", expr))),
    }
}

fn apply(function: &str, args: &[ExprRef], env: &mut Env) -> Result<Value> {
    match (function, args) {
        ("weighted_push", [acc, value, weight]) => {
            let Value::Array(mut items) = eval(acc, env)? else {
                return Err(Error::evaluation("weighted_push expects an array"));
            };
            let value = eval(value, env)?;
            let weight = eval(weight, env)?
                .as_i64()
                .ok_or_else(|| Error::evaluation("weighted_push expects an integer weight"))?;
            if weight >= 0 {
                for _ in 0..weight {
                    items.push(value.clone());
                }
            } else {
                for _ in 0..weight.unsigned_abs() {
                    if let Some(position) = items.iter().position(|v| *v == value) {
                        items.remove(position);
                    }
                }
            }
            Ok(Value::Array(items))
        }
        ("map", [vector, closure]) => {
            let vector = eval(vector, env)?;
            if vector.is_null() {
                return Ok(Value::Null);
            }
            let items = vector
                .as_array()
                .ok_or_else(|| Error::evaluation(format!("map expects an array, found {}", vector)))?;
            items
                .iter()
                .map(|item| call_in(closure, alloc::vec![item.clone()], env))
                .collect::<Result<Vec<_>>>()
                .map(Value::Array)
        }
        _ => Err(Error::evaluation(format!(
            "Unknown function {} with {} arguments",
            function,
            args.len()
        ))),
    }
}

fn unary(op: UnaryOp, v: Value) -> Result<Value> {
    match op {
        UnaryOp::IsNull => Ok(Value::Boolean(v.is_null())),
        UnaryOp::WrapBool => Ok(Value::Boolean(v.as_bool() == Some(true))),
        _ if v.is_null() => Ok(Value::Null),
        UnaryOp::Not => v
            .as_bool()
            .map(|b| Value::Boolean(!b))
            .ok_or_else(|| Error::type_mismatch("BOOLEAN", format!("{}", v))),
        UnaryOp::Neg => match v {
            Value::Int16(x) => x.checked_neg().map(Value::Int16).ok_or_else(overflow),
            Value::Int32(x) => x.checked_neg().map(Value::Int32).ok_or_else(overflow),
            Value::Int64(x) => x.checked_neg().map(Value::Int64).ok_or_else(overflow),
            Value::Float64(x) => Ok(Value::Float64(-x)),
            other => Err(Error::type_mismatch("number", format!("{}", other))),
        },
    }
}

fn binary(op: BinaryOp, l: &Value, r: &Value, ty: &Type) -> Result<Value> {
    match op {
        BinaryOp::And => Ok(match (l.as_bool(), r.as_bool()) {
            (Some(false), _) | (_, Some(false)) => Value::Boolean(false),
            (Some(true), Some(true)) => Value::Boolean(true),
            _ => Value::Null,
        }),
        BinaryOp::Or => Ok(match (l.as_bool(), r.as_bool()) {
            (Some(true), _) | (_, Some(true)) => Value::Boolean(true),
            (Some(false), Some(false)) => Value::Boolean(false),
            _ => Value::Null,
        }),
        _ if l.is_null() || r.is_null() => Ok(match op {
            BinaryOp::Min | BinaryOp::Max if !(l.is_null() && r.is_null()) => {
                if l.is_null() {
                    r.clone()
                } else {
                    l.clone()
                }
            }
            _ => Value::Null,
        }),
        BinaryOp::Eq | BinaryOp::Neq | BinaryOp::Lt | BinaryOp::Lte | BinaryOp::Gt | BinaryOp::Gte => {
            let ordering = l.sql_cmp(r).unwrap_or_else(|| l.cmp(r));
            let result = match op {
                BinaryOp::Eq => ordering == Ordering::Equal,
                BinaryOp::Neq => ordering != Ordering::Equal,
                BinaryOp::Lt => ordering == Ordering::Less,
                BinaryOp::Lte => ordering != Ordering::Greater,
                BinaryOp::Gt => ordering == Ordering::Greater,
                _ => ordering != Ordering::Less,
            };
            Ok(Value::Boolean(result))
        }
        BinaryOp::Min | BinaryOp::Max => {
            let ordering = l.sql_cmp(r).unwrap_or_else(|| l.cmp(r));
            let keep_left = (op == BinaryOp::Min) == (ordering != Ordering::Greater);
            Ok(if keep_left { l.clone() } else { r.clone() })
        }
        BinaryOp::Add | BinaryOp::Sub | BinaryOp::Mul | BinaryOp::Div | BinaryOp::Mod | BinaryOp::MulWeight => {
            arithmetic(op, l, r, ty)
        }
    }
}

fn overflow() -> Error {
    Error::evaluation("Arithmetic overflow")
}

fn arithmetic(op: BinaryOp, l: &Value, r: &Value, ty: &Type) -> Result<Value> {
    let target = ty.data_type().or_else(|| l.data_type()).unwrap_or(DataType::Int64);
    let is_float = target == DataType::Float64 || matches!(l, Value::Float64(_)) || matches!(r, Value::Float64(_));
    if is_float {
        let (a, b) = match (l.as_f64(), r.as_f64()) {
            (Some(a), Some(b)) => (a, b),
            _ => return Err(Error::type_mismatch("number", format!("{} and {}", l, r))),
        };
        let result = match op {
            BinaryOp::Add => a + b,
            BinaryOp::Sub => a - b,
            BinaryOp::Mul | BinaryOp::MulWeight => a * b,
            BinaryOp::Div if b == 0.0 => return Err(Error::evaluation("Division by zero")),
            BinaryOp::Div => a / b,
            BinaryOp::Mod if b == 0.0 => return Err(Error::evaluation("Division by zero")),
            _ => a % b,
        };
        return cast_scalar(Value::Float64(result), target);
    }
    let (a, b) = match (l.as_ordinal(), r.as_ordinal()) {
        (Some(a), Some(b)) => (a, b),
        _ => return Err(Error::type_mismatch("number", format!("{} and {}", l, r))),
    };
    let result = match op {
        BinaryOp::Add => a.checked_add(b),
        BinaryOp::Sub => a.checked_sub(b),
        BinaryOp::Mul | BinaryOp::MulWeight => a.checked_mul(b),
        BinaryOp::Div if b == 0 => return Err(Error::evaluation("Division by zero")),
        BinaryOp::Div => a.checked_div(b),
        BinaryOp::Mod if b == 0 => return Err(Error::evaluation("Division by zero")),
        _ => a.checked_rem(b),
    };
    let wide = result.and_then(|v| i64::try_from(v).ok()).ok_or_else(overflow)?;
    Value::Int64(wide).cast(target).ok_or_else(overflow)
}

fn cast_scalar(value: Value, target: DataType) -> Result<Value> {
    if target == DataType::Null {
        return Ok(Value::Null);
    }
    value
        .cast(target)
        .ok_or_else(|| Error::evaluation(format!("Cannot cast {} to {}", value, target.name())))
}

/// Converts a value to `ty`, field by field for tuples and element by
/// element for vectors.
pub fn cast(value: Value, ty: &Type) -> Result<Value> {
    if value.is_null() {
        return Ok(Value::Null);
    }
    match ty {
        Type::Primitive { code, .. } => cast_scalar(value, *code),
        Type::Tuple { fields, .. } | Type::RawTuple { fields } => match value {
            Value::Tuple(items) if items.len() == fields.len() => items
                .into_iter()
                .zip(fields)
                .map(|(item, field)| cast(item, field))
                .collect::<Result<Vec<_>>>()
                .map(Value::Tuple),
            other => Ok(other),
        },
        Type::Vec { element, .. } => match value {
            Value::Array(items) => items
                .into_iter()
                .map(|item| cast(item, element))
                .collect::<Result<Vec<_>>>()
                .map(Value::Array),
            other => Ok(other),
        },
        _ => Ok(value),
    }
}

/// Compares two rows under a comparator expression.
pub fn compare(comparator: &Expr, a: &Value, b: &Value) -> Result<Ordering> {
    match comparator {
        Expr::NoComparator { .. } => Ok(Ordering::Equal),
        Expr::FieldComparator {
            source,
            field,
            ascending,
        } => {
            let earlier = compare(source, a, b)?;
            if earlier != Ordering::Equal {
                return Ok(earlier);
            }
            let (x, y) = match (a.field(*field), b.field(*field)) {
                (Some(x), Some(y)) => (x, y),
                _ => return Err(Error::evaluation(format!("Cannot compare field {} of {} and {}", field, a, b))),
            };
            let ordering = x.cmp(y);
            Ok(if *ascending { ordering } else { ordering.reverse() })
        }
        other => Err(Error::evaluation(format!("{} is not a comparator", other))),
    }
}

/// Sorts rows under a comparator; the sort is stable.
pub fn sort_values(rows: &mut [Value], comparator: &Expr) -> Result<()> {
    let mut failure = None;
    rows.sort_by(|a, b| match compare(comparator, a, b) {
        Ok(ordering) => ordering,
        Err(e) => {
            failure.get_or_insert(e);
            Ordering::Equal
        }
    });
    match failure {
        Some(e) => Err(e),
        None => Ok(()),
    }
}

/// Expands one row with a flatmap description.
pub fn flatmap(function: &Expr, row: &Value) -> Result<Vec<Value>> {
    let Expr::Flatmap {
        collection_field,
        output,
        index_type,
        ..
    } = function
    else {
        return Err(Error::evaluation(format!("{} is not a flatmap", function)));
    };
    let collection = row
        .field(*collection_field)
        .ok_or_else(|| Error::evaluation(format!("No field {} in {}", collection_field, row)))?;
    if collection.is_null() {
        return Ok(Vec::new());
    }
    let items = collection
        .as_array()
        .ok_or_else(|| Error::evaluation(format!("Cannot unnest {}", collection)))?;
    let index_code = index_type
        .as_ref()
        .and_then(|t| t.data_type())
        .unwrap_or(DataType::Int64);
    let mut rows = Vec::with_capacity(items.len());
    for (position, item) in items.iter().enumerate() {
        let mut fields = Vec::with_capacity(output.len());
        for field in output {
            let value = match field {
                FlatmapField::Input(i) => row
                    .field(*i)
                    .cloned()
                    .ok_or_else(|| Error::evaluation(format!("No field {} in {}", i, row)))?,
                FlatmapField::Element => item.clone(),
                FlatmapField::Index => Value::from_ordinal(index_code, position as i128).ok_or_else(overflow)?,
            };
            fields.push(value);
        }
        rows.push(Value::Tuple(fields));
    }
    Ok(rows)
}

/// Evaluates a Z-set literal.
pub fn zset_literal(expr: &Expr) -> Result<ZSet> {
    let Expr::ZSetLiteral { rows, .. } = expr else {
        return Err(Error::evaluation(format!("{} is not a Z-set literal", expr)));
    };
    let mut zset = ZSet::new();
    for (row, weight) in rows {
        zset.add(eval_constant(row)?, *weight);
    }
    Ok(zset)
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloc::sync::Arc;
    use alloc::vec;
    use zsql_ir::{ExprExt, Param};

    fn int(nullable: bool) -> zsql_ir::TypeRef {
        Type::primitive(DataType::Int32, nullable)
    }

    fn lit(v: i32) -> ExprRef {
        Expr::literal(Value::Int32(v), int(false))
    }

    fn null() -> ExprRef {
        Expr::none(&int(true))
    }

    fn boolean(v: Option<bool>) -> ExprRef {
        Expr::literal(Value::from(v), Type::boolean(true))
    }

    #[test]
    fn test_arithmetic_propagates_null() {
        let sum = Expr::binary(BinaryOp::Add, lit(1), null(), int(true));
        assert_eq!(eval_constant(&sum).unwrap(), Value::Null);
        let sum = Expr::binary(BinaryOp::Add, lit(1), lit(2), int(false));
        assert_eq!(eval_constant(&sum).unwrap(), Value::Int32(3));
    }

    #[test]
    fn test_division_by_zero_is_an_error() {
        let div = Expr::binary(BinaryOp::Div, lit(1), lit(0), int(false));
        assert!(matches!(eval_constant(&div), Err(Error::Evaluation { .. })));
    }

    #[test]
    fn test_overflow_is_an_error() {
        let big = Expr::literal(Value::Int32(i32::MAX), int(false));
        let sum = Expr::binary(BinaryOp::Add, big, lit(1), int(false));
        assert!(eval_constant(&sum).is_err());
    }

    #[test]
    fn test_three_valued_logic() {
        let and = |l, r| eval_constant(&Expr::binary(BinaryOp::And, boolean(l), boolean(r), Type::boolean(true)));
        let or = |l, r| eval_constant(&Expr::binary(BinaryOp::Or, boolean(l), boolean(r), Type::boolean(true)));
        assert_eq!(and(None, Some(false)).unwrap(), Value::Boolean(false));
        assert_eq!(and(None, Some(true)).unwrap(), Value::Null);
        assert_eq!(or(None, Some(true)).unwrap(), Value::Boolean(true));
        assert_eq!(or(None, Some(false)).unwrap(), Value::Null);
        assert_eq!(eval_constant(&boolean(None).wrap_bool()).unwrap(), Value::Boolean(false));
        assert_eq!(eval_constant(&boolean(None).not()).unwrap(), Value::Null);
    }

    #[test]
    fn test_comparison_with_null_is_null() {
        let eq = Expr::binary(BinaryOp::Eq, lit(1), null(), Type::boolean(true));
        assert_eq!(eval_constant(&eq).unwrap(), Value::Null);
        let lt = Expr::binary(BinaryOp::Lt, lit(1), lit(2), Type::boolean(false));
        assert_eq!(eval_constant(&lt).unwrap(), Value::Boolean(true));
    }

    #[test]
    fn test_closure_call_and_fields() {
        let row = Param::new("t", Type::tuple(vec![int(false), int(false)]));
        let swap = Expr::tuple(vec![row.var().field(1), row.var().field(0)]).closure(vec![row]);
        let out = call(&swap, vec![Value::tuple(vec![Value::Int32(1), Value::Int32(2)])]).unwrap();
        assert_eq!(out, Value::tuple(vec![Value::Int32(2), Value::Int32(1)]));
        assert!(call(&swap, vec![]).is_err());
    }

    #[test]
    fn test_weighted_push_and_map() {
        let vec_type = Type::vec(int(false));
        let a = Param::new("a", vec_type.clone());
        let push = Expr::apply(
            "weighted_push",
            vec![a.var(), lit(5), Expr::i64_literal(2)],
            vec_type.clone(),
        )
        .closure(vec![a]);
        let pushed = call(&push, vec![Value::Array(vec![])]).unwrap();
        assert_eq!(pushed, Value::Array(vec![Value::Int32(5), Value::Int32(5)]));

        let x = Param::new("x", int(false));
        let double = Expr::binary(BinaryOp::Mul, x.var(), lit(2), int(false)).closure(vec![x]);
        let v = Param::new("v", vec_type.clone());
        let map = Expr::apply("map", vec![v.var(), double], vec_type).closure(vec![v]);
        assert_eq!(
            call(&map, vec![pushed]).unwrap(),
            Value::Array(vec![Value::Int32(10), Value::Int32(10)])
        );
    }

    #[test]
    fn test_sort_with_field_comparator() {
        let element = Type::tuple(vec![int(false), int(false)]);
        let by_second_desc = Arc::new(Expr::FieldComparator {
            source: Expr::no_comparator(element.clone()),
            field: 1,
            ascending: false,
        });
        let sort = Expr::Sort {
            element,
            comparator: by_second_desc,
        };
        let row = |a, b| Value::tuple(vec![Value::Int32(a), Value::Int32(b)]);
        let pair = Value::tuple(vec![Value::unit(), Value::Array(vec![row(1, 1), row(2, 3), row(3, 2)])]);
        let sorted = apply_function(&sort, pair).unwrap();
        assert_eq!(sorted, Value::Array(vec![row(2, 3), row(3, 2), row(1, 1)]));
    }

    #[test]
    fn test_flatmap_with_index() {
        let function = Expr::Flatmap {
            input: Type::tuple(vec![int(false), Type::vec(int(false))]),
            collection_field: 1,
            output: vec![FlatmapField::Input(0), FlatmapField::Element, FlatmapField::Index],
            index_type: Some(int(false)),
        };
        let row = Value::tuple(vec![Value::Int32(7), Value::Array(vec![Value::Int32(8), Value::Int32(9)])]);
        let rows = flatmap(&function, &row).unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[1], Value::tuple(vec![Value::Int32(7), Value::Int32(9), Value::Int32(1)]));
        let empty = Value::tuple(vec![Value::Int32(7), Value::Null]);
        assert!(flatmap(&function, &empty).unwrap().is_empty());
    }

    #[test]
    fn test_cast_and_block() {
        let cast = lit(3).cast(&Type::int64(false));
        assert_eq!(eval_constant(&cast).unwrap(), Value::Int64(3));
        let block = Expr::block(
            vec![Statement::let_binding("x", lit(4))],
            Some(Expr::var("x", int(false))),
        );
        assert_eq!(eval_constant(&block).unwrap(), Value::Int32(4));
        assert!(eval_constant(&Expr::var("x", int(false))).is_err());
    }

    #[test]
    fn test_min_max_ignore_null() {
        let min = Expr::binary(BinaryOp::Min, lit(3), null(), int(true));
        assert_eq!(eval_constant(&min).unwrap(), Value::Int32(3));
        let max = Expr::binary(BinaryOp::Max, lit(3), lit(8), int(false));
        assert_eq!(eval_constant(&max).unwrap(), Value::Int32(8));
    }
}
