//! Textual rendering of IR types, expressions and statements.

use crate::expr::{Expr, FlatmapField, UnaryOp};
use crate::statement::{Function, Item, Statement};
use crate::types::Type;
use core::fmt;

fn list<T: fmt::Display>(f: &mut fmt::Formatter<'_>, items: &[T]) -> fmt::Result {
    for (i, item) in items.iter().enumerate() {
        if i > 0 {
            f.write_str(", ")?;
        }
        write!(f, "{}", item)?;
    }
    Ok(())
}

fn null_suffix(f: &mut fmt::Formatter<'_>, nullable: bool) -> fmt::Result {
    if nullable {
        f.write_str("?")
    } else {
        Ok(())
    }
}

impl fmt::Display for Type {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Type::Primitive { code, nullable } => {
                write!(f, "{}", code.name())?;
                null_suffix(f, *nullable)
            }
            Type::Tuple { fields, nullable } => {
                write!(f, "Tup{}<", fields.len())?;
                list(f, fields)?;
                f.write_str(">")?;
                null_suffix(f, *nullable)
            }
            Type::RawTuple { fields } => {
                f.write_str("(")?;
                list(f, fields)?;
                f.write_str(")")
            }
            Type::Vec { element, nullable } => {
                write!(f, "Vec<{}>", element)?;
                null_suffix(f, *nullable)
            }
            Type::ZSet { element } => write!(f, "ZSet<{}>", element),
            Type::IndexedZSet { key, value } => write!(f, "IndexedZSet<{}, {}>", key, value),
            Type::Struct { name, nullable, .. } => {
                f.write_str(name)?;
                null_suffix(f, *nullable)
            }
            Type::User {
                name,
                args,
                nullable,
            } => {
                f.write_str(name)?;
                if !args.is_empty() {
                    f.write_str("<")?;
                    list(f, args)?;
                    f.write_str(">")?;
                }
                null_suffix(f, *nullable)
            }
            Type::Function { result, params } => {
                f.write_str("|")?;
                list(f, params)?;
                write!(f, "| -> {}", result)
            }
            Type::Void => f.write_str("()"),
            Type::Any => f.write_str("_"),
        }
    }
}

impl fmt::Display for Expr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Expr::Literal { value, ty } => {
                if value.is_null() {
                    write!(f, "None::<{}>", ty)
                } else if let zsql_core::Value::String(s) = value {
                    write!(f, "{:?}", s)
                } else {
                    write!(f, "{}", value)
                }
            }
            Expr::Var { name, .. } => f.write_str(name),
            Expr::Field { base, index } => write!(f, "{}.{}", base, index),
            Expr::Tuple { fields } => {
                write!(f, "Tup{}::new(", fields.len())?;
                list(f, fields)?;
                f.write_str(")")
            }
            Expr::RawTuple { fields } => {
                f.write_str("(")?;
                list(f, fields)?;
                if fields.len() == 1 {
                    f.write_str(",")?;
                }
                f.write_str(")")
            }
            Expr::Closure { params, body } => {
                f.write_str("move |")?;
                for (i, p) in params.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{}: {}", p.name, p.ty)?;
                }
                write!(f, "| {}", body)
            }
            Expr::Binary {
                op, left, right, ..
            } => match op {
                crate::expr::BinaryOp::Min | crate::expr::BinaryOp::Max => {
                    write!(f, "{}({}, {})", op.symbol(), left, right)
                }
                _ => write!(f, "({} {} {})", left, op.symbol(), right),
            },
            Expr::Unary { op, operand, .. } => match op {
                UnaryOp::Not => write!(f, "!{}", operand),
                UnaryOp::Neg => write!(f, "-{}", operand),
                UnaryOp::IsNull => write!(f, "{}.is_none()", operand),
                UnaryOp::WrapBool => write!(f, "wrap_bool({})", operand),
            },
            Expr::Cast { source, ty } => write!(f, "({} as {})", source, ty),
            Expr::If {
                condition,
                positive,
                negative,
                ..
            } => write!(
                f,
                "if {} {{ {} }} else {{ {} }}",
                condition, positive, negative
            ),
            Expr::Apply { function, args, .. } => {
                write!(f, "{}(", function)?;
                list(f, args)?;
                f.write_str(")")
            }
            Expr::Block { statements, result } => {
                f.write_str("{ ")?;
                for s in statements {
                    write!(f, "{} ", s)?;
                }
                if let Some(r) = result {
                    write!(f, "{} ", r)?;
                }
                f.write_str("}")
            }
            Expr::NoComparator { element } => write!(f, "NoCmp<{}>", element),
            Expr::FieldComparator {
                source,
                field,
                ascending,
            } => write!(
                f,
                "{}.then({}, {})",
                source,
                field,
                if *ascending { "asc" } else { "desc" }
            ),
            Expr::Sort { comparator, .. } => write!(f, "sort({})", comparator),
            Expr::Flatmap {
                collection_field,
                output,
                ..
            } => {
                write!(f, "flatmap(.{} -> [", collection_field)?;
                for (i, o) in output.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    match o {
                        FlatmapField::Input(j) => write!(f, ".{}", j)?,
                        FlatmapField::Element => f.write_str("elem")?,
                        FlatmapField::Index => f.write_str("index")?,
                    }
                }
                f.write_str("])")
            }
            Expr::ZSetLiteral { rows, .. } => {
                f.write_str("zset!(")?;
                for (i, (row, weight)) in rows.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{} => {}", row, weight)?;
                }
                f.write_str(")")
            }
        }
    }
}

impl fmt::Display for Statement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Statement::Let { name, ty, init } => write!(f, "let {}: {} = {};", name, ty, init),
            Statement::Expr(e) => write!(f, "{};", e),
            Statement::Comment(c) => write!(f, "// {}", c),
        }
    }
}

impl fmt::Display for Function {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "fn {}(", self.name)?;
        for (i, p) in self.params.iter().enumerate() {
            if i > 0 {
                f.write_str(", ")?;
            }
            write!(f, "{}: {}", p.name, p.ty)?;
        }
        write!(f, ") -> {}", self.result)?;
        match &self.body {
            Some(body) => write!(f, " {{ {} }}", body),
            None => f.write_str(";"),
        }
    }
}

impl fmt::Display for Item {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Item::Struct(ty) => match &**ty {
                Type::Struct { name, fields, .. } => {
                    write!(f, "struct {} {{ ", name)?;
                    for field in fields {
                        write!(f, "{}: {}, ", field.name, field.ty)?;
                    }
                    f.write_str("}")
                }
                other => write!(f, "type {}", other),
            },
            Item::Function(func) => write!(f, "{}", func),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::expr::{BinaryOp, ExprExt, Param};
    use alloc::string::ToString;
    use alloc::vec;
    use zsql_core::DataType;

    #[test]
    fn test_type_display() {
        let t = Type::tuple(vec![
            Type::primitive(DataType::Int32, false),
            Type::primitive(DataType::String, true),
        ]);
        assert_eq!(t.to_string(), "Tup2<i32, string?>");
        let ix = Type::indexed_zset(Type::unit(), Type::vec(t));
        assert_eq!(ix.to_string(), "IndexedZSet<(), Vec<Tup2<i32, string?>>>");
    }

    #[test]
    fn test_closure_display() {
        let row = Type::tuple(vec![Type::int64(false), Type::int64(false)]);
        let t = Param::new("t", row);
        let sum = Expr::binary(BinaryOp::Add, t.var().field(0), t.var().field(1), Type::int64(false));
        let c = Expr::tuple(vec![sum]).closure(vec![t]);
        assert_eq!(c.to_string(), "move |t: Tup2<i64, i64>| Tup1::new((t.0 + t.1))");
    }

    #[test]
    fn test_null_literal_display() {
        let n = Expr::none(&Type::int64(false));
        assert_eq!(n.to_string(), "None::<i64?>");
    }
}
