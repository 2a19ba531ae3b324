use std::cmp::Ordering;

use vellum_ast::{BinaryOp, Expr, Literal, UnaryOp};
use vellum_error::{Result, VellumError};
use vellum_types::{Document, Value};

use crate::env::Environment;
use crate::functions;

/// Evaluate an expression against an environment.
pub fn eval(expr: &Expr, env: &Environment) -> Result<Value> {
    match expr {
        Expr::Literal(lit) => Ok(literal_value(lit)),
        Expr::Path(path) => Ok(env
            .document()
            .and_then(|doc| doc.get_path(path))
            .cloned()
            .unwrap_or(Value::Null)),
        Expr::Wildcard => Err(VellumError::internal(
            "wildcard is only valid in a projection",
        )),
        Expr::Positional(n) => env.positional(*n).cloned().ok_or_else(|| {
            VellumError::type_error(format!("no value bound for parameter ?{n}"))
        }),
        Expr::Named(name) => env.named(name).cloned().ok_or_else(|| {
            VellumError::type_error(format!("no value bound for parameter ${name}"))
        }),
        Expr::Array(items) => {
            let mut values = Vec::with_capacity(items.len());
            for item in items {
                values.push(eval(item, env)?);
            }
            Ok(Value::Array(values))
        }
        Expr::DocumentLiteral(fields) => {
            let mut doc = Document::new();
            for (name, value_expr) in fields {
                doc.push(name.clone(), eval(value_expr, env)?);
            }
            Ok(Value::Document(doc))
        }
        Expr::Unary { op, operand } => eval_unary(*op, operand, env),
        Expr::Binary { lhs, op, rhs } => eval_binary(lhs, *op, rhs, env),
        Expr::Call { name, args } => {
            let mut values = Vec::with_capacity(args.len());
            for arg in args {
                values.push(eval(arg, env)?);
            }
            functions::call(name, &values, env)
        }
    }
}

fn literal_value(lit: &Literal) -> Value {
    match lit {
        Literal::Null => Value::Null,
        Literal::Bool(b) => Value::Bool(*b),
        Literal::Int(i) => Value::Int(*i),
        Literal::Float(f) => Value::Float(*f),
        Literal::Text(s) => Value::Text(s.clone()),
    }
}

fn eval_unary(op: UnaryOp, operand: &Expr, env: &Environment) -> Result<Value> {
    let value = eval(operand, env)?;
    match op {
        UnaryOp::Neg => match value {
            Value::Null => Ok(Value::Null),
            Value::Int(i) => i
                .checked_neg()
                .map(Value::Int)
                .ok_or(VellumError::IntegerOverflow),
            Value::Float(f) => Ok(Value::Float(-f)),
            other => Err(VellumError::type_error(format!(
                "cannot negate a {} value",
                other.type_name()
            ))),
        },
        UnaryOp::Not => match value {
            Value::Null => Ok(Value::Null),
            other => Ok(Value::Bool(!other.is_truthy())),
        },
    }
}

fn eval_binary(lhs: &Expr, op: BinaryOp, rhs: &Expr, env: &Environment) -> Result<Value> {
    let a = eval(lhs, env)?;
    let b = eval(rhs, env)?;
    match op {
        BinaryOp::And => Ok(kleene_and(&a, &b)),
        BinaryOp::Or => Ok(kleene_or(&a, &b)),
        BinaryOp::Add | BinaryOp::Sub | BinaryOp::Mul | BinaryOp::Div | BinaryOp::Mod => {
            eval_arithmetic(op, a, b)
        }
        BinaryOp::Eq | BinaryOp::Neq | BinaryOp::Lt | BinaryOp::Le | BinaryOp::Gt | BinaryOp::Ge => {
            eval_comparison(op, &a, &b)
        }
        BinaryOp::In => eval_in(&a, &b),
    }
}

/// Tri-valued truth of a value: `None` for Null.
fn truth(v: &Value) -> Option<bool> {
    match v {
        Value::Null => None,
        other => Some(other.is_truthy()),
    }
}

fn kleene_and(a: &Value, b: &Value) -> Value {
    match (truth(a), truth(b)) {
        (Some(false), _) | (_, Some(false)) => Value::Bool(false),
        (Some(true), Some(true)) => Value::Bool(true),
        _ => Value::Null,
    }
}

fn kleene_or(a: &Value, b: &Value) -> Value {
    match (truth(a), truth(b)) {
        (Some(true), _) | (_, Some(true)) => Value::Bool(true),
        (Some(false), Some(false)) => Value::Bool(false),
        _ => Value::Null,
    }
}

fn eval_arithmetic(op: BinaryOp, a: Value, b: Value) -> Result<Value> {
    // Modulo is an integer operation: float operands are truncated first,
    // so `x % 0.5` divides by zero.
    if op == BinaryOp::Mod && !a.is_null() && !b.is_null() {
        let x = int_operand(&a)?;
        let y = int_operand(&b)?;
        if y == 0 {
            return Err(VellumError::DivideByZero);
        }
        return x
            .checked_rem(y)
            .map(Value::Int)
            .ok_or(VellumError::IntegerOverflow);
    }
    match (&a, &b) {
        (Value::Null, _) | (_, Value::Null) => Ok(Value::Null),
        (Value::Int(x), Value::Int(y)) => int_arithmetic(op, *x, *y),
        (Value::Int(_) | Value::Float(_), Value::Int(_) | Value::Float(_)) => {
            float_arithmetic(op, num_as_f64(&a), num_as_f64(&b))
        }
        _ => Err(VellumError::type_error(format!(
            "cannot apply {} to {} and {}",
            op.symbol(),
            a.type_name(),
            b.type_name()
        ))),
    }
}

fn num_as_f64(v: &Value) -> f64 {
    match v {
        Value::Int(i) => *i as f64,
        Value::Float(f) => *f,
        _ => unreachable!("numeric operand expected"),
    }
}

fn int_operand(v: &Value) -> Result<i64> {
    match v {
        Value::Int(i) => Ok(*i),
        Value::Float(f) => Ok(*f as i64),
        other => Err(VellumError::type_error(format!(
            "cannot apply % to a {} value",
            other.type_name()
        ))),
    }
}

fn int_arithmetic(op: BinaryOp, x: i64, y: i64) -> Result<Value> {
    let result = match op {
        BinaryOp::Add => x.checked_add(y),
        BinaryOp::Sub => x.checked_sub(y),
        BinaryOp::Mul => x.checked_mul(y),
        BinaryOp::Div => {
            if y == 0 {
                return Err(VellumError::DivideByZero);
            }
            x.checked_div(y)
        }
        BinaryOp::Mod => {
            if y == 0 {
                return Err(VellumError::DivideByZero);
            }
            x.checked_rem(y)
        }
        _ => unreachable!("arithmetic operator expected"),
    };
    result.map(Value::Int).ok_or(VellumError::IntegerOverflow)
}

fn float_arithmetic(op: BinaryOp, x: f64, y: f64) -> Result<Value> {
    let result = match op {
        BinaryOp::Add => x + y,
        BinaryOp::Sub => x - y,
        BinaryOp::Mul => x * y,
        BinaryOp::Div => {
            if y == 0.0 {
                return Err(VellumError::DivideByZero);
            }
            x / y
        }
        BinaryOp::Mod => {
            if y == 0.0 {
                return Err(VellumError::DivideByZero);
            }
            x % y
        }
        _ => unreachable!("arithmetic operator expected"),
    };
    Ok(Value::Float(result))
}

fn eval_comparison(op: BinaryOp, a: &Value, b: &Value) -> Result<Value> {
    if a.is_null() || b.is_null() {
        return Ok(Value::Null);
    }
    let ordering = a.order_cmp(b);
    let result = match op {
        BinaryOp::Eq => ordering == Ordering::Equal,
        BinaryOp::Neq => ordering != Ordering::Equal,
        BinaryOp::Lt => ordering == Ordering::Less,
        BinaryOp::Le => ordering != Ordering::Greater,
        BinaryOp::Gt => ordering == Ordering::Greater,
        BinaryOp::Ge => ordering != Ordering::Less,
        _ => unreachable!("comparison operator expected"),
    };
    Ok(Value::Bool(result))
}

/// `a IN array`: true on a match, Null if no match but the array contains
/// Null (the match is unknowable), false otherwise.
fn eval_in(a: &Value, b: &Value) -> Result<Value> {
    if a.is_null() || b.is_null() {
        return Ok(Value::Null);
    }
    let Value::Array(items) = b else {
        return Err(VellumError::type_error(format!(
            "IN requires an array, found {}",
            b.type_name()
        )));
    };
    let mut saw_null = false;
    for item in items {
        if item.is_null() {
            saw_null = true;
        } else if a.order_eq(item) {
            return Ok(Value::Bool(true));
        }
    }
    if saw_null {
        Ok(Value::Null)
    } else {
        Ok(Value::Bool(false))
    }
}
