//! Operator rules
//!
//! Arithmetic promotes numeric operands to their shared kind
//! (`Int < Number < Float`) and broadcasts over collections: a collection
//! against a scalar applies to every element, two collections of the same
//! shape combine elementwise. Anything else is a type error naming the
//! operator and the offending kinds.
//!
//! An error operand always wins: the result is that same error.

use std::cmp::Ordering;

use finmod_core::{CellError, Decimal, Value, ValueKind};
use rust_decimal::prelude::*;
use rust_decimal::MathematicalOps;

use crate::ast::{BinaryOperator, UnaryOperator};

/// Apply a binary operator to evaluated operands
///
/// `and`/`or` are handled by the evaluator, which short-circuits them.
pub fn binary(op: BinaryOperator, lhs: &Value, rhs: &Value) -> Result<Value, CellError> {
    if let Value::Error(e) = lhs {
        return Err(e.clone());
    }
    if let Value::Error(e) = rhs {
        return Err(e.clone());
    }
    match op {
        BinaryOperator::Add
        | BinaryOperator::Subtract
        | BinaryOperator::Multiply
        | BinaryOperator::Divide
        | BinaryOperator::IntDivide
        | BinaryOperator::Modulo
        | BinaryOperator::Power => broadcast(op, lhs, rhs),
        BinaryOperator::Concat => concat(lhs, rhs),
        BinaryOperator::Dot => dot(lhs, rhs),
        BinaryOperator::Cross => cross(lhs, rhs),
        BinaryOperator::Union | BinaryOperator::Intersect | BinaryOperator::Except => {
            set_op(op, lhs, rhs)
        }
        BinaryOperator::Equal => Ok(Value::Boolean(values_equal(lhs, rhs))),
        BinaryOperator::NotEqual => Ok(Value::Boolean(!values_equal(lhs, rhs))),
        BinaryOperator::Less
        | BinaryOperator::LessEqual
        | BinaryOperator::Greater
        | BinaryOperator::GreaterEqual => {
            let ordering = compare(lhs, rhs)
                .ok_or_else(|| CellError::mismatch(op.symbol(), lhs.kind(), rhs.kind()))?;
            Ok(Value::Boolean(match op {
                BinaryOperator::Less => ordering == Ordering::Less,
                BinaryOperator::LessEqual => ordering != Ordering::Greater,
                BinaryOperator::Greater => ordering == Ordering::Greater,
                _ => ordering != Ordering::Less,
            }))
        }
        BinaryOperator::And | BinaryOperator::Or => {
            let l = truthy(op.symbol(), lhs)?;
            let r = truthy(op.symbol(), rhs)?;
            Ok(Value::Boolean(if op == BinaryOperator::And { l && r } else { l || r }))
        }
    }
}

/// Apply a unary operator
pub fn unary(op: UnaryOperator, operand: &Value) -> Result<Value, CellError> {
    if let Value::Error(e) = operand {
        return Err(e.clone());
    }
    match op {
        UnaryOperator::Not => Ok(Value::Boolean(!truthy("not", operand)?)),
        UnaryOperator::Plus | UnaryOperator::Negate => map_elements(operand, &|v| match v {
            Value::Empty(kind) => Ok(Value::Empty(*kind)),
            v if !v.kind().is_numeric() => Err(CellError::unsupported(op.symbol(), v.kind())),
            v if op == UnaryOperator::Plus => Ok(v.clone()),
            Value::Number(d) => Ok(Value::Number(-*d)),
            Value::Float(f) => Ok(Value::Float(-f)),
            Value::Int(i) => i.checked_neg().map(Value::Int).ok_or_else(overflow),
            v => Err(CellError::unsupported(op.symbol(), v.kind())),
        }),
    }
}

/// Booleans only; anything else is a type error
pub fn truthy(op: &str, value: &Value) -> Result<bool, CellError> {
    match value {
        Value::Boolean(b) => Ok(*b),
        Value::Error(e) => Err(e.clone()),
        other => Err(CellError::type_error(format!(
            "operator '{op}' needs a boolean, got {}",
            other.kind()
        ))),
    }
}

/// Apply `f` to every element of a List or Array, or to a scalar
pub fn map_elements(
    value: &Value,
    f: &dyn Fn(&Value) -> Result<Value, CellError>,
) -> Result<Value, CellError> {
    match value {
        Value::List(items) => Value::list(items.iter().map(f).collect::<Result<_, _>>()?),
        Value::Array { items, dims } => {
            Value::array(items.iter().map(f).collect::<Result<_, _>>()?, dims.clone())
        }
        Value::Record(fields) => Value::record(
            fields
                .iter()
                .map(|(k, v)| Ok((k.clone(), f(v)?)))
                .collect::<Result<_, CellError>>()?,
        ),
        scalar => f(scalar),
    }
}

fn overflow() -> CellError {
    CellError::value("numeric overflow")
}

fn shape_error(op: BinaryOperator, lhs: &Value, rhs: &Value) -> CellError {
    CellError::type_error(format!(
        "operator '{}' needs matching shapes, got {:?} and {:?}",
        op.symbol(),
        lhs.shape(),
        rhs.shape()
    ))
}

fn is_scalar(value: &Value) -> bool {
    !value.kind().is_collection()
}

/// Elementwise / broadcast arithmetic
fn broadcast(op: BinaryOperator, lhs: &Value, rhs: &Value) -> Result<Value, CellError> {
    let zip = |a: &[Value], b: &[Value]| -> Result<Vec<Value>, CellError> {
        a.iter().zip(b).map(|(x, y)| arithmetic(op, x, y)).collect()
    };
    match (lhs, rhs) {
        (Value::List(a), Value::List(b)) if a.len() == b.len() => Value::list(zip(a, b)?),
        (Value::Array { items: a, dims: da }, Value::Array { items: b, dims: db }) if da == db => {
            Value::array(zip(a, b)?, da.clone())
        }
        (collection, scalar) if is_scalar(scalar) && collection.kind().is_collection() => {
            map_elements(collection, &|x| arithmetic(op, x, scalar))
        }
        (scalar, collection) if is_scalar(scalar) && collection.kind().is_collection() => {
            map_elements(collection, &|y| arithmetic(op, scalar, y))
        }
        (l, r) if is_scalar(l) && is_scalar(r) => arithmetic(op, l, r),
        (l, r) => Err(shape_error(op, l, r)),
    }
}

/// Scalar arithmetic after promotion
pub fn arithmetic(op: BinaryOperator, lhs: &Value, rhs: &Value) -> Result<Value, CellError> {
    let symbol = op.symbol();
    match (lhs, rhs) {
        (Value::Error(e), _) | (_, Value::Error(e)) => return Err(e.clone()),
        (Value::Empty(a), Value::Empty(b)) => return Ok(Value::Empty(a.or(*b))),
        _ => {}
    }
    // An empty operand acts as the zero of the other side's kind
    let (lhs, rhs) = match (lhs, rhs) {
        (Value::Empty(_), r) => (Value::zero(r.kind()).ok_or_else(|| CellError::unsupported(symbol, r.kind()))?, r.clone()),
        (l, Value::Empty(_)) => (l.clone(), Value::zero(l.kind()).ok_or_else(|| CellError::unsupported(symbol, l.kind()))?),
        (l, r) => (l.clone(), r.clone()),
    };
    let kind = lhs
        .kind()
        .promote(rhs.kind())
        .filter(|k| k.is_numeric())
        .ok_or_else(|| CellError::mismatch(symbol, lhs.kind(), rhs.kind()))?;
    let (l, r) = match (lhs.promote(kind), rhs.promote(kind)) {
        (Some(l), Some(r)) => (l, r),
        _ => return Err(CellError::mismatch(symbol, lhs.kind(), rhs.kind())),
    };
    match (l, r) {
        (Value::Int(a), Value::Int(b)) => int_arithmetic(op, a, b),
        (Value::Number(a), Value::Number(b)) => decimal_arithmetic(op, a, b),
        (Value::Float(a), Value::Float(b)) => float_arithmetic(op, a, b),
        (l, r) => Err(CellError::mismatch(symbol, l.kind(), r.kind())),
    }
}

fn int_arithmetic(op: BinaryOperator, a: i64, b: i64) -> Result<Value, CellError> {
    let zero_check = || if b == 0 { Err(CellError::divide_by_zero()) } else { Ok(()) };
    match op {
        BinaryOperator::Add => a.checked_add(b).map(Value::Int).ok_or_else(overflow),
        BinaryOperator::Subtract => a.checked_sub(b).map(Value::Int).ok_or_else(overflow),
        BinaryOperator::Multiply => a.checked_mul(b).map(Value::Int).ok_or_else(overflow),
        // Int / Int is exact, so it leaves the integers
        BinaryOperator::Divide => decimal_arithmetic(op, Decimal::from(a), Decimal::from(b)),
        BinaryOperator::IntDivide => {
            zero_check()?;
            let q = a.checked_div(b).ok_or_else(overflow)?;
            let floored = if a % b != 0 && ((a < 0) != (b < 0)) { q - 1 } else { q };
            Ok(Value::Int(floored))
        }
        BinaryOperator::Modulo => {
            zero_check()?;
            let m = a.checked_rem(b).ok_or_else(overflow)?;
            Ok(Value::Int(if m != 0 && ((m < 0) != (b < 0)) { m + b } else { m }))
        }
        BinaryOperator::Power => match u32::try_from(b) {
            Ok(exp) => a.checked_pow(exp).map(Value::Int).ok_or_else(overflow),
            Err(_) => decimal_arithmetic(op, Decimal::from(a), Decimal::from(b)),
        },
        other => Err(CellError::unsupported(other.symbol(), ValueKind::Int)),
    }
}

fn decimal_arithmetic(op: BinaryOperator, a: Decimal, b: Decimal) -> Result<Value, CellError> {
    let zero_check = || if b.is_zero() { Err(CellError::divide_by_zero()) } else { Ok(()) };
    let number = |d: Option<Decimal>| d.map(|d| Value::Number(d.normalize())).ok_or_else(overflow);
    match op {
        BinaryOperator::Add => number(a.checked_add(b)),
        BinaryOperator::Subtract => number(a.checked_sub(b)),
        BinaryOperator::Multiply => number(a.checked_mul(b)),
        BinaryOperator::Divide => {
            zero_check()?;
            number(a.checked_div(b))
        }
        BinaryOperator::IntDivide => {
            zero_check()?;
            a.checked_div(b)
                .and_then(|q| q.floor().to_i64())
                .map(Value::Int)
                .ok_or_else(overflow)
        }
        BinaryOperator::Modulo => {
            zero_check()?;
            let m = a.checked_rem(b).ok_or_else(overflow)?;
            number(Some(if !m.is_zero() && (m.is_sign_negative() != b.is_sign_negative()) { m + b } else { m }))
        }
        BinaryOperator::Power => {
            if a.is_zero() && b.is_sign_negative() {
                return Err(CellError::divide_by_zero());
            }
            match b.fract().is_zero().then(|| b.to_i64()).flatten() {
                Some(exp) => number(a.checked_powi(exp)),
                None => number(a.checked_powd(b)),
            }
        }
        other => Err(CellError::unsupported(other.symbol(), ValueKind::Number)),
    }
}

fn float_arithmetic(op: BinaryOperator, a: f64, b: f64) -> Result<Value, CellError> {
    let divides = matches!(
        op,
        BinaryOperator::Divide | BinaryOperator::IntDivide | BinaryOperator::Modulo
    );
    if divides && b == 0.0 {
        return Err(CellError::divide_by_zero());
    }
    let result = match op {
        BinaryOperator::Add => a + b,
        BinaryOperator::Subtract => a - b,
        BinaryOperator::Multiply => a * b,
        BinaryOperator::Divide => a / b,
        BinaryOperator::IntDivide => {
            let q = (a / b).floor();
            return if q.is_finite() && q.abs() < i64::MAX as f64 {
                Ok(Value::Int(q as i64))
            } else {
                Err(overflow())
            };
        }
        BinaryOperator::Modulo => a - b * (a / b).floor(),
        BinaryOperator::Power => a.powf(b),
        other => return Err(CellError::unsupported(other.symbol(), ValueKind::Float)),
    };
    if result.is_finite() {
        Ok(Value::Float(result))
    } else {
        Err(overflow())
    }
}

/// Equality across numeric kinds by value, structural otherwise
pub fn values_equal(lhs: &Value, rhs: &Value) -> bool {
    if lhs.kind().is_numeric() && rhs.kind().is_numeric() {
        return compare(lhs, rhs) == Some(Ordering::Equal);
    }
    match (lhs, rhs) {
        (Value::List(a), Value::List(b)) => {
            a.len() == b.len() && a.iter().zip(b).all(|(x, y)| values_equal(x, y))
        }
        (Value::Array { items: a, dims: da }, Value::Array { items: b, dims: db }) => {
            da == db && a.iter().zip(b).all(|(x, y)| values_equal(x, y))
        }
        (Value::Record(a), Value::Record(b)) => {
            a.len() == b.len()
                && a.iter().zip(b).all(|((ka, va), (kb, vb))| ka == kb && values_equal(va, vb))
        }
        (Value::Empty(_), Value::Empty(_)) => true,
        (l, r) => l == r,
    }
}

/// Ordering for numerics (after promotion) and strings
pub fn compare(lhs: &Value, rhs: &Value) -> Option<Ordering> {
    match (lhs, rhs) {
        (Value::String(a), Value::String(b)) => Some(a.cmp(b)),
        (Value::Boolean(a), Value::Boolean(b)) => Some(a.cmp(b)),
        (l, r) if l.kind().is_numeric() && r.kind().is_numeric() => {
            if l.kind() == ValueKind::Float || r.kind() == ValueKind::Float {
                l.as_f64()?.partial_cmp(&r.as_f64()?)
            } else {
                Some(l.as_decimal()?.cmp(&r.as_decimal()?))
            }
        }
        _ => None,
    }
}

/// `++`
fn concat(lhs: &Value, rhs: &Value) -> Result<Value, CellError> {
    match (lhs, rhs) {
        (Value::Empty(_), other) | (other, Value::Empty(_)) => Ok(other.clone()),
        (Value::String(a), Value::String(b)) => Ok(Value::String(format!("{a}{b}"))),
        (Value::List(a), Value::List(b)) => Value::list(a.iter().chain(b).cloned().collect()),
        (Value::List(a), b) if is_scalar(b) => Value::list(a.iter().chain([b]).cloned().collect()),
        (a, Value::List(b)) if is_scalar(a) => {
            Value::list(std::iter::once(a).chain(b).cloned().collect())
        }
        (Value::Array { items: a, dims: da }, Value::Array { items: b, dims: db }) => {
            if da.is_empty() || da.len() != db.len() || da[1..] != db[1..] {
                return Err(shape_error(BinaryOperator::Concat, lhs, rhs));
            }
            let mut dims = da.clone();
            dims[0] += db[0];
            Value::array(a.iter().chain(b).cloned().collect(), dims)
        }
        (Value::Record(a), Value::Record(b)) => Value::record(a.iter().chain(b).cloned().collect()),
        (l, r) => Err(CellError::mismatch("++", l.kind(), r.kind())),
    }
}

fn sum_of_products(a: &[Value], b: &[Value]) -> Result<Value, CellError> {
    let mut total: Option<Value> = None;
    for (x, y) in a.iter().zip(b) {
        let product = arithmetic(BinaryOperator::Multiply, x, y)?;
        total = Some(match total {
            None => product,
            Some(t) => arithmetic(BinaryOperator::Add, &t, &product)?,
        });
    }
    Ok(total.unwrap_or(Value::Int(0)))
}

/// Rows of a 2-D array as slices
fn matrix(value: &Value) -> Option<(&[Value], usize, usize)> {
    match value {
        Value::Array { items, dims } if dims.len() == 2 => {
            Some((items, dims[0] as usize, dims[1] as usize))
        }
        _ => None,
    }
}

/// `dot`: vector·vector, matrix·matrix, matrix·vector, vector·matrix
fn dot(lhs: &Value, rhs: &Value) -> Result<Value, CellError> {
    let mismatch = || shape_error(BinaryOperator::Dot, lhs, rhs);
    match (lhs, rhs, matrix(lhs), matrix(rhs)) {
        (Value::List(a), Value::List(b), _, _) => {
            if a.len() != b.len() {
                return Err(mismatch());
            }
            sum_of_products(a, b)
        }
        (_, _, Some((a, n, k)), Some((b, k2, m))) => {
            if k != k2 {
                return Err(mismatch());
            }
            let mut items = Vec::with_capacity(n * m);
            for i in 0..n {
                let row = &a[i * k..(i + 1) * k];
                for j in 0..m {
                    let col: Vec<Value> = (0..k).map(|t| b[t * m + j].clone()).collect();
                    items.push(sum_of_products(row, &col)?);
                }
            }
            Value::array(items, vec![n as u32, m as u32])
        }
        (_, Value::List(v), Some((a, n, k)), None) => {
            if v.len() != k {
                return Err(mismatch());
            }
            let items = (0..n)
                .map(|i| sum_of_products(&a[i * k..(i + 1) * k], v))
                .collect::<Result<_, _>>()?;
            Value::list(items)
        }
        (Value::List(v), _, None, Some((b, k, m))) => {
            if v.len() != k {
                return Err(mismatch());
            }
            let items = (0..m)
                .map(|j| {
                    let col: Vec<Value> = (0..k).map(|t| b[t * m + j].clone()).collect();
                    sum_of_products(v, &col)
                })
                .collect::<Result<_, _>>()?;
            Value::list(items)
        }
        _ => Err(mismatch()),
    }
}

/// `cross`: 3-element vectors only
fn cross(lhs: &Value, rhs: &Value) -> Result<Value, CellError> {
    let (Value::List(a), Value::List(b)) = (lhs, rhs) else {
        return Err(shape_error(BinaryOperator::Cross, lhs, rhs));
    };
    if a.len() != 3 || b.len() != 3 {
        return Err(shape_error(BinaryOperator::Cross, lhs, rhs));
    }
    let term = |i: usize, j: usize| -> Result<Value, CellError> {
        let p = arithmetic(BinaryOperator::Multiply, &a[i], &b[j])?;
        let q = arithmetic(BinaryOperator::Multiply, &a[j], &b[i])?;
        arithmetic(BinaryOperator::Subtract, &p, &q)
    };
    Value::list(vec![term(1, 2)?, term(2, 0)?, term(0, 1)?])
}

fn as_multiset<'a>(op: BinaryOperator, value: &'a Value, other: &Value) -> Result<&'a [Value], CellError> {
    match value {
        Value::List(items) => Ok(items),
        Value::Empty(_) => Ok(&[]),
        _ => Err(CellError::mismatch(op.symbol(), value.kind(), other.kind())),
    }
}

/// Multiset `union` / `intersect` / `except`, keeping left-operand order
fn set_op(op: BinaryOperator, lhs: &Value, rhs: &Value) -> Result<Value, CellError> {
    let a = as_multiset(op, lhs, rhs)?;
    let b = as_multiset(op, rhs, lhs)?;
    let mut remaining: Vec<&Value> = b.iter().collect();
    let mut take = |x: &Value| match remaining.iter().position(|y| values_equal(x, y)) {
        Some(i) => {
            remaining.remove(i);
            true
        }
        None => false,
    };
    let items: Vec<Value> = match op {
        BinaryOperator::Union => {
            let mut items = a.to_vec();
            for x in a {
                take(x);
            }
            items.extend(remaining.into_iter().cloned());
            items
        }
        BinaryOperator::Intersect => a.iter().filter(|&x| take(x)).cloned().collect(),
        _ => a.iter().filter(|&x| !take(x)).cloned().collect(),
    };
    Value::list(items)
}
