//! Math functions

use finmod_core::{CellError, Decimal, Value, ValueKind};
use rust_decimal::{MathematicalOps, RoundingStrategy};

use super::elements;
use crate::ast::BinaryOperator;
use crate::ops::{arithmetic, compare, map_elements};

fn fold(args: &[Value], op: BinaryOperator, identity: Value) -> Result<Value, CellError> {
    let mut acc: Option<Value> = None;
    for item in elements(args)? {
        if !item.kind().is_numeric() {
            return Err(CellError::unsupported(op.symbol(), item.kind()));
        }
        acc = Some(match acc {
            None => item.clone(),
            Some(total) => arithmetic(op, &total, item)?,
        });
    }
    Ok(acc.unwrap_or(identity))
}

/// SUM: total of every numeric element; Number(0) when there are none
pub fn fn_sum(args: &[Value]) -> Result<Value, CellError> {
    fold(args, BinaryOperator::Add, Value::Number(Decimal::ZERO))
}

/// PRODUCT: Number(1) when there are no elements
pub fn fn_product(args: &[Value]) -> Result<Value, CellError> {
    fold(args, BinaryOperator::Multiply, Value::Number(Decimal::ONE))
}

fn extreme(args: &[Value], name: &str, keep: std::cmp::Ordering) -> Result<Value, CellError> {
    let mut best: Option<&Value> = None;
    for item in elements(args)? {
        best = Some(match best {
            None => item,
            Some(current) => {
                let ordering = compare(item, current).ok_or_else(|| {
                    CellError::type_error(format!(
                        "{name} cannot compare {} and {}",
                        item.kind(),
                        current.kind()
                    ))
                })?;
                if ordering == keep {
                    item
                } else {
                    current
                }
            }
        });
    }
    Ok(best.cloned().unwrap_or(Value::Empty(None)))
}

/// MIN over numbers or strings
pub fn fn_min(args: &[Value]) -> Result<Value, CellError> {
    extreme(args, "min", std::cmp::Ordering::Less)
}

/// MAX over numbers or strings
pub fn fn_max(args: &[Value]) -> Result<Value, CellError> {
    extreme(args, "max", std::cmp::Ordering::Greater)
}

/// COUNT: non-empty elements
pub fn fn_count(args: &[Value]) -> Result<Value, CellError> {
    Ok(Value::Int(elements(args)?.len() as i64))
}

/// AVG: SUM / COUNT
pub fn fn_avg(args: &[Value]) -> Result<Value, CellError> {
    let count = elements(args)?.len() as i64;
    if count == 0 {
        return Err(CellError::divide_by_zero());
    }
    let total = fn_sum(args)?;
    arithmetic(BinaryOperator::Divide, &total, &Value::Int(count))
}

fn numeric<'a>(name: &str, value: &'a Value) -> Result<&'a Value, CellError> {
    if value.kind().is_numeric() || value.is_empty() {
        Ok(value)
    } else {
        Err(CellError::type_error(format!("{name} needs a number, got {}", value.kind())))
    }
}

/// ABS, elementwise over collections
pub fn fn_abs(args: &[Value]) -> Result<Value, CellError> {
    map_elements(&args[0], &|v| {
        Ok(match numeric("abs", v)? {
            Value::Number(d) => Value::Number(d.abs()),
            Value::Float(f) => Value::Float(f.abs()),
            Value::Int(i) => Value::Int(i.checked_abs().ok_or_else(|| CellError::value("numeric overflow"))?),
            other => other.clone(),
        })
    })
}

/// ROUND(x, digits = 0), halves away from zero
pub fn fn_round(args: &[Value]) -> Result<Value, CellError> {
    let digits = match args.get(1) {
        Some(d) => d
            .as_index()
            .and_then(|d| u32::try_from(d).ok())
            .ok_or_else(|| CellError::type_error("round digits must be a non-negative integer"))?,
        None => 0,
    };
    map_elements(&args[0], &|v| {
        Ok(match numeric("round", v)? {
            Value::Number(d) => {
                Value::Number(d.round_dp_with_strategy(digits, RoundingStrategy::MidpointAwayFromZero))
            }
            Value::Float(f) => {
                let scale = 10f64.powi(i32::try_from(digits).unwrap_or(i32::MAX));
                let scaled = f * scale;
                // beyond f64 range every digit is already kept
                Value::Float(if scaled.is_finite() { scaled.round() / scale } else { *f })
            }
            other => other.clone(),
        })
    })
}

/// SQRT; Int arguments produce a Number
pub fn fn_sqrt(args: &[Value]) -> Result<Value, CellError> {
    map_elements(&args[0], &|v| {
        let negative = || CellError::value("square root of a negative number");
        match numeric("sqrt", v)? {
            Value::Float(f) if *f < 0.0 => Err(negative()),
            Value::Float(f) => Ok(Value::Float(f.sqrt())),
            Value::Empty(kind) => Ok(Value::Empty(*kind)),
            other => {
                let d = other
                    .promote(ValueKind::Number)
                    .and_then(|n| n.as_decimal())
                    .ok_or_else(negative)?;
                d.sqrt().map(|r| Value::Number(r.normalize())).ok_or_else(negative)
            }
        }
    })
}
