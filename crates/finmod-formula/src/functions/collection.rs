//! Collection functions

use finmod_core::{CellError, Value};

use crate::ops::{compare, values_equal};

fn items<'a>(name: &str, value: &'a Value) -> Result<&'a [Value], CellError> {
    match value {
        Value::List(items) | Value::Array { items, .. } => Ok(items),
        Value::Empty(_) => Ok(&[]),
        other => Err(CellError::type_error(format!(
            "{name} needs a list or array, got {}",
            other.kind()
        ))),
    }
}

fn fields<'a>(name: &str, value: &'a Value) -> Result<&'a [(String, Value)], CellError> {
    match value {
        Value::Record(fields) => Ok(fields),
        Value::Empty(_) => Ok(&[]),
        other => Err(CellError::type_error(format!("{name} needs a record, got {}", other.kind()))),
    }
}

/// LEN: elements of a collection, fields of a record, characters of a string
pub fn fn_len(args: &[Value]) -> Result<Value, CellError> {
    let len = match &args[0] {
        Value::String(s) => s.chars().count(),
        Value::Record(fields) => fields.len(),
        other => items("len", other)?.len(),
    };
    Ok(Value::Int(len as i64))
}

/// DIMS: the shape as a list of Ints
pub fn fn_dims(args: &[Value]) -> Result<Value, CellError> {
    Value::list(args[0].shape().into_iter().map(|d| Value::Int(d as i64)).collect())
}

/// RESHAPE(x, d1, d2, ..) or RESHAPE(x, (d1, d2, ..))
pub fn fn_reshape(args: &[Value]) -> Result<Value, CellError> {
    let source = items("reshape", &args[0])?.to_vec();
    let dim_values: Vec<&Value> = match &args[1..] {
        [Value::List(dims)] => dims.iter().collect(),
        rest => rest.iter().collect(),
    };
    let dims = dim_values
        .into_iter()
        .map(|d| d.as_index().and_then(|d| u32::try_from(d).ok()))
        .collect::<Option<Vec<u32>>>()
        .ok_or_else(|| CellError::type_error("reshape dimensions must be non-negative integers"))?;
    match dims.as_slice() {
        [_] => {
            let expected = dims[0] as usize;
            if expected != source.len() {
                return Err(CellError::type_error(format!(
                    "{} elements cannot take shape {:?}",
                    source.len(),
                    dims
                )));
            }
            Value::list(source)
        }
        _ => Value::array(source, dims),
    }
}

/// KEYS of a record, in order
pub fn fn_keys(args: &[Value]) -> Result<Value, CellError> {
    Value::list(
        fields("keys", &args[0])?
            .iter()
            .map(|(k, _)| Value::String(k.clone()))
            .collect(),
    )
}

/// VALUES of a record, in key order
pub fn fn_values(args: &[Value]) -> Result<Value, CellError> {
    Value::list(fields("values", &args[0])?.iter().map(|(_, v)| v.clone()).collect())
}

/// SORT ascending; numbers and strings only
pub fn fn_sort(args: &[Value]) -> Result<Value, CellError> {
    let mut sorted = items("sort", &args[0])?.to_vec();
    if let Some(pair) = sorted.windows(2).find(|w| compare(&w[0], &w[1]).is_none()) {
        return Err(CellError::type_error(format!(
            "sort cannot order {} and {}",
            pair[0].kind(),
            pair[1].kind()
        )));
    }
    sorted.sort_by(|a, b| compare(a, b).unwrap_or(std::cmp::Ordering::Equal));
    Value::list(sorted)
}

/// UNIQUE: first occurrence of each element, in order
pub fn fn_unique(args: &[Value]) -> Result<Value, CellError> {
    let mut kept: Vec<Value> = Vec::new();
    for item in items("unique", &args[0])? {
        if !kept.iter().any(|k| values_equal(k, item)) {
            kept.push(item.clone());
        }
    }
    Value::list(kept)
}
