//! Cell value types
//!
//! A [`Value`] is the result of evaluating a formula. Scalars are exact
//! decimals by default; `Float` and `Int` are explicit opt-ins. Collections
//! (`List`, `Array`, `Record`) hold a single element kind after numeric
//! promotion, and `Empty` is a typed absence shared by all of them.

use rust_decimal::prelude::*;
use std::fmt;

/// The kind of a [`Value`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "lowercase"))]
pub enum ValueKind {
    Number,
    Boolean,
    Float,
    Int,
    String,
    List,
    Array,
    Record,
    Empty,
    Error,
}

impl ValueKind {
    /// Lowercase name used in messages and on the wire
    pub fn name(self) -> &'static str {
        match self {
            ValueKind::Number => "number",
            ValueKind::Boolean => "boolean",
            ValueKind::Float => "float",
            ValueKind::Int => "int",
            ValueKind::String => "string",
            ValueKind::List => "list",
            ValueKind::Array => "array",
            ValueKind::Record => "record",
            ValueKind::Empty => "empty",
            ValueKind::Error => "error",
        }
    }

    /// Look up a kind by its constructor name (`Number`, `Float`, ...)
    pub fn from_constructor(name: &str) -> Option<Self> {
        Some(match name {
            "Number" => ValueKind::Number,
            "Boolean" => ValueKind::Boolean,
            "Float" => ValueKind::Float,
            "Int" => ValueKind::Int,
            "String" => ValueKind::String,
            "List" => ValueKind::List,
            "Array" => ValueKind::Array,
            "Record" => ValueKind::Record,
            _ => return None,
        })
    }

    /// Check if the kind takes part in numeric promotion
    pub fn is_numeric(self) -> bool {
        matches!(self, ValueKind::Number | ValueKind::Float | ValueKind::Int)
    }

    /// Check if the kind is a collection
    pub fn is_collection(self) -> bool {
        matches!(self, ValueKind::List | ValueKind::Array | ValueKind::Record)
    }

    fn numeric_rank(self) -> u8 {
        match self {
            ValueKind::Int => 0,
            ValueKind::Number => 1,
            ValueKind::Float => 2,
            _ => u8::MAX,
        }
    }

    /// The kind two operands share: equal kinds, or the wider numeric kind
    /// (`Int < Number < Float`)
    pub fn promote(self, other: ValueKind) -> Option<ValueKind> {
        if self == other {
            return Some(self);
        }
        if self.is_numeric() && other.is_numeric() {
            if self.numeric_rank() >= other.numeric_rank() {
                Some(self)
            } else {
                Some(other)
            }
        } else {
            None
        }
    }
}

impl fmt::Display for ValueKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Category of a cell-scoped failure
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "lowercase"))]
pub enum ErrorKind {
    /// Formula text was rejected
    Parse,
    /// Unresolved or out-of-range reference
    Reference,
    /// Cell participates in a dependency cycle
    Cycle,
    /// Operator or function applied to incompatible kinds or shapes
    Type,
    /// Division by zero
    DivideByZero,
    /// Value cannot be represented (overflow, bad conversion)
    Value,
}

impl ErrorKind {
    /// Short display code
    pub fn code(self) -> &'static str {
        match self {
            ErrorKind::Parse => "#PARSE!",
            ErrorKind::Reference => "#REF!",
            ErrorKind::Cycle => "#CYCLE!",
            ErrorKind::Type => "#TYPE!",
            ErrorKind::DivideByZero => "#DIV/0!",
            ErrorKind::Value => "#VALUE!",
        }
    }
}

/// An error carried as a value so it can propagate through dependents
#[derive(Debug, Clone, PartialEq)]
pub struct CellError {
    pub kind: ErrorKind,
    pub message: String,
}

impl CellError {
    /// Create an error of the given kind
    pub fn new<S: Into<String>>(kind: ErrorKind, message: S) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    pub fn reference<S: Into<String>>(message: S) -> Self {
        Self::new(ErrorKind::Reference, message)
    }

    pub fn type_error<S: Into<String>>(message: S) -> Self {
        Self::new(ErrorKind::Type, message)
    }

    pub fn value<S: Into<String>>(message: S) -> Self {
        Self::new(ErrorKind::Value, message)
    }

    pub fn cycle<S: Into<String>>(message: S) -> Self {
        Self::new(ErrorKind::Cycle, message)
    }

    pub fn divide_by_zero() -> Self {
        Self::new(ErrorKind::DivideByZero, "division by zero")
    }

    /// Type error naming a binary operator and both operand kinds
    pub fn mismatch(op: &str, left: ValueKind, right: ValueKind) -> Self {
        Self::type_error(format!("operator '{op}' cannot combine {left} and {right}"))
    }

    /// Type error naming an operator and the single offending kind
    pub fn unsupported(op: &str, kind: ValueKind) -> Self {
        Self::type_error(format!("operator '{op}' cannot apply to {kind}"))
    }
}

impl fmt::Display for CellError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.message.is_empty() {
            f.write_str(self.kind.code())
        } else {
            write!(f, "{} {}", self.kind.code(), self.message)
        }
    }
}

impl std::error::Error for CellError {}

/// Represents the value held by a cell or produced by an expression
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    /// Exact decimal (default numeric kind)
    Number(Decimal),
    Boolean(bool),
    /// 64-bit float, only via `Float(...)`
    Float(f64),
    /// Exact integer (integer division, indexing)
    Int(i64),
    String(String),
    /// Flat ordered sequence of one element kind
    List(Vec<Value>),
    /// Row-major elements with a dimension vector
    Array { items: Vec<Value>, dims: Vec<u32> },
    /// Ordered key/value pairs with distinct keys
    Record(Vec<(String, Value)>),
    /// Absence, optionally typed with the element kind it stands in for
    Empty(Option<ValueKind>),
    /// Propagating failure
    Error(CellError),
}

impl Default for Value {
    fn default() -> Self {
        Value::Empty(None)
    }
}

impl Value {
    /// Create a string value
    pub fn string<S: Into<String>>(s: S) -> Self {
        Value::String(s.into())
    }

    /// Create a decimal number value
    pub fn number<N: Into<Decimal>>(n: N) -> Self {
        Value::Number(n.into())
    }

    /// Kind of this value
    pub fn kind(&self) -> ValueKind {
        match self {
            Value::Number(_) => ValueKind::Number,
            Value::Boolean(_) => ValueKind::Boolean,
            Value::Float(_) => ValueKind::Float,
            Value::Int(_) => ValueKind::Int,
            Value::String(_) => ValueKind::String,
            Value::List(_) => ValueKind::List,
            Value::Array { .. } => ValueKind::Array,
            Value::Record(_) => ValueKind::Record,
            Value::Empty(_) => ValueKind::Empty,
            Value::Error(_) => ValueKind::Error,
        }
    }

    /// Kind used for homogeneity checks: a typed empty counts as its kind
    pub fn effective_kind(&self) -> Option<ValueKind> {
        match self {
            Value::Empty(kind) => *kind,
            other => Some(other.kind()),
        }
    }

    /// Element kind of a collection, or the kind of a scalar
    pub fn element_kind(&self) -> Option<ValueKind> {
        match self {
            Value::List(items) | Value::Array { items, .. } => {
                unify_kinds(items.iter()).ok().flatten()
            }
            Value::Record(fields) => unify_kinds(fields.iter().map(|(_, v)| v)).ok().flatten(),
            other => other.effective_kind(),
        }
    }

    /// Check if the value is an error
    pub fn is_error(&self) -> bool {
        matches!(self, Value::Error(_))
    }

    /// Check if the value is empty
    pub fn is_empty(&self) -> bool {
        matches!(self, Value::Empty(_))
    }

    /// Get the error if this is an error value
    pub fn as_error(&self) -> Option<&CellError> {
        match self {
            Value::Error(e) => Some(e),
            _ => None,
        }
    }

    /// Elements of a List or Array
    pub fn items(&self) -> Option<&[Value]> {
        match self {
            Value::List(items) | Value::Array { items, .. } => Some(items),
            _ => None,
        }
    }

    /// Shape of the value: `[]` for scalars, `[len]` for lists, dims for arrays
    pub fn shape(&self) -> Vec<u32> {
        match self {
            Value::List(items) => vec![items.len() as u32],
            Value::Array { dims, .. } => dims.clone(),
            _ => Vec::new(),
        }
    }

    /// Build a list, enforcing one element kind
    ///
    /// No elements yields an untyped `Empty`.
    pub fn list(items: Vec<Value>) -> Result<Value, CellError> {
        if items.is_empty() {
            return Ok(Value::Empty(None));
        }
        let (items, _) = homogenize(items)?;
        Ok(Value::List(items))
    }

    /// Build an array; the element count must equal the product of `dims`
    pub fn array(items: Vec<Value>, dims: Vec<u32>) -> Result<Value, CellError> {
        let expected = dims.iter().try_fold(1u64, |acc, d| acc.checked_mul(*d as u64));
        if dims.is_empty() || expected != Some(items.len() as u64) {
            return Err(CellError::type_error(format!(
                "{} elements cannot take shape {:?}",
                items.len(),
                dims
            )));
        }
        if items.is_empty() {
            return Ok(Value::Empty(None));
        }
        let (items, _) = homogenize(items)?;
        Ok(Value::Array { items, dims })
    }

    /// Build a record; keys must be distinct and values share one kind
    pub fn record(fields: Vec<(String, Value)>) -> Result<Value, CellError> {
        if fields.is_empty() {
            return Ok(Value::Empty(None));
        }
        for (i, (key, _)) in fields.iter().enumerate() {
            if fields[..i].iter().any(|(k, _)| k == key) {
                return Err(CellError::type_error(format!("duplicate record key '{key}'")));
            }
        }
        let (keys, values): (Vec<String>, Vec<Value>) = fields.into_iter().unzip();
        let (values, _) = homogenize(values)?;
        Ok(Value::Record(keys.into_iter().zip(values).collect()))
    }

    /// Zero of a numeric kind
    pub fn zero(kind: ValueKind) -> Option<Value> {
        match kind {
            ValueKind::Number => Some(Value::Number(Decimal::ZERO)),
            ValueKind::Float => Some(Value::Float(0.0)),
            ValueKind::Int => Some(Value::Int(0)),
            _ => None,
        }
    }

    /// Widen a numeric value to `to` without loss (`Int -> Number -> Float`)
    pub fn promote(&self, to: ValueKind) -> Option<Value> {
        match (self, to) {
            (v, k) if v.kind() == k => Some(v.clone()),
            (Value::Int(i), ValueKind::Number) => Some(Value::Number(Decimal::from(*i))),
            (Value::Int(i), ValueKind::Float) => Some(Value::Float(*i as f64)),
            (Value::Number(d), ValueKind::Float) => d.to_f64().map(Value::Float),
            _ => None,
        }
    }

    /// Decimal view of a numeric value
    pub fn as_decimal(&self) -> Option<Decimal> {
        match self {
            Value::Number(d) => Some(*d),
            Value::Int(i) => Some(Decimal::from(*i)),
            Value::Float(f) => Decimal::from_f64(*f),
            _ => None,
        }
    }

    /// Float view of a numeric value
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Number(d) => d.to_f64(),
            Value::Int(i) => Some(*i as f64),
            Value::Float(f) => Some(*f),
            _ => None,
        }
    }

    /// Integer view of a numeric value with no fractional part
    pub fn as_index(&self) -> Option<i64> {
        match self {
            Value::Int(i) => Some(*i),
            Value::Number(d) if d.fract().is_zero() => d.to_i64(),
            Value::Float(f) if f.fract() == 0.0 && f.is_finite() => Some(*f as i64),
            _ => None,
        }
    }

    /// Convert to another kind, the way the kind constructors do
    ///
    /// `Int` truncates toward zero; strings are parsed; any scalar converts
    /// to `String`. Untyped empties take the target kind.
    pub fn convert(&self, to: ValueKind) -> Result<Value, CellError> {
        let fail = || CellError::value(format!("cannot convert {} to {}", self.kind(), to));
        match (self, to) {
            (Value::Error(e), _) => Err(e.clone()),
            (Value::Empty(_), _) => Ok(Value::Empty(Some(to))),
            (v, k) if v.kind() == k => Ok(v.clone()),

            (Value::Boolean(b), ValueKind::Number) => Ok(Value::Number(Decimal::from(*b as i64))),
            (Value::Boolean(b), ValueKind::Int) => Ok(Value::Int(*b as i64)),
            (Value::Boolean(b), ValueKind::Float) => Ok(Value::Float(*b as i64 as f64)),
            (Value::String(s), ValueKind::Number) => {
                s.trim().parse::<Decimal>().map(Value::Number).map_err(|_| fail())
            }
            (Value::String(s), ValueKind::Float) => {
                s.trim().parse::<f64>().map(Value::Float).map_err(|_| fail())
            }
            (Value::String(s), ValueKind::Int) => {
                s.trim().parse::<i64>().map(Value::Int).map_err(|_| fail())
            }
            (Value::String(s), ValueKind::Boolean) => match s.trim() {
                "true" => Ok(Value::Boolean(true)),
                "false" => Ok(Value::Boolean(false)),
                _ => Err(fail()),
            },
            (Value::Number(d), ValueKind::Int) => d.trunc().to_i64().map(Value::Int).ok_or_else(fail),
            (Value::Number(d), ValueKind::Float) => d.to_f64().map(Value::Float).ok_or_else(fail),
            (Value::Float(f), ValueKind::Number) => Decimal::from_f64(*f).map(Value::Number).ok_or_else(fail),
            (Value::Float(f), ValueKind::Int) if f.is_finite() && f.abs() < i64::MAX as f64 => {
                Ok(Value::Int(f.trunc() as i64))
            }
            (Value::Int(i), ValueKind::Number) => Ok(Value::Number(Decimal::from(*i))),
            (Value::Int(i), ValueKind::Float) => Ok(Value::Float(*i as f64)),
            (v, ValueKind::Boolean) if v.kind().is_numeric() => {
                Ok(Value::Boolean(v.as_f64().map(|f| f != 0.0).unwrap_or(false)))
            }
            (v, ValueKind::String) if !v.kind().is_collection() => Ok(Value::String(v.to_string())),

            (Value::Array { items, .. }, ValueKind::List) => Ok(Value::List(items.clone())),
            (Value::Record(fields), ValueKind::List) => {
                Value::list(fields.iter().map(|(_, v)| v.clone()).collect())
            }
            (v, ValueKind::List) if !v.kind().is_collection() => Ok(Value::List(vec![v.clone()])),
            _ => Err(fail()),
        }
    }
}

/// Kind shared by a sequence of elements after numeric promotion
///
/// Untyped empties are skipped; the first error element is returned as the
/// failure so errors keep propagating through collection construction.
pub fn unify_kinds<'a, I>(items: I) -> Result<Option<ValueKind>, CellError>
where
    I: IntoIterator<Item = &'a Value>,
{
    let mut acc: Option<ValueKind> = None;
    for item in items {
        let kind = match item {
            Value::Error(e) => return Err(e.clone()),
            Value::Empty(None) => continue,
            Value::Empty(Some(k)) => *k,
            other => other.kind(),
        };
        acc = Some(match acc {
            None => kind,
            Some(prev) => prev.promote(kind).ok_or_else(|| {
                CellError::type_error(format!("mixed element kinds {prev} and {kind}"))
            })?,
        });
    }
    Ok(acc)
}

/// Bring every element to the shared kind
pub fn homogenize(items: Vec<Value>) -> Result<(Vec<Value>, Option<ValueKind>), CellError> {
    let Some(kind) = unify_kinds(items.iter())? else {
        return Ok((items, None));
    };
    let items = items
        .into_iter()
        .map(|v| match v {
            Value::Empty(None) => Value::Empty(Some(kind)),
            v if v.kind() != kind && v.kind().is_numeric() => v.promote(kind).unwrap_or(v),
            v => v,
        })
        .collect();
    Ok((items, Some(kind)))
}

fn join(f: &mut fmt::Formatter<'_>, items: &[Value]) -> fmt::Result {
    for (i, item) in items.iter().enumerate() {
        if i > 0 {
            f.write_str(",")?;
        }
        write!(f, "{item}")?;
    }
    Ok(())
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Number(d) => write!(f, "{}", d.normalize()),
            Value::Boolean(b) => write!(f, "{b}"),
            Value::Float(x) => write!(f, "{x}"),
            Value::Int(i) => write!(f, "{i}"),
            Value::String(s) => f.write_str(s),
            Value::List(items) | Value::Array { items, .. } => join(f, items),
            Value::Record(fields) => {
                for (i, (key, value)) in fields.iter().enumerate() {
                    if i > 0 {
                        f.write_str(",")?;
                    }
                    write!(f, "{key}:{value}")?;
                }
                Ok(())
            }
            Value::Empty(_) => Ok(()),
            Value::Error(e) => write!(f, "{e}"),
        }
    }
}

impl From<Decimal> for Value {
    fn from(d: Decimal) -> Self {
        Value::Number(d)
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Boolean(b)
    }
}

impl From<i64> for Value {
    fn from(i: i64) -> Self {
        Value::Int(i)
    }
}

impl From<f64> for Value {
    fn from(f: f64) -> Self {
        Value::Float(f)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::String(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::String(s)
    }
}

impl From<CellError> for Value {
    fn from(e: CellError) -> Self {
        Value::Error(e)
    }
}
