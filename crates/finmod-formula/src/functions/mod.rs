//! Built-in functions
//!
//! Kind constructors (`Number(..)`, `List(..)`, `Record(..)` ...) are not
//! registered here; the evaluator handles them because they depend on
//! named arguments and the empty-collection policy.

pub mod collection;
pub mod math;

use ahash::AHashMap;
use finmod_core::{CellError, Value};

use crate::error::FormulaError;

/// Function implementation signature; arguments arrive evaluated and
/// free of error values
pub type FunctionImpl = fn(&[Value]) -> Result<Value, CellError>;

/// Function definition
pub struct FunctionDef {
    /// Function name (lowercase)
    pub name: &'static str,
    /// Minimum arguments
    pub min_args: usize,
    /// Maximum arguments (None = unlimited)
    pub max_args: Option<usize>,
    /// Implementation
    pub implementation: FunctionImpl,
}

impl FunctionDef {
    /// Check an argument count against the definition
    pub fn check_arity(&self, actual: usize) -> Result<(), FormulaError> {
        let expected = match self.max_args {
            _ if actual < self.min_args => format!("at least {}", self.min_args),
            Some(max) if actual > max => format!("at most {max}"),
            _ => return Ok(()),
        };
        Err(FormulaError::ArgumentCount {
            function: self.name.to_string(),
            expected,
            actual,
        })
    }

    /// Check the arity, then call the implementation
    pub fn call(&self, args: &[Value]) -> Result<Value, CellError> {
        self.check_arity(args.len())?;
        (self.implementation)(args)
    }
}

/// Function registry
pub struct FunctionRegistry {
    functions: AHashMap<&'static str, FunctionDef>,
}

impl Default for FunctionRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl FunctionRegistry {
    /// Create a new registry with all built-in functions
    pub fn new() -> Self {
        let mut registry = Self {
            functions: AHashMap::new(),
        };

        registry.register_math_functions();
        registry.register_collection_functions();

        registry
    }

    /// Look up a function by name, ignoring case
    pub fn get(&self, name: &str) -> Option<&FunctionDef> {
        self.functions.get(name.to_ascii_lowercase().as_str())
    }

    /// Register a function
    pub fn register(&mut self, def: FunctionDef) {
        self.functions.insert(def.name, def);
    }

    /// Names of every registered function, sorted
    pub fn names(&self) -> Vec<&'static str> {
        let mut names: Vec<_> = self.functions.keys().copied().collect();
        names.sort_unstable();
        names
    }

    fn define(&mut self, name: &'static str, min_args: usize, max_args: Option<usize>, implementation: FunctionImpl) {
        self.register(FunctionDef {
            name,
            min_args,
            max_args,
            implementation,
        });
    }

    fn register_math_functions(&mut self) {
        self.define("sum", 0, None, math::fn_sum);
        self.define("product", 0, None, math::fn_product);
        self.define("min", 1, None, math::fn_min);
        self.define("max", 1, None, math::fn_max);
        self.define("count", 0, None, math::fn_count);
        self.define("avg", 1, None, math::fn_avg);
        self.define("abs", 1, Some(1), math::fn_abs);
        self.define("round", 1, Some(2), math::fn_round);
        self.define("sqrt", 1, Some(1), math::fn_sqrt);
    }

    fn register_collection_functions(&mut self) {
        self.define("len", 1, Some(1), collection::fn_len);
        self.define("dims", 1, Some(1), collection::fn_dims);
        self.define("reshape", 2, None, collection::fn_reshape);
        self.define("keys", 1, Some(1), collection::fn_keys);
        self.define("values", 1, Some(1), collection::fn_values);
        self.define("sort", 1, Some(1), collection::fn_sort);
        self.define("unique", 1, Some(1), collection::fn_unique);
    }
}

/// Elements of every argument, flattened one level
///
/// Lists and arrays contribute their items, records their values; empties
/// are skipped. The first error element is returned as the failure.
pub(crate) fn elements(args: &[Value]) -> Result<Vec<&Value>, CellError> {
    let mut out = Vec::new();
    for arg in args {
        let items: Box<dyn Iterator<Item = &Value>> = match arg {
            Value::List(items) | Value::Array { items, .. } => Box::new(items.iter()),
            Value::Record(fields) => Box::new(fields.iter().map(|(_, v)| v)),
            scalar => Box::new(std::iter::once(scalar)),
        };
        for item in items {
            match item {
                Value::Error(e) => return Err(e.clone()),
                Value::Empty(_) => {}
                v => out.push(v),
            }
        }
    }
    Ok(out)
}
