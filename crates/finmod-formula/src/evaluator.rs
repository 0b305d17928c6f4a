//! Formula evaluator
//!
//! Walks a parsed formula from its root and produces a [`Value`]. The walk
//! only reads: arenas through [`ObjectContext`], cells through
//! [`ModelContext`]. Failures inside the walk become `Value::Error`, so a
//! caller always gets a value it can store in the cell.

use std::sync::OnceLock;

use finmod_core::{CellError, CellId, Value, ValueKind};

use crate::ast::{BinaryOperator, Node, NodeId, ValId};
use crate::context::{ModelContext, ObjectContext};
use crate::error::FormulaError;
use crate::functions::FunctionRegistry;
use crate::ops::{binary, map_elements, truthy, unary, values_equal};
use crate::reference;

/// Global function registry (lazily initialized)
static FUNCTION_REGISTRY: OnceLock<FunctionRegistry> = OnceLock::new();

fn get_function_registry() -> &'static FunctionRegistry {
    FUNCTION_REGISTRY.get_or_init(FunctionRegistry::new)
}

/// How untyped empty collections (`()`, `List()`, `Record()`) are treated
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum EmptyPolicy {
    /// Untyped empty; it takes the kind of whatever it is combined with
    Infer,
    /// Type error asking for a typed constructor such as `Number()`
    #[default]
    RequireExplicit,
}

/// Evaluation options
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct EvalOptions {
    pub empty_policy: EmptyPolicy,
}

/// Evaluate the formula rooted at `root` as seen from `caller`
pub fn evaluate<O, M>(objects: &O, model: &M, caller: CellId, root: NodeId, options: EvalOptions) -> Value
where
    O: ObjectContext + ?Sized,
    M: ModelContext + ?Sized,
{
    let evaluator = Evaluator {
        objects,
        model,
        caller,
        options,
    };
    evaluator.eval(root).unwrap_or_else(|e| {
        tracing::trace!(%caller, error = %e, "evaluation failed");
        Value::Error(e)
    })
}

struct Evaluator<'a, O: ?Sized, M: ?Sized> {
    objects: &'a O,
    model: &'a M,
    caller: CellId,
    options: EvalOptions,
}

impl<O, M> Evaluator<'_, O, M>
where
    O: ObjectContext + ?Sized,
    M: ModelContext + ?Sized,
{
    fn eval(&self, id: NodeId) -> Result<Value, CellError> {
        match self.objects.node(id) {
            Node::Literal { value } => Ok(self.objects.value(value).clone()),
            Node::Unary { op, operand } => unary(op, &self.eval(operand)?),
            Node::Binary { op, lhs, rhs } => self.binary(op, lhs, rhs),
            Node::List { head, len } => {
                if len == 0 {
                    return self.untyped_empty("()");
                }
                Value::list(self.eval_all(&self.chain(head))?)
            }
            Node::Call { name, args, .. } => self.call(name, &self.chain(args)),
            Node::If {
                cond,
                then,
                otherwise,
            } => {
                let chosen = if truthy("if", &self.eval(cond)?)? { then } else { otherwise };
                self.eval(chosen)
            }
            Node::Match { scrutinee, arms, .. } => self.match_arms(scrutinee, &self.chain(arms)),
            Node::Cell { .. } | Node::Tile { .. } | Node::Board { .. } => {
                let range = reference::resolve(self.objects, self.model, self.caller, id)?;
                match reference::read(self.model, self.caller, &range) {
                    Value::Error(e) => Err(e),
                    value => Ok(value),
                }
            }
            Node::Field { .. } => Err(CellError::value("named arguments are only valid in Record(..)")),
            other => Err(CellError::value(format!("cannot evaluate {other:?} on its own"))),
        }
    }

    fn chain(&self, head: Option<NodeId>) -> Vec<NodeId> {
        let mut items = Vec::new();
        let mut next = head;
        while let Some(id) = next {
            match self.objects.node(id) {
                Node::Item { value, next: rest } => {
                    items.push(value);
                    next = rest;
                }
                _ => break,
            }
        }
        items
    }

    fn eval_all(&self, ids: &[NodeId]) -> Result<Vec<Value>, CellError> {
        ids.iter().map(|&id| self.eval(id)).collect()
    }

    fn string(&self, id: ValId) -> Result<&str, CellError> {
        match self.objects.value(id) {
            Value::String(s) => Ok(s),
            other => Err(CellError::value(format!("expected a name, found {other}"))),
        }
    }

    /// Left-leaning chains such as `1 + 2 + 3` are folded in a loop, left
    /// operand first
    fn binary(&self, op: BinaryOperator, lhs: NodeId, rhs: NodeId) -> Result<Value, CellError> {
        let mut spine = vec![(op, rhs)];
        let mut leftmost = lhs;
        while let Node::Binary { op, lhs, rhs } = self.objects.node(leftmost) {
            spine.push((op, rhs));
            leftmost = lhs;
        }

        let mut acc = self.eval(leftmost)?;
        for (op, rhs) in spine.into_iter().rev() {
            acc = self.apply(op, acc, rhs)?;
        }
        Ok(acc)
    }

    fn apply(&self, op: BinaryOperator, left: Value, rhs: NodeId) -> Result<Value, CellError> {
        match op {
            BinaryOperator::And | BinaryOperator::Or => {
                let left = truthy(op.symbol(), &left)?;
                // and/or never look at the right side once the result is known
                if left == (op == BinaryOperator::Or) {
                    return Ok(Value::Boolean(left));
                }
                Ok(Value::Boolean(truthy(op.symbol(), &self.eval(rhs)?)?))
            }
            _ => binary(op, &left, &self.eval(rhs)?),
        }
    }

    fn match_arms(&self, scrutinee: NodeId, arms: &[NodeId]) -> Result<Value, CellError> {
        let subject = self.eval(scrutinee)?;
        for &arm in arms {
            let Node::Arm { pattern, body } = self.objects.node(arm) else {
                return Err(CellError::value("malformed match arm"));
            };
            let matched = match pattern {
                None => true,
                Some(pattern) => values_equal(&subject, &self.eval(pattern)?),
            };
            if matched {
                return self.eval(body);
            }
        }
        Err(CellError::value(format!("no match arm accepts {subject}")))
    }

    fn untyped_empty(&self, written: &str) -> Result<Value, CellError> {
        match self.options.empty_policy {
            EmptyPolicy::Infer => Ok(Value::Empty(None)),
            EmptyPolicy::RequireExplicit => Err(CellError::type_error(format!(
                "{written} has no element kind; use a typed constructor such as Number()"
            ))),
        }
    }

    fn call(&self, name: ValId, args: &[NodeId]) -> Result<Value, CellError> {
        let name = self.string(name)?;
        if let Some(kind) = ValueKind::from_constructor(name) {
            return self.construct(kind, name, args);
        }

        let func = get_function_registry()
            .get(name)
            .ok_or_else(|| FormulaError::UnknownFunction(name.to_string()))?;
        func.check_arity(args.len())?;
        let values = self.eval_all(args)?;
        func.call(&values)
    }

    fn construct(&self, kind: ValueKind, name: &str, args: &[NodeId]) -> Result<Value, CellError> {
        if args.is_empty() {
            return match kind {
                ValueKind::List | ValueKind::Array | ValueKind::Record => {
                    self.untyped_empty(&format!("{name}()"))
                }
                scalar => Ok(Value::Empty(Some(scalar))),
            };
        }
        match kind {
            ValueKind::Record => self.record(args),
            ValueKind::List => {
                let values = self.eval_all(args)?;
                if let [single] = values.as_slice() {
                    if single.kind().is_collection() {
                        return single.convert(ValueKind::List);
                    }
                }
                Value::list(values)
            }
            ValueKind::Array => self.array(args),
            scalar => {
                if args.len() > 1 {
                    return Err(FormulaError::ArgumentCount {
                        function: name.to_string(),
                        expected: "at most 1".to_string(),
                        actual: args.len(),
                    }
                    .into());
                }
                let value = self.eval(args[0])?;
                map_elements(&value, &|v| v.convert(scalar))
            }
        }
    }

    /// `Record(key: value, ..)`
    fn record(&self, args: &[NodeId]) -> Result<Value, CellError> {
        let mut fields = Vec::with_capacity(args.len());
        for &arg in args {
            let Node::Field { key, value } = self.objects.node(arg) else {
                return Err(CellError::type_error("Record(..) takes only named arguments"));
            };
            fields.push((self.string(key)?.to_string(), self.eval(value)?));
        }
        Value::record(fields)
    }

    /// `Array(dims, items..)` where `dims` is an Int or a list of Ints and
    /// the items are either listed or given as one collection
    fn array(&self, args: &[NodeId]) -> Result<Value, CellError> {
        let mut values = self.eval_all(args)?.into_iter();
        let dims_value = values.next().unwrap_or_default();
        let dims = match &dims_value {
            Value::List(items) => items.iter().collect(),
            single => vec![single],
        }
        .into_iter()
        .map(|d| d.as_index().and_then(|d| u32::try_from(d).ok()))
        .collect::<Option<Vec<u32>>>()
        .ok_or_else(|| CellError::type_error("Array dimensions must be non-negative integers"))?;

        let rest: Vec<Value> = values.collect();
        let items = match rest.as_slice() {
            [Value::List(items)] | [Value::Array { items, .. }] => items.clone(),
            _ => rest,
        };
        Value::array(items, dims)
    }
}
