//! Formula rendering and rebasing
//!
//! [`render`] turns a parsed formula back into canonical source text, with
//! the parentheses its structure needs and no others. [`rebase`] does the
//! same while moving the formula to another cell: unpinned Position,
//! Shorthand and bracketed Address axes shift by the copy delta, while
//! pinned axes, labels and relative offsets are written back unchanged.
//! Shorthand references come back in the letter-pair form (`@Bc`).

use std::fmt;

use finmod_core::{index_to_label, Axis, CellError, Value};

use crate::ast::{BinaryOperator, Formula, Node, NodeId, RefStyle, UnaryOperator, ValId};
use crate::context::ObjectContext;
use crate::parser::is_ident_char;

/// How far a formula moves when it is copied
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Shift {
    pub rows: i64,
    pub cols: i64,
    /// Name of the board the formula comes from, when it is copied onto
    /// another board; unpinned tile selectors keep pointing at it
    pub origin_board: Option<String>,
}

/// Canonical source text of a formula
pub fn render(formula: &Formula) -> String {
    let mut renderer = Renderer {
        formula,
        shift: None,
        out: String::new(),
    };
    // Nothing fails without a shift
    let _ = renderer.node(formula.root(), 0);
    renderer.out
}

/// Source text of `formula` moved by `shift`
///
/// Fails with a reference error when an unpinned axis would move off the
/// top or left edge of its tile.
pub fn rebase(formula: &Formula, shift: &Shift) -> Result<String, CellError> {
    let mut renderer = Renderer {
        formula,
        shift: Some(shift),
        out: String::new(),
    };
    renderer.node(formula.root(), 0)?;
    Ok(renderer.out)
}

impl fmt::Display for Formula {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&render(self))
    }
}

/// One reference axis after shifting
enum Part {
    Omitted,
    Index(i64, bool),
    Slice(Option<i64>, Option<i64>, bool),
    Label(String, bool),
}

fn pin(pinned: bool) -> &'static str {
    if pinned {
        "$"
    } else {
        ""
    }
}

fn quote(text: &str) -> String {
    format!("'{}'", text.replace('\'', "''"))
}

fn label_text(name: &str) -> String {
    if !name.is_empty() && name.chars().all(is_ident_char) {
        name.to_string()
    } else {
        quote(name)
    }
}

impl Part {
    fn position(&self) -> String {
        match self {
            Part::Omitted => String::new(),
            Part::Index(n, pinned) => format!("{}{n}", pin(*pinned)),
            Part::Slice(start, stop, pinned) => {
                let bound = |b: &Option<i64>| b.map(|n| n.to_string()).unwrap_or_default();
                format!("{}{}:{}", pin(*pinned), bound(start), bound(stop))
            }
            Part::Label(name, pinned) => format!("{}{}", pin(*pinned), label_text(name)),
        }
    }

    fn address(&self) -> String {
        match self {
            Part::Index(..) | Part::Slice(..) => format!("[{}]", self.position()),
            _ => self.position(),
        }
    }

    fn shorthand(&self) -> String {
        match self {
            Part::Label(..) => format!("{{{}}}", self.position()),
            _ => self.position(),
        }
    }
}

fn bracketed(row: &str, col: &str) -> String {
    match (row.is_empty(), col.is_empty()) {
        (_, true) => format!("[{row}]"),
        (true, false) => format!("[, {col}]"),
        (false, false) => format!("[{row}, {col}]"),
    }
}

/// Binding strength of the node as written; atoms bind tightest
fn precedence(node: &Node) -> u8 {
    match node {
        Node::If { .. } | Node::Match { .. } => 0,
        Node::Binary { op, .. } => op.precedence(),
        Node::Unary {
            op: UnaryOperator::Not, ..
        } => 3,
        Node::Unary { .. } => 10,
        _ => 12,
    }
}

/// Minimum precedence of the left and right operands of `op`
fn operand_precedence(op: BinaryOperator) -> (u8, u8) {
    let p = op.precedence();
    match p {
        // comparisons do not chain
        4 => (p + 1, p + 1),
        // right associative
        9 => (11, p),
        _ => (p, p + 1),
    }
}

struct Renderer<'f> {
    formula: &'f Formula,
    shift: Option<&'f Shift>,
    out: String,
}

impl Renderer<'_> {
    fn value(&self, id: ValId) -> &Value {
        self.formula.value(id)
    }

    fn text(&self, id: ValId) -> String {
        match self.value(id) {
            Value::String(s) => s.clone(),
            other => other.to_string(),
        }
    }

    fn int(&self, id: ValId) -> Option<i64> {
        match self.value(id) {
            Value::Int(n) => Some(*n),
            _ => None,
        }
    }

    fn node(&mut self, id: NodeId, min: u8) -> Result<(), CellError> {
        let node = self.formula.node(id);
        let parens = precedence(&node) < min;
        if parens {
            self.out.push('(');
        }
        self.write(node)?;
        if parens {
            self.out.push(')');
        }
        Ok(())
    }

    fn separated(&mut self, ids: &[NodeId], min: u8) -> Result<(), CellError> {
        for (i, &id) in ids.iter().enumerate() {
            if i > 0 {
                self.out.push_str(", ");
            }
            self.node(id, min)?;
        }
        Ok(())
    }

    fn literal(&mut self, value: &Value) {
        let text = match value {
            Value::String(s) => quote(s),
            other => other.to_string(),
        };
        self.out.push_str(&text);
    }

    fn write(&mut self, node: Node) -> Result<(), CellError> {
        match node {
            Node::Literal { value } => {
                let value = self.value(value).clone();
                self.literal(&value);
            }
            Node::Unary { op, operand } => {
                self.out.push_str(op.symbol());
                let inner = self.formula.node(operand);
                let ambiguous = match (op, inner) {
                    // `-[1, 0]` would read back as a relative reference
                    (UnaryOperator::Negate, Node::Cell { style, .. }) => style == RefStyle::Position,
                    (UnaryOperator::Plus, Node::Unary { op, .. }) => op == UnaryOperator::Plus,
                    _ => false,
                };
                match op {
                    UnaryOperator::Not => {
                        self.out.push(' ');
                        self.node(operand, 3)?;
                    }
                    _ if ambiguous => {
                        self.out.push('(');
                        self.node(operand, 0)?;
                        self.out.push(')');
                    }
                    _ => self.node(operand, 9)?,
                }
            }
            Node::Binary { op, lhs, rhs } => {
                // Left operands that need no parentheses are unrolled
                let mut spine = vec![(op, rhs)];
                let mut lhs = lhs;
                let mut left = operand_precedence(op).0;
                loop {
                    let inner = self.formula.node(lhs);
                    match inner {
                        Node::Binary { op, lhs: next, rhs } if precedence(&inner) >= left => {
                            spine.push((op, rhs));
                            left = operand_precedence(op).0;
                            lhs = next;
                        }
                        _ => break,
                    }
                }
                self.node(lhs, left)?;
                for (op, rhs) in spine.into_iter().rev() {
                    self.out.push(' ');
                    self.out.push_str(op.symbol());
                    self.out.push(' ');
                    self.node(rhs, operand_precedence(op).1)?;
                }
            }
            Node::List { head, .. } => {
                let items: Vec<NodeId> = self.formula.chain(head).collect();
                self.out.push('(');
                self.separated(&items, 0)?;
                self.out.push(')');
            }
            Node::Call { name, args, .. } => {
                let items: Vec<NodeId> = self.formula.chain(args).collect();
                let name = self.text(name);
                self.out.push_str(&name);
                self.out.push('(');
                self.separated(&items, 0)?;
                self.out.push(')');
            }
            Node::Field { key, value } => {
                let key = self.text(key);
                self.out.push_str(&key);
                self.out.push_str(": ");
                self.node(value, 0)?;
            }
            Node::If {
                cond,
                then,
                otherwise,
            } => {
                self.out.push_str("if ");
                self.node(cond, 0)?;
                self.out.push_str(" then ");
                self.node(then, 0)?;
                self.out.push_str(" else ");
                self.node(otherwise, 0)?;
            }
            Node::Match { scrutinee, arms, .. } => {
                self.out.push_str("match ");
                self.node(scrutinee, 1)?;
                self.out.push_str(" { ");
                let arms: Vec<NodeId> = self.formula.chain(arms).collect();
                for (i, arm) in arms.into_iter().enumerate() {
                    if i > 0 {
                        self.out.push_str(", ");
                    }
                    if let Node::Arm { pattern, body } = self.formula.node(arm) {
                        match pattern {
                            Some(pattern) => self.node(pattern, 1)?,
                            None => self.out.push('_'),
                        }
                        self.out.push_str(" => ");
                        self.node(body, 0)?;
                    }
                }
                self.out.push_str(" }");
            }
            Node::Cell { .. } | Node::Tile { .. } | Node::Board { .. } => self.reference(node, false)?,
            Node::Item { .. }
            | Node::Arm { .. }
            | Node::Index { .. }
            | Node::Slice { .. }
            | Node::Label { .. }
            | Node::Omitted => {}
        }
        Ok(())
    }

    fn reference(&mut self, node: Node, board_written: bool) -> Result<(), CellError> {
        match node {
            Node::Board { name, pinned, target } => {
                let name = quote(&self.text(name));
                self.out.push('#');
                self.out.push_str(pin(pinned));
                self.out.push_str(&name);
                self.reference(self.formula.node(target), true)
            }
            Node::Tile {
                selector,
                pinned,
                target,
                ..
            } => {
                if let Some(origin) = self.shift.and_then(|s| s.origin_board.as_deref()) {
                    if !pinned && !board_written {
                        let origin = quote(origin);
                        self.out.push('#');
                        self.out.push_str(&origin);
                    }
                }
                let selector = self.text(selector);
                self.out.push('&');
                self.out.push_str(pin(pinned));
                self.out.push_str(&selector);
                self.reference(self.formula.node(target), board_written)
            }
            Node::Cell { style, row, col } => {
                let text = self.cell(style, row, col)?;
                self.out.push_str(&text);
                Ok(())
            }
            _ => Ok(()),
        }
    }

    fn cell(&self, style: RefStyle, row: NodeId, col: NodeId) -> Result<String, CellError> {
        let shifts = style != RefStyle::Relative;
        let (rows, cols) = match self.shift {
            Some(shift) if shifts => (Some(shift.rows), Some(shift.cols)),
            _ => (None, None),
        };
        let row = self.part(row, rows)?;
        let col = self.part(col, cols)?;
        Ok(match style {
            RefStyle::Position => bracketed(&row.position(), &col.position()),
            RefStyle::Relative => {
                let written = |part: Part| match part {
                    Part::Index(n, pinned) => Part::Index(n.saturating_neg(), pinned),
                    other => other,
                };
                format!("-{}", bracketed(&written(row).position(), &written(col).position()))
            }
            RefStyle::Address => match col {
                Part::Omitted => format!("{{{}}}", row.address()),
                col => format!("{{{}, {}}}", row.address(), col.address()),
            },
            RefStyle::Shorthand => match (&row, &col) {
                (Part::Index(r, rp), Part::Index(c, cp)) if *r >= 0 && *c >= 0 => format!(
                    "@{}{}{}{}",
                    pin(*cp),
                    index_to_label(*c as u32, Axis::Column),
                    pin(*rp),
                    index_to_label(*r as u32, Axis::Row)
                ),
                _ => format!("@[{}, {}]", col.shorthand(), row.shorthand()),
            },
        })
    }

    /// Read one axis, moving it by `delta` unless it is pinned
    fn part(&self, id: NodeId, delta: Option<i64>) -> Result<Part, CellError> {
        let moved = |n: i64, pinned: bool| -> Result<i64, CellError> {
            match delta {
                // negative indices count from the end and do not move
                Some(d) if !pinned && n >= 0 => n
                    .checked_add(d)
                    .filter(|m| *m >= 0)
                    .ok_or_else(|| CellError::reference("copy moves a reference off its tile")),
                _ => Ok(n),
            }
        };
        Ok(match self.formula.node(id) {
            Node::Index { at, pinned } => {
                let n = self.int(at).unwrap_or_default();
                Part::Index(moved(n, pinned)?, pinned)
            }
            Node::Slice { start, stop, pinned } => {
                let start = self.int(start).map(|n| moved(n, pinned)).transpose()?;
                let stop = self.int(stop).map(|n| moved(n, pinned)).transpose()?;
                Part::Slice(start, stop, pinned)
            }
            Node::Label { name, pinned } => Part::Label(self.text(name), pinned),
            _ => match delta {
                Some(d) if d != 0 => Part::Index(moved(0, false)?, false),
                _ => Part::Omitted,
            },
        })
    }
}
