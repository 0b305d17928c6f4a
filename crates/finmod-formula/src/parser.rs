//! Formula parser
//!
//! A scannerless PEG parser: every grammar rule scans the characters it
//! needs and emits tokens as it goes, so tokenizing and parsing happen in
//! one pass. Ordered choice tries alternatives in sequence; before each
//! attempt the parser records the scan position and the lengths of the
//! token, node and value arenas, and truncates back to them when the
//! attempt fails.
//!
//! Operator precedence, loosest first: `or`, `and`, `not`, comparisons,
//! `union`/`intersect`/`except`, `++`, `+ -`, `* / // % dot cross`, `^`,
//! unary minus.

use ahash::AHashMap;
use finmod_core::label::{label_to_index, Axis};
use finmod_core::{Decimal, Value};

use crate::ast::{BinaryOperator, Formula, Node, NodeId, RefStyle, UnaryOperator, ValId};
use crate::error::{Expected, ParseError};
use crate::token::{Token, TokenTag};

const KEYWORDS: &[&str] = &[
    "if", "then", "else", "match", "and", "or", "not", "true", "false", "dot", "cross", "union",
    "intersect", "except", "_",
];

type Ops = &'static [(&'static str, BinaryOperator)];

const OR_OPS: Ops = &[("or", BinaryOperator::Or)];
const AND_OPS: Ops = &[("and", BinaryOperator::And)];
const COMPARE_OPS: Ops = &[
    ("==", BinaryOperator::Equal),
    ("!=", BinaryOperator::NotEqual),
    ("<=", BinaryOperator::LessEqual),
    (">=", BinaryOperator::GreaterEqual),
    ("<", BinaryOperator::Less),
    (">", BinaryOperator::Greater),
];
const SET_OPS: Ops = &[
    ("union", BinaryOperator::Union),
    ("intersect", BinaryOperator::Intersect),
    ("except", BinaryOperator::Except),
];
const CONCAT_OPS: Ops = &[("++", BinaryOperator::Concat)];
const ADD_OPS: Ops = &[("+", BinaryOperator::Add), ("-", BinaryOperator::Subtract)];
const MUL_OPS: Ops = &[
    ("*", BinaryOperator::Multiply),
    ("//", BinaryOperator::IntDivide),
    ("/", BinaryOperator::Divide),
    ("%", BinaryOperator::Modulo),
    ("dot", BinaryOperator::Dot),
    ("cross", BinaryOperator::Cross),
];
const POW_OPS: Ops = &[("^", BinaryOperator::Power)];

/// Deepest rule nesting a formula may reach; also bounds the depth of the
/// tree the evaluator and renderer recurse over
pub const MAX_NESTING: usize = 256;

/// Parse formula text into a [`Formula`]
///
/// A leading `=` is optional. Fails with the furthest offset reached and
/// the constructs that would have been accepted there.
pub fn parse_formula(source: &str) -> Result<Formula, ParseError> {
    Parser::new(source).parse()
}

/// Scan position plus arena lengths; everything a rollback restores
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ParseState {
    pub pos: usize,
    pub tokens: usize,
    pub nodes: usize,
    pub values: usize,
}

/// Interning key for literal values
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
enum Literal {
    Number(Decimal),
    Int(i64),
    String(String),
    Boolean(bool),
    Empty,
}

impl Literal {
    fn of(value: &Value) -> Option<Self> {
        Some(match value {
            Value::Number(d) => Literal::Number(d.normalize()),
            Value::Int(i) => Literal::Int(*i),
            Value::String(s) => Literal::String(s.clone()),
            Value::Boolean(b) => Literal::Boolean(*b),
            Value::Empty(None) => Literal::Empty,
            _ => return None,
        })
    }
}

pub(crate) fn is_ident_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '_'
}

fn is_word(text: &str) -> bool {
    text.chars().all(|c| c.is_ascii_alphabetic() || c == '_')
}

/// Operators that are a prefix of a longer operator
fn extends(text: &str, next: Option<char>) -> bool {
    matches!(
        (text, next),
        ("+", Some('+')) | ("/", Some('/')) | ("<", Some('=')) | (">", Some('=')) | ("=", Some('=' | '>'))
    )
}

/// Formula parser over a single source string
pub struct Parser<'s> {
    src: &'s str,
    pos: usize,
    tokens: Vec<Token>,
    nodes: Vec<Node>,
    values: Vec<Value>,
    interned: AHashMap<Literal, ValId>,
    furthest: usize,
    expected: Vec<Expected>,
    depth: usize,
    too_deep: Option<usize>,
}

impl<'s> Parser<'s> {
    /// Create a parser positioned at the start of `src`
    pub fn new(src: &'s str) -> Self {
        Self {
            src,
            pos: 0,
            tokens: Vec::new(),
            nodes: Vec::new(),
            values: Vec::new(),
            interned: AHashMap::new(),
            furthest: 0,
            expected: Vec::new(),
            depth: 0,
            too_deep: None,
        }
    }

    /// Current scan position and arena lengths
    pub fn state(&self) -> ParseState {
        ParseState {
            pos: self.pos,
            tokens: self.tokens.len(),
            nodes: self.nodes.len(),
            values: self.values.len(),
        }
    }

    /// Truncate every arena and the scan position back to `state`
    ///
    /// Interned entries pointing past the value arena go stale; `intern`
    /// checks them before reuse.
    pub fn rollback(&mut self, state: ParseState) {
        self.pos = state.pos;
        self.tokens.truncate(state.tokens);
        self.nodes.truncate(state.nodes);
        self.values.truncate(state.values);
    }

    /// Parse the whole source
    pub fn parse(mut self) -> Result<Formula, ParseError> {
        if u32::try_from(self.src.len()).is_err() {
            return Err(ParseError {
                offset: u32::MAX as usize,
                expected: vec![Expected::Construct("shorter formula")],
                found: None,
            });
        }

        self.attempt(Self::leading_equals);
        let root = self.sequence();
        let end = self.skip_ws();

        if let Some(offset) = self.too_deep {
            return Err(ParseError {
                offset,
                expected: vec![Expected::Construct("shallower nesting")],
                found: self.src.get(offset..).and_then(|rest| rest.chars().next()),
            });
        }

        match root {
            Some(root) if end == self.src.len() => {
                tracing::trace!(
                    source = self.src,
                    tokens = self.tokens.len(),
                    nodes = self.nodes.len(),
                    values = self.values.len(),
                    "parsed formula"
                );
                Ok(Formula {
                    source: self.src.to_string(),
                    tokens: self.tokens,
                    nodes: self.nodes,
                    values: self.values,
                    root,
                })
            }
            Some(_) => {
                self.expect_at(end, Expected::Construct("end of formula"));
                Err(self.error())
            }
            None => Err(self.error()),
        }
    }

    fn error(&self) -> ParseError {
        ParseError {
            offset: self.furthest,
            expected: self.expected.clone(),
            found: self.src.get(self.furthest..).and_then(|rest| rest.chars().next()),
        }
    }

    // === Combinators ===

    /// Run a rule; on failure leave no trace of it
    fn attempt<T>(&mut self, rule: impl FnOnce(&mut Self) -> Option<T>) -> Option<T> {
        let state = self.state();
        let result = rule(self);
        if result.is_none() {
            self.rollback(state);
        }
        result
    }

    /// Ordered choice: first alternative that succeeds
    fn select<T>(&mut self, rules: &[fn(&mut Self) -> Option<T>]) -> Option<T> {
        rules.iter().find_map(|rule| self.attempt(*rule))
    }

    /// Run a rule one nesting level deeper
    ///
    /// Past [`MAX_NESTING`] the position is recorded and every nested rule
    /// fails from then on, so the parse unwinds without retrying.
    fn nested<T>(&mut self, rule: impl FnOnce(&mut Self) -> Option<T>) -> Option<T> {
        if self.too_deep.is_some() {
            return None;
        }
        if self.depth >= MAX_NESTING {
            self.too_deep = Some(self.skip_ws());
            return None;
        }
        self.depth += 1;
        let result = rule(self);
        self.depth -= 1;
        result
    }

    /// `item (',' item)*`, returned in order
    fn separated(&mut self, item: fn(&mut Self) -> Option<NodeId>) -> Option<Vec<NodeId>> {
        let mut items = vec![item(self)?];
        while let Some(next) = self.attempt(|p| {
            p.punct(",", TokenTag::Comma)?;
            item(p)
        }) {
            items.push(next);
        }
        Some(items)
    }

    /// `operand (op operand)*`, left associative
    ///
    /// Only right operands count towards nesting; the left spine is built
    /// in a loop.
    fn binary_level(&mut self, operand: fn(&mut Self) -> Option<NodeId>, ops: Ops) -> Option<NodeId> {
        let mut lhs = operand(self)?;
        while let Some((op, rhs)) = self.attempt(|p| {
            let op = p.operator(ops)?;
            let rhs = p.nested(operand)?;
            Some((op, rhs))
        }) {
            lhs = self.push(Node::Binary { op, lhs, rhs });
        }
        Some(lhs)
    }

    // === Arena helpers ===

    fn push(&mut self, node: Node) -> NodeId {
        let id = NodeId(self.nodes.len() as u32);
        self.nodes.push(node);
        id
    }

    fn intern(&mut self, value: Value) -> ValId {
        let key = Literal::of(&value);
        if let Some(id) = key.as_ref().and_then(|k| self.interned.get(k)).copied() {
            if self.values.get(id.index()) == Some(&value) {
                return id;
            }
        }
        let id = ValId(self.values.len() as u32);
        self.values.push(value);
        if let Some(key) = key {
            self.interned.insert(key, id);
        }
        id
    }

    /// Link `items` into an Item chain, last element first
    fn chain(&mut self, items: &[NodeId]) -> Option<NodeId> {
        let mut next = None;
        for &value in items.iter().rev() {
            next = Some(self.push(Node::Item { value, next }));
        }
        next
    }

    fn list(&mut self, items: &[NodeId]) -> Option<NodeId> {
        let len = u16::try_from(items.len()).ok()?;
        let head = self.chain(items);
        Some(self.push(Node::List { head, len }))
    }

    // === Scanning ===

    /// Offset of the next non-whitespace character
    fn skip_ws(&self) -> usize {
        let rest = &self.src[self.pos..];
        self.pos + (rest.len() - rest.trim_start().len())
    }

    fn scan_while(&self, from: usize, pred: impl Fn(char) -> bool) -> usize {
        self.src[from..]
            .char_indices()
            .find(|&(_, c)| !pred(c))
            .map_or(self.src.len(), |(i, _)| from + i)
    }

    fn expect_at(&mut self, at: usize, what: Expected) {
        if at > self.furthest {
            self.furthest = at;
            self.expected.clear();
        }
        if at == self.furthest && !self.expected.contains(&what) {
            self.expected.push(what);
        }
    }

    fn emit(&mut self, start: usize, end: usize, tag: TokenTag) -> Option<()> {
        let Ok(len) = u16::try_from(end - start) else {
            self.expect_at(start, Expected::Construct("shorter token"));
            return None;
        };
        self.tokens.push(Token {
            start: start as u32,
            tag,
            len,
        });
        self.pos = end;
        Some(())
    }

    /// Consume `text` without recording an expectation on failure
    fn eat(&mut self, text: &'static str, tag: TokenTag) -> Option<()> {
        let start = self.skip_ws();
        if !self.src[start..].starts_with(text) {
            return None;
        }
        let end = start + text.len();
        let next = self.src[end..].chars().next();
        if extends(text, next) || (is_word(text) && next.map_or(false, is_ident_char)) {
            return None;
        }
        self.emit(start, end, tag)
    }

    fn punct(&mut self, text: &'static str, tag: TokenTag) -> Option<()> {
        let result = self.eat(text, tag);
        if result.is_none() {
            let at = self.skip_ws();
            self.expect_at(at, Expected::Token(text));
        }
        result
    }

    fn keyword(&mut self, word: &'static str) -> Option<()> {
        self.punct(word, TokenTag::Keyword)
    }

    fn operator(&mut self, ops: Ops) -> Option<BinaryOperator> {
        for &(text, op) in ops {
            if self.eat(text, TokenTag::Operator).is_some() {
                return Some(op);
            }
        }
        let at = self.skip_ws();
        self.expect_at(at, Expected::Construct("operator"));
        None
    }

    fn ident(&mut self) -> Option<&'s str> {
        let src = self.src;
        let start = self.skip_ws();
        let leads = src[start..]
            .chars()
            .next()
            .map_or(false, |c| c.is_ascii_alphabetic() || c == '_');
        let end = if leads { self.scan_while(start, is_ident_char) } else { start };
        let word = &src[start..end];
        if end == start || KEYWORDS.contains(&word) {
            self.expect_at(start, Expected::Construct("identifier"));
            return None;
        }
        self.emit(start, end, TokenTag::Ident)?;
        Some(word)
    }

    /// Optionally signed integer
    fn integer(&mut self) -> Option<i64> {
        let start = self.skip_ws();
        let digits = if self.src[start..].starts_with('-') { start + 1 } else { start };
        let end = self.scan_while(digits, |c| c.is_ascii_digit());
        let parsed = if end > digits { self.src[start..end].parse().ok() } else { None };
        let Some(n) = parsed else {
            self.expect_at(start, Expected::Construct("integer"));
            return None;
        };
        self.emit(start, end, TokenTag::Number)?;
        Some(n)
    }

    fn unsigned(&mut self) -> Option<u32> {
        let start = self.skip_ws();
        let end = self.scan_while(start, |c| c.is_ascii_digit());
        let parsed = if end > start { self.src[start..end].parse().ok() } else { None };
        let Some(n) = parsed else {
            self.expect_at(start, Expected::Construct("tile id"));
            return None;
        };
        self.emit(start, end, TokenTag::Number)?;
        Some(n)
    }

    /// `'text'` or `"text"`; a doubled quote stands for itself
    fn quoted(&mut self) -> Option<String> {
        let start = self.skip_ws();
        let quote = match self.src[start..].chars().next() {
            Some(q @ ('\'' | '"')) => q,
            _ => {
                self.expect_at(start, Expected::Construct("string"));
                return None;
            }
        };
        let body = start + 1;
        let mut text = String::new();
        let mut chars = self.src[body..].char_indices().peekable();
        while let Some((i, c)) = chars.next() {
            if c != quote {
                text.push(c);
                continue;
            }
            if chars.peek().map(|&(_, n)| n) == Some(quote) {
                chars.next();
                text.push(quote);
                continue;
            }
            self.emit(start, body + i + 1, TokenTag::String)?;
            return Some(text);
        }
        let closing = if quote == '\'' { "'" } else { "\"" };
        self.expect_at(self.src.len(), Expected::Token(closing));
        None
    }

    // === Expressions ===

    fn leading_equals(&mut self) -> Option<()> {
        self.eat("=", TokenTag::Sigil)
    }

    /// `expr (',' expr)*`; more than one element builds a List
    fn sequence(&mut self) -> Option<NodeId> {
        let items = self.separated(Self::expr)?;
        match items.as_slice() {
            [single] => Some(*single),
            _ => self.list(&items),
        }
    }

    fn expr(&mut self) -> Option<NodeId> {
        self.select(&[Self::if_expr, Self::match_expr, Self::or_expr])
    }

    fn if_expr(&mut self) -> Option<NodeId> {
        self.nested(Self::if_body)
    }

    fn if_body(&mut self) -> Option<NodeId> {
        self.keyword("if")?;
        let cond = self.expr()?;
        self.keyword("then")?;
        let then = self.expr()?;
        self.keyword("else")?;
        let otherwise = self.expr()?;
        Some(self.push(Node::If {
            cond,
            then,
            otherwise,
        }))
    }

    fn match_expr(&mut self) -> Option<NodeId> {
        self.nested(Self::match_body)
    }

    fn match_body(&mut self) -> Option<NodeId> {
        self.keyword("match")?;
        let scrutinee = self.or_expr()?;
        self.punct("{", TokenTag::OpenBrace)?;
        let arms = self.separated(Self::arm)?;
        self.eat(",", TokenTag::Comma);
        self.punct("}", TokenTag::CloseBrace)?;
        let len = u16::try_from(arms.len()).ok()?;
        let head = self.chain(&arms);
        Some(self.push(Node::Match {
            scrutinee,
            arms: head,
            len,
        }))
    }

    fn arm(&mut self) -> Option<NodeId> {
        let pattern = match self.eat("_", TokenTag::Keyword) {
            Some(()) => None,
            None => Some(self.or_expr()?),
        };
        self.punct("=>", TokenTag::Arrow)?;
        let body = self.expr()?;
        Some(self.push(Node::Arm { pattern, body }))
    }

    fn or_expr(&mut self) -> Option<NodeId> {
        self.binary_level(Self::and_expr, OR_OPS)
    }

    fn and_expr(&mut self) -> Option<NodeId> {
        self.binary_level(Self::not_expr, AND_OPS)
    }

    fn not_expr(&mut self) -> Option<NodeId> {
        self.select(&[Self::not_op, Self::compare])
    }

    fn not_op(&mut self) -> Option<NodeId> {
        self.keyword("not")?;
        let operand = self.nested(Self::not_expr)?;
        Some(self.push(Node::Unary {
            op: UnaryOperator::Not,
            operand,
        }))
    }

    /// Comparisons do not chain
    fn compare(&mut self) -> Option<NodeId> {
        let lhs = self.set_expr()?;
        let rest = self.attempt(|p| {
            let op = p.operator(COMPARE_OPS)?;
            let rhs = p.nested(Self::set_expr)?;
            Some((op, rhs))
        });
        Some(match rest {
            Some((op, rhs)) => self.push(Node::Binary { op, lhs, rhs }),
            None => lhs,
        })
    }

    fn set_expr(&mut self) -> Option<NodeId> {
        self.binary_level(Self::concat, SET_OPS)
    }

    fn concat(&mut self) -> Option<NodeId> {
        self.binary_level(Self::additive, CONCAT_OPS)
    }

    fn additive(&mut self) -> Option<NodeId> {
        self.binary_level(Self::term, ADD_OPS)
    }

    fn term(&mut self) -> Option<NodeId> {
        self.binary_level(Self::power, MUL_OPS)
    }

    /// Right associative
    fn power(&mut self) -> Option<NodeId> {
        self.nested(Self::power_body)
    }

    fn power_body(&mut self) -> Option<NodeId> {
        let base = self.unary()?;
        let exponent = self.attempt(|p| {
            p.operator(POW_OPS)?;
            p.power()
        });
        Some(match exponent {
            Some(rhs) => self.push(Node::Binary {
                op: BinaryOperator::Power,
                lhs: base,
                rhs,
            }),
            None => base,
        })
    }

    fn unary(&mut self) -> Option<NodeId> {
        let start = self.skip_ws();
        let result = self.select(&[Self::reference, Self::negate, Self::plus, Self::primary]);
        if result.is_none() && self.furthest == start {
            self.expected.clear();
            self.expected.push(Expected::Construct("expression"));
        }
        result
    }

    /// `-x^2` is `-(x^2)`
    fn negate(&mut self) -> Option<NodeId> {
        self.punct("-", TokenTag::Operator)?;
        let operand = self.power()?;
        Some(self.push(Node::Unary {
            op: UnaryOperator::Negate,
            operand,
        }))
    }

    fn plus(&mut self) -> Option<NodeId> {
        self.punct("+", TokenTag::Operator)?;
        let operand = self.power()?;
        Some(self.push(Node::Unary {
            op: UnaryOperator::Plus,
            operand,
        }))
    }

    fn primary(&mut self) -> Option<NodeId> {
        self.select(&[
            Self::number_literal,
            Self::string_literal,
            Self::boolean,
            Self::call,
            Self::group,
            Self::empty_group,
        ])
    }

    fn number_literal(&mut self) -> Option<NodeId> {
        let start = self.skip_ws();
        let mut end = self.scan_while(start, |c| c.is_ascii_digit());
        if end > start && self.src[end..].starts_with('.') {
            let frac = self.scan_while(end + 1, |c| c.is_ascii_digit());
            if frac > end + 1 {
                end = frac;
            }
        }
        let parsed = if end > start { self.src[start..end].parse::<Decimal>().ok() } else { None };
        let Some(number) = parsed else {
            self.expect_at(start, Expected::Construct("number"));
            return None;
        };
        self.emit(start, end, TokenTag::Number)?;
        let value = self.intern(Value::Number(number));
        Some(self.push(Node::Literal { value }))
    }

    fn string_literal(&mut self) -> Option<NodeId> {
        let text = self.quoted()?;
        let value = self.intern(Value::String(text));
        Some(self.push(Node::Literal { value }))
    }

    fn boolean(&mut self) -> Option<NodeId> {
        let flag = if self.eat("true", TokenTag::Keyword).is_some() {
            true
        } else {
            self.keyword("false")?;
            false
        };
        let value = self.intern(Value::Boolean(flag));
        Some(self.push(Node::Literal { value }))
    }

    fn call(&mut self) -> Option<NodeId> {
        let name = self.ident()?;
        self.punct("(", TokenTag::OpenParen)?;
        let args = self
            .attempt(|p| p.separated(Self::argument))
            .unwrap_or_default();
        self.punct(")", TokenTag::CloseParen)?;
        let argc = u16::try_from(args.len()).ok()?;
        let name = self.intern(Value::String(name.to_string()));
        let head = self.chain(&args);
        Some(self.push(Node::Call {
            name,
            args: head,
            argc,
        }))
    }

    fn argument(&mut self) -> Option<NodeId> {
        self.select(&[Self::field, Self::expr])
    }

    /// `key: value` inside a call
    fn field(&mut self) -> Option<NodeId> {
        let key = self.ident()?;
        self.punct(":", TokenTag::Colon)?;
        let value = self.expr()?;
        let key = self.intern(Value::String(key.to_string()));
        Some(self.push(Node::Field { key, value }))
    }

    fn group(&mut self) -> Option<NodeId> {
        self.punct("(", TokenTag::OpenParen)?;
        let inner = self.sequence()?;
        self.punct(")", TokenTag::CloseParen)?;
        Some(inner)
    }

    fn empty_group(&mut self) -> Option<NodeId> {
        self.punct("(", TokenTag::OpenParen)?;
        self.punct(")", TokenTag::CloseParen)?;
        self.list(&[])
    }

    // === References ===

    /// `#'Board'? &Tile? cell`
    fn reference(&mut self) -> Option<NodeId> {
        let board = self.attempt(Self::board_selector);
        let tile = self.attempt(Self::tile_selector);
        let mut node = self.select(&[Self::relative, Self::position, Self::address, Self::shorthand])?;
        if let Some((selector, by_id, pinned)) = tile {
            node = self.push(Node::Tile {
                selector,
                by_id,
                pinned,
                target: node,
            });
        }
        if let Some((name, pinned)) = board {
            node = self.push(Node::Board {
                name,
                pinned,
                target: node,
            });
        }
        Some(node)
    }

    fn pin(&mut self) -> bool {
        self.eat("$", TokenTag::Sigil).is_some()
    }

    fn board_selector(&mut self) -> Option<(ValId, bool)> {
        self.punct("#", TokenTag::Sigil)?;
        let pinned = self.pin();
        let name = self.quoted()?;
        Some((self.intern(Value::String(name)), pinned))
    }

    fn tile_selector(&mut self) -> Option<(ValId, bool, bool)> {
        self.punct("&", TokenTag::Sigil)?;
        let pinned = self.pin();
        if let Some(id) = self.attempt(Self::unsigned) {
            return Some((self.intern(Value::Int(id as i64)), true, pinned));
        }
        let name = self.ident()?;
        Some((self.intern(Value::String(name.to_string())), false, pinned))
    }

    /// First and optional second axis; missing axes become `Omitted`
    fn axes(&mut self, axis: fn(&mut Self) -> Option<NodeId>) -> (NodeId, NodeId) {
        let first = match self.attempt(axis) {
            Some(node) => node,
            None => self.push(Node::Omitted),
        };
        let second = match self.attempt(|p| {
            p.punct(",", TokenTag::Comma)?;
            Some(p.attempt(axis))
        }) {
            Some(Some(node)) => node,
            _ => self.push(Node::Omitted),
        };
        (first, second)
    }

    /// `-[dr, dc]`
    fn relative(&mut self) -> Option<NodeId> {
        self.punct("-", TokenTag::Sigil)?;
        self.punct("[", TokenTag::OpenBracket)?;
        let (row, col) = self.axes(Self::offset);
        self.punct("]", TokenTag::CloseBracket)?;
        Some(self.push(Node::Cell {
            style: RefStyle::Relative,
            row,
            col,
        }))
    }

    /// Offsets are read under the leading minus, so they are stored negated
    fn offset(&mut self) -> Option<NodeId> {
        let n = self.integer()?.checked_neg()?;
        let at = self.intern(Value::Int(n));
        Some(self.push(Node::Index { at, pinned: false }))
    }

    /// `[r, c]`
    fn position(&mut self) -> Option<NodeId> {
        self.punct("[", TokenTag::OpenBracket)?;
        let (row, col) = self.axes(Self::position_axis);
        self.punct("]", TokenTag::CloseBracket)?;
        Some(self.push(Node::Cell {
            style: RefStyle::Position,
            row,
            col,
        }))
    }

    /// `$? (start? ':' stop? | index)`
    fn position_axis(&mut self) -> Option<NodeId> {
        let pinned = self.pin();
        if let Some((start, stop)) = self.attempt(Self::slice_bounds) {
            return Some(self.push(Node::Slice { start, stop, pinned }));
        }
        let n = self.integer()?;
        let at = self.intern(Value::Int(n));
        Some(self.push(Node::Index { at, pinned }))
    }

    fn slice_bounds(&mut self) -> Option<(ValId, ValId)> {
        let start = self.attempt(Self::integer);
        self.punct(":", TokenTag::Colon)?;
        let stop = self.attempt(Self::integer);
        let start = self.intern(start.map_or(Value::Empty(None), Value::Int));
        let stop = self.intern(stop.map_or(Value::Empty(None), Value::Int));
        Some((start, stop))
    }

    /// `{row, col}`
    fn address(&mut self) -> Option<NodeId> {
        self.punct("{", TokenTag::OpenBrace)?;
        let row = self.label_axis()?;
        let col = match self.attempt(|p| {
            p.punct(",", TokenTag::Comma)?;
            p.label_axis()
        }) {
            Some(node) => node,
            None => self.push(Node::Omitted),
        };
        self.punct("}", TokenTag::CloseBrace)?;
        Some(self.push(Node::Cell {
            style: RefStyle::Address,
            row,
            col,
        }))
    }

    fn label_axis(&mut self) -> Option<NodeId> {
        self.select(&[Self::bracketed_axis, Self::label])
    }

    /// Positional sub-reference inside an address: `[1]`, `[:]`
    fn bracketed_axis(&mut self) -> Option<NodeId> {
        self.punct("[", TokenTag::OpenBracket)?;
        let axis = self.position_axis()?;
        self.punct("]", TokenTag::CloseBracket)?;
        Some(axis)
    }

    fn label(&mut self) -> Option<NodeId> {
        let pinned = self.pin();
        let text = match self.attempt(Self::quoted) {
            Some(text) => text,
            None => {
                let start = self.skip_ws();
                let end = self.scan_while(start, is_ident_char);
                if end == start {
                    self.expect_at(start, Expected::Construct("label"));
                    return None;
                }
                let text = self.src[start..end].to_string();
                self.emit(start, end, TokenTag::Label)?;
                text
            }
        };
        let name = self.intern(Value::String(text));
        Some(self.push(Node::Label { name, pinned }))
    }

    /// `@aA`, `@A1`, `@1A` or `@[col, row]`
    fn shorthand(&mut self) -> Option<NodeId> {
        self.punct("@", TokenTag::Sigil)?;
        self.select(&[Self::shorthand_bracket, Self::shorthand_letters])
    }

    fn shorthand_bracket(&mut self) -> Option<NodeId> {
        self.punct("[", TokenTag::OpenBracket)?;
        let col = self.shorthand_axis()?;
        self.punct(",", TokenTag::Comma)?;
        let row = self.shorthand_axis()?;
        self.punct("]", TokenTag::CloseBracket)?;
        Some(self.push(Node::Cell {
            style: RefStyle::Shorthand,
            row,
            col,
        }))
    }

    fn shorthand_axis(&mut self) -> Option<NodeId> {
        self.select(&[Self::braced_label, Self::position_axis])
    }

    fn braced_label(&mut self) -> Option<NodeId> {
        self.punct("{", TokenTag::OpenBrace)?;
        let label = self.label()?;
        self.punct("}", TokenTag::CloseBrace)?;
        Some(label)
    }

    fn shorthand_letters(&mut self) -> Option<NodeId> {
        let first = self.shorthand_part()?;
        let second = self.shorthand_part()?;
        let ((row, row_pinned), (col, col_pinned)) = match (first, second) {
            ((Axis::Row, r, rp), (Axis::Column, c, cp)) | ((Axis::Column, c, cp), (Axis::Row, r, rp)) => {
                ((r, rp), (c, cp))
            }
            _ => {
                self.expect_at(self.pos, Expected::Construct("row and column"));
                return None;
            }
        };
        if self.src[self.pos..].chars().next().map_or(false, is_ident_char) {
            self.expect_at(self.pos, Expected::Construct("end of shorthand"));
            return None;
        }
        let row_at = self.intern(Value::Int(row as i64));
        let col_at = self.intern(Value::Int(col as i64));
        let row = self.push(Node::Index {
            at: row_at,
            pinned: row_pinned,
        });
        let col = self.push(Node::Index {
            at: col_at,
            pinned: col_pinned,
        });
        Some(self.push(Node::Cell {
            style: RefStyle::Shorthand,
            row,
            col,
        }))
    }

    /// One run of uppercase letters (column), lowercase letters (row) or
    /// digits (1-based row), with an optional `$`; no whitespace inside
    fn shorthand_part(&mut self) -> Option<(Axis, u32, bool)> {
        let mut at = self.pos;
        let pinned = self.src[at..].starts_with('$');
        if pinned {
            self.emit(at, at + 1, TokenTag::Sigil)?;
            at += 1;
        }
        let first = self.src[at..].chars().next();
        let (axis, end, index) = match first {
            Some(c) if c.is_ascii_uppercase() => {
                let end = self.scan_while(at, |c| c.is_ascii_uppercase());
                (Axis::Column, end, label_to_index(&self.src[at..end], Axis::Column))
            }
            Some(c) if c.is_ascii_lowercase() => {
                let end = self.scan_while(at, |c| c.is_ascii_lowercase());
                (Axis::Row, end, label_to_index(&self.src[at..end], Axis::Row))
            }
            Some(c) if c.is_ascii_digit() => {
                let end = self.scan_while(at, |c| c.is_ascii_digit());
                let number = self.src[at..end].parse::<u32>().ok();
                (Axis::Row, end, number.and_then(|n| n.checked_sub(1)))
            }
            _ => (Axis::Row, at, None),
        };
        let Some(index) = index else {
            self.expect_at(at, Expected::Construct("shorthand cell"));
            return None;
        };
        self.emit(at, end, TokenTag::Label)?;
        Some((axis, index, pinned))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use proptest::prelude::*;

    fn token_texts(formula: &Formula) -> Vec<&str> {
        formula
            .tokens()
            .iter()
            .map(|t| &formula.source()[t.start as usize..t.end()])
            .collect()
    }

    fn root(formula: &Formula) -> Node {
        formula.nodes()[formula.root().index()]
    }

    #[test]
    fn test_parse_number() {
        let f = parse_formula("42.5").unwrap();
        assert_eq!(f.values(), &[Value::Number(Decimal::new(425, 1))]);
        assert_eq!(root(&f), Node::Literal { value: ValId(0) });
    }

    #[test]
    fn test_parse_precedence() {
        let f = parse_formula("1+2*3").unwrap();
        match root(&f) {
            Node::Binary {
                op: BinaryOperator::Add,
                rhs,
                ..
            } => assert!(matches!(
                f.nodes()[rhs.index()],
                Node::Binary {
                    op: BinaryOperator::Multiply,
                    ..
                }
            )),
            other => panic!("Expected addition, got {:?}", other),
        }
    }

    #[test]
    fn test_parse_power_is_right_associative() {
        let f = parse_formula("2^3^2").unwrap();
        match root(&f) {
            Node::Binary {
                op: BinaryOperator::Power,
                lhs,
                rhs,
            } => {
                assert!(matches!(f.nodes()[lhs.index()], Node::Literal { .. }));
                assert!(matches!(
                    f.nodes()[rhs.index()],
                    Node::Binary {
                        op: BinaryOperator::Power,
                        ..
                    }
                ));
            }
            other => panic!("Expected power, got {:?}", other),
        }
    }

    #[test]
    fn test_tokens_double_minus() {
        let f = parse_formula("1--1").unwrap();
        assert_eq!(token_texts(&f), vec!["1", "-", "-", "1"]);
    }

    #[test]
    fn test_tokens_are_eight_bytes() {
        assert_eq!(std::mem::size_of::<Token>(), 8);
    }

    #[test]
    fn test_leading_equals_is_optional() {
        let a = parse_formula("=1+1").unwrap();
        let b = parse_formula("1+1").unwrap();
        assert_eq!(a.nodes(), b.nodes());
        assert!(parse_formula("==1").is_err());
    }

    #[test]
    fn test_literals_are_interned() {
        let f = parse_formula("1+1+'a'+'a'").unwrap();
        assert_eq!(f.values().len(), 2);
    }

    #[test]
    fn test_parse_top_level_list() {
        let f = parse_formula("1,2,(3,4,5)").unwrap();
        match root(&f) {
            Node::List { head, len } => {
                assert_eq!(len, 3);
                let items: Vec<_> = f.chain(head).collect();
                assert!(matches!(f.nodes()[items[2].index()], Node::List { len: 3, .. }));
            }
            other => panic!("Expected list, got {:?}", other),
        }
    }

    #[test]
    fn test_parse_empty_group() {
        let f = parse_formula("()").unwrap();
        assert_eq!(root(&f), Node::List { head: None, len: 0 });
    }

    #[test]
    fn test_parse_call_with_fields() {
        let f = parse_formula("Record(price: 2, qty: 3)").unwrap();
        match root(&f) {
            Node::Call { name, args, argc } => {
                assert_eq!(f.values()[name.index()], Value::string("Record"));
                assert_eq!(argc, 2);
                let first = f.chain(args).next().unwrap();
                assert!(matches!(f.nodes()[first.index()], Node::Field { .. }));
            }
            other => panic!("Expected call, got {:?}", other),
        }
    }

    #[test]
    fn test_parse_if_and_match() {
        assert!(matches!(root(&parse_formula("if 1 < 2 then 'a' else 'b'").unwrap()), Node::If { .. }));
        let f = parse_formula("match [0,0] { 1 => 'one', 2 => 'two', _ => 'many', }").unwrap();
        match root(&f) {
            Node::Match { len, arms, .. } => {
                assert_eq!(len, 3);
                let last = f.chain(arms).last().unwrap();
                assert!(matches!(f.nodes()[last.index()], Node::Arm { pattern: None, .. }));
            }
            other => panic!("Expected match, got {:?}", other),
        }
    }

    #[test]
    fn test_concat_is_not_two_additions() {
        let f = parse_formula("'a' ++ 'b'").unwrap();
        assert!(matches!(
            root(&f),
            Node::Binary {
                op: BinaryOperator::Concat,
                ..
            }
        ));
    }

    #[test]
    fn test_keyword_operators() {
        let f = parse_formula("(1,2) union (2,3)").unwrap();
        assert!(matches!(
            root(&f),
            Node::Binary {
                op: BinaryOperator::Union,
                ..
            }
        ));
        // A keyword prefix of an identifier is not the keyword
        assert!(parse_formula("dotted(1)").is_ok());
    }

    #[test]
    fn test_relative_reference_stores_negated_offsets() {
        let f = parse_formula("-[-1,0]*2").unwrap();
        let Node::Binary { lhs, .. } = root(&f) else {
            panic!("Expected multiplication");
        };
        let Node::Cell {
            style: RefStyle::Relative,
            row,
            col,
        } = f.nodes()[lhs.index()]
        else {
            panic!("Expected relative reference");
        };
        let offset = |id: NodeId| match f.nodes()[id.index()] {
            Node::Index { at, pinned: false } => f.values()[at.index()].clone(),
            other => panic!("Expected index, got {:?}", other),
        };
        assert_eq!(offset(row), Value::Int(1));
        assert_eq!(offset(col), Value::Int(0));
    }

    #[test]
    fn test_negation_of_position_is_relative() {
        let f = parse_formula("-[]").unwrap();
        assert!(matches!(
            root(&f),
            Node::Cell {
                style: RefStyle::Relative,
                ..
            }
        ));
    }

    #[test]
    fn test_parse_reference_forms() {
        for source in [
            "[1]",
            "[,1]",
            "[1:3, $0]",
            "[:]",
            "{a, B}",
            "{[:], Price}",
            "{'Unit Price'}",
            "@aA",
            "@Aa",
            "@A1",
            "@1A",
            "@$A$1",
            "@[{Price}, 0:2]",
            "&t0[0,0]",
            "&$Data{a,A}",
            "&3@B2",
            "#'Plan'&Data[0,0]",
            "#$'Plan'&$Data[0,0]",
        ] {
            let f = parse_formula(source).unwrap_or_else(|e| panic!("{source}: {e}"));
            assert!(root(&f).is_reference(), "{source} should be a reference");
        }
    }

    #[test]
    fn test_shorthand_decodes_letters() {
        let f = parse_formula("@bC").unwrap();
        let Node::Cell { row, col, .. } = root(&f) else {
            panic!("Expected reference");
        };
        let index = |id: NodeId| match f.nodes()[id.index()] {
            Node::Index { at, .. } => f.values()[at.index()].clone(),
            other => panic!("Expected index, got {:?}", other),
        };
        assert_eq!(index(row), Value::Int(1));
        assert_eq!(index(col), Value::Int(2));

        assert!(parse_formula("@A0").is_err());
        assert!(parse_formula("@aa").is_err());
        assert!(parse_formula("@A1B").is_err());
    }

    #[test]
    fn test_parse_error_position() {
        let err = parse_formula("1 +").unwrap_err();
        assert_eq!(err.offset, 3);
        assert_eq!(err.expected, vec![Expected::Construct("expression")]);
        assert_eq!(err.found, None);

        let err = parse_formula("(1 2").unwrap_err();
        assert_eq!(err.offset, 3);
        assert!(err.expected.contains(&Expected::Token(")")));
        assert_eq!(err.found, Some('2'));

        let err = parse_formula("'open").unwrap_err();
        assert_eq!(err.expected, vec![Expected::Token("'")]);
    }

    #[test]
    fn test_deep_nesting_is_rejected() {
        let source = format!("{}1{}", "(".repeat(1000), ")".repeat(1000));
        let err = parse_formula(&source).unwrap_err();
        assert_eq!(err.expected, vec![Expected::Construct("shallower nesting")]);
        assert_eq!(err.found, Some('('));
        assert!(err.offset > 0 && err.offset < 1000);

        let err = parse_formula(&format!("{}1", "-".repeat(1000))).unwrap_err();
        assert_eq!(err.expected, vec![Expected::Construct("shallower nesting")]);
        assert!(parse_formula(&format!("{}1", "not ".repeat(1000))).is_err());
        assert!(parse_formula(&format!("2{}", "^2".repeat(1000))).is_err());

        let source = format!("{}1{}", "(".repeat(100), ")".repeat(100));
        assert!(parse_formula(&source).is_ok());
    }

    #[test]
    fn test_long_flat_chain_parses() {
        let source = vec!["1"; 5000].join("+");
        let f = parse_formula(&source).unwrap();
        assert!(matches!(root(&f), Node::Binary { op: BinaryOperator::Add, .. }));
        assert_eq!(f.nodes().len(), 5000 * 2 - 1);
    }

    macro_rules! assert_rolls_back {
        ($source:expr; $($rule:ident),+) => {$(
            let mut parser = Parser::new($source);
            let before = parser.state();
            if parser.attempt(Parser::$rule).is_none() {
                assert_eq!(parser.state(), before, "{} on {:?}", stringify!($rule), $source);
            }
        )+};
    }

    #[test]
    fn test_failed_alternative_leaves_no_trace() {
        for source in ["[1, 2", "-[1,", "{a,", "@A", "sum(1,", "&t0 + 1", "#'Plan'"] {
            assert_rolls_back!(source; position, relative, address, shorthand, call, reference);
        }
    }

    #[test]
    fn test_children_precede_parents() {
        let f = parse_formula("if [0,0] > 1 then sum(1, 2, @A1) else match 3 { 3 => (1,2), _ => () }").unwrap();
        for (index, node) in f.nodes().iter().enumerate() {
            for child in node.children() {
                assert!(child.index() < index);
            }
        }
    }

    proptest! {
        #[test]
        fn prop_rollback_restores_state(source in "[-\\[\\]{}()@#&$,:'0-9aAbB+*/ ]{0,16}") {
            assert_rolls_back!(source.as_str(); expr, reference, primary, position_axis, label);
        }

        #[test]
        fn prop_nodes_only_reference_lower_ids(source in "[-\\[\\]()0-9+*, ]{1,24}") {
            if let Ok(f) = parse_formula(&source) {
                prop_assert!(f.root().index() < f.nodes().len());
                for (index, node) in f.nodes().iter().enumerate() {
                    for child in node.children() {
                        prop_assert!(child.index() < index);
                    }
                    let value = match node {
                        Node::Literal { value } => Some(*value),
                        Node::Index { at, .. } => Some(*at),
                        _ => None,
                    };
                    if let Some(value) = value {
                        prop_assert!(value.index() < f.values().len());
                    }
                }
            }
        }
    }
}
