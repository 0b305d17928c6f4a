//! Arena-based abstract syntax tree
//!
//! Nodes never embed other nodes: every child is a [`NodeId`] into the node
//! arena and every literal a [`ValId`] into the value arena. Children are
//! always pushed before their parent, so a node only refers to lower ids.
//! Variable-length children (list elements, call arguments, match arms)
//! form a chain of [`Node::Item`] links built back to front.

use finmod_core::Value;

use crate::token::Token;

/// Index into the node arena
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(pub u32);

impl NodeId {
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

/// Index into the value arena
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ValId(pub u32);

impl ValId {
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

/// Binary operators, loosest binding last in each group
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BinaryOperator {
    Add,
    Subtract,
    Multiply,
    Divide,
    /// `//`, integer result
    IntDivide,
    Modulo,
    Power,
    /// `++`
    Concat,
    Dot,
    Cross,
    Union,
    Intersect,
    Except,
    Equal,
    NotEqual,
    Less,
    LessEqual,
    Greater,
    GreaterEqual,
    And,
    Or,
}

impl BinaryOperator {
    /// Source spelling
    pub fn symbol(self) -> &'static str {
        match self {
            BinaryOperator::Add => "+",
            BinaryOperator::Subtract => "-",
            BinaryOperator::Multiply => "*",
            BinaryOperator::Divide => "/",
            BinaryOperator::IntDivide => "//",
            BinaryOperator::Modulo => "%",
            BinaryOperator::Power => "^",
            BinaryOperator::Concat => "++",
            BinaryOperator::Dot => "dot",
            BinaryOperator::Cross => "cross",
            BinaryOperator::Union => "union",
            BinaryOperator::Intersect => "intersect",
            BinaryOperator::Except => "except",
            BinaryOperator::Equal => "==",
            BinaryOperator::NotEqual => "!=",
            BinaryOperator::Less => "<",
            BinaryOperator::LessEqual => "<=",
            BinaryOperator::Greater => ">",
            BinaryOperator::GreaterEqual => ">=",
            BinaryOperator::And => "and",
            BinaryOperator::Or => "or",
        }
    }

    /// Binding strength; higher binds tighter
    pub fn precedence(self) -> u8 {
        match self {
            BinaryOperator::Or => 1,
            BinaryOperator::And => 2,
            BinaryOperator::Equal
            | BinaryOperator::NotEqual
            | BinaryOperator::Less
            | BinaryOperator::LessEqual
            | BinaryOperator::Greater
            | BinaryOperator::GreaterEqual => 4,
            BinaryOperator::Union | BinaryOperator::Intersect | BinaryOperator::Except => 5,
            BinaryOperator::Concat => 6,
            BinaryOperator::Add | BinaryOperator::Subtract => 7,
            BinaryOperator::Multiply
            | BinaryOperator::Divide
            | BinaryOperator::IntDivide
            | BinaryOperator::Modulo
            | BinaryOperator::Dot
            | BinaryOperator::Cross => 8,
            BinaryOperator::Power => 9,
        }
    }
}

/// Unary operators
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum UnaryOperator {
    Negate,
    Plus,
    Not,
}

impl UnaryOperator {
    pub fn symbol(self) -> &'static str {
        match self {
            UnaryOperator::Negate => "-",
            UnaryOperator::Plus => "+",
            UnaryOperator::Not => "not",
        }
    }
}

/// Syntax a cell reference was written in
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RefStyle {
    /// `[r, c]`
    Position,
    /// `{row, col}`
    Address,
    /// `-[dr, dc]`
    Relative,
    /// `@aA`, `@A1`, `@[col, row]`
    Shorthand,
}

/// AST node; fixed-size and `Copy`
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Node {
    Literal {
        value: ValId,
    },
    Unary {
        op: UnaryOperator,
        operand: NodeId,
    },
    Binary {
        op: BinaryOperator,
        lhs: NodeId,
        rhs: NodeId,
    },
    /// List literal `(a, b, c)` or a bare top-level `a, b, c`
    List {
        head: Option<NodeId>,
        len: u16,
    },
    /// Link in a child chain
    Item {
        value: NodeId,
        next: Option<NodeId>,
    },
    /// `name(args..)`; `name` is a String value
    Call {
        name: ValId,
        args: Option<NodeId>,
        argc: u16,
    },
    /// Named argument `key: value`
    Field {
        key: ValId,
        value: NodeId,
    },
    If {
        cond: NodeId,
        then: NodeId,
        otherwise: NodeId,
    },
    Match {
        scrutinee: NodeId,
        arms: Option<NodeId>,
        len: u16,
    },
    /// `pattern => body`; no pattern is the `_` wildcard
    Arm {
        pattern: Option<NodeId>,
        body: NodeId,
    },
    /// Cell reference with one axis node per dimension
    Cell {
        style: RefStyle,
        row: NodeId,
        col: NodeId,
    },
    /// Single index; an Int value
    Index {
        at: ValId,
        pinned: bool,
    },
    /// `start:stop`; an omitted bound is an `Empty` value
    Slice {
        start: ValId,
        stop: ValId,
        pinned: bool,
    },
    /// Row or column label; a String value
    Label {
        name: ValId,
        pinned: bool,
    },
    /// Axis left out (`[1]`, `[,1]`, `-[]`)
    Omitted,
    /// `&Name` / `&3` / `&$Name` around a reference
    Tile {
        selector: ValId,
        by_id: bool,
        pinned: bool,
        target: NodeId,
    },
    /// `#'Name'` around a reference
    Board {
        name: ValId,
        pinned: bool,
        target: NodeId,
    },
}

const _: () = assert!(std::mem::size_of::<Node>() <= 16);

impl Node {
    /// Direct children, in source order
    pub fn children(&self) -> Vec<NodeId> {
        match *self {
            Node::Literal { .. }
            | Node::Index { .. }
            | Node::Slice { .. }
            | Node::Label { .. }
            | Node::Omitted => Vec::new(),
            Node::Unary { operand, .. } => vec![operand],
            Node::Binary { lhs, rhs, .. } => vec![lhs, rhs],
            Node::List { head, .. } | Node::Call { args: head, .. } => head.into_iter().collect(),
            Node::Match {
                scrutinee, arms, ..
            } => std::iter::once(scrutinee).chain(arms).collect(),
            Node::Item { value, next } => std::iter::once(value).chain(next).collect(),
            Node::Field { value, .. } => vec![value],
            Node::If {
                cond,
                then,
                otherwise,
            } => vec![cond, then, otherwise],
            Node::Arm { pattern, body } => pattern.into_iter().chain(Some(body)).collect(),
            Node::Cell { row, col, .. } => vec![row, col],
            Node::Tile { target, .. } | Node::Board { target, .. } => vec![target],
        }
    }

    /// Check if the node is the outermost part of a reference
    pub fn is_reference(&self) -> bool {
        matches!(self, Node::Cell { .. } | Node::Tile { .. } | Node::Board { .. })
    }
}

/// A parsed formula: source text, the three arenas and the root node
#[derive(Debug, Clone, PartialEq)]
pub struct Formula {
    pub(crate) source: String,
    pub(crate) tokens: Vec<Token>,
    pub(crate) nodes: Vec<Node>,
    pub(crate) values: Vec<Value>,
    pub(crate) root: NodeId,
}

impl Formula {
    pub fn source(&self) -> &str {
        &self.source
    }

    pub fn root(&self) -> NodeId {
        self.root
    }

    pub fn tokens(&self) -> &[Token] {
        &self.tokens
    }

    pub fn nodes(&self) -> &[Node] {
        &self.nodes
    }

    pub fn values(&self) -> &[Value] {
        &self.values
    }

    /// Elements of a child chain starting at `head`
    pub fn chain(&self, head: Option<NodeId>) -> ChainIter<'_> {
        ChainIter {
            nodes: &self.nodes,
            next: head,
        }
    }

    /// Outermost reference nodes reachable from the root, in source order
    pub fn references(&self) -> Vec<NodeId> {
        let mut found = Vec::new();
        let mut stack = vec![self.root];
        while let Some(id) = stack.pop() {
            let node = &self.nodes[id.index()];
            if node.is_reference() {
                found.push(id);
                continue;
            }
            stack.extend(node.children().into_iter().rev());
        }
        found
    }
}

/// Iterator over the values of an [`Node::Item`] chain
pub struct ChainIter<'a> {
    nodes: &'a [Node],
    next: Option<NodeId>,
}

impl Iterator for ChainIter<'_> {
    type Item = NodeId;

    fn next(&mut self) -> Option<NodeId> {
        let id = self.next?;
        match self.nodes.get(id.index()) {
            Some(Node::Item { value, next }) => {
                self.next = *next;
                Some(*value)
            }
            _ => {
                self.next = None;
                None
            }
        }
    }
}
