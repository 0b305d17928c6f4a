//! Tokens emitted while parsing
//!
//! Tokens are produced in lock-step with the grammar rules that consume
//! them, so the token arena only ever holds tokens of accepted
//! alternatives.

/// Token category
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u16)]
pub enum TokenTag {
    Number = 1,
    String,
    Ident,
    Keyword,
    Operator,
    OpenParen,
    CloseParen,
    OpenBracket,
    CloseBracket,
    OpenBrace,
    CloseBrace,
    Comma,
    Colon,
    Arrow,
    /// `$ # & @ =` and the leading minus of a relative reference
    Sigil,
    /// Row or column label inside a reference
    Label,
}

/// A span of the source text: 8 bytes, trivially copyable
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Token {
    /// Byte offset of the first character
    pub start: u32,
    pub tag: TokenTag,
    /// Length in bytes
    pub len: u16,
}

const _: () = assert!(std::mem::size_of::<Token>() == 8);

impl Token {
    /// Byte offset one past the last character
    pub fn end(&self) -> usize {
        self.start as usize + self.len as usize
    }
}

/// Index into the token arena
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TokenId(pub u32);

impl TokenId {
    pub fn index(self) -> usize {
        self.0 as usize
    }
}
