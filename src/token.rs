//! Tokens handed over by the external lexer.
//!
//! The lexer is a separate process. It writes its output as a flat text
//! stream in which each token is rendered as `KIND` or `KIND(payload)` and
//! consecutive tokens are separated by [`DELIMITER`]. Payloads may span
//! several lines and may themselves contain parentheses (a `COMMAND` body
//! usually does), so everything between the first `(` and the last `)` of a
//! token belongs to the payload.

use std::fmt;
use std::str::FromStr;

use crate::error::{CanfigError, Result};

/// Separator between two tokens in the lexer output.
pub const DELIMITER: &str = "[_!]";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TokenKind {
    // tags
    Version,
    MinSup,
    Author,
    Description,
    Log,
    Doc,
    Help,
    // punctuation
    Semi,
    LParen,
    RParen,
    LCBrace,
    RCBrace,
    // structural markers
    Struct,
    Config,
    Trigger,
    Slice,
    List,
    Tricond,
    // content carriers
    String,
    Ident,
    Command,
    Argument,
    PyArg,
    Eof,
}

impl TokenKind {
    pub const ALL: [TokenKind; 24] = [
        TokenKind::Version,
        TokenKind::MinSup,
        TokenKind::Author,
        TokenKind::Description,
        TokenKind::Log,
        TokenKind::Doc,
        TokenKind::Help,
        TokenKind::Semi,
        TokenKind::LParen,
        TokenKind::RParen,
        TokenKind::LCBrace,
        TokenKind::RCBrace,
        TokenKind::Struct,
        TokenKind::Config,
        TokenKind::Trigger,
        TokenKind::Slice,
        TokenKind::List,
        TokenKind::Tricond,
        TokenKind::String,
        TokenKind::Ident,
        TokenKind::Command,
        TokenKind::Argument,
        TokenKind::PyArg,
        TokenKind::Eof,
    ];

    /// The name used by the lexer and as metadata key for tags.
    pub fn name(&self) -> &'static str {
        match self {
            TokenKind::Version => "VERSION",
            TokenKind::MinSup => "MIN_SUP",
            TokenKind::Author => "AUTHOR",
            TokenKind::Description => "DESCRIPTION",
            TokenKind::Log => "LOG",
            TokenKind::Doc => "DOC",
            TokenKind::Help => "HELP",
            TokenKind::Semi => "SEMI",
            TokenKind::LParen => "LPAREN",
            TokenKind::RParen => "RPAREN",
            TokenKind::LCBrace => "LCBRACE",
            TokenKind::RCBrace => "RCBRACE",
            TokenKind::Struct => "STRUCT",
            TokenKind::Config => "CONFIG",
            TokenKind::Trigger => "TRIGGER",
            TokenKind::Slice => "SLICE",
            TokenKind::List => "LIST",
            TokenKind::Tricond => "TRICOND",
            TokenKind::String => "STRING",
            TokenKind::Ident => "IDENT",
            TokenKind::Command => "COMMAND",
            TokenKind::Argument => "ARGUMENT",
            TokenKind::PyArg => "PYARG",
            TokenKind::Eof => "EOF",
        }
    }

    /// Metadata tags are recorded as `metadata[tag] = string`.
    pub fn is_tag(&self) -> bool {
        matches!(
            self,
            TokenKind::Version
                | TokenKind::MinSup
                | TokenKind::Author
                | TokenKind::Description
                | TokenKind::Log
                | TokenKind::Doc
                | TokenKind::Help
        )
    }

    pub fn requires_payload(&self) -> bool {
        matches!(
            self,
            TokenKind::String | TokenKind::Ident | TokenKind::Command | TokenKind::Argument
        )
    }
}

impl fmt::Display for TokenKind {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

impl FromStr for TokenKind {
    type Err = CanfigError;
    fn from_str(s: &str) -> Result<Self> {
        TokenKind::ALL
            .iter()
            .find(|kind| kind.name() == s)
            .copied()
            .ok_or_else(|| CanfigError::TokenStream(format!("unknown token kind '{}'", s)))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Token {
    kind: TokenKind,
    payload: Option<String>,
}

impl Token {
    pub fn new(kind: TokenKind, payload: Option<String>) -> Result<Self> {
        if kind.requires_payload() && payload.is_none() {
            return Err(CanfigError::TokenStream(format!(
                "token {} requires a string value",
                kind
            )));
        }
        Ok(Self { kind, payload })
    }
    /// A token without payload. Kinds that need one are rejected.
    pub fn bare(kind: TokenKind) -> Result<Self> {
        Self::new(kind, None)
    }
    pub fn with(kind: TokenKind, payload: impl Into<String>) -> Self {
        Self { kind, payload: Some(payload.into()) }
    }
    pub fn kind(&self) -> TokenKind {
        self.kind
    }
    pub fn payload(&self) -> Option<&str> {
        self.payload.as_deref()
    }
}

impl fmt::Display for Token {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match &self.payload {
            Some(payload) => write!(f, "{}({})", self.kind, payload),
            None => write!(f, "{}", self.kind),
        }
    }
}

/// Reads the lexer output into tokens.
pub fn read_stream(text: &str) -> Result<Vec<Token>> {
    let mut tokens = Vec::new();
    for piece in text.split(DELIMITER) {
        let piece = piece.trim();
        if piece.is_empty() {
            continue;
        }
        let token = match piece.find('(') {
            Some(open) if piece.ends_with(')') => {
                let kind = piece[..open].trim().parse::<TokenKind>()?;
                Token::new(kind, Some(piece[open + 1..piece.len() - 1].to_string()))?
            }
            _ => Token::bare(piece.parse::<TokenKind>()?)?,
        };
        tokens.push(token);
    }
    Ok(tokens)
}

/// Renders tokens back into the lexer output format.
pub fn write_stream(tokens: &[Token]) -> String {
    tokens
        .iter()
        .map(|t| t.to_string())
        .collect::<Vec<_>>()
        .join(DELIMITER)
}
