//! The parser is a finite-state machine with actions on its transitions.
//!
//! Tokens are fed one at a time. The pair `(current state, incoming token
//! kind)` selects a row of [`transition`], which names the next state and the
//! [`Action`] to perform. Actions fill a handful of scratch buffers (the
//! declared identifier, a struct argument, a body) and the buffers are turned
//! into a [`Declaration`] when the statement terminator `SEMI` arrives. The
//! buffers are cleared after every `SEMI`, so one parser handles any number
//! of statements.

use std::collections::BTreeMap;
use std::fmt;
use std::mem;

use tracing::trace;

use crate::declaration::{ConfigDecl, Declaration, Declarations, SliceDecl, StructDecl, TriggerDecl};
use crate::error::{CanfigError, Result};
use crate::token::{Token, TokenKind};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum State {
    Start,
    Error,
    /// A tag followed by its string value.
    PushKv,
    /// A body that completes a struct, config, trigger or slice.
    Sql,
    /// The body of a parameterized struct.
    PreSql,
    /// Reached by a token of this kind.
    At(TokenKind),
}

impl fmt::Display for State {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            State::Start => write!(f, "start"),
            State::Error => write!(f, "error"),
            State::PushKv => write!(f, "push_kv"),
            State::Sql => write!(f, "sql"),
            State::PreSql => write!(f, "pre_sql"),
            State::At(kind) => write!(f, "{}", kind),
        }
    }
}

/// The kind of statement currently being handled.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Handling {
    Struct,
    Config,
    Trigger,
    Slice,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    Nothing,
    PushKv(TokenKind),
    Declare(Handling),
    SecondIdent,
    Argument,
    When,
    Condition,
    Body,
    Emit,
    Reject,
}

/// The transition table.
pub fn transition(state: State, kind: TokenKind) -> (State, Action) {
    use TokenKind as K;
    match (state, kind) {
        (State::Error, _) | (State::At(K::Eof), _) => (State::Error, Action::Reject),
        (_, K::Semi) => (State::Start, Action::Emit),
        (State::Start, kind) => (State::At(kind), Action::Nothing),
        (State::At(tag), K::String) if tag.is_tag() => (State::PushKv, Action::PushKv(tag)),
        (State::At(K::Struct), K::Ident) => (State::At(K::Ident), Action::Declare(Handling::Struct)),
        (State::At(K::Config), K::Ident) => (State::At(K::Ident), Action::Declare(Handling::Config)),
        (State::At(K::Trigger), K::Ident) => (State::At(K::Ident), Action::Declare(Handling::Trigger)),
        (State::At(K::Slice), K::Ident) => (State::At(K::Ident), Action::Declare(Handling::Slice)),
        (State::At(K::Ident), K::Ident) => (State::At(K::Ident), Action::SecondIdent),
        (State::At(K::Ident), K::Argument) => (State::At(K::Argument), Action::Argument),
        (State::At(K::Ident), K::Tricond) => (State::At(K::Tricond), Action::When),
        (State::At(K::Tricond), K::Ident) => (State::At(K::Ident), Action::Condition),
        (State::At(K::Ident), K::Command) | (State::At(K::Tricond), K::Command) => {
            (State::Sql, Action::Body)
        }
        (State::At(K::Argument), K::Command) => (State::PreSql, Action::Body),
        _ => (State::Error, Action::Reject),
    }
}

/// The result of a successful parse.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Parsed {
    pub metadata: BTreeMap<String, String>,
    pub declarations: Declarations,
}

#[derive(Debug)]
pub struct Parser {
    state: State,
    handling: Option<Handling>,
    // `name` or, for triggers, `name|condition`
    ident: String,
    argument: Option<String>,
    body: Option<String>,
    parsed: Parsed,
}

impl Default for Parser {
    fn default() -> Self {
        Self::new()
    }
}

impl Parser {
    pub fn new() -> Self {
        Self {
            state: State::Start,
            handling: None,
            ident: String::new(),
            argument: None,
            body: None,
            parsed: Parsed::default(),
        }
    }

    /// Parses a complete token stream, which must end with `EOF`.
    pub fn parse(tokens: &[Token]) -> Result<Parsed> {
        let mut parser = Parser::new();
        for token in tokens {
            parser.feed(token)?;
        }
        parser.finish()
    }

    pub fn state(&self) -> State {
        self.state
    }

    pub fn feed(&mut self, token: &Token) -> Result<()> {
        let from = self.state;
        let (to, action) = transition(from, token.kind());
        trace!(%from, %to, token = %token.kind(), "transition");
        let payload = token.payload().unwrap_or_default();
        if let Err(message) = self.perform(action, token.kind(), payload) {
            self.state = State::Error;
            return Err(CanfigError::Parse { state: from, message });
        }
        self.state = to;
        Ok(())
    }

    pub fn finish(mut self) -> Result<Parsed> {
        if self.state != State::At(TokenKind::Eof) {
            return Err(CanfigError::Parse {
                state: self.state,
                message: "token stream ended without EOF".to_string(),
            });
        }
        Ok(mem::take(&mut self.parsed))
    }

    fn perform(&mut self, action: Action, kind: TokenKind, payload: &str) -> std::result::Result<(), String> {
        match action {
            Action::Nothing => {}
            Action::PushKv(tag) => {
                self.parsed.metadata.insert(tag.name().to_string(), payload.to_string());
            }
            Action::Declare(handling) => {
                self.handling = Some(handling);
                self.ident = payload.to_string();
            }
            Action::SecondIdent => {
                // STRUCT Name TYPE; is a single column struct
                if self.handling != Some(Handling::Struct) || self.body.is_some() || self.argument.is_some() {
                    return Err("identifier cannot follow identifier".to_string());
                }
                self.body = Some(format!("{} {}", self.ident, payload));
            }
            Action::Argument => {
                if self.handling != Some(Handling::Struct) || self.body.is_some() {
                    return Err("only STRUCT can have an argument".to_string());
                }
                self.argument = Some(payload.to_string());
            }
            Action::When => {
                if self.handling != Some(Handling::Trigger) {
                    return Err("'WHEN CHANGE' can only be used with TRIGGER".to_string());
                }
                if !payload.is_empty() {
                    self.append_condition(payload)?;
                }
            }
            Action::Condition => {
                if self.handling != Some(Handling::Trigger) {
                    return Err("'WHEN CHANGE' can only be used with TRIGGER".to_string());
                }
                self.append_condition(payload)?;
            }
            Action::Body => {
                if self.handling.is_none() {
                    return Err("command needs to be preceded by a declared identifier".to_string());
                }
                if self.body.is_some() {
                    return Err(format!("'{}' already has a body", self.ident));
                }
                self.body = Some(payload.to_string());
            }
            Action::Emit => {
                let emitted = self.emit();
                self.clear();
                if let Some(declaration) = emitted? {
                    self.parsed.declarations.push(declaration);
                }
            }
            Action::Reject => {
                return Err(format!("unexpected {} token", kind));
            }
        }
        Ok(())
    }

    fn append_condition(&mut self, condition: &str) -> std::result::Result<(), String> {
        if self.ident.contains('|') {
            return Err(format!("trigger '{}' already has a condition", self.ident));
        }
        self.ident.push('|');
        self.ident.push_str(condition.trim());
        Ok(())
    }

    fn emit(&mut self) -> std::result::Result<Option<Declaration>, String> {
        let Some(handling) = self.handling else {
            return Ok(None);
        };
        let Some(body) = self.body.take() else {
            return Err(format!("'{}' has no body", self.ident));
        };
        let name = mem::take(&mut self.ident);
        let declaration = match handling {
            Handling::Struct => Declaration::Struct(StructDecl {
                name,
                body,
                argument: self.argument.take(),
            }),
            Handling::Config => Declaration::Config(ConfigDecl { name, body }),
            Handling::Trigger => {
                let Some((trigger, condition)) = name.split_once('|') else {
                    return Err(format!("trigger '{}' has no WHEN CHANGE condition", name));
                };
                Declaration::Trigger(TriggerDecl {
                    name: trigger.to_string(),
                    condition: condition.to_string(),
                    code: body,
                })
            }
            Handling::Slice => Declaration::Slice(SliceDecl { name, command: body }),
        };
        Ok(Some(declaration))
    }

    fn clear(&mut self) {
        self.handling = None;
        self.ident.clear();
        self.argument = None;
        self.body = None;
    }
}
