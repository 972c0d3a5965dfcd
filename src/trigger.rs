//! Triggers validate a write after it has been performed and may veto it.
//!
//! A trigger body is a small statement language, see `trigger.pest`. It has
//! no access to anything but the capabilities listed in [`Capability`]:
//!
//! ```text
//! # port must not collide with the admin port
//! let port = GET("Server.port")[0].port;
//! if port == GET("Admin.port")[0].port {
//!     CANFIG_ERR("port is taken by the admin interface");
//! }
//! return ASSERT_REGEX(GET("Server.name")[0].name, "[a-z]+");
//! ```
//!
//! A trigger fails when it calls `CANFIG_ERR`, when it returns `false`, or
//! when it returns a string, which is taken to describe the violation.

use std::collections::HashMap;
use std::hash::BuildHasherDefault;

use pest::iterators::Pair;
use pest::Parser;
use pest_derive::Parser;
use regex::Regex;
use seahash::SeaHasher;
use serde_json::{Number, Value};
use tracing::{debug, warn};

use crate::declaration::TriggerDecl;
use crate::error::{CanfigError, Result};

#[derive(Parser)]
#[grammar = "trigger.pest"]
struct TriggerParser;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Capability {
    Get,
    Set,
    Err,
    Warn,
    AssertRegex,
    AssertEqual,
    AssertUnique,
}

impl Capability {
    pub fn from_name(name: &str) -> Option<Capability> {
        Some(match name {
            "GET" => Capability::Get,
            "SET" => Capability::Set,
            "CANFIG_ERR" => Capability::Err,
            "CANFIG_WARN" => Capability::Warn,
            "ASSERT_REGEX" => Capability::AssertRegex,
            "ASSERT_EQUAL" => Capability::AssertEqual,
            "ASSERT_UNIQUE" => Capability::AssertUnique,
            _ => return None,
        })
    }
    pub fn name(&self) -> &'static str {
        match self {
            Capability::Get => "GET",
            Capability::Set => "SET",
            Capability::Err => "CANFIG_ERR",
            Capability::Warn => "CANFIG_WARN",
            Capability::AssertRegex => "ASSERT_REGEX",
            Capability::AssertEqual => "ASSERT_EQUAL",
            Capability::AssertUnique => "ASSERT_UNIQUE",
        }
    }
    fn arity(&self) -> (usize, usize) {
        match self {
            Capability::Get | Capability::Err | Capability::Warn => (1, 1),
            Capability::Set | Capability::AssertRegex | Capability::AssertEqual => (2, 2),
            Capability::AssertUnique => (1, 2),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompareOp {
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    Literal(Value),
    Var(String),
    Not(Box<Expr>),
    Compare(Box<Expr>, CompareOp, Box<Expr>),
    Index(Box<Expr>, Box<Expr>),
    Member(Box<Expr>, String),
    Call(Capability, Vec<Expr>),
}

#[derive(Debug, Clone, PartialEq)]
pub enum Stmt {
    Let(String, Expr),
    If(Expr, Vec<Stmt>, Vec<Stmt>),
    Return(Option<Expr>),
    Expr(Expr),
}

/// What a trigger body can reach outside of itself.
pub trait Capabilities {
    /// Current rows of `config.field`.
    fn get(&self, path: &str) -> Result<Value>;
    /// Binds and executes `config.field`.
    fn set(&self, path: &str, value: &Value) -> Result<()>;
}

#[derive(Debug)]
pub struct Trigger {
    name: String,
    condition: String,
    program: Vec<Stmt>,
}

impl Trigger {
    /// Parses the body of a declared trigger.
    pub fn compile(declaration: &TriggerDecl) -> Result<Trigger> {
        let program = parse_program(&declaration.code).map_err(|e| {
            CanfigError::Compile(format!("trigger '{}' does not parse: {}", declaration.name, e))
        })?;
        Ok(Trigger {
            name: declaration.name.clone(),
            condition: declaration.condition.clone(),
            program,
        })
    }
    pub fn name(&self) -> &str {
        &self.name
    }
    /// The config whose fields this trigger watches.
    pub fn condition(&self) -> &str {
        &self.condition
    }
    pub fn program(&self) -> &[Stmt] {
        &self.program
    }

    pub fn run(&self, host: &dyn Capabilities) -> Result<()> {
        let mut frame = Frame {
            trigger: self,
            host,
            variables: Variables::default(),
        };
        match frame.block(&self.program)? {
            Flow::Return(Value::Bool(false)) => Err(self.fault("returned false")),
            Flow::Return(Value::String(reason)) => Err(self.fault(reason)),
            _ => {
                debug!(trigger = %self.name, "passed");
                Ok(())
            }
        }
    }

    fn fault(&self, reason: impl Into<String>) -> CanfigError {
        CanfigError::Trigger {
            trigger: self.name.clone(),
            reason: reason.into(),
        }
    }
}

// ------------- Parsing -------------
type Parsed<T> = std::result::Result<T, String>;

pub fn parse_program(code: &str) -> Parsed<Vec<Stmt>> {
    let mut pairs = TriggerParser::parse(Rule::program, code).map_err(|e| e.to_string())?;
    let Some(program) = pairs.next() else {
        return Ok(Vec::new());
    };
    program
        .into_inner()
        .filter(|p| p.as_rule() != Rule::EOI)
        .map(statement)
        .collect()
}

// keywords are atomic so that `letter` is not `let ter`, but carry nothing
fn significant(pair: Pair<'_, Rule>) -> impl Iterator<Item = Pair<'_, Rule>> {
    pair.into_inner()
        .filter(|p| !matches!(p.as_rule(), Rule::kw_let | Rule::kw_if | Rule::kw_else | Rule::kw_return))
}

fn statement(pair: Pair<'_, Rule>) -> Parsed<Stmt> {
    let rule = pair.as_rule();
    let mut inner = significant(pair);
    let mut next = || inner.next().ok_or_else(|| format!("incomplete {:?}", rule));
    match rule {
        Rule::let_stmt => {
            let name = next()?.as_str().to_string();
            Ok(Stmt::Let(name, expression(next()?)?))
        }
        Rule::if_stmt => {
            let condition = expression(next()?)?;
            let then = block(next()?)?;
            let otherwise = match inner.next() {
                Some(p) if p.as_rule() == Rule::if_stmt => vec![statement(p)?],
                Some(p) => block(p)?,
                None => Vec::new(),
            };
            Ok(Stmt::If(condition, then, otherwise))
        }
        Rule::return_stmt => Ok(Stmt::Return(inner.next().map(expression).transpose()?)),
        Rule::expr_stmt => Ok(Stmt::Expr(expression(next()?)?)),
        other => Err(format!("unexpected {:?}", other)),
    }
}

fn block(pair: Pair<'_, Rule>) -> Parsed<Vec<Stmt>> {
    pair.into_inner().map(statement).collect()
}

fn expression(pair: Pair<'_, Rule>) -> Parsed<Expr> {
    match pair.as_rule() {
        Rule::expr => {
            let mut inner = pair.into_inner();
            let left = inner.next().ok_or("empty expression")?;
            let left = expression(left)?;
            match (inner.next(), inner.next()) {
                (Some(op), Some(right)) => {
                    let op = match op.as_str() {
                        "==" => CompareOp::Eq,
                        "!=" => CompareOp::Ne,
                        "<" => CompareOp::Lt,
                        "<=" => CompareOp::Le,
                        ">" => CompareOp::Gt,
                        _ => CompareOp::Ge,
                    };
                    Ok(Expr::Compare(Box::new(left), op, Box::new(expression(right)?)))
                }
                _ => Ok(left),
            }
        }
        Rule::unary => {
            let mut nots = 0;
            let mut operand = None;
            for p in pair.into_inner() {
                match p.as_rule() {
                    Rule::not => nots += 1,
                    _ => operand = Some(expression(p)?),
                }
            }
            let mut expr = operand.ok_or("missing operand")?;
            for _ in 0..nots {
                expr = Expr::Not(Box::new(expr));
            }
            Ok(expr)
        }
        Rule::postfix => {
            let mut inner = pair.into_inner();
            let mut expr = expression(inner.next().ok_or("missing operand")?)?;
            for p in inner {
                expr = match p.as_rule() {
                    Rule::index => {
                        let index = p.into_inner().next().ok_or("empty index")?;
                        Expr::Index(Box::new(expr), Box::new(expression(index)?))
                    }
                    _ => {
                        let name = p.into_inner().next().ok_or("empty member")?;
                        Expr::Member(Box::new(expr), name.as_str().to_string())
                    }
                };
            }
            Ok(expr)
        }
        Rule::call => {
            let mut inner = pair.into_inner();
            let name = inner.next().ok_or("missing capability")?.as_str();
            let capability = Capability::from_name(name).ok_or_else(|| format!("unknown capability {}", name))?;
            let arguments = inner.map(expression).collect::<Parsed<Vec<_>>>()?;
            let (min, max) = capability.arity();
            if arguments.len() < min || arguments.len() > max {
                return Err(format!("{} takes {} argument(s), got {}", name, max, arguments.len()));
            }
            Ok(Expr::Call(capability, arguments))
        }
        Rule::string => {
            let inner = pair.into_inner().next().map(|p| p.as_str()).unwrap_or_default();
            Ok(Expr::Literal(Value::String(unescape(inner))))
        }
        Rule::number => {
            let text = pair.as_str();
            let value = match text.parse::<i64>() {
                Ok(i) => Value::from(i),
                Err(_) => text
                    .parse::<f64>()
                    .ok()
                    .and_then(Number::from_f64)
                    .map(Value::Number)
                    .ok_or_else(|| format!("invalid number {}", text))?,
            };
            Ok(Expr::Literal(value))
        }
        Rule::boolean => Ok(Expr::Literal(Value::Bool(pair.as_str() == "true"))),
        Rule::null => Ok(Expr::Literal(Value::Null)),
        Rule::ident => Ok(Expr::Var(pair.as_str().to_string())),
        other => Err(format!("unexpected {:?}", other)),
    }
}

// Unknown escapes are kept, so that regular expressions read naturally.
fn unescape(raw: &str) -> String {
    let mut text = String::with_capacity(raw.len());
    let mut chars = raw.chars();
    while let Some(c) = chars.next() {
        if c != '\\' {
            text.push(c);
            continue;
        }
        match chars.next() {
            Some('n') => text.push('\n'),
            Some('t') => text.push('\t'),
            Some('r') => text.push('\r'),
            Some(e @ ('"' | '\\')) => text.push(e),
            Some(other) => {
                text.push('\\');
                text.push(other);
            }
            None => text.push('\\'),
        }
    }
    text
}

// ------------- Evaluation -------------
type Variables = HashMap<String, Value, BuildHasherDefault<SeaHasher>>;

static NULL: Value = Value::Null;

enum Flow {
    Next,
    Return(Value),
}

struct Frame<'t> {
    trigger: &'t Trigger,
    host: &'t dyn Capabilities,
    variables: Variables,
}

impl Frame<'_> {
    fn block(&mut self, statements: &[Stmt]) -> Result<Flow> {
        for statement in statements {
            match statement {
                Stmt::Let(name, expr) => {
                    let value = self.eval(expr)?;
                    self.variables.insert(name.clone(), value);
                }
                Stmt::If(condition, then, otherwise) => {
                    let branch = if truthy(&self.eval(condition)?) { then } else { otherwise };
                    if let Flow::Return(value) = self.block(branch)? {
                        return Ok(Flow::Return(value));
                    }
                }
                Stmt::Return(expr) => {
                    let value = match expr {
                        Some(expr) => self.eval(expr)?,
                        None => Value::Null,
                    };
                    return Ok(Flow::Return(value));
                }
                Stmt::Expr(expr) => {
                    self.eval(expr)?;
                }
            }
        }
        Ok(Flow::Next)
    }

    fn eval(&mut self, expr: &Expr) -> Result<Value> {
        match expr {
            Expr::Literal(value) => Ok(value.clone()),
            Expr::Var(name) => self
                .variables
                .get(name)
                .cloned()
                .ok_or_else(|| self.trigger.fault(format!("'{}' is not defined", name))),
            Expr::Not(inner) => Ok(Value::Bool(!truthy(&self.eval(inner)?))),
            Expr::Compare(left, op, right) => {
                let left = self.eval(left)?;
                let right = self.eval(right)?;
                self.compare(&left, *op, &right).map(Value::Bool)
            }
            Expr::Index(target, index) => {
                let target = self.eval(target)?;
                let index = self.eval(index)?;
                let found = match (&target, &index) {
                    (Value::Array(items), Value::Number(n)) => n.as_u64().and_then(|i| items.get(i as usize)),
                    (Value::Object(fields), Value::String(key)) => fields.get(key),
                    _ => None,
                };
                found
                    .cloned()
                    .ok_or_else(|| self.trigger.fault(format!("{} has no element {}", target, index)))
            }
            Expr::Member(target, name) => {
                let target = self.eval(target)?;
                target
                    .get(name.as_str())
                    .cloned()
                    .ok_or_else(|| self.trigger.fault(format!("{} has no member '{}'", target, name)))
            }
            Expr::Call(capability, arguments) => {
                let values = arguments.iter().map(|a| self.eval(a)).collect::<Result<Vec<_>>>()?;
                self.call(*capability, &values)
            }
        }
    }

    fn call(&self, capability: Capability, arguments: &[Value]) -> Result<Value> {
        let argument = |i: usize| arguments.get(i).unwrap_or(&NULL);
        match capability {
            Capability::Get => {
                let path = self.path(argument(0))?;
                self.host.get(path).map_err(|e| self.lookup(e))
            }
            Capability::Set => {
                let path = self.path(argument(0))?;
                self.host.set(path, argument(1)).map_err(|e| self.lookup(e))?;
                Ok(Value::Null)
            }
            Capability::Err => Err(self.trigger.fault(text(argument(0)))),
            Capability::Warn => {
                warn!(trigger = %self.trigger.name, "{}", text(argument(0)));
                Ok(Value::Null)
            }
            Capability::AssertRegex => {
                let target = argument(0);
                if !truthy(target) {
                    return Ok(Value::Null);
                }
                let Value::String(pattern) = argument(1) else {
                    return Err(self.trigger.fault("ASSERT_REGEX needs a string pattern"));
                };
                // anchored at the start only
                let regex = Regex::new(&format!("^(?:{})", pattern))
                    .map_err(|e| self.trigger.fault(format!("invalid pattern '{}': {}", pattern, e)))?;
                if regex.is_match(&text(target)) {
                    Ok(Value::Null)
                } else {
                    Ok(Value::String(format!(
                        "Value '{}' does not match the pattern '{}'",
                        text(target),
                        pattern
                    )))
                }
            }
            Capability::AssertEqual => Ok(Value::Bool(equal(argument(0), argument(1)))),
            Capability::AssertUnique => {
                let Value::Array(items) = argument(0) else {
                    return Err(self.trigger.fault("ASSERT_UNIQUE needs a list"));
                };
                let key = match arguments.get(1) {
                    None | Some(Value::Null) => None,
                    Some(Value::String(key)) => Some(key.as_str()),
                    Some(other) => return Err(self.trigger.fault(format!("{} is not a member name", other))),
                };
                let mut seen: Vec<&Value> = Vec::new();
                for item in items {
                    let value = match key {
                        Some(key) => item.get(key).unwrap_or(&NULL),
                        None => item,
                    };
                    if seen.iter().any(|s| equal(s, value)) {
                        return Ok(Value::String(format!("Duplicate value found: '{}'", text(value))));
                    }
                    seen.push(value);
                }
                Ok(Value::Null)
            }
        }
    }

    fn compare(&self, left: &Value, op: CompareOp, right: &Value) -> Result<bool> {
        match op {
            CompareOp::Eq => return Ok(equal(left, right)),
            CompareOp::Ne => return Ok(!equal(left, right)),
            _ => {}
        }
        let ordering = match (left, right) {
            (Value::Number(a), Value::Number(b)) => a.as_f64().partial_cmp(&b.as_f64()),
            (Value::String(a), Value::String(b)) => Some(a.cmp(b)),
            _ => None,
        };
        let ordering = ordering.ok_or_else(|| self.trigger.fault(format!("cannot order {} and {}", left, right)))?;
        Ok(match op {
            CompareOp::Lt => ordering.is_lt(),
            CompareOp::Le => ordering.is_le(),
            CompareOp::Gt => ordering.is_gt(),
            _ => ordering.is_ge(),
        })
    }

    fn path<'v>(&self, value: &'v Value) -> Result<&'v str> {
        match value {
            Value::String(path) => Ok(path),
            other => Err(self.trigger.fault(format!("{} is not a field path", other))),
        }
    }

    fn lookup(&self, error: CanfigError) -> CanfigError {
        match error {
            CanfigError::UnknownField(path) => CanfigError::FieldLookup {
                trigger: self.trigger.name.clone(),
                path,
            },
            other => other,
        }
    }
}

fn truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().is_some_and(|x| x != 0.0),
        Value::String(s) => !s.is_empty(),
        Value::Array(items) => !items.is_empty(),
        Value::Object(fields) => !fields.is_empty(),
    }
}

fn equal(left: &Value, right: &Value) -> bool {
    match (left, right) {
        (Value::Number(a), Value::Number(b)) => a.as_f64() == b.as_f64(),
        _ => left == right,
    }
}

fn text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}
