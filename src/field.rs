//! Structured reading of struct and config bodies.
//!
//! A body is a list of entries separated by commas or line breaks at
//! parenthesis depth zero. An entry is either a field, `name TYPE ...`, or a
//! table constraint starting with one of the SQL constraint keywords.

use regex::Regex;
use lazy_static::lazy_static;

use crate::datatype::is_sql_type_word;
use crate::error::{CanfigError, Result};
use crate::schema::primary_key;

lazy_static! {
    static ref TYPE_REF: Regex = Regex::new(r"(?s)^(\w+)\s*(?:\((.*)\))?$").unwrap();
    static ref IDENTIFIER: Regex = Regex::new(r"^[A-Za-z_]\w*$").unwrap();
}

const CONSTRAINT_WORDS: &[&str] = &["CONSTRAINT", "UNIQUE", "CHECK", "PRIMARY", "FOREIGN"];

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldDef {
    pub name: String,
    /// Everything after the name, verbatim.
    pub ty: String,
}

/// `Name` or `Name(argument)`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TypeRef {
    pub name: String,
    pub argument: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FieldType {
    /// `LIST(item)`
    List(TypeRef),
    /// A bare or call-syntax name, resolved by the compiler.
    Named(TypeRef),
    /// Any other column type text.
    Sql,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Body {
    pub fields: Vec<FieldDef>,
    pub constraints: Vec<String>,
}

impl TypeRef {
    pub fn parse(text: &str) -> Option<TypeRef> {
        let captures = TYPE_REF.captures(text.trim())?;
        Some(TypeRef {
            name: captures[1].to_string(),
            argument: captures.get(2).map(|m| m.as_str().to_string()),
        })
    }
}

impl FieldDef {
    pub fn classify(&self) -> Result<FieldType> {
        let Some(type_ref) = TypeRef::parse(&self.ty) else {
            return Ok(FieldType::Sql);
        };
        if !type_ref.name.eq_ignore_ascii_case("LIST") {
            return Ok(FieldType::Named(type_ref));
        }
        type_ref
            .argument
            .as_deref()
            .and_then(TypeRef::parse)
            .map(FieldType::List)
            .ok_or_else(|| CanfigError::Compile(format!("invalid type {} for field '{}'", self.ty, self.name)))
    }

    /// The first word of the type, e.g. `INTEGER` in `INTEGER NOT NULL`.
    pub fn type_word(&self) -> &str {
        let end = self
            .ty
            .find(|c: char| !(c.is_alphanumeric() || c == '_'))
            .unwrap_or(self.ty.len());
        &self.ty[..end]
    }

    pub fn is_sql_typed(&self) -> bool {
        is_sql_type_word(self.type_word())
    }
}

fn split_entries(body: &str) -> Vec<String> {
    let mut entries = Vec::new();
    let mut current = String::new();
    let mut depth = 0usize;
    let mut quote: Option<char> = None;
    for c in body.chars() {
        match (quote, c) {
            (Some(q), c) if c == q => quote = None,
            (Some(_), _) => {}
            (None, '\'' | '"') => quote = Some(c),
            (None, '(') => depth += 1,
            (None, ')') => depth = depth.saturating_sub(1),
            (None, ',' | '\n' | ';') if depth == 0 => {
                entries.push(std::mem::take(&mut current));
                continue;
            }
            _ => {}
        }
        current.push(c);
    }
    entries.push(current);
    entries
        .into_iter()
        .map(|e| e.split_whitespace().collect::<Vec<_>>().join(" "))
        .filter(|e| !e.is_empty())
        .collect()
}

/// Reads the body declared for `owner`.
pub fn parse_body(owner: &str, body: &str) -> Result<Body> {
    let mut parsed = Body::default();
    for entry in split_entries(body) {
        let (name, rest) = match entry.split_once(|c: char| c.is_whitespace() || c == '(') {
            Some((name, _)) => (name, entry[name.len()..].trim()),
            None => (entry.as_str(), ""),
        };
        if CONSTRAINT_WORDS.iter().any(|w| w.eq_ignore_ascii_case(name)) {
            parsed.constraints.push(entry.clone());
            continue;
        }
        if !IDENTIFIER.is_match(name) {
            return Err(CanfigError::Compile(format!("'{}' in '{}' is not a field name", name, owner)));
        }
        if rest.is_empty() {
            return Err(CanfigError::Compile(format!("field '{}' of '{}' has no type", name, owner)));
        }
        if name == primary_key(owner) {
            return Err(CanfigError::Compile(format!("field '{}' of '{}' is reserved for the identifier", name, owner)));
        }
        if parsed.fields.iter().any(|f| f.name == name) {
            return Err(CanfigError::Compile(format!("duplicate field '{}' in '{}'", name, owner)));
        }
        parsed.fields.push(FieldDef { name: name.to_string(), ty: rest.to_string() });
    }
    Ok(parsed)
}
