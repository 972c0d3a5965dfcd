// Declarations are what the parser emits and what the compiled artifact
// carries. They are immutable once produced.
use serde::{Deserialize, Serialize};

/// `STRUCT Name { body };` or `STRUCT Name(arg:type=default) { body };`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StructDecl {
    pub name: String,
    pub body: String,
    /// Raw `placeholder:type=default` rule of a parameterized struct.
    pub argument: Option<String>,
}
impl StructDecl {
    pub fn is_parameterized(&self) -> bool {
        self.argument.is_some()
    }
}

/// `CONFIG Name { field TYPE, ... };`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConfigDecl {
    pub name: String,
    pub body: String,
}

/// `TRIGGER name WHEN CHANGE Config { code };`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TriggerDecl {
    pub name: String,
    pub condition: String,
    pub code: String,
}

/// `SLICE name { command };`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SliceDecl {
    pub name: String,
    pub command: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Declaration {
    Struct(StructDecl),
    Config(ConfigDecl),
    Trigger(TriggerDecl),
    Slice(SliceDecl),
}

/// Declarations grouped by kind, each group in source order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Declarations {
    pub structs: Vec<StructDecl>,
    pub configs: Vec<ConfigDecl>,
    pub triggers: Vec<TriggerDecl>,
    pub slices: Vec<SliceDecl>,
}
impl Declarations {
    pub fn new() -> Self {
        Self::default()
    }
    pub fn push(&mut self, declaration: Declaration) {
        match declaration {
            Declaration::Struct(d) => self.structs.push(d),
            Declaration::Config(d) => self.configs.push(d),
            Declaration::Trigger(d) => self.triggers.push(d),
            Declaration::Slice(d) => self.slices.push(d),
        }
    }
    pub fn len(&self) -> usize {
        self.structs.len() + self.configs.len() + self.triggers.len() + self.slices.len()
    }
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
