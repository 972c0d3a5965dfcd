//! The schema compiler.
//!
//! Structs are compiled first, then configs, each in declaration order. A
//! struct must therefore be declared before anything that refers to it.
//! Compilation is pure: every fault is found before a single statement is
//! run, and the result is a [`CompiledSchema`] that can be installed in a
//! [`Store`] afterwards.
//!
//! Per config field the compiler produces a [`Plan`]:
//! * `field LIST(Item)` becomes a junction table `Item_Config` and a list plan
//! * `field Struct` or `field Template(arg)` becomes a foreign key column and a
//!   reference plan
//! * anything else becomes a column and a scalar plan

use std::collections::HashMap;
use std::hash::BuildHasherDefault;

use lazy_static::lazy_static;
use regex::{NoExpand, Regex};
use seahash::SeaHasher;
use tracing::{debug, info};

use crate::datatype::{coerce_argument, Argument, BuiltinType};
use crate::declaration::{ConfigDecl, Declarations, StructDecl};
use crate::error::{CanfigError, Result};
use crate::field::{parse_body, Body, FieldType, TypeRef};
use crate::plan::{Plan, PlanKind};
use crate::schema::{config_row_statement, instance_name, junction_name, ForeignKey, Table};
use crate::store::Store;

lazy_static! {
    // placeholder:TYPE=default
    static ref ARG_RULE: Regex = Regex::new(r"^\s*(\w+)\s*:\s*(\w+)\s*=\s*(.+?)\s*$").unwrap();
}

type NameMap<V> = HashMap<String, V, BuildHasherDefault<SeaHasher>>;

/// What a resolved name stands for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Resolved {
    Struct,
    Template,
    Instance,
    Builtin,
    Junction,
    Config,
}

/// The argument rule of a parameterized struct.
#[derive(Debug, Clone, PartialEq)]
pub struct ArgRule {
    pub placeholder: String,
    pub ty: String,
    pub default: Argument,
}

impl ArgRule {
    pub fn parse(rule: &str) -> Result<ArgRule> {
        let captures = ARG_RULE
            .captures(rule)
            .ok_or_else(|| CanfigError::Compile(format!("malformed argument rule '{}'", rule)))?;
        let ty = captures[2].to_uppercase();
        let default = coerce_argument(&ty, &captures[3])?;
        Ok(ArgRule {
            placeholder: captures[1].to_string(),
            ty,
            default,
        })
    }
}

#[derive(Debug, Clone)]
struct Template {
    name: String,
    body: String,
    rule: ArgRule,
    placeholder: Regex,
}

impl Template {
    fn new(declaration: &StructDecl, rule: ArgRule) -> Result<Template> {
        let placeholder = Regex::new(&format!(r"\b{}\b", regex::escape(&rule.placeholder)))
            .map_err(|e| CanfigError::Compile(e.to_string()))?;
        Ok(Template {
            name: declaration.name.clone(),
            body: declaration.body.clone(),
            rule,
            placeholder,
        })
    }
    fn substitute(&self, argument: &Argument) -> String {
        self.placeholder
            .replace_all(&self.body, NoExpand(&argument.literal))
            .into_owned()
    }
}

/// Every name known to the compiler, and the tables behind them.
#[derive(Debug, Default)]
pub struct ResolvedSchema {
    names: NameMap<Resolved>,
    tables: NameMap<Table>,
    templates: NameMap<Template>,
}

impl ResolvedSchema {
    pub fn resolved(&self, name: &str) -> Option<Resolved> {
        self.names.get(name).copied()
    }
    pub fn table(&self, name: &str) -> Option<&Table> {
        self.tables.get(name)
    }
    pub fn len(&self) -> usize {
        self.names.len()
    }
    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }
    fn claim(&mut self, name: &str, resolved: Resolved) -> Result<()> {
        if let Some(existing) = self.resolved(name) {
            return Err(CanfigError::Compile(format!(
                "'{}' is already declared ({:?})",
                name, existing
            )));
        }
        self.names.insert(name.to_string(), resolved);
        Ok(())
    }
}

/// Statements that are installed together, in one transaction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SchemaUnit {
    pub name: String,
    pub statements: Vec<String>,
}

#[derive(Debug)]
pub struct CompiledSchema {
    pub units: Vec<SchemaUnit>,
    pub configs: Vec<String>,
    pub plans: Vec<Plan>,
}

impl CompiledSchema {
    /// Creates the tables and config rows, one transaction per unit.
    pub fn install(&self, store: &Store) -> Result<()> {
        for unit in &self.units {
            let transaction = store.transaction()?;
            for statement in &unit.statements {
                store.execute_batch(statement)?;
            }
            transaction.commit()?;
            info!(unit = %unit.name, statements = unit.statements.len(), "installed");
        }
        Ok(())
    }
}

pub fn compile(declarations: &Declarations) -> Result<CompiledSchema> {
    Compiler::new().compile(declarations)
}

#[derive(Debug, Default)]
pub struct Compiler {
    schema: ResolvedSchema,
}

impl Compiler {
    pub fn new() -> Self {
        Self::default()
    }
    pub fn schema(&self) -> &ResolvedSchema {
        &self.schema
    }

    pub fn compile(&mut self, declarations: &Declarations) -> Result<CompiledSchema> {
        let mut compiled = CompiledSchema {
            units: Vec::new(),
            configs: Vec::new(),
            plans: Vec::new(),
        };
        for declaration in &declarations.structs {
            if let Some(unit) = self.compile_struct(declaration)? {
                compiled.units.push(unit);
            }
        }
        for declaration in &declarations.configs {
            let unit = self.compile_config(declaration, &mut compiled.plans)?;
            compiled.units.push(unit);
            compiled.configs.push(declaration.name.clone());
        }
        info!(
            units = compiled.units.len(),
            plans = compiled.plans.len(),
            "schema compiled"
        );
        Ok(compiled)
    }

    fn compile_struct(&mut self, declaration: &StructDecl) -> Result<Option<SchemaUnit>> {
        let name = &declaration.name;
        if BuiltinType::from_name(name).is_some() {
            return Err(CanfigError::Compile(format!("'{}' is a built-in type", name)));
        }
        match &declaration.argument {
            Some(rule) => {
                let rule = ArgRule::parse(rule)?;
                let template = Template::new(declaration, rule)?;
                // the default instantiation must compile
                struct_table(name, &template.substitute(&template.rule.default))?;
                self.schema.claim(name, Resolved::Template)?;
                info!(name = %name, placeholder = %template.rule.placeholder, "evaluated template");
                self.schema.templates.insert(name.clone(), template);
                Ok(None)
            }
            None => {
                let table = struct_table(name, &declaration.body)?;
                self.schema.claim(name, Resolved::Struct)?;
                let unit = SchemaUnit {
                    name: name.clone(),
                    statements: vec![table.create_statement()],
                };
                self.schema.tables.insert(name.clone(), table);
                info!(name = %name, "evaluated struct");
                Ok(Some(unit))
            }
        }
    }

    fn compile_config(&mut self, declaration: &ConfigDecl, plans: &mut Vec<Plan>) -> Result<SchemaUnit> {
        let name = &declaration.name;
        let Body { fields, constraints } = parse_body(name, &declaration.body)?;
        self.schema.claim(name, Resolved::Config)?;

        // tables this config needs first, e.g. instantiations
        let mut prerequisites = Vec::new();
        let mut junctions: Vec<Table> = Vec::new();
        let mut table = Table::new(name.as_str());
        table.constraints = constraints;
        let mut config_plans = Vec::new();

        for field in &fields {
            let kind = match field.classify()? {
                FieldType::List(item) => {
                    let (item, scalar_items) = self
                        .list_item(&item, &mut prerequisites)
                        .map_err(|e| in_field(e, &field.name, name))?;
                    let junction = junction_name(&item.name, name);
                    if junctions.iter().any(|j| j.name == junction) {
                        return Err(CanfigError::Compile(format!(
                            "'{}' has more than one LIST({})",
                            name, item.name
                        )));
                    }
                    self.schema.claim(&junction, Resolved::Junction)?;
                    junctions.push(Table::junction(&item.name, name));
                    PlanKind::ListRelation {
                        table: name.clone(),
                        item,
                        scalar_items,
                    }
                }
                // a declared struct wins over an SQL type word of the same name
                FieldType::Named(type_ref) if self.is_struct(&type_ref.name) || !field.is_sql_typed() => {
                    let target = self
                        .reference(&type_ref, &mut prerequisites)
                        .map_err(|e| in_field(e, &field.name, name))?;
                    table = table.column(field.name.as_str(), "INTEGER");
                    table.foreign_keys.push(ForeignKey {
                        column: field.name.clone(),
                        references: target.name.clone(),
                        on_delete: Some("SET NULL"),
                    });
                    PlanKind::Reference {
                        table: name.clone(),
                        column: field.name.clone(),
                        target,
                    }
                }
                FieldType::Sql if self.is_struct(field.type_word()) => {
                    return Err(CanfigError::Compile(format!(
                        "constraints are not supported on struct reference '{}' (field '{}' of '{}')",
                        field.type_word(),
                        field.name,
                        name
                    )));
                }
                _ if !field.is_sql_typed() => {
                    return Err(CanfigError::Compile(format!(
                        "unresolved struct reference '{}' (field '{}' of '{}')",
                        field.type_word(),
                        field.name,
                        name
                    )));
                }
                _ => {
                    table = table.column(field.name.as_str(), field.ty.as_str());
                    PlanKind::Scalar {
                        table: name.clone(),
                        column: field.name.clone(),
                    }
                }
            };
            debug!(config = %name, field = %field.name, kind = kind.name(), "compiled plan");
            config_plans.push(Plan::new(name.as_str(), field.name.as_str(), kind));
        }

        let mut statements = prerequisites;
        statements.push(table.create_statement());
        statements.extend(junctions.iter().map(Table::create_statement));
        statements.push(config_row_statement(name));
        self.schema.tables.insert(name.clone(), table);
        for junction in junctions {
            self.schema.tables.insert(junction.name.clone(), junction);
        }
        plans.extend(config_plans);
        info!(name = %name, fields = fields.len(), "evaluated config");
        Ok(SchemaUnit {
            name: name.clone(),
            statements,
        })
    }

    fn is_struct(&self, name: &str) -> bool {
        matches!(
            self.schema.resolved(name),
            Some(Resolved::Struct | Resolved::Instance | Resolved::Template)
        )
    }

    /// The table of a `LIST(...)` item, and whether it wraps a built-in type.
    fn list_item(&mut self, item: &TypeRef, prerequisites: &mut Vec<String>) -> Result<(Table, bool)> {
        if let (Some(builtin), None) = (BuiltinType::from_name(&item.name), &item.argument) {
            if let Some(table) = self.schema.table(builtin.name()) {
                return Ok((table.clone(), true));
            }
            let table = Table::builtin_wrapper(builtin.name());
            self.schema.claim(builtin.name(), Resolved::Builtin)?;
            prerequisites.push(table.create_statement());
            self.schema.tables.insert(table.name.clone(), table.clone());
            info!(name = %builtin, "materialized built-in list type");
            return Ok((table, true));
        }
        match self.schema.resolved(&item.name) {
            Some(Resolved::Struct | Resolved::Instance | Resolved::Template) => {
                Ok((self.reference(item, prerequisites)?, false))
            }
            _ => Err(CanfigError::Compile(format!(
                "invalid type '{}' inside LIST, expected a declared struct or one of INTEGER, REAL, TEXT, BLOB",
                item.name
            ))),
        }
    }

    /// Resolves a struct, an instantiation or a template call to its table.
    fn reference(&mut self, target: &TypeRef, prerequisites: &mut Vec<String>) -> Result<Table> {
        let unresolved = || CanfigError::Compile(format!("unresolved struct reference '{}'", target.name));
        match (self.schema.resolved(&target.name), &target.argument) {
            (Some(Resolved::Struct | Resolved::Instance), None) => {
                self.schema.table(&target.name).cloned().ok_or_else(unresolved)
            }
            (Some(Resolved::Struct | Resolved::Instance), Some(_)) => Err(CanfigError::Compile(format!(
                "'{}' is not parameterized",
                target.name
            ))),
            (Some(Resolved::Template), argument) => self.instantiate(&target.name, argument.as_deref(), prerequisites),
            _ => Err(unresolved()),
        }
    }

    fn instantiate(&mut self, template: &str, raw: Option<&str>, prerequisites: &mut Vec<String>) -> Result<Table> {
        let Some(template) = self.schema.templates.get(template) else {
            return Err(CanfigError::Compile(format!("unresolved struct reference '{}'", template)));
        };
        // a bare template name is its default instantiation
        let (name, argument) = match raw {
            Some(raw) => {
                let argument = coerce_argument(&template.rule.ty, raw)?;
                (instance_name(&template.name, &argument.suffix), argument)
            }
            None => (template.name.clone(), template.rule.default.clone()),
        };
        match (raw, self.schema.resolved(&name)) {
            (Some(_), Some(Resolved::Instance)) | (None, Some(Resolved::Template)) => {
                if let Some(table) = self.schema.table(&name) {
                    return Ok(table.clone());
                }
            }
            (Some(_), Some(_)) => {
                return Err(CanfigError::Compile(format!(
                    "instantiation '{}' collides with an existing name",
                    name
                )));
            }
            _ => {}
        }
        let table = struct_table(&name, &template.substitute(&argument))?;
        if raw.is_some() {
            self.schema.claim(&name, Resolved::Instance)?;
        }
        prerequisites.push(table.create_statement());
        self.schema.tables.insert(name.clone(), table.clone());
        info!(name = %name, argument = %argument.literal, "materialized instantiation");
        Ok(table)
    }
}

fn in_field(error: CanfigError, field: &str, config: &str) -> CanfigError {
    match error {
        CanfigError::Compile(reason) => {
            CanfigError::Compile(format!("{} (field '{}' of '{}')", reason, field, config))
        }
        other => other,
    }
}

/// The table of a plain struct or of an instantiation.
fn struct_table(name: &str, body: &str) -> Result<Table> {
    let Body { fields, constraints } = parse_body(name, body)?;
    if fields.is_empty() {
        return Err(CanfigError::Compile(format!("struct '{}' declares no fields", name)));
    }
    let mut table = Table::new(name);
    for field in fields {
        if !field.is_sql_typed() {
            return Err(CanfigError::Compile(format!(
                "field '{}' of struct '{}' has type '{}', struct fields must have SQL types",
                field.name,
                name,
                field.type_word()
            )));
        }
        table = table.column(field.name, field.ty);
    }
    table.constraints = constraints;
    Ok(table)
}
