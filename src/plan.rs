//! Per-field read/write plans.
//!
//! A [`Plan`] is compiled once for every `(config, field)` pair. Binding a
//! value builds the ordered write steps and the read step for that value;
//! executing runs the write steps inside one transaction and then lets every
//! registered trigger veto the result. A vetoed or failed execution is rolled
//! back completely.

use std::sync::Arc;

use rusqlite::types::Value as SqlValue;
use serde_json::{Map, Value};
use tracing::{debug, warn};

use crate::datatype::to_sql;
use crate::error::{CanfigError, Result};
use crate::schema::{junction_name, primary_key, quote, Table, CONFIG_ROW_ID, VALUE_COLUMN};
use crate::store::{Row, Store};
use crate::trigger::Trigger;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PlanKind {
    /// A column of the config row.
    Scalar { table: String, column: String },
    /// A row of `target`, referenced from a foreign key column of the config row.
    Reference { table: String, column: String, target: Table },
    /// Rows of `item` associated with the config row through a junction table.
    ListRelation { table: String, item: Table, scalar_items: bool },
}

impl PlanKind {
    pub fn name(&self) -> &'static str {
        match self {
            PlanKind::Scalar { .. } => "scalar",
            PlanKind::Reference { .. } => "reference",
            PlanKind::ListRelation { .. } => "list",
        }
    }

    /// Selects the current value. Does not depend on any bound value.
    pub fn read_statement(&self) -> Statement {
        let sql = match self {
            PlanKind::Scalar { table, column } => format!(
                "SELECT {} FROM {} WHERE {} = {}",
                quote(column),
                quote(table),
                quote(&primary_key(table)),
                CONFIG_ROW_ID
            ),
            PlanKind::Reference { table, column, target } => format!(
                "SELECT {} FROM {} AS c JOIN {} AS t ON t.{} = c.{} WHERE c.{} = {}",
                select_list("t", target),
                quote(table),
                quote(&target.name),
                quote(&target.primary_key()),
                quote(column),
                quote(&primary_key(table)),
                CONFIG_ROW_ID
            ),
            PlanKind::ListRelation { table, item, .. } => format!(
                "SELECT {} FROM {} AS i JOIN {} AS j ON j.{} = i.{} WHERE j.{} = {} ORDER BY i.{}",
                select_list("i", item),
                quote(&item.name),
                quote(&junction_name(&item.name, table)),
                quote(&item.primary_key()),
                quote(&item.primary_key()),
                quote(&primary_key(table)),
                CONFIG_ROW_ID,
                quote(&item.primary_key())
            ),
        };
        Statement { sql, params: Vec::new() }
    }
}

fn select_list(alias: &str, table: &Table) -> String {
    table
        .column_names()
        .iter()
        .map(|c| format!("{}.{}", alias, quote(c)))
        .collect::<Vec<_>>()
        .join(", ")
}

#[derive(Debug, Clone, PartialEq)]
pub enum Param {
    Value(SqlValue),
    /// Replaced by the row id of the latest capture.
    CapturedRowId,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Statement {
    pub sql: String,
    pub params: Vec<Param>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum WriteStep {
    Execute(Statement),
    CaptureRowId,
}

/// Evaluates the triggers of a plan after its writes.
pub trait TriggerEvaluator {
    fn evaluate(&self, trigger: &Trigger) -> Result<()>;
}

/// Skips trigger evaluation.
pub struct NoTriggers;
impl TriggerEvaluator for NoTriggers {
    fn evaluate(&self, _trigger: &Trigger) -> Result<()> {
        Ok(())
    }
}

#[derive(Debug)]
pub struct Plan {
    config: String,
    field: String,
    kind: PlanKind,
    writes: Vec<WriteStep>,
    reads: Vec<Statement>,
    captured: Option<i64>,
    bound: bool,
    triggers: Vec<Arc<Trigger>>,
}

impl Plan {
    pub fn new(config: impl Into<String>, field: impl Into<String>, kind: PlanKind) -> Self {
        Self {
            config: config.into(),
            field: field.into(),
            kind,
            writes: Vec::new(),
            reads: Vec::new(),
            captured: None,
            bound: false,
            triggers: Vec::new(),
        }
    }
    pub fn config(&self) -> &str {
        &self.config
    }
    pub fn field(&self) -> &str {
        &self.field
    }
    pub fn path(&self) -> String {
        format!("{}.{}", self.config, self.field)
    }
    pub fn kind(&self) -> &PlanKind {
        &self.kind
    }
    pub fn is_bound(&self) -> bool {
        self.bound
    }
    pub fn write_steps(&self) -> &[WriteStep] {
        &self.writes
    }
    pub fn read_steps(&self) -> &[Statement] {
        &self.reads
    }
    pub fn triggers(&self) -> &[Arc<Trigger>] {
        &self.triggers
    }
    pub fn add_trigger(&mut self, trigger: Arc<Trigger>) {
        self.triggers.push(trigger);
    }

    /// Replaces the write and read steps with those for `value`.
    pub fn bind(&mut self, value: &Value) -> Result<()> {
        self.writes.clear();
        self.reads.clear();
        self.captured = None;
        self.bound = false;
        match &self.kind {
            PlanKind::Scalar { table, column } => {
                if value.is_object() || value.is_array() {
                    return Err(self.shape_error("a scalar", value));
                }
                self.writes.push(WriteStep::Execute(Statement {
                    sql: update_config_row(table, column),
                    params: vec![Param::Value(to_sql(value)?)],
                }));
            }
            PlanKind::Reference { table, column, target } => {
                let Value::Object(fields) = value else {
                    return Err(self.shape_error("a field map", value));
                };
                let insert = insert_row(target, fields)?;
                // the replaced row belongs to this field alone, the key column is set null on delete
                let release = Statement {
                    sql: format!(
                        "DELETE FROM {} WHERE {} = (SELECT {} FROM {} WHERE {} = {})",
                        quote(&target.name),
                        quote(&target.primary_key()),
                        quote(column),
                        quote(table),
                        quote(&primary_key(table)),
                        CONFIG_ROW_ID
                    ),
                    params: Vec::new(),
                };
                let update = Statement {
                    sql: update_config_row(table, column),
                    params: vec![Param::CapturedRowId],
                };
                self.writes.extend([
                    WriteStep::Execute(insert),
                    WriteStep::CaptureRowId,
                    WriteStep::Execute(release),
                    WriteStep::Execute(update),
                ]);
            }
            PlanKind::ListRelation { table, item, scalar_items } => {
                let Value::Array(members) = value else {
                    return Err(self.shape_error("a sequence of field maps", value));
                };
                let junction = junction_name(&item.name, table);
                let mut steps = vec![
                    WriteStep::Execute(Statement {
                        sql: format!(
                            "DELETE FROM {} WHERE {} IN (SELECT {} FROM {} WHERE {} = {})",
                            quote(&item.name),
                            quote(&item.primary_key()),
                            quote(&item.primary_key()),
                            quote(&junction),
                            quote(&primary_key(table)),
                            CONFIG_ROW_ID
                        ),
                        params: Vec::new(),
                    }),
                    WriteStep::Execute(Statement {
                        sql: format!(
                            "DELETE FROM {} WHERE {} = {}",
                            quote(&junction),
                            quote(&primary_key(table)),
                            CONFIG_ROW_ID
                        ),
                        params: Vec::new(),
                    }),
                ];
                let link = format!(
                    "INSERT INTO {} ({}, {}) VALUES (?, {})",
                    quote(&junction),
                    quote(&item.primary_key()),
                    quote(&primary_key(table)),
                    CONFIG_ROW_ID
                );
                for member in members {
                    let insert = match member {
                        Value::Object(fields) => insert_row(item, fields)?,
                        Value::Array(_) => return Err(self.shape_error("a sequence of field maps", value)),
                        scalar if *scalar_items => {
                            let mut fields = Map::new();
                            fields.insert(VALUE_COLUMN.to_string(), scalar.clone());
                            insert_row(item, &fields)?
                        }
                        _ => return Err(self.shape_error("a sequence of field maps", value)),
                    };
                    steps.push(WriteStep::Execute(insert));
                    steps.push(WriteStep::CaptureRowId);
                    steps.push(WriteStep::Execute(Statement {
                        sql: link.clone(),
                        params: vec![Param::CapturedRowId],
                    }));
                }
                self.writes = steps;
            }
        }
        self.reads.push(self.kind.read_statement());
        self.bound = true;
        debug!(plan = %self.path(), kind = self.kind.name(), steps = self.writes.len(), "bound");
        Ok(())
    }

    /// Runs the bound writes and the triggers as one transaction.
    pub fn execute(&mut self, store: &Store, triggers: &dyn TriggerEvaluator) -> Result<()> {
        if !self.bound {
            return Err(CanfigError::Binding(format!("'{}' must be bound before it is executed", self.path())));
        }
        let transaction = store.transaction()?;
        let written = self.run_writes(store);
        self.captured = None;
        if let Err(e) = written {
            warn!(plan = %self.path(), error = %e, "write failed, rolling back");
            transaction.rollback()?;
            return Err(e);
        }
        for trigger in &self.triggers {
            if let Err(e) = triggers.evaluate(trigger) {
                warn!(plan = %self.path(), trigger = trigger.name(), error = %e, "rolling back");
                transaction.rollback()?;
                return Err(e);
            }
        }
        transaction.commit()
    }

    /// Runs the read steps of the latest bind.
    pub fn view(&self, store: &Store) -> Result<Vec<Row>> {
        if !self.bound {
            return Err(CanfigError::Binding(format!("'{}' must be bound before it is viewed", self.path())));
        }
        let mut rows = Vec::new();
        for statement in &self.reads {
            rows.extend(store.query(&statement.sql, &self.resolve(statement)?)?);
        }
        Ok(rows)
    }

    fn run_writes(&mut self, store: &Store) -> Result<()> {
        for step in &self.writes {
            match step {
                WriteStep::Execute(statement) => {
                    store.execute(&statement.sql, &self.resolve(statement)?)?;
                }
                WriteStep::CaptureRowId => self.captured = Some(store.last_insert_rowid()),
            }
        }
        Ok(())
    }

    fn resolve(&self, statement: &Statement) -> Result<Vec<SqlValue>> {
        statement
            .params
            .iter()
            .map(|param| match param {
                Param::Value(v) => Ok(v.clone()),
                Param::CapturedRowId => self.captured.map(SqlValue::Integer).ok_or_else(|| {
                    CanfigError::Binding(format!("no row id captured before '{}'", statement.sql))
                }),
            })
            .collect()
    }

    fn shape_error(&self, expected: &str, value: &Value) -> CanfigError {
        CanfigError::Binding(format!("'{}' expects {}, got {}", self.path(), expected, value))
    }
}

fn update_config_row(table: &str, column: &str) -> String {
    format!(
        "UPDATE {} SET {} = ? WHERE {} = {}",
        quote(table),
        quote(column),
        quote(&primary_key(table)),
        CONFIG_ROW_ID
    )
}

fn insert_row(table: &Table, fields: &Map<String, Value>) -> Result<Statement> {
    if fields.is_empty() {
        return Ok(Statement {
            sql: format!("INSERT INTO {} DEFAULT VALUES", quote(&table.name)),
            params: Vec::new(),
        });
    }
    let mut columns = Vec::new();
    let mut params = Vec::new();
    for (name, value) in fields {
        if !table.has_column(name) {
            return Err(CanfigError::Binding(format!("'{}' has no field '{}'", table.name, name)));
        }
        columns.push(quote(name));
        params.push(Param::Value(to_sql(value)?));
    }
    Ok(Statement {
        sql: format!(
            "INSERT INTO {} ({}) VALUES ({})",
            quote(&table.name),
            columns.join(", "),
            vec!["?"; params.len()].join(", ")
        ),
        params,
    })
}
