// used for persistence
use rusqlite::{params_from_iter, Connection, types::Value as SqlValue};
use serde_json::{Map, Value};
use std::cell::Cell;
use tracing::debug;

use crate::datatype::from_sql;
use crate::error::Result;

/// A result row, column name to value.
pub type Row = Map<String, Value>;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PersistenceMode {
    InMemory,
    File(String),
}

impl PersistenceMode {
    /// `":memory:"` selects an in-memory store, anything else is a file path.
    pub fn from_location(location: &str) -> Self {
        if location.is_empty() || location == ":memory:" {
            PersistenceMode::InMemory
        } else {
            PersistenceMode::File(location.to_string())
        }
    }
}

// ------------- Persistence -------------
pub struct Store {
    connection: Connection,
    // open savepoints, so that transactions nest
    depth: Cell<usize>,
}

impl Store {
    pub fn new(mode: PersistenceMode) -> Result<Self> {
        let connection = match &mode {
            PersistenceMode::InMemory => Connection::open_in_memory()?,
            PersistenceMode::File(path) => Connection::open(path)?,
        };
        debug!(?mode, "store opened");
        Self::from_connection(connection)
    }
    pub fn from_connection(connection: Connection) -> Result<Self> {
        connection.execute_batch("PRAGMA foreign_keys = ON;")?;
        Ok(Self { connection, depth: Cell::new(0) })
    }
    pub fn connection(&self) -> &Connection {
        &self.connection
    }
    pub fn execute(&self, sql: &str, params: &[SqlValue]) -> Result<usize> {
        debug!(sql, ?params, "execute");
        let mut statement = self.connection.prepare_cached(sql)?;
        Ok(statement.execute(params_from_iter(params.iter()))?)
    }
    pub fn execute_batch(&self, sql: &str) -> Result<()> {
        debug!(sql, "execute batch");
        Ok(self.connection.execute_batch(sql)?)
    }
    /// Identifier generated by the most recent insert.
    pub fn last_insert_rowid(&self) -> i64 {
        self.connection.last_insert_rowid()
    }
    pub fn query(&self, sql: &str, params: &[SqlValue]) -> Result<Vec<Row>> {
        debug!(sql, ?params, "query");
        let mut statement = self.connection.prepare_cached(sql)?;
        let names: Vec<String> = statement.column_names().into_iter().map(String::from).collect();
        let mut rows = statement.query(params_from_iter(params.iter()))?;
        let mut result = Vec::new();
        while let Some(row) = rows.next()? {
            let mut values = Row::new();
            for (i, name) in names.iter().enumerate() {
                values.insert(name.clone(), from_sql(row.get_ref(i)?));
            }
            result.push(values);
        }
        Ok(result)
    }
    /// Starts a (possibly nested) transaction.
    pub fn transaction(&self) -> Result<Transaction<'_>> {
        let depth = self.depth.get() + 1;
        let name = format!("canfig_{}", depth);
        self.connection.execute_batch(&format!("SAVEPOINT {};", name))?;
        self.depth.set(depth);
        Ok(Transaction { store: self, name, finished: false })
    }
    pub fn in_transaction(&self) -> bool {
        self.depth.get() > 0
    }
}

/// Rolls back on drop unless committed.
pub struct Transaction<'s> {
    store: &'s Store,
    name: String,
    finished: bool,
}

impl Transaction<'_> {
    pub fn commit(mut self) -> Result<()> {
        self.finish(false)
    }
    pub fn rollback(mut self) -> Result<()> {
        self.finish(true)
    }
    fn finish(&mut self, rollback: bool) -> Result<()> {
        self.finished = true;
        self.store.depth.set(self.store.depth.get().saturating_sub(1));
        let sql = if rollback {
            format!("ROLLBACK TO {0}; RELEASE {0};", self.name)
        } else {
            format!("RELEASE {};", self.name)
        };
        Ok(self.store.connection.execute_batch(&sql)?)
    }
}

impl Drop for Transaction<'_> {
    fn drop(&mut self) {
        if !self.finished {
            let _ = self.finish(true);
        }
    }
}
