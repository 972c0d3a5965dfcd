//! Naming conventions and table definitions.
//!
//! * every table's primary key column is `<table>_id`
//! * a junction table is named `<item_table>_<owner_table>`
//! * a parameterized struct instantiation is named `<Base>_<arg>`
//! * a config table holds exactly one row, with identifier [`CONFIG_ROW_ID`]

/// Identifier of the single row of every config table.
pub const CONFIG_ROW_ID: i64 = 1;

/// Column of the value in the wrapper table of a built-in list type.
pub const VALUE_COLUMN: &str = "value";

pub fn primary_key(table: &str) -> String {
    format!("{}_id", table)
}

pub fn junction_name(item: &str, owner: &str) -> String {
    format!("{}_{}", item, owner)
}

pub fn instance_name(base: &str, suffix: &str) -> String {
    format!("{}_{}", base, suffix)
}

/// Quotes an identifier for use in a statement.
pub fn quote(identifier: &str) -> String {
    format!("\"{}\"", identifier.replace('"', "\"\""))
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Column {
    pub name: String,
    pub ty: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ForeignKey {
    pub column: String,
    pub references: String,
    pub on_delete: Option<&'static str>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Table {
    pub name: String,
    pub columns: Vec<Column>,
    pub constraints: Vec<String>,
    pub foreign_keys: Vec<ForeignKey>,
}

impl Table {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            columns: Vec::new(),
            constraints: Vec::new(),
            foreign_keys: Vec::new(),
        }
    }
    pub fn column(mut self, name: impl Into<String>, ty: impl Into<String>) -> Self {
        self.columns.push(Column { name: name.into(), ty: ty.into() });
        self
    }
    pub fn primary_key(&self) -> String {
        primary_key(&self.name)
    }
    pub fn has_column(&self, name: &str) -> bool {
        self.columns.iter().any(|c| c.name == name)
    }
    pub fn column_names(&self) -> Vec<&str> {
        self.columns.iter().map(|c| c.name.as_str()).collect()
    }

    /// The wrapper table of a built-in type used inside `LIST(...)`.
    pub fn builtin_wrapper(ty: &str) -> Self {
        Table::new(ty).column(VALUE_COLUMN, ty)
    }

    /// A many-to-many table between list items and their owning config.
    pub fn junction(item: &str, owner: &str) -> Self {
        let mut table = Table::new(junction_name(item, owner))
            .column(primary_key(item), "INTEGER NOT NULL")
            .column(primary_key(owner), "INTEGER NOT NULL");
        table.foreign_keys.push(ForeignKey {
            column: primary_key(item),
            references: item.to_string(),
            on_delete: Some("CASCADE"),
        });
        table.foreign_keys.push(ForeignKey {
            column: primary_key(owner),
            references: owner.to_string(),
            on_delete: Some("CASCADE"),
        });
        table
    }

    pub fn create_statement(&self) -> String {
        let mut lines = vec![format!("{} INTEGER PRIMARY KEY AUTOINCREMENT", quote(&self.primary_key()))];
        for column in &self.columns {
            lines.push(format!("{} {}", quote(&column.name), column.ty));
        }
        lines.extend(self.constraints.iter().cloned());
        for fk in &self.foreign_keys {
            let mut line = format!(
                "FOREIGN KEY ({}) REFERENCES {} ({})",
                quote(&fk.column),
                quote(&fk.references),
                quote(&primary_key(&fk.references))
            );
            if let Some(action) = fk.on_delete {
                line += &format!(" ON DELETE {}", action);
            }
            lines.push(line);
        }
        format!(
            "CREATE TABLE IF NOT EXISTS {} (\n    {}\n)",
            quote(&self.name),
            lines.join(",\n    ")
        )
    }
}

/// Inserts the single row of a config table.
pub fn config_row_statement(config: &str) -> String {
    format!(
        "INSERT OR IGNORE INTO {} ({}) VALUES ({})",
        quote(config),
        quote(&primary_key(config)),
        CONFIG_ROW_ID
    )
}
