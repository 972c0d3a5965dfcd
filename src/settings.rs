// Layered settings: defaults, then an optional canfig.{toml,json,yaml} file,
// then CANFIG_* environment variables.
use config::{Config, Environment, File};
use serde::Deserialize;

use crate::error::Result;
use crate::store::PersistenceMode;

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct Settings {
    /// `:memory:` or the path of a database file.
    pub database: String,
    /// Log filter directive, e.g. `info` or `canfig=debug`.
    pub log: String,
    /// External lexer, run as `<lexer> <source> -o <stem>`.
    pub lexer: Option<String>,
    /// Remove an existing database file before installing the schema.
    pub fresh_database: bool,
}

impl Settings {
    pub fn load() -> Result<Self> {
        Self::from_file("canfig")
    }

    /// Reads settings from the file `name` (any extension `config` knows),
    /// which may be absent.
    pub fn from_file(name: &str) -> Result<Self> {
        let settings = Config::builder()
            .set_default("database", ":memory:")?
            .set_default("log", "info")?
            .set_default("fresh_database", false)?
            .add_source(File::with_name(name).required(false))
            .add_source(Environment::with_prefix("CANFIG"))
            .build()?;
        Ok(settings.try_deserialize()?)
    }

    pub fn persistence_mode(&self) -> PersistenceMode {
        PersistenceMode::from_location(&self.database)
    }
}
