//! Canfig – typed, queryable runtime configuration backed by SQLite.
//!
//! A Canfig source declares the shape of an application's configuration:
//! ```text
//! VERSION "1.0";
//! STRUCT Command { name TEXT NOT NULL, description TEXT };
//! STRUCT Window(size:INTEGER=5) { minute INTEGER CHECK(minute < size) };
//! CONFIG Server { port INTEGER, commands LIST(Command), window Window(10) };
//! TRIGGER port_range WHEN CHANGE Server { return GET("Server.port")[0].port > 1024; };
//! SLICE ports { SELECT port FROM Server };
//! ```
//! An external lexer turns the source into a token stream, and from there
//! on everything happens in this crate:
//! * [`parser`] – a finite-state machine turning tokens into
//!   [`declaration::Declaration`]s and a metadata map.
//! * [`compiler`] – resolves struct references, expands `LIST(...)` fields
//!   into junction tables and parameterized structs into instantiations, and
//!   compiles one [`plan::Plan`] per config field.
//! * [`plan`] – the per-field unit of work: `bind` a value, `execute` it in
//!   one transaction, `view` what was written.
//! * [`trigger`] – validation hooks in a closed language that can only
//!   `GET`, `SET`, warn, fail, and assert. A failing trigger rolls the write back.
//! * [`runtime`] – the registry of all plans by `Config.field` path, and the
//!   host that triggers call into.
//! * [`artifact`] – the parsed declarations with a content fingerprint, so
//!   that an unchanged source is not parsed twice.
//!
//! ## Naming
//! Every table has the primary key `<table>_id`. A config table holds exactly
//! one row, with identifier 1. The members of `field LIST(Item)` in config
//! `Config` live in the junction table `Item_Config`, and the instantiation
//! `Window(10)` is the table `Window_10`.
//!
//! ## Quick Start
//! ```
//! use canfig::{Artifact, Runtime, PersistenceMode, Store, Token, TokenKind};
//! use serde_json::json;
//! let tokens = vec![
//!     Token::bare(TokenKind::Config).unwrap(),
//!     Token::with(TokenKind::Ident, "Server"),
//!     Token::with(TokenKind::Command, "port INTEGER"),
//!     Token::bare(TokenKind::Semi).unwrap(),
//!     Token::bare(TokenKind::Eof).unwrap(),
//! ];
//! let artifact = Artifact::compile("CONFIG Server { port INTEGER };", &tokens).unwrap();
//! let runtime = Runtime::load(Store::new(PersistenceMode::InMemory).unwrap(), &artifact).unwrap();
//! runtime.bind("Server.port", &json!(8128)).unwrap();
//! runtime.execute("Server.port").unwrap();
//! assert_eq!(runtime.view("Server.port").unwrap()[0]["port"], json!(8128));
//! ```

pub mod artifact;
pub mod compiler;
pub mod datatype;
pub mod declaration;
pub mod error;
pub mod field;
pub mod parser;
pub mod plan;
pub mod runtime;
pub mod schema;
pub mod settings;
pub mod store;
pub mod token;
pub mod trigger;

pub use artifact::Artifact;
pub use compiler::{compile, CompiledSchema, Compiler};
pub use declaration::{Declaration, Declarations};
pub use error::{CanfigError, Result};
pub use parser::Parser;
pub use plan::Plan;
pub use runtime::Runtime;
pub use settings::Settings;
pub use store::{PersistenceMode, Row, Store};
pub use token::{Token, TokenKind};
