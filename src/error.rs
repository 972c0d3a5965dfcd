use thiserror::Error;

use crate::parser::State;

#[derive(Error, Debug)]
pub enum CanfigError {
    #[error("Config error: {0}")]
    Config(String),
    #[error("Token stream error: {0}")]
    TokenStream(String),
    #[error("Parse error in state {state}! {message}")]
    Parse { state: State, message: String },
    #[error("Compile error: {0}")]
    Compile(String),
    #[error("Binding error: {0}")]
    Binding(String),
    #[error("Store error: {0}")]
    Store(#[from] rusqlite::Error),
    #[error("Trigger '{trigger}' failed: {reason}")]
    Trigger { trigger: String, reason: String },
    #[error("Trigger '{trigger}' failed due to field '{path}' not existing")]
    FieldLookup { trigger: String, path: String },
    #[error("Unknown field '{0}'")]
    UnknownField(String),
    #[error("Artifact error: {0}")]
    Artifact(String),
}

pub type Result<T> = std::result::Result<T, CanfigError>;

// Helper conversions
impl From<config::ConfigError> for CanfigError {
    fn from(e: config::ConfigError) -> Self { Self::Config(e.to_string()) }
}
impl From<serde_json::Error> for CanfigError {
    fn from(e: serde_json::Error) -> Self { Self::Artifact(e.to_string()) }
}
impl From<std::io::Error> for CanfigError {
    fn from(e: std::io::Error) -> Self { Self::Artifact(e.to_string()) }
}
