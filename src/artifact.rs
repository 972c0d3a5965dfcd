// The compiled artifact is what a `.candy` file holds: the parsed
// declarations together with a fingerprint of the source they came from.
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::Path;
use tracing::{info, warn};

use crate::declaration::Declarations;
use crate::error::Result;
use crate::parser::Parser;
use crate::token::Token;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Artifact {
    pub fingerprint: String,
    pub metadata: BTreeMap<String, String>,
    pub declarations: Declarations,
}

impl Artifact {
    /// Content hash of a source text.
    pub fn fingerprint(source: &str) -> String {
        blake3::hash(source.as_bytes()).to_hex().to_string()
    }

    /// Parses the token stream that the lexer produced from `source`.
    pub fn compile(source: &str, tokens: &[Token]) -> Result<Artifact> {
        let parsed = Parser::parse(tokens)?;
        Ok(Artifact {
            fingerprint: Self::fingerprint(source),
            metadata: parsed.metadata,
            declarations: parsed.declarations,
        })
    }

    pub fn is_fresh(&self, source: &str) -> bool {
        self.fingerprint == Self::fingerprint(source)
    }

    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        fs::write(path, serde_json::to_string_pretty(self)?)?;
        Ok(())
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Artifact> {
        Ok(serde_json::from_str(&fs::read_to_string(path)?)?)
    }

    /// Returns the artifact stored at `path` if it was compiled from `source`,
    /// otherwise lexes and parses `source` again and replaces the stored one.
    pub fn load_or_compile<F>(path: impl AsRef<Path>, source: &str, lex: F) -> Result<Artifact>
    where
        F: FnOnce() -> Result<Vec<Token>>,
    {
        let path = path.as_ref();
        if path.exists() {
            match Artifact::load(path) {
                Ok(artifact) if artifact.is_fresh(source) => {
                    info!(path = %path.display(), "fresh artifact, no need to compile");
                    return Ok(artifact);
                }
                Ok(_) => info!(path = %path.display(), "artifact out of date, recompiling"),
                Err(e) => warn!(path = %path.display(), error = %e, "unreadable artifact, recompiling"),
            }
        }
        let tokens = lex()?;
        info!(tokens = tokens.len(), "processing tokens");
        let artifact = Artifact::compile(source, &tokens)?;
        artifact.save(path)?;
        info!(
            path = %path.display(),
            metadata = artifact.metadata.len(),
            declarations = artifact.declarations.len(),
            "artifact written"
        );
        Ok(artifact)
    }
}
