use std::env;
use std::fs;
use std::path::Path;
use std::process::{Command, ExitCode};

use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use canfig::token::read_stream;
use canfig::{Artifact, CanfigError, PersistenceMode, Result, Runtime, Settings, Store, Token};

fn main() -> ExitCode {
    let settings = match Settings::load() {
        Ok(settings) => settings,
        Err(e) => {
            tracing_subscriber::fmt().with_env_filter(EnvFilter::new("info")).init();
            error!(error = %e, "could not read settings");
            return ExitCode::FAILURE;
        }
    };
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(&settings.log))
        .init();
    match run(&settings) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!(error = %e, "canfig failed");
            ExitCode::FAILURE
        }
    }
}

fn run(settings: &Settings) -> Result<()> {
    let Some(source_path) = env::args().nth(1) else {
        return Err(CanfigError::Config("usage: canfig <source.canfig>".to_string()));
    };
    let source_path = Path::new(&source_path);
    let source = fs::read_to_string(source_path)?;
    let stem = source_path.with_extension("");
    let artifact = Artifact::load_or_compile(stem.with_extension("candy"), &source, || {
        lex(settings, source_path, &stem)
    })?;

    let mode = settings.persistence_mode();
    if let PersistenceMode::File(database) = &mode {
        if settings.fresh_database && Path::new(database).exists() {
            fs::remove_file(database)?;
            info!(%database, "removed existing database");
        }
    }
    let runtime = Runtime::load(Store::new(mode)?, &artifact)?;
    for (tag, value) in runtime.metadata() {
        info!(%tag, %value, "metadata");
    }
    info!(
        database = %settings.database,
        configs = runtime.configs().len(),
        fields = runtime.fields().count(),
        triggers = runtime.triggers().len(),
        slices = runtime.slices().len(),
        "configuration installed"
    );
    Ok(())
}

// The lexer writes `<stem>.cando`, which is consumed here.
fn lex(settings: &Settings, source: &Path, stem: &Path) -> Result<Vec<Token>> {
    let cando = stem.with_extension("cando");
    if let Some(lexer) = &settings.lexer {
        let status = Command::new(lexer).arg(source).arg("-o").arg(stem).status()?;
        if !status.success() {
            return Err(CanfigError::TokenStream(format!("lexer '{}' exited with {}", lexer, status)));
        }
    }
    let text = fs::read_to_string(&cando)
        .map_err(|e| CanfigError::TokenStream(format!("cannot read '{}': {}", cando.display(), e)))?;
    if settings.lexer.is_some() {
        fs::remove_file(&cando)?;
    }
    read_stream(&text)
}
