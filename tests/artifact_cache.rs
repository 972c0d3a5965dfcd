use std::cell::Cell;
use std::fs;
use std::path::PathBuf;

use canfig::token::{read_stream, write_stream};
use canfig::{Artifact, PersistenceMode, Runtime, Settings, Store};
use serde_json::json;

const SOURCE: &str = r#"
VERSION "2.1";
STRUCT Command { name TEXT, description TEXT };
CONFIG Server { port INTEGER, commands LIST(Command) };
SLICE ports { SELECT port FROM Server };
"#;

const TOKENS: &str = concat!(
    "VERSION[_!]STRING(2.1)[_!]SEMI[_!]",
    "STRUCT[_!]IDENT(Command)[_!]COMMAND(name TEXT, description TEXT)[_!]SEMI[_!]",
    "CONFIG[_!]IDENT(Server)[_!]COMMAND(port INTEGER, commands LIST(Command))[_!]SEMI[_!]",
    "SLICE[_!]IDENT(ports)[_!]COMMAND(SELECT port FROM Server)[_!]SEMI[_!]",
    "EOF"
);

fn temp_path(name: &str) -> PathBuf {
    std::env::temp_dir().join(format!("canfig_{}_{}", std::process::id(), name))
}

#[test]
fn recompilation_is_idempotent() {
    let tokens = read_stream(TOKENS).expect("tokens");
    let first = Artifact::compile(SOURCE, &tokens).expect("first");
    let second = Artifact::compile(SOURCE, &tokens).expect("second");
    assert_eq!(first, second);
    assert_eq!(
        serde_json::to_string(&first).expect("json"),
        serde_json::to_string(&second).expect("json")
    );
    assert_eq!(first.fingerprint, Artifact::fingerprint(SOURCE));
    assert!(first.is_fresh(SOURCE));
    assert!(!first.is_fresh("CONFIG Server { port TEXT };"));
    // the token stream survives a round through the lexer format
    assert_eq!(read_stream(&write_stream(&tokens)).expect("reread"), tokens);
}

#[test]
fn fresh_artifact_skips_the_lexer() {
    let path = temp_path("cache.candy");
    let _ = fs::remove_file(&path);
    let lexed = Cell::new(0);
    let lex = || {
        lexed.set(lexed.get() + 1);
        read_stream(TOKENS)
    };

    let first = Artifact::load_or_compile(&path, SOURCE, lex).expect("compile");
    assert_eq!(lexed.get(), 1);
    assert!(path.exists());
    let second = Artifact::load_or_compile(&path, SOURCE, lex).expect("cached");
    assert_eq!(lexed.get(), 1);
    assert_eq!(first, second);

    let changed = format!("{}\n# touched", SOURCE);
    let third = Artifact::load_or_compile(&path, &changed, lex).expect("recompile");
    assert_eq!(lexed.get(), 2);
    assert_eq!(third.fingerprint, Artifact::fingerprint(&changed));
    assert_eq!(third.declarations, first.declarations);

    fs::write(&path, "not an artifact").expect("corrupt");
    Artifact::load_or_compile(&path, SOURCE, lex).expect("recompile corrupt");
    assert_eq!(lexed.get(), 3);
    let _ = fs::remove_file(&path);
}

#[test]
fn artifact_from_disk_drives_a_file_store() {
    let candy = temp_path("pipeline.candy");
    let database = temp_path("pipeline.db");
    let _ = fs::remove_file(&candy);
    let _ = fs::remove_file(&database);
    let location = database.to_string_lossy().to_string();

    let artifact = Artifact::load_or_compile(&candy, SOURCE, || read_stream(TOKENS)).expect("artifact");
    {
        let runtime = Runtime::load(Store::new(PersistenceMode::File(location.clone())).expect("store"), &artifact)
            .expect("runtime");
        assert_eq!(runtime.metadata().get("VERSION").map(String::as_str), Some("2.1"));
        assert_eq!(
            runtime.slice("ports").map(|s| s.command.as_str()),
            Some("SELECT port FROM Server")
        );
        runtime.set("Server.port", &json!(8128)).expect("set");
        runtime.set("Server.commands", &json!([{"name": "ls"}])).expect("set list");
    }

    // installing again keeps what was stored
    let reloaded = Artifact::load(&candy).expect("reload");
    let runtime = Runtime::load(Store::new(PersistenceMode::File(location)).expect("store"), &reloaded)
        .expect("runtime again");
    assert_eq!(runtime.get("Server.port").expect("get")[0]["port"], json!(8128));
    assert_eq!(runtime.get("Server.commands").expect("get").len(), 1);
    drop(runtime);
    let _ = fs::remove_file(&candy);
    let _ = fs::remove_file(&database);
}

#[test]
fn settings_have_defaults_and_read_files() {
    let defaults = Settings::from_file("canfig_settings_that_do_not_exist").expect("defaults");
    assert_eq!(defaults.database, ":memory:");
    assert_eq!(defaults.log, "info");
    assert_eq!(defaults.lexer, None);
    assert!(!defaults.fresh_database);
    assert_eq!(defaults.persistence_mode(), PersistenceMode::InMemory);

    let path = temp_path("settings.toml");
    fs::write(&path, "database = \"server.db\"\nlexer = \"canfig-lex\"\nfresh_database = true\n").expect("write");
    let settings = Settings::from_file(&path.to_string_lossy()).expect("file");
    assert_eq!(settings.persistence_mode(), PersistenceMode::File("server.db".to_string()));
    assert_eq!(settings.lexer.as_deref(), Some("canfig-lex"));
    assert!(settings.fresh_database);
    assert_eq!(settings.log, "info");
    let _ = fs::remove_file(&path);
}

#[test]
fn demo_source_loads() {
    let source = include_str!("../demos/server.canfig");
    let tokens = read_stream(include_str!("../demos/server.cando")).expect("tokens");
    let artifact = Artifact::compile(source, &tokens).expect("artifact");
    assert_eq!(artifact.metadata.get("AUTHOR").map(String::as_str), Some("ops team"));
    let runtime = Runtime::load(Store::new(PersistenceMode::InMemory).expect("store"), &artifact).expect("runtime");
    assert_eq!(runtime.configs(), ["Server".to_string(), "Admin".to_string()]);
    assert_eq!(runtime.fields().count(), 6);
    assert_eq!(port_of(&runtime), json!(8128));

    runtime.set("Server.aliases", &json!(["cmd", "commander"])).expect("aliases");
    runtime.set("Server.window", &json!({"minute": 9})).expect("window");
    assert!(runtime.set("Server.window", &json!({"minute": 10})).is_err());
    assert!(runtime.set("Server.port", &json!(80)).is_err());
    assert_eq!(port_of(&runtime), json!(8128));
}

fn port_of(runtime: &Runtime) -> serde_json::Value {
    runtime.get("Server.port").expect("get")[0]["port"].clone()
}
