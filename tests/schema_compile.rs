use canfig::declaration::{ConfigDecl, Declarations, StructDecl};
use canfig::plan::PlanKind;
use canfig::{compile, CanfigError, CompiledSchema, PersistenceMode, Runtime, Store};

fn declarations(structs: &[(&str, Option<&str>, &str)], configs: &[(&str, &str)]) -> Declarations {
    let mut declarations = Declarations::new();
    for (name, argument, body) in structs {
        declarations.structs.push(StructDecl {
            name: name.to_string(),
            body: body.to_string(),
            argument: argument.map(str::to_string),
        });
    }
    for (name, body) in configs {
        declarations.configs.push(ConfigDecl {
            name: name.to_string(),
            body: body.to_string(),
        });
    }
    declarations
}

fn creates(schema: &CompiledSchema, table: &str) -> usize {
    let prefix = format!("CREATE TABLE IF NOT EXISTS \"{}\" (", table);
    schema
        .units
        .iter()
        .flat_map(|u| u.statements.iter())
        .filter(|s| s.starts_with(&prefix))
        .count()
}

fn compile_error(declarations: &Declarations) -> String {
    match compile(declarations) {
        Err(CanfigError::Compile(message)) => message,
        Err(other) => panic!("expected a compile error, got {other}"),
        Ok(_) => panic!("expected a compile error"),
    }
}

#[test]
fn instantiations_are_shared() {
    let schema = compile(&declarations(
        &[("Window", Some("size:INTEGER=5"), "minute INTEGER CHECK(minute < size)")],
        &[
            ("Alpha", "window Window(3)\n history LIST(Window( 3 ))"),
            ("Beta", "window Window(03)"),
        ],
    ))
    .expect("compile");
    assert_eq!(creates(&schema, "Window_3"), 1);
    assert_eq!(creates(&schema, "Window"), 0);
    let instance = schema
        .units
        .iter()
        .flat_map(|u| u.statements.iter())
        .find(|s| s.starts_with("CREATE TABLE IF NOT EXISTS \"Window_3\""))
        .expect("instantiation");
    assert!(instance.contains("CHECK(minute < 3)"));
    for plan in &schema.plans {
        match plan.kind() {
            PlanKind::Reference { target, .. } => assert_eq!(target.name, "Window_3"),
            PlanKind::ListRelation { item, .. } => assert_eq!(item.name, "Window_3"),
            PlanKind::Scalar { .. } => panic!("no scalar fields declared"),
        }
    }
}

#[test]
fn bare_template_name_uses_the_default() {
    let schema = compile(&declarations(
        &[("Window", Some("size:INTEGER=5"), "minute INTEGER CHECK(minute < size)")],
        &[("Alpha", "window Window"), ("Beta", "window Window")],
    ))
    .expect("compile");
    assert_eq!(creates(&schema, "Window"), 1);
    assert!(schema.units[0].statements[0].contains("CHECK(minute < 5)"));
}

#[test]
fn config_tables_carry_foreign_keys_and_one_row() {
    let schema = compile(&declarations(
        &[("Person", None, "name TEXT, age INTEGER"), ("Command", None, "name TEXT, description TEXT")],
        &[("Server", "port INTEGER NOT NULL, owner Person, commands LIST(Command)")],
    ))
    .expect("compile");
    let server = &schema.units.last().expect("server unit").statements;
    let table = server.iter().find(|s| s.contains("\"Server\" (")).expect("server table");
    assert!(table.contains("\"port\" INTEGER NOT NULL"));
    assert!(table.contains("\"owner\" INTEGER"));
    assert!(table.contains("FOREIGN KEY (\"owner\") REFERENCES \"Person\" (\"Person_id\")"));
    // list members live in the junction table only
    assert!(!table.contains("\"commands\""));
    assert_eq!(creates(&schema, "Command_Server"), 1);
    assert_eq!(
        server.last().map(String::as_str),
        Some("INSERT OR IGNORE INTO \"Server\" (\"Server_id\") VALUES (1)")
    );
    let kinds: Vec<_> = schema.plans.iter().map(|p| (p.path(), p.kind().name())).collect();
    assert_eq!(
        kinds,
        vec![
            ("Server.port".to_string(), "scalar"),
            ("Server.owner".to_string(), "reference"),
            ("Server.commands".to_string(), "list"),
        ]
    );
}

#[test]
fn builtin_list_wrappers_are_created_once() {
    let schema = compile(&declarations(
        &[],
        &[("Runner", "nickname LIST(TEXT)"), ("Worker", "alias LIST(TEXT), weights LIST(REAL)")],
    ))
    .expect("compile");
    assert_eq!(creates(&schema, "TEXT"), 1);
    assert_eq!(creates(&schema, "REAL"), 1);
    assert_eq!(creates(&schema, "TEXT_Runner"), 1);
    assert_eq!(creates(&schema, "TEXT_Worker"), 1);
}

#[test]
fn list_of_unknown_type_is_rejected() {
    let message = compile_error(&declarations(&[], &[("Runner", "nickname LIST(VARCHAR)")]));
    assert!(message.contains("invalid type 'VARCHAR' inside LIST"), "{message}");
    let message = compile_error(&declarations(&[], &[("Runner", "nickname LIST(text)")]));
    assert!(message.contains("invalid type 'text' inside LIST"), "{message}");
}

#[test]
fn unresolved_reference_is_rejected() {
    let message = compile_error(&declarations(&[], &[("Server", "owner Person")]));
    assert!(message.contains("unresolved struct reference 'Person'"), "{message}");
    assert!(message.contains("field 'owner' of 'Server'"), "{message}");
}

#[test]
fn malformed_definitions_are_rejected() {
    let message = compile_error(&declarations(&[("Window", Some("size=5"), "minute INTEGER")], &[]));
    assert!(message.contains("malformed argument rule"), "{message}");

    let message = compile_error(&declarations(&[], &[("Server", "port INTEGER, port TEXT")]));
    assert!(message.contains("duplicate field 'port'"), "{message}");

    let message = compile_error(&declarations(
        &[("Command", None, "name TEXT")],
        &[("Server", "commands LIST(Command), more LIST(Command)")],
    ));
    assert!(message.contains("more than one LIST(Command)"), "{message}");

    let message = compile_error(&declarations(&[("Command", None, "name TEXT")], &[("Server", "c Command(2)")]));
    assert!(message.contains("'Command' is not parameterized"), "{message}");

    let message = compile_error(&declarations(
        &[("Window", Some("size:INTEGER=5"), "minute INTEGER")],
        &[("Server", "w Window(five)")],
    ));
    assert!(message.contains("not a valid INTEGER"), "{message}");
}

#[test]
fn instantiation_may_not_shadow_a_struct() {
    let message = compile_error(&declarations(
        &[("Window_3", None, "minute INTEGER"), ("Window", Some("size:INTEGER=5"), "minute INTEGER")],
        &[("Server", "w Window(3)")],
    ));
    assert!(message.contains("instantiation 'Window_3' collides"), "{message}");
}

#[test]
fn nothing_is_installed_when_compilation_fails() {
    let path = std::env::temp_dir().join(format!("canfig_compile_fault_{}.db", std::process::id()));
    let _ = std::fs::remove_file(&path);
    let location = path.to_string_lossy().to_string();
    let bad = declarations(
        &[("Command", None, "name TEXT")],
        &[("Server", "port INTEGER"), ("Runner", "owner Nobody")],
    );
    let mut artifact = canfig::Artifact::compile("", &[canfig::Token::bare(canfig::TokenKind::Eof).expect("eof")])
        .expect("artifact");
    artifact.declarations = bad;
    let store = Store::new(PersistenceMode::File(location.clone())).expect("store");
    assert!(Runtime::load(store, &artifact).is_err());

    let store = Store::new(PersistenceMode::File(location)).expect("store");
    let tables = store.query("SELECT name FROM sqlite_master WHERE type = 'table'", &[]).expect("query");
    assert!(tables.is_empty(), "{tables:?}");
    drop(store);
    let _ = std::fs::remove_file(&path);
}

#[test]
fn struct_named_like_a_type_word_is_a_reference() {
    let declarations = declarations(
        &[("Date", None, "day INTEGER, month INTEGER")],
        &[("Release", "published Date, noted DATE")],
    );
    let schema = compile(&declarations).expect("compile");
    let kinds: Vec<_> = schema.plans.iter().map(|p| (p.path(), p.kind().name())).collect();
    assert_eq!(
        kinds,
        vec![
            ("Release.published".to_string(), "reference"),
            ("Release.noted".to_string(), "scalar"),
        ]
    );

    let runtime = Runtime::new(Store::new(PersistenceMode::InMemory).expect("store"), schema).expect("runtime");
    runtime
        .set("Release.published", &serde_json::json!({"day": 1, "month": 2}))
        .expect("set");
    let rows = runtime.get("Release.published").expect("get");
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0]["month"], serde_json::json!(2));
}

#[test]
fn struct_reference_cannot_carry_constraints() {
    let message = compile_error(&declarations(
        &[("Window", Some("size:INTEGER=5"), "minute INTEGER")],
        &[("Server", "w Window(5) NOT NULL")],
    ));
    assert!(message.contains("constraints are not supported on struct reference 'Window'"), "{message}");
    assert!(message.contains("field 'w' of 'Server'"), "{message}");
}
