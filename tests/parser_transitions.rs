use canfig::parser::{transition, Action, Handling, Parser, State};
use canfig::token::read_stream;
use canfig::{CanfigError, Token, TokenKind};

fn parse(stream: &str) -> canfig::Result<canfig::parser::Parsed> {
    Parser::parse(&read_stream(stream).expect("tokens"))
}

#[test]
fn every_statement_kind_is_emitted_on_semi() {
    let parsed = parse(concat!(
        "VERSION[_!]STRING(1.0)[_!]SEMI[_!]",
        "AUTHOR[_!]STRING(ops team)[_!]SEMI[_!]",
        "STRUCT[_!]IDENT(Command)[_!]COMMAND(name TEXT NOT NULL, description TEXT)[_!]SEMI[_!]",
        "STRUCT[_!]IDENT(Window)[_!]ARGUMENT(size:INTEGER=5)[_!]COMMAND(minute INTEGER CHECK(minute < size))[_!]SEMI[_!]",
        "CONFIG[_!]IDENT(Server)[_!]COMMAND(port INTEGER\n commands LIST(Command))[_!]SEMI[_!]",
        "TRIGGER[_!]IDENT(check)[_!]TRICOND(Server)[_!]COMMAND(return true;)[_!]SEMI[_!]",
        "SLICE[_!]IDENT(ports)[_!]COMMAND(SELECT port FROM Server)[_!]SEMI[_!]",
        "EOF"
    ))
    .expect("parse");

    assert_eq!(parsed.metadata.get("VERSION").map(String::as_str), Some("1.0"));
    assert_eq!(parsed.metadata.get("AUTHOR").map(String::as_str), Some("ops team"));
    let declarations = parsed.declarations;
    assert_eq!(declarations.len(), 5);
    assert_eq!(declarations.structs[0].name, "Command");
    assert!(!declarations.structs[0].is_parameterized());
    assert_eq!(declarations.structs[1].argument.as_deref(), Some("size:INTEGER=5"));
    assert_eq!(declarations.structs[1].body, "minute INTEGER CHECK(minute < size)");
    assert_eq!(declarations.configs[0].name, "Server");
    assert_eq!(declarations.triggers[0].name, "check");
    assert_eq!(declarations.triggers[0].condition, "Server");
    assert_eq!(declarations.triggers[0].code, "return true;");
    assert_eq!(declarations.slices[0].command, "SELECT port FROM Server");
}

#[test]
fn trigger_condition_may_follow_as_identifier() {
    let parsed = parse("TRIGGER[_!]IDENT(audit)[_!]TRICOND[_!]IDENT(Runner)[_!]COMMAND(CANFIG_WARN(\"changed\");)[_!]SEMI[_!]EOF")
        .expect("parse");
    assert_eq!(parsed.declarations.triggers[0].condition, "Runner");
}

#[test]
fn struct_shorthand_names_its_single_column() {
    let parsed = parse("STRUCT[_!]IDENT(Port)[_!]IDENT(INTEGER)[_!]SEMI[_!]EOF").expect("parse");
    assert_eq!(parsed.declarations.structs[0].body, "Port INTEGER");
}

#[test]
fn identifier_after_identifier_needs_struct_context() {
    let mut parser = Parser::new();
    parser.feed(&Token::with(TokenKind::Ident, "a")).expect("first identifier");
    let err = parser.feed(&Token::with(TokenKind::Ident, "b")).unwrap_err();
    match &err {
        CanfigError::Parse { state, message } => {
            assert_eq!(*state, State::At(TokenKind::Ident));
            assert_eq!(message, "identifier cannot follow identifier");
        }
        other => panic!("unexpected error {other:?}"),
    }
    assert_eq!(err.to_string(), "Parse error in state IDENT! identifier cannot follow identifier");
    assert_eq!(parser.state(), State::Error);
    // nothing is emitted after a fault
    assert!(parser.feed(&Token::bare(TokenKind::Semi).expect("semi")).is_err());
    assert!(parser.finish().is_err());
}

#[test]
fn tricond_outside_trigger_is_rejected() {
    let err = parse("CONFIG[_!]IDENT(Server)[_!]TRICOND(Server)[_!]COMMAND(port INTEGER)[_!]SEMI[_!]EOF").unwrap_err();
    assert!(err.to_string().contains("'WHEN CHANGE' can only be used with TRIGGER"));
}

#[test]
fn argument_outside_struct_is_rejected() {
    let err = parse("CONFIG[_!]IDENT(Server)[_!]ARGUMENT(size:INTEGER=1)[_!]COMMAND(port INTEGER)[_!]SEMI[_!]EOF").unwrap_err();
    assert!(err.to_string().contains("only STRUCT can have an argument"));
}

#[test]
fn trigger_without_condition_is_rejected() {
    let err = parse("TRIGGER[_!]IDENT(check)[_!]COMMAND(return true;)[_!]SEMI[_!]EOF").unwrap_err();
    assert!(err.to_string().contains("has no WHEN CHANGE condition"));
}

#[test]
fn stream_must_end_with_eof() {
    let err = parse("CONFIG[_!]IDENT(Server)[_!]COMMAND(port INTEGER)[_!]SEMI").unwrap_err();
    assert!(err.to_string().contains("token stream ended without EOF"));
    let err = parse("EOF[_!]SEMI").unwrap_err();
    assert!(matches!(err, CanfigError::Parse { state: State::At(TokenKind::Eof), .. }));
}

#[test]
fn transition_table() {
    use TokenKind as K;
    assert_eq!(transition(State::Start, K::Struct), (State::At(K::Struct), Action::Nothing));
    assert_eq!(
        transition(State::At(K::Struct), K::Ident),
        (State::At(K::Ident), Action::Declare(Handling::Struct))
    );
    assert_eq!(transition(State::At(K::Version), K::String), (State::PushKv, Action::PushKv(K::Version)));
    assert_eq!(transition(State::At(K::Argument), K::Command), (State::PreSql, Action::Body));
    assert_eq!(transition(State::Sql, K::Semi), (State::Start, Action::Emit));
    assert_eq!(transition(State::PushKv, K::Ident), (State::Error, Action::Reject));
    assert_eq!(transition(State::Error, K::Semi), (State::Error, Action::Reject));
}
