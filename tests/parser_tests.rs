//! Grammar and token-tree invariants, driven through the public API.

use liveexpr::{
    compile, parse, DataType, Environment, HostRegistry, Instr, Token, TokenKind, TokenValue,
    Value,
};

/// Walk a tree asserting the structural invariants: no single-child
/// blocks after collapse, no `Skip` tokens, literals carry values.
fn assert_well_formed(token: &Token) {
    assert_ne!(token.kind, TokenKind::Skip, "skip in final tree");
    if token.kind == TokenKind::Block {
        assert_ne!(
            token.children.len(),
            1,
            "uncollapsed single-child block:\n{token}"
        );
    }
    if token.kind == TokenKind::Literal {
        assert_ne!(token.value, TokenValue::None, "literal without value");
    }
    for child in &token.children {
        assert_well_formed(child);
    }
}

#[test]
fn accepted_trees_are_well_formed() {
    let sources = [
        "1",
        "1.5",
        "\"text\"",
        "true",
        "(((42)))",
        "1 + 2 * 3 - 4 / 5 % 6",
        "a <= b && c != d || e > f",
        "- - -1",
        "!flag",
        "++counter",
        "--counter",
        "items[1][2]",
        "grid[1, 2]",
        "obj.a.b.c",
        "f()(1)(2, 3)",
        "new Point(1, 2).x",
        "(float)(x + 1)",
        "a = b = c = 1",
        "lhs.field = rhs[0] = \"v\"",
        "  spaced  +  out  ",
    ];
    for source in sources {
        let tree = parse(source).unwrap_or_else(|e| panic!("{source}: {e}"));
        assert_well_formed(&tree);
    }
}

#[test]
fn spans_cover_their_lexemes() {
    let source = "alpha + beta";
    let tree = parse(source).unwrap();
    assert_eq!(tree.children[0].span.slice(source), "alpha");
    assert_eq!(tree.children[1].span.slice(source), "+");
    assert_eq!(tree.children[2].span.slice(source), "beta");
}

#[test]
fn longer_operators_win_ties() {
    let source = "a <= b";
    let tree = parse(source).unwrap();
    assert_eq!(tree.children[1].span.slice(source), "<=");

    let source = "a < b";
    let tree = parse(source).unwrap();
    assert_eq!(tree.children[1].span.slice(source), "<");
}

#[test]
fn equality_not_mistaken_for_assignment() {
    let source = "a == b";
    let tree = parse(source).unwrap();
    assert!(tree
        .children
        .iter()
        .all(|c| c.kind != TokenKind::Setter));
}

#[test]
fn unary_chain_nests() {
    let tree = parse("- -2").unwrap();
    assert_eq!(tree.children[0].kind, TokenKind::Unary);
    let inner = &tree.children[1];
    assert_eq!(inner.kind, TokenKind::Block);
    assert_eq!(inner.children[0].kind, TokenKind::Unary);
    assert_eq!(inner.children[1].value, TokenValue::Int(2));
}

#[test]
fn increment_token_kind() {
    let tree = parse("++x").unwrap();
    assert_eq!(tree.children[0].kind, TokenKind::Increment);
    let tree = parse("--x").unwrap();
    assert_eq!(tree.children[0].kind, TokenKind::Increment);
}

#[test]
fn cast_head_carries_type_name() {
    let tree = parse("(float)x").unwrap();
    assert_eq!(tree.children[0].kind, TokenKind::ExplicitConversion);
    assert_eq!(tree.children[0].ident(), Some("float"));
}

#[test]
fn string_escape_round_trip() {
    let tree = parse("\"say \\\"hi\\\"\"").unwrap();
    assert_eq!(tree.value, TokenValue::Str("say \"hi\"".to_string()));
}

// =========================================================================
// Literal round-trip: parse(literal(v)) compiles to (typeof(v), [v])
// =========================================================================

fn assert_literal_roundtrip(source: &str, expected: Value) {
    let env = Environment::new();
    let registry = HostRegistry::new();
    let tree = parse(source).unwrap();
    let program = compile(source, &tree, &env, &registry).unwrap();
    assert_eq!(program.static_type, expected.data_type(), "{source}");
    assert_eq!(program.flow.len(), 1, "{source}");
    match &program.flow[0] {
        Instr::Push(value) => assert_eq!(value, &expected, "{source}"),
        other => panic!("{source}: expected PUSH, got {}", other.name()),
    }
}

#[test]
fn primitive_literals_compile_to_single_push() {
    assert_literal_roundtrip("10", Value::Int(10));
    assert_literal_roundtrip("0", Value::Int(0));
    assert_literal_roundtrip("1.25", Value::Float(1.25));
    assert_literal_roundtrip("true", Value::Bool(true));
    assert_literal_roundtrip("false", Value::Bool(false));
    assert_literal_roundtrip("\"abc\"", Value::from("abc"));
    assert_literal_roundtrip("\"\"", Value::from(""));
}

#[test]
fn literal_static_types() {
    let env = Environment::new();
    let registry = HostRegistry::new();
    for (source, expected) in [
        ("1", DataType::Int),
        ("1.0", DataType::Float),
        ("true", DataType::Bool),
        ("\"s\"", DataType::Str),
    ] {
        let tree = parse(source).unwrap();
        let program = compile(source, &tree, &env, &registry).unwrap();
        assert_eq!(program.static_type, expected, "{source}");
    }
}

// =========================================================================
// Negative battery
// =========================================================================

#[test]
fn rejects_with_offset_in_range() {
    for source in [
        "1 +",
        "(1 + 2",
        "\"abc",
        "",
        "+",
        "a b",
        "f(,)",
        "x = ",
        "1..2",
        "a.[1]",
    ] {
        let err = parse(source).unwrap_err();
        assert!(
            (err.position as usize) <= source.len(),
            "{source}: offset {} out of range",
            err.position
        );
    }
}

#[test]
fn error_carries_partial_tree() {
    let err = parse("10 <").unwrap_err();
    assert!(err.partial.contains("Literal"), "{}", err.partial);
}

#[test]
fn whole_input_must_be_consumed() {
    // `1 1` parses a literal then stops; the leftover makes it an error.
    assert!(parse("1 1").is_err());
    assert!(parse("true)").is_err());
}
