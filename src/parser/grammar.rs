//! Grammar productions, precedence low → high.
//!
//! ```text
//! Expression     := RSExpression ('=' Expression)?      -- right-associative
//! RSExpression   := Comparison (('&&'|'||') Comparison)*
//! Comparison     := Additive (('<='|'>='|'=='|'!='|'<'|'>') Additive)*
//! Additive       := Term (('+'|'-') Term)*
//! Term           := Factor (('*'|'/'|'%') Factor)*
//! Factor         := space (BlockValue | Unary) space
//! Unary          := ('++'|'--'|'-'|'!') space (BlockValue | Unary)
//! BlockValue     := Primary (MemberRef | FunctionArgs | Index)*
//! Primary        := ExplicitConversion | Number | String | Bool
//!                |  Constructor | Reference | '(' Expression ')'
//! ```
//!
//! Longer lexemes are tried first wherever two operators share a prefix.
//! The assignment left side is parsed with the ordinary `RSExpression`
//! machinery (which subsumes `Reference (MemberRef|Index)*` chains); the
//! compiler validates that it actually produced a place, so `1 = 2` is a
//! compile error rather than a parse error.

use super::token::{TokenKind, TokenValue};
use super::Parser;

// =========================================================================
// Expression levels
// =========================================================================

pub(crate) fn expression(p: &mut Parser) -> bool {
    p.block(expression_body, TokenKind::Block, None)
}

fn expression_body(p: &mut Parser) -> bool {
    if !rs_expression(p) {
        return false;
    }
    // At most one iteration matches; the right side recurses for chains
    // like `a = b = c`.
    p.zero_or_more(&[setter_op, expression]);
    true
}

fn setter_op(p: &mut Parser) -> bool {
    p.matches("=", TokenKind::Setter)
}

fn rs_expression(p: &mut Parser) -> bool {
    p.block(rs_expression_body, TokenKind::Block, None)
}

fn rs_expression_body(p: &mut Parser) -> bool {
    if !comparison(p) {
        return false;
    }
    p.zero_or_more(&[logical_op, comparison]);
    true
}

fn logical_op(p: &mut Parser) -> bool {
    p.matches("&&", TokenKind::Binary) || p.matches("||", TokenKind::Binary)
}

fn comparison(p: &mut Parser) -> bool {
    p.block(comparison_body, TokenKind::Block, None)
}

fn comparison_body(p: &mut Parser) -> bool {
    if !additive(p) {
        return false;
    }
    p.zero_or_more(&[comparison_op, additive]);
    true
}

fn comparison_op(p: &mut Parser) -> bool {
    p.matches("<=", TokenKind::Binary)
        || p.matches(">=", TokenKind::Binary)
        || p.matches("==", TokenKind::Binary)
        || p.matches("!=", TokenKind::Binary)
        || p.matches("<", TokenKind::Binary)
        || p.matches(">", TokenKind::Binary)
}

fn additive(p: &mut Parser) -> bool {
    p.block(additive_body, TokenKind::Block, None)
}

fn additive_body(p: &mut Parser) -> bool {
    if !term(p) {
        return false;
    }
    p.zero_or_more(&[additive_op, term]);
    true
}

fn additive_op(p: &mut Parser) -> bool {
    p.matches("+", TokenKind::Binary) || p.matches("-", TokenKind::Binary)
}

fn term(p: &mut Parser) -> bool {
    p.block(term_body, TokenKind::Block, None)
}

fn term_body(p: &mut Parser) -> bool {
    if !factor(p) {
        return false;
    }
    p.zero_or_more(&[term_op, factor]);
    true
}

fn term_op(p: &mut Parser) -> bool {
    p.matches("*", TokenKind::Binary)
        || p.matches("/", TokenKind::Binary)
        || p.matches("%", TokenKind::Binary)
}

// =========================================================================
// Factors
// =========================================================================

fn factor(p: &mut Parser) -> bool {
    p.block(factor_body, TokenKind::Block, None)
}

fn factor_body(p: &mut Parser) -> bool {
    p.space();
    if !p.or(&[block_value, unary]) {
        return false;
    }
    p.space();
    true
}

fn unary(p: &mut Parser) -> bool {
    p.block(unary_body, TokenKind::Block, None)
}

fn unary_body(p: &mut Parser) -> bool {
    let matched = p.matches("++", TokenKind::Increment)
        || p.matches("--", TokenKind::Increment)
        || p.matches("-", TokenKind::Unary)
        || p.matches("!", TokenKind::Unary);
    if !matched {
        return false;
    }
    p.space();
    p.or(&[block_value, unary])
}

fn block_value(p: &mut Parser) -> bool {
    p.block(block_value_body, TokenKind::Block, None)
}

fn block_value_body(p: &mut Parser) -> bool {
    if !primary(p) {
        return false;
    }
    p.zero_or_more(&[postfix]);
    true
}

fn postfix(p: &mut Parser) -> bool {
    p.or(&[member_ref, function_args, index])
}

// =========================================================================
// Primaries
// =========================================================================

fn primary(p: &mut Parser) -> bool {
    p.or(&[
        explicit_conversion,
        number,
        string_lit,
        bool_lit,
        constructor,
        reference,
        parenthesized,
    ])
}

fn explicit_conversion(p: &mut Parser) -> bool {
    p.and(&[cast_head, factor])
}

fn cast_head(p: &mut Parser) -> bool {
    p.block(
        cast_head_body,
        TokenKind::ExplicitConversion,
        Some(parse_cast_ident),
    )
}

fn cast_head_body(p: &mut Parser) -> bool {
    if !p.matches("(", TokenKind::Skip) {
        return false;
    }
    p.space();
    if !p.scan_identifier() {
        return false;
    }
    p.space();
    p.matches(")", TokenKind::Skip)
}

fn number(p: &mut Parser) -> bool {
    // Float first: `1.5` must not stop at the integer prefix.
    p.or(&[float_lit, int_lit])
}

fn float_lit(p: &mut Parser) -> bool {
    p.block(scan_float_rule, TokenKind::Literal, Some(parse_float))
}

fn int_lit(p: &mut Parser) -> bool {
    p.block(scan_integer_rule, TokenKind::Literal, Some(parse_int))
}

fn string_lit(p: &mut Parser) -> bool {
    p.block(scan_string_rule, TokenKind::Literal, Some(parse_string))
}

fn bool_lit(p: &mut Parser) -> bool {
    p.block(bool_lit_body, TokenKind::Literal, Some(parse_bool))
}

fn bool_lit_body(p: &mut Parser) -> bool {
    p.matches("true", TokenKind::Skip) || p.matches("false", TokenKind::Skip)
}

fn constructor(p: &mut Parser) -> bool {
    p.block(constructor_body, TokenKind::Constructor, Some(parse_ctor_name))
}

fn constructor_body(p: &mut Parser) -> bool {
    if !p.matches("new", TokenKind::Skip) {
        return false;
    }
    if !p.space1() {
        return false;
    }
    if !p.scan_identifier() {
        return false;
    }
    p.space();
    argument_list(p, "(", ")")
}

fn reference(p: &mut Parser) -> bool {
    p.block(scan_identifier_rule, TokenKind::Reference, Some(parse_ident))
}

fn parenthesized(p: &mut Parser) -> bool {
    p.and(&[open_paren, expression, close_paren])
}

// =========================================================================
// Postfixes
// =========================================================================

fn member_ref(p: &mut Parser) -> bool {
    p.and(&[dot, member_name])
}

fn member_name(p: &mut Parser) -> bool {
    p.block(scan_identifier_rule, TokenKind::MemberRef, Some(parse_ident))
}

fn function_args(p: &mut Parser) -> bool {
    p.block(paren_args, TokenKind::Function, None)
}

fn index(p: &mut Parser) -> bool {
    p.block(bracket_args, TokenKind::Index, None)
}

fn argument_list(p: &mut Parser, open: &str, close: &str) -> bool {
    if !p.matches(open, TokenKind::Skip) {
        return false;
    }
    p.space();
    if p.matches(close, TokenKind::Skip) {
        return true;
    }
    if !expression(p) {
        return false;
    }
    p.zero_or_more(&[comma, expression]);
    p.matches(close, TokenKind::Skip)
}

fn comma(p: &mut Parser) -> bool {
    p.matches(",", TokenKind::Skip)
}

fn paren_args(p: &mut Parser) -> bool {
    argument_list(p, "(", ")")
}

fn bracket_args(p: &mut Parser) -> bool {
    argument_list(p, "[", "]")
}

fn open_paren(p: &mut Parser) -> bool {
    p.matches("(", TokenKind::Skip)
}

fn close_paren(p: &mut Parser) -> bool {
    p.matches(")", TokenKind::Skip)
}

fn dot(p: &mut Parser) -> bool {
    p.matches(".", TokenKind::Skip)
}

fn scan_identifier_rule(p: &mut Parser) -> bool {
    p.scan_identifier()
}

fn scan_integer_rule(p: &mut Parser) -> bool {
    p.scan_integer()
}

fn scan_float_rule(p: &mut Parser) -> bool {
    p.scan_float()
}

fn scan_string_rule(p: &mut Parser) -> bool {
    p.scan_string()
}

// =========================================================================
// Literal value parsing
// =========================================================================

fn parse_int(text: &str) -> Option<TokenValue> {
    text.parse::<i32>().ok().map(TokenValue::Int)
}

fn parse_float(text: &str) -> Option<TokenValue> {
    text.parse::<f32>().ok().map(TokenValue::Float)
}

fn parse_bool(text: &str) -> Option<TokenValue> {
    match text {
        "true" => Some(TokenValue::Bool(true)),
        "false" => Some(TokenValue::Bool(false)),
        _ => None,
    }
}

fn parse_string(text: &str) -> Option<TokenValue> {
    let inner = text.strip_prefix('"')?.strip_suffix('"')?;
    Some(TokenValue::Str(inner.replace("\\\"", "\"")))
}

fn parse_ident(text: &str) -> Option<TokenValue> {
    let name = text.trim();
    if name.is_empty() {
        return None;
    }
    Some(TokenValue::Ident(name.to_string()))
}

/// Extract the type name out of a captured cast head like `( float )`.
fn parse_cast_ident(text: &str) -> Option<TokenValue> {
    let inner = text.trim().strip_prefix('(')?.strip_suffix(')')?;
    parse_ident(inner)
}

/// Extract the type name out of a captured constructor like `new Foo(1)`.
fn parse_ctor_name(text: &str) -> Option<TokenValue> {
    let rest = text.strip_prefix("new")?.trim_start();
    let end = rest
        .find(|c: char| !c.is_ascii_alphanumeric() && c != '_')
        .unwrap_or(rest.len());
    parse_ident(&rest[..end])
}
