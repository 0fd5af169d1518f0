//! Recursive-descent combinator parser.
//!
//! The parser is a small combinator machine over the raw input: `matches`
//! consumes literal text, `and`/`or`/`zero_or_more` compose rules with
//! backtracking, and `block` brackets a rule with an in-progress [`Token`]
//! that is relabelled or structurally collapsed on success. Rules are
//! plain function pointers, so the whole grammar lives in
//! [`grammar`](self::grammar) as a set of small functions.
//!
//! Failure restores the cursor and discards any tokens appended during the
//! failed attempt; the furthest offset ever reached is kept for error
//! reporting.

mod grammar;
pub mod token;

pub use token::{Token, TokenKind, TokenValue};

use crate::compiler::{self, CompiledExpr};
use crate::env::Environment;
use crate::error::{ExprError, ParseError};
use crate::registry::HostRegistry;
use crate::span::Span;

/// A grammar rule. Non-capturing closures coerce to this, which keeps the
/// combinator calls free of allocation.
pub(crate) type Rule = for<'s, 'p> fn(&'p mut Parser<'s>) -> bool;

/// The parser over one input expression.
///
/// Also the convenience entry point: with an environment and registry
/// attached, [`Parser::compile`] runs parse and compile in one step.
pub struct Parser<'a> {
    source: &'a str,
    env: Option<&'a Environment>,
    registry: Option<&'a HostRegistry>,
    cursor: usize,
    furthest: usize,
    stack: Vec<Token>,
}

impl<'a> Parser<'a> {
    /// Create a parser over `source`.
    pub fn new(source: &'a str) -> Self {
        Self {
            source,
            env: None,
            registry: None,
            cursor: 0,
            furthest: 0,
            stack: Vec::new(),
        }
    }

    /// Create a parser that can also compile, resolving identifiers
    /// against `env` and host types against `registry`.
    pub fn with_host(
        source: &'a str,
        env: &'a Environment,
        registry: &'a HostRegistry,
    ) -> Self {
        Self {
            source,
            env: Some(env),
            registry: Some(registry),
            cursor: 0,
            furthest: 0,
            stack: Vec::new(),
        }
    }

    /// The input text.
    pub fn source(&self) -> &'a str {
        self.source
    }

    /// Parse the input into a token tree.
    ///
    /// Fails unless the grammar accepts a span covering the entire input.
    pub fn parse(&mut self) -> Result<Token, ParseError> {
        self.cursor = 0;
        self.furthest = 0;
        self.stack.clear();
        self.stack.push(Token::block(0));

        let accepted = grammar::expression(self);

        let Some(mut root) = self.stack.pop() else {
            return Err(self.reject(String::new()));
        };
        if accepted && self.cursor == self.source.len() {
            if let Some(tree) = root.children.pop() {
                if root.children.is_empty() {
                    return Ok(tree);
                }
                root.children.push(tree);
            }
        }
        Err(self.reject(root.dump()))
    }

    /// Parse and compile in one step.
    ///
    /// Uses the attached environment and registry; either defaults to
    /// empty, which is enough for pure-primitive expressions.
    pub fn compile(&mut self) -> Result<CompiledExpr, ExprError> {
        let token = self.parse()?;
        let empty_env;
        let env = match self.env {
            Some(env) => env,
            None => {
                empty_env = Environment::new();
                &empty_env
            }
        };
        let empty_registry;
        let registry = match self.registry {
            Some(registry) => registry,
            None => {
                empty_registry = HostRegistry::new();
                &empty_registry
            }
        };
        Ok(compiler::compile(self.source, &token, env, registry)?)
    }

    fn reject(&self, partial: String) -> ParseError {
        ParseError {
            position: self.furthest.min(self.source.len()) as u32,
            partial,
        }
    }

    // =========================================================================
    // Combinators
    // =========================================================================

    /// If the input at the cursor equals `text`, consume it and append a
    /// token of `kind` (nothing for `Skip`).
    pub(crate) fn matches(&mut self, text: &str, kind: TokenKind) -> bool {
        if !self.source[self.cursor..].starts_with(text) {
            return false;
        }
        let start = self.cursor;
        self.cursor += text.len();
        self.note_progress();
        if kind != TokenKind::Skip {
            self.push_token(Token::new(
                kind,
                TokenValue::None,
                Span::new(start as u32, text.len() as u32),
            ));
        }
        true
    }

    /// Run each rule in sequence. On any failure, restore the cursor and
    /// discard tokens appended to the current block during the attempt.
    pub(crate) fn and(&mut self, rules: &[Rule]) -> bool {
        let cursor = self.cursor;
        let children = self.mark();
        for rule in rules {
            if !rule(self) {
                self.cursor = cursor;
                self.rewind(children);
                return false;
            }
        }
        true
    }

    /// Try each rule in order from the saved cursor; first success wins.
    pub(crate) fn or(&mut self, rules: &[Rule]) -> bool {
        let cursor = self.cursor;
        let children = self.mark();
        for rule in rules {
            if rule(self) {
                return true;
            }
            self.cursor = cursor;
            self.rewind(children);
        }
        false
    }

    /// Repeatedly run the rule sequence until it fails. Always succeeds.
    pub(crate) fn zero_or_more(&mut self, rules: &[Rule]) -> bool {
        while self.and(rules) {}
        true
    }

    /// Bracket `body` with a new `Block` token as the current parent.
    ///
    /// On success the block is relabelled to `kind`, its span is set to
    /// the consumed range and `parse` (if given) turns the captured text
    /// into the token's value. A block that stays `Block` is collapsed:
    /// zero children vanish, a single child replaces the block.
    pub(crate) fn block(
        &mut self,
        body: Rule,
        kind: TokenKind,
        parse: Option<fn(&str) -> Option<TokenValue>>,
    ) -> bool {
        let start = self.cursor;
        self.stack.push(Token::block(start as u32));
        let accepted = body(self);
        let Some(mut token) = self.stack.pop() else {
            return false;
        };
        if !accepted {
            self.cursor = start;
            return false;
        }
        token.span = Span::new(start as u32, (self.cursor - start) as u32);
        if kind == TokenKind::Block {
            match token.children.len() {
                0 => {}
                1 => {
                    if let Some(only) = token.children.pop() {
                        self.push_token(only);
                    }
                }
                _ => self.push_token(token),
            }
            return true;
        }
        token.kind = kind;
        if let Some(parse_value) = parse {
            match parse_value(token.span.slice(self.source)) {
                Some(value) => token.value = value,
                None => {
                    self.cursor = start;
                    return false;
                }
            }
        }
        self.push_token(token);
        true
    }

    // =========================================================================
    // Scanners
    // =========================================================================

    /// Consume any run of whitespace. Always succeeds.
    pub(crate) fn space(&mut self) -> bool {
        while self
            .peek()
            .is_some_and(|c| matches!(c, ' ' | '\t' | '\r' | '\n'))
        {
            self.cursor += 1;
        }
        self.note_progress();
        true
    }

    /// Consume at least one whitespace character.
    pub(crate) fn space1(&mut self) -> bool {
        let start = self.cursor;
        self.space();
        self.cursor > start
    }

    /// Consume an identifier: `[A-Za-z_][A-Za-z0-9]*`.
    pub(crate) fn scan_identifier(&mut self) -> bool {
        if !self
            .peek()
            .is_some_and(|c| c.is_ascii_alphabetic() || c == '_')
        {
            return false;
        }
        self.cursor += 1;
        while self.peek().is_some_and(|c| c.is_ascii_alphanumeric()) {
            self.cursor += 1;
        }
        self.note_progress();
        true
    }

    /// Consume a run of decimal digits.
    pub(crate) fn scan_integer(&mut self) -> bool {
        let start = self.cursor;
        while self.peek().is_some_and(|c| c.is_ascii_digit()) {
            self.cursor += 1;
        }
        self.note_progress();
        self.cursor > start
    }

    /// Consume `digits '.' digits`; both sides of the point required.
    pub(crate) fn scan_float(&mut self) -> bool {
        let start = self.cursor;
        if !self.scan_integer() {
            return false;
        }
        if self.peek() != Some('.') {
            self.cursor = start;
            return false;
        }
        self.cursor += 1;
        if !self.scan_integer() {
            self.cursor = start;
            return false;
        }
        true
    }

    /// Consume a double-quoted string literal with `\"` escapes.
    pub(crate) fn scan_string(&mut self) -> bool {
        let start = self.cursor;
        if self.peek() != Some('"') {
            return false;
        }
        self.cursor += 1;
        loop {
            match self.peek() {
                None => {
                    self.cursor = start;
                    return false;
                }
                Some('"') => {
                    self.cursor += 1;
                    self.note_progress();
                    return true;
                }
                Some('\\') if self.peek_at(1) == Some('"') => {
                    self.cursor += 2;
                }
                Some(c) => {
                    self.cursor += c.len_utf8();
                }
            }
        }
    }

    // =========================================================================
    // Internals
    // =========================================================================

    fn peek(&self) -> Option<char> {
        self.source[self.cursor..].chars().next()
    }

    fn peek_at(&self, n: usize) -> Option<char> {
        self.source[self.cursor..].chars().nth(n)
    }

    fn note_progress(&mut self) {
        if self.cursor > self.furthest {
            self.furthest = self.cursor;
        }
    }

    fn push_token(&mut self, token: Token) {
        if let Some(parent) = self.stack.last_mut() {
            parent.children.push(token);
        }
    }

    /// Number of children of the current block, for backtrack rewinds.
    fn mark(&self) -> usize {
        self.stack.last().map_or(0, |b| b.children.len())
    }

    fn rewind(&mut self, children: usize) {
        if let Some(parent) = self.stack.last_mut() {
            parent.children.truncate(children);
        }
    }
}

/// Parse `source` into a token tree.
pub fn parse(source: &str) -> Result<Token, ParseError> {
    Parser::new(source).parse()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kinds(token: &Token) -> Vec<TokenKind> {
        token.children.iter().map(|c| c.kind).collect()
    }

    #[test]
    fn literal_collapses_to_leaf() {
        let tree = parse("10").unwrap();
        assert_eq!(tree.kind, TokenKind::Literal);
        assert_eq!(tree.value, TokenValue::Int(10));
        assert!(tree.children.is_empty());
    }

    #[test]
    fn float_requires_digits_both_sides() {
        assert_eq!(parse("1.5").unwrap().value, TokenValue::Float(1.5));
        assert!(parse("1.").is_err());
        assert!(parse(".5").is_err());
    }

    #[test]
    fn string_literal_unescapes() {
        let tree = parse("\"a\\\"b\"").unwrap();
        assert_eq!(tree.value, TokenValue::Str("a\"b".to_string()));
    }

    #[test]
    fn binary_chain_shape() {
        let tree = parse("1 + 2 - 3").unwrap();
        assert_eq!(tree.kind, TokenKind::Block);
        assert_eq!(
            kinds(&tree),
            vec![
                TokenKind::Literal,
                TokenKind::Binary,
                TokenKind::Literal,
                TokenKind::Binary,
                TokenKind::Literal,
            ]
        );
    }

    #[test]
    fn no_single_child_blocks_after_collapse() {
        fn check(token: &Token) {
            if token.kind == TokenKind::Block {
                assert_ne!(token.children.len(), 1, "uncollapsed block:\n{token}");
            }
            assert_ne!(token.kind, TokenKind::Skip);
            for child in &token.children {
                check(child);
            }
        }
        for source in [
            "1",
            "(1)",
            "((1 + 2))",
            "-x.a[1] * f(2, 3) <= 4 && done",
            "a = b = \"s\"",
            "new Point(1, 2).x",
        ] {
            check(&parse(source).unwrap());
        }
    }

    #[test]
    fn precedence_nests_terms() {
        // 1 + 2 * 3: the additive chain holds the term as one child.
        let tree = parse("1 + 2 * 3").unwrap();
        assert_eq!(tree.children.len(), 3);
        let term = &tree.children[2];
        assert_eq!(term.kind, TokenKind::Block);
        assert_eq!(
            kinds(term),
            vec![TokenKind::Literal, TokenKind::Binary, TokenKind::Literal]
        );
    }

    #[test]
    fn operator_lexemes_recoverable_from_spans() {
        let source = "1 <= 2 == true";
        let tree = parse(source).unwrap();
        let ops: Vec<&str> = tree
            .children
            .iter()
            .filter(|c| c.kind == TokenKind::Binary)
            .map(|c| c.span.slice(source))
            .collect();
        assert_eq!(ops, vec!["<=", "=="]);
    }

    #[test]
    fn assignment_is_right_associative() {
        let tree = parse("a = b = 1").unwrap();
        assert_eq!(
            kinds(&tree),
            vec![TokenKind::Reference, TokenKind::Setter, TokenKind::Block]
        );
        let inner = &tree.children[2];
        assert_eq!(
            kinds(inner),
            vec![TokenKind::Reference, TokenKind::Setter, TokenKind::Literal]
        );
    }

    #[test]
    fn member_and_index_postfixes() {
        let tree = parse("test[10].field").unwrap();
        assert_eq!(
            kinds(&tree),
            vec![TokenKind::Reference, TokenKind::Index, TokenKind::MemberRef]
        );
        assert_eq!(tree.children[2].ident(), Some("field"));
    }

    #[test]
    fn call_arguments_in_source_order() {
        let tree = parse("max(1, 2)").unwrap();
        assert_eq!(kinds(&tree), vec![TokenKind::Reference, TokenKind::Function]);
        let call = &tree.children[1];
        assert_eq!(call.children.len(), 2);
        assert_eq!(call.children[0].value, TokenValue::Int(1));
        assert_eq!(call.children[1].value, TokenValue::Int(2));
    }

    #[test]
    fn empty_argument_list() {
        let tree = parse("f()").unwrap();
        let call = &tree.children[1];
        assert_eq!(call.kind, TokenKind::Function);
        assert!(call.children.is_empty());
    }

    #[test]
    fn constructor_captures_type_name() {
        let tree = parse("new Point(1, 2)").unwrap();
        assert_eq!(tree.kind, TokenKind::Constructor);
        assert_eq!(tree.ident(), Some("Point"));
        assert_eq!(tree.children.len(), 2);
    }

    #[test]
    fn new_requires_whitespace() {
        // Without it the word is an ordinary reference.
        let tree = parse("newton").unwrap();
        assert_eq!(tree.kind, TokenKind::Reference);
        assert_eq!(tree.ident(), Some("newton"));
    }

    #[test]
    fn cast_binds_one_factor() {
        let source = "(float)1 / 2";
        let tree = parse(source).unwrap();
        // Term chain: [cast-block, '/', 2]
        assert_eq!(tree.children.len(), 3);
        let cast = &tree.children[0];
        assert_eq!(cast.children[0].kind, TokenKind::ExplicitConversion);
        assert_eq!(cast.children[0].ident(), Some("float"));
    }

    #[test]
    fn parenthesized_value_is_not_a_cast() {
        // `(x) + 1` cannot be a cast: `+ 1` is no factor.
        let tree = parse("(x) + 1").unwrap();
        assert_eq!(
            kinds(&tree),
            vec![TokenKind::Reference, TokenKind::Binary, TokenKind::Literal]
        );
    }

    #[test]
    fn rejects_trailing_operator() {
        let err = parse("1 +").unwrap_err();
        assert!(err.position as usize <= "1 +".len());
    }

    #[test]
    fn rejects_unbalanced_paren() {
        assert!(parse("(1 + 2").is_err());
    }

    #[test]
    fn rejects_unterminated_string() {
        assert!(parse("\"abc").is_err());
    }

    #[test]
    fn rejects_empty_input() {
        let err = parse("").unwrap_err();
        assert_eq!(err.position, 0);
    }

    #[test]
    fn reported_offset_within_input() {
        for source in ["1 +", "(1 + 2", "\"abc", "a.b.", "f(1,"] {
            let err = parse(source).unwrap_err();
            assert!(err.position as usize <= source.len(), "{source}");
        }
    }

    #[test]
    fn partial_tree_attached_to_error() {
        let err = parse("1 + ").unwrap_err();
        assert!(err.partial.contains("Literal"));
    }
}
