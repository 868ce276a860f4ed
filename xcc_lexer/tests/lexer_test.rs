//! Lexer integration tests

use pretty_assertions::assert_eq;
use xcc_lexer::{Lexer, TokenKind};

fn kinds(source: &str) -> Vec<TokenKind> {
    let mut lexer = Lexer::new(source, 0);
    lexer
        .tokenize()
        .expect("lexing should succeed")
        .into_iter()
        .map(|t| t.value)
        .collect()
}

#[test]
fn punctuators_and_keywords() {
    assert_eq!(
        kinds("if (a <= b) return a << 2;"),
        vec![
            TokenKind::KeywordIf,
            TokenKind::LeftParen,
            TokenKind::Identifier("a".into()),
            TokenKind::LessEqual,
            TokenKind::Identifier("b".into()),
            TokenKind::RightParen,
            TokenKind::KeywordReturn,
            TokenKind::Identifier("a".into()),
            TokenKind::LeftShift,
            TokenKind::IntLiteral(2),
            TokenKind::Semicolon,
            TokenKind::EndOfFile,
        ]
    );
}

#[test]
fn compound_operators_before_prefixes() {
    assert_eq!(
        kinds("a += b -- -> ... . && & || |"),
        vec![
            TokenKind::Identifier("a".into()),
            TokenKind::PlusAssign,
            TokenKind::Identifier("b".into()),
            TokenKind::Decrement,
            TokenKind::Arrow,
            TokenKind::Ellipsis,
            TokenKind::Dot,
            TokenKind::LogicalAnd,
            TokenKind::Ampersand,
            TokenKind::LogicalOr,
            TokenKind::Pipe,
            TokenKind::EndOfFile,
        ]
    );
}

#[test]
fn numeric_literals() {
    assert_eq!(
        kinds("0 42 0x2A 052 42L 42u 4294967296"),
        vec![
            TokenKind::IntLiteral(0),
            TokenKind::IntLiteral(42),
            TokenKind::IntLiteral(42),
            TokenKind::IntLiteral(42),
            TokenKind::LongLiteral(42),
            TokenKind::UnsignedLiteral(42),
            // Does not fit in `int`, so it becomes `long`.
            TokenKind::LongLiteral(4294967296),
            TokenKind::EndOfFile,
        ]
    );
}

#[test]
fn string_and_char_literals() {
    assert_eq!(
        kinds(r#""hi\n" 'a' '\0' '\x41'"#),
        vec![
            TokenKind::StrLiteral(b"hi\n".to_vec()),
            TokenKind::CharLiteral(b'a'),
            TokenKind::CharLiteral(0),
            TokenKind::CharLiteral(0x41),
            TokenKind::EndOfFile,
        ]
    );
}

#[test]
fn comments_are_skipped_and_lines_counted() {
    let mut lexer = Lexer::new("// first\n/* a\nb */ x", 0);
    let tokens = lexer.tokenize().unwrap();
    assert_eq!(tokens[0].value, TokenKind::Identifier("x".into()));
    assert_eq!(tokens[0].span.start.line, 3);
}

#[test]
fn lex_errors() {
    for (source, needle) in [
        ("@", "unexpected character"),
        ("\"abc", "unterminated string"),
        ("'a", "unterminated character"),
        ("'\\q'", "bad escape"),
        ("99999999999999999999", "integer out of range"),
        ("/* no end", "unterminated block comment"),
    ] {
        let err = Lexer::new(source, 0).tokenize().unwrap_err();
        assert!(
            err.to_string().contains(needle),
            "{:?}: expected `{}` in `{}`",
            source,
            needle,
            err
        );
    }
}

#[test]
fn token_round_trip() {
    // Re-serializing the token stream and re-lexing it yields the same
    // kinds, modulo whitespace and comments.
    let source = "int main(){char s[]=\"hi\";return s[0]+sizeof(s)*2 /* c */;}";
    let first = kinds(source);
    let rendered = first
        .iter()
        .map(|k| k.to_string())
        .collect::<Vec<_>>()
        .join(" ");
    let second = kinds(&rendered);
    assert_eq!(first, second);
}
