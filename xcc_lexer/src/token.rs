//! Token definitions for the C subset accepted by xcc

use serde::{Deserialize, Serialize};
use std::fmt;
use xcc_common::{Span, Spanned};

/// Token types produced by the lexer.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TokenKind {
    // Literals
    IntLiteral(i64),
    LongLiteral(i64),
    UnsignedLiteral(i64),
    CharLiteral(u8),
    /// Raw string bytes; the terminating NUL is not stored, the backend
    /// appends it on emission.
    StrLiteral(Vec<u8>),

    // Identifiers
    Identifier(String),

    // Keywords
    KeywordIf,
    KeywordElse,
    KeywordSwitch,
    KeywordCase,
    KeywordDefault,
    KeywordDo,
    KeywordWhile,
    KeywordFor,
    KeywordBreak,
    KeywordContinue,
    KeywordReturn,
    KeywordGoto,
    KeywordVoid,
    KeywordChar,
    KeywordShort,
    KeywordInt,
    KeywordLong,
    KeywordUnsigned,
    KeywordConst,
    KeywordStatic,
    KeywordExtern,
    KeywordStruct,
    KeywordUnion,
    KeywordEnum,
    KeywordSizeof,
    KeywordTypedef,

    // Operators
    Plus,              // +
    Minus,             // -
    Multiply,          // *
    Divide,            // /
    Modulo,            // %
    Assign,            // =
    Equal,             // ==
    NotEqual,          // !=
    Less,              // <
    LessEqual,         // <=
    Greater,           // >
    GreaterEqual,      // >=
    LogicalAnd,        // &&
    LogicalOr,         // ||
    LogicalNot,        // !
    Ampersand,         // &
    Pipe,              // |
    Caret,             // ^
    Tilde,             // ~
    LeftShift,         // <<
    RightShift,        // >>
    PlusAssign,        // +=
    MinusAssign,       // -=
    MultiplyAssign,    // *=
    DivideAssign,      // /=
    ModuloAssign,      // %=
    Increment,         // ++
    Decrement,         // --
    Arrow,             // ->
    Question,          // ?
    Dot,               // .
    Ellipsis,          // ...

    // Delimiters
    LeftParen,         // (
    RightParen,        // )
    LeftBrace,         // {
    RightBrace,        // }
    LeftBracket,       // [
    RightBracket,      // ]
    Semicolon,         // ;
    Comma,             // ,
    Colon,             // :

    EndOfFile,
}

/// Fixed keyword table consulted after scanning an identifier.
pub fn keyword_kind(ident: &str) -> Option<TokenKind> {
    let kind = match ident {
        "if" => TokenKind::KeywordIf,
        "else" => TokenKind::KeywordElse,
        "switch" => TokenKind::KeywordSwitch,
        "case" => TokenKind::KeywordCase,
        "default" => TokenKind::KeywordDefault,
        "do" => TokenKind::KeywordDo,
        "while" => TokenKind::KeywordWhile,
        "for" => TokenKind::KeywordFor,
        "break" => TokenKind::KeywordBreak,
        "continue" => TokenKind::KeywordContinue,
        "return" => TokenKind::KeywordReturn,
        "goto" => TokenKind::KeywordGoto,
        "void" => TokenKind::KeywordVoid,
        "char" => TokenKind::KeywordChar,
        "short" => TokenKind::KeywordShort,
        "int" => TokenKind::KeywordInt,
        "long" => TokenKind::KeywordLong,
        "unsigned" => TokenKind::KeywordUnsigned,
        "const" => TokenKind::KeywordConst,
        "static" => TokenKind::KeywordStatic,
        "extern" => TokenKind::KeywordExtern,
        "struct" => TokenKind::KeywordStruct,
        "union" => TokenKind::KeywordUnion,
        "enum" => TokenKind::KeywordEnum,
        "sizeof" => TokenKind::KeywordSizeof,
        "typedef" => TokenKind::KeywordTypedef,
        _ => return None,
    };
    Some(kind)
}

impl TokenKind {
    pub fn is_keyword(&self) -> bool {
        matches!(
            self,
            TokenKind::KeywordIf
                | TokenKind::KeywordElse
                | TokenKind::KeywordSwitch
                | TokenKind::KeywordCase
                | TokenKind::KeywordDefault
                | TokenKind::KeywordDo
                | TokenKind::KeywordWhile
                | TokenKind::KeywordFor
                | TokenKind::KeywordBreak
                | TokenKind::KeywordContinue
                | TokenKind::KeywordReturn
                | TokenKind::KeywordGoto
                | TokenKind::KeywordVoid
                | TokenKind::KeywordChar
                | TokenKind::KeywordShort
                | TokenKind::KeywordInt
                | TokenKind::KeywordLong
                | TokenKind::KeywordUnsigned
                | TokenKind::KeywordConst
                | TokenKind::KeywordStatic
                | TokenKind::KeywordExtern
                | TokenKind::KeywordStruct
                | TokenKind::KeywordUnion
                | TokenKind::KeywordEnum
                | TokenKind::KeywordSizeof
                | TokenKind::KeywordTypedef
        )
    }

    pub fn is_literal(&self) -> bool {
        matches!(
            self,
            TokenKind::IntLiteral(_)
                | TokenKind::LongLiteral(_)
                | TokenKind::UnsignedLiteral(_)
                | TokenKind::CharLiteral(_)
                | TokenKind::StrLiteral(_)
        )
    }
}

impl fmt::Display for TokenKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TokenKind::IntLiteral(v) => write!(f, "{}", v),
            TokenKind::LongLiteral(v) => write!(f, "{}L", v),
            TokenKind::UnsignedLiteral(v) => write!(f, "{}U", v),
            TokenKind::CharLiteral(c) => write!(f, "{}", *c as i64),
            TokenKind::StrLiteral(bytes) => {
                write!(f, "\"")?;
                for &b in bytes {
                    match b {
                        b'\n' => write!(f, "\\n")?,
                        b'\t' => write!(f, "\\t")?,
                        b'\r' => write!(f, "\\r")?,
                        b'\\' => write!(f, "\\\\")?,
                        b'"' => write!(f, "\\\"")?,
                        0 => write!(f, "\\0")?,
                        b if b.is_ascii_graphic() || b == b' ' => write!(f, "{}", b as char)?,
                        b => write!(f, "\\x{:02x}", b)?,
                    }
                }
                write!(f, "\"")
            }
            TokenKind::Identifier(name) => write!(f, "{}", name),
            other => {
                let text = match other {
                    TokenKind::KeywordIf => "if",
                    TokenKind::KeywordElse => "else",
                    TokenKind::KeywordSwitch => "switch",
                    TokenKind::KeywordCase => "case",
                    TokenKind::KeywordDefault => "default",
                    TokenKind::KeywordDo => "do",
                    TokenKind::KeywordWhile => "while",
                    TokenKind::KeywordFor => "for",
                    TokenKind::KeywordBreak => "break",
                    TokenKind::KeywordContinue => "continue",
                    TokenKind::KeywordReturn => "return",
                    TokenKind::KeywordGoto => "goto",
                    TokenKind::KeywordVoid => "void",
                    TokenKind::KeywordChar => "char",
                    TokenKind::KeywordShort => "short",
                    TokenKind::KeywordInt => "int",
                    TokenKind::KeywordLong => "long",
                    TokenKind::KeywordUnsigned => "unsigned",
                    TokenKind::KeywordConst => "const",
                    TokenKind::KeywordStatic => "static",
                    TokenKind::KeywordExtern => "extern",
                    TokenKind::KeywordStruct => "struct",
                    TokenKind::KeywordUnion => "union",
                    TokenKind::KeywordEnum => "enum",
                    TokenKind::KeywordSizeof => "sizeof",
                    TokenKind::KeywordTypedef => "typedef",
                    TokenKind::Plus => "+",
                    TokenKind::Minus => "-",
                    TokenKind::Multiply => "*",
                    TokenKind::Divide => "/",
                    TokenKind::Modulo => "%",
                    TokenKind::Assign => "=",
                    TokenKind::Equal => "==",
                    TokenKind::NotEqual => "!=",
                    TokenKind::Less => "<",
                    TokenKind::LessEqual => "<=",
                    TokenKind::Greater => ">",
                    TokenKind::GreaterEqual => ">=",
                    TokenKind::LogicalAnd => "&&",
                    TokenKind::LogicalOr => "||",
                    TokenKind::LogicalNot => "!",
                    TokenKind::Ampersand => "&",
                    TokenKind::Pipe => "|",
                    TokenKind::Caret => "^",
                    TokenKind::Tilde => "~",
                    TokenKind::LeftShift => "<<",
                    TokenKind::RightShift => ">>",
                    TokenKind::PlusAssign => "+=",
                    TokenKind::MinusAssign => "-=",
                    TokenKind::MultiplyAssign => "*=",
                    TokenKind::DivideAssign => "/=",
                    TokenKind::ModuloAssign => "%=",
                    TokenKind::Increment => "++",
                    TokenKind::Decrement => "--",
                    TokenKind::Arrow => "->",
                    TokenKind::Question => "?",
                    TokenKind::Dot => ".",
                    TokenKind::Ellipsis => "...",
                    TokenKind::LeftParen => "(",
                    TokenKind::RightParen => ")",
                    TokenKind::LeftBrace => "{",
                    TokenKind::RightBrace => "}",
                    TokenKind::LeftBracket => "[",
                    TokenKind::RightBracket => "]",
                    TokenKind::Semicolon => ";",
                    TokenKind::Comma => ",",
                    TokenKind::Colon => ":",
                    TokenKind::EndOfFile => "",
                    _ => unreachable!(),
                };
                write!(f, "{}", text)
            }
        }
    }
}

/// A token with its source location.
pub type Token = Spanned<TokenKind>;

/// Construction helper; `Token` is an alias, so this lives in a trait.
pub trait TokenUtils {
    fn new(kind: TokenKind, span: Span) -> Self;
    fn ident(&self) -> Option<&str>;
}

impl TokenUtils for Token {
    fn new(kind: TokenKind, span: Span) -> Self {
        Spanned::new(kind, span)
    }

    fn ident(&self) -> Option<&str> {
        match &self.value {
            TokenKind::Identifier(name) => Some(name),
            _ => None,
        }
    }
}
