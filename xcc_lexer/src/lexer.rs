//! Lexer implementation for the C subset accepted by xcc.
//!
//! The input is preprocessed ASCII text, so scanning is byte-oriented.
//! Recognition order: whitespace and comments, string literals, character
//! literals, numbers, identifiers/keywords, multi-character punctuators,
//! single-character punctuators, end of input.

use crate::{keyword_kind, Token, TokenKind, TokenUtils};
use xcc_common::{CompileError, CompileResult, FileId, Position, Span};

pub struct Lexer<'a> {
    input: &'a [u8],
    position: usize,
    current_pos: Position,
    file_id: FileId,
}

impl<'a> Lexer<'a> {
    pub fn new(input: &'a str, file_id: FileId) -> Self {
        Self {
            input: input.as_bytes(),
            position: 0,
            current_pos: Position::start(),
            file_id,
        }
    }

    /// Tokenize the entire input, ending with an `EndOfFile` token.
    pub fn tokenize(&mut self) -> CompileResult<Vec<Token>> {
        let mut tokens = Vec::new();
        while let Some(token) = self.next_token()? {
            tokens.push(token);
        }
        let eof_span = Span::single(self.current_pos, self.file_id);
        tokens.push(TokenUtils::new(TokenKind::EndOfFile, eof_span));
        log::debug!("lexed {} tokens", tokens.len());
        Ok(tokens)
    }

    /// Scan the next token, or `None` at end of input.
    pub fn next_token(&mut self) -> CompileResult<Option<Token>> {
        self.skip_whitespace_and_comments()?;

        if self.is_at_end() {
            return Ok(None);
        }

        let start_pos = self.current_pos;
        let kind = match self.current_byte() {
            b'"' => self.scan_string_literal()?,
            b'\'' => self.scan_char_literal()?,
            c if c.is_ascii_digit() => self.scan_number()?,
            c if c.is_ascii_alphabetic() || c == b'_' => self.scan_identifier_or_keyword(),

            // Single-character tokens
            b'(' => { self.advance(); TokenKind::LeftParen }
            b')' => { self.advance(); TokenKind::RightParen }
            b'{' => { self.advance(); TokenKind::LeftBrace }
            b'}' => { self.advance(); TokenKind::RightBrace }
            b'[' => { self.advance(); TokenKind::LeftBracket }
            b']' => { self.advance(); TokenKind::RightBracket }
            b';' => { self.advance(); TokenKind::Semicolon }
            b',' => { self.advance(); TokenKind::Comma }
            b':' => { self.advance(); TokenKind::Colon }
            b'?' => { self.advance(); TokenKind::Question }
            b'~' => { self.advance(); TokenKind::Tilde }
            b'^' => { self.advance(); TokenKind::Caret }

            // Multi-character operators
            b'+' => self.scan_plus_operators(),
            b'-' => self.scan_minus_operators(),
            b'*' => self.scan_multiply_operators(),
            b'/' => self.scan_divide_operators(),
            b'%' => self.scan_modulo_operators(),
            b'=' => self.scan_equal_operators(),
            b'!' => self.scan_not_operators(),
            b'<' => self.scan_less_operators(),
            b'>' => self.scan_greater_operators(),
            b'&' => self.scan_and_operators(),
            b'|' => self.scan_or_operators(),
            b'.' => self.scan_dot_operators(),

            c => {
                return Err(CompileError::lex(
                    format!("unexpected character: `{}`", c as char),
                    Span::single(start_pos, self.file_id),
                ));
            }
        };

        let span = Span::new(start_pos, self.current_pos, self.file_id);
        Ok(Some(TokenUtils::new(kind, span)))
    }

    fn skip_whitespace_and_comments(&mut self) -> CompileResult<()> {
        while !self.is_at_end() {
            match self.current_byte() {
                b' ' | b'\t' | b'\r' => self.advance(),
                b'\n' => self.advance_line(),
                b'/' if self.peek_byte() == Some(b'/') => self.skip_line_comment(),
                b'/' if self.peek_byte() == Some(b'*') => self.skip_block_comment()?,
                _ => break,
            }
        }
        Ok(())
    }

    fn skip_line_comment(&mut self) {
        while !self.is_at_end() && self.current_byte() != b'\n' {
            self.advance();
        }
    }

    fn skip_block_comment(&mut self) -> CompileResult<()> {
        let start = self.current_pos;
        self.advance(); // '/'
        self.advance(); // '*'
        loop {
            if self.is_at_end() {
                return Err(CompileError::lex(
                    "unterminated block comment",
                    Span::single(start, self.file_id),
                ));
            }
            match self.current_byte() {
                b'*' if self.peek_byte() == Some(b'/') => {
                    self.advance();
                    self.advance();
                    return Ok(());
                }
                b'\n' => self.advance_line(),
                _ => self.advance(),
            }
        }
    }

    fn scan_identifier_or_keyword(&mut self) -> TokenKind {
        let start = self.position;
        while !self.is_at_end()
            && (self.current_byte().is_ascii_alphanumeric() || self.current_byte() == b'_')
        {
            self.advance();
        }
        let ident = std::str::from_utf8(&self.input[start..self.position])
            .expect("identifier bytes are ASCII");
        match keyword_kind(ident) {
            Some(kind) => kind,
            None => TokenKind::Identifier(ident.to_string()),
        }
    }

    fn scan_string_literal(&mut self) -> CompileResult<TokenKind> {
        let start = self.current_pos;
        self.advance(); // opening quote

        let mut bytes = Vec::new();
        loop {
            if self.is_at_end() || self.current_byte() == b'\n' {
                return Err(CompileError::lex(
                    "unterminated string literal",
                    Span::single(start, self.file_id),
                ));
            }
            match self.current_byte() {
                b'"' => break,
                b'\\' => bytes.push(self.scan_escape()?),
                c => {
                    bytes.push(c);
                    self.advance();
                }
            }
        }
        self.advance(); // closing quote
        Ok(TokenKind::StrLiteral(bytes))
    }

    fn scan_char_literal(&mut self) -> CompileResult<TokenKind> {
        let start = self.current_pos;
        self.advance(); // opening quote

        if self.is_at_end() || self.current_byte() == b'\n' || self.current_byte() == b'\'' {
            return Err(CompileError::lex(
                "unterminated character literal",
                Span::single(start, self.file_id),
            ));
        }
        let value = if self.current_byte() == b'\\' {
            self.scan_escape()?
        } else {
            let c = self.current_byte();
            self.advance();
            c
        };
        if self.is_at_end() || self.current_byte() != b'\'' {
            return Err(CompileError::lex(
                "unterminated character literal",
                Span::single(start, self.file_id),
            ));
        }
        self.advance(); // closing quote
        Ok(TokenKind::CharLiteral(value))
    }

    /// Scan a C escape sequence, cursor on the backslash.
    fn scan_escape(&mut self) -> CompileResult<u8> {
        let start = self.current_pos;
        self.advance(); // backslash
        if self.is_at_end() {
            return Err(CompileError::lex("bad escape", Span::single(start, self.file_id)));
        }
        let c = self.current_byte();
        self.advance();
        let value = match c {
            b'n' => b'\n',
            b't' => b'\t',
            b'r' => b'\r',
            b'a' => 0x07,
            b'b' => 0x08,
            b'f' => 0x0c,
            b'v' => 0x0b,
            b'\\' => b'\\',
            b'\'' => b'\'',
            b'"' => b'"',
            b'x' => {
                let mut value: u32 = 0;
                let mut digits = 0;
                while !self.is_at_end() && self.current_byte().is_ascii_hexdigit() && digits < 2 {
                    value = value * 16 + hex_digit(self.current_byte());
                    self.advance();
                    digits += 1;
                }
                if digits == 0 {
                    return Err(CompileError::lex("bad escape", Span::single(start, self.file_id)));
                }
                value as u8
            }
            b'0'..=b'7' => {
                let mut value: u32 = (c - b'0') as u32;
                let mut digits = 1;
                while !self.is_at_end()
                    && (b'0'..=b'7').contains(&self.current_byte())
                    && digits < 3
                {
                    value = value * 8 + (self.current_byte() - b'0') as u32;
                    self.advance();
                    digits += 1;
                }
                value as u8
            }
            _ => {
                return Err(CompileError::lex(
                    format!("bad escape: `\\{}`", c as char),
                    Span::single(start, self.file_id),
                ));
            }
        };
        Ok(value)
    }

    fn scan_number(&mut self) -> CompileResult<TokenKind> {
        let start = self.current_pos;

        let (value, overflow) = if self.current_byte() == b'0'
            && matches!(self.peek_byte(), Some(b'x') | Some(b'X'))
        {
            self.advance();
            self.advance();
            if self.is_at_end() || !self.current_byte().is_ascii_hexdigit() {
                return Err(CompileError::lex(
                    "hexadecimal digits expected",
                    Span::single(start, self.file_id),
                ));
            }
            self.scan_digits(16)
        } else if self.current_byte() == b'0' {
            self.scan_digits(8)
        } else {
            self.scan_digits(10)
        };

        if overflow {
            return Err(CompileError::lex(
                "integer out of range",
                Span::single(start, self.file_id),
            ));
        }

        // Suffixes: U and L/LL in either order.
        let mut is_unsigned = false;
        let mut is_long = false;
        loop {
            match self.current_byte_opt() {
                Some(b'u') | Some(b'U') if !is_unsigned => {
                    is_unsigned = true;
                    self.advance();
                }
                Some(b'l') | Some(b'L') if !is_long => {
                    is_long = true;
                    self.advance();
                    if matches!(self.current_byte_opt(), Some(b'l') | Some(b'L')) {
                        self.advance(); // LL is the same as L here
                    }
                }
                _ => break,
            }
        }

        // Values that do not fit in `int` become `long`.
        if value > i32::MAX as i64 {
            is_long = true;
        }
        let kind = if is_long {
            TokenKind::LongLiteral(value)
        } else if is_unsigned {
            TokenKind::UnsignedLiteral(value)
        } else {
            TokenKind::IntLiteral(value)
        };
        Ok(kind)
    }

    fn scan_digits(&mut self, radix: i64) -> (i64, bool) {
        let mut value: i64 = 0;
        let mut overflow = false;
        while let Some(c) = self.current_byte_opt() {
            let digit = match c {
                b'0'..=b'9' => (c - b'0') as i64,
                b'a'..=b'f' if radix == 16 => (c - b'a' + 10) as i64,
                b'A'..=b'F' if radix == 16 => (c - b'A' + 10) as i64,
                _ => break,
            };
            if digit >= radix {
                break;
            }
            value = match value.checked_mul(radix).and_then(|v| v.checked_add(digit)) {
                Some(v) => v,
                None => {
                    overflow = true;
                    0
                }
            };
            self.advance();
        }
        (value, overflow)
    }

    // Operator scanning methods

    fn scan_plus_operators(&mut self) -> TokenKind {
        self.advance();
        match self.current_byte_opt() {
            Some(b'=') => { self.advance(); TokenKind::PlusAssign }
            Some(b'+') => { self.advance(); TokenKind::Increment }
            _ => TokenKind::Plus,
        }
    }

    fn scan_minus_operators(&mut self) -> TokenKind {
        self.advance();
        match self.current_byte_opt() {
            Some(b'=') => { self.advance(); TokenKind::MinusAssign }
            Some(b'-') => { self.advance(); TokenKind::Decrement }
            Some(b'>') => { self.advance(); TokenKind::Arrow }
            _ => TokenKind::Minus,
        }
    }

    fn scan_multiply_operators(&mut self) -> TokenKind {
        self.advance();
        match self.current_byte_opt() {
            Some(b'=') => { self.advance(); TokenKind::MultiplyAssign }
            _ => TokenKind::Multiply,
        }
    }

    fn scan_divide_operators(&mut self) -> TokenKind {
        self.advance();
        match self.current_byte_opt() {
            Some(b'=') => { self.advance(); TokenKind::DivideAssign }
            _ => TokenKind::Divide,
        }
    }

    fn scan_modulo_operators(&mut self) -> TokenKind {
        self.advance();
        match self.current_byte_opt() {
            Some(b'=') => { self.advance(); TokenKind::ModuloAssign }
            _ => TokenKind::Modulo,
        }
    }

    fn scan_equal_operators(&mut self) -> TokenKind {
        self.advance();
        match self.current_byte_opt() {
            Some(b'=') => { self.advance(); TokenKind::Equal }
            _ => TokenKind::Assign,
        }
    }

    fn scan_not_operators(&mut self) -> TokenKind {
        self.advance();
        match self.current_byte_opt() {
            Some(b'=') => { self.advance(); TokenKind::NotEqual }
            _ => TokenKind::LogicalNot,
        }
    }

    fn scan_less_operators(&mut self) -> TokenKind {
        self.advance();
        match self.current_byte_opt() {
            Some(b'=') => { self.advance(); TokenKind::LessEqual }
            Some(b'<') => { self.advance(); TokenKind::LeftShift }
            _ => TokenKind::Less,
        }
    }

    fn scan_greater_operators(&mut self) -> TokenKind {
        self.advance();
        match self.current_byte_opt() {
            Some(b'=') => { self.advance(); TokenKind::GreaterEqual }
            Some(b'>') => { self.advance(); TokenKind::RightShift }
            _ => TokenKind::Greater,
        }
    }

    fn scan_and_operators(&mut self) -> TokenKind {
        self.advance();
        match self.current_byte_opt() {
            Some(b'&') => { self.advance(); TokenKind::LogicalAnd }
            _ => TokenKind::Ampersand,
        }
    }

    fn scan_or_operators(&mut self) -> TokenKind {
        self.advance();
        match self.current_byte_opt() {
            Some(b'|') => { self.advance(); TokenKind::LogicalOr }
            _ => TokenKind::Pipe,
        }
    }

    fn scan_dot_operators(&mut self) -> TokenKind {
        self.advance();
        if self.current_byte_opt() == Some(b'.') && self.peek_byte() == Some(b'.') {
            self.advance();
            self.advance();
            TokenKind::Ellipsis
        } else {
            TokenKind::Dot
        }
    }

    // Cursor primitives

    fn current_byte(&self) -> u8 {
        self.input[self.position]
    }

    fn current_byte_opt(&self) -> Option<u8> {
        self.input.get(self.position).copied()
    }

    fn peek_byte(&self) -> Option<u8> {
        self.input.get(self.position + 1).copied()
    }

    fn advance(&mut self) {
        if !self.is_at_end() {
            self.position += 1;
            self.current_pos.column += 1;
            self.current_pos.offset = self.position as u32;
        }
    }

    fn advance_line(&mut self) {
        if !self.is_at_end() {
            self.position += 1;
            self.current_pos.line += 1;
            self.current_pos.column = 1;
            self.current_pos.offset = self.position as u32;
        }
    }

    fn is_at_end(&self) -> bool {
        self.position >= self.input.len()
    }
}

fn hex_digit(c: u8) -> u32 {
    match c {
        b'0'..=b'9' => (c - b'0') as u32,
        b'a'..=b'f' => (c - b'a' + 10) as u32,
        b'A'..=b'F' => (c - b'A' + 10) as u32,
        _ => unreachable!(),
    }
}
