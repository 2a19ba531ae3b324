//! Converts SQL text into a stream of tokens. Uses memchr for accelerated
//! string scanning. Tracks line/column for error reporting.

use memchr::{memchr, memchr2};

use crate::token::{Token, TokenKind};

/// SQL lexer producing a stream of tokens from source text.
pub struct Lexer<'a> {
    /// The source bytes (UTF-8).
    src: &'a [u8],
    /// Current byte offset into src.
    pos: usize,
    /// Current line number (1-based).
    line: u32,
    /// Current column number (1-based).
    col: u32,
}

impl<'a> Lexer<'a> {
    /// Create a new lexer for the given SQL source text.
    #[must_use]
    pub fn new(source: &'a str) -> Self {
        Self {
            src: source.as_bytes(),
            pos: 0,
            line: 1,
            col: 1,
        }
    }

    /// Tokenize the entire input into a Vec of tokens, ending with `Eof`.
    #[must_use]
    pub fn tokenize(source: &'a str) -> Vec<Token> {
        let mut lexer = Self::new(source);
        let mut tokens = Vec::new();
        loop {
            let tok = lexer.next_token();
            let is_eof = tok.kind == TokenKind::Eof;
            tokens.push(tok);
            if is_eof {
                break;
            }
        }
        tokens
    }

    /// Produce the next token.
    pub fn next_token(&mut self) -> Token {
        self.skip_whitespace_and_comments();

        let start_line = self.line;
        let start_col = self.col;

        if self.pos >= self.src.len() {
            return Token {
                kind: TokenKind::Eof,
                line: start_line,
                col: start_col,
            };
        }

        let ch = self.src[self.pos];
        let kind = match ch {
            b'\'' | b'"' => self.lex_string(ch),
            b'`' => self.lex_backtick_ident(),
            b'0'..=b'9' => self.lex_number(),
            b'.' if self.peek_at(1).is_some_and(|c| c.is_ascii_digit()) => self.lex_number(),
            b'a'..=b'z' | b'A'..=b'Z' | b'_' => self.lex_identifier(),
            b'?' => {
                self.advance();
                TokenKind::Question
            }
            b'$' => self.lex_dollar_param(),
            b'+' => {
                self.advance();
                TokenKind::Plus
            }
            b'-' => {
                self.advance();
                TokenKind::Minus
            }
            b'*' => {
                self.advance();
                TokenKind::Star
            }
            b'/' => {
                self.advance();
                TokenKind::Slash
            }
            b'%' => {
                self.advance();
                TokenKind::Percent
            }
            b'.' => {
                self.advance();
                TokenKind::Dot
            }
            b',' => {
                self.advance();
                TokenKind::Comma
            }
            b':' => {
                self.advance();
                TokenKind::Colon
            }
            b';' => {
                self.advance();
                TokenKind::Semicolon
            }
            b'(' => {
                self.advance();
                TokenKind::LParen
            }
            b')' => {
                self.advance();
                TokenKind::RParen
            }
            b'[' => {
                self.advance();
                TokenKind::LBracket
            }
            b']' => {
                self.advance();
                TokenKind::RBracket
            }
            b'{' => {
                self.advance();
                TokenKind::LBrace
            }
            b'}' => {
                self.advance();
                TokenKind::RBrace
            }
            b'=' => {
                self.advance();
                TokenKind::Eq
            }
            b'!' => self.lex_bang(),
            b'<' => self.lex_lt(),
            b'>' => self.lex_gt(),
            other => {
                self.advance();
                TokenKind::Error(format!("unexpected character: {}", other as char))
            }
        };

        Token {
            kind,
            line: start_line,
            col: start_col,
        }
    }

    // -----------------------------------------------------------------------
    // Helpers
    // -----------------------------------------------------------------------

    fn advance(&mut self) -> u8 {
        let ch = self.src[self.pos];
        self.pos += 1;
        if ch == b'\n' {
            self.line += 1;
            self.col = 1;
        } else {
            self.col += 1;
        }
        ch
    }

    fn peek(&self) -> Option<u8> {
        self.src.get(self.pos).copied()
    }

    fn peek_at(&self, offset: usize) -> Option<u8> {
        self.src.get(self.pos + offset).copied()
    }

    /// Skip whitespace, line comments (`--`), and block comments (`/* */`).
    fn skip_whitespace_and_comments(&mut self) {
        loop {
            while self.pos < self.src.len() && self.src[self.pos].is_ascii_whitespace() {
                self.advance();
            }

            if self.pos >= self.src.len() {
                break;
            }

            if self.src[self.pos] == b'-' && self.peek_at(1) == Some(b'-') {
                while self.pos < self.src.len() && self.src[self.pos] != b'\n' {
                    self.advance();
                }
                continue;
            }

            if self.src[self.pos] == b'/' && self.peek_at(1) == Some(b'*') {
                self.advance();
                self.advance();
                while self.pos < self.src.len() {
                    if self.src[self.pos] == b'*' && self.peek_at(1) == Some(b'/') {
                        self.advance();
                        self.advance();
                        break;
                    }
                    self.advance();
                }
                continue;
            }

            break;
        }
    }

    // -----------------------------------------------------------------------
    // Literal tokenizers
    // -----------------------------------------------------------------------

    /// Lex a quoted string literal with backslash escapes. Single and double
    /// quotes both delimit text literals. Uses memchr to jump to the next
    /// interesting byte.
    fn lex_string(&mut self, quote: u8) -> TokenKind {
        self.advance(); // opening quote

        let mut value = String::new();
        loop {
            let remaining = &self.src[self.pos..];
            let Some(offset) = memchr2(quote, b'\\', remaining) else {
                while self.pos < self.src.len() {
                    self.advance();
                }
                return TokenKind::Error("unterminated string literal".to_owned());
            };

            value.push_str(&String::from_utf8_lossy(&remaining[..offset]));
            for _ in 0..offset {
                self.advance();
            }

            let marker = self.advance();
            if marker == quote {
                return TokenKind::Text(value);
            }

            // Backslash escape.
            let Some(escaped) = self.peek() else {
                return TokenKind::Error("unterminated string literal".to_owned());
            };
            self.advance();
            match escaped {
                b'n' => value.push('\n'),
                b't' => value.push('\t'),
                b'r' => value.push('\r'),
                b'\\' => value.push('\\'),
                b'\'' => value.push('\''),
                b'"' => value.push('"'),
                other => {
                    return TokenKind::Error(format!("invalid escape sequence: \\{}", other as char))
                }
            }
        }
    }

    /// Lex a backtick-quoted identifier.
    fn lex_backtick_ident(&mut self) -> TokenKind {
        self.advance(); // opening backtick
        let remaining = &self.src[self.pos..];
        match memchr(b'`', remaining) {
            Some(offset) => {
                let name = String::from_utf8_lossy(&remaining[..offset]).into_owned();
                for _ in 0..=offset {
                    self.advance();
                }
                TokenKind::Ident(name)
            }
            None => {
                while self.pos < self.src.len() {
                    self.advance();
                }
                TokenKind::Error("unterminated backtick identifier".to_owned())
            }
        }
    }

    /// Lex a number: integer or float (`42`, `3.14`, `.5`, `1e10`).
    fn lex_number(&mut self) -> TokenKind {
        let start = self.pos;
        let mut is_float = false;

        while self.pos < self.src.len() && self.src[self.pos].is_ascii_digit() {
            self.advance();
        }

        if self.peek() == Some(b'.') && self.peek_at(1).is_some_and(|c| c.is_ascii_digit()) {
            is_float = true;
            self.advance(); // the dot
            while self.pos < self.src.len() && self.src[self.pos].is_ascii_digit() {
                self.advance();
            }
        }

        if self.src[start] == b'.' {
            is_float = true;
        }

        if matches!(self.peek(), Some(b'e' | b'E')) {
            is_float = true;
            self.advance();
            if matches!(self.peek(), Some(b'+' | b'-')) {
                self.advance();
            }
            while self.pos < self.src.len() && self.src[self.pos].is_ascii_digit() {
                self.advance();
            }
        }

        let text = String::from_utf8_lossy(&self.src[start..self.pos]);
        if is_float {
            match text.parse::<f64>() {
                Ok(v) => TokenKind::Float(v),
                Err(_) => TokenKind::Error(format!("invalid number: {text}")),
            }
        } else {
            match text.parse::<i64>() {
                Ok(v) => TokenKind::Int(v),
                Err(_) => TokenKind::Error(format!("integer out of range: {text}")),
            }
        }
    }

    /// Lex an identifier or keyword.
    fn lex_identifier(&mut self) -> TokenKind {
        let start = self.pos;
        self.advance(); // first character already validated

        while self.pos < self.src.len() {
            let ch = self.src[self.pos];
            if ch.is_ascii_alphanumeric() || ch == b'_' {
                self.advance();
            } else {
                break;
            }
        }

        let text = String::from_utf8_lossy(&self.src[start..self.pos]).into_owned();
        TokenKind::lookup_keyword(&text).unwrap_or(TokenKind::Ident(text))
    }

    /// Lex `$name`.
    fn lex_dollar_param(&mut self) -> TokenKind {
        self.advance(); // skip $
        let start = self.pos;
        while self.pos < self.src.len() {
            let ch = self.src[self.pos];
            if ch.is_ascii_alphanumeric() || ch == b'_' {
                self.advance();
            } else {
                break;
            }
        }
        if self.pos == start {
            return TokenKind::Error("empty parameter name after '$'".to_owned());
        }
        let name = String::from_utf8_lossy(&self.src[start..self.pos]).into_owned();
        TokenKind::Dollar(name)
    }

    /// Lex `!=`.
    fn lex_bang(&mut self) -> TokenKind {
        self.advance(); // skip !
        if self.peek() == Some(b'=') {
            self.advance();
            TokenKind::Neq
        } else {
            TokenKind::Error("unexpected '!', did you mean '!='?".to_owned())
        }
    }

    /// Lex `<` or `<=`.
    fn lex_lt(&mut self) -> TokenKind {
        self.advance();
        if self.peek() == Some(b'=') {
            self.advance();
            TokenKind::Le
        } else {
            TokenKind::Lt
        }
    }

    /// Lex `>` or `>=`.
    fn lex_gt(&mut self) -> TokenKind {
        self.advance();
        if self.peek() == Some(b'=') {
            self.advance();
            TokenKind::Ge
        } else {
            TokenKind::Gt
        }
    }
}
