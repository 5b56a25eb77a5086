use std::io;
use std::path::{Path, PathBuf};

use crate::diag::{Diag, Diagnostics};
use crate::span::Span;
use crate::token::{Keyword, Punct, Token, TokenKind};

/// Pull-based lexer. Each `next_token` call consumes exactly one token;
/// whitespace, newlines and comments never surface.
pub struct Lexer {
    src: String,
    path: Option<PathBuf>,
    pos: usize,
    line: usize,
    column: usize,
    diags: Diagnostics,
}

impl Lexer {
    pub fn new(src: &str) -> Self {
        Self {
            src: src.to_string(),
            path: None,
            pos: 0,
            line: 1,
            column: 1,
            diags: Diagnostics::default(),
        }
    }

    pub fn from_path(path: impl AsRef<Path>) -> io::Result<Self> {
        let path = path.as_ref();
        let src = std::fs::read_to_string(path)?;
        let mut lexer = Self::new(&src);
        lexer.path = Some(path.to_path_buf());
        Ok(lexer)
    }

    pub fn take_diags(&mut self) -> Vec<Diag> {
        std::mem::take(&mut self.diags).into_vec()
    }

    pub fn next_token(&mut self) -> Token {
        self.skip_trivia();
        let start = self.pos;
        let line = self.line;
        let column = self.column;
        let Some(ch) = self.peek_char() else {
            return Token {
                kind: TokenKind::Eof,
                text: String::new(),
                span: Span::new(start, start, line, column),
            };
        };

        let kind = if is_ident_start(ch) {
            self.lex_ident()
        } else if ch.is_ascii_digit() {
            self.lex_number(start, line, column)
        } else if ch == '"' || ch == '\'' {
            self.lex_string(start, line, column)
        } else if let Some((punct, width)) = match_punct(&self.src[self.pos..]) {
            for _ in 0..width {
                self.bump();
            }
            TokenKind::Punct(punct)
        } else {
            self.bump();
            TokenKind::Unknown
        };

        Token {
            kind,
            text: self.src[start..self.pos].to_string(),
            span: Span::new(start, self.pos, line, column),
        }
    }

    fn peek_char(&self) -> Option<char> {
        self.src[self.pos..].chars().next()
    }

    fn peek_second(&self) -> Option<char> {
        let mut chars = self.src[self.pos..].chars();
        chars.next();
        chars.next()
    }

    fn bump(&mut self) -> Option<char> {
        let ch = self.peek_char()?;
        self.pos += ch.len_utf8();
        if ch == '\n' {
            self.line += 1;
            self.column = 1;
        } else {
            self.column += 1;
        }
        Some(ch)
    }

    fn here(&self) -> Span {
        Span::new(self.pos, self.pos, self.line, self.column)
    }

    fn warn(&mut self, span: Span, message: &str) {
        match &self.path {
            Some(path) => self.diags.warning_at_path(path.clone(), span, message),
            None => self.diags.warning(span, message),
        }
    }

    fn skip_trivia(&mut self) {
        loop {
            match (self.peek_char(), self.peek_second()) {
                (Some(ch), _) if ch.is_whitespace() => {
                    self.bump();
                }
                (Some('/'), Some('/')) => {
                    while let Some(ch) = self.peek_char() {
                        if ch == '\n' {
                            break;
                        }
                        self.bump();
                    }
                }
                (Some('/'), Some('*')) => {
                    let span = self.here();
                    self.bump();
                    self.bump();
                    let mut closed = false;
                    while let Some(ch) = self.bump() {
                        if ch == '*' && self.peek_char() == Some('/') {
                            self.bump();
                            closed = true;
                            break;
                        }
                    }
                    if !closed {
                        self.warn(span, "unterminated block comment");
                    }
                }
                _ => return,
            }
        }
    }

    fn lex_ident(&mut self) -> TokenKind {
        let start = self.pos;
        while let Some(ch) = self.peek_char() {
            if is_ident_continue(ch) {
                self.bump();
            } else {
                break;
            }
        }
        let text = &self.src[start..self.pos];
        if let Some(kw) = Keyword::from_str(text) {
            TokenKind::Keyword(kw)
        } else if text == "true" {
            TokenKind::Bool(true)
        } else if text == "false" {
            TokenKind::Bool(false)
        } else {
            TokenKind::Ident(text.to_string())
        }
    }

    fn lex_number(&mut self, start: usize, line: usize, column: usize) -> TokenKind {
        self.eat_digits();
        let mut is_float = false;
        if self.peek_char() == Some('.') && self.peek_second().is_some_and(|c| c.is_ascii_digit())
        {
            is_float = true;
            self.bump();
            self.eat_digits();
        }
        if matches!(self.peek_char(), Some('e') | Some('E')) && self.exponent_follows() {
            is_float = true;
            self.bump();
            if matches!(self.peek_char(), Some('+') | Some('-')) {
                self.bump();
            }
            self.eat_digits();
        }
        let text = &self.src[start..self.pos];
        if is_float {
            return TokenKind::Float(text.parse::<f64>().unwrap_or(0.0));
        }
        match text.parse::<i64>() {
            Ok(value) => TokenKind::Int(value),
            Err(_) => {
                let span = Span::new(start, self.pos, line, column);
                self.warn(span, "integer literal out of range");
                TokenKind::Int(i64::MAX)
            }
        }
    }

    fn exponent_follows(&self) -> bool {
        let rest = &self.src[self.pos..];
        let mut chars = rest.chars().skip(1);
        match chars.next() {
            Some(c) if c.is_ascii_digit() => true,
            Some('+') | Some('-') => chars.next().is_some_and(|c| c.is_ascii_digit()),
            _ => false,
        }
    }

    fn eat_digits(&mut self) {
        while let Some(ch) = self.peek_char() {
            if ch.is_ascii_digit() {
                self.bump();
            } else {
                break;
            }
        }
    }

    fn lex_string(&mut self, start: usize, line: usize, column: usize) -> TokenKind {
        let Some(quote) = self.bump() else {
            return TokenKind::String(String::new());
        };
        let mut out = String::new();
        let mut terminated = false;
        while let Some(ch) = self.bump() {
            if ch == quote {
                terminated = true;
                break;
            }
            if ch == '\\' {
                let Some(esc) = self.bump() else {
                    break;
                };
                match esc {
                    'n' => out.push('\n'),
                    't' => out.push('\t'),
                    'r' => out.push('\r'),
                    '\\' => out.push('\\'),
                    '"' => out.push('"'),
                    '\'' => out.push('\''),
                    _ => out.push(esc),
                }
                continue;
            }
            out.push(ch);
        }
        if !terminated {
            let span = Span::new(start, self.pos, line, column);
            self.warn(span, "unterminated string literal");
        }
        TokenKind::String(out)
    }
}

/// Lexes the whole input eagerly, ending with the EOF token.
pub fn lex_all(src: &str) -> (Vec<Token>, Vec<Diag>) {
    let mut lexer = Lexer::new(src);
    let mut tokens = Vec::new();
    loop {
        let token = lexer.next_token();
        let done = token.is_eof();
        tokens.push(token);
        if done {
            break;
        }
    }
    (tokens, lexer.take_diags())
}

fn is_ident_start(ch: char) -> bool {
    ch.is_ascii_alphabetic() || ch == '_'
}

fn is_ident_continue(ch: char) -> bool {
    ch.is_ascii_alphanumeric() || ch == '_'
}

fn match_punct(s: &str) -> Option<(Punct, usize)> {
    const TWO: [(&str, Punct); 10] = [
        ("++", Punct::PlusPlus),
        ("--", Punct::MinusMinus),
        ("==", Punct::EqEq),
        ("!=", Punct::NotEq),
        ("<=", Punct::LtEq),
        (">=", Punct::GtEq),
        ("&&", Punct::AndAnd),
        ("||", Punct::OrOr),
        ("->", Punct::Arrow),
        ("<-", Punct::LArrow),
    ];
    for (text, punct) in TWO {
        if s.starts_with(text) {
            return Some((punct, 2));
        }
    }
    let ch = s.chars().next()?;
    let punct = match ch {
        '(' => Punct::LParen,
        ')' => Punct::RParen,
        '[' => Punct::LBracket,
        ']' => Punct::RBracket,
        '{' => Punct::LBrace,
        '}' => Punct::RBrace,
        ';' => Punct::Semicolon,
        ',' => Punct::Comma,
        ':' => Punct::Colon,
        '.' => Punct::Dot,
        '=' => Punct::Assign,
        '<' => Punct::Lt,
        '>' => Punct::Gt,
        '+' => Punct::Plus,
        '-' => Punct::Minus,
        '*' => Punct::Star,
        '/' => Punct::Slash,
        '!' => Punct::Bang,
        _ => return None,
    };
    Some((punct, 1))
}
