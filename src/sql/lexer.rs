//! # Query Lexer - Zero-Copy Tokenizer
//!
//! Tokenizes the aggregate query dialect with no string allocation:
//! identifier tokens are borrowed slices of the input. Keywords are matched
//! case-insensitively through a compile-time perfect hash table, so `select`
//! and `SELECT` cost the same single lookup.
//!
//! ## Token Categories
//!
//! - **Keywords**: SELECT, FROM, WHERE, GROUP, BY, AND, BETWEEN, SUM,
//!   COUNT, AVG
//! - **Identifiers**: bare column/table names (`amount`, `sales`)
//! - **Numbers**: integer and decimal literals, parsed as f64
//! - **Punctuation**: parentheses, comma, semicolon, `*`
//! - **Comparison operators**: `>`, `>=`, `<`, `<=`, `=`
//!
//! Anything else produces a lex error with the offending character. The
//! grammar is deliberately tiny; everything beyond it belongs to an
//! external relational engine, not this scheduler.

use eyre::{bail, Result};
use phf::phf_map;

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Keyword {
    Select,
    From,
    Where,
    Group,
    By,
    And,
    Between,
    Sum,
    Count,
    Avg,
}

static KEYWORDS: phf::Map<&'static str, Keyword> = phf_map! {
    "select" => Keyword::Select,
    "from" => Keyword::From,
    "where" => Keyword::Where,
    "group" => Keyword::Group,
    "by" => Keyword::By,
    "and" => Keyword::And,
    "between" => Keyword::Between,
    "sum" => Keyword::Sum,
    "count" => Keyword::Count,
    "avg" => Keyword::Avg,
};

/// Longest keyword is "between" (7 bytes); identifiers longer than this
/// buffer are never keywords.
const KEYWORD_BUF: usize = 8;

fn keyword_lookup(ident: &str) -> Option<Keyword> {
    if ident.len() > KEYWORD_BUF {
        return None;
    }
    let mut buf = [0u8; KEYWORD_BUF];
    for (i, b) in ident.bytes().enumerate() {
        buf[i] = b.to_ascii_lowercase();
    }
    let lowered = std::str::from_utf8(&buf[..ident.len()]).ok()?;
    KEYWORDS.get(lowered).copied()
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Token<'a> {
    Keyword(Keyword),
    Ident(&'a str),
    Number(f64),
    LParen,
    RParen,
    Comma,
    Semicolon,
    Star,
    Gt,
    Ge,
    Lt,
    Le,
    Eq,
    Eof,
}

pub struct Lexer<'a> {
    input: &'a str,
    pos: usize,
}

impl<'a> Lexer<'a> {
    pub fn new(input: &'a str) -> Self {
        Self { input, pos: 0 }
    }

    /// Lexes the whole input. The grammar is short enough that collecting
    /// tokens up front keeps the parser a plain cursor over a slice.
    pub fn tokenize(mut self) -> Result<Vec<Token<'a>>> {
        let mut tokens = Vec::new();
        loop {
            let token = self.next_token()?;
            let done = token == Token::Eof;
            tokens.push(token);
            if done {
                return Ok(tokens);
            }
        }
    }

    fn bytes(&self) -> &[u8] {
        self.input.as_bytes()
    }

    fn next_token(&mut self) -> Result<Token<'a>> {
        while self.pos < self.input.len() && self.bytes()[self.pos].is_ascii_whitespace() {
            self.pos += 1;
        }
        if self.pos >= self.input.len() {
            return Ok(Token::Eof);
        }

        let b = self.bytes()[self.pos];
        match b {
            b'(' => {
                self.pos += 1;
                Ok(Token::LParen)
            }
            b')' => {
                self.pos += 1;
                Ok(Token::RParen)
            }
            b',' => {
                self.pos += 1;
                Ok(Token::Comma)
            }
            b';' => {
                self.pos += 1;
                Ok(Token::Semicolon)
            }
            b'*' => {
                self.pos += 1;
                Ok(Token::Star)
            }
            b'=' => {
                self.pos += 1;
                Ok(Token::Eq)
            }
            b'>' => {
                self.pos += 1;
                if self.peek() == Some(b'=') {
                    self.pos += 1;
                    Ok(Token::Ge)
                } else {
                    Ok(Token::Gt)
                }
            }
            b'<' => {
                self.pos += 1;
                if self.peek() == Some(b'=') {
                    self.pos += 1;
                    Ok(Token::Le)
                } else {
                    Ok(Token::Lt)
                }
            }
            b'0'..=b'9' | b'.' => self.lex_number(),
            b'_' | b'a'..=b'z' | b'A'..=b'Z' => Ok(self.lex_ident()),
            other => bail!(
                "unexpected character {:?} at byte {} in query",
                other as char,
                self.pos
            ),
        }
    }

    fn peek(&self) -> Option<u8> {
        self.bytes().get(self.pos).copied()
    }

    fn lex_number(&mut self) -> Result<Token<'a>> {
        let start = self.pos;
        let bytes = self.input.as_bytes();
        while self.pos < bytes.len()
            && (bytes[self.pos].is_ascii_digit() || bytes[self.pos] == b'.')
        {
            self.pos += 1;
        }
        let text = &self.input[start..self.pos];
        match text.parse::<f64>() {
            Ok(value) => Ok(Token::Number(value)),
            Err(_) => bail!("malformed numeric literal {:?}", text),
        }
    }

    fn lex_ident(&mut self) -> Token<'a> {
        let start = self.pos;
        let bytes = self.input.as_bytes();
        while self.pos < bytes.len()
            && (bytes[self.pos].is_ascii_alphanumeric() || bytes[self.pos] == b'_')
        {
            self.pos += 1;
        }
        let text = &self.input[start..self.pos];
        match keyword_lookup(text) {
            Some(keyword) => Token::Keyword(keyword),
            None => Token::Ident(text),
        }
    }
}
