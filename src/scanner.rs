//! Lexical scanner. Turns a source buffer into a stream of [`Token`]s,
//! tracking `(line, col, offset)` for every token so the error reporter can
//! recover the offending source line later.

use crate::diagnostics::{Diagnostic, Diagnostics};
use crate::names::NameTable;
use crate::token::{Token, TokenKind};

pub struct Scanner<'a> {
    source: &'a str,
    chars: Vec<char>,
    pos: usize,
    line: u32,
    col: u32,
    peeked: Option<Token>,
}

impl<'a> Scanner<'a> {
    pub fn new(source: &'a str) -> Self {
        Scanner {
            source,
            chars: source.chars().collect(),
            pos: 0,
            line: 1,
            col: 1,
            peeked: None,
        }
    }

    pub fn source(&self) -> &'a str {
        self.source
    }

    fn peek_char(&self) -> Option<char> {
        self.chars.get(self.pos).copied()
    }

    fn advance_char(&mut self) -> Option<char> {
        let c = self.peek_char()?;
        self.pos += 1;
        if c == '\n' {
            self.line += 1;
            self.col = 1;
        } else {
            self.col += 1;
        }
        Some(c)
    }

    fn skip_trivia(&mut self, diags: &mut Diagnostics) {
        loop {
            match self.peek_char() {
                Some(c) if c.is_whitespace() => {
                    self.advance_char();
                }
                Some('\\') => {
                    let (line, col) = (self.line, self.col);
                    self.advance_char();
                    let mut closed = false;
                    while let Some(c) = self.peek_char() {
                        if c == '\\' {
                            self.advance_char();
                            closed = true;
                            break;
                        }
                        self.advance_char();
                    }
                    if !closed {
                        diags.push(Diagnostic::syntax(
                            "unterminated comment",
                            line,
                            col,
                        ));
                    }
                }
                _ => break,
            }
        }
    }

    /// Returns the next token, consuming it.
    pub fn next_token(&mut self, names: &mut NameTable, diags: &mut Diagnostics) -> Token {
        if let Some(tok) = self.peeked.take() {
            return tok;
        }
        self.scan_token(names, diags)
    }

    /// Returns the next token without consuming it (one-token lookahead,
    /// sufficient for this language's LL(1) grammar).
    pub fn peek(&mut self, names: &mut NameTable, diags: &mut Diagnostics) -> Token {
        if self.peeked.is_none() {
            self.peeked = Some(self.scan_token(names, diags));
        }
        self.peeked.unwrap()
    }

    fn scan_token(&mut self, names: &mut NameTable, diags: &mut Diagnostics) -> Token {
        self.skip_trivia(diags);

        let (line, col, offset) = (self.line, self.col, self.pos);

        let c = match self.peek_char() {
            None => return Token::eof(line, col, offset),
            Some(c) => c,
        };

        if c.is_ascii_alphabetic() {
            return self.scan_identifier(names, line, col, offset);
        }
        if c.is_ascii_digit() {
            return self.scan_number(line, col, offset);
        }

        self.advance_char();
        let kind = match c {
            '=' => TokenKind::Equals,
            ',' => TokenKind::Comma,
            ';' => TokenKind::Semicolon,
            '>' => TokenKind::Arrow,
            '.' => TokenKind::Dot,
            '{' => TokenKind::LBrace,
            '}' => TokenKind::RBrace,
            '(' => TokenKind::LParen,
            ')' => TokenKind::RParen,
            other => TokenKind::Invalid(other),
        };
        Token {
            kind,
            name: None,
            number: None,
            line,
            col,
            lexeme_start: offset,
        }
    }

    fn scan_identifier(
        &mut self,
        names: &mut NameTable,
        line: u32,
        col: u32,
        offset: usize,
    ) -> Token {
        let mut text = String::new();
        while let Some(c) = self.peek_char() {
            if c.is_ascii_alphanumeric() {
                text.push(c);
                self.advance_char();
            } else {
                break;
            }
        }
        if let Some((_, kw)) = names.keyword_handle(&text) {
            return Token {
                kind: TokenKind::Keyword(kw),
                name: None,
                number: None,
                line,
                col,
                lexeme_start: offset,
            };
        }
        let handle = names.intern(&text);
        Token {
            kind: TokenKind::Name,
            name: Some(handle),
            number: None,
            line,
            col,
            lexeme_start: offset,
        }
    }

    fn scan_number(&mut self, line: u32, col: u32, offset: usize) -> Token {
        let mut text = String::new();
        while let Some(c) = self.peek_char() {
            if c.is_ascii_digit() {
                text.push(c);
                self.advance_char();
            } else {
                break;
            }
        }
        let value = text.parse::<u32>().unwrap_or(u32::MAX);
        Token {
            kind: TokenKind::Number,
            name: None,
            number: Some(value),
            line,
            col,
            lexeme_start: offset,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::names::Keyword;

    fn scan_all(src: &str) -> Vec<TokenKind> {
        let mut names = NameTable::new();
        let mut diags = Diagnostics::new();
        let mut scanner = Scanner::new(src);
        let mut out = Vec::new();
        loop {
            let tok = scanner.next_token(&mut names, &mut diags);
            let done = tok.kind == TokenKind::Eof;
            out.push(tok.kind);
            if done {
                break;
            }
        }
        out
    }

    #[test]
    fn keywords_and_names() {
        let kinds = scan_all("CIRCUIT foo123");
        assert_eq!(
            kinds,
            vec![
                TokenKind::Keyword(Keyword::Circuit),
                TokenKind::Name,
                TokenKind::Eof
            ]
        );
    }

    #[test]
    fn numbers_are_distinct_from_names() {
        let kinds = scan_all("42");
        assert_eq!(kinds, vec![TokenKind::Number, TokenKind::Eof]);
    }

    #[test]
    fn comments_are_skipped() {
        let kinds = scan_all("A \\this is a comment\\ B");
        assert_eq!(kinds, vec![TokenKind::Name, TokenKind::Name, TokenKind::Eof]);
    }

    #[test]
    fn unterminated_comment_reported_at_eof() {
        let mut names = NameTable::new();
        let mut diags = Diagnostics::new();
        let mut scanner = Scanner::new("A \\never closed");
        scanner.next_token(&mut names, &mut diags);
        scanner.next_token(&mut names, &mut diags);
        assert!(diags.has_errors());
    }

    #[test]
    fn invalid_character_does_not_stop_scanning() {
        let kinds = scan_all("A # B");
        assert_eq!(
            kinds,
            vec![
                TokenKind::Name,
                TokenKind::Invalid('#'),
                TokenKind::Name,
                TokenKind::Eof
            ]
        );
    }

    #[test]
    fn peek_does_not_consume() {
        let mut names = NameTable::new();
        let mut diags = Diagnostics::new();
        let mut scanner = Scanner::new("A B");
        let peeked = scanner.peek(&mut names, &mut diags);
        assert_eq!(peeked.kind, TokenKind::Name);
        let first = scanner.next_token(&mut names, &mut diags);
        assert_eq!(first.lexeme_start, peeked.lexeme_start);
    }

    #[test]
    fn single_char_tokens() {
        let kinds = scan_all("= , ; . > { } ( )");
        assert_eq!(
            kinds,
            vec![
                TokenKind::Equals,
                TokenKind::Comma,
                TokenKind::Semicolon,
                TokenKind::Dot,
                TokenKind::Arrow,
                TokenKind::LBrace,
                TokenKind::RBrace,
                TokenKind::LParen,
                TokenKind::RParen,
                TokenKind::Eof,
            ]
        );
    }
}
