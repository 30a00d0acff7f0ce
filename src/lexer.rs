//! Lexer for MinLang
//!
//! The lexer converts source code into a stream of tokens.
//! It uses the `logos` crate for efficient lexing.

use crate::span::Span;
use crate::token::{Token, TokenKind};
use logos::Logos;
use thiserror::Error;

/// Lexer errors
#[derive(Error, Debug, Clone, PartialEq)]
pub enum LexerError {
    #[error("unexpected character at position {0}")]
    UnexpectedChar(usize),
}

/// The lexer for MinLang
pub struct Lexer<'src> {
    source: &'src str,
    inner: logos::Lexer<'src, TokenKind>,
    peeked: Option<Token>,
    errors: Vec<LexerError>,
}

impl<'src> Lexer<'src> {
    /// Create a new lexer for the given source code
    pub fn new(source: &'src str) -> Self {
        Self {
            source,
            inner: TokenKind::lexer(source),
            peeked: None,
            errors: Vec::new(),
        }
    }

    /// Get the source code
    pub fn source(&self) -> &'src str {
        self.source
    }

    /// Get any errors that occurred during lexing
    pub fn errors(&self) -> &[LexerError] {
        &self.errors
    }

    /// Peek at the next token without consuming it
    pub fn peek(&mut self) -> Option<&Token> {
        if self.peeked.is_none() {
            self.peeked = self.next_token();
        }
        self.peeked.as_ref()
    }

    /// Get the next token
    pub fn next_token(&mut self) -> Option<Token> {
        if let Some(token) = self.peeked.take() {
            return Some(token);
        }

        loop {
            match self.inner.next() {
                Some(Ok(kind)) => {
                    let span = self.inner.span();
                    return Some(Token::new(kind, Span::new(span.start, span.end)));
                }
                Some(Err(())) => {
                    // Skip invalid tokens and record error
                    let span = self.inner.span();
                    self.errors.push(LexerError::UnexpectedChar(span.start));
                    continue;
                }
                None => {
                    // End of input - return EOF token
                    let pos = self.source.len();
                    return Some(Token::new(TokenKind::Eof, Span::new(pos, pos)));
                }
            }
        }
    }

    /// Collect all tokens into a vector
    pub fn tokenize(mut self) -> (Vec<Token>, Vec<LexerError>) {
        let mut tokens = Vec::new();

        loop {
            match self.next_token() {
                Some(token) if token.kind == TokenKind::Eof => {
                    tokens.push(token);
                    break;
                }
                Some(token) => tokens.push(token),
                None => break,
            }
        }

        (tokens, self.errors)
    }
}

impl<'src> Iterator for Lexer<'src> {
    type Item = Token;

    fn next(&mut self) -> Option<Self::Item> {
        let token = self.next_token()?;
        if token.kind == TokenKind::Eof {
            None
        } else {
            Some(token)
        }
    }
}

/// Helper function to lex source code
pub fn lex(source: &str) -> (Vec<Token>, Vec<LexerError>) {
    Lexer::new(source).tokenize()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn token_kinds(source: &str) -> Vec<TokenKind> {
        let (tokens, _) = lex(source);
        tokens.into_iter().map(|t| t.kind).collect()
    }

    #[test]
    fn test_empty_source() {
        let kinds = token_kinds("");
        assert_eq!(kinds, vec![TokenKind::Eof]);
    }

    #[test]
    fn test_whitespace_only() {
        let kinds = token_kinds("   \t\n  ");
        assert_eq!(kinds, vec![TokenKind::Eof]);
    }

    #[test]
    fn test_literals() {
        let kinds = token_kinds("42 3.14 'a' \"hi\" true false");
        assert_eq!(
            kinds,
            vec![
                TokenKind::IntLiteral,
                TokenKind::FloatLiteral,
                TokenKind::CharLiteral,
                TokenKind::StringLiteral,
                TokenKind::True,
                TokenKind::False,
                TokenKind::Eof
            ]
        );
    }

    #[test]
    fn test_keywords() {
        let kinds = token_kinds("int float bool char void if else while for return const read print");
        assert_eq!(
            kinds,
            vec![
                TokenKind::Int,
                TokenKind::Float,
                TokenKind::Bool,
                TokenKind::Char,
                TokenKind::Void,
                TokenKind::If,
                TokenKind::Else,
                TokenKind::While,
                TokenKind::For,
                TokenKind::Return,
                TokenKind::Const,
                TokenKind::Read,
                TokenKind::Print,
                TokenKind::Eof
            ]
        );
    }

    #[test]
    fn test_operators() {
        let kinds = token_kinds("+ - * / % == != < > <= >= && || ! =");
        assert_eq!(
            kinds,
            vec![
                TokenKind::Plus,
                TokenKind::Minus,
                TokenKind::Star,
                TokenKind::Slash,
                TokenKind::Percent,
                TokenKind::EqEq,
                TokenKind::NotEq,
                TokenKind::Lt,
                TokenKind::Gt,
                TokenKind::LtEq,
                TokenKind::GtEq,
                TokenKind::AndAnd,
                TokenKind::OrOr,
                TokenKind::Not,
                TokenKind::Eq,
                TokenKind::Eof
            ]
        );
    }

    #[test]
    fn test_identifiers() {
        let kinds = token_kinds("foo bar_baz _private counter2");
        assert_eq!(
            kinds,
            vec![
                TokenKind::Ident,
                TokenKind::Ident,
                TokenKind::Ident,
                TokenKind::Ident,
                TokenKind::Eof
            ]
        );
    }

    #[test]
    fn test_function_definition() {
        let source = "int add(int a, int b) { return a + b; }";
        let kinds = token_kinds(source);
        assert_eq!(
            kinds,
            vec![
                TokenKind::Int,
                TokenKind::Ident, // add
                TokenKind::LParen,
                TokenKind::Int,
                TokenKind::Ident, // a
                TokenKind::Comma,
                TokenKind::Int,
                TokenKind::Ident, // b
                TokenKind::RParen,
                TokenKind::LBrace,
                TokenKind::Return,
                TokenKind::Ident, // a
                TokenKind::Plus,
                TokenKind::Ident, // b
                TokenKind::Semicolon,
                TokenKind::RBrace,
                TokenKind::Eof
            ]
        );
    }

    #[test]
    fn test_comments() {
        let kinds = token_kinds(
            "// a line comment\nint x = 42; /* block\ncomment */ x = 1;",
        );
        assert_eq!(
            kinds,
            vec![
                TokenKind::Int,
                TokenKind::Ident,
                TokenKind::Eq,
                TokenKind::IntLiteral,
                TokenKind::Semicolon,
                TokenKind::Ident,
                TokenKind::Eq,
                TokenKind::IntLiteral,
                TokenKind::Semicolon,
                TokenKind::Eof
            ]
        );
    }

    #[test]
    fn test_invalid_character() {
        let mut lexer = Lexer::new("int @ x");
        let mut kinds = Vec::new();
        while let Some(t) = lexer.next_token() {
            let done = t.kind == TokenKind::Eof;
            kinds.push(t.kind);
            if done {
                break;
            }
        }
        assert_eq!(
            kinds,
            vec![TokenKind::Int, TokenKind::Ident, TokenKind::Eof]
        );
        assert_eq!(lexer.errors(), &[LexerError::UnexpectedChar(4)]);
    }

    #[test]
    fn test_span_tracking() {
        let source = "int x = 42";
        let (tokens, _) = lex(source);

        assert_eq!(tokens[0].span.text(source), "int");
        assert_eq!(tokens[1].span.text(source), "x");
        assert_eq!(tokens[2].span.text(source), "=");
        assert_eq!(tokens[3].span.text(source), "42");
    }
}
