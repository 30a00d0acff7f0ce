//! Token definitions for MinLang
//!
//! This module defines all the tokens that the lexer can produce.

use crate::span::Span;
use logos::Logos;
use std::fmt;

/// A token produced by the lexer
#[derive(Debug, Clone, PartialEq)]
pub struct Token {
    pub kind: TokenKind,
    pub span: Span,
}

impl Token {
    pub fn new(kind: TokenKind, span: Span) -> Self {
        Self { kind, span }
    }

    /// Get the text of this token from source
    pub fn text<'a>(&self, source: &'a str) -> &'a str {
        self.span.text(source)
    }
}

/// All possible token types in MinLang
#[derive(Logos, Debug, Clone, PartialEq)]
#[logos(skip r"[ \t\r\n\f]+")]       // Skip whitespace
#[logos(skip r"//[^\n]*")]           // Skip line comments
#[logos(skip r"/\*([^*]|\*[^/])*\*/")] // Skip block comments
pub enum TokenKind {
    // ============ Literals ============

    /// Integer literal: 42
    #[regex(r"[0-9]+", priority = 2)]
    IntLiteral,

    /// Float literal: 3.14
    #[regex(r"[0-9]+\.[0-9]+")]
    FloatLiteral,

    /// Character literal: 'a', '\n'
    #[regex(r"'([^'\\]|\\.)'")]
    CharLiteral,

    /// String literal: "hello"
    #[regex(r#""([^"\\]|\\.)*""#)]
    StringLiteral,

    /// Boolean literal
    #[token("true")]
    True,
    #[token("false")]
    False,

    // ============ Type keywords ============

    #[token("int")]
    Int,
    #[token("float")]
    Float,
    #[token("bool")]
    Bool,
    #[token("char")]
    Char,
    #[token("void")]
    Void,

    // ============ Keywords ============

    #[token("if")]
    If,
    #[token("else")]
    Else,
    #[token("while")]
    While,
    #[token("for")]
    For,
    #[token("return")]
    Return,
    #[token("const")]
    Const,
    #[token("read")]
    Read,
    #[token("print")]
    Print,

    // ============ Operators ============

    // Arithmetic
    #[token("+")]
    Plus,
    #[token("-")]
    Minus,
    #[token("*")]
    Star,
    #[token("/")]
    Slash,
    #[token("%")]
    Percent,

    // Comparison
    #[token("==")]
    EqEq,
    #[token("!=")]
    NotEq,
    #[token("<")]
    Lt,
    #[token(">")]
    Gt,
    #[token("<=")]
    LtEq,
    #[token(">=")]
    GtEq,

    // Logical
    #[token("&&")]
    AndAnd,
    #[token("||")]
    OrOr,
    #[token("!")]
    Not,

    // Assignment
    #[token("=")]
    Eq,

    // ============ Delimiters ============

    #[token("(")]
    LParen,
    #[token(")")]
    RParen,
    #[token("{")]
    LBrace,
    #[token("}")]
    RBrace,
    #[token("[")]
    LBracket,
    #[token("]")]
    RBracket,

    // ============ Punctuation ============

    #[token(",")]
    Comma,
    #[token(";")]
    Semicolon,

    // ============ Identifiers ============

    /// Identifier: foo, _bar, counter2
    #[regex(r"[a-zA-Z_][a-zA-Z0-9_]*")]
    Ident,

    // ============ Special ============

    /// End of file
    Eof,
}

impl TokenKind {
    /// Check if this token starts a type annotation
    pub fn is_type_keyword(&self) -> bool {
        matches!(
            self,
            TokenKind::Int
                | TokenKind::Float
                | TokenKind::Bool
                | TokenKind::Char
                | TokenKind::Void
        )
    }

    /// Check if this token is a literal
    pub fn is_literal(&self) -> bool {
        matches!(
            self,
            TokenKind::IntLiteral
                | TokenKind::FloatLiteral
                | TokenKind::CharLiteral
                | TokenKind::StringLiteral
                | TokenKind::True
                | TokenKind::False
        )
    }

    /// Check if this token can begin a statement's synchronization point
    pub fn starts_statement(&self) -> bool {
        matches!(
            self,
            TokenKind::Int
                | TokenKind::Float
                | TokenKind::Bool
                | TokenKind::Char
                | TokenKind::Const
                | TokenKind::If
                | TokenKind::While
                | TokenKind::For
                | TokenKind::Return
                | TokenKind::Read
                | TokenKind::Print
                | TokenKind::LBrace
        )
    }
}

impl fmt::Display for TokenKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            TokenKind::IntLiteral => "integer literal",
            TokenKind::FloatLiteral => "float literal",
            TokenKind::CharLiteral => "char literal",
            TokenKind::StringLiteral => "string literal",
            TokenKind::True => "true",
            TokenKind::False => "false",
            TokenKind::Int => "int",
            TokenKind::Float => "float",
            TokenKind::Bool => "bool",
            TokenKind::Char => "char",
            TokenKind::Void => "void",
            TokenKind::If => "if",
            TokenKind::Else => "else",
            TokenKind::While => "while",
            TokenKind::For => "for",
            TokenKind::Return => "return",
            TokenKind::Const => "const",
            TokenKind::Read => "read",
            TokenKind::Print => "print",
            TokenKind::Plus => "+",
            TokenKind::Minus => "-",
            TokenKind::Star => "*",
            TokenKind::Slash => "/",
            TokenKind::Percent => "%",
            TokenKind::EqEq => "==",
            TokenKind::NotEq => "!=",
            TokenKind::Lt => "<",
            TokenKind::Gt => ">",
            TokenKind::LtEq => "<=",
            TokenKind::GtEq => ">=",
            TokenKind::AndAnd => "&&",
            TokenKind::OrOr => "||",
            TokenKind::Not => "!",
            TokenKind::Eq => "=",
            TokenKind::LParen => "(",
            TokenKind::RParen => ")",
            TokenKind::LBrace => "{",
            TokenKind::RBrace => "}",
            TokenKind::LBracket => "[",
            TokenKind::RBracket => "]",
            TokenKind::Comma => ",",
            TokenKind::Semicolon => ";",
            TokenKind::Ident => "identifier",
            TokenKind::Eof => "end of file",
        };
        write!(f, "{}", s)
    }
}
