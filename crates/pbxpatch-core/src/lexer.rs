//! Tokenizer for the old-style property list syntax used by
//! `project.pbxproj`.
//!
//! Only enough structure is recovered to find region markers and balance
//! braces: comments and quoted strings are opaque, everything else is a
//! bare word or a single punctuation byte. Recognition is derived by
//! `logos`; [`tokenize`] turns its output into span-carrying tokens and
//! reports the first byte no pattern accepts.

use crate::error::{PatchError, Result};
use logos::Logos;
use std::ops::Range;

#[derive(Logos, Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenKind {
    #[regex(r"[ \t\r\n\f]+")]
    Whitespace,

    #[regex(r"/\*(?:[^*]|\*+[^*/])*\*+/")]
    BlockComment,

    #[regex(r"//[^\n]*", allow_greedy = true)]
    LineComment,

    #[regex(r#""(?:[^"\\]|\\.)*""#)]
    String,

    /// Unquoted scalar. A `/` may appear anywhere except where it would
    /// open a comment at the start of the word.
    #[regex(
        r#"(?:[^ \t\r\n\f"{}()=;,/]|/[^ \t\r\n\f"{}()=;,*/])[^ \t\r\n\f"{}()=;,]*"#,
        allow_greedy = true
    )]
    Word,

    #[token("{")]
    LBrace,

    #[token("}")]
    RBrace,

    #[token("(")]
    LParen,

    #[token(")")]
    RParen,

    #[token("=")]
    Equals,

    #[token(";")]
    Semicolon,

    #[token(",")]
    Comma,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Token {
    pub kind: TokenKind,
    pub span: Range<usize>,
}

impl Token {
    pub fn text<'a>(&self, src: &'a str) -> &'a str {
        &src[self.span.clone()]
    }

    pub fn is_trivia(&self) -> bool {
        matches!(
            self.kind,
            TokenKind::Whitespace | TokenKind::BlockComment | TokenKind::LineComment
        )
    }

    /// Inner text of a block comment, trimmed.
    pub fn comment_body<'a>(&self, src: &'a str) -> Option<&'a str> {
        match self.kind {
            TokenKind::BlockComment => {
                let t = self.text(src);
                Some(t[2..t.len() - 2].trim())
            }
            _ => None,
        }
    }
}

fn lex_error(rest: &str) -> &'static str {
    if rest.starts_with('"') {
        "unterminated string"
    } else if rest.starts_with("/*") {
        "unterminated block comment"
    } else {
        "unexpected character"
    }
}

pub fn tokenize(src: &str) -> Result<Vec<Token>> {
    let mut tokens = Vec::new();
    let mut lexer = TokenKind::lexer(src);

    loop {
        match lexer.next() {
            Some(Ok(kind)) => tokens.push(Token {
                kind,
                span: lexer.span(),
            }),
            Some(Err(())) => {
                let offset = lexer.span().start;
                return Err(PatchError::Parse {
                    offset,
                    message: lex_error(&src[offset..]).to_string(),
                });
            }
            None => break,
        }
    }

    Ok(tokens)
}
