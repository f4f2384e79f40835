//! Lexer for Sigil
//!
//! Turns a source buffer into a linear token stream plus side tables for
//! identifier text and numeric literal values (§4.2).

use crate::token::{
    base_kind, continuation, lookup_keyword, NumericLiteral, NumericType, NumericValue,
    SourceLocation, Token, TokenKind,
};

/// Numeric literal text longer than this is an implementation limit
/// (§4.2 "Edge-case policies"): rather than buffer-overflow UB, the lexer
/// stops accepting further digits and token length is effectively clamped.
const MAX_NUMERIC_LITERAL_LEN: usize = 32;

/// Output of lexing: tokens in source order plus their side tables.
#[derive(Debug, Default)]
pub struct TokenStream {
    pub tokens: Vec<Token>,
    pub identifier_strings: Vec<String>,
    pub numeric_literals: Vec<NumericLiteral>,
}

impl TokenStream {
    pub fn identifier_text(&self, token: &Token) -> &str {
        &self.identifier_strings[token.data_index as usize]
    }

    pub fn numeric_literal(&self, token: &Token) -> NumericLiteral {
        self.numeric_literals[token.data_index as usize]
    }
}

pub struct Lexer<'a> {
    source: &'a [u8],
    pos: usize,
    line: i32,
    out: TokenStream,
}

impl<'a> Lexer<'a> {
    pub fn new(source: &'a str) -> Self {
        Lexer {
            source: source.as_bytes(),
            pos: 0,
            line: 1,
            out: TokenStream {
                tokens: Vec::with_capacity(16),
                identifier_strings: Vec::with_capacity(16),
                numeric_literals: Vec::with_capacity(16),
            },
        }
    }

    /// Lexes the whole source buffer, always terminating in an `Eof` token.
    /// Never fails: unknown bytes become `Unknown` tokens (§4.2).
    pub fn lex(mut self) -> TokenStream {
        loop {
            self.skip_whitespace_and_comments();
            let loc = self.here();
            let Some(byte) = self.peek() else {
                self.push(Token::new(TokenKind::Eof, loc, 0));
                break;
            };

            if byte.is_ascii_alphabetic() || byte == b'_' {
                self.lex_identifier_or_keyword(loc);
            } else if byte.is_ascii_digit() {
                self.lex_number(loc);
            } else if byte == b'"' {
                self.lex_string(loc);
            } else if let Some(base) = base_kind(byte) {
                self.lex_operator(base, loc);
            } else {
                self.advance();
                self.push(Token::new(TokenKind::Unknown, loc, 0));
            }
        }
        self.out
    }

    fn here(&self) -> SourceLocation {
        SourceLocation::new(self.line, self.pos as i32)
    }

    fn peek(&self) -> Option<u8> {
        self.source.get(self.pos).copied()
    }

    fn peek_at(&self, offset: usize) -> Option<u8> {
        self.source.get(self.pos + offset).copied()
    }

    fn advance(&mut self) -> Option<u8> {
        let byte = self.peek()?;
        self.pos += 1;
        if byte == b'\n' {
            self.line += 1;
        }
        Some(byte)
    }

    fn push(&mut self, token: Token) {
        self.out.tokens.push(token);
    }

    fn skip_whitespace_and_comments(&mut self) {
        loop {
            match self.peek() {
                Some(b) if b.is_ascii_whitespace() => {
                    self.advance();
                }
                Some(b'/') if self.peek_at(1) == Some(b'/') => {
                    while let Some(b) = self.peek() {
                        if b == b'\n' {
                            break;
                        }
                        self.advance();
                    }
                }
                _ => break,
            }
        }
    }

    fn lex_identifier_or_keyword(&mut self, loc: SourceLocation) {
        let start = self.pos;
        while let Some(b) = self.peek() {
            if b.is_ascii_alphanumeric() || b == b'_' {
                self.advance();
            } else {
                break;
            }
        }
        let text = std::str::from_utf8(&self.source[start..self.pos]).unwrap_or("");

        if let Some(kind) = lookup_keyword(text) {
            self.push(Token::new(kind, loc, 0));
            return;
        }

        if text == "true" || text == "false" {
            let index = self.out.numeric_literals.len() as u32;
            self.out.numeric_literals.push(NumericLiteral {
                ty: NumericType::B32,
                value: NumericValue::B32(text == "true"),
            });
            self.push(Token::new(TokenKind::NumericLiteral, loc, index));
            return;
        }

        let index = self.out.identifier_strings.len() as u32;
        self.out.identifier_strings.push(text.to_string());
        self.push(Token::new(TokenKind::Identifier, loc, index));
    }

    fn lex_number(&mut self, loc: SourceLocation) {
        let start = self.pos;
        let mut is_float = false;
        let mut len = 0usize;

        while let Some(b) = self.peek() {
            let accept = b.is_ascii_digit()
                || (b == b'.' && !is_float)
                || (b == b'e' && !is_float);
            if !accept || len >= MAX_NUMERIC_LITERAL_LEN {
                break;
            }
            if b == b'.' || b == b'e' {
                is_float = true;
            }
            self.advance();
            len += 1;
        }

        let text = std::str::from_utf8(&self.source[start..self.pos]).unwrap_or("0");
        let literal = if is_float {
            NumericLiteral {
                ty: NumericType::F32,
                value: NumericValue::F32(text.parse::<f32>().unwrap_or(0.0)),
            }
        } else {
            NumericLiteral {
                ty: NumericType::I32,
                value: NumericValue::I32(text.parse::<i32>().unwrap_or(0)),
            }
        };

        let index = self.out.numeric_literals.len() as u32;
        self.out.numeric_literals.push(literal);
        self.push(Token::new(TokenKind::NumericLiteral, loc, index));
    }

    /// Strings have no escapes (§4.1); an unterminated string runs to EOF
    /// and is still recorded so the parser can report it with a real
    /// location rather than the lexer panicking.
    fn lex_string(&mut self, loc: SourceLocation) {
        self.advance(); // opening quote
        let start = self.pos;
        while let Some(b) = self.peek() {
            if b == b'"' {
                break;
            }
            self.advance();
        }
        let text = std::str::from_utf8(&self.source[start..self.pos]).unwrap_or("");
        let closed = self.peek() == Some(b'"');
        if closed {
            self.advance();
        }

        let index = self.out.identifier_strings.len() as u32;
        self.out.identifier_strings.push(text.to_string());
        self.push(Token::new(TokenKind::StringLiteral, loc, index));
    }

    fn lex_operator(&mut self, base: TokenKind, loc: SourceLocation) {
        self.advance();
        let mut kind = base;
        while let Some(next) = self.peek() {
            match continuation(kind, next) {
                Some(extended) => {
                    self.advance();
                    kind = extended;
                }
                None => break,
            }
        }
        self.push(Token::new(kind, loc, 0));
    }
}

pub fn lex(source: &str) -> TokenStream {
    Lexer::new(source).lex()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kinds(src: &str) -> Vec<TokenKind> {
        lex(src).tokens.iter().map(|t| t.kind).collect()
    }

    #[test]
    fn empty_source_produces_only_eof() {
        assert_eq!(kinds(""), vec![TokenKind::Eof]);
    }

    #[test]
    fn skips_whitespace_and_line_comments() {
        let stream = lex("  // hello\n  42 ");
        assert_eq!(
            stream.tokens.iter().map(|t| t.kind).collect::<Vec<_>>(),
            vec![TokenKind::NumericLiteral, TokenKind::Eof]
        );
        assert_eq!(stream.tokens[0].source_location.line, 2);
    }

    #[test]
    fn integer_literal_defaults_to_i32() {
        let stream = lex("42");
        let lit = stream.numeric_literal(&stream.tokens[0]);
        assert_eq!(lit.ty, NumericType::I32);
        assert_eq!(lit.value, NumericValue::I32(42));
    }

    #[test]
    fn dot_promotes_to_float() {
        let stream = lex("3.5");
        let lit = stream.numeric_literal(&stream.tokens[0]);
        assert_eq!(lit.ty, NumericType::F32);
    }

    #[test]
    fn exponent_promotes_to_float() {
        let stream = lex("2e3");
        let lit = stream.numeric_literal(&stream.tokens[0]);
        assert_eq!(lit.ty, NumericType::F32);
    }

    #[test]
    fn true_false_are_boolean_literals_not_identifiers() {
        let stream = lex("true false");
        assert_eq!(stream.tokens[0].kind, TokenKind::NumericLiteral);
        assert_eq!(stream.tokens[1].kind, TokenKind::NumericLiteral);
        assert_eq!(
            stream.numeric_literal(&stream.tokens[0]).value,
            NumericValue::B32(true)
        );
    }

    #[test]
    fn identifier_then_paren_is_still_just_two_tokens() {
        assert_eq!(
            kinds("foo("),
            vec![TokenKind::Identifier, TokenKind::OpenParen, TokenKind::Eof]
        );
    }

    #[test]
    fn keyword_table_recognizes_fn_and_types() {
        assert_eq!(
            kinds("fn i32 b32 u32 f32"),
            vec![
                TokenKind::Fn,
                TokenKind::I32,
                TokenKind::B32,
                TokenKind::U32,
                TokenKind::F32,
                TokenKind::Eof
            ]
        );
    }

    #[test]
    fn unknown_byte_becomes_unknown_token_not_a_fatal_error() {
        let stream = lex("`");
        assert_eq!(stream.tokens[0].kind, TokenKind::Unknown);
    }

    #[test]
    fn multichar_operators_are_longest_match() {
        assert_eq!(kinds("<<="), vec![TokenKind::LessLessEqual, TokenKind::Eof]);
        assert_eq!(kinds("<<"), vec![TokenKind::LessLess, TokenKind::Eof]);
        assert_eq!(kinds("<="), vec![TokenKind::LessEqual, TokenKind::Eof]);
        assert_eq!(kinds("<"), vec![TokenKind::Less, TokenKind::Eof]);
    }

    #[test]
    fn arrow_and_declaration_punctuation() {
        assert_eq!(
            kinds("-> :: :="),
            vec![
                TokenKind::Arrow,
                TokenKind::ColonColon,
                TokenKind::ColonEqual,
                TokenKind::Eof
            ]
        );
    }

    #[test]
    fn string_literal_has_no_escapes() {
        let stream = lex("\"hi\"");
        assert_eq!(stream.tokens[0].kind, TokenKind::StringLiteral);
        assert_eq!(stream.identifier_text(&stream.tokens[0]), "hi");
    }

    #[test]
    fn carriage_return_is_ordinary_whitespace() {
        assert_eq!(kinds("\r\r42"), vec![TokenKind::NumericLiteral, TokenKind::Eof]);
    }
}
