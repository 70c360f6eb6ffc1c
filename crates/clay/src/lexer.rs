//! Byte-oriented lexer for Clay source.
//!
//! Produces the token stream the parser consumes: identifiers, keywords,
//! symbols, numeric literals with `#`-suffixes, char/string literals with
//! C-style escapes, and skips whitespace plus line/block comments. Sources
//! are 8-bit; `\n` and `\r\n` line endings both work because `\r` is plain
//! whitespace to the lexer.
//!
//! Numeric literal *values* stay as spelled; range checking against the
//! suffix happens at evaluation time.

use std::{fmt, rc::Rc};

use strum::{Display, EnumString};

use crate::{
    error::{CompileError, CompileResult},
    intern::{Interns, NameId},
    source::{Location, Source},
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, EnumString)]
#[strum(serialize_all = "lowercase")]
pub enum Keyword {
    Import,
    Export,
    Record,
    Overloadable,
    Overload,
    External,
    Static,
    Var,
    Ref,
    And,
    Or,
    Not,
    If,
    Else,
    Goto,
    Return,
    #[strum(serialize = "returnref")]
    ReturnRef,
    While,
    Break,
    Continue,
    For,
    In,
    True,
    False,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Symbol {
    EqEq,
    NotEq,
    LesserEq,
    GreaterEq,
    Lesser,
    Greater,
    Plus,
    Minus,
    Star,
    Slash,
    Percent,
    Assign,
    Amp,
    Caret,
    Pipe,
    LParen,
    RParen,
    LBracket,
    RBracket,
    LBrace,
    RBrace,
    Colon,
    Semicolon,
    Comma,
    Dot,
}

impl fmt::Display for Symbol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::EqEq => "==",
            Self::NotEq => "!=",
            Self::LesserEq => "<=",
            Self::GreaterEq => ">=",
            Self::Lesser => "<",
            Self::Greater => ">",
            Self::Plus => "+",
            Self::Minus => "-",
            Self::Star => "*",
            Self::Slash => "/",
            Self::Percent => "%",
            Self::Assign => "=",
            Self::Amp => "&",
            Self::Caret => "^",
            Self::Pipe => "|",
            Self::LParen => "(",
            Self::RParen => ")",
            Self::LBracket => "[",
            Self::RBracket => "]",
            Self::LBrace => "{",
            Self::RBrace => "}",
            Self::Colon => ":",
            Self::Semicolon => ";",
            Self::Comma => ",",
            Self::Dot => ".",
        })
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum TokenKind {
    Ident(NameId),
    Keyword(Keyword),
    Symbol(Symbol),
    IntLiteral { text: String, suffix: Option<String> },
    FloatLiteral { text: String, suffix: Option<String> },
    CharLiteral(u8),
    StringLiteral(String),
}

impl fmt::Display for TokenKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Ident(_) => f.write_str("identifier"),
            Self::Keyword(k) => write!(f, "'{k}'"),
            Self::Symbol(s) => write!(f, "'{s}'"),
            Self::IntLiteral { .. } => f.write_str("integer literal"),
            Self::FloatLiteral { .. } => f.write_str("float literal"),
            Self::CharLiteral(_) => f.write_str("char literal"),
            Self::StringLiteral(_) => f.write_str("string literal"),
        }
    }
}

#[derive(Debug, Clone)]
pub struct Token {
    pub kind: TokenKind,
    pub location: Location,
}

/// Tokenizes a whole source buffer, interning identifiers as it goes.
pub fn tokenize(source: &Rc<Source>, interns: &mut Interns) -> CompileResult<Vec<Token>> {
    let mut lexer = Lexer {
        source,
        bytes: source.text.as_bytes(),
        pos: 0,
        interns,
    };
    lexer.run()
}

struct Lexer<'a> {
    source: &'a Rc<Source>,
    bytes: &'a [u8],
    pos: usize,
    interns: &'a mut Interns,
}

fn is_ident_start(b: u8) -> bool {
    b.is_ascii_alphabetic() || b == b'_'
}

fn is_ident_continue(b: u8) -> bool {
    b.is_ascii_alphanumeric() || b == b'_' || b == b'?'
}

impl Lexer<'_> {
    fn run(&mut self) -> CompileResult<Vec<Token>> {
        let mut tokens = Vec::new();
        loop {
            self.skip_trivia()?;
            let Some(b) = self.peek() else { break };
            let location = self.location();
            let kind = if is_ident_start(b) {
                self.word()
            } else if b.is_ascii_digit() {
                self.number()?
            } else if b == b'\'' {
                self.char_literal()?
            } else if b == b'"' {
                self.string_literal()?
            } else {
                self.symbol()?
            };
            tokens.push(Token { kind, location });
        }
        Ok(tokens)
    }

    fn peek(&self) -> Option<u8> {
        self.bytes.get(self.pos).copied()
    }

    fn peek_at(&self, ahead: usize) -> Option<u8> {
        self.bytes.get(self.pos + ahead).copied()
    }

    fn bump(&mut self) -> Option<u8> {
        let b = self.peek()?;
        self.pos += 1;
        Some(b)
    }

    fn location(&self) -> Location {
        Location::new(self.source, self.pos)
    }

    fn error(&self, message: impl Into<String>) -> CompileError {
        CompileError::new(message, Some(self.location()))
    }

    fn skip_trivia(&mut self) -> CompileResult<()> {
        loop {
            match self.peek() {
                Some(b' ' | b'\t' | b'\r' | b'\n') => {
                    self.pos += 1;
                }
                Some(b'/') if self.peek_at(1) == Some(b'/') => {
                    while let Some(b) = self.peek() {
                        self.pos += 1;
                        if b == b'\n' {
                            break;
                        }
                    }
                }
                Some(b'/') if self.peek_at(1) == Some(b'*') => {
                    let start = self.location();
                    self.pos += 2;
                    loop {
                        if self.peek() == Some(b'*') && self.peek_at(1) == Some(b'/') {
                            self.pos += 2;
                            break;
                        }
                        if self.bump().is_none() {
                            return Err(CompileError::new("unterminated block comment", Some(start)));
                        }
                    }
                }
                _ => return Ok(()),
            }
        }
    }

    fn word(&mut self) -> TokenKind {
        let start = self.pos;
        while let Some(b) = self.peek() {
            if !is_ident_continue(b) {
                break;
            }
            self.pos += 1;
        }
        // identifiers are ASCII, checked byte by byte above
        let text = std::str::from_utf8(&self.bytes[start..self.pos]).expect("identifier is ascii");
        match text.parse::<Keyword>() {
            Ok(keyword) => TokenKind::Keyword(keyword),
            Err(_) => TokenKind::Ident(self.interns.intern(text)),
        }
    }

    fn digits(&mut self, out: &mut String) {
        while let Some(b) = self.peek() {
            if !b.is_ascii_digit() {
                break;
            }
            out.push(b as char);
            self.pos += 1;
        }
    }

    fn number(&mut self) -> CompileResult<TokenKind> {
        let mut text = String::new();
        if self.peek() == Some(b'0') && matches!(self.peek_at(1), Some(b'x' | b'X')) {
            text.push_str("0x");
            self.pos += 2;
            let mut seen = false;
            while let Some(b) = self.peek() {
                if !b.is_ascii_hexdigit() {
                    break;
                }
                text.push(b as char);
                self.pos += 1;
                seen = true;
            }
            if !seen {
                return Err(self.error("invalid hex literal"));
            }
            let suffix = self.suffix()?;
            return Ok(TokenKind::IntLiteral { text, suffix });
        }

        self.digits(&mut text);
        let mut is_float = false;
        if self.peek() == Some(b'.') && self.peek_at(1).is_some_and(|b| b.is_ascii_digit()) {
            is_float = true;
            text.push('.');
            self.pos += 1;
            self.digits(&mut text);
        }
        if matches!(self.peek(), Some(b'e' | b'E')) {
            let mut ahead = 1;
            if matches!(self.peek_at(1), Some(b'+' | b'-')) {
                ahead = 2;
            }
            if self.peek_at(ahead).is_some_and(|b| b.is_ascii_digit()) {
                is_float = true;
                for _ in 0..ahead {
                    text.push(self.bytes[self.pos] as char);
                    self.pos += 1;
                }
                self.digits(&mut text);
            }
        }
        let suffix = self.suffix()?;
        if is_float {
            Ok(TokenKind::FloatLiteral { text, suffix })
        } else {
            Ok(TokenKind::IntLiteral { text, suffix })
        }
    }

    fn suffix(&mut self) -> CompileResult<Option<String>> {
        if self.peek() != Some(b'#') {
            return Ok(None);
        }
        self.pos += 1;
        let mut text = String::new();
        while let Some(b) = self.peek() {
            if !b.is_ascii_alphanumeric() {
                break;
            }
            text.push(b as char);
            self.pos += 1;
        }
        if text.is_empty() {
            return Err(self.error("missing literal suffix after '#'"));
        }
        Ok(Some(text))
    }

    fn escape_char(&mut self) -> CompileResult<u8> {
        let Some(b) = self.bump() else {
            return Err(self.error("unterminated escape sequence"));
        };
        let value = match b {
            b'n' => b'\n',
            b'r' => b'\r',
            b't' => b'\t',
            b'a' => 0x07,
            b'b' => 0x08,
            b'f' => 0x0c,
            b'v' => 0x0b,
            b'0'..=b'7' => {
                // octal escape, one to three digits
                let mut value = u32::from(b - b'0');
                for _ in 0..2 {
                    match self.peek() {
                        Some(d @ b'0'..=b'7') => {
                            value = value * 8 + u32::from(d - b'0');
                            self.pos += 1;
                        }
                        _ => break,
                    }
                }
                if value > 0xff {
                    return Err(self.error("octal escape out of range"));
                }
                return Ok(value as u8);
            }
            b'x' => {
                let hi = self.bump().and_then(hex_value);
                let lo = self.bump().and_then(hex_value);
                match (hi, lo) {
                    (Some(hi), Some(lo)) => return Ok(hi * 16 + lo),
                    _ => return Err(self.error("invalid hex escape")),
                }
            }
            b'\\' | b'\'' | b'"' => b,
            _ => return Err(self.error("invalid escape sequence")),
        };
        Ok(value)
    }

    fn char_literal(&mut self) -> CompileResult<TokenKind> {
        let start = self.location();
        self.pos += 1;
        let value = match self.bump() {
            None | Some(b'\n') => {
                return Err(CompileError::new("unterminated char literal", Some(start)));
            }
            Some(b'\\') => self.escape_char()?,
            Some(b'\'') => return Err(CompileError::new("empty char literal", Some(start))),
            Some(b) => b,
        };
        if self.bump() != Some(b'\'') {
            return Err(CompileError::new("unterminated char literal", Some(start)));
        }
        Ok(TokenKind::CharLiteral(value))
    }

    fn string_literal(&mut self) -> CompileResult<TokenKind> {
        let start = self.location();
        self.pos += 1;
        let mut value = String::new();
        loop {
            match self.bump() {
                None | Some(b'\n') => {
                    return Err(CompileError::new("unterminated string literal", Some(start)));
                }
                Some(b'"') => break,
                Some(b'\\') => value.push(self.escape_char()? as char),
                Some(b) => value.push(b as char),
            }
        }
        Ok(TokenKind::StringLiteral(value))
    }

    fn symbol(&mut self) -> CompileResult<TokenKind> {
        let two = match (self.peek(), self.peek_at(1)) {
            (Some(b'='), Some(b'=')) => Some(Symbol::EqEq),
            (Some(b'!'), Some(b'=')) => Some(Symbol::NotEq),
            (Some(b'<'), Some(b'=')) => Some(Symbol::LesserEq),
            (Some(b'>'), Some(b'=')) => Some(Symbol::GreaterEq),
            _ => None,
        };
        if let Some(symbol) = two {
            self.pos += 2;
            return Ok(TokenKind::Symbol(symbol));
        }
        let symbol = match self.peek() {
            Some(b'<') => Symbol::Lesser,
            Some(b'>') => Symbol::Greater,
            Some(b'+') => Symbol::Plus,
            Some(b'-') => Symbol::Minus,
            Some(b'*') => Symbol::Star,
            Some(b'/') => Symbol::Slash,
            Some(b'%') => Symbol::Percent,
            Some(b'=') => Symbol::Assign,
            Some(b'&') => Symbol::Amp,
            Some(b'^') => Symbol::Caret,
            Some(b'|') => Symbol::Pipe,
            Some(b'(') => Symbol::LParen,
            Some(b')') => Symbol::RParen,
            Some(b'[') => Symbol::LBracket,
            Some(b']') => Symbol::RBracket,
            Some(b'{') => Symbol::LBrace,
            Some(b'}') => Symbol::RBrace,
            Some(b':') => Symbol::Colon,
            Some(b';') => Symbol::Semicolon,
            Some(b',') => Symbol::Comma,
            Some(b'.') => Symbol::Dot,
            _ => return Err(self.error("invalid token")),
        };
        self.pos += 1;
        Ok(TokenKind::Symbol(symbol))
    }
}

fn hex_value(b: u8) -> Option<u8> {
    match b {
        b'0'..=b'9' => Some(b - b'0'),
        b'a'..=b'f' => Some(b - b'a' + 10),
        b'A'..=b'F' => Some(b - b'A' + 10),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lex(text: &str) -> Vec<TokenKind> {
        let source = Source::new("test.clay", text);
        let mut interns = Interns::new();
        tokenize(&source, &mut interns)
            .expect("lexes")
            .into_iter()
            .map(|t| t.kind)
            .collect()
    }

    #[test]
    fn keywords_and_identifiers() {
        let tokens = lex("var x = hasNext?;");
        assert_eq!(tokens.len(), 5);
        assert_eq!(tokens[0], TokenKind::Keyword(Keyword::Var));
        assert!(matches!(tokens[1], TokenKind::Ident(_)));
        assert_eq!(tokens[2], TokenKind::Symbol(Symbol::Assign));
        assert!(matches!(tokens[3], TokenKind::Ident(_)));
    }

    #[test]
    fn numeric_literals_keep_text_and_suffix() {
        let tokens = lex("127#i8 0x1F 2.5#f32 1e3");
        assert_eq!(
            tokens[0],
            TokenKind::IntLiteral {
                text: "127".into(),
                suffix: Some("i8".into())
            }
        );
        assert_eq!(
            tokens[1],
            TokenKind::IntLiteral {
                text: "0x1F".into(),
                suffix: None
            }
        );
        assert_eq!(
            tokens[2],
            TokenKind::FloatLiteral {
                text: "2.5".into(),
                suffix: Some("f32".into())
            }
        );
        assert_eq!(
            tokens[3],
            TokenKind::FloatLiteral {
                text: "1e3".into(),
                suffix: None
            }
        );
    }

    #[test]
    fn char_escapes() {
        assert_eq!(lex(r"'\n'")[0], TokenKind::CharLiteral(b'\n'));
        assert_eq!(lex(r"'\x41'")[0], TokenKind::CharLiteral(b'A'));
        assert_eq!(lex(r"'\101'")[0], TokenKind::CharLiteral(b'A'));
    }

    #[test]
    fn comments_are_skipped() {
        let tokens = lex("1 // line\n/* block\n */ 2");
        assert_eq!(tokens.len(), 2);
    }

    #[test]
    fn two_char_symbols_win_over_one() {
        let tokens = lex("<= < == =");
        assert_eq!(
            tokens,
            vec![
                TokenKind::Symbol(Symbol::LesserEq),
                TokenKind::Symbol(Symbol::Lesser),
                TokenKind::Symbol(Symbol::EqEq),
                TokenKind::Symbol(Symbol::Assign),
            ]
        );
    }

    #[test]
    fn invalid_token_is_fatal() {
        let source = Source::new("test.clay", "@");
        let mut interns = Interns::new();
        let err = tokenize(&source, &mut interns).unwrap_err();
        assert!(err.message.contains("invalid token"));
    }
}
