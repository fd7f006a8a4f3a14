//! Token scanner for module text.

use std::fmt;

use crate::ParseError;

/// A position in the source text, 1-based.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Location {
    pub line: u32,
    pub column: u32,
}

impl fmt::Display for Location {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "line {}, column {}", self.line, self.column)
    }
}

#[derive(Clone, Debug, PartialEq)]
pub enum TokenKind {
    /// A bare identifier or keyword, e.g. `parameter`, `ENTRY`, `f32`.
    ///
    /// Identifiers absorb `.` and digits, and a `-` when the character after
    /// it is alphabetic, so `get-tuple-element` and `add.1` each scan as one
    /// token while `x=-5` does not.
    Ident(String),
    /// A `%`-prefixed reference, sigil stripped.
    Ref(String),
    Int(i64),
    Float(f64),
    Str(String),
    /// `0x`-prefixed hex bytes, e.g. a serialized backend config.
    Blob(Vec<u8>),
    LParen,
    RParen,
    LBrace,
    RBrace,
    LBracket,
    RBracket,
    Comma,
    Colon,
    Equals,
    Minus,
    Arrow,
    Eof,
}

impl TokenKind {
    /// Human-readable description, used in error messages.
    pub fn describe(&self) -> String {
        match self {
            Self::Ident(name) => format!("'{name}'"),
            Self::Ref(name) => format!("'%{name}'"),
            Self::Int(v) => format!("integer {v}"),
            Self::Float(v) => format!("number {v}"),
            Self::Str(_) => "a string".to_string(),
            Self::Blob(_) => "a hex blob".to_string(),
            Self::LParen => "'('".to_string(),
            Self::RParen => "')'".to_string(),
            Self::LBrace => "'{'".to_string(),
            Self::RBrace => "'}'".to_string(),
            Self::LBracket => "'['".to_string(),
            Self::RBracket => "']'".to_string(),
            Self::Comma => "','".to_string(),
            Self::Colon => "':'".to_string(),
            Self::Equals => "'='".to_string(),
            Self::Minus => "'-'".to_string(),
            Self::Arrow => "'->'".to_string(),
            Self::Eof => "end of input".to_string(),
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct Token {
    pub kind: TokenKind,
    pub location: Location,
}

/// Scans source text into a token stream ending in [`TokenKind::Eof`].
pub fn scan(source: &str) -> Result<Vec<Token>, ParseError> {
    Scanner::new(source).scan_tokens()
}

struct Scanner {
    chars: Vec<char>,
    pos: usize,
    line: u32,
    column: u32,
    tokens: Vec<Token>,
}

impl Scanner {
    fn new(source: &str) -> Self {
        Self {
            chars: source.chars().collect(),
            pos: 0,
            line: 1,
            column: 1,
            tokens: Vec::new(),
        }
    }

    fn is_at_end(&self) -> bool {
        self.pos >= self.chars.len()
    }

    fn peek(&self) -> char {
        self.chars.get(self.pos).copied().unwrap_or('\0')
    }

    fn peek_next(&self) -> char {
        self.chars.get(self.pos + 1).copied().unwrap_or('\0')
    }

    fn advance(&mut self) -> char {
        let c = self.peek();
        self.pos += 1;
        if c == '\n' {
            self.line += 1;
            self.column = 1;
        } else {
            self.column += 1;
        }
        c
    }

    fn location(&self) -> Location {
        Location {
            line: self.line,
            column: self.column,
        }
    }

    fn push(&mut self, kind: TokenKind, location: Location) {
        self.tokens.push(Token { kind, location });
    }

    fn scan_tokens(mut self) -> Result<Vec<Token>, ParseError> {
        while !self.is_at_end() {
            let location = self.location();
            let c = self.advance();
            match c {
                ' ' | '\t' | '\r' | '\n' => {}
                '/' if self.peek() == '/' => {
                    while !self.is_at_end() && self.peek() != '\n' {
                        self.advance();
                    }
                }
                '(' => self.push(TokenKind::LParen, location),
                ')' => self.push(TokenKind::RParen, location),
                '{' => self.push(TokenKind::LBrace, location),
                '}' => self.push(TokenKind::RBrace, location),
                '[' => self.push(TokenKind::LBracket, location),
                ']' => self.push(TokenKind::RBracket, location),
                ',' => self.push(TokenKind::Comma, location),
                ':' => self.push(TokenKind::Colon, location),
                '=' => self.push(TokenKind::Equals, location),
                '-' if self.peek() == '>' => {
                    self.advance();
                    self.push(TokenKind::Arrow, location);
                }
                '-' => self.push(TokenKind::Minus, location),
                '"' => self.string(location)?,
                '%' => self.reference(location)?,
                c if c.is_ascii_digit() => self.number(c, location)?,
                c if c.is_alphabetic() || c == '_' => {
                    let name = self.identifier(c);
                    self.push(TokenKind::Ident(name), location);
                }
                _ => return Err(ParseError::UnexpectedCharacter { ch: c, location }),
            }
        }
        let location = self.location();
        self.push(TokenKind::Eof, location);
        Ok(self.tokens)
    }

    fn identifier(&mut self, first: char) -> String {
        let mut name = String::new();
        name.push(first);
        loop {
            let c = self.peek();
            if c.is_alphanumeric() || c == '_' || c == '.' {
                name.push(self.advance());
            } else if c == '-' && self.peek_next().is_alphabetic() {
                name.push(self.advance());
            } else {
                break;
            }
        }
        name
    }

    fn reference(&mut self, location: Location) -> Result<(), ParseError> {
        let first = self.peek();
        if !(first.is_alphabetic() || first == '_') {
            return Err(ParseError::UnexpectedCharacter {
                ch: '%',
                location,
            });
        }
        let first = self.advance();
        let name = self.identifier(first);
        self.push(TokenKind::Ref(name), location);
        Ok(())
    }

    fn string(&mut self, location: Location) -> Result<(), ParseError> {
        let mut text = String::new();
        loop {
            if self.is_at_end() || self.peek() == '\n' {
                return Err(ParseError::UnterminatedString { location });
            }
            let c = self.advance();
            if c == '"' {
                break;
            }
            text.push(c);
        }
        self.push(TokenKind::Str(text), location);
        Ok(())
    }

    fn number(&mut self, first: char, location: Location) -> Result<(), ParseError> {
        if first == '0' && self.peek() == 'x' {
            self.advance();
            return self.blob(location);
        }

        let mut text = String::new();
        text.push(first);
        while self.peek().is_ascii_digit() {
            text.push(self.advance());
        }

        let mut is_float = false;
        if self.peek() == '.' && self.peek_next().is_ascii_digit() {
            is_float = true;
            text.push(self.advance());
            while self.peek().is_ascii_digit() {
                text.push(self.advance());
            }
        }
        if self.peek() == 'e' || self.peek() == 'E' {
            is_float = true;
            text.push(self.advance());
            if self.peek() == '+' || self.peek() == '-' {
                text.push(self.advance());
            }
            while self.peek().is_ascii_digit() {
                text.push(self.advance());
            }
        }

        if is_float {
            match text.parse::<f64>() {
                Ok(v) => self.push(TokenKind::Float(v), location),
                Err(_) => return Err(ParseError::InvalidNumber { text, location }),
            }
        } else {
            match text.parse::<i64>() {
                Ok(v) => self.push(TokenKind::Int(v), location),
                Err(_) => return Err(ParseError::InvalidNumber { text, location }),
            }
        }
        Ok(())
    }

    fn blob(&mut self, location: Location) -> Result<(), ParseError> {
        let mut text = String::new();
        while self.peek().is_ascii_hexdigit() {
            text.push(self.advance());
        }
        if text.is_empty() || text.len() % 2 != 0 {
            return Err(ParseError::InvalidNumber {
                text: format!("0x{text}"),
                location,
            });
        }
        let mut bytes = Vec::with_capacity(text.len() / 2);
        let digits: Vec<char> = text.chars().collect();
        for pair in digits.chunks_exact(2) {
            // Both digits were checked to be hex above.
            let hi = pair[0].to_digit(16).unwrap_or(0) as u8;
            let lo = pair[1].to_digit(16).unwrap_or(0) as u8;
            bytes.push(hi << 4 | lo);
        }
        self.push(TokenKind::Blob(bytes), location);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kinds(source: &str) -> Vec<TokenKind> {
        scan(source).unwrap().into_iter().map(|t| t.kind).collect()
    }

    #[test]
    fn scans_instruction_line() {
        let tokens = kinds("%add.1 = f32[4] add(%p0, %p1)");
        assert_eq!(
            tokens,
            vec![
                TokenKind::Ref("add.1".into()),
                TokenKind::Equals,
                TokenKind::Ident("f32".into()),
                TokenKind::LBracket,
                TokenKind::Int(4),
                TokenKind::RBracket,
                TokenKind::Ident("add".into()),
                TokenKind::LParen,
                TokenKind::Ref("p0".into()),
                TokenKind::Comma,
                TokenKind::Ref("p1".into()),
                TokenKind::RParen,
                TokenKind::Eof,
            ]
        );
    }

    #[test]
    fn hyphens_join_identifiers_but_not_numbers() {
        assert_eq!(
            kinds("all-reduce-start"),
            vec![TokenKind::Ident("all-reduce-start".into()), TokenKind::Eof]
        );
        assert_eq!(
            kinds("trip_count=-5"),
            vec![
                TokenKind::Ident("trip_count".into()),
                TokenKind::Equals,
                TokenKind::Minus,
                TokenKind::Int(5),
                TokenKind::Eof,
            ]
        );
    }

    #[test]
    fn arrow_and_minus() {
        assert_eq!(
            kinds(") -> f32[]"),
            vec![
                TokenKind::RParen,
                TokenKind::Arrow,
                TokenKind::Ident("f32".into()),
                TokenKind::LBracket,
                TokenKind::RBracket,
                TokenKind::Eof,
            ]
        );
    }

    #[test]
    fn numbers_strings_blobs() {
        assert_eq!(
            kinds("1.5 1e-5 42 \"cfg\" 0x0a1b"),
            vec![
                TokenKind::Float(1.5),
                TokenKind::Float(1e-5),
                TokenKind::Int(42),
                TokenKind::Str("cfg".into()),
                TokenKind::Blob(vec![0x0a, 0x1b]),
                TokenKind::Eof,
            ]
        );
        assert!(matches!(
            scan("0x1"),
            Err(ParseError::InvalidNumber { .. })
        ));
    }

    #[test]
    fn comments_skipped() {
        assert_eq!(
            kinds("add // trailing note\nsub"),
            vec![
                TokenKind::Ident("add".into()),
                TokenKind::Ident("sub".into()),
                TokenKind::Eof,
            ]
        );
    }

    #[test]
    fn locations_track_lines_and_columns() {
        let tokens = scan("a\n  b").unwrap();
        assert_eq!(tokens[0].location, Location { line: 1, column: 1 });
        assert_eq!(tokens[1].location, Location { line: 2, column: 3 });
    }

    #[test]
    fn unterminated_string_rejected() {
        assert!(matches!(
            scan("\"oops"),
            Err(ParseError::UnterminatedString { .. })
        ));
    }
}
