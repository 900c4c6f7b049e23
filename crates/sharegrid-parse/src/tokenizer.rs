use std::error::Error;
use std::fmt::{self, Display};

/// Byte range of a token or node within the formula source.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Span {
    pub start: usize,
    pub end: usize,
}

impl Span {
    pub fn new(start: usize, end: usize) -> Self {
        Self { start, end }
    }

    pub fn join(self, other: Span) -> Span {
        Span::new(self.start.min(other.start), self.end.max(other.end))
    }
}

/// A custom error type for the tokenizer.
#[derive(Debug)]
pub struct TokenizerError {
    pub message: String,
    pub pos: usize,
}

impl Display for TokenizerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "TokenizerError at {}: {}", self.pos, self.message)
    }
}

impl Error for TokenizerError {}

/// The type of a token.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TokenType {
    Open,
    Close,
    /// A double-quoted string, value holds the unescaped text.
    Text,
    /// Any other run of non-delimiter characters: numbers, booleans,
    /// function names and cell references.
    Atom,
}

impl Display for TokenType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{self:?}")
    }
}

#[derive(Debug, Clone, PartialEq, Hash)]
pub struct Token {
    pub value: String,
    pub token_type: TokenType,
    pub span: Span,
}

impl Display for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "<{} value: {}>", self.token_type, self.value)
    }
}

impl Token {
    pub fn new(value: impl Into<String>, token_type: TokenType, span: Span) -> Self {
        Token {
            value: value.into(),
            token_type,
            span,
        }
    }
}

#[inline(always)]
fn is_delimiter(c: u8) -> bool {
    c.is_ascii_whitespace() || matches!(c, b'(' | b')' | b'"' | b';')
}

/// Splits formula source into tokens.
///
/// `;` starts a comment running to the end of the line.
pub struct Tokenizer<'a> {
    src: &'a str,
    offset: usize,
    pub items: Vec<Token>,
}

impl<'a> Tokenizer<'a> {
    pub fn new(src: &'a str) -> Result<Self, TokenizerError> {
        let mut tokenizer = Tokenizer {
            src,
            offset: 0,
            items: Vec::with_capacity(src.len() / 4 + 1),
        };
        tokenizer.run()?;
        Ok(tokenizer)
    }

    fn run(&mut self) -> Result<(), TokenizerError> {
        let bytes = self.src.as_bytes();
        while self.offset < bytes.len() {
            let c = bytes[self.offset];
            match c {
                b'(' => self.single(TokenType::Open),
                b')' => self.single(TokenType::Close),
                b'"' => self.text()?,
                b';' => self.comment(),
                c if c.is_ascii_whitespace() => self.offset += 1,
                _ => self.atom(),
            }
        }
        Ok(())
    }

    fn single(&mut self, token_type: TokenType) {
        let start = self.offset;
        self.offset += 1;
        self.items.push(Token::new(
            &self.src[start..self.offset],
            token_type,
            Span::new(start, self.offset),
        ));
    }

    fn comment(&mut self) {
        let bytes = self.src.as_bytes();
        while self.offset < bytes.len() && bytes[self.offset] != b'\n' {
            self.offset += 1;
        }
    }

    fn atom(&mut self) {
        let bytes = self.src.as_bytes();
        let start = self.offset;
        while self.offset < bytes.len() && !is_delimiter(bytes[self.offset]) {
            self.offset += 1;
        }
        self.items.push(Token::new(
            &self.src[start..self.offset],
            TokenType::Atom,
            Span::new(start, self.offset),
        ));
    }

    fn text(&mut self) -> Result<(), TokenizerError> {
        let start = self.offset;
        let mut value = String::new();
        let mut chars = self.src[start + 1..].char_indices();
        while let Some((i, ch)) = chars.next() {
            match ch {
                '"' => {
                    self.offset = start + 1 + i + 1;
                    self.items.push(Token::new(
                        value,
                        TokenType::Text,
                        Span::new(start, self.offset),
                    ));
                    return Ok(());
                }
                '\\' => match chars.next() {
                    Some((_, 'n')) => value.push('\n'),
                    Some((_, 't')) => value.push('\t'),
                    Some((_, esc)) => value.push(esc),
                    None => break,
                },
                other => value.push(other),
            }
        }
        Err(TokenizerError {
            message: "Unterminated string literal".to_string(),
            pos: start,
        })
    }
}
