//! # Lexer
//!
//! Streaming tokenizer over heterogeneous text. Walks the input left to right
//! byte by byte, tracking `(line, column)`, and emits a tight vocabulary of
//! punctuation, whitespace, and text-run tokens plus the begin-of-token marker
//! for the closed set of implementation prefixes.
//!
//! Prefix detection only kicks in on the first letters of valid prefixes
//! (`A`, `G`, `V`, `U`); the full literal followed by the configured token
//! separator must match for a marker to be emitted, otherwise the letters are
//! downgraded to plain text. Recognition is driven by runtime-configured
//! separators, which is why this is a hand-written cursor rather than a
//! pattern-derived lexer.

use crate::config::Config;
use crate::domain::TokenPrefix;
use crate::errors::Result;

/// Kinds of lexical tokens
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenKind {
    /// Run of plain text
    Text,
    Equals,
    Dot,
    Comma,
    ForwardSlash,
    BackSlash,
    QuestionMark,
    /// `/?` as a single unit, commonly the start of a URL query
    SlashQuestionMark,
    AtSign,
    Colon,
    Pipe,
    DoubleQuote,
    SingleQuote,
    /// `[` opening a metadata block
    BeginMeta,
    /// `]` closing a metadata block
    EndMeta,
    /// The configured key separator character
    KeyPathSeparator,
    /// A recognised prefix immediately followed by the token separator
    BeginConfigManagerToken,
    Space,
    Tab,
    NewLine,
    CarriageReturn,
    Control,
    Eof,
}

/// A lexical token with its literal and source position
#[derive(Debug, Clone, PartialEq)]
pub struct LexToken {
    pub kind: TokenKind,
    pub literal: String,
    /// Set only on [`TokenKind::BeginConfigManagerToken`]
    pub prefix: Option<TokenPrefix>,
    pub line: u32,
    pub column: u32,
}

impl LexToken {
    fn new(kind: TokenKind, literal: impl Into<String>, line: u32, column: u32) -> Self {
        Self { kind, literal: literal.into(), prefix: None, line, column }
    }
}

/// Byte-cursor lexer over a UTF-8 input string
pub struct Lexer<'a> {
    input: &'a [u8],
    token_separator: String,
    key_separator: u8,
    /// current position in input (points to current byte)
    position: usize,
    /// current reading position in input (after current byte)
    read_position: usize,
    /// current byte under examination; 0 at end of input
    ch: u8,
    line: u32,
    column: u32,
}

impl<'a> Lexer<'a> {
    /// Create a lexer over `input` with the configured separators
    pub fn new(input: &'a str, config: &Config) -> Result<Self> {
        config.validate()?;
        let mut lexer = Self {
            input: input.as_bytes(),
            token_separator: config.token_separator().to_string(),
            key_separator: config.key_separator().as_bytes()[0],
            position: 0,
            read_position: 0,
            ch: 0,
            line: 1,
            column: 0,
        };
        lexer.read_char();
        Ok(lexer)
    }

    /// Advance through the input and return the next token
    ///
    /// Keeps returning [`TokenKind::Eof`] once the input is exhausted.
    pub fn next_token(&mut self) -> LexToken {
        let (line, column) = (self.line, self.column);

        let tok = match self.ch {
            c if c == self.key_separator => {
                LexToken::new(TokenKind::KeyPathSeparator, (c as char).to_string(), line, column)
            }
            b'A' => match self.peek_char() {
                b'W' => {
                    self.read_char();
                    self.begin_token_or_text(
                        &[TokenPrefix::AwsSecrets, TokenPrefix::AwsParamStr],
                        "AW",
                        line,
                        column,
                    )
                }
                b'Z' => {
                    self.read_char();
                    self.begin_token_or_text(
                        &[
                            TokenPrefix::AzKvSecret,
                            TokenPrefix::AzTableStore,
                            TokenPrefix::AzAppConf,
                        ],
                        "AZ",
                        line,
                        column,
                    )
                }
                _ => LexToken::new(TokenKind::Text, "A", line, column),
            },
            b'G' => {
                if self.peek_char() == b'C' {
                    self.read_char();
                    self.begin_token_or_text(&[TokenPrefix::GcpSecrets], "GC", line, column)
                } else {
                    LexToken::new(TokenKind::Text, "G", line, column)
                }
            }
            b'V' => {
                if self.peek_char() == b'A' {
                    self.read_char();
                    self.begin_token_or_text(&[TokenPrefix::Vault], "VA", line, column)
                } else {
                    LexToken::new(TokenKind::Text, "V", line, column)
                }
            }
            b'U' => {
                if self.peek_char() == b'N' {
                    self.read_char();
                    self.begin_token_or_text(&[TokenPrefix::Unknown], "UN", line, column)
                } else {
                    LexToken::new(TokenKind::Text, "U", line, column)
                }
            }
            b'=' => LexToken::new(TokenKind::Equals, "=", line, column),
            b'.' => LexToken::new(TokenKind::Dot, ".", line, column),
            b',' => LexToken::new(TokenKind::Comma, ",", line, column),
            b'/' => {
                if self.peek_char() == b'?' {
                    self.read_char();
                    LexToken::new(TokenKind::SlashQuestionMark, "/?", line, column)
                } else {
                    LexToken::new(TokenKind::ForwardSlash, "/", line, column)
                }
            }
            b'\\' => LexToken::new(TokenKind::BackSlash, "\\", line, column),
            b'?' => LexToken::new(TokenKind::QuestionMark, "?", line, column),
            b'[' => LexToken::new(TokenKind::BeginMeta, "[", line, column),
            b']' => LexToken::new(TokenKind::EndMeta, "]", line, column),
            b'|' => LexToken::new(TokenKind::Pipe, "|", line, column),
            b'@' => LexToken::new(TokenKind::AtSign, "@", line, column),
            b':' => LexToken::new(TokenKind::Colon, ":", line, column),
            b'"' => LexToken::new(TokenKind::DoubleQuote, "\"", line, column),
            b'\'' => LexToken::new(TokenKind::SingleQuote, "'", line, column),
            b'\n' => {
                self.line += 1;
                self.column = 0;
                LexToken::new(TokenKind::NewLine, "\n", line, column)
            }
            b' ' => LexToken::new(TokenKind::Space, " ", line, column),
            b'\t' => LexToken::new(TokenKind::Tab, "\t", line, column),
            b'\r' => LexToken::new(TokenKind::CarriageReturn, "\r", line, column),
            b'\x0c' => LexToken::new(TokenKind::Control, "\x0c", line, column),
            0 => return LexToken::new(TokenKind::Eof, "", line, column),
            _ => return self.read_text(line, column),
        };

        self.read_char();
        tok
    }

    /// Move the cursor along by one byte
    fn read_char(&mut self) {
        if self.read_position >= self.input.len() {
            self.ch = 0;
        } else {
            self.ch = self.input[self.read_position];
        }
        self.position = self.read_position;
        self.read_position += 1;
        self.column += 1;
    }

    /// Reveal the next byte without advancing the cursor
    fn peek_char(&self) -> u8 {
        if self.read_position >= self.input.len() {
            0
        } else {
            self.input[self.read_position]
        }
    }

    /// Try each candidate prefix against the upcoming bytes
    ///
    /// The cursor sits on the second letter of the candidate group
    /// (`consumed`). A candidate matches when its remaining literal plus the
    /// token separator follow immediately; the matched bytes are then
    /// consumed. No candidate matching leaves the cursor untouched and the
    /// consumed letters become plain text.
    fn begin_token_or_text(
        &mut self,
        candidates: &[TokenPrefix],
        consumed: &str,
        line: u32,
        column: u32,
    ) -> LexToken {
        let ahead = &self.input[self.read_position.min(self.input.len())..];
        for prefix in candidates {
            let rest = &prefix.as_str().as_bytes()[consumed.len()..];
            let want_len = rest.len() + self.token_separator.len();
            if ahead.len() >= want_len
                && &ahead[..rest.len()] == rest
                && &ahead[rest.len()..want_len] == self.token_separator.as_bytes()
            {
                for _ in 0..want_len {
                    self.read_char();
                }
                let literal = format!("{}{}", prefix.as_str(), self.token_separator);
                let mut tok = LexToken::new(TokenKind::BeginConfigManagerToken, literal, line, column);
                tok.prefix = Some(*prefix);
                return tok;
            }
        }
        LexToken::new(TokenKind::Text, consumed, line, column)
    }

    /// Absorb a run of plain text until a delimiter byte
    fn read_text(&mut self, line: u32, column: u32) -> LexToken {
        let start = self.position;
        while self.is_text(self.ch) && self.read_position <= self.input.len() {
            self.read_char();
        }
        let literal = String::from_utf8_lossy(&self.input[start..self.position]).into_owned();
        LexToken::new(TokenKind::Text, literal, line, column)
    }

    /// Text is anything outside punctuation, whitespace, prefix-starter
    /// letters, and the configured key separator
    fn is_text(&self, ch: u8) -> bool {
        if ch == 0 || ch == self.key_separator {
            return false;
        }
        !matches!(
            ch,
            b' ' | b'\n'
                | b'\r'
                | b'\t'
                | b'\x0c'
                | b'='
                | b'.'
                | b','
                | b'|'
                | b'?'
                | b'/'
                | b'\\'
                | b'@'
                | b':'
                | b']'
                | b'['
                | b'\''
                | b'"'
                | b'A'
                | b'G'
                | b'V'
                | b'U'
        )
    }
}
