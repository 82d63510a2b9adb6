//! # Parser
//!
//! Assembles token blocks out of the lexer stream. The parser keeps a
//! `(current, peek)` cursor, skips everything that is not a begin-of-token
//! marker, and on a marker builds exactly one block: sanitized path, optional
//! key path, optional metadata. It interprets the source top to bottom and
//! never re-scans.
//!
//! Errors do not abort the scan: a failed block is recorded and parsing
//! continues from the current position, so the caller receives every
//! successfully parsed block alongside the full error batch.

use crate::config::Config;
use crate::domain::{ParsedToken, TokenPrefix};
use crate::errors::Result;
use crate::lexer::{LexToken, Lexer, TokenKind};
use tracing::debug;

/// What went wrong while assembling one token block
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParseErrorKind {
    /// Metadata bracket was never closed
    NoEndTag,
    /// `[]` with no pairs inside
    EmptyMetadata,
}

impl std::fmt::Display for ParseErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::NoEndTag => write!(f, "no corresponding end tag found"),
            Self::EmptyMetadata => write!(f, "metadata block is empty"),
        }
    }
}

/// A single parse failure, anchored to the begin marker of its token block
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
#[error("[{line}:{column}] {kind} for token {prefix} (path so far: {partial_path:?})")]
pub struct ParseError {
    pub prefix: TokenPrefix,
    pub partial_path: String,
    pub line: u32,
    pub column: u32,
    pub kind: ParseErrorKind,
}

/// One successfully assembled token block, in source order
#[derive(Debug, Clone, PartialEq)]
pub struct TokenBlock {
    pub token: ParsedToken,
    pub line: u32,
    pub column: u32,
}

/// Stateful cursor over the lexer stream
pub struct Parser<'a> {
    lexer: Lexer<'a>,
    config: &'a Config,
    cur: LexToken,
    peek: LexToken,
    errors: Vec<ParseError>,
}

impl<'a> Parser<'a> {
    /// Create a parser over `input`; fails on invalid separator configuration
    pub fn new(input: &'a str, config: &'a Config) -> Result<Self> {
        let mut lexer = Lexer::new(input, config)?;
        // prime the (current, peek) window
        let cur = lexer.next_token();
        let peek = lexer.next_token();
        Ok(Self { lexer, config, cur, peek, errors: Vec::new() })
    }

    /// Produce the flat list of token blocks plus the error batch
    pub fn parse(mut self) -> (Vec<TokenBlock>, Vec<ParseError>) {
        let mut blocks = Vec::new();

        while self.cur.kind != TokenKind::Eof {
            if self.cur.kind == TokenKind::BeginConfigManagerToken {
                if let Some(block) = self.build_token_block() {
                    blocks.push(block);
                }
            }
            self.advance();
        }

        (blocks, self.errors)
    }

    fn advance(&mut self) {
        self.cur = std::mem::replace(&mut self.peek, self.lexer.next_token());
    }

    /// A token ends when the upcoming token is one of these
    fn peek_is_terminator(&self) -> bool {
        matches!(
            self.peek.kind,
            TokenKind::AtSign
                | TokenKind::QuestionMark
                | TokenKind::Colon
                | TokenKind::SlashQuestionMark
                | TokenKind::Eof
                | TokenKind::DoubleQuote
                | TokenKind::SingleQuote
                | TokenKind::Space
                | TokenKind::NewLine
        )
    }

    /// Assemble one block starting at the current begin marker
    ///
    /// Returns `None` on a recorded parse error or when the sanitized path
    /// came out empty; either way the block is dropped, not the scan.
    fn build_token_block(&mut self) -> Option<TokenBlock> {
        let begin = self.cur.clone();
        let prefix = begin.prefix?;
        let mut token = ParsedToken::new_unchecked(prefix, self.config);
        let mut path = String::new();

        // move past the begin marker
        self.advance();

        loop {
            // the token ends before the next terminator or an adjacent token
            if self.peek_is_terminator() || self.peek.kind == TokenKind::BeginConfigManagerToken {
                path.push_str(&self.cur.literal);
                break;
            }
            if self.cur.kind == TokenKind::KeyPathSeparator {
                if let Err(err) = self.build_key_path(&mut token, &begin, &path) {
                    self.errors.push(err);
                    return None;
                }
                break;
            }
            if self.cur.kind == TokenKind::BeginMeta {
                if let Err(err) = self.build_metadata(&mut token, &begin, &path) {
                    self.errors.push(err);
                    return None;
                }
                break;
            }
            path.push_str(&self.cur.literal);
            self.advance();
        }

        if path.is_empty() {
            debug!(prefix = %prefix, line = begin.line, column = begin.column, "dropping token with empty path");
            return None;
        }

        token.set_sanitized_path(path);
        Some(TokenBlock { token, line: begin.line, column: begin.column })
    }

    /// Accumulate the key path after the separator
    ///
    /// Ends on a metadata block, an adjacent begin marker, a terminator, or
    /// end of input.
    fn build_key_path(
        &mut self,
        token: &mut ParsedToken,
        begin: &LexToken,
        path_so_far: &str,
    ) -> std::result::Result<(), ParseError> {
        // step past the separator onto the first key-path token
        self.advance();
        let mut key_path = String::new();

        loop {
            if self.peek.kind == TokenKind::BeginMeta {
                key_path.push_str(&self.cur.literal);
                self.advance();
                self.build_metadata(token, begin, path_so_far)?;
                break;
            }
            if self.peek.kind == TokenKind::BeginConfigManagerToken || self.peek_is_terminator() {
                key_path.push_str(&self.cur.literal);
                break;
            }
            key_path.push_str(&self.cur.literal);
            self.advance();
        }

        token.set_key_path(key_path);
        Ok(())
    }

    /// Accumulate metadata between `[` and `]`
    ///
    /// The current token must be the opening bracket. At least one token must
    /// sit between the brackets; a terminator or end of input before the
    /// closing bracket fails the block.
    fn build_metadata(
        &mut self,
        token: &mut ParsedToken,
        begin: &LexToken,
        path_so_far: &str,
    ) -> std::result::Result<(), ParseError> {
        if self.peek.kind == TokenKind::EndMeta {
            return Err(self.parse_error(ParseErrorKind::EmptyMetadata, begin, path_so_far));
        }

        // step past the opening bracket
        self.advance();
        let mut metadata = String::new();

        loop {
            if self.peek_is_terminator() {
                return Err(self.parse_error(ParseErrorKind::NoEndTag, begin, path_so_far));
            }
            if self.peek.kind == TokenKind::EndMeta {
                metadata.push_str(&self.cur.literal);
                self.advance();
                break;
            }
            metadata.push_str(&self.cur.literal);
            self.advance();
        }

        token.set_metadata(metadata);
        Ok(())
    }

    fn parse_error(
        &self,
        kind: ParseErrorKind,
        begin: &LexToken,
        path_so_far: &str,
    ) -> ParseError {
        ParseError {
            prefix: begin.prefix.unwrap_or(TokenPrefix::Unknown),
            partial_path: path_so_far.to_string(),
            line: begin.line,
            column: begin.column,
            kind,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(input: &str, config: &Config) -> (Vec<TokenBlock>, Vec<ParseError>) {
        Parser::new(input, config).unwrap().parse()
    }

    fn assert_block(block: &TokenBlock, prefix: TokenPrefix, path: &str, key_path: &str) {
        assert_eq!(block.token.prefix(), prefix);
        assert_eq!(block.token.store_key(), path);
        assert_eq!(block.token.key_path(), key_path);
    }

    #[test]
    fn test_adjacent_tokens() {
        let input = "foo=AWSPARAMSTR:///path|keyAWSSECRETS:///foo\n";
        let (blocks, errors) = parse(input, &Config::new());
        assert!(errors.is_empty(), "unexpected errors: {:?}", errors);
        assert_eq!(blocks.len(), 2);
        assert_block(&blocks[0], TokenPrefix::AwsParamStr, "/path", "key");
        assert_block(&blocks[1], TokenPrefix::AwsSecrets, "/foo", "");
    }

    #[test]
    fn test_tokens_embedded_in_url() {
        let input = "foo=proto://AWSPARAMSTR:///config|user:AWSSECRETS:///creds|password@AWSPARAMSTR:///config|endpoint:AWSPARAMSTR:///config|port/?queryParam1=123&queryParam2=AWSPARAMSTR:///config|qp2\n";
        let (blocks, errors) = parse(input, &Config::new());
        assert!(errors.is_empty(), "unexpected errors: {:?}", errors);
        assert_eq!(blocks.len(), 5);
        assert_block(&blocks[0], TokenPrefix::AwsParamStr, "/config", "user");
        assert_block(&blocks[1], TokenPrefix::AwsSecrets, "/creds", "password");
        assert_block(&blocks[2], TokenPrefix::AwsParamStr, "/config", "endpoint");
        assert_block(&blocks[3], TokenPrefix::AwsParamStr, "/config", "port");
        assert_block(&blocks[4], TokenPrefix::AwsParamStr, "/config", "qp2");
    }

    #[test]
    fn test_metadata_block() {
        let (blocks, errors) = parse("AWSSECRETS:///bar/foo[version=123]", &Config::new());
        assert!(errors.is_empty(), "unexpected errors: {:?}", errors);
        assert_eq!(blocks.len(), 1);
        assert_block(&blocks[0], TokenPrefix::AwsSecrets, "/bar/foo", "");
        assert_eq!(blocks[0].token.metadata(), "version=123");
    }

    #[test]
    fn test_key_path_and_metadata() {
        let input = "VAULT://baz/bar/123|key1.prop2[role=arn:aws:iam::1111111:role,version=1082313]";
        let (blocks, errors) = parse(input, &Config::new());
        assert!(errors.is_empty(), "unexpected errors: {:?}", errors);
        assert_eq!(blocks.len(), 1);
        assert_block(&blocks[0], TokenPrefix::Vault, "baz/bar/123", "key1.prop2");
        assert_eq!(
            blocks[0].token.metadata(),
            "role=arn:aws:iam::1111111:role,version=1082313"
        );
    }

    #[test]
    fn test_unterminated_metadata() {
        let (blocks, errors) = parse("AWSSECRETS:///foo[version=1.2.3", &Config::new());
        assert!(blocks.is_empty());
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].kind, ParseErrorKind::NoEndTag);
        assert_eq!(errors[0].prefix, TokenPrefix::AwsSecrets);
    }

    #[test]
    fn test_empty_metadata() {
        let (blocks, errors) = parse("AWSSECRETS:///foo[]", &Config::new());
        assert!(blocks.is_empty());
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].kind, ParseErrorKind::EmptyMetadata);
    }

    #[test]
    fn test_error_does_not_abort_scan() {
        let input = "AWSSECRETS:///broken[version=1 AWSPARAMSTR:///ok\n";
        let (blocks, errors) = parse(input, &Config::new());
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].kind, ParseErrorKind::NoEndTag);
        assert_eq!(blocks.len(), 1);
        assert_block(&blocks[0], TokenPrefix::AwsParamStr, "/ok", "");
    }

    #[test]
    fn test_no_tokens_in_input() {
        let (blocks, errors) = parse("export FOO=bar\nBAZ=qux\n", &Config::new());
        assert!(blocks.is_empty());
        assert!(errors.is_empty());
    }

    #[test]
    fn test_token_terminated_by_quotes() {
        let (blocks, errors) = parse("\"AWSSECRETS:///foo\"", &Config::new());
        assert!(errors.is_empty());
        assert_eq!(blocks.len(), 1);
        assert_block(&blocks[0], TokenPrefix::AwsSecrets, "/foo", "");
    }

    #[test]
    fn test_token_at_end_of_input() {
        let (blocks, errors) = parse("foo=GCPSECRETS://projects/111/secret", &Config::new());
        assert!(errors.is_empty());
        assert_eq!(blocks.len(), 1);
        assert_block(&blocks[0], TokenPrefix::GcpSecrets, "projects/111/secret", "");
    }

    #[test]
    fn test_empty_path_token_dropped() {
        // a marker with nothing after it has no backend-visible path
        let (blocks, errors) = parse("AWSSECRETS://", &Config::new());
        assert!(blocks.is_empty());
        assert!(errors.is_empty());
    }

    #[test]
    fn test_full_round_trips_isolated_token() {
        for input in [
            "AWSSECRETS:///bar/foo",
            "AWSPARAMSTR:///mount/token|key1.key2",
            "AZKVSECRET://vault/secret[label=prod]",
            "VAULT://baz/bar|a.b[version=1,role=admin]",
        ] {
            let (blocks, errors) = parse(input, &Config::new());
            assert!(errors.is_empty(), "{}: unexpected errors {:?}", input, errors);
            assert_eq!(blocks.len(), 1, "{}: expected one block", input);
            assert_eq!(blocks[0].token.full(), input, "round trip failed");
        }
    }

    #[test]
    fn test_custom_separators_parse() {
        let config = Config::new().with_token_separator("#").with_key_separator("!");
        let (blocks, errors) = parse("pass=AWSSECRETS#/prod/db!host other", &config);
        assert!(errors.is_empty());
        assert_eq!(blocks.len(), 1);
        assert_block(&blocks[0], TokenPrefix::AwsSecrets, "/prod/db", "host");
        assert_eq!(blocks[0].token.full(), "AWSSECRETS#/prod/db!host");
    }
}
