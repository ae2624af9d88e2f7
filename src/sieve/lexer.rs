/// SIEVE script tokenizer (RFC 5228).
///
/// The scanner is a small state machine: `next_token` starts in
/// [`State::Start`] and keeps stepping until a state emits a token, reaches
/// end of input, or fails. Every state consumes input or halts, so a scan is
/// linear in the length of the script.
use std::fmt;

use unicode_general_category::{get_general_category, GeneralCategory};

use crate::sieve::ast::{Position, Quantifier};
use crate::sieve::error::LexError;

/// Opening marker of a multi-line string. Input starting with it is never
/// an identifier.
pub const TEXT_MARKER: &str = "text:";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TokenKind {
    /// End of input. Always the last token of a successful scan.
    Eof,
    /// A `# ...` or `/* ... */` comment; the text is the body.
    Comment,
    /// An identifier like `if` or `header`, or a tag like `:is` (text keeps the colon).
    Identifier,
    /// `;`
    End,
    /// A quoted or multi-line string; the text has escapes resolved.
    String,
    /// Digits with an optional `K`/`M`/`G` quantifier.
    Numeric,
    /// `[`
    StringListOpen,
    /// `]`
    StringListClose,
    /// `(`
    TestListOpen,
    /// `)`
    TestListClose,
    /// `{`
    BlockOpen,
    /// `}`
    BlockClose,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Token {
    pub kind: TokenKind,
    pub pos: Position,
    pub text: String,
}

impl Token {
    /// A `:tag` identifier.
    pub fn is_tag(&self) -> bool {
        self.kind == TokenKind::Identifier && self.text.starts_with(':')
    }

    /// A bare identifier, i.e. not a tag.
    pub fn is_word(&self) -> bool {
        self.kind == TokenKind::Identifier && !self.text.starts_with(':')
    }
}

impl fmt::Display for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.kind {
            TokenKind::Eof => f.write_str("end of input"),
            TokenKind::Comment => f.write_str("comment"),
            TokenKind::String => write!(f, "\"{}\"", self.text),
            _ => f.write_str(&self.text),
        }
    }
}

/// Scanning states. `Start` dispatches on the next character.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    Start,
    Whitespace,
    HashComment,
    BracketComment,
    Identifier,
    Tag,
    QuotedString,
    Multiline,
    Numeric,
    Delimiter,
}

/// Outcome of one state step.
enum Step {
    Next(State),
    Emit(TokenKind),
    Halt,
}

pub struct Scanner<'a> {
    input: &'a str,
    /// Start of the pending token.
    start: usize,
    /// Current read offset.
    pos: usize,
    /// Resolved text of the pending string or comment.
    value: String,
    failed: bool,
    finished: bool,
}

impl<'a> Scanner<'a> {
    pub fn new(input: &'a str) -> Self {
        Self {
            input,
            start: 0,
            pos: 0,
            value: String::new(),
            failed: false,
            finished: false,
        }
    }

    /// Scan the next token. Returns [`TokenKind::Eof`] once the input is
    /// exhausted, and again on every later call. After an error the scanner
    /// only returns end of input.
    pub fn next_token(&mut self) -> Result<Token, LexError> {
        if self.failed {
            return Ok(self.eof());
        }

        let mut state = State::Start;
        loop {
            let step = match self.step(state) {
                Ok(step) => step,
                Err(err) => {
                    self.failed = true;
                    self.start = self.input.len();
                    self.pos = self.input.len();
                    return Err(err);
                }
            };
            match step {
                Step::Next(next) => state = next,
                Step::Emit(kind) => return Ok(self.emit(kind)),
                Step::Halt => return Ok(self.eof()),
            }
        }
    }

    fn step(&mut self, state: State) -> Result<Step, LexError> {
        match state {
            State::Start => self.lex_start(),
            State::Whitespace => self.lex_whitespace(),
            State::HashComment => self.lex_hash_comment(),
            State::BracketComment => self.lex_bracket_comment(),
            State::Identifier => self.lex_identifier(),
            State::Tag => self.lex_tag(),
            State::QuotedString => self.lex_quoted_string(),
            State::Multiline => self.lex_multiline(),
            State::Numeric => self.lex_numeric(),
            State::Delimiter => self.lex_delimiter(),
        }
    }

    // -- cursor ------------------------------------------------------------

    fn peek(&self) -> Option<char> {
        self.input[self.pos..].chars().next()
    }

    fn advance(&mut self) -> Option<char> {
        let c = self.peek()?;
        self.pos += c.len_utf8();
        Some(c)
    }

    fn accept(&mut self, c: char) -> bool {
        if self.peek() == Some(c) {
            self.pos += c.len_utf8();
            true
        } else {
            false
        }
    }

    fn has_prefix(&self, prefix: &str) -> bool {
        self.input[self.pos..].starts_with(prefix)
    }

    fn accept_prefix(&mut self, prefix: &str) -> bool {
        if self.has_prefix(prefix) {
            self.pos += prefix.len();
            true
        } else {
            false
        }
    }

    fn ignore(&mut self) {
        self.start = self.pos;
    }

    fn here(&self) -> Position {
        Position(self.pos)
    }

    fn emit(&mut self, kind: TokenKind) -> Token {
        let text = match kind {
            TokenKind::String | TokenKind::Comment => std::mem::take(&mut self.value),
            _ => self.input[self.start..self.pos].to_string(),
        };
        let token = Token {
            kind,
            pos: Position(self.start),
            text,
        };
        self.start = self.pos;
        token
    }

    fn eof(&self) -> Token {
        Token {
            kind: TokenKind::Eof,
            pos: Position(self.input.len()),
            text: String::new(),
        }
    }

    /// Error for a character that may not appear where it was read.
    /// `at` is the offset the character starts at.
    fn reject(&self, c: char, at: usize) -> LexError {
        let pos = Position(at);
        match c {
            '\r' => LexError::DanglingCarriageReturn { pos },
            '\n' => LexError::DanglingLineFeed { pos },
            '\0' => LexError::NulCharacter { pos },
            found => LexError::UnexpectedChar { found, pos },
        }
    }

    // -- states ------------------------------------------------------------

    fn lex_start(&mut self) -> Result<Step, LexError> {
        loop {
            let Some(c) = self.peek() else {
                return Ok(Step::Halt);
            };
            let next = match c {
                ' ' | '\t' | '\r' | '\n' | '/' | '#' => State::Whitespace,
                // Commas only separate string-list items and are dropped.
                ',' => {
                    self.advance();
                    self.ignore();
                    continue;
                }
                '"' => State::QuotedString,
                '[' | ']' | '(' | ')' | '{' | '}' | ';' => State::Delimiter,
                ':' => State::Tag,
                _ if self.has_prefix(TEXT_MARKER) => State::Multiline,
                _ if is_identifier_start(c) => State::Identifier,
                _ if c.is_ascii_digit() => State::Numeric,
                _ => return Err(self.reject(c, self.pos)),
            };
            return Ok(Step::Next(next));
        }
    }

    fn lex_whitespace(&mut self) -> Result<Step, LexError> {
        loop {
            let at = self.pos;
            match self.advance() {
                None => return Ok(Step::Halt),
                Some(' ' | '\t') => self.ignore(),
                Some('\r') => {
                    if !self.accept('\n') {
                        return Err(LexError::DanglingCarriageReturn { pos: Position(at) });
                    }
                    self.ignore();
                }
                Some('\n') => return Err(LexError::DanglingLineFeed { pos: Position(at) }),
                Some('#') => return Ok(Step::Next(State::HashComment)),
                Some('/') => {
                    if !self.accept('*') {
                        return Err(LexError::InvalidCommentStart { pos: Position(at) });
                    }
                    return Ok(Step::Next(State::BracketComment));
                }
                Some(_) => {
                    self.pos = at;
                    return Ok(Step::Next(State::Start));
                }
            }
        }
    }

    /// Body of a `#` comment. The CRLF is left for the whitespace state.
    fn lex_hash_comment(&mut self) -> Result<Step, LexError> {
        let body = self.pos;
        loop {
            match self.peek() {
                None => break,
                Some('\r') if self.has_prefix("\r\n") => break,
                Some(c @ ('\r' | '\n' | '\0')) => return Err(self.reject(c, self.pos)),
                Some(_) => {
                    self.advance();
                }
            }
        }
        self.value = self.input[body..self.pos].to_string();
        Ok(Step::Emit(TokenKind::Comment))
    }

    fn lex_bracket_comment(&mut self) -> Result<Step, LexError> {
        let body = self.pos;
        loop {
            let at = self.pos;
            match self.advance() {
                None => {
                    return Err(LexError::UnterminatedBracketComment {
                        pos: Position(self.start),
                    })
                }
                Some('*') => {
                    if self.accept('/') {
                        self.value = self.input[body..at].to_string();
                        return Ok(Step::Emit(TokenKind::Comment));
                    }
                }
                Some('\r') => {
                    if !self.accept('\n') {
                        return Err(LexError::DanglingCarriageReturn { pos: Position(at) });
                    }
                }
                Some(c @ ('\n' | '\0')) => return Err(self.reject(c, at)),
                Some(_) => {}
            }
        }
    }

    fn lex_identifier(&mut self) -> Result<Step, LexError> {
        let at = self.pos;
        match self.advance() {
            Some(c) if is_identifier_start(c) => {}
            Some(c) => return Err(self.reject(c, at)),
            None => return Err(LexError::UnexpectedEnd { pos: Position(at) }),
        }
        while self.peek().is_some_and(is_identifier_char) {
            self.advance();
        }
        Ok(Step::Emit(TokenKind::Identifier))
    }

    /// `:` followed by an identifier; the token keeps the colon.
    fn lex_tag(&mut self) -> Result<Step, LexError> {
        let at = self.pos;
        if !self.accept(':') {
            return Err(LexError::UnexpectedEnd { pos: Position(at) });
        }
        Ok(Step::Next(State::Identifier))
    }

    fn lex_quoted_string(&mut self) -> Result<Step, LexError> {
        let at = self.pos;
        if !self.accept('"') {
            return Err(LexError::UnexpectedEnd { pos: Position(at) });
        }
        self.value.clear();
        loop {
            let at = self.pos;
            match self.advance() {
                None => {
                    return Err(LexError::UnterminatedString {
                        pos: Position(self.start),
                    })
                }
                Some('"') => return Ok(Step::Emit(TokenKind::String)),
                Some('\\') => match self.advance() {
                    Some(c @ ('"' | '\\')) => self.value.push(c),
                    Some(escape) => {
                        return Err(LexError::UnsupportedEscape {
                            escape,
                            pos: Position(at),
                        })
                    }
                    None => {
                        return Err(LexError::UnterminatedString {
                            pos: Position(self.start),
                        })
                    }
                },
                Some('\r') => {
                    if !self.accept('\n') {
                        return Err(LexError::DanglingCarriageReturn { pos: Position(at) });
                    }
                    self.value.push_str("\r\n");
                }
                Some(c @ ('\n' | '\0')) => return Err(self.reject(c, at)),
                Some(c) => self.value.push(c),
            }
        }
    }

    /// `text:` [spaces] [hash-comment] CRLF *line "." CRLF
    ///
    /// Lines starting with a dot are dot-stuffed: the first dot is dropped.
    fn lex_multiline(&mut self) -> Result<Step, LexError> {
        let unterminated = LexError::UnterminatedMultiline {
            pos: Position(self.start),
        };
        if !self.accept_prefix(TEXT_MARKER) {
            return Err(LexError::UnexpectedEnd { pos: self.here() });
        }
        while self.accept(' ') || self.accept('\t') {}

        if self.accept('#') {
            loop {
                match self.peek() {
                    None => return Err(unterminated),
                    Some('\r' | '\n') => break,
                    Some('\0') => return Err(LexError::NulCharacter { pos: self.here() }),
                    Some(_) => {
                        self.advance();
                    }
                }
            }
        }

        if !self.accept_prefix("\r\n") {
            return match self.peek() {
                None => Err(unterminated),
                Some(_) => Err(LexError::MissingMultilineCrlf { pos: self.here() }),
            };
        }

        self.value.clear();
        loop {
            if self.accept_prefix(".\r\n") {
                return Ok(Step::Emit(TokenKind::String));
            }
            self.accept('.');
            loop {
                let at = self.pos;
                match self.advance() {
                    None => return Err(unterminated),
                    Some('\r') => {
                        if !self.accept('\n') {
                            return Err(LexError::DanglingCarriageReturn { pos: Position(at) });
                        }
                        self.value.push_str("\r\n");
                        break;
                    }
                    Some(c @ ('\n' | '\0')) => return Err(self.reject(c, at)),
                    Some(c) => self.value.push(c),
                }
            }
        }
    }

    /// number = 1*DIGIT [ QUANTIFIER ]
    fn lex_numeric(&mut self) -> Result<Step, LexError> {
        match self.peek() {
            Some(c) if c.is_ascii_digit() => {}
            Some(c) => return Err(self.reject(c, self.pos)),
            None => return Err(LexError::UnexpectedEnd { pos: self.here() }),
        }
        while self.peek().is_some_and(|c| c.is_ascii_digit()) {
            self.advance();
        }
        if self.peek().and_then(Quantifier::from_sieve).is_some() {
            self.advance();
        }
        Ok(Step::Emit(TokenKind::Numeric))
    }

    fn lex_delimiter(&mut self) -> Result<Step, LexError> {
        let at = self.pos;
        let kind = match self.advance() {
            Some('[') => TokenKind::StringListOpen,
            Some(']') => TokenKind::StringListClose,
            Some('(') => TokenKind::TestListOpen,
            Some(')') => TokenKind::TestListClose,
            Some('{') => TokenKind::BlockOpen,
            Some('}') => TokenKind::BlockClose,
            Some(';') => TokenKind::End,
            Some(c) => return Err(self.reject(c, at)),
            None => return Err(LexError::UnexpectedEnd { pos: Position(at) }),
        };
        Ok(Step::Emit(kind))
    }
}

impl Iterator for Scanner<'_> {
    type Item = Result<Token, LexError>;

    /// Yields every token including the final [`TokenKind::Eof`], or stops
    /// after the first error.
    fn next(&mut self) -> Option<Self::Item> {
        if self.finished {
            return None;
        }
        let item = self.next_token();
        if !matches!(&item, Ok(token) if token.kind != TokenKind::Eof) {
            self.finished = true;
        }
        Some(item)
    }
}

impl std::iter::FusedIterator for Scanner<'_> {}

/// `_` or a character of general category L (letter).
fn is_identifier_start(c: char) -> bool {
    c == '_'
        || matches!(
            get_general_category(c),
            GeneralCategory::UppercaseLetter
                | GeneralCategory::LowercaseLetter
                | GeneralCategory::TitlecaseLetter
                | GeneralCategory::ModifierLetter
                | GeneralCategory::OtherLetter
        )
}

/// Start characters plus decimal digits (Nd).
fn is_identifier_char(c: char) -> bool {
    is_identifier_start(c) || matches!(get_general_category(c), GeneralCategory::DecimalNumber)
}

/// Scan the whole input. The last token is always [`TokenKind::Eof`].
pub fn tokenize(input: &str) -> Result<Vec<Token>, LexError> {
    let tokens = Scanner::new(input).collect::<Result<Vec<_>, _>>()?;
    tracing::trace!(count = tokens.len(), bytes = input.len(), "tokenized script");
    Ok(tokens)
}
