/// Diagnostics shared by the scanner and the parser.
use crate::sieve::ast::Position;

/// A scan failure. Scanning stops at the first one.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum LexError {
    #[error("unexpected character {found:?} at offset {pos}")]
    UnexpectedChar { found: char, pos: Position },
    #[error("dangling carriage return at offset {pos}")]
    DanglingCarriageReturn { pos: Position },
    #[error("dangling line feed at offset {pos}")]
    DanglingLineFeed { pos: Position },
    #[error("'/' not followed by '*' at offset {pos}")]
    InvalidCommentStart { pos: Position },
    #[error("unterminated bracket comment starting at offset {pos}")]
    UnterminatedBracketComment { pos: Position },
    #[error("unterminated quoted string starting at offset {pos}")]
    UnterminatedString { pos: Position },
    #[error("unterminated multi-line string starting at offset {pos}")]
    UnterminatedMultiline { pos: Position },
    #[error("unsupported escape sequence '\\{escape}' at offset {pos}")]
    UnsupportedEscape { escape: char, pos: Position },
    #[error("expected CRLF after multi-line marker at offset {pos}")]
    MissingMultilineCrlf { pos: Position },
    #[error("NUL character at offset {pos}")]
    NulCharacter { pos: Position },
    #[error("unexpected end of input at offset {pos}")]
    UnexpectedEnd { pos: Position },
}

impl LexError {
    pub fn position(&self) -> Position {
        match self {
            Self::UnexpectedChar { pos, .. }
            | Self::DanglingCarriageReturn { pos }
            | Self::DanglingLineFeed { pos }
            | Self::InvalidCommentStart { pos }
            | Self::UnterminatedBracketComment { pos }
            | Self::UnterminatedString { pos }
            | Self::UnterminatedMultiline { pos }
            | Self::UnsupportedEscape { pos, .. }
            | Self::MissingMultilineCrlf { pos }
            | Self::NulCharacter { pos }
            | Self::UnexpectedEnd { pos } => *pos,
        }
    }

    pub fn category(&self) -> &'static str {
        match self {
            Self::UnexpectedChar { .. } => "unexpected character",
            Self::DanglingCarriageReturn { .. } => "dangling carriage return",
            Self::DanglingLineFeed { .. } => "dangling line feed",
            Self::InvalidCommentStart { .. } => "invalid comment start",
            Self::UnterminatedBracketComment { .. } => "unterminated bracket comment",
            Self::UnterminatedString { .. } => "unterminated string",
            Self::UnterminatedMultiline { .. } => "unterminated multi-line string",
            Self::UnsupportedEscape { .. } => "unsupported escape",
            Self::MissingMultilineCrlf { .. } => "missing CRLF",
            Self::NulCharacter { .. } => "NUL character",
            Self::UnexpectedEnd { .. } => "unexpected end of input",
        }
    }
}

/// A parse failure. Parsing aborts at the first one; there is no recovery.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ParseError {
    #[error("syntax error: {0}")]
    Lex(#[from] LexError),
    #[error("unexpected token `{found}` at offset {pos}")]
    UnexpectedToken { found: String, pos: Position },
    #[error("unknown identifier `{name}` at offset {pos}")]
    UnknownIdentifier { name: String, pos: Position },
    #[error("expected `;` after `{command}` at offset {pos}, found `{found}`")]
    ExpectedEnd {
        command: String,
        found: String,
        pos: Position,
    },
    #[error("expected {expected} at offset {pos}, found `{found}`")]
    Expected {
        expected: &'static str,
        found: String,
        pos: Position,
    },
    #[error("`{keyword}` without a preceding `if` at offset {pos}")]
    OrphanBranch { keyword: String, pos: Position },
    #[error("number `{text}` out of range at offset {pos}")]
    NumberOutOfRange { text: String, pos: Position },
    #[error("nesting deeper than {limit} at offset {pos}")]
    NestingTooDeep { limit: usize, pos: Position },
    #[error("script is {len} bytes, limit is {limit}")]
    ScriptTooLarge { len: usize, limit: usize },
}

impl ParseError {
    pub fn position(&self) -> Position {
        match self {
            Self::Lex(err) => err.position(),
            Self::UnexpectedToken { pos, .. }
            | Self::UnknownIdentifier { pos, .. }
            | Self::ExpectedEnd { pos, .. }
            | Self::Expected { pos, .. }
            | Self::OrphanBranch { pos, .. }
            | Self::NumberOutOfRange { pos, .. }
            | Self::NestingTooDeep { pos, .. } => *pos,
            Self::ScriptTooLarge { limit, .. } => Position(*limit),
        }
    }

    pub fn category(&self) -> &'static str {
        match self {
            Self::Lex(_) => "syntax error",
            Self::UnexpectedToken { .. } => "unexpected token",
            Self::UnknownIdentifier { .. } => "unknown identifier",
            Self::ExpectedEnd { .. } => "expected terminator",
            Self::Expected { .. } => "expected token",
            Self::OrphanBranch { .. } => "orphan branch",
            Self::NumberOutOfRange { .. } => "number out of range",
            Self::NestingTooDeep { .. } => "nesting too deep",
            Self::ScriptTooLarge { .. } => "script too large",
        }
    }
}
