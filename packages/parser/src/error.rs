use thiserror::Error;

pub type ParseResult<T> = Result<T, ParseError>;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum ParseError {
    #[error("Unexpected token at {pos}: expected {expected}, found {found}")]
    UnexpectedToken {
        pos: usize,
        expected: String,
        found: String,
    },

    #[error("Unexpected end of file at {pos}")]
    UnexpectedEof { pos: usize },

    #[error("Invalid syntax at {pos}: {message}")]
    InvalidSyntax { pos: usize, message: String },

    #[error("Mismatched end tag at {pos}: expected </{expected}>, found </{found}>")]
    MismatchedTag {
        pos: usize,
        expected: String,
        found: String,
    },

    #[error("Duplicate attribute '{name}' at {pos}")]
    DuplicateAttribute { pos: usize, name: String },

    #[error("Lexer error at {pos}")]
    LexerError { pos: usize },
}

impl ParseError {
    pub fn unexpected_token(pos: usize, expected: impl Into<String>, found: impl Into<String>) -> Self {
        Self::UnexpectedToken {
            pos,
            expected: expected.into(),
            found: found.into(),
        }
    }

    pub fn unexpected_eof(pos: usize) -> Self {
        Self::UnexpectedEof { pos }
    }

    pub fn invalid_syntax(pos: usize, message: impl Into<String>) -> Self {
        Self::InvalidSyntax {
            pos,
            message: message.into(),
        }
    }

    pub fn lexer_error(pos: usize) -> Self {
        Self::LexerError { pos }
    }

    /// Byte offset the error refers to
    pub fn pos(&self) -> usize {
        match self {
            Self::UnexpectedToken { pos, .. }
            | Self::UnexpectedEof { pos }
            | Self::InvalidSyntax { pos, .. }
            | Self::MismatchedTag { pos, .. }
            | Self::DuplicateAttribute { pos, .. }
            | Self::LexerError { pos } => *pos,
        }
    }

    /// 1-based line and column of the error inside `source`
    pub fn line_col(&self, source: &str) -> (usize, usize) {
        let pos = self.pos().min(source.len());
        let before = &source[..pos];
        let line = before.matches('\n').count() + 1;
        let col = before.rfind('\n').map(|nl| pos - nl).unwrap_or(pos + 1);
        (line, col)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_line_col() {
        let source = "<a>\n  <b>\n</a>";
        let err = ParseError::unexpected_eof(6);
        assert_eq!(err.line_col(source), (2, 3));
        assert_eq!(ParseError::lexer_error(0).line_col(source), (1, 1));
    }
}
