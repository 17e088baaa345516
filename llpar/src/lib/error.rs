use atngrammar::{IntervalSet, RIdx, StIdx};
use thiserror::Error;

use crate::token::Token;

/// Why a recogniser could not match its input at some point.
///
/// The `Display` form of each variant is a short summary; the messages given to error listeners
/// are composed by the error strategy, which knows the grammar's token names.
#[derive(Clone, Debug, Error)]
pub enum RecognitionError {
    /// No alternative of a decision matches the input from `start` up to `offending`.
    #[error("no viable alternative at input '{}'", .offending.text())]
    NoViableAlt {
        start: Token,
        offending: Token,
        state: Option<StIdx>,
    },
    /// The current token is not one of those expected.
    #[error("mismatched input '{}' expecting {expected}", .offending.text())]
    InputMismatch {
        offending: Token,
        expected: IntervalSet,
        state: Option<StIdx>,
    },
    /// A semantic or precedence predicate guarding the current path evaluated to false.
    #[error("rule {rule_name} failed predicate: {{{predicate}}}?")]
    FailedPredicate {
        offending: Token,
        rule: RIdx,
        rule_name: String,
        predicate: String,
        state: Option<StIdx>,
    },
    /// No lexer rule matches the input starting at character `start_index`.
    #[error("token recognition error at: '{text}'")]
    LexerNoViableAlt {
        start_index: usize,
        text: String,
        line: usize,
        column: usize,
    },
    /// The recogniser's cancellation flag was set.
    #[error("recognition cancelled")]
    Cancelled,
    /// The parser's rule frames left it with no ATN state to continue from.
    #[error("parser has no current ATN state")]
    LostState,
}

impl RecognitionError {
    /// The token at which the error was detected (lexer errors and cancellation have none).
    pub fn offending_token(&self) -> Option<&Token> {
        match self {
            RecognitionError::NoViableAlt { offending, .. }
            | RecognitionError::InputMismatch { offending, .. }
            | RecognitionError::FailedPredicate { offending, .. } => Some(offending),
            RecognitionError::LexerNoViableAlt { .. }
            | RecognitionError::Cancelled
            | RecognitionError::LostState => None,
        }
    }

    /// The ATN state the recogniser was in when the error was detected.
    pub fn offending_state(&self) -> Option<StIdx> {
        match self {
            RecognitionError::NoViableAlt { state, .. }
            | RecognitionError::InputMismatch { state, .. }
            | RecognitionError::FailedPredicate { state, .. } => *state,
            RecognitionError::LexerNoViableAlt { .. }
            | RecognitionError::Cancelled
            | RecognitionError::LostState => None,
        }
    }
}

/// A parse which stopped before reaching the end of its start rule: either because it was
/// cancelled, or because its error strategy gives up at the first error.
#[derive(Debug, Error)]
#[error("parse failed: {error}")]
pub struct ParseFailure {
    pub error: RecognitionError,
}

impl ParseFailure {
    pub fn new(error: RecognitionError) -> Self {
        ParseFailure { error }
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self.error, RecognitionError::Cancelled)
    }
}

impl From<RecognitionError> for ParseFailure {
    fn from(error: RecognitionError) -> Self {
        ParseFailure { error }
    }
}
