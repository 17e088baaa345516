use std::fmt;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use crate::RIdx;

/// The serialized type code of each kind of lexer action.
pub mod codes {
    pub const CHANNEL: u16 = 0;
    pub const CUSTOM: u16 = 1;
    pub const MODE: u16 = 2;
    pub const MORE: u16 = 3;
    pub const POP_MODE: u16 = 4;
    pub const PUSH_MODE: u16 = 5;
    pub const SKIP: u16 = 6;
    pub const TYPE: u16 = 7;
}

/// A command executed by a lexer after a token has been matched (e.g. `-> skip` or
/// `-> pushMode(STRING)`), or a user action embedded in a lexer rule.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum LexerAction {
    Channel(usize),
    /// A user action, dispatched to the lexer's callbacks with the rule and action index.
    Custom { rule: RIdx, action: usize },
    Mode(usize),
    More,
    PopMode,
    PushMode(usize),
    Skip,
    Type(i32),
}

impl LexerAction {
    pub fn code(&self) -> u16 {
        match self {
            LexerAction::Channel(_) => codes::CHANNEL,
            LexerAction::Custom { .. } => codes::CUSTOM,
            LexerAction::Mode(_) => codes::MODE,
            LexerAction::More => codes::MORE,
            LexerAction::PopMode => codes::POP_MODE,
            LexerAction::PushMode(_) => codes::PUSH_MODE,
            LexerAction::Skip => codes::SKIP,
            LexerAction::Type(_) => codes::TYPE,
        }
    }

    /// Position dependent actions observe the input position, so must be executed at the point
    /// in the input where they were encountered rather than at the end of the token.
    pub fn is_position_dependent(&self) -> bool {
        matches!(self, LexerAction::Custom { .. })
    }

    /// The two data words this action is serialized with. `0xFFFF` stands for "no value".
    pub(crate) fn data(&self) -> (u16, u16) {
        match *self {
            LexerAction::Channel(c) => (c as u16, 0),
            LexerAction::Custom { rule, action } => (rule.0 as u16, action as u16),
            LexerAction::Mode(m) | LexerAction::PushMode(m) => (m as u16, 0),
            LexerAction::Type(t) => (t as u16, 0),
            LexerAction::More | LexerAction::PopMode | LexerAction::Skip => (0, 0),
        }
    }

    pub(crate) fn from_code(code: u16, data1: i32, data2: i32) -> Option<Self> {
        let idx = |d: i32| usize::try_from(d).ok();
        Some(match code {
            codes::CHANNEL => LexerAction::Channel(idx(data1)?),
            codes::CUSTOM => LexerAction::Custom {
                rule: RIdx(u32::try_from(data1).ok()?),
                action: idx(data2)?,
            },
            codes::MODE => LexerAction::Mode(idx(data1)?),
            codes::MORE => LexerAction::More,
            codes::POP_MODE => LexerAction::PopMode,
            codes::PUSH_MODE => LexerAction::PushMode(idx(data1)?),
            codes::SKIP => LexerAction::Skip,
            codes::TYPE => LexerAction::Type(data1),
            _ => return None,
        })
    }
}

impl fmt::Display for LexerAction {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            LexerAction::Channel(c) => write!(f, "channel({})", c),
            LexerAction::Custom { rule, action } => write!(f, "custom({}, {})", rule, action),
            LexerAction::Mode(m) => write!(f, "mode({})", m),
            LexerAction::More => write!(f, "more"),
            LexerAction::PopMode => write!(f, "popMode"),
            LexerAction::PushMode(m) => write!(f, "pushMode({})", m),
            LexerAction::Skip => write!(f, "skip"),
            LexerAction::Type(t) => write!(f, "type({})", t),
        }
    }
}
