#![allow(clippy::new_without_default)]
#![allow(clippy::upper_case_acronyms)]
#![forbid(unsafe_code)]

//! A library for augmented transition networks (ATNs): the compiled form of an LL grammar that
//! adaptive LL(*) lexers and parsers execute.
//!
//! An ATN is a graph of states, one subgraph per rule. Transitions either consume a single
//! symbol (an atom, range, set, or wildcard) or are epsilon-like (plain epsilon, rule calls,
//! predicates, and actions). Every state belongs to a rule and every rule has exactly one start
//! and one stop state; returning from a rule follows the stop state's epsilon transitions back to
//! the states following each call of the rule.
//!
//! This library makes the following guarantees about ATNs:
//!
//!   * States are numbered from `0` to `states_len() - 1` (inclusive).
//!   * Rules are numbered from `0` to `rules_len() - 1` (inclusive).
//!   * Decisions are numbered from `0` to `decisions_len() - 1` (inclusive).
//!   * Once constructed (by [Atn::deserialize] or [AtnBuilder::build]) an ATN is never mutated,
//!     and can be shared freely between threads.
//!
//! Symbols are `i32`s: token types for parsers, Unicode code points for lexers. [TOKEN_EOF]
//! marks the end of the input in both cases.

mod atn;
pub mod builder;
pub mod deserialize;
mod grammar;
mod idxnewtype;
pub mod interp;
pub mod interval;
mod ll1;
pub mod lexer_action;
pub mod serialize;
pub mod span;
pub mod state;
pub mod transition;
mod vocabulary;

pub use crate::{
    atn::{Atn, AtnError, GrammarType},
    builder::{AtnBuilder, BuildError, Elem},
    deserialize::DeserializeError,
    grammar::GrammarInfo,
    idxnewtype::{DIdx, RIdx, StIdx},
    interp::InterpError,
    interval::{Interval, IntervalSet},
    ll1::LookContext,
    lexer_action::LexerAction,
    span::Span,
    state::{AtnState, StateKind},
    transition::Transition,
    vocabulary::Vocabulary,
};

/// The token type of the end of input.
pub const TOKEN_EOF: i32 = -1;
/// A pseudo-symbol in lookahead sets meaning "the end of the rule was reached".
pub const EPSILON: i32 = -2;
pub const INVALID_TOKEN_TYPE: i32 = 0;
pub const MIN_USER_TOKEN_TYPE: i32 = 1;
pub const DEFAULT_CHANNEL: usize = 0;
pub const HIDDEN_CHANNEL: usize = 1;
pub const MIN_CHAR: i32 = 0;
pub const MAX_CHAR: i32 = 0x10FFFF;
