#![allow(clippy::new_without_default)]
#![allow(clippy::len_without_is_empty)]
#![forbid(unsafe_code)]

//! Adaptive LL(*) prediction over ATNs built by [atngrammar].
//!
//! Given a decision in a parser ATN and a stream of tokens, [ParserAtnSimulator] works out which
//! alternative of the decision matches the input, simulating all alternatives in parallel as
//! sets of configurations ([AtnConfigSet]) and looking ahead as far as necessary. The results of
//! simulation are memoized in a per-decision [Dfa], so that in the common case prediction is a
//! handful of table lookups.
//!
//! The building blocks (prediction contexts, semantic contexts, configuration sets and DFAs) are
//! also used by lexers to simulate lexer ATNs.

mod altset;
mod cancel;
mod config;
mod configset;
pub mod context;
pub mod dfa;
mod lexer_executor;
mod parser_sim;
pub mod prediction_mode;
mod semantic;
mod stream;

pub use crate::{
    altset::AltSet,
    cancel::CancellationFlag,
    config::AtnConfig,
    configset::AtnConfigSet,
    context::{MergeCache, PredictionContext, PredictionContextCache, EMPTY_RETURN_STATE},
    dfa::{Dfa, DfaStIdx, DfaState, PredPrediction, Target},
    lexer_executor::{LexerActionExecutor, PositionedAction},
    parser_sim::{NoViableAlt, ParserAtnSimulator, ParserHost},
    prediction_mode::PredictionMode,
    semantic::{PredicateEval, SemanticContext},
    stream::IntStream,
};
