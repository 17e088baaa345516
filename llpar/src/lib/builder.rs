use std::sync::Arc;

use atngrammar::{GrammarInfo, GrammarType, RIdx};
use llpredict::{ParserAtnSimulator, PredictionMode};
use thiserror::Error;

use crate::{
    error::ParseFailure,
    interpreter::ParserInterpreter,
    lex_api::TokenSource,
    parser::ParserCore,
    strategy::{BailErrorStrategy, DefaultErrorStrategy},
    token_stream::{CommonTokenStream, TokenStream},
    tree::ParseTree,
};

#[derive(Debug, Error, Eq, PartialEq)]
pub enum ParserDefError {
    #[error("grammar '{0}' is not a parser grammar")]
    NotAParser(String),
}

/// How a parser recovers from syntax errors.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum RecoveryKind {
    /// Single token insertion and deletion, then resynchronisation on the follow sets of the
    /// rules being recognised ([DefaultErrorStrategy]).
    #[default]
    Default,
    /// Stop at the first error ([BailErrorStrategy]).
    Bail,
}

/// A parser definition: a parser grammar plus the options parsers are created with. Options are
/// set by chaining, in the style of:
///
/// ```text
///   let def = ParserDef::new(grammar)?
///       .recoverer(RecoveryKind::Bail)
///       .prediction_mode(PredictionMode::Sll);
///   let tree = def.parse(lexer, rule)?;
/// ```
///
/// Every parser created from a `ParserDef` (and from its clones) shares the same DFA caches, so
/// that work done predicting for one parse speeds up the next. Parsers may run on different
/// threads at the same time.
#[derive(Clone)]
pub struct ParserDef {
    grammar: Arc<GrammarInfo>,
    sim: ParserAtnSimulator,
    recoverer: RecoveryKind,
    build_parse_trees: bool,
}

impl ParserDef {
    pub fn new(grammar: GrammarInfo) -> Result<Self, ParserDefError> {
        if grammar.atn().grammar_type() != GrammarType::Parser {
            return Err(ParserDefError::NotAParser(grammar.name().to_owned()));
        }
        let sim = ParserAtnSimulator::new(Arc::clone(grammar.atn()));
        Ok(ParserDef {
            grammar: Arc::new(grammar),
            sim,
            recoverer: RecoveryKind::default(),
            build_parse_trees: true,
        })
    }

    /// Set the recoverer for parsers created from this definition to `rk`.
    pub fn recoverer(mut self, rk: RecoveryKind) -> Self {
        self.recoverer = rk;
        self
    }

    /// Set the prediction mode for parsers created from this definition. The DFA caches are
    /// unaffected.
    pub fn prediction_mode(mut self, mode: PredictionMode) -> Self {
        self.sim.set_prediction_mode(mode);
        self
    }

    /// Whether parsers build parse trees (the default) or only recognise their input.
    pub fn build_parse_trees(mut self, build: bool) -> Self {
        self.build_parse_trees = build;
        self
    }

    pub fn grammar(&self) -> &GrammarInfo {
        &self.grammar
    }

    pub fn rule_idx(&self, name: &str) -> Option<RIdx> {
        self.grammar.rule_idx(name)
    }

    pub fn simulator(&self) -> &ParserAtnSimulator {
        &self.sim
    }

    /// Throw away the DFA caches. Results of subsequent parses are unchanged.
    pub fn clear_dfa(&self) {
        self.sim.clear_dfa()
    }

    /// Create a parser reading from `input`.
    pub fn interpreter<'a>(&self, input: Box<dyn TokenStream + 'a>) -> ParserInterpreter<'a> {
        let mut core = ParserCore::new(Arc::clone(&self.grammar), self.sim.clone(), input);
        core.set_build_parse_trees(self.build_parse_trees);
        match self.recoverer {
            RecoveryKind::Default => core.set_error_strategy(Box::new(DefaultErrorStrategy::new())),
            RecoveryKind::Bail => core.set_error_strategy(Box::new(BailErrorStrategy::new())),
        }
        ParserInterpreter::new(core)
    }

    /// Create a parser reading the default channel of the tokens from `source`.
    pub fn parser<'a, S: TokenSource + 'a>(&self, source: S) -> ParserInterpreter<'a> {
        self.interpreter(Box::new(CommonTokenStream::new(source)))
    }

    /// Parse the tokens from `source` as `rule`, reporting syntax errors to stderr.
    pub fn parse<S: TokenSource>(&self, source: S, rule: RIdx) -> Result<ParseTree, ParseFailure> {
        self.parser(source).parse(rule)
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use atngrammar::AtnBuilder;

    #[test]
    fn test_rejects_lexer() {
        let g = AtnBuilder::lexer("L")
            .token("A", atngrammar::Elem::lit("a"))
            .build()
            .unwrap();
        assert_eq!(
            ParserDef::new(g).err(),
            Some(ParserDefError::NotAParser("L".to_owned()))
        );
    }
}
