use std::{
    fmt,
    hash::{Hash, Hasher},
    sync::Arc,
};

use atngrammar::StIdx;

use crate::{
    context::PredictionContext, lexer_executor::LexerActionExecutor, semantic::SemanticContext,
};

/// One live interpretation during prediction: "in `state`, predicting `alt`, with the rule
/// invocation stack `context`, provided `semantic` holds".
#[derive(Clone, Debug)]
pub struct AtnConfig {
    pub state: StIdx,
    /// The (1-based) alternative predicted, or for lexers the token rule's alternative.
    pub alt: u32,
    pub context: PredictionContext,
    pub semantic: SemanticContext,
    /// How many rule stop states this config has returned through beyond the decision's own
    /// rule. Non-zero values mean the config "dipped into the outer context".
    pub reaches_into_outer_context: u32,
    pub precedence_filter_suppressed: bool,
    /// Lexers only: the actions executed along the path to this config.
    pub lexer_actions: Option<Arc<LexerActionExecutor>>,
    /// Lexers only: has the path to this config passed through a non-greedy decision?
    pub passed_through_non_greedy: bool,
}

impl AtnConfig {
    pub fn new(state: StIdx, alt: u32, context: PredictionContext) -> Self {
        AtnConfig {
            state,
            alt,
            context,
            semantic: SemanticContext::None,
            reaches_into_outer_context: 0,
            precedence_filter_suppressed: false,
            lexer_actions: None,
            passed_through_non_greedy: false,
        }
    }

    /// This config moved to `state`, everything else unchanged.
    pub fn with_state(&self, state: StIdx) -> Self {
        AtnConfig {
            state,
            ..self.clone()
        }
    }

    pub fn with_state_context(&self, state: StIdx, context: PredictionContext) -> Self {
        AtnConfig {
            state,
            context,
            ..self.clone()
        }
    }

    pub fn with_semantic(&self, state: StIdx, semantic: SemanticContext) -> Self {
        AtnConfig {
            state,
            semantic,
            ..self.clone()
        }
    }

    pub fn outer_context_depth(&self) -> u32 {
        self.reaches_into_outer_context
    }
}

impl PartialEq for AtnConfig {
    fn eq(&self, other: &Self) -> bool {
        self.state == other.state
            && self.alt == other.alt
            && self.context == other.context
            && self.semantic == other.semantic
            && self.precedence_filter_suppressed == other.precedence_filter_suppressed
            && self.passed_through_non_greedy == other.passed_through_non_greedy
            && self.lexer_actions == other.lexer_actions
    }
}

impl Eq for AtnConfig {}

impl Hash for AtnConfig {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.state.hash(state);
        self.alt.hash(state);
        self.context.hash(state);
        self.semantic.hash(state);
    }
}

impl fmt::Display for AtnConfig {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "({},{},[{}]", self.state, self.alt, self.context)?;
        if !self.semantic.is_none() {
            write!(f, ",{}", self.semantic)?;
        }
        if self.reaches_into_outer_context > 0 {
            write!(f, ",up={}", self.reaches_into_outer_context)?;
        }
        write!(f, ")")
    }
}
