//! The parser engine: the state a parser carries while it runs (its position in the ATN, the
//! stack of rules being recognised, the parse tree built so far) and the operations that
//! recognisers, whether hand-written or the [crate::ParserInterpreter], are built from.

use std::sync::Arc;

use atngrammar::{Atn, DIdx, GrammarInfo, IntervalSet, RIdx, StIdx, Vocabulary, TOKEN_EOF};
use llpredict::{
    AltSet, AtnConfigSet, CancellationFlag, NoViableAlt, ParserAtnSimulator, ParserHost,
    PredicateEval,
};
use tracing::{debug, trace};

use crate::{
    error::RecognitionError,
    listener::{ConsoleErrorListener, DecisionInfo, ErrorListener},
    strategy::{DefaultErrorStrategy, ErrorStrategy},
    token::Token,
    token_stream::TokenStream,
    tree::{ParseTree, ParseTreeListener, RuleNode},
};

/// The semantic predicates and actions embedded in a grammar. Predicates which aren't overridden
/// are true; actions which aren't overridden do nothing.
pub trait ParserActions {
    /// Evaluate predicate `pred` of `rule`.
    fn sempred(&mut self, _rule: RIdx, _pred: usize) -> bool {
        true
    }

    /// Execute action `action` of `rule`.
    fn action(&mut self, _rule: RIdx, _action: usize) {}
}

/// A grammar without predicates or actions.
#[derive(Clone, Copy, Debug, Default)]
pub struct NoActions;

impl ParserActions for NoActions {}

enum PredictionReport {
    Ambiguity {
        decision: DIdx,
        start: usize,
        stop: usize,
        exact: bool,
        alts: AltSet,
    },
    FullContext {
        decision: DIdx,
        start: usize,
        stop: usize,
        alts: AltSet,
    },
    ContextSensitivity {
        decision: DIdx,
        start: usize,
        stop: usize,
        prediction: u32,
    },
}

/// What the prediction engine sees of a parser while predicting. Reports are buffered since the
/// token stream is busy until prediction finishes.
struct PredictionHost<'h, A: ?Sized> {
    actions: &'h mut A,
    precedence: i32,
    invoking: Vec<StIdx>,
    reports: Vec<PredictionReport>,
}

impl<A: ParserActions + ?Sized> PredicateEval for PredictionHost<'_, A> {
    fn sempred(&mut self, rule: RIdx, pred: usize, _ctx_dependent: bool) -> bool {
        self.actions.sempred(rule, pred)
    }

    fn precpred(&mut self, precedence: i32) -> bool {
        precedence >= self.precedence
    }
}

impl<A: ParserActions + ?Sized> ParserHost for PredictionHost<'_, A> {
    fn precedence(&self) -> i32 {
        self.precedence
    }

    fn invoking_states(&self) -> Vec<StIdx> {
        self.invoking.clone()
    }

    fn report_attempting_full_context(
        &mut self,
        decision: DIdx,
        conflicting_alts: Option<&AltSet>,
        configs: &AtnConfigSet,
        start_index: usize,
        stop_index: usize,
    ) {
        self.reports.push(PredictionReport::FullContext {
            decision,
            start: start_index,
            stop: stop_index,
            alts: conflicting_alts.cloned().unwrap_or_else(|| configs.alts()),
        });
    }

    fn report_context_sensitivity(
        &mut self,
        decision: DIdx,
        prediction: u32,
        _configs: &AtnConfigSet,
        start_index: usize,
        stop_index: usize,
    ) {
        self.reports.push(PredictionReport::ContextSensitivity {
            decision,
            start: start_index,
            stop: stop_index,
            prediction,
        });
    }

    fn report_ambiguity(
        &mut self,
        decision: DIdx,
        start_index: usize,
        stop_index: usize,
        exact: bool,
        ambig_alts: &AltSet,
        _configs: &AtnConfigSet,
    ) {
        self.reports.push(PredictionReport::Ambiguity {
            decision,
            start: start_index,
            stop: stop_index,
            exact,
            alts: ambig_alts.clone(),
        });
    }
}

/// The state of one parse.
///
/// The rules being recognised are kept as a stack of [RuleNode]s, innermost last. When a rule
/// is exited its node is added to its caller's children (if parse trees are being built); the
/// node of the outermost rule is handed back to whoever exits it.
pub struct ParserCore<'a> {
    grammar: Arc<GrammarInfo>,
    sim: ParserAtnSimulator,
    input: Box<dyn TokenStream + 'a>,
    frames: Vec<RuleNode>,
    precedence_stack: Vec<i32>,
    state: Option<StIdx>,
    strategy: Option<Box<dyn ErrorStrategy + 'a>>,
    error_listeners: Vec<Box<dyn ErrorListener + 'a>>,
    parse_listeners: Vec<Box<dyn ParseTreeListener + 'a>>,
    build_parse_trees: bool,
    matched_eof: bool,
    error_recovery_mode: bool,
    syntax_errors: usize,
    cancel: CancellationFlag,
}

impl<'a> ParserCore<'a> {
    /// Create a parser for `grammar` reading from `input`. `sim` must have been created for
    /// `grammar`'s ATN; its DFA caches are shared with every other clone of it.
    ///
    /// The parser starts with a [DefaultErrorStrategy] and a [ConsoleErrorListener].
    pub fn new(grammar: Arc<GrammarInfo>, sim: ParserAtnSimulator, input: Box<dyn TokenStream + 'a>) -> Self {
        ParserCore {
            grammar,
            sim,
            input,
            frames: Vec::new(),
            precedence_stack: vec![0],
            state: None,
            strategy: Some(Box::new(DefaultErrorStrategy::new())),
            error_listeners: vec![Box::new(ConsoleErrorListener)],
            parse_listeners: Vec::new(),
            build_parse_trees: true,
            matched_eof: false,
            error_recovery_mode: false,
            syntax_errors: 0,
            cancel: CancellationFlag::new(),
        }
    }

    pub fn grammar(&self) -> &GrammarInfo {
        &self.grammar
    }

    pub fn atn(&self) -> &Arc<Atn> {
        self.sim.atn()
    }

    pub fn vocabulary(&self) -> &Vocabulary {
        self.grammar.vocabulary()
    }

    pub fn rule_names(&self) -> &[String] {
        self.grammar.rule_names()
    }

    pub fn simulator(&self) -> &ParserAtnSimulator {
        &self.sim
    }

    pub fn input(&mut self) -> &mut (dyn TokenStream + 'a) {
        self.input.as_mut()
    }

    pub fn set_error_strategy(&mut self, strategy: Box<dyn ErrorStrategy + 'a>) {
        self.strategy = Some(strategy);
    }

    pub fn add_error_listener(&mut self, l: Box<dyn ErrorListener + 'a>) {
        self.error_listeners.push(l);
    }

    pub fn remove_error_listeners(&mut self) {
        self.error_listeners.clear();
    }

    /// Add a listener which is told about rules being entered and exited, and tokens being
    /// matched, as the parse proceeds.
    pub fn add_parse_listener(&mut self, l: Box<dyn ParseTreeListener + 'a>) {
        self.parse_listeners.push(l);
    }

    pub fn remove_parse_listeners(&mut self) {
        self.parse_listeners.clear();
    }

    pub fn set_build_parse_trees(&mut self, build: bool) {
        self.build_parse_trees = build;
    }

    pub fn build_parse_trees(&self) -> bool {
        self.build_parse_trees
    }

    /// Use `flag` to cancel this parse from another thread.
    pub fn set_cancellation_flag(&mut self, flag: CancellationFlag) {
        self.cancel = flag;
    }

    pub fn cancellation_flag(&self) -> &CancellationFlag {
        &self.cancel
    }

    pub fn number_of_syntax_errors(&self) -> usize {
        self.syntax_errors
    }

    /// The ATN state the parser is in.
    pub fn state(&self) -> Option<StIdx> {
        self.state
    }

    pub fn set_state(&mut self, s: StIdx) {
        self.state = Some(s);
    }

    /// The precedence of the innermost left-recursive rule being recognised.
    pub fn precedence(&self) -> i32 {
        self.precedence_stack.last().copied().unwrap_or(0)
    }

    pub fn in_error_recovery_mode(&self) -> bool {
        self.error_recovery_mode
    }

    pub fn set_error_recovery_mode(&mut self, recovering: bool) {
        self.error_recovery_mode = recovering;
    }

    /// The innermost rule being recognised.
    pub fn context(&self) -> Option<&RuleNode> {
        self.frames.last()
    }

    /// The number of rules being recognised.
    pub fn depth(&self) -> usize {
        self.frames.len()
    }

    /// Rewind the input and forget everything about the parse so far.
    pub fn reset(&mut self) {
        self.input.seek(0);
        self.with_strategy(|s, p| s.reset(p));
        self.frames.clear();
        self.precedence_stack = vec![0];
        self.state = None;
        self.matched_eof = false;
        self.error_recovery_mode = false;
        self.syntax_errors = 0;
    }

    pub fn la(&mut self, i: isize) -> i32 {
        self.input.la(i)
    }

    pub fn lt(&mut self, k: isize) -> Option<Token> {
        self.input.lt(k).cloned()
    }

    pub fn input_index(&self) -> usize {
        self.input.index()
    }

    /// The token the parser is looking at.
    pub fn current_token(&mut self) -> Token {
        self.lt(1).unwrap_or_else(|| Token::eof(0, 1, 0))
    }

    /// The text of the tokens from `start` to `stop` inclusive.
    pub fn text_between(&mut self, start: &Token, stop: &Token) -> String {
        match (start.token_index(), stop.token_index()) {
            (Some(a), Some(b)) => self.input.text_range(a, b),
            _ => String::new(),
        }
    }

    pub fn check_cancelled(&self) -> Result<(), RecognitionError> {
        if self.cancel.is_cancelled() {
            debug!("parse cancelled");
            return Err(RecognitionError::Cancelled);
        }
        Ok(())
    }

    /// Start recognising `rule`, whose start state is `state`.
    pub fn enter_rule(&mut self, rule: RIdx, state: StIdx) -> Result<(), RecognitionError> {
        self.check_cancelled()?;
        let invoking = self.invoking_state_for_new_frame();
        self.state = Some(state);
        let start = self.lt(1);
        trace!(rule = rule.0, "enter rule");
        self.frames.push(RuleNode::new(rule, invoking, start));
        self.fire_enter_rule();
        Ok(())
    }

    /// Finish recognising the innermost rule, returning to the state which invoked it. Returns
    /// the rule's node if it was the outermost rule.
    pub fn exit_rule(&mut self) -> Option<RuleNode> {
        let stop = if self.matched_eof { self.lt(1) } else { self.lt(-1) };
        let mut node = self.frames.pop()?;
        node.set_stop(stop);
        trace!(rule = node.rule().0, "exit rule");
        for l in self.parse_listeners.iter_mut() {
            l.exit_every_rule(&node);
        }
        self.state = node.invoking_state();
        self.attach(node)
    }

    /// Record which outer alternative of the innermost rule is being recognised.
    pub fn enter_outer_alt(&mut self, alt: u32) {
        if let Some(f) = self.frames.last_mut() {
            f.set_alt(alt);
        }
    }

    /// Start recognising the left-recursive `rule` with precedence `precedence`.
    pub fn enter_recursion_rule(
        &mut self,
        rule: RIdx,
        state: StIdx,
        precedence: i32,
    ) -> Result<(), RecognitionError> {
        self.check_cancelled()?;
        let invoking = self.invoking_state_for_new_frame();
        self.state = Some(state);
        self.precedence_stack.push(precedence);
        let start = self.lt(1);
        trace!(rule = rule.0, precedence, "enter recursion rule");
        self.frames.push(RuleNode::new(rule, invoking, start));
        self.fire_enter_rule();
        Ok(())
    }

    /// In a left-recursive rule, make what has been recognised so far the first child of a new
    /// node for the same rule, as happens on each iteration of the rule's suffix loop.
    pub fn push_new_recursion_context(&mut self, rule: RIdx, state: StIdx) {
        let stop = self.lt(-1);
        let Some(mut previous) = self.frames.pop() else {
            return;
        };
        let invoking = previous.invoking_state();
        previous.set_invoking_state(Some(state));
        previous.set_stop(stop);
        for l in self.parse_listeners.iter_mut() {
            l.exit_every_rule(&previous);
        }
        let mut node = RuleNode::new(rule, invoking, previous.start().cloned());
        if self.build_parse_trees {
            node.add_child(ParseTree::Rule(previous));
        }
        self.frames.push(node);
        self.fire_enter_rule();
    }

    /// Finish recognising a left-recursive rule. Returns the rule's node if it was the outermost
    /// rule.
    pub fn unroll_recursion_contexts(&mut self) -> Option<RuleNode> {
        self.precedence_stack.pop();
        let stop = self.lt(-1);
        let mut node = self.frames.pop()?;
        node.set_stop(stop);
        for l in self.parse_listeners.iter_mut() {
            l.exit_every_rule(&node);
        }
        self.state = node.invoking_state();
        self.attach(node)
    }

    /// Is `precedence` at least that of the innermost left-recursive rule invocation?
    pub fn precpred(&self, precedence: i32) -> bool {
        precedence >= self.precedence()
    }

    /// Match the current token against `ttype`, consuming it if it matches and asking the error
    /// strategy to recover if not.
    pub fn match_token(&mut self, ttype: i32) -> Result<Token, RecognitionError> {
        let t = self.current_token();
        if t.ttype() == ttype {
            if ttype == TOKEN_EOF {
                self.matched_eof = true;
            }
            self.with_strategy(|s, p| s.report_match(p));
            self.consume();
            Ok(t)
        } else {
            self.recover_inline_and_record()
        }
    }

    /// Match any token other than end of file.
    pub fn match_wildcard(&mut self) -> Result<Token, RecognitionError> {
        let t = self.current_token();
        if t.ttype() > 0 {
            self.with_strategy(|s, p| s.report_match(p));
            self.consume();
            Ok(t)
        } else {
            self.recover_inline_and_record()
        }
    }

    fn recover_inline_and_record(&mut self) -> Result<Token, RecognitionError> {
        let t = self.recover_inline()?;
        if self.build_parse_trees && t.token_index().is_none() {
            self.add_error_node(t.clone());
        }
        Ok(t)
    }

    /// Consume the current token, adding it to the parse tree: as an error node if the parser is
    /// recovering from an error, as a terminal otherwise. The end of file token is never
    /// consumed from the input, but is still added to the tree.
    pub fn consume(&mut self) -> Token {
        let o = self.current_token();
        if !o.is_eof() {
            self.input.consume();
        }
        if self.build_parse_trees || !self.parse_listeners.is_empty() {
            let node = if self.error_recovery_mode {
                for l in self.parse_listeners.iter_mut() {
                    l.visit_error_node(&o);
                }
                ParseTree::Error(o.clone())
            } else {
                for l in self.parse_listeners.iter_mut() {
                    l.visit_terminal(&o);
                }
                ParseTree::Terminal(o.clone())
            };
            if self.build_parse_trees {
                if let Some(f) = self.frames.last_mut() {
                    f.add_child(node);
                }
            }
        }
        o
    }

    /// Add `t` to the innermost rule's node as an error node.
    pub fn add_error_node(&mut self, t: Token) {
        if let Some(f) = self.frames.last_mut() {
            f.add_child(ParseTree::Error(t));
        }
    }

    /// Record `e` as the reason the innermost rule failed.
    pub fn set_exception(&mut self, e: RecognitionError) {
        if let Some(f) = self.frames.last_mut() {
            f.set_exception(e);
        }
    }

    /// The tokens which could follow the parser's current state, taking the rule invocation
    /// stack into account.
    pub fn expected_tokens(&self) -> IntervalSet {
        match self.state {
            Some(s) => self.atn().expected_tokens(s, &self.invoking_states()),
            None => IntervalSet::new(),
        }
    }

    pub fn is_expected_token(&self, symbol: i32) -> bool {
        self.expected_tokens().contains(symbol)
    }

    /// Tell the error listeners about a syntax error at `offending`.
    pub fn notify_error_listeners(
        &mut self,
        offending: &Token,
        msg: &str,
        error: Option<&RecognitionError>,
    ) {
        self.syntax_errors += 1;
        debug!(line = offending.line(), column = offending.column(), msg, "syntax error");
        for l in self.error_listeners.iter_mut() {
            l.syntax_error(Some(offending), offending.line(), offending.column(), msg, error);
        }
    }

    /// The names of the rules being recognised, innermost first.
    pub fn rule_invocation_stack(&self) -> Vec<String> {
        self.frames
            .iter()
            .rev()
            .map(|f| self.grammar.rule_name(f.rule()).to_owned())
            .collect()
    }

    /// The states which invoked the rules being recognised, innermost first.
    pub fn invoking_states(&self) -> Vec<StIdx> {
        self.frames
            .iter()
            .rev()
            .filter_map(|f| f.invoking_state())
            .collect()
    }

    /// Predict the alternative of `decision` to take, evaluating predicates with `actions`.
    pub fn adaptive_predict<A: ParserActions + ?Sized>(
        &mut self,
        decision: DIdx,
        actions: &mut A,
    ) -> Result<u32, RecognitionError> {
        self.check_cancelled()?;
        let mut host = PredictionHost {
            actions,
            precedence: self.precedence(),
            invoking: self.invoking_states(),
            reports: Vec::new(),
        };
        let r = self.sim.adaptive_predict(self.input.as_mut(), decision, &mut host);
        let reports = host.reports;
        if !self.error_listeners.is_empty() {
            for rep in reports {
                self.dispatch_report(rep);
            }
        }
        r.map_err(|e| self.no_viable_alt(e))
    }

    /// An [RecognitionError::InputMismatch] at the current token.
    pub fn input_mismatch(&mut self) -> RecognitionError {
        RecognitionError::InputMismatch {
            offending: self.current_token(),
            expected: self.expected_tokens(),
            state: self.state,
        }
    }

    /// A [RecognitionError::FailedPredicate] for the predicate described by `predicate` in the
    /// innermost rule.
    pub fn failed_predicate(&mut self, predicate: String) -> RecognitionError {
        let rule = self
            .state
            .and_then(|s| self.atn().state(s).rule())
            .or_else(|| self.frames.last().map(|f| f.rule()))
            .unwrap_or(RIdx(0));
        RecognitionError::FailedPredicate {
            offending: self.current_token(),
            rule,
            rule_name: self.grammar.rule_name(rule).to_owned(),
            predicate,
            state: self.state,
        }
    }

    pub fn sync(&mut self) -> Result<(), RecognitionError> {
        self.with_strategy(|s, p| s.sync(p))
    }

    pub fn recover_inline(&mut self) -> Result<Token, RecognitionError> {
        self.with_strategy(|s, p| s.recover_inline(p))
    }

    pub fn recover(&mut self, e: &RecognitionError) -> Result<(), RecognitionError> {
        self.with_strategy(|s, p| s.recover(p, e))
    }

    pub fn report_error(&mut self, e: &RecognitionError) {
        self.with_strategy(|s, p| s.report_error(p, e))
    }

    fn with_strategy<R>(&mut self, f: impl FnOnce(&mut (dyn ErrorStrategy + 'a), &mut Self) -> R) -> R {
        let mut s = self
            .strategy
            .take()
            .unwrap_or_else(|| Box::new(DefaultErrorStrategy::new()));
        let r = f(s.as_mut(), self);
        self.strategy = Some(s);
        r
    }

    fn invoking_state_for_new_frame(&self) -> Option<StIdx> {
        if self.frames.is_empty() {
            None
        } else {
            self.state
        }
    }

    fn attach(&mut self, node: RuleNode) -> Option<RuleNode> {
        match self.frames.last_mut() {
            Some(parent) => {
                if self.build_parse_trees {
                    parent.add_child(ParseTree::Rule(node));
                }
                None
            }
            None => Some(node),
        }
    }

    fn fire_enter_rule(&mut self) {
        if let Some(node) = self.frames.last() {
            for l in self.parse_listeners.iter_mut() {
                l.enter_every_rule(node);
            }
        }
    }

    fn no_viable_alt(&mut self, e: NoViableAlt) -> RecognitionError {
        let current = self.current_token();
        let start = self.input.get(e.start_index).cloned().unwrap_or_else(|| current.clone());
        let offending = self.input.get(e.offending_index).cloned().unwrap_or(current);
        RecognitionError::NoViableAlt {
            start,
            offending,
            state: self.state,
        }
    }

    fn dispatch_report(&mut self, rep: PredictionReport) {
        let (decision, start, stop) = match &rep {
            PredictionReport::Ambiguity {
                decision,
                start,
                stop,
                ..
            }
            | PredictionReport::FullContext {
                decision,
                start,
                stop,
                ..
            }
            | PredictionReport::ContextSensitivity {
                decision,
                start,
                stop,
                ..
            } => (*decision, *start, *stop),
        };
        let atn = Arc::clone(self.atn());
        let rule_name = atn
            .state(atn.decision_state(decision))
            .rule()
            .map(|r| self.grammar.rule_name(r).to_owned())
            .unwrap_or_default();
        let info = DecisionInfo {
            decision,
            rule_name,
            start_index: start,
            stop_index: stop,
            input: self.input.text_range(start, stop),
        };
        for l in self.error_listeners.iter_mut() {
            match &rep {
                PredictionReport::Ambiguity { exact, alts, .. } => {
                    l.report_ambiguity(&info, *exact, alts)
                }
                PredictionReport::FullContext { alts, .. } => {
                    l.report_attempting_full_context(&info, alts)
                }
                PredictionReport::ContextSensitivity { prediction, .. } => {
                    l.report_context_sensitivity(&info, *prediction)
                }
            }
        }
    }
}
