//! Adaptive LL(*) prediction for parsers.
//!
//! Each decision is first predicted with SLL: configurations start with an empty context which,
//! on reaching the end of the decision's rule, follows every possible return. That is usually
//! enough to pick an alternative, and SLL results can be cached in the decision's DFA since they
//! don't depend on how the rule was invoked. If SLL finds a conflict which predicates can't
//! resolve, prediction is retried with the full invocation stack of the rule (LL). Full-context
//! results are not cached.

use std::sync::Arc;

use atngrammar::{Atn, DIdx, StIdx, Transition, TOKEN_EOF};
use fnv::{FnvHashMap, FnvHashSet};
use thiserror::Error;
use tracing::{debug, trace};

use crate::{
    altset::AltSet,
    config::AtnConfig,
    configset::AtnConfigSet,
    context::{MergeCache, PredictionContext, PredictionContextCache, EMPTY_RETURN_STATE},
    dfa::{Dfa, DfaStIdx, DfaState, PredPrediction, Target},
    prediction_mode::{
        all_subsets_conflict, all_subsets_equal, alts, conflicting_alt_subsets,
        has_config_in_rule_stop_state, has_sll_conflict_terminating_prediction,
        resolves_to_just_one_viable_alt, single_viable_alt, PredictionMode,
    },
    semantic::{PredicateEval, SemanticContext},
    stream::IntStream,
};

/// No alternative of a decision can match the input.
#[derive(Clone, Debug, Error)]
#[error("no viable alternative at token index {offending_index}")]
pub struct NoViableAlt {
    /// The index of the first symbol of the decision.
    pub start_index: usize,
    /// The index of the symbol at which every alternative failed.
    pub offending_index: usize,
    /// The configurations that were still live before the offending symbol.
    pub configs: Box<AtnConfigSet>,
}

/// What prediction needs from the parser it is predicting for.
pub trait ParserHost: PredicateEval {
    /// The precedence of the innermost left-recursive rule invocation, or `0` outside one.
    fn precedence(&self) -> i32;

    /// The states which invoked the rules on the parser's stack, innermost first, not including
    /// the start rule (which has no invoking state).
    fn invoking_states(&self) -> Vec<StIdx>;

    /// SLL found a conflict: prediction is retrying with full context.
    fn report_attempting_full_context(
        &mut self,
        _decision: DIdx,
        _conflicting_alts: Option<&AltSet>,
        _configs: &AtnConfigSet,
        _start_index: usize,
        _stop_index: usize,
    ) {
    }

    /// Full-context prediction resolved an SLL conflict to a unique alternative.
    fn report_context_sensitivity(
        &mut self,
        _decision: DIdx,
        _prediction: u32,
        _configs: &AtnConfigSet,
        _start_index: usize,
        _stop_index: usize,
    ) {
    }

    /// More than one alternative matches the input: the lowest was chosen.
    fn report_ambiguity(
        &mut self,
        _decision: DIdx,
        _start_index: usize,
        _stop_index: usize,
        _exact: bool,
        _ambig_alts: &AltSet,
        _configs: &AtnConfigSet,
    ) {
    }
}

/// Predicts alternatives for the decisions of one parser ATN.
///
/// Cloning is cheap, and clones share the ATN, the DFA caches, and the context caches, so a
/// simulator can be handed to as many threads as needed.
#[derive(Clone)]
pub struct ParserAtnSimulator {
    atn: Arc<Atn>,
    dfas: Arc<[Dfa]>,
    merge_cache: Arc<MergeCache>,
    ctx_cache: Arc<PredictionContextCache>,
    mode: PredictionMode,
}

impl ParserAtnSimulator {
    pub fn new(atn: Arc<Atn>) -> Self {
        let dfas = (0..atn.decisions_len())
            .map(|d| Dfa::new(&atn, DIdx::from(d)))
            .collect::<Vec<_>>();
        ParserAtnSimulator {
            atn,
            dfas: Arc::from(dfas),
            merge_cache: Arc::new(MergeCache::new()),
            ctx_cache: Arc::new(PredictionContextCache::new()),
            mode: PredictionMode::default(),
        }
    }

    pub fn atn(&self) -> &Arc<Atn> {
        &self.atn
    }

    pub fn prediction_mode(&self) -> PredictionMode {
        self.mode
    }

    /// Change the prediction mode of this simulator. Clones made earlier are unaffected; the
    /// DFA caches stay shared since SLL results are valid in every mode.
    pub fn set_prediction_mode(&mut self, mode: PredictionMode) {
        self.mode = mode;
    }

    pub fn dfa(&self, decision: DIdx) -> &Dfa {
        &self.dfas[usize::from(decision)]
    }

    pub fn dfas(&self) -> &[Dfa] {
        &self.dfas
    }

    /// Discard everything cached so far. Subsequent predictions recompute from the ATN and
    /// yield the same results.
    pub fn clear_dfa(&self) {
        for d in self.dfas.iter() {
            d.clear();
        }
        self.merge_cache.clear();
    }

    /// Predict which alternative of `decision` matches the input starting at `input`'s current
    /// position. The input is left where it was found.
    pub fn adaptive_predict<I, H>(
        &self,
        input: &mut I,
        decision: DIdx,
        host: &mut H,
    ) -> Result<u32, NoViableAlt>
    where
        I: IntStream + ?Sized,
        H: ParserHost + ?Sized,
    {
        let dfa = &self.dfas[usize::from(decision)];
        let start_index = input.index();
        let marker = input.mark();
        let mut p = Predictor {
            sim: self,
            atn: &self.atn,
            dfa,
            decision,
            input,
            host,
            start_index,
        };
        let r = p.predict();
        p.input.seek(start_index);
        p.input.release(marker);
        match &r {
            Ok(alt) => debug!(decision = decision.0, start_index, alt, "predicted"),
            Err(e) => debug!(
                decision = decision.0,
                start_index,
                offending = e.offending_index,
                "no viable alternative"
            ),
        }
        r
    }
}

/// The state of one call of `adaptive_predict`.
struct Predictor<'a, I: ?Sized, H: ?Sized> {
    sim: &'a ParserAtnSimulator,
    atn: &'a Atn,
    dfa: &'a Dfa,
    decision: DIdx,
    input: &'a mut I,
    host: &'a mut H,
    start_index: usize,
}

impl<'a, I, H> Predictor<'a, I, H>
where
    I: IntStream + ?Sized,
    H: ParserHost + ?Sized,
{
    fn predict(&mut self) -> Result<u32, NoViableAlt> {
        let precedence = self.host.precedence();
        let s0 = if self.dfa.is_precedence_dfa() {
            self.dfa.precedence_start(precedence)
        } else {
            self.dfa.s0()
        };
        let s0 = match s0 {
            Some(s) => s,
            None => {
                let closure = self.compute_start_state(
                    self.dfa.atn_start(),
                    &PredictionContext::empty(),
                    false,
                );
                if self.dfa.is_precedence_dfa() {
                    let filtered = self.apply_precedence_filter(&closure);
                    let s = self.add_dfa_state(DfaState::new(filtered));
                    self.dfa.set_precedence_start(precedence, s.0);
                    s
                } else {
                    let s = self.add_dfa_state(DfaState::new(closure));
                    self.dfa.set_s0(s.0);
                    s
                }
            }
        };
        self.exec_atn(s0)
    }

    fn merge_cache(&self) -> Option<&'a MergeCache> {
        let sim: &'a ParserAtnSimulator = self.sim;
        Some(&sim.merge_cache)
    }

    fn mode(&self) -> PredictionMode {
        self.sim.mode
    }

    fn add_dfa_state(&self, d: DfaState) -> (DfaStIdx, DfaState) {
        self.dfa.add_state(d, Some(&self.sim.ctx_cache))
    }

    fn no_viable_alt(&self, configs: &AtnConfigSet) -> NoViableAlt {
        NoViableAlt {
            start_index: self.start_index,
            offending_index: self.input.index(),
            configs: Box::new(configs.clone()),
        }
    }

    fn exec_atn(&mut self, s0: (DfaStIdx, DfaState)) -> Result<u32, NoViableAlt> {
        let (mut previous, mut previous_state) = s0;
        let mut t = self.input.la(1);
        loop {
            let next = match self.dfa.target(previous, t) {
                Target::State(d, ds) => Some((d, ds)),
                Target::Error => None,
                Target::Unknown => self.compute_target_state(previous, &previous_state.configs, t),
            };
            let Some((d, ds)) = next else {
                // Whatever happens we'll report an error, but if some configs reached the end of
                // the decision's rule, that alternative at least matched what the rule needed.
                let configs = previous_state.configs;
                let e = self.no_viable_alt(&configs);
                self.input.seek(self.start_index);
                if let Some(alt) = self.syn_valid_or_sem_invalid_alt(&configs) {
                    return Ok(alt);
                }
                return Err(e);
            };
            if ds.requires_full_context && self.mode() != PredictionMode::Sll {
                let mut conflicting = ds.configs.conflicting_alts.clone();
                if let Some(preds) = &ds.predicates {
                    let conflict_index = self.input.index();
                    if conflict_index != self.start_index {
                        self.input.seek(self.start_index);
                    }
                    let alts = self.eval_predicates(preds, true);
                    if alts.len() == 1 {
                        if let Some(a) = alts.min() {
                            return Ok(a);
                        }
                    }
                    conflicting = Some(alts);
                    if conflict_index != self.start_index {
                        self.input.seek(conflict_index);
                    }
                }
                debug!(
                    decision = self.decision.0,
                    start_index = self.start_index,
                    "SLL conflict; retrying with full context"
                );
                let invoking = self.host.invoking_states();
                let outer = PredictionContext::from_invoking_states(self.atn, &invoking);
                let s0_closure = self.compute_start_state(self.dfa.atn_start(), &outer, true);
                let stop_index = self.input.index();
                self.host.report_attempting_full_context(
                    self.decision,
                    conflicting.as_ref(),
                    &ds.configs,
                    self.start_index,
                    stop_index,
                );
                return self.exec_atn_with_full_context(s0_closure);
            }
            if ds.is_accept {
                let preds = match &ds.predicates {
                    None => return Ok(ds.prediction as u32),
                    Some(p) => p,
                };
                let stop_index = self.input.index();
                self.input.seek(self.start_index);
                let alts = self.eval_predicates(preds, true);
                return match (alts.len(), alts.min()) {
                    (_, None) => Err(self.no_viable_alt(&ds.configs)),
                    (1, Some(a)) => Ok(a),
                    (_, Some(a)) => {
                        self.host.report_ambiguity(
                            self.decision,
                            self.start_index,
                            stop_index,
                            false,
                            &alts,
                            &ds.configs,
                        );
                        Ok(a)
                    }
                };
            }
            previous = d;
            previous_state = ds;
            if t != TOKEN_EOF {
                self.input.consume();
                t = self.input.la(1);
            }
        }
    }

    /// Compute (and cache) the state `t` leads to from `previous`, whose config set is `prev`.
    /// Returns `None` if no config survives `t`.
    fn compute_target_state(
        &mut self,
        previous: DfaStIdx,
        prev: &AtnConfigSet,
        t: i32,
    ) -> Option<(DfaStIdx, DfaState)> {
        let mut reach = match self.compute_reach_set(prev, t, false) {
            Some(r) => r,
            None => {
                self.dfa.set_edge(previous, t, DfaStIdx::ERROR);
                return None;
            }
        };
        let mut is_accept = false;
        let mut prediction = 0;
        let mut requires_full_context = false;
        if let Some(alt) = unique_alt(&reach) {
            reach.unique_alt = Some(alt);
            is_accept = true;
            prediction = alt as i32;
        } else if has_sll_conflict_terminating_prediction(self.atn, self.mode(), &reach) {
            let conflicting = alts(&conflicting_alt_subsets(&reach));
            // In SLL mode, we stop here and predict the lowest alternative.
            prediction = conflicting.min().map(|a| a as i32).unwrap_or(0);
            reach.conflicting_alts = Some(conflicting);
            requires_full_context = true;
            is_accept = true;
        }
        let mut d = DfaState::new(reach);
        d.is_accept = is_accept;
        d.prediction = prediction;
        d.requires_full_context = requires_full_context;
        if d.is_accept && d.configs.has_semantic_context() {
            self.predicate_dfa_state(&mut d);
        }
        trace!(
            decision = self.decision.0,
            symbol = t,
            accept = d.is_accept,
            prediction = d.prediction,
            "computed DFA target"
        );
        let s = self.add_dfa_state(d);
        self.dfa.set_edge(previous, t, s.0);
        Some(s)
    }

    fn predicate_dfa_state(&self, d: &mut DfaState) {
        let nalts = self.atn.state(self.dfa.atn_start()).transitions().len();
        let to_collect = match d.configs.unique_alt {
            Some(a) => AltSet::of(a),
            None => d.configs.conflicting_alts.clone().unwrap_or_default(),
        };
        match preds_for_ambig_alts(&to_collect, &d.configs, nalts) {
            Some(alt_to_pred) => {
                d.predicates = predicate_predictions(&to_collect, &alt_to_pred);
                d.prediction = 0;
            }
            None => {
                // The predicates cancelled out (e.g. `{p}? || true`): resolve to the lowest alt.
                d.prediction = to_collect.min().map(|a| a as i32).unwrap_or(0);
            }
        }
    }

    fn exec_atn_with_full_context(&mut self, s0: AtnConfigSet) -> Result<u32, NoViableAlt> {
        let mut found_exact_ambig = false;
        let mut previous = s0;
        self.input.seek(self.start_index);
        let mut t = self.input.la(1);
        let (predicted, reach) = loop {
            let mut reach = match self.compute_reach_set(&previous, t, true) {
                Some(r) => r,
                None => {
                    let e = self.no_viable_alt(&previous);
                    self.input.seek(self.start_index);
                    if let Some(alt) = self.syn_valid_or_sem_invalid_alt(&previous) {
                        return Ok(alt);
                    }
                    return Err(e);
                }
            };
            let altsubsets = conflicting_alt_subsets(&reach);
            reach.unique_alt = unique_alt(&reach);
            if let Some(a) = reach.unique_alt {
                break (a, reach);
            }
            if self.mode() != PredictionMode::LlExactAmbigDetection {
                if let Some(a) = resolves_to_just_one_viable_alt(&altsubsets) {
                    break (a, reach);
                }
            } else if all_subsets_conflict(&altsubsets) && all_subsets_equal(&altsubsets) {
                if let Some(a) = single_viable_alt(&altsubsets) {
                    found_exact_ambig = true;
                    break (a, reach);
                }
            }
            previous = reach;
            if t != TOKEN_EOF {
                self.input.consume();
                t = self.input.la(1);
            }
        };
        let stop_index = self.input.index();
        if reach.unique_alt.is_some() {
            self.host.report_context_sensitivity(
                self.decision,
                predicted,
                &reach,
                self.start_index,
                stop_index,
            );
            return Ok(predicted);
        }
        // Predicates were evaluated during the full-context closure, so this is a true ambiguity.
        self.host.report_ambiguity(
            self.decision,
            self.start_index,
            stop_index,
            found_exact_ambig,
            &reach.alts(),
            &reach,
        );
        Ok(predicted)
    }

    fn compute_reach_set(
        &mut self,
        closure: &AtnConfigSet,
        t: i32,
        full_ctx: bool,
    ) -> Option<AtnConfigSet> {
        let atn = self.atn;
        let cache = self.merge_cache();
        let mut intermediate = AtnConfigSet::new(full_ctx);
        let mut skipped_stop_states = Vec::new();
        for c in closure {
            let st = atn.state(c.state);
            if st.is_rule_stop() {
                debug_assert!(c.context.is_empty());
                if full_ctx || t == TOKEN_EOF {
                    skipped_stop_states.push(c.clone());
                }
                continue;
            }
            for tr in st.transitions() {
                if tr.matches(t, 0, atn.max_token_type()) {
                    intermediate.add(c.with_state(tr.target()), cache);
                }
            }
        }

        // If there's only one config, or one alternative, there's no need to compute the
        // closure: the prediction is already decided. That doesn't hold when stop states were
        // set aside, or at EOF.
        let trivial = skipped_stop_states.is_empty()
            && t != TOKEN_EOF
            && (intermediate.len() == 1 || unique_alt(&intermediate).is_some());
        let mut reach = if trivial {
            intermediate
        } else {
            let mut reach = AtnConfigSet::new(full_ctx);
            let mut busy = FnvHashSet::default();
            for c in &intermediate {
                self.closure(c.clone(), &mut reach, &mut busy, false, full_ctx, t == TOKEN_EOF);
            }
            reach
        };

        if t == TOKEN_EOF {
            // After EOF, only configs which finished the decision rule (SLL) or start rule (LL)
            // are of interest.
            reach = self.remove_all_configs_not_in_rule_stop_state(reach, trivial);
        }

        // Stop states set aside above are only added back in full-context mode if nothing else
        // reached the end of the start rule, so that the longest match wins.
        if !skipped_stop_states.is_empty()
            && (!full_ctx || !has_config_in_rule_stop_state(atn, &reach))
        {
            for c in skipped_stop_states {
                reach.add(c, cache);
            }
        }
        if reach.is_empty() {
            None
        } else {
            Some(reach)
        }
    }

    fn remove_all_configs_not_in_rule_stop_state(
        &self,
        configs: AtnConfigSet,
        look_to_end_of_rule: bool,
    ) -> AtnConfigSet {
        let atn = self.atn;
        if configs.iter().all(|c| atn.state(c.state).is_rule_stop()) {
            return configs;
        }
        let mut result = AtnConfigSet::new(configs.full_ctx());
        for c in &configs {
            let st = atn.state(c.state);
            if st.is_rule_stop() {
                result.add(c.clone(), self.merge_cache());
                continue;
            }
            if look_to_end_of_rule && st.epsilon_only() {
                if let Some(r) = st.rule() {
                    if atn.next_tokens(c.state).contains(atngrammar::EPSILON) {
                        result.add(c.with_state(atn.rule_stop(r)), self.merge_cache());
                    }
                }
            }
        }
        result
    }

    fn compute_start_state(
        &mut self,
        p: StIdx,
        ctx: &PredictionContext,
        full_ctx: bool,
    ) -> AtnConfigSet {
        let atn = self.atn;
        let mut configs = AtnConfigSet::new(full_ctx);
        for (i, t) in atn.state(p).transitions().iter().enumerate() {
            let c = AtnConfig::new(t.target(), i as u32 + 1, ctx.clone());
            let mut busy = FnvHashSet::default();
            self.closure(c, &mut configs, &mut busy, true, full_ctx, false);
        }
        configs
    }

    fn closure(
        &mut self,
        config: AtnConfig,
        configs: &mut AtnConfigSet,
        busy: &mut FnvHashSet<AtnConfig>,
        collect_predicates: bool,
        full_ctx: bool,
        treat_eof_as_epsilon: bool,
    ) {
        self.closure_checking_stop_state(
            config,
            configs,
            busy,
            collect_predicates,
            full_ctx,
            0,
            treat_eof_as_epsilon,
        );
    }

    #[allow(clippy::too_many_arguments)]
    fn closure_checking_stop_state(
        &mut self,
        config: AtnConfig,
        configs: &mut AtnConfigSet,
        busy: &mut FnvHashSet<AtnConfig>,
        collect_predicates: bool,
        full_ctx: bool,
        depth: i32,
        treat_eof_as_epsilon: bool,
    ) {
        if self.atn.state(config.state).is_rule_stop() {
            if !config.context.is_empty() {
                for i in 0..config.context.len() {
                    let rs = config.context.return_state(i);
                    if rs == EMPTY_RETURN_STATE {
                        if full_ctx {
                            configs.add(
                                config.with_state_context(config.state, PredictionContext::empty()),
                                self.merge_cache(),
                            );
                        } else {
                            // Without context information, follow every return.
                            self.closure_inner(
                                config.clone(),
                                configs,
                                busy,
                                collect_predicates,
                                full_ctx,
                                depth,
                                treat_eof_as_epsilon,
                            );
                        }
                        continue;
                    }
                    let parent = config
                        .context
                        .parent(i)
                        .cloned()
                        .unwrap_or_else(PredictionContext::empty);
                    let c = config.with_state_context(StIdx(rs as u32), parent);
                    self.closure_checking_stop_state(
                        c,
                        configs,
                        busy,
                        collect_predicates,
                        full_ctx,
                        depth - 1,
                        treat_eof_as_epsilon,
                    );
                }
                return;
            } else if full_ctx {
                // The end of the start rule.
                configs.add(config, self.merge_cache());
                return;
            }
        }
        self.closure_inner(
            config,
            configs,
            busy,
            collect_predicates,
            full_ctx,
            depth,
            treat_eof_as_epsilon,
        );
    }

    #[allow(clippy::too_many_arguments)]
    fn closure_inner(
        &mut self,
        config: AtnConfig,
        configs: &mut AtnConfigSet,
        busy: &mut FnvHashSet<AtnConfig>,
        collect_predicates: bool,
        full_ctx: bool,
        depth: i32,
        treat_eof_as_epsilon: bool,
    ) {
        let atn = self.atn;
        let p = atn.state(config.state);
        if !p.epsilon_only() {
            // EOF transitions can act as both epsilon and non-epsilon transitions, so carry on.
            configs.add(config.clone(), self.merge_cache());
        }
        for t in p.transitions() {
            let continue_collecting =
                collect_predicates && !matches!(t, Transition::Action { .. });
            let mut c = match self.epsilon_target(
                &config,
                t,
                continue_collecting,
                depth == 0,
                full_ctx,
                treat_eof_as_epsilon,
            ) {
                Some(c) => c,
                None => continue,
            };
            let mut new_depth = depth;
            if p.is_rule_stop() {
                debug_assert!(!full_ctx);
                // Falling off the end of the decision rule into the outer context.
                if self.dfa.is_precedence_dfa() {
                    if let Transition::Epsilon {
                        outermost_precedence_return: Some(r),
                        ..
                    } = t
                    {
                        if Some(*r) == atn.state(self.dfa.atn_start()).rule() {
                            c.precedence_filter_suppressed = true;
                        }
                    }
                }
                c.reaches_into_outer_context += 1;
                if !busy.insert(c.clone()) {
                    continue;
                }
                configs.set_dips_into_outer_context();
                new_depth -= 1;
            } else {
                if !busy.insert(c.clone()) {
                    continue;
                }
                if matches!(t, Transition::Rule { .. }) && new_depth >= 0 {
                    new_depth += 1;
                }
            }
            self.closure_checking_stop_state(
                c,
                configs,
                busy,
                continue_collecting,
                full_ctx,
                new_depth,
                treat_eof_as_epsilon,
            );
        }
    }

    fn epsilon_target(
        &mut self,
        config: &AtnConfig,
        t: &Transition,
        collect_predicates: bool,
        in_context: bool,
        full_ctx: bool,
        treat_eof_as_epsilon: bool,
    ) -> Option<AtnConfig> {
        match t {
            Transition::Rule { target, follow, .. } => {
                let ctx = PredictionContext::singleton(config.context.clone(), follow.0 as i32);
                Some(config.with_state_context(*target, ctx))
            }
            Transition::Precedence { target, precedence } => {
                if collect_predicates && in_context {
                    let pred = SemanticContext::Precedence(*precedence);
                    self.guarded(config, *target, pred, full_ctx)
                } else {
                    Some(config.with_state(*target))
                }
            }
            Transition::Predicate {
                target,
                rule,
                pred,
                ctx_dependent,
            } => {
                if collect_predicates && (!*ctx_dependent || in_context) {
                    let pred = SemanticContext::Predicate {
                        rule: *rule,
                        pred: *pred,
                        ctx_dependent: *ctx_dependent,
                    };
                    self.guarded(config, *target, pred, full_ctx)
                } else {
                    Some(config.with_state(*target))
                }
            }
            Transition::Action { target, .. } | Transition::Epsilon { target, .. } => {
                Some(config.with_state(*target))
            }
            Transition::Atom { target, .. }
            | Transition::Range { target, .. }
            | Transition::Set { target, .. } => {
                // Once EOF has been matched, further EOF transitions act as epsilon transitions.
                if treat_eof_as_epsilon && t.matches(TOKEN_EOF, 0, 1) {
                    Some(config.with_state(*target))
                } else {
                    None
                }
            }
            Transition::NotSet { .. } | Transition::Wildcard { .. } => None,
        }
    }

    /// Cross a predicate transition to `target`. In full-context mode the predicate is evaluated
    /// on the spot (at the decision's start position); otherwise it is attached to the config.
    fn guarded(
        &mut self,
        config: &AtnConfig,
        target: StIdx,
        pred: SemanticContext,
        full_ctx: bool,
    ) -> Option<AtnConfig> {
        if full_ctx {
            let current = self.input.index();
            self.input.seek(self.start_index);
            let ok = pred.eval(&mut *self.host);
            self.input.seek(current);
            if ok {
                Some(config.with_state(target))
            } else {
                None
            }
        } else {
            let sem = SemanticContext::and(&config.semantic, &pred);
            Some(config.with_semantic(target, sem))
        }
    }

    /// Evaluate the precedence predicates of a left-recursive rule's loop decision, and remove
    /// configs for alternatives other than 1 which are subsumed by alternative 1 (i.e. which
    /// would only continue the current operator at a lower precedence).
    fn apply_precedence_filter(&mut self, configs: &AtnConfigSet) -> AtnConfigSet {
        let cache = self.merge_cache();
        let mut states_from_alt1: FnvHashMap<StIdx, PredictionContext> = FnvHashMap::default();
        let mut out = AtnConfigSet::new(configs.full_ctx());
        for c in configs.iter().filter(|c| c.alt == 1) {
            let updated = match c.semantic.eval_precedence(&mut *self.host) {
                Some(u) => u,
                None => continue,
            };
            states_from_alt1.insert(c.state, c.context.clone());
            if updated != c.semantic {
                out.add(
                    AtnConfig {
                        semantic: updated,
                        ..c.clone()
                    },
                    cache,
                );
            } else {
                out.add(c.clone(), cache);
            }
        }
        for c in configs.iter().filter(|c| c.alt != 1) {
            if !c.precedence_filter_suppressed
                && states_from_alt1.get(&c.state) == Some(&c.context)
            {
                continue;
            }
            out.add(c.clone(), cache);
        }
        out
    }

    fn eval_predicates(&mut self, preds: &[PredPrediction], complete: bool) -> AltSet {
        let mut predictions = AltSet::new();
        for p in preds {
            if p.pred.is_none() || p.pred.eval(&mut *self.host) {
                predictions.insert(p.alt);
                if !complete {
                    break;
                }
            }
        }
        predictions
    }

    /// After prediction fails, pick an alternative which reached the end of the decision's rule
    /// (preferring those whose predicates hold) so that the error is reported by the rule that
    /// actually went wrong.
    fn syn_valid_or_sem_invalid_alt(&mut self, configs: &AtnConfigSet) -> Option<u32> {
        let mut valid = AtnConfigSet::new(configs.full_ctx());
        let mut invalid = AtnConfigSet::new(configs.full_ctx());
        for c in configs {
            if c.semantic.is_none() || c.semantic.eval(&mut *self.host) {
                valid.add(c.clone(), None);
            } else {
                invalid.add(c.clone(), None);
            }
        }
        self.alt_that_finished_decision_entry_rule(&valid)
            .or_else(|| self.alt_that_finished_decision_entry_rule(&invalid))
    }

    fn alt_that_finished_decision_entry_rule(&self, configs: &AtnConfigSet) -> Option<u32> {
        configs
            .iter()
            .filter(|c| {
                c.outer_context_depth() > 0
                    || (self.atn.state(c.state).is_rule_stop() && c.context.has_empty_path())
            })
            .map(|c| c.alt)
            .min()
    }
}

/// If every config predicts the same alternative, return it.
fn unique_alt(configs: &AtnConfigSet) -> Option<u32> {
    let mut alt = None;
    for c in configs {
        match alt {
            None => alt = Some(c.alt),
            Some(a) if a != c.alt => return None,
            _ => (),
        }
    }
    alt
}

/// For each alternative in `ambig_alts`, the disjunction of its configs' predicates. Returns
/// `None` if no alternative is actually predicated.
fn preds_for_ambig_alts(
    ambig_alts: &AltSet,
    configs: &AtnConfigSet,
    nalts: usize,
) -> Option<Vec<SemanticContext>> {
    let mut alt_to_pred: Vec<Option<SemanticContext>> = vec![None; nalts + 1];
    for c in configs {
        let i = c.alt as usize;
        if ambig_alts.contains(c.alt) && i < alt_to_pred.len() {
            alt_to_pred[i] = Some(match &alt_to_pred[i] {
                None => c.semantic.clone(),
                Some(p) => SemanticContext::or(p, &c.semantic),
            });
        }
    }
    let npred_alts = alt_to_pred
        .iter()
        .skip(1)
        .filter(|p| matches!(p, Some(p) if !p.is_none()))
        .count();
    if npred_alts == 0 {
        return None;
    }
    Some(
        alt_to_pred
            .into_iter()
            .map(|p| p.unwrap_or(SemanticContext::None))
            .collect(),
    )
}

fn predicate_predictions(
    ambig_alts: &AltSet,
    alt_to_pred: &[SemanticContext],
) -> Option<Vec<PredPrediction>> {
    let mut pairs = Vec::new();
    let mut contains_predicate = false;
    for (i, pred) in alt_to_pred.iter().enumerate().skip(1) {
        if ambig_alts.contains(i as u32) {
            pairs.push(PredPrediction {
                pred: pred.clone(),
                alt: i as u32,
            });
        }
        if !pred.is_none() {
            contains_predicate = true;
        }
    }
    if contains_predicate {
        Some(pairs)
    } else {
        None
    }
}
