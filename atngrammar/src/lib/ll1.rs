//! LL(1) lookahead analysis over an ATN: the set of symbols that can follow a state.

use fnv::FnvHashSet;
use vob::Vob;

use crate::{
    atn::Atn, interval::IntervalSet, transition::Transition, StIdx, EPSILON,
    MIN_USER_TOKEN_TYPE, TOKEN_EOF,
};

/// The rule invocation context under which lookahead is computed.
#[derive(Clone, Copy, Debug)]
pub enum LookContext<'a> {
    /// The calling context is unknown: reaching the end of the outermost rule adds [EPSILON] to
    /// the result.
    Unknown,
    /// The calling context is a stack of invoking states, innermost first. Reaching the end of
    /// the outermost rule adds [TOKEN_EOF] to the result.
    Invoking(&'a [StIdx]),
}

struct Look<'a> {
    atn: &'a Atn,
    stop: Option<StIdx>,
    set: IntervalSet,
    busy: FnvHashSet<(StIdx, Vec<StIdx>, usize)>,
    called: Vob,
}

impl<'a> Look<'a> {
    /// `pushed` holds the follow states of rule calls made during this analysis (innermost
    /// last); `outer` the follow states of the caller's stack (innermost first), or `None` if
    /// that is unknown.
    fn walk(&mut self, s: StIdx, pushed: &mut Vec<StIdx>, outer: Option<&[StIdx]>) {
        let key = (s, pushed.clone(), outer.map(|o| o.len()).unwrap_or(usize::MAX));
        if !self.busy.insert(key) {
            return;
        }
        let atn = self.atn;
        let st = atn.state(s);
        if Some(s) == self.stop || st.is_rule_stop() {
            if pushed.is_empty() {
                match outer {
                    None => {
                        self.set.add_one(EPSILON);
                        return;
                    }
                    Some([]) => {
                        self.set.add_one(TOKEN_EOF);
                        return;
                    }
                    Some([ret, rest @ ..]) if st.is_rule_stop() => {
                        self.pop_into(st.rule(), |l| l.walk(*ret, pushed, Some(rest)));
                        return;
                    }
                    Some(_) => (),
                }
            } else if st.is_rule_stop() {
                if let Some(ret) = pushed.pop() {
                    self.pop_into(st.rule(), |l| l.walk(ret, pushed, outer));
                    pushed.push(ret);
                }
                return;
            }
        }

        for t in st.transitions() {
            match t {
                Transition::Rule {
                    target,
                    rule,
                    follow,
                    ..
                } => {
                    let r = usize::from(*rule);
                    if self.called.get(r).unwrap_or(false) {
                        continue;
                    }
                    self.called.set(r, true);
                    pushed.push(*follow);
                    self.walk(*target, pushed, outer);
                    pushed.pop();
                    self.called.set(r, false);
                }
                Transition::Wildcard { .. } => self
                    .set
                    .add_range(MIN_USER_TOKEN_TYPE, atn.max_token_type()),
                Transition::NotSet { set, .. } => self
                    .set
                    .add_set(&set.complement(MIN_USER_TOKEN_TYPE, atn.max_token_type())),
                t if t.is_epsilon() => self.walk(t.target(), pushed, outer),
                t => {
                    if let Some(l) = t.label() {
                        self.set.add_set(&l);
                    }
                }
            }
        }
    }

    /// Run `f` with the rule being returned from temporarily removed from the called-rule set.
    fn pop_into<F>(&mut self, rule: Option<crate::RIdx>, f: F)
    where
        F: FnOnce(&mut Self),
    {
        let r = rule.map(usize::from);
        let removed = r.and_then(|r| self.called.get(r)).unwrap_or(false);
        if let Some(r) = r {
            self.called.set(r, false);
        }
        f(self);
        if let (Some(r), true) = (r, removed) {
            self.called.set(r, true);
        }
    }
}

impl Atn {
    /// Compute the set of symbols that can follow `s`, stopping at `stop` (if given) or at the end
    /// of the rule stack described by `ctx`. Predicates are treated as if they were true.
    pub fn look(&self, s: StIdx, stop: Option<StIdx>, ctx: LookContext) -> IntervalSet {
        let mut l = Look {
            atn: self,
            stop,
            set: IntervalSet::new(),
            busy: FnvHashSet::default(),
            called: std::iter::repeat(false).take(self.rules_len()).collect(),
        };
        match ctx {
            LookContext::Unknown => l.walk(s, &mut Vec::new(), None),
            LookContext::Invoking(inv) => {
                let follows = inv
                    .iter()
                    .filter_map(|i| self.follow_of(*i))
                    .collect::<Vec<_>>();
                l.walk(s, &mut Vec::new(), Some(&follows))
            }
        }
        l.set
    }

    /// The symbols that can follow `s` within its rule; [EPSILON] is included if the end of the
    /// rule is reachable without consuming input. The result is cached.
    pub fn next_tokens(&self, s: StIdx) -> &IntervalSet {
        self.state(s)
            .next_tokens
            .get_or_init(|| self.look(s, None, LookContext::Unknown))
    }

    /// The symbols that can follow `s` given the stack of invoking states `invoking` (innermost
    /// first).
    pub fn next_tokens_in_ctx(&self, s: StIdx, invoking: &[StIdx]) -> IntervalSet {
        self.look(s, None, LookContext::Invoking(invoking))
    }

    /// The set of tokens a parser in state `s` with rule stack `invoking` (innermost first) could
    /// accept next. If the end of the outermost rule is reachable, [TOKEN_EOF] is included.
    pub fn expected_tokens(&self, s: StIdx, invoking: &[StIdx]) -> IntervalSet {
        let mut following = self.next_tokens(s).clone();
        if !following.contains(EPSILON) {
            return following;
        }
        let mut expected = following.clone();
        expected.remove_one(EPSILON);
        for inv in invoking {
            if !following.contains(EPSILON) {
                break;
            }
            let Some(follow) = self.follow_of(*inv) else {
                break;
            };
            following = self.next_tokens(follow).clone();
            expected.add_set(&following);
            expected.remove_one(EPSILON);
        }
        if following.contains(EPSILON) {
            expected.add_one(TOKEN_EOF);
        }
        expected
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::{AtnBuilder, Elem, GrammarInfo, RIdx, Vocabulary};

    // s : a C EOF ;  a : A? B? ;
    fn grammar() -> GrammarInfo {
        let vocab = Vocabulary::new(
            vec![],
            vec![
                None,
                Some("A".to_owned()),
                Some("B".to_owned()),
                Some("C".to_owned()),
            ],
        );
        AtnBuilder::parser("G", vocab)
            .rule(
                "s",
                Elem::seq([Elem::rule("a"), Elem::tok("C"), Elem::Symbol(TOKEN_EOF)]),
            )
            .rule("a", Elem::seq([Elem::tok("A").opt(), Elem::tok("B").opt()]))
            .build()
            .unwrap()
    }

    fn invoking_state(atn: &Atn) -> StIdx {
        atn.states()
            .find(|s| matches!(s.transitions().first(), Some(Transition::Rule { .. })))
            .map(|s| s.stidx())
            .unwrap()
    }

    #[test]
    fn test_next_tokens_within_rule() {
        let g = grammar();
        let atn = g.atn();
        let a_start = atn.rule_start(RIdx(1));
        let nt = atn.next_tokens(a_start);
        assert_eq!(nt.iter().collect::<Vec<_>>(), vec![EPSILON, 1, 2]);
        // The cached value is returned on subsequent calls.
        assert!(std::ptr::eq(nt, atn.next_tokens(a_start)));
    }

    #[test]
    fn test_expected_tokens_follow_callers() {
        let g = grammar();
        let atn = g.atn();
        let a_start = atn.rule_start(RIdx(1));
        let inv = invoking_state(atn);
        let exp = atn.expected_tokens(a_start, &[inv]);
        assert_eq!(exp.iter().collect::<Vec<_>>(), vec![1, 2, 3]);
        let ctx = atn.next_tokens_in_ctx(a_start, &[inv]);
        assert_eq!(ctx.iter().collect::<Vec<_>>(), vec![1, 2, 3]);
        // Without a calling context the end of `a` is the end of the input.
        assert_eq!(
            atn.expected_tokens(a_start, &[]).iter().collect::<Vec<_>>(),
            vec![TOKEN_EOF, 1, 2]
        );
    }

    #[test]
    fn test_look_from_start_rule() {
        let g = grammar();
        let atn = g.atn();
        let s_start = atn.rule_start(RIdx(0));
        let l = atn.look(s_start, None, LookContext::Unknown);
        assert_eq!(l.iter().collect::<Vec<_>>(), vec![1, 2, 3]);
    }
}
