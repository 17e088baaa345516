//! Programmatic construction of ATNs.
//!
//! [AtnBuilder] lays out rules described as [Elem] trees using the same state and transition
//! shapes that grammar tools emit, so that ATNs built here behave identically to deserialized
//! ones. It is not a grammar parser: rules are described directly as Rust values.

use std::{collections::HashMap, sync::Arc};

use indexmap::IndexSet;
use thiserror::Error;

use crate::{
    atn::{Atn, AtnError, GrammarType},
    grammar::GrammarInfo,
    interval::IntervalSet,
    lexer_action::LexerAction,
    state::{StateKind, UNSET},
    transition::Transition,
    vocabulary::Vocabulary,
    RIdx, StIdx,
};

#[derive(Debug, Error, Eq, PartialEq)]
pub enum BuildError {
    #[error("duplicate rule name '{0}'")]
    DuplicateRule(String),
    #[error("reference to undefined rule '{0}'")]
    UnknownRule(String),
    #[error("reference to undefined token '{0}'")]
    UnknownToken(String),
    #[error("{0} is not allowed in a {1} grammar")]
    NotAllowed(&'static str, &'static str),
    #[error("grammar has no rules")]
    NoRules,
    #[error(transparent)]
    Atn(#[from] AtnError),
}

/// An element of a rule's right hand side.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum Elem {
    /// A single symbol: a token type in a parser, a code point in a lexer.
    Symbol(i32),
    /// A token referenced by symbolic name (e.g. `ID`). Parsers only.
    TokenRef(String),
    /// In a lexer, the sequence of characters in the string. In a parser, the token whose literal
    /// name is the string in single quotes.
    Literal(String),
    Range(i32, i32),
    Set(IntervalSet),
    NotSet(IntervalSet),
    Wildcard,
    RuleRef {
        name: String,
        precedence: i32,
    },
    Seq(Vec<Elem>),
    Alt(Vec<Elem>),
    Optional {
        elem: Box<Elem>,
        greedy: bool,
    },
    Star {
        elem: Box<Elem>,
        greedy: bool,
    },
    Plus {
        elem: Box<Elem>,
        greedy: bool,
    },
    Pred {
        index: usize,
        ctx_dependent: bool,
    },
    /// `{precpred(_ctx, n)}?`, guarding an alternative of a left-recursive rule.
    PrecPred(i32),
    Action {
        index: usize,
        ctx_dependent: bool,
    },
    /// A lexer command such as `-> skip`. Lexers only.
    Command(LexerAction),
    Epsilon,
}

impl Elem {
    pub fn sym(c: char) -> Elem {
        Elem::Symbol(c as i32)
    }

    pub fn tok(name: &str) -> Elem {
        Elem::TokenRef(name.to_owned())
    }

    pub fn lit(s: &str) -> Elem {
        Elem::Literal(s.to_owned())
    }

    pub fn range(a: char, b: char) -> Elem {
        Elem::Range(a as i32, b as i32)
    }

    /// A set of characters, as in `[abc]`.
    pub fn chars(s: &str) -> Elem {
        Elem::Set(s.chars().map(|c| c as i32).collect())
    }

    /// Anything but the given characters, as in `~[abc]`.
    pub fn not_chars(s: &str) -> Elem {
        Elem::NotSet(s.chars().map(|c| c as i32).collect())
    }

    pub fn rule(name: &str) -> Elem {
        Elem::RuleRef {
            name: name.to_owned(),
            precedence: 0,
        }
    }

    pub fn rule_prec(name: &str, precedence: i32) -> Elem {
        Elem::RuleRef {
            name: name.to_owned(),
            precedence,
        }
    }

    pub fn seq<I: IntoIterator<Item = Elem>>(es: I) -> Elem {
        Elem::Seq(es.into_iter().collect())
    }

    pub fn alt<I: IntoIterator<Item = Elem>>(es: I) -> Elem {
        Elem::Alt(es.into_iter().collect())
    }

    pub fn pred(index: usize) -> Elem {
        Elem::Pred {
            index,
            ctx_dependent: false,
        }
    }

    pub fn action(index: usize) -> Elem {
        Elem::Action {
            index,
            ctx_dependent: false,
        }
    }

    pub fn opt(self) -> Elem {
        Elem::Optional {
            elem: Box::new(self),
            greedy: true,
        }
    }

    pub fn star(self) -> Elem {
        Elem::Star {
            elem: Box::new(self),
            greedy: true,
        }
    }

    pub fn plus(self) -> Elem {
        Elem::Plus {
            elem: Box::new(self),
            greedy: true,
        }
    }

    /// Make an `?`, `*`, or `+` element non-greedy. Other elements are returned unchanged.
    pub fn non_greedy(self) -> Elem {
        match self {
            Elem::Optional { elem, .. } => Elem::Optional {
                elem,
                greedy: false,
            },
            Elem::Star { elem, .. } => Elem::Star {
                elem,
                greedy: false,
            },
            Elem::Plus { elem, .. } => Elem::Plus {
                elem,
                greedy: false,
            },
            e => e,
        }
    }

    fn alternatives(&self) -> Vec<&Elem> {
        match self {
            Elem::Alt(alts) if !alts.is_empty() => alts.iter().collect(),
            e => vec![e],
        }
    }
}

struct RuleDef {
    name: String,
    body: Elem,
    left_recursive: bool,
    /// Lexers only: `None` for fragments.
    ttype: Option<i32>,
    mode: usize,
}

#[derive(Clone, Copy)]
struct Handle {
    left: StIdx,
    right: StIdx,
}

/// Builds an ATN, and the [GrammarInfo] describing it, from rules given as [Elem]s. Options are
/// set by chaining, in the style of:
///
/// ```text
///   let lexer = AtnBuilder::lexer("T")
///       .token("A", Elem::lit("ab"))
///       .token("WS", Elem::seq([Elem::chars(" \n").plus(), Elem::Command(LexerAction::Skip)]))
///       .build()?;
/// ```
pub struct AtnBuilder {
    name: String,
    grammar_type: GrammarType,
    vocab: Vocabulary,
    rules: Vec<RuleDef>,
    modes: Vec<String>,
    channels: Vec<String>,
}

impl AtnBuilder {
    /// Start building a parser whose tokens are described by `vocab` (typically the
    /// vocabulary of a lexer built earlier).
    pub fn parser(name: &str, vocab: Vocabulary) -> Self {
        AtnBuilder {
            name: name.to_owned(),
            grammar_type: GrammarType::Parser,
            vocab,
            rules: Vec::new(),
            modes: Vec::new(),
            channels: Vec::new(),
        }
    }

    /// Start building a lexer. Rules are added to `DEFAULT_MODE` until [AtnBuilder::mode] is
    /// called.
    pub fn lexer(name: &str) -> Self {
        AtnBuilder {
            name: name.to_owned(),
            grammar_type: GrammarType::Lexer,
            vocab: Vocabulary::default(),
            rules: Vec::new(),
            modes: vec!["DEFAULT_MODE".to_owned()],
            channels: vec!["DEFAULT_TOKEN_CHANNEL".to_owned(), "HIDDEN".to_owned()],
        }
    }

    /// Add a parser rule.
    pub fn rule(mut self, name: &str, body: Elem) -> Self {
        self.push_rule(name, body, false, None);
        self
    }

    /// Add a left-recursive parser rule in the form grammar tools rewrite such rules to:
    /// `r : (primary_1 | ... ) (suffix_1 | ...)*`, where each suffix starts with an
    /// [Elem::PrecPred] and recursive references carry their precedence via [Elem::rule_prec].
    pub fn left_recursive_rule(mut self, name: &str, primaries: Vec<Elem>, suffixes: Vec<Elem>) -> Self {
        let body = Elem::seq([Elem::Alt(primaries), Elem::Alt(suffixes).star()]);
        self.push_rule(name, body, true, None);
        self
    }

    /// Add a lexer rule producing a new token type. Token types are allocated from 1 in the order
    /// tokens are added.
    pub fn token(mut self, name: &str, body: Elem) -> Self {
        let ttype = self.rules.iter().filter(|r| r.ttype.is_some()).count() as i32 + 1;
        self.push_rule(name, body, false, Some(ttype));
        self
    }

    /// Add a lexer fragment rule, which can only be referenced by other lexer rules.
    pub fn fragment(mut self, name: &str, body: Elem) -> Self {
        self.push_rule(name, body, false, None);
        self
    }

    /// Subsequent lexer rules belong to the mode `name`.
    pub fn mode(mut self, name: &str) -> Self {
        self.modes.push(name.to_owned());
        self
    }

    /// Declare an extra token channel. Its number follows `HIDDEN` (1).
    pub fn channel(mut self, name: &str) -> Self {
        self.channels.push(name.to_owned());
        self
    }

    fn push_rule(&mut self, name: &str, body: Elem, left_recursive: bool, ttype: Option<i32>) {
        self.rules.push(RuleDef {
            name: name.to_owned(),
            body,
            left_recursive,
            ttype,
            mode: self.modes.len().saturating_sub(1),
        });
    }

    pub fn build(self) -> Result<GrammarInfo, BuildError> {
        if self.rules.is_empty() {
            return Err(BuildError::NoRules);
        }
        let mut rule_idxs = HashMap::new();
        for (i, r) in self.rules.iter().enumerate() {
            if rule_idxs.insert(r.name.clone(), RIdx::from(i)).is_some() {
                return Err(BuildError::DuplicateRule(r.name.clone()));
            }
        }

        let vocab = match self.grammar_type {
            GrammarType::Parser => self.vocab.clone(),
            GrammarType::Lexer => {
                let ntoks = self.rules.iter().filter(|r| r.ttype.is_some()).count() + 1;
                let mut literal = vec![None; ntoks];
                let mut symbolic = vec![None; ntoks];
                for r in &self.rules {
                    if let Some(t) = r.ttype {
                        symbolic[t as usize] = Some(r.name.clone());
                        if let Elem::Literal(s) = &r.body {
                            literal[t as usize] = Some(format!("'{}'", s));
                        }
                    }
                }
                Vocabulary::new(literal, symbolic)
            }
        };

        let mut b = Builder {
            atn: Atn::new(self.grammar_type, vocab.max_token_type()),
            rule_idxs: &rule_idxs,
            vocab: &vocab,
            lexer_actions: IndexSet::new(),
        };
        for _ in &self.modes {
            let s = b.atn.add_state(None, StateKind::TokensStart);
            b.atn.mode_to_start.push(s);
            b.atn.define_decision(s)?;
        }
        for (i, r) in self.rules.iter().enumerate() {
            let ridx = Some(RIdx::from(i));
            let start = b.atn.add_state(
                ridx,
                StateKind::RuleStart {
                    stop: UNSET,
                    left_recursive: r.left_recursive,
                },
            );
            b.atn.add_state(ridx, StateKind::RuleStop);
            b.atn.rule_to_start.push(start);
            if self.grammar_type == GrammarType::Lexer {
                b.atn.rule_to_token_type.push(r.ttype.unwrap_or(0));
            }
        }
        for (i, r) in self.rules.iter().enumerate() {
            let ridx = RIdx::from(i);
            let h = b.elem(ridx, &r.body)?;
            let start = b.atn.rule_start(ridx);
            // Rule stop states are allocated directly after their start state.
            let stop = StIdx(start.0 + 1);
            b.epsilon(start, h.left)?;
            b.epsilon(h.right, stop)?;
        }
        for (i, r) in self.rules.iter().enumerate() {
            if r.ttype.is_some() {
                let ms = b.atn.mode_to_start[r.mode];
                let rs = b.atn.rule_start(RIdx::from(i));
                b.epsilon(ms, rs)?;
            }
        }
        b.atn.lexer_actions = b.lexer_actions.into_iter().collect();
        let mut atn = b.atn;
        atn.finish()?;

        Ok(GrammarInfo::new(
            &self.name,
            Arc::new(atn),
            self.rules.into_iter().map(|r| r.name).collect(),
            vocab,
            self.channels,
            self.modes,
        ))
    }
}

/// The transition matching `a..=b`. Symbols outside the Basic Multilingual Plane can only be
/// serialized in sets, so ranges reaching beyond it become set transitions.
fn code_points(target: StIdx, a: i32, b: i32) -> Transition {
    if b > 0xFFFF {
        Transition::Set {
            target,
            set: IntervalSet::of_range(a, b),
        }
    } else if a == b {
        Transition::Atom { target, label: a }
    } else {
        Transition::Range {
            target,
            start: a,
            stop: b,
        }
    }
}

struct Builder<'a> {
    atn: Atn,
    rule_idxs: &'a HashMap<String, RIdx>,
    vocab: &'a Vocabulary,
    lexer_actions: IndexSet<LexerAction>,
}

impl<'a> Builder<'a> {
    fn lexer(&self) -> bool {
        self.atn.grammar_type == GrammarType::Lexer
    }

    fn not_allowed(&self, what: &'static str) -> BuildError {
        BuildError::NotAllowed(what, if self.lexer() { "lexer" } else { "parser" })
    }

    fn basic(&mut self, ridx: RIdx) -> StIdx {
        self.atn.add_state(Some(ridx), StateKind::Basic)
    }

    fn epsilon(&mut self, from: StIdx, to: StIdx) -> Result<(), AtnError> {
        self.atn.state_mut(from)?.add_transition(Transition::epsilon(to));
        Ok(())
    }

    /// A two state handle joined by `t`, whose target is patched to be the right state.
    fn single(&mut self, ridx: RIdx, mut t: Transition) -> Result<Handle, BuildError> {
        let left = self.basic(ridx);
        let right = self.basic(ridx);
        if !matches!(t, Transition::Rule { .. }) {
            t.set_target(right);
        }
        if let Transition::Rule { ref mut follow, .. } = t {
            *follow = right;
        }
        self.atn.state_mut(left)?.add_transition(t);
        Ok(Handle { left, right })
    }

    fn symbol(&mut self, ridx: RIdx, label: i32) -> Result<Handle, BuildError> {
        self.single(ridx, code_points(UNSET, label, label))
    }

    fn token_named(&self, name: &str) -> Result<i32, BuildError> {
        self.vocab
            .token_type(name)
            .ok_or_else(|| BuildError::UnknownToken(name.to_owned()))
    }

    fn elem(&mut self, ridx: RIdx, e: &Elem) -> Result<Handle, BuildError> {
        match e {
            Elem::Symbol(s) => self.symbol(ridx, *s),
            Elem::TokenRef(name) => {
                if self.lexer() {
                    return Err(self.not_allowed("a token reference"));
                }
                let t = self.token_named(name)?;
                self.symbol(ridx, t)
            }
            Elem::Literal(s) => {
                if !self.lexer() {
                    let t = self.token_named(&format!("'{}'", s))?;
                    return self.symbol(ridx, t);
                }
                let left = self.basic(ridx);
                let mut prev = left;
                for c in s.chars() {
                    let right = self.basic(ridx);
                    self.atn
                        .state_mut(prev)?
                        .add_transition(code_points(right, c as i32, c as i32));
                    prev = right;
                }
                if prev == left {
                    let right = self.basic(ridx);
                    self.epsilon(left, right)?;
                    prev = right;
                }
                Ok(Handle { left, right: prev })
            }
            Elem::Range(a, b) => self.single(ridx, code_points(UNSET, *a, *b)),
            Elem::Set(set) => self.single(
                ridx,
                Transition::Set {
                    target: UNSET,
                    set: set.clone(),
                },
            ),
            Elem::NotSet(set) => self.single(
                ridx,
                Transition::NotSet {
                    target: UNSET,
                    set: set.clone(),
                },
            ),
            Elem::Wildcard => self.single(ridx, Transition::Wildcard { target: UNSET }),
            Elem::RuleRef { name, precedence } => {
                let callee = *self
                    .rule_idxs
                    .get(name)
                    .ok_or_else(|| BuildError::UnknownRule(name.clone()))?;
                let target = self.atn.rule_start(callee);
                self.single(
                    ridx,
                    Transition::Rule {
                        target,
                        rule: callee,
                        precedence: *precedence,
                        follow: UNSET,
                    },
                )
            }
            Elem::Seq(es) => {
                let mut hs = Vec::with_capacity(es.len());
                for e in es {
                    hs.push(self.elem(ridx, e)?);
                }
                match (hs.first(), hs.last()) {
                    (Some(first), Some(last)) => {
                        let h = Handle {
                            left: first.left,
                            right: last.right,
                        };
                        for w in hs.windows(2) {
                            self.epsilon(w[0].right, w[1].left)?;
                        }
                        Ok(h)
                    }
                    _ => self.elem(ridx, &Elem::Epsilon),
                }
            }
            Elem::Alt(alts) => {
                match alts.len() {
                    0 => return self.elem(ridx, &Elem::Epsilon),
                    1 => return self.elem(ridx, &alts[0]),
                    _ => (),
                }
                let hs = self.alt_handles(ridx, e)?;
                let start = self.atn.add_state(Some(ridx), StateKind::BlockStart { end: UNSET });
                self.atn.define_decision(start)?;
                self.block(ridx, start, &hs)
            }
            Elem::Optional { elem, greedy } => {
                let hs = self.alt_handles(ridx, elem)?;
                let start = self.atn.add_state(Some(ridx), StateKind::BlockStart { end: UNSET });
                self.atn.define_decision(start)?;
                let h = self.block(ridx, start, &hs)?;
                let st = self.atn.state_mut(start)?;
                st.non_greedy = !greedy;
                let i = if *greedy { st.transitions.len() } else { 0 };
                st.add_transition_at(i, Transition::epsilon(h.right));
                Ok(h)
            }
            Elem::Star { elem, greedy } => {
                let hs = self.alt_handles(ridx, elem)?;
                let blk_start = self
                    .atn
                    .add_state(Some(ridx), StateKind::StarBlockStart { end: UNSET });
                if hs.len() > 1 {
                    self.atn.define_decision(blk_start)?;
                }
                let blk = self.block(ridx, blk_start, &hs)?;
                let entry = self.atn.add_state(
                    Some(ridx),
                    StateKind::StarLoopEntry {
                        loop_back: UNSET,
                        precedence_decision: false,
                    },
                );
                self.atn.state_mut(entry)?.non_greedy = !greedy;
                self.atn.define_decision(entry)?;
                let end = self.atn.add_state(Some(ridx), StateKind::LoopEnd { loop_back: UNSET });
                let lb = self.atn.add_state(Some(ridx), StateKind::StarLoopBack);
                if let StateKind::LoopEnd { loop_back } = &mut self.atn.state_mut(end)?.kind {
                    *loop_back = lb;
                }
                if *greedy {
                    self.epsilon(entry, blk_start)?;
                    self.epsilon(entry, end)?;
                } else {
                    self.epsilon(entry, end)?;
                    self.epsilon(entry, blk_start)?;
                }
                self.epsilon(blk.right, lb)?;
                self.epsilon(lb, entry)?;
                Ok(Handle {
                    left: entry,
                    right: end,
                })
            }
            Elem::Plus { elem, greedy } => {
                let hs = self.alt_handles(ridx, elem)?;
                let blk_start = self.atn.add_state(
                    Some(ridx),
                    StateKind::PlusBlockStart {
                        end: UNSET,
                        loop_back: UNSET,
                    },
                );
                if hs.len() > 1 {
                    self.atn.define_decision(blk_start)?;
                }
                let blk = self.block(ridx, blk_start, &hs)?;
                let lb = self.atn.add_state(Some(ridx), StateKind::PlusLoopBack);
                self.atn.state_mut(lb)?.non_greedy = !greedy;
                self.atn.define_decision(lb)?;
                let end = self.atn.add_state(Some(ridx), StateKind::LoopEnd { loop_back: lb });
                self.epsilon(blk.right, lb)?;
                if *greedy {
                    self.epsilon(lb, blk_start)?;
                    self.epsilon(lb, end)?;
                } else {
                    self.epsilon(lb, end)?;
                    self.epsilon(lb, blk_start)?;
                }
                Ok(Handle {
                    left: blk_start,
                    right: end,
                })
            }
            Elem::Pred {
                index,
                ctx_dependent,
            } => self.single(
                ridx,
                Transition::Predicate {
                    target: UNSET,
                    rule: ridx,
                    pred: *index,
                    ctx_dependent: *ctx_dependent,
                },
            ),
            Elem::PrecPred(precedence) => {
                if self.lexer() {
                    return Err(self.not_allowed("a precedence predicate"));
                }
                self.single(
                    ridx,
                    Transition::Precedence {
                        target: UNSET,
                        precedence: *precedence,
                    },
                )
            }
            Elem::Action {
                index,
                ctx_dependent,
            } => {
                let (action, ctx_dependent) = if self.lexer() {
                    let la = LexerAction::Custom {
                        rule: ridx,
                        action: *index,
                    };
                    (self.lexer_actions.insert_full(la).0, false)
                } else {
                    (*index, *ctx_dependent)
                };
                self.single(
                    ridx,
                    Transition::Action {
                        target: UNSET,
                        rule: ridx,
                        action: Some(action),
                        ctx_dependent,
                    },
                )
            }
            Elem::Command(la) => {
                if !self.lexer() {
                    return Err(self.not_allowed("a lexer command"));
                }
                let i = self.lexer_actions.insert_full(*la).0;
                self.single(
                    ridx,
                    Transition::Action {
                        target: UNSET,
                        rule: ridx,
                        action: Some(i),
                        ctx_dependent: false,
                    },
                )
            }
            Elem::Epsilon => {
                let left = self.basic(ridx);
                let right = self.basic(ridx);
                self.epsilon(left, right)?;
                Ok(Handle { left, right })
            }
        }
    }

    fn alt_handles(&mut self, ridx: RIdx, e: &Elem) -> Result<Vec<Handle>, BuildError> {
        let mut hs = Vec::new();
        for alt in e.alternatives() {
            hs.push(self.elem(ridx, alt)?);
        }
        Ok(hs)
    }

    /// Join `start` to each alternative, and each alternative to a new block end state.
    fn block(&mut self, ridx: RIdx, start: StIdx, alts: &[Handle]) -> Result<Handle, BuildError> {
        let end = self
            .atn
            .add_state(Some(ridx), StateKind::BlockEnd { start: UNSET });
        match &mut self.atn.state_mut(start)?.kind {
            StateKind::BlockStart { end: e }
            | StateKind::PlusBlockStart { end: e, .. }
            | StateKind::StarBlockStart { end: e } => *e = end,
            _ => (),
        }
        for h in alts {
            self.epsilon(start, h.left)?;
            self.epsilon(h.right, end)?;
        }
        Ok(Handle { left: start, right: end })
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::{DIdx, TOKEN_EOF};

    fn expr_vocab() -> Vocabulary {
        Vocabulary::new(
            vec![None, None, Some("'*'".to_owned()), Some("'+'".to_owned())],
            vec![
                None,
                Some("INT".to_owned()),
                Some("MUL".to_owned()),
                Some("ADD".to_owned()),
            ],
        )
    }

    #[test]
    fn test_lexer_layout() {
        let g = AtnBuilder::lexer("T")
            .token("A", Elem::lit("ab"))
            .token("B", Elem::lit("abc"))
            .build()
            .unwrap();
        let atn = g.atn();
        assert_eq!(atn.grammar_type(), GrammarType::Lexer);
        assert_eq!(atn.modes_len(), 1);
        assert_eq!(atn.rules_len(), 2);
        assert_eq!(atn.rule_token_type(RIdx(0)), Some(1));
        assert_eq!(atn.rule_token_type(RIdx(1)), Some(2));
        assert_eq!(atn.max_token_type(), 2);
        let ts = atn.mode_start(0).unwrap();
        assert_eq!(atn.state(ts).kind(), StateKind::TokensStart);
        assert_eq!(atn.state(ts).decision(), Some(DIdx(0)));
        assert_eq!(atn.state(ts).transitions().len(), 2);
        assert_eq!(g.vocabulary().literal_name(1), Some("'ab'"));
        assert_eq!(g.vocabulary().symbolic_name(2), Some("B"));
        assert_eq!(g.mode_names(), &["DEFAULT_MODE".to_owned()]);
    }

    #[test]
    fn test_lexer_commands_shared() {
        let g = AtnBuilder::lexer("T")
            .token(
                "WS",
                Elem::seq([Elem::chars(" \t").plus(), Elem::Command(LexerAction::Skip)]),
            )
            .token(
                "NL",
                Elem::seq([Elem::sym('\n'), Elem::Command(LexerAction::Skip)]),
            )
            .mode("STR")
            .token("Q", Elem::seq([Elem::sym('"'), Elem::Command(LexerAction::PopMode)]))
            .build()
            .unwrap();
        assert_eq!(
            g.atn().lexer_actions(),
            &[LexerAction::Skip, LexerAction::PopMode]
        );
        assert_eq!(g.atn().modes_len(), 2);
        let ms = g.atn().mode_start(1).unwrap();
        assert_eq!(g.atn().state(ms).transitions().len(), 1);
    }

    #[test]
    fn test_left_recursion_marks_precedence_decision() {
        let g = AtnBuilder::parser("E", expr_vocab())
            .left_recursive_rule(
                "e",
                vec![Elem::tok("INT")],
                vec![
                    Elem::seq([Elem::PrecPred(2), Elem::lit("*"), Elem::rule_prec("e", 3)]),
                    Elem::seq([Elem::PrecPred(1), Elem::lit("+"), Elem::rule_prec("e", 2)]),
                ],
            )
            .build()
            .unwrap();
        let atn = g.atn();
        assert!(atn.is_left_recursive(RIdx(0)));
        let entries = atn
            .states()
            .filter(|s| {
                matches!(
                    s.kind(),
                    StateKind::StarLoopEntry {
                        precedence_decision: true,
                        ..
                    }
                )
            })
            .count();
        assert_eq!(entries, 1);
        // Every recursive call of `e` has a non-zero precedence, so no return edge is marked as
        // leaving the outermost invocation.
        let stop = atn.state(atn.rule_stop(RIdx(0)));
        assert_eq!(stop.transitions().len(), 2);
        assert!(stop.transitions().iter().all(|t| matches!(
            t,
            Transition::Epsilon {
                outermost_precedence_return: None,
                ..
            }
        )));
    }

    #[test]
    fn test_loops_and_optional() {
        let g = AtnBuilder::parser("E", expr_vocab())
            .rule(
                "s",
                Elem::seq([
                    Elem::tok("INT").star(),
                    Elem::tok("MUL").plus(),
                    Elem::tok("ADD").opt().non_greedy(),
                    Elem::Symbol(TOKEN_EOF),
                ]),
            )
            .build()
            .unwrap();
        let atn = g.atn();
        // star loop entry, plus loop back, optional block
        assert_eq!(atn.decisions_len(), 3);
        let opt = atn.state(atn.decision_state(DIdx(2)));
        assert!(opt.non_greedy());
        assert!(matches!(
            atn.state(opt.transition(0).target()).kind(),
            StateKind::BlockEnd { .. }
        ));
    }

    #[test]
    fn test_errors() {
        assert_eq!(
            AtnBuilder::parser("E", expr_vocab())
                .rule("s", Elem::rule("t"))
                .build()
                .unwrap_err(),
            BuildError::UnknownRule("t".to_owned())
        );
        assert_eq!(
            AtnBuilder::parser("E", expr_vocab())
                .rule("s", Elem::tok("NOPE"))
                .build()
                .unwrap_err(),
            BuildError::UnknownToken("NOPE".to_owned())
        );
        assert_eq!(
            AtnBuilder::parser("E", expr_vocab())
                .rule("s", Elem::Command(LexerAction::Skip))
                .build()
                .unwrap_err(),
            BuildError::NotAllowed("a lexer command", "parser")
        );
        assert_eq!(
            AtnBuilder::lexer("L")
                .token("A", Elem::lit("a"))
                .token("A", Elem::lit("b"))
                .build()
                .unwrap_err(),
            BuildError::DuplicateRule("A".to_owned())
        );
        assert_eq!(AtnBuilder::lexer("L").build().unwrap_err(), BuildError::NoRules);
    }
}
