use std::sync::Arc;

use atngrammar::{RIdx, StIdx, StateKind, Transition, INVALID_TOKEN_TYPE, MIN_USER_TOKEN_TYPE};

use crate::{
    error::{ParseFailure, RecognitionError},
    parser::{NoActions, ParserActions, ParserCore},
    token::Token,
    tree::{ParseTree, RuleNode},
};

/// Symbols above this are never token types, which bounds the vocabulary `Set`/`NotSet`
/// transitions are matched against.
const MAX_TOKEN_SYMBOL: i32 = 0xFFFF;

/// A parser which runs any rule of a parser ATN directly, walking the ATN state by state. At
/// each decision it asks the prediction engine which alternative to take; syntax errors are
/// handled by the parser's [crate::ErrorStrategy], with error nodes added to the tree.
pub struct ParserInterpreter<'a> {
    core: ParserCore<'a>,
    actions: Box<dyn ParserActions + 'a>,
}

impl<'a> ParserInterpreter<'a> {
    pub fn new(core: ParserCore<'a>) -> Self {
        ParserInterpreter {
            core,
            actions: Box::new(NoActions),
        }
    }

    /// Evaluate the grammar's predicates and execute its actions with `actions`.
    pub fn with_actions(mut self, actions: Box<dyn ParserActions + 'a>) -> Self {
        self.actions = actions;
        self
    }

    pub fn core(&self) -> &ParserCore<'a> {
        &self.core
    }

    pub fn core_mut(&mut self) -> &mut ParserCore<'a> {
        &mut self.core
    }

    pub fn number_of_syntax_errors(&self) -> usize {
        self.core.number_of_syntax_errors()
    }

    /// Parse the input as `rule`, starting from the input's current position. Syntax errors are
    /// reported and recovered from as the error strategy sees fit: a tree is returned unless the
    /// strategy gives up or the parse is cancelled.
    pub fn parse(&mut self, rule: RIdx) -> Result<ParseTree, ParseFailure> {
        let atn = Arc::clone(self.core.atn());
        let start = atn.rule_start(rule);
        let left_recursive = atn.is_left_recursive(rule);
        if left_recursive {
            self.core.enter_recursion_rule(rule, start, 0)?;
        } else {
            self.core.enter_rule(rule, start)?;
        }
        loop {
            let Some(p) = self.core.state() else {
                return Err(ParseFailure::new(RecognitionError::LostState));
            };
            let st = atn.state(p);
            if st.is_rule_stop() {
                let outermost = self
                    .core
                    .context()
                    .map_or(true, |c| c.invoking_state().is_none());
                if outermost {
                    let root = if left_recursive {
                        self.core.unroll_recursion_contexts()
                    } else {
                        self.core.exit_rule()
                    };
                    let root = root.unwrap_or_else(|| RuleNode::new(rule, None, None));
                    return Ok(ParseTree::Rule(root));
                }
                self.visit_rule_stop_state(p);
                continue;
            }
            match self.visit_state(p) {
                Ok(()) => (),
                Err(e @ RecognitionError::Cancelled) => return Err(ParseFailure::new(e)),
                Err(e) => {
                    let r = st.rule().unwrap_or(rule);
                    self.core.set_state(atn.rule_stop(r));
                    self.core.set_exception(e.clone());
                    self.core.report_error(&e);
                    self.recover(&e)?;
                }
            }
        }
    }

    fn visit_state(&mut self, p: StIdx) -> Result<(), RecognitionError> {
        let atn = Arc::clone(self.core.atn());
        let st = atn.state(p);
        let mut alt = 1;
        if let Some(d) = st.decision() {
            if st.transitions().len() > 1 {
                self.core.check_cancelled()?;
                self.core.sync()?;
                alt = self.core.adaptive_predict(d, self.actions.as_mut())?;
            }
        }
        if matches!(st.kind(), StateKind::RuleStart { .. }) {
            self.core.enter_outer_alt(1);
        } else if let Some(r) = st.rule() {
            // The block directly after the rule's start state holds its outer alternatives.
            let outer = atn.state(atn.rule_start(r)).transitions().first().map(|t| t.target());
            if outer == Some(p) {
                self.core.enter_outer_alt(alt);
            }
        }
        let Some(t) = st.transitions().get(alt as usize - 1) else {
            return Err(self.core.input_mismatch());
        };
        match t {
            Transition::Epsilon { target, .. } => {
                if let StateKind::StarLoopEntry {
                    precedence_decision: true,
                    ..
                } = st.kind()
                {
                    if !matches!(atn.state(*target).kind(), StateKind::LoopEnd { .. }) {
                        // Another iteration of a left-recursive rule's suffix loop.
                        if let Some(r) = st.rule() {
                            self.core.push_new_recursion_context(r, atn.rule_start(r));
                        }
                    }
                }
            }
            Transition::Atom { label, .. } => {
                self.core.match_token(*label)?;
            }
            Transition::Range { .. } | Transition::Set { .. } | Transition::NotSet { .. } => {
                let la = self.core.la(1);
                if !t.matches(la, MIN_USER_TOKEN_TYPE, MAX_TOKEN_SYMBOL) {
                    self.core.recover_inline()?;
                }
                self.core.match_wildcard()?;
            }
            Transition::Wildcard { .. } => {
                self.core.match_wildcard()?;
            }
            Transition::Rule {
                target,
                rule,
                precedence,
                ..
            } => {
                if atn.is_left_recursive(*rule) {
                    self.core.enter_recursion_rule(*rule, *target, *precedence)?;
                } else {
                    self.core.enter_rule(*rule, *target)?;
                }
            }
            Transition::Predicate { rule, pred, .. } => {
                if !self.actions.sempred(*rule, *pred) {
                    return Err(self.core.failed_predicate(format!("{}:{}", rule, pred)));
                }
            }
            Transition::Action { rule, action, .. } => {
                if let Some(a) = action {
                    self.actions.action(*rule, *a);
                }
            }
            Transition::Precedence { precedence, .. } => {
                if !self.core.precpred(*precedence) {
                    return Err(self
                        .core
                        .failed_predicate(format!("precpred(_ctx, {})", precedence)));
                }
            }
        }
        self.core.set_state(t.target());
        Ok(())
    }

    fn visit_rule_stop_state(&mut self, p: StIdx) {
        let atn = Arc::clone(self.core.atn());
        let left_recursive = atn
            .state(p)
            .rule()
            .map_or(false, |r| atn.is_left_recursive(r));
        if left_recursive {
            self.core.unroll_recursion_contexts();
        } else {
            self.core.exit_rule();
        }
        if let Some(follow) = self.core.state().and_then(|s| atn.follow_of(s)) {
            self.core.set_state(follow);
        }
    }

    /// Ask the error strategy to recover from `e`. If that didn't consume any input, add an
    /// error node for the offending token so the tree still accounts for it.
    fn recover(&mut self, e: &RecognitionError) -> Result<(), ParseFailure> {
        let i = self.core.input_index();
        self.core.recover(e)?;
        if self.core.input_index() == i {
            let (ttype, offending) = match e {
                RecognitionError::InputMismatch {
                    offending,
                    expected,
                    ..
                } => (
                    expected.min_element().unwrap_or(INVALID_TOKEN_TYPE),
                    offending,
                ),
                RecognitionError::NoViableAlt { offending, .. }
                | RecognitionError::FailedPredicate { offending, .. } => {
                    (INVALID_TOKEN_TYPE, offending)
                }
                RecognitionError::LexerNoViableAlt { .. }
                | RecognitionError::Cancelled
                | RecognitionError::LostState => return Ok(()),
            };
            if self.core.build_parse_trees() {
                let t = Token::conjured(ttype, offending.text(), offending.line(), offending.column());
                self.core.add_error_node(t);
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod test {
    use std::{cell::RefCell, rc::Rc};

    use atngrammar::{AtnBuilder, Elem, GrammarInfo, Vocabulary};
    use proptest::prelude::*;

    use super::*;
    use crate::{
        builder::{ParserDef, RecoveryKind},
        lex_api::{tokens_from_pairs, ListTokenSource},
        listener::{CollectingErrorListener, DiagnosticErrorListener},
        tree::ParseTreeListener,
    };
    use llpredict::{CancellationFlag, PredictionMode};

    const INT: i32 = 1;
    const MUL: i32 = 2;
    const ADD: i32 = 3;
    const SEMI: i32 = 4;
    const ID: i32 = 5;
    const ASSIGN: i32 = 6;

    fn vocab() -> Vocabulary {
        let lit = |s: &str| Some(s.to_owned());
        Vocabulary::new(
            vec![None, None, lit("'*'"), lit("'+'"), lit("';'"), None, lit("'='")],
            vec![
                None,
                lit("INT"),
                lit("MUL"),
                lit("ADD"),
                lit("SEMI"),
                lit("ID"),
                lit("ASSIGN"),
            ],
        )
    }

    // stat : ID '=' e ';' | e ';' ;
    // e : e '*' e | e '+' e | INT ;
    fn stat_grammar() -> GrammarInfo {
        AtnBuilder::parser("Stat", vocab())
            .rule(
                "stat",
                Elem::alt([
                    Elem::seq([Elem::tok("ID"), Elem::lit("="), Elem::rule("e"), Elem::lit(";")]),
                    Elem::seq([Elem::rule("e"), Elem::lit(";")]),
                ]),
            )
            .left_recursive_rule(
                "e",
                vec![Elem::tok("INT")],
                vec![
                    Elem::seq([Elem::PrecPred(2), Elem::lit("*"), Elem::rule_prec("e", 3)]),
                    Elem::seq([Elem::PrecPred(1), Elem::lit("+"), Elem::rule_prec("e", 2)]),
                ],
            )
            .build()
            .unwrap()
    }

    fn parse_with(
        def: &ParserDef,
        toks: &[(i32, &str)],
    ) -> (Result<ParseTree, ParseFailure>, Vec<String>) {
        let errs = CollectingErrorListener::new();
        let mut p = def.parser(ListTokenSource::new(tokens_from_pairs(toks)));
        p.core_mut().remove_error_listeners();
        p.core_mut().add_error_listener(Box::new(errs.clone()));
        let r = p.parse(RIdx(0));
        (r, errs.messages())
    }

    fn tree_string(def: &ParserDef, toks: &[(i32, &str)]) -> (String, Vec<String>) {
        let (r, msgs) = parse_with(def, toks);
        (r.unwrap().to_string_tree(def.grammar().rule_names()), msgs)
    }

    #[test]
    fn test_left_recursive_precedence() {
        let def = ParserDef::new(stat_grammar()).unwrap();
        let (s, errs) = tree_string(
            &def,
            &[
                (ID, "x"),
                (ASSIGN, "="),
                (INT, "1"),
                (ADD, "+"),
                (INT, "2"),
                (MUL, "*"),
                (INT, "3"),
                (SEMI, ";"),
            ],
        );
        assert!(errs.is_empty());
        assert_eq!(s, "(stat x = (e (e 1) + (e (e 2) * (e 3))) ;)");

        let (s, errs) = tree_string(
            &def,
            &[(INT, "1"), (MUL, "*"), (INT, "2"), (ADD, "+"), (INT, "3"), (SEMI, ";")],
        );
        assert!(errs.is_empty());
        assert_eq!(s, "(stat (e (e (e 1) * (e 2)) + (e 3)) ;)");
    }

    #[test]
    fn test_outer_alt_recorded() {
        let def = ParserDef::new(stat_grammar()).unwrap();
        let (r, _) = parse_with(&def, &[(INT, "1"), (SEMI, ";")]);
        let t = r.unwrap();
        let root = t.as_rule().unwrap();
        assert_eq!(root.alt(), 2);
        assert_eq!(root.start().map(|t| t.text()), Some("1"));
        assert_eq!(root.stop().map(|t| t.text()), Some(";"));
        assert_eq!(t.find_all_rule_nodes(RIdx(1)).len(), 1);
    }

    #[test]
    fn test_missing_token() {
        let def = ParserDef::new(stat_grammar()).unwrap();
        let (s, errs) = tree_string(
            &def,
            &[(ID, "x"), (ASSIGN, "="), (INT, "1"), (ADD, "+"), (INT, "2")],
        );
        assert_eq!(errs, vec!["line 1:5 missing ';' at '<EOF>'".to_owned()]);
        assert_eq!(s, "(stat x = (e (e 1) + (e 2)) <missing ';'>)");
    }

    #[test]
    fn test_extraneous_token() {
        let def = ParserDef::new(stat_grammar()).unwrap();
        let (r, errs) = parse_with(
            &def,
            &[(ID, "x"), (ASSIGN, "="), (ASSIGN, "="), (INT, "1"), (SEMI, ";")],
        );
        assert_eq!(errs, vec!["line 1:2 extraneous input '=' expecting INT".to_owned()]);
        let t = r.unwrap();
        assert_eq!(t.to_string_tree(def.grammar().rule_names()), "(stat x = (e = 1) ;)");
        assert!(matches!(t.children()[2].children()[0], ParseTree::Error(_)));
    }

    #[test]
    fn test_missing_token_after_prediction() {
        // Only the first alternative can start with ID, so it is predicted and the absent '='
        // is conjured up.
        let def = ParserDef::new(stat_grammar()).unwrap();
        let (s, errs) = tree_string(
            &def,
            &[(ID, "x"), (INT, "1"), (ADD, "+"), (INT, "2"), (SEMI, ";")],
        );
        assert_eq!(errs, vec!["line 1:1 missing '=' at '1'".to_owned()]);
        assert_eq!(s, "(stat x <missing '='> (e (e 1) + (e 2)) ;)");
    }

    #[test]
    fn test_no_viable_alt() {
        // Both alternatives survive `x =` and neither accepts `;`.
        let g = AtnBuilder::parser("Assign", vocab())
            .rule(
                "s",
                Elem::alt([
                    Elem::seq([Elem::tok("ID"), Elem::lit("="), Elem::tok("INT"), Elem::lit(";")]),
                    Elem::seq([Elem::tok("ID"), Elem::lit("="), Elem::tok("ID"), Elem::lit(";")]),
                ]),
            )
            .build()
            .unwrap();
        let def = ParserDef::new(g).unwrap();
        let (r, errs) = parse_with(&def, &[(ID, "x"), (ASSIGN, "="), (SEMI, ";")]);
        assert_eq!(errs, vec!["line 1:2 no viable alternative at input 'x=;'".to_owned()]);
        assert!(r.is_ok());
    }

    #[test]
    fn test_mismatch_at_decision() {
        let def = ParserDef::new(stat_grammar()).unwrap();
        let (s, errs) = tree_string(&def, &[(SEMI, ";")]);
        assert_eq!(errs, vec!["line 1:0 mismatched input ';' expecting {INT, ID}".to_owned()]);
        assert_eq!(s, "(stat ;)");
    }

    #[test]
    fn test_bail() {
        let def = ParserDef::new(stat_grammar())
            .unwrap()
            .recoverer(RecoveryKind::Bail);
        let (r, errs) = parse_with(
            &def,
            &[(ID, "x"), (ASSIGN, "="), (INT, "1"), (INT, "2"), (SEMI, ";")],
        );
        assert_eq!(errs, vec!["line 1:3 mismatched input '2' expecting ';'".to_owned()]);
        match r {
            Err(ParseFailure {
                error: RecognitionError::InputMismatch { offending, .. },
            }) => assert_eq!(offending.text(), "2"),
            _ => panic!("expected an input mismatch"),
        }
    }

    #[test]
    fn test_cancelled() {
        let def = ParserDef::new(stat_grammar()).unwrap();
        let flag = CancellationFlag::new();
        flag.cancel();
        let mut p = def.parser(ListTokenSource::new(tokens_from_pairs(&[(INT, "1"), (SEMI, ";")])));
        p.core_mut().set_cancellation_flag(flag.clone());
        assert!(p.parse(RIdx(0)).unwrap_err().is_cancelled());
        assert_eq!(p.number_of_syntax_errors(), 0);
    }

    struct Events(Rc<RefCell<Vec<String>>>, Vec<String>);

    impl ParseTreeListener for Events {
        fn enter_every_rule(&mut self, node: &RuleNode) {
            self.0
                .borrow_mut()
                .push(format!("enter {}", self.1[usize::from(node.rule())]));
        }

        fn exit_every_rule(&mut self, node: &RuleNode) {
            self.0
                .borrow_mut()
                .push(format!("exit {}", self.1[usize::from(node.rule())]));
        }

        fn visit_terminal(&mut self, token: &Token) {
            self.0.borrow_mut().push(token.text().to_owned());
        }
    }

    #[test]
    fn test_parse_listener() {
        let def = ParserDef::new(stat_grammar()).unwrap();
        let evs = Rc::new(RefCell::new(Vec::new()));
        let mut p = def.parser(ListTokenSource::new(tokens_from_pairs(&[
            (ID, "x"),
            (ASSIGN, "="),
            (INT, "1"),
            (SEMI, ";"),
        ])));
        p.core_mut().add_parse_listener(Box::new(Events(
            Rc::clone(&evs),
            def.grammar().rule_names().to_vec(),
        )));
        p.parse(RIdx(0)).unwrap();
        assert_eq!(
            *evs.borrow(),
            ["enter stat", "x", "=", "enter e", "1", "exit e", ";", "exit stat"]
        );
    }

    #[test]
    fn test_no_trees() {
        let def = ParserDef::new(stat_grammar())
            .unwrap()
            .build_parse_trees(false);
        let (r, errs) = parse_with(&def, &[(INT, "1"), (ADD, "+"), (INT, "2"), (SEMI, ";")]);
        assert!(errs.is_empty());
        assert!(r.unwrap().children().is_empty());
    }

    struct Pred(bool);

    impl ParserActions for Pred {
        fn sempred(&mut self, _rule: RIdx, _pred: usize) -> bool {
            self.0
        }
    }

    #[test]
    fn test_predicates_select_alternative() {
        // s : {p}? ID | ID ;
        let g = AtnBuilder::parser("P", vocab())
            .rule(
                "s",
                Elem::alt([Elem::seq([Elem::pred(0), Elem::tok("ID")]), Elem::tok("ID")]),
            )
            .build()
            .unwrap();
        let def = ParserDef::new(g).unwrap();
        for (p, alt) in [(false, 2), (true, 1)] {
            let mut parser = def
                .parser(ListTokenSource::new(tokens_from_pairs(&[(ID, "x")])))
                .with_actions(Box::new(Pred(p)));
            parser.core_mut().remove_error_listeners();
            let t = parser.parse(RIdx(0)).unwrap();
            assert_eq!(t.as_rule().unwrap().alt(), alt);
            assert_eq!(parser.number_of_syntax_errors(), 0);
        }
    }

    #[test]
    fn test_exact_ambiguity_reported() {
        // s : ID | ID ;
        let g = AtnBuilder::parser("A", vocab())
            .rule("s", Elem::alt([Elem::tok("ID"), Elem::tok("ID")]))
            .build()
            .unwrap();
        let def = ParserDef::new(g)
            .unwrap()
            .prediction_mode(PredictionMode::LlExactAmbigDetection);
        let diag = DiagnosticErrorListener::new(true);
        let mut p = def.parser(ListTokenSource::new(tokens_from_pairs(&[(ID, "x")])));
        p.core_mut().remove_error_listeners();
        p.core_mut().add_error_listener(Box::new(diag.clone()));
        let t = p.parse(RIdx(0)).unwrap();
        assert_eq!(t.as_rule().unwrap().alt(), 1);
        assert!(diag
            .reports()
            .iter()
            .any(|r| r.starts_with("reportAmbiguity d=0 (s): ambigAlts={1, 2}")));
    }

    fn expr_tokens(terms: &[(u32, bool)]) -> Vec<(i32, String)> {
        let mut toks = Vec::new();
        for (i, (n, mul)) in terms.iter().enumerate() {
            if i > 0 {
                toks.push(if *mul { (MUL, "*".to_owned()) } else { (ADD, "+".to_owned()) });
            }
            toks.push((INT, n.to_string()));
        }
        toks.push((SEMI, ";".to_owned()));
        toks
    }

    proptest! {
        #[test]
        fn valid_expressions_parse_cleanly(terms in prop::collection::vec((0..1000u32, any::<bool>()), 1..12)) {
            let def = ParserDef::new(stat_grammar()).unwrap();
            let owned = expr_tokens(&terms);
            let toks = owned.iter().map(|(t, s)| (*t, s.as_str())).collect::<Vec<_>>();
            let (r, errs) = parse_with(&def, &toks);
            prop_assert!(errs.is_empty());
            let t = r.unwrap();
            let input = owned.iter().map(|(_, s)| s.as_str()).collect::<String>();
            prop_assert_eq!(t.text(), input);
            // A warm cache parses identically.
            let (s2, _) = tree_string(&def, &toks);
            prop_assert_eq!(t.to_string_tree(def.grammar().rule_names()), s2);
        }
    }
}
