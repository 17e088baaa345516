use atngrammar::{AtnBuilder, Elem, GrammarInfo, RIdx};
use llpar::{CollectingErrorListener, ParserDef, PredictionMode, RecoveryKind};
use lllex::LexerDef;
use proptest::prelude::*;

use crate::{calc_defs, calc_lexer, calc_parser, parse_calc, Outcome};

#[test]
fn valid_program() {
    let (lexdef, pdef) = calc_defs();
    let o = parse_calc(&lexdef, &pdef, "x = 1 + 2 * 3;\n(4);");
    assert!(o.errors.is_empty());
    assert_eq!(
        o.tree,
        "(prog (stat x = (e (e 1) + (e (e 2) * (e 3))) ;) (stat (e ( (e 4) )) ;) <EOF>)"
    );
    assert_eq!(o.leaves, "x=1+2*3;(4);");
}

#[test]
fn identifier_starts_either_statement() {
    // Telling the alternatives of `stat` apart takes two tokens of lookahead.
    let (lexdef, pdef) = calc_defs();
    let o = parse_calc(&lexdef, &pdef, "x;y=x*x;");
    assert!(o.errors.is_empty());
    assert_eq!(
        o.tree,
        "(prog (stat (e x) ;) (stat y = (e (e x) * (e x)) ;) <EOF>)"
    );
}

#[test]
fn single_bad_token_is_reported_once() {
    let (lexdef, pdef) = calc_defs();
    let o = parse_calc(&lexdef, &pdef, "x = 1 2;\ny = 3;\n");
    assert_eq!(o.errors, vec!["line 1:6 extraneous input '2' expecting ';'"]);
    // The rest of the input still parses, and the bad token is kept in the tree.
    assert_eq!(
        o.tree,
        "(prog (stat x = (e 1) 2 ;) (stat y = (e 3) ;) <EOF>)"
    );
    assert_eq!(o.leaves, "x=12;y=3;");
}

#[test]
fn missing_token_is_conjured() {
    let (lexdef, pdef) = calc_defs();
    let o = parse_calc(&lexdef, &pdef, "x = 1\ny = 2;");
    assert_eq!(o.errors, vec!["line 2:0 missing ';' at 'y'"]);
    assert_eq!(
        o.tree,
        "(prog (stat x = (e 1) <missing ';'>) (stat y = (e 2) ;) <EOF>)"
    );
}

#[test]
fn lexer_and_parser_errors_together() {
    let (lexdef, pdef) = calc_defs();
    let o = parse_calc(&lexdef, &pdef, "x = 1 ? ;");
    assert_eq!(o.errors, vec!["line 1:6 token recognition error at: '?'"]);
    assert_eq!(o.tree, "(prog (stat x = (e 1) ;) <EOF>)");
}

#[test]
fn reloaded_grammars_parse_identically() {
    let lg = calc_lexer();
    let pg = calc_parser(&lg);
    let reload = |g: &GrammarInfo| GrammarInfo::from_interp(g.name(), &g.to_interp().unwrap()).unwrap();
    let built = (
        LexerDef::new(lg.clone()).unwrap(),
        ParserDef::new(pg.clone()).unwrap(),
    );
    let reloaded = (
        LexerDef::new(reload(&lg)).unwrap(),
        ParserDef::new(reload(&pg)).unwrap(),
    );
    for input in ["a = (1 + b) * 2; c;", "a = 1 2;", "(;"] {
        assert_eq!(
            parse_calc(&built.0, &built.1, input),
            parse_calc(&reloaded.0, &reloaded.1, input)
        );
    }
}

#[test]
fn bail_stops_at_first_error() {
    let (lexdef, pdef) = calc_defs();
    let pdef = pdef.recoverer(RecoveryKind::Bail);
    let errs = CollectingErrorListener::new();
    let mut parser = pdef.parser(lexdef.lexer("x = 1 2; y = 3;"));
    parser.core_mut().remove_error_listeners();
    parser.core_mut().add_error_listener(Box::new(errs.clone()));
    let e = parser.parse(pdef.rule_idx("prog").unwrap()).unwrap_err();
    assert_eq!(e.error.offending_token().map(|t| t.text()), Some("2"));
    assert_eq!(errs.messages(), vec!["line 1:6 mismatched input '2' expecting ';'"]);
}

/// `s : ID INT | ID INT ;`, whose alternatives can never be told apart.
fn twin_alts() -> ParserDef {
    let lg = calc_lexer();
    let g = AtnBuilder::parser("Twin", lg.vocabulary().clone())
        .rule(
            "s",
            Elem::alt([
                Elem::seq([Elem::tok("ID"), Elem::tok("INT")]),
                Elem::seq([Elem::tok("ID"), Elem::tok("INT")]),
            ]),
        )
        .build()
        .unwrap();
    ParserDef::new(g).unwrap()
}

#[test]
fn ambiguity_resolves_to_lowest_alt() {
    let lexdef = LexerDef::new(calc_lexer()).unwrap();
    for mode in [
        PredictionMode::Sll,
        PredictionMode::Ll,
        PredictionMode::LlExactAmbigDetection,
    ] {
        let pdef = twin_alts().prediction_mode(mode);
        for _ in 0..2 {
            let mut parser = pdef.parser(lexdef.lexer("x 1"));
            parser.core_mut().remove_error_listeners();
            let t = parser.parse(RIdx(0)).unwrap();
            assert_eq!(t.as_rule().unwrap().alt(), 1);
            assert_eq!(t.to_string_tree(pdef.grammar().rule_names()), "(s x 1)");
            assert_eq!(parser.number_of_syntax_errors(), 0);
        }
    }
}

/// Random statements, some of which are not valid.
fn statements() -> impl Strategy<Value = String> {
    let tok = prop::sample::select(vec!["x", "y", "1", "42", "=", "+", "*", "(", ")", ";"]);
    prop::collection::vec((tok, prop::bool::ANY), 0..30).prop_map(|v| {
        let mut s = String::new();
        for (t, space) in v {
            s.push_str(t);
            if space {
                s.push(' ');
            }
        }
        s
    })
}

/// Valid programs, built from valid expressions.
fn programs() -> impl Strategy<Value = String> {
    let leaf = prop::sample::select(vec!["x", "y", "0", "17"]).prop_map(|s| s.to_owned());
    let expr = leaf.prop_recursive(4, 24, 2, |inner| {
        prop_oneof![
            (inner.clone(), inner.clone()).prop_map(|(a, b)| format!("{} + {}", a, b)),
            (inner.clone(), inner.clone()).prop_map(|(a, b)| format!("{}*{}", a, b)),
            inner.prop_map(|a| format!("( {})", a)),
        ]
    });
    prop::collection::vec((expr, prop::bool::ANY), 1..5).prop_map(|v| {
        v.into_iter()
            .map(|(e, assign)| if assign { format!("z = {};\n", e) } else { format!("{};\n", e) })
            .collect()
    })
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn cold_warm_and_cleared_caches_agree(input in statements()) {
        let (lexdef, pdef) = calc_defs();
        let cold = parse_calc(&lexdef, &pdef, &input);
        let warm = parse_calc(&lexdef, &pdef, &input);
        lexdef.clear_dfa();
        pdef.clear_dfa();
        let cleared = parse_calc(&lexdef, &pdef, &input);
        // A warm cache from other inputs makes no difference either.
        let (lexdef2, pdef2) = calc_defs();
        parse_calc(&lexdef2, &pdef2, "a = (1 + 2) * b; c; (d;");
        let other = parse_calc(&lexdef2, &pdef2, &input);
        prop_assert_eq!(&cold, &warm);
        prop_assert_eq!(&cold, &cleared);
        prop_assert_eq!(&cold, &other);
    }

    #[test]
    fn leaves_reconstruct_unskipped_input(input in programs()) {
        let (lexdef, pdef) = calc_defs();
        let Outcome { errors, leaves, .. } = parse_calc(&lexdef, &pdef, &input);
        prop_assert!(errors.is_empty(), "{:?}", errors);
        let expected = input.chars().filter(|c| !c.is_whitespace()).collect::<String>();
        prop_assert_eq!(leaves, expected);
    }
}
