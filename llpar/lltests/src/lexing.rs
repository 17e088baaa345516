use atngrammar::{AtnBuilder, Elem, GrammarInfo, LexerAction, HIDDEN_CHANNEL, TOKEN_EOF};
use llpar::{
    BufferedTokenStream, CollectingErrorListener, ListTokenSource, ParserDef, TokenStream,
    TokenStreamRewriter,
};
use lllex::LexerDef;

use crate::{calc_defs, calc_lexer};

/// The same grammar after a trip through the `.interp` format.
fn via_interp(g: &GrammarInfo) -> GrammarInfo {
    GrammarInfo::from_interp(g.name(), &g.to_interp().unwrap()).unwrap()
}

/// Both the built and the reloaded forms of `g`.
fn defs(g: GrammarInfo) -> Vec<LexerDef> {
    let reloaded = via_interp(&g);
    vec![LexerDef::new(g).unwrap(), LexerDef::new(reloaded).unwrap()]
}

fn lex(def: &LexerDef, s: &str) -> (Vec<String>, Vec<String>) {
    let errs = CollectingErrorListener::new();
    let mut lexer = def.lexer(s);
    lexer.remove_error_listeners();
    lexer.add_error_listener(Box::new(errs.clone()));
    let toks = lexer.all_tokens().iter().map(|t| t.to_string()).collect();
    (toks, errs.messages())
}

fn ab_abc() -> GrammarInfo {
    AtnBuilder::lexer("AB")
        .token("A", Elem::lit("ab"))
        .token("B", Elem::lit("abc"))
        .build()
        .unwrap()
}

#[test]
fn ababx_recovers_after_x() {
    for def in defs(ab_abc()) {
        let (toks, errs) = lex(&def, "ababx");
        assert_eq!(
            toks,
            vec![
                "[@0,0:1='ab',<1>,1:0]",
                "[@1,2:3='ab',<1>,1:2]",
                "[@2,5:4='<EOF>',<-1>,1:5]"
            ]
        );
        assert_eq!(errs, vec!["line 1:4 token recognition error at: 'x'"]);
    }
}

#[test]
fn longest_match_wins() {
    for def in defs(ab_abc()) {
        let (toks, errs) = lex(&def, "abcx");
        assert_eq!(
            toks,
            vec!["[@0,0:2='abc',<2>,1:0]", "[@1,4:3='<EOF>',<-1>,1:4]"]
        );
        assert_eq!(errs, vec!["line 1:3 token recognition error at: 'x'"]);
    }
}

#[test]
fn equal_length_goes_to_first_rule() {
    let g = AtnBuilder::lexer("KW")
        .token("IF", Elem::lit("if"))
        .token("ID", Elem::range('a', 'z').plus())
        .token(
            "WS",
            Elem::seq([Elem::sym(' '), Elem::Command(LexerAction::Skip)]),
        )
        .build()
        .unwrap();
    for def in defs(g) {
        let mut lexer = def.lexer("if iff i");
        let types = lexer
            .all_tokens()
            .iter()
            .map(|t| t.ttype())
            .collect::<Vec<_>>();
        assert_eq!(types, vec![1, 2, 2, TOKEN_EOF]);
    }
}

#[test]
fn calc_tokens_skip_whitespace() {
    let (lexdef, _) = calc_defs();
    let (toks, errs) = lex(&lexdef, "x = (1+22)\n;");
    assert!(errs.is_empty());
    assert_eq!(
        toks,
        vec![
            "[@0,0:0='x',<2>,1:0]",
            "[@1,2:2='=',<3>,1:2]",
            "[@2,4:4='(',<6>,1:4]",
            "[@3,5:5='1',<1>,1:5]",
            "[@4,6:6='+',<4>,1:6]",
            "[@5,7:8='22',<1>,1:7]",
            "[@6,9:9=')',<7>,1:9]",
            "[@7,11:11=';',<8>,2:0]",
            "[@8,12:11='<EOF>',<-1>,2:1]",
        ]
    );
    let reloaded = LexerDef::new(via_interp(&calc_lexer())).unwrap();
    assert_eq!(lex(&reloaded, "x = (1+22)\n;").0, toks);
}

/// A lexer which keeps whitespace and comments on the hidden channel.
fn hidden_lexer() -> GrammarInfo {
    AtnBuilder::lexer("Hidden")
        .token("ID", Elem::range('a', 'z').plus())
        .token("INT", Elem::range('0', '9').plus())
        .token("EQ", Elem::lit("="))
        .token("SEMI", Elem::lit(";"))
        .token(
            "WS",
            Elem::seq([
                Elem::chars(" \n").plus(),
                Elem::Command(LexerAction::Channel(HIDDEN_CHANNEL)),
            ]),
        )
        .token(
            "COMMENT",
            Elem::seq([
                Elem::sym('#'),
                Elem::not_chars("\n").star(),
                Elem::Command(LexerAction::Channel(HIDDEN_CHANNEL)),
            ]),
        )
        .build()
        .unwrap()
}

#[test]
fn hidden_tokens_reach_the_buffer_not_the_parser() {
    let lg = hidden_lexer();
    let pg = AtnBuilder::parser("S", lg.vocabulary().clone())
        .rule(
            "s",
            Elem::seq([
                Elem::tok("ID"),
                Elem::lit("="),
                Elem::tok("INT"),
                Elem::lit(";"),
                Elem::Symbol(TOKEN_EOF),
            ]),
        )
        .build()
        .unwrap();
    let lexdef = LexerDef::new(lg).unwrap();
    let pdef = ParserDef::new(pg).unwrap();
    let input = "a = 1; # one\n";

    let errs = CollectingErrorListener::new();
    let mut parser = pdef.parser(lexdef.lexer(input));
    parser.core_mut().remove_error_listeners();
    parser.core_mut().add_error_listener(Box::new(errs.clone()));
    let tree = parser.parse(pdef.rule_idx("s").unwrap()).unwrap();
    assert!(errs.is_empty());
    assert_eq!(
        tree.to_string_tree(pdef.grammar().rule_names()),
        "(s a = 1 ; <EOF>)"
    );

    let toks = lexdef.lexer(input).all_tokens();
    let mut buf = BufferedTokenStream::new(ListTokenSource::new(toks));
    buf.fill();
    let hidden = buf
        .hidden_tokens_to_right(5)
        .iter()
        .map(|t| t.text().to_owned())
        .collect::<Vec<_>>();
    assert_eq!(hidden, vec![" ", "# one", "\n"]);
    assert_eq!(buf.text(), input);
}

#[test]
fn rewrite_lexed_tokens() {
    let lexdef = LexerDef::new(hidden_lexer()).unwrap();
    let toks = lexdef.lexer("a = 1;").all_tokens();
    let mut rw = TokenStreamRewriter::new(&toks);
    rw.insert_before(0, "let ");
    rw.replace(4, 4, "42").unwrap();
    assert_eq!(rw.text().unwrap(), "let a = 42;");
    rw.delete_program("default");
    assert_eq!(rw.text().unwrap(), "a = 1;");
}
