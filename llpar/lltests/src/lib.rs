//! Scenarios which exercise lexers and parsers together. The grammars here are built in code
//! and, for some tests, round-tripped through the `.interp` format.

use atngrammar::{AtnBuilder, Elem, GrammarInfo, LexerAction, TOKEN_EOF};
use llpar::{CollectingErrorListener, ParseTree, ParserDef};
use lllex::LexerDef;

#[cfg(test)]
mod calc;
#[cfg(test)]
mod concurrency;
#[cfg(test)]
mod lexing;

/// A lexer for a small calculator language:
///
/// ```text
///   INT : [0-9]+ ;  ID : [a-z]+ ;  ASSIGN : '=' ;  PLUS : '+' ;  STAR : '*' ;
///   LP : '(' ;  RP : ')' ;  SEMI : ';' ;  WS : [ \t\r\n]+ -> skip ;
/// ```
pub fn calc_lexer() -> GrammarInfo {
    AtnBuilder::lexer("CalcLexer")
        .token("INT", Elem::range('0', '9').plus())
        .token("ID", Elem::range('a', 'z').plus())
        .token("ASSIGN", Elem::lit("="))
        .token("PLUS", Elem::lit("+"))
        .token("STAR", Elem::lit("*"))
        .token("LP", Elem::lit("("))
        .token("RP", Elem::lit(")"))
        .token("SEMI", Elem::lit(";"))
        .token(
            "WS",
            Elem::seq([Elem::chars(" \t\r\n").plus(), Elem::Command(LexerAction::Skip)]),
        )
        .build()
        .unwrap()
}

/// The parser for [calc_lexer]'s tokens:
///
/// ```text
///   prog : stat+ EOF ;
///   stat : ID '=' e ';' | e ';' ;
///   e : e '*' e | e '+' e | INT | ID | '(' e ')' ;
/// ```
pub fn calc_parser(lexer: &GrammarInfo) -> GrammarInfo {
    AtnBuilder::parser("CalcParser", lexer.vocabulary().clone())
        .rule(
            "prog",
            Elem::seq([Elem::rule("stat").plus(), Elem::Symbol(TOKEN_EOF)]),
        )
        .rule(
            "stat",
            Elem::alt([
                Elem::seq([Elem::tok("ID"), Elem::lit("="), Elem::rule("e"), Elem::lit(";")]),
                Elem::seq([Elem::rule("e"), Elem::lit(";")]),
            ]),
        )
        .left_recursive_rule(
            "e",
            vec![
                Elem::tok("INT"),
                Elem::tok("ID"),
                Elem::seq([Elem::lit("("), Elem::rule("e"), Elem::lit(")")]),
            ],
            vec![
                Elem::seq([Elem::PrecPred(2), Elem::lit("*"), Elem::rule_prec("e", 3)]),
                Elem::seq([Elem::PrecPred(1), Elem::lit("+"), Elem::rule_prec("e", 2)]),
            ],
        )
        .build()
        .unwrap()
}

pub fn calc_defs() -> (LexerDef, ParserDef) {
    let lg = calc_lexer();
    let pg = calc_parser(&lg);
    (LexerDef::new(lg).unwrap(), ParserDef::new(pg).unwrap())
}

/// The result of lexing and parsing one input.
#[derive(Debug, Eq, PartialEq)]
pub struct Outcome {
    pub tree: String,
    /// Lexer errors first, then parser errors.
    pub errors: Vec<String>,
    /// The text of the tree's leaves, excluding the end of file token.
    pub leaves: String,
}

/// Lex and parse `input` as a `prog`, collecting errors rather than printing them.
pub fn parse_calc(lexdef: &LexerDef, pdef: &ParserDef, input: &str) -> Outcome {
    let lex_errs = CollectingErrorListener::new();
    let parse_errs = CollectingErrorListener::new();
    let mut lexer = lexdef.lexer(input);
    lexer.remove_error_listeners();
    lexer.add_error_listener(Box::new(lex_errs.clone()));
    let mut parser = pdef.parser(lexer);
    parser.core_mut().remove_error_listeners();
    parser.core_mut().add_error_listener(Box::new(parse_errs.clone()));
    let rule = pdef.rule_idx("prog").unwrap();
    let tree = parser.parse(rule).unwrap();
    let mut errors = lex_errs.messages();
    errors.extend(parse_errs.messages());
    Outcome {
        tree: tree.to_string_tree(pdef.grammar().rule_names()),
        errors,
        leaves: leaf_text(&tree),
    }
}

fn leaf_text(tree: &ParseTree) -> String {
    tree.leaves()
        .filter_map(|n| n.token())
        .filter(|t| !t.is_eof())
        .map(|t| t.text())
        .collect()
}
