use std::sync::Arc;

use atngrammar::{
    GrammarInfo, GrammarType, Interval, LexerAction, RIdx, Span, DEFAULT_CHANNEL,
    INVALID_TOKEN_TYPE, TOKEN_EOF,
};
use llpar::{
    escape_ws, ConsoleErrorListener, ErrorListener, RecognitionError, Token, TokenSource,
};
use llpredict::LexerActionExecutor;
use thiserror::Error;
use tracing::{debug, trace, warn};

use crate::{
    char_stream::{CharStream, InputStream},
    simulator::{LexerAtnSimulator, LexerPosition, LinePos},
};

/// The token type of a match which `-> skip` discards.
const SKIP: i32 = -3;
/// The token type of a match which `-> more` joins onto the next match.
const MORE: i32 = -2;

#[derive(Debug, Error, Eq, PartialEq)]
pub enum LexerDefError {
    #[error("grammar '{0}' is not a lexer grammar")]
    NotALexer(String),
}

/// The user code embedded in a lexer grammar: semantic predicates (`{...}?`) and custom actions
/// (`{...}`). Both are identified by the index of the rule they appear in and their own index
/// within the grammar.
pub trait LexerActions {
    /// Evaluate predicate `pred` of `rule`, having matched `pos.text` of the current token so
    /// far.
    fn sempred(&mut self, _rule: RIdx, _pred: usize, _pos: &LexerPosition) -> bool {
        true
    }

    /// Execute custom action `action` of `rule` against the token about to be emitted. The
    /// token's type, channel and text may be changed.
    fn action(&mut self, _rule: RIdx, _action: usize, _token: &mut PendingToken) {}
}

/// A lexer grammar without predicates or custom actions.
#[derive(Clone, Copy, Debug, Default)]
pub struct NoLexerActions;

impl LexerActions for NoLexerActions {}

/// The token a lexer is in the process of emitting, as seen by custom actions.
#[derive(Clone, Debug)]
pub struct PendingToken {
    pub ttype: i32,
    pub channel: usize,
    /// If set, the token's text; otherwise the token's text is the input it matched.
    pub text: Option<String>,
    pub start_index: usize,
    /// The input position at which the action appears in the rule.
    pub index: usize,
    pub line: usize,
    pub column: usize,
    /// The input matched from the start of the token up to `index`.
    pub matched: String,
}

/// A lexer definition: a lexer grammar and the DFA caches shared by every [Lexer] created from
/// it (and from its clones), including lexers running on other threads.
#[derive(Clone)]
pub struct LexerDef {
    grammar: Arc<GrammarInfo>,
    sim: LexerAtnSimulator,
}

impl LexerDef {
    pub fn new(grammar: GrammarInfo) -> Result<Self, LexerDefError> {
        if grammar.atn().grammar_type() != GrammarType::Lexer {
            return Err(LexerDefError::NotALexer(grammar.name().to_owned()));
        }
        let sim = LexerAtnSimulator::new(Arc::clone(grammar.atn()));
        Ok(LexerDef {
            grammar: Arc::new(grammar),
            sim,
        })
    }

    pub fn grammar(&self) -> &GrammarInfo {
        &self.grammar
    }

    pub fn simulator(&self) -> &LexerAtnSimulator {
        &self.sim
    }

    /// Throw away the DFA caches. Results of subsequent lexes are unchanged.
    pub fn clear_dfa(&self) {
        self.sim.clear_dfa()
    }

    /// Create a lexer for the string `s`.
    pub fn lexer<'a>(&self, s: &str) -> Lexer<'a, InputStream> {
        self.lexer_for(InputStream::new(s))
    }

    /// Create a lexer reading from `input`.
    pub fn lexer_for<'a, C: CharStream>(&self, input: C) -> Lexer<'a, C> {
        Lexer {
            grammar: Arc::clone(&self.grammar),
            sim: self.sim.clone(),
            input,
            actions: Box::new(NoLexerActions),
            listeners: vec![Box::new(ConsoleErrorListener)],
            pos: LinePos::default(),
            mode: 0,
            mode_stack: Vec::new(),
            hit_eof: false,
            errors: 0,
        }
    }
}

/// A lexer: splits a [CharStream] into [Token]s using the longest match of the current mode's
/// token rules.
pub struct Lexer<'a, C> {
    grammar: Arc<GrammarInfo>,
    sim: LexerAtnSimulator,
    input: C,
    actions: Box<dyn LexerActions + 'a>,
    listeners: Vec<Box<dyn ErrorListener + 'a>>,
    pos: LinePos,
    mode: usize,
    mode_stack: Vec<usize>,
    hit_eof: bool,
    errors: usize,
}

/// The state of the token being built by [Lexer::next_token].
struct Pending {
    start_index: usize,
    start: LinePos,
    ttype: i32,
    channel: usize,
    text: Option<String>,
}

impl<'a, C: CharStream> Lexer<'a, C> {
    pub fn grammar(&self) -> &GrammarInfo {
        &self.grammar
    }

    pub fn set_actions(&mut self, actions: Box<dyn LexerActions + 'a>) {
        self.actions = actions;
    }

    pub fn add_error_listener(&mut self, l: Box<dyn ErrorListener + 'a>) {
        self.listeners.push(l);
    }

    pub fn remove_error_listeners(&mut self) {
        self.listeners.clear();
    }

    pub fn input(&self) -> &C {
        &self.input
    }

    /// The line (from 1) of the next character to be lexed.
    pub fn line(&self) -> usize {
        self.pos.line
    }

    /// The column (from 0) of the next character to be lexed.
    pub fn column(&self) -> usize {
        self.pos.column
    }

    pub fn mode(&self) -> usize {
        self.mode
    }

    pub fn set_mode(&mut self, mode: usize) {
        self.mode = mode;
    }

    pub fn push_mode(&mut self, mode: usize) {
        trace!(from = self.mode, to = mode, "push mode");
        self.mode_stack.push(self.mode);
        self.mode = mode;
    }

    /// Return to the mode on top of the mode stack. Popping an empty stack leaves the mode
    /// unchanged.
    pub fn pop_mode(&mut self) -> Option<usize> {
        match self.mode_stack.pop() {
            Some(m) => {
                trace!(from = self.mode, to = m, "pop mode");
                self.mode = m;
                Some(m)
            }
            None => {
                warn!(mode = self.mode, "pop of empty mode stack");
                None
            }
        }
    }

    /// How many token recognition errors have been reported so far.
    pub fn number_of_syntax_errors(&self) -> usize {
        self.errors
    }

    /// Lex the rest of the input, returning every token including the final end of file token.
    /// Tokens are numbered from 0 in the order returned.
    pub fn all_tokens(&mut self) -> Vec<Token> {
        let mut toks = Vec::new();
        loop {
            let mut t = self.next_token();
            t.set_token_index(toks.len());
            let eof = t.is_eof();
            toks.push(t);
            if eof {
                return toks;
            }
        }
    }

    /// Return the next token. At the end of the input this is an end of file token, and keeps
    /// being so however many more times it's called.
    pub fn next_token(&mut self) -> Token {
        'outer: loop {
            if self.hit_eof {
                return self.eof_token();
            }
            let mut pending = Pending {
                start_index: self.input.index(),
                start: self.pos,
                ttype: INVALID_TOKEN_TYPE,
                channel: DEFAULT_CHANNEL,
                text: None,
            };
            loop {
                pending.ttype = INVALID_TOKEN_TYPE;
                let ttype = match self.sim.match_token(
                    &mut self.input,
                    self.mode,
                    &mut self.pos,
                    &mut *self.actions,
                ) {
                    Some(m) => {
                        if let Some(e) = &m.actions {
                            self.execute(e, &mut pending);
                        }
                        m.ttype
                    }
                    None => {
                        self.report_error(&pending);
                        self.recover();
                        SKIP
                    }
                };
                if self.input.la(1) == TOKEN_EOF {
                    self.hit_eof = true;
                }
                if pending.ttype == INVALID_TOKEN_TYPE {
                    pending.ttype = ttype;
                }
                match pending.ttype {
                    SKIP => continue 'outer,
                    MORE => continue,
                    _ => break,
                }
            }
            return self.emit(pending);
        }
    }

    fn emit(&self, pending: Pending) -> Token {
        let stop = self.input.index();
        if pending.ttype == TOKEN_EOF {
            return Token::eof(stop, pending.start.line, pending.start.column);
        }
        let text = match pending.text {
            Some(t) => t,
            None => self.text_between(pending.start_index, stop),
        };
        trace!(ttype = pending.ttype, text = %text, "emit");
        Token::new(
            pending.ttype,
            &text,
            Span::new(pending.start_index, stop),
            pending.start.line,
            pending.start.column,
        )
        .with_channel(pending.channel)
    }

    fn eof_token(&self) -> Token {
        Token::eof(self.input.index(), self.pos.line, self.pos.column)
    }

    /// The input from `start` up to, but excluding, `stop`.
    fn text_between(&self, start: usize, stop: usize) -> String {
        self.input
            .text(Interval::new(start as i32, stop as i32 - 1))
    }

    /// Apply the lexer actions of a match. Custom actions which appear part way through a rule
    /// see the input as it was at that point; every other action sees the whole match.
    fn execute(&mut self, e: &LexerActionExecutor, pending: &mut Pending) {
        let stop = self.input.index();
        for pa in e.actions() {
            match pa.action {
                LexerAction::Skip => pending.ttype = SKIP,
                LexerAction::More => pending.ttype = MORE,
                LexerAction::Type(t) => pending.ttype = t,
                LexerAction::Channel(c) => pending.channel = c,
                LexerAction::Mode(m) => self.set_mode(m),
                LexerAction::PushMode(m) => self.push_mode(m),
                LexerAction::PopMode => {
                    self.pop_mode();
                }
                LexerAction::Custom { rule, action } => {
                    let index = pa
                        .offset
                        .map(|o| (pending.start_index + o).min(stop))
                        .unwrap_or(stop);
                    let mut tok = PendingToken {
                        ttype: pending.ttype,
                        channel: pending.channel,
                        text: pending.text.take(),
                        start_index: pending.start_index,
                        index,
                        line: self.pos.line,
                        column: self.pos.column,
                        matched: self.text_between(pending.start_index, index),
                    };
                    self.actions.action(rule, action, &mut tok);
                    pending.ttype = tok.ttype;
                    pending.channel = tok.channel;
                    pending.text = tok.text;
                }
            }
        }
    }

    fn report_error(&mut self, pending: &Pending) {
        let index = self.input.index();
        let text = self
            .input
            .text(Interval::new(pending.start_index as i32, index as i32));
        let msg = format!("token recognition error at: '{}'", escape_ws(&text));
        debug!(
            line = pending.start.line,
            column = pending.start.column,
            "{}",
            msg
        );
        self.errors += 1;
        let err = RecognitionError::LexerNoViableAlt {
            start_index: pending.start_index,
            text,
            line: pending.start.line,
            column: pending.start.column,
        };
        for l in self.listeners.iter_mut() {
            l.syntax_error(
                None,
                pending.start.line,
                pending.start.column,
                &msg,
                Some(&err),
            );
        }
    }

    /// Skip the character at which matching failed.
    fn recover(&mut self) {
        if self.input.la(1) != TOKEN_EOF {
            self.sim.consume(&mut self.input, &mut self.pos);
        }
    }
}

impl<'a, C: CharStream> TokenSource for Lexer<'a, C> {
    fn next_token(&mut self) -> Token {
        Lexer::next_token(self)
    }

    fn source_name(&self) -> &str {
        self.input.source_name()
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use atngrammar::{AtnBuilder, Elem, HIDDEN_CHANNEL};
    use llpar::CollectingErrorListener;
    use proptest::prelude::*;

    fn lex(def: &LexerDef, s: &str) -> (Vec<Token>, Vec<String>) {
        let errs = CollectingErrorListener::new();
        let mut lexer = def.lexer(s);
        lexer.remove_error_listeners();
        lexer.add_error_listener(Box::new(errs.clone()));
        (lexer.all_tokens(), errs.messages())
    }

    fn render(toks: &[Token]) -> Vec<String> {
        toks.iter().map(|t| t.to_string()).collect()
    }

    fn ab_abc() -> LexerDef {
        let g = AtnBuilder::lexer("L")
            .token("A", Elem::lit("ab"))
            .token("B", Elem::lit("abc"))
            .build()
            .unwrap();
        LexerDef::new(g).unwrap()
    }

    #[test]
    fn test_rejects_parser() {
        let g = AtnBuilder::parser("P", atngrammar::Vocabulary::new(vec![], vec![]))
            .rule("s", Elem::Epsilon)
            .build()
            .unwrap();
        assert_eq!(
            LexerDef::new(g).err(),
            Some(LexerDefError::NotALexer("P".to_owned()))
        );
    }

    #[test]
    fn test_error_recovery() {
        let def = ab_abc();
        let (toks, errs) = lex(&def, "ababx");
        assert_eq!(
            render(&toks),
            vec![
                "[@0,0:1='ab',<1>,1:0]",
                "[@1,2:3='ab',<1>,1:2]",
                "[@2,5:4='<EOF>',<-1>,1:5]",
            ]
        );
        assert_eq!(errs, vec!["line 1:4 token recognition error at: 'x'"]);
    }

    #[test]
    fn test_longest_match() {
        let def = ab_abc();
        let (toks, errs) = lex(&def, "abcx");
        assert_eq!(toks[0].ttype(), 2);
        assert_eq!(toks[0].text(), "abc");
        assert!(toks[1].is_eof());
        assert_eq!(errs, vec!["line 1:3 token recognition error at: 'x'"]);
    }

    #[test]
    fn test_partial_match_error() {
        // 'a' alone can't end a token: the error covers everything read.
        let def = ab_abc();
        let (toks, errs) = lex(&def, "a");
        assert_eq!(toks.len(), 1);
        assert_eq!(errs, vec!["line 1:0 token recognition error at: 'a'"]);
    }

    #[test]
    fn test_empty_input() {
        let def = ab_abc();
        let (toks, errs) = lex(&def, "");
        assert_eq!(render(&toks), vec!["[@0,0:-1='<EOF>',<-1>,1:0]"]);
        assert!(errs.is_empty());
        let mut lexer = def.lexer("");
        assert!(lexer.next_token().is_eof());
        assert!(lexer.next_token().is_eof());
    }

    fn id_ws() -> LexerDef {
        let g = AtnBuilder::lexer("L")
            .token("ID", Elem::range('a', 'z').plus())
            .token(
                "WS",
                Elem::seq([Elem::chars(" \n").plus(), Elem::Command(LexerAction::Skip)]),
            )
            .build()
            .unwrap();
        LexerDef::new(g).unwrap()
    }

    #[test]
    fn test_lines_and_columns() {
        let def = id_ws();
        let (toks, errs) = lex(&def, "ab cd\n  ef\ng");
        assert!(errs.is_empty());
        let pos = toks
            .iter()
            .map(|t| (t.text().to_owned(), t.line(), t.column()))
            .collect::<Vec<_>>();
        assert_eq!(
            pos,
            vec![
                ("ab".to_owned(), 1, 0),
                ("cd".to_owned(), 1, 3),
                ("ef".to_owned(), 2, 2),
                ("g".to_owned(), 3, 0),
                ("<EOF>".to_owned(), 3, 1),
            ]
        );
    }

    #[test]
    fn test_warm_cache_and_clear() {
        let def = id_ws();
        let cold = render(&lex(&def, "one two\nthree").0);
        assert!(def.simulator().dfa(0).map(|d| !d.is_empty()).unwrap_or(false));
        let warm = render(&lex(&def, "one two\nthree").0);
        def.clear_dfa();
        assert!(def.simulator().dfa(0).map(|d| d.is_empty()).unwrap_or(false));
        let cleared = render(&lex(&def, "one two\nthree").0);
        assert_eq!(cold, warm);
        assert_eq!(cold, cleared);
    }

    #[test]
    fn test_modes() {
        let g = AtnBuilder::lexer("L")
            .token("ID", Elem::range('a', 'z').plus())
            .token(
                "OPEN",
                Elem::seq([Elem::sym('"'), Elem::Command(LexerAction::PushMode(1))]),
            )
            .mode("STR")
            .token(
                "CLOSE",
                Elem::seq([Elem::sym('"'), Elem::Command(LexerAction::PopMode)]),
            )
            .token("TEXT", Elem::not_chars("\"").plus())
            .build()
            .unwrap();
        let def = LexerDef::new(g).unwrap();
        let (toks, errs) = lex(&def, "a\"b c\"d");
        assert!(errs.is_empty());
        let types = toks.iter().map(|t| t.ttype()).collect::<Vec<_>>();
        assert_eq!(types, vec![1, 2, 4, 3, 1, TOKEN_EOF]);
        assert_eq!(toks[2].text(), "b c");
    }

    #[test]
    fn test_pop_empty_mode_stack() {
        let g = AtnBuilder::lexer("L")
            .token(
                "A",
                Elem::seq([Elem::sym('a'), Elem::Command(LexerAction::PopMode)]),
            )
            .build()
            .unwrap();
        let def = LexerDef::new(g).unwrap();
        let mut lexer = def.lexer("aa");
        assert_eq!(lexer.next_token().ttype(), 1);
        assert_eq!(lexer.mode(), 0);
        assert_eq!(lexer.next_token().ttype(), 1);
    }

    #[test]
    fn test_channel_type_and_more() {
        let g = AtnBuilder::lexer("L")
            .token("ID", Elem::range('a', 'w').plus())
            .token(
                "WS",
                Elem::seq([
                    Elem::sym(' '),
                    Elem::Command(LexerAction::Channel(HIDDEN_CHANNEL)),
                ]),
            )
            .token("X", Elem::seq([Elem::sym('x'), Elem::Command(LexerAction::More)]))
            .token("Y", Elem::seq([Elem::sym('y'), Elem::Command(LexerAction::Type(1))]))
            .build()
            .unwrap();
        let def = LexerDef::new(g).unwrap();
        let (toks, errs) = lex(&def, "ab xy y");
        assert!(errs.is_empty());
        assert_eq!(
            render(&toks),
            vec![
                "[@0,0:1='ab',<1>,1:0]",
                "[@1,2:2=' ',<2>,channel=1,1:2]",
                "[@2,3:4='xy',<1>,1:3]",
                "[@3,5:5=' ',<2>,channel=1,1:5]",
                "[@4,6:6='y',<1>,1:6]",
                "[@5,7:6='<EOF>',<-1>,1:7]",
            ]
        );
    }

    struct Kw {
        keywords: bool,
    }

    impl LexerActions for Kw {
        fn sempred(&mut self, _rule: RIdx, _pred: usize, pos: &LexerPosition) -> bool {
            self.keywords && pos.start_index == 0
        }

        fn action(&mut self, _rule: RIdx, _action: usize, tok: &mut PendingToken) {
            tok.text = Some(tok.matched.to_uppercase());
        }
    }

    fn kw_grammar() -> LexerDef {
        let g = AtnBuilder::lexer("L")
            .token("IF", Elem::seq([Elem::lit("if"), Elem::pred(0)]))
            .token("ID", Elem::seq([Elem::range('a', 'z').plus(), Elem::action(0)]))
            .token(
                "WS",
                Elem::seq([Elem::sym(' '), Elem::Command(LexerAction::Skip)]),
            )
            .build()
            .unwrap();
        LexerDef::new(g).unwrap()
    }

    #[test]
    fn test_predicates_and_custom_actions() {
        let def = kw_grammar();
        for &keywords in &[true, false] {
            let mut lexer = def.lexer("if if");
            lexer.set_actions(Box::new(Kw { keywords }));
            let toks = lexer.all_tokens();
            let got = toks
                .iter()
                .map(|t| (t.ttype(), t.text().to_owned()))
                .collect::<Vec<_>>();
            if keywords {
                assert_eq!(
                    got,
                    vec![
                        (1, "if".to_owned()),
                        (2, "IF".to_owned()),
                        (TOKEN_EOF, "<EOF>".to_owned())
                    ]
                );
            } else {
                assert_eq!(
                    got,
                    vec![
                        (2, "IF".to_owned()),
                        (2, "IF".to_owned()),
                        (TOKEN_EOF, "<EOF>".to_owned())
                    ]
                );
            }
        }
    }

    #[test]
    fn test_fragment() {
        let g = AtnBuilder::lexer("L")
            .fragment("DIGIT", Elem::range('0', '9'))
            .token("INT", Elem::rule("DIGIT").plus())
            .token(
                "FLOAT",
                Elem::seq([Elem::rule("DIGIT").plus(), Elem::sym('.'), Elem::rule("DIGIT").star()]),
            )
            .build()
            .unwrap();
        let def = LexerDef::new(g).unwrap();
        let (toks, errs) = lex(&def, "12.5 7");
        assert_eq!(toks[0].ttype(), 2);
        assert_eq!(toks[0].text(), "12.5");
        assert_eq!(errs, vec!["line 1:4 token recognition error at: ' '"]);
        assert_eq!(toks[1].ttype(), 1);
        assert_eq!(toks[1].text(), "7");
    }

    #[test]
    fn test_non_greedy() {
        let g = AtnBuilder::lexer("L")
            .token(
                "COMMENT",
                Elem::seq([Elem::lit("/*"), Elem::Wildcard.star().non_greedy(), Elem::lit("*/")]),
            )
            .token("ID", Elem::range('a', 'z').plus())
            .build()
            .unwrap();
        let def = LexerDef::new(g).unwrap();
        let (toks, errs) = lex(&def, "/*a*/b/**/");
        assert!(errs.is_empty());
        let got = toks.iter().map(|t| t.text().to_owned()).collect::<Vec<_>>();
        assert_eq!(got, vec!["/*a*/", "b", "/**/", "<EOF>"]);
    }

    proptest! {
        #[test]
        fn prop_skipped_input_round_trips(s in "[a-z \n]{0,40}") {
            let def = id_ws();
            let (toks, errs) = lex(&def, &s);
            prop_assert!(errs.is_empty());
            let text = toks
                .iter()
                .filter(|t| !t.is_eof())
                .map(|t| t.text())
                .collect::<String>();
            let expected = s.chars().filter(|c| !c.is_whitespace()).collect::<String>();
            prop_assert_eq!(text, expected);
        }
    }
}
