#![allow(clippy::new_without_default)]
#![allow(clippy::len_without_is_empty)]
#![allow(clippy::type_complexity)]
#![forbid(unsafe_code)]

//! `llpar` runs adaptive LL(*) parsers over parser ATNs. Given a [atngrammar::GrammarInfo] for a
//! parser grammar (built with [atngrammar::AtnBuilder] or loaded from an interpreter data file)
//! and a [TokenSource] (typically a lexer from `lllex`), it recognises the input, builds a
//! [ParseTree], and reports and recovers from syntax errors.
//!
//! The usual entry point is [ParserDef], which owns a grammar and the DFA caches shared by every
//! parser created from it:
//!
//! ```text
//!   let def = ParserDef::new(grammar)?;
//!   let rule = def.rule_idx("expr").unwrap();
//!   let mut parser = def.parser(lexer);
//!   let errs = CollectingErrorListener::new();
//!   parser.core_mut().remove_error_listeners();
//!   parser.core_mut().add_error_listener(Box::new(errs.clone()));
//!   let tree = parser.parse(rule)?;
//!   println!("{}", tree.to_string_tree(def.grammar().rule_names()));
//! ```
//!
//! Syntax errors don't stop a parse unless the parser was configured with
//! [RecoveryKind::Bail]: they are reported to the parser's [ErrorListener]s and the tree
//! contains error nodes where tokens were discarded or conjured up.

mod builder;
mod error;
mod interpreter;
mod lex_api;
mod listener;
mod parser;
pub mod rewriter;
mod strategy;
mod token;
mod token_stream;
pub mod tree;

pub use crate::{
    builder::{ParserDef, ParserDefError, RecoveryKind},
    error::{ParseFailure, RecognitionError},
    interpreter::ParserInterpreter,
    lex_api::{tokens_from_pairs, ListTokenSource, TokenSource},
    listener::{
        CollectingErrorListener, ConsoleErrorListener, DecisionInfo, DiagnosticErrorListener,
        ErrorListener, SyntaxError,
    },
    parser::{NoActions, ParserActions, ParserCore},
    rewriter::{RewriteError, TokenStreamRewriter},
    strategy::{token_error_display, BailErrorStrategy, DefaultErrorStrategy, ErrorStrategy},
    token::{escape_ws, Token},
    token_stream::{BufferedTokenStream, CommonTokenStream, TokenStream},
    tree::{ParseTree, ParseTreeListener, ParseTreeVisitor, ParseTreeWalker, RuleNode},
};

pub use llpredict::{CancellationFlag, IntStream, PredictionMode};
