#![allow(clippy::new_without_default)]
#![allow(clippy::len_without_is_empty)]
#![forbid(unsafe_code)]

//! `lllex` runs lexers described by lexer ATNs. A [LexerDef] is created from a lexer
//! [atngrammar::GrammarInfo]; each [Lexer] it creates splits a [CharStream] into
//! [llpar::Token]s, always taking the longest match available in the current mode and, between
//! equally long matches, the rule defined first.
//!
//! ```text
//!   let def = LexerDef::new(grammar)?;
//!   let mut lexer = def.lexer("a = 1;");
//!   for t in lexer.all_tokens() {
//!       println!("{}", t);
//!   }
//! ```
//!
//! Lexers implement [llpar::TokenSource] and so can be handed straight to a parser.

mod char_stream;
mod lexer;
mod simulator;

pub use crate::{
    char_stream::{CharStream, InputStream},
    lexer::{Lexer, LexerActions, LexerDef, LexerDefError, NoLexerActions, PendingToken},
    simulator::{LexerAtnSimulator, LexerPosition, LinePos, Match},
};
