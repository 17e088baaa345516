use atngrammar::Span;

use crate::token::Token;

/// The interface a parser uses to obtain tokens. Lexers implement this trait; so does
/// [ListTokenSource], which replays tokens produced earlier.
///
/// Once the input is exhausted, `next_token` must return an end of file token, and must
/// continue to do so if called again.
pub trait TokenSource {
    fn next_token(&mut self) -> Token;

    fn source_name(&self) -> &str {
        "<unknown>"
    }
}

impl<T: TokenSource + ?Sized> TokenSource for &mut T {
    fn next_token(&mut self) -> Token {
        (**self).next_token()
    }

    fn source_name(&self) -> &str {
        (**self).source_name()
    }
}

impl<T: TokenSource + ?Sized> TokenSource for Box<T> {
    fn next_token(&mut self) -> Token {
        (**self).next_token()
    }

    fn source_name(&self) -> &str {
        (**self).source_name()
    }
}

/// A [TokenSource] over a list of tokens. If the list doesn't end with an end of file token,
/// one is synthesised directly after the last token.
pub struct ListTokenSource {
    tokens: Vec<Token>,
    i: usize,
    name: String,
}

impl ListTokenSource {
    pub fn new(tokens: Vec<Token>) -> Self {
        ListTokenSource {
            tokens,
            i: 0,
            name: "<list>".to_owned(),
        }
    }

    pub fn with_name(mut self, name: &str) -> Self {
        self.name = name.to_owned();
        self
    }

    fn eof(&self) -> Token {
        match self.tokens.last() {
            Some(t) if t.is_eof() => t.clone(),
            Some(t) => {
                let end = t.span().map_or(0, |s| s.end());
                let nl = t.text().chars().filter(|c| *c == '\n').count();
                let column = match t.text().rfind('\n') {
                    Some(i) => t.text()[i + 1..].chars().count(),
                    None => t.column() + t.text().chars().count(),
                };
                Token::eof(end, t.line() + nl, column)
            }
            None => Token::eof(0, 1, 0),
        }
    }
}

impl TokenSource for ListTokenSource {
    fn next_token(&mut self) -> Token {
        match self.tokens.get(self.i) {
            Some(t) => {
                if !t.is_eof() {
                    self.i += 1;
                }
                t.clone()
            }
            None => self.eof(),
        }
    }

    fn source_name(&self) -> &str {
        &self.name
    }
}

/// Build a list of tokens from `(type, text)` pairs, laid out one after the other on a single
/// line. Mostly useful for testing parsers without a lexer.
pub fn tokens_from_pairs(pairs: &[(i32, &str)]) -> Vec<Token> {
    let mut off = 0;
    pairs
        .iter()
        .map(|(ttype, text)| {
            let len = text.chars().count();
            let t = Token::new(*ttype, text, Span::new(off, off + len), 1, off);
            off += len;
            t
        })
        .collect()
}
