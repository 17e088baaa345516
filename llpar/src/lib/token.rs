use std::fmt;

use atngrammar::{Span, DEFAULT_CHANNEL, TOKEN_EOF};
#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// A token: a run of characters from the input which a lexer has classified with a token type.
///
/// Tokens conjured up by error recovery (e.g. a missing `;`) were never in the input and so
/// have neither a [Span] nor a token index.
#[derive(Clone, Debug, Eq, Hash, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Token {
    ttype: i32,
    channel: usize,
    span: Option<Span>,
    line: usize,
    column: usize,
    index: Option<usize>,
    text: String,
}

impl Token {
    /// Create a token of type `ttype` on the default channel. `line` is 1-based; `column` is the
    /// 0-based character offset of the token's start within its line.
    pub fn new(ttype: i32, text: &str, span: Span, line: usize, column: usize) -> Self {
        Token {
            ttype,
            channel: DEFAULT_CHANNEL,
            span: Some(span),
            line,
            column,
            index: None,
            text: text.to_owned(),
        }
    }

    /// The end of file token for input of `len` characters.
    pub fn eof(len: usize, line: usize, column: usize) -> Self {
        Token {
            ttype: TOKEN_EOF,
            channel: DEFAULT_CHANNEL,
            span: Some(Span::new(len, len)),
            line,
            column,
            index: None,
            text: "<EOF>".to_owned(),
        }
    }

    /// A token which error recovery pretends was in the input at `line`/`column`.
    pub fn conjured(ttype: i32, text: &str, line: usize, column: usize) -> Self {
        Token {
            ttype,
            channel: DEFAULT_CHANNEL,
            span: None,
            line,
            column,
            index: None,
            text: text.to_owned(),
        }
    }

    pub fn with_channel(mut self, channel: usize) -> Self {
        self.channel = channel;
        self
    }

    pub fn ttype(&self) -> i32 {
        self.ttype
    }

    pub fn channel(&self) -> usize {
        self.channel
    }

    /// The characters this token covers, or `None` for a conjured token.
    pub fn span(&self) -> Option<Span> {
        self.span
    }

    /// The offset of the token's first character, or `-1` for a conjured token.
    pub fn start_index(&self) -> isize {
        self.span.map_or(-1, |s| s.start() as isize)
    }

    /// The offset of the token's last character (inclusive), or `-1` for a conjured token.
    pub fn stop_index(&self) -> isize {
        self.span.map_or(-1, |s| s.stop())
    }

    pub fn line(&self) -> usize {
        self.line
    }

    pub fn column(&self) -> usize {
        self.column
    }

    /// The position of this token in its token stream, if it has been placed in one.
    pub fn token_index(&self) -> Option<usize> {
        self.index
    }

    pub fn set_token_index(&mut self, index: usize) {
        self.index = Some(index);
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn set_text(&mut self, text: &str) {
        self.text = text.to_owned();
    }

    pub fn is_eof(&self) -> bool {
        self.ttype == TOKEN_EOF
    }
}

impl fmt::Display for Token {
    /// Formats as `[@index,start:stop='text',<type>,line:column]`, with `,channel=n` before the
    /// position for tokens not on the default channel.
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(
            f,
            "[@{},{}:{}='{}',<{}>",
            self.index.map_or(-1, |i| i as isize),
            self.start_index(),
            self.stop_index(),
            escape_ws(&self.text),
            self.ttype
        )?;
        if self.channel > 0 {
            write!(f, ",channel={}", self.channel)?;
        }
        write!(f, ",{}:{}]", self.line, self.column)
    }
}

/// Replace newlines, carriage returns, and tabs with their escaped forms.
pub fn escape_ws(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\t' => out.push_str("\\t"),
            c => out.push(c),
        }
    }
    out
}
