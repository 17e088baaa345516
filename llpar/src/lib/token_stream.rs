use atngrammar::{IntervalSet, DEFAULT_CHANNEL, INVALID_TOKEN_TYPE};
use llpredict::IntStream;

use crate::{lex_api::TokenSource, token::Token};

/// A stream of [Token]s. As an [IntStream] the symbols are token types.
pub trait TokenStream: IntStream {
    /// The token `k` positions ahead (`k > 0`) or behind (`k < 0`) the current position. `lt(1)`
    /// is the current token. Beyond the end of input this is the end of file token; `lt(0)` and
    /// positions before the start are `None`.
    fn lt(&mut self, k: isize) -> Option<&Token>;

    /// The token with index `i`, if it has been read from the token source yet.
    fn get(&self, i: usize) -> Option<&Token>;

    /// The concatenated text of the tokens with indices `start..=stop`, including tokens on other
    /// channels, stopping at the end of file token.
    fn text_range(&mut self, start: usize, stop: usize) -> String;

    /// The text of the entire input.
    fn text(&mut self) -> String;
}

/// A token stream which buffers every token it reads from its [TokenSource], so that the parser
/// can look ahead and rewind arbitrarily. Tokens are read lazily, as lookahead demands them.
///
/// Unless constructed with [BufferedTokenStream::on_channel], all tokens are presented to the
/// parser regardless of their channel.
pub struct BufferedTokenStream<S> {
    source: S,
    tokens: Vec<Token>,
    /// The index of the current token; `None` until the stream is first used.
    p: Option<usize>,
    fetched_eof: bool,
    channel: Option<usize>,
}

impl<S: TokenSource> BufferedTokenStream<S> {
    pub fn new(source: S) -> Self {
        BufferedTokenStream {
            source,
            tokens: Vec::new(),
            p: None,
            fetched_eof: false,
            channel: None,
        }
    }

    /// A stream which skips over tokens not on `channel`, although they remain in the buffer.
    pub fn on_channel(source: S, channel: usize) -> Self {
        BufferedTokenStream {
            channel: Some(channel),
            ..BufferedTokenStream::new(source)
        }
    }

    pub fn source(&self) -> &S {
        &self.source
    }

    pub fn source_mut(&mut self) -> &mut S {
        &mut self.source
    }

    /// Every token read so far, on every channel.
    pub fn tokens(&self) -> &[Token] {
        &self.tokens
    }

    /// Read every remaining token from the source.
    pub fn fill(&mut self) {
        self.lazy_init();
        while !self.fetched_eof {
            self.fetch(1000);
        }
    }

    /// The tokens with indices `start..=stop` whose type is in `types` (or all of them if
    /// `types` is `None`).
    pub fn get_tokens(&mut self, start: usize, stop: usize, types: Option<&IntervalSet>) -> Vec<&Token> {
        self.lazy_init();
        self.sync(stop);
        let stop = stop.min(self.tokens.len().saturating_sub(1));
        if start > stop {
            return Vec::new();
        }
        self.tokens[start..=stop]
            .iter()
            .filter(|t| types.map_or(true, |ts| ts.contains(t.ttype())))
            .collect()
    }

    /// The tokens on channels other than the default channel directly to the right of the token
    /// `index`, up to the next default channel token.
    pub fn hidden_tokens_to_right(&mut self, index: usize) -> Vec<&Token> {
        self.lazy_init();
        let next = self.next_token_on_channel(index + 1, DEFAULT_CHANNEL);
        let from = index + 1;
        let to = if next <= index { self.tokens.len() } else { next };
        self.tokens
            .get(from..to.min(self.tokens.len()))
            .unwrap_or(&[])
            .iter()
            .filter(|t| t.channel() != DEFAULT_CHANNEL)
            .collect()
    }

    /// The tokens on channels other than the default channel directly to the left of the token
    /// `index`, back to the previous default channel token.
    pub fn hidden_tokens_to_left(&mut self, index: usize) -> Vec<&Token> {
        self.lazy_init();
        if index == 0 || index >= self.tokens.len() {
            return Vec::new();
        }
        let prev = self.previous_token_on_channel(index as isize - 1, DEFAULT_CHANNEL);
        let from = (prev + 1) as usize;
        self.tokens[from..index]
            .iter()
            .filter(|t| t.channel() != DEFAULT_CHANNEL)
            .collect()
    }

    /// The number of tokens on the stream's channel (or in total for an unfiltered stream),
    /// including the end of file token.
    pub fn number_of_on_channel_tokens(&mut self) -> usize {
        self.fill();
        match self.channel {
            Some(c) => self
                .tokens
                .iter()
                .filter(|t| t.channel() == c || t.is_eof())
                .count(),
            None => self.tokens.len(),
        }
    }

    fn lazy_init(&mut self) {
        if self.p.is_none() {
            self.sync(0);
            self.p = Some(self.adjust_seek_index(0));
        }
    }

    /// Make sure the buffer contains the token `i`, returning `true` if it does.
    fn sync(&mut self, i: usize) -> bool {
        if i >= self.tokens.len() {
            let n = i + 1 - self.tokens.len();
            return self.fetch(n) >= n;
        }
        true
    }

    fn fetch(&mut self, n: usize) -> usize {
        if self.fetched_eof {
            return 0;
        }
        for i in 0..n {
            let mut t = self.source.next_token();
            t.set_token_index(self.tokens.len());
            let eof = t.is_eof();
            self.tokens.push(t);
            if eof {
                self.fetched_eof = true;
                return i + 1;
            }
        }
        n
    }

    fn adjust_seek_index(&mut self, i: usize) -> usize {
        match self.channel {
            Some(c) => self.next_token_on_channel(i, c),
            None => i,
        }
    }

    /// The index of the first token at or after `i` on `channel`, or of the end of file token if
    /// there is none.
    fn next_token_on_channel(&mut self, mut i: usize, channel: usize) -> usize {
        self.sync(i);
        if i >= self.tokens.len() {
            return self.tokens.len().saturating_sub(1);
        }
        while self.tokens[i].channel() != channel {
            if self.tokens[i].is_eof() {
                return i;
            }
            i += 1;
            self.sync(i);
            if i >= self.tokens.len() {
                return self.tokens.len() - 1;
            }
        }
        i
    }

    /// The index of the last token at or before `i` on `channel`, or `-1` if there is none.
    fn previous_token_on_channel(&mut self, mut i: isize, channel: usize) -> isize {
        if i < 0 {
            return -1;
        }
        self.sync(i as usize);
        if i as usize >= self.tokens.len() {
            return self.tokens.len() as isize - 1;
        }
        while i >= 0 {
            let t = &self.tokens[i as usize];
            if t.is_eof() || t.channel() == channel {
                return i;
            }
            i -= 1;
        }
        i
    }

    fn lb(&mut self, k: usize) -> Option<&Token> {
        let p = self.p?;
        if k == 0 || k > p {
            return None;
        }
        match self.channel {
            None => self.tokens.get(p - k),
            Some(c) => {
                let mut i = p as isize;
                let mut n = 1;
                while n <= k && i > 0 {
                    i = self.previous_token_on_channel(i - 1, c);
                    n += 1;
                }
                if i < 0 {
                    None
                } else {
                    self.tokens.get(i as usize)
                }
            }
        }
    }
}

impl<S: TokenSource> IntStream for BufferedTokenStream<S> {
    fn consume(&mut self) {
        self.lazy_init();
        let Some(p) = self.p else { return };
        let at_eof = self.tokens.get(p).map_or(true, |t| t.is_eof());
        if at_eof {
            return;
        }
        if self.sync(p + 1) {
            self.p = Some(self.adjust_seek_index(p + 1));
        }
    }

    fn la(&mut self, i: isize) -> i32 {
        self.lt(i).map_or(INVALID_TOKEN_TYPE, |t| t.ttype())
    }

    fn mark(&mut self) -> isize {
        0
    }

    fn release(&mut self, _marker: isize) {}

    fn index(&self) -> usize {
        self.p.unwrap_or(0)
    }

    fn seek(&mut self, index: usize) {
        self.lazy_init();
        self.p = Some(self.adjust_seek_index(index));
    }

    fn size(&self) -> usize {
        self.tokens.len()
    }

    fn source_name(&self) -> &str {
        self.source.source_name()
    }
}

impl<S: TokenSource> TokenStream for BufferedTokenStream<S> {
    fn lt(&mut self, k: isize) -> Option<&Token> {
        self.lazy_init();
        if k == 0 {
            return None;
        }
        if k < 0 {
            return self.lb(k.unsigned_abs());
        }
        let p = self.p?;
        let i = match self.channel {
            None => {
                let i = p + k as usize - 1;
                self.sync(i);
                i
            }
            Some(c) => {
                let mut i = p;
                for _ in 1..k {
                    if self.sync(i + 1) {
                        i = self.next_token_on_channel(i + 1, c);
                    }
                }
                i
            }
        };
        self.tokens.get(i).or_else(|| self.tokens.last())
    }

    fn get(&self, i: usize) -> Option<&Token> {
        self.tokens.get(i)
    }

    fn text_range(&mut self, start: usize, stop: usize) -> String {
        self.lazy_init();
        self.sync(stop);
        let mut s = String::new();
        for t in self.tokens.iter().skip(start).take(stop.saturating_sub(start) + 1) {
            if t.is_eof() {
                break;
            }
            s.push_str(t.text());
        }
        s
    }

    fn text(&mut self) -> String {
        self.fill();
        let n = self.tokens.len();
        self.text_range(0, n.saturating_sub(1))
    }
}

/// The token stream parsers normally use: a [BufferedTokenStream] which only presents tokens on
/// a single channel (by default [DEFAULT_CHANNEL]) to the parser. Tokens on other channels (e.g.
/// whitespace and comments sent to the hidden channel) stay in the buffer, so that they still
/// appear in [TokenStream::text_range] and can be found with
/// [BufferedTokenStream::hidden_tokens_to_left] and friends.
pub struct CommonTokenStream<S> {
    buf: BufferedTokenStream<S>,
}

impl<S: TokenSource> CommonTokenStream<S> {
    pub fn new(source: S) -> Self {
        CommonTokenStream::with_channel(source, DEFAULT_CHANNEL)
    }

    pub fn with_channel(source: S, channel: usize) -> Self {
        CommonTokenStream {
            buf: BufferedTokenStream::on_channel(source, channel),
        }
    }

    pub fn buffer(&self) -> &BufferedTokenStream<S> {
        &self.buf
    }

    pub fn buffer_mut(&mut self) -> &mut BufferedTokenStream<S> {
        &mut self.buf
    }

    pub fn tokens(&self) -> &[Token] {
        self.buf.tokens()
    }

    pub fn fill(&mut self) {
        self.buf.fill()
    }

    pub fn into_inner(self) -> BufferedTokenStream<S> {
        self.buf
    }
}

impl<S: TokenSource> IntStream for CommonTokenStream<S> {
    fn consume(&mut self) {
        self.buf.consume()
    }

    fn la(&mut self, i: isize) -> i32 {
        self.buf.la(i)
    }

    fn mark(&mut self) -> isize {
        self.buf.mark()
    }

    fn release(&mut self, marker: isize) {
        self.buf.release(marker)
    }

    fn index(&self) -> usize {
        self.buf.index()
    }

    fn seek(&mut self, index: usize) {
        self.buf.seek(index)
    }

    fn size(&self) -> usize {
        self.buf.size()
    }

    fn source_name(&self) -> &str {
        self.buf.source_name()
    }
}

impl<S: TokenSource> TokenStream for CommonTokenStream<S> {
    fn lt(&mut self, k: isize) -> Option<&Token> {
        self.buf.lt(k)
    }

    fn get(&self, i: usize) -> Option<&Token> {
        self.buf.get(i)
    }

    fn text_range(&mut self, start: usize, stop: usize) -> String {
        self.buf.text_range(start, stop)
    }

    fn text(&mut self) -> String {
        self.buf.text()
    }
}
