/// A stream of integer symbols (characters or token types) with random access by index.
///
/// `la` takes `&mut self` so that streams which fill lazily (e.g. token streams reading from a
/// lexer) can do so on demand.
pub trait IntStream {
    /// Advance past the current symbol.
    fn consume(&mut self);

    /// Look ahead (`i > 0`) or behind (`i < 0`) from the current position without consuming.
    /// `la(1)` is the current symbol. Returns [atngrammar::TOKEN_EOF] beyond the end of the
    /// stream and `0` for `i == 0`.
    fn la(&mut self, i: isize) -> i32;

    /// Begin a region during which [IntStream::seek] to any position in the region is valid.
    fn mark(&mut self) -> isize;

    fn release(&mut self, marker: isize);

    /// The index of the current symbol.
    fn index(&self) -> usize;

    fn seek(&mut self, index: usize);

    /// The number of symbols in the stream, if known.
    fn size(&self) -> usize;

    fn source_name(&self) -> &str {
        "<unknown>"
    }
}
