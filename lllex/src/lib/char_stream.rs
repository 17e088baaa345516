use atngrammar::{Interval, TOKEN_EOF};
use llpredict::IntStream;

/// A stream of Unicode code points, as read by lexers. Indices count code points, not bytes.
pub trait CharStream: IntStream {
    /// The text of the code points `interval.a..=interval.b`, clamped to the stream. Empty if
    /// the interval is empty.
    fn text(&self, interval: Interval) -> String;
}

/// A [CharStream] over an in-memory string. The whole input is decoded up front, so marks are
/// free and any index can be sought to.
#[derive(Clone, Debug)]
pub struct InputStream {
    data: Vec<char>,
    p: usize,
    name: String,
}

impl InputStream {
    pub fn new(s: &str) -> Self {
        InputStream {
            data: s.chars().collect(),
            p: 0,
            name: "<unknown>".to_owned(),
        }
    }

    pub fn with_name(mut self, name: &str) -> Self {
        self.name = name.to_owned();
        self
    }

    /// Rewind to the start of the input.
    pub fn reset(&mut self) {
        self.p = 0;
    }
}

impl IntStream for InputStream {
    fn consume(&mut self) {
        if self.p < self.data.len() {
            self.p += 1;
        }
    }

    fn la(&mut self, i: isize) -> i32 {
        if i == 0 {
            return 0;
        }
        // `la(-1)` is the symbol before the current one.
        let off = if i < 0 { i } else { i - 1 };
        let j = self.p as isize + off;
        if j < 0 || j as usize >= self.data.len() {
            return TOKEN_EOF;
        }
        self.data[j as usize] as i32
    }

    fn mark(&mut self) -> isize {
        -1
    }

    fn release(&mut self, _marker: isize) {}

    fn index(&self) -> usize {
        self.p
    }

    fn seek(&mut self, index: usize) {
        self.p = index.min(self.data.len());
    }

    fn size(&self) -> usize {
        self.data.len()
    }

    fn source_name(&self) -> &str {
        &self.name
    }
}

impl CharStream for InputStream {
    fn text(&self, interval: Interval) -> String {
        if self.data.is_empty() || interval.b < interval.a || interval.a < 0 {
            return String::new();
        }
        let a = interval.a as usize;
        let b = (interval.b as usize).min(self.data.len() - 1);
        if a > b {
            return String::new();
        }
        self.data[a..=b].iter().collect()
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_code_points() {
        let mut s = InputStream::new("aé😀b");
        assert_eq!(s.size(), 4);
        assert_eq!(s.la(1), 'a' as i32);
        assert_eq!(s.la(-1), TOKEN_EOF);
        s.consume();
        s.consume();
        assert_eq!(s.la(1), '😀' as i32);
        assert_eq!(s.la(-1), 'é' as i32);
        assert_eq!(s.la(3), TOKEN_EOF);
        assert_eq!(s.text(Interval::new(1, 2)), "é😀");
        assert_eq!(s.text(Interval::new(2, 10)), "😀b");
        assert_eq!(s.text(Interval::new(3, 2)), "");
        s.seek(10);
        assert_eq!(s.index(), 4);
        s.consume();
        assert_eq!(s.index(), 4);
        assert_eq!(s.la(1), TOKEN_EOF);
    }
}
