use std::path::Path;

use llpar::SyntaxError;
use unicode_width::UnicodeWidthStr;

/// Formats syntax errors as a message followed by the offending source line, with the offending
/// token underlined.
pub struct SyntaxErrorFormatter<'a> {
    src: &'a str,
    path: &'a Path,
    /// The byte offset at which each line starts.
    line_starts: Vec<usize>,
}

impl<'a> SyntaxErrorFormatter<'a> {
    pub fn new(src: &'a str, path: &'a Path) -> Self {
        let mut line_starts = vec![0];
        line_starts.extend(src.match_indices('\n').map(|(i, _)| i + 1));
        SyntaxErrorFormatter {
            src,
            path,
            line_starts,
        }
    }

    /// The text of line `line` (counting from 1) without its line terminator.
    fn line_text(&self, line: usize) -> Option<&'a str> {
        let start = *self.line_starts.get(line.checked_sub(1)?)?;
        let end = self
            .line_starts
            .get(line)
            .map_or(self.src.len(), |e| e - 1);
        Some(self.src[start..end].trim_end_matches('\r'))
    }

    pub fn format(&self, e: &SyntaxError) -> String {
        let mut out = format!(
            "{} at {}:{}:{}",
            e.msg,
            self.path.display(),
            e.line,
            e.column
        );
        let Some(line) = self.line_text(e.line) else {
            return out;
        };
        // Columns count code points, not bytes.
        let start = line
            .char_indices()
            .nth(e.column)
            .map_or(line.len(), |(i, _)| i);
        // Only tokens read from the input have text worth underlining in full.
        let len = e
            .offending
            .as_ref()
            .filter(|t| t.token_index().is_some() && !t.is_eof())
            .map_or(1, |t| t.text().chars().count().max(1));
        let end = line[start..]
            .char_indices()
            .nth(len)
            .map_or(line.len(), |(i, _)| start + i);
        let line_num_digits = e.line.to_string().len();
        out.push_str(&format!("\n{}| {}\n", e.line, line));
        out.push_str(
            &" ".repeat(line_num_digits + "| ".len() + UnicodeWidthStr::width(&line[..start])),
        );
        out.push_str(&"^".repeat(UnicodeWidthStr::width(&line[start..end]).max(1)));
        out
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use atngrammar::Span;
    use llpar::Token;

    fn err(line: usize, column: usize, offending: Option<Token>) -> SyntaxError {
        SyntaxError {
            line,
            column,
            msg: "oops".to_owned(),
            offending,
        }
    }

    #[test]
    fn test_underline_token() {
        let src = "a = 1;\nb = 22 2;\n";
        let f = SyntaxErrorFormatter::new(src, Path::new("in.txt"));
        let mut t = Token::new(1, "22", Span::new(11, 13), 2, 4);
        t.set_token_index(5);
        assert_eq!(
            f.format(&err(2, 4, Some(t))),
            "oops at in.txt:2:4\n2| b = 22 2;\n       ^^"
        );
    }

    #[test]
    fn test_underline_wide_and_missing() {
        let src = "字x";
        let f = SyntaxErrorFormatter::new(src, Path::new("in.txt"));
        assert_eq!(
            f.format(&err(1, 1, None)),
            "oops at in.txt:1:1\n1| 字x\n     ^"
        );
        // A position past the end of the input still gets a marker.
        assert_eq!(
            f.format(&err(1, 2, Some(Token::eof(2, 1, 2)))),
            "oops at in.txt:1:2\n1| 字x\n      ^"
        );
        assert_eq!(f.format(&err(3, 0, None)), "oops at in.txt:3:0");
    }
}
