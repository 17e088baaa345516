//! Rewriting a token buffer's text without changing the buffer.
//!
//! Edits (insertions, replacements, deletions) are recorded as instructions in one or more named
//! programs and only applied when text is rendered, so the same buffer can be rendered several
//! ways, and edits can be rolled back.

use std::fmt;

use fnv::FnvHashMap;
use indexmap::IndexMap;
use thiserror::Error;

use crate::token::Token;

pub const DEFAULT_PROGRAM_NAME: &str = "default";

#[derive(Debug, Error, Eq, PartialEq)]
pub enum RewriteError {
    #[error("replace: range invalid: {from}..{to} (size={size})")]
    InvalidRange { from: usize, to: usize, size: usize },
    #[error("replace op boundaries of {op} overlap with previous {prev}")]
    OverlappingReplace { op: String, prev: String },
    #[error("insert op {op} within boundaries of previous {prev}")]
    InsertWithinReplace { op: String, prev: String },
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
enum OpKind {
    InsertBefore,
    /// Stored as an insertion before the following token.
    InsertAfter,
    /// Replace tokens `index..=last`; a deletion has no text.
    Replace { last: usize },
}

#[derive(Clone, Debug)]
struct RewriteOp {
    kind: OpKind,
    index: usize,
    text: Option<String>,
}

impl RewriteOp {
    fn is_insert(&self) -> bool {
        matches!(self.kind, OpKind::InsertBefore | OpKind::InsertAfter)
    }

    fn last(&self) -> usize {
        match self.kind {
            OpKind::Replace { last } => last,
            _ => self.index,
        }
    }
}

impl fmt::Display for RewriteOp {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let text = self.text.as_deref().unwrap_or("");
        match self.kind {
            OpKind::InsertBefore => write!(f, "<InsertBeforeOp@{}:\"{}\">", self.index, text),
            OpKind::InsertAfter => write!(f, "<InsertAfterOp@{}:\"{}\">", self.index, text),
            OpKind::Replace { last } => write!(f, "<ReplaceOp@{}..{}:\"{}\">", self.index, last, text),
        }
    }
}

/// Records edits to `tokens` (a complete token buffer, such as
/// [crate::CommonTokenStream::tokens] after `fill`) and renders the edited text.
pub struct TokenStreamRewriter<'t> {
    tokens: &'t [Token],
    programs: IndexMap<String, Vec<RewriteOp>>,
}

impl<'t> TokenStreamRewriter<'t> {
    pub fn new(tokens: &'t [Token]) -> Self {
        TokenStreamRewriter {
            tokens,
            programs: IndexMap::new(),
        }
    }

    pub fn insert_before(&mut self, index: usize, text: &str) {
        self.insert_before_in(DEFAULT_PROGRAM_NAME, index, text)
    }

    pub fn insert_before_in(&mut self, program: &str, index: usize, text: &str) {
        self.program(program).push(RewriteOp {
            kind: OpKind::InsertBefore,
            index,
            text: Some(text.to_owned()),
        });
    }

    pub fn insert_after(&mut self, index: usize, text: &str) {
        self.insert_after_in(DEFAULT_PROGRAM_NAME, index, text)
    }

    pub fn insert_after_in(&mut self, program: &str, index: usize, text: &str) {
        self.program(program).push(RewriteOp {
            kind: OpKind::InsertAfter,
            index: index + 1,
            text: Some(text.to_owned()),
        });
    }

    /// Replace the tokens `from..=to` with `text`.
    pub fn replace(&mut self, from: usize, to: usize, text: &str) -> Result<(), RewriteError> {
        self.replace_in(DEFAULT_PROGRAM_NAME, from, to, Some(text))
    }

    pub fn replace_in(
        &mut self,
        program: &str,
        from: usize,
        to: usize,
        text: Option<&str>,
    ) -> Result<(), RewriteError> {
        if from > to || to >= self.tokens.len() {
            return Err(RewriteError::InvalidRange {
                from,
                to,
                size: self.tokens.len(),
            });
        }
        self.program(program).push(RewriteOp {
            kind: OpKind::Replace { last: to },
            index: from,
            text: text.map(|s| s.to_owned()),
        });
        Ok(())
    }

    /// Delete the tokens `from..=to`.
    pub fn delete(&mut self, from: usize, to: usize) -> Result<(), RewriteError> {
        self.replace_in(DEFAULT_PROGRAM_NAME, from, to, None)
    }

    pub fn delete_in(&mut self, program: &str, from: usize, to: usize) -> Result<(), RewriteError> {
        self.replace_in(program, from, to, None)
    }

    /// Undo every instruction of `program` from the `instruction_index`th onwards.
    pub fn rollback(&mut self, program: &str, instruction_index: usize) {
        if let Some(p) = self.programs.get_mut(program) {
            p.truncate(instruction_index);
        }
    }

    pub fn delete_program(&mut self, program: &str) {
        self.rollback(program, 0);
    }

    /// The number of instructions recorded in `program`.
    pub fn instructions_len(&self, program: &str) -> usize {
        self.programs.get(program).map_or(0, |p| p.len())
    }

    /// The text of the whole buffer with the default program's edits applied.
    pub fn text(&self) -> Result<String, RewriteError> {
        self.text_of(DEFAULT_PROGRAM_NAME, 0, self.tokens.len().saturating_sub(1))
    }

    /// The text of the tokens `start..=stop` with `program`'s edits applied. Insertions at the end
    /// of the buffer are included if `stop` is the last token.
    pub fn text_of(&self, program: &str, start: usize, stop: usize) -> Result<String, RewriteError> {
        if self.tokens.is_empty() {
            return Ok(String::new());
        }
        let stop = stop.min(self.tokens.len() - 1);
        let ops = match self.programs.get(program) {
            Some(ops) if !ops.is_empty() => ops,
            _ => {
                let mut s = String::new();
                for t in self.tokens.iter().take(stop + 1).skip(start) {
                    if !t.is_eof() {
                        s.push_str(t.text());
                    }
                }
                return Ok(s);
            }
        };
        let mut index_to_op = reduce(ops.clone())?;
        let mut buf = String::new();
        let mut i = start;
        while i <= stop && i < self.tokens.len() {
            let t = &self.tokens[i];
            match index_to_op.remove(&i) {
                None => {
                    if !t.is_eof() {
                        buf.push_str(t.text());
                    }
                    i += 1;
                }
                Some(op) => {
                    if let Some(s) = &op.text {
                        buf.push_str(s);
                    }
                    if op.is_insert() {
                        if !t.is_eof() {
                            buf.push_str(t.text());
                        }
                        i = op.index + 1;
                    } else {
                        i = op.last() + 1;
                    }
                }
            }
        }
        if stop == self.tokens.len() - 1 {
            // Insertions after the last token.
            let mut rest = index_to_op
                .into_values()
                .filter(|op| op.index >= self.tokens.len() - 1)
                .collect::<Vec<_>>();
            rest.sort_by_key(|op| op.index);
            for op in rest {
                if let Some(s) = op.text {
                    buf.push_str(&s);
                }
            }
        }
        Ok(buf)
    }

    fn program(&mut self, name: &str) -> &mut Vec<RewriteOp> {
        self.programs.entry(name.to_owned()).or_default()
    }
}

/// Combine `ops` so that at most one operation applies at each token index: insertions at the
/// same index are concatenated, insertions and replacements within later replacements are
/// folded into them, and overlapping deletions are merged. Overlapping replacements are an
/// error.
fn reduce(ops: Vec<RewriteOp>) -> Result<FnvHashMap<usize, RewriteOp>, RewriteError> {
    let mut rewrites = ops.into_iter().map(Some).collect::<Vec<_>>();

    for i in 0..rewrites.len() {
        let Some(rop) = rewrites[i].clone() else {
            continue;
        };
        let OpKind::Replace { .. } = rop.kind else {
            continue;
        };
        let mut rop = rop;
        for j in 0..i {
            let Some(iop) = rewrites[j].clone() else {
                continue;
            };
            if !iop.is_insert() {
                continue;
            }
            if iop.index == rop.index {
                rewrites[j] = None;
                rop.text = Some(format!(
                    "{}{}",
                    iop.text.unwrap_or_default(),
                    rop.text.as_deref().unwrap_or("")
                ));
            } else if iop.index > rop.index && iop.index <= rop.last() {
                rewrites[j] = None;
            }
        }
        for j in 0..i {
            let Some(prev) = rewrites[j].clone() else {
                continue;
            };
            if prev.is_insert() {
                continue;
            }
            if prev.index >= rop.index && prev.last() <= rop.last() {
                rewrites[j] = None;
                continue;
            }
            let disjoint = prev.last() < rop.index || prev.index > rop.last();
            if prev.text.is_none() && rop.text.is_none() && !disjoint {
                rewrites[j] = None;
                let index = prev.index.min(rop.index);
                let last = prev.last().max(rop.last());
                rop.index = index;
                rop.kind = OpKind::Replace { last };
            } else if !disjoint {
                return Err(RewriteError::OverlappingReplace {
                    op: rop.to_string(),
                    prev: prev.to_string(),
                });
            }
        }
        rewrites[i] = Some(rop);
    }

    for i in 0..rewrites.len() {
        let Some(iop) = rewrites[i].clone() else {
            continue;
        };
        if !iop.is_insert() {
            continue;
        }
        let mut iop = iop;
        for j in 0..i {
            let Some(prev) = rewrites[j].clone() else {
                continue;
            };
            if !prev.is_insert() || prev.index != iop.index {
                continue;
            }
            let (p, c) = (prev.text.unwrap_or_default(), iop.text.unwrap_or_default());
            iop.text = Some(match prev.kind {
                OpKind::InsertAfter => format!("{}{}", p, c),
                _ => format!("{}{}", c, p),
            });
            rewrites[j] = None;
        }
        let mut folded = false;
        for j in 0..i {
            let Some(mut rop) = rewrites[j].clone() else {
                continue;
            };
            if rop.is_insert() {
                continue;
            }
            if iop.index == rop.index {
                rop.text = Some(format!(
                    "{}{}",
                    iop.text.as_deref().unwrap_or(""),
                    rop.text.as_deref().unwrap_or("")
                ));
                rewrites[j] = Some(rop);
                folded = true;
                continue;
            }
            if iop.index >= rop.index && iop.index <= rop.last() {
                return Err(RewriteError::InsertWithinReplace {
                    op: iop.to_string(),
                    prev: rop.to_string(),
                });
            }
        }
        rewrites[i] = if folded { None } else { Some(iop) };
    }

    let mut m = FnvHashMap::default();
    for op in rewrites.into_iter().flatten() {
        m.insert(op.index, op);
    }
    Ok(m)
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::lex_api::tokens_from_pairs;

    fn abc() -> Vec<Token> {
        let mut toks = tokens_from_pairs(&[(1, "a"), (2, "b"), (3, "c")]);
        toks.push(Token::eof(3, 1, 3));
        for (i, t) in toks.iter_mut().enumerate() {
            t.set_token_index(i);
        }
        toks
    }

    #[test]
    fn test_insert_before_and_after() {
        let toks = abc();
        let mut r = TokenStreamRewriter::new(&toks);
        r.insert_before(0, "0");
        r.insert_after(2, "x");
        assert_eq!(r.text().unwrap(), "0abcx");
        r.insert_before(1, "y");
        r.insert_before(1, "z");
        assert_eq!(r.text().unwrap(), "0azybcx");
    }

    #[test]
    fn test_replace_and_delete() {
        let toks = abc();
        let mut r = TokenStreamRewriter::new(&toks);
        r.replace(1, 1, "x").unwrap();
        assert_eq!(r.text().unwrap(), "axc");
        r.rollback(DEFAULT_PROGRAM_NAME, 0);
        r.delete(0, 1).unwrap();
        r.delete(1, 2).unwrap();
        assert_eq!(r.text().unwrap(), "");
        assert!(r.replace(2, 1, "q").is_err());
    }

    #[test]
    fn test_insert_folded_into_replace() {
        let toks = abc();
        let mut r = TokenStreamRewriter::new(&toks);
        r.insert_before(1, "0");
        r.replace(1, 1, "x").unwrap();
        assert_eq!(r.text().unwrap(), "a0xc");
        let mut r = TokenStreamRewriter::new(&toks);
        r.replace(0, 2, "x").unwrap();
        r.insert_before(1, "0");
        assert!(matches!(
            r.text(),
            Err(RewriteError::InsertWithinReplace { .. })
        ));
    }

    #[test]
    fn test_overlapping_replaces() {
        let toks = abc();
        let mut r = TokenStreamRewriter::new(&toks);
        r.replace(0, 1, "x").unwrap();
        r.replace(1, 2, "y").unwrap();
        assert!(matches!(
            r.text(),
            Err(RewriteError::OverlappingReplace { .. })
        ));
        // A later replace covering an earlier one wins.
        let mut r = TokenStreamRewriter::new(&toks);
        r.replace(1, 1, "x").unwrap();
        r.replace(0, 2, "y").unwrap();
        assert_eq!(r.text().unwrap(), "y");
    }

    #[test]
    fn test_programs_are_independent() {
        let toks = abc();
        let mut r = TokenStreamRewriter::new(&toks);
        r.insert_before_in("p", 0, "<");
        r.delete(2, 2).unwrap();
        assert_eq!(r.text_of("p", 0, 3).unwrap(), "<abc");
        assert_eq!(r.text().unwrap(), "ab");
        assert_eq!(r.text_of("p", 1, 1).unwrap(), "b");
        assert_eq!(r.instructions_len("p"), 1);
        r.delete_program("p");
        assert_eq!(r.text_of("p", 0, 3).unwrap(), "abc");
    }
}
