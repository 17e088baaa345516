//! Error strategies decide how a parser reports and recovers from syntax errors.

use std::sync::Arc;

use atngrammar::{IntervalSet, StIdx, StateKind, EPSILON, INVALID_TOKEN_TYPE, TOKEN_EOF};
use fnv::FnvHashSet;

use crate::{
    error::RecognitionError,
    parser::ParserCore,
    token::{escape_ws, Token},
};

/// How a parser deals with syntax errors. Strategies are consulted at every decision
/// ([ErrorStrategy::sync]), whenever a token fails to match ([ErrorStrategy::recover_inline]),
/// and after a rule has failed ([ErrorStrategy::report_error] then [ErrorStrategy::recover]).
///
/// Returning an error from `recover` or `recover_inline` aborts recovery: the parser's caller
/// receives the error.
pub trait ErrorStrategy {
    /// Forget about previous errors, e.g. when the parser is reset.
    fn reset(&mut self, p: &mut ParserCore<'_>);

    /// The current token doesn't match what the parser expects. Either recover (returning the
    /// token which should be treated as matched) or fail.
    fn recover_inline(&mut self, p: &mut ParserCore<'_>) -> Result<Token, RecognitionError>;

    /// Resynchronise after the error `e` caused the innermost rule to fail.
    fn recover(&mut self, p: &mut ParserCore<'_>, e: &RecognitionError) -> Result<(), RecognitionError>;

    /// Called before every decision, to detect errors (and possibly recover) as early as
    /// possible.
    fn sync(&mut self, p: &mut ParserCore<'_>) -> Result<(), RecognitionError>;

    /// Tell the error listeners about `e`.
    fn report_error(&mut self, p: &mut ParserCore<'_>, e: &RecognitionError);

    /// A token matched successfully.
    fn report_match(&mut self, p: &mut ParserCore<'_>);
}

/// The standard strategy. It first tries to fix errors within a single token, by deleting an
/// extraneous token or conjuring up a missing one. Failing that, the innermost rule fails and
/// tokens are discarded until one is found that can follow some rule on the stack.
///
/// After reporting an error, further errors are suppressed until a token is successfully
/// matched.
#[derive(Debug, Default)]
pub struct DefaultErrorStrategy {
    last_error_index: Option<usize>,
    last_error_states: FnvHashSet<StIdx>,
}

impl DefaultErrorStrategy {
    pub fn new() -> Self {
        DefaultErrorStrategy::default()
    }

    fn begin_error_condition(&mut self, p: &mut ParserCore<'_>) {
        p.set_error_recovery_mode(true);
    }

    fn end_error_condition(&mut self, p: &mut ParserCore<'_>) {
        p.set_error_recovery_mode(false);
        self.last_error_states.clear();
        self.last_error_index = None;
    }

    /// If deleting the current token would let the parser continue, report it as extraneous,
    /// consume it, and return the token after it.
    fn single_token_deletion(&mut self, p: &mut ParserCore<'_>) -> Option<Token> {
        let next = p.la(2);
        if p.expected_tokens().contains(next) {
            self.report_unwanted_token(p);
            p.consume();
            let matched = p.current_token();
            self.report_match(p);
            Some(matched)
        } else {
            None
        }
    }

    /// If the current token could follow the token the parser expected, report the expected
    /// token as missing.
    fn single_token_insertion(&mut self, p: &mut ParserCore<'_>) -> bool {
        let current = p.la(1);
        let Some(s) = p.state() else {
            return false;
        };
        let atn = Arc::clone(p.atn());
        let Some(t) = atn.state(s).transitions().first() else {
            return false;
        };
        let at_ll2 = atn.next_tokens_in_ctx(t.target(), &p.invoking_states());
        if at_ll2.contains(current) {
            self.report_missing_token(p);
            true
        } else {
            false
        }
    }

    /// Conjure up a token of the lowest expected type, positioned at the current token (or, at
    /// the end of the input, at the last real token).
    fn missing_symbol(&mut self, p: &mut ParserCore<'_>) -> Token {
        let current = p.current_token();
        let expecting = p.expected_tokens();
        let ttype = expecting.min_element().unwrap_or(INVALID_TOKEN_TYPE);
        let text = if ttype == TOKEN_EOF {
            "<missing EOF>".to_owned()
        } else {
            format!("<missing {}>", p.vocabulary().display_name(ttype))
        };
        let at = if current.is_eof() {
            p.lt(-1).unwrap_or(current)
        } else {
            current
        };
        Token::conjured(ttype, &text, at.line(), at.column())
    }

    fn report_unwanted_token(&mut self, p: &mut ParserCore<'_>) {
        if p.in_error_recovery_mode() {
            return;
        }
        self.begin_error_condition(p);
        let t = p.current_token();
        let expecting = p.expected_tokens();
        let msg = format!(
            "extraneous input {} expecting {}",
            token_error_display(&t),
            expecting.to_token_string(p.vocabulary())
        );
        p.notify_error_listeners(&t, &msg, None);
    }

    fn report_missing_token(&mut self, p: &mut ParserCore<'_>) {
        if p.in_error_recovery_mode() {
            return;
        }
        self.begin_error_condition(p);
        let t = p.current_token();
        let expecting = p.expected_tokens();
        let msg = format!(
            "missing {} at {}",
            expecting.to_token_string(p.vocabulary()),
            token_error_display(&t)
        );
        p.notify_error_listeners(&t, &msg, None);
    }

    /// The union of the tokens which can follow each rule invocation on the stack.
    fn error_recovery_set(&self, p: &ParserCore<'_>) -> IntervalSet {
        let atn = p.atn();
        let mut set = IntervalSet::new();
        for inv in p.invoking_states() {
            if let Some(follow) = atn.follow_of(inv) {
                set.add_set(atn.next_tokens(follow));
            }
        }
        set.remove_one(EPSILON);
        set
    }

    fn consume_until(&mut self, p: &mut ParserCore<'_>, set: &IntervalSet) {
        let mut ttype = p.la(1);
        while ttype != TOKEN_EOF && !set.contains(ttype) {
            p.consume();
            ttype = p.la(1);
        }
    }
}

impl ErrorStrategy for DefaultErrorStrategy {
    fn reset(&mut self, p: &mut ParserCore<'_>) {
        self.end_error_condition(p);
    }

    fn recover_inline(&mut self, p: &mut ParserCore<'_>) -> Result<Token, RecognitionError> {
        if let Some(t) = self.single_token_deletion(p) {
            p.consume();
            return Ok(t);
        }
        if self.single_token_insertion(p) {
            return Ok(self.missing_symbol(p));
        }
        Err(p.input_mismatch())
    }

    fn recover(&mut self, p: &mut ParserCore<'_>, _e: &RecognitionError) -> Result<(), RecognitionError> {
        let index = p.input_index();
        let repeated_state = p
            .state()
            .map_or(false, |s| self.last_error_states.contains(&s));
        if self.last_error_index == Some(index) && repeated_state {
            // Recovery at this position already failed once from this state: make progress.
            p.consume();
        }
        self.last_error_index = Some(p.input_index());
        if let Some(s) = p.state() {
            self.last_error_states.insert(s);
        }
        let follow = self.error_recovery_set(p);
        self.consume_until(p, &follow);
        Ok(())
    }

    fn sync(&mut self, p: &mut ParserCore<'_>) -> Result<(), RecognitionError> {
        if p.in_error_recovery_mode() {
            return Ok(());
        }
        let Some(s) = p.state() else {
            return Ok(());
        };
        let atn = Arc::clone(p.atn());
        let la = p.la(1);
        let next = atn.next_tokens(s);
        if next.contains(la) || next.contains(EPSILON) {
            return Ok(());
        }
        match atn.state(s).kind() {
            StateKind::BlockStart { .. }
            | StateKind::StarBlockStart { .. }
            | StateKind::PlusBlockStart { .. }
            | StateKind::StarLoopEntry { .. } => {
                if self.single_token_deletion(p).is_some() {
                    return Ok(());
                }
                Err(p.input_mismatch())
            }
            StateKind::PlusLoopBack | StateKind::StarLoopBack => {
                self.report_unwanted_token(p);
                let expecting = p.expected_tokens();
                let follow = expecting.or(&self.error_recovery_set(p));
                self.consume_until(p, &follow);
                Ok(())
            }
            _ => Ok(()),
        }
    }

    fn report_error(&mut self, p: &mut ParserCore<'_>, e: &RecognitionError) {
        if p.in_error_recovery_mode() {
            return;
        }
        self.begin_error_condition(p);
        match e {
            RecognitionError::NoViableAlt {
                start, offending, ..
            } => {
                let input = if start.is_eof() {
                    "<EOF>".to_owned()
                } else {
                    p.text_between(start, offending)
                };
                let msg = format!("no viable alternative at input {}", quote(&input));
                p.notify_error_listeners(offending, &msg, Some(e));
            }
            RecognitionError::InputMismatch {
                offending,
                expected,
                ..
            } => {
                let msg = format!(
                    "mismatched input {} expecting {}",
                    token_error_display(offending),
                    expected.to_token_string(p.vocabulary())
                );
                p.notify_error_listeners(offending, &msg, Some(e));
            }
            RecognitionError::FailedPredicate { offending, .. } => {
                p.notify_error_listeners(offending, &e.to_string(), Some(e));
            }
            RecognitionError::LexerNoViableAlt { .. }
            | RecognitionError::Cancelled
            | RecognitionError::LostState => {
                let t = p.current_token();
                p.notify_error_listeners(&t, &e.to_string(), Some(e));
            }
        }
    }

    fn report_match(&mut self, p: &mut ParserCore<'_>) {
        self.end_error_condition(p);
    }
}

/// Gives up at the first syntax error, which is reported and then returned to the parser's
/// caller. Useful when a parse is expected to succeed (e.g. a fast first attempt with SLL
/// prediction) or when any error means the input should be rejected.
#[derive(Debug, Default)]
pub struct BailErrorStrategy {
    inner: DefaultErrorStrategy,
}

impl BailErrorStrategy {
    pub fn new() -> Self {
        BailErrorStrategy::default()
    }
}

impl ErrorStrategy for BailErrorStrategy {
    fn reset(&mut self, p: &mut ParserCore<'_>) {
        self.inner.reset(p)
    }

    fn recover_inline(&mut self, p: &mut ParserCore<'_>) -> Result<Token, RecognitionError> {
        Err(p.input_mismatch())
    }

    fn recover(&mut self, _p: &mut ParserCore<'_>, e: &RecognitionError) -> Result<(), RecognitionError> {
        Err(e.clone())
    }

    fn sync(&mut self, _p: &mut ParserCore<'_>) -> Result<(), RecognitionError> {
        Ok(())
    }

    fn report_error(&mut self, p: &mut ParserCore<'_>, e: &RecognitionError) {
        self.inner.report_error(p, e)
    }

    fn report_match(&mut self, p: &mut ParserCore<'_>) {
        self.inner.report_match(p)
    }
}

/// How a token is shown in error messages: its text, quoted, with whitespace escaped.
pub fn token_error_display(t: &Token) -> String {
    quote(t.text())
}

fn quote(s: &str) -> String {
    format!("'{}'", escape_ws(s))
}
