//! Error listeners: observers told about syntax errors and, optionally, about how prediction
//! resolved difficult decisions. Listeners only observe; recovery is the job of the
//! [crate::ErrorStrategy].

use std::{fmt, sync::Arc};

use atngrammar::DIdx;
use llpredict::AltSet;
use parking_lot::Mutex;

use crate::{error::RecognitionError, token::Token};

/// A decision whose prediction the parser is reporting on.
#[derive(Clone, Debug)]
pub struct DecisionInfo {
    pub decision: DIdx,
    pub rule_name: String,
    /// Token indices of the input prediction looked at.
    pub start_index: usize,
    pub stop_index: usize,
    /// The text of the tokens `start_index..=stop_index`.
    pub input: String,
}

impl fmt::Display for DecisionInfo {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{} ({})", self.decision.0, self.rule_name)
    }
}

pub trait ErrorListener {
    /// A syntax (or, for lexers, token recognition) error at `line`:`column`.
    fn syntax_error(
        &mut self,
        offending: Option<&Token>,
        line: usize,
        column: usize,
        msg: &str,
        error: Option<&RecognitionError>,
    );

    /// More than one alternative matched the input. `exact` is `true` if the ambiguity was
    /// proven exactly, rather than assumed once full context prediction stopped making progress.
    fn report_ambiguity(&mut self, _info: &DecisionInfo, _exact: bool, _ambig_alts: &AltSet) {}

    /// SLL prediction conflicted and full context prediction is being tried.
    fn report_attempting_full_context(&mut self, _info: &DecisionInfo, _conflicting_alts: &AltSet) {}

    /// Full context prediction resolved an SLL conflict to a single alternative.
    fn report_context_sensitivity(&mut self, _info: &DecisionInfo, _prediction: u32) {}
}

/// Prints syntax errors to stderr as `line L:C msg`. Parsers and lexers have one of these by
/// default.
#[derive(Clone, Copy, Debug, Default)]
pub struct ConsoleErrorListener;

impl ErrorListener for ConsoleErrorListener {
    fn syntax_error(
        &mut self,
        _offending: Option<&Token>,
        line: usize,
        column: usize,
        msg: &str,
        _error: Option<&RecognitionError>,
    ) {
        eprintln!("line {}:{} {}", line, column, msg);
    }
}

/// A syntax error as recorded by a [CollectingErrorListener].
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct SyntaxError {
    pub line: usize,
    pub column: usize,
    pub msg: String,
    pub offending: Option<Token>,
}

impl fmt::Display for SyntaxError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "line {}:{} {}", self.line, self.column, self.msg)
    }
}

/// Records syntax errors. Clones share the same record, so keep a clone to inspect the errors
/// after handing the listener to a parser or lexer.
#[derive(Clone, Debug, Default)]
pub struct CollectingErrorListener {
    errors: Arc<Mutex<Vec<SyntaxError>>>,
}

impl CollectingErrorListener {
    pub fn new() -> Self {
        CollectingErrorListener::default()
    }

    pub fn errors(&self) -> Vec<SyntaxError> {
        self.errors.lock().clone()
    }

    /// The errors formatted as `line L:C msg`.
    pub fn messages(&self) -> Vec<String> {
        self.errors.lock().iter().map(|e| e.to_string()).collect()
    }

    pub fn len(&self) -> usize {
        self.errors.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.errors.lock().is_empty()
    }

    pub fn clear(&self) {
        self.errors.lock().clear()
    }
}

impl ErrorListener for CollectingErrorListener {
    fn syntax_error(
        &mut self,
        offending: Option<&Token>,
        line: usize,
        column: usize,
        msg: &str,
        _error: Option<&RecognitionError>,
    ) {
        self.errors.lock().push(SyntaxError {
            line,
            column,
            msg: msg.to_owned(),
            offending: offending.cloned(),
        });
    }
}

/// Records prediction diagnostics: ambiguities, full context retries, and context
/// sensitivities. These are most useful when parsing with
/// [llpredict::PredictionMode::LlExactAmbigDetection]. Like [CollectingErrorListener], clones
/// share their record.
#[derive(Clone, Debug)]
pub struct DiagnosticErrorListener {
    exact_only: bool,
    reports: Arc<Mutex<Vec<String>>>,
}

impl DiagnosticErrorListener {
    /// If `exact_only` is true, only exact ambiguities are reported.
    pub fn new(exact_only: bool) -> Self {
        DiagnosticErrorListener {
            exact_only,
            reports: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub fn reports(&self) -> Vec<String> {
        self.reports.lock().clone()
    }
}

impl Default for DiagnosticErrorListener {
    fn default() -> Self {
        DiagnosticErrorListener::new(true)
    }
}

impl ErrorListener for DiagnosticErrorListener {
    fn syntax_error(
        &mut self,
        _offending: Option<&Token>,
        _line: usize,
        _column: usize,
        _msg: &str,
        _error: Option<&RecognitionError>,
    ) {
    }

    fn report_ambiguity(&mut self, info: &DecisionInfo, exact: bool, ambig_alts: &AltSet) {
        if self.exact_only && !exact {
            return;
        }
        self.reports.lock().push(format!(
            "reportAmbiguity d={}: ambigAlts={}, input='{}'",
            info, ambig_alts, info.input
        ));
    }

    fn report_attempting_full_context(&mut self, info: &DecisionInfo, _conflicting_alts: &AltSet) {
        self.reports.lock().push(format!(
            "reportAttemptingFullContext d={}, input='{}'",
            info, info.input
        ));
    }

    fn report_context_sensitivity(&mut self, info: &DecisionInfo, _prediction: u32) {
        self.reports.lock().push(format!(
            "reportContextSensitivity d={}, input='{}'",
            info, info.input
        ));
    }
}
