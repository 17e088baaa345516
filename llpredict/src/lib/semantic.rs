//! Semantic contexts: boolean combinations of the predicates guarding a configuration.

use std::fmt;

use atngrammar::RIdx;

/// Evaluates the predicates a grammar refers to by index. Parsers implement this by dispatching
/// to user code; the current rule invocation is the implicit "local context" of context-dependent
/// predicates.
pub trait PredicateEval {
    fn sempred(&mut self, rule: RIdx, pred: usize, ctx_dependent: bool) -> bool;

    /// Is `precedence` at least the precedence of the innermost left-recursive rule invocation?
    fn precpred(&mut self, precedence: i32) -> bool;
}

/// A tree of predicates. `None` is the always-true context. The operands of `And` and `Or` are
/// kept sorted and deduplicated so that structurally equal contexts compare and hash equal.
#[derive(Clone, Debug, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub enum SemanticContext {
    None,
    Predicate {
        rule: RIdx,
        pred: usize,
        ctx_dependent: bool,
    },
    Precedence(i32),
    And(Vec<SemanticContext>),
    Or(Vec<SemanticContext>),
}

impl Default for SemanticContext {
    fn default() -> Self {
        SemanticContext::None
    }
}

impl SemanticContext {
    pub fn is_none(&self) -> bool {
        matches!(self, SemanticContext::None)
    }

    /// `a && b`. Of several precedence predicates only the lowest survives.
    pub fn and(a: &SemanticContext, b: &SemanticContext) -> SemanticContext {
        if a.is_none() {
            return b.clone();
        }
        if b.is_none() {
            return a.clone();
        }
        let mut opnds = Vec::new();
        for c in [a, b] {
            match c {
                SemanticContext::And(v) => opnds.extend(v.iter().cloned()),
                _ => opnds.push(c.clone()),
            }
        }
        let min_prec = precedence_operands(&opnds).min();
        combine(opnds, min_prec, SemanticContext::And)
    }

    /// `a || b`. Of several precedence predicates only the highest survives.
    pub fn or(a: &SemanticContext, b: &SemanticContext) -> SemanticContext {
        if a.is_none() || b.is_none() {
            return SemanticContext::None;
        }
        let mut opnds = Vec::new();
        for c in [a, b] {
            match c {
                SemanticContext::Or(v) => opnds.extend(v.iter().cloned()),
                _ => opnds.push(c.clone()),
            }
        }
        let max_prec = precedence_operands(&opnds).max();
        combine(opnds, max_prec, SemanticContext::Or)
    }

    /// Evaluate this context.
    pub fn eval<H: PredicateEval + ?Sized>(&self, host: &mut H) -> bool {
        match self {
            SemanticContext::None => true,
            SemanticContext::Predicate {
                rule,
                pred,
                ctx_dependent,
            } => host.sempred(*rule, *pred, *ctx_dependent),
            SemanticContext::Precedence(p) => host.precpred(*p),
            SemanticContext::And(v) => v.iter().all(|c| c.eval(host)),
            SemanticContext::Or(v) => v.iter().any(|c| c.eval(host)),
        }
    }

    /// Evaluate the precedence predicates in this context, leaving any other predicates intact.
    /// Returns `None` if the context is now known to be false, and `Some(SemanticContext::None)`
    /// if it is known to be true.
    pub fn eval_precedence<H: PredicateEval + ?Sized>(
        &self,
        host: &mut H,
    ) -> Option<SemanticContext> {
        match self {
            SemanticContext::None | SemanticContext::Predicate { .. } => Some(self.clone()),
            SemanticContext::Precedence(p) => {
                if host.precpred(*p) {
                    Some(SemanticContext::None)
                } else {
                    None
                }
            }
            SemanticContext::And(v) => {
                let mut differs = false;
                let mut opnds = Vec::new();
                for c in v {
                    let e = c.eval_precedence(host);
                    differs |= e.as_ref() != Some(c);
                    match e {
                        None => return None,
                        Some(SemanticContext::None) => (),
                        Some(e) => opnds.push(e),
                    }
                }
                if !differs {
                    return Some(self.clone());
                }
                Some(
                    opnds
                        .iter()
                        .fold(SemanticContext::None, |acc, c| SemanticContext::and(&acc, c)),
                )
            }
            SemanticContext::Or(v) => {
                let mut differs = false;
                let mut opnds = Vec::new();
                for c in v {
                    let e = c.eval_precedence(host);
                    differs |= e.as_ref() != Some(c);
                    match e {
                        Some(SemanticContext::None) => return Some(SemanticContext::None),
                        Some(e) => opnds.push(e),
                        None => (),
                    }
                }
                if !differs {
                    return Some(self.clone());
                }
                let mut it = opnds.into_iter();
                let first = it.next()?;
                Some(it.fold(first, |acc, c| SemanticContext::or(&acc, &c)))
            }
        }
    }
}

fn precedence_operands(opnds: &[SemanticContext]) -> impl Iterator<Item = i32> + '_ {
    opnds.iter().filter_map(|c| match c {
        SemanticContext::Precedence(p) => Some(*p),
        _ => None,
    })
}

/// Build an `And`/`Or` from `opnds`, replacing all precedence predicates with `keep_prec`.
fn combine(
    mut opnds: Vec<SemanticContext>,
    keep_prec: Option<i32>,
    ctor: fn(Vec<SemanticContext>) -> SemanticContext,
) -> SemanticContext {
    opnds.retain(|c| !matches!(c, SemanticContext::Precedence(_)));
    if let Some(p) = keep_prec {
        opnds.push(SemanticContext::Precedence(p));
    }
    opnds.sort();
    opnds.dedup();
    if opnds.len() == 1 {
        opnds.pop().unwrap_or_default()
    } else {
        ctor(opnds)
    }
}

impl fmt::Display for SemanticContext {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            SemanticContext::None => write!(f, "{{true}}?"),
            SemanticContext::Predicate { rule, pred, .. } => write!(f, "{{{}:{}}}?", rule, pred),
            SemanticContext::Precedence(p) => write!(f, "{{{}>=prec}}?", p),
            SemanticContext::And(v) => {
                let s = v.iter().map(|c| c.to_string()).collect::<Vec<_>>();
                write!(f, "{}", s.join("&&"))
            }
            SemanticContext::Or(v) => {
                let s = v.iter().map(|c| c.to_string()).collect::<Vec<_>>();
                write!(f, "{}", s.join("||"))
            }
        }
    }
}
