//! Parse trees, and the listener and visitor interfaces for walking them.

use atngrammar::{RIdx, StIdx};
#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use crate::{
    error::RecognitionError,
    token::{escape_ws, Token},
};

/// A parse tree node.
#[derive(Clone, Debug)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum ParseTree {
    /// A token matched by the parser.
    Terminal(Token),
    /// A token which error recovery either skipped over or conjured up.
    Error(Token),
    Rule(RuleNode),
}

/// The node for one invocation of a rule.
#[derive(Clone, Debug)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct RuleNode {
    rule: RIdx,
    invoking_state: Option<StIdx>,
    alt: u32,
    start: Option<Token>,
    stop: Option<Token>,
    children: Vec<ParseTree>,
    #[cfg_attr(feature = "serde", serde(skip))]
    exception: Option<RecognitionError>,
}

impl RuleNode {
    pub(crate) fn new(rule: RIdx, invoking_state: Option<StIdx>, start: Option<Token>) -> Self {
        RuleNode {
            rule,
            invoking_state,
            alt: 0,
            start,
            stop: None,
            children: Vec::new(),
            exception: None,
        }
    }

    pub fn rule(&self) -> RIdx {
        self.rule
    }

    /// The ATN state which invoked this rule, or `None` for the start rule.
    pub fn invoking_state(&self) -> Option<StIdx> {
        self.invoking_state
    }

    pub(crate) fn set_invoking_state(&mut self, s: Option<StIdx>) {
        self.invoking_state = s;
    }

    /// The outer alternative of the rule which matched (`0` if it was not recorded).
    pub fn alt(&self) -> u32 {
        self.alt
    }

    pub(crate) fn set_alt(&mut self, alt: u32) {
        self.alt = alt;
    }

    /// The first token the rule matched.
    pub fn start(&self) -> Option<&Token> {
        self.start.as_ref()
    }

    /// The last token the rule matched. If the rule matched nothing, this precedes `start`.
    pub fn stop(&self) -> Option<&Token> {
        self.stop.as_ref()
    }

    pub(crate) fn set_stop(&mut self, t: Option<Token>) {
        self.stop = t;
    }

    pub fn children(&self) -> &[ParseTree] {
        &self.children
    }

    pub fn child(&self, i: usize) -> Option<&ParseTree> {
        self.children.get(i)
    }

    pub(crate) fn add_child(&mut self, c: ParseTree) {
        self.children.push(c);
    }

    /// The error which stopped this rule from matching, if any.
    pub fn exception(&self) -> Option<&RecognitionError> {
        self.exception.as_ref()
    }

    pub(crate) fn set_exception(&mut self, e: RecognitionError) {
        self.exception = Some(e);
    }

    /// The concatenated text of all the tokens below this node.
    pub fn text(&self) -> String {
        let mut s = String::new();
        for c in &self.children {
            c.push_text(&mut s);
        }
        s
    }
}

impl ParseTree {
    pub fn is_rule(&self) -> bool {
        matches!(self, ParseTree::Rule(_))
    }

    pub fn as_rule(&self) -> Option<&RuleNode> {
        match self {
            ParseTree::Rule(n) => Some(n),
            _ => None,
        }
    }

    pub fn token(&self) -> Option<&Token> {
        match self {
            ParseTree::Terminal(t) | ParseTree::Error(t) => Some(t),
            ParseTree::Rule(_) => None,
        }
    }

    pub fn children(&self) -> &[ParseTree] {
        match self {
            ParseTree::Rule(n) => n.children(),
            _ => &[],
        }
    }

    /// The concatenated text of all the tokens in the tree, including tokens which error
    /// recovery conjured up or skipped.
    pub fn text(&self) -> String {
        let mut s = String::new();
        self.push_text(&mut s);
        s
    }

    fn push_text(&self, s: &mut String) {
        for n in self.preorder() {
            if let Some(t) = n.token() {
                s.push_str(t.text());
            }
        }
    }

    /// Iterate over this node and all its descendants, in depth-first pre-order.
    pub fn preorder(&self) -> impl Iterator<Item = &ParseTree> {
        let mut st = vec![self];
        std::iter::from_fn(move || {
            let n = st.pop()?;
            st.extend(n.children().iter().rev());
            Some(n)
        })
    }

    /// The leaves (tokens) of the tree, left to right.
    pub fn leaves(&self) -> impl Iterator<Item = &ParseTree> {
        self.preorder().filter(|n| !n.is_rule())
    }

    /// All the rule nodes in the tree for `rule`.
    pub fn find_all_rule_nodes(&self, rule: RIdx) -> Vec<&RuleNode> {
        self.preorder()
            .filter_map(|n| n.as_rule())
            .filter(|n| n.rule == rule)
            .collect()
    }

    /// All the tokens of type `ttype` that the parser matched.
    pub fn find_all_token_nodes(&self, ttype: i32) -> Vec<&Token> {
        self.preorder()
            .filter_map(|n| match n {
                ParseTree::Terminal(t) if t.ttype() == ttype => Some(t),
                _ => None,
            })
            .collect()
    }

    /// Render the tree in LISP-like form: `(rule child1 child2 ...)`. Rule names are looked up in
    /// `rule_names`.
    pub fn to_string_tree(&self, rule_names: &[String]) -> String {
        // Stack of (node, children already rendered, first child of its parent) triples.
        let mut st = vec![(self, false, true)];
        let mut s = String::new();
        while let Some((n, done, first)) = st.pop() {
            if !done && !first {
                s.push(' ');
            }
            match n {
                ParseTree::Rule(r) if done => {
                    if !r.children.is_empty() {
                        s.push(')');
                    }
                }
                ParseTree::Rule(r) => {
                    let name = rule_names
                        .get(usize::from(r.rule))
                        .map(|n| n.as_str())
                        .unwrap_or("<unknown>");
                    if r.children.is_empty() {
                        s.push_str(name);
                        continue;
                    }
                    s.push('(');
                    s.push_str(name);
                    st.push((n, true, first));
                    st.extend(r.children.iter().rev().map(|c| (c, false, false)));
                }
                ParseTree::Terminal(t) | ParseTree::Error(t) => {
                    s.push_str(&escape_ws(t.text()));
                }
            }
        }
        s
    }
}

/// Receives events as a [ParseTreeWalker] walks a tree, or as a parser builds one.
pub trait ParseTreeListener {
    fn enter_every_rule(&mut self, _node: &RuleNode) {}
    fn exit_every_rule(&mut self, _node: &RuleNode) {}
    fn visit_terminal(&mut self, _token: &Token) {}
    fn visit_error_node(&mut self, _token: &Token) {}
}

/// Walks a parse tree depth-first, firing [ParseTreeListener] events.
pub struct ParseTreeWalker;

impl ParseTreeWalker {
    pub fn walk<L: ParseTreeListener + ?Sized>(listener: &mut L, tree: &ParseTree) {
        let mut st = vec![(tree, false)];
        while let Some((n, exiting)) = st.pop() {
            match n {
                ParseTree::Terminal(t) => listener.visit_terminal(t),
                ParseTree::Error(t) => listener.visit_error_node(t),
                ParseTree::Rule(r) if exiting => listener.exit_every_rule(r),
                ParseTree::Rule(r) => {
                    listener.enter_every_rule(r);
                    st.push((n, true));
                    st.extend(r.children.iter().rev().map(|c| (c, false)));
                }
            }
        }
    }
}

/// Computes a value from a parse tree. Implementors must at least provide
/// [ParseTreeVisitor::default_result]; by default every rule node visits its children in order
/// and returns the result of the last one.
pub trait ParseTreeVisitor {
    type Output;

    fn default_result(&mut self) -> Self::Output;

    fn visit(&mut self, tree: &ParseTree) -> Self::Output {
        match tree {
            ParseTree::Terminal(t) => self.visit_terminal(t),
            ParseTree::Error(t) => self.visit_error_node(t),
            ParseTree::Rule(r) => self.visit_rule(r),
        }
    }

    fn visit_rule(&mut self, node: &RuleNode) -> Self::Output {
        self.visit_children(node)
    }

    fn visit_terminal(&mut self, _token: &Token) -> Self::Output {
        self.default_result()
    }

    fn visit_error_node(&mut self, _token: &Token) -> Self::Output {
        self.default_result()
    }

    fn visit_children(&mut self, node: &RuleNode) -> Self::Output {
        let mut result = self.default_result();
        for c in node.children() {
            if !self.should_visit_next_child(node, &result) {
                break;
            }
            let r = self.visit(c);
            result = self.aggregate_result(result, r);
        }
        result
    }

    fn aggregate_result(&mut self, _aggregate: Self::Output, next: Self::Output) -> Self::Output {
        next
    }

    fn should_visit_next_child(&mut self, _node: &RuleNode, _current: &Self::Output) -> bool {
        true
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use atngrammar::Span;

    fn tok(ttype: i32, text: &str, off: usize) -> Token {
        Token::new(ttype, text, Span::new(off, off + text.len()), 1, off)
    }

    // (s (e a) + (e b) <missing ';'>)
    fn tree() -> ParseTree {
        let mut e1 = RuleNode::new(RIdx(1), Some(StIdx(3)), Some(tok(1, "a", 0)));
        e1.add_child(ParseTree::Terminal(tok(1, "a", 0)));
        let mut e2 = RuleNode::new(RIdx(1), Some(StIdx(5)), Some(tok(1, "b", 2)));
        e2.add_child(ParseTree::Terminal(tok(1, "b", 2)));
        let mut s = RuleNode::new(RIdx(0), None, Some(tok(1, "a", 0)));
        s.add_child(ParseTree::Rule(e1));
        s.add_child(ParseTree::Terminal(tok(2, "+", 1)));
        s.add_child(ParseTree::Rule(e2));
        s.add_child(ParseTree::Error(Token::conjured(3, "<missing ';'>", 1, 3)));
        ParseTree::Rule(s)
    }

    fn names() -> Vec<String> {
        vec!["s".to_owned(), "e".to_owned()]
    }

    #[test]
    fn test_to_string_tree() {
        assert_eq!(
            tree().to_string_tree(&names()),
            "(s (e a) + (e b) <missing ';'>)"
        );
        let empty = ParseTree::Rule(RuleNode::new(RIdx(1), None, None));
        assert_eq!(empty.to_string_tree(&names()), "e");
    }

    #[test]
    fn test_to_string_tree_paren_tokens() {
        // (e ( (e 1) ))
        let mut inner = RuleNode::new(RIdx(1), Some(StIdx(4)), Some(tok(1, "1", 1)));
        inner.add_child(ParseTree::Terminal(tok(1, "1", 1)));
        let mut outer = RuleNode::new(RIdx(1), None, Some(tok(4, "(", 0)));
        outer.add_child(ParseTree::Terminal(tok(4, "(", 0)));
        outer.add_child(ParseTree::Rule(inner));
        outer.add_child(ParseTree::Terminal(tok(5, ")", 2)));
        outer.add_child(ParseTree::Rule(RuleNode::new(RIdx(0), None, None)));
        assert_eq!(
            ParseTree::Rule(outer).to_string_tree(&names()),
            "(e ( (e 1) ) s)"
        );
    }

    #[test]
    fn test_text_and_search() {
        let t = tree();
        assert_eq!(t.text(), "a+b<missing ';'>");
        assert_eq!(t.find_all_rule_nodes(RIdx(1)).len(), 2);
        assert_eq!(t.find_all_token_nodes(1).len(), 2);
        assert_eq!(t.leaves().count(), 4);
        assert_eq!(t.as_rule().unwrap().child(1).unwrap().token().unwrap().text(), "+");
    }

    #[derive(Default)]
    struct Recorder(Vec<String>);

    impl ParseTreeListener for Recorder {
        fn enter_every_rule(&mut self, n: &RuleNode) {
            self.0.push(format!("enter {}", n.rule()));
        }
        fn exit_every_rule(&mut self, n: &RuleNode) {
            self.0.push(format!("exit {}", n.rule()));
        }
        fn visit_terminal(&mut self, t: &Token) {
            self.0.push(t.text().to_owned());
        }
        fn visit_error_node(&mut self, t: &Token) {
            self.0.push(format!("error {}", t.text()));
        }
    }

    #[test]
    fn test_walker() {
        let mut r = Recorder::default();
        ParseTreeWalker::walk(&mut r, &tree());
        assert_eq!(
            r.0,
            vec![
                "enter 0",
                "enter 1",
                "a",
                "exit 1",
                "+",
                "enter 1",
                "b",
                "exit 1",
                "error <missing ';'>",
                "exit 0"
            ]
        );
    }

    struct CountLeaves;

    impl ParseTreeVisitor for CountLeaves {
        type Output = usize;

        fn default_result(&mut self) -> usize {
            0
        }

        fn visit_terminal(&mut self, _t: &Token) -> usize {
            1
        }

        fn aggregate_result(&mut self, agg: usize, next: usize) -> usize {
            agg + next
        }
    }

    #[test]
    fn test_visitor() {
        assert_eq!(CountLeaves.visit(&tree()), 3);
    }
}
