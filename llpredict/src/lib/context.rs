//! Prediction contexts: graph-structured stacks of rule return states.
//!
//! A context is immutable and shared via `Arc`. Merging two contexts never mutates either input:
//! it allocates new nodes which reuse the unchanged parts of both.

use std::{
    fmt,
    hash::{Hash, Hasher},
    sync::{Arc, OnceLock},
};

use atngrammar::{Atn, StIdx};
use fnv::{FnvHashMap, FnvHasher};
use parking_lot::Mutex;

/// The return state of the empty context `$`. Sorts after every real return state.
pub const EMPTY_RETURN_STATE: i32 = i32::MAX;

/// The default bound on the number of entries a [MergeCache] holds before it is cleared.
const DEFAULT_MERGE_CACHE_LIMIT: usize = 1 << 16;

#[derive(Clone)]
pub struct PredictionContext(Arc<Node>);

struct Node {
    hash: u64,
    kind: Kind,
}

enum Kind {
    Empty,
    Singleton {
        parent: PredictionContext,
        return_state: i32,
    },
    /// Return states are sorted, with [EMPTY_RETURN_STATE] (if present) last. The parent of
    /// the `$` entry is the empty context.
    Array {
        parents: Vec<PredictionContext>,
        return_states: Vec<i32>,
    },
}

fn empty_ctx() -> &'static PredictionContext {
    static EMPTY: OnceLock<PredictionContext> = OnceLock::new();
    EMPTY.get_or_init(|| {
        PredictionContext(Arc::new(Node {
            hash: 1,
            kind: Kind::Empty,
        }))
    })
}

impl PredictionContext {
    /// The empty context `$`: the bottom of every stack.
    pub fn empty() -> Self {
        empty_ctx().clone()
    }

    /// Push `return_state` on top of `parent`.
    pub fn singleton(parent: PredictionContext, return_state: i32) -> Self {
        if return_state == EMPTY_RETURN_STATE && parent.is_empty() {
            return PredictionContext::empty();
        }
        let mut h = FnvHasher::default();
        parent.0.hash.hash(&mut h);
        return_state.hash(&mut h);
        PredictionContext(Arc::new(Node {
            hash: h.finish(),
            kind: Kind::Singleton {
                parent,
                return_state,
            },
        }))
    }

    fn array(parents: Vec<PredictionContext>, return_states: Vec<i32>) -> Self {
        debug_assert_eq!(parents.len(), return_states.len());
        debug_assert!(!parents.is_empty());
        if return_states.len() == 1 {
            return PredictionContext::singleton(parents[0].clone(), return_states[0]);
        }
        let mut h = FnvHasher::default();
        for (p, r) in parents.iter().zip(return_states.iter()) {
            p.0.hash.hash(&mut h);
            r.hash(&mut h);
        }
        PredictionContext(Arc::new(Node {
            hash: h.finish(),
            kind: Kind::Array {
                parents,
                return_states,
            },
        }))
    }

    /// Build the context for a rule invocation stack, given as the states which invoked each
    /// rule, innermost first. The outermost (start) rule has no invoking state and is not part
    /// of `invoking`.
    pub fn from_invoking_states(atn: &Atn, invoking: &[StIdx]) -> Self {
        let mut ctx = PredictionContext::empty();
        for &s in invoking.iter().rev() {
            if let Some(follow) = atn.follow_of(s) {
                ctx = PredictionContext::singleton(ctx, follow.0 as i32);
            }
        }
        ctx
    }

    pub fn is_empty(&self) -> bool {
        matches!(self.0.kind, Kind::Empty)
    }

    /// How many return states does this context's top hold?
    pub fn len(&self) -> usize {
        match &self.0.kind {
            Kind::Empty | Kind::Singleton { .. } => 1,
            Kind::Array { return_states, .. } => return_states.len(),
        }
    }

    pub fn return_state(&self, i: usize) -> i32 {
        match &self.0.kind {
            Kind::Empty => EMPTY_RETURN_STATE,
            Kind::Singleton { return_state, .. } => *return_state,
            Kind::Array { return_states, .. } => return_states[i],
        }
    }

    /// The context below the `i`th return state, or `None` for `$`.
    pub fn parent(&self, i: usize) -> Option<&PredictionContext> {
        match &self.0.kind {
            Kind::Empty => None,
            Kind::Singleton { parent, .. } => Some(parent),
            Kind::Array {
                parents,
                return_states,
            } => {
                if return_states[i] == EMPTY_RETURN_STATE {
                    None
                } else {
                    Some(&parents[i])
                }
            }
        }
    }

    /// Does some path through this context end in `$`?
    pub fn has_empty_path(&self) -> bool {
        self.return_state(self.len() - 1) == EMPTY_RETURN_STATE
    }

    fn is_singleton(&self) -> bool {
        matches!(self.0.kind, Kind::Empty | Kind::Singleton { .. })
    }

    fn parent_or_empty(&self, i: usize) -> PredictionContext {
        match &self.0.kind {
            Kind::Empty => PredictionContext::empty(),
            Kind::Singleton { parent, .. } => parent.clone(),
            Kind::Array { parents, .. } => parents[i].clone(),
        }
    }

    fn as_arrays(&self) -> (Vec<PredictionContext>, Vec<i32>) {
        match &self.0.kind {
            Kind::Empty => (vec![PredictionContext::empty()], vec![EMPTY_RETURN_STATE]),
            Kind::Singleton {
                parent,
                return_state,
            } => (vec![parent.clone()], vec![*return_state]),
            Kind::Array {
                parents,
                return_states,
            } => (parents.clone(), return_states.clone()),
        }
    }

    /// Merge `a` and `b` into a context representing both stacks. When `root_is_wildcard` (SLL
    /// prediction) `$` stands for "any stack" and absorbs whatever it is merged with; otherwise
    /// (full-context prediction) `$` is kept as a distinct entry.
    pub fn merge(
        a: &PredictionContext,
        b: &PredictionContext,
        root_is_wildcard: bool,
        cache: Option<&MergeCache>,
    ) -> PredictionContext {
        if a == b {
            return a.clone();
        }
        if a.is_singleton() && b.is_singleton() {
            return merge_singletons(a, b, root_is_wildcard, cache);
        }
        if root_is_wildcard {
            if a.is_empty() {
                return a.clone();
            }
            if b.is_empty() {
                return b.clone();
            }
        }
        merge_arrays(a, b, root_is_wildcard, cache)
    }
}

fn merge_root(
    a: &PredictionContext,
    b: &PredictionContext,
    root_is_wildcard: bool,
) -> Option<PredictionContext> {
    if root_is_wildcard {
        if a.is_empty() || b.is_empty() {
            return Some(PredictionContext::empty());
        }
    } else {
        if a.is_empty() && b.is_empty() {
            return Some(PredictionContext::empty());
        }
        if a.is_empty() {
            return Some(PredictionContext::array(
                vec![b.parent_or_empty(0), PredictionContext::empty()],
                vec![b.return_state(0), EMPTY_RETURN_STATE],
            ));
        }
        if b.is_empty() {
            return Some(PredictionContext::array(
                vec![a.parent_or_empty(0), PredictionContext::empty()],
                vec![a.return_state(0), EMPTY_RETURN_STATE],
            ));
        }
    }
    None
}

fn merge_singletons(
    a: &PredictionContext,
    b: &PredictionContext,
    root_is_wildcard: bool,
    cache: Option<&MergeCache>,
) -> PredictionContext {
    if let Some(c) = cache.and_then(|c| c.get(a, b, root_is_wildcard)) {
        return c;
    }
    let merged = merge_singletons_uncached(a, b, root_is_wildcard, cache);
    if let Some(c) = cache {
        c.insert(a, b, root_is_wildcard, &merged);
    }
    merged
}

fn merge_singletons_uncached(
    a: &PredictionContext,
    b: &PredictionContext,
    root_is_wildcard: bool,
    cache: Option<&MergeCache>,
) -> PredictionContext {
    if let Some(c) = merge_root(a, b, root_is_wildcard) {
        return c;
    }
    let (ra, rb) = (a.return_state(0), b.return_state(0));
    let (pa, pb) = (a.parent_or_empty(0), b.parent_or_empty(0));
    if ra == rb {
        let parent = PredictionContext::merge(&pa, &pb, root_is_wildcard, cache);
        if parent == pa {
            return a.clone();
        }
        if parent == pb {
            return b.clone();
        }
        return PredictionContext::singleton(parent, ra);
    }
    if pa == pb {
        let (lo, hi) = if ra < rb { (ra, rb) } else { (rb, ra) };
        return PredictionContext::array(vec![pa.clone(), pa], vec![lo, hi]);
    }
    if ra < rb {
        PredictionContext::array(vec![pa, pb], vec![ra, rb])
    } else {
        PredictionContext::array(vec![pb, pa], vec![rb, ra])
    }
}

fn merge_arrays(
    a: &PredictionContext,
    b: &PredictionContext,
    root_is_wildcard: bool,
    cache: Option<&MergeCache>,
) -> PredictionContext {
    if let Some(c) = cache.and_then(|c| c.get(a, b, root_is_wildcard)) {
        return c;
    }
    let (ap, ar) = a.as_arrays();
    let (bp, br) = b.as_arrays();
    let mut parents = Vec::with_capacity(ar.len() + br.len());
    let mut return_states = Vec::with_capacity(ar.len() + br.len());
    let (mut i, mut j) = (0, 0);
    while i < ar.len() && j < br.len() {
        if ar[i] == br[j] {
            if ap[i] == bp[j] {
                parents.push(ap[i].clone());
            } else {
                parents.push(PredictionContext::merge(
                    &ap[i],
                    &bp[j],
                    root_is_wildcard,
                    cache,
                ));
            }
            return_states.push(ar[i]);
            i += 1;
            j += 1;
        } else if ar[i] < br[j] {
            parents.push(ap[i].clone());
            return_states.push(ar[i]);
            i += 1;
        } else {
            parents.push(bp[j].clone());
            return_states.push(br[j]);
            j += 1;
        }
    }
    parents.extend(ap[i..].iter().cloned());
    return_states.extend_from_slice(&ar[i..]);
    parents.extend(bp[j..].iter().cloned());
    return_states.extend_from_slice(&br[j..]);

    let merged = if return_states.len() == 1 {
        PredictionContext::singleton(parents.swap_remove(0), return_states[0])
    } else {
        let m = PredictionContext::array(share_parents(parents), return_states);
        if m == *a {
            a.clone()
        } else if m == *b {
            b.clone()
        } else {
            m
        }
    };
    if let Some(c) = cache {
        c.insert(a, b, root_is_wildcard, &merged);
    }
    merged
}

/// Make structurally equal parents share one allocation.
fn share_parents(parents: Vec<PredictionContext>) -> Vec<PredictionContext> {
    let mut uniq: Vec<PredictionContext> = Vec::new();
    parents
        .into_iter()
        .map(|p| match uniq.iter().find(|u| **u == p) {
            Some(u) => u.clone(),
            None => {
                uniq.push(p.clone());
                p
            }
        })
        .collect()
}

impl PartialEq for PredictionContext {
    fn eq(&self, other: &Self) -> bool {
        if Arc::ptr_eq(&self.0, &other.0) {
            return true;
        }
        if self.0.hash != other.0.hash {
            return false;
        }
        match (&self.0.kind, &other.0.kind) {
            (Kind::Empty, Kind::Empty) => true,
            (
                Kind::Singleton {
                    parent: p1,
                    return_state: r1,
                },
                Kind::Singleton {
                    parent: p2,
                    return_state: r2,
                },
            ) => r1 == r2 && p1 == p2,
            (
                Kind::Array {
                    parents: p1,
                    return_states: r1,
                },
                Kind::Array {
                    parents: p2,
                    return_states: r2,
                },
            ) => r1 == r2 && p1 == p2,
            _ => false,
        }
    }
}

impl Eq for PredictionContext {}

impl Hash for PredictionContext {
    fn hash<H: Hasher>(&self, state: &mut H) {
        state.write_u64(self.0.hash);
    }
}

impl fmt::Debug for PredictionContext {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        fmt::Display::fmt(self, f)
    }
}

/// Contexts print as their return states, e.g. `[12 $]`, with parents nested after each entry.
impl fmt::Display for PredictionContext {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match &self.0.kind {
            Kind::Empty => write!(f, "$"),
            Kind::Singleton {
                parent,
                return_state,
            } => {
                if parent.is_empty() {
                    write!(f, "{}", return_state)
                } else {
                    write!(f, "{} {}", return_state, parent)
                }
            }
            Kind::Array {
                parents,
                return_states,
            } => {
                write!(f, "[")?;
                for (i, (p, r)) in parents.iter().zip(return_states.iter()).enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    if *r == EMPTY_RETURN_STATE {
                        write!(f, "$")?;
                    } else if p.is_empty() {
                        write!(f, "{}", r)?;
                    } else {
                        write!(f, "{} {}", r, p)?;
                    }
                }
                write!(f, "]")
            }
        }
    }
}

/// Memoizes context merges. The cache may be shared between threads and prediction calls; it
/// is cleared wholesale when it grows beyond its limit.
pub struct MergeCache {
    map: Mutex<FnvHashMap<(PredictionContext, PredictionContext, bool), PredictionContext>>,
    limit: usize,
}

impl MergeCache {
    pub fn new() -> Self {
        MergeCache::with_limit(DEFAULT_MERGE_CACHE_LIMIT)
    }

    pub fn with_limit(limit: usize) -> Self {
        MergeCache {
            map: Mutex::new(FnvHashMap::default()),
            limit,
        }
    }

    /// Look up the merge of `a` and `b` in either order.
    pub fn get(
        &self,
        a: &PredictionContext,
        b: &PredictionContext,
        root_is_wildcard: bool,
    ) -> Option<PredictionContext> {
        let map = self.map.lock();
        map.get(&(a.clone(), b.clone(), root_is_wildcard))
            .or_else(|| map.get(&(b.clone(), a.clone(), root_is_wildcard)))
            .cloned()
    }

    fn insert(
        &self,
        a: &PredictionContext,
        b: &PredictionContext,
        root_is_wildcard: bool,
        merged: &PredictionContext,
    ) {
        let mut map = self.map.lock();
        if map.len() >= self.limit {
            map.clear();
        }
        map.insert((a.clone(), b.clone(), root_is_wildcard), merged.clone());
    }

    pub fn len(&self) -> usize {
        self.map.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn clear(&self) {
        self.map.lock().clear();
    }
}

impl Default for MergeCache {
    fn default() -> Self {
        MergeCache::new()
    }
}

/// Interns contexts so that structurally equal contexts stored in DFA states share memory.
#[derive(Default)]
pub struct PredictionContextCache {
    map: Mutex<FnvHashMap<PredictionContext, PredictionContext>>,
}

impl PredictionContextCache {
    pub fn new() -> Self {
        PredictionContextCache::default()
    }

    /// Return the canonical instance of `ctx`, interning it (and, recursively, its parents) if
    /// it hasn't been seen before.
    pub fn intern(&self, ctx: &PredictionContext) -> PredictionContext {
        if ctx.is_empty() {
            return ctx.clone();
        }
        if let Some(c) = self.map.lock().get(ctx) {
            return c.clone();
        }
        let interned = match &ctx.0.kind {
            Kind::Empty => ctx.clone(),
            Kind::Singleton {
                parent,
                return_state,
            } => {
                let p = self.intern(parent);
                if Arc::ptr_eq(&p.0, &parent.0) {
                    ctx.clone()
                } else {
                    PredictionContext::singleton(p, *return_state)
                }
            }
            Kind::Array {
                parents,
                return_states,
            } => {
                let ps = parents.iter().map(|p| self.intern(p)).collect::<Vec<_>>();
                if ps.iter().zip(parents.iter()).all(|(x, y)| Arc::ptr_eq(&x.0, &y.0)) {
                    ctx.clone()
                } else {
                    PredictionContext::array(ps, return_states.clone())
                }
            }
        };
        self.map
            .lock()
            .entry(interned.clone())
            .or_insert(interned)
            .clone()
    }

    pub fn len(&self) -> usize {
        self.map.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod test {
    use std::collections::BTreeSet;

    use proptest::prelude::*;

    use super::*;

    fn s(parent: &PredictionContext, rs: i32) -> PredictionContext {
        PredictionContext::singleton(parent.clone(), rs)
    }

    fn e() -> PredictionContext {
        PredictionContext::empty()
    }

    #[test]
    fn test_structural_equality() {
        let a = s(&s(&e(), 1), 2);
        let b = s(&s(&e(), 1), 2);
        assert!(!Arc::ptr_eq(&a.0, &b.0));
        assert_eq!(a, b);
        assert_ne!(a, s(&s(&e(), 1), 3));
        assert_eq!(s(&e(), EMPTY_RETURN_STATE), e());
    }

    #[test]
    fn test_merge_root() {
        let x = s(&e(), 5);
        // SLL: $ is a wildcard.
        assert!(PredictionContext::merge(&e(), &x, true, None).is_empty());
        assert!(PredictionContext::merge(&x, &e(), true, None).is_empty());
        // LL: $ is a distinct stack.
        let m = PredictionContext::merge(&x, &e(), false, None);
        assert_eq!(m.len(), 2);
        assert_eq!(m.return_state(0), 5);
        assert_eq!(m.return_state(1), EMPTY_RETURN_STATE);
        assert!(m.parent(1).is_none());
        assert!(m.has_empty_path());
        assert_eq!(m.to_string(), "[5, $]");
    }

    #[test]
    fn test_merge_singletons() {
        let p = s(&e(), 1);
        // Same return state, different parents: merge the parents.
        let a = s(&p, 9);
        let b = s(&s(&e(), 2), 9);
        let m = PredictionContext::merge(&a, &b, false, None);
        assert_eq!(m.len(), 1);
        assert_eq!(m.return_state(0), 9);
        assert_eq!(m.parent(0).unwrap().to_string(), "[1, 2]");
        // Same parent, different return states: one array, sorted.
        let m = PredictionContext::merge(&s(&p, 7), &s(&p, 3), false, None);
        assert_eq!(m.to_string(), "[3 1, 7 1]");
        assert!(Arc::ptr_eq(&m.parent(0).unwrap().0, &m.parent(1).unwrap().0));
        // Identical inputs come back unchanged.
        let m = PredictionContext::merge(&a, &a.clone(), true, None);
        assert!(Arc::ptr_eq(&m.0, &a.0));
    }

    #[test]
    fn test_merge_arrays() {
        let x = PredictionContext::merge(&s(&e(), 1), &s(&e(), 3), false, None);
        let y = PredictionContext::merge(&s(&e(), 2), &s(&e(), 3), false, None);
        let m = PredictionContext::merge(&x, &y, false, None);
        assert_eq!(m.to_string(), "[1, 2, 3]");
        // Merging a subset returns the superset itself.
        let m2 = PredictionContext::merge(&m, &x, false, None);
        assert!(Arc::ptr_eq(&m2.0, &m.0));
        // SLL: $ absorbs arrays.
        assert!(PredictionContext::merge(&m, &e(), true, None).is_empty());
        let m3 = PredictionContext::merge(&m, &e(), false, None);
        assert_eq!(m3.to_string(), "[1, 2, 3, $]");
    }

    #[test]
    fn test_merge_cache() {
        let cache = MergeCache::with_limit(2);
        let a = s(&s(&e(), 1), 4);
        let b = s(&s(&e(), 2), 4);
        let m = PredictionContext::merge(&a, &b, false, Some(&cache));
        assert_eq!(cache.get(&b, &a, false), Some(m.clone()));
        assert_eq!(cache.get(&a, &b, true), None);
        let m2 = PredictionContext::merge(&b, &a, false, Some(&cache));
        assert_eq!(m, m2);
        assert!(cache.len() <= 2);
        cache.clear();
        assert!(cache.is_empty());
    }

    #[test]
    fn test_from_invoking_states() {
        use atngrammar::{AtnBuilder, Elem, Vocabulary};
        let vocab = Vocabulary::new(vec![None, None], vec![None, Some("A".to_owned())]);
        let gi = AtnBuilder::parser("T", vocab)
            .rule("s", Elem::seq([Elem::rule("a"), Elem::Symbol(atngrammar::TOKEN_EOF)]))
            .rule("a", Elem::tok("A"))
            .build()
            .unwrap();
        let atn = gi.atn();
        let invoking = atn
            .states()
            .find(|st| matches!(st.transitions().first(), Some(atngrammar::Transition::Rule { .. })))
            .unwrap()
            .stidx();
        let follow = atn.follow_of(invoking).unwrap();
        let ctx = PredictionContext::from_invoking_states(atn, &[invoking]);
        assert_eq!(ctx.len(), 1);
        assert_eq!(ctx.return_state(0), follow.0 as i32);
        assert!(ctx.parent(0).unwrap().is_empty());
        assert!(PredictionContext::from_invoking_states(atn, &[]).is_empty());
    }

    #[test]
    fn test_intern() {
        let cache = PredictionContextCache::new();
        let a = s(&s(&e(), 1), 2);
        let b = s(&s(&e(), 1), 2);
        let ia = cache.intern(&a);
        let ib = cache.intern(&b);
        assert!(Arc::ptr_eq(&ia.0, &ib.0));
        assert_eq!(cache.len(), 2);
    }

    /// Every stack `ctx` represents, top first, down to `$`.
    fn paths(ctx: &PredictionContext) -> BTreeSet<Vec<i32>> {
        let mut out = BTreeSet::new();
        if ctx.is_empty() {
            out.insert(Vec::new());
            return out;
        }
        for i in 0..ctx.len() {
            let rs = ctx.return_state(i);
            match ctx.parent(i) {
                Some(p) if rs != EMPTY_RETURN_STATE => {
                    for mut tail in paths(p) {
                        tail.insert(0, rs);
                        out.insert(tail);
                    }
                }
                _ => {
                    out.insert(Vec::new());
                }
            }
        }
        out
    }

    /// The context holding each of `stacks` (top first), merged in `root_is_wildcard` mode.
    fn build(stacks: &[Vec<i32>], root_is_wildcard: bool) -> PredictionContext {
        let chain = |st: &Vec<i32>| st.iter().rev().fold(e(), |ctx, rs| s(&ctx, *rs));
        stacks
            .iter()
            .skip(1)
            .fold(chain(&stacks[0]), |acc, st| {
                PredictionContext::merge(&acc, &chain(st), root_is_wildcard, None)
            })
    }

    fn stacks() -> impl Strategy<Value = Vec<Vec<i32>>> {
        proptest::collection::vec(proptest::collection::vec(1i32..5, 0..4), 1..4)
    }

    proptest! {
        #[test]
        fn prop_full_context_merge_is_union(xs in stacks(), ys in stacks()) {
            let (a, b) = (build(&xs, false), build(&ys, false));
            prop_assert_eq!(paths(&a), xs.iter().cloned().collect::<BTreeSet<_>>());
            let m = PredictionContext::merge(&a, &b, false, None);
            let union = paths(&a).union(&paths(&b)).cloned().collect::<BTreeSet<_>>();
            prop_assert_eq!(paths(&m), union);
            prop_assert_eq!(&m, &PredictionContext::merge(&b, &a, false, None));
            prop_assert_eq!(&m, &PredictionContext::merge(&m, &a, false, None));
            prop_assert_eq!(&m, &PredictionContext::merge(&b, &m, false, None));
            let cache = MergeCache::new();
            prop_assert_eq!(&m, &PredictionContext::merge(&a, &b, false, Some(&cache)));
        }

        #[test]
        fn prop_sll_merge_covers_both(xs in stacks(), ys in stacks()) {
            let (a, b) = (build(&xs, true), build(&ys, true));
            let m = PredictionContext::merge(&a, &b, true, None);
            // `$` stands for any stack, so each input stack need only extend some merged one.
            let merged = paths(&m);
            for p in paths(&a).iter().chain(paths(&b).iter()) {
                prop_assert!(merged.iter().any(|q| p.starts_with(q)), "{:?} lost in {}", p, m);
            }
            prop_assert_eq!(&m, &PredictionContext::merge(&b, &a, true, None));
            prop_assert_eq!(&m, &PredictionContext::merge(&m, &a, true, None));
            prop_assert_eq!(&m, &PredictionContext::merge(&b, &m, true, None));
            let cache = MergeCache::new();
            prop_assert_eq!(&m, &PredictionContext::merge(&a, &b, true, Some(&cache)));
        }
    }
}
