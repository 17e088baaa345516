use std::{
    fmt,
    hash::{Hash, Hasher},
};

use atngrammar::StIdx;
use fnv::FnvHashMap;

use crate::{
    altset::AltSet,
    config::AtnConfig,
    context::{MergeCache, PredictionContext, PredictionContextCache},
    semantic::SemanticContext,
};

type LookupKey = (StIdx, u32, SemanticContext);

/// An insertion-ordered set of configs representing every interpretation live at one input
/// position.
///
/// Parser sets identify configs by `(state, alt, semantic context)`: adding a config which
/// matches an existing one merges their prediction contexts. Lexer ("ordered") sets only merge
/// configs which are equal in every respect, so that the order in which alternatives were reached
/// is preserved.
#[derive(Clone, Debug)]
pub struct AtnConfigSet {
    configs: Vec<AtnConfig>,
    lookup: FnvHashMap<LookupKey, Vec<usize>>,
    full_ctx: bool,
    ordered: bool,
    /// Set when prediction finds that every config predicts the same alternative.
    pub unique_alt: Option<u32>,
    /// Set when prediction stops at an SLL conflict.
    pub conflicting_alts: Option<AltSet>,
    has_semantic_context: bool,
    dips_into_outer_context: bool,
    readonly: bool,
}

impl AtnConfigSet {
    pub fn new(full_ctx: bool) -> Self {
        AtnConfigSet {
            configs: Vec::new(),
            lookup: FnvHashMap::default(),
            full_ctx,
            ordered: false,
            unique_alt: None,
            conflicting_alts: None,
            has_semantic_context: false,
            dips_into_outer_context: false,
            readonly: false,
        }
    }

    /// A set for lexer simulation.
    pub fn new_ordered() -> Self {
        AtnConfigSet {
            ordered: true,
            ..AtnConfigSet::new(false)
        }
    }

    /// Add `config`, merging it with an existing equivalent config if there is one.
    pub fn add(&mut self, config: AtnConfig, cache: Option<&MergeCache>) {
        debug_assert!(!self.readonly);
        if !config.semantic.is_none() {
            self.has_semantic_context = true;
        }
        if config.outer_context_depth() > 0 {
            self.dips_into_outer_context = true;
        }
        let key = (config.state, config.alt, config.semantic.clone());
        let bucket = self.lookup.entry(key).or_default();
        let existing = if self.ordered {
            bucket.iter().copied().find(|&i| self.configs[i] == config)
        } else {
            bucket.first().copied()
        };
        match existing {
            None => {
                bucket.push(self.configs.len());
                self.configs.push(config);
            }
            Some(i) => {
                let e = &mut self.configs[i];
                // In SLL prediction `$` means "any context", whereas full-context prediction must
                // keep it distinct.
                let root_is_wildcard = !self.full_ctx;
                e.context =
                    PredictionContext::merge(&e.context, &config.context, root_is_wildcard, cache);
                e.reaches_into_outer_context = e
                    .reaches_into_outer_context
                    .max(config.reaches_into_outer_context);
                if config.precedence_filter_suppressed {
                    e.precedence_filter_suppressed = true;
                }
            }
        }
    }

    pub fn len(&self) -> usize {
        self.configs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.configs.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, AtnConfig> {
        self.configs.iter()
    }

    pub fn configs(&self) -> &[AtnConfig] {
        &self.configs
    }

    pub fn full_ctx(&self) -> bool {
        self.full_ctx
    }

    pub fn has_semantic_context(&self) -> bool {
        self.has_semantic_context
    }

    pub fn dips_into_outer_context(&self) -> bool {
        self.dips_into_outer_context
    }

    pub fn set_dips_into_outer_context(&mut self) {
        self.dips_into_outer_context = true;
    }

    /// The set of alternatives predicted by at least one config.
    pub fn alts(&self) -> AltSet {
        self.configs.iter().map(|c| c.alt).collect()
    }

    /// Replace every config's context with its interned equivalent and freeze the set.
    pub fn optimize(&mut self, cache: &PredictionContextCache) {
        for c in &mut self.configs {
            c.context = cache.intern(&c.context);
        }
        self.readonly = true;
    }

    pub fn is_readonly(&self) -> bool {
        self.readonly
    }
}

impl PartialEq for AtnConfigSet {
    fn eq(&self, other: &Self) -> bool {
        self.configs == other.configs
            && self.full_ctx == other.full_ctx
            && self.unique_alt == other.unique_alt
            && self.conflicting_alts == other.conflicting_alts
            && self.has_semantic_context == other.has_semantic_context
            && self.dips_into_outer_context == other.dips_into_outer_context
    }
}

impl Eq for AtnConfigSet {}

impl Hash for AtnConfigSet {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.configs.hash(state);
    }
}

impl<'a> IntoIterator for &'a AtnConfigSet {
    type Item = &'a AtnConfig;
    type IntoIter = std::slice::Iter<'a, AtnConfig>;

    fn into_iter(self) -> Self::IntoIter {
        self.configs.iter()
    }
}

impl fmt::Display for AtnConfigSet {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let cs = self.configs.iter().map(|c| c.to_string()).collect::<Vec<_>>();
        write!(f, "[{}]", cs.join(","))?;
        if self.has_semantic_context {
            write!(f, ",hasSemanticContext")?;
        }
        if let Some(a) = self.unique_alt {
            write!(f, ",uniqueAlt={}", a)?;
        }
        if let Some(c) = &self.conflicting_alts {
            write!(f, ",conflictingAlts={}", c)?;
        }
        if self.dips_into_outer_context {
            write!(f, ",dipsIntoOuterContext")?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod test {
    use super::*;

    fn ctx(rs: i32) -> PredictionContext {
        PredictionContext::singleton(PredictionContext::empty(), rs)
    }

    #[test]
    fn test_merge_on_add() {
        let mut s = AtnConfigSet::new(true);
        s.add(AtnConfig::new(StIdx(3), 1, ctx(10)), None);
        s.add(AtnConfig::new(StIdx(3), 1, ctx(11)), None);
        s.add(AtnConfig::new(StIdx(3), 2, ctx(10)), None);
        assert_eq!(s.len(), 2);
        assert_eq!(s.configs()[0].context.to_string(), "[10, 11]");
        assert_eq!(s.alts(), [1, 2].into_iter().collect());
        assert!(!s.has_semantic_context());
    }

    #[test]
    fn test_sll_wildcard_root() {
        let mut s = AtnConfigSet::new(false);
        s.add(AtnConfig::new(StIdx(3), 1, ctx(10)), None);
        s.add(AtnConfig::new(StIdx(3), 1, PredictionContext::empty()), None);
        assert_eq!(s.len(), 1);
        assert!(s.configs()[0].context.is_empty());
    }

    #[test]
    fn test_ordered() {
        let mut s = AtnConfigSet::new_ordered();
        s.add(AtnConfig::new(StIdx(3), 1, ctx(10)), None);
        s.add(AtnConfig::new(StIdx(3), 1, ctx(11)), None);
        s.add(AtnConfig::new(StIdx(3), 1, ctx(10)), None);
        assert_eq!(s.len(), 2);
    }

    #[test]
    fn test_flags_and_eq() {
        let mut s = AtnConfigSet::new(false);
        let mut c = AtnConfig::new(StIdx(1), 1, ctx(4));
        c.reaches_into_outer_context = 1;
        c.semantic = SemanticContext::Precedence(2);
        s.add(c, None);
        assert!(s.dips_into_outer_context());
        assert!(s.has_semantic_context());
        let t = s.clone();
        assert_eq!(s, t);
        s.unique_alt = Some(1);
        assert_ne!(s, t);
    }
}
