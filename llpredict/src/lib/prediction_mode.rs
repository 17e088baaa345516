//! Prediction modes and the conflict analyses which decide when SLL prediction can stop.

use atngrammar::{Atn, StIdx};
use indexmap::IndexMap;

use crate::{
    altset::AltSet, config::AtnConfig, configset::AtnConfigSet, context::PredictionContext,
    semantic::SemanticContext,
};

/// How hard [crate::ParserAtnSimulator::adaptive_predict] works to resolve a decision.
#[derive(Clone, Copy, Debug, Default, Eq, Hash, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum PredictionMode {
    /// Ignore the outer call stack. Fastest; on a conflict picks the lowest alternative, which
    /// may reject some inputs that the grammar accepts.
    Sll,
    /// SLL first, retrying with the full call stack when SLL finds a conflict. Recognizes exactly
    /// the language of the grammar.
    #[default]
    Ll,
    /// Like `Ll`, but continue full-context prediction until the exact set of ambiguous
    /// alternatives is known, for ambiguity diagnostics.
    LlExactAmbigDetection,
}

/// Can SLL prediction stop at `configs`? True when every config has reached a rule stop state,
/// or when some `(state, context)` pair has conflicting alternatives and no state is associated
/// with exactly one alternative.
pub fn has_sll_conflict_terminating_prediction(
    atn: &Atn,
    mode: PredictionMode,
    configs: &AtnConfigSet,
) -> bool {
    if all_configs_in_rule_stop_states(atn, configs) {
        return true;
    }
    let stripped;
    let configs = if mode == PredictionMode::Sll && configs.has_semantic_context() {
        // Predicates are ignored when deciding whether pure SLL has a conflict.
        let mut dup = AtnConfigSet::new(configs.full_ctx());
        for c in configs {
            dup.add(
                AtnConfig {
                    semantic: SemanticContext::None,
                    ..c.clone()
                },
                None,
            );
        }
        stripped = dup;
        &stripped
    } else {
        configs
    };
    let altsets = conflicting_alt_subsets(configs);
    has_conflicting_alt_set(&altsets) && !has_state_associated_with_one_alt(configs)
}

pub fn has_config_in_rule_stop_state(atn: &Atn, configs: &AtnConfigSet) -> bool {
    configs.iter().any(|c| atn.state(c.state).is_rule_stop())
}

pub fn all_configs_in_rule_stop_states(atn: &Atn, configs: &AtnConfigSet) -> bool {
    configs.iter().all(|c| atn.state(c.state).is_rule_stop())
}

/// If every subset's lowest alternative is the same, return it.
pub fn resolves_to_just_one_viable_alt(altsets: &[AltSet]) -> Option<u32> {
    single_viable_alt(altsets)
}

pub fn all_subsets_conflict(altsets: &[AltSet]) -> bool {
    !has_non_conflicting_alt_set(altsets)
}

pub fn has_non_conflicting_alt_set(altsets: &[AltSet]) -> bool {
    altsets.iter().any(|a| a.len() == 1)
}

pub fn has_conflicting_alt_set(altsets: &[AltSet]) -> bool {
    altsets.iter().any(|a| a.len() > 1)
}

pub fn all_subsets_equal(altsets: &[AltSet]) -> bool {
    match altsets.first() {
        Some(first) => altsets.iter().all(|a| a == first),
        None => true,
    }
}

/// If the union of `altsets` is a single alternative, return it.
pub fn unique_alt(altsets: &[AltSet]) -> Option<u32> {
    let all = alts(altsets);
    if all.len() == 1 {
        all.min()
    } else {
        None
    }
}

pub fn alts(altsets: &[AltSet]) -> AltSet {
    let mut all = AltSet::new();
    for a in altsets {
        all.union(a);
    }
    all
}

/// Group the alternatives of `configs` by `(state, context)`, in order of first appearance.
pub fn conflicting_alt_subsets(configs: &AtnConfigSet) -> Vec<AltSet> {
    let mut map: IndexMap<(StIdx, &PredictionContext), AltSet> = IndexMap::new();
    for c in configs {
        map.entry((c.state, &c.context)).or_default().insert(c.alt);
    }
    map.into_values().collect()
}

pub fn state_to_alt_map(configs: &AtnConfigSet) -> IndexMap<StIdx, AltSet> {
    let mut map: IndexMap<StIdx, AltSet> = IndexMap::new();
    for c in configs {
        map.entry(c.state).or_default().insert(c.alt);
    }
    map
}

pub fn has_state_associated_with_one_alt(configs: &AtnConfigSet) -> bool {
    state_to_alt_map(configs).values().any(|a| a.len() == 1)
}

pub fn single_viable_alt(altsets: &[AltSet]) -> Option<u32> {
    let mut viable = AltSet::new();
    for a in altsets {
        if let Some(m) = a.min() {
            viable.insert(m);
            if viable.len() > 1 {
                return None;
            }
        }
    }
    viable.min()
}

#[cfg(test)]
mod test {
    use super::*;

    fn set(alts: &[u32]) -> AltSet {
        alts.iter().copied().collect()
    }

    #[test]
    fn test_altset_predicates() {
        let conflicting = vec![set(&[1, 2]), set(&[1, 2])];
        assert!(has_conflicting_alt_set(&conflicting));
        assert!(all_subsets_conflict(&conflicting));
        assert!(all_subsets_equal(&conflicting));
        assert_eq!(resolves_to_just_one_viable_alt(&conflicting), Some(1));
        assert_eq!(unique_alt(&conflicting), None);

        let mixed = vec![set(&[1, 2]), set(&[3])];
        assert!(!all_subsets_conflict(&mixed));
        assert!(has_non_conflicting_alt_set(&mixed));
        assert!(!all_subsets_equal(&mixed));
        assert_eq!(single_viable_alt(&mixed), None);
        assert_eq!(alts(&mixed), set(&[1, 2, 3]));

        assert_eq!(unique_alt(&[set(&[2]), set(&[2])]), Some(2));
    }

    #[test]
    fn test_conflicting_alt_subsets() {
        let mut configs = AtnConfigSet::new(false);
        let e = PredictionContext::empty();
        let x = PredictionContext::singleton(e.clone(), 7);
        configs.add(AtnConfig::new(StIdx(1), 1, e.clone()), None);
        configs.add(AtnConfig::new(StIdx(1), 2, e.clone()), None);
        configs.add(AtnConfig::new(StIdx(2), 2, x.clone()), None);
        configs.add(AtnConfig::new(StIdx(2), 3, x), None);
        let subsets = conflicting_alt_subsets(&configs);
        assert_eq!(subsets, vec![set(&[1, 2]), set(&[2, 3])]);
        assert!(!has_state_associated_with_one_alt(&configs));
        configs.add(AtnConfig::new(StIdx(4), 1, e), None);
        assert!(has_state_associated_with_one_alt(&configs));
    }
}
