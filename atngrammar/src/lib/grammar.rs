use std::sync::Arc;

use crate::{atn::Atn, vocabulary::Vocabulary, RIdx};

/// Everything a recogniser needs to know about a compiled grammar: its ATN and the names used
/// when reporting on rules, tokens, channels, and modes.
#[derive(Clone, Debug)]
pub struct GrammarInfo {
    name: String,
    atn: Arc<Atn>,
    rule_names: Vec<String>,
    vocabulary: Vocabulary,
    channel_names: Vec<String>,
    mode_names: Vec<String>,
}

impl GrammarInfo {
    pub fn new(
        name: &str,
        atn: Arc<Atn>,
        rule_names: Vec<String>,
        vocabulary: Vocabulary,
        channel_names: Vec<String>,
        mode_names: Vec<String>,
    ) -> Self {
        GrammarInfo {
            name: name.to_owned(),
            atn,
            rule_names,
            vocabulary,
            channel_names,
            mode_names,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn atn(&self) -> &Arc<Atn> {
        &self.atn
    }

    pub fn rule_names(&self) -> &[String] {
        &self.rule_names
    }

    /// The name of rule `ridx`, or `"<unknown>"` if there is no such rule.
    pub fn rule_name(&self, ridx: RIdx) -> &str {
        self.rule_names
            .get(usize::from(ridx))
            .map(|s| s.as_str())
            .unwrap_or("<unknown>")
    }

    pub fn rule_idx(&self, name: &str) -> Option<RIdx> {
        self.rule_names
            .iter()
            .position(|n| n == name)
            .map(RIdx::from)
    }

    pub fn vocabulary(&self) -> &Vocabulary {
        &self.vocabulary
    }

    pub fn token_type(&self, name: &str) -> Option<i32> {
        self.vocabulary.token_type(name)
    }

    pub fn channel_names(&self) -> &[String] {
        &self.channel_names
    }

    pub fn mode_names(&self) -> &[String] {
        &self.mode_names
    }

    pub fn mode_idx(&self, name: &str) -> Option<usize> {
        self.mode_names.iter().position(|n| n == name)
    }
}
