use indexmap::IndexSet;
use thiserror::Error;

use crate::{
    atn::{Atn, GrammarType},
    deserialize::{ADDED_UNICODE_SMP, SERIALIZED_VERSION},
    interval::IntervalSet,
    state::StateKind,
    transition::Transition,
    TOKEN_EOF,
};

#[derive(Debug, Error, Eq, PartialEq)]
pub enum SerializeError {
    #[error("value {0} does not fit in the serialized form")]
    Overflow(i64),
}

fn word(v: impl Into<i64>) -> Result<u16, SerializeError> {
    let v = v.into();
    if v == -1 {
        Ok(0xFFFF)
    } else {
        u16::try_from(v).map_err(|_| SerializeError::Overflow(v))
    }
}

fn serialize_sets(data: &mut Vec<u16>, sets: &[&IntervalSet], wide: bool) -> Result<(), SerializeError> {
    data.push(word(sets.len() as i64)?);
    for set in sets {
        let contains_eof = set.contains(TOKEN_EOF);
        let ivs = set.intervals();
        let n = if contains_eof && ivs[0].b == TOKEN_EOF {
            ivs.len() - 1
        } else {
            ivs.len()
        };
        data.push(word(n as i64)?);
        data.push(u16::from(contains_eof));
        for iv in ivs {
            let a = if iv.a == TOKEN_EOF {
                if iv.b == TOKEN_EOF {
                    continue;
                }
                0
            } else {
                iv.a
            };
            for v in [a, iv.b] {
                if wide {
                    data.push((v as u32 & 0xFFFF) as u16);
                    data.push((v as u32 >> 16) as u16);
                } else {
                    data.push(word(v)?);
                }
            }
        }
    }
    Ok(())
}

impl Atn {
    /// Serialize this ATN into the (offset) form read by [Atn::deserialize]. Rule stop
    /// transitions and other derivable links are omitted.
    pub fn serialize(&self) -> Result<Vec<u16>, SerializeError> {
        let mut data = vec![SERIALIZED_VERSION];
        for i in 0..8 {
            data.push((ADDED_UNICODE_SMP >> (16 * i)) as u16);
        }
        data.push(self.grammar_type.code());
        data.push(word(self.max_token_type)?);

        data.push(word(self.states.len() as i64)?);
        let mut non_greedy = Vec::new();
        let mut precedence = Vec::new();
        for st in &self.states {
            if st.kind == StateKind::Invalid {
                data.push(0);
                continue;
            }
            data.push(st.kind.code());
            data.push(match st.ridx {
                Some(r) => word(r.0)?,
                None => 0xFFFF,
            });
            match st.kind {
                StateKind::LoopEnd { loop_back } => data.push(word(loop_back.0)?),
                k if k.is_block_start() => {
                    data.push(word(k.block_end().map(|s| s.0).unwrap_or(0))?)
                }
                StateKind::RuleStart {
                    left_recursive: true,
                    ..
                } => precedence.push(st.stidx),
                _ => (),
            }
            if st.non_greedy {
                non_greedy.push(st.stidx);
            }
        }
        for list in [&non_greedy, &precedence] {
            data.push(word(list.len() as i64)?);
            for s in list {
                data.push(word(s.0)?);
            }
        }

        data.push(word(self.rule_to_start.len() as i64)?);
        for (i, s) in self.rule_to_start.iter().enumerate() {
            data.push(word(s.0)?);
            if self.grammar_type == GrammarType::Lexer {
                data.push(word(self.rule_to_token_type[i])?);
            }
        }

        data.push(word(self.mode_to_start.len() as i64)?);
        for s in &self.mode_to_start {
            data.push(word(s.0)?);
        }

        let mut sets = IndexSet::new();
        for st in &self.states {
            for t in &st.transitions {
                if let Transition::Set { set, .. } | Transition::NotSet { set, .. } = t {
                    sets.insert(set);
                }
            }
        }
        let (bmp, smp): (Vec<&IntervalSet>, Vec<&IntervalSet>) = sets
            .iter()
            .partition(|s| s.max_element().unwrap_or(0) <= 0xFFFF);
        serialize_sets(&mut data, &bmp, false)?;
        serialize_sets(&mut data, &smp, true)?;
        let set_index = |set: &IntervalSet| {
            bmp.iter()
                .chain(smp.iter())
                .position(|s| *s == set)
                .unwrap_or(0) as i64
        };

        let mut edges = Vec::new();
        for st in &self.states {
            if st.is_rule_stop() {
                continue;
            }
            for t in &st.transitions {
                let mut trg = t.target().0 as i64;
                let (a1, a2, a3): (i64, i64, i64) = match t {
                    Transition::Epsilon { .. } | Transition::Wildcard { .. } => (0, 0, 0),
                    Transition::Range { start, stop, .. } => {
                        if t.matches_eof_only() {
                            (0, (*stop).into(), 1)
                        } else {
                            ((*start).into(), (*stop).into(), 0)
                        }
                    }
                    Transition::Rule {
                        target,
                        rule,
                        precedence,
                        follow,
                    } => {
                        trg = follow.0 as i64;
                        (target.0.into(), rule.0.into(), (*precedence).into())
                    }
                    Transition::Predicate {
                        rule,
                        pred,
                        ctx_dependent,
                        ..
                    } => (rule.0.into(), *pred as i64, i64::from(*ctx_dependent)),
                    Transition::Atom { label, .. } => {
                        if t.matches_eof_only() {
                            (0, 0, 1)
                        } else {
                            ((*label).into(), 0, 0)
                        }
                    }
                    Transition::Action {
                        rule,
                        action,
                        ctx_dependent,
                        ..
                    } => (
                        rule.0.into(),
                        action.map(|a| a as i64).unwrap_or(-1),
                        i64::from(*ctx_dependent),
                    ),
                    Transition::Set { set, .. } | Transition::NotSet { set, .. } => {
                        (set_index(set), 0, 0)
                    }
                    Transition::Precedence { precedence, .. } => ((*precedence).into(), 0, 0),
                };
                edges.extend([
                    word(st.stidx.0)?,
                    word(trg)?,
                    t.code(),
                    word(a1)?,
                    word(a2)?,
                    word(a3)?,
                ]);
            }
        }
        data.push(word((edges.len() / 6) as i64)?);
        data.extend(edges);

        data.push(word(self.decision_to_state.len() as i64)?);
        for s in &self.decision_to_state {
            data.push(word(s.0)?);
        }

        if self.grammar_type == GrammarType::Lexer {
            data.push(word(self.lexer_actions.len() as i64)?);
            for la in &self.lexer_actions {
                let (d1, d2) = la.data();
                data.extend([la.code(), d1, d2]);
            }
        }

        for v in data.iter_mut().skip(1) {
            *v = v.wrapping_add(2);
        }
        Ok(data)
    }
}
