//! Reading ATNs in the version 3 serialized form produced by grammar tools.
//!
//! The serialized form is a sequence of 16-bit words. Every word apart from the first (the
//! version number) is stored offset by 2, so that the common small values avoid the awkward
//! characters `\0` and `\1` when embedded in generated source. [Atn::deserialize] expects that
//! offset form, exactly as it appears in `.interp` files.

use thiserror::Error;
use tracing::debug;

use crate::{
    atn::{Atn, AtnError, GrammarType},
    interval::IntervalSet,
    lexer_action::LexerAction,
    state::{codes as st_codes, StateKind},
    transition::{codes as tr_codes, Transition},
    RIdx, StIdx, TOKEN_EOF,
};

pub const SERIALIZED_VERSION: u16 = 3;

pub(crate) const BASE_UUID: u128 = 0x33761B2D_78BB_4A43_8B0B_4F5BEE8AACF3;
pub(crate) const ADDED_PRECEDENCE_TRANSITIONS: u128 = 0x1DA0C57D_6C06_438A_9B27_10BCB3CE0F61;
pub(crate) const ADDED_LEXER_ACTIONS: u128 = 0xAADB8D7E_AEEF_4415_AD2B_8204D6CF042E;
pub(crate) const ADDED_UNICODE_SMP: u128 = 0x59627784_3BE5_417A_B9EB_8131A7286974;

/// Every UUID we can read, ordered by when the feature it marks was introduced.
const SUPPORTED_UUIDS: [u128; 4] = [
    BASE_UUID,
    ADDED_PRECEDENCE_TRANSITIONS,
    ADDED_LEXER_ACTIONS,
    ADDED_UNICODE_SMP,
];

#[derive(Debug, Error, Eq, PartialEq)]
pub enum DeserializeError {
    #[error("serialized ATN ends prematurely")]
    PrematureEnd,
    #[error("could not deserialize ATN with version {0} (expected {SERIALIZED_VERSION})")]
    Version(u16),
    #[error("could not deserialize ATN with UUID {0}")]
    Uuid(String),
    #[error("unknown grammar type {0}")]
    GrammarType(u16),
    #[error("unknown state type {0}")]
    StateType(u16),
    #[error("unknown transition type {0}")]
    TransitionType(u16),
    #[error("unknown lexer action type {0}")]
    LexerActionType(u16),
    #[error("state {0} is not a {1}")]
    WrongStateKind(u32, &'static str),
    #[error("reference to unknown {0} {1}")]
    BadIndex(&'static str, u32),
    #[error(transparent)]
    Atn(#[from] AtnError),
}

pub(crate) fn uuid_string(uuid: u128) -> String {
    let h = format!("{:032X}", uuid);
    format!(
        "{}-{}-{}-{}-{}",
        &h[0..8],
        &h[8..12],
        &h[12..16],
        &h[16..20],
        &h[20..32]
    )
}

struct Deserializer<'a> {
    data: &'a [u16],
    pos: usize,
}

impl<'a> Deserializer<'a> {
    fn read(&mut self) -> Result<u16, DeserializeError> {
        let v = self
            .data
            .get(self.pos)
            .ok_or(DeserializeError::PrematureEnd)?;
        self.pos += 1;
        if self.pos == 1 {
            Ok(*v)
        } else {
            Ok(v.wrapping_sub(2))
        }
    }

    fn read_usize(&mut self) -> Result<usize, DeserializeError> {
        self.read().map(usize::from)
    }

    /// Read a value in which `0xFFFF` stands for -1.
    fn read_signed(&mut self) -> Result<i32, DeserializeError> {
        Ok(match self.read()? {
            0xFFFF => -1,
            v => i32::from(v),
        })
    }

    fn read_int32(&mut self) -> Result<i32, DeserializeError> {
        let lo = u32::from(self.read()?);
        let hi = u32::from(self.read()?);
        Ok((lo | (hi << 16)) as i32)
    }

    fn read_uuid(&mut self) -> Result<u128, DeserializeError> {
        let mut uuid = 0u128;
        for i in 0..8 {
            uuid |= u128::from(self.read()?) << (16 * i);
        }
        Ok(uuid)
    }

    fn read_state(&mut self, atn: &Atn) -> Result<StIdx, DeserializeError> {
        let s = self.read()?;
        if usize::from(s) >= atn.states_len() {
            return Err(DeserializeError::BadIndex("state", u32::from(s)));
        }
        Ok(StIdx::from(u32::from(s)))
    }

    fn read_sets(&mut self, sets: &mut Vec<IntervalSet>, wide: bool) -> Result<(), DeserializeError> {
        let nsets = self.read_usize()?;
        for _ in 0..nsets {
            let nintervals = self.read_usize()?;
            let mut set = IntervalSet::new();
            if self.read()? != 0 {
                set.add_one(TOKEN_EOF);
            }
            for _ in 0..nintervals {
                let (a, b) = if wide {
                    (self.read_int32()?, self.read_int32()?)
                } else {
                    (i32::from(self.read()?), i32::from(self.read()?))
                };
                set.add_range(a, b);
            }
            sets.push(set);
        }
        Ok(())
    }
}

fn feature_supported(feature: u128, actual: u128) -> bool {
    let pos = |u| SUPPORTED_UUIDS.iter().position(|x| *x == u);
    match (pos(feature), pos(actual)) {
        (Some(f), Some(a)) => a >= f,
        _ => false,
    }
}

fn expect_kind(
    atn: &Atn,
    s: StIdx,
    what: &'static str,
    f: fn(&StateKind) -> bool,
) -> Result<(), DeserializeError> {
    if f(&atn.state(s).kind()) {
        Ok(())
    } else {
        Err(DeserializeError::WrongStateKind(s.0, what))
    }
}

impl Atn {
    /// Deserialize an ATN from the (offset) serialized form.
    pub fn deserialize(data: &[u16]) -> Result<Atn, DeserializeError> {
        let mut d = Deserializer { data, pos: 0 };
        let version = d.read()?;
        if version != SERIALIZED_VERSION {
            return Err(DeserializeError::Version(version));
        }
        let uuid = d.read_uuid()?;
        if !SUPPORTED_UUIDS.contains(&uuid) {
            return Err(DeserializeError::Uuid(uuid_string(uuid)));
        }
        let lexer_actions = feature_supported(ADDED_LEXER_ACTIONS, uuid);
        let smp = feature_supported(ADDED_UNICODE_SMP, uuid);

        let grammar_type = match d.read()? {
            0 => GrammarType::Lexer,
            1 => GrammarType::Parser,
            t => return Err(DeserializeError::GrammarType(t)),
        };
        let max_token_type = i32::from(d.read()?);
        let mut atn = Atn::new(grammar_type, max_token_type);

        // States. Links to later states are patched once every state exists.
        let nstates = d.read_usize()?;
        let mut pending = Vec::new();
        for _ in 0..nstates {
            let code = d.read()?;
            if code == st_codes::INVALID {
                atn.add_state(None, StateKind::Invalid);
                continue;
            }
            let kind = StateKind::from_code(code).ok_or(DeserializeError::StateType(code))?;
            let ridx = match d.read()? {
                0xFFFF => None,
                r => Some(RIdx::from(u32::from(r))),
            };
            let stidx = atn.add_state(ridx, kind);
            if code == st_codes::LOOP_END || kind.is_block_start() {
                pending.push((stidx, d.read()?));
            }
        }
        for (stidx, other) in pending {
            if usize::from(other) >= atn.states_len() {
                return Err(DeserializeError::BadIndex("state", u32::from(other)));
            }
            let other = StIdx::from(u32::from(other));
            match &mut atn.state_mut(stidx)?.kind {
                StateKind::LoopEnd { loop_back } => *loop_back = other,
                StateKind::BlockStart { end }
                | StateKind::PlusBlockStart { end, .. }
                | StateKind::StarBlockStart { end } => *end = other,
                _ => (),
            }
        }

        for _ in 0..d.read_usize()? {
            let s = d.read_state(&atn)?;
            expect_kind(&atn, s, "decision state", StateKind::is_decision_kind)?;
            atn.state_mut(s)?.non_greedy = true;
        }
        for _ in 0..d.read_usize()? {
            let s = d.read_state(&atn)?;
            match &mut atn.state_mut(s)?.kind {
                StateKind::RuleStart { left_recursive, .. } => *left_recursive = true,
                _ => return Err(DeserializeError::WrongStateKind(s.0, "rule start state")),
            }
        }

        let nrules = d.read_usize()?;
        for _ in 0..nrules {
            let s = d.read_state(&atn)?;
            expect_kind(&atn, s, "rule start state", |k| {
                matches!(k, StateKind::RuleStart { .. })
            })?;
            atn.rule_to_start.push(s);
            if grammar_type == GrammarType::Lexer {
                let ttype = d.read_signed()?;
                atn.rule_to_token_type.push(ttype);
                if !lexer_actions {
                    d.read()?;
                }
            }
        }

        if let Some(r) = atn
            .states()
            .filter_map(|st| st.rule())
            .find(|r| usize::from(*r) >= nrules)
        {
            return Err(DeserializeError::BadIndex("rule", r.0));
        }

        for _ in 0..d.read_usize()? {
            let s = d.read_state(&atn)?;
            expect_kind(&atn, s, "tokens start state", |k| *k == StateKind::TokensStart)?;
            atn.mode_to_start.push(s);
        }

        let mut sets = Vec::new();
        d.read_sets(&mut sets, false)?;
        if smp {
            d.read_sets(&mut sets, true)?;
        }

        let nedges = d.read_usize()?;
        for _ in 0..nedges {
            let src = d.read_state(&atn)?;
            let trg = d.read_state(&atn)?;
            let ttype = d.read()?;
            let (a1, a2, a3) = (d.read()?, d.read()?, d.read()?);
            let t = edge(&atn, ttype, trg, a1, a2, a3, &sets)?;
            atn.state_mut(src)?.add_transition(t);
        }

        for _ in 0..d.read_usize()? {
            let s = d.read_state(&atn)?;
            expect_kind(&atn, s, "decision state", StateKind::is_decision_kind)?;
            atn.define_decision(s)?;
        }

        if grammar_type == GrammarType::Lexer {
            if lexer_actions {
                for _ in 0..d.read_usize()? {
                    let code = d.read()?;
                    let data1 = d.read_signed()?;
                    let data2 = d.read_signed()?;
                    let la = LexerAction::from_code(code, data1, data2)
                        .ok_or(DeserializeError::LexerActionType(code))?;
                    atn.lexer_actions.push(la);
                }
            } else {
                convert_legacy_actions(&mut atn);
            }
            for la in &atn.lexer_actions {
                match *la {
                    LexerAction::Mode(m) | LexerAction::PushMode(m) if m >= atn.modes_len() => {
                        return Err(DeserializeError::BadIndex("mode", m as u32));
                    }
                    LexerAction::Custom { rule, .. } if usize::from(rule) >= nrules => {
                        return Err(DeserializeError::BadIndex("rule", rule.0));
                    }
                    _ => (),
                }
            }
        }

        atn.finish()?;
        debug!(
            states = atn.states_len(),
            rules = atn.rules_len(),
            decisions = atn.decisions_len(),
            "deserialized ATN"
        );
        Ok(atn)
    }
}

/// Before lexer actions had their own table, action transitions in lexers referred directly to
/// user actions.
fn convert_legacy_actions(atn: &mut Atn) {
    for st in &mut atn.states {
        for t in &mut st.transitions {
            if let Transition::Action {
                target,
                rule,
                action: Some(action),
                ..
            } = *t
            {
                *t = Transition::Action {
                    target,
                    rule,
                    action: Some(atn.lexer_actions.len()),
                    ctx_dependent: false,
                };
                atn.lexer_actions.push(LexerAction::Custom { rule, action });
            }
        }
    }
}

fn edge(
    atn: &Atn,
    ttype: u16,
    target: StIdx,
    a1: u16,
    a2: u16,
    a3: u16,
    sets: &[IntervalSet],
) -> Result<Transition, DeserializeError> {
    let rule = |r: u16| {
        if usize::from(r) < atn.rules_len() {
            Ok(RIdx::from(u32::from(r)))
        } else {
            Err(DeserializeError::BadIndex("rule", u32::from(r)))
        }
    };
    let set = |i: u16| {
        sets.get(usize::from(i))
            .cloned()
            .ok_or(DeserializeError::BadIndex("set", u32::from(i)))
    };
    Ok(match ttype {
        tr_codes::EPSILON => Transition::epsilon(target),
        tr_codes::RANGE => Transition::Range {
            target,
            start: if a3 != 0 { TOKEN_EOF } else { i32::from(a1) },
            stop: i32::from(a2),
        },
        tr_codes::RULE => {
            let start = StIdx::from(u32::from(a1));
            if usize::from(start) >= atn.states_len() {
                return Err(DeserializeError::BadIndex("state", u32::from(a1)));
            }
            expect_kind(atn, start, "rule start state", |k| {
                matches!(k, StateKind::RuleStart { .. })
            })?;
            Transition::Rule {
                target: start,
                rule: rule(a2)?,
                precedence: i32::from(a3),
                follow: target,
            }
        }
        tr_codes::PREDICATE => Transition::Predicate {
            target,
            rule: rule(a1)?,
            pred: usize::from(a2),
            ctx_dependent: a3 != 0,
        },
        tr_codes::ATOM => Transition::Atom {
            target,
            label: if a3 != 0 { TOKEN_EOF } else { i32::from(a1) },
        },
        tr_codes::ACTION => Transition::Action {
            target,
            rule: rule(a1)?,
            action: if a2 == 0xFFFF {
                None
            } else {
                Some(usize::from(a2))
            },
            ctx_dependent: a3 != 0,
        },
        tr_codes::SET => Transition::Set {
            target,
            set: set(a1)?,
        },
        tr_codes::NOT_SET => Transition::NotSet {
            target,
            set: set(a1)?,
        },
        tr_codes::WILDCARD => Transition::Wildcard { target },
        tr_codes::PRECEDENCE => Transition::Precedence {
            target,
            precedence: i32::from(a1),
        },
        t => return Err(DeserializeError::TransitionType(t)),
    })
}
