use std::sync::Arc;

use atngrammar::LexerAction;

/// A lexer action together with, for position-dependent actions, the offset from the token's
/// start at which it must be run.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub struct PositionedAction {
    pub offset: Option<usize>,
    pub action: LexerAction,
}

/// The sequence of lexer actions a token's match passed through, in order.
#[derive(Clone, Debug, Default, Eq, Hash, PartialEq)]
pub struct LexerActionExecutor {
    actions: Vec<PositionedAction>,
}

impl LexerActionExecutor {
    /// Return a new executor which runs the actions of `prev` (if any) followed by `action`.
    pub fn append(prev: Option<&Arc<LexerActionExecutor>>, action: LexerAction) -> Arc<Self> {
        let mut actions = prev.map(|e| e.actions.clone()).unwrap_or_default();
        actions.push(PositionedAction {
            offset: None,
            action,
        });
        Arc::new(LexerActionExecutor { actions })
    }

    /// Pin every position-dependent action that hasn't yet got an offset to `offset`. Returns
    /// `None` if nothing needed pinning.
    pub fn fix_offset_before_match(&self, offset: usize) -> Option<Arc<Self>> {
        if !self
            .actions
            .iter()
            .any(|a| a.offset.is_none() && a.action.is_position_dependent())
        {
            return None;
        }
        let actions = self
            .actions
            .iter()
            .map(|a| {
                if a.offset.is_none() && a.action.is_position_dependent() {
                    PositionedAction {
                        offset: Some(offset),
                        action: a.action,
                    }
                } else {
                    *a
                }
            })
            .collect();
        Some(Arc::new(LexerActionExecutor { actions }))
    }

    pub fn actions(&self) -> &[PositionedAction] {
        &self.actions
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use atngrammar::RIdx;

    #[test]
    fn test_append_and_fix() {
        let e = LexerActionExecutor::append(None, LexerAction::Skip);
        assert!(e.fix_offset_before_match(3).is_none());
        let custom = LexerAction::Custom {
            rule: RIdx(0),
            action: 0,
        };
        let e = LexerActionExecutor::append(Some(&e), custom);
        assert_eq!(e.actions().len(), 2);
        let f = e.fix_offset_before_match(3).unwrap();
        assert_eq!(f.actions()[0].offset, None);
        assert_eq!(f.actions()[1].offset, Some(3));
        // Already pinned actions keep their offset.
        assert!(f.fix_offset_before_match(5).is_none());
        assert_ne!(e, f);
    }
}
