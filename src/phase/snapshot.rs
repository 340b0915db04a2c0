//! Consistent read snapshot of a tournament for validation and hooks.

use crate::model::{Battle, BattlePhase, BattleStatus, Category, Performer, Pool, Tournament};

/// One category's full state.
#[derive(Clone, Debug)]
pub struct CategorySnapshot {
    pub category: Category,
    pub performers: Vec<Performer>,
    pub pools: Vec<Pool>,
    pub battles: Vec<Battle>,
}

impl CategorySnapshot {
    /// Count of battles of `phase` not yet Completed.
    #[must_use]
    pub fn open_battles(&self, phase: BattlePhase) -> usize {
        self.battles
            .iter()
            .filter(|b| b.phase == phase && b.status != BattleStatus::Completed)
            .count()
    }

    /// Count of unresolved tiebreak battles; `pool_scoped` selects
    /// pool-winner tiebreaks, otherwise qualification tiebreaks.
    #[must_use]
    pub fn open_tiebreaks(&self, pool_scoped: bool) -> usize {
        self.battles
            .iter()
            .filter(|b| {
                b.phase == BattlePhase::Tiebreak
                    && b.pool_id.is_some() == pool_scoped
                    && b.status != BattleStatus::Completed
            })
            .count()
    }
}

/// The tournament with every category's state, loaded in one read pass.
#[derive(Clone, Debug)]
pub struct TournamentSnapshot {
    pub tournament: Tournament,
    pub categories: Vec<CategorySnapshot>,
}
