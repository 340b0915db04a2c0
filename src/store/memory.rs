//! In-memory store.
//!
//! A mutex-guarded implementation of [`Store`] used by tests and by callers
//! embedding the engine without a database. One lock covers the whole state,
//! which makes every compound operation trivially atomic.

use std::sync::{Mutex, MutexGuard};

use async_trait::async_trait;

use crate::model::{
    Battle, BattleId, BattleStatus, Category, CategoryId, EngineError, EngineResult, Performer,
    PerformerId, Pool, PoolId, Tournament, TournamentId, TournamentStatus,
};

use super::{AdvanceArtifacts, BattleFilter, Store};

#[derive(Debug, Default)]
struct Inner {
    tournaments: Vec<Tournament>,
    categories: Vec<Category>,
    performers: Vec<Performer>,
    pools: Vec<Pool>,
    battles: Vec<Battle>,
}

impl Inner {
    fn category_ids(&self, tournament_id: TournamentId) -> Vec<CategoryId> {
        self.categories
            .iter()
            .filter(|c| c.tournament_id == tournament_id)
            .map(|c| c.id)
            .collect()
    }

    fn tournament_of_category(&self, category_id: CategoryId) -> Option<TournamentId> {
        self.categories
            .iter()
            .find(|c| c.id == category_id)
            .map(|c| c.tournament_id)
    }

    fn matches(&self, battle: &Battle, filter: &BattleFilter) -> bool {
        if let Some(id) = filter.category_id {
            if battle.category_id != id {
                return false;
            }
        }
        if let Some(id) = filter.tournament_id {
            if self.tournament_of_category(battle.category_id) != Some(id) {
                return false;
            }
        }
        if let Some(phase) = filter.phase {
            if battle.phase != phase {
                return false;
            }
        }
        if let Some(status) = filter.status {
            if battle.status != status {
                return false;
            }
        }
        true
    }
}

/// In-memory [`Store`] implementation.
#[derive(Debug, Default)]
pub struct MemoryStore {
    inner: Mutex<Inner>,
}

impl MemoryStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().expect("store mutex poisoned")
    }
}

fn replace<T, F>(items: &mut [T], entity: &str, id: impl std::fmt::Display, find: F, value: T) -> EngineResult<()>
where
    F: Fn(&T) -> bool,
{
    match items.iter_mut().find(|item| find(item)) {
        Some(slot) => {
            *slot = value;
            Ok(())
        }
        None => Err(EngineError::not_found(entity, id)),
    }
}

#[async_trait]
impl Store for MemoryStore {
    async fn insert_tournament(&self, tournament: &Tournament) -> EngineResult<()> {
        self.state().tournaments.push(tournament.clone());
        Ok(())
    }

    async fn tournament(&self, id: TournamentId) -> EngineResult<Tournament> {
        self.state()
            .tournaments
            .iter()
            .find(|t| t.id == id)
            .cloned()
            .ok_or_else(|| EngineError::not_found("tournament", id))
    }

    async fn tournaments(&self) -> EngineResult<Vec<Tournament>> {
        Ok(self.state().tournaments.clone())
    }

    async fn active_tournament(&self) -> EngineResult<Option<Tournament>> {
        Ok(self
            .state()
            .tournaments
            .iter()
            .find(|t| t.status == TournamentStatus::Active)
            .cloned())
    }

    async fn update_tournament(&self, tournament: &Tournament) -> EngineResult<()> {
        let mut state = self.state();
        let id = tournament.id;
        replace(
            &mut state.tournaments,
            "tournament",
            id,
            |t| t.id == id,
            tournament.clone(),
        )
    }

    async fn delete_tournament(&self, id: TournamentId) -> EngineResult<()> {
        let mut state = self.state();
        if !state.tournaments.iter().any(|t| t.id == id) {
            return Err(EngineError::not_found("tournament", id));
        }
        // Dependents first, owner last.
        let categories = state.category_ids(id);
        state.battles.retain(|b| !categories.contains(&b.category_id));
        state.pools.retain(|p| !categories.contains(&p.category_id));
        state
            .performers
            .retain(|p| !categories.contains(&p.category_id));
        state.categories.retain(|c| c.tournament_id != id);
        state.tournaments.retain(|t| t.id != id);
        Ok(())
    }

    async fn insert_category(&self, category: &Category) -> EngineResult<()> {
        self.state().categories.push(category.clone());
        Ok(())
    }

    async fn category(&self, id: CategoryId) -> EngineResult<Category> {
        self.state()
            .categories
            .iter()
            .find(|c| c.id == id)
            .cloned()
            .ok_or_else(|| EngineError::not_found("category", id))
    }

    async fn categories(&self, tournament_id: TournamentId) -> EngineResult<Vec<Category>> {
        Ok(self
            .state()
            .categories
            .iter()
            .filter(|c| c.tournament_id == tournament_id)
            .cloned()
            .collect())
    }

    async fn insert_performer(&self, performer: &Performer) -> EngineResult<()> {
        self.state().performers.push(performer.clone());
        Ok(())
    }

    async fn performer(&self, id: PerformerId) -> EngineResult<Performer> {
        self.state()
            .performers
            .iter()
            .find(|p| p.id == id)
            .cloned()
            .ok_or_else(|| EngineError::not_found("performer", id))
    }

    async fn performers(&self, category_id: CategoryId) -> EngineResult<Vec<Performer>> {
        Ok(self
            .state()
            .performers
            .iter()
            .filter(|p| p.category_id == category_id)
            .cloned()
            .collect())
    }

    async fn update_performer(&self, performer: &Performer) -> EngineResult<()> {
        let mut state = self.state();
        let id = performer.id;
        replace(
            &mut state.performers,
            "performer",
            id,
            |p| p.id == id,
            performer.clone(),
        )
    }

    async fn delete_performer(&self, id: PerformerId) -> EngineResult<()> {
        let mut state = self.state();
        if !state.performers.iter().any(|p| p.id == id) {
            return Err(EngineError::not_found("performer", id));
        }
        state.performers.retain(|p| p.id != id);
        Ok(())
    }

    async fn pool(&self, id: PoolId) -> EngineResult<Pool> {
        self.state()
            .pools
            .iter()
            .find(|p| p.id == id)
            .cloned()
            .ok_or_else(|| EngineError::not_found("pool", id))
    }

    async fn pools(&self, category_id: CategoryId) -> EngineResult<Vec<Pool>> {
        Ok(self
            .state()
            .pools
            .iter()
            .filter(|p| p.category_id == category_id)
            .cloned()
            .collect())
    }

    async fn update_pool(&self, pool: &Pool) -> EngineResult<()> {
        let mut state = self.state();
        let id = pool.id;
        replace(&mut state.pools, "pool", id, |p| p.id == id, pool.clone())
    }

    async fn insert_battles(&self, battles: &[Battle]) -> EngineResult<()> {
        self.state().battles.extend_from_slice(battles);
        Ok(())
    }

    async fn battle(&self, id: BattleId) -> EngineResult<Battle> {
        self.state()
            .battles
            .iter()
            .find(|b| b.id == id)
            .cloned()
            .ok_or_else(|| EngineError::not_found("battle", id))
    }

    async fn battles(&self, filter: BattleFilter) -> EngineResult<Vec<Battle>> {
        let state = self.state();
        let mut battles: Vec<Battle> = state
            .battles
            .iter()
            .filter(|b| state.matches(b, &filter))
            .cloned()
            .collect();
        battles.sort_by_key(|b| (b.sequence_order.unwrap_or(u32::MAX), b.created_at));
        Ok(battles)
    }

    async fn update_battle(&self, battle: &Battle) -> EngineResult<()> {
        let mut state = self.state();
        let id = battle.id;
        replace(
            &mut state.battles,
            "battle",
            id,
            |b| b.id == id,
            battle.clone(),
        )
    }

    async fn update_battles(&self, battles: &[Battle]) -> EngineResult<()> {
        let mut state = self.state();
        // Verify first so a missing battle leaves nothing half-written.
        for battle in battles {
            if !state.battles.iter().any(|b| b.id == battle.id) {
                return Err(EngineError::not_found("battle", battle.id));
            }
        }
        for battle in battles {
            if let Some(slot) = state.battles.iter_mut().find(|b| b.id == battle.id) {
                *slot = battle.clone();
            }
        }
        Ok(())
    }

    async fn activate_battle(&self, id: BattleId) -> EngineResult<Battle> {
        let mut state = self.state();
        if let Some(active) = state
            .battles
            .iter()
            .find(|b| b.status == BattleStatus::Active)
        {
            return Err(EngineError::Conflict(format!(
                "battle {} is already active",
                active.id
            )));
        }
        let battle = state
            .battles
            .iter_mut()
            .find(|b| b.id == id)
            .ok_or_else(|| EngineError::not_found("battle", id))?;
        if battle.status != BattleStatus::Pending {
            return Err(EngineError::invalid(format!(
                "battle {id} is {}, only pending battles can start",
                battle.status
            )));
        }
        battle.status = BattleStatus::Active;
        Ok(battle.clone())
    }

    async fn commit_advance(
        &self,
        tournament: &Tournament,
        artifacts: &AdvanceArtifacts,
    ) -> EngineResult<()> {
        let mut state = self.state();
        if !state.tournaments.iter().any(|t| t.id == tournament.id) {
            return Err(EngineError::not_found("tournament", tournament.id));
        }
        if tournament.status == TournamentStatus::Active {
            if let Some(other) = state
                .tournaments
                .iter()
                .find(|t| t.status == TournamentStatus::Active && t.id != tournament.id)
            {
                return Err(EngineError::Conflict(format!(
                    "tournament {} is already active",
                    other.id
                )));
            }
        }
        state.pools.extend(artifacts.pools.iter().cloned());
        state.battles.extend(artifacts.battles.iter().cloned());
        let id = tournament.id;
        replace(
            &mut state.tournaments,
            "tournament",
            id,
            |t| t.id == id,
            tournament.clone(),
        )
    }

    async fn commit_battle_result(
        &self,
        battle: &Battle,
        performers: &[Performer],
        pool: Option<&Pool>,
    ) -> EngineResult<()> {
        let mut state = self.state();
        // Verify everything up front; the single lock makes the writes atomic.
        if !state.battles.iter().any(|b| b.id == battle.id) {
            return Err(EngineError::not_found("battle", battle.id));
        }
        for performer in performers {
            if !state.performers.iter().any(|p| p.id == performer.id) {
                return Err(EngineError::not_found("performer", performer.id));
            }
        }
        if let Some(pool) = pool {
            if !state.pools.iter().any(|p| p.id == pool.id) {
                return Err(EngineError::not_found("pool", pool.id));
            }
        }
        if let Some(slot) = state.battles.iter_mut().find(|b| b.id == battle.id) {
            *slot = battle.clone();
        }
        for performer in performers {
            if let Some(slot) = state.performers.iter_mut().find(|p| p.id == performer.id) {
                *slot = performer.clone();
            }
        }
        if let Some(pool) = pool {
            if let Some(slot) = state.pools.iter_mut().find(|p| p.id == pool.id) {
                *slot = pool.clone();
            }
        }
        Ok(())
    }
}
