//! Persistence boundary for the engine.
//!
//! The engine consumes an abstract [`Store`] trait; persistence technology
//! stays behind it. Two implementations ship with the crate: an in-memory
//! store for tests and embedding, and a PostgreSQL store over sqlx.
//!
//! Compound operations (`activate_battle`, `commit_advance`,
//! `commit_battle_result`, `delete_tournament`) are atomic: an
//! implementation must apply all of their writes or none, and must perform
//! their invariant checks inside the same transaction or critical section
//! as the writes.

use async_trait::async_trait;

use crate::model::{
    Battle, BattleId, BattlePhase, BattleStatus, Category, CategoryId, EngineResult, Performer,
    PerformerId, Pool, PoolId, Tournament, TournamentId,
};

pub mod config;
pub mod memory;
pub mod postgres;

pub use config::StoreConfig;
pub use memory::MemoryStore;
pub use postgres::PgStore;

/// Query filter for battles. Unset fields match everything.
#[derive(Clone, Copy, Debug, Default)]
pub struct BattleFilter {
    pub tournament_id: Option<TournamentId>,
    pub category_id: Option<CategoryId>,
    pub phase: Option<BattlePhase>,
    pub status: Option<BattleStatus>,
}

impl BattleFilter {
    #[must_use]
    pub fn category(id: CategoryId) -> Self {
        Self {
            category_id: Some(id),
            ..Self::default()
        }
    }

    #[must_use]
    pub fn tournament(id: TournamentId) -> Self {
        Self {
            tournament_id: Some(id),
            ..Self::default()
        }
    }

    #[must_use]
    pub fn with_phase(mut self, phase: BattlePhase) -> Self {
        self.phase = Some(phase);
        self
    }

    #[must_use]
    pub fn with_status(mut self, status: BattleStatus) -> Self {
        self.status = Some(status);
        self
    }
}

/// Artifacts generated by a phase-transition hook, committed atomically with
/// the phase flag.
#[derive(Clone, Debug, Default)]
pub struct AdvanceArtifacts {
    pub pools: Vec<Pool>,
    pub battles: Vec<Battle>,
}

impl AdvanceArtifacts {
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.pools.is_empty() && self.battles.is_empty()
    }
}

/// Abstract repository for the tournament engine.
///
/// Listing order contracts: `categories` and `performers` return rows in
/// creation/registration order; `battles` returns rows ordered by
/// `sequence_order` (unsequenced battles last) and then creation time.
#[async_trait]
pub trait Store: Send + Sync {
    // Tournaments
    async fn insert_tournament(&self, tournament: &Tournament) -> EngineResult<()>;
    async fn tournament(&self, id: TournamentId) -> EngineResult<Tournament>;
    async fn tournaments(&self) -> EngineResult<Vec<Tournament>>;
    /// The single tournament with status Active, if any.
    async fn active_tournament(&self) -> EngineResult<Option<Tournament>>;
    async fn update_tournament(&self, tournament: &Tournament) -> EngineResult<()>;
    /// Cascade delete: battles, pools, performers, categories, then the
    /// tournament itself, as one atomic unit.
    async fn delete_tournament(&self, id: TournamentId) -> EngineResult<()>;

    // Categories
    async fn insert_category(&self, category: &Category) -> EngineResult<()>;
    async fn category(&self, id: CategoryId) -> EngineResult<Category>;
    async fn categories(&self, tournament_id: TournamentId) -> EngineResult<Vec<Category>>;

    // Performers
    async fn insert_performer(&self, performer: &Performer) -> EngineResult<()>;
    async fn performer(&self, id: PerformerId) -> EngineResult<Performer>;
    async fn performers(&self, category_id: CategoryId) -> EngineResult<Vec<Performer>>;
    async fn update_performer(&self, performer: &Performer) -> EngineResult<()>;
    async fn delete_performer(&self, id: PerformerId) -> EngineResult<()>;

    // Pools
    async fn pool(&self, id: PoolId) -> EngineResult<Pool>;
    async fn pools(&self, category_id: CategoryId) -> EngineResult<Vec<Pool>>;
    async fn update_pool(&self, pool: &Pool) -> EngineResult<()>;

    // Battles
    async fn insert_battles(&self, battles: &[Battle]) -> EngineResult<()>;
    async fn battle(&self, id: BattleId) -> EngineResult<Battle>;
    async fn battles(&self, filter: BattleFilter) -> EngineResult<Vec<Battle>>;
    async fn update_battle(&self, battle: &Battle) -> EngineResult<()>;
    async fn update_battles(&self, battles: &[Battle]) -> EngineResult<()>;

    /// Mark a Pending battle Active, failing with `ConflictError` if any
    /// other battle is Active anywhere in the system. Check and write happen
    /// in the same transaction.
    async fn activate_battle(&self, id: BattleId) -> EngineResult<Battle>;

    /// Persist a phase advance: the updated tournament plus its generated
    /// artifacts, atomically. When the update sets status Active, the store
    /// fails with `ConflictError` if a different tournament is already
    /// Active.
    async fn commit_advance(
        &self,
        tournament: &Tournament,
        artifacts: &AdvanceArtifacts,
    ) -> EngineResult<()>;

    /// Persist an encoded battle result together with its performer-side
    /// effects (and a pool-winner update, for resolved pool tiebreaks) as
    /// one atomic unit.
    async fn commit_battle_result(
        &self,
        battle: &Battle,
        performers: &[Performer],
        pool: Option<&Pool>,
    ) -> EngineResult<()>;
}
