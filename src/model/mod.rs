//! Domain model: entities, outcome payloads, and error types.

pub mod entities;
pub mod errors;
pub mod outcome;

pub use entities::{
    Battle, BattleId, BattlePhase, BattleStatus, Category, CategoryId, Performer, PerformerId,
    Pool, PoolId, TiebreakMeta, Tournament, TournamentId, TournamentPhase, TournamentStatus,
};
pub use errors::{EngineError, EngineResult, ValidationReport};
pub use outcome::{Outcome, OutcomeKind, Score};
