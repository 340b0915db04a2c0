//! # Throwdown
//!
//! A dance-battle tournament engine built around a strictly-forward phase
//! state machine.
//!
//! Tournaments run through four sequential phases, each gated by a
//! phase-specific validator before the next phase's battles are generated:
//!
//! - **Registration**: categories are created and dancers register
//! - **Preselection**: shuffled 1-on-1 (and 3-way) battles, judged 0-10
//! - **Pools**: qualified performers battle round-robin for win/draw/loss
//!   points
//! - **Finals**: pool winners meet in a single battle, one winner
//! - **Completed**: terminal
//!
//! Ties at the qualification cutoff or at pool-winner determination spawn
//! supplementary Tiebreak battles resolved by judge votes over elimination
//! rounds.
//!
//! ## Core Modules
//!
//! - [`calc`]: pure capacity and distribution arithmetic
//! - [`model`]: entities, outcome payloads, error types
//! - [`generator`]: battle generation and the interleaved queue
//! - [`pools`]: qualification ranking and pool assignment
//! - [`tiebreak`]: tie detection and vote processing
//! - [`phase`]: the phase state machine
//! - [`encode`]: the result-encoding interface
//! - [`manager`]: tournament administration
//! - [`store`]: the persistence boundary (in-memory and PostgreSQL)
//!
//! ## Example
//!
//! ```
//! use throwdown::calc;
//!
//! // 9 registered performers, 2 pools: a quarter of the field is
//! // eliminated and the rest split 4/3.
//! let capacity = calc::pool_capacity(9, 2).unwrap();
//! assert_eq!(capacity.qualifying, 7);
//! assert_eq!(calc::distribute_pool_sizes(7, 2).unwrap(), vec![4, 3]);
//! ```

pub mod calc;
pub mod constants;
pub mod encode;
pub mod generator;
pub mod manager;
pub mod model;
pub mod phase;
pub mod pools;
pub mod store;
pub mod tiebreak;

pub use encode::ResultEncoder;
pub use generator::BattleQueue;
pub use manager::TournamentManager;
pub use model::{
    Battle, BattleId, BattlePhase, BattleStatus, Category, CategoryId, EngineError, EngineResult,
    Outcome, OutcomeKind, Performer, PerformerId, Pool, PoolId, Score, TiebreakMeta, Tournament,
    TournamentId, TournamentPhase, TournamentStatus, ValidationReport,
};
pub use phase::PhaseMachine;
pub use pools::PoolDistributor;
pub use store::{AdvanceArtifacts, BattleFilter, MemoryStore, PgStore, Store, StoreConfig};
pub use tiebreak::TiebreakResolver;
