//! Core tournament entities.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::errors::EngineError;
use super::outcome::{Outcome, OutcomeKind, Score};
use crate::constants::{DRAW_POINTS, WIN_POINTS};

pub type TournamentId = Uuid;
pub type CategoryId = Uuid;
pub type PerformerId = Uuid;
pub type PoolId = Uuid;
pub type BattleId = Uuid;

/// Tournament lifecycle status
#[derive(Clone, Copy, Debug, Deserialize, Eq, PartialEq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TournamentStatus {
    Created,
    Active,
    Completed,
    Cancelled,
}

impl TournamentStatus {
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Created => "created",
            Self::Active => "active",
            Self::Completed => "completed",
            Self::Cancelled => "cancelled",
        }
    }
}

impl fmt::Display for TournamentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for TournamentStatus {
    type Err = EngineError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "created" => Ok(Self::Created),
            "active" => Ok(Self::Active),
            "completed" => Ok(Self::Completed),
            "cancelled" => Ok(Self::Cancelled),
            other => Err(EngineError::InvalidArgument(format!(
                "unknown tournament status {other:?}"
            ))),
        }
    }
}

/// Tournament phase. Phases only move forward; none may be skipped or
/// reverted, and `Completed` is terminal.
#[derive(Clone, Copy, Debug, Deserialize, Eq, PartialEq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TournamentPhase {
    Registration,
    Preselection,
    Pools,
    Finals,
    Completed,
}

impl TournamentPhase {
    /// The phase that follows this one, or None once Completed.
    #[must_use]
    pub fn next(&self) -> Option<TournamentPhase> {
        match self {
            Self::Registration => Some(Self::Preselection),
            Self::Preselection => Some(Self::Pools),
            Self::Pools => Some(Self::Finals),
            Self::Finals => Some(Self::Completed),
            Self::Completed => None,
        }
    }

    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Registration => "registration",
            Self::Preselection => "preselection",
            Self::Pools => "pools",
            Self::Finals => "finals",
            Self::Completed => "completed",
        }
    }
}

impl fmt::Display for TournamentPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for TournamentPhase {
    type Err = EngineError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "registration" => Ok(Self::Registration),
            "preselection" => Ok(Self::Preselection),
            "pools" => Ok(Self::Pools),
            "finals" => Ok(Self::Finals),
            "completed" => Ok(Self::Completed),
            other => Err(EngineError::InvalidArgument(format!(
                "unknown tournament phase {other:?}"
            ))),
        }
    }
}

/// A tournament run. Status and phase are mutated only by the phase state
/// machine, except for cancellation.
#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
pub struct Tournament {
    pub id: TournamentId,
    pub name: String,
    pub status: TournamentStatus,
    pub phase: TournamentPhase,
    pub created_at: DateTime<Utc>,
}

impl Tournament {
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            name: name.into(),
            status: TournamentStatus::Created,
            phase: TournamentPhase::Registration,
            created_at: Utc::now(),
        }
    }
}

/// A competitive category within a tournament (e.g. "Breaking 1v1").
#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
pub struct Category {
    pub id: CategoryId,
    pub tournament_id: TournamentId,
    pub name: String,
    /// Target pool count, fixed at creation.
    pub groups_ideal: usize,
    /// Target performers per pool; a capacity target, not a strict minimum.
    pub performers_ideal: usize,
    pub created_at: DateTime<Utc>,
}

impl Category {
    #[must_use]
    pub fn new(
        tournament_id: TournamentId,
        name: impl Into<String>,
        groups_ideal: usize,
        performers_ideal: usize,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            tournament_id,
            name: name.into(),
            groups_ideal,
            performers_ideal,
            created_at: Utc::now(),
        }
    }
}

/// A dancer's registration into one category of one tournament.
#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
pub struct Performer {
    pub id: PerformerId,
    pub category_id: CategoryId,
    pub name: String,
    /// Guests bypass Preselection and are scored at the maximum, but still
    /// count toward pool capacity.
    pub is_guest: bool,
    pub preselection_score: Option<Score>,
    pub wins: u32,
    pub draws: u32,
    pub losses: u32,
    pub registered_at: DateTime<Utc>,
}

impl Performer {
    #[must_use]
    pub fn new(category_id: CategoryId, name: impl Into<String>, is_guest: bool) -> Self {
        Self {
            id: Uuid::new_v4(),
            category_id,
            name: name.into(),
            is_guest,
            preselection_score: is_guest.then_some(Score::MAX),
            wins: 0,
            draws: 0,
            losses: 0,
            registered_at: Utc::now(),
        }
    }

    /// Pool standing points: 3 per win, 1 per draw.
    #[must_use]
    pub fn pool_points(&self) -> u32 {
        self.wins * WIN_POINTS + self.draws * DRAW_POINTS
    }
}

/// A round-robin group in the Pools phase.
#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
pub struct Pool {
    pub id: PoolId,
    pub category_id: CategoryId,
    pub name: String,
    /// Members in ranked assignment order.
    pub performer_ids: Vec<PerformerId>,
    /// Set only once exactly one performer holds the maximum pool points.
    pub winner_id: Option<PerformerId>,
    pub created_at: DateTime<Utc>,
}

impl Pool {
    #[must_use]
    pub fn new(
        category_id: CategoryId,
        name: impl Into<String>,
        performer_ids: Vec<PerformerId>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            category_id,
            name: name.into(),
            performer_ids,
            winner_id: None,
            created_at: Utc::now(),
        }
    }
}

/// Phase a battle belongs to. Tiebreak battles are supplementary and exist
/// outside the four tournament phases.
#[derive(Clone, Copy, Debug, Deserialize, Eq, PartialEq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum BattlePhase {
    Preselection,
    Pools,
    Tiebreak,
    Finals,
}

impl BattlePhase {
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Preselection => "preselection",
            Self::Pools => "pools",
            Self::Tiebreak => "tiebreak",
            Self::Finals => "finals",
        }
    }
}

impl fmt::Display for BattlePhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for BattlePhase {
    type Err = EngineError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "preselection" => Ok(Self::Preselection),
            "pools" => Ok(Self::Pools),
            "tiebreak" => Ok(Self::Tiebreak),
            "finals" => Ok(Self::Finals),
            other => Err(EngineError::InvalidArgument(format!(
                "unknown battle phase {other:?}"
            ))),
        }
    }
}

/// Battle execution status. At most one battle is Active system-wide.
#[derive(Clone, Copy, Debug, Deserialize, Eq, PartialEq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum BattleStatus {
    Pending,
    Active,
    Completed,
}

impl BattleStatus {
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Active => "active",
            Self::Completed => "completed",
        }
    }
}

impl fmt::Display for BattleStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for BattleStatus {
    type Err = EngineError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(Self::Pending),
            "active" => Ok(Self::Active),
            "completed" => Ok(Self::Completed),
            other => Err(EngineError::InvalidArgument(format!(
                "unknown battle status {other:?}"
            ))),
        }
    }
}

/// Voting-round state carried by a tiebreak battle.
///
/// `remaining` shrinks by one per eliminate-mode round until it reaches
/// `winners_needed`.
#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
pub struct TiebreakMeta {
    pub winners_needed: usize,
    pub total_performers: usize,
    pub current_round: u32,
    pub remaining: Vec<PerformerId>,
    pub eliminated: Vec<PerformerId>,
    /// Present for pool-winner tiebreaks; absent for qualification tiebreaks.
    pub pool_id: Option<PoolId>,
}

/// A battle between performers of one category.
#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
pub struct Battle {
    pub id: BattleId,
    pub category_id: CategoryId,
    pub phase: BattlePhase,
    pub status: BattleStatus,
    pub outcome_kind: OutcomeKind,
    pub outcome: Option<Outcome>,
    pub winner_id: Option<PerformerId>,
    pub performer_ids: Vec<PerformerId>,
    /// Set for Pool battles and pool-winner tiebreaks.
    pub pool_id: Option<PoolId>,
    /// Queue position; dense and 1-based within the generated queue.
    pub sequence_order: Option<u32>,
    pub tiebreak: Option<TiebreakMeta>,
    pub created_at: DateTime<Utc>,
}

impl Battle {
    fn blank(
        category_id: CategoryId,
        phase: BattlePhase,
        outcome_kind: OutcomeKind,
        performer_ids: Vec<PerformerId>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            category_id,
            phase,
            status: BattleStatus::Pending,
            outcome_kind,
            outcome: None,
            winner_id: None,
            performer_ids,
            pool_id: None,
            sequence_order: None,
            tiebreak: None,
            created_at: Utc::now(),
        }
    }

    #[must_use]
    pub fn preselection(category_id: CategoryId, performer_ids: Vec<PerformerId>) -> Self {
        Self::blank(
            category_id,
            BattlePhase::Preselection,
            OutcomeKind::Scored,
            performer_ids,
        )
    }

    #[must_use]
    pub fn pool_pair(pool: &Pool, a: PerformerId, b: PerformerId) -> Self {
        let mut battle = Self::blank(
            pool.category_id,
            BattlePhase::Pools,
            OutcomeKind::WinDrawLoss,
            vec![a, b],
        );
        battle.pool_id = Some(pool.id);
        battle
    }

    #[must_use]
    pub fn finals(category_id: CategoryId, performer_ids: Vec<PerformerId>) -> Self {
        Self::blank(
            category_id,
            BattlePhase::Finals,
            OutcomeKind::WinLoss,
            performer_ids,
        )
    }

    #[must_use]
    pub fn tiebreak(
        category_id: CategoryId,
        tied: Vec<PerformerId>,
        winners_needed: usize,
        pool_id: Option<PoolId>,
    ) -> Self {
        let meta = TiebreakMeta {
            winners_needed,
            total_performers: tied.len(),
            current_round: 0,
            remaining: tied.clone(),
            eliminated: Vec::new(),
            pool_id,
        };
        let mut battle = Self::blank(
            category_id,
            BattlePhase::Tiebreak,
            OutcomeKind::Tiebreak,
            tied,
        );
        battle.pool_id = pool_id;
        battle.tiebreak = Some(meta);
        battle
    }

    #[must_use]
    pub fn has_performer(&self, id: PerformerId) -> bool {
        self.performer_ids.contains(&id)
    }

    #[must_use]
    pub fn is_completed(&self) -> bool {
        self.status == BattleStatus::Completed
    }
}
