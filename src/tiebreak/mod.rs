//! Tie detection and tiebreak battle management.
//!
//! Ties appear at two boundaries: the Preselection qualification cutoff
//! (several performers sharing the boundary score compete for fewer slots)
//! and pool-winner determination (several performers sharing the maximum
//! pool points). Both spawn a supplementary Tiebreak battle resolved by
//! judge votes in `voting`.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use log::{debug, info};

use crate::calc::{self, PoolCapacity};
use crate::model::{
    Battle, BattlePhase, CategoryId, EngineError, EngineResult, Outcome, Performer, PerformerId,
    PoolId,
};
use crate::pools::rank_performers;
use crate::store::{BattleFilter, Store};

pub mod voting;

pub use voting::{VoteOutcome, process_votes};

/// The qualification-boundary tie, if one exists: the tied performers and
/// the number of slots left for them.
fn boundary_tie(
    performers: &[Performer],
    capacity: &PoolCapacity,
) -> EngineResult<Option<(Vec<Performer>, usize)>> {
    let ranked = rank_performers(performers, &HashSet::new())?;
    let qualifying = capacity.qualifying;
    if ranked.len() <= qualifying {
        return Ok(None);
    }

    // Scores are guaranteed present after ranking.
    let boundary = ranked[qualifying - 1].preselection_score;
    let above = ranked
        .iter()
        .filter(|p| p.preselection_score > boundary || (p.preselection_score == boundary && p.is_guest))
        .count();
    let tied: Vec<Performer> = ranked
        .iter()
        .filter(|p| !p.is_guest && p.preselection_score == boundary)
        .cloned()
        .collect();

    // No slots left at the boundary score means the ranking already decided
    // (guests outrank the group); a fitting group is no tie at all.
    let slots = qualifying.saturating_sub(above);
    if slots >= 1 && tied.len() > slots {
        Ok(Some((tied, slots)))
    } else {
        Ok(None)
    }
}

/// Performers tied at the qualification boundary, or empty when the cutoff
/// is clean.
pub fn detect_preselection_ties(
    performers: &[Performer],
    capacity: &PoolCapacity,
) -> EngineResult<Vec<Performer>> {
    Ok(boundary_tie(performers, capacity)?
        .map(|(tied, _)| tied)
        .unwrap_or_default())
}

/// Create a tiebreak battle over the tied performers.
pub fn tiebreak_battle(
    category_id: CategoryId,
    tied: &[Performer],
    winners_needed: usize,
    pool_id: Option<PoolId>,
) -> EngineResult<Battle> {
    if winners_needed < 1 || winners_needed >= tied.len() {
        return Err(EngineError::invalid(format!(
            "tiebreak over {} performers cannot produce {winners_needed} winner(s)",
            tied.len()
        )));
    }
    Ok(Battle::tiebreak(
        category_id,
        tied.iter().map(|p| p.id).collect(),
        winners_needed,
        pool_id,
    ))
}

/// Winners of the category's completed qualification tiebreak, for use in
/// qualification ranking. Empty when no such tiebreak ran.
#[must_use]
pub fn qualification_tiebreak_winners(battles: &[Battle]) -> HashSet<PerformerId> {
    battles
        .iter()
        .filter(|b| b.phase == BattlePhase::Tiebreak && b.pool_id.is_none() && b.is_completed())
        .filter_map(|b| match &b.outcome {
            Some(Outcome::Tiebreak { winner_ids }) => Some(winner_ids.clone()),
            _ => None,
        })
        .flatten()
        .collect()
}

/// Tiebreak detection service.
pub struct TiebreakResolver {
    store: Arc<dyn Store>,
}

impl TiebreakResolver {
    #[must_use]
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self { store }
    }

    /// Detect a qualification-boundary tie and create its tiebreak battle.
    ///
    /// Idempotent: if any qualification tiebreak already exists for the
    /// category — in progress or already resolved — nothing is created.
    /// Returns the created battle, if any.
    pub async fn ensure_preselection_tiebreak(
        &self,
        category_id: CategoryId,
    ) -> EngineResult<Option<Battle>> {
        let existing = self
            .store
            .battles(BattleFilter::category(category_id).with_phase(BattlePhase::Tiebreak))
            .await?;
        if existing.iter().any(|b| b.pool_id.is_none()) {
            debug!("category {category_id} already has a qualification tiebreak");
            return Ok(None);
        }

        let performers = self.store.performers(category_id).await?;
        if performers.iter().any(|p| p.preselection_score.is_none()) {
            // Preselection is not finished; detection would be premature.
            return Ok(None);
        }
        let category = self.store.category(category_id).await?;
        let capacity = calc::pool_capacity(performers.len(), category.groups_ideal)?;

        match boundary_tie(&performers, &capacity)? {
            None => Ok(None),
            Some((tied, slots)) => {
                let battle = tiebreak_battle(category_id, &tied, slots, None)?;
                self.store.insert_battles(std::slice::from_ref(&battle)).await?;
                info!(
                    "category {}: {} performers tied at the cutoff for {} slot(s)",
                    category.name,
                    tied.len(),
                    slots
                );
                Ok(Some(battle))
            }
        }
    }

    /// Settle pool winners for every pool of the category still lacking one.
    ///
    /// Pools with a unique points leader get `winner_id` set directly; pools
    /// with tied leaders each spawn one tiebreak battle (one winner needed).
    /// Pools that already have a tiebreak battle are skipped (idempotency).
    /// Returns the battles created.
    pub async fn resolve_pool_winners(
        &self,
        category_id: CategoryId,
    ) -> EngineResult<Vec<Battle>> {
        let pools = self.store.pools(category_id).await?;
        let performers = self.store.performers(category_id).await?;
        let by_id: HashMap<PerformerId, &Performer> =
            performers.iter().map(|p| (p.id, p)).collect();
        let existing = self
            .store
            .battles(BattleFilter::category(category_id).with_phase(BattlePhase::Tiebreak))
            .await?;

        let mut created = Vec::new();
        for mut pool in pools {
            if pool.winner_id.is_some() {
                continue;
            }
            if existing.iter().any(|b| b.pool_id == Some(pool.id)) {
                debug!("pool {} already has a tiebreak battle", pool.name);
                continue;
            }
            let members: Vec<&Performer> = pool
                .performer_ids
                .iter()
                .map(|id| {
                    by_id
                        .get(id)
                        .copied()
                        .ok_or_else(|| EngineError::not_found("performer", *id))
                })
                .collect::<EngineResult<_>>()?;
            let top = members.iter().map(|p| p.pool_points()).max().unwrap_or(0);
            let leaders: Vec<Performer> = members
                .iter()
                .filter(|p| p.pool_points() == top)
                .map(|p| (*p).clone())
                .collect();

            if let [leader] = leaders.as_slice() {
                pool.winner_id = Some(leader.id);
                self.store.update_pool(&pool).await?;
                debug!("pool {} won by {}", pool.name, leader.name);
            } else {
                let battle = tiebreak_battle(category_id, &leaders, 1, Some(pool.id))?;
                info!(
                    "pool {}: {} performers tied on points, tiebreak created",
                    pool.name,
                    leaders.len()
                );
                self.store.insert_battles(std::slice::from_ref(&battle)).await?;
                created.push(battle);
            }
        }
        Ok(created)
    }
}
