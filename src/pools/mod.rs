//! Pool qualification and distribution.
//!
//! Converts ranked Preselection results into pool assignments: qualification
//! cutoff from [`calc::pool_capacity`], tie-aware ranking, then contiguous
//! assignment over [`calc::distribute_pool_sizes`].

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use log::{debug, info};

use crate::calc;
use crate::model::{
    Category, CategoryId, EngineError, EngineResult, Performer, PerformerId, Pool,
    ValidationReport,
};
use crate::store::Store;

/// Rank performers for qualification, best first.
///
/// Descending by score; among equal scores guests rank above non-guests
/// (guests always score the maximum, which is what guarantees their
/// qualification ahead of tied regular performers); among those, performers
/// who won a completed qualification tiebreak rank above the rest; finally
/// earlier registration wins. Fails when any performer is unscored.
pub fn rank_performers(
    performers: &[Performer],
    tiebreak_winners: &HashSet<PerformerId>,
) -> EngineResult<Vec<Performer>> {
    let unscored: Vec<&str> = performers
        .iter()
        .filter(|p| p.preselection_score.is_none())
        .map(|p| p.name.as_str())
        .collect();
    if !unscored.is_empty() {
        let mut report = ValidationReport::new();
        for name in unscored {
            report.error(format!("performer {name} has no preselection score"));
        }
        return Err(EngineError::Validation(report));
    }

    let mut ranked = performers.to_vec();
    ranked.sort_by(|a, b| {
        b.preselection_score
            .cmp(&a.preselection_score)
            .then_with(|| b.is_guest.cmp(&a.is_guest))
            .then_with(|| {
                tiebreak_winners
                    .contains(&b.id)
                    .cmp(&tiebreak_winners.contains(&a.id))
            })
            .then_with(|| a.registered_at.cmp(&b.registered_at))
    });
    Ok(ranked)
}

fn pool_name(index: usize) -> String {
    if index < 26 {
        let letter = (b'A' + index as u8) as char;
        format!("Pool {letter}")
    } else {
        format!("Pool {}", index + 1)
    }
}

/// Build the category's pools from its scored performers.
///
/// `tiebreak_winners` holds the winners of the category's completed
/// qualification tiebreak, if one ran; it decides ranking inside the tied
/// score group. Qualified performers fill pools contiguously in ranked
/// order, the largest pool taking the highest-ranked block.
pub fn build_pools(
    category: &Category,
    performers: &[Performer],
    tiebreak_winners: &HashSet<PerformerId>,
) -> EngineResult<Vec<Pool>> {
    let ranked = rank_performers(performers, tiebreak_winners)?;
    let capacity = calc::pool_capacity(ranked.len(), category.groups_ideal)?;
    let sizes = calc::distribute_pool_sizes(capacity.qualifying, category.groups_ideal)?;

    let mut pools = Vec::with_capacity(sizes.len());
    let mut offset = 0;
    for (index, size) in sizes.into_iter().enumerate() {
        let members = ranked[offset..offset + size]
            .iter()
            .map(|p| p.id)
            .collect();
        pools.push(Pool::new(category.id, pool_name(index), members));
        offset += size;
    }
    info!(
        "category {}: {} qualified into {} pools, {} eliminated",
        category.name,
        capacity.qualifying,
        pools.len(),
        capacity.eliminated
    );
    Ok(pools)
}

/// A pool's standing after its round-robin: the performers holding the
/// maximum pool points. One leader means a decided pool; several mean the
/// Tiebreak Resolver must run.
#[derive(Clone, Debug)]
pub struct PoolStanding {
    pub pool: Pool,
    pub leaders: Vec<Performer>,
}

impl PoolStanding {
    #[must_use]
    pub fn is_decided(&self) -> bool {
        self.leaders.len() == 1
    }
}

/// Pool distribution service.
pub struct PoolDistributor {
    store: Arc<dyn Store>,
}

impl PoolDistributor {
    #[must_use]
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self { store }
    }

    /// Determine each pool's winner from pool points. Pools with a unique
    /// leader get `winner_id` persisted; pools with tied leaders are left
    /// open and reported for tiebreak resolution.
    pub async fn pool_winners(&self, category_id: CategoryId) -> EngineResult<Vec<PoolStanding>> {
        let pools = self.store.pools(category_id).await?;
        let performers = self.store.performers(category_id).await?;
        let by_id: HashMap<PerformerId, &Performer> =
            performers.iter().map(|p| (p.id, p)).collect();

        let mut standings = Vec::with_capacity(pools.len());
        for mut pool in pools {
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
                if pool.winner_id.is_none() {
                    pool.winner_id = Some(leader.id);
                    self.store.update_pool(&pool).await?;
                    debug!("pool {} won by {}", pool.name, leader.name);
                }
            }
            standings.push(PoolStanding { pool, leaders });
        }
        Ok(standings)
    }
}
