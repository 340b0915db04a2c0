//! Battle generation for each tournament phase.
//!
//! Preselection pairing shuffles the field and pairs sequentially, folding an
//! odd tail into one 3-way battle. Pool battles are a full round-robin.
//! Finals is a single battle between the pool winners. The interleaved queue
//! merges per-category preselection battles round-robin so no category
//! dominates a long stretch of the run sheet.

use log::{debug, info};
use rand::seq::SliceRandom;

use crate::model::{
    Battle, Category, CategoryId, EngineError, EngineResult, Performer, PerformerId, Pool,
};

pub mod queue;

pub use queue::BattleQueue;

/// Generate Preselection battles for one category.
///
/// Performers are shuffled uniformly at random and paired sequentially into
/// 1-on-1 battles. An odd field folds its final three performers into one
/// 3-way battle; a field of exactly 3 is a single 3-way battle. Callers pass
/// the guest-filtered field (guests bypass Preselection). Every performer
/// appears in exactly one battle.
#[must_use]
pub fn preselection_battles(category: &Category, performers: &[Performer]) -> Vec<Battle> {
    let mut ids: Vec<PerformerId> = performers.iter().map(|p| p.id).collect();
    ids.shuffle(&mut rand::rng());
    let battles = pair_up(category.id, &ids);
    debug!(
        "generated {} preselection battles for category {}",
        battles.len(),
        category.name
    );
    battles
}

fn pair_up(category_id: CategoryId, ids: &[PerformerId]) -> Vec<Battle> {
    let n = ids.len();
    let mut battles = Vec::with_capacity(n / 2 + 1);
    let trio = n >= 3 && n % 2 == 1;
    let paired = if trio { n - 3 } else { n - n % 2 };
    for pair in ids[..paired].chunks(2) {
        battles.push(Battle::preselection(category_id, pair.to_vec()));
    }
    if trio {
        battles.push(Battle::preselection(category_id, ids[paired..].to_vec()));
    } else if n % 2 == 1 {
        // A lone performer still gets judged: a single showcase battle.
        battles.push(Battle::preselection(category_id, vec![ids[n - 1]]));
    }
    battles
}

/// Round-robin battles for one pool: one battle per unordered performer
/// pair, `n*(n-1)/2` in total.
#[must_use]
pub fn pool_battles(pool: &Pool) -> Vec<Battle> {
    let ids = &pool.performer_ids;
    let mut battles = Vec::with_capacity(ids.len() * ids.len().saturating_sub(1) / 2);
    for (i, &a) in ids.iter().enumerate() {
        for &b in &ids[i + 1..] {
            battles.push(Battle::pool_pair(pool, a, b));
        }
    }
    battles
}

/// The Finals battle: all pool winners in one battle, single winner, no
/// draws.
pub fn finals_battle(category: &Category, winners: &[Performer]) -> EngineResult<Battle> {
    if winners.len() < 2 {
        return Err(EngineError::invalid(format!(
            "category {} has {} pool winner(s), finals needs at least 2",
            category.name,
            winners.len()
        )));
    }
    Ok(Battle::finals(
        category.id,
        winners.iter().map(|p| p.id).collect(),
    ))
}

/// Generate the tournament-wide Preselection queue.
///
/// Battles are generated independently per category (in category listing
/// order), merged by round-robin interleaving, and given a dense 1-based
/// `sequence_order` across the merged queue.
pub fn interleaved_preselection(
    fields: &[(Category, Vec<Performer>)],
) -> EngineResult<Vec<Battle>> {
    if fields.is_empty() {
        return Err(EngineError::invalid("tournament has no categories"));
    }
    let per_category: Vec<Vec<Battle>> = fields
        .iter()
        .map(|(category, performers)| {
            let eligible: Vec<Performer> = performers
                .iter()
                .filter(|p| !p.is_guest)
                .cloned()
                .collect();
            preselection_battles(category, &eligible)
        })
        .collect();

    let mut merged = interleave(per_category);
    if merged.is_empty() {
        return Err(EngineError::invalid("no category has any performer"));
    }
    for (i, battle) in merged.iter_mut().enumerate() {
        battle.sequence_order = Some(i as u32 + 1);
    }
    info!(
        "queued {} preselection battles across {} categories",
        merged.len(),
        fields.len()
    );
    Ok(merged)
}

fn interleave(mut per_category: Vec<Vec<Battle>>) -> Vec<Battle> {
    let total: usize = per_category.iter().map(Vec::len).sum();
    let mut queues: Vec<std::vec::IntoIter<Battle>> = per_category
        .drain(..)
        .map(Vec::into_iter)
        .collect();
    let mut merged = Vec::with_capacity(total);
    while merged.len() < total {
        for queue in &mut queues {
            if let Some(battle) = queue.next() {
                merged.push(battle);
            }
        }
    }
    merged
}
