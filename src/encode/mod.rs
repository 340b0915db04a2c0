//! Result encoding: the write interface the operator layer uses to record
//! battle outcomes.
//!
//! The payload must match the battle's outcome kind. Encoding sets the
//! outcome, the winner where applicable, marks the battle Completed, applies
//! performer-side effects atomically, and fires tiebreak auto-detection once
//! a category's Preselection or Pools battles are all finished. Tiebreak
//! battles are encoded one voting round at a time through
//! [`ResultEncoder::encode_tiebreak_round`].

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use log::{debug, info};

use crate::model::{
    Battle, BattleId, BattlePhase, BattleStatus, CategoryId, EngineError, EngineResult, Outcome,
    PerformerId, Score, ValidationReport,
};
use crate::store::{BattleFilter, Store};
use crate::tiebreak::{self, TiebreakResolver};

/// Result-encoding service.
pub struct ResultEncoder {
    store: Arc<dyn Store>,
    resolver: TiebreakResolver,
}

impl ResultEncoder {
    #[must_use]
    pub fn new(store: Arc<dyn Store>) -> Self {
        let resolver = TiebreakResolver::new(store.clone());
        Self { store, resolver }
    }

    /// Encode a battle result. The payload variant must match the battle's
    /// outcome kind; tiebreak battles are rejected here and go through
    /// [`Self::encode_tiebreak_round`] instead.
    pub async fn encode(&self, battle_id: BattleId, payload: Outcome) -> EngineResult<Battle> {
        let battle = self.store.battle(battle_id).await?;
        if battle.is_completed() {
            return Err(EngineError::invalid(format!(
                "battle {battle_id} is already completed"
            )));
        }
        if payload.kind() != battle.outcome_kind {
            return Err(EngineError::invalid(format!(
                "payload kind {} does not match battle kind {}",
                payload.kind(),
                battle.outcome_kind
            )));
        }

        match payload {
            Outcome::Scored { scores } => self.encode_scored(battle, scores).await,
            Outcome::WinDrawLoss { winner_id } => self.encode_pool(battle, winner_id).await,
            Outcome::WinLoss { winner_id } => self.encode_finals(battle, winner_id).await,
            Outcome::Tiebreak { .. } => Err(EngineError::invalid(
                "tiebreak battles are encoded one voting round at a time",
            )),
        }
    }

    async fn encode_scored(
        &self,
        mut battle: Battle,
        scores: BTreeMap<PerformerId, Score>,
    ) -> EngineResult<Battle> {
        let expected: BTreeSet<PerformerId> = battle.performer_ids.iter().copied().collect();
        let given: BTreeSet<PerformerId> = scores.keys().copied().collect();
        if expected != given {
            let mut report = ValidationReport::new();
            for id in expected.difference(&given) {
                report.error(format!("performer {id} is missing a score"));
            }
            for id in given.difference(&expected) {
                report.error(format!("performer {id} is not part of this battle"));
            }
            return Err(EngineError::Validation(report));
        }

        let mut updated = Vec::with_capacity(scores.len());
        for (id, score) in &scores {
            let mut performer = self.store.performer(*id).await?;
            performer.preselection_score = Some(*score);
            updated.push(performer);
        }
        battle.outcome = Some(Outcome::Scored { scores });
        battle.status = BattleStatus::Completed;
        self.store
            .commit_battle_result(&battle, &updated, None)
            .await?;
        debug!("battle {} scored", battle.id);

        self.after_preselection(battle.category_id).await?;
        Ok(battle)
    }

    async fn encode_pool(
        &self,
        mut battle: Battle,
        winner_id: Option<PerformerId>,
    ) -> EngineResult<Battle> {
        let [a, b] = battle.performer_ids.as_slice() else {
            return Err(EngineError::invalid(format!(
                "pool battle {} does not have exactly two performers",
                battle.id
            )));
        };
        let (a, b) = (*a, *b);
        if let Some(winner) = winner_id {
            if !battle.has_performer(winner) {
                return Err(EngineError::invalid(format!(
                    "performer {winner} is not part of this battle"
                )));
            }
        }

        let mut first = self.store.performer(a).await?;
        let mut second = self.store.performer(b).await?;
        match winner_id {
            Some(winner) if winner == a => {
                first.wins += 1;
                second.losses += 1;
            }
            Some(_) => {
                second.wins += 1;
                first.losses += 1;
            }
            None => {
                first.draws += 1;
                second.draws += 1;
            }
        }

        battle.winner_id = winner_id;
        battle.outcome = Some(Outcome::WinDrawLoss { winner_id });
        battle.status = BattleStatus::Completed;
        self.store
            .commit_battle_result(&battle, &[first, second], None)
            .await?;
        debug!("battle {} encoded", battle.id);

        self.after_pools(battle.category_id).await?;
        Ok(battle)
    }

    async fn encode_finals(
        &self,
        mut battle: Battle,
        winner_id: PerformerId,
    ) -> EngineResult<Battle> {
        if !battle.has_performer(winner_id) {
            return Err(EngineError::invalid(format!(
                "performer {winner_id} is not part of this battle"
            )));
        }
        battle.winner_id = Some(winner_id);
        battle.outcome = Some(Outcome::WinLoss { winner_id });
        battle.status = BattleStatus::Completed;
        self.store.commit_battle_result(&battle, &[], None).await?;
        info!("finals battle {} won by {winner_id}", battle.id);
        Ok(battle)
    }

    /// Encode one round of judge votes on a tiebreak battle.
    ///
    /// Keep mode (two performers) resolves immediately; eliminate mode drops
    /// the plurality holder and either resolves or advances to the next
    /// round. On resolution the battle completes, and a pool-winner
    /// tiebreak writes the pool's winner in the same commit.
    pub async fn encode_tiebreak_round(
        &self,
        battle_id: BattleId,
        votes: &[PerformerId],
    ) -> EngineResult<Battle> {
        let mut battle = self.store.battle(battle_id).await?;
        if battle.phase != BattlePhase::Tiebreak {
            return Err(EngineError::invalid(format!(
                "battle {battle_id} is not a tiebreak battle"
            )));
        }
        if battle.is_completed() {
            return Err(EngineError::invalid(format!(
                "battle {battle_id} is already completed"
            )));
        }
        let mut meta = battle.tiebreak.clone().ok_or_else(|| {
            EngineError::Conflict(format!("battle {battle_id} is missing tiebreak metadata"))
        })?;

        let round =
            tiebreak::process_votes(&meta.remaining, votes, meta.winners_needed, meta.current_round)?;
        meta.remaining = round.remaining.clone();
        meta.eliminated.extend(round.eliminated);
        meta.current_round = round.next_round;
        battle.tiebreak = Some(meta.clone());

        if round.complete {
            battle.winner_id = (round.winners.len() == 1).then(|| round.winners[0]);
            battle.outcome = Some(Outcome::Tiebreak {
                winner_ids: round.winners.clone(),
            });
            battle.status = BattleStatus::Completed;

            let pool = match meta.pool_id {
                Some(pool_id) => {
                    let mut pool = self.store.pool(pool_id).await?;
                    pool.winner_id = Some(round.winners[0]);
                    Some(pool)
                }
                None => None,
            };
            self.store
                .commit_battle_result(&battle, &[], pool.as_ref())
                .await?;
            info!(
                "tiebreak battle {} resolved with {} winner(s)",
                battle.id,
                round.winners.len()
            );
        } else {
            self.store.update_battle(&battle).await?;
            debug!(
                "tiebreak battle {} advanced to round {}",
                battle.id, meta.current_round
            );
        }
        Ok(battle)
    }

    /// Once every Preselection battle of the category is finished, look for
    /// a qualification tie. Idempotent through the resolver's guard.
    async fn after_preselection(&self, category_id: CategoryId) -> EngineResult<()> {
        let open = self
            .store
            .battles(BattleFilter::category(category_id).with_phase(BattlePhase::Preselection))
            .await?
            .iter()
            .filter(|b| !b.is_completed())
            .count();
        if open == 0 {
            self.resolver
                .ensure_preselection_tiebreak(category_id)
                .await?;
        }
        Ok(())
    }

    /// Once every Pool battle of the category is finished, settle pool
    /// winners and spawn pool-winner tiebreaks where points are tied.
    async fn after_pools(&self, category_id: CategoryId) -> EngineResult<()> {
        let open = self
            .store
            .battles(BattleFilter::category(category_id).with_phase(BattlePhase::Pools))
            .await?
            .iter()
            .filter(|b| !b.is_completed())
            .count();
        if open == 0 {
            self.resolver.resolve_pool_winners(category_id).await?;
        }
        Ok(())
    }
}
