//! Battle queue operations: inspecting the run sheet, starting battles, and
//! reordering pending battles.

use std::sync::Arc;

use log::info;

use crate::model::{Battle, BattleId, BattleStatus, EngineError, EngineResult, TournamentId};
use crate::store::{BattleFilter, Store};

/// Queue service over the battle store.
pub struct BattleQueue {
    store: Arc<dyn Store>,
}

impl BattleQueue {
    #[must_use]
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self { store }
    }

    /// The tournament's "on deck" battle: the first Pending battle in queue
    /// order, if any.
    pub async fn next_battle(&self, tournament_id: TournamentId) -> EngineResult<Option<Battle>> {
        let pending = self
            .store
            .battles(BattleFilter::tournament(tournament_id).with_status(BattleStatus::Pending))
            .await?;
        Ok(pending.into_iter().next())
    }

    /// Start a Pending battle. The store enforces the global single-active
    /// invariant and fails with a conflict if another battle is running.
    pub async fn start_battle(&self, battle_id: BattleId) -> EngineResult<Battle> {
        let battle = self.store.activate_battle(battle_id).await?;
        info!("battle {} is now active", battle.id);
        Ok(battle)
    }

    /// Move a Pending battle to a new position among its category's Pending
    /// battles (1-based).
    ///
    /// The first Pending battle is on deck and locked: it cannot be moved,
    /// and nothing can be moved into position 1. Active and Completed
    /// battles never change position. The destination is clamped to the
    /// Pending count. After the move, the category's Pending battles
    /// reoccupy the ascending set of sequence slots they held before, so
    /// completed positions and cross-category interleaving stay intact.
    ///
    /// Returns the category's Pending battles in their new order.
    pub async fn reorder(&self, battle_id: BattleId, new_position: u32) -> EngineResult<Vec<Battle>> {
        let battle = self.store.battle(battle_id).await?;
        if battle.status != BattleStatus::Pending {
            return Err(EngineError::invalid(format!(
                "battle {battle_id} is {}, only pending battles may be reordered",
                battle.status
            )));
        }
        if new_position <= 1 {
            return Err(EngineError::invalid(
                "position 1 is on deck and locked".to_string(),
            ));
        }

        let mut pending = self
            .store
            .battles(BattleFilter::category(battle.category_id).with_status(BattleStatus::Pending))
            .await?;
        let index = pending
            .iter()
            .position(|b| b.id == battle_id)
            .ok_or_else(|| EngineError::not_found("battle", battle_id))?;
        if index == 0 {
            return Err(EngineError::invalid(
                "the on-deck battle is locked and cannot be moved".to_string(),
            ));
        }

        let destination = (new_position as usize).min(pending.len());
        let slots: Vec<Option<u32>> = pending.iter().map(|b| b.sequence_order).collect();

        let moved = pending.remove(index);
        pending.insert(destination - 1, moved);
        for (battle, slot) in pending.iter_mut().zip(slots) {
            battle.sequence_order = slot;
        }

        self.store.update_battles(&pending).await?;
        info!(
            "battle {battle_id} moved to position {destination} of {}",
            pending.len()
        );
        Ok(pending)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Category, Performer, Tournament};
    use crate::store::MemoryStore;

    async fn seeded_queue(n: usize) -> (BattleQueue, Arc<MemoryStore>, Vec<Battle>) {
        let store = Arc::new(MemoryStore::new());
        let tournament = Tournament::new("Jam");
        let category = Category::new(tournament.id, "Breaking", 2, 4);
        store.insert_tournament(&tournament).await.unwrap();
        store.insert_category(&category).await.unwrap();

        let battles: Vec<Battle> = (0..n)
            .map(|i| {
                let a = Performer::new(category.id, format!("a{i}"), false);
                let b = Performer::new(category.id, format!("b{i}"), false);
                let mut battle = Battle::preselection(category.id, vec![a.id, b.id]);
                battle.sequence_order = Some(i as u32 + 1);
                battle
            })
            .collect();
        store.insert_battles(&battles).await.unwrap();
        (BattleQueue::new(store.clone()), store, battles)
    }

    #[tokio::test]
    async fn test_reorder_moves_and_keeps_slots_dense() {
        let (queue, _store, battles) = seeded_queue(4).await;

        let reordered = queue.reorder(battles[3].id, 2).await.unwrap();
        let ids: Vec<BattleId> = reordered.iter().map(|b| b.id).collect();
        assert_eq!(
            ids,
            vec![battles[0].id, battles[3].id, battles[1].id, battles[2].id]
        );
        let orders: Vec<u32> = reordered
            .iter()
            .map(|b| b.sequence_order.unwrap())
            .collect();
        assert_eq!(orders, vec![1, 2, 3, 4]);
    }

    #[tokio::test]
    async fn test_reorder_clamps_destination() {
        let (queue, _store, battles) = seeded_queue(3).await;

        let reordered = queue.reorder(battles[1].id, 99).await.unwrap();
        let ids: Vec<BattleId> = reordered.iter().map(|b| b.id).collect();
        assert_eq!(ids, vec![battles[0].id, battles[2].id, battles[1].id]);
    }

    #[tokio::test]
    async fn test_reorder_locks_on_deck_battle_and_position_one() {
        let (queue, _store, battles) = seeded_queue(3).await;

        assert!(matches!(
            queue.reorder(battles[0].id, 3).await,
            Err(EngineError::Validation(_))
        ));
        assert!(matches!(
            queue.reorder(battles[2].id, 1).await,
            Err(EngineError::Validation(_))
        ));
    }

    #[tokio::test]
    async fn test_reorder_rejects_non_pending_battles() {
        let (queue, store, battles) = seeded_queue(3).await;

        store.activate_battle(battles[1].id).await.unwrap();
        assert!(matches!(
            queue.reorder(battles[1].id, 3).await,
            Err(EngineError::Validation(_))
        ));

        assert!(matches!(
            queue.reorder(uuid::Uuid::new_v4(), 2).await,
            Err(EngineError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_next_battle_follows_sequence() {
        let (queue, store, battles) = seeded_queue(2).await;
        let tournament_id = store.tournaments().await.unwrap()[0].id;

        let next = queue.next_battle(tournament_id).await.unwrap().unwrap();
        assert_eq!(next.id, battles[0].id);

        let started = queue.start_battle(next.id).await.unwrap();
        assert_eq!(started.status, BattleStatus::Active);

        // With the first battle active, the second is on deck.
        let next = queue.next_battle(tournament_id).await.unwrap().unwrap();
        assert_eq!(next.id, battles[1].id);
    }
}
