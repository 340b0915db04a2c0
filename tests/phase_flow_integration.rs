//! Integration tests for the full tournament lifecycle.
//!
//! These tests drive a tournament from registration through completion
//! against the in-memory store: registration gates, preselection encoding,
//! pool distribution, finals, and the terminal state.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use throwdown::{
    BattleFilter, BattlePhase, BattleQueue, BattleStatus, EngineError, MemoryStore, Outcome,
    PerformerId, PhaseMachine, ResultEncoder, Score, Store, TournamentManager, TournamentPhase,
    TournamentStatus,
};

struct Harness {
    store: Arc<dyn Store>,
    manager: TournamentManager,
    machine: PhaseMachine,
    encoder: ResultEncoder,
    queue: BattleQueue,
}

fn harness() -> Harness {
    let store: Arc<dyn Store> = Arc::new(MemoryStore::new());
    Harness {
        manager: TournamentManager::new(store.clone()),
        machine: PhaseMachine::new(store.clone()),
        encoder: ResultEncoder::new(store.clone()),
        queue: BattleQueue::new(store.clone()),
        store,
    }
}

/// Encode every pending preselection battle, assigning each performer the
/// score from `scores`. Returns the score map by performer id.
async fn run_preselection(
    h: &Harness,
    category_id: throwdown::CategoryId,
    scores: &HashMap<PerformerId, f64>,
) {
    let battles = h
        .store
        .battles(BattleFilter::category(category_id).with_phase(BattlePhase::Preselection))
        .await
        .unwrap();
    for battle in battles {
        let payload: BTreeMap<PerformerId, Score> = battle
            .performer_ids
            .iter()
            .map(|id| (*id, Score::try_from_f64(scores[id]).unwrap()))
            .collect();
        h.encoder
            .encode(battle.id, Outcome::Scored { scores: payload })
            .await
            .unwrap();
    }
}

/// Encode every pool battle; the performer with the higher preselection
/// score wins, so each pool gets a unique points leader.
async fn run_pools(
    h: &Harness,
    category_id: throwdown::CategoryId,
    scores: &HashMap<PerformerId, f64>,
) {
    let battles = h
        .store
        .battles(BattleFilter::category(category_id).with_phase(BattlePhase::Pools))
        .await
        .unwrap();
    for battle in battles {
        let (a, b) = (battle.performer_ids[0], battle.performer_ids[1]);
        let winner = if scores[&a] > scores[&b] { a } else { b };
        h.encoder
            .encode(
                battle.id,
                Outcome::WinDrawLoss {
                    winner_id: Some(winner),
                },
            )
            .await
            .unwrap();
    }
}

#[tokio::test]
async fn test_full_lifecycle_without_ties() {
    let h = harness();
    let tournament = h.manager.create_tournament("Summer Throwdown").await.unwrap();
    let category = h
        .manager
        .create_category(tournament.id, "Breaking 1v1", 2, 4)
        .await
        .unwrap();

    let mut scores: HashMap<PerformerId, f64> = HashMap::new();
    for i in 0..9 {
        let performer = h
            .manager
            .register_performer(category.id, &format!("dancer{i}"), false)
            .await
            .unwrap();
        scores.insert(performer.id, 9.0 - i as f64 * 0.5);
    }

    // Registration -> Preselection
    let report = h.machine.validate_advance(tournament.id).await.unwrap();
    assert!(report.is_ok());
    assert!(report.warnings.is_empty());
    let tournament = h.machine.advance(tournament.id).await.unwrap();
    assert_eq!(tournament.phase, TournamentPhase::Preselection);
    assert_eq!(tournament.status, TournamentStatus::Active);

    // 9 performers: three 1v1s plus a 3-way, queued 1..4.
    let battles = h
        .store
        .battles(BattleFilter::category(category.id))
        .await
        .unwrap();
    assert_eq!(battles.len(), 4);
    let orders: Vec<u32> = battles.iter().map(|b| b.sequence_order.unwrap()).collect();
    assert_eq!(orders, vec![1, 2, 3, 4]);

    run_preselection(&h, category.id, &scores).await;

    // Unique scores: no tiebreak battles appear.
    let tiebreaks = h
        .store
        .battles(BattleFilter::category(category.id).with_phase(BattlePhase::Tiebreak))
        .await
        .unwrap();
    assert!(tiebreaks.is_empty());

    // Preselection -> Pools: 7 qualify into pools of 4 and 3.
    let tournament = h.machine.advance(tournament.id).await.unwrap();
    assert_eq!(tournament.phase, TournamentPhase::Pools);
    let pools = h.store.pools(category.id).await.unwrap();
    assert_eq!(pools.len(), 2);
    let mut sizes: Vec<usize> = pools.iter().map(|p| p.performer_ids.len()).collect();
    sizes.sort_unstable();
    assert_eq!(sizes, vec![3, 4]);

    let pool_battles = h
        .store
        .battles(BattleFilter::category(category.id).with_phase(BattlePhase::Pools))
        .await
        .unwrap();
    assert_eq!(pool_battles.len(), 4 * 3 / 2 + 3 * 2 / 2);

    run_pools(&h, category.id, &scores).await;

    // Every pool got a unique winner, no pool tiebreaks.
    let pools = h.store.pools(category.id).await.unwrap();
    assert!(pools.iter().all(|p| p.winner_id.is_some()));

    // Pools -> Finals: one battle between the two pool winners.
    let tournament = h.machine.advance(tournament.id).await.unwrap();
    assert_eq!(tournament.phase, TournamentPhase::Finals);
    let finals = h
        .store
        .battles(BattleFilter::category(category.id).with_phase(BattlePhase::Finals))
        .await
        .unwrap();
    assert_eq!(finals.len(), 1);
    assert_eq!(finals[0].performer_ids.len(), 2);

    let champion = finals[0].performer_ids[0];
    h.encoder
        .encode(
            finals[0].id,
            Outcome::WinLoss {
                winner_id: champion,
            },
        )
        .await
        .unwrap();

    // Finals -> Completed, terminal.
    let tournament = h.machine.advance(tournament.id).await.unwrap();
    assert_eq!(tournament.phase, TournamentPhase::Completed);
    assert_eq!(tournament.status, TournamentStatus::Completed);
    assert!(matches!(
        h.machine.advance(tournament.id).await,
        Err(EngineError::TerminalState)
    ));
}

#[tokio::test]
async fn test_minimum_field_warns_and_one_fewer_blocks() {
    let h = harness();
    let tournament = h.manager.create_tournament("Jam").await.unwrap();
    let category = h
        .manager
        .create_category(tournament.id, "Breaking", 2, 4)
        .await
        .unwrap();

    // Four performers: one short of groups_ideal*2 + 1.
    for i in 0..4 {
        h.manager
            .register_performer(category.id, &format!("dancer{i}"), false)
            .await
            .unwrap();
    }
    let report = h.machine.validate_advance(tournament.id).await.unwrap();
    assert!(!report.is_ok());
    assert!(matches!(
        h.machine.advance(tournament.id).await,
        Err(EngineError::Validation(_))
    ));

    // The fifth performer makes the field exactly minimal: advance succeeds
    // with a warning that only one elimination will occur.
    h.manager
        .register_performer(category.id, "dancer4", false)
        .await
        .unwrap();
    let report = h.machine.validate_advance(tournament.id).await.unwrap();
    assert!(report.is_ok());
    assert_eq!(report.warnings.len(), 1);
    let advanced = h.machine.advance(tournament.id).await.unwrap();
    assert_eq!(advanced.phase, TournamentPhase::Preselection);
}

#[tokio::test]
async fn test_only_one_tournament_runs_at_a_time() {
    let h = harness();
    let mut ready = Vec::new();
    for name in ["First Jam", "Second Jam"] {
        let tournament = h.manager.create_tournament(name).await.unwrap();
        let category = h
            .manager
            .create_category(tournament.id, "Breaking", 2, 4)
            .await
            .unwrap();
        for i in 0..6 {
            h.manager
                .register_performer(category.id, &format!("{name} dancer{i}"), false)
                .await
                .unwrap();
        }
        ready.push(tournament);
    }

    let first = h.machine.advance(ready[0].id).await.unwrap();
    assert_eq!(first.status, TournamentStatus::Active);

    let report = h.machine.validate_advance(ready[1].id).await.unwrap();
    assert!(!report.is_ok());
    assert!(matches!(
        h.machine.advance(ready[1].id).await,
        Err(EngineError::Validation(_))
    ));
}

#[tokio::test]
async fn test_cancelled_tournament_cannot_advance() {
    let h = harness();
    let tournament = h.manager.create_tournament("Jam").await.unwrap();
    let category = h
        .manager
        .create_category(tournament.id, "Breaking", 2, 4)
        .await
        .unwrap();
    for i in 0..6 {
        h.manager
            .register_performer(category.id, &format!("dancer{i}"), false)
            .await
            .unwrap();
    }

    h.manager.cancel(tournament.id).await.unwrap();
    assert!(matches!(
        h.machine.advance(tournament.id).await,
        Err(EngineError::Validation(_))
    ));
}

#[tokio::test]
async fn test_battle_queue_runs_in_order_with_single_active() {
    let h = harness();
    let tournament = h.manager.create_tournament("Jam").await.unwrap();
    let category = h
        .manager
        .create_category(tournament.id, "Breaking", 2, 4)
        .await
        .unwrap();
    let mut scores = HashMap::new();
    for i in 0..8 {
        let performer = h
            .manager
            .register_performer(category.id, &format!("dancer{i}"), false)
            .await
            .unwrap();
        scores.insert(performer.id, 9.0 - i as f64 * 0.5);
    }
    h.machine.advance(tournament.id).await.unwrap();

    let on_deck = h.queue.next_battle(tournament.id).await.unwrap().unwrap();
    assert_eq!(on_deck.sequence_order, Some(1));

    let started = h.queue.start_battle(on_deck.id).await.unwrap();
    assert_eq!(started.status, BattleStatus::Active);

    // A second battle cannot start while one is running.
    let second = h.queue.next_battle(tournament.id).await.unwrap().unwrap();
    assert!(matches!(
        h.queue.start_battle(second.id).await,
        Err(EngineError::Conflict(_))
    ));

    // Encoding the active battle frees the slot.
    let payload: BTreeMap<PerformerId, Score> = started
        .performer_ids
        .iter()
        .map(|id| (*id, Score::try_from_f64(scores[id]).unwrap()))
        .collect();
    h.encoder
        .encode(started.id, Outcome::Scored { scores: payload })
        .await
        .unwrap();
    let restarted = h.queue.start_battle(second.id).await.unwrap();
    assert_eq!(restarted.status, BattleStatus::Active);
}

#[tokio::test]
async fn test_guests_skip_preselection_but_qualify() {
    let h = harness();
    let tournament = h.manager.create_tournament("Jam").await.unwrap();
    let category = h
        .manager
        .create_category(tournament.id, "Breaking", 2, 4)
        .await
        .unwrap();

    let guest = h
        .manager
        .register_performer(category.id, "legend", true)
        .await
        .unwrap();
    let mut scores = HashMap::new();
    for i in 0..8 {
        let performer = h
            .manager
            .register_performer(category.id, &format!("dancer{i}"), false)
            .await
            .unwrap();
        scores.insert(performer.id, 9.0 - i as f64 * 0.5);
    }

    h.machine.advance(tournament.id).await.unwrap();

    // The guest appears in no preselection battle.
    let battles = h
        .store
        .battles(BattleFilter::category(category.id).with_phase(BattlePhase::Preselection))
        .await
        .unwrap();
    assert!(battles.iter().all(|b| !b.performer_ids.contains(&guest.id)));

    run_preselection(&h, category.id, &scores).await;
    h.machine.advance(tournament.id).await.unwrap();

    // Nine registered, seven qualify; the guest heads the top pool.
    let pools = h.store.pools(category.id).await.unwrap();
    let assigned: Vec<PerformerId> = pools
        .iter()
        .flat_map(|p| p.performer_ids.iter().copied())
        .collect();
    assert_eq!(assigned.len(), 7);
    assert!(assigned.contains(&guest.id));
    assert_eq!(pools[0].performer_ids[0], guest.id);
}
