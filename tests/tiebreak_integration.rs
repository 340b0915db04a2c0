//! Integration tests for tie detection and tiebreak resolution.
//!
//! Covers the qualification-boundary tie blocking entry into Pools, and
//! pool-winner ties resolved over keep/eliminate voting rounds.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use throwdown::{
    BattleFilter, BattlePhase, BattleStatus, EngineError, MemoryStore, Outcome, PerformerId,
    PhaseMachine, ResultEncoder, Score, Store, TournamentManager, TournamentPhase,
};

struct Harness {
    store: Arc<dyn Store>,
    manager: TournamentManager,
    machine: PhaseMachine,
    encoder: ResultEncoder,
}

fn harness() -> Harness {
    let store: Arc<dyn Store> = Arc::new(MemoryStore::new());
    Harness {
        manager: TournamentManager::new(store.clone()),
        machine: PhaseMachine::new(store.clone()),
        encoder: ResultEncoder::new(store.clone()),
        store,
    }
}

async fn setup_scored_category(
    h: &Harness,
    scores: &[f64],
) -> (throwdown::Tournament, throwdown::Category, HashMap<PerformerId, f64>) {
    let tournament = h.manager.create_tournament("Jam").await.unwrap();
    let category = h
        .manager
        .create_category(tournament.id, "Breaking", 2, 4)
        .await
        .unwrap();
    let mut by_id = HashMap::new();
    for (i, score) in scores.iter().enumerate() {
        let performer = h
            .manager
            .register_performer(category.id, &format!("dancer{i}"), false)
            .await
            .unwrap();
        by_id.insert(performer.id, *score);
    }
    let tournament = h.machine.advance(tournament.id).await.unwrap();

    let battles = h
        .store
        .battles(BattleFilter::category(category.id).with_phase(BattlePhase::Preselection))
        .await
        .unwrap();
    for battle in battles {
        let payload: BTreeMap<PerformerId, Score> = battle
            .performer_ids
            .iter()
            .map(|id| (*id, Score::try_from_f64(by_id[id]).unwrap()))
            .collect();
        h.encoder
            .encode(battle.id, Outcome::Scored { scores: payload })
            .await
            .unwrap();
    }
    (tournament, category, by_id)
}

#[tokio::test]
async fn test_qualification_tie_blocks_pools_until_resolved() {
    let h = harness();
    // Seven slots; three performers share the boundary score 7.5 and fight
    // for the last two of them.
    let scores = [9.0, 8.8, 8.6, 8.4, 8.2, 7.5, 7.5, 7.5, 6.0];
    let (tournament, category, by_id) = setup_scored_category(&h, &scores).await;

    // Encoding the last preselection battle spawned exactly one tiebreak.
    let tiebreaks = h
        .store
        .battles(BattleFilter::category(category.id).with_phase(BattlePhase::Tiebreak))
        .await
        .unwrap();
    assert_eq!(tiebreaks.len(), 1);
    let tiebreak = &tiebreaks[0];
    assert_eq!(tiebreak.status, BattleStatus::Pending);
    assert_eq!(tiebreak.performer_ids.len(), 3);
    assert!(tiebreak
        .performer_ids
        .iter()
        .all(|id| by_id[id] == 7.5));
    let meta = tiebreak.tiebreak.as_ref().unwrap();
    assert_eq!(meta.winners_needed, 2);

    // Pools cannot be entered while the tiebreak is pending.
    let report = h.machine.validate_advance(tournament.id).await.unwrap();
    assert!(!report.is_ok());
    assert!(matches!(
        h.machine.advance(tournament.id).await,
        Err(EngineError::Validation(_))
    ));

    // Three performers for two slots: one eliminate-mode round settles it.
    let out = tiebreak.performer_ids[0];
    let resolved = h
        .encoder
        .encode_tiebreak_round(tiebreak.id, &[out, out])
        .await
        .unwrap();
    assert_eq!(resolved.status, BattleStatus::Completed);
    let winners = match resolved.outcome.as_ref().unwrap() {
        Outcome::Tiebreak { winner_ids } => winner_ids.clone(),
        other => panic!("unexpected outcome {other:?}"),
    };
    assert_eq!(winners.len(), 2);
    assert!(!winners.contains(&out));

    // Now the machine lets the tournament into Pools, qualifying the two
    // tiebreak winners and dropping the loser with the lowest scorer.
    let tournament = h.machine.advance(tournament.id).await.unwrap();
    assert_eq!(tournament.phase, TournamentPhase::Pools);
    let pools = h.store.pools(category.id).await.unwrap();
    let assigned: Vec<PerformerId> = pools
        .iter()
        .flat_map(|p| p.performer_ids.iter().copied())
        .collect();
    assert_eq!(assigned.len(), 7);
    assert!(!assigned.contains(&out));
    for winner in &winners {
        assert!(assigned.contains(winner));
    }
    let lowest = by_id
        .iter()
        .find(|(_, score)| **score == 6.0)
        .map(|(id, _)| *id)
        .unwrap();
    assert!(!assigned.contains(&lowest));
}

#[tokio::test]
async fn test_retrying_the_trigger_creates_no_second_tiebreak() {
    let h = harness();
    let scores = [9.0, 8.8, 8.6, 8.4, 8.2, 7.5, 7.5, 7.5, 6.0];
    let (_, category, _) = setup_scored_category(&h, &scores).await;

    // The auto-detection hook already ran; running the resolver again must
    // not duplicate the battle.
    let resolver = throwdown::TiebreakResolver::new(h.store.clone());
    let repeat = resolver
        .ensure_preselection_tiebreak(category.id)
        .await
        .unwrap();
    assert!(repeat.is_none());
    let tiebreaks = h
        .store
        .battles(BattleFilter::category(category.id).with_phase(BattlePhase::Tiebreak))
        .await
        .unwrap();
    assert_eq!(tiebreaks.len(), 1);
}

#[tokio::test]
async fn test_pool_points_tie_resolves_over_voting_rounds() {
    let h = harness();
    // Unique preselection scores: clean qualification, pools of 4 and 3.
    let scores = [9.0, 8.5, 8.0, 7.5, 7.0, 6.5, 6.0, 5.5, 5.0];
    let (tournament, category, by_id) = setup_scored_category(&h, &scores).await;
    let tournament = h.machine.advance(tournament.id).await.unwrap();
    assert_eq!(tournament.phase, TournamentPhase::Pools);

    let pools = h.store.pools(category.id).await.unwrap();
    let four_pool = pools.iter().find(|p| p.performer_ids.len() == 4).unwrap();

    // Every battle in the 4-pool draws (four-way points tie); in the 3-pool
    // the better-scored performer wins (unique leader).
    let battles = h
        .store
        .battles(BattleFilter::category(category.id).with_phase(BattlePhase::Pools))
        .await
        .unwrap();
    for battle in battles {
        let winner_id = if battle.pool_id == Some(four_pool.id) {
            None
        } else {
            let (a, b) = (battle.performer_ids[0], battle.performer_ids[1]);
            Some(if by_id[&a] > by_id[&b] { a } else { b })
        };
        h.encoder
            .encode(battle.id, Outcome::WinDrawLoss { winner_id })
            .await
            .unwrap();
    }

    // Draws count one point each: all four performers tied on 3 points, so
    // one tiebreak battle with a single winner needed.
    let tiebreaks = h
        .store
        .battles(BattleFilter::category(category.id).with_phase(BattlePhase::Tiebreak))
        .await
        .unwrap();
    assert_eq!(tiebreaks.len(), 1);
    let tiebreak = tiebreaks[0].clone();
    assert_eq!(tiebreak.pool_id, Some(four_pool.id));
    assert_eq!(tiebreak.tiebreak.as_ref().unwrap().winners_needed, 1);

    // Finals stays locked while the pool lacks a winner.
    assert!(matches!(
        h.machine.advance(tournament.id).await,
        Err(EngineError::Validation(_))
    ));

    // Round 1 (eliminate): four performers, drop the first.
    let roster = tiebreak.performer_ids.clone();
    let battle = h
        .encoder
        .encode_tiebreak_round(tiebreak.id, &[roster[0]])
        .await
        .unwrap();
    assert_eq!(battle.status, BattleStatus::Pending);
    assert_eq!(battle.tiebreak.as_ref().unwrap().current_round, 1);
    assert_eq!(battle.tiebreak.as_ref().unwrap().remaining.len(), 3);

    // Round 2 (eliminate): three left, drop another.
    let battle = h
        .encoder
        .encode_tiebreak_round(tiebreak.id, &[roster[1]])
        .await
        .unwrap();
    assert_eq!(battle.tiebreak.as_ref().unwrap().remaining.len(), 2);

    // Round 3 (keep): two left, the plurality holder wins the pool.
    let battle = h
        .encoder
        .encode_tiebreak_round(tiebreak.id, &[roster[2], roster[2], roster[3]])
        .await
        .unwrap();
    assert_eq!(battle.status, BattleStatus::Completed);
    assert_eq!(battle.winner_id, Some(roster[2]));

    let pool = h.store.pool(four_pool.id).await.unwrap();
    assert_eq!(pool.winner_id, Some(roster[2]));

    // With both pools decided, Finals opens up.
    let tournament = h.machine.advance(tournament.id).await.unwrap();
    assert_eq!(tournament.phase, TournamentPhase::Finals);
    let finals = h
        .store
        .battles(BattleFilter::category(category.id).with_phase(BattlePhase::Finals))
        .await
        .unwrap();
    assert_eq!(finals.len(), 1);
    assert!(finals[0].performer_ids.contains(&roster[2]));
}

#[tokio::test]
async fn test_votes_outside_the_roster_are_rejected() {
    let h = harness();
    let scores = [9.0, 8.8, 8.6, 8.4, 8.2, 7.5, 7.5, 7.5, 6.0];
    let (_, category, _) = setup_scored_category(&h, &scores).await;

    let tiebreaks = h
        .store
        .battles(BattleFilter::category(category.id).with_phase(BattlePhase::Tiebreak))
        .await
        .unwrap();
    let outsider = uuid::Uuid::new_v4();
    assert!(matches!(
        h.encoder
            .encode_tiebreak_round(tiebreaks[0].id, &[outsider])
            .await,
        Err(EngineError::Validation(_))
    ));
}
