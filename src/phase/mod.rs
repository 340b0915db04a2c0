//! Phase state machine.
//!
//! Validates and executes phase transitions: Registration → Preselection →
//! Pools → Finals → Completed, strictly forward. Leaving a phase runs that
//! phase's transition hook (battle/pool generation); the hook's artifacts
//! and the phase flag commit as one atomic store operation, so a failed
//! generation never leaves the tournament half-advanced.

use std::sync::Arc;

use log::info;

use crate::generator;
use crate::model::{
    Battle, Category, EngineError, EngineResult, Performer, PerformerId, Tournament, TournamentId,
    TournamentPhase, TournamentStatus, ValidationReport,
};
use crate::pools;
use crate::store::{AdvanceArtifacts, BattleFilter, Store};
use crate::tiebreak;

pub mod snapshot;
pub mod states;

pub use snapshot::{CategorySnapshot, TournamentSnapshot};
pub use states::{PhaseGate, PhaseGateCheck};

/// The phase-advance interface.
pub struct PhaseMachine {
    store: Arc<dyn Store>,
}

impl PhaseMachine {
    #[must_use]
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self { store }
    }

    async fn snapshot(&self, tournament_id: TournamentId) -> EngineResult<TournamentSnapshot> {
        let tournament = self.store.tournament(tournament_id).await?;
        let mut categories = Vec::new();
        for category in self.store.categories(tournament_id).await? {
            let performers = self.store.performers(category.id).await?;
            let pools = self.store.pools(category.id).await?;
            let battles = self
                .store
                .battles(BattleFilter::category(category.id))
                .await?;
            categories.push(CategorySnapshot {
                category,
                performers,
                pools,
                battles,
            });
        }
        Ok(TournamentSnapshot {
            tournament,
            categories,
        })
    }

    async fn validate(&self, snapshot: &TournamentSnapshot) -> EngineResult<ValidationReport> {
        let gate = PhaseGate::for_phase(snapshot.tournament.phase)?;
        let mut report = gate.validate(snapshot);

        match snapshot.tournament.status {
            TournamentStatus::Cancelled => report.error("tournament is cancelled"),
            TournamentStatus::Completed => report.error("tournament is completed"),
            TournamentStatus::Created | TournamentStatus::Active => {}
        }

        // Activation happens when leaving Registration; a different Active
        // tournament blocks it (one running tournament system-wide).
        if snapshot.tournament.phase == TournamentPhase::Registration {
            if let Some(active) = self.store.active_tournament().await? {
                if active.id != snapshot.tournament.id {
                    report.error(format!(
                        "tournament {} is already active",
                        active.name
                    ));
                }
            }
        }
        Ok(report)
    }

    /// Validate whether the tournament may leave its current phase.
    pub async fn validate_advance(
        &self,
        tournament_id: TournamentId,
    ) -> EngineResult<ValidationReport> {
        let snapshot = self.snapshot(tournament_id).await?;
        self.validate(&snapshot).await
    }

    /// Advance the tournament one phase: re-validate, run the departing
    /// phase's hook, and commit artifacts plus the new phase atomically.
    pub async fn advance(&self, tournament_id: TournamentId) -> EngineResult<Tournament> {
        let snapshot = self.snapshot(tournament_id).await?;
        let report = self.validate(&snapshot).await?;
        if !report.is_ok() {
            return Err(EngineError::Validation(report));
        }

        let artifacts = build_artifacts(&snapshot)?;

        let mut tournament = snapshot.tournament.clone();
        let next = tournament.phase.next().ok_or(EngineError::TerminalState)?;
        if tournament.phase == TournamentPhase::Registration
            && tournament.status == TournamentStatus::Created
        {
            tournament.status = TournamentStatus::Active;
        }
        let previous = tournament.phase;
        tournament.phase = next;
        if next == TournamentPhase::Completed {
            tournament.status = TournamentStatus::Completed;
        }

        self.store.commit_advance(&tournament, &artifacts).await?;
        info!(
            "tournament {} advanced {previous} -> {next} ({} battles, {} pools generated)",
            tournament.name,
            artifacts.battles.len(),
            artifacts.pools.len()
        );
        Ok(tournament)
    }
}

/// Run the transition hook for the phase being left.
fn build_artifacts(snapshot: &TournamentSnapshot) -> EngineResult<AdvanceArtifacts> {
    match snapshot.tournament.phase {
        TournamentPhase::Registration => {
            let fields: Vec<(Category, Vec<Performer>)> = snapshot
                .categories
                .iter()
                .map(|c| (c.category.clone(), c.performers.clone()))
                .collect();
            let battles = generator::interleaved_preselection(&fields)?;
            Ok(AdvanceArtifacts {
                pools: Vec::new(),
                battles,
            })
        }
        TournamentPhase::Preselection => {
            let mut all_pools = Vec::new();
            let mut battles = Vec::new();
            for cat in &snapshot.categories {
                let winners = tiebreak::qualification_tiebreak_winners(&cat.battles);
                let cat_pools = pools::build_pools(&cat.category, &cat.performers, &winners)?;
                for pool in &cat_pools {
                    battles.extend(generator::pool_battles(pool));
                }
                all_pools.extend(cat_pools);
            }
            sequence(&mut battles);
            Ok(AdvanceArtifacts {
                pools: all_pools,
                battles,
            })
        }
        TournamentPhase::Pools => {
            let mut battles = Vec::new();
            for cat in &snapshot.categories {
                let winner_ids: Vec<PerformerId> =
                    cat.pools.iter().filter_map(|p| p.winner_id).collect();
                let winners: Vec<Performer> = winner_ids
                    .iter()
                    .map(|id| {
                        cat.performers
                            .iter()
                            .find(|p| p.id == *id)
                            .cloned()
                            .ok_or_else(|| EngineError::not_found("performer", *id))
                    })
                    .collect::<EngineResult<_>>()?;
                battles.push(generator::finals_battle(&cat.category, &winners)?);
            }
            sequence(&mut battles);
            Ok(AdvanceArtifacts {
                pools: Vec::new(),
                battles,
            })
        }
        TournamentPhase::Finals => Ok(AdvanceArtifacts::default()),
        TournamentPhase::Completed => Err(EngineError::TerminalState),
    }
}

/// Fresh dense queue numbering for a phase's battles. Prior-phase battles
/// are all Completed by the time these are generated, so the pending queue
/// starts over at 1.
fn sequence(battles: &mut [Battle]) {
    for (i, battle) in battles.iter_mut().enumerate() {
        battle.sequence_order = Some(i as u32 + 1);
    }
}
