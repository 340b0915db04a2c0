//! Per-phase completeness gates.
//!
//! Each phase has a gate type answering "is this phase complete and
//! consistent enough to leave?". Gates are pure over a loaded snapshot; the
//! machine in the parent module owns snapshot loading and the transition
//! hooks.

use enum_dispatch::enum_dispatch;

use crate::calc;
use crate::model::{
    BattlePhase, BattleStatus, EngineError, EngineResult, TournamentPhase, ValidationReport,
};
use crate::tiebreak;

use super::snapshot::{CategorySnapshot, TournamentSnapshot};

/// Phase-completeness validation, dispatched per phase.
#[enum_dispatch]
pub trait PhaseGateCheck {
    fn validate(&self, snapshot: &TournamentSnapshot) -> ValidationReport;
}

/// Registration → Preselection
#[derive(Debug)]
pub struct RegistrationGate;

/// Preselection → Pools
#[derive(Debug)]
pub struct PreselectionGate;

/// Pools → Finals
#[derive(Debug)]
pub struct PoolsGate;

/// Finals → Completed
#[derive(Debug)]
pub struct FinalsGate;

/// Gate for the tournament's current phase.
#[enum_dispatch(PhaseGateCheck)]
#[derive(Debug)]
pub enum PhaseGate {
    Registration(RegistrationGate),
    Preselection(PreselectionGate),
    Pools(PoolsGate),
    Finals(FinalsGate),
}

impl PhaseGate {
    /// The gate guarding departure from `phase`. Completed has no exit.
    pub fn for_phase(phase: TournamentPhase) -> EngineResult<Self> {
        match phase {
            TournamentPhase::Registration => Ok(Self::Registration(RegistrationGate)),
            TournamentPhase::Preselection => Ok(Self::Preselection(PreselectionGate)),
            TournamentPhase::Pools => Ok(Self::Pools(PoolsGate)),
            TournamentPhase::Finals => Ok(Self::Finals(FinalsGate)),
            TournamentPhase::Completed => Err(EngineError::TerminalState),
        }
    }
}

impl PhaseGateCheck for RegistrationGate {
    fn validate(&self, snapshot: &TournamentSnapshot) -> ValidationReport {
        let mut report = ValidationReport::new();
        if snapshot.categories.is_empty() {
            report.error("tournament has no categories");
            return report;
        }
        for cat in &snapshot.categories {
            let name = &cat.category.name;
            let registered = cat.performers.len();
            match calc::minimum_performers(cat.category.groups_ideal) {
                Ok(needed) if registered < needed => {
                    report.error(format!(
                        "category {name} has {registered} of {needed} required performers"
                    ));
                }
                Ok(needed) if registered == needed => {
                    report.warn(format!(
                        "category {name} has exactly the minimum field; only one performer will be eliminated"
                    ));
                }
                Ok(_) => {}
                Err(err) => report.error(format!("category {name}: {err}")),
            }
        }
        report
    }
}

impl PhaseGateCheck for PreselectionGate {
    fn validate(&self, snapshot: &TournamentSnapshot) -> ValidationReport {
        let mut report = ValidationReport::new();
        for cat in &snapshot.categories {
            let name = &cat.category.name;

            let open = cat.open_battles(BattlePhase::Preselection);
            if open > 0 {
                report.error(format!(
                    "category {name} has {open} unfinished preselection battle(s)"
                ));
            }
            let unscored = cat
                .performers
                .iter()
                .filter(|p| p.preselection_score.is_none())
                .count();
            if unscored > 0 {
                report.error(format!(
                    "category {name} has {unscored} performer(s) without a score"
                ));
            }
            if cat.open_tiebreaks(false) > 0 {
                report.error(format!(
                    "category {name} has an unresolved qualification tiebreak"
                ));
            }
            if open == 0 && unscored == 0 {
                self.check_boundary(cat, &mut report);
            }
        }
        report
    }
}

impl PreselectionGate {
    /// A boundary tie without a completed tiebreak blocks the transition
    /// even before auto-detection has run.
    fn check_boundary(&self, cat: &CategorySnapshot, report: &mut ValidationReport) {
        let name = &cat.category.name;
        let resolved = cat.battles.iter().any(|b| {
            b.phase == BattlePhase::Tiebreak && b.pool_id.is_none() && b.is_completed()
        });
        if resolved {
            return;
        }
        let capacity = match calc::pool_capacity(cat.performers.len(), cat.category.groups_ideal) {
            Ok(capacity) => capacity,
            Err(err) => {
                report.error(format!("category {name}: {err}"));
                return;
            }
        };
        match tiebreak::detect_preselection_ties(&cat.performers, &capacity) {
            Ok(tied) if !tied.is_empty() => {
                report.error(format!(
                    "category {name} has {} performers tied at the qualification cutoff; a tiebreak is required",
                    tied.len()
                ));
            }
            Ok(_) => {}
            Err(err) => report.error(format!("category {name}: {err}")),
        }
    }
}

impl PhaseGateCheck for PoolsGate {
    fn validate(&self, snapshot: &TournamentSnapshot) -> ValidationReport {
        let mut report = ValidationReport::new();
        for cat in &snapshot.categories {
            let name = &cat.category.name;

            if cat.pools.len() != cat.category.groups_ideal {
                report.error(format!(
                    "category {name} has {} pools, expected {}",
                    cat.pools.len(),
                    cat.category.groups_ideal
                ));
            }
            let open = cat.open_battles(BattlePhase::Pools);
            if open > 0 {
                report.error(format!(
                    "category {name} has {open} unfinished pool battle(s)"
                ));
            }
            if cat.open_tiebreaks(true) > 0 {
                report.error(format!(
                    "category {name} has an unresolved pool-winner tiebreak"
                ));
            }
            for pool in &cat.pools {
                if pool.winner_id.is_none() {
                    report.error(format!("{} in category {name} has no winner", pool.name));
                }
            }
        }
        report
    }
}

impl PhaseGateCheck for FinalsGate {
    fn validate(&self, snapshot: &TournamentSnapshot) -> ValidationReport {
        let mut report = ValidationReport::new();
        for cat in &snapshot.categories {
            let name = &cat.category.name;
            let finals: Vec<_> = cat
                .battles
                .iter()
                .filter(|b| b.phase == BattlePhase::Finals)
                .collect();
            if finals.is_empty() {
                report.error(format!("category {name} has no finals battle"));
                continue;
            }
            for battle in finals {
                if battle.status != BattleStatus::Completed {
                    report.error(format!("category {name}'s finals battle is not finished"));
                } else if battle.winner_id.is_none() {
                    // Draws are not permitted in Finals.
                    report.error(format!("category {name}'s finals battle has no winner"));
                }
            }
        }
        report
    }
}
