//! Tournament administration: creation, registration, cancellation, and
//! progress reporting.
//!
//! Everything here operates during Registration (or on the tournament
//! record itself); once the phase machine advances past Registration the
//! field is frozen.
//!
//! ## Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use throwdown::manager::TournamentManager;
//! use throwdown::store::{MemoryStore, Store};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let store: Arc<dyn Store> = Arc::new(MemoryStore::new());
//!     let manager = TournamentManager::new(store);
//!
//!     let tournament = manager.create_tournament("Summer Jam").await?;
//!     let category = manager
//!         .create_category(tournament.id, "Breaking 1v1", 2, 4)
//!         .await?;
//!     manager.register_performer(category.id, "b-girl spin", false).await?;
//!
//!     Ok(())
//! }
//! ```

use std::sync::Arc;

use log::info;

use crate::model::{
    BattlePhase, BattleStatus, Category, CategoryId, EngineError, EngineResult, Performer,
    PerformerId, Tournament, TournamentId, TournamentPhase, TournamentStatus,
};
use crate::store::{BattleFilter, Store};

/// Per-category completion counts for read-side callers.
#[derive(Clone, Debug)]
pub struct CategoryProgress {
    pub category_id: CategoryId,
    pub name: String,
    pub registered: usize,
    pub total_battles: usize,
    pub completed_battles: usize,
    pub open_tiebreaks: usize,
}

/// Tournament-wide progress summary.
#[derive(Clone, Debug)]
pub struct TournamentProgress {
    pub tournament_id: TournamentId,
    pub name: String,
    pub phase: TournamentPhase,
    pub status: TournamentStatus,
    pub categories: Vec<CategoryProgress>,
}

/// Tournament administration service.
pub struct TournamentManager {
    store: Arc<dyn Store>,
}

impl TournamentManager {
    #[must_use]
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self { store }
    }

    /// Create a tournament in Registration phase with status Created.
    pub async fn create_tournament(&self, name: &str) -> EngineResult<Tournament> {
        if name.trim().is_empty() {
            return Err(EngineError::invalid("tournament name cannot be empty"));
        }
        let tournament = Tournament::new(name.trim());
        self.store.insert_tournament(&tournament).await?;
        info!("created tournament {}", tournament.name);
        Ok(tournament)
    }

    /// Add a category to a tournament still in Registration.
    pub async fn create_category(
        &self,
        tournament_id: TournamentId,
        name: &str,
        groups_ideal: usize,
        performers_ideal: usize,
    ) -> EngineResult<Category> {
        let tournament = self.store.tournament(tournament_id).await?;
        if tournament.phase != TournamentPhase::Registration {
            return Err(EngineError::invalid(
                "categories can only be added during registration",
            ));
        }
        // Validates groups_ideal >= 1 as a side effect.
        crate::calc::minimum_performers(groups_ideal)?;
        if name.trim().is_empty() {
            return Err(EngineError::invalid("category name cannot be empty"));
        }
        let category = Category::new(tournament_id, name.trim(), groups_ideal, performers_ideal);
        self.store.insert_category(&category).await?;
        Ok(category)
    }

    /// Register a dancer into a category. A dancer may hold one registration
    /// per tournament; guests are scored at the maximum immediately.
    pub async fn register_performer(
        &self,
        category_id: CategoryId,
        name: &str,
        is_guest: bool,
    ) -> EngineResult<Performer> {
        let category = self.store.category(category_id).await?;
        let tournament = self.store.tournament(category.tournament_id).await?;
        if tournament.phase != TournamentPhase::Registration {
            return Err(EngineError::invalid(
                "registration is closed once the tournament has started",
            ));
        }
        let name = name.trim();
        if name.is_empty() {
            return Err(EngineError::invalid("dancer name cannot be empty"));
        }
        for other in self.store.categories(tournament.id).await? {
            let taken = self
                .store
                .performers(other.id)
                .await?
                .iter()
                .any(|p| p.name == name);
            if taken {
                return Err(EngineError::invalid(format!(
                    "{name} is already registered in category {}",
                    other.name
                )));
            }
        }
        let performer = Performer::new(category_id, name, is_guest);
        self.store.insert_performer(&performer).await?;
        Ok(performer)
    }

    /// Withdraw a performer while the tournament is still in Registration.
    pub async fn remove_performer(&self, performer_id: PerformerId) -> EngineResult<()> {
        let performer = self.store.performer(performer_id).await?;
        let category = self.store.category(performer.category_id).await?;
        let tournament = self.store.tournament(category.tournament_id).await?;
        if tournament.phase != TournamentPhase::Registration {
            return Err(EngineError::invalid(
                "performers cannot withdraw once the tournament has started",
            ));
        }
        self.store.delete_performer(performer_id).await
    }

    /// Cancel a tournament. Completed and already-cancelled tournaments
    /// cannot be cancelled.
    pub async fn cancel(&self, tournament_id: TournamentId) -> EngineResult<Tournament> {
        let mut tournament = self.store.tournament(tournament_id).await?;
        match tournament.status {
            TournamentStatus::Completed => {
                return Err(EngineError::invalid("tournament is already completed"));
            }
            TournamentStatus::Cancelled => {
                return Err(EngineError::invalid("tournament is already cancelled"));
            }
            TournamentStatus::Created | TournamentStatus::Active => {}
        }
        tournament.status = TournamentStatus::Cancelled;
        self.store.update_tournament(&tournament).await?;
        info!("cancelled tournament {}", tournament.name);
        Ok(tournament)
    }

    /// Delete a tournament and everything it owns (categories, performers,
    /// pools, battles).
    pub async fn delete(&self, tournament_id: TournamentId) -> EngineResult<()> {
        self.store.delete_tournament(tournament_id).await?;
        info!("deleted tournament {tournament_id}");
        Ok(())
    }

    /// Completion counts per category, for run-sheet displays.
    pub async fn progress(&self, tournament_id: TournamentId) -> EngineResult<TournamentProgress> {
        let tournament = self.store.tournament(tournament_id).await?;
        let mut categories = Vec::new();
        for category in self.store.categories(tournament_id).await? {
            let performers = self.store.performers(category.id).await?;
            let battles = self
                .store
                .battles(BattleFilter::category(category.id))
                .await?;
            let completed = battles.iter().filter(|b| b.is_completed()).count();
            let open_tiebreaks = battles
                .iter()
                .filter(|b| b.phase == BattlePhase::Tiebreak && b.status != BattleStatus::Completed)
                .count();
            categories.push(CategoryProgress {
                category_id: category.id,
                name: category.name,
                registered: performers.len(),
                total_battles: battles.len(),
                completed_battles: completed,
                open_tiebreaks,
            });
        }
        Ok(TournamentProgress {
            tournament_id,
            name: tournament.name,
            phase: tournament.phase,
            status: tournament.status,
            categories,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;

    fn manager() -> TournamentManager {
        TournamentManager::new(Arc::new(MemoryStore::new()))
    }

    #[tokio::test]
    async fn test_create_tournament_starts_in_registration() {
        let manager = manager();
        let tournament = manager.create_tournament("Summer Jam").await.unwrap();
        assert_eq!(tournament.phase, TournamentPhase::Registration);
        assert_eq!(tournament.status, TournamentStatus::Created);

        assert!(manager.create_tournament("  ").await.is_err());
    }

    #[tokio::test]
    async fn test_category_requires_valid_groups() {
        let manager = manager();
        let tournament = manager.create_tournament("Jam").await.unwrap();
        assert!(matches!(
            manager.create_category(tournament.id, "Breaking", 0, 4).await,
            Err(EngineError::InvalidArgument(_))
        ));
        let category = manager
            .create_category(tournament.id, "Breaking", 2, 4)
            .await
            .unwrap();
        assert_eq!(category.groups_ideal, 2);
    }

    #[tokio::test]
    async fn test_one_registration_per_dancer_per_tournament() {
        let manager = manager();
        let tournament = manager.create_tournament("Jam").await.unwrap();
        let breaking = manager
            .create_category(tournament.id, "Breaking", 2, 4)
            .await
            .unwrap();
        let popping = manager
            .create_category(tournament.id, "Popping", 2, 4)
            .await
            .unwrap();

        manager
            .register_performer(breaking.id, "storm", false)
            .await
            .unwrap();
        let duplicate = manager.register_performer(popping.id, "storm", false).await;
        assert!(matches!(duplicate, Err(EngineError::Validation(_))));
    }

    #[tokio::test]
    async fn test_guest_registration_is_pre_scored() {
        let manager = manager();
        let tournament = manager.create_tournament("Jam").await.unwrap();
        let category = manager
            .create_category(tournament.id, "Breaking", 2, 4)
            .await
            .unwrap();
        let guest = manager
            .register_performer(category.id, "legend", true)
            .await
            .unwrap();
        assert_eq!(guest.preselection_score, Some(crate::model::Score::MAX));
    }

    #[tokio::test]
    async fn test_cancel_refuses_terminal_states() {
        let manager = manager();
        let tournament = manager.create_tournament("Jam").await.unwrap();
        let cancelled = manager.cancel(tournament.id).await.unwrap();
        assert_eq!(cancelled.status, TournamentStatus::Cancelled);

        assert!(manager.cancel(tournament.id).await.is_err());
    }
}
