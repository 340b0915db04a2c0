//! PostgreSQL store.
//!
//! Runtime sqlx queries over a connection pool. Enum columns are stored as
//! text, outcome payloads and tiebreak metadata as JSONB, performer
//! references as uuid arrays, and scores as integer hundredths. Compound
//! operations run inside a single transaction so their invariant checks and
//! writes are atomic.

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::postgres::{PgPool, PgPoolOptions, PgRow, Postgres};
use sqlx::{QueryBuilder, Row};
use uuid::Uuid;

use crate::model::{
    Battle, BattleId, BattleStatus, Category, CategoryId, EngineError, EngineResult, Performer,
    PerformerId, Pool, PoolId, Score, Tournament, TournamentId, TournamentStatus,
};

use super::{AdvanceArtifacts, BattleFilter, Store, StoreConfig};

const SCHEMA: &[&str] = &[
    "CREATE TABLE IF NOT EXISTS tournaments (
        id UUID PRIMARY KEY,
        name TEXT NOT NULL,
        status TEXT NOT NULL,
        phase TEXT NOT NULL,
        created_at TIMESTAMPTZ NOT NULL
    )",
    "CREATE TABLE IF NOT EXISTS categories (
        id UUID PRIMARY KEY,
        tournament_id UUID NOT NULL REFERENCES tournaments(id),
        name TEXT NOT NULL,
        groups_ideal INT NOT NULL,
        performers_ideal INT NOT NULL,
        created_at TIMESTAMPTZ NOT NULL
    )",
    "CREATE TABLE IF NOT EXISTS performers (
        id UUID PRIMARY KEY,
        category_id UUID NOT NULL REFERENCES categories(id),
        name TEXT NOT NULL,
        is_guest BOOLEAN NOT NULL,
        preselection_score INT,
        wins INT NOT NULL,
        draws INT NOT NULL,
        losses INT NOT NULL,
        registered_at TIMESTAMPTZ NOT NULL
    )",
    "CREATE TABLE IF NOT EXISTS pools (
        id UUID PRIMARY KEY,
        category_id UUID NOT NULL REFERENCES categories(id),
        name TEXT NOT NULL,
        performer_ids UUID[] NOT NULL,
        winner_id UUID,
        created_at TIMESTAMPTZ NOT NULL
    )",
    "CREATE TABLE IF NOT EXISTS battles (
        id UUID PRIMARY KEY,
        category_id UUID NOT NULL REFERENCES categories(id),
        phase TEXT NOT NULL,
        status TEXT NOT NULL,
        outcome_kind TEXT NOT NULL,
        outcome JSONB,
        winner_id UUID,
        performer_ids UUID[] NOT NULL,
        pool_id UUID,
        sequence_order INT,
        tiebreak JSONB,
        created_at TIMESTAMPTZ NOT NULL
    )",
    "CREATE INDEX IF NOT EXISTS battles_status_idx ON battles(status)",
    "CREATE INDEX IF NOT EXISTS battles_category_idx ON battles(category_id)",
];

const BATTLE_COLUMNS: &str = "b.id, b.category_id, b.phase, b.status, b.outcome_kind, \
     b.outcome, b.winner_id, b.performer_ids, b.pool_id, b.sequence_order, b.tiebreak, \
     b.created_at";

/// PostgreSQL [`Store`] implementation
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    /// Connect a new store from configuration.
    pub async fn connect(config: &StoreConfig) -> EngineResult<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(config.max_connections)
            .min_connections(config.min_connections)
            .acquire_timeout(Duration::from_secs(config.connection_timeout_secs))
            .connect(&config.database_url)
            .await?;
        Ok(Self { pool })
    }

    /// Wrap an existing pool.
    #[must_use]
    pub fn with_pool(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Create the engine's tables and indexes if they do not exist.
    pub async fn migrate(&self) -> EngineResult<()> {
        for statement in SCHEMA {
            sqlx::query(statement).execute(&self.pool).await?;
        }
        Ok(())
    }

    /// Check if the database connection is healthy.
    pub async fn health_check(&self) -> EngineResult<()> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }
}

fn decode_tournament(row: &PgRow) -> EngineResult<Tournament> {
    Ok(Tournament {
        id: row.get("id"),
        name: row.get("name"),
        status: row.get::<String, _>("status").parse()?,
        phase: row.get::<String, _>("phase").parse()?,
        created_at: row.get::<DateTime<Utc>, _>("created_at"),
    })
}

fn decode_category(row: &PgRow) -> EngineResult<Category> {
    Ok(Category {
        id: row.get("id"),
        tournament_id: row.get("tournament_id"),
        name: row.get("name"),
        groups_ideal: row.get::<i32, _>("groups_ideal") as usize,
        performers_ideal: row.get::<i32, _>("performers_ideal") as usize,
        created_at: row.get::<DateTime<Utc>, _>("created_at"),
    })
}

fn decode_performer(row: &PgRow) -> EngineResult<Performer> {
    let score = row
        .get::<Option<i32>, _>("preselection_score")
        .map(|hundredths| Score::from_hundredths(hundredths as u16))
        .transpose()?;
    Ok(Performer {
        id: row.get("id"),
        category_id: row.get("category_id"),
        name: row.get("name"),
        is_guest: row.get("is_guest"),
        preselection_score: score,
        wins: row.get::<i32, _>("wins") as u32,
        draws: row.get::<i32, _>("draws") as u32,
        losses: row.get::<i32, _>("losses") as u32,
        registered_at: row.get::<DateTime<Utc>, _>("registered_at"),
    })
}

fn decode_pool(row: &PgRow) -> EngineResult<Pool> {
    Ok(Pool {
        id: row.get("id"),
        category_id: row.get("category_id"),
        name: row.get("name"),
        performer_ids: row.get::<Vec<Uuid>, _>("performer_ids"),
        winner_id: row.get("winner_id"),
        created_at: row.get::<DateTime<Utc>, _>("created_at"),
    })
}

fn decode_battle(row: &PgRow) -> EngineResult<Battle> {
    let outcome = row
        .get::<Option<serde_json::Value>, _>("outcome")
        .map(serde_json::from_value)
        .transpose()?;
    let tiebreak = row
        .get::<Option<serde_json::Value>, _>("tiebreak")
        .map(serde_json::from_value)
        .transpose()?;
    Ok(Battle {
        id: row.get("id"),
        category_id: row.get("category_id"),
        phase: row.get::<String, _>("phase").parse()?,
        status: row.get::<String, _>("status").parse()?,
        outcome_kind: row.get::<String, _>("outcome_kind").parse()?,
        outcome,
        winner_id: row.get("winner_id"),
        performer_ids: row.get::<Vec<Uuid>, _>("performer_ids"),
        pool_id: row.get("pool_id"),
        sequence_order: row.get::<Option<i32>, _>("sequence_order").map(|s| s as u32),
        tiebreak,
        created_at: row.get::<DateTime<Utc>, _>("created_at"),
    })
}

async fn insert_battle_tx(
    tx: &mut sqlx::Transaction<'_, Postgres>,
    battle: &Battle,
) -> EngineResult<()> {
    let outcome = battle.outcome.as_ref().map(serde_json::to_value).transpose()?;
    let tiebreak = battle.tiebreak.as_ref().map(serde_json::to_value).transpose()?;
    sqlx::query(
        "INSERT INTO battles (id, category_id, phase, status, outcome_kind, outcome, \
         winner_id, performer_ids, pool_id, sequence_order, tiebreak, created_at) \
         VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12)",
    )
    .bind(battle.id)
    .bind(battle.category_id)
    .bind(battle.phase.as_str())
    .bind(battle.status.as_str())
    .bind(battle.outcome_kind.as_str())
    .bind(outcome)
    .bind(battle.winner_id)
    .bind(&battle.performer_ids)
    .bind(battle.pool_id)
    .bind(battle.sequence_order.map(|s| s as i32))
    .bind(tiebreak)
    .bind(battle.created_at)
    .execute(&mut **tx)
    .await?;
    Ok(())
}

async fn update_battle_tx(
    tx: &mut sqlx::Transaction<'_, Postgres>,
    battle: &Battle,
) -> EngineResult<()> {
    let outcome = battle.outcome.as_ref().map(serde_json::to_value).transpose()?;
    let tiebreak = battle.tiebreak.as_ref().map(serde_json::to_value).transpose()?;
    let result = sqlx::query(
        "UPDATE battles SET status = $1, outcome = $2, winner_id = $3, \
         sequence_order = $4, tiebreak = $5 WHERE id = $6",
    )
    .bind(battle.status.as_str())
    .bind(outcome)
    .bind(battle.winner_id)
    .bind(battle.sequence_order.map(|s| s as i32))
    .bind(tiebreak)
    .bind(battle.id)
    .execute(&mut **tx)
    .await?;
    if result.rows_affected() == 0 {
        return Err(EngineError::not_found("battle", battle.id));
    }
    Ok(())
}

async fn insert_pool_tx(
    tx: &mut sqlx::Transaction<'_, Postgres>,
    pool: &Pool,
) -> EngineResult<()> {
    sqlx::query(
        "INSERT INTO pools (id, category_id, name, performer_ids, winner_id, created_at) \
         VALUES ($1, $2, $3, $4, $5, $6)",
    )
    .bind(pool.id)
    .bind(pool.category_id)
    .bind(&pool.name)
    .bind(&pool.performer_ids)
    .bind(pool.winner_id)
    .bind(pool.created_at)
    .execute(&mut **tx)
    .await?;
    Ok(())
}

async fn update_performer_tx(
    tx: &mut sqlx::Transaction<'_, Postgres>,
    performer: &Performer,
) -> EngineResult<()> {
    let result = sqlx::query(
        "UPDATE performers SET preselection_score = $1, wins = $2, draws = $3, losses = $4 \
         WHERE id = $5",
    )
    .bind(performer.preselection_score.map(|s| i32::from(s.hundredths())))
    .bind(performer.wins as i32)
    .bind(performer.draws as i32)
    .bind(performer.losses as i32)
    .bind(performer.id)
    .execute(&mut **tx)
    .await?;
    if result.rows_affected() == 0 {
        return Err(EngineError::not_found("performer", performer.id));
    }
    Ok(())
}

#[async_trait]
impl Store for PgStore {
    async fn insert_tournament(&self, tournament: &Tournament) -> EngineResult<()> {
        sqlx::query(
            "INSERT INTO tournaments (id, name, status, phase, created_at) \
             VALUES ($1, $2, $3, $4, $5)",
        )
        .bind(tournament.id)
        .bind(&tournament.name)
        .bind(tournament.status.as_str())
        .bind(tournament.phase.as_str())
        .bind(tournament.created_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn tournament(&self, id: TournamentId) -> EngineResult<Tournament> {
        let row = sqlx::query("SELECT * FROM tournaments WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| EngineError::not_found("tournament", id))?;
        decode_tournament(&row)
    }

    async fn tournaments(&self) -> EngineResult<Vec<Tournament>> {
        let rows = sqlx::query("SELECT * FROM tournaments ORDER BY created_at")
            .fetch_all(&self.pool)
            .await?;
        rows.iter().map(decode_tournament).collect()
    }

    async fn active_tournament(&self) -> EngineResult<Option<Tournament>> {
        let row = sqlx::query("SELECT * FROM tournaments WHERE status = 'active'")
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(decode_tournament).transpose()
    }

    async fn update_tournament(&self, tournament: &Tournament) -> EngineResult<()> {
        let result = sqlx::query(
            "UPDATE tournaments SET name = $1, status = $2, phase = $3 WHERE id = $4",
        )
        .bind(&tournament.name)
        .bind(tournament.status.as_str())
        .bind(tournament.phase.as_str())
        .bind(tournament.id)
        .execute(&self.pool)
        .await?;
        if result.rows_affected() == 0 {
            return Err(EngineError::not_found("tournament", tournament.id));
        }
        Ok(())
    }

    async fn delete_tournament(&self, id: TournamentId) -> EngineResult<()> {
        // Explicit dependent walk, children before owners, in one transaction.
        let mut tx = self.pool.begin().await?;
        for table in ["battles", "pools", "performers"] {
            let statement = format!(
                "DELETE FROM {table} USING categories \
                 WHERE {table}.category_id = categories.id AND categories.tournament_id = $1"
            );
            sqlx::query(&statement).bind(id).execute(&mut *tx).await?;
        }
        sqlx::query("DELETE FROM categories WHERE tournament_id = $1")
            .bind(id)
            .execute(&mut *tx)
            .await?;
        let result = sqlx::query("DELETE FROM tournaments WHERE id = $1")
            .bind(id)
            .execute(&mut *tx)
            .await?;
        if result.rows_affected() == 0 {
            return Err(EngineError::not_found("tournament", id));
        }
        tx.commit().await?;
        Ok(())
    }

    async fn insert_category(&self, category: &Category) -> EngineResult<()> {
        sqlx::query(
            "INSERT INTO categories (id, tournament_id, name, groups_ideal, performers_ideal, \
             created_at) VALUES ($1, $2, $3, $4, $5, $6)",
        )
        .bind(category.id)
        .bind(category.tournament_id)
        .bind(&category.name)
        .bind(category.groups_ideal as i32)
        .bind(category.performers_ideal as i32)
        .bind(category.created_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn category(&self, id: CategoryId) -> EngineResult<Category> {
        let row = sqlx::query("SELECT * FROM categories WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| EngineError::not_found("category", id))?;
        decode_category(&row)
    }

    async fn categories(&self, tournament_id: TournamentId) -> EngineResult<Vec<Category>> {
        let rows =
            sqlx::query("SELECT * FROM categories WHERE tournament_id = $1 ORDER BY created_at")
                .bind(tournament_id)
                .fetch_all(&self.pool)
                .await?;
        rows.iter().map(decode_category).collect()
    }

    async fn insert_performer(&self, performer: &Performer) -> EngineResult<()> {
        sqlx::query(
            "INSERT INTO performers (id, category_id, name, is_guest, preselection_score, \
             wins, draws, losses, registered_at) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)",
        )
        .bind(performer.id)
        .bind(performer.category_id)
        .bind(&performer.name)
        .bind(performer.is_guest)
        .bind(performer.preselection_score.map(|s| i32::from(s.hundredths())))
        .bind(performer.wins as i32)
        .bind(performer.draws as i32)
        .bind(performer.losses as i32)
        .bind(performer.registered_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn performer(&self, id: PerformerId) -> EngineResult<Performer> {
        let row = sqlx::query("SELECT * FROM performers WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| EngineError::not_found("performer", id))?;
        decode_performer(&row)
    }

    async fn performers(&self, category_id: CategoryId) -> EngineResult<Vec<Performer>> {
        let rows =
            sqlx::query("SELECT * FROM performers WHERE category_id = $1 ORDER BY registered_at")
                .bind(category_id)
                .fetch_all(&self.pool)
                .await?;
        rows.iter().map(decode_performer).collect()
    }

    async fn update_performer(&self, performer: &Performer) -> EngineResult<()> {
        let mut tx = self.pool.begin().await?;
        update_performer_tx(&mut tx, performer).await?;
        tx.commit().await?;
        Ok(())
    }

    async fn delete_performer(&self, id: PerformerId) -> EngineResult<()> {
        let result = sqlx::query("DELETE FROM performers WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;
        if result.rows_affected() == 0 {
            return Err(EngineError::not_found("performer", id));
        }
        Ok(())
    }

    async fn pool(&self, id: PoolId) -> EngineResult<Pool> {
        let row = sqlx::query("SELECT * FROM pools WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| EngineError::not_found("pool", id))?;
        decode_pool(&row)
    }

    async fn pools(&self, category_id: CategoryId) -> EngineResult<Vec<Pool>> {
        let rows = sqlx::query("SELECT * FROM pools WHERE category_id = $1 ORDER BY created_at")
            .bind(category_id)
            .fetch_all(&self.pool)
            .await?;
        rows.iter().map(decode_pool).collect()
    }

    async fn update_pool(&self, pool: &Pool) -> EngineResult<()> {
        let result = sqlx::query("UPDATE pools SET winner_id = $1, performer_ids = $2 WHERE id = $3")
            .bind(pool.winner_id)
            .bind(&pool.performer_ids)
            .bind(pool.id)
            .execute(&self.pool)
            .await?;
        if result.rows_affected() == 0 {
            return Err(EngineError::not_found("pool", pool.id));
        }
        Ok(())
    }

    async fn insert_battles(&self, battles: &[Battle]) -> EngineResult<()> {
        let mut tx = self.pool.begin().await?;
        for battle in battles {
            insert_battle_tx(&mut tx, battle).await?;
        }
        tx.commit().await?;
        Ok(())
    }

    async fn battle(&self, id: BattleId) -> EngineResult<Battle> {
        let statement = format!("SELECT {BATTLE_COLUMNS} FROM battles b WHERE b.id = $1");
        let row = sqlx::query(&statement)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| EngineError::not_found("battle", id))?;
        decode_battle(&row)
    }

    async fn battles(&self, filter: BattleFilter) -> EngineResult<Vec<Battle>> {
        let mut qb = QueryBuilder::<Postgres>::new(format!("SELECT {BATTLE_COLUMNS} FROM battles b"));
        if filter.tournament_id.is_some() {
            qb.push(" JOIN categories c ON c.id = b.category_id");
        }
        qb.push(" WHERE TRUE");
        if let Some(id) = filter.category_id {
            qb.push(" AND b.category_id = ");
            qb.push_bind(id);
        }
        if let Some(id) = filter.tournament_id {
            qb.push(" AND c.tournament_id = ");
            qb.push_bind(id);
        }
        if let Some(phase) = filter.phase {
            qb.push(" AND b.phase = ");
            qb.push_bind(phase.as_str());
        }
        if let Some(status) = filter.status {
            qb.push(" AND b.status = ");
            qb.push_bind(status.as_str());
        }
        qb.push(" ORDER BY b.sequence_order NULLS LAST, b.created_at");
        let rows = qb.build().fetch_all(&self.pool).await?;
        rows.iter().map(decode_battle).collect()
    }

    async fn update_battle(&self, battle: &Battle) -> EngineResult<()> {
        let mut tx = self.pool.begin().await?;
        update_battle_tx(&mut tx, battle).await?;
        tx.commit().await?;
        Ok(())
    }

    async fn update_battles(&self, battles: &[Battle]) -> EngineResult<()> {
        let mut tx = self.pool.begin().await?;
        for battle in battles {
            update_battle_tx(&mut tx, battle).await?;
        }
        tx.commit().await?;
        Ok(())
    }

    async fn activate_battle(&self, id: BattleId) -> EngineResult<Battle> {
        let mut tx = self.pool.begin().await?;
        let active = sqlx::query("SELECT id FROM battles WHERE status = 'active' LIMIT 1")
            .fetch_optional(&mut *tx)
            .await?;
        if let Some(row) = active {
            let active_id: Uuid = row.get("id");
            return Err(EngineError::Conflict(format!(
                "battle {active_id} is already active"
            )));
        }
        let statement =
            format!("SELECT {BATTLE_COLUMNS} FROM battles b WHERE b.id = $1 FOR UPDATE");
        let row = sqlx::query(&statement)
            .bind(id)
            .fetch_optional(&mut *tx)
            .await?
            .ok_or_else(|| EngineError::not_found("battle", id))?;
        let mut battle = decode_battle(&row)?;
        if battle.status != BattleStatus::Pending {
            return Err(EngineError::invalid(format!(
                "battle {id} is {}, only pending battles can start",
                battle.status
            )));
        }
        battle.status = BattleStatus::Active;
        update_battle_tx(&mut tx, &battle).await?;
        tx.commit().await?;
        Ok(battle)
    }

    async fn commit_advance(
        &self,
        tournament: &Tournament,
        artifacts: &AdvanceArtifacts,
    ) -> EngineResult<()> {
        let mut tx = self.pool.begin().await?;
        if tournament.status == TournamentStatus::Active {
            let other = sqlx::query(
                "SELECT id FROM tournaments WHERE status = 'active' AND id <> $1 LIMIT 1",
            )
            .bind(tournament.id)
            .fetch_optional(&mut *tx)
            .await?;
            if let Some(row) = other {
                let other_id: Uuid = row.get("id");
                return Err(EngineError::Conflict(format!(
                    "tournament {other_id} is already active"
                )));
            }
        }
        for pool in &artifacts.pools {
            insert_pool_tx(&mut tx, pool).await?;
        }
        for battle in &artifacts.battles {
            insert_battle_tx(&mut tx, battle).await?;
        }
        let result = sqlx::query("UPDATE tournaments SET status = $1, phase = $2 WHERE id = $3")
            .bind(tournament.status.as_str())
            .bind(tournament.phase.as_str())
            .bind(tournament.id)
            .execute(&mut *tx)
            .await?;
        if result.rows_affected() == 0 {
            return Err(EngineError::not_found("tournament", tournament.id));
        }
        tx.commit().await?;
        Ok(())
    }

    async fn commit_battle_result(
        &self,
        battle: &Battle,
        performers: &[Performer],
        pool: Option<&Pool>,
    ) -> EngineResult<()> {
        let mut tx = self.pool.begin().await?;
        update_battle_tx(&mut tx, battle).await?;
        for performer in performers {
            update_performer_tx(&mut tx, performer).await?;
        }
        if let Some(pool) = pool {
            let result = sqlx::query("UPDATE pools SET winner_id = $1 WHERE id = $2")
                .bind(pool.winner_id)
                .bind(pool.id)
                .execute(&mut *tx)
                .await?;
            if result.rows_affected() == 0 {
                return Err(EngineError::not_found("pool", pool.id));
            }
        }
        tx.commit().await?;
        Ok(())
    }
}
