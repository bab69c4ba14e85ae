//! SQLite-backed store for players and finished matches. Live game state
//! never lands here; this is the durable half of the system.

use std::path::Path;

use chrono::{DateTime, Utc};
use sqlx::Row;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use thiserror::Error;
use uuid::Uuid;

use crate::errors::ApiError;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Player already exists")]
    PlayerExists,
    #[error("no player named {0}")]
    UnknownPlayer(String),
    #[error("no matches recorded")]
    NoMatches,
    #[error(transparent)]
    Db(#[from] sqlx::Error),
}

impl From<StoreError> for ApiError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::PlayerExists => ApiError::PlayerExists,
            StoreError::UnknownPlayer(name) => ApiError::NotFound(format!("no player named {name}")),
            StoreError::NoMatches => ApiError::NotFound("no matches recorded".into()),
            StoreError::Db(db) => ApiError::internal(db),
        }
    }
}

#[derive(Debug, Clone)]
pub struct PlayerRecord {
    pub uuid: Uuid,
    pub name: String,
}

/// One recorded match with the player names joined in, ordered views of
/// which feed the tabulation.
#[derive(Debug, Clone)]
pub struct MatchRow {
    pub uuid: Uuid,
    pub created_at: DateTime<Utc>,
    pub winner: String,
    pub loser: String,
}

#[derive(Clone)]
pub struct RecordStore {
    pool: SqlitePool,
}

impl RecordStore {
    pub async fn connect(path: &Path) -> Result<Self, StoreError> {
        let options = SqliteConnectOptions::new()
            .filename(path)
            .create_if_missing(true);
        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect_with(options)
            .await?;
        let store = Self { pool };
        store.migrate().await?;
        Ok(store)
    }

    /// A throwaway store for tests. Single connection, since every
    /// `:memory:` connection is its own database.
    pub async fn connect_in_memory() -> Result<Self, StoreError> {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect(":memory:")
            .await?;
        let store = Self { pool };
        store.migrate().await?;
        Ok(store)
    }

    async fn migrate(&self) -> Result<(), StoreError> {
        sqlx::query(
            "CREATE TABLE IF NOT EXISTS players (
                uuid TEXT PRIMARY KEY,
                name TEXT NOT NULL
            )",
        )
        .execute(&self.pool)
        .await?;
        sqlx::query("CREATE INDEX IF NOT EXISTS idx_players_name ON players (name)")
            .execute(&self.pool)
            .await?;
        sqlx::query(
            "CREATE TABLE IF NOT EXISTS matches (
                uuid TEXT PRIMARY KEY,
                created_at TEXT NOT NULL,
                winner_id TEXT NOT NULL REFERENCES players (uuid),
                loser_id TEXT NOT NULL REFERENCES players (uuid)
            )",
        )
        .execute(&self.pool)
        .await?;
        sqlx::query("CREATE INDEX IF NOT EXISTS idx_matches_winner ON matches (winner_id)")
            .execute(&self.pool)
            .await?;
        sqlx::query("CREATE INDEX IF NOT EXISTS idx_matches_loser ON matches (loser_id)")
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    pub async fn add_player(&self, name: &str) -> Result<PlayerRecord, StoreError> {
        if self.player_by_name(name).await?.is_some() {
            return Err(StoreError::PlayerExists);
        }
        let player = PlayerRecord {
            uuid: Uuid::new_v4(),
            name: name.to_owned(),
        };
        sqlx::query("INSERT INTO players (uuid, name) VALUES (?1, ?2)")
            .bind(player.uuid.to_string())
            .bind(&player.name)
            .execute(&self.pool)
            .await?;
        Ok(player)
    }

    pub async fn player_by_name(&self, name: &str) -> Result<Option<PlayerRecord>, StoreError> {
        let row = sqlx::query("SELECT uuid, name FROM players WHERE name = ?1")
            .bind(name)
            .fetch_optional(&self.pool)
            .await?;
        row.map(|row| parse_player(&row)).transpose()
    }

    pub async fn list_players(&self) -> Result<Vec<PlayerRecord>, StoreError> {
        let rows = sqlx::query("SELECT uuid, name FROM players ORDER BY name")
            .fetch_all(&self.pool)
            .await?;
        rows.iter().map(parse_player).collect()
    }

    /// Record `winner` beating `loser`. Both names must already exist.
    pub async fn record_match(&self, winner: &str, loser: &str) -> Result<(), StoreError> {
        let winner = self
            .player_by_name(winner)
            .await?
            .ok_or_else(|| StoreError::UnknownPlayer(winner.to_owned()))?;
        let loser = self
            .player_by_name(loser)
            .await?
            .ok_or_else(|| StoreError::UnknownPlayer(loser.to_owned()))?;
        sqlx::query(
            "INSERT INTO matches (uuid, created_at, winner_id, loser_id) VALUES (?1, ?2, ?3, ?4)",
        )
        .bind(Uuid::new_v4().to_string())
        .bind(Utc::now())
        .bind(winner.uuid.to_string())
        .bind(loser.uuid.to_string())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Delete the most recently recorded match.
    pub async fn undo_last_match(&self) -> Result<(), StoreError> {
        let result = sqlx::query(
            "DELETE FROM matches WHERE uuid =
                (SELECT uuid FROM matches ORDER BY created_at DESC LIMIT 1)",
        )
        .execute(&self.pool)
        .await?;
        if result.rows_affected() == 0 {
            return Err(StoreError::NoMatches);
        }
        Ok(())
    }

    /// All matches oldest-first, names joined in.
    pub async fn matches_chronological(&self) -> Result<Vec<MatchRow>, StoreError> {
        let rows = sqlx::query(
            "SELECT m.uuid, m.created_at, w.name AS winner, l.name AS loser
             FROM matches m
             JOIN players w ON w.uuid = m.winner_id
             JOIN players l ON l.uuid = m.loser_id
             ORDER BY m.created_at ASC",
        )
        .fetch_all(&self.pool)
        .await?;
        rows.iter()
            .map(|row| {
                Ok(MatchRow {
                    uuid: parse_uuid(row.try_get("uuid")?)?,
                    created_at: row.try_get("created_at")?,
                    winner: row.try_get("winner")?,
                    loser: row.try_get("loser")?,
                })
            })
            .collect()
    }
}

fn parse_player(row: &sqlx::sqlite::SqliteRow) -> Result<PlayerRecord, StoreError> {
    Ok(PlayerRecord {
        uuid: parse_uuid(row.try_get("uuid")?)?,
        name: row.try_get("name")?,
    })
}

fn parse_uuid(raw: String) -> Result<Uuid, StoreError> {
    Uuid::parse_str(&raw).map_err(|err| StoreError::Db(sqlx::Error::Decode(Box::new(err))))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn add_player_rejects_duplicates() {
        let store = RecordStore::connect_in_memory().await.unwrap();
        store.add_player("Albert").await.unwrap();
        assert!(matches!(
            store.add_player("Albert").await,
            Err(StoreError::PlayerExists)
        ));
        assert_eq!(store.list_players().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn recorded_matches_come_back_in_order_with_names() {
        let store = RecordStore::connect_in_memory().await.unwrap();
        for name in ["Albert", "Brian", "Sam"] {
            store.add_player(name).await.unwrap();
        }
        store.record_match("Brian", "Albert").await.unwrap();
        store.record_match("Sam", "Brian").await.unwrap();

        let matches = store.matches_chronological().await.unwrap();
        assert_eq!(matches.len(), 2);
        assert_eq!(matches[0].winner, "Brian");
        assert_eq!(matches[1].winner, "Sam");
        assert!(matches[0].created_at <= matches[1].created_at);
    }

    #[tokio::test]
    async fn match_against_unknown_player_fails() {
        let store = RecordStore::connect_in_memory().await.unwrap();
        store.add_player("Albert").await.unwrap();
        assert!(matches!(
            store.record_match("Albert", "Nobody").await,
            Err(StoreError::UnknownPlayer(_))
        ));
    }

    #[tokio::test]
    async fn undo_removes_the_most_recent_match() {
        let store = RecordStore::connect_in_memory().await.unwrap();
        store.add_player("Albert").await.unwrap();
        store.add_player("Brian").await.unwrap();
        store.record_match("Brian", "Albert").await.unwrap();
        store.record_match("Albert", "Brian").await.unwrap();

        store.undo_last_match().await.unwrap();
        let matches = store.matches_chronological().await.unwrap();
        assert_eq!(matches.len(), 1);
        assert_eq!(matches[0].winner, "Brian");

        store.undo_last_match().await.unwrap();
        assert!(matches!(
            store.undo_last_match().await,
            Err(StoreError::NoMatches)
        ));
    }
}
