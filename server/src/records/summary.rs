//! Standings tabulation and the cache slot it hydrates.
//!
//! The tabulation recomputes from scratch on every hydration: replay all
//! matches oldest-first, updating wins, losses and Elo. The K value decays
//! with the games both participants have played, so farming fresh players
//! stops paying once a rating is established.

use std::collections::HashMap;

use chrono::Utc;
use qubic_protocol::{MatchRecord, PlayerRank, Summary};
use tokio::sync::RwLock;

use crate::env::Config;
use crate::records::elo;
use crate::records::store::{RecordStore, StoreError};

#[derive(Debug, Clone, Copy)]
pub struct EloSettings {
    pub starting: f64,
    pub ceiling: u32,
    pub floor: u32,
}

impl From<&Config> for EloSettings {
    fn from(config: &Config) -> Self {
        Self {
            starting: config.starting_elo,
            ceiling: config.k_ceiling,
            floor: config.k_floor,
        }
    }
}

/// Holds the latest summary pre-serialized. Readers get the string as-is;
/// writers swap in a whole new hydration.
pub struct SummaryCache {
    slot: RwLock<String>,
}

impl Default for SummaryCache {
    fn default() -> Self {
        Self {
            slot: RwLock::new("{}".to_owned()),
        }
    }
}

impl SummaryCache {
    pub async fn read(&self) -> String {
        self.slot.read().await.clone()
    }

    async fn replace(&self, json: String) {
        *self.slot.write().await = json;
    }
}

/// Recompute the standings and swap them into the cache.
pub async fn hydrate(
    cache: &SummaryCache,
    store: &RecordStore,
    settings: EloSettings,
) -> Result<(), StoreError> {
    let players = store.list_players().await?;
    let matches = store.matches_chronological().await?;

    let mut elo: HashMap<String, f64> = players
        .iter()
        .map(|player| (player.name.clone(), settings.starting))
        .collect();
    let mut wins: HashMap<String, u32> = HashMap::new();
    let mut losses: HashMap<String, u32> = HashMap::new();

    for record in &matches {
        *wins.entry(record.winner.clone()).or_insert(0) += 1;
        *losses.entry(record.loser.clone()).or_insert(0) += 1;

        let played = wins.get(&record.winner).copied().unwrap_or(0)
            + wins.get(&record.loser).copied().unwrap_or(0)
            + losses.get(&record.winner).copied().unwrap_or(0)
            + losses.get(&record.loser).copied().unwrap_or(0);
        let decay = (played / 2).max(1);
        let k = (settings.ceiling / decay).max(settings.floor) as f64;

        let winner_elo = *elo.entry(record.winner.clone()).or_insert(settings.starting);
        let loser_elo = *elo.entry(record.loser.clone()).or_insert(settings.starting);
        let (new_winner, new_loser) = elo::calculate_elo(winner_elo, loser_elo, k);
        elo.insert(record.winner.clone(), new_winner);
        elo.insert(record.loser.clone(), new_loser);
    }

    let mut ordered_players: Vec<PlayerRank> = elo
        .into_iter()
        .map(|(name, score)| PlayerRank {
            win: wins.get(&name).copied().unwrap_or(0),
            loss: losses.get(&name).copied().unwrap_or(0),
            name,
            elo: score,
        })
        .collect();
    ordered_players.sort_by(|a, b| b.elo.total_cmp(&a.elo));

    let mut match_history: Vec<MatchRecord> = matches
        .iter()
        .map(|record| MatchRecord {
            winner: record.winner.clone(),
            loser: record.loser.clone(),
            date: record.created_at.to_rfc3339(),
        })
        .collect();
    match_history.sort_by(|a, b| b.date.cmp(&a.date));

    let summary = Summary {
        last_hydrated: Utc::now().to_rfc3339(),
        ordered_players,
        match_history,
    };
    let json = serde_json::to_string(&summary)
        .map_err(|err| StoreError::Db(sqlx::Error::Decode(Box::new(err))))?;
    cache.replace(json).await;
    Ok(())
}
