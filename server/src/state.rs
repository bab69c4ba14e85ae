//! Process-wide state. Everything is built once at startup and injected,
//! so tests can stand up fresh instances per case.

use std::sync::Arc;

use crate::dispatch::CommandDispatcher;
use crate::env::Config;
use crate::fabric::SubscriptionFabric;
use crate::records::store::{RecordStore, StoreError};
use crate::records::summary::{self, EloSettings, SummaryCache};
use crate::registry::GameRegistry;
use crate::session::SessionManager;
use crate::token::TokenKeys;

pub struct AppState {
    pub config: Config,
    pub tokens: Arc<TokenKeys>,
    pub registry: Arc<GameRegistry>,
    pub fabric: Arc<SubscriptionFabric>,
    pub sessions: SessionManager,
    pub dispatcher: CommandDispatcher,
    pub store: RecordStore,
    pub summary: SummaryCache,
}

impl AppState {
    /// Wire the whole service together against the configured database.
    pub async fn initialize(config: Config) -> Result<Arc<Self>, StoreError> {
        let store = RecordStore::connect(&config.database_path()).await?;
        Self::initialize_with_store(config, store).await
    }

    /// Same wiring with a caller-provided store; tests pass an in-memory
    /// database here.
    pub async fn initialize_with_store(
        config: Config,
        store: RecordStore,
    ) -> Result<Arc<Self>, StoreError> {
        let tokens = Arc::new(TokenKeys::new(&config.secret_key, config.algorithm));
        let registry = GameRegistry::new();
        let fabric = SubscriptionFabric::new(registry.clone());
        let dispatcher = CommandDispatcher::new(registry.clone(), fabric.clone());
        let sessions = SessionManager::new(tokens.clone());

        let summary = SummaryCache::default();
        summary::hydrate(&summary, &store, EloSettings::from(&config)).await?;

        Ok(Arc::new(Self {
            config,
            tokens,
            registry,
            fabric,
            sessions,
            dispatcher,
            store,
            summary,
        }))
    }

    pub fn elo_settings(&self) -> EloSettings {
        EloSettings::from(&self.config)
    }
}
