//! The game registry owns every live game, the join-code pool, the
//! serialized snapshot cache and the change observers. All mutation goes
//! through [`GameRegistry::with_scope`], a synchronous critical section:
//! snapshot on entry, commit and notify on clean exit, rollback on error.
//! Nothing inside the scope suspends, which is what makes per-game locks
//! unnecessary.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, MutexGuard, Weak};
use std::time::Duration;

use rand::Rng;
use tokio::sync::Notify;
use uuid::Uuid;

use crate::engine::game::Game;
use crate::errors::GameError;

/// Join codes avoid the ambiguous I and O.
const CODE_ALPHABET: &[u8] = b"ABCDEFGHJKLMNPQRSTUVWXYZ";
const CODE_LENGTH: usize = 4;
/// Pre-generated pool size; codes are drawn without replacement and
/// returned when a game terminates, so collisions cannot happen.
const CODE_POOL_SIZE: usize = 10_000;

/// How long a fresh lobby waits for its host to open a socket before the
/// sentinel closes it.
pub const HOST_CONNECT_WINDOW: Duration = Duration::from_secs(60);

/// A change observer. Invoked synchronously under the scope's writer with
/// the committed game; it must not block.
pub type Observer = Box<dyn Fn(&Game) + Send + Sync>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ObserverId(u64);

struct RegistryInner {
    games: HashMap<Uuid, Game>,
    /// Live join code -> game id. Entries leave when games terminate.
    codes: HashMap<String, Uuid>,
    code_pool: Vec<String>,
    /// Serialized-for-network snapshots, refreshed on every commit so
    /// subscribers never serialize the same state twice.
    cache: HashMap<Uuid, Arc<str>>,
    observers: Vec<(ObserverId, Observer)>,
    next_observer: u64,
    /// Host-connect signals for lobbies whose sentinel is still armed.
    sentinels: HashMap<Uuid, Arc<Notify>>,
}

pub struct GameRegistry {
    /// Self-handle for the sentinel tasks the registry spawns.
    weak_self: Weak<GameRegistry>,
    inner: Mutex<RegistryInner>,
}

fn generate_code_pool(size: usize) -> Vec<String> {
    let mut rng = rand::rng();
    let mut pool = HashSet::with_capacity(size);
    while pool.len() < size {
        let code: String = (0..CODE_LENGTH)
            .map(|_| CODE_ALPHABET[rng.random_range(0..CODE_ALPHABET.len())] as char)
            .collect();
        pool.insert(code);
    }
    pool.into_iter().collect()
}

impl GameRegistry {
    pub fn new() -> Arc<Self> {
        Arc::new_cyclic(|weak| Self {
            weak_self: weak.clone(),
            inner: Mutex::new(RegistryInner {
                games: HashMap::new(),
                codes: HashMap::new(),
                code_pool: generate_code_pool(CODE_POOL_SIZE),
                cache: HashMap::new(),
                observers: Vec::new(),
                next_observer: 0,
                sentinels: HashMap::new(),
            }),
        })
    }

    fn lock(&self) -> MutexGuard<'_, RegistryInner> {
        // A poisoned lock only means a panicked scope closure; the game it
        // touched was already rolled back, so the map itself is intact.
        self.inner.lock().unwrap_or_else(|err| err.into_inner())
    }

    /// Create a lobby hosted by `host_id`: allocate a join code, index the
    /// game, arm the host-connect sentinel and notify observers. Returns a
    /// copy of the new game.
    pub fn create(&self, host_id: Uuid) -> Result<Game, GameError> {
        let signal = Arc::new(Notify::new());
        let game = {
            let mut inner = self.lock();
            let code = inner
                .code_pool
                .pop()
                .ok_or_else(|| GameError::Internal("join code pool exhausted".into()))?;
            let game = Game::new(host_id, code.clone());
            inner.codes.insert(code, game.uuid);
            inner.sentinels.insert(game.uuid, signal.clone());
            Self::commit(&mut inner, game.clone())?;
            inner.games.insert(game.uuid, game.clone());
            game
        };
        self.spawn_sentinel(game.uuid, signal);
        tracing::info!(game = %game.uuid, code = %game.code, "Created game");
        Ok(game)
    }

    pub fn by_id(&self, game_id: Uuid) -> Option<Game> {
        self.lock().games.get(&game_id).cloned()
    }

    pub fn by_code(&self, code: &str) -> Option<Game> {
        let inner = self.lock();
        let game_id = inner.codes.get(code)?;
        inner.games.get(game_id).cloned()
    }

    pub fn all_ids(&self) -> Vec<Uuid> {
        self.lock().games.keys().copied().collect()
    }

    pub fn contains(&self, game_id: Uuid) -> bool {
        self.lock().games.contains_key(&game_id)
    }

    /// The current serialized snapshot for a game, shared not copied.
    pub fn cached_snapshot(&self, game_id: Uuid) -> Option<Arc<str>> {
        self.lock().cache.get(&game_id).cloned()
    }

    /// Run `op` against the live game as one atomic unit. The previous
    /// state is retained on entry; a clean return commits (bumps
    /// `modified_at`, refreshes the snapshot cache, reclaims the join code
    /// of a terminated game, notifies observers), an error restores the
    /// retained state and propagates. Must stay synchronous throughout.
    pub fn with_scope<F>(&self, game_id: Uuid, op: F) -> Result<(), GameError>
    where
        F: FnOnce(&mut Game) -> Result<(), GameError>,
    {
        let mut inner = self.lock();
        let game = inner.games.get_mut(&game_id).ok_or(GameError::UnknownGame)?;
        let checkpoint = game.clone();
        match op(game) {
            Ok(()) => {
                game.modified_at = chrono::Utc::now();
                let committed = game.clone();
                Self::commit(&mut inner, committed)
            }
            Err(err) => {
                *game = checkpoint;
                Err(err)
            }
        }
    }

    /// Commit half of the scope: cache refresh, code reclaim, observer
    /// fan-out. Runs with the lock held and never suspends.
    fn commit(inner: &mut RegistryInner, committed: Game) -> Result<(), GameError> {
        let serialized = serde_json::to_string(&committed.snapshot())
            .map_err(|err| GameError::Internal(format!("snapshot serialization: {err}")))?;
        inner.cache.insert(committed.uuid, serialized.into());

        if committed.is_terminal() && inner.codes.remove(&committed.code).is_some() {
            inner.code_pool.push(committed.code.clone());
        }

        for (_, observer) in &inner.observers {
            observer(&committed);
        }
        Ok(())
    }

    pub fn subscribe(&self, observer: Observer) -> ObserverId {
        let mut inner = self.lock();
        let id = ObserverId(inner.next_observer);
        inner.next_observer += 1;
        inner.observers.push((id, observer));
        id
    }

    pub fn unsubscribe(&self, id: ObserverId) {
        let mut inner = self.lock();
        let before = inner.observers.len();
        inner.observers.retain(|(observer_id, _)| *observer_id != id);
        if inner.observers.len() == before {
            tracing::warn!(?id, "Tried to remove non-existent observer");
        }
    }

    /// The gateway calls this when the host opens a socket; the armed
    /// sentinel stands down. Safe to call repeatedly and after the game
    /// has terminated.
    pub fn confirm_host(&self, game_id: Uuid) {
        if let Some(signal) = self.lock().sentinels.remove(&game_id) {
            signal.notify_one();
        }
    }

    /// Watchdog for freshly created lobbies: if the host never shows up
    /// within the window, the lobby is closed through a regular scope.
    fn spawn_sentinel(&self, game_id: Uuid, signal: Arc<Notify>) {
        let Some(registry) = self.weak_self.upgrade() else {
            return;
        };
        tokio::spawn(async move {
            let connected =
                tokio::time::timeout(HOST_CONNECT_WINDOW, signal.notified()).await;
            registry.lock().sentinels.remove(&game_id);
            if connected.is_ok() {
                return;
            }
            tracing::info!(game = %game_id, "Host never connected, closing lobby");
            let result = registry.with_scope(game_id, |game| {
                game.close();
                Ok(())
            });
            if let Err(err) = result {
                tracing::warn!(?err, game = %game_id, "Sentinel close failed");
            }
        });
    }
}
