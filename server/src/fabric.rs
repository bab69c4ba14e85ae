//! Per-connection subscriptions with latest-wins delivery.
//!
//! If publishes back up, a naive per-event queue falls progressively
//! further behind and sends ever-staler states. Instead every game change
//! just sets a subscription's stale flag; each subscription runs its own
//! delivery task that waits on the flag, clears it, and ships the current
//! cached snapshot. However many updates land while a send is in flight,
//! at most one follow-up send happens and it carries the newest state:
//! O(1) memory per slow client, always-current content.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, Weak};

use tokio::sync::Notify;
use tokio::task::JoinHandle;
use uuid::Uuid;

use crate::errors::GameError;
use crate::registry::GameRegistry;

/// The outbound half of a connection. The fabric only needs to push text
/// frames; tests substitute a channel-backed implementation.
pub trait Outbound: Send + 'static {
    fn send_text(
        &mut self,
        text: String,
    ) -> impl Future<Output = Result<(), SinkClosed>> + Send;
}

/// The far end is gone or refused the frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SinkClosed;

/// Consecutive failed sends before a subscription is declared dead.
const MAX_SEND_FAILURES: u32 = 3;

struct SubscriptionHandle {
    game_id: Uuid,
    stale: Arc<Notify>,
    task: JoinHandle<()>,
}

#[derive(Default)]
struct FabricInner {
    subscriptions: HashMap<Uuid, SubscriptionHandle>,
    by_game: HashMap<Uuid, Vec<Uuid>>,
}

pub struct SubscriptionFabric {
    /// Self-handle for the delivery tasks the fabric spawns.
    weak_self: Weak<SubscriptionFabric>,
    registry: Arc<GameRegistry>,
    inner: Mutex<FabricInner>,
}

impl SubscriptionFabric {
    /// Builds the fabric and registers its observer with the registry.
    /// The observer is a pure setter of stale flags, so it is safe to run
    /// synchronously under the registry scope.
    pub fn new(registry: Arc<GameRegistry>) -> Arc<Self> {
        let fabric = Arc::new_cyclic(|weak| Self {
            weak_self: weak.clone(),
            registry: registry.clone(),
            inner: Mutex::new(FabricInner::default()),
        });
        let weak = Arc::downgrade(&fabric);
        registry.subscribe(Box::new(move |game| {
            if let Some(fabric) = weak.upgrade() {
                fabric.mark_game_stale(game.uuid);
            }
        }));
        fabric
    }

    fn lock(&self) -> MutexGuard<'_, FabricInner> {
        self.inner.lock().unwrap_or_else(|err| err.into_inner())
    }

    /// Flag every subscription of `game_id` for redelivery.
    pub fn mark_game_stale(&self, game_id: Uuid) {
        let inner = self.lock();
        let Some(subs) = inner.by_game.get(&game_id) else {
            return;
        };
        for sub_id in subs {
            if let Some(handle) = inner.subscriptions.get(sub_id) {
                handle.stale.notify_one();
            }
        }
    }

    /// Bind an outbound sink to a game and start its delivery task. The
    /// flag starts set, so the current snapshot goes out immediately.
    pub fn subscribe<S: Outbound>(&self, game_id: Uuid, sink: S) -> Result<Uuid, GameError> {
        if !self.registry.contains(game_id) {
            return Err(GameError::UnknownGame);
        }

        let sub_id = Uuid::new_v4();
        let stale = Arc::new(Notify::new());
        stale.notify_one();

        let task = tokio::spawn(deliver(
            sink,
            game_id,
            sub_id,
            self.registry.clone(),
            stale.clone(),
            self.weak_self.clone(),
        ));

        let mut inner = self.lock();
        inner.subscriptions.insert(
            sub_id,
            SubscriptionHandle {
                game_id,
                stale,
                task,
            },
        );
        inner.by_game.entry(game_id).or_default().push(sub_id);
        Ok(sub_id)
    }

    /// Cancel the delivery task and drop all references. Called from the
    /// gateway on disconnect and by a delivery task that gave up.
    pub fn unsubscribe(&self, sub_id: Uuid) {
        let mut inner = self.lock();
        let Some(handle) = inner.subscriptions.remove(&sub_id) else {
            tracing::warn!(%sub_id, "Could not find subscription to remove");
            return;
        };
        if let Some(subs) = inner.by_game.get_mut(&handle.game_id) {
            subs.retain(|id| *id != sub_id);
            if subs.is_empty() {
                inner.by_game.remove(&handle.game_id);
            }
        }
        handle.task.abort();
    }

    #[cfg(test)]
    fn subscription_count(&self, game_id: Uuid) -> usize {
        self.lock()
            .by_game
            .get(&game_id)
            .map_or(0, |subs| subs.len())
    }
}

/// The per-subscription delivery loop: wait on the flag, clear it, read
/// the registry's current snapshot, push it out. Deliveries are strictly
/// ordered because this task is the only sender for its connection.
async fn deliver<S: Outbound>(
    mut sink: S,
    game_id: Uuid,
    sub_id: Uuid,
    registry: Arc<GameRegistry>,
    stale: Arc<Notify>,
    fabric: Weak<SubscriptionFabric>,
) {
    let mut failures = 0u32;
    loop {
        stale.notified().await;
        let Some(snapshot) = registry.cached_snapshot(game_id) else {
            continue;
        };
        match sink.send_text(snapshot.to_string()).await {
            Ok(()) => failures = 0,
            Err(SinkClosed) => {
                // the next stale event retries with a fresher snapshot
                failures += 1;
                if failures >= MAX_SEND_FAILURES {
                    tracing::info!(%sub_id, game = %game_id, "Subscription dead, removing");
                    if let Some(fabric) = fabric.upgrade() {
                        fabric.unsubscribe(sub_id);
                    }
                    return;
                }
            }
        }
    }
}
