//! Internal storage of user sessions.
//!
//! When a user connects for the first time they are granted a session and
//! a token; the token establishes identity on every later request. Tokens
//! are stateless, so validation never touches the session store — the
//! records exist for operational introspection and future invalidation.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

use chrono::{DateTime, Duration, Utc};
use uuid::Uuid;

use crate::token::{TokenError, TokenKeys};

/// By default a session lapses two days after login.
const DEFAULT_TTL_HOURS: i64 = 48;

#[derive(Debug, Clone)]
pub struct UserSession {
    pub uuid: Uuid,
    pub user_id: Uuid,
    pub name: String,
    pub expires_at: DateTime<Utc>,
}

impl UserSession {
    pub fn is_expired(&self) -> bool {
        Utc::now() > self.expires_at
    }

    pub fn info(&self) -> qubic_protocol::SessionInfo {
        qubic_protocol::SessionInfo {
            uuid: self.uuid,
            user_id: self.user_id,
            name: self.name.clone(),
            expires_at: self.expires_at,
        }
    }
}

#[derive(Default)]
struct SessionsInner {
    by_id: HashMap<Uuid, UserSession>,
    /// One active session per user; a later login displaces the earlier.
    by_user: HashMap<Uuid, Uuid>,
}

pub struct SessionManager {
    ttl: Duration,
    tokens: Arc<TokenKeys>,
    inner: Mutex<SessionsInner>,
}

impl SessionManager {
    pub fn new(tokens: Arc<TokenKeys>) -> Self {
        Self {
            ttl: Duration::hours(DEFAULT_TTL_HOURS),
            tokens,
            inner: Mutex::new(SessionsInner::default()),
        }
    }

    fn lock(&self) -> MutexGuard<'_, SessionsInner> {
        self.inner.lock().unwrap_or_else(|err| err.into_inner())
    }

    /// Perform a login for the given user, minting an access token that
    /// carries their identity. A missing user id means a first-time user.
    pub fn login(
        &self,
        user_id: Option<Uuid>,
        name: &str,
    ) -> Result<(UserSession, String), TokenError> {
        let user_id = user_id.unwrap_or_else(Uuid::new_v4);
        let session = UserSession {
            uuid: Uuid::new_v4(),
            user_id,
            name: name.to_owned(),
            expires_at: Utc::now() + self.ttl,
        };
        let token = self.tokens.mint_user(user_id, session.expires_at)?;

        let mut inner = self.lock();
        if let Some(previous) = inner.by_user.insert(user_id, session.uuid) {
            inner.by_id.remove(&previous);
        }
        inner.by_id.insert(session.uuid, session.clone());
        Ok((session, token))
    }

    /// Token-only validation; the session record is not consulted.
    pub fn validate(&self, token: &str) -> Result<Uuid, TokenError> {
        self.tokens.verify_user(token)
    }

    pub fn session_for_user(&self, user_id: Uuid) -> Option<UserSession> {
        let inner = self.lock();
        let session_id = inner.by_user.get(&user_id)?;
        inner.by_id.get(session_id).cloned()
    }

    pub fn session_by_id(&self, session_id: Uuid) -> Option<UserSession> {
        self.lock().by_id.get(&session_id).cloned()
    }

    /// Drop lapsed sessions; returns how many were removed.
    pub fn sweep_expired(&self) -> usize {
        let mut inner = self.lock();
        let expired: Vec<UserSession> = inner
            .by_id
            .values()
            .filter(|session| session.is_expired())
            .cloned()
            .collect();
        for session in &expired {
            inner.by_id.remove(&session.uuid);
            if inner.by_user.get(&session.user_id) == Some(&session.uuid) {
                inner.by_user.remove(&session.user_id);
            }
        }
        expired.len()
    }
}
