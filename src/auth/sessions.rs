use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use parking_lot::Mutex;
use rand::Rng;
use serde::Serialize;
use sqlx::SqlitePool;

use crate::db::queries::sessions::{
    delete_expired_sessions, delete_session, get_session, insert_session,
};
use crate::db::{Session, StoreError, User};
use crate::settings::SessionBackend;

/// Storage for session records. Implementations only store and fetch; expiry
/// policy lives in [`SessionManager`].
#[async_trait]
pub trait SessionStore: Send + Sync {
    /// Fails with [`StoreError::TokenCollision`] if the token is taken.
    async fn insert(&self, session: &Session) -> Result<(), StoreError>;
    async fn get(&self, token: &str) -> Result<Option<Session>, StoreError>;
    /// Removing an unknown token is not an error.
    async fn remove(&self, token: &str) -> Result<(), StoreError>;
    /// Drops every session whose expiry is at or before `now`, returning how
    /// many went.
    async fn prune_expired(&self, now: DateTime<Utc>) -> Result<u64, StoreError>;
}

/// Sessions in the `sessions` table; row locking is left to SQLite.
pub struct SqliteSessionStore {
    pool: SqlitePool,
}

impl SqliteSessionStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl SessionStore for SqliteSessionStore {
    async fn insert(&self, session: &Session) -> Result<(), StoreError> {
        insert_session(&self.pool, session).await
    }

    async fn get(&self, token: &str) -> Result<Option<Session>, StoreError> {
        get_session(&self.pool, token).await
    }

    async fn remove(&self, token: &str) -> Result<(), StoreError> {
        delete_session(&self.pool, token).await.map(|_| ())
    }

    async fn prune_expired(&self, now: DateTime<Utc>) -> Result<u64, StoreError> {
        delete_expired_sessions(&self.pool, now).await
    }
}

/// Process-local sessions, lost on restart.
#[derive(Default)]
pub struct MemorySessionStore {
    sessions: Mutex<HashMap<String, Session>>,
}

impl MemorySessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.sessions.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl SessionStore for MemorySessionStore {
    async fn insert(&self, session: &Session) -> Result<(), StoreError> {
        let mut sessions = self.sessions.lock();
        if sessions.contains_key(&session.token) {
            return Err(StoreError::TokenCollision);
        }
        sessions.insert(session.token.clone(), session.clone());
        Ok(())
    }

    async fn get(&self, token: &str) -> Result<Option<Session>, StoreError> {
        Ok(self.sessions.lock().get(token).cloned())
    }

    async fn remove(&self, token: &str) -> Result<(), StoreError> {
        self.sessions.lock().remove(token);
        Ok(())
    }

    async fn prune_expired(&self, now: DateTime<Utc>) -> Result<u64, StoreError> {
        let mut sessions = self.sessions.lock();
        let before = sessions.len();
        sessions.retain(|_, session| !session.is_expired_at(now));
        Ok((before - sessions.len()) as u64)
    }
}

/// What the caller hands to the client: the token and when it stops working.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct IssuedSession {
    pub token: String,
    pub expiry: DateTime<Utc>,
}

/// 32 bytes from the thread-local CSPRNG, hex encoded.
pub fn generate_token() -> String {
    let mut rng = rand::rng();
    let bytes: [u8; 32] = rng.random();
    hex::encode(bytes)
}

#[derive(Clone)]
pub struct SessionManager {
    store: Arc<dyn SessionStore>,
    ttl: Duration,
}

impl SessionManager {
    pub fn new(store: Arc<dyn SessionStore>, ttl: Duration) -> Self {
        Self { store, ttl }
    }

    pub fn for_backend(backend: SessionBackend, pool: SqlitePool, ttl: Duration) -> Self {
        let store: Arc<dyn SessionStore> = match backend {
            SessionBackend::Database => Arc::new(SqliteSessionStore::new(pool)),
            SessionBackend::Memory => Arc::new(MemorySessionStore::new()),
        };
        Self::new(store, ttl)
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    pub async fn issue(&self, user: &User) -> Result<IssuedSession, StoreError> {
        let expiry = Utc::now()
            .checked_add_signed(self.ttl)
            .ok_or(StoreError::ExpiryOutOfRange)?;
        let session = Session {
            token: generate_token(),
            user: user.clone(),
            expiry,
        };
        self.store.insert(&session).await?;
        tracing::debug!(user_id = user.id, expiry = %session.expiry, "Session issued");
        Ok(IssuedSession {
            token: session.token,
            expiry: session.expiry,
        })
    }

    /// The session's user while it is active. Unknown and expired tokens both
    /// resolve to `None`; an expired record is deleted on the way.
    pub async fn resolve(&self, token: &str) -> Result<Option<User>, StoreError> {
        let Some(session) = self.store.get(token).await? else {
            return Ok(None);
        };
        if session.is_expired_at(Utc::now()) {
            tracing::debug!(user_id = session.user.id, "Dropping expired session");
            self.store.remove(token).await?;
            return Ok(None);
        }
        Ok(Some(session.user))
    }

    pub async fn revoke(&self, token: &str) -> Result<(), StoreError> {
        self.store.remove(token).await
    }

    /// Sweeps sessions that expired without being presented again.
    pub async fn prune_expired(&self) -> Result<u64, StoreError> {
        let pruned = self.store.prune_expired(Utc::now()).await?;
        tracing::debug!(pruned, "Expired sessions pruned");
        Ok(pruned)
    }
}
