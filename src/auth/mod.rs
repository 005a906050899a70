pub mod credentials;
pub mod sessions;

use secrecy::SecretString;
use sqlx::SqlitePool;
use thiserror::Error;

use crate::db::{StoreError, User};
use crate::settings::Settings;

pub use credentials::{hash_password, verify_password, CredentialStore};
pub use sessions::{
    IssuedSession, MemorySessionStore, SessionManager, SessionStore, SqliteSessionStore,
};

#[derive(Debug, Error)]
pub enum AuthError {
    /// Same error for an unknown username and a wrong password.
    #[error("invalid username or password")]
    InvalidCredentials,
    #[error("password hashing failed: {0}")]
    Hashing(argon2::password_hash::Error),
    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Admin login and session lifecycle.
#[derive(Clone)]
pub struct Authenticator {
    credentials: CredentialStore,
    sessions: SessionManager,
}

impl Authenticator {
    pub fn new(credentials: CredentialStore, sessions: SessionManager) -> Self {
        Self {
            credentials,
            sessions,
        }
    }

    pub fn from_settings(pool: SqlitePool, settings: &Settings) -> Self {
        let sessions =
            SessionManager::for_backend(settings.session_backend, pool.clone(), settings.session_ttl());
        Self::new(CredentialStore::new(pool), sessions)
    }

    pub fn credentials(&self) -> &CredentialStore {
        &self.credentials
    }

    pub fn sessions(&self) -> &SessionManager {
        &self.sessions
    }

    pub async fn login(
        &self,
        username: &str,
        password: &SecretString,
    ) -> Result<IssuedSession, AuthError> {
        let Some(user) = self.credentials.authenticate(username, password).await? else {
            tracing::info!("Rejected login attempt");
            return Err(AuthError::InvalidCredentials);
        };
        let issued = self.sessions.issue(&user).await?;
        tracing::info!(user_id = user.id, "Admin logged in");
        Ok(issued)
    }

    pub async fn resolve_session(&self, token: &str) -> Result<Option<User>, StoreError> {
        self.sessions.resolve(token).await
    }

    pub async fn logout(&self, token: &str) -> Result<(), StoreError> {
        self.sessions.revoke(token).await
    }
}
