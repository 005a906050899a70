use argon2::password_hash::rand_core::OsRng;
use argon2::password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString};
use argon2::{Algorithm, Argon2, Params, Version};
use secrecy::{ExposeSecret, SecretString};
use sqlx::SqlitePool;
use tracing::instrument;

use crate::db::queries::users::{create_user, get_credential};
use crate::db::{StoreError, User};

/// Argon2id, 19 MiB of memory, 2 passes, 1 lane.
///
/// Changing these only affects new hashes: verification reads the parameters
/// back from the stored PHC string.
fn hasher() -> Argon2<'static> {
    Argon2::new(Algorithm::Argon2id, Version::V0x13, Params::DEFAULT)
}

/// Salted one-way hash in PHC string format. Slow on purpose; only
/// provisioning calls it.
pub fn hash_password(password: &SecretString) -> Result<String, argon2::password_hash::Error> {
    let salt = SaltString::generate(&mut OsRng);
    let hash = hasher().hash_password(password.expose_secret().as_bytes(), &salt)?;
    Ok(hash.to_string())
}

pub fn verify_password(password: &SecretString, hash: &str) -> bool {
    let parsed_hash = match PasswordHash::new(hash) {
        Ok(h) => h,
        Err(_) => return false,
    };
    hasher()
        .verify_password(password.expose_secret().as_bytes(), &parsed_hash)
        .is_ok()
}

#[derive(Clone)]
pub struct CredentialStore {
    pool: SqlitePool,
}

impl CredentialStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// The matching user, or `None` for an unknown username and a wrong
    /// password alike.
    #[instrument(skip(self, password))]
    pub async fn authenticate(
        &self,
        username: &str,
        password: &SecretString,
    ) -> Result<Option<User>, StoreError> {
        let Some(credential) = get_credential(&self.pool, username.trim()).await? else {
            return Ok(None);
        };
        if verify_password(password, &credential.password_hash) {
            Ok(Some(credential.into()))
        } else {
            Ok(None)
        }
    }

    pub async fn verify(&self, username: &str, password: &SecretString) -> Result<bool, StoreError> {
        Ok(self.authenticate(username, password).await?.is_some())
    }

    /// Stores a new account with a freshly hashed password.
    pub async fn provision(
        &self,
        username: &str,
        password: &SecretString,
    ) -> Result<User, super::AuthError> {
        let hash = hash_password(password).map_err(super::AuthError::Hashing)?;
        Ok(create_user(&self.pool, username, &hash).await?)
    }
}
