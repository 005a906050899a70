pub mod error;
pub mod models;
pub mod ordered_map;
pub mod queries;

use std::str::FromStr;
use std::time::Duration;

use sqlx::migrate::{MigrateError, Migrator};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use sqlx::Error;

pub use error::{StoreError, ValidationErrors};
pub use models::{Answer, Category, Difficulty, NewChoice, NewQuestion, Question, Session, User};
pub use ordered_map::OrderedMap;

pub static MIGRATOR: Migrator = sqlx::migrate!("./migrations");

/// Statements waiting on a locked database give up after this long.
const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

pub async fn establish_connection(path: &str, max_connections: u32) -> Result<SqlitePool, Error> {
    let options = SqliteConnectOptions::from_str(format!("sqlite:{}", path).as_str())?
        .create_if_missing(true)
        .foreign_keys(true)
        .busy_timeout(BUSY_TIMEOUT);
    SqlitePoolOptions::new()
        .max_connections(max_connections)
        .connect_with(options)
        .await
}

pub async fn run_migrations(pool: &SqlitePool) -> Result<(), MigrateError> {
    MIGRATOR.run(pool).await
}

#[cfg(test)]
pub(crate) mod testing {
    use std::str::FromStr;

    use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};

    use super::MIGRATOR;

    /// Fresh migrated in-memory database. A single connection keeps every
    /// statement on the same memory database.
    pub async fn pool() -> SqlitePool {
        let options = SqliteConnectOptions::from_str("sqlite::memory:")
            .unwrap()
            .foreign_keys(true);
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect_with(options)
            .await
            .unwrap();
        MIGRATOR.run(&pool).await.unwrap();
        pool
    }
}
