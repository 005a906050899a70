use ::config::{Config, ConfigError, Environment};
use chrono::{Duration, Utc};
use serde::Deserialize;

/// Default session lifetime: 48 hours.
pub const DEFAULT_SESSION_TTL_SECS: i64 = 48 * 60 * 60;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionBackend {
    /// `sessions` table, survives restarts.
    #[default]
    Database,
    /// In-process map, for single-instance deployments without persistent
    /// session storage.
    Memory,
}

/// Runtime settings, read from the environment (and `.env`):
/// `DB_PATH`, `MAX_CONNECTIONS`, `SESSION_TTL_SECS`, `SESSION_BACKEND`.
#[derive(Debug, Clone, Deserialize)]
pub struct Settings {
    pub db_path: String,
    pub max_connections: u32,
    pub session_ttl_secs: i64,
    pub session_backend: SessionBackend,
}

impl Settings {
    pub fn load() -> Result<Self, ConfigError> {
        dotenv::dotenv().ok();
        Self::from_env(Environment::default())
    }

    fn from_env(environment: Environment) -> Result<Self, ConfigError> {
        let settings: Settings = Config::builder()
            .set_default("db_path", "trivia.db")?
            .set_default("max_connections", 5_i64)?
            .set_default("session_ttl_secs", DEFAULT_SESSION_TTL_SECS)?
            .set_default("session_backend", "database")?
            .add_source(environment.try_parsing(true))
            .build()?
            .try_deserialize()?;
        if settings.session_ttl_secs <= 0 {
            return Err(ConfigError::Message(
                "SESSION_TTL_SECS must be a positive number of seconds".to_owned(),
            ));
        }
        let in_range = Duration::try_seconds(settings.session_ttl_secs)
            .and_then(|ttl| Utc::now().checked_add_signed(ttl))
            .is_some();
        if !in_range {
            return Err(ConfigError::Message(
                "SESSION_TTL_SECS is too large to compute an expiry".to_owned(),
            ));
        }
        Ok(settings)
    }

    /// Falls back to the default when the field was set out of range after
    /// loading.
    pub fn session_ttl(&self) -> Duration {
        Duration::try_seconds(self.session_ttl_secs)
            .unwrap_or_else(|| Duration::seconds(DEFAULT_SESSION_TTL_SECS))
    }
}
