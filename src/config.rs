use std::{fmt::Display, str::FromStr};

use tracing::{info, warn};

#[derive(Debug, Clone)]
pub struct Config {
    pub database_url: String,
    pub listen_addr: String,
    pub max_connections: u32,
    pub bcrypt_cost: u32,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            database_url: "sqlite://medforum.db".to_owned(),
            listen_addr: "0.0.0.0:8080".to_owned(),
            max_connections: 16,
            bcrypt_cost: bcrypt::DEFAULT_COST,
        }
    }
}

impl Config {
    /// Reads the environment, honouring a `.env` file if one exists.
    pub fn load() -> Self {
        if dotenv::dotenv().is_err() {
            info!("no .env file, reading process environment only");
        }
        Self::from_lookup(|key| dotenv::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let defaults = Self::default();
        Self {
            database_url: lookup("DATABASE_URL").unwrap_or(defaults.database_url),
            listen_addr: lookup("LISTEN_ADDR").unwrap_or(defaults.listen_addr),
            max_connections: try_load(&lookup, "DB_MAX_CONNECTIONS", defaults.max_connections),
            bcrypt_cost: try_load(&lookup, "BCRYPT_COST", defaults.bcrypt_cost),
        }
    }
}

fn try_load<T>(lookup: &impl Fn(&str) -> Option<String>, key: &str, default: T) -> T
where
    T: FromStr + Display,
    T::Err: Display,
{
    let Some(raw) = lookup(key) else {
        info!("{key} not set, using default: {default}");
        return default;
    };
    raw.trim().parse().unwrap_or_else(|e| {
        warn!("invalid {key} value {raw:?} ({e}), using default: {default}");
        default
    })
}
