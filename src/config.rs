// Runtime configuration for lsif-bundle.
// Read once from environment variables; invalid values fall back to defaults.

use std::env;
use std::fmt::Display;
use std::str::FromStr;
use std::sync::OnceLock;

static CONFIG: OnceLock<Config> = OnceLock::new();

#[derive(Debug, Clone)]
pub struct Config {
    /// Decoded documents/chunks kept per opened bundle (LSIF_BUNDLE_CACHE_CAPACITY)
    pub cache_capacity: usize,

    /// Read connections per opened bundle (LSIF_BUNDLE_POOL_SIZE)
    pub pool_size: u32,

    /// Idle read connections kept open (LSIF_BUNDLE_POOL_MIN_IDLE)
    pub pool_min_idle: u32,

    /// SQLite busy timeout in seconds (LSIF_BUNDLE_BUSY_TIMEOUT_SECS)
    pub busy_timeout_secs: u64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            cache_capacity: 128,
            pool_size: 4,
            pool_min_idle: 0,
            busy_timeout_secs: 30,
        }
    }
}

impl Config {
    fn from_env() -> Self {
        let mut config = Config::default();
        override_from_env("LSIF_BUNDLE_CACHE_CAPACITY", &mut config.cache_capacity);
        override_from_env("LSIF_BUNDLE_POOL_SIZE", &mut config.pool_size);
        override_from_env("LSIF_BUNDLE_POOL_MIN_IDLE", &mut config.pool_min_idle);
        override_from_env("LSIF_BUNDLE_BUSY_TIMEOUT_SECS", &mut config.busy_timeout_secs);

        if config.pool_size == 0 {
            tracing::warn!("LSIF_BUNDLE_POOL_SIZE must be positive, using 1");
            config.pool_size = 1;
        }
        if config.pool_min_idle > config.pool_size {
            config.pool_min_idle = config.pool_size;
        }
        config
    }

    pub fn get() -> &'static Config {
        CONFIG.get_or_init(Config::from_env)
    }
}

fn override_from_env<T>(name: &str, slot: &mut T)
where
    T: FromStr + Display,
{
    let Ok(raw) = env::var(name) else {
        return;
    };
    apply_value(name, &raw, slot);
}

fn apply_value<T>(name: &str, raw: &str, slot: &mut T)
where
    T: FromStr + Display,
{
    match raw.trim().parse() {
        Ok(parsed) => *slot = parsed,
        Err(_) => tracing::warn!(
            "invalid {} value: {}, using default: {}",
            name,
            raw,
            slot
        ),
    }
}
