use anyhow::Context;
use serde::Deserialize;

/// Which persistence backend the directory runs against.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StoreKind {
    Postgres,
    Memory,
}

impl StoreKind {
    fn parse(raw: &str) -> anyhow::Result<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "postgres" | "pg" => Ok(Self::Postgres),
            "memory" | "mem" => Ok(Self::Memory),
            other => anyhow::bail!("unknown STORE value: {other}"),
        }
    }
}

/// Argon2 work factor. Fixed for the lifetime of the process.
#[derive(Debug, Clone, Deserialize)]
pub struct PasswordConfig {
    pub memory_kib: u32,
    pub iterations: u32,
    pub parallelism: u32,
}

impl Default for PasswordConfig {
    fn default() -> Self {
        Self {
            memory_kib: argon2::Params::DEFAULT_M_COST,
            iterations: argon2::Params::DEFAULT_T_COST,
            parallelism: argon2::Params::DEFAULT_P_COST,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    pub store: StoreKind,
    pub database_url: Option<String>,
    pub max_connections: u32,
    pub host: String,
    pub port: u16,
    pub password: PasswordConfig,
}

impl AppConfig {
    pub fn from_env() -> anyhow::Result<Self> {
        let store = match std::env::var("STORE") {
            Ok(v) => StoreKind::parse(&v)?,
            Err(_) => StoreKind::Postgres,
        };
        let database_url = std::env::var("DATABASE_URL").ok();
        if store == StoreKind::Postgres && database_url.is_none() {
            anyhow::bail!("DATABASE_URL must be set when STORE=postgres");
        }

        let defaults = PasswordConfig::default();
        let password = PasswordConfig {
            memory_kib: env_parse("HASH_MEMORY_KIB", defaults.memory_kib)?,
            iterations: env_parse("HASH_ITERATIONS", defaults.iterations)?,
            parallelism: env_parse("HASH_PARALLELISM", defaults.parallelism)?,
        };

        Ok(Self {
            store,
            database_url,
            max_connections: env_parse("DB_MAX_CONNECTIONS", 10)?,
            host: std::env::var("APP_HOST").unwrap_or_else(|_| "0.0.0.0".into()),
            port: env_parse("APP_PORT", 8080)?,
            password,
        })
    }

    /// Config for tests and local runs without a database.
    pub fn in_memory() -> Self {
        Self {
            store: StoreKind::Memory,
            database_url: None,
            max_connections: 1,
            host: "127.0.0.1".into(),
            port: 0,
            // Minimum argon2 cost; keeps hashing fast under test.
            password: PasswordConfig {
                memory_kib: 8,
                iterations: 1,
                parallelism: 1,
            },
        }
    }
}

/// Unset falls back to `default`; a set but unparsable value is an error.
fn env_parse<T>(key: &str, default: T) -> anyhow::Result<T>
where
    T: std::str::FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match std::env::var(key) {
        Ok(raw) => raw
            .trim()
            .parse::<T>()
            .with_context(|| format!("{key} must be a number, got {raw:?}")),
        Err(_) => Ok(default),
    }
}
