use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::fs;

#[derive(Debug, Default, Deserialize, Serialize)]
pub struct Config {
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    #[serde(default)]
    pub ids: IdConfig,
}

#[derive(Debug, Deserialize, Serialize)]
pub struct ServerConfig {
    pub bind_address: String,
    /// Public URL of this server (e.g., https://chat.example.com).
    pub public_url: Option<String>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0:8090".into(),
            public_url: None,
        }
    }
}

#[derive(Debug, Deserialize, Serialize)]
pub struct DatabaseConfig {
    #[serde(default = "default_database_engine")]
    pub engine: DatabaseEngine,
    pub url: String,
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
    /// Statement timeout in seconds for PostgreSQL connections (0 = disabled).
    #[serde(default)]
    pub statement_timeout_secs: u64,
    /// Idle-in-transaction timeout in seconds for PostgreSQL (0 = disabled).
    #[serde(default)]
    pub idle_in_transaction_timeout_secs: u64,
}

#[derive(Debug, Clone, Copy, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum DatabaseEngine {
    Sqlite,
    Postgres,
}

impl Default for DatabaseEngine {
    fn default() -> Self {
        Self::Sqlite
    }
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            engine: default_database_engine(),
            url: "sqlite://./data/parley.db?mode=rwc".into(),
            max_connections: default_max_connections(),
            statement_timeout_secs: 0,
            idle_in_transaction_timeout_secs: 0,
        }
    }
}

#[derive(Debug, Deserialize, Serialize)]
pub struct IdConfig {
    /// Worker id mixed into generated snowflake ids. Must be unique per
    /// process when several instances share one database.
    #[serde(default = "default_worker_id")]
    pub worker_id: u16,
}

impl Default for IdConfig {
    fn default() -> Self {
        Self {
            worker_id: default_worker_id(),
        }
    }
}

fn default_database_engine() -> DatabaseEngine {
    DatabaseEngine::Sqlite
}

fn default_max_connections() -> u32 {
    10
}

fn default_worker_id() -> u16 {
    1
}

/// Generate a commented config file template with the given values filled in.
fn generate_config_template(config: &Config) -> String {
    format!(
        r#"# Parley Server Configuration
# Generated automatically on first run. Edit as needed.

[server]
bind_address = "{bind_address}"
# Set explicitly for internet-facing deployments:
# public_url = "https://chat.your-marketplace.com"

[database]
engine = "{db_engine}"
url = "{db_url}"
max_connections = {max_connections}
# PostgreSQL session timeouts in seconds (0 = disabled):
# statement_timeout_secs = 30
# idle_in_transaction_timeout_secs = 60

[ids]
# Unique per process when several instances share one database.
worker_id = {worker_id}
"#,
        bind_address = config.server.bind_address,
        db_engine = match config.database.engine {
            DatabaseEngine::Sqlite => "sqlite",
            DatabaseEngine::Postgres => "postgres",
        },
        db_url = config.database.url,
        max_connections = config.database.max_connections,
        worker_id = config.ids.worker_id,
    )
}

impl Config {
    pub fn load(path: &str) -> Result<Self> {
        let mut config = if std::path::Path::new(path).exists() {
            let content = fs::read_to_string(path)?;
            toml::from_str(&content)?
        } else {
            tracing::info!(
                "Config file not found at '{}', generating defaults...",
                path
            );
            let config = Config::default();

            // Ensure parent directory exists
            if let Some(parent) = std::path::Path::new(path).parent() {
                fs::create_dir_all(parent)?;
            }

            fs::write(path, generate_config_template(&config))?;
            tracing::info!("Generated default config at '{}'", path);
            config
        };

        // Environment variable overrides
        if let Ok(value) = std::env::var("PARLEY_BIND_ADDRESS") {
            config.server.bind_address = value;
        }
        if let Ok(value) = std::env::var("PARLEY_PUBLIC_URL") {
            if !value.trim().is_empty() {
                config.server.public_url = Some(value);
            }
        }
        if let Ok(value) = std::env::var("PARLEY_DATABASE_URL") {
            config.database.url = value;
        }
        if let Ok(value) = std::env::var("PARLEY_DATABASE_ENGINE") {
            match value.to_lowercase().as_str() {
                "sqlite" => config.database.engine = DatabaseEngine::Sqlite,
                "postgres" => config.database.engine = DatabaseEngine::Postgres,
                other => {
                    tracing::warn!("Unknown PARLEY_DATABASE_ENGINE '{}', keeping config value", other);
                }
            }
        }
        if let Ok(value) = std::env::var("PARLEY_DATABASE_MAX_CONNECTIONS") {
            if let Ok(parsed) = value.parse::<u32>() {
                config.database.max_connections = parsed.max(1);
            }
        }
        if let Ok(value) = std::env::var("PARLEY_DATABASE_STATEMENT_TIMEOUT_SECS") {
            if let Ok(parsed) = value.parse::<u64>() {
                config.database.statement_timeout_secs = parsed;
            }
        }
        if let Ok(value) = std::env::var("PARLEY_DATABASE_IDLE_IN_TRANSACTION_TIMEOUT_SECS") {
            if let Ok(parsed) = value.parse::<u64>() {
                config.database.idle_in_transaction_timeout_secs = parsed;
            }
        }
        if let Ok(value) = std::env::var("PARLEY_WORKER_ID") {
            if let Ok(parsed) = value.parse::<u16>() {
                config.ids.worker_id = parsed;
            }
        }

        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::{Config, DatabaseConfig, DatabaseEngine};
    use std::sync::Mutex;

    // Config::load reads process-wide env vars, so tests that touch either
    // side of that must not interleave.
    static ENV_LOCK: Mutex<()> = Mutex::new(());

    #[test]
    fn database_defaults_to_sqlite_engine() {
        let db = DatabaseConfig::default();
        assert_eq!(db.engine, DatabaseEngine::Sqlite);
        assert!(db.statement_timeout_secs == 0);
    }

    #[test]
    fn missing_config_file_generates_a_template() {
        let _guard = ENV_LOCK.lock().unwrap_or_else(|p| p.into_inner());
        let temp = tempfile::tempdir().expect("tempdir");
        let config_path = temp.path().join("parley-test.toml");
        let config =
            Config::load(config_path.to_str().expect("config path utf8")).expect("load config");
        assert!(config_path.exists());
        assert_eq!(config.database.engine, DatabaseEngine::Sqlite);

        // The generated template must round-trip through the loader.
        let reloaded =
            Config::load(config_path.to_str().expect("config path utf8")).expect("reload config");
        assert_eq!(reloaded.server.bind_address, config.server.bind_address);
    }

    #[test]
    fn env_override_accepts_postgres_engine() {
        let _guard = ENV_LOCK.lock().unwrap_or_else(|p| p.into_inner());
        let temp = tempfile::tempdir().expect("tempdir");
        let config_path = temp.path().join("parley-env-test.toml");
        std::env::set_var("PARLEY_DATABASE_ENGINE", "postgres");
        let config =
            Config::load(config_path.to_str().expect("config path utf8")).expect("load config");
        std::env::remove_var("PARLEY_DATABASE_ENGINE");
        assert_eq!(config.database.engine, DatabaseEngine::Postgres);
    }
}
