use anyhow::{Context, Result};
use serde::Deserialize;
use std::time::Duration;

/// Which order/catalog store the application runs against.
#[derive(Debug, Clone, Copy, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum StoreBackend {
    /// PostgreSQL through a deadpool connection pool.
    Postgres,
    /// In-process store; data is lost on restart. Meant for local development.
    Memory,
}

/// `AppConfig` holds all configuration parameters required by the application.
///
/// The configuration is loaded from environment variables (optionally via a `.env` file)
/// or uses default values if the variable is not set. Every component receives the
/// values it needs from this struct; nothing reads the environment on its own.
#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct AppConfig {
    // --- Storage ---
    /// Store implementation to use (`postgres` or `memory`).
    pub store_backend: StoreBackend,
    /// Database hostname or service name (e.g. "postgres" in Docker Compose, "localhost" for local runs).
    pub db_host: String,
    /// Database port (default: 5432).
    pub db_port: u16,
    /// Database user.
    pub db_user: String,
    /// Database password.
    pub db_password: String,
    /// Database name.
    pub db_name: String,
    /// Maximum number of pooled connections.
    pub db_pool_size: usize,
    /// Directory with `.sql` migration files, applied in file-name order.
    pub migrations_dir: String,

    // --- HTTP server ---
    /// The port on which the HTTP server will listen.
    pub http_port: u16,
    /// Graceful shutdown timeout (human-friendly format, e.g. "5s", "1m").
    #[serde(deserialize_with = "deserialize_duration")]
    pub shutdown_timeout: Duration,
    /// Shared password for admin-only endpoints. Admin endpoints are closed when unset.
    pub admin_password: Option<String>,

    // --- Telegram notifications ---
    /// Bot token used to call the Telegram Bot API. Notifications are disabled when unset.
    pub bot_token: Option<String>,
    /// Chat that receives new-order notifications.
    pub admin_chat_id: Option<i64>,
    /// Base URL of the Bot API.
    pub telegram_api_base: String,
    /// Timeout for a single notification request.
    #[serde(deserialize_with = "deserialize_duration")]
    pub notify_timeout: Duration,
    /// Also send an acknowledgement to the customer's own chat.
    pub notify_customer: bool,
    /// Suffix appended to formatted amounts.
    pub currency_symbol: String,

    // --- Order rules ---
    /// Reject status changes that the order state machine does not allow.
    pub enforce_status_transitions: bool,
    /// Recompute item and grand totals and reject submissions that disagree.
    pub verify_totals: bool,
}

/// Custom deserializer for durations.
/// Accepts human-readable formats like "5s", "1m", etc.
fn deserialize_duration<'de, D>(deserializer: D) -> Result<Duration, D::Error>
where
    D: serde::Deserializer<'de>,
{
    use serde::de::Error;
    let val = String::deserialize(deserializer)?;
    humantime::parse_duration(&val)
        .map_err(|e| D::Error::custom(format!("Invalid duration '{val}': {e}")))
}

impl AppConfig {
    /// Loads configuration from environment variables (and optionally from `.env` file).
    ///
    /// Fields not set via env will be filled with default values. Variable names are
    /// the upper-cased field names, e.g. `DB_HOST`, `BOT_TOKEN`, `STORE_BACKEND`.
    ///
    /// # Errors
    /// Returns an error if environment variables are invalid or missing required values.
    pub fn load() -> Result<Self> {
        dotenvy::dotenv().ok();

        let settings = Self::defaults()?
            .add_source(config::Environment::default().try_parsing(true))
            .build()?;

        settings
            .try_deserialize()
            .context("Failed to load configuration")
    }

    /// Builds the configuration from defaults plus explicit overrides, ignoring the
    /// process environment.
    pub fn from_overrides(overrides: &[(&str, &str)]) -> Result<Self> {
        let mut builder = Self::defaults()?;
        for (key, value) in overrides {
            builder = builder.set_override(*key, *value)?;
        }
        builder
            .build()?
            .try_deserialize()
            .context("Failed to load configuration")
    }

    fn defaults() -> Result<config::ConfigBuilder<config::builder::DefaultState>> {
        Ok(config::Config::builder()
            // Storage
            .set_default("store_backend", "postgres")?
            .set_default("db_host", "localhost")?
            .set_default("db_port", 5432)?
            .set_default("db_user", "flowers_user")?
            .set_default("db_password", "securepassword")?
            .set_default("db_name", "flowers")?
            .set_default("db_pool_size", 16)?
            .set_default("migrations_dir", "migrations")?
            // HTTP
            .set_default("http_port", 8000)?
            .set_default("shutdown_timeout", "5s")?
            // Telegram
            .set_default("telegram_api_base", "https://api.telegram.org")?
            .set_default("notify_timeout", "10s")?
            .set_default("notify_customer", false)?
            .set_default("currency_symbol", "₫")?
            // Order rules
            .set_default("enforce_status_transitions", true)?
            .set_default("verify_totals", false)?)
    }

    /// Connection string in the key/value form understood by `tokio_postgres`.
    pub fn postgres_dsn(&self) -> String {
        format!(
            "host={} port={} user={} password={} dbname={} sslmode=disable",
            self.db_host, self.db_port, self.db_user, self.db_password, self.db_name
        )
    }

    /// Both the token and the target chat are needed to notify the operator.
    pub fn telegram_enabled(&self) -> bool {
        self.bot_token.as_deref().is_some_and(|t| !t.is_empty()) && self.admin_chat_id.is_some()
    }
}
