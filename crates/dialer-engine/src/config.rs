use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{DialerError, Result};

/// Dialer engine configuration
///
/// # Configuration Sections
///
/// - [`database`]: SQLite location and pool sizing
/// - [`queue`]: assignment retry budget and defaults for new lists
/// - [`population`]: dynamic refresh scheduling and phone field lookup
/// - [`api`]: HTTP bind address
/// - [`logging`]: tracing filter and output format
///
/// Values are layered by [`DialerConfig::load`]: built-in defaults, then an
/// optional TOML file, then `DIALER__SECTION__KEY` environment variables.
///
/// ```
/// use dialer_engine::config::DialerConfig;
///
/// let config = DialerConfig::default();
/// assert_eq!(config.queue.max_claim_retries, 3);
/// config.validate().expect("defaults are valid");
/// ```
///
/// [`database`]: DatabaseConfig
/// [`queue`]: QueueConfig
/// [`population`]: PopulationConfig
/// [`api`]: ApiConfig
/// [`logging`]: LoggingConfig
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct DialerConfig {
    pub database: DatabaseConfig,
    pub queue: QueueConfig,
    pub population: PopulationConfig,
    pub api: ApiConfig,
    pub logging: LoggingConfig,
}

/// Database configuration for persistent storage
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    /// sqlx connection URL, `sqlite::memory:` for an ephemeral store
    pub database_url: String,

    /// Maximum number of pooled connections (file databases only)
    pub max_connections: u32,

    /// How long a writer waits on a locked database, in seconds
    pub busy_timeout_secs: u64,
}

/// Queue assignment configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct QueueConfig {
    /// Compare-and-swap attempts before `get_next` reports no item
    pub max_claim_retries: u32,

    /// Attempt limit applied to lists created without one
    pub default_max_attempts: i32,

    /// Retry interval applied to lists created without one
    pub default_cadence_hours: Option<i32>,
}

/// List population configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PopulationConfig {
    /// Interval for refreshing every active dynamic list; 0 disables it
    pub refresh_interval_secs: u64,

    /// Record fields checked, in order, for a dialable phone number
    pub phone_fields: Vec<String>,
}

/// HTTP API configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ApiConfig {
    pub bind_address: String,
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// `EnvFilter` directive used when `RUST_LOG` is unset
    pub filter: String,

    /// Emit JSON lines instead of human-readable output
    pub json: bool,
}

impl DialerConfig {
    /// Load configuration from defaults, an optional file and the environment
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut builder = config::Config::builder()
            .add_source(config::Config::try_from(&DialerConfig::default())?);

        if let Some(path) = path {
            builder = builder.add_source(config::File::from(path).required(true));
        }

        let loaded: DialerConfig = builder
            .add_source(
                config::Environment::with_prefix("DIALER")
                    .prefix_separator("__")
                    .separator("__")
                    .list_separator(",")
                    .with_list_parse_key("population.phone_fields")
                    .try_parsing(true),
            )
            .build()?
            .try_deserialize()?;

        loaded.validate()?;
        Ok(loaded)
    }

    /// Validate cross-field constraints
    pub fn validate(&self) -> Result<()> {
        if self.database.database_url.is_empty() {
            return Err(DialerError::configuration("database_url cannot be empty"));
        }
        if self.database.max_connections == 0 {
            return Err(DialerError::configuration("max_connections must be greater than 0"));
        }
        if self.queue.max_claim_retries == 0 {
            return Err(DialerError::configuration("max_claim_retries must be greater than 0"));
        }
        if self.queue.default_max_attempts <= 0 {
            return Err(DialerError::configuration("default_max_attempts must be greater than 0"));
        }
        if let Some(hours) = self.queue.default_cadence_hours {
            if hours <= 0 {
                return Err(DialerError::configuration("default_cadence_hours must be positive"));
            }
        }
        if self.population.phone_fields.is_empty() {
            return Err(DialerError::configuration("phone_fields cannot be empty"));
        }
        if self.api.bind_address.parse::<std::net::SocketAddr>().is_err() {
            return Err(DialerError::configuration(format!(
                "invalid bind_address: {}",
                self.api.bind_address
            )));
        }
        Ok(())
    }
}

impl DatabaseConfig {
    pub fn is_in_memory(&self) -> bool {
        self.database_url.contains(":memory:")
    }
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            database_url: "sqlite://dialer.db".to_string(),
            max_connections: 8,
            busy_timeout_secs: 5,
        }
    }
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            max_claim_retries: 3,
            default_max_attempts: 6,
            default_cadence_hours: Some(24),
        }
    }
}

impl Default for PopulationConfig {
    fn default() -> Self {
        Self {
            refresh_interval_secs: 0,
            phone_fields: vec![
                "phone".to_string(),
                "mobile_phone".to_string(),
                "home_phone".to_string(),
                "work_phone".to_string(),
            ],
        }
    }
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            bind_address: "127.0.0.1:8090".to_string(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            filter: "info,dialer_engine=debug".to_string(),
            json: false,
        }
    }
}
