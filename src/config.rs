//! Application configuration module
//! Handles environment variable loading, configuration validation, and application settings

use std::env;
use std::time::Duration;

/// Main application configuration
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub cache: CacheConfig,
    pub logging: LoggingConfig,
    pub gateway: GatewayConfig,
    pub app_store: AppStoreConfig,
    pub play_store: PlayStoreConfig,
    pub ledger: LedgerConfig,
    pub reconcile: ReconcileConfig,
}

/// Server configuration
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

/// Redis configuration for the lock and attach stores
#[derive(Debug, Clone)]
pub struct CacheConfig {
    pub redis_url: String,
    pub max_connections: u32,
    pub lock_ttl: u64,   // seconds
    pub attach_ttl: u64, // seconds
}

/// Logging configuration
#[derive(Debug, Clone)]
pub struct LoggingConfig {
    pub level: String,
    pub format: LogFormat,
}

/// Log format options
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LogFormat {
    Json,
    Plain,
}

/// Settings shared by every gateway adapter
#[derive(Debug, Clone)]
pub struct GatewayConfig {
    pub http_timeout: u64, // seconds
    pub verify_max_attempts: u32,
}

/// App Store receipt validation
#[derive(Debug, Clone)]
pub struct AppStoreConfig {
    pub bundle_id: String,
    pub shared_secret: String,
    pub production_url: String,
    pub sandbox_url: String,
}

/// Paths of the publisher API relay
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PublisherApis {
    pub verify_subscription: String,
    pub ack_subscription: String,
    pub verify_product: String,
    pub ack_product: String,
}

/// Google Play publisher access
#[derive(Debug, Clone)]
pub struct PlayStoreConfig {
    pub package_name: String,
    pub publisher_endpoint: String,
    pub publisher_token: Option<String>,
    pub publisher_apis: PublisherApis,
}

/// External order ledger
#[derive(Debug, Clone)]
pub struct LedgerConfig {
    pub base_url: String,
    pub api_token: Option<String>,
}

/// Which implementation backs a reconciliation store
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreBackend {
    Redis,
    Memory,
    Noop,
}

#[derive(Debug, Clone)]
pub struct ReconcileConfig {
    pub locker: StoreBackend,
    pub attach_store: StoreBackend,
}

impl AppConfig {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self, ConfigError> {
        // Load .env file if it exists
        let _ = dotenv::dotenv().ok();

        Ok(AppConfig {
            server: ServerConfig::from_env()?,
            cache: CacheConfig::from_env()?,
            logging: LoggingConfig::from_env()?,
            gateway: GatewayConfig::from_env()?,
            app_store: AppStoreConfig::from_env()?,
            play_store: PlayStoreConfig::from_env()?,
            ledger: LedgerConfig::from_env()?,
            reconcile: ReconcileConfig::from_env()?,
        })
    }

    /// Validate the entire configuration
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.server.validate()?;
        self.logging.validate()?;
        self.gateway.validate()?;
        self.app_store.validate()?;
        self.play_store.validate()?;
        self.ledger.validate()?;
        if self.reconcile.uses_redis() {
            if cfg!(not(feature = "cache")) {
                return Err(ConfigError::ValidationFailed(
                    "redis-backed stores require the `cache` feature".to_string(),
                ));
            }
            self.cache.validate()?;
        }

        Ok(())
    }
}

fn parse_var<T: std::str::FromStr>(name: &str, default: &str) -> Result<T, ConfigError> {
    env::var(name)
        .unwrap_or_else(|_| default.to_string())
        .parse()
        .map_err(|_| ConfigError::InvalidValue(name.to_string()))
}

fn require_url(name: &str, value: &str) -> Result<(), ConfigError> {
    if !value.starts_with("http://") && !value.starts_with("https://") {
        return Err(ConfigError::InvalidValue(format!(
            "{} must be a valid URL",
            name
        )));
    }
    Ok(())
}

impl ServerConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Ok(ServerConfig {
            host: env::var("SERVER_HOST").unwrap_or_else(|_| "127.0.0.1".to_string()),
            port: parse_var("SERVER_PORT", "8000")?,
        })
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.port == 0 {
            return Err(ConfigError::InvalidValue(
                "SERVER_PORT cannot be 0".to_string(),
            ));
        }

        if self.host.is_empty() {
            return Err(ConfigError::InvalidValue(
                "SERVER_HOST cannot be empty".to_string(),
            ));
        }

        Ok(())
    }
}

impl CacheConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Ok(CacheConfig {
            redis_url: env::var("REDIS_URL")
                .unwrap_or_else(|_| "redis://127.0.0.1:6379".to_string()),
            max_connections: parse_var("CACHE_MAX_CONNECTIONS", "10")?,
            lock_ttl: parse_var("LOCK_TTL_SECS", "30")?,
            attach_ttl: parse_var("ATTACH_TTL_SECS", "604800")?,
        })
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.redis_url.is_empty() {
            return Err(ConfigError::InvalidValue("REDIS_URL".to_string()));
        }

        // Basic validation of Redis URL format
        if !self.redis_url.starts_with("redis://") && !self.redis_url.starts_with("rediss://") {
            return Err(ConfigError::InvalidValue(
                "REDIS_URL must start with redis:// or rediss://".to_string(),
            ));
        }

        if self.max_connections == 0 {
            return Err(ConfigError::InvalidValue(
                "CACHE_MAX_CONNECTIONS".to_string(),
            ));
        }

        if self.lock_ttl == 0 {
            return Err(ConfigError::InvalidValue("LOCK_TTL_SECS".to_string()));
        }

        Ok(())
    }

    pub fn lock_ttl(&self) -> Duration {
        Duration::from_secs(self.lock_ttl)
    }

    pub fn attach_ttl(&self) -> Duration {
        Duration::from_secs(self.attach_ttl)
    }
}

impl LoggingConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Ok(LoggingConfig {
            level: env::var("LOG_LEVEL").unwrap_or_else(|_| "INFO".to_string()),
            format: match env::var("LOG_FORMAT")
                .unwrap_or_else(|_| "plain".to_string())
                .as_str()
            {
                "json" => LogFormat::Json,
                _ => LogFormat::Plain,
            },
        })
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let valid_levels = ["TRACE", "DEBUG", "INFO", "WARN", "ERROR"];
        if !valid_levels.contains(&self.level.to_uppercase().as_str()) {
            return Err(ConfigError::InvalidValue("LOG_LEVEL".to_string()));
        }

        Ok(())
    }
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            http_timeout: 10,
            verify_max_attempts: 3,
        }
    }
}

impl GatewayConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Ok(GatewayConfig {
            http_timeout: parse_var("GATEWAY_HTTP_TIMEOUT", "10")?,
            verify_max_attempts: parse_var("VERIFY_MAX_ATTEMPTS", "3")?,
        })
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.http_timeout == 0 {
            return Err(ConfigError::InvalidValue(
                "GATEWAY_HTTP_TIMEOUT".to_string(),
            ));
        }

        if self.verify_max_attempts == 0 {
            return Err(ConfigError::InvalidValue(
                "VERIFY_MAX_ATTEMPTS must be >= 1".to_string(),
            ));
        }

        Ok(())
    }

    pub fn http_timeout(&self) -> Duration {
        Duration::from_secs(self.http_timeout)
    }
}

impl AppStoreConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Ok(AppStoreConfig {
            bundle_id: env::var("APPSTORE_BUNDLE_ID")
                .map_err(|_| ConfigError::MissingVariable("APPSTORE_BUNDLE_ID".to_string()))?,
            shared_secret: env::var("APPSTORE_SHARED_SECRET").map_err(|_| {
                ConfigError::MissingVariable("APPSTORE_SHARED_SECRET".to_string())
            })?,
            production_url: env::var("APPSTORE_VERIFY_URL")
                .unwrap_or_else(|_| "https://buy.itunes.apple.com/verifyReceipt".to_string()),
            sandbox_url: env::var("APPSTORE_SANDBOX_VERIFY_URL").unwrap_or_else(|_| {
                "https://sandbox.itunes.apple.com/verifyReceipt".to_string()
            }),
        })
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.bundle_id.is_empty() {
            return Err(ConfigError::InvalidValue("APPSTORE_BUNDLE_ID".to_string()));
        }

        if self.shared_secret.is_empty() {
            return Err(ConfigError::InvalidValue(
                "APPSTORE_SHARED_SECRET".to_string(),
            ));
        }

        require_url("APPSTORE_VERIFY_URL", &self.production_url)?;
        require_url("APPSTORE_SANDBOX_VERIFY_URL", &self.sandbox_url)
    }
}

impl Default for PublisherApis {
    fn default() -> Self {
        Self {
            verify_subscription: "/google/iap/verifySubscription".to_string(),
            ack_subscription: "/google/iap/ackSubscription".to_string(),
            verify_product: "/google/iap/verifyProduct".to_string(),
            ack_product: "/google/iap/ackProduct".to_string(),
        }
    }
}

impl PlayStoreConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        let defaults = PublisherApis::default();
        Ok(PlayStoreConfig {
            package_name: env::var("PLAYSTORE_PACKAGE_NAME").map_err(|_| {
                ConfigError::MissingVariable("PLAYSTORE_PACKAGE_NAME".to_string())
            })?,
            publisher_endpoint: env::var("PLAYSTORE_PUBLISHER_ENDPOINT").map_err(|_| {
                ConfigError::MissingVariable("PLAYSTORE_PUBLISHER_ENDPOINT".to_string())
            })?,
            publisher_token: env::var("PLAYSTORE_PUBLISHER_TOKEN").ok(),
            publisher_apis: PublisherApis {
                verify_subscription: env::var("PLAYSTORE_VERIFY_SUBSCRIPTION_PATH")
                    .unwrap_or(defaults.verify_subscription),
                ack_subscription: env::var("PLAYSTORE_ACK_SUBSCRIPTION_PATH")
                    .unwrap_or(defaults.ack_subscription),
                verify_product: env::var("PLAYSTORE_VERIFY_PRODUCT_PATH")
                    .unwrap_or(defaults.verify_product),
                ack_product: env::var("PLAYSTORE_ACK_PRODUCT_PATH")
                    .unwrap_or(defaults.ack_product),
            },
        })
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.package_name.is_empty() {
            return Err(ConfigError::InvalidValue(
                "PLAYSTORE_PACKAGE_NAME".to_string(),
            ));
        }

        require_url("PLAYSTORE_PUBLISHER_ENDPOINT", &self.publisher_endpoint)?;

        let apis = &self.publisher_apis;
        for path in [
            &apis.verify_subscription,
            &apis.ack_subscription,
            &apis.verify_product,
            &apis.ack_product,
        ] {
            if !path.starts_with('/') {
                return Err(ConfigError::InvalidValue(format!(
                    "publisher API path {:?} must start with '/'",
                    path
                )));
            }
        }

        Ok(())
    }
}

impl LedgerConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Ok(LedgerConfig {
            base_url: env::var("LEDGER_BASE_URL")
                .map_err(|_| ConfigError::MissingVariable("LEDGER_BASE_URL".to_string()))?,
            api_token: env::var("LEDGER_API_TOKEN").ok(),
        })
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        require_url("LEDGER_BASE_URL", &self.base_url)
    }
}

impl std::str::FromStr for StoreBackend {
    type Err = ConfigError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_lowercase().as_str() {
            "redis" => Ok(StoreBackend::Redis),
            "memory" => Ok(StoreBackend::Memory),
            "noop" | "none" => Ok(StoreBackend::Noop),
            other => Err(ConfigError::InvalidValue(format!(
                "unknown store backend: {}",
                other
            ))),
        }
    }
}

impl ReconcileConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Ok(ReconcileConfig {
            locker: parse_var("LOCKER_BACKEND", "redis")?,
            attach_store: parse_var("ATTACH_STORE_BACKEND", "redis")?,
        })
    }

    pub fn uses_redis(&self) -> bool {
        self.locker == StoreBackend::Redis || self.attach_store == StoreBackend::Redis
    }
}

/// Configuration error types
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing environment variable: {0}")]
    MissingVariable(String),

    #[error("Invalid value for configuration: {0}")]
    InvalidValue(String),

    #[error("Validation failed: {0}")]
    ValidationFailed(String),
}
