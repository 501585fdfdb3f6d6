use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;
use std::env;
use std::path::Path;
use tracing::info;
use validator::Validate;

const CONFIG_DIR: &str = "config";
const DEFAULT_ENV: &str = "development";
const DEFAULT_LOG_LEVEL: &str = "info";

#[derive(Debug, thiserror::Error)]
pub enum AppConfigError {
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("invalid configuration: {0}")]
    Validation(String),
}

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct AppConfig {
    /// Database connection URL
    pub database_url: String,

    /// Server host address
    pub host: String,

    /// Server port
    #[validate(range(min = 1024, max = 65535))]
    #[serde(default = "default_port")]
    pub port: u16,

    /// Application environment (development / production)
    pub environment: String,

    /// Logging level
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Log in JSON format (structured logging)
    #[serde(default)]
    pub log_json: bool,

    /// Run database migrations on startup
    #[serde(default = "default_true")]
    pub auto_migrate: bool,

    /// Base URL of the storefront client, used for gateway redirect targets
    pub client_url: String,

    /// Secret API key for the payment gateway. No default: it must be
    /// provided via config file or APP__STRIPE_SECRET_KEY.
    pub stripe_secret_key: String,

    /// Payment gateway API base URL (override for tests)
    #[serde(default = "default_stripe_api_base")]
    pub stripe_api_base: String,

    /// ISO currency code used for checkout line items
    #[serde(default = "default_currency")]
    pub currency: String,

    /// Maximum database connections in the pool
    #[serde(default = "default_db_max_connections")]
    pub db_max_connections: u32,

    /// Per-request timeout in seconds
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,

    /// Comma-separated list of allowed CORS origins
    #[serde(default)]
    pub cors_allowed_origins: Option<String>,
}

fn default_port() -> u16 {
    8080
}

fn default_log_level() -> String {
    DEFAULT_LOG_LEVEL.to_string()
}

fn default_true() -> bool {
    true
}

fn default_stripe_api_base() -> String {
    "https://api.stripe.com".to_string()
}

fn default_currency() -> String {
    "usd".to_string()
}

fn default_db_max_connections() -> u32 {
    10
}

fn default_request_timeout() -> u64 {
    30
}

impl AppConfig {
    pub fn log_level(&self) -> &str {
        &self.log_level
    }

    pub fn is_development(&self) -> bool {
        self.environment.eq_ignore_ascii_case("development")
            || self.environment.eq_ignore_ascii_case("dev")
    }
}

/// Loads the application configuration.
///
/// Sources, in order of precedence: built-in defaults, `config/default`,
/// `config/{RUN_ENV}`, then `APP__*` environment variables.
pub fn load_config() -> Result<AppConfig, AppConfigError> {
    let run_env = env::var("RUN_ENV")
        .or_else(|_| env::var("APP_ENV"))
        .unwrap_or_else(|_| DEFAULT_ENV.to_string());
    info!("Loading configuration for environment: {}", run_env);

    if !Path::new(CONFIG_DIR).exists() {
        info!(
            "Config directory '{}' not found; relying on built-in defaults and environment variables",
            CONFIG_DIR
        );
    }

    // NOTE: stripe_secret_key has no default - it MUST be provided via
    // environment variable or config file.
    let builder = Config::builder()
        .set_default("database_url", "sqlite://storefront.db?mode=rwc")?
        .set_default("host", "0.0.0.0")?
        .set_default("port", 8080)?
        .set_default("environment", DEFAULT_ENV)?
        .set_default("log_level", DEFAULT_LOG_LEVEL)?
        .set_default("log_json", false)?
        .set_default("client_url", "http://localhost:5173")?
        .add_source(File::with_name(&format!("{}/default", CONFIG_DIR)).required(false))
        .add_source(File::with_name(&format!("{}/{}", CONFIG_DIR, run_env)).required(false));

    let config = builder
        .add_source(Environment::with_prefix("APP").separator("__"))
        .build()?;

    // Check before deserialization to give a clear error message.
    if config.get_string("stripe_secret_key").is_err() {
        return Err(AppConfigError::Validation(
            "stripe_secret_key is required: set APP__STRIPE_SECRET_KEY or add it to a config file"
                .to_string(),
        ));
    }

    let cfg: AppConfig = config.try_deserialize()?;
    cfg.validate()
        .map_err(|e| AppConfigError::Validation(e.to_string()))?;

    Ok(cfg)
}

/// Initializes the global tracing subscriber.
pub fn init_tracing(level: &str, json: bool) {
    use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

    let default_directive = format!("storefront_api={},tower_http=info", level);
    let filter = env::var("RUST_LOG")
        .ok()
        .filter(|s| !s.trim().is_empty())
        .map(EnvFilter::new)
        .unwrap_or_else(|| EnvFilter::new(default_directive));

    if json {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().json())
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer())
            .init();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base_config() -> AppConfig {
        AppConfig {
            database_url: "sqlite::memory:".into(),
            host: "127.0.0.1".into(),
            port: 8080,
            environment: "development".into(),
            log_level: "info".into(),
            log_json: false,
            auto_migrate: true,
            client_url: "http://localhost:5173".into(),
            stripe_secret_key: "sk_test_123".into(),
            stripe_api_base: default_stripe_api_base(),
            currency: default_currency(),
            db_max_connections: 10,
            request_timeout_secs: 30,
            cors_allowed_origins: None,
        }
    }

    #[test]
    fn development_detection() {
        let mut cfg = base_config();
        assert!(cfg.is_development());
        cfg.environment = "production".into();
        assert!(!cfg.is_development());
    }

    #[test]
    fn port_range_is_validated() {
        let mut cfg = base_config();
        cfg.port = 80;
        assert!(cfg.validate().is_err());
        cfg.port = 8081;
        assert!(cfg.validate().is_ok());
    }
}
