use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;
use std::env;
use std::path::Path;
use thiserror::Error;
use tracing::{error, info};
use validator::{Validate, ValidationError, ValidationErrors};

const DEFAULT_LOG_LEVEL: &str = "info";
const DEFAULT_ENV: &str = "development";
const DEFAULT_PORT: u16 = 8080;
const CONFIG_DIR: &str = "config";
const DEFAULT_STRIPE_API_BASE: &str = "https://api.stripe.com";
const DEFAULT_ANALYTICS_ENDPOINT: &str = "https://www.google-analytics.com";
const DEFAULT_ORIGIN: &str = "http://localhost:3000";

/// How many tickets a completed checkout session materializes.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum TicketIssuance {
    /// One ticket per purchased unit, recovered from session metadata.
    PerUnit,
    /// One ticket per completed session regardless of quantity.
    PerOrder,
}

impl Default for TicketIssuance {
    fn default() -> Self {
        TicketIssuance::PerUnit
    }
}

/// Application configuration with validation.
#[derive(Clone, Debug, Deserialize, Validate)]
#[serde(deny_unknown_fields)]
pub struct AppConfig {
    /// Database connection URL
    pub database_url: String,

    /// Server host address
    pub host: String,

    /// Server port
    #[serde(default = "default_port")]
    pub port: u16,

    /// Application environment
    pub environment: String,

    /// Logging level
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Log in JSON format (structured logging)
    #[serde(default)]
    pub log_json: bool,

    /// Whether to run database migrations on startup
    #[serde(default)]
    pub auto_migrate: bool,

    /// CORS: comma-separated list of allowed origins (production)
    #[serde(default)]
    pub cors_allowed_origins: Option<String>,

    /// Allow permissive CORS fallback outside development
    #[serde(default)]
    pub cors_allow_any_origin: bool,

    /// DB pool: max connections
    #[serde(default = "default_db_max_connections")]
    pub db_max_connections: u32,

    /// DB pool: min connections
    #[serde(default = "default_db_min_connections")]
    pub db_min_connections: u32,

    /// DB timeouts (seconds)
    #[serde(default = "default_db_connect_timeout_secs")]
    pub db_connect_timeout_secs: u64,
    #[serde(default = "default_db_idle_timeout_secs")]
    pub db_idle_timeout_secs: u64,
    #[serde(default = "default_db_acquire_timeout_secs")]
    pub db_acquire_timeout_secs: u64,

    /// Payment provider secret key. Required; startup fails without it.
    #[validate(length(min = 1))]
    pub stripe_secret_key: String,

    /// Webhook signing secret. Required; startup fails without it.
    #[validate(length(min = 1))]
    pub stripe_webhook_secret: String,

    /// Payment provider API base URL (overridable for tests)
    #[serde(default = "default_stripe_api_base")]
    pub stripe_api_base: String,

    /// Webhook signature timestamp tolerance (seconds)
    #[serde(default = "default_webhook_tolerance_secs")]
    pub stripe_webhook_tolerance_secs: u64,

    /// Redirect base when the request carries no Origin header
    #[serde(default = "default_origin")]
    pub default_origin: String,

    /// Upper bound on tickets per checkout request
    #[serde(default = "default_max_quantity")]
    #[validate(custom = "validate_max_quantity")]
    pub max_quantity_per_order: u32,

    /// Ticket cardinality for fulfillment ("per-unit" or "per-order")
    #[serde(default)]
    pub ticket_issuance: TicketIssuance,

    /// Analytics collection endpoint base URL
    #[serde(default = "default_analytics_endpoint")]
    pub analytics_endpoint: String,

    /// Analytics measurement id; emitter is disabled when unset
    #[serde(default)]
    pub analytics_measurement_id: Option<String>,

    /// Analytics API secret; emitter is disabled when unset
    #[serde(default)]
    pub analytics_api_secret: Option<String>,

    /// Event channel capacity for async event processing
    #[serde(default = "default_event_channel_capacity")]
    pub event_channel_capacity: usize,
}

impl AppConfig {
    /// Creates a configuration with explicit core settings; used by tests.
    pub fn new(
        database_url: String,
        host: String,
        port: u16,
        environment: String,
        stripe_secret_key: String,
        stripe_webhook_secret: String,
    ) -> Self {
        Self {
            database_url,
            host,
            port,
            environment,
            log_level: default_log_level(),
            log_json: false,
            auto_migrate: false,
            cors_allowed_origins: None,
            cors_allow_any_origin: false,
            db_max_connections: default_db_max_connections(),
            db_min_connections: default_db_min_connections(),
            db_connect_timeout_secs: default_db_connect_timeout_secs(),
            db_idle_timeout_secs: default_db_idle_timeout_secs(),
            db_acquire_timeout_secs: default_db_acquire_timeout_secs(),
            stripe_secret_key,
            stripe_webhook_secret,
            stripe_api_base: default_stripe_api_base(),
            stripe_webhook_tolerance_secs: default_webhook_tolerance_secs(),
            default_origin: default_origin(),
            max_quantity_per_order: default_max_quantity(),
            ticket_issuance: TicketIssuance::default(),
            analytics_endpoint: default_analytics_endpoint(),
            analytics_measurement_id: None,
            analytics_api_secret: None,
            event_channel_capacity: default_event_channel_capacity(),
        }
    }

    pub fn database_url(&self) -> &str {
        &self.database_url
    }

    pub fn log_level(&self) -> &str {
        &self.log_level
    }

    pub fn is_production(&self) -> bool {
        self.environment.eq_ignore_ascii_case("production")
    }

    pub fn is_development(&self) -> bool {
        self.environment.eq_ignore_ascii_case("development")
    }

    /// Returns true if explicit CORS origins are configured
    pub fn has_cors_allowed_origins(&self) -> bool {
        self.cors_allowed_origins
            .as_ref()
            .map(|raw| raw.split(',').any(|origin| !origin.trim().is_empty()))
            .unwrap_or(false)
    }

    /// Whether we should fall back to permissive CORS
    pub fn should_allow_permissive_cors(&self) -> bool {
        self.is_development() || self.cors_allow_any_origin
    }

    /// Analytics credentials when the emitter is enabled.
    pub fn analytics_credentials(&self) -> Option<(String, String)> {
        match (&self.analytics_measurement_id, &self.analytics_api_secret) {
            (Some(id), Some(secret)) if !id.is_empty() && !secret.is_empty() => {
                Some((id.clone(), secret.clone()))
            }
            _ => None,
        }
    }

    fn validate_additional_constraints(&self) -> Result<(), ValidationErrors> {
        let mut errors = ValidationErrors::new();

        if !self.should_allow_permissive_cors() && !self.has_cors_allowed_origins() {
            let mut err = ValidationError::new("cors_allowed_origins_required");
            err.message = Some(
                "Set APP__CORS_ALLOWED_ORIGINS for non-development environments or explicitly opt-in via APP__CORS_ALLOW_ANY_ORIGIN=true".into(),
            );
            errors.add("cors_allowed_origins", err);
        }

        if self.is_production() && self.stripe_secret_key.starts_with("sk_test_") {
            let mut err = ValidationError::new("stripe_secret_key_test_mode");
            err.message =
                Some("A test-mode provider key must not be used in production".into());
            errors.add("stripe_secret_key", err);
        }

        if errors.errors().is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }
}

/// Configuration loading errors
#[derive(Debug, Error)]
pub enum AppConfigError {
    #[error("Configuration loading failed: {0}")]
    Load(#[from] ConfigError),

    #[error("Configuration validation failed: {0}")]
    Validation(#[from] validator::ValidationErrors),
}

fn default_log_level() -> String {
    DEFAULT_LOG_LEVEL.to_string()
}

fn default_port() -> u16 {
    DEFAULT_PORT
}

fn default_db_max_connections() -> u32 {
    16
}
fn default_db_min_connections() -> u32 {
    2
}
fn default_db_connect_timeout_secs() -> u64 {
    30
}
fn default_db_idle_timeout_secs() -> u64 {
    600
}
fn default_db_acquire_timeout_secs() -> u64 {
    8
}

fn default_stripe_api_base() -> String {
    DEFAULT_STRIPE_API_BASE.to_string()
}

fn default_webhook_tolerance_secs() -> u64 {
    300
}

fn default_origin() -> String {
    DEFAULT_ORIGIN.to_string()
}

fn default_max_quantity() -> u32 {
    10
}

fn default_analytics_endpoint() -> String {
    DEFAULT_ANALYTICS_ENDPOINT.to_string()
}

fn default_event_channel_capacity() -> usize {
    1024
}

fn validate_max_quantity(value: u32) -> Result<(), ValidationError> {
    if value == 0 {
        let mut err = ValidationError::new("max_quantity_per_order");
        err.message = Some("max_quantity_per_order must be greater than 0".into());
        return Err(err);
    }
    Ok(())
}

/// Initializes tracing using the provided log level as the default filter
pub fn init_tracing(level: &str, json: bool) {
    use tracing_subscriber::fmt;

    let default_directive = format!("kyrat_api={},tower_http=debug", level);
    let filter_directive = env::var("RUST_LOG")
        .ok()
        .filter(|s| !s.trim().is_empty())
        .unwrap_or(default_directive);

    if json {
        let _ = fmt().with_env_filter(filter_directive).json().try_init();
    } else {
        let _ = fmt().with_env_filter(filter_directive).try_init();
    }
}

/// Loads application configuration
///
/// Layers configuration sources in this order:
/// 1. Default config (config/default.toml)
/// 2. Environment-specific config (config/{env}.toml)
/// 3. Environment variables (APP__*)
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

    // NOTE: the provider secrets have no defaults - they MUST be provided via
    // environment variable or config file. Defaulting to an empty string
    // would silently accept every webhook signature check failure path.
    let builder = Config::builder()
        .set_default("database_url", "sqlite://kyrat.db?mode=rwc")?
        .set_default("host", "0.0.0.0")?
        .set_default("port", DEFAULT_PORT as i64)?
        .set_default("environment", DEFAULT_ENV)?
        .set_default("log_level", DEFAULT_LOG_LEVEL)?
        .set_default("log_json", false)?
        .add_source(File::with_name(&format!("{}/default", CONFIG_DIR)).required(false))
        .add_source(File::with_name(&format!("{}/{}", CONFIG_DIR, run_env)).required(false));

    let config = builder
        .add_source(Environment::with_prefix("APP").separator("__"))
        .build()?;

    for key in ["stripe_secret_key", "stripe_webhook_secret"] {
        if config.get_string(key).is_err() {
            error!(
                "{} is not configured. Set APP__{} before starting the server.",
                key,
                key.to_uppercase()
            );
            return Err(AppConfigError::Load(ConfigError::NotFound(format!(
                "{key} is required but not configured"
            ))));
        }
    }

    let app_config: AppConfig = config.try_deserialize()?;

    app_config.validate().map_err(|e| {
        error!("Configuration validation failed: {:?}", e);
        AppConfigError::Validation(e)
    })?;

    app_config.validate_additional_constraints().map_err(|e| {
        error!("Configuration security validation failed: {:?}", e);
        AppConfigError::Validation(e)
    })?;

    info!("Configuration loaded successfully");
    Ok(app_config)
}
