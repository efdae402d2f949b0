use config::{Config, ConfigError, Environment, File};
use rust_decimal::Decimal;
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
const DEV_DEFAULT_JWT_SECRET: &str =
    "this_is_a_development_secret_key_that_is_at_least_64_characters_long_for_testing";

/// Application configuration structure with validation
#[derive(Clone, Debug, Deserialize, Validate)]
#[serde(deny_unknown_fields)]
pub struct AppConfig {
    /// Database connection URL (postgres:// or sqlite://)
    pub database_url: String,

    /// Secret for HS256 bearer tokens (minimum 64 characters)
    #[validate(length(min = 64), custom = "validate_jwt_secret")]
    pub jwt_secret: String,

    /// Expected `iss` claim
    #[serde(default = "default_jwt_issuer")]
    pub jwt_issuer: String,

    /// Lifetime of tokens minted by the admin CLI
    #[serde(default = "default_jwt_expiration_secs")]
    #[validate(range(min = 60, max = 86400))]
    pub jwt_expiration_secs: u64,

    /// Server host address
    pub host: String,

    /// Server port
    #[serde(default = "default_port")]
    pub port: u16,

    /// Application environment
    pub environment: String,

    /// Logging level
    #[serde(default = "default_log_level")]
    #[validate(custom = "validate_log_level")]
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

    /// Allow permissive CORS fallback
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

    /// Per-request timeout applied by the router (seconds)
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,

    /// Event channel capacity for async event processing
    #[serde(default = "default_event_channel_capacity")]
    #[validate(custom = "validate_event_channel_capacity")]
    pub event_channel_capacity: usize,

    /// Default page size for paginated API responses
    #[serde(default = "default_api_page_size")]
    pub api_default_page_size: u64,

    /// Maximum page size allowed for paginated API responses
    #[serde(default = "default_api_max_page_size")]
    pub api_max_page_size: u64,

    /// Currency stamped on new quotes
    #[serde(default = "default_currency")]
    #[validate(length(equal = 3))]
    pub default_currency: String,

    /// Margin threshold (percent) used until an admin saves settings
    #[serde(default = "default_margin_threshold")]
    #[validate(custom = "validate_margin_threshold")]
    pub default_margin_threshold: f64,
}

impl AppConfig {
    /// Creates a configuration with defaults for everything not passed in
    pub fn new(
        database_url: String,
        jwt_secret: String,
        host: String,
        port: u16,
        environment: String,
    ) -> Self {
        Self {
            database_url,
            jwt_secret,
            jwt_issuer: default_jwt_issuer(),
            jwt_expiration_secs: default_jwt_expiration_secs(),
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
            request_timeout_secs: default_request_timeout_secs(),
            event_channel_capacity: default_event_channel_capacity(),
            api_default_page_size: default_api_page_size(),
            api_max_page_size: default_api_max_page_size(),
            default_currency: default_currency(),
            default_margin_threshold: default_margin_threshold(),
        }
    }

    fn is_development(&self) -> bool {
        self.environment.eq_ignore_ascii_case(DEFAULT_ENV)
    }

    /// Explicitly configured CORS origins, empty entries dropped
    pub fn cors_origins(&self) -> Vec<String> {
        self.cors_allowed_origins
            .as_deref()
            .map(|raw| {
                raw.split(',')
                    .map(str::trim)
                    .filter(|origin| !origin.is_empty())
                    .map(str::to_string)
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Permissive CORS is allowed in development or when opted into
    pub fn should_allow_permissive_cors(&self) -> bool {
        self.is_development() || self.cors_allow_any_origin
    }

    /// Threshold as a decimal percentage, two places
    pub fn margin_threshold(&self) -> Decimal {
        Decimal::try_from(self.default_margin_threshold)
            .map(|d| d.round_dp(2))
            .unwrap_or(crate::workflow::approval::DEFAULT_MARGIN_THRESHOLD)
    }

    /// Clamp a requested page size into `1..=api_max_page_size`
    pub fn page_size(&self, requested: Option<u64>) -> u64 {
        requested
            .unwrap_or(self.api_default_page_size)
            .clamp(1, self.api_max_page_size.max(1))
    }

    /// Cross-field rules the derive cannot express
    fn check_deployment(&self) -> Result<(), ValidationErrors> {
        let mut errors = ValidationErrors::new();

        if !self.should_allow_permissive_cors() && self.cors_origins().is_empty() {
            errors.add(
                "cors_allowed_origins",
                violation(
                    "cors_origins_missing",
                    "outside development list origins in APP__CORS_ALLOWED_ORIGINS or set APP__CORS_ALLOW_ANY_ORIGIN=true",
                ),
            );
        }
        if !self.is_development() && self.jwt_secret.trim() == DEV_DEFAULT_JWT_SECRET {
            errors.add(
                "jwt_secret",
                violation(
                    "jwt_secret_dev_default",
                    "the bundled development secret is only accepted in development",
                ),
            );
        }
        if !(1..=self.api_max_page_size).contains(&self.api_default_page_size) {
            errors.add(
                "api_default_page_size",
                violation("page_size", "api_default_page_size must be within 1..=api_max_page_size"),
            );
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

fn default_jwt_issuer() -> String {
    "quote-workflow-api".to_string()
}

fn default_jwt_expiration_secs() -> u64 {
    3600
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

fn default_request_timeout_secs() -> u64 {
    30
}

fn default_event_channel_capacity() -> usize {
    1024
}

fn default_api_page_size() -> u64 {
    20
}

fn default_api_max_page_size() -> u64 {
    100
}

fn default_currency() -> String {
    "USD".to_string()
}

fn default_margin_threshold() -> f64 {
    25.0
}

fn violation(code: &'static str, message: &'static str) -> ValidationError {
    let mut err = ValidationError::new(code);
    err.message = Some(message.into());
    err
}

fn validate_log_level(level: &str) -> Result<(), ValidationError> {
    match level.to_ascii_lowercase().as_str() {
        "trace" | "debug" | "info" | "warn" | "error" => Ok(()),
        _ => Err(violation("log_level", "expected trace, debug, info, warn or error")),
    }
}

/// Rejects secrets that are short, repetitive or contain obvious words
fn validate_jwt_secret(secret: &str) -> Result<(), ValidationError> {
    let secret = secret.trim();
    let distinct = secret.chars().collect::<std::collections::HashSet<_>>().len();
    let lower = secret.to_ascii_lowercase();

    if secret.len() < 64 {
        Err(violation("jwt_secret", "jwt_secret must be at least 64 characters"))
    } else if distinct < 10 {
        Err(violation("jwt_secret", "jwt_secret needs at least 10 distinct characters"))
    } else if ["changeme", "password", "12345"].iter().any(|w| lower.contains(w)) {
        Err(violation("jwt_secret", "jwt_secret contains a guessable fragment"))
    } else {
        Ok(())
    }
}

fn validate_event_channel_capacity(capacity: usize) -> Result<(), ValidationError> {
    if capacity == 0 {
        return Err(violation("event_channel_capacity", "event_channel_capacity must be positive"));
    }
    Ok(())
}

fn validate_margin_threshold(threshold: f64) -> Result<(), ValidationError> {
    if threshold.is_finite() && (0.0..=100.0).contains(&threshold) {
        Ok(())
    } else {
        Err(violation("default_margin_threshold", "default_margin_threshold must be a percentage in 0..=100"))
    }
}

/// Installs the global subscriber. `RUST_LOG` wins over `level` when set.
pub fn init_tracing(level: &str, json: bool) {
    use tracing_subscriber::{fmt, EnvFilter};

    let filter = env::var("RUST_LOG")
        .ok()
        .filter(|directive| !directive.trim().is_empty())
        .map(EnvFilter::new)
        .unwrap_or_else(|| EnvFilter::new(format!("quote_workflow_api={level},tower_http=debug")));

    let builder = fmt().with_env_filter(filter).with_target(true);
    // a second init (tests, the admin CLI) keeps the first subscriber
    let _ = if json {
        builder.json().try_init()
    } else {
        builder.try_init()
    };
}

/// Reads configuration from, lowest precedence first: built-in defaults,
/// `config/default.toml`, `config/{RUN_ENV}.toml` and `APP__*` variables.
pub fn load_config() -> Result<AppConfig, AppConfigError> {
    let run_env = env::var("RUN_ENV").unwrap_or_else(|_| DEFAULT_ENV.to_string());
    if !Path::new(CONFIG_DIR).is_dir() {
        info!(dir = CONFIG_DIR, "no config directory; using defaults and APP__ variables");
    }

    let layered = Config::builder()
        .set_default("database_url", "sqlite://quotes.db?mode=rwc")?
        .set_default("host", "0.0.0.0")?
        .set_default("port", i64::from(DEFAULT_PORT))?
        .set_default("environment", run_env.as_str())?
        .add_source(File::with_name(&format!("{CONFIG_DIR}/default")).required(false))
        .add_source(File::with_name(&format!("{CONFIG_DIR}/{run_env}")).required(false))
        .add_source(Environment::with_prefix("APP").separator("__"))
        .build()?;

    // no default on purpose: every deployment supplies its own
    if layered.get_string("jwt_secret").is_err() {
        error!("jwt_secret missing; set APP__JWT_SECRET");
        return Err(AppConfigError::Load(ConfigError::NotFound("jwt_secret".into())));
    }

    let cfg: AppConfig = layered.try_deserialize()?;
    if let Err(e) = cfg.validate().and_then(|_| cfg.check_deployment()) {
        error!(errors = ?e, "configuration rejected");
        return Err(AppConfigError::Validation(e));
    }

    info!(environment = %cfg.environment, "configuration loaded");
    Ok(cfg)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    const SECRET: &str =
        "q7Lw2Zr9Xk4Vb8Nt3Hs6Jd1Fg5Pc0Ym_quote_workflow_unit_test_secret_value_AbCdEfGh";

    fn base_config() -> AppConfig {
        AppConfig::new(
            "sqlite://quotes.db?mode=memory".into(),
            SECRET.into(),
            "127.0.0.1".into(),
            8080,
            "production".into(),
        )
    }

    #[test]
    fn defaults_pass_field_validation() {
        assert!(base_config().validate().is_ok());
    }

    #[test]
    fn non_dev_requires_cors_origins() {
        let cfg = base_config();
        assert!(cfg.check_deployment().is_err());
    }

    #[test]
    fn non_dev_with_origins_passes() {
        let mut cfg = base_config();
        cfg.cors_allowed_origins = Some("https://quotes.example.com, ".into());
        assert_eq!(cfg.cors_origins(), vec!["https://quotes.example.com"]);
        assert!(cfg.check_deployment().is_ok());
    }

    #[test]
    fn development_allows_permissive_by_default() {
        let mut cfg = base_config();
        cfg.environment = "development".into();
        assert!(cfg.check_deployment().is_ok());
    }

    #[test]
    fn weak_secret_is_rejected() {
        let mut cfg = base_config();
        cfg.jwt_secret = "a".repeat(80);
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn threshold_outside_percent_range_is_rejected() {
        let mut cfg = base_config();
        cfg.default_margin_threshold = 140.0;
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn margin_threshold_converts_to_decimal() {
        let mut cfg = base_config();
        cfg.default_margin_threshold = 22.5;
        assert_eq!(cfg.margin_threshold(), dec!(22.5));
    }

    #[test]
    fn page_size_is_clamped() {
        let cfg = base_config();
        assert_eq!(cfg.page_size(None), 20);
        assert_eq!(cfg.page_size(Some(0)), 1);
        assert_eq!(cfg.page_size(Some(1000)), 100);
    }
}
