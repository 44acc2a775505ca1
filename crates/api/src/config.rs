//! Application configuration loaded from environment variables.

use std::str::FromStr;
use std::time::Duration;

use application::{BankDetails, Settings};
use domain::seo::SiteContext;

/// Log output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    Text,
    Json,
}

impl FromStr for LogFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "text" => Ok(LogFormat::Text),
            "json" => Ok(LogFormat::Json),
            other => Err(format!("unknown log format '{other}'")),
        }
    }
}

/// Server configuration with defaults for local runs.
///
/// Every field has an environment variable of the same name in upper case,
/// e.g. `database_max_connections` reads `DATABASE_MAX_CONNECTIONS`.
/// Unparsable values fall back to the default.
#[derive(Debug, Clone)]
pub struct Config {
    pub host: String,
    pub port: u16,
    pub log_level: String,
    pub log_format: LogFormat,
    /// Without a URL the server runs on the in-memory store.
    pub database_url: Option<String>,
    pub database_max_connections: u32,
    pub jwt_secret: String,
    pub jwt_ttl: Duration,
    pub site_name: String,
    pub site_base_url: String,
    pub currency: String,
    pub idempotency_ttl: Duration,
    pub purge_interval: Duration,
    pub payment_window_hours: i64,
    pub bank_name: String,
    pub bank_account_name: String,
    pub bank_account_number: String,
    /// Admin account created at start-up when both are set.
    pub admin_email: Option<String>,
    pub admin_password: Option<String>,
}

fn var(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.trim().is_empty())
}

fn var_or(name: &str, default: &str) -> String {
    var(name).unwrap_or_else(|| default.to_string())
}

fn parsed_or<T: FromStr>(name: &str, default: T) -> T {
    var(name).and_then(|v| v.parse().ok()).unwrap_or(default)
}

impl Config {
    /// Loads configuration from environment variables, falling back to defaults.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            host: var_or("HOST", &defaults.host),
            port: parsed_or("PORT", defaults.port),
            log_level: var_or("RUST_LOG", &defaults.log_level),
            log_format: parsed_or("LOG_FORMAT", defaults.log_format),
            database_url: var("DATABASE_URL"),
            database_max_connections: parsed_or(
                "DATABASE_MAX_CONNECTIONS",
                defaults.database_max_connections,
            ),
            jwt_secret: var_or("JWT_SECRET", &defaults.jwt_secret),
            jwt_ttl: Duration::from_secs(parsed_or("JWT_TTL_SECS", defaults.jwt_ttl.as_secs())),
            site_name: var_or("SITE_NAME", &defaults.site_name),
            site_base_url: var_or("SITE_BASE_URL", &defaults.site_base_url),
            currency: var_or("CURRENCY", &defaults.currency),
            idempotency_ttl: Duration::from_secs(parsed_or(
                "IDEMPOTENCY_TTL_SECS",
                defaults.idempotency_ttl.as_secs(),
            )),
            purge_interval: Duration::from_secs(parsed_or(
                "PURGE_INTERVAL_SECS",
                defaults.purge_interval.as_secs(),
            )),
            payment_window_hours: parsed_or("PAYMENT_WINDOW_HOURS", defaults.payment_window_hours),
            bank_name: var_or("BANK_NAME", &defaults.bank_name),
            bank_account_name: var_or("BANK_ACCOUNT_NAME", &defaults.bank_account_name),
            bank_account_number: var_or("BANK_ACCOUNT_NUMBER", &defaults.bank_account_number),
            admin_email: var("ADMIN_EMAIL"),
            admin_password: var("ADMIN_PASSWORD"),
        }
    }

    /// Returns the `"host:port"` bind address string.
    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Settings handed to the application services.
    pub fn settings(&self) -> Settings {
        Settings {
            site: SiteContext::new(&self.site_name, &self.site_base_url, &self.currency),
            payment_window: chrono::Duration::hours(self.payment_window_hours),
            idempotency_ttl: chrono::Duration::seconds(secs(self.idempotency_ttl)),
            bank: BankDetails {
                bank_name: self.bank_name.clone(),
                account_name: self.bank_account_name.clone(),
                account_number: self.bank_account_number.clone(),
            },
        }
    }

    pub fn jwt_ttl(&self) -> chrono::Duration {
        chrono::Duration::seconds(secs(self.jwt_ttl))
    }
}

fn secs(duration: Duration) -> i64 {
    i64::try_from(duration.as_secs()).unwrap_or(i64::MAX)
}

impl Default for Config {
    fn default() -> Self {
        let settings = Settings::default();
        Self {
            host: "0.0.0.0".to_string(),
            port: 3000,
            log_level: "info".to_string(),
            log_format: LogFormat::Text,
            database_url: None,
            database_max_connections: 10,
            jwt_secret: "dev-secret-change-me".to_string(),
            jwt_ttl: Duration::from_secs(86_400),
            site_name: settings.site.name,
            site_base_url: settings.site.base_url,
            currency: settings.site.currency,
            idempotency_ttl: Duration::from_secs(86_400),
            purge_interval: Duration::from_secs(3_600),
            payment_window_hours: 72,
            bank_name: settings.bank.bank_name,
            bank_account_name: settings.bank.account_name,
            bank_account_number: settings.bank.account_number,
            admin_email: None,
            admin_password: None,
        }
    }
}
