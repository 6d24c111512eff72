use crate::core::models::money::Currency;
use dotenv::dotenv;
use once_cell::sync::Lazy;
use std::env;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

#[derive(Clone)]
pub struct Config {
    pub api_base_url: String,
    pub auth_scheme: String,
    pub currency: Currency,
    pub request_timeout: Duration,
    pub max_attempts: u32,
    pub backoff_base: Duration,
    pub backoff_max: Duration,
    pub session_path: PathBuf,
    pub cache_ttl: Duration,
    pub log_level: String,
}

impl std::fmt::Debug for Config {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Config")
            .field("api_base_url", &"<redacted>")
            .field("auth_scheme", &self.auth_scheme)
            .field("currency", &self.currency)
            .field("request_timeout", &self.request_timeout)
            .field("max_attempts", &self.max_attempts)
            .field("backoff_base", &self.backoff_base)
            .field("backoff_max", &self.backoff_max)
            .field("session_path", &self.session_path)
            .field("cache_ttl", &self.cache_ttl)
            .field("log_level", &self.log_level)
            .finish()
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            api_base_url: "http://localhost:8000/api".to_string(),
            auth_scheme: "Token".to_string(),
            currency: Currency::USD,
            request_timeout: Duration::from_secs(10),
            max_attempts: 3,
            backoff_base: Duration::from_millis(200),
            backoff_max: Duration::from_secs(5),
            session_path: PathBuf::from(".billio_session.json"),
            cache_ttl: Duration::from_secs(3600),
            log_level: "info".to_string(),
        }
    }
}

fn env_or<T: FromStr>(key: &str, default: T) -> T {
    env::var(key).ok().and_then(|v| v.trim().parse().ok()).unwrap_or(default)
}

impl Config {
    pub fn from_env() -> Self {
        dotenv().ok();
        let defaults = Config::default();

        Self {
            api_base_url: env::var("BILLIO_API_BASE").unwrap_or(defaults.api_base_url),
            auth_scheme: env::var("BILLIO_AUTH_SCHEME").unwrap_or(defaults.auth_scheme),
            currency: env_or("BILLIO_CURRENCY", defaults.currency),
            request_timeout: Duration::from_secs(env_or("BILLIO_REQUEST_TIMEOUT_SECS", 10)),
            // at least one attempt, otherwise nothing is ever sent
            max_attempts: env_or("BILLIO_MAX_ATTEMPTS", defaults.max_attempts).max(1),
            backoff_base: Duration::from_millis(env_or("BILLIO_BACKOFF_BASE_MS", 200)),
            backoff_max: Duration::from_millis(env_or("BILLIO_BACKOFF_MAX_MS", 5_000)),
            session_path: env::var("BILLIO_SESSION_PATH")
                .map(PathBuf::from)
                .unwrap_or(defaults.session_path),
            cache_ttl: Duration::from_secs(env_or("BILLIO_CACHE_TTL_SECS", 3600)),
            log_level: env::var("LOG_LEVEL").unwrap_or(defaults.log_level),
        }
    }
}

// Global static accessible everywhere
pub static CONFIG: Lazy<Config> = Lazy::new(Config::from_env);
