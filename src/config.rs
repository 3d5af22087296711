use std::env;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use tracing::warn;

/// Root of the New Hanover County tax portal.
pub const BASE_URL: &str = "https://etax.nhcgov.com";

/// Search form page, parameterized by `?mode=`.
pub const SEARCH_PATH: &str = "/pt/search/commonsearch.aspx";

/// Fixed per-request timeout on the portal session.
pub const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// ViewState tokens stay valid portal-side for roughly 20 minutes; refresh
/// anything older than 15.
pub const TOKEN_TTL: Duration = Duration::from_secs(900);

/// Environment-driven configuration.
#[derive(Debug, Clone)]
pub struct Settings {
    pub data_dir: PathBuf,
    pub base_url: String,
    pub retry_attempts: u32,
    pub retry_delay: Duration,
    pub retry_backoff: f64,
    pub rate_limit_enabled: bool,
    pub rate_limit_delay: Duration,
    pub cache_enabled: bool,
    pub cache_duration: Duration,
    pub cache_max_size: u64,
    pub max_results: usize,
    pub api_key: Option<String>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("./data"),
            base_url: BASE_URL.to_string(),
            retry_attempts: 3,
            retry_delay: Duration::from_secs_f64(2.0),
            retry_backoff: 2.0,
            rate_limit_enabled: true,
            rate_limit_delay: Duration::from_secs_f64(1.0),
            cache_enabled: true,
            cache_duration: Duration::from_secs(24 * 3600),
            cache_max_size: 5000,
            max_results: 500,
            api_key: None,
        }
    }
}

impl Settings {
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            data_dir: env::var("DATA_DIR").map(PathBuf::from).unwrap_or(defaults.data_dir),
            base_url: defaults.base_url,
            retry_attempts: env_parse("RETRY_ATTEMPTS", defaults.retry_attempts),
            retry_delay: Duration::from_secs_f64(env_parse("RETRY_DELAY", 2.0)),
            retry_backoff: env_parse("RETRY_BACKOFF", defaults.retry_backoff),
            rate_limit_enabled: env_flag("RATE_LIMIT_ENABLED", defaults.rate_limit_enabled),
            rate_limit_delay: Duration::from_secs_f64(env_parse("RATE_LIMIT_DELAY", 1.0)),
            cache_enabled: env_flag("CACHE_ENABLED", defaults.cache_enabled),
            cache_duration: Duration::from_secs(env_parse("CACHE_DURATION_HOURS", 24u64) * 3600),
            cache_max_size: env_parse("CACHE_MAX_SIZE", defaults.cache_max_size),
            max_results: env_parse("MAX_RESULTS", defaults.max_results),
            api_key: env::var("API_KEY").ok().filter(|key| !key.is_empty()),
        }
    }

    /// Full URL of the search form page.
    pub fn search_url(&self) -> String {
        format!("{}{}", self.base_url, SEARCH_PATH)
    }

    /// Create the configured scratch directory if it does not exist yet.
    pub fn ensure_data_dir(&self) {
        if let Err(err) = std::fs::create_dir_all(&self.data_dir) {
            warn!(path = %self.data_dir.display(), error = %err, "failed to create data directory");
        }
    }
}

fn env_parse<T: FromStr + Copy>(key: &str, default: T) -> T {
    match env::var(key) {
        Ok(raw) => raw.parse().unwrap_or_else(|_| {
            warn!(key, value = %raw, "unparseable setting, using default");
            default
        }),
        Err(_) => default,
    }
}

fn env_flag(key: &str, default: bool) -> bool {
    match env::var(key) {
        Ok(raw) => raw.to_lowercase() == "true",
        Err(_) => default,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_documented_values() {
        let settings = Settings::default();
        assert_eq!(settings.retry_attempts, 3);
        assert_eq!(settings.retry_delay, Duration::from_secs(2));
        assert_eq!(settings.rate_limit_delay, Duration::from_secs(1));
        assert_eq!(settings.cache_duration, Duration::from_secs(86_400));
        assert_eq!(settings.cache_max_size, 5000);
        assert_eq!(settings.max_results, 500);
        assert!(settings.cache_enabled);
        assert!(settings.rate_limit_enabled);
        assert!(settings.api_key.is_none());
    }

    #[test]
    fn search_url_appends_search_path() {
        let settings = Settings::default();
        assert_eq!(
            settings.search_url(),
            "https://etax.nhcgov.com/pt/search/commonsearch.aspx"
        );
    }

    #[test]
    fn env_parse_falls_back_on_garbage() {
        env::set_var("NHC_TEST_RETRIES", "not-a-number");
        assert_eq!(env_parse("NHC_TEST_RETRIES", 3u32), 3);
        env::set_var("NHC_TEST_RETRIES", "7");
        assert_eq!(env_parse("NHC_TEST_RETRIES", 3u32), 7);
        env::remove_var("NHC_TEST_RETRIES");
    }

    #[test]
    fn env_flag_only_accepts_true() {
        env::set_var("NHC_TEST_FLAG", "TRUE");
        assert!(env_flag("NHC_TEST_FLAG", false));
        env::set_var("NHC_TEST_FLAG", "yes");
        assert!(!env_flag("NHC_TEST_FLAG", true));
        env::remove_var("NHC_TEST_FLAG");
        assert!(env_flag("NHC_TEST_FLAG", true));
    }
}
