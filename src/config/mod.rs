//! Configuration module for the Rollcall backend.
//!
//! All configuration is loaded from environment variables with sensible defaults.

use std::env;
use std::net::{AddrParseError, SocketAddr};
use std::path::PathBuf;
use std::time::Duration;

/// Weekday used when neither the group nor the environment names one (Saturday).
pub const DEFAULT_SESSION_WEEKDAY: u32 = 6;

/// Idle time after which an open edit session is discarded.
pub const DEFAULT_SESSION_TTL_MINUTES: u64 = 240;

/// Application configuration loaded from environment variables.
#[derive(Debug, Clone)]
pub struct Config {
    /// Pre-shared key for API authentication (required in production)
    pub api_psk: Option<String>,
    /// Path to SQLite database file
    pub db_path: PathBuf,
    /// Address to bind the server to
    pub bind_addr: SocketAddr,
    /// Log level (trace, debug, info, warn, error)
    pub log_level: String,
    /// Emit logs as JSON lines instead of the human-readable format
    pub log_json: bool,
    /// Default weekday (0 = Sunday .. 6 = Saturday) of the weekly session
    pub session_weekday: u32,
    /// Edit sessions untouched for this long are discarded
    pub session_ttl: Duration,
}

impl Config {
    /// Load configuration from environment variables.
    pub fn from_env() -> Result<Self, AddrParseError> {
        dotenvy::dotenv().ok();

        let api_psk = env::var("ROLLCALL_API_PSK").ok();

        let db_path = env::var("ROLLCALL_DB_PATH")
            .unwrap_or_else(|_| "./data/rollcall.sqlite".to_string())
            .into();

        let bind_addr = env::var("ROLLCALL_BIND_ADDR")
            .unwrap_or_else(|_| "127.0.0.1:8080".to_string())
            .parse()?;

        let log_level = env::var("ROLLCALL_LOG_LEVEL").unwrap_or_else(|_| "info".to_string());

        let log_json = env::var("ROLLCALL_LOG_FORMAT")
            .map(|v| v.eq_ignore_ascii_case("json"))
            .unwrap_or(false);

        let session_weekday = match env::var("ROLLCALL_SESSION_WEEKDAY") {
            Ok(raw) => parse_weekday(&raw).unwrap_or_else(|| {
                tracing::warn!(
                    "Invalid ROLLCALL_SESSION_WEEKDAY {:?}, using {}",
                    raw,
                    DEFAULT_SESSION_WEEKDAY
                );
                DEFAULT_SESSION_WEEKDAY
            }),
            Err(_) => DEFAULT_SESSION_WEEKDAY,
        };

        let session_ttl_minutes = env::var("ROLLCALL_SESSION_TTL_MINUTES")
            .ok()
            .and_then(|v| v.trim().parse::<u64>().ok())
            .filter(|m| *m > 0)
            .unwrap_or(DEFAULT_SESSION_TTL_MINUTES);

        Ok(Self {
            api_psk,
            db_path,
            bind_addr,
            log_level,
            log_json,
            session_weekday,
            session_ttl: Duration::from_secs(session_ttl_minutes * 60),
        })
    }
}

fn parse_weekday(raw: &str) -> Option<u32> {
    raw.trim().parse::<u32>().ok().filter(|d| *d <= 6)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        // Clear any existing env vars
        env::remove_var("ROLLCALL_API_PSK");
        env::remove_var("ROLLCALL_DB_PATH");
        env::remove_var("ROLLCALL_BIND_ADDR");
        env::remove_var("ROLLCALL_LOG_LEVEL");
        env::remove_var("ROLLCALL_LOG_FORMAT");
        env::remove_var("ROLLCALL_SESSION_WEEKDAY");
        env::remove_var("ROLLCALL_SESSION_TTL_MINUTES");

        let config = Config::from_env().unwrap();

        assert!(config.api_psk.is_none());
        assert_eq!(config.db_path, PathBuf::from("./data/rollcall.sqlite"));
        assert_eq!(config.bind_addr.to_string(), "127.0.0.1:8080");
        assert_eq!(config.log_level, "info");
        assert!(!config.log_json);
        assert_eq!(config.session_weekday, DEFAULT_SESSION_WEEKDAY);
        assert_eq!(config.session_ttl, Duration::from_secs(4 * 60 * 60));
    }

    #[test]
    fn test_parse_weekday() {
        assert_eq!(parse_weekday("0"), Some(0));
        assert_eq!(parse_weekday(" 6 "), Some(6));
        assert_eq!(parse_weekday("7"), None);
        assert_eq!(parse_weekday("saturday"), None);
    }
}
