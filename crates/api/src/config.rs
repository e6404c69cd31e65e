//! Application configuration loaded from environment variables.

use std::str::FromStr;
use std::time::Duration;

/// Log output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

impl LogFormat {
    fn parse(value: &str) -> Self {
        if value.trim().eq_ignore_ascii_case("json") {
            LogFormat::Json
        } else {
            LogFormat::Text
        }
    }
}

/// Server configuration with sensible defaults.
///
/// Reads from environment variables:
/// - `HOST`: bind address (default: `"0.0.0.0"`)
/// - `PORT`: listen port (default: `3000`)
/// - `RUST_LOG`: tracing filter directive (default: `"info"`)
/// - `LOG_FORMAT`: `text` or `json` (default: `text`)
/// - `DATABASE_URL`: Postgres URL; the in-memory store is used when unset
/// - `DATABASE_MAX_CONNECTIONS`: pool size (default: `10`)
/// - `WEBHOOK_SECRET`: HMAC secret; unset or empty disables verification
/// - `PAYMENT_PROVIDER_DEFAULT`: provider when `x-provider` is absent
///   (default: `"mercadopago"`)
/// - `NOTIFY_MAX_RETRIES` (default: `3`), `NOTIFY_BACKOFF_SECS` (default:
///   `60`), `NOTIFY_QUEUE_CAPACITY` (default: `1024`)
/// - `SEED_DEMO_CATALOG`: seed a demo stall at startup (default: `false`)
#[derive(Debug, Clone)]
pub struct Config {
    pub host: String,
    pub port: u16,
    pub log_level: String,
    pub log_format: LogFormat,
    pub database_url: Option<String>,
    pub database_max_connections: u32,
    pub webhook_secret: Option<String>,
    pub payment_provider_default: String,
    pub notify_max_retries: u32,
    pub notify_backoff_secs: u64,
    pub notify_queue_capacity: usize,
    pub seed_demo_catalog: bool,
}

impl Config {
    /// Loads configuration from environment variables, falling back to defaults.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Loads configuration through `lookup`, falling back to defaults for
    /// missing or unparseable values.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let defaults = Self::default();
        let non_empty = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        Self {
            host: non_empty("HOST").unwrap_or(defaults.host),
            port: parse_var(&lookup, "PORT").unwrap_or(defaults.port),
            log_level: non_empty("RUST_LOG").unwrap_or(defaults.log_level),
            log_format: lookup("LOG_FORMAT")
                .map(|v| LogFormat::parse(&v))
                .unwrap_or_default(),
            database_url: non_empty("DATABASE_URL"),
            database_max_connections: parse_var(&lookup, "DATABASE_MAX_CONNECTIONS")
                .unwrap_or(defaults.database_max_connections),
            webhook_secret: non_empty("WEBHOOK_SECRET"),
            payment_provider_default: non_empty("PAYMENT_PROVIDER_DEFAULT")
                .unwrap_or(defaults.payment_provider_default),
            notify_max_retries: parse_var(&lookup, "NOTIFY_MAX_RETRIES")
                .unwrap_or(defaults.notify_max_retries),
            notify_backoff_secs: parse_var(&lookup, "NOTIFY_BACKOFF_SECS")
                .unwrap_or(defaults.notify_backoff_secs),
            notify_queue_capacity: parse_var(&lookup, "NOTIFY_QUEUE_CAPACITY")
                .unwrap_or(defaults.notify_queue_capacity),
            seed_demo_catalog: lookup("SEED_DEMO_CATALOG")
                .map(|v| matches!(v.trim().to_ascii_lowercase().as_str(), "1" | "true" | "yes"))
                .unwrap_or(defaults.seed_demo_catalog),
        }
    }

    /// Returns the `"host:port"` bind address string.
    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    pub fn notify_backoff(&self) -> Duration {
        Duration::from_secs(self.notify_backoff_secs)
    }
}

fn parse_var<T: FromStr>(lookup: &impl Fn(&str) -> Option<String>, key: &str) -> Option<T> {
    lookup(key).and_then(|v| v.trim().parse().ok())
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 3000,
            log_level: "info".to_string(),
            log_format: LogFormat::Text,
            database_url: None,
            database_max_connections: 10,
            webhook_secret: None,
            payment_provider_default: "mercadopago".to_string(),
            notify_max_retries: 3,
            notify_backoff_secs: 60,
            notify_queue_capacity: 1024,
            seed_demo_catalog: false,
        }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn from_pairs(pairs: &[(&str, &str)]) -> Config {
        let vars: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Config::from_lookup(|key| vars.get(key).cloned())
    }

    #[test]
    fn test_default_values() {
        let config = from_pairs(&[]);
        assert_eq!(config.host, "0.0.0.0");
        assert_eq!(config.port, 3000);
        assert_eq!(config.log_level, "info");
        assert_eq!(config.log_format, LogFormat::Text);
        assert!(config.database_url.is_none());
        assert_eq!(config.database_max_connections, 10);
        assert!(config.webhook_secret.is_none());
        assert_eq!(config.payment_provider_default, "mercadopago");
        assert_eq!(config.notify_max_retries, 3);
        assert_eq!(config.notify_backoff(), Duration::from_secs(60));
        assert_eq!(config.notify_queue_capacity, 1024);
        assert!(!config.seed_demo_catalog);
    }

    #[test]
    fn test_overrides() {
        let config = from_pairs(&[
            ("PORT", "8080"),
            ("LOG_FORMAT", "JSON"),
            ("DATABASE_URL", "postgres://localhost/market"),
            ("WEBHOOK_SECRET", "s3cret"),
            ("PAYMENT_PROVIDER_DEFAULT", "stripe"),
            ("NOTIFY_MAX_RETRIES", "5"),
            ("NOTIFY_BACKOFF_SECS", "2"),
            ("SEED_DEMO_CATALOG", "true"),
        ]);
        assert_eq!(config.port, 8080);
        assert_eq!(config.log_format, LogFormat::Json);
        assert_eq!(
            config.database_url.as_deref(),
            Some("postgres://localhost/market")
        );
        assert_eq!(config.webhook_secret.as_deref(), Some("s3cret"));
        assert_eq!(config.payment_provider_default, "stripe");
        assert_eq!(config.notify_max_retries, 5);
        assert_eq!(config.notify_backoff(), Duration::from_secs(2));
        assert!(config.seed_demo_catalog);
    }

    #[test]
    fn test_bad_values_fall_back() {
        let config = from_pairs(&[
            ("PORT", "not-a-port"),
            ("WEBHOOK_SECRET", ""),
            ("DATABASE_URL", "  "),
            ("LOG_FORMAT", "xml"),
        ]);
        assert_eq!(config.port, 3000);
        assert!(config.webhook_secret.is_none());
        assert!(config.database_url.is_none());
        assert_eq!(config.log_format, LogFormat::Text);
    }

    #[test]
    fn test_addr_formatting() {
        let config = Config {
            host: "127.0.0.1".to_string(),
            port: 8080,
            ..Config::default()
        };
        assert_eq!(config.addr(), "127.0.0.1:8080");
    }
}
