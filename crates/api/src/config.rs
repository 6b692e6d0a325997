//! Application configuration loaded from environment variables.

use std::time::Duration;

/// Server-facing knobs.
///
/// Reads from environment variables:
/// - `HOST` — bind address (default: `"0.0.0.0"`)
/// - `PORT` — listen port (default: `8080`)
/// - `SERVER_TIMEOUT_MS` — hard per-call deadline (default: `250`)
/// - `SERVER_MAX_CONCURRENCY` — in-flight request cap; excess calls are
///   shed, not queued (default: `1000`)
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub timeout: Duration,
    pub max_concurrency: usize,
}

/// Backing-store knobs.
///
/// - `TABLE_INVENTORY` (default: `"inventory"`)
/// - `TABLE_SEATS` (default: `"inventory_seats"`)
/// - `TABLE_IDEMPOTENCY` (default: `"idempotency"`)
/// - `STORE_MAX_RETRIES` — compensation retry cap (default: `3`)
/// - `STORE_TIMEOUT_MS` — per-request driver timeout, honored by
///   networked store drivers (default: `200`)
#[derive(Debug, Clone)]
pub struct StoreConfig {
    pub table_inventory: String,
    pub table_seats: String,
    pub table_idempotency: String,
    pub max_retries: u32,
    pub timeout: Duration,
}

/// Replay-guard knobs.
///
/// - `IDEMPOTENCY_TTL_SECONDS` (default: `300`)
/// - `IDEMPOTENCY_CACHE_SIZE` — in-process cache capacity (default: `10000`)
#[derive(Debug, Clone)]
pub struct IdempotencyConfig {
    pub ttl: Duration,
    pub cache_size: u64,
}

/// Observability knobs.
///
/// - `SERVICE_NAME` (default: `"inventory-api"`)
/// - `SERVICE_VERSION` (default: `"1.0.0"`)
/// - `OTEL_EXPORTER_OTLP_ENDPOINT` (default: `"http://otel-collector:4317"`)
/// - `LOG_LEVEL` (default: `"info"`)
/// - `METRICS_PORT` (default: `9090`)
#[derive(Debug, Clone)]
pub struct ObservabilityConfig {
    pub service_name: String,
    pub service_version: String,
    pub otlp_endpoint: String,
    pub log_level: String,
    pub metrics_port: u16,
}

/// Full configuration with defaults suitable for a local run.
#[derive(Debug, Clone)]
pub struct Config {
    pub server: ServerConfig,
    pub store: StoreConfig,
    pub idempotency: IdempotencyConfig,
    pub observability: ObservabilityConfig,
}

impl Config {
    /// Loads configuration from environment variables, falling back to
    /// defaults for anything unset or unparsable.
    pub fn from_env() -> Self {
        Self {
            server: ServerConfig {
                host: env_or("HOST", "0.0.0.0"),
                port: env_parse("PORT", 8080),
                timeout: Duration::from_millis(env_parse("SERVER_TIMEOUT_MS", 250)),
                max_concurrency: env_parse("SERVER_MAX_CONCURRENCY", 1000),
            },
            store: StoreConfig {
                table_inventory: env_or("TABLE_INVENTORY", "inventory"),
                table_seats: env_or("TABLE_SEATS", "inventory_seats"),
                table_idempotency: env_or("TABLE_IDEMPOTENCY", "idempotency"),
                max_retries: env_parse("STORE_MAX_RETRIES", 3),
                timeout: Duration::from_millis(env_parse("STORE_TIMEOUT_MS", 200)),
            },
            idempotency: IdempotencyConfig {
                ttl: Duration::from_secs(env_parse("IDEMPOTENCY_TTL_SECONDS", 300)),
                cache_size: env_parse("IDEMPOTENCY_CACHE_SIZE", 10_000),
            },
            observability: ObservabilityConfig {
                service_name: env_or("SERVICE_NAME", "inventory-api"),
                service_version: env_or("SERVICE_VERSION", "1.0.0"),
                otlp_endpoint: env_or("OTEL_EXPORTER_OTLP_ENDPOINT", "http://otel-collector:4317"),
                log_level: env_or("LOG_LEVEL", "info"),
                metrics_port: env_parse("METRICS_PORT", 9090),
            },
        }
    }

    /// Returns the `"host:port"` bind address string.
    pub fn addr(&self) -> String {
        format!("{}:{}", self.server.host, self.server.port)
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            server: ServerConfig {
                host: "0.0.0.0".to_string(),
                port: 8080,
                timeout: Duration::from_millis(250),
                max_concurrency: 1000,
            },
            store: StoreConfig {
                table_inventory: "inventory".to_string(),
                table_seats: "inventory_seats".to_string(),
                table_idempotency: "idempotency".to_string(),
                max_retries: 3,
                timeout: Duration::from_millis(200),
            },
            idempotency: IdempotencyConfig {
                ttl: Duration::from_secs(300),
                cache_size: 10_000,
            },
            observability: ObservabilityConfig {
                service_name: "inventory-api".to_string(),
                service_version: "1.0.0".to_string(),
                otlp_endpoint: "http://otel-collector:4317".to_string(),
                log_level: "info".to_string(),
                metrics_port: 9090,
            },
        }
    }
}

fn env_or(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_string())
}

fn env_parse<T: std::str::FromStr>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}
