//! Application configuration loaded from environment variables.

use bus::AmqpConfig;

/// Server configuration with sensible defaults.
///
/// Reads from environment variables:
/// - `HOST` — bind address (default: `"0.0.0.0"`)
/// - `PORT` — listen port (default: `3000`)
/// - `ORDERS_CONN` — PostgreSQL connection string (default: `None`, uses in-memory stores)
/// - `DB_MAX_CONNECTIONS` — max database pool connections (default: `10`)
/// - `INVENTORY_TTL_SECONDS` — reservation hold time (default: `600`)
/// - `RABBITMQ_HOST/PORT/USER/PASS/VHOST` — broker settings; without
///   `RABBITMQ_HOST` the in-memory bus is used
/// - `DISABLE_HOSTED_SERVICES` — skip consumers and the TTL sweeper
#[derive(Debug, Clone)]
pub struct Config {
    pub host: String,
    pub port: u16,
    pub orders_conn: Option<String>,
    pub db_max_connections: u32,
    pub inventory_ttl_seconds: u64,
    pub amqp: Option<AmqpConfig>,
    pub disable_hosted_services: bool,
}

impl Config {
    /// Loads configuration from environment variables, falling back to defaults.
    pub fn from_env() -> Self {
        Self {
            host: std::env::var("HOST").unwrap_or_else(|_| "0.0.0.0".to_string()),
            port: std::env::var("PORT")
                .ok()
                .and_then(|p| p.parse().ok())
                .unwrap_or(3000),
            orders_conn: std::env::var("ORDERS_CONN").ok(),
            db_max_connections: std::env::var("DB_MAX_CONNECTIONS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(10),
            inventory_ttl_seconds: std::env::var("INVENTORY_TTL_SECONDS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(600),
            amqp: std::env::var("RABBITMQ_HOST")
                .ok()
                .map(|_| AmqpConfig::from_env()),
            disable_hosted_services: std::env::var("DISABLE_HOSTED_SERVICES")
                .map(|v| v == "1" || v.eq_ignore_ascii_case("true"))
                .unwrap_or(false),
        }
    }

    /// Returns the `"host:port"` bind address string.
    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 3000,
            orders_conn: None,
            db_max_connections: 10,
            inventory_ttl_seconds: 600,
            amqp: None,
            disable_hosted_services: false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_values() {
        let config = Config::default();
        assert_eq!(config.host, "0.0.0.0");
        assert_eq!(config.port, 3000);
        assert_eq!(config.inventory_ttl_seconds, 600);
        assert!(config.orders_conn.is_none());
        assert!(config.amqp.is_none());
        assert!(!config.disable_hosted_services);
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
