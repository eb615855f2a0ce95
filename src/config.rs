use std::env;

const DEFAULT_TOPIC: &str = "purifier/telemetry";

#[derive(Debug, Clone)]
pub struct Config {
    pub server_host: String,
    pub server_port: u16,
    pub database_url: String,
    pub mqtt_host: String,
    pub mqtt_port: u16,
    pub mqtt_client_id: String,
    pub mqtt_username: Option<String>,
    pub mqtt_password: Option<String>,
    pub mqtt_topics: Vec<String>,
    pub mqtt_keepalive_secs: u64,
    pub mqtt_max_packet_bytes: usize,
    pub geocode_base_url: String,
    pub geocode_timeout_secs: u64,
    pub geocode_zoom: u8,
    pub address_keep_segments: usize,
    pub movement_threshold_deg: f64,
    pub device_ttl_secs: u64,
    pub prune_interval_secs: u64,
    pub resolver_workers: usize,
    pub resolver_queue_capacity: usize,
}

impl Config {
    /// Every setting has a working local default, so loading never fails.
    /// Unparsable numeric overrides fall back to the default.
    pub fn from_env() -> Self {
        Config {
            server_host: env::var("SERVER_HOST").unwrap_or_else(|_| "0.0.0.0".to_string()),
            server_port: env::var("SERVER_PORT")
                .unwrap_or_else(|_| "8080".to_string())
                .parse()
                .unwrap_or(8080),
            database_url: env::var("DATABASE_URL")
                .unwrap_or_else(|_| "sqlite://purifier.db".to_string()),
            mqtt_host: env::var("MQTT_HOST").unwrap_or_else(|_| "localhost".to_string()),
            mqtt_port: env::var("MQTT_PORT")
                .unwrap_or_else(|_| "1883".to_string())
                .parse()
                .unwrap_or(1883),
            mqtt_client_id: env::var("MQTT_CLIENT_ID")
                .unwrap_or_else(|_| format!("purifier-telemetry-{}", std::process::id())),
            mqtt_username: env::var("MQTT_USERNAME").ok(),
            mqtt_password: env::var("MQTT_PASSWORD").ok(),
            mqtt_topics: parse_topics(env::var("MQTT_TOPICS").ok()),
            mqtt_keepalive_secs: env::var("MQTT_KEEPALIVE_SECS")
                .unwrap_or_else(|_| "60".to_string())
                .parse()
                .unwrap_or(60),
            mqtt_max_packet_bytes: env::var("MQTT_MAX_PACKET_BYTES")
                .unwrap_or_else(|_| "1048576".to_string())
                .parse()
                .unwrap_or(1_048_576),
            geocode_base_url: env::var("GEOCODE_BASE_URL")
                .unwrap_or_else(|_| "https://nominatim.openstreetmap.org/reverse".to_string()),
            geocode_timeout_secs: env::var("GEOCODE_TIMEOUT_SECS")
                .unwrap_or_else(|_| "8".to_string())
                .parse()
                .unwrap_or(8),
            geocode_zoom: env::var("GEOCODE_ZOOM")
                .unwrap_or_else(|_| "16".to_string())
                .parse()
                .unwrap_or(16),
            address_keep_segments: env::var("ADDRESS_KEEP_SEGMENTS")
                .unwrap_or_else(|_| "6".to_string())
                .parse()
                .unwrap_or(6),
            movement_threshold_deg: env::var("MOVEMENT_THRESHOLD_DEG")
                .unwrap_or_else(|_| "0.001".to_string())
                .parse()
                .unwrap_or(0.001),
            device_ttl_secs: env::var("DEVICE_TTL_SECS")
                .unwrap_or_else(|_| "600".to_string())
                .parse()
                .unwrap_or(600),
            prune_interval_secs: env::var("PRUNE_INTERVAL_SECS")
                .unwrap_or_else(|_| "120".to_string())
                .parse()
                .unwrap_or(120),
            resolver_workers: env::var("RESOLVER_WORKERS")
                .unwrap_or_else(|_| "4".to_string())
                .parse()
                .unwrap_or(4),
            // tokio channels panic on zero capacity, so never go below one.
            resolver_queue_capacity: env::var("RESOLVER_QUEUE_CAPACITY")
                .unwrap_or_else(|_| "256".to_string())
                .parse()
                .unwrap_or(256)
                .max(1),
        }
    }

    pub fn server_addr(&self) -> String {
        format!("{}:{}", self.server_host, self.server_port)
    }
}

fn parse_topics(raw: Option<String>) -> Vec<String> {
    let topics: Vec<String> = raw
        .as_deref()
        .unwrap_or(DEFAULT_TOPIC)
        .split(',')
        .map(|topic| topic.trim().to_string())
        .filter(|topic| !topic.is_empty())
        .collect();

    if topics.is_empty() {
        vec![DEFAULT_TOPIC.to_string()]
    } else {
        topics
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    const KEYS: &[&str] = &[
        "SERVER_HOST",
        "SERVER_PORT",
        "DATABASE_URL",
        "MQTT_HOST",
        "MQTT_PORT",
        "MQTT_CLIENT_ID",
        "MQTT_USERNAME",
        "MQTT_PASSWORD",
        "MQTT_TOPICS",
        "MQTT_KEEPALIVE_SECS",
        "MQTT_MAX_PACKET_BYTES",
        "GEOCODE_BASE_URL",
        "GEOCODE_TIMEOUT_SECS",
        "GEOCODE_ZOOM",
        "ADDRESS_KEEP_SEGMENTS",
        "MOVEMENT_THRESHOLD_DEG",
        "DEVICE_TTL_SECS",
        "PRUNE_INTERVAL_SECS",
        "RESOLVER_WORKERS",
        "RESOLVER_QUEUE_CAPACITY",
    ];

    fn clear_env() {
        for key in KEYS {
            env::remove_var(key);
        }
    }

    #[test]
    #[serial]
    fn test_defaults_when_env_unset() {
        clear_env();

        let config = Config::from_env();

        assert_eq!(config.server_addr(), "0.0.0.0:8080");
        assert_eq!(config.database_url, "sqlite://purifier.db");
        assert_eq!(config.mqtt_host, "localhost");
        assert_eq!(config.mqtt_port, 1883);
        assert!(config.mqtt_client_id.starts_with("purifier-telemetry-"));
        assert!(config.mqtt_username.is_none());
        assert_eq!(config.mqtt_topics, vec!["purifier/telemetry"]);
        assert_eq!(config.mqtt_max_packet_bytes, 1_048_576);
        assert_eq!(config.movement_threshold_deg, 0.001);
        assert_eq!(config.device_ttl_secs, 600);
        assert_eq!(config.resolver_workers, 4);
        assert_eq!(config.resolver_queue_capacity, 256);
    }

    #[test]
    #[serial]
    fn test_overrides_and_topic_list() {
        clear_env();
        env::set_var("MQTT_TOPICS", "purifier/a, purifier/b ,,purifier/c");
        env::set_var("MQTT_USERNAME", "feed");
        env::set_var("MQTT_PASSWORD", "secret");
        env::set_var("MQTT_MAX_PACKET_BYTES", "2097152");
        env::set_var("DEVICE_TTL_SECS", "45");

        let config = Config::from_env();

        assert_eq!(
            config.mqtt_topics,
            vec!["purifier/a", "purifier/b", "purifier/c"]
        );
        assert_eq!(config.mqtt_username.as_deref(), Some("feed"));
        assert_eq!(config.mqtt_password.as_deref(), Some("secret"));
        assert_eq!(config.mqtt_max_packet_bytes, 2_097_152);
        assert_eq!(config.device_ttl_secs, 45);

        clear_env();
    }

    #[test]
    #[serial]
    fn test_unparsable_numbers_fall_back() {
        clear_env();
        env::set_var("SERVER_PORT", "not-a-port");
        env::set_var("MOVEMENT_THRESHOLD_DEG", "wide");
        env::set_var("RESOLVER_QUEUE_CAPACITY", "0");

        let config = Config::from_env();

        assert_eq!(config.server_port, 8080);
        assert_eq!(config.movement_threshold_deg, 0.001);
        assert_eq!(config.resolver_queue_capacity, 1);

        clear_env();
    }
}
