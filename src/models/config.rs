use std::time::Duration;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClientConfig {
    #[serde(default = "default_api_url")]
    pub api_url: String,
    #[serde(default)]
    pub api_key: Option<String>,
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
    #[serde(default = "default_max_poll_attempts")]
    pub max_poll_attempts: u32,
    #[serde(default = "default_settle_delay_ms")]
    pub settle_delay_ms: u64,
    #[serde(default = "default_page_size")]
    pub page_size: usize,
    #[serde(default = "default_catalog_freshness_ms")]
    pub catalog_freshness_ms: u64,
    #[serde(default)]
    pub search_debounce_ms: u64,
    #[serde(default = "default_event_capacity")]
    pub event_capacity: usize,
    /// Allow deleting by execution id when the record id is unknown.
    #[serde(default)]
    pub delete_falls_back_to_execution_id: bool,
}

fn default_api_url() -> String {
    "http://127.0.0.1:8000/api/v1".to_string()
}

fn default_request_timeout_secs() -> u64 {
    30
}

fn default_poll_interval_ms() -> u64 {
    2000
}

fn default_max_poll_attempts() -> u32 {
    150
}

fn default_settle_delay_ms() -> u64 {
    1000
}

fn default_page_size() -> usize {
    50
}

fn default_catalog_freshness_ms() -> u64 {
    5000
}

fn default_event_capacity() -> usize {
    256
}

impl ClientConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn settle_delay(&self) -> Duration {
        Duration::from_millis(self.settle_delay_ms)
    }

    pub fn catalog_freshness(&self) -> Duration {
        Duration::from_millis(self.catalog_freshness_ms)
    }

    pub fn search_debounce(&self) -> Duration {
        Duration::from_millis(self.search_debounce_ms)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            api_url: default_api_url(),
            api_key: None,
            request_timeout_secs: default_request_timeout_secs(),
            poll_interval_ms: default_poll_interval_ms(),
            max_poll_attempts: default_max_poll_attempts(),
            settle_delay_ms: default_settle_delay_ms(),
            page_size: default_page_size(),
            catalog_freshness_ms: default_catalog_freshness_ms(),
            search_debounce_ms: 0,
            event_capacity: default_event_capacity(),
            delete_falls_back_to_execution_id: false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_client_config_defaults() {
        let config = ClientConfig::default();
        assert_eq!(config.api_url, "http://127.0.0.1:8000/api/v1");
        assert!(config.api_key.is_none());
        assert_eq!(config.request_timeout_secs, 30);
        assert_eq!(config.poll_interval_ms, 2000);
        assert_eq!(config.max_poll_attempts, 150);
        assert_eq!(config.settle_delay_ms, 1000);
        assert_eq!(config.page_size, 50);
        assert_eq!(config.catalog_freshness_ms, 5000);
        assert_eq!(config.search_debounce_ms, 0);
        assert_eq!(config.event_capacity, 256);
        assert!(!config.delete_falls_back_to_execution_id);
    }

    #[test]
    fn test_client_config_partial_deserialization_empty() {
        let config: ClientConfig = serde_json::from_str("{}").expect("deserialize");
        assert_eq!(config.api_url, "http://127.0.0.1:8000/api/v1");
        assert_eq!(config.max_poll_attempts, 150);
        assert_eq!(config.settle_delay_ms, 1000);
    }

    #[test]
    fn test_client_config_partial_deserialization_some_fields() {
        let json = r#"{"api_url": "https://jobs.example.com", "poll_interval_ms": 500}"#;
        let config: ClientConfig = serde_json::from_str(json).expect("deserialize");
        assert_eq!(config.api_url, "https://jobs.example.com"); // overridden
        assert_eq!(config.poll_interval(), Duration::from_millis(500)); // overridden
        assert_eq!(config.max_poll_attempts, 150); // default
    }

    #[test]
    fn test_client_config_duration_helpers() {
        let config = ClientConfig::default();
        assert_eq!(config.poll_interval(), Duration::from_secs(2));
        assert_eq!(config.settle_delay(), Duration::from_secs(1));
        assert_eq!(config.catalog_freshness(), Duration::from_secs(5));
        assert_eq!(config.request_timeout(), Duration::from_secs(30));
        assert_eq!(config.search_debounce(), Duration::ZERO);
    }

    #[test]
    fn test_client_config_serde_roundtrip() {
        let config = ClientConfig {
            api_key: Some("secret".to_string()),
            delete_falls_back_to_execution_id: true,
            ..Default::default()
        };
        let json = serde_json::to_string(&config).expect("serialize");
        let deserialized: ClientConfig = serde_json::from_str(&json).expect("deserialize");
        assert_eq!(deserialized.api_key.as_deref(), Some("secret"));
        assert!(deserialized.delete_falls_back_to_execution_id);
        assert_eq!(deserialized.page_size, config.page_size);
    }
}
