//! Client configuration

use serde::{Deserialize, Serialize};
use std::time::Duration;
use txstream_core::TransmitterConfig;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClientConfig {
    /// Batching settings shared by every transaction of the client
    pub transmitter: TransmitterConfig,

    /// Maximum time to establish the gRPC connection
    pub connect_timeout: Duration,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            transmitter: TransmitterConfig::default(),
            connect_timeout: Duration::from_secs(10),
        }
    }
}

impl ClientConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_transmitter(mut self, transmitter: TransmitterConfig) -> Self {
        self.transmitter = transmitter;
        self
    }

    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<(), String> {
        if self.connect_timeout.is_zero() {
            return Err("connect_timeout must be greater than 0".to_string());
        }
        self.transmitter.validate()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        let config = ClientConfig::default();
        assert_eq!(config.connect_timeout, Duration::from_secs(10));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validate_checks_transmitter() {
        let config = ClientConfig::new().with_transmitter(
            TransmitterConfig::new().with_batch_window_small(Duration::ZERO),
        );
        assert!(config.validate().is_err());

        let config = ClientConfig::new().with_connect_timeout(Duration::ZERO);
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_json_round_trip() {
        let config = ClientConfig::new().with_connect_timeout(Duration::from_millis(2500));
        let json = serde_json::to_string(&config).unwrap();
        let decoded: ClientConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(decoded, config);
    }
}
