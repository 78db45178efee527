use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Default maximum encoded size of one client frame
pub const DEFAULT_MAX_FRAME_BYTES: usize = 1_000_000;

/// Request batching configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransmitterConfig {
    /// Delay before the first flush after an idle dispatcher receives a request.
    /// Kept short so sparse traffic barely waits.
    pub batch_window_small: Duration,

    /// Delay between subsequent flushes while requests keep arriving.
    /// Longer, so busy transactions write fewer, larger frames.
    pub batch_window_large: Duration,

    /// Maximum encoded size of one client frame. A flush that would exceed it
    /// is split into several frames, still in order.
    pub max_frame_bytes: usize,
}

impl Default for TransmitterConfig {
    fn default() -> Self {
        Self {
            batch_window_small: Duration::from_millis(1),
            batch_window_large: Duration::from_millis(3),
            max_frame_bytes: DEFAULT_MAX_FRAME_BYTES,
        }
    }
}

impl TransmitterConfig {
    /// Create a new configuration with default values
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the first-flush window
    pub fn with_batch_window_small(mut self, window: Duration) -> Self {
        self.batch_window_small = window;
        self
    }

    /// Set the drain window used while traffic keeps flowing
    pub fn with_batch_window_large(mut self, window: Duration) -> Self {
        self.batch_window_large = window;
        self
    }

    /// Set the maximum frame size in bytes
    pub fn with_max_frame_bytes(mut self, bytes: usize) -> Self {
        self.max_frame_bytes = bytes;
        self
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<(), String> {
        if self.batch_window_small.is_zero() {
            return Err("batch_window_small must be greater than 0".to_string());
        }

        if self.batch_window_large.is_zero() {
            return Err("batch_window_large must be greater than 0".to_string());
        }

        if self.batch_window_small > self.batch_window_large {
            return Err("batch_window_small must not exceed batch_window_large".to_string());
        }

        if self.max_frame_bytes == 0 {
            return Err("max_frame_bytes must be greater than 0".to_string());
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = TransmitterConfig::default();
        assert_eq!(config.batch_window_small, Duration::from_millis(1));
        assert_eq!(config.batch_window_large, Duration::from_millis(3));
        assert_eq!(config.max_frame_bytes, DEFAULT_MAX_FRAME_BYTES);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_builder_methods() {
        let config = TransmitterConfig::new()
            .with_batch_window_small(Duration::from_millis(2))
            .with_batch_window_large(Duration::from_millis(10))
            .with_max_frame_bytes(4096);

        assert_eq!(config.batch_window_small, Duration::from_millis(2));
        assert_eq!(config.batch_window_large, Duration::from_millis(10));
        assert_eq!(config.max_frame_bytes, 4096);
    }

    #[test]
    fn test_validate_zero_window() {
        let config = TransmitterConfig::new().with_batch_window_small(Duration::ZERO);
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_inverted_windows() {
        let config = TransmitterConfig::new()
            .with_batch_window_small(Duration::from_millis(5))
            .with_batch_window_large(Duration::from_millis(1));
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_zero_frame_size() {
        let config = TransmitterConfig::new().with_max_frame_bytes(0);
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_json_round_trip() {
        let config = TransmitterConfig::new().with_max_frame_bytes(2048);
        let json = serde_json::to_string(&config).unwrap();
        let parsed: TransmitterConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, config);
    }
}
