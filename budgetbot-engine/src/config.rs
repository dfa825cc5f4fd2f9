use crate::{EngineError, LookaheadWindow, Result};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Scheduler and worker pool configuration.
///
/// Deserializes from JSON with every field optional:
///
/// ```json
/// { "poll_interval_ms": 10000, "workers": 4, "queue_capacity": 64,
///   "lookahead": { "weekly": 13, "monthly": 3, "yearly": 1 } }
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// How often the materialization loop polls for due occurrences
    pub poll_interval_ms: u64,
    /// Concurrent materialization workers
    pub workers: usize,
    /// Jobs buffered before submission blocks the poller
    pub queue_capacity: usize,
    pub lookahead: LookaheadWindow,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: 10_000,
            workers: 4,
            queue_capacity: 64,
            lookahead: LookaheadWindow::default(),
        }
    }
}

impl EngineConfig {
    pub fn from_json(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json)
            .map_err(|e| EngineError::InvalidArgument(format!("engine config: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval_ms = u64::try_from(interval.as_millis()).unwrap_or(u64::MAX);
        self
    }

    pub fn with_workers(mut self, workers: usize) -> Self {
        self.workers = workers;
        self
    }

    pub fn with_queue_capacity(mut self, capacity: usize) -> Self {
        self.queue_capacity = capacity;
        self
    }

    pub fn with_lookahead(mut self, lookahead: LookaheadWindow) -> Self {
        self.lookahead = lookahead;
        self
    }

    pub fn validate(&self) -> Result<()> {
        if self.poll_interval_ms == 0 {
            return Err(EngineError::InvalidArgument(
                "poll interval must be positive".to_string(),
            ));
        }
        if self.workers == 0 {
            return Err(EngineError::InvalidArgument(
                "worker count must be positive".to_string(),
            ));
        }
        if self.queue_capacity == 0 {
            return Err(EngineError::InvalidArgument(
                "queue capacity must be positive".to_string(),
            ));
        }
        let window = &self.lookahead;
        if window.weekly == 0 || window.monthly == 0 || window.yearly == 0 {
            return Err(EngineError::InvalidArgument(
                "lookahead counts must be positive".to_string(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = EngineConfig::default();
        assert_eq!(config.poll_interval(), Duration::from_secs(10));
        assert_eq!(config.workers, 4);
        assert_eq!(config.lookahead, LookaheadWindow::default());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_partial_json() {
        let config = EngineConfig::from_json(r#"{ "workers": 8, "lookahead": { "weekly": 4 } }"#)
            .unwrap();
        assert_eq!(config.workers, 8);
        assert_eq!(config.poll_interval_ms, 10_000);
        assert_eq!(config.lookahead.weekly, 4);
        assert_eq!(config.lookahead.monthly, 3);
    }

    #[test]
    fn test_invalid_values_rejected() {
        assert!(EngineConfig::default().with_workers(0).validate().is_err());
        assert!(EngineConfig::default()
            .with_queue_capacity(0)
            .validate()
            .is_err());
        assert!(EngineConfig::default()
            .with_poll_interval(Duration::ZERO)
            .validate()
            .is_err());
        assert!(EngineConfig::from_json(r#"{ "workers": "many" }"#).is_err());
    }
}
