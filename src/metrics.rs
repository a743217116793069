//! Observability metrics for pipeline operations.
//!
//! Tracks time spent and stages run on each axis of the most recent
//! decorator operation. Snapshots are plain serializable values so callers
//! can export them to whatever metrics sink they use.

use serde::{Deserialize, Serialize};

/// Metrics snapshot for the last decorator operation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OperationMetrics {
    /// Key-axis transform time in microseconds (0 if no key stages ran)
    pub key_time_micros: u64,

    /// Value-axis transform time in microseconds (0 if no value stages ran)
    pub value_time_micros: u64,

    /// Number of key stages executed
    pub key_stages: u32,

    /// Number of value stages executed
    pub value_stages: u32,

    /// Size of the encoded value in bytes (None when the payload left the
    /// pipeline in structured form or the operation carried no value)
    pub value_bytes: Option<u64>,
}

impl OperationMetrics {
    /// Create new empty metrics
    pub fn new() -> Self {
        OperationMetrics {
            key_time_micros: 0,
            value_time_micros: 0,
            key_stages: 0,
            value_stages: 0,
            value_bytes: None,
        }
    }

    /// Set key-axis metrics
    pub fn with_key(mut self, time_micros: u64, stages: u32) -> Self {
        self.key_time_micros = time_micros;
        self.key_stages = stages;
        self
    }

    /// Set value-axis metrics
    pub fn with_value(mut self, time_micros: u64, stages: u32, bytes: Option<u64>) -> Self {
        self.value_time_micros = time_micros;
        self.value_stages = stages;
        self.value_bytes = bytes;
        self
    }

    /// Total transform time in microseconds across both axes
    pub fn total_time_micros(&self) -> u64 {
        self.key_time_micros + self.value_time_micros
    }
}

impl Default for OperationMetrics {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_metrics_creation() {
        let metrics = OperationMetrics::new();
        assert_eq!(metrics.key_time_micros, 0);
        assert_eq!(metrics.value_time_micros, 0);
        assert_eq!(metrics.key_stages, 0);
        assert_eq!(metrics.value_stages, 0);
        assert_eq!(metrics.value_bytes, None);
    }

    #[test]
    fn test_axis_setters() {
        let metrics = OperationMetrics::new()
            .with_key(40, 2)
            .with_value(100, 3, Some(512));

        assert_eq!(metrics.key_time_micros, 40);
        assert_eq!(metrics.key_stages, 2);
        assert_eq!(metrics.value_time_micros, 100);
        assert_eq!(metrics.value_stages, 3);
        assert_eq!(metrics.value_bytes, Some(512));
    }

    #[test]
    fn test_total_time() {
        let metrics = OperationMetrics::new()
            .with_key(40, 1)
            .with_value(100, 2, None);

        assert_eq!(metrics.total_time_micros(), 140);
    }
}
