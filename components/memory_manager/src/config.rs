//! Heap sizing configuration

use serde::{Deserialize, Serialize};

/// Heap sizing policy
///
/// A collection runs when an allocation would push the heap past
/// `threshold`. After each collection the threshold becomes the live size
/// times `growth_factor`, never less than `initial_threshold_bytes` and never
/// more than `capacity_bytes`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HeapConfig {
    /// Hard limit on accounted bytes
    pub capacity_bytes: usize,
    /// Threshold for the first collection
    pub initial_threshold_bytes: usize,
    /// Threshold multiplier applied to the live size after a collection
    pub growth_factor: f64,
}

impl Default for HeapConfig {
    fn default() -> Self {
        Self {
            capacity_bytes: 64 * 1024 * 1024,
            initial_threshold_bytes: 1024 * 1024,
            growth_factor: 2.0,
        }
    }
}

impl HeapConfig {
    /// Create a config with default sizing
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the hard capacity
    pub fn with_capacity(mut self, bytes: usize) -> Self {
        self.capacity_bytes = bytes;
        self
    }

    /// Set the first collection threshold
    pub fn with_initial_threshold(mut self, bytes: usize) -> Self {
        self.initial_threshold_bytes = bytes;
        self
    }

    /// Set the threshold growth factor
    pub fn with_growth_factor(mut self, factor: f64) -> Self {
        self.growth_factor = factor;
        self
    }

    /// Describe the first inconsistency, if any
    pub fn validate(&self) -> Result<(), String> {
        if self.capacity_bytes == 0 {
            return Err("heap capacity must be non-zero".to_string());
        }
        if self.growth_factor.is_nan() || self.growth_factor < 1.0 {
            return Err(format!(
                "heap growth factor must be at least 1.0, got {}",
                self.growth_factor
            ));
        }
        Ok(())
    }
}
