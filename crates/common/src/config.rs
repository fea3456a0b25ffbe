use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{FdqError, Result};

/// What a percentage/rate evaluates to when its denominator is zero.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ZeroDenominatorPolicy {
    #[default]
    Null,
    Zero,
}

/// Inclusive range of clock hours, e.g. `12..=14`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct HourWindow {
    pub start_hour: u32,
    pub end_hour: u32,
}

impl HourWindow {
    pub const fn new(start_hour: u32, end_hour: u32) -> Self {
        Self {
            start_hour,
            end_hour,
        }
    }

    pub fn contains(&self, hour: u32) -> bool {
        hour >= self.start_hour && hour <= self.end_hour
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Row limit applied by top-N reports.
    pub default_top_n: usize,
    pub percent_decimals: u32,
    pub money_decimals: u32,
    pub zero_denominator: ZeroDenominatorPolicy,
    /// Read fresh rollup tables instead of raw orders where a report allows it.
    pub use_rollups: bool,
    pub peak_windows: Vec<HourWindow>,
    pub high_value_threshold: f64,
    pub delayed_threshold_min: f64,
    pub high_spender_threshold: f64,
    pub medium_spender_threshold: f64,
    /// Minimum orders before a restaurant is ranked by cancellation rate.
    pub min_orders_for_rate: i64,
    pub batch_size_rows: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            default_top_n: 10,
            percent_decimals: 2,
            money_decimals: 2,
            zero_denominator: ZeroDenominatorPolicy::Null,
            use_rollups: false,
            peak_windows: vec![HourWindow::new(12, 14), HourWindow::new(19, 22)],
            high_value_threshold: 1000.0,
            delayed_threshold_min: 45.0,
            high_spender_threshold: 5000.0,
            medium_spender_threshold: 2000.0,
            min_orders_for_rate: 10,
            batch_size_rows: 8192,
        }
    }
}

impl EngineConfig {
    /// Load a config from a JSON file. Missing keys keep their defaults.
    pub fn load_from_json(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let s = fs::read_to_string(path)?;
        let cfg: Self = serde_json::from_str(&s).map_err(|e| {
            FdqError::InvalidConfig(format!("config {} is not valid: {e}", path.display()))
        })?;
        cfg.validate()?;
        Ok(cfg)
    }

    pub fn validate(&self) -> Result<()> {
        if self.batch_size_rows == 0 {
            return Err(FdqError::InvalidConfig(
                "batch_size_rows must be greater than zero".to_string(),
            ));
        }
        for w in &self.peak_windows {
            if w.start_hour > w.end_hour || w.end_hour > 23 {
                return Err(FdqError::InvalidConfig(format!(
                    "invalid peak window {}..={}",
                    w.start_hour, w.end_hour
                )));
            }
        }
        if self.medium_spender_threshold > self.high_spender_threshold {
            return Err(FdqError::InvalidConfig(
                "medium_spender_threshold exceeds high_spender_threshold".to_string(),
            ));
        }
        Ok(())
    }

    pub fn is_peak_hour(&self, hour: u32) -> bool {
        self.peak_windows.iter().any(|w| w.contains(hour))
    }
}
