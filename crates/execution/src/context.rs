use std::sync::Arc;

use fdq_common::{EngineConfig, ZeroDenominatorPolicy};

/// Per-run settings every operator reads.
#[derive(Debug, Clone, Default)]
pub struct TaskContext {
    pub config: EngineConfig,
}

impl TaskContext {
    pub fn new(config: EngineConfig) -> Self {
        Self { config }
    }

    pub fn batch_size_rows(&self) -> usize {
        self.config.batch_size_rows
    }

    /// `numerator * 100 / denominator` rounded to the configured precision;
    /// a zero denominator follows the configured policy.
    pub fn percent(&self, numerator: i64, denominator: i64) -> Option<f64> {
        if denominator == 0 {
            return match self.config.zero_denominator {
                ZeroDenominatorPolicy::Null => None,
                ZeroDenominatorPolicy::Zero => Some(0.0),
            };
        }
        let raw = numerator as f64 * 100.0 / denominator as f64;
        Some(crate::scalar::round_to(raw, self.config.percent_decimals))
    }
}

pub type SharedTaskContext = Arc<TaskContext>;
