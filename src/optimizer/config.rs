//! Optimization configuration

use super::scoring::Scoring;
use crate::error::{KolosalError, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Direction of optimization
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OptimizeDirection {
    Minimize,
    Maximize,
}

impl OptimizeDirection {
    /// Finite worst score, recorded for failed trials
    pub fn worst(self) -> f64 {
        match self {
            OptimizeDirection::Minimize => f64::MAX,
            OptimizeDirection::Maximize => -f64::MAX,
        }
    }

    /// True if `a` improves on `b` by more than `margin`
    pub fn improves(self, a: f64, b: f64, margin: f64) -> bool {
        match self {
            OptimizeDirection::Minimize => a < b - margin,
            OptimizeDirection::Maximize => a > b + margin,
        }
    }
}

/// Configuration for pipeline search
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OptimizationConfig {
    /// Number of trials to run
    pub n_trials: usize,

    /// Maximum time in seconds; no new trial starts afterwards
    pub timeout_secs: Option<f64>,

    /// Number of parallel workers
    pub n_jobs: usize,

    /// Random seed for sampling and fold shuffling
    pub random_state: Option<u64>,

    /// Cross-validation folds for evaluation
    pub cv_folds: usize,

    /// Keep the class distribution in every fold
    pub stratified: bool,

    /// Metric to optimize
    pub scoring: Scoring,

    /// Stop after this many trials without improvement (sequential runs only)
    pub early_stopping_patience: Option<usize>,

    /// Minimum improvement to consider
    pub min_improvement: f64,
}

impl Default for OptimizationConfig {
    fn default() -> Self {
        Self {
            n_trials: 50,
            timeout_secs: None,
            n_jobs: 1,
            random_state: Some(42),
            cv_folds: 5,
            stratified: true,
            scoring: Scoring::Accuracy,
            early_stopping_patience: None,
            min_improvement: 1e-6,
        }
    }
}

impl OptimizationConfig {
    /// Create a new configuration
    pub fn new() -> Self {
        Self::default()
    }

    /// Load a configuration from a JSON file; missing fields take their defaults
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)?;
        let config: Self = serde_json::from_str(&text)
            .map_err(|e| KolosalError::Config(format!("{}: {}", path.display(), e)))?;
        config.validate()?;
        Ok(config)
    }

    /// Reject settings the optimizer cannot run with
    pub fn validate(&self) -> Result<()> {
        if self.cv_folds < 2 {
            return Err(KolosalError::Config(format!(
                "cv_folds must be at least 2, got {}",
                self.cv_folds
            )));
        }
        if self.n_jobs == 0 {
            return Err(KolosalError::Config("n_jobs must be at least 1".to_string()));
        }
        if let Some(t) = self.timeout_secs {
            if t.is_nan() || t <= 0.0 {
                return Err(KolosalError::Config(format!("timeout_secs must be positive, got {}", t)));
            }
        }
        Ok(())
    }

    /// Optimization direction of the configured metric
    pub fn direction(&self) -> OptimizeDirection {
        self.scoring.direction()
    }

    /// Builder method to set number of trials
    pub fn with_n_trials(mut self, n: usize) -> Self {
        self.n_trials = n;
        self
    }

    /// Builder method to set timeout
    pub fn with_timeout(mut self, secs: f64) -> Self {
        self.timeout_secs = Some(secs);
        self
    }

    /// Builder method to enable parallel execution
    pub fn with_n_jobs(mut self, n: usize) -> Self {
        self.n_jobs = n;
        self
    }

    /// Builder method to set the random seed
    pub fn with_random_state(mut self, seed: u64) -> Self {
        self.random_state = Some(seed);
        self
    }

    /// Builder method to set the number of folds
    pub fn with_cv_folds(mut self, folds: usize) -> Self {
        self.cv_folds = folds;
        self
    }

    /// Builder method to toggle stratified folds
    pub fn with_stratified(mut self, stratified: bool) -> Self {
        self.stratified = stratified;
        self
    }

    /// Builder method to set the metric
    pub fn with_scoring(mut self, scoring: Scoring) -> Self {
        self.scoring = scoring;
        self
    }

    /// Builder method to enable early stopping
    pub fn with_early_stopping(mut self, patience: usize) -> Self {
        self.early_stopping_patience = Some(patience);
        self
    }
}
