//! Pipeline search driver

use super::config::{OptimizationConfig, OptimizeDirection};
use super::cross_validation::{cross_val_score, CVStrategy, CrossValidator};
use super::scoring::Scoring;
use crate::error::{KolosalError, Result};
use crate::operator::Operator;
use crate::search_space::{compile, Sample};
use chrono::{DateTime, Utc};
use ndarray::{Array1, Array2};
use rand::SeedableRng;
use rand_xoshiro::Xoshiro256PlusPlus;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::path::Path;
use std::time::Instant;
use tracing::{info, warn};
use uuid::Uuid;

/// Outcome of a trial
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum TrialStatus {
    Complete,
    /// Binding or fitting failed; the trial carries the worst score
    Failed { reason: String },
}

/// Result of a single trial
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrialResult {
    /// Trial number
    pub trial_id: usize,
    /// Label of the sampled arm
    pub arm: String,
    /// Sampled configuration, as passed to `bind`
    pub config: Value,
    /// Mean cross-validation score
    pub score: f64,
    pub fold_scores: Vec<f64>,
    /// Trial duration in seconds
    pub duration_secs: f64,
    #[serde(flatten)]
    pub status: TrialStatus,
}

impl TrialResult {
    pub fn is_complete(&self) -> bool {
        self.status == TrialStatus::Complete
    }
}

/// Study containing all trials
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Study {
    pub id: Uuid,
    pub created_at: DateTime<Utc>,
    /// Pipeline expression that was searched
    pub operator: String,
    pub scoring: Scoring,
    /// All trial results
    pub trials: Vec<TrialResult>,
    /// Best trial index
    pub best_trial_idx: Option<usize>,
    /// Total duration
    pub total_duration_secs: f64,
    /// Optimization direction
    pub direction: OptimizeDirection,
}

impl Study {
    /// Create a new study
    pub fn new(operator: impl Into<String>, scoring: Scoring) -> Self {
        Self {
            id: Uuid::new_v4(),
            created_at: Utc::now(),
            operator: operator.into(),
            scoring,
            trials: Vec::new(),
            best_trial_idx: None,
            total_duration_secs: 0.0,
            direction: scoring.direction(),
        }
    }

    /// Get the best trial
    pub fn best_trial(&self) -> Option<&TrialResult> {
        self.best_trial_idx.and_then(|idx| self.trials.get(idx))
    }

    /// Get the best value
    pub fn best_value(&self) -> Option<f64> {
        self.best_trial().map(|t| t.score)
    }

    /// Get the best configuration
    pub fn best_config(&self) -> Option<&Value> {
        self.best_trial().map(|t| &t.config)
    }

    pub fn n_failed(&self) -> usize {
        self.trials.iter().filter(|t| !t.is_complete()).count()
    }

    /// Add a trial result; failed trials never become best
    pub fn add_trial(&mut self, result: TrialResult) {
        let idx = self.trials.len();
        let is_better = result.is_complete()
            && result.score.is_finite()
            && match self.best_value() {
                None => true,
                Some(best) => self.direction.improves(result.score, best, 0.0),
            };
        if is_better {
            self.best_trial_idx = Some(idx);
        }
        self.trials.push(result);
    }

    /// Save study to a JSON file
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(path, json)?;
        Ok(())
    }

    /// Load study from a JSON file
    pub fn load(path: impl AsRef<Path>) -> Result<Study> {
        let json = std::fs::read_to_string(path)?;
        let study: Study = serde_json::from_str(&json)?;
        Ok(study)
    }
}

/// Random search over the compiled search space of an operator
pub struct Optimizer {
    config: OptimizationConfig,
}

impl Optimizer {
    /// Create a new optimizer
    pub fn new(config: OptimizationConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &OptimizationConfig {
        &self.config
    }

    fn validator(&self) -> CrossValidator {
        let strategy = if self.config.stratified {
            CVStrategy::StratifiedKFold { n_splits: self.config.cv_folds, shuffle: true }
        } else {
            CVStrategy::KFold { n_splits: self.config.cv_folds, shuffle: true }
        };
        let validator = CrossValidator::new(strategy);
        match self.config.random_state {
            Some(seed) => validator.with_random_state(seed),
            None => validator,
        }
    }

    /// Sample, bind and cross-validate configurations of `op`
    ///
    /// Configurations are drawn up front from the seeded generator, so the
    /// sampled trials do not depend on `n_jobs`.
    pub fn optimize(&self, op: &Operator, x: &Array2<f64>, y: &Array1<f64>) -> Result<Study> {
        self.config.validate()?;
        let space = compile(op)?;
        let mut rng = match self.config.random_state {
            Some(seed) => Xoshiro256PlusPlus::seed_from_u64(seed),
            None => Xoshiro256PlusPlus::from_entropy(),
        };
        let samples: Vec<Sample> = (0..self.config.n_trials)
            .map(|_| space.sample(&mut rng))
            .collect::<Result<_>>()?;

        info!(
            operator = %op,
            arms = space.n_arms(),
            trials = samples.len(),
            scoring = %self.config.scoring,
            "Starting search"
        );

        let validator = self.validator();
        let start = Instant::now();
        let timed_out = || {
            self.config
                .timeout_secs
                .map(|t| start.elapsed().as_secs_f64() > t)
                .unwrap_or(false)
        };

        let mut study = Study::new(op.to_string(), self.config.scoring);

        if self.config.n_jobs > 1 {
            let pool = rayon::ThreadPoolBuilder::new()
                .num_threads(self.config.n_jobs)
                .build()
                .map_err(|e| KolosalError::Config(format!("failed to start worker pool: {}", e)))?;
            let results: Vec<Option<TrialResult>> = pool.install(|| {
                samples
                    .par_iter()
                    .enumerate()
                    .map(|(trial_id, sample)| {
                        if timed_out() {
                            None
                        } else {
                            Some(self.evaluate(trial_id, sample, op, x, y, &validator))
                        }
                    })
                    .collect()
            });
            for result in results.into_iter().flatten() {
                study.add_trial(result);
            }
        } else {
            let mut trials_without_improvement = 0;
            for (trial_id, sample) in samples.iter().enumerate() {
                if timed_out() {
                    info!(trials = trial_id, "Timeout reached");
                    break;
                }
                if let Some(p) = self.config.early_stopping_patience {
                    if trials_without_improvement >= p {
                        info!(patience = p, "Early stopping without improvement");
                        break;
                    }
                }

                let result = self.evaluate(trial_id, sample, op, x, y, &validator);
                let improved = result.is_complete()
                    && match study.best_value() {
                        None => true,
                        Some(best) => self.config.direction().improves(result.score, best, self.config.min_improvement),
                    };
                if improved {
                    trials_without_improvement = 0;
                } else {
                    trials_without_improvement += 1;
                }
                study.add_trial(result);
            }
        }

        study.total_duration_secs = start.elapsed().as_secs_f64();
        info!(
            trials = study.trials.len(),
            failed = study.n_failed(),
            best = ?study.best_value(),
            elapsed_secs = study.total_duration_secs,
            "Search finished"
        );
        Ok(study)
    }

    fn evaluate(
        &self,
        trial_id: usize,
        sample: &Sample,
        op: &Operator,
        x: &Array2<f64>,
        y: &Array1<f64>,
        validator: &CrossValidator,
    ) -> TrialResult {
        let trial_start = Instant::now();
        let outcome = op
            .bind(&sample.config)
            .and_then(|bound| cross_val_score(&bound, x, y, validator, self.config.scoring));

        let (score, fold_scores, status) = match outcome {
            Ok(cv) if !cv.mean_score.is_finite() => {
                warn!(trial = trial_id, arm = %sample.label, score = cv.mean_score, "Trial produced a non-finite score");
                (
                    self.config.direction().worst(),
                    Vec::new(),
                    TrialStatus::Failed { reason: "non-finite score".to_string() },
                )
            }
            Ok(cv) => {
                info!(trial = trial_id, arm = %sample.label, score = cv.mean_score, "Trial complete");
                (cv.mean_score, cv.fold_scores, TrialStatus::Complete)
            }
            Err(e) => {
                warn!(trial = trial_id, arm = %sample.label, error = %e, "Trial failed");
                (
                    self.config.direction().worst(),
                    Vec::new(),
                    TrialStatus::Failed { reason: e.to_string() },
                )
            }
        };

        TrialResult {
            trial_id,
            arm: sample.label.clone(),
            config: sample.config.clone(),
            score,
            fold_scores,
            duration_secs: trial_start.elapsed().as_secs_f64(),
            status,
        }
    }

    /// Bind the best configuration of `study` and fit it on all data
    pub fn best_operator(&self, op: &Operator, study: &Study, x: &Array2<f64>, y: &Array1<f64>) -> Result<Operator> {
        let config = study
            .best_config()
            .ok_or_else(|| KolosalError::SearchSpace("study has no successful trial".to_string()))?;
        op.bind(config)?.execute(x, Some(y))
    }
}
