//! Cross-validation of trainable operators

use super::scoring::Scoring;
use crate::error::{KolosalError, Result};
use crate::lifecycle::LifecycleState;
use crate::operator::Operator;
use ndarray::{Array1, Array2, Axis};
use rand::seq::SliceRandom;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::time::Instant;

/// Cross-validation strategy
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum CVStrategy {
    /// K-Fold cross-validation
    KFold { n_splits: usize, shuffle: bool },
    /// Stratified K-Fold (maintains class distribution)
    StratifiedKFold { n_splits: usize, shuffle: bool },
}

impl Default for CVStrategy {
    fn default() -> Self {
        CVStrategy::KFold { n_splits: 5, shuffle: true }
    }
}

/// A single train/test split
#[derive(Debug, Clone)]
pub struct CVSplit {
    pub train_indices: Vec<usize>,
    pub test_indices: Vec<usize>,
    pub fold_idx: usize,
}

/// Cross-validation splitter
#[derive(Debug, Clone)]
pub struct CrossValidator {
    strategy: CVStrategy,
    random_state: Option<u64>,
}

impl CrossValidator {
    /// Create a new cross-validator
    pub fn new(strategy: CVStrategy) -> Self {
        Self {
            strategy,
            random_state: None,
        }
    }

    /// Set random state for reproducibility
    pub fn with_random_state(mut self, seed: u64) -> Self {
        self.random_state = Some(seed);
        self
    }

    pub fn strategy(&self) -> &CVStrategy {
        &self.strategy
    }

    fn rng(&self) -> ChaCha8Rng {
        match self.random_state {
            Some(seed) => ChaCha8Rng::seed_from_u64(seed),
            None => ChaCha8Rng::from_entropy(),
        }
    }

    /// Generate train/test splits
    pub fn split(&self, n_samples: usize, y: Option<&Array1<f64>>) -> Result<Vec<CVSplit>> {
        match &self.strategy {
            CVStrategy::KFold { n_splits, shuffle } => self.k_fold_split(n_samples, *n_splits, *shuffle),
            CVStrategy::StratifiedKFold { n_splits, shuffle } => {
                let y = y.ok_or_else(|| {
                    KolosalError::Config("StratifiedKFold requires target array".to_string())
                })?;
                self.stratified_k_fold_split(n_samples, y, *n_splits, *shuffle)
            }
        }
    }

    fn check_sizes(n_samples: usize, n_splits: usize) -> Result<()> {
        if n_splits < 2 {
            return Err(KolosalError::Config("n_splits must be at least 2".to_string()));
        }
        if n_samples < n_splits {
            return Err(KolosalError::Config(format!(
                "n_samples ({}) must be >= n_splits ({})",
                n_samples, n_splits
            )));
        }
        Ok(())
    }

    fn k_fold_split(&self, n_samples: usize, n_splits: usize, shuffle: bool) -> Result<Vec<CVSplit>> {
        Self::check_sizes(n_samples, n_splits)?;

        let mut indices: Vec<usize> = (0..n_samples).collect();
        if shuffle {
            indices.shuffle(&mut self.rng());
        }

        let base = n_samples / n_splits;
        let remainder = n_samples % n_splits;

        let mut splits = Vec::with_capacity(n_splits);
        let mut current = 0;
        for fold_idx in 0..n_splits {
            let fold_size = if fold_idx < remainder { base + 1 } else { base };
            let test_indices: Vec<usize> = indices[current..current + fold_size].to_vec();
            let train_indices: Vec<usize> = indices[..current]
                .iter()
                .chain(indices[current + fold_size..].iter())
                .copied()
                .collect();

            splits.push(CVSplit {
                train_indices,
                test_indices,
                fold_idx,
            });
            current += fold_size;
        }

        Ok(splits)
    }

    fn stratified_k_fold_split(
        &self,
        n_samples: usize,
        y: &Array1<f64>,
        n_splits: usize,
        shuffle: bool,
    ) -> Result<Vec<CVSplit>> {
        Self::check_sizes(n_samples, n_splits)?;
        if y.len() != n_samples {
            return Err(KolosalError::Config(format!(
                "{} targets for {} samples",
                y.len(),
                n_samples
            )));
        }

        // Group samples by class, in class order
        let mut class_indices: BTreeMap<i64, Vec<usize>> = BTreeMap::new();
        for (idx, &val) in y.iter().enumerate() {
            class_indices.entry(val.round() as i64).or_default().push(idx);
        }

        if shuffle {
            let mut rng = self.rng();
            for indices in class_indices.values_mut() {
                indices.shuffle(&mut rng);
            }
        }

        // Deal each class round-robin, continuing where the previous class stopped
        let mut folds: Vec<Vec<usize>> = vec![Vec::new(); n_splits];
        let mut next = 0;
        for indices in class_indices.values() {
            for &idx in indices {
                folds[next % n_splits].push(idx);
                next += 1;
            }
        }

        let splits = (0..n_splits)
            .map(|fold_idx| CVSplit {
                test_indices: folds[fold_idx].clone(),
                train_indices: folds
                    .iter()
                    .enumerate()
                    .filter(|(i, _)| *i != fold_idx)
                    .flat_map(|(_, f)| f.iter().copied())
                    .collect(),
                fold_idx,
            })
            .collect();

        Ok(splits)
    }
}

/// Scores of one cross-validation run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CvResult {
    pub fold_scores: Vec<f64>,
    pub mean_score: f64,
    pub mean_fit_secs: f64,
}

/// Fit a trainable operator on every training split and score its test predictions
pub fn cross_val_score(
    op: &Operator,
    x: &Array2<f64>,
    y: &Array1<f64>,
    validator: &CrossValidator,
    scoring: Scoring,
) -> Result<CvResult> {
    let state = op.state();
    if state != LifecycleState::Trainable {
        return Err(KolosalError::state("cross_val_score", LifecycleState::Trainable, state));
    }
    if x.nrows() != y.len() {
        return Err(KolosalError::Config(format!(
            "{} targets for {} samples",
            y.len(),
            x.nrows()
        )));
    }

    let splits = validator.split(x.nrows(), Some(y))?;
    let mut fold_scores = Vec::with_capacity(splits.len());
    let mut fit_secs = 0.0;

    for split in &splits {
        let x_train = x.select(Axis(0), &split.train_indices);
        let y_train = y.select(Axis(0), &split.train_indices);
        let x_test = x.select(Axis(0), &split.test_indices);
        let y_test = y.select(Axis(0), &split.test_indices);

        let start = Instant::now();
        let trained = op.execute(&x_train, Some(&y_train))?;
        fit_secs += start.elapsed().as_secs_f64();

        let predictions = trained.predict(&x_test)?;
        fold_scores.push(scoring.score(&y_test, &predictions)?);
    }

    let n = fold_scores.len().max(1) as f64;
    Ok(CvResult {
        mean_score: fold_scores.iter().sum::<f64>() / n,
        mean_fit_secs: fit_secs / n,
        fold_scores,
    })
}
