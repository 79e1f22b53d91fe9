//! Integration test: cross-validated random search

use kolosal_compose::error::KolosalError;
use kolosal_compose::optimizer::{cross_val_score, CVStrategy, CrossValidator, TrialStatus};
use kolosal_compose::prelude::*;
use serde_json::Value;

mod common;

use common::{classification_data, op};

fn scaler_then_choice() -> Operator {
    let either = choice(&[common::classifier(), common::broken_classifier()]).unwrap();
    sequence(&op("StandardScaler"), &either).unwrap()
}

fn config(n_trials: usize) -> OptimizationConfig {
    OptimizationConfig::new()
        .with_n_trials(n_trials)
        .with_cv_folds(4)
        .with_random_state(11)
}

#[test]
fn test_cross_val_score() {
    let (x, y) = classification_data();
    let trainable = common::classifier().bind(&Value::Null).unwrap();
    let validator = CrossValidator::new(CVStrategy::StratifiedKFold { n_splits: 4, shuffle: true }).with_random_state(3);

    let result = cross_val_score(&trainable, &x, &y, &validator, Scoring::Accuracy).unwrap();
    assert_eq!(result.fold_scores.len(), 4);
    assert!(result.mean_score > 0.8, "mean {}", result.mean_score);

    let err = cross_val_score(&common::classifier(), &x, &y, &validator, Scoring::Accuracy).unwrap_err();
    assert!(matches!(err, KolosalError::State { .. }));
}

#[test]
fn test_failed_trials_do_not_abort_search() {
    let (x, y) = classification_data();
    let op = scaler_then_choice();
    let study = Optimizer::new(config(20)).optimize(&op, &x, &y).unwrap();

    assert_eq!(study.trials.len(), 20);
    for trial in &study.trials {
        if trial.arm == "KNeighborsClassifier" {
            assert!(matches!(trial.status, TrialStatus::Failed { .. }));
            assert!(trial.score.is_finite());
        } else {
            assert!(trial.is_complete(), "{:?}", trial.status);
        }
    }

    let best = study.best_trial().unwrap();
    assert!(best.is_complete());
    assert_eq!(best.arm, "LogisticRegression");
}

#[test]
fn test_all_trials_failing_leaves_no_best() {
    let (x, y) = classification_data();
    let op = sequence(&op("MinMaxScaler"), &common::broken_classifier()).unwrap();
    let optimizer = Optimizer::new(config(5));
    let study = optimizer.optimize(&op, &x, &y).unwrap();

    assert_eq!(study.n_failed(), 5);
    assert!(study.best_trial().is_none());
    assert!(optimizer.best_operator(&op, &study, &x, &y).is_err());
}

#[test]
fn test_nan_scores_fail_the_trial() {
    let (x, y) = classification_data();
    let op = sequence(&op("MinMaxScaler"), &common::nan_estimator()).unwrap();
    let optimizer = Optimizer::new(
        config(3)
            .with_scoring(Scoring::MeanSquaredError)
            .with_stratified(false),
    );
    let study = optimizer.optimize(&op, &x, &y).unwrap();

    assert_eq!(study.trials.len(), 3);
    for trial in &study.trials {
        assert_eq!(trial.status, TrialStatus::Failed { reason: "non-finite score".to_string() });
        assert_eq!(trial.score, f64::MAX);
        assert!(trial.fold_scores.is_empty());
    }
    assert!(study.best_trial().is_none());

    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("study.json");
    study.save(&path).unwrap();
    let loaded = Study::load(&path).unwrap();
    assert_eq!(loaded.n_failed(), 3);
    assert!(loaded.best_trial_idx.is_none());
}

#[test]
fn test_parallel_search_matches_sequential() {
    let (x, y) = classification_data();
    let op = scaler_then_choice();

    let sequential = Optimizer::new(config(12)).optimize(&op, &x, &y).unwrap();
    let parallel = Optimizer::new(config(12).with_n_jobs(3)).optimize(&op, &x, &y).unwrap();

    assert_eq!(sequential.trials.len(), parallel.trials.len());
    for (a, b) in sequential.trials.iter().zip(&parallel.trials) {
        assert_eq!(a.config, b.config);
        assert_eq!(a.score, b.score);
    }
    assert_eq!(sequential.best_trial_idx, parallel.best_trial_idx);
}

#[test]
fn test_best_operator_is_trained() {
    let (x, y) = classification_data();
    let op = scaler_then_choice();
    let optimizer = Optimizer::new(config(8));
    let study = optimizer.optimize(&op, &x, &y).unwrap();

    let trained = optimizer.best_operator(&op, &study, &x, &y).unwrap();
    assert_eq!(trained.state(), LifecycleState::Trained);
    let predictions = trained.predict(&x).unwrap();
    assert_eq!(predictions.len(), x.nrows());
}

#[test]
fn test_study_save_and_load() {
    let (x, y) = classification_data();
    let study = Optimizer::new(config(6)).optimize(&scaler_then_choice(), &x, &y).unwrap();

    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("study.json");
    study.save(&path).unwrap();

    let loaded = Study::load(&path).unwrap();
    assert_eq!(loaded.id, study.id);
    assert_eq!(loaded.trials.len(), study.trials.len());
    assert_eq!(loaded.best_trial_idx, study.best_trial_idx);
    assert_eq!(loaded.best_config(), study.best_config());
    assert_eq!(loaded.n_failed(), study.n_failed());
}

#[test]
fn test_early_stopping() {
    let (x, y) = classification_data();
    let op = sequence(&op("MinMaxScaler"), &common::classifier()).unwrap();
    let study = Optimizer::new(config(30).with_early_stopping(3)).optimize(&op, &x, &y).unwrap();
    assert!(study.trials.len() < 30);
    assert!(study.best_trial().is_some());
}
