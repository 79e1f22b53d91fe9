//! Pipeline search
//!
//! Provides:
//! - Random search over compiled search spaces ([`Optimizer`])
//! - K-fold and stratified cross-validation ([`cross_val_score`])
//! - Scoring metrics and study persistence

mod config;
mod cross_validation;
mod optimizer;
mod scoring;

pub use config::{OptimizationConfig, OptimizeDirection};
pub use cross_validation::{cross_val_score, CVSplit, CVStrategy, CrossValidator, CvResult};
pub use optimizer::{Optimizer, Study, TrialResult, TrialStatus};
pub use scoring::Scoring;
