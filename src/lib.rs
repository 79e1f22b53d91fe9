//! kolosal-compose - Schema-driven composition of ML operators
//!
//! Operators declare their hyperparameters and data with JSON schemas. They
//! are composed into pipelines, choices and parallel branches, checked for
//! compatibility at composition time, and compiled into a search space that
//! a random-search optimizer samples from.
//!
//! # Modules
//!
//! - [`schema`] - JSON-schema subset, validation and data compatibility
//! - [`operator`] - Individual operators, the registry and the built-in catalog
//! - [`pipeline`] - Sequence, parallel and choice combinators, graphs and the expression parser
//! - [`lifecycle`] - Planned, trainable and trained operators, binding and fitting
//! - [`search_space`] - Search-space compilation and sampling
//! - [`optimizer`] - Cross-validated random search
//! - [`cli`] - Command-line interface
//!
//! # Example
//!
//! ```no_run
//! use kolosal_compose::prelude::*;
//!
//! let registry = OperatorRegistry::builtin()?;
//! let op = parse("PCA >> (LogisticRegression | KNeighborsClassifier)", &registry)?;
//! let space = compile(&op)?;
//! assert_eq!(space.n_arms(), 2);
//! # Ok::<(), kolosal_compose::error::KolosalError>(())
//! ```

pub mod error;

pub mod schema;
pub mod operator;
pub mod pipeline;
pub mod lifecycle;
pub mod search_space;
pub mod optimizer;

pub mod cli;

pub use error::{KolosalError, Result};

/// Commonly used types
pub mod prelude {
    pub use crate::error::{KolosalError, Result, ValidationError};
    pub use crate::lifecycle::LifecycleState;
    pub use crate::operator::{Estimator, FittedModel, Hyperparams, IndividualOp, Operator, OperatorRegistry};
    pub use crate::pipeline::{choice, make_pipeline, make_union, parallel, parse, sequence};
    pub use crate::schema::{validate, Schema};
    pub use crate::search_space::{compile, SearchSpace};
    pub use crate::optimizer::{OptimizationConfig, Optimizer, Scoring, Study};
}
