//! Pipeline composition
//!
//! Provides:
//! - [`sequence`] / [`parallel`] / [`choice`] - checked combinators
//! - [`Graph`] - the DAG denoted by an operator
//! - [`parse`] - pipeline expressions such as `PCA >> (LogisticRegression | KNeighborsClassifier)`
//!
//! Combinators never mutate their operands; operands of the same kind are
//! flattened, so `(a >> b) >> c` and `a >> (b >> c)` denote the same pipeline.

mod expr;
mod graph;

pub use expr::parse;
pub use graph::{Graph, GraphNode};

use crate::error::{KolosalError, Result};
use crate::operator::{OpId, Operator, OperatorKind};
use crate::schema::{check_compatible, interchangeable};
use std::collections::BTreeSet;
use std::ops::{BitAnd, BitOr, Shr};
use tracing::debug;

/// Steps of a sequence, parallel or choice composite
#[derive(Debug, Clone)]
pub struct Composite {
    id: OpId,
    steps: Vec<Operator>,
}

impl Composite {
    pub(crate) fn new(steps: Vec<Operator>) -> Self {
        Self {
            id: OpId::fresh(),
            steps,
        }
    }

    pub fn id(&self) -> OpId {
        self.id
    }

    pub fn steps(&self) -> &[Operator] {
        &self.steps
    }

    /// Unique configuration keys of the steps, see [`step_keys`]
    pub fn step_keys(&self) -> Vec<String> {
        step_keys(&self.steps)
    }
}

/// Configuration keys of `steps`: the step name, suffixed `_1`, `_2`, ... on repeats
pub fn step_keys(steps: &[Operator]) -> Vec<String> {
    let mut used = BTreeSet::new();
    steps
        .iter()
        .map(|step| {
            let label = step.name();
            let mut key = label.to_string();
            let mut n = 0;
            while used.contains(&key) {
                n += 1;
                key = format!("{}_{}", label, n);
            }
            used.insert(key.clone());
            key
        })
        .collect()
}

/// Build a composite of `kind` without checks, flattening nested composites of the same kind
///
/// A single step stands for itself.
pub(crate) fn assemble(kind: OperatorKind, steps: Vec<Operator>) -> Operator {
    let mut flat = Vec::with_capacity(steps.len());
    for step in steps {
        if step.kind() == kind {
            flat.extend(step.steps().iter().cloned());
        } else {
            flat.push(step);
        }
    }
    if flat.len() == 1 {
        if let Some(only) = flat.pop() {
            return only;
        }
    }
    let composite = Composite::new(flat);
    match kind {
        OperatorKind::Sequence => Operator::Sequence(composite),
        OperatorKind::Parallel => Operator::Parallel(composite),
        OperatorKind::Choice | OperatorKind::Individual => Operator::Choice(composite),
    }
}

fn composition_error(op: &str, a: &Operator, b: &Operator, reason: impl std::fmt::Display) -> KolosalError {
    KolosalError::Composition(format!("cannot compose ({}) {} ({}): {}", a, op, b, reason))
}

fn shared_node(a: &Operator, b: &Operator) -> Option<OpId> {
    a.node_ids().intersection(&b.node_ids()).next().copied()
}

/// `a >> b`: `a`'s output feeds every ingress operator of `b`
pub fn sequence(a: &Operator, b: &Operator) -> Result<Operator> {
    let candidate = assemble(OperatorKind::Sequence, vec![a.clone(), b.clone()]);
    if candidate.graph().topological_order().is_err() {
        let node = shared_node(a, b).map(|id| id.to_string()).unwrap_or_default();
        return Err(composition_error(
            ">>",
            a,
            b,
            format!("operator {} appears on both sides, which would create a cycle", node),
        ));
    }

    let produced = a.output_schema();
    for ingress in b.ingress() {
        check_compatible(&produced, ingress.data_schemas().input()).map_err(|reason| {
            composition_error(
                ">>",
                a,
                b,
                format!("output does not fit the input of {}: {}", ingress.name(), reason),
            )
        })?;
    }

    debug!(pipeline = %candidate, "Composed sequence");
    Ok(candidate)
}

/// `a & b`: both branches see the same input; the output is the tuple of their outputs
pub fn parallel(a: &Operator, b: &Operator) -> Result<Operator> {
    if let Some(id) = shared_node(a, b) {
        return Err(composition_error("&", a, b, format!("operator {} appears more than once", id)));
    }
    interchangeable(&a.input_schema(), &b.input_schema())
        .map_err(|reason| composition_error("&", a, b, format!("branches take different inputs: {}", reason)))?;

    let composed = assemble(OperatorKind::Parallel, vec![a.clone(), b.clone()]);
    debug!(pipeline = %composed, "Composed parallel");
    Ok(composed)
}

/// `a | b | ...`: exactly one branch is selected when the operator is bound
pub fn choice(branches: &[Operator]) -> Result<Operator> {
    let first = branches
        .first()
        .ok_or_else(|| KolosalError::Composition("a choice needs at least one branch".to_string()))?;

    for (i, a) in branches.iter().enumerate() {
        for b in &branches[i + 1..] {
            if let Some(id) = shared_node(a, b) {
                return Err(composition_error("|", a, b, format!("operator {} appears more than once", id)));
            }
        }
    }

    for other in &branches[1..] {
        interchangeable(&first.input_schema(), &other.input_schema())
            .map_err(|reason| composition_error("|", first, other, format!("inputs differ: {}", reason)))?;
        interchangeable(&first.output_schema(), &other.output_schema())
            .map_err(|reason| composition_error("|", first, other, format!("outputs differ: {}", reason)))?;
    }

    let composed = assemble(OperatorKind::Choice, branches.to_vec());
    debug!(pipeline = %composed, "Composed choice");
    Ok(composed)
}

/// Sequence of all `steps`, left to right
pub fn make_pipeline(steps: &[Operator]) -> Result<Operator> {
    fold(steps, sequence, "pipeline")
}

/// Parallel composition of all `branches`
pub fn make_union(branches: &[Operator]) -> Result<Operator> {
    fold(branches, parallel, "union")
}

fn fold(
    operands: &[Operator],
    combine: fn(&Operator, &Operator) -> Result<Operator>,
    what: &str,
) -> Result<Operator> {
    let (first, rest) = operands
        .split_first()
        .ok_or_else(|| KolosalError::Composition(format!("an empty {} has no operators", what)))?;
    rest.iter().try_fold(first.clone(), |acc, next| combine(&acc, next))
}

impl Operator {
    /// `self >> next`
    pub fn then(&self, next: &Operator) -> Result<Operator> {
        sequence(self, next)
    }

    /// `self & other`
    pub fn and(&self, other: &Operator) -> Result<Operator> {
        parallel(self, other)
    }

    /// `self | other`
    pub fn or(&self, other: &Operator) -> Result<Operator> {
        choice(&[self.clone(), other.clone()])
    }
}

impl Shr for &Operator {
    type Output = Result<Operator>;

    fn shr(self, rhs: &Operator) -> Self::Output {
        sequence(self, rhs)
    }
}

impl BitAnd for &Operator {
    type Output = Result<Operator>;

    fn bitand(self, rhs: &Operator) -> Self::Output {
        parallel(self, rhs)
    }
}

impl BitOr for &Operator {
    type Output = Result<Operator>;

    fn bitor(self, rhs: &Operator) -> Self::Output {
        choice(&[self.clone(), rhs.clone()])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::operator::OperatorRegistry;

    fn op(name: &str) -> Operator {
        OperatorRegistry::builtin().unwrap().get(name).unwrap().into()
    }

    #[test]
    fn test_step_keys_dedupe() {
        let steps = vec![op("PCA"), op("PCA"), op("NoOp"), op("PCA")];
        assert_eq!(step_keys(&steps), vec!["PCA", "PCA_1", "NoOp", "PCA_2"]);
    }

    #[test]
    fn test_sequence_flattens() {
        let (a, b, c) = (op("StandardScaler"), op("PCA"), op("LogisticRegression"));
        let left = sequence(&sequence(&a, &b).unwrap(), &c).unwrap();
        let right = sequence(&a, &sequence(&b, &c).unwrap()).unwrap();
        assert_eq!(left.steps().len(), 3);
        assert_eq!(right.steps().len(), 3);
        assert_eq!(left.to_string(), right.to_string());
    }

    #[test]
    fn test_same_instance_twice_is_rejected() {
        let pca = op("PCA");
        let err = sequence(&pca, &pca).unwrap_err();
        assert!(err.to_string().contains("cycle"));

        let err = parallel(&pca, &pca).unwrap_err();
        assert!(err.to_string().contains("more than once"));

        let scaler = op("StandardScaler");
        let inner = sequence(&scaler, &pca).unwrap();
        assert!(choice(&[inner, pca.clone()]).is_err());
    }

    #[test]
    fn test_tuple_needs_concat() {
        let both = parallel(&op("PCA"), &op("StandardScaler")).unwrap();
        assert!(sequence(&both, &op("LogisticRegression")).is_err());
        let merged = sequence(&both, &op("ConcatFeatures")).unwrap();
        assert!(sequence(&merged, &op("LogisticRegression")).is_ok());
    }

    #[test]
    fn test_operator_sugar() {
        let pca = op("PCA");
        let lr = op("LogisticRegression");
        let knn = op("KNeighborsClassifier");
        let either = (&lr | &knn).unwrap();
        let pipeline = (&pca >> &either).unwrap();
        assert_eq!(pipeline.kind(), OperatorKind::Sequence);
        assert_eq!(pipeline.steps()[1].kind(), OperatorKind::Choice);
        assert!(pca.or(&lr).is_err());
    }

    #[test]
    fn test_make_pipeline() {
        let pipeline = make_pipeline(&[op("MinMaxScaler"), op("PCA"), op("DecisionTreeClassifier")]).unwrap();
        assert_eq!(pipeline.to_string(), "MinMaxScaler >> PCA >> DecisionTreeClassifier");
        assert!(make_pipeline(&[]).is_err());
        let union = make_union(&[op("PCA"), op("NoOp"), op("StandardScaler")]).unwrap();
        assert_eq!(union.steps().len(), 3);
    }
}
