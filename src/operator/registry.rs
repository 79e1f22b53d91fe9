//! Process-wide operator registry
//!
//! The registry is assembled at start-up (built-in catalog plus any
//! declarations loaded from JSON files), installed once, and read-only
//! afterwards.

use super::catalog;
use super::individual::{Declaration, IndividualOp};
use crate::error::{KolosalError, Result};
use std::collections::BTreeMap;
use std::fs::File;
use std::io::BufReader;
use std::path::Path;
use std::sync::OnceLock;
use tracing::debug;

static GLOBAL: OnceLock<OperatorRegistry> = OnceLock::new();

/// Catalog of declared operators by name
#[derive(Debug, Clone, Default)]
pub struct OperatorRegistry {
    operators: BTreeMap<String, IndividualOp>,
}

impl OperatorRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry holding the built-in catalog
    pub fn builtin() -> Result<Self> {
        let mut registry = Self::new();
        for op in catalog::builtin_operators()? {
            registry.register(op)?;
        }
        Ok(registry)
    }

    /// Add an operator; names are unique
    pub fn register(&mut self, op: IndividualOp) -> Result<()> {
        if self.operators.contains_key(op.name()) {
            return Err(KolosalError::Registry(format!(
                "operator '{}' is already registered",
                op.name()
            )));
        }
        debug!(operator = op.name(), "Registered operator");
        self.operators.insert(op.name().to_string(), op);
        Ok(())
    }

    /// Register every declaration of a JSON array file
    ///
    /// Loaded operators carry no implementation; they can be composed, bound
    /// and compiled but not executed until one is attached.
    pub fn load_declarations(&mut self, path: impl AsRef<Path>) -> Result<usize> {
        let path = path.as_ref();
        let file = File::open(path).map_err(|e| {
            KolosalError::Registry(format!("failed to open {}: {}", path.display(), e))
        })?;
        let declarations: Vec<Declaration> = serde_json::from_reader(BufReader::new(file)).map_err(|e| {
            KolosalError::Serialization(format!("failed to read {}: {}", path.display(), e))
        })?;

        let count = declarations.len();
        for decl in declarations {
            self.register(IndividualOp::from_declaration(decl)?)?;
        }
        Ok(count)
    }

    /// Fresh copy of the named operator, with a new identity
    pub fn get(&self, name: &str) -> Result<IndividualOp> {
        self.operators
            .get(name)
            .map(IndividualOp::fresh)
            .ok_or_else(|| KolosalError::Registry(format!("unknown operator '{}'", name)))
    }

    pub fn contains(&self, name: &str) -> bool {
        self.operators.contains_key(name)
    }

    /// Registered names, sorted
    pub fn names(&self) -> Vec<&str> {
        self.operators.keys().map(String::as_str).collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = &IndividualOp> {
        self.operators.values()
    }

    /// Operators carrying `tag` in any tag group
    pub fn find_by_tag(&self, tag: &str) -> Vec<&IndividualOp> {
        self.operators.values().filter(|op| op.tags().contains(tag)).collect()
    }

    pub fn len(&self) -> usize {
        self.operators.len()
    }

    pub fn is_empty(&self) -> bool {
        self.operators.is_empty()
    }
}

/// Install the process-wide registry; only the first call succeeds
pub fn install(registry: OperatorRegistry) -> Result<&'static OperatorRegistry> {
    let mut installed = false;
    let current = GLOBAL.get_or_init(|| {
        installed = true;
        registry
    });
    if installed {
        debug!(operators = current.len(), "Installed operator registry");
        Ok(current)
    } else {
        Err(KolosalError::Registry("operator registry is already installed".to_string()))
    }
}

/// The installed registry, if any
pub fn global() -> Result<&'static OperatorRegistry> {
    GLOBAL
        .get()
        .ok_or_else(|| KolosalError::Registry("operator registry is not installed".to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lifecycle::LifecycleState;
    use std::io::Write;

    #[test]
    fn test_builtin_catalog() {
        let registry = OperatorRegistry::builtin().unwrap();
        assert!(registry.contains("PCA"));
        assert!(registry.contains("LogisticRegression"));
        assert!(registry.contains("ConcatFeatures"));
        assert!(registry.names().windows(2).all(|w| w[0] < w[1]));
        assert!(!registry.find_by_tag("classifier").is_empty());
    }

    #[test]
    fn test_get_returns_fresh_copy() {
        let registry = OperatorRegistry::builtin().unwrap();
        let a = registry.get("PCA").unwrap();
        let b = registry.get("PCA").unwrap();
        assert_ne!(a.id(), b.id());
        assert_eq!(a.state(), LifecycleState::SchemaOnly);
        assert!(matches!(registry.get("SVC"), Err(KolosalError::Registry(_))));
    }

    #[test]
    fn test_duplicate_registration() {
        let mut registry = OperatorRegistry::builtin().unwrap();
        let pca = registry.get("PCA").unwrap();
        assert!(matches!(registry.register(pca), Err(KolosalError::Registry(_))));
    }

    #[test]
    fn test_load_declarations() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            r#"[{{"name": "Binarizer",
                 "hyperparams": {{"type": "object", "additionalProperties": false,
                                  "properties": {{"threshold": {{"type": "number", "default": 0.0}}}}}},
                 "tags": {{"op": ["transformer"]}}}}]"#
        )
        .unwrap();

        let mut registry = OperatorRegistry::new();
        assert_eq!(registry.load_declarations(file.path()).unwrap(), 1);
        let op = registry.get("Binarizer").unwrap();
        assert!(op.bind(&serde_json::json!({"threshold": 0.5})).is_ok());
        assert!(op.estimator().is_none());
    }
}
