//! Integration test: process-wide operator registry

use kolosal_compose::error::KolosalError;
use kolosal_compose::operator::{global, install, OperatorRegistry};
use kolosal_compose::prelude::*;
use std::io::Write;

#[test]
fn test_install_once_then_read_only() {
    assert!(matches!(global(), Err(KolosalError::Registry(_))));

    let mut file = tempfile::NamedTempFile::new().unwrap();
    write!(
        file,
        r#"[{{"name": "Normalizer",
             "hyperparams": {{"type": "object", "additionalProperties": false,
                              "relevantToOptimizer": ["norm"],
                              "properties": {{"norm": {{"enum": ["l1", "l2", "max"], "default": "l2"}}}}}},
             "tags": {{"op": ["transformer"]}}}}]"#
    )
    .unwrap();

    let mut registry = OperatorRegistry::builtin().unwrap();
    let builtin = registry.len();
    assert_eq!(registry.load_declarations(file.path()).unwrap(), 1);

    let installed = install(registry).unwrap();
    assert_eq!(installed.len(), builtin + 1);
    assert!(global().unwrap().contains("Normalizer"));

    let err = install(OperatorRegistry::new()).unwrap_err();
    assert!(matches!(err, KolosalError::Registry(_)));
    assert_eq!(global().unwrap().len(), builtin + 1);

    // declared operators compose and compile like builtin ones
    let op = parse("Normalizer >> LogisticRegression", global().unwrap()).unwrap();
    let space = compile(&op).unwrap();
    assert!(space.arms()[0].params.contains_key("Normalizer.norm"));
}

#[test]
fn test_unknown_and_duplicate_names() {
    let mut registry = OperatorRegistry::builtin().unwrap();
    assert!(matches!(registry.get("SVC"), Err(KolosalError::Registry(_))));

    let pca = registry.get("PCA").unwrap();
    assert!(matches!(registry.register(pca), Err(KolosalError::Registry(_))));

    let classifiers: Vec<&str> = registry.find_by_tag("classifier").iter().map(|op| op.name()).collect();
    assert!(classifiers.contains(&"LogisticRegression"));
    assert!(!classifiers.contains(&"PCA"));
}
