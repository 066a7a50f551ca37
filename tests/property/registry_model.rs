//! The registry behaves like a plain map of names under any add/remove sequence

use nsload::bridge::directory::DriverDirectory;
use nsload::context::fingerprint::compute_fingerprint;
use nsload::{NamespaceRegistry, ResolutionOrder, ResourceDefinition, ResourceExtractor};
use proptest::prelude::*;
use std::collections::BTreeMap;
use std::sync::Arc;

#[derive(Debug, Clone)]
enum Op {
    Add(u8, Vec<u8>),
    Remove(u8),
}

fn op() -> impl Strategy<Value = Op> {
    prop_oneof![
        (0u8..4, proptest::collection::vec(any::<u8>(), 0..16)).prop_map(|(n, b)| Op::Add(n, b)),
        (0u8..4).prop_map(Op::Remove),
    ]
}

proptest! {
    #[test]
    fn test_registry_matches_map_model(ops in proptest::collection::vec(op(), 1..40)) {
        let registry = NamespaceRegistry::builder()
            .plugins(Arc::new(DriverDirectory::new()))
            .build();
        let mut model: BTreeMap<String, Vec<u8>> = BTreeMap::new();

        for op in ops {
            match op {
                Op::Add(n, bytes) => {
                    let name = format!("ns{}", n);
                    registry
                        .add_namespace(&name, &[ResourceDefinition::code("app.Unit", bytes.clone())])
                        .unwrap();
                    model.insert(name, bytes);
                }
                Op::Remove(n) => {
                    let name = format!("ns{}", n);
                    prop_assert_eq!(registry.remove_namespace(&name), model.remove(&name).is_some());
                }
            }
        }

        let names: Vec<String> = registry.namespaces().into_iter().map(|info| info.name).collect();
        prop_assert_eq!(names, model.keys().cloned().collect::<Vec<_>>());
        for (name, bytes) in &model {
            let context = registry.get_context(name).unwrap();
            prop_assert!(context.is_active());
            let artifact = context.resolve("app.Unit").unwrap();
            prop_assert_eq!(artifact.bytes(), bytes.as_slice());
        }
    }

    #[test]
    fn test_fingerprint_depends_only_on_content(
        units in proptest::collection::btree_map("[a-z]{1,6}", proptest::collection::vec(any::<u8>(), 0..32), 1..8)
    ) {
        let definitions: Vec<ResourceDefinition> = units
            .iter()
            .map(|(id, bytes)| ResourceDefinition::code(format!("app.{}", id), bytes.clone()))
            .collect();
        let mut reversed = definitions.clone();
        reversed.reverse();

        let extractor = ResourceExtractor::default();
        let forward = extractor.extract_all(&definitions).unwrap();
        let backward = extractor.extract_all(&reversed).unwrap();

        prop_assert_eq!(
            compute_fingerprint(&forward, ResolutionOrder::ChildFirst),
            compute_fingerprint(&backward, ResolutionOrder::ChildFirst)
        );
        prop_assert_ne!(
            compute_fingerprint(&forward, ResolutionOrder::ChildFirst),
            compute_fingerprint(&forward, ResolutionOrder::ParentFirst)
        );
    }
}
