use loom_model::{Statement, StatementLoader, StatementType, ValueType};
use loom_store::MemoryStore;
use proptest::prelude::*;
use tempfile::tempdir;

fn statement_strategy() -> impl Strategy<Value = (Statement, String)> {
    let subject = prop::sample::select(vec!["s1", "s2", "s3"]);
    let predicate = prop::sample::select(vec!["name", "type", "alias", "officer"]);
    let object = "[a-z0-9 ]{0,6}";
    let kind = prop::sample::select(vec![
        StatementType::Type,
        StatementType::Link,
        StatementType::Value(ValueType::String),
        StatementType::Value(ValueType::Integer),
    ]);
    let source = prop::sample::select(vec!["a", "b"]);
    (subject, predicate, object, kind, source).prop_map(|(s, p, o, k, src)| {
        (Statement::new(s, p, o, k), src.to_string())
    })
}

proptest! {
    #![proptest_config(ProptestConfig {
        cases: 128,
        failure_persistence: None,
        ..ProptestConfig::default()
    })]

    #[test]
    fn appending_twice_changes_nothing(batch in prop::collection::vec(statement_strategy(), 0..40)) {
        let store = MemoryStore::new();
        for (statement, source) in &batch {
            store.append(statement.clone(), source);
        }
        let once = store.statements();
        for (statement, source) in &batch {
            prop_assert!(!store.append(statement.clone(), source));
        }
        prop_assert_eq!(store.statements(), once);
    }

    #[test]
    fn loads_preserve_insertion_order(batch in prop::collection::vec(statement_strategy(), 0..40)) {
        let store = MemoryStore::new();
        let mut expected: Vec<(String, String, String)> = Vec::new();
        for (statement, source) in &batch {
            let fresh = store.append(statement.clone(), source);
            if fresh && statement.subject == "s1" && statement.kind != StatementType::Type {
                expected.push((statement.predicate.clone(), statement.object.clone(), source.clone()));
            }
        }
        let loaded: Vec<(String, String, String)> = StatementLoader::load(&store, "s1")
            .unwrap()
            .into_iter()
            .map(|row| (row.predicate, row.object, row.source))
            .collect();
        prop_assert_eq!(loaded, expected);
    }

    #[test]
    fn jsonl_files_reload_identically(batch in prop::collection::vec(statement_strategy(), 0..40)) {
        let dir = tempdir().unwrap();
        let path = dir.path().join("statements.jsonl");
        let store = MemoryStore::new();
        for (statement, source) in &batch {
            store.append(statement.clone(), source);
        }
        let written = store.write_jsonl(&path).unwrap();
        prop_assert_eq!(written, store.len_types() + store.len_properties());

        let reloaded = MemoryStore::open(&path).unwrap();
        prop_assert_eq!(reloaded.statements(), store.statements());
    }
}
