use facetbase::construct::Registry;
use facetbase::datatype::{ColumnType, Value, ValueType};
use facetbase::error::FacetbaseError;
use facetbase::filter::QueryFlags;
use facetbase::select::{Engine, SelectOptions};

// Five posts, in the spirit of a tiny blog: the content column is the
// default match target once it carries a token index.
fn setup(indexed: bool) -> Registry {
    let mut registry = Registry::new();
    registry.create_table("Entries", Some(ValueType::Text)).unwrap();
    registry.create_column("Entries", "content", ColumnType::Text).unwrap();
    for (key, content) in [
        ("The first post!", "Welcome! This is my first post!"),
        ("Groonga", "I started to use groonga. It's very fast!"),
        ("Mroonga", "I also started to use mroonga. It's also very fast! Really fast!"),
        ("Good-bye Senna", "I migrated all Senna system!"),
        ("Good-bye Tritonn", "I also migrated all Tritonn system!"),
    ] {
        let id = registry.add("Entries", Value::text(key)).unwrap();
        registry.set("Entries", id, "content", Value::text(content)).unwrap();
    }
    if indexed {
        registry.build_token_index("Entries", "content").unwrap();
    }
    registry
}

fn query_keys(registry: &Registry, query: &str, flags: QueryFlags) -> Vec<String> {
    let result = Engine::new(registry)
        .select("Entries", &SelectOptions {
            query: Some(query.to_string()),
            flags,
            output_columns: Some(vec!["_key".into()]),
            ..SelectOptions::default()
        })
        .expect("select ok");
    result.rows.into_iter().map(|row| row[0].to_string()).collect()
}

#[test]
fn query_terms_match_through_the_token_index() {
    let registry = setup(true);
    assert_eq!(query_keys(&registry, "mroonga", QueryFlags::default()), ["Mroonga"]);
    assert_eq!(
        query_keys(&registry, "fast", QueryFlags::default()),
        ["Groonga", "Mroonga"]
    );
    assert_eq!(
        query_keys(&registry, "migrated system", QueryFlags::default()),
        ["Good-bye Senna", "Good-bye Tritonn"],
        "terms combine conjunctively"
    );
    assert_eq!(query_keys(&registry, "absent", QueryFlags::default()), [""; 0]);
}

#[test]
fn matching_falls_back_to_a_column_scan_without_an_index() {
    let registry = setup(false);
    assert_eq!(
        query_keys(&registry, "fast", QueryFlags::default()),
        ["Groonga", "Mroonga"]
    );
}

#[test]
fn a_leading_not_excludes_matches_when_enabled() {
    let registry = setup(true);
    assert_eq!(
        query_keys(&registry, "-mroonga", QueryFlags { allow_leading_not: true }),
        ["The first post!", "Groonga", "Good-bye Senna", "Good-bye Tritonn"]
    );
    assert_eq!(
        query_keys(&registry, "fast -mroonga", QueryFlags { allow_leading_not: true }),
        ["Groonga"]
    );
}

#[test]
fn a_leading_dash_is_literal_text_by_default() {
    let registry = setup(true);
    // "-mroonga" tokenizes to "mroonga", so the dash matches nothing extra
    assert_eq!(
        query_keys(&registry, "-mroonga", QueryFlags::default()),
        ["Mroonga"]
    );
}

#[test]
fn an_operator_only_query_is_a_syntax_error() {
    let registry = setup(true);
    let err = Engine::new(&registry)
        .select("Entries", &SelectOptions {
            query: Some("<".to_string()),
            ..SelectOptions::default()
        })
        .unwrap_err();
    assert!(matches!(err, FacetbaseError::Syntax { .. }), "got {err}");
}

#[test]
fn match_expressions_in_filters_use_the_same_terms() {
    let registry = setup(true);
    let result = Engine::new(&registry)
        .select("Entries", &SelectOptions {
            filter: Some("content @ \"fast\" && _key == \"Groonga\"".into()),
            output_columns: Some(vec!["_key".into()]),
            ..SelectOptions::default()
        })
        .expect("select ok");
    assert_eq!(result.hit_count, 1);
    assert_eq!(result.rows, vec![vec![Value::text("Groonga")]]);
}

#[test]
fn negated_match_terms_require_the_flag_in_filters_too() {
    let registry = setup(true);
    let engine = Engine::new(&registry);
    let with_flag = engine
        .select("Entries", &SelectOptions {
            filter: Some("content @ \"-mroonga\"".into()),
            flags: QueryFlags { allow_leading_not: true },
            output_columns: Some(vec!["_key".into()]),
            ..SelectOptions::default()
        })
        .expect("select ok");
    assert_eq!(with_flag.hit_count, 4);

    let without_flag = engine
        .select("Entries", &SelectOptions {
            filter: Some("content @ \"-mroonga\"".into()),
            output_columns: Some(vec!["_key".into()]),
            ..SelectOptions::default()
        })
        .expect("select ok");
    assert_eq!(without_flag.hit_count, 1, "the dash is literal text");
}

#[test]
fn the_snapshot_index_does_not_see_later_records() {
    let mut registry = setup(true);
    let id = registry.add("Entries", Value::text("Late")).unwrap();
    registry
        .set("Entries", id, "content", Value::text("very fast too"))
        .unwrap();
    assert_eq!(
        query_keys(&registry, "fast", QueryFlags::default()),
        ["Groonga", "Mroonga"],
        "the index is an explicit snapshot collaborator"
    );

    registry.build_token_index("Entries", "content").unwrap();
    assert_eq!(
        query_keys(&registry, "fast", QueryFlags::default()),
        ["Groonga", "Mroonga", "Late"]
    );
}

#[test]
fn query_and_filter_combine_conjunctively() {
    let registry = setup(true);
    let result = Engine::new(&registry)
        .select("Entries", &SelectOptions {
            query: Some("fast".to_string()),
            filter: Some("_key == \"Mroonga\"".into()),
            output_columns: Some(vec!["_key".into()]),
            ..SelectOptions::default()
        })
        .expect("select ok");
    assert_eq!(result.hit_count, 1);
    assert_eq!(result.rows, vec![vec![Value::text("Mroonga")]]);
}
