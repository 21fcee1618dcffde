use super::*;

fn def(name: &str, sql: &str) -> (String, String, Vec<Vec<String>>) {
    (name.to_string(), sql.to_string(), vec![index(&["master_id"])])
}

#[test]
fn test_standard_catalog_has_all_views() {
    let catalog = Catalog::standard().unwrap();
    let names: Vec<&str> = catalog.ordered().unwrap().iter().map(|v| v.name.as_str()).collect();
    assert_eq!(names.len(), 9);
    for expected in [
        "donation_detail",
        "order_detail",
        "subscription_detail",
        "tag_detail",
        "communication_detail",
        "donor_summary",
        "donor_summary_monthly",
        "tag_summary",
        "person_360",
    ] {
        assert!(names.contains(&expected), "missing {expected}");
    }
}

#[test]
fn test_aggregates_follow_their_details() {
    let catalog = Catalog::standard().unwrap();
    let order: Vec<String> = catalog.ordered().unwrap().iter().map(|v| v.name.clone()).collect();
    let pos = |name: &str| order.iter().position(|v| v == name).unwrap();
    assert!(pos("donation_detail") < pos("donor_summary"));
    assert!(pos("donation_detail") < pos("donor_summary_monthly"));
    assert!(pos("tag_detail") < pos("tag_summary"));
    assert!(pos("donor_summary") < pos("person_360"));
    assert!(pos("order_detail") < pos("person_360"));
}

#[test]
fn test_dependencies_are_read_from_sql() {
    let catalog = Catalog::standard().unwrap();
    let detail = catalog.get("donation_detail").unwrap();
    assert!(detail.serving_dependencies().is_empty());
    assert!(detail.relations.contains(&"silver.donation".to_string()));
    assert!(detail.relations.contains(&"silver.identity_map".to_string()));

    let person = catalog.get("serving.person_360").unwrap();
    let mut deps = person.serving_dependencies();
    deps.sort();
    assert_eq!(
        deps,
        vec![
            "communication_detail",
            "donor_summary",
            "order_detail",
            "subscription_detail",
            "tag_detail"
        ]
    );
}

#[test]
fn test_selection_includes_ancestors() {
    let catalog = Catalog::standard().unwrap();
    let selected: Vec<&str> = catalog
        .selection(Some("donor_summary"))
        .unwrap()
        .iter()
        .map(|v| v.name.as_str())
        .collect();
    assert_eq!(selected, vec!["donation_detail", "donor_summary"]);
    assert_eq!(catalog.selection(None).unwrap().len(), catalog.len());
}

#[test]
fn test_unknown_view() {
    let catalog = Catalog::standard().unwrap();
    assert!(matches!(
        catalog.get("lifetime_value"),
        Err(ServingError::ViewNotFound { .. })
    ));
}

#[test]
fn test_unknown_serving_relation_rejected() {
    let err = Catalog::from_definitions(vec![def(
        "a",
        "SELECT master_id FROM serving.missing",
    )])
    .unwrap_err();
    assert!(matches!(err, ServingError::Catalog { .. }), "{err}");
}

#[test]
fn test_foreign_schema_rejected() {
    let err =
        Catalog::from_definitions(vec![def("a", "SELECT master_id FROM raw.record")]).unwrap_err();
    assert!(matches!(err, ServingError::Catalog { .. }));
}

#[test]
fn test_cte_names_are_not_relations() {
    let catalog = Catalog::from_definitions(vec![def(
        "a",
        "WITH m AS (SELECT master_id FROM silver.identity_map) SELECT master_id FROM m",
    )])
    .unwrap();
    assert_eq!(catalog.get("a").unwrap().relations, vec!["silver.identity_map"]);
}

#[test]
fn test_cycle_rejected() {
    let err = Catalog::from_definitions(vec![
        def("a", "SELECT master_id FROM serving.b"),
        def("b", "SELECT master_id FROM serving.a"),
    ])
    .unwrap_err();
    assert!(matches!(err, ServingError::Core(_)));
}

#[test]
fn test_scratch_and_index_names() {
    let catalog = Catalog::standard().unwrap();
    let monthly = catalog.get("donor_summary_monthly").unwrap();
    assert_eq!(monthly.temp_table(), "serving.__mat_donor_summary_monthly");
    assert_eq!(
        monthly.index_name(&monthly.indexes[0]),
        "idx_donor_summary_monthly_master_id_gift_month"
    );
}
