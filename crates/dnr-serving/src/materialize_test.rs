use super::*;
use crate::builder::ViewBuilder;
use crate::catalog::Catalog;

fn catalog() -> Catalog {
    Catalog::from_definitions(vec![
        (
            "people".to_string(),
            "SELECT source_id, contact_id, email FROM silver.contact".to_string(),
            vec![vec!["contact_id".to_string()]],
        ),
        (
            "people_per_source".to_string(),
            "SELECT source_id, COUNT(*) AS people FROM serving.people GROUP BY source_id"
                .to_string(),
            vec![vec!["source_id".to_string()]],
        ),
    ])
    .unwrap()
}

async fn warehouse() -> Warehouse {
    let warehouse = Warehouse::open_memory().await.unwrap();
    warehouse
        .db()
        .execute_batch(
            "INSERT INTO silver.contact (source_id, source_record_id, contact_id, email, lineage_id) VALUES
               (3, '1', 'givebutter:1', 'a@x.com', 'l1'),
               (3, '2', 'givebutter:2', 'b@x.com', 'l1'),
               (4, '9', 'keap:9', 'c@x.com', 'l2');",
        )
        .await
        .unwrap();
    warehouse
}

async fn defined(warehouse: &Warehouse, catalog: &Catalog) {
    ViewBuilder::new(warehouse, catalog)
        .define_views(None)
        .await
        .unwrap();
}

async fn kind(warehouse: &Warehouse, name: &str) -> Option<RelationKind> {
    warehouse.db().relation_kind(name).await.unwrap()
}

#[tokio::test]
async fn test_materialize_reaches_indexed_table() {
    let warehouse = warehouse().await;
    let catalog = catalog();
    defined(&warehouse, &catalog).await;

    let outcome = Materializer::new(&warehouse, &catalog, 1)
        .materialize("people")
        .await
        .unwrap();
    assert_eq!(outcome.state, MaterializationState::TableIndexed);
    assert_eq!(outcome.row_count, Some(3));
    assert!(!outcome.already_materialized);

    assert_eq!(kind(&warehouse, "serving.people").await, Some(RelationKind::Table));
    assert_eq!(kind(&warehouse, "serving.__mat_people").await, None);

    let record = warehouse.materializations().get("people").await.unwrap().unwrap();
    assert_eq!(record.state, MaterializationState::TableIndexed);
    assert_eq!(record.row_count, Some(3));
    assert!(record.error.is_none());
}

#[tokio::test]
async fn test_rematerialize_is_noop() {
    let warehouse = warehouse().await;
    let catalog = catalog();
    defined(&warehouse, &catalog).await;
    let materializer = Materializer::new(&warehouse, &catalog, 0);
    materializer.materialize("people").await.unwrap();

    // New silver rows must not reach an existing table
    warehouse
        .db()
        .execute(
            "INSERT INTO silver.contact (source_id, source_record_id, contact_id, lineage_id) \
             VALUES (4, '10', 'keap:10', 'l3')",
            &[],
        )
        .await
        .unwrap();

    let again = materializer.materialize("people").await.unwrap();
    assert!(again.already_materialized);
    assert_eq!(again.row_count, Some(3));
    assert_eq!(again.state, MaterializationState::TableIndexed);
}

#[tokio::test]
async fn test_dependency_must_be_materialized_first() {
    let warehouse = warehouse().await;
    let catalog = catalog();
    defined(&warehouse, &catalog).await;
    let materializer = Materializer::new(&warehouse, &catalog, 0);

    let err = materializer.materialize("people_per_source").await.unwrap_err();
    match err {
        ServingError::DependencyNotMaterialized { view, dependency } => {
            assert_eq!(view, "people_per_source");
            assert_eq!(dependency, "people");
        }
        other => panic!("unexpected error: {other}"),
    }
    assert_eq!(
        kind(&warehouse, "serving.people_per_source").await,
        Some(RelationKind::View)
    );

    materializer.materialize("people").await.unwrap();
    let outcome = materializer.materialize("people_per_source").await.unwrap();
    assert_eq!(outcome.row_count, Some(2));
}

#[tokio::test]
async fn test_materialize_all_in_dependency_order() {
    let warehouse = warehouse().await;
    let catalog = catalog();
    defined(&warehouse, &catalog).await;

    let outcomes = Materializer::new(&warehouse, &catalog, 0)
        .materialize_all()
        .await
        .unwrap();
    let views: Vec<&str> = outcomes.iter().map(|o| o.view.as_str()).collect();
    assert_eq!(views, vec!["people", "people_per_source"]);
    assert!(outcomes.iter().all(|o| o.state == MaterializationState::TableIndexed));
}

#[tokio::test]
async fn test_missing_view_is_invariant_violation() {
    let warehouse = warehouse().await;
    let catalog = catalog();

    let err = Materializer::new(&warehouse, &catalog, 0)
        .materialize("people")
        .await
        .unwrap_err();
    assert!(matches!(err, ServingError::InvariantViolation { .. }), "{err}");
}

#[tokio::test]
async fn test_scratch_view_is_invariant_violation() {
    let warehouse = warehouse().await;
    let catalog = catalog();
    defined(&warehouse, &catalog).await;
    warehouse
        .db()
        .execute_batch("CREATE VIEW serving.__mat_people AS SELECT 1 AS x")
        .await
        .unwrap();

    let err = Materializer::new(&warehouse, &catalog, 0)
        .materialize("people")
        .await
        .unwrap_err();
    assert!(matches!(err, ServingError::InvariantViolation { .. }), "{err}");
    assert_eq!(kind(&warehouse, "serving.people").await, Some(RelationKind::View));
}

#[tokio::test]
async fn test_stale_scratch_table_is_replaced() {
    let warehouse = warehouse().await;
    let catalog = catalog();
    defined(&warehouse, &catalog).await;
    warehouse
        .db()
        .execute_batch("CREATE TABLE serving.__mat_people AS SELECT 1 AS x")
        .await
        .unwrap();
    warehouse
        .materializations()
        .set("people", MaterializationState::Copying, None, Some("interrupted"))
        .await
        .unwrap();

    let outcome = Materializer::new(&warehouse, &catalog, 0)
        .materialize("people")
        .await
        .unwrap();
    assert_eq!(outcome.row_count, Some(3));
    let columns = warehouse
        .db()
        .query("SELECT * FROM serving.people LIMIT 1", &[])
        .await
        .unwrap()
        .columns;
    assert_eq!(columns, vec!["source_id", "contact_id", "email"]);
}

#[tokio::test]
async fn test_failed_index_leaves_table_no_index() {
    let warehouse = warehouse().await;
    let catalog = Catalog::from_definitions(vec![(
        "people".to_string(),
        "SELECT contact_id FROM silver.contact".to_string(),
        vec![vec!["no_such_column".to_string()]],
    )])
    .unwrap();
    defined(&warehouse, &catalog).await;

    let materializer = Materializer::new(&warehouse, &catalog, 1);
    let outcome = materializer.materialize("people").await.unwrap();
    assert_eq!(outcome.state, MaterializationState::TableNoIndex);
    assert_eq!(kind(&warehouse, "serving.people").await, Some(RelationKind::Table));

    let record = warehouse.materializations().get("people").await.unwrap().unwrap();
    assert_eq!(record.state, MaterializationState::TableNoIndex);
    assert!(record.error.unwrap().contains("idx_people_no_such_column"));

    // A rerun retries the index without copying again
    let again = materializer.materialize("people").await.unwrap();
    assert!(again.already_materialized);
    assert_eq!(again.state, MaterializationState::TableNoIndex);
}

#[tokio::test]
async fn test_redefining_views_drops_tables() {
    let warehouse = warehouse().await;
    let catalog = catalog();
    defined(&warehouse, &catalog).await;
    Materializer::new(&warehouse, &catalog, 0)
        .materialize_all()
        .await
        .unwrap();

    let results = ViewBuilder::new(&warehouse, &catalog)
        .define_views(None)
        .await
        .unwrap();
    assert!(results.iter().all(|r| r.replaced_table));
    assert_eq!(kind(&warehouse, "serving.people").await, Some(RelationKind::View));
    let record = warehouse.materializations().get("people").await.unwrap().unwrap();
    assert_eq!(record.state, MaterializationState::ViewOnly);
}
