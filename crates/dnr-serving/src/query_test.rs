use super::*;
use crate::error::ServingError;
use dnr_meta::Warehouse;

async fn runner(max_rows: usize) -> QueryRunner {
    let warehouse = Warehouse::open_memory().await.unwrap();
    warehouse
        .db()
        .execute_batch(
            "CREATE TABLE serving.numbers AS SELECT range AS n FROM range(5);",
        )
        .await
        .unwrap();
    let config = QueryConfig {
        max_rows,
        ..QueryConfig::default()
    };
    QueryRunner::new(warehouse.db().clone(), &config)
}

#[tokio::test]
async fn test_rows_capped_and_flagged() {
    let runner = runner(3).await;
    let output = runner.run("SELECT n FROM serving.numbers ORDER BY n").await.unwrap();
    assert_eq!(output.result.rows.len(), 3);
    assert!(output.truncated);
}

#[tokio::test]
async fn test_exact_fit_not_truncated() {
    let runner = runner(5).await;
    let output = runner.run("SELECT n FROM serving.numbers").await.unwrap();
    assert_eq!(output.result.rows.len(), 5);
    assert!(!output.truncated);
}

#[tokio::test]
async fn test_write_rejected() {
    let runner = runner(5).await;
    let err = runner.run("DELETE FROM serving.numbers").await.unwrap_err();
    assert!(matches!(err, ServingError::Sql(_)));
}

#[tokio::test]
async fn test_silver_not_readable() {
    let runner = runner(5).await;
    let err = runner
        .run("SELECT * FROM silver.contact")
        .await
        .unwrap_err();
    assert!(err.to_string().contains("S007"), "{err}");
}
