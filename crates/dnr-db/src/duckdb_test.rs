use super::*;

#[tokio::test]
async fn test_in_memory() {
    let db = DuckDbBackend::in_memory().unwrap();
    assert_eq!(db.db_type(), "duckdb");
    assert_eq!(db.timeouts(), Timeouts::default());
}

#[tokio::test]
async fn test_execute_with_params() {
    let db = DuckDbBackend::in_memory().unwrap();
    db.execute_batch("CREATE TABLE people (id INTEGER, name VARCHAR)")
        .await
        .unwrap();

    let affected = db
        .execute(
            "INSERT INTO people VALUES (?, ?)",
            &[SqlValue::Int(1), SqlValue::from("O'Brien; DROP TABLE people")],
        )
        .await
        .unwrap();
    assert_eq!(affected, 1);

    let result = db
        .query("SELECT name FROM people WHERE id = ?", &[SqlValue::Int(1)])
        .await
        .unwrap();
    assert_eq!(result.columns, vec!["name"]);
    assert_eq!(
        result.scalar(),
        &SqlValue::from("O'Brien; DROP TABLE people")
    );
}

#[tokio::test]
async fn test_query_value_types() {
    let db = DuckDbBackend::in_memory().unwrap();
    let result = db
        .query(
            "SELECT 1 AS i, 2.5::DOUBLE AS d, 'x' AS t, NULL AS n, true AS b, \
             12.50::DECIMAL(18,2) AS amount, DATE '2024-03-01' AS day",
            &[],
        )
        .await
        .unwrap();

    assert_eq!(result.value(0, "i"), &SqlValue::Int(1));
    assert_eq!(result.value(0, "d"), &SqlValue::Double(2.5));
    assert_eq!(result.value(0, "t"), &SqlValue::from("x"));
    assert!(result.value(0, "n").is_null());
    assert_eq!(result.value(0, "b"), &SqlValue::Bool(true));
    assert_eq!(result.value(0, "amount").as_f64(), Some(12.5));
    assert_eq!(result.value(0, "day"), &SqlValue::from("2024-03-01"));
}

#[tokio::test]
async fn test_query_max_rows() {
    let db = DuckDbBackend::in_memory().unwrap();
    let result = db
        .query_with_limits(
            "SELECT * FROM range(100) t(n)",
            &[],
            Duration::from_secs(10),
            Some(7),
        )
        .await
        .unwrap();
    assert_eq!(result.len(), 7);
}

#[tokio::test]
async fn test_query_count() {
    let db = DuckDbBackend::in_memory().unwrap();
    db.execute_batch("CREATE TABLE nums AS SELECT * FROM range(10) t(n)")
        .await
        .unwrap();

    let count = db.query_count("SELECT * FROM nums").await.unwrap();
    assert_eq!(count, 10);
}

#[tokio::test]
async fn test_execute_many_single_transaction() {
    let db = DuckDbBackend::in_memory().unwrap();
    db.execute_batch("CREATE TABLE t (id INTEGER PRIMARY KEY, v VARCHAR)")
        .await
        .unwrap();

    let rows = (1..=5)
        .map(|i| vec![SqlValue::Int(i), SqlValue::from(format!("v{i}"))])
        .collect();
    let affected = db
        .execute_many("INSERT INTO t VALUES (?, ?)", rows)
        .await
        .unwrap();
    assert_eq!(affected, 5);

    // A duplicate key in the batch rolls back the whole batch
    let rows = vec![
        vec![SqlValue::Int(10), SqlValue::from("a")],
        vec![SqlValue::Int(1), SqlValue::from("dup")],
    ];
    assert!(db.execute_many("INSERT INTO t VALUES (?, ?)", rows).await.is_err());
    assert_eq!(db.query_count("SELECT * FROM t").await.unwrap(), 5);
}

#[tokio::test]
async fn test_execute_many_on_conflict_counts_inserted() {
    let db = DuckDbBackend::in_memory().unwrap();
    db.execute_batch("CREATE TABLE t (id INTEGER PRIMARY KEY)")
        .await
        .unwrap();
    let sql = "INSERT INTO t VALUES (?) ON CONFLICT DO NOTHING";

    let first = db
        .execute_many(sql, vec![vec![SqlValue::Int(1)], vec![SqlValue::Int(2)]])
        .await
        .unwrap();
    let second = db
        .execute_many(sql, vec![vec![SqlValue::Int(2)], vec![SqlValue::Int(3)]])
        .await
        .unwrap();

    assert_eq!(first, 2);
    assert_eq!(second, 1);
}

#[tokio::test]
async fn test_transaction_rolls_back() {
    let db = DuckDbBackend::in_memory().unwrap();
    db.execute_batch("CREATE TABLE t (id INTEGER)").await.unwrap();

    let result = db
        .transaction(vec![
            SqlStatement::new("INSERT INTO t VALUES (?)", vec![SqlValue::Int(1)]),
            SqlStatement::plain("INSERT INTO missing_table VALUES (1)"),
        ])
        .await;

    assert!(result.is_err());
    assert_eq!(db.query_count("SELECT * FROM t").await.unwrap(), 0);
}

#[tokio::test]
async fn test_relation_kind() {
    let db = DuckDbBackend::in_memory().unwrap();
    db.create_schema_if_not_exists("serving").await.unwrap();
    db.execute_batch(
        "CREATE TABLE serving.t AS SELECT 1 AS id; \
         CREATE VIEW serving.v AS SELECT * FROM serving.t;",
    )
    .await
    .unwrap();

    assert_eq!(
        db.relation_kind("serving.t").await.unwrap(),
        Some(RelationKind::Table)
    );
    assert_eq!(
        db.relation_kind("serving.v").await.unwrap(),
        Some(RelationKind::View)
    );
    assert_eq!(db.relation_kind("serving.nope").await.unwrap(), None);
    assert!(!db.relation_exists("nonexistent").await.unwrap());
}

#[tokio::test]
async fn test_drop_if_exists() {
    let db = DuckDbBackend::in_memory().unwrap();
    db.execute_batch("CREATE TABLE to_drop AS SELECT 1 AS id; CREATE VIEW v_drop AS SELECT 1 AS id")
        .await
        .unwrap();

    db.drop_if_exists("to_drop").await.unwrap();
    db.drop_if_exists("v_drop").await.unwrap();
    db.drop_if_exists("never_existed").await.unwrap();

    assert!(!db.relation_exists("to_drop").await.unwrap());
    assert!(!db.relation_exists("v_drop").await.unwrap());
}

#[tokio::test]
async fn test_create_schema_if_not_exists() {
    let db = DuckDbBackend::in_memory().unwrap();
    db.create_schema_if_not_exists("staging").await.unwrap();
    db.execute_batch("CREATE TABLE staging.test_table AS SELECT 1 AS id")
        .await
        .unwrap();
    assert!(db.relation_exists("staging.test_table").await.unwrap());

    // Creating the same schema again should not fail (IF NOT EXISTS)
    db.create_schema_if_not_exists("staging").await.unwrap();
}

#[tokio::test]
async fn test_file_database_shared_across_pool() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("warehouse.duckdb");
    let db = DuckDbBackend::open(path.to_str().unwrap(), 3, Timeouts::default()).unwrap();

    db.execute_batch("CREATE TABLE shared (id INTEGER)").await.unwrap();

    let mut handles = Vec::new();
    let db = Arc::new(db);
    for i in 0..6 {
        let db = Arc::clone(&db);
        handles.push(tokio::spawn(async move {
            db.execute("INSERT INTO shared VALUES (?)", &[SqlValue::Int(i)])
                .await
        }));
    }
    for handle in handles {
        handle.await.unwrap().unwrap();
    }

    assert_eq!(db.query_count("SELECT * FROM shared").await.unwrap(), 6);
}

#[tokio::test]
async fn test_timeout_is_transient() {
    let db = DuckDbBackend::in_memory().unwrap();
    let err = db
        .query_with_limits(
            "SELECT sum(n) FROM range(5000000) t(n)",
            &[],
            Duration::ZERO,
            None,
        )
        .await
        .unwrap_err();

    assert!(matches!(err, DbError::Timeout { .. }));
    assert!(err.is_transient());
}

#[tokio::test]
async fn test_timed_out_query_is_interrupted() {
    let db = DuckDbBackend::open(":memory:", 1, Timeouts::default()).unwrap();
    let err = db
        .query_with_limits(
            "SELECT count(*) FROM range(10000000) t1, range(1000000) t2",
            &[],
            Duration::from_millis(200),
            None,
        )
        .await
        .unwrap_err();
    assert!(matches!(err, DbError::Timeout { .. }));

    // The only connection is free again once the statement is interrupted
    let result = tokio::time::timeout(Duration::from_secs(20), db.query("SELECT 42", &[]))
        .await
        .expect("pool still held by the timed out statement")
        .unwrap();
    assert_eq!(result.scalar().as_i64(), Some(42));
}
