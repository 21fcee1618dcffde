use super::*;
use dnr_meta::NewLineage;
use std::path::Path;

const KEAP: &str = r#"
kind: source
id: 1
name: keap
tables:
  - name: contacts
    file_prefix: contacts
    entities:
      - kind: contact
        columns:
          source_record_id: Id
          first_name: First Name
          email: Email
          phone: Phone
          birth_date: Birthday
          created_at: Date Created
  - name: orders
    file_prefix: orders
    entities:
      - kind: donation
        columns:
          source_record_id: [Order Id, Line]
          contact_source_id: Contact Id
          amount: Total
          donated_at: Order Date
          is_recurring: Recurring
"#;

fn keap() -> SourceFile {
    SourceFile::from_yaml(KEAP, Path::new("keap.yml")).unwrap()
}

async fn warehouse() -> Warehouse {
    let warehouse = Warehouse::open_memory().await.unwrap();
    warehouse.register_sources(&[keap()]).await.unwrap();
    warehouse
}

/// Load payload rows for one table as a finished lineage
async fn load(warehouse: &Warehouse, table: &str, blob: &str, rows: &[&[(&str, &str)]]) -> String {
    let lineage = warehouse.lineage();
    let id = lineage
        .record_file_start(&NewLineage {
            batch_id: "b".to_string(),
            source_id: 1,
            table_name: table.to_string(),
            blob_path: blob.to_string(),
            content_hash: blob.to_string(),
            row_count: Some(rows.len() as i64),
        })
        .await
        .unwrap();
    let params = rows
        .iter()
        .enumerate()
        .map(|(i, fields)| {
            let payload: serde_json::Map<String, serde_json::Value> = fields
                .iter()
                .map(|(k, v)| (k.to_string(), serde_json::Value::from(*v)))
                .collect();
            vec![
                SqlValue::from(id.as_str()),
                SqlValue::Int(1),
                SqlValue::from(table),
                SqlValue::Int(i as i64 + 1),
                SqlValue::from("hash"),
                SqlValue::Text(serde_json::Value::Object(payload).to_string()),
            ]
        })
        .collect();
    warehouse
        .db()
        .execute_many("INSERT INTO raw.record VALUES (?, ?, ?, ?, ?, ?)", params)
        .await
        .unwrap();
    lineage.mark_loaded(&id, rows.len() as i64).await.unwrap();
    id
}

#[tokio::test]
async fn test_contacts_typed_and_keyed() {
    let warehouse = warehouse().await;
    load(
        &warehouse,
        "contacts",
        "keap/contacts.csv",
        &[
            &[("Id", "1"), ("First Name", "Ann"), ("Email", " A@X.com "), ("Phone", "(555) 123-4567"), ("Birthday", "3/7/1980"), ("Date Created", "2024-01-02 03:04:05")],
            &[("Id", "2"), ("Email", "not-an-email"), ("Birthday", "someday")],
            &[("Id", ""), ("Email", "nokey@x.com")],
        ],
    )
    .await;

    let transformer = Transformer::new(warehouse.clone(), 10);
    let counts = transformer
        .transform(&keap(), EntityKind::Contact)
        .await
        .unwrap();

    assert_eq!(counts.read, 3);
    assert_eq!(counts.written, 2);
    assert_eq!(counts.skipped_missing_key, 1);
    assert_eq!(counts.coerced_nulls, 2);
    assert_eq!(counts.orphans, 0);

    let result = warehouse
        .db()
        .query(
            "SELECT contact_id, email, phone, CAST(birth_date AS VARCHAR) AS birth_date, first_name \
             FROM silver.contact ORDER BY source_record_id",
            &[],
        )
        .await
        .unwrap();
    assert_eq!(result.value(0, "contact_id"), &SqlValue::from("keap:1"));
    assert_eq!(result.value(0, "email"), &SqlValue::from("a@x.com"));
    assert_eq!(result.value(0, "phone"), &SqlValue::from("5551234567"));
    assert_eq!(result.value(0, "birth_date"), &SqlValue::from("1980-03-07"));
    assert!(result.value(1, "email").is_null());
    assert!(result.value(1, "first_name").is_null());
}

#[tokio::test]
async fn test_rerun_is_idempotent() {
    let warehouse = warehouse().await;
    load(&warehouse, "contacts", "keap/contacts.csv", &[&[("Id", "1")], &[("Id", "2")]]).await;

    let transformer = Transformer::new(warehouse.clone(), 1);
    transformer.transform(&keap(), EntityKind::Contact).await.unwrap();
    transformer.transform(&keap(), EntityKind::Contact).await.unwrap();

    let count = warehouse
        .db()
        .query_count("SELECT * FROM silver.contact")
        .await
        .unwrap();
    assert_eq!(count, 2);
}

#[tokio::test]
async fn test_latest_file_wins() {
    let warehouse = warehouse().await;
    let older = load(&warehouse, "contacts", "keap/contacts_1.csv", &[&[("Id", "1"), ("First Name", "Old")]]).await;
    warehouse
        .db()
        .execute(
            "UPDATE meta.file_lineage SET loaded_at = loaded_at - INTERVAL 1 HOUR WHERE lineage_id = ?",
            &[SqlValue::from(older.as_str())],
        )
        .await
        .unwrap();
    let newer = load(
        &warehouse,
        "contacts",
        "keap/contacts_2.csv",
        &[&[("Id", "1"), ("First Name", "Mid")], &[("Id", "1"), ("First Name", "New")]],
    )
    .await;

    let counts = Transformer::new(warehouse.clone(), 10)
        .transform(&keap(), EntityKind::Contact)
        .await
        .unwrap();
    assert_eq!(counts.read, 3);
    assert_eq!(counts.written, 1);

    let result = warehouse
        .db()
        .query("SELECT first_name, lineage_id FROM silver.contact", &[])
        .await
        .unwrap();
    assert_eq!(result.value(0, "first_name"), &SqlValue::from("New"));
    assert_eq!(result.value(0, "lineage_id"), &SqlValue::from(newer.as_str()));
}

#[tokio::test]
async fn test_unloaded_lineage_ignored() {
    let warehouse = warehouse().await;
    let lineage = warehouse.lineage();
    let id = lineage
        .record_file_start(&NewLineage {
            batch_id: "b".to_string(),
            source_id: 1,
            table_name: "contacts".to_string(),
            blob_path: "keap/contacts.csv".to_string(),
            content_hash: "h".to_string(),
            row_count: Some(1),
        })
        .await
        .unwrap();
    warehouse
        .db()
        .execute(
            "INSERT INTO raw.record VALUES (?, 1, 'contacts', 1, 'h', '{\"Id\":\"1\"}')",
            &[SqlValue::from(id.as_str())],
        )
        .await
        .unwrap();

    let counts = Transformer::new(warehouse, 10)
        .transform(&keap(), EntityKind::Contact)
        .await
        .unwrap();
    assert_eq!(counts.read, 0);
}

#[tokio::test]
async fn test_transactions_composite_key_and_orphans() {
    let warehouse = warehouse().await;
    load(&warehouse, "contacts", "keap/contacts.csv", &[&[("Id", "1")]]).await;
    load(
        &warehouse,
        "orders",
        "keap/orders.csv",
        &[
            &[("Order Id", "100"), ("Line", "1"), ("Contact Id", "1"), ("Total", "$10.00"), ("Order Date", "2024-02-01"), ("Recurring", "yes")],
            &[("Order Id", "100"), ("Line", "2"), ("Contact Id", "1"), ("Total", "(5.00)")],
            &[("Order Id", "101"), ("Line", "1"), ("Contact Id", "99"), ("Total", "abc dollars")],
        ],
    )
    .await;

    let results = Transformer::new(warehouse.clone(), 2)
        .transform_source(&keap())
        .await
        .unwrap();
    assert_eq!(results[0].0, EntityKind::Contact);
    assert_eq!(results[1].0, EntityKind::Donation);

    let donations = results[1].1;
    assert_eq!(donations.written, 3);
    assert_eq!(donations.orphans, 1);
    assert_eq!(donations.coerced_nulls, 1);

    let result = warehouse
        .db()
        .query(
            "SELECT source_record_id, amount, is_recurring FROM silver.donation ORDER BY source_record_id",
            &[],
        )
        .await
        .unwrap();
    assert_eq!(result.value(0, "source_record_id"), &SqlValue::from("100|1"));
    assert_eq!(result.value(0, "amount").as_f64(), Some(10.0));
    assert_eq!(result.value(0, "is_recurring"), &SqlValue::Bool(true));
    assert_eq!(result.value(1, "amount").as_f64(), Some(-5.0));
    assert!(result.value(2, "amount").is_null());
}

#[tokio::test]
async fn test_oversized_amount_stored_as_null() {
    let warehouse = warehouse().await;
    load(&warehouse, "contacts", "keap/contacts.csv", &[&[("Id", "1")]]).await;
    load(
        &warehouse,
        "orders",
        "keap/orders.csv",
        &[
            &[("Order Id", "200"), ("Line", "1"), ("Contact Id", "1"), ("Total", "12345678901234567890")],
            &[("Order Id", "200"), ("Line", "2"), ("Contact Id", "1"), ("Total", "25.00")],
        ],
    )
    .await;

    let counts = Transformer::new(warehouse.clone(), 10)
        .transform(&keap(), EntityKind::Donation)
        .await
        .unwrap();
    assert_eq!(counts.written, 2);
    assert_eq!(counts.coerced_nulls, 1);

    let result = warehouse
        .db()
        .query(
            "SELECT amount FROM silver.donation ORDER BY source_record_id",
            &[],
        )
        .await
        .unwrap();
    assert!(result.value(0, "amount").is_null());
    assert_eq!(result.value(1, "amount").as_f64(), Some(25.0));
}

#[tokio::test]
async fn test_unregistered_source() {
    let warehouse = Warehouse::open_memory().await.unwrap();
    let err = Transformer::new(warehouse, 10)
        .transform(&keap(), EntityKind::Contact)
        .await
        .unwrap_err();
    assert!(matches!(err, TransformError::UnknownSource { .. }));
}

#[test]
fn test_upsert_sql_shape() {
    let sql = upsert_sql(EntityKind::Donation);
    assert!(sql.starts_with("INSERT INTO silver.donation (source_id, source_record_id, contact_source_id, amount"));
    assert!(sql.contains("CAST(? AS DECIMAL(18,2))"));
    assert!(sql.contains("ON CONFLICT (source_id, source_record_id) DO UPDATE SET contact_source_id = excluded.contact_source_id"));
    assert!(!sql.contains("source_record_id = excluded"));
    assert!(upsert_sql(EntityKind::Contact).contains("contact_id"));
}
