use super::*;
use crate::connection::Warehouse;

fn new_lineage(blob_path: &str, hash: &str) -> NewLineage {
    NewLineage {
        batch_id: "batch-1".to_string(),
        source_id: 1,
        table_name: "contacts".to_string(),
        blob_path: blob_path.to_string(),
        content_hash: hash.to_string(),
        row_count: None,
    }
}

async fn tracker() -> (Warehouse, LineageTracker) {
    let warehouse = Warehouse::open_memory().await.unwrap();
    let tracker = warehouse.lineage();
    (warehouse, tracker)
}

#[tokio::test]
async fn test_start_then_loaded() {
    let (_wh, tracker) = tracker().await;
    let id = tracker
        .record_file_start(&new_lineage("keap/contacts.csv", "h1"))
        .await
        .unwrap();

    assert!(!tracker.is_already_loaded("keap/contacts.csv", "h1").await.unwrap());
    tracker.mark_loaded(&id, 12).await.unwrap();
    assert!(tracker.is_already_loaded("keap/contacts.csv", "h1").await.unwrap());
    assert!(!tracker.is_already_loaded("keap/contacts.csv", "h2").await.unwrap());

    let record = tracker.get(&id).await.unwrap().unwrap();
    assert_eq!(record.status, LineageStatus::Loaded);
    assert_eq!(record.row_count, Some(12));
    assert!(record.loaded_at.is_some());
}

#[tokio::test]
async fn test_status_moves_only_once() {
    let (_wh, tracker) = tracker().await;
    let id = tracker
        .record_file_start(&new_lineage("keap/contacts.csv", "h1"))
        .await
        .unwrap();
    tracker.mark_loaded(&id, 1).await.unwrap();

    let err = tracker.mark_failed(&id, "late failure").await.unwrap_err();
    assert!(matches!(
        err,
        MetaError::InvalidTransition { ref from, ref to, .. } if from == "loaded" && to == "failed"
    ));

    let err = tracker.mark_loaded("missing", 1).await.unwrap_err();
    assert!(matches!(err, MetaError::LineageNotFound { .. }));
}

#[tokio::test]
async fn test_loading_is_inconclusive_not_loaded() {
    let (_wh, tracker) = tracker().await;
    let id = tracker
        .record_file_start(&new_lineage("keap/contacts.csv", "h1"))
        .await
        .unwrap();

    assert!(!tracker.is_already_loaded("keap/contacts.csv", "h1").await.unwrap());
    let inconclusive = tracker.find_inconclusive("keap/contacts.csv").await.unwrap();
    assert_eq!(inconclusive.len(), 1);
    assert_eq!(inconclusive[0].lineage_id, id);
}

#[tokio::test]
async fn test_discard_removes_raw_records() {
    let (warehouse, tracker) = tracker().await;
    let id = tracker
        .record_file_start(&new_lineage("keap/contacts.csv", "h1"))
        .await
        .unwrap();
    warehouse
        .db()
        .execute(
            "INSERT INTO raw.record VALUES (?, 1, 'contacts', 1, 'rh', '{}')",
            &[SqlValue::from(id.as_str())],
        )
        .await
        .unwrap();

    tracker.discard(&id).await.unwrap();

    assert!(tracker.get(&id).await.unwrap().is_none());
    assert_eq!(
        warehouse
            .db()
            .query_count("SELECT * FROM raw.record")
            .await
            .unwrap(),
        0
    );
}

#[tokio::test]
async fn test_discard_refuses_loaded() {
    let (_wh, tracker) = tracker().await;
    let id = tracker
        .record_file_start(&new_lineage("keap/contacts.csv", "h1"))
        .await
        .unwrap();
    tracker.mark_loaded(&id, 0).await.unwrap();

    assert!(matches!(
        tracker.discard(&id).await,
        Err(MetaError::InvalidTransition { .. })
    ));
}

#[tokio::test]
async fn test_failed_keeps_error_and_list_filters() {
    let (_wh, tracker) = tracker().await;
    let id = tracker
        .record_file_start(&new_lineage("keap/contacts.csv", "h1"))
        .await
        .unwrap();
    tracker.mark_failed(&id, "retries exhausted").await.unwrap();

    let mut other = new_lineage("stripe/charges.csv", "h9");
    other.source_id = 2;
    tracker.record_file_start(&other).await.unwrap();

    let all = tracker.list(None).await.unwrap();
    assert_eq!(all.len(), 2);

    let keap = tracker.list(Some(1)).await.unwrap();
    assert_eq!(keap.len(), 1);
    assert_eq!(keap[0].status, LineageStatus::Failed);
    assert_eq!(keap[0].error.as_deref(), Some("retries exhausted"));
}
