//! Invariants over the merged record set, drafts and search.

use recsync_core::adapter::AdapterOp;
use recsync_core::{AdapterError, ChangeNotificationHandler, Origin, RecordId, SyncMode};
use serde_json::json;

use super::helpers::{account_session, ids, record};

#[tokio::test]
async fn test_sync_off_leaves_no_external_rows() {
    let session = account_session();
    session.controller.load_internal().await.unwrap();
    session.controller.set_sync_mode(SyncMode::On).await.unwrap();
    session.remote.clear_calls();

    session.controller.set_sync_mode(SyncMode::Off).await;

    assert!(session
        .controller
        .records()
        .iter()
        .all(|r| r.origin() == Origin::Internal));
    assert!(session.remote.calls().is_empty());
    assert_eq!(ids(&session.controller.records()), vec!["1", "2"]);
}

#[tokio::test]
async fn test_sync_off_drops_external_even_if_refresh_fails() {
    let session = account_session();
    session.controller.load_internal().await.unwrap();
    session.controller.set_sync_mode(SyncMode::On).await.unwrap();
    session
        .local
        .fail_next(AdapterOp::FetchAll, AdapterError::message("offline"));

    session.controller.set_sync_mode(SyncMode::Off).await;

    assert!(session
        .controller
        .records()
        .iter()
        .all(|r| r.origin() == Origin::Internal));
}

#[tokio::test]
async fn test_refresh_keeps_external_partition_untouched() {
    let session = account_session();
    session.controller.load_internal().await.unwrap();
    session.remote.set_records(vec![record("10", "Initech"), record("11", "Hooli")]);
    session.controller.set_sync_mode(SyncMode::On).await.unwrap();
    let external_before: Vec<_> = session
        .controller
        .records()
        .iter()
        .filter(|r| r.origin() == Origin::External)
        .cloned()
        .collect();

    session.local.set_records(vec![
        record("1", "Acme"),
        record("2", "Globex"),
        record("3", "Umbrella"),
    ]);
    let internal = session.controller.load_internal().await.unwrap();

    let records = session.controller.records();
    assert_eq!(records.len(), internal + external_before.len());
    let external_after: Vec<_> = records
        .iter()
        .filter(|r| r.origin() == Origin::External)
        .cloned()
        .collect();
    assert_eq!(external_after, external_before);
}

#[tokio::test]
async fn test_dirty_iff_draft_differs() {
    let session = account_session();
    session.controller.load_internal().await.unwrap();
    let id = RecordId::from("1");

    assert!(!session.controller.is_dirty(&id));
    assert!(session.controller.set_field(&id, "Phone", "555-0100").unwrap());
    assert!(session.controller.can_save(&id));
    assert!(!session.controller.set_field(&id, "Phone", "").unwrap());
    assert!(!session.controller.can_save(&id));

    // The origin marker cannot be edited at all.
    assert!(session.controller.set_field(&id, "Mode", "External").is_err());
    assert!(!session.controller.is_dirty(&id));
}

#[tokio::test]
async fn test_commit_never_contains_origin_marker() {
    let session = account_session();
    session.controller.load_internal().await.unwrap();
    session.controller.set_sync_mode(SyncMode::On).await.unwrap();

    for row in session.controller.records().iter() {
        session
            .controller
            .set_field(row.id(), "Name", format!("{} edited", row.get("Name")))
            .unwrap();
        let delta = session.controller.commit(row.id()).unwrap();
        assert!(!delta.contains_key("Mode"));
        assert_eq!(delta.len(), 1);
    }
}

#[tokio::test]
async fn test_refresh_resets_drafts() {
    let session = account_session();
    session.controller.load_internal().await.unwrap();
    let id = RecordId::from("1");
    session.controller.set_field(&id, "Name", "Draft").unwrap();

    session.controller.load_internal().await.unwrap();
    assert!(!session.controller.is_dirty(&id));
    assert_eq!(session.controller.draft(&id).unwrap()["Name"], "Acme");
}

#[tokio::test]
async fn test_empty_search_restores_full_view() {
    let session = account_session();
    session.controller.load_internal().await.unwrap();
    session.controller.set_sync_mode(SyncMode::On).await.unwrap();

    session.controller.search("ini");
    assert_eq!(ids(&session.controller.filtered_view()), vec!["10"]);

    session.controller.search("");
    assert_eq!(
        *session.controller.filtered_view(),
        *session.controller.records()
    );
}

#[tokio::test]
async fn test_search_partitions_rows_by_match() {
    let session = account_session();
    session.local.set_records(vec![
        record("1", "Acme"),
        record("2", "ACME West"),
        record("3", "Globex"),
        record("4", "Pacme"),
    ]);
    session.controller.load_internal().await.unwrap();

    session.controller.search("AcMe");
    let view = session.controller.filtered_view();
    let records = session.controller.records();

    for row in records.iter() {
        let matches = row.get("Name").to_lowercase().contains("acme");
        assert_eq!(view.contains(row), matches, "row {}", row.id());
    }
    assert_eq!(ids(&view), vec!["1", "2", "4"]);
}

#[tokio::test]
async fn test_search_term_whitespace_is_significant() {
    let session = account_session();
    session.local.set_records(vec![
        record("1", "Acme"),
        record("2", "Globex"),
        record("3", "Acme West"),
    ]);
    session.controller.load_internal().await.unwrap();

    session.controller.search("acme ");
    assert_eq!(ids(&session.controller.filtered_view()), vec!["3"]);

    // Only the empty term resets the view.
    session.controller.search(" ");
    assert_eq!(ids(&session.controller.filtered_view()), vec!["3"]);
    session.controller.search("");
    assert_eq!(ids(&session.controller.filtered_view()), vec!["1", "2", "3"]);
}

#[tokio::test]
async fn test_accepted_delete_leaves_other_drafts_alone() {
    let session = account_session();
    session.controller.load_internal().await.unwrap();
    session.controller.set_sync_mode(SyncMode::On).await.unwrap();
    let handler = ChangeNotificationHandler::new(session.controller.clone());

    let kept = RecordId::from("1");
    session.controller.set_field(&kept, "Name", "Acme Draft").unwrap();

    handler.on_message(&json!({"operation": "DELETE", "recordId": "2"}));
    handler.accept().await.unwrap();

    assert_eq!(ids(&session.controller.records()), vec!["1", "10"]);
    assert!(session.controller.is_dirty(&kept));
    assert_eq!(session.controller.draft(&kept).unwrap()["Name"], "Acme Draft");
    assert!(session.controller.draft(&RecordId::from("2")).is_none());
}

#[tokio::test]
async fn test_failed_accept_keeps_change_and_record_set() {
    let session = account_session();
    session.controller.load_internal().await.unwrap();
    let handler = ChangeNotificationHandler::new(session.controller.clone());
    let before = session.controller.records();

    handler.on_message(&json!({
        "operation": "UPDATE",
        "recordId": "1",
        "fields": {"Name": "Acme Remote"}
    }));
    session.local.fail_next(
        AdapterOp::Update,
        AdapterError::message("row locked"),
    );

    let outcome = handler.accept().await.unwrap();
    assert!(!outcome.is_success());
    assert_eq!(outcome.message, "row locked");
    assert!(handler.has_pending());
    assert_eq!(*session.controller.records(), *before);

    // Retrying succeeds once the source recovers.
    let outcome = handler.accept().await.unwrap();
    assert!(outcome.is_success());
    assert!(!handler.has_pending());
    assert_eq!(
        session.controller.row(&RecordId::from("1")).unwrap().get("Name"),
        "Acme Remote"
    );
}
