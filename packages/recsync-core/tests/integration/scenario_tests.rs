//! End-to-end walkthrough of a merged Account session.

use recsync_core::adapter::{AdapterCall, AdapterOp};
use recsync_core::{AdapterError, Origin, RecordId, SyncEvent, SyncMode};
use serde_json::json;

use super::helpers::{account_session, drain, fields, ids};
use recsync_core::ChangeNotificationHandler;

#[tokio::test]
async fn test_initial_load_with_sync_off() {
    let session = account_session();
    session.controller.load_internal().await.unwrap();

    assert_eq!(ids(&session.controller.records()), vec!["1", "2"]);
    assert_eq!(ids(&session.controller.filtered_view()), vec!["1", "2"]);
    assert_eq!(session.controller.sync_mode(), SyncMode::Off);
}

#[tokio::test]
async fn test_sync_on_appends_external_rows() {
    let session = account_session();
    session.controller.load_internal().await.unwrap();
    let mut events = session.controller.subscribe();

    let outcome = session.controller.set_sync_mode(SyncMode::On).await.unwrap();
    assert!(outcome.is_success());
    assert_eq!(outcome.message, "1 records loaded from external org.");

    assert_eq!(ids(&session.controller.records()), vec!["1", "2", "10"]);
    let row = session.controller.row(&RecordId::from("10")).unwrap();
    assert_eq!(row.origin(), Origin::External);

    let events = drain(&mut events);
    assert!(events.contains(&SyncEvent::SyncModeChanged { mode: SyncMode::On }));
    assert!(events.contains(&SyncEvent::ExternalLoadResult(outcome)));
}

#[tokio::test]
async fn test_search_narrows_view() {
    let session = account_session();
    session.controller.load_internal().await.unwrap();
    session.controller.set_sync_mode(SyncMode::On).await.unwrap();

    session.controller.search("glo");
    assert_eq!(ids(&session.controller.filtered_view()), vec!["2"]);
    assert_eq!(session.controller.search_term(), "glo");

    // A refresh recomputes the view under the same filter.
    session.local.set_records(vec![
        super::helpers::record("1", "Acme"),
        super::helpers::record("2", "Globex"),
        super::helpers::record("3", "Global Foods"),
    ]);
    session.controller.load_internal().await.unwrap();
    assert_eq!(ids(&session.controller.filtered_view()), vec!["2", "3"]);
}

#[tokio::test]
async fn test_internal_update_goes_local_then_refreshes() {
    let session = account_session();
    session.controller.load_internal().await.unwrap();
    session.controller.set_sync_mode(SyncMode::On).await.unwrap();
    session.local.clear_calls();
    session.remote.clear_calls();

    let outcome = session
        .controller
        .update_row(&RecordId::from("2"), &fields(&[("Name", "Globex Corp")]))
        .await
        .unwrap();

    assert!(outcome.is_success());
    assert_eq!(outcome.message, "Record updated successfully.");
    assert_eq!(
        session.local.calls(),
        vec![
            AdapterCall::Update(RecordId::from("2"), fields(&[("Name", "Globex Corp")])),
            AdapterCall::FetchAll,
        ]
    );
    assert!(session.remote.calls().is_empty());
    assert_eq!(
        session.controller.row(&RecordId::from("2")).unwrap().get("Name"),
        "Globex Corp"
    );
    assert_eq!(ids(&session.controller.records()), vec!["1", "2", "10"]);
}

#[tokio::test]
async fn test_accepted_remote_delete_removes_row() {
    let session = account_session();
    session.controller.load_internal().await.unwrap();
    session.controller.set_sync_mode(SyncMode::On).await.unwrap();
    let handler = ChangeNotificationHandler::new(session.controller.clone());

    assert!(handler.on_message(&json!({
        "objectName": "Account",
        "operation": "DELETE",
        "recordId": 10
    })));
    // Nothing changes until the change is accepted.
    assert_eq!(ids(&session.controller.records()), vec!["1", "2", "10"]);

    let outcome = handler.accept().await.unwrap();
    assert!(outcome.is_success());
    assert_eq!(ids(&session.controller.records()), vec!["1", "2"]);
    assert!(!handler.has_pending());
}

#[tokio::test]
async fn test_external_update_patches_in_place() {
    let session = account_session();
    session.controller.load_internal().await.unwrap();
    session.controller.set_sync_mode(SyncMode::On).await.unwrap();
    session.local.clear_calls();
    session.remote.clear_calls();

    let outcome = session
        .controller
        .update_row(&RecordId::from("10"), &fields(&[("Name", "Initech LLC")]))
        .await
        .unwrap();

    assert!(outcome.is_success());
    assert_eq!(outcome.message, "External record updated successfully.");
    assert_eq!(
        session.remote.calls(),
        vec![AdapterCall::Update(
            RecordId::from("10"),
            fields(&[("Name", "Initech LLC")])
        )]
    );
    assert!(session.local.calls().is_empty());

    let row = session.controller.row(&RecordId::from("10")).unwrap();
    assert_eq!(row.get("Name"), "Initech LLC");
    assert_eq!(row.origin(), Origin::External);
    assert_eq!(ids(&session.controller.records()), vec!["1", "2", "10"]);
}

#[tokio::test]
async fn test_delete_routing_by_origin() {
    let session = account_session();
    session.controller.load_internal().await.unwrap();
    session.controller.set_sync_mode(SyncMode::On).await.unwrap();
    session.local.clear_calls();
    session.remote.clear_calls();

    let outcome = session.controller.delete_row(&RecordId::from("10")).await.unwrap();
    assert_eq!(outcome.message, "External record deleted successfully.");
    assert_eq!(session.remote.calls(), vec![AdapterCall::Delete(RecordId::from("10"))]);

    let outcome = session.controller.delete_row(&RecordId::from("1")).await.unwrap();
    assert_eq!(outcome.message, "Record deleted successfully.");
    assert_eq!(
        session.local.calls(),
        vec![AdapterCall::Delete(RecordId::from("1")), AdapterCall::FetchAll]
    );
    assert_eq!(ids(&session.controller.records()), vec!["2"]);
}

#[tokio::test]
async fn test_failed_delete_reports_sticky_warning() {
    let session = account_session();
    session.controller.load_internal().await.unwrap();
    let mut events = session.controller.subscribe();
    session.local.fail_next(
        AdapterOp::Delete,
        AdapterError::generic("Cannot delete account with open opportunities"),
    );

    let outcome = session.controller.delete_row(&RecordId::from("1")).await.unwrap();
    assert!(!outcome.is_success());
    assert_eq!(outcome.message, "Cannot delete account with open opportunities");
    assert_eq!(outcome.persistence, recsync_core::Persistence::Sticky);
    assert_eq!(ids(&session.controller.records()), vec!["1", "2"]);

    let results: Vec<_> = drain(&mut events)
        .into_iter()
        .filter(|e| matches!(e, SyncEvent::DeleteResult(_)))
        .collect();
    assert_eq!(results, vec![SyncEvent::DeleteResult(outcome)]);
}
