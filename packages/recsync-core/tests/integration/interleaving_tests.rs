//! Results that land after the session moved on.

use recsync_core::adapter::AdapterCall;
use recsync_core::{ChangeNotificationHandler, Origin, RecordId, SyncEvent, SyncMode};
use serde_json::json;

use super::helpers::{drain, fields, gated_account_session, ids};

#[tokio::test]
async fn test_external_listing_dropped_after_sync_off() {
    let session = gated_account_session();
    let controller = &session.controller;
    controller.load_internal().await.unwrap();
    let mut events = controller.subscribe();
    let gate = &session.remote.gate;
    gate.arm();

    let (on, _) = tokio::join!(controller.set_sync_mode(SyncMode::On), async {
        gate.entered().await;
        controller.set_sync_mode(SyncMode::Off).await;
        gate.release();
    });

    assert!(on.is_none());
    assert_eq!(controller.sync_mode(), SyncMode::Off);
    assert_eq!(ids(&controller.records()), vec!["1", "2"]);
    assert!(controller
        .records()
        .iter()
        .all(|r| r.origin() == Origin::Internal));
    // The listing ran but was never applied.
    assert_eq!(session.remote.inner.calls(), vec![AdapterCall::FetchAll]);
    assert!(!drain(&mut events)
        .iter()
        .any(|e| matches!(e, SyncEvent::ExternalLoadResult(_))));
}

#[tokio::test]
async fn test_latest_sync_on_wins() {
    let session = gated_account_session();
    let controller = &session.controller;
    controller.load_internal().await.unwrap();
    let gate = &session.remote.gate;
    gate.arm();

    let (first, second) = tokio::join!(controller.set_sync_mode(SyncMode::On), async {
        gate.entered().await;
        session.remote.inner.set_records(vec![super::helpers::record("11", "Hooli")]);
        let second = controller.set_sync_mode(SyncMode::On).await;
        gate.release();
        second
    });

    assert!(first.is_none());
    assert!(second.unwrap().is_success());
    assert_eq!(ids(&controller.records()), vec!["1", "2", "11"]);
}

#[tokio::test]
async fn test_teardown_during_internal_update() {
    let session = gated_account_session();
    let controller = &session.controller;
    controller.load_internal().await.unwrap();
    session.local.inner.clear_calls();
    let mut events = controller.subscribe();
    let gate = &session.local.gate;
    gate.arm();

    let id = RecordId::from("1");
    let delta = fields(&[("Name", "Acme Ltd")]);
    let (outcome, _) = tokio::join!(controller.update_row(&id, &delta), async {
        gate.entered().await;
        controller.teardown();
        gate.release();
    });

    assert!(outcome.is_none());
    assert!(drain(&mut events).is_empty());
    assert!(controller.records().is_empty());
    // The write reached the source; the refresh was skipped.
    assert_eq!(
        session.local.inner.calls(),
        vec![AdapterCall::Update(id, delta)]
    );
}

#[tokio::test]
async fn test_teardown_during_external_update() {
    let session = gated_account_session();
    let controller = &session.controller;
    controller.load_internal().await.unwrap();
    controller.set_sync_mode(SyncMode::On).await.unwrap();
    let mut events = controller.subscribe();
    let gate = &session.remote.gate;
    gate.arm();

    let delta = fields(&[("Name", "Initech LLC")]);
    let id = RecordId::from("10");
    let (outcome, _) = tokio::join!(controller.update_row(&id, &delta), async {
        gate.entered().await;
        controller.teardown();
        gate.release();
    });

    assert!(outcome.is_none());
    assert!(drain(&mut events).is_empty());
    assert!(controller.row(&RecordId::from("10")).is_none());
}

#[tokio::test]
async fn test_teardown_during_internal_fetch() {
    let session = gated_account_session();
    let controller = &session.controller;
    let mut events = controller.subscribe();
    let gate = &session.local.gate;
    gate.arm();

    let (loaded, _) = tokio::join!(controller.load_internal(), async {
        gate.entered().await;
        controller.teardown();
        gate.release();
    });

    assert_eq!(loaded, Ok(0));
    assert!(controller.records().is_empty());
    assert!(controller.filtered_view().is_empty());
    assert!(drain(&mut events).is_empty());
}

#[tokio::test]
async fn test_teardown_during_accept() {
    let session = gated_account_session();
    let controller = &session.controller;
    controller.load_internal().await.unwrap();
    let handler = ChangeNotificationHandler::new(controller.clone());
    handler.on_message(&json!({
        "operation": "UPDATE",
        "recordId": "2",
        "fields": {"Name": "Globex Remote"}
    }));
    let mut events = controller.subscribe();
    let gate = &session.local.gate;
    gate.arm();

    let (outcome, _) = tokio::join!(handler.accept(), async {
        gate.entered().await;
        controller.teardown();
        gate.release();
    });

    assert!(outcome.is_none());
    assert!(drain(&mut events).is_empty());
}
