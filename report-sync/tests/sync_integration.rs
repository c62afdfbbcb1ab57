//! End-to-end save behaviour against the in-memory backend.

use std::sync::Arc;
use std::time::Duration;

use report_core::{
    Action, BackendId, Element, ElementContent, ElementType, Patient, ReportId, WireElement,
    WirePage, WireReport, WireTemplate,
};
use report_sync::{
    CloseDecision, LaunchParams, MemoryBackend, OpenRequest, PersistenceSync, SaveTrigger,
    SkipReason, SyncConfig, SyncEvent, SyncOutcome,
};
use serde_json::json;

fn text_wire(text: &str) -> WireElement {
    WireElement {
        id: None,
        type_code: 0,
        x: 40.0,
        y: 40.0,
        width: 200.0,
        height: 50.0,
        content: json!({ "text": text }),
    }
}

fn wire_page(name: &str, elements: Vec<WireElement>) -> WirePage {
    WirePage {
        id: None,
        order: 0,
        name: name.to_string(),
        width: Some(595.0),
        height: Some(842.0),
        elements,
    }
}

fn seed(backend: &MemoryBackend, elements: Vec<WireElement>) -> ReportId {
    backend.insert_report(WireReport {
        name: "Complete blood count".to_string(),
        patient_id: Some("p-7".to_string()),
        patient_name: Some("Ada Lovelace".to_string()),
        pages: vec![wire_page("Results", elements)],
        created_at: Some(1_000),
        updated_at: Some(1_000),
        ..WireReport::default()
    })
}

fn engine(backend: &MemoryBackend) -> PersistenceSync {
    PersistenceSync::new(Arc::new(backend.clone()), SyncConfig::default())
}

fn add_text(sync: &PersistenceSync) {
    sync.dispatch(Action::AddElement {
        element: Element::new(ElementContent::default_for(ElementType::Text)),
        page: None,
    })
    .expect("add element");
}

fn created_elements(backend: &MemoryBackend) -> usize {
    backend
        .write_log()
        .iter()
        .filter(|entry| entry.starts_with("create element"))
        .count()
}

#[tokio::test]
async fn test_interval_save_skipped_while_explicit_save_runs() {
    let backend = MemoryBackend::new();
    let id = seed(&backend, Vec::new());
    let sync = engine(&backend);
    sync.open_report(&id).await.expect("open");
    add_text(&sync);
    backend.set_latency(Duration::from_millis(200));

    let explicit = {
        let sync = sync.clone();
        tokio::spawn(async move { sync.sync_now(SaveTrigger::Explicit).await })
    };
    tokio::time::sleep(Duration::from_millis(50)).await;

    let interval = sync.sync_now(SaveTrigger::Interval).await.expect("interval");
    assert_eq!(interval, SyncOutcome::Skipped(SkipReason::SaveInFlight));

    let explicit = explicit.await.expect("join").expect("explicit save");
    assert!(matches!(explicit, SyncOutcome::Saved(_)));
    assert_eq!(created_elements(&backend), 1);
}

#[tokio::test]
async fn test_explicit_save_waits_for_running_save() {
    let backend = MemoryBackend::new();
    let id = seed(&backend, Vec::new());
    let sync = engine(&backend);
    sync.open_report(&id).await.expect("open");
    add_text(&sync);
    backend.set_latency(Duration::from_millis(100));

    let first = {
        let sync = sync.clone();
        tokio::spawn(async move { sync.save().await })
    };
    tokio::time::sleep(Duration::from_millis(20)).await;
    let second = sync.save().await.expect("second save");

    assert!(matches!(
        first.await.expect("join").expect("first save"),
        SyncOutcome::Saved(_)
    ));
    assert_eq!(second, SyncOutcome::Skipped(SkipReason::Unchanged));
    assert_eq!(created_elements(&backend), 1);
}

#[tokio::test]
async fn test_partial_failure_keeps_assigned_ids() {
    let backend = MemoryBackend::new();
    let id = seed(&backend, Vec::new());
    let sync = engine(&backend);
    sync.open_report(&id).await.expect("open");
    for _ in 0..3 {
        add_text(&sync);
    }

    // page update and the first element create succeed
    backend.fail_writes_after(2);
    assert!(sync.save().await.is_err());

    let assigned = sync.read_editor(|editor| {
        editor.canvas().pages()[0]
            .elements
            .iter()
            .filter(|e| e.backend_id.is_some())
            .count()
    });
    assert_eq!(assigned, 1);
    assert!(sync.read_editor(|editor| editor.has_pending_changes()));

    backend.heal();
    backend.clear_write_log();
    let outcome = sync.save().await.expect("retry");
    let SyncOutcome::Saved(summary) = outcome else {
        panic!("expected a save");
    };
    assert_eq!(summary.created, 2);
    assert_eq!(created_elements(&backend), 2);

    let stored = backend.report(&id).expect("stored");
    assert_eq!(stored.pages[0].elements.len(), 3);
    assert!(sync.read_editor(|editor| !editor.has_pending_changes()));
}

#[tokio::test]
async fn test_tombstones_survive_failed_save() {
    let backend = MemoryBackend::new();
    let id = seed(&backend, vec![text_wire("Haemoglobin"), text_wire("Platelets")]);
    let sync = engine(&backend);
    sync.open_report(&id).await.expect("open");

    let doomed = sync.read_editor(|editor| editor.canvas().pages()[0].elements[0].id.clone());
    sync.dispatch(Action::DeleteElement {
        id: doomed,
        page: None,
    })
    .expect("delete");
    sync.dispatch(Action::AddPage {
        name: "Notes".to_string(),
    })
    .expect("add page");

    // the delete lands, the page update after it fails
    backend.fail_writes_after(1);
    assert!(sync.save().await.is_err());
    assert_eq!(
        sync.read_editor(|editor| editor.canvas().pending_deletions().len()),
        1
    );
    assert_eq!(backend.report(&id).expect("stored").pages[0].elements.len(), 1);

    backend.heal();
    let outcome = sync.save().await.expect("retry");
    assert!(matches!(outcome, SyncOutcome::Saved(_)));
    assert!(sync.read_editor(|editor| editor.canvas().pending_deletions().is_empty()));

    let stored = backend.report(&id).expect("stored");
    assert_eq!(stored.pages.len(), 2);
    assert_eq!(stored.pages[0].elements.len(), 1);
}

fn stored_elements(backend: &MemoryBackend, id: &ReportId) -> usize {
    backend.report(id).expect("stored").pages[0].elements.len()
}

#[tokio::test]
async fn test_undo_after_save_deletes_remote_row() {
    let backend = MemoryBackend::new();
    let id = seed(&backend, Vec::new());
    let sync = engine(&backend);
    sync.open_report(&id).await.expect("open");
    add_text(&sync);
    sync.save().await.expect("save");
    assert_eq!(stored_elements(&backend, &id), 1);

    let undone = sync.with_editor(|editor| editor.canvas_mut().undo()).expect("undo");
    assert!(undone);
    let SyncOutcome::Saved(summary) = sync.save().await.expect("second save") else {
        panic!("expected a save");
    };
    assert_eq!(summary.deleted, 1);
    assert_eq!(stored_elements(&backend, &id), 0);
    assert!(sync.read_editor(|editor| !editor.has_pending_changes()));
}

#[tokio::test]
async fn test_delete_during_create_is_pushed_next_save() {
    let backend = MemoryBackend::new();
    let id = seed(&backend, Vec::new());
    let sync = engine(&backend);
    sync.open_report(&id).await.expect("open");
    add_text(&sync);
    backend.set_latency(Duration::from_millis(100));

    let first = {
        let sync = sync.clone();
        tokio::spawn(async move { sync.save().await })
    };
    tokio::time::sleep(Duration::from_millis(30)).await;
    let doomed = sync.read_editor(|editor| editor.canvas().pages()[0].elements[0].id.clone());
    sync.dispatch(Action::DeleteElement {
        id: doomed,
        page: None,
    })
    .expect("delete");

    first.await.expect("join").expect("first save");
    assert_eq!(stored_elements(&backend, &id), 1);
    assert!(sync.read_editor(|editor| editor.has_pending_changes()));

    sync.save().await.expect("second save");
    assert_eq!(stored_elements(&backend, &id), 0);
    assert!(sync.read_editor(|editor| !editor.has_pending_changes()));
}

#[tokio::test]
async fn test_undo_of_saved_delete_recreates_row() {
    let backend = MemoryBackend::new();
    let id = seed(&backend, vec![text_wire("Haemoglobin")]);
    let sync = engine(&backend);
    sync.open_report(&id).await.expect("open");

    let (element, original) = sync.read_editor(|editor| {
        let element = &editor.canvas().pages()[0].elements[0];
        (element.id.clone(), element.backend_id.clone())
    });
    sync.dispatch(Action::DeleteElement {
        id: element.clone(),
        page: None,
    })
    .expect("delete");
    sync.save().await.expect("save delete");
    assert_eq!(stored_elements(&backend, &id), 0);

    let undone = sync.with_editor(|editor| editor.canvas_mut().undo()).expect("undo");
    assert!(undone);
    sync.save().await.expect("save undo");

    let stored = backend.report(&id).expect("stored");
    assert_eq!(stored.pages[0].elements.len(), 1);
    assert_eq!(stored.pages[0].elements[0].content["text"], "Haemoglobin");
    let restored = sync.read_editor(|editor| {
        editor.canvas().pages()[0]
            .element(&element)
            .and_then(|e| e.backend_id.clone())
    });
    assert_ne!(restored, original);
    assert_eq!(restored, stored.pages[0].elements[0].id);
    assert!(sync.read_editor(|editor| !editor.has_pending_changes()));
}

#[tokio::test]
async fn test_removed_page_is_deleted_remotely() {
    let backend = MemoryBackend::new();
    let id = backend.insert_report(WireReport {
        name: "Two pages".to_string(),
        pages: vec![wire_page("One", Vec::new()), wire_page("Two", vec![text_wire("x")])],
        ..WireReport::default()
    });
    let sync = engine(&backend);
    sync.open_report(&id).await.expect("open");

    sync.dispatch(Action::RemovePage { index: 1 }).expect("remove");
    sync.save().await.expect("save");

    let stored = backend.report(&id).expect("stored");
    assert_eq!(stored.pages.len(), 1);
    assert_eq!(stored.pages[0].name, "One");
    assert!(backend
        .write_log()
        .iter()
        .all(|entry| !entry.starts_with("delete element")));
}

#[tokio::test]
async fn test_open_template_creates_and_saves_report() {
    let backend = MemoryBackend::new();
    backend.insert_template(WireTemplate {
        id: BackendId::new("t-lipid"),
        name: "Lipid panel".to_string(),
        pages: vec![wire_page("Panel", vec![text_wire("Cholesterol")])],
    });
    let sync = engine(&backend);

    let params = LaunchParams::from_query("templateId=t-lipid&patientId=p-7&patientName=Ada");
    let request = params.resolve();
    assert!(matches!(request, OpenRequest::FromTemplate { .. }));
    let id = sync.open(&request).await.expect("open").expect("report id");

    let stored = backend.report(&id).expect("stored");
    assert_eq!(stored.name, "Lipid panel - Ada");
    assert_eq!(stored.template_id.as_deref(), Some("t-lipid"));
    assert_eq!(stored.pages.len(), 1);
    assert_eq!(stored.pages[0].elements.len(), 1);
    assert!(sync.read_editor(|editor| !editor.has_pending_changes()));
    assert!(sync.documents().get(&id).is_some());
}

#[tokio::test]
async fn test_template_draft_retries_after_failed_first_save() {
    let backend = MemoryBackend::new();
    backend.insert_template(WireTemplate {
        id: BackendId::new("t-1"),
        name: "Glucose".to_string(),
        pages: vec![wire_page("Panel", Vec::new())],
    });
    let sync = engine(&backend);
    let patient = Patient {
        id: "p-1".to_string(),
        name: "Grace".to_string(),
    };

    // report row is created, the first page create fails
    backend.fail_writes_after(1);
    assert!(sync.open_template("t-1", &patient).await.is_err());
    let id = sync
        .read_editor(|editor| editor.active_report_id().cloned())
        .expect("draft stays active");
    assert!(sync.read_editor(|editor| editor.has_pending_changes()));

    backend.heal();
    sync.save().await.expect("retry");
    assert_eq!(backend.report(&id).expect("stored").pages.len(), 1);
}

#[tokio::test]
async fn test_events_report_failures_and_saves() {
    let backend = MemoryBackend::new();
    let id = seed(&backend, Vec::new());
    let sync = engine(&backend);
    let mut events = sync.subscribe();
    sync.open_report(&id).await.expect("open");
    add_text(&sync);

    backend.fail_writes_after(0);
    let _ = sync.save().await;
    match events.recv().await.expect("event") {
        SyncEvent::SaveFailed { report, .. } => assert_eq!(report, Some(id.clone())),
        other => panic!("unexpected event: {other:?}"),
    }

    backend.heal();
    sync.save().await.expect("save");
    assert!(matches!(
        events.recv().await.expect("event"),
        SyncEvent::Saved { .. }
    ));
}

#[tokio::test]
async fn test_background_task_saves_and_shuts_down() {
    let backend = MemoryBackend::new();
    let id = seed(&backend, Vec::new());
    let config = SyncConfig::default().with_interval(Duration::from_millis(30));
    let sync = PersistenceSync::new(Arc::new(backend.clone()), config);
    let mut events = sync.subscribe();
    sync.open_report(&id).await.expect("open");
    add_text(&sync);

    let handle = sync.spawn();
    let event = tokio::time::timeout(Duration::from_secs(2), events.recv())
        .await
        .expect("timely event")
        .expect("event");
    assert!(matches!(
        event,
        SyncEvent::Saved {
            trigger: SaveTrigger::Interval,
            ..
        }
    ));

    handle.shutdown().await;
    assert_eq!(created_elements(&backend), 1);
}

#[tokio::test]
async fn test_close_flush_saves_then_unloads() {
    let backend = MemoryBackend::new();
    let id = seed(&backend, Vec::new());
    let sync = engine(&backend);
    sync.open_report(&id).await.expect("open");
    add_text(&sync);

    sync.close(CloseDecision::Flush).await.expect("close");
    assert!(sync.read_editor(|editor| editor.active_report_id().is_none()));
    assert_eq!(backend.report(&id).expect("stored").pages[0].elements.len(), 1);
}
