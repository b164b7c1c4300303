use serde_json::json;
use std::sync::{Arc, Mutex};
use warden::core::component::{CallContext, Component, ComponentCall, Operation};
use warden::core::error::WardenError;
use warden::core::identity::Identity;
use warden::core::memory_store::MemoryRecordStore;
use warden::core::service::RecordService;
use warden::core::validation::PID_MESSAGE;
use warden::plugins;

#[test]
fn default_pipeline_runs_every_component_in_table_order() {
    let pipeline = plugins::default_pipeline();
    assert_eq!(
        pipeline.names(),
        vec!["metadata", "pid", "user", "service", "access", "soft_delete", "finish_status"]
    );
    assert_eq!(plugins::available().count(), pipeline.len());
}

#[test]
fn configured_names_keep_their_order_and_unknown_names_fail() {
    let pipeline = plugins::build_pipeline(&["access", "metadata"]).unwrap();
    assert_eq!(pipeline.names(), vec!["access", "metadata"]);

    let err = plugins::build_pipeline(&["metadata", "versioning"]).unwrap_err();
    assert!(matches!(err, WardenError::ConfigError(ref msg) if msg.contains("versioning")));
}

#[test]
fn context_service_wins_over_payload_service() {
    let service = RecordService::new(Box::new(MemoryRecordStore::new()));
    let user = Identity::user(1);

    let from_payload = service
        .create(&user, &json!({"metadata": {}, "service": "figshare"}), &CallContext::default())
        .unwrap();
    assert_eq!(from_payload.record().service(), Some("figshare"));

    let from_context = service
        .create(
            &user,
            &json!({"metadata": {}, "service": "figshare"}),
            &CallContext::default().with_service("zenodo"),
        )
        .unwrap();
    assert_eq!(from_context.record().service(), Some("zenodo"));
}

#[test]
fn system_created_records_have_no_user_contributor() {
    let service = RecordService::new(Box::new(MemoryRecordStore::new()));
    let item = service
        .create(
            &Identity::system_process(),
            &json!({"metadata": {}}),
            &CallContext::default().with_project("alpha"),
        )
        .unwrap();
    assert_eq!(item.record().user_id(), None);
    assert_eq!(item.data()["access"]["contributed_by"], json!([]));
    assert_eq!(item.data()["access"]["owned_by"], json!([{"project": "alpha"}]));
}

#[test]
fn invalid_pid_is_reported_on_the_id_field() {
    let service = RecordService::new(Box::new(MemoryRecordStore::new()));
    let err = service
        .create(
            &Identity::user(1),
            &json!({"id": "has space", "metadata": {}}),
            &CallContext::default(),
        )
        .unwrap_err();
    let fields = err.field_errors();
    assert_eq!(fields[0].field, "id");
    assert_eq!(fields[0].message, PID_MESSAGE);
}

#[test]
fn custom_component_can_veto_before_anything_is_stored() {
    let seen = Arc::new(Mutex::new(Vec::new()));
    let seen_by_hook = Arc::clone(&seen);

    let mut pipeline = plugins::default_pipeline();
    pipeline.register(Component::new("title_required").on(
        Operation::Create,
        move |call: &mut ComponentCall<'_>| {
            seen_by_hook
                .lock()
                .unwrap()
                .push(call.record.metadata().cloned());
            if call.record.field("metadata.title").is_none() {
                return Err(WardenError::field("metadata", "A title is required."));
            }
            Ok(())
        },
    ));

    let store = MemoryRecordStore::new();
    let service = RecordService::new(Box::new(store)).with_pipeline(pipeline);
    let user = Identity::user(1);

    let err = service
        .create(&user, &json!({"metadata": {}}), &CallContext::default())
        .unwrap_err();
    assert!(matches!(err, WardenError::ValidationError(_)));
    assert_eq!(
        service
            .search(&user, Default::default())
            .unwrap()
            .total(),
        0
    );

    service
        .create(&user, &json!({"metadata": {"title": "ok"}}), &CallContext::default())
        .unwrap();
    // Earlier components already ran: metadata was on the record for both calls.
    assert_eq!(
        *seen.lock().unwrap(),
        vec![Some(json!({})), Some(json!({"title": "ok"}))]
    );
}

#[test]
fn finish_and_delete_flip_status_flags() {
    let service = RecordService::new(Box::new(MemoryRecordStore::new()));
    let user = Identity::user(1);
    let id = service
        .create(&user, &json!({"metadata": {}}), &CallContext::default())
        .unwrap()
        .id()
        .to_string();

    let finished = service.finish(&user, &id).unwrap();
    assert!(finished.record().is_finished());
    assert!(!finished.record().is_deleted());

    service.delete(&user, &id).unwrap();
    let deleted = service.read_with(&user, &id, true).unwrap();
    assert!(deleted.record().is_deleted());
    assert!(deleted.record().is_finished());
}

#[test]
fn without_soft_delete_component_delete_keeps_record_visible() {
    let pipeline = plugins::build_pipeline(&["metadata", "access"]).unwrap();
    let service =
        RecordService::new(Box::new(MemoryRecordStore::new())).with_pipeline(pipeline);
    let user = Identity::user(1);
    let id = service
        .create(&user, &json!({"metadata": {}}), &CallContext::default())
        .unwrap()
        .id()
        .to_string();

    service.delete(&user, &id).unwrap();
    assert!(service.read(&user, &id).is_ok());
}
